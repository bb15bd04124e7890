use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::Add;
use std::time::Duration;
use uuid::Uuid;

/// Language identifier as submitted by callers (`python`, `cpp`, ...).
///
/// The set is open: which identifiers are actually supported is decided by the
/// harness registry loaded at startup, not by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct LanguageId(String);

impl LanguageId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LanguageId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<&str> for LanguageId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<LanguageId> for String {
    fn from(id: LanguageId) -> Self {
        id.0
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wall-clock time in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Millis(pub u64);

impl Millis {
    pub fn from_duration(duration: Duration) -> Self {
        Self(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_millis(self.0)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Add for Millis {
    type Output = Millis;

    fn add(self, rhs: Millis) -> Millis {
        Millis(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Millis {
    fn sum<I: Iterator<Item = Millis>>(iter: I) -> Millis {
        iter.fold(Millis::default(), Add::add)
    }
}

impl fmt::Display for Millis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Memory in kilobytes (1024 bytes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kilobytes(pub u64);

impl Kilobytes {
    pub fn from_bytes(bytes: u64) -> Self {
        Self(bytes / 1024)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl Add for Kilobytes {
    type Output = Kilobytes;

    fn add(self, rhs: Kilobytes) -> Kilobytes {
        Kilobytes(self.0.saturating_add(rhs.0))
    }
}

impl Sum for Kilobytes {
    fn sum<I: Iterator<Item = Kilobytes>>(iter: I) -> Kilobytes {
        iter.fold(Kilobytes::default(), Add::add)
    }
}

impl fmt::Display for Kilobytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}KB", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u32,
    pub input: String,
    pub expected_output: String,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub order_index: i32,
}

/// A problem as provided by the problem store: its test cases plus an optional
/// per-problem time limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<Millis>,
    pub test_cases: Vec<TestCase>,
}

/// One call to the execution sandbox.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionRequest<'a> {
    pub language: &'a LanguageId,
    pub source: &'a str,
    pub stdin: &'a str,
    pub timeout: Millis,
}

/// How a single sandbox execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    CompilationError,
    RuntimeError { exit_code: i64 },
    /// Any status the sandbox reported that we have no name for.
    Unknown { code: i64 },
}

impl ExecutionStatus {
    /// Map a process exit code to a status. 137 is SIGKILL, which under a
    /// memory cgroup almost always means the OOM killer fired.
    pub fn from_exit_code(code: i64) -> Self {
        match code {
            0 => ExecutionStatus::Completed,
            137 => ExecutionStatus::MemoryLimitExceeded,
            other => ExecutionStatus::RuntimeError { exit_code: other },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Completed)
    }
}

/// Raw result of one sandbox execution. Never modified after it is received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub compile_output: String,
    pub status: ExecutionStatus,
    pub time: Millis,
    pub memory: Kilobytes,
}

impl ExecutionResult {
    /// Result reported when the hard wall-clock limit fires before the sandbox answers.
    pub fn timed_out(elapsed: Millis) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            compile_output: String::new(),
            status: ExecutionStatus::TimeLimitExceeded,
            time: elapsed,
            memory: Kilobytes::default(),
        }
    }
}

/// Why a single test case passed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Passed,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    CompilationError,
    RuntimeError,
    /// The program exited normally but wrote to stderr or produced compiler output.
    UnexpectedStderr,
    /// The sandbox reported a status code outside the known vocabulary.
    SandboxFailure,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Passed => "passed",
            OutcomeStatus::WrongAnswer => "wrong_answer",
            OutcomeStatus::TimeLimitExceeded => "time_limit_exceeded",
            OutcomeStatus::MemoryLimitExceeded => "memory_limit_exceeded",
            OutcomeStatus::CompilationError => "compilation_error",
            OutcomeStatus::RuntimeError => "runtime_error",
            OutcomeStatus::UnexpectedStderr => "unexpected_stderr",
            OutcomeStatus::SandboxFailure => "sandbox_failure",
        }
    }
}

/// How informative an error message is. Diagnostic only, never part of pass/fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorTier {
    #[serde(rename = "EXCELLENT")]
    Excellent,
    #[serde(rename = "GOOD")]
    Good,
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "POOR")]
    Poor,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl fmt::Display for ErrorTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorTier::Excellent => "EXCELLENT",
            ErrorTier::Good => "GOOD",
            ErrorTier::Ok => "OK",
            ErrorTier::Poor => "POOR",
            ErrorTier::NotApplicable => "N/A",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test_case_id: u32,
    pub order_index: i32,
    pub is_hidden: bool,
    pub passed: bool,
    pub status: OutcomeStatus,
    pub actual: String,
    pub expected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "time_ms", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Millis>,
    #[serde(rename = "memory_kb", default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Kilobytes>,
    pub tier: ErrorTier,
}

impl TestOutcome {
    /// Copy of this outcome with the test data removed, for hidden test cases.
    pub fn redacted(&self) -> TestOutcome {
        TestOutcome {
            actual: String::new(),
            expected: String::new(),
            error: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    Error,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::WrongAnswer => "wrong_answer",
            Verdict::Error => "error",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Preview against visible test cases only; nothing is persisted.
    Run,
    /// Full evaluation against every test case; the result is persisted.
    Submit,
}

impl EvaluationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationMode::Run => "run",
            EvaluationMode::Submit => "submit",
        }
    }
}

/// Final result of one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionVerdict {
    pub verdict: Verdict,
    pub passed_count: usize,
    pub total_count: usize,
    #[serde(rename = "time_ms")]
    pub total_time: Millis,
    #[serde(rename = "memory_kb")]
    pub total_memory: Kilobytes,
    pub outcomes: Vec<TestOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubmissionVerdict {
    /// Verdict for an attempt whose execution layer failed as a whole. No
    /// partial outcomes are kept.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Error,
            passed_count: 0,
            total_count: 0,
            total_time: Millis::default(),
            total_memory: Kilobytes::default(),
            outcomes: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// What gets persisted for a submitted attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub problem_id: String,
    pub language: LanguageId,
    pub source_code: String,
    pub verdict: Verdict,
    pub passed_count: usize,
    pub total_count: usize,
    pub time_ms: Millis,
    pub memory_kb: Kilobytes,
    pub created_at: DateTime<Utc>,
}

impl SubmissionRecord {
    pub fn new(
        problem_id: &str,
        language: &LanguageId,
        source_code: &str,
        verdict: &SubmissionVerdict,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            problem_id: problem_id.to_string(),
            language: language.clone(),
            source_code: source_code.to_string(),
            verdict: verdict.verdict,
            passed_count: verdict.passed_count,
            total_count: verdict.total_count,
            time_ms: verdict.total_time,
            memory_kb: verdict.total_memory,
            created_at: Utc::now(),
        }
    }
}
