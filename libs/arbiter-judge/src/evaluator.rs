//! Test Evaluator - Language-Agnostic Comparison Logic
//!
//! **Core Responsibility:**
//! Turn one raw execution result into one TestOutcome, and fold outcomes into
//! a SubmissionVerdict.
//!
//! **Critical Properties:**
//! - Knows nothing about Docker or the remote sandbox
//! - Knows nothing about language runtimes
//! - Pure functions: (execution result, test case) → outcome
//!
//! **Pass Rule (all three must hold):**
//! - The execution completed normally (no TLE / MLE / runtime / compile error)
//! - stderr and compile output are both empty
//! - Trimmed answer equals trimmed expected output, byte for byte
//!
//! **Normalization Rules:**
//! - Trim leading and trailing whitespace: YES
//! - Internal whitespace and newlines: preserved
//! - Case sensitivity: YES (exact match required)
//! - Numeric tolerance / structural JSON equality: NO

use crate::classifier;
use crate::parser;
use arbiter_common::types::{
    ExecutionResult, ExecutionStatus, Kilobytes, Millis, OutcomeStatus, SubmissionVerdict,
    TestCase, TestOutcome, Verdict,
};

/// Normalize output string for comparison
fn normalize_output(output: &str) -> &str {
    output.trim()
}

/// Decide the status of one execution given its parsed answer.
///
/// Order matters: sandbox-reported failures win over output checks, and any
/// stderr on an otherwise clean run fails the test even if the answer matches.
fn outcome_status(actual: &str, expected: &str, result: &ExecutionResult) -> OutcomeStatus {
    match result.status {
        ExecutionStatus::CompilationError => OutcomeStatus::CompilationError,
        ExecutionStatus::TimeLimitExceeded => OutcomeStatus::TimeLimitExceeded,
        ExecutionStatus::MemoryLimitExceeded => OutcomeStatus::MemoryLimitExceeded,
        ExecutionStatus::RuntimeError { .. } => OutcomeStatus::RuntimeError,
        ExecutionStatus::Unknown { .. } => OutcomeStatus::SandboxFailure,
        ExecutionStatus::Completed => {
            if !result.stderr.is_empty() || !result.compile_output.is_empty() {
                OutcomeStatus::UnexpectedStderr
            } else if normalize_output(actual) == normalize_output(expected) {
                OutcomeStatus::Passed
            } else {
                OutcomeStatus::WrongAnswer
            }
        }
    }
}

/// Error text surfaced on an outcome: compiler output first, then stderr, then
/// a description of the status when the sandbox gave no text at all.
fn error_text(status: OutcomeStatus, result: &ExecutionResult) -> Option<String> {
    if !result.compile_output.trim().is_empty() {
        return Some(result.compile_output.clone());
    }
    if !result.stderr.trim().is_empty() {
        return Some(result.stderr.clone());
    }
    match (status, result.status) {
        (OutcomeStatus::TimeLimitExceeded, _) => Some("Time limit exceeded".to_string()),
        (OutcomeStatus::MemoryLimitExceeded, _) => Some("Memory limit exceeded".to_string()),
        (OutcomeStatus::RuntimeError, ExecutionStatus::RuntimeError { exit_code }) => {
            Some(format!("Process exited with code {}", exit_code))
        }
        (OutcomeStatus::SandboxFailure, ExecutionStatus::Unknown { code }) => {
            Some(format!("Sandbox reported unknown status {}", code))
        }
        (OutcomeStatus::CompilationError, _) => Some("Compilation failed".to_string()),
        _ => None,
    }
}

/// Compare one execution against its test case.
///
/// `actual` is the answer already extracted by the result parser.
pub fn compare(test_case: &TestCase, actual: &str, result: &ExecutionResult) -> TestOutcome {
    let status = outcome_status(actual, &test_case.expected_output, result);
    let passed = status == OutcomeStatus::Passed;
    let error = error_text(status, result);
    let tier = classifier::classify(error.as_deref(), passed);

    TestOutcome {
        test_case_id: test_case.id,
        order_index: test_case.order_index,
        is_hidden: test_case.is_hidden,
        passed,
        status,
        actual: normalize_output(actual).to_string(),
        expected: normalize_output(&test_case.expected_output).to_string(),
        error,
        time: Some(result.time),
        memory: Some(result.memory),
        tier,
    }
}

/// Parse raw stdout and compare in one step.
pub fn evaluate_test(test_case: &TestCase, result: &ExecutionResult) -> TestOutcome {
    let parsed = parser::parse(&result.stdout);
    if !parsed.sentinel_found && result.status.is_success() {
        tracing::debug!(
            test_case_id = test_case.id,
            "Sentinel missing from stdout, using whole output as answer"
        );
    }
    compare(test_case, parsed.answer, result)
}

/// Aggregate outcomes (already in presentation order) into a verdict.
///
/// - passed_count = number of passed outcomes
/// - accepted iff every outcome passed
/// - time and memory are summed across outcomes: total sandbox cost, not peak
pub fn aggregate(outcomes: Vec<TestOutcome>) -> SubmissionVerdict {
    let total_count = outcomes.len();
    let passed_count = outcomes.iter().filter(|o| o.passed).count();
    let total_time: Millis = outcomes.iter().filter_map(|o| o.time).sum();
    let total_memory: Kilobytes = outcomes.iter().filter_map(|o| o.memory).sum();

    let verdict = if passed_count == total_count {
        Verdict::Accepted
    } else {
        Verdict::WrongAnswer
    };

    SubmissionVerdict {
        verdict,
        passed_count,
        total_count,
        total_time,
        total_memory,
        outcomes,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_common::types::ErrorTier;

    fn make_test_case(id: u32, expected_output: &str) -> TestCase {
        TestCase {
            id,
            input: "input".to_string(),
            expected_output: expected_output.to_string(),
            is_hidden: false,
            order_index: id as i32,
        }
    }

    fn make_result(stdout: &str, time_ms: u64) -> ExecutionResult {
        ExecutionResult {
            stdout: stdout.to_string(),
            stderr: String::new(),
            compile_output: String::new(),
            status: ExecutionStatus::Completed,
            time: Millis(time_ms),
            memory: Kilobytes(1024),
        }
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output("hello"), "hello");
        assert_eq!(normalize_output("  hello  "), "hello");
        assert_eq!(normalize_output("\nhello\n"), "hello");
        assert_eq!(normalize_output("   "), "");
    }

    #[test]
    fn test_exact_match_passes() {
        let outcome = compare(&make_test_case(1, "[1,2,3]"), "[1,2,3]", &make_result("", 42));
        assert!(outcome.passed);
        assert_eq!(outcome.status, OutcomeStatus::Passed);
        assert_eq!(outcome.time, Some(Millis(42)));
        assert_eq!(outcome.tier, ErrorTier::NotApplicable);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_mismatch_is_wrong_answer() {
        let outcome = compare(&make_test_case(1, "[1,2,3]"), "[3,2,1]", &make_result("", 5));
        assert!(!outcome.passed);
        assert_eq!(outcome.status, OutcomeStatus::WrongAnswer);
        assert_eq!(outcome.actual, "[3,2,1]");
        assert_eq!(outcome.tier, ErrorTier::Ok);
    }

    #[test]
    fn test_whitespace_variants_do_not_match() {
        // No structural equality: formatting must be canonical
        let outcome = compare(&make_test_case(1, "[1,2,3]"), "[1, 2, 3]", &make_result("", 5));
        assert!(!outcome.passed);
    }

    #[test]
    fn test_case_sensitivity() {
        let outcome = compare(&make_test_case(1, "Hello"), "hello", &make_result("", 5));
        assert!(!outcome.passed);
    }

    #[test]
    fn test_stderr_fails_matching_answer() {
        let mut result = make_result("", 5);
        result.stderr = "warning: deprecated call\n".to_string();
        let outcome = compare(&make_test_case(1, "ok"), "ok", &result);
        assert!(!outcome.passed);
        assert_eq!(outcome.status, OutcomeStatus::UnexpectedStderr);
        assert_eq!(outcome.error.as_deref(), Some("warning: deprecated call\n"));
    }

    #[test]
    fn test_whitespace_only_stderr_still_fails() {
        let mut result = make_result("", 5);
        result.stderr = "\n".to_string();
        let outcome = compare(&make_test_case(1, "ok"), "ok", &result);
        assert!(!outcome.passed);
    }

    #[test]
    fn test_compile_output_fails() {
        let mut result = make_result("", 0);
        result.status = ExecutionStatus::CompilationError;
        result.compile_output = "main.cpp:3:1: error: expected ';'".to_string();
        let outcome = compare(&make_test_case(1, "ok"), "", &result);
        assert_eq!(outcome.status, OutcomeStatus::CompilationError);
        assert_eq!(outcome.tier, ErrorTier::Excellent);
    }

    #[test]
    fn test_timeout() {
        let outcome = compare(
            &make_test_case(1, "[1,2,3]"),
            "",
            &ExecutionResult::timed_out(Millis(2000)),
        );
        assert!(!outcome.passed);
        assert_eq!(outcome.status, OutcomeStatus::TimeLimitExceeded);
        assert_eq!(outcome.error.as_deref(), Some("Time limit exceeded"));
        assert_eq!(outcome.time, Some(Millis(2000)));
    }

    #[test]
    fn test_runtime_error_without_stderr() {
        let mut result = make_result("", 3);
        result.status = ExecutionStatus::RuntimeError { exit_code: 139 };
        let outcome = compare(&make_test_case(1, "x"), "x", &result);
        assert_eq!(outcome.status, OutcomeStatus::RuntimeError);
        assert_eq!(outcome.error.as_deref(), Some("Process exited with code 139"));
        assert_eq!(outcome.tier, ErrorTier::Poor);
    }

    #[test]
    fn test_unknown_status_is_sandbox_failure() {
        let mut result = make_result("", 3);
        result.status = ExecutionStatus::Unknown { code: 99 };
        let outcome = compare(&make_test_case(1, "x"), "x", &result);
        assert!(!outcome.passed);
        assert_eq!(outcome.status, OutcomeStatus::SandboxFailure);
    }

    #[test]
    fn test_empty_expected_output() {
        let tc = make_test_case(1, "");
        assert!(evaluate_test(&tc, &make_result("", 1)).passed);
        assert!(evaluate_test(&tc, &make_result("---CODECOMBAT_RESULT---\n", 1)).passed);
        assert!(evaluate_test(&tc, &make_result("log\n---CODECOMBAT_RESULT---\n  \n", 1)).passed);
        assert!(!evaluate_test(&tc, &make_result("---CODECOMBAT_RESULT---\nnull", 1)).passed);
    }

    #[test]
    fn test_evaluate_test_uses_parsed_answer() {
        let tc = make_test_case(1, "[1,2,3]");
        let outcome = evaluate_test(
            &tc,
            &make_result("reversed: [3,2,1]\n---CODECOMBAT_RESULT---\n[3,2,1]\n", 4),
        );
        assert!(!outcome.passed);
        assert_eq!(outcome.actual, "[3,2,1]");
    }

    #[test]
    fn test_aggregate_all_pass() {
        let outcomes = vec![
            compare(&make_test_case(1, "a"), "a", &make_result("", 10)),
            compare(&make_test_case(2, "b"), "b", &make_result("", 32)),
        ];
        let verdict = aggregate(outcomes);
        assert_eq!(verdict.verdict, Verdict::Accepted);
        assert_eq!(verdict.passed_count, 2);
        assert_eq!(verdict.total_count, 2);
        assert_eq!(verdict.total_time, Millis(42));
        assert_eq!(verdict.total_memory, Kilobytes(2048));
    }

    #[test]
    fn test_aggregate_partial_pass() {
        let outcomes = vec![
            compare(&make_test_case(1, "a"), "a", &make_result("", 10)),
            compare(&make_test_case(2, "b"), "c", &make_result("", 10)),
        ];
        let verdict = aggregate(outcomes);
        assert_eq!(verdict.verdict, Verdict::WrongAnswer);
        assert_eq!(verdict.passed_count, 1);
        assert_eq!(verdict.outcomes[1].status, OutcomeStatus::WrongAnswer);
    }
}
