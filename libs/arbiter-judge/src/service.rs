//! Run and submit entry points.
//!
//! Resolves the problem, picks the time limit and hands off to the [`Judge`].
//! Submit additionally persists the attempt.

use crate::error::JudgeError;
use crate::executor::Judge;
use crate::store::{ProblemStore, SubmissionStore};
use arbiter_common::types::{
    EvaluationMode, Kilobytes, LanguageId, Millis, Problem, SubmissionRecord, SubmissionVerdict,
    TestOutcome, Verdict,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Preview result. Nothing about a run is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub verdict: Verdict,
    pub passed_count: usize,
    pub total_count: usize,
    pub time_ms: Millis,
    pub memory_kb: Kilobytes,
    pub outcomes: Vec<TestOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<SubmissionVerdict> for RunReport {
    fn from(verdict: SubmissionVerdict) -> Self {
        Self {
            verdict: verdict.verdict,
            passed_count: verdict.passed_count,
            total_count: verdict.total_count,
            time_ms: verdict.total_time,
            memory_kb: verdict.total_memory,
            outcomes: verdict.outcomes,
            error: verdict.error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitReport {
    /// `None` when the record could not be persisted.
    pub submission_id: Option<Uuid>,
    #[serde(flatten)]
    pub verdict: SubmissionVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub struct SubmissionService {
    judge: Arc<Judge>,
    problems: Arc<dyn ProblemStore>,
    submissions: Arc<dyn SubmissionStore>,
    default_timeout: Millis,
}

impl SubmissionService {
    pub fn new(
        judge: Arc<Judge>,
        problems: Arc<dyn ProblemStore>,
        submissions: Arc<dyn SubmissionStore>,
        default_timeout: Millis,
    ) -> Self {
        Self {
            judge,
            problems,
            submissions,
            default_timeout,
        }
    }

    pub fn judge(&self) -> &Judge {
        &self.judge
    }

    /// Language is checked before the problem is fetched, so an unsupported
    /// language never touches the store.
    async fn resolve(&self, language: &LanguageId, problem_id: &str) -> Result<Problem, JudgeError> {
        self.judge.registry().lookup(language)?;
        self.problems
            .load_problem(problem_id)
            .await?
            .ok_or_else(|| JudgeError::ProblemNotFound(problem_id.to_string()))
    }

    fn timeout_for(&self, problem: &Problem) -> Millis {
        problem.time_limit_ms.unwrap_or(self.default_timeout)
    }

    #[tracing::instrument(skip(self, source_code, language, problem_id), fields(problem_id = %problem_id, language = %language))]
    pub async fn run(
        &self,
        source_code: &str,
        language: &LanguageId,
        problem_id: &str,
    ) -> Result<RunReport, JudgeError> {
        let problem = self.resolve(language, problem_id).await?;
        let verdict = self
            .judge
            .evaluate(
                language,
                source_code,
                &problem.test_cases,
                self.timeout_for(&problem),
                EvaluationMode::Run,
            )
            .await?;
        Ok(RunReport::from(verdict))
    }

    /// Evaluate against every test case and persist the attempt.
    ///
    /// A failed save does not discard the verdict; it comes back with a
    /// warning and no submission id.
    #[tracing::instrument(skip(self, source_code, language, problem_id), fields(problem_id = %problem_id, language = %language))]
    pub async fn submit(
        &self,
        source_code: &str,
        language: &LanguageId,
        problem_id: &str,
    ) -> Result<SubmitReport, JudgeError> {
        let problem = self.resolve(language, problem_id).await?;
        let verdict = self
            .judge
            .evaluate(
                language,
                source_code,
                &problem.test_cases,
                self.timeout_for(&problem),
                EvaluationMode::Submit,
            )
            .await?;

        let record = SubmissionRecord::new(problem_id, language, source_code, &verdict);
        let (submission_id, warning) = match self.submissions.save(&record).await {
            Ok(id) => {
                info!(submission_id = %id, verdict = %verdict.verdict, "Submission stored");
                (Some(id), None)
            }
            Err(e) => {
                error!(error = %e, "Failed to store submission");
                (None, Some(format!("submission was judged but not saved: {}", e)))
            }
        };

        Ok(SubmitReport {
            submission_id,
            verdict,
            warning,
        })
    }

    pub async fn find_submission(&self, submission_id: &Uuid) -> Result<Option<SubmissionRecord>, JudgeError> {
        Ok(self.submissions.find(submission_id).await?)
    }
}
