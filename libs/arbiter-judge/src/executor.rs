//! Submission Orchestrator
//!
//! **Responsibility:**
//! Drive every selected test case of one submission through
//! inject → execute → parse → compare, then aggregate into one verdict.
//!
//! **Architecture:**
//! 1. Look up the harness and build the executable unit once (harness.rs, injector.rs)
//! 2. Prepare the unit in the sandbox once, compiling it if needed (engine.rs)
//! 3. Execute test cases concurrently through the ExecutionClient
//! 4. Judge each result with the Evaluator (evaluator.rs)
//! 5. Reassemble outcomes in `order_index` order and aggregate
//!
//! Outcomes are keyed by their slot in the ordered selection, never by arrival
//! order, so the verdict is the same whichever execution finishes first.
//! Dropping the returned future drops every in-flight execution with it.

use crate::engine::{ExecutionClient, Prepared, PreparedUnit};
use crate::error::{ExecutionFault, JudgeError};
use crate::evaluator;
use crate::harness::{Harness, HarnessRegistry};
use crate::metrics;
use arbiter_common::config::Config;
use arbiter_common::types::{
    EvaluationMode, ExecutionRequest, ExecutionResult, LanguageId, Millis, SubmissionVerdict, TestCase,
    TestOutcome,
};
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct JudgeSettings {
    /// Visible test cases evaluated by a `run`
    pub run_preview_count: usize,
    /// Test cases of one submission executing at the same time
    pub max_parallel_tests: usize,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            run_preview_count: 3,
            max_parallel_tests: 4,
        }
    }
}

impl From<&Config> for JudgeSettings {
    fn from(config: &Config) -> Self {
        Self {
            run_preview_count: config.run_preview_count,
            max_parallel_tests: config.max_parallel_tests.max(1),
        }
    }
}

pub struct Judge {
    registry: Arc<HarnessRegistry>,
    client: ExecutionClient,
    settings: JudgeSettings,
}

impl Judge {
    pub fn new(registry: Arc<HarnessRegistry>, client: ExecutionClient, settings: JudgeSettings) -> Self {
        Self {
            registry,
            client,
            settings,
        }
    }

    pub fn registry(&self) -> &HarnessRegistry {
        &self.registry
    }

    /// Test cases a mode evaluates, in presentation order.
    ///
    /// `submit` takes everything; `run` takes the first visible ones up to the
    /// preview count. Equal `order_index` values keep their input order.
    pub fn select_test_cases<'a>(&self, test_cases: &'a [TestCase], mode: EvaluationMode) -> Vec<&'a TestCase> {
        let mut ordered: Vec<&TestCase> = test_cases.iter().collect();
        ordered.sort_by_key(|tc| tc.order_index);

        match mode {
            EvaluationMode::Submit => ordered,
            EvaluationMode::Run => ordered
                .into_iter()
                .filter(|tc| !tc.is_hidden)
                .take(self.settings.run_preview_count)
                .collect(),
        }
    }

    /// Evaluate `source_code` against `test_cases`.
    ///
    /// Returns `Err` only for request or configuration problems, before any
    /// execution. Everything that goes wrong while executing is reported
    /// inside the verdict.
    #[tracing::instrument(
        skip(self, language, source_code, test_cases, mode),
        fields(language = %language, mode = mode.as_str(), test_count = test_cases.len())
    )]
    pub async fn evaluate(
        &self,
        language: &LanguageId,
        source_code: &str,
        test_cases: &[TestCase],
        timeout: Millis,
        mode: EvaluationMode,
    ) -> Result<SubmissionVerdict, JudgeError> {
        let started = Instant::now();
        let harness = self.registry.lookup(language)?;

        let unit = harness.template.inject(source_code).map_err(|source| {
            error!(error = %source, "Harness template is malformed");
            JudgeError::Injection {
                language: language.clone(),
                source,
            }
        })?;

        let selected = self.select_test_cases(test_cases, mode);
        let verdict = if selected.is_empty() {
            warn!("No test cases to evaluate");
            SubmissionVerdict::failed("no test cases to evaluate")
        } else {
            match self.run_all(&harness, &unit, &selected, timeout).await {
                Ok(outcomes) => evaluator::aggregate(outcomes),
                Err(fault) => {
                    error!(error = %fault, "Execution layer failed, discarding partial outcomes");
                    SubmissionVerdict::failed(fault.to_string())
                }
            }
        };

        metrics::SUBMISSIONS_TOTAL
            .with_label_values(&[mode.as_str(), verdict.verdict.as_str()])
            .inc();
        metrics::EVALUATION_SECONDS
            .with_label_values(&[mode.as_str()])
            .observe(started.elapsed().as_secs_f64());

        info!(
            verdict = %verdict.verdict,
            passed = verdict.passed_count,
            total = verdict.total_count,
            time_ms = verdict.total_time.get(),
            memory_kb = verdict.total_memory.get(),
            "Evaluation finished"
        );

        Ok(verdict)
    }

    /// Execute and judge every selected test case, at most
    /// `max_parallel_tests` at a time. The first sandbox fault aborts the rest.
    async fn run_all(
        &self,
        harness: &Harness,
        source: &str,
        selected: &[&TestCase],
        timeout: Millis,
    ) -> Result<Vec<TestOutcome>, ExecutionFault> {
        let unit = match self.client.prepare(&harness.config, source).await? {
            Prepared::Ready(unit) => unit,
            Prepared::Rejected(result) => {
                debug!(status = ?result.status, "Unit rejected before running");
                return Ok(selected.iter().map(|tc| judge_test(tc, &result)).collect());
            }
        };

        let client = &self.client;
        let runner: &dyn PreparedUnit = unit.as_ref();

        let pending: Vec<_> = selected
            .iter()
            .enumerate()
            .map(|(slot, test_case)| async move {
                let request = ExecutionRequest {
                    language: &harness.language,
                    source,
                    stdin: &test_case.input,
                    timeout,
                };
                (slot, client.execute(runner, &request).await)
            })
            .collect();
        let mut executions = stream::iter(pending).buffer_unordered(self.settings.max_parallel_tests.max(1));

        let mut outcomes = BTreeMap::new();
        while let Some((slot, result)) = executions.next().await {
            let result = result?;
            outcomes.insert(slot, judge_test(selected[slot], &result));
        }

        Ok(outcomes.into_values().collect())
    }
}

fn judge_test(test_case: &TestCase, result: &ExecutionResult) -> TestOutcome {
    let outcome = evaluator::evaluate_test(test_case, result);

    metrics::TEST_EXECUTIONS_TOTAL
        .with_label_values(&[outcome.status.as_str()])
        .inc();

    if outcome.passed {
        debug!(test_case_id = test_case.id, time_ms = result.time.get(), "Test passed");
    } else {
        debug!(
            test_case_id = test_case.id,
            status = outcome.status.as_str(),
            tier = %outcome.tier,
            "Test failed"
        );
    }

    outcome
}
