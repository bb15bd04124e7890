//! Execution Engine - Abstraction for Code Execution
//!
//! **Core Responsibility:**
//! Prepare one executable unit per submission, then run it with one stdin per
//! test case and capture raw outputs.
//!
//! **Critical Architectural Boundary:**
//! - Engine knows HOW to execute (Docker, remote sandbox, test doubles)
//! - Engine does NOT parse answers
//! - Engine does NOT evaluate correctness
//! - Engine returns raw outputs for the Evaluator to judge
//!
//! **Two phases, two limits:**
//! 1. `prepare` (image pull, sandbox start, compile) runs under the setup
//!    budget. Overrunning it is the sandbox's fault, never the program's.
//! 2. `run` is wrapped by `ExecutionClient` in the hard wall-clock limit, so a
//!    hung program turns into a Time Limit Exceeded result instead of a stuck
//!    submission.

use crate::docker::DockerEngine;
use crate::error::ExecutionFault;
use crate::harness::LanguageConfig;
use crate::remote::RemoteEngine;
use arbiter_common::config::{Config, EngineKind};
use arbiter_common::types::{ExecutionRequest, ExecutionResult, Millis};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Safety limits to prevent pathological inputs from reaching the sandbox
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_TEST_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Setup budget used when none is configured: a cold image pull plus a compile.
pub const DEFAULT_SETUP_LIMIT: Millis = Millis(300_000);

fn check_source_size(source: &str) -> Result<(), ExecutionFault> {
    if source.len() > MAX_SOURCE_CODE_BYTES {
        return Err(ExecutionFault::InputTooLarge {
            what: "Source code",
            limit: MAX_SOURCE_CODE_BYTES,
        });
    }
    Ok(())
}

/// Reject oversized requests before they cost a sandbox slot.
pub fn check_request_size(request: &ExecutionRequest<'_>) -> Result<(), ExecutionFault> {
    check_source_size(request.source)?;
    if request.stdin.len() > MAX_TEST_INPUT_BYTES {
        return Err(ExecutionFault::InputTooLarge {
            what: "Test input",
            limit: MAX_TEST_INPUT_BYTES,
        });
    }
    Ok(())
}

/// What preparing a unit produced.
pub enum Prepared {
    Ready(Box<dyn PreparedUnit>),
    /// The unit never got to run, e.g. it failed to compile. This result
    /// stands in for every test case.
    Rejected(ExecutionResult),
}

/// A sandbox able to set up one program for repeated runs.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn prepare(&self, language: &LanguageConfig, source: &str) -> Result<Prepared, ExecutionFault>;
}

/// A prepared program, run once per test case.
///
/// Implementations report a timed-out run as `Ok` with
/// `ExecutionStatus::TimeLimitExceeded`; `Err` is reserved for the sandbox
/// itself failing.
#[async_trait]
pub trait PreparedUnit: Send + Sync {
    async fn run(&self, request: &ExecutionRequest<'_>) -> Result<ExecutionResult, ExecutionFault>;

    /// Wall time the sandbox spends around the program on every run, on top
    /// of the program's own limit.
    fn run_overhead(&self) -> Duration {
        Duration::ZERO
    }
}

/// Build the engine selected by configuration.
pub fn from_config(config: &Config) -> Result<Arc<dyn ExecutionEngine>, ExecutionFault> {
    match config.engine {
        EngineKind::Docker => Ok(Arc::new(DockerEngine::connect()?)),
        EngineKind::Remote => Ok(Arc::new(RemoteEngine::new(
            &config.sandbox_url,
            config.sandbox_token.clone(),
        )?)),
    }
}

/// Execution client used by the orchestrator.
///
/// No retries at this layer: a timed-out program usually times out again.
#[derive(Clone)]
pub struct ExecutionClient {
    engine: Arc<dyn ExecutionEngine>,
    grace: Duration,
    setup_limit: Duration,
}

impl ExecutionClient {
    /// `grace` is added on top of each request's timeout before the client
    /// gives up on a run, leaving the engine room to enforce the limit
    /// itself and report real timings.
    pub fn new(engine: Arc<dyn ExecutionEngine>, grace: Millis) -> Self {
        Self {
            engine,
            grace: grace.as_duration(),
            setup_limit: DEFAULT_SETUP_LIMIT.as_duration(),
        }
    }

    pub fn with_setup_limit(mut self, limit: Millis) -> Self {
        self.setup_limit = limit.as_duration();
        self
    }

    #[tracing::instrument(skip(self, language, source), fields(language = %language.name))]
    pub async fn prepare(&self, language: &LanguageConfig, source: &str) -> Result<Prepared, ExecutionFault> {
        check_source_size(source)?;

        let start = Instant::now();
        match tokio::time::timeout(self.setup_limit, self.engine.prepare(language, source)).await {
            Ok(prepared) => {
                debug!(setup_ms = Millis::from_duration(start.elapsed()).get(), "Sandbox prepared");
                prepared
            }
            Err(_) => {
                let limit = Millis::from_duration(self.setup_limit);
                warn!(setup_limit_ms = limit.get(), "Sandbox setup exceeded its budget");
                Err(ExecutionFault::Unavailable(format!(
                    "sandbox setup did not finish within {}",
                    limit
                )))
            }
        }
    }

    #[tracing::instrument(
        skip(self, unit, request),
        fields(language = %request.language, timeout_ms = request.timeout.get())
    )]
    pub async fn execute(
        &self,
        unit: &dyn PreparedUnit,
        request: &ExecutionRequest<'_>,
    ) -> Result<ExecutionResult, ExecutionFault> {
        check_request_size(request)?;

        let limit = request.timeout.as_duration() + self.grace + unit.run_overhead();
        let start = Instant::now();

        match tokio::time::timeout(limit, unit.run(request)).await {
            Ok(Ok(result)) => {
                debug!(status = ?result.status, time_ms = result.time.get(), "Execution finished");
                Ok(result)
            }
            Ok(Err(fault)) => Err(fault),
            Err(_) => {
                let elapsed = Millis::from_duration(start.elapsed());
                warn!(elapsed_ms = elapsed.get(), "Sandbox exceeded hard time limit");
                Ok(ExecutionResult::timed_out(elapsed))
            }
        }
    }
}
