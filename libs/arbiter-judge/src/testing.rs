// Scripted execution engine shared by the orchestrator and service tests

use crate::engine::{ExecutionEngine, Prepared, PreparedUnit};
use crate::error::ExecutionFault;
use crate::harness::{test_harness, Harness, LanguageConfig};
use crate::parser::SENTINEL;
use arbiter_common::types::{ExecutionRequest, ExecutionResult, ExecutionStatus, Kilobytes, Millis};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) struct Reply {
    pub delay: Duration,
    pub result: Result<ExecutionResult, ExecutionFault>,
}

impl Reply {
    pub fn now(result: ExecutionResult) -> Self {
        Self::after(Duration::ZERO, result)
    }

    pub fn after(delay: Duration, result: ExecutionResult) -> Self {
        Self {
            delay,
            result: Ok(result),
        }
    }

    pub fn fault(fault: ExecutionFault) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(fault),
        }
    }
}

type Script = dyn Fn(&ExecutionRequest<'_>) -> Reply + Send + Sync;

enum Setup {
    Ready,
    Reject(ExecutionResult),
    Fail(ExecutionFault),
}

struct Counters {
    script: Box<Script>,
    prepares: AtomicUsize,
    calls: AtomicUsize,
    finished: AtomicUsize,
    last_timeout: Mutex<Option<Millis>>,
}

/// Engine that answers from a closure instead of running anything.
pub(crate) struct ScriptedEngine {
    counters: Arc<Counters>,
    setup_delay: Duration,
    setup: Setup,
}

impl ScriptedEngine {
    pub fn new(script: impl Fn(&ExecutionRequest<'_>) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            counters: Arc::new(Counters {
                script: Box::new(script),
                prepares: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
                finished: AtomicUsize::new(0),
                last_timeout: Mutex::new(None),
            }),
            setup_delay: Duration::ZERO,
            setup: Setup::Ready,
        }
    }

    /// Behaves like an identity solution: the answer is the input.
    pub fn echo() -> Self {
        Self::new(|request| Reply::now(completed(answer(request.stdin))))
    }

    /// Spend `delay` preparing before any run starts.
    pub fn with_setup_delay(mut self, delay: Duration) -> Self {
        self.setup_delay = delay;
        self
    }

    /// Refuse the unit at prepare time with `result`, as a failed compile does.
    pub fn rejecting(mut self, result: ExecutionResult) -> Self {
        self.setup = Setup::Reject(result);
        self
    }

    pub fn failing_setup(mut self, fault: ExecutionFault) -> Self {
        self.setup = Setup::Fail(fault);
        self
    }

    /// Units prepared.
    pub fn prepares(&self) -> usize {
        self.counters.prepares.load(Ordering::SeqCst)
    }

    /// Executions started.
    pub fn calls(&self) -> usize {
        self.counters.calls.load(Ordering::SeqCst)
    }

    /// Executions that ran to the end of their delay.
    pub fn finished(&self) -> usize {
        self.counters.finished.load(Ordering::SeqCst)
    }

    pub fn last_timeout(&self) -> Option<Millis> {
        *self.counters.last_timeout.lock().unwrap()
    }
}

#[async_trait]
impl ExecutionEngine for ScriptedEngine {
    async fn prepare(&self, _language: &LanguageConfig, _source: &str) -> Result<Prepared, ExecutionFault> {
        self.counters.prepares.fetch_add(1, Ordering::SeqCst);
        if !self.setup_delay.is_zero() {
            tokio::time::sleep(self.setup_delay).await;
        }

        match &self.setup {
            Setup::Ready => Ok(Prepared::Ready(Box::new(ScriptedUnit {
                counters: self.counters.clone(),
            }))),
            Setup::Reject(result) => Ok(Prepared::Rejected(result.clone())),
            Setup::Fail(fault) => Err(fault.clone()),
        }
    }
}

struct ScriptedUnit {
    counters: Arc<Counters>,
}

#[async_trait]
impl PreparedUnit for ScriptedUnit {
    async fn run(&self, request: &ExecutionRequest<'_>) -> Result<ExecutionResult, ExecutionFault> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        *self.counters.last_timeout.lock().unwrap() = Some(request.timeout);

        let reply = (self.counters.script)(request);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }

        self.counters.finished.fetch_add(1, Ordering::SeqCst);
        reply.result
    }
}

/// Stdout of a harness that printed `value` as its answer.
pub(crate) fn answer(value: &str) -> String {
    format!("{}\n{}\n", SENTINEL, value)
}

/// Clean run with the given stdout.
pub(crate) fn completed(stdout: impl Into<String>) -> ExecutionResult {
    ExecutionResult {
        stdout: stdout.into(),
        stderr: String::new(),
        compile_output: String::new(),
        status: ExecutionStatus::Completed,
        time: Millis(5),
        memory: Kilobytes(1024),
    }
}

/// Harness whose template is the bare placeholder.
pub(crate) fn echo_harness(name: &str) -> Harness {
    test_harness(name, "{{USER_CODE}}")
}
