//! Submission evaluation pipeline.
//!
//! A submission is a function body in one of the configured languages. It is
//! injected into that language's harness template, executed once per test case
//! in a sandbox, and judged from the answer the harness prints after the
//! result sentinel.

pub mod classifier;
pub mod docker;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod harness;
pub mod injector;
pub mod metrics;
pub mod parser;
pub mod remote;
pub mod service;
pub mod store;

#[cfg(test)]
mod testing;

mod docker_tests;

pub use error::{ExecutionFault, JudgeError};
pub use executor::{Judge, JudgeSettings};
pub use harness::HarnessRegistry;
pub use service::{RunReport, SubmissionService, SubmitReport};
