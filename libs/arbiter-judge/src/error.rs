//! Error types for the judge pipeline.
//!
//! Only request-level and configuration-level failures are errors. Per-test
//! problems (timeouts, crashes, wrong answers) become failed outcomes, and a
//! sandbox that cannot be reached becomes a verdict of `error`.

use crate::injector::InjectionError;
use crate::store::StoreError;
use arbiter_common::types::LanguageId;

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    /// No harness is registered for the language. Nothing was executed.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(LanguageId),

    /// The harness template is malformed. A configuration bug, caught at
    /// startup in any correctly deployed instance.
    #[error("harness template for {language} is malformed: {source}")]
    Injection {
        language: LanguageId,
        #[source]
        source: InjectionError,
    },

    #[error("problem not found: {0}")]
    ProblemNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The execution layer failed as a whole: the sandbox is unreachable, crashed,
/// or refused the request. Escalates the submission to a verdict of `error`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionFault {
    #[error("sandbox unavailable: {0}")]
    Unavailable(String),

    #[error("sandbox returned an unreadable response: {0}")]
    Protocol(String),

    #[error("{what} exceeds maximum size of {limit} bytes")]
    InputTooLarge { what: &'static str, limit: usize },

    #[error("sandbox misconfigured for {language}: {reason}")]
    Misconfigured { language: LanguageId, reason: String },
}
