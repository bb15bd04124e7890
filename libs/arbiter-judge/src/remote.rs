//! Client for a Judge0-compatible remote sandbox.
//!
//! Each execution is one synchronous `POST /submissions?wait=true` call; the
//! sandbox compiles per call, so preparing a unit only checks that the
//! language can be sent. Payloads travel base64-encoded so arbitrary bytes
//! survive the JSON round trip.

use crate::engine::{ExecutionEngine, Prepared, PreparedUnit};
use crate::error::ExecutionFault;
use crate::harness::LanguageConfig;
use arbiter_common::types::{
    ExecutionRequest, ExecutionResult, ExecutionStatus, Kilobytes, LanguageId, Millis,
};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Queueing and the per-call compile on the sandbox side.
const REMOTE_OVERHEAD: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RemoteSubmission {
    source_code: String,
    language_id: u32,
    stdin: String,
    /// Seconds
    cpu_time_limit: f64,
    /// Seconds
    wall_time_limit: f64,
    /// Kilobytes
    memory_limit: u64,
}

#[derive(Debug, Deserialize)]
struct RemoteStatus {
    id: i64,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct RemoteResult {
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    message: Option<String>,
    status: RemoteStatus,
    /// Seconds, as a decimal string
    time: Option<String>,
    /// Kilobytes
    memory: Option<u64>,
}

/// Map the remote sandbox's status ids onto our vocabulary.
///
/// 1/2 (queued, processing) mean the program never ran and 13 means the
/// sandbox itself broke; both are faults. Ids we do not know are kept as
/// `Unknown` and fail the test generically.
pub fn status_from_remote(id: i64) -> Result<ExecutionStatus, ExecutionFault> {
    match id {
        1 | 2 => Err(ExecutionFault::Protocol(format!(
            "sandbox answered before the run finished (status {})",
            id
        ))),
        // 3 = Accepted, 4 = Wrong Answer (only when the sandbox compares; we never send expected output)
        3 | 4 => Ok(ExecutionStatus::Completed),
        5 => Ok(ExecutionStatus::TimeLimitExceeded),
        6 => Ok(ExecutionStatus::CompilationError),
        // 7-12 = signals, NZEC and other runtime errors; 14 = exec format error
        7..=12 | 14 => Ok(ExecutionStatus::RuntimeError { exit_code: id }),
        13 => Err(ExecutionFault::Unavailable("sandbox internal error".to_string())),
        other => Ok(ExecutionStatus::Unknown { code: other }),
    }
}

fn decode_field(field: Option<String>) -> Result<String, ExecutionFault> {
    match field {
        None => Ok(String::new()),
        Some(encoded) => {
            // The sandbox wraps base64 output at 60 columns
            let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            let bytes = general_purpose::STANDARD
                .decode(compact)
                .map_err(|e| ExecutionFault::Protocol(format!("invalid base64 in response: {}", e)))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

fn parse_seconds(time: Option<&str>) -> Millis {
    time.and_then(|t| t.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| Millis((secs * 1000.0).round() as u64))
        .unwrap_or_default()
}

fn into_execution_result(remote: RemoteResult) -> Result<ExecutionResult, ExecutionFault> {
    let message = decode_field(remote.message)?;
    let status = status_from_remote(remote.status.id).map_err(|fault| match fault {
        ExecutionFault::Unavailable(reason) if !message.trim().is_empty() => {
            ExecutionFault::Unavailable(format!("{}: {}", reason, message.trim()))
        }
        other => other,
    })?;
    let mut stderr = decode_field(remote.stderr)?;

    // Internal sandbox messages ride along on stderr for statuses we do not recognize
    if let ExecutionStatus::Unknown { .. } = status {
        if stderr.is_empty() && !message.is_empty() {
            stderr = message;
        } else if stderr.is_empty() {
            stderr = remote.status.description.clone();
        }
    }

    Ok(ExecutionResult {
        stdout: decode_field(remote.stdout)?,
        stderr,
        compile_output: decode_field(remote.compile_output)?,
        status,
        time: parse_seconds(remote.time.as_deref()),
        memory: Kilobytes(remote.memory.unwrap_or(0)),
    })
}

/// Decode a `/submissions` response body.
pub(crate) fn parse_response(body: &str) -> Result<ExecutionResult, ExecutionFault> {
    let remote: RemoteResult =
        serde_json::from_str(body).map_err(|e| ExecutionFault::Protocol(e.to_string()))?;

    debug!(
        remote_status = remote.status.id,
        description = %remote.status.description,
        "Remote execution finished"
    );

    into_execution_result(remote)
}

pub struct RemoteEngine {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteEngine {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ExecutionFault> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ExecutionFault::Unavailable(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl ExecutionEngine for RemoteEngine {
    async fn prepare(&self, language: &LanguageConfig, _source: &str) -> Result<Prepared, ExecutionFault> {
        let language_id = language
            .remote_language_id
            .ok_or_else(|| ExecutionFault::Misconfigured {
                language: LanguageId::new(&language.name),
                reason: "no remote_language_id in languages.json".to_string(),
            })?;

        Ok(Prepared::Ready(Box::new(RemoteUnit {
            http: self.http.clone(),
            url: format!("{}/submissions?base64_encoded=true&wait=true", self.base_url),
            token: self.token.clone(),
            language_id,
            memory_limit_kb: u64::from(language.memory_limit_mb) * 1024,
        })))
    }
}

/// One language on the remote sandbox. Every run sends the full source.
struct RemoteUnit {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
    language_id: u32,
    memory_limit_kb: u64,
}

impl RemoteUnit {
    fn submission(&self, request: &ExecutionRequest<'_>) -> RemoteSubmission {
        let seconds = request.timeout.get() as f64 / 1000.0;
        RemoteSubmission {
            source_code: general_purpose::STANDARD.encode(request.source),
            language_id: self.language_id,
            stdin: general_purpose::STANDARD.encode(request.stdin),
            cpu_time_limit: seconds,
            wall_time_limit: seconds * 2.0,
            memory_limit: self.memory_limit_kb,
        }
    }
}

#[async_trait]
impl PreparedUnit for RemoteUnit {
    #[tracing::instrument(skip(self, request), fields(language = %request.language))]
    async fn run(&self, request: &ExecutionRequest<'_>) -> Result<ExecutionResult, ExecutionFault> {
        let mut http_request = self.http.post(&self.url).json(&self.submission(request));
        if let Some(token) = &self.token {
            http_request = http_request.header("X-Auth-Token", token);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| ExecutionFault::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExecutionFault::Unavailable(e.to_string()))?;
        if !status.is_success() {
            return Err(ExecutionFault::Unavailable(format!(
                "sandbox answered {}: {}",
                status,
                body.trim()
            )));
        }

        parse_response(&body)
    }

    fn run_overhead(&self) -> Duration {
        REMOTE_OVERHEAD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(s: &str) -> Option<String> {
        Some(general_purpose::STANDARD.encode(s))
    }

    #[test]
    fn test_status_mapping() {
        let status = |id| status_from_remote(id).unwrap();
        assert_eq!(status(3), ExecutionStatus::Completed);
        assert_eq!(status(5), ExecutionStatus::TimeLimitExceeded);
        assert_eq!(status(6), ExecutionStatus::CompilationError);
        assert_eq!(status(11), ExecutionStatus::RuntimeError { exit_code: 11 });
        assert_eq!(status(42), ExecutionStatus::Unknown { code: 42 });
    }

    #[test]
    fn test_unfinished_and_broken_sandbox_are_faults() {
        assert!(matches!(status_from_remote(1), Err(ExecutionFault::Protocol(_))));
        assert!(matches!(status_from_remote(2), Err(ExecutionFault::Protocol(_))));
        assert!(matches!(status_from_remote(13), Err(ExecutionFault::Unavailable(_))));
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds(Some("0.012")), Millis(12));
        assert_eq!(parse_seconds(Some("1.5")), Millis(1500));
        assert_eq!(parse_seconds(Some("nope")), Millis(0));
        assert_eq!(parse_seconds(None), Millis(0));
    }

    #[test]
    fn test_decode_wrapped_base64() {
        let wrapped = "LS0tQ09ERUNPTUJBVF9SRVNVTFQtLS0K\nWzEsMiwzXQ==\n".to_string();
        assert_eq!(
            decode_field(Some(wrapped)).unwrap(),
            "---CODECOMBAT_RESULT---\n[1,2,3]"
        );
        assert!(decode_field(Some("***".to_string())).is_err());
    }

    #[test]
    fn test_into_execution_result() {
        let remote = RemoteResult {
            stdout: encode("---CODECOMBAT_RESULT---\n[1]\n"),
            stderr: None,
            compile_output: None,
            message: None,
            status: RemoteStatus {
                id: 3,
                description: "Accepted".to_string(),
            },
            time: Some("0.031".to_string()),
            memory: Some(2048),
        };
        let result = into_execution_result(remote).unwrap();
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.stdout, "---CODECOMBAT_RESULT---\n[1]\n");
        assert_eq!(result.time, Millis(31));
        assert_eq!(result.memory, Kilobytes(2048));
    }

    #[test]
    fn test_internal_error_carries_message() {
        let remote = RemoteResult {
            stdout: None,
            stderr: None,
            compile_output: None,
            message: encode("box crashed"),
            status: RemoteStatus {
                id: 13,
                description: "Internal Error".to_string(),
            },
            time: None,
            memory: None,
        };
        let err = into_execution_result(remote).unwrap_err();
        assert!(matches!(&err, ExecutionFault::Unavailable(reason) if reason.contains("box crashed")));
    }

    #[test]
    fn test_unknown_status_carries_message() {
        let remote = RemoteResult {
            stdout: None,
            stderr: None,
            compile_output: None,
            message: encode("odd status"),
            status: RemoteStatus {
                id: 42,
                description: "Mystery".to_string(),
            },
            time: None,
            memory: None,
        };
        let result = into_execution_result(remote).unwrap();
        assert_eq!(result.status, ExecutionStatus::Unknown { code: 42 });
        assert_eq!(result.stderr, "odd status");
    }

    #[test]
    fn test_parse_response_body() {
        let body = r#"{"stdout":"WzFd","stderr":null,"compile_output":null,"message":null,
            "status":{"id":3,"description":"Accepted"},"time":"0.004","memory":812}"#;
        let result = parse_response(body).unwrap();
        assert_eq!(result.stdout, "[1]");
        assert_eq!(result.memory, Kilobytes(812));

        assert!(matches!(parse_response("<html>"), Err(ExecutionFault::Protocol(_))));
    }

    #[tokio::test]
    async fn test_missing_remote_language_id() {
        let harness = crate::harness::test_harness("python", "{{USER_CODE}}");
        let engine = RemoteEngine::new("http://sandbox.invalid", None).unwrap();
        let err = match engine.prepare(&harness.config, "print(1)").await {
            Err(err) => err,
            Ok(_) => panic!("language without a remote id should not prepare"),
        };
        assert!(matches!(err, ExecutionFault::Misconfigured { .. }));
    }
}
