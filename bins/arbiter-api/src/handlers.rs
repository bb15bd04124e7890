// HTTP route handlers for the Arbiter API

use arbiter_common::types::LanguageId;
use arbiter_judge::metrics as judge_metrics;
use arbiter_judge::{JudgeError, SubmitReport};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub problem_id: String,
    pub language: LanguageId,
    pub source_code: String,
}

#[derive(Debug, Serialize)]
pub struct LanguageInfo {
    pub name: LanguageId,
    pub version: String,
}

/// Request-level failure rendered as `{ "error": ... }`.
pub struct ApiError(JudgeError);

impl From<JudgeError> for ApiError {
    fn from(err: JudgeError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            JudgeError::UnsupportedLanguage(_) => StatusCode::BAD_REQUEST,
            JudgeError::ProblemNotFound(_) => StatusCode::NOT_FOUND,
            JudgeError::Injection { .. } | JudgeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            warn!(error = %self.0, "Request rejected");
        }
        (
            status,
            Json(serde_json::json!({
                "error": self.0.to_string()
            })),
        )
            .into_response()
    }
}

/// Hidden test cases report pass/fail and status only.
fn redact_hidden(mut report: SubmitReport) -> SubmitReport {
    report.verdict.outcomes = report
        .verdict
        .outcomes
        .iter()
        .map(|o| if o.is_hidden { o.redacted() } else { o.clone() })
        .collect();
    report
}

/// POST /run - Evaluate against the visible preview test cases
pub async fn run(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EvaluateRequest>,
) -> Result<Response, ApiError> {
    let report = state
        .service
        .run(&payload.source_code, &payload.language, &payload.problem_id)
        .await?;

    info!(
        problem_id = %payload.problem_id,
        language = %payload.language,
        verdict = %report.verdict,
        "Run finished"
    );

    Ok((StatusCode::OK, Json(report)).into_response())
}

/// POST /submit - Evaluate against every test case and persist
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<EvaluateRequest>,
) -> Result<Response, ApiError> {
    let report = state
        .service
        .submit(&payload.source_code, &payload.language, &payload.problem_id)
        .await?;

    info!(
        problem_id = %payload.problem_id,
        language = %payload.language,
        verdict = %report.verdict.verdict,
        submission_id = ?report.submission_id,
        "Submission judged"
    );

    let status = if report.submission_id.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(redact_hidden(report))).into_response())
}

/// GET /submissions/{id} - Fetch a stored submission
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(submission_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = match Uuid::parse_str(&submission_id) {
        Ok(id) => id,
        Err(_) => {
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": "Invalid submission ID format"
                })),
            )
                .into_response());
        }
    };

    match state.service.find_submission(&id).await? {
        Some(record) => Ok((StatusCode::OK, Json(record)).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": format!("submission not found: {}", id)
            })),
        )
            .into_response()),
    }
}

/// GET /languages - Languages with a registered harness
pub async fn list_languages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.service.judge().registry();
    let mut languages: Vec<LanguageInfo> = registry
        .harnesses()
        .map(|h| LanguageInfo {
            name: h.language.clone(),
            version: h.config.version.clone(),
        })
        .collect();
    languages.sort_by(|a, b| a.name.cmp(&b.name));

    Json(languages)
}

/// GET /health - Liveness probe
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn metrics() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        judge_metrics::gather(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_common::types::{
        ExecutionRequest, ExecutionResult, ExecutionStatus, Kilobytes, Millis, Problem, TestCase,
    };
    use arbiter_judge::engine::{ExecutionClient, ExecutionEngine, Prepared, PreparedUnit};
    use arbiter_judge::harness::{Harness, HarnessTemplate, LanguageConfig, LanguageExecution};
    use arbiter_judge::store::MemoryStore;
    use arbiter_judge::{ExecutionFault, HarnessRegistry, Judge, JudgeSettings, SubmissionService};
    use async_trait::async_trait;

    /// Answers every test with its own input, like an identity solution.
    struct EchoEngine;

    #[async_trait]
    impl ExecutionEngine for EchoEngine {
        async fn prepare(&self, _language: &LanguageConfig, _source: &str) -> Result<Prepared, ExecutionFault> {
            Ok(Prepared::Ready(Box::new(EchoEngine)))
        }
    }

    #[async_trait]
    impl PreparedUnit for EchoEngine {
        async fn run(&self, request: &ExecutionRequest<'_>) -> Result<ExecutionResult, ExecutionFault> {
            Ok(ExecutionResult {
                stdout: format!("---CODECOMBAT_RESULT---\n{}\n", request.stdin),
                stderr: String::new(),
                compile_output: String::new(),
                status: ExecutionStatus::Completed,
                time: Millis(3),
                memory: Kilobytes(512),
            })
        }
    }

    fn state() -> Arc<AppState> {
        let harness = Harness::new(
            LanguageConfig {
                name: "python".to_string(),
                version: "3.12".to_string(),
                image: "arbiter-python:latest".to_string(),
                execution: LanguageExecution {
                    file_name: "main.py".to_string(),
                    compile: None,
                    run: "python3 /code/main.py".to_string(),
                },
                memory_limit_mb: 128,
                cpu_limit: 0.5,
                remote_language_id: None,
                template: "harness/python.py".to_string(),
            },
            HarnessTemplate::new("{{USER_CODE}}").unwrap(),
        );
        let registry = HarnessRegistry::from_harnesses(vec![harness]).unwrap();
        let judge = Judge::new(
            Arc::new(registry),
            ExecutionClient::new(Arc::new(EchoEngine), Millis(100)),
            JudgeSettings::default(),
        );

        let case = |id: u32, hidden: bool| TestCase {
            id,
            input: format!("[{}]", id),
            expected_output: format!("[{}]", id),
            is_hidden: hidden,
            order_index: id as i32,
        };
        let store = Arc::new(MemoryStore::with_problem(Problem {
            id: "echo".to_string(),
            time_limit_ms: None,
            test_cases: vec![case(1, false), case(2, true)],
        }));

        Arc::new(AppState {
            service: Arc::new(SubmissionService::new(
                Arc::new(judge),
                store.clone(),
                store,
                Millis(5000),
            )),
        })
    }

    fn request(language: &str, problem_id: &str) -> Json<EvaluateRequest> {
        Json(EvaluateRequest {
            problem_id: problem_id.to_string(),
            language: LanguageId::new(language),
            source_code: "def solution(x):\n    return x\n".to_string(),
        })
    }

    #[tokio::test]
    async fn test_submit_redacts_hidden_outcomes() {
        let state = state();
        let response = submit(State(state.clone()), request("python", "echo"))
            .await
            .unwrap_or_else(|e| e.into_response());
        assert_eq!(response.status(), StatusCode::CREATED);

        let report = state
            .service
            .submit("x", &LanguageId::new("python"), "echo")
            .await
            .unwrap();
        let redacted = redact_hidden(report);
        let hidden = redacted.verdict.outcomes.iter().find(|o| o.is_hidden).unwrap();
        assert!(hidden.passed);
        assert!(hidden.actual.is_empty());
        assert!(hidden.expected.is_empty());
        let visible = redacted.verdict.outcomes.iter().find(|o| !o.is_hidden).unwrap();
        assert_eq!(visible.actual, "[1]");
    }

    #[tokio::test]
    async fn test_run_ok() {
        let response = run(State(state()), request("python", "echo"))
            .await
            .unwrap_or_else(|e| e.into_response());
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let unsupported = run(State(state()), request("cobol", "echo"))
            .await
            .unwrap_or_else(|e| e.into_response());
        assert_eq!(unsupported.status(), StatusCode::BAD_REQUEST);

        let missing = run(State(state()), request("python", "nope"))
            .await
            .unwrap_or_else(|e| e.into_response());
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_submission() {
        let bad = get_submission(State(state()), Path("not-a-uuid".to_string()))
            .await
            .unwrap_or_else(|e| e.into_response());
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let unknown = get_submission(State(state()), Path(Uuid::new_v4().to_string()))
            .await
            .unwrap_or_else(|e| e.into_response());
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    }
}
