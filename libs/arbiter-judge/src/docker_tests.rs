//! Integration tests for the Docker engine
//!
//! These run the shipped harness templates inside real language images:
//! 1. A correct solution is accepted end to end
//! 2. Console output before the sentinel is ignored
//! 3. Syntax errors and runtime crashes fail the test with their message
//! 4. Infinite loops are cut off at the time limit
//! 5. Each run reports its own peak memory
//!
//! Build the images first (`docker build -t arbiter-python:latest ...`).

#[cfg(test)]
mod docker_engine_tests {
    use crate::docker::DockerEngine;
    use crate::engine::ExecutionClient;
    use crate::executor::{Judge, JudgeSettings};
    use crate::harness::HarnessRegistry;
    use arbiter_common::types::{
        EvaluationMode, Kilobytes, LanguageId, Millis, OutcomeStatus, TestCase, Verdict,
    };
    use std::path::Path;
    use std::sync::Arc;

    fn judge() -> Judge {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/languages.json");
        let registry = HarnessRegistry::load(&path).expect("Failed to load language config");
        let engine = DockerEngine::connect().expect("Failed to connect to Docker");
        Judge::new(
            Arc::new(registry),
            ExecutionClient::new(Arc::new(engine), Millis(1000)),
            JudgeSettings::default(),
        )
    }

    fn reverse_cases() -> Vec<TestCase> {
        vec![
            TestCase {
                id: 1,
                input: "[1,2,3]".to_string(),
                expected_output: "[3,2,1]".to_string(),
                is_hidden: false,
                order_index: 0,
            },
            TestCase {
                id: 2,
                input: "[]".to_string(),
                expected_output: "[]".to_string(),
                is_hidden: true,
                order_index: 1,
            },
        ]
    }

    /// Test: Python solution accepted, debug prints ignored
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_python_reverse_accepted() {
        let code = "def solution(arr):\n    print('debug', arr)\n    return arr[::-1]\n";
        let verdict = judge()
            .evaluate(
                &LanguageId::new("python"),
                code,
                &reverse_cases(),
                Millis(5000),
                EvaluationMode::Submit,
            )
            .await
            .expect("evaluation failed");

        assert_eq!(verdict.verdict, Verdict::Accepted, "{:?}", verdict);
        assert_eq!(verdict.passed_count, 2);
        // Peak RSS of a python interpreter, measured per run
        assert!(verdict.outcomes.iter().all(|o| o.memory > Some(Kilobytes(1024))));
    }

    /// Test: JavaScript syntax error fails every test with its message
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_javascript_syntax_error() {
        let code = "function solution(arr) { return arr.reverse( }";
        let verdict = judge()
            .evaluate(
                &LanguageId::new("javascript"),
                code,
                &reverse_cases(),
                Millis(5000),
                EvaluationMode::Submit,
            )
            .await
            .expect("evaluation failed");

        assert_eq!(verdict.verdict, Verdict::WrongAnswer);
        for outcome in &verdict.outcomes {
            assert!(!outcome.passed);
            assert!(outcome.error.as_deref().unwrap_or("").contains("SyntaxError"));
        }
    }

    /// Test: C++ compile error is reported as such
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_cpp_compile_error() {
        let code = "std::string solution(const std::string& input) { return input }";
        let verdict = judge()
            .evaluate(
                &LanguageId::new("cpp"),
                code,
                &reverse_cases(),
                Millis(5000),
                EvaluationMode::Submit,
            )
            .await
            .expect("evaluation failed");

        assert_eq!(verdict.outcomes[0].status, OutcomeStatus::CompilationError);
    }

    /// Test: infinite loop is cut off
    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_python_infinite_loop() {
        let code = "def solution(arr):\n    while True:\n        pass\n";
        let verdict = judge()
            .evaluate(
                &LanguageId::new("python"),
                code,
                &reverse_cases()[..1],
                Millis(2000),
                EvaluationMode::Submit,
            )
            .await
            .expect("evaluation failed");

        assert_eq!(verdict.verdict, Verdict::WrongAnswer);
        assert_eq!(verdict.outcomes[0].status, OutcomeStatus::TimeLimitExceeded);
    }
}
