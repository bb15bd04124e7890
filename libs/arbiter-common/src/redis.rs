use crate::types::{Problem, SubmissionRecord};
use redis::{AsyncCommands, RedisResult};

/// Redis key scheme shared by the API and the CLI.
/// Keys are deterministic so both sides always agree on where a problem or a
/// submission lives.

pub const PROBLEM_PREFIX: &str = "arbiter:problem";
pub const SUBMISSION_PREFIX: &str = "arbiter:submission";

/// Key holding a problem's test cases
pub fn problem_key(problem_id: &str) -> String {
    format!("{}:{}", PROBLEM_PREFIX, problem_id)
}

/// Key holding a persisted submission record
pub fn submission_key(submission_id: &uuid::Uuid) -> String {
    format!("{}:{}", SUBMISSION_PREFIX, submission_id)
}

fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

fn deserialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "deserialization error", e.to_string()))
}

/// Store a problem definition. Problems do not expire.
pub async fn put_problem(
    conn: &mut redis::aio::ConnectionManager,
    problem: &Problem,
) -> RedisResult<()> {
    let payload = serde_json::to_string(problem).map_err(serialization_error)?;
    conn.set(problem_key(&problem.id), payload).await
}

/// Load a problem definition
pub async fn get_problem(
    conn: &mut redis::aio::ConnectionManager,
    problem_id: &str,
) -> RedisResult<Option<Problem>> {
    let payload: Option<String> = conn.get(problem_key(problem_id)).await?;

    match payload {
        Some(data) => {
            let problem: Problem = serde_json::from_str(&data).map_err(deserialization_error)?;
            Ok(Some(problem))
        }
        None => Ok(None),
    }
}

/// Persist a submission record with the given TTL
pub async fn store_submission(
    conn: &mut redis::aio::ConnectionManager,
    record: &SubmissionRecord,
    ttl_seconds: u64,
) -> RedisResult<()> {
    let payload = serde_json::to_string(record).map_err(serialization_error)?;
    let _: () = conn.set_ex(submission_key(&record.id), payload, ttl_seconds).await?;
    Ok(())
}

/// Retrieve a persisted submission record
pub async fn get_submission(
    conn: &mut redis::aio::ConnectionManager,
    submission_id: &uuid::Uuid,
) -> RedisResult<Option<SubmissionRecord>> {
    let payload: Option<String> = conn.get(submission_key(submission_id)).await?;

    match payload {
        Some(data) => {
            let record: SubmissionRecord =
                serde_json::from_str(&data).map_err(deserialization_error)?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_problem_key() {
        assert_eq!(problem_key("two-sum"), "arbiter:problem:two-sum");
        assert_eq!(problem_key("42"), "arbiter:problem:42");
    }

    #[test]
    fn test_submission_key_deterministic() {
        let id = Uuid::new_v4();
        let key1 = submission_key(&id);
        let key2 = submission_key(&id);
        assert_eq!(key1, key2);
        assert!(key1.starts_with("arbiter:submission:"));
        assert!(key1.contains(&id.to_string()));
    }
}
