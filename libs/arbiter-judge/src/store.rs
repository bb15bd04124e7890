//! Problem and submission collaborators.
//!
//! The pipeline only reads test cases and writes submission records; where
//! they live is someone else's concern. Redis backs the deployed service, the
//! in-memory store backs tests and the CLI.

use arbiter_common::redis as keys;
use arbiter_common::types::{Problem, SubmissionRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ProblemStore: Send + Sync {
    async fn load_problem(&self, problem_id: &str) -> Result<Option<Problem>, StoreError>;
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Persist a record and return its identifier.
    async fn save(&self, record: &SubmissionRecord) -> Result<Uuid, StoreError>;

    async fn find(&self, submission_id: &Uuid) -> Result<Option<SubmissionRecord>, StoreError>;
}

/// Redis-backed store for both problems and submissions
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
    submission_ttl_secs: u64,
}

impl RedisStore {
    pub async fn connect(redis_url: &str, submission_ttl_secs: u64) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            submission_ttl_secs,
        })
    }

    pub fn connection(&self) -> redis::aio::ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl ProblemStore for RedisStore {
    async fn load_problem(&self, problem_id: &str) -> Result<Option<Problem>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::get_problem(&mut conn, problem_id).await?)
    }
}

#[async_trait]
impl SubmissionStore for RedisStore {
    async fn save(&self, record: &SubmissionRecord) -> Result<Uuid, StoreError> {
        let mut conn = self.conn.clone();
        keys::store_submission(&mut conn, record, self.submission_ttl_secs).await?;
        Ok(record.id)
    }

    async fn find(&self, submission_id: &Uuid) -> Result<Option<SubmissionRecord>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(keys::get_submission(&mut conn, submission_id).await?)
    }
}

/// In-process store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    problems: RwLock<HashMap<String, Problem>>,
    submissions: RwLock<HashMap<Uuid, SubmissionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_problem(problem: Problem) -> Self {
        let store = Self::new();
        store.insert_problem(problem);
        store
    }

    pub fn insert_problem(&self, problem: Problem) {
        if let Ok(mut problems) = self.problems.write() {
            problems.insert(problem.id.clone(), problem);
        }
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.read().map(|s| s.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

#[async_trait]
impl ProblemStore for MemoryStore {
    async fn load_problem(&self, problem_id: &str) -> Result<Option<Problem>, StoreError> {
        let problems = self.problems.read().map_err(poisoned)?;
        Ok(problems.get(problem_id).cloned())
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn save(&self, record: &SubmissionRecord) -> Result<Uuid, StoreError> {
        let mut submissions = self.submissions.write().map_err(poisoned)?;
        submissions.insert(record.id, record.clone());
        Ok(record.id)
    }

    async fn find(&self, submission_id: &Uuid) -> Result<Option<SubmissionRecord>, StoreError> {
        let submissions = self.submissions.read().map_err(poisoned)?;
        Ok(submissions.get(submission_id).cloned())
    }
}
