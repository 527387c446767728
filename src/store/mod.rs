// src/store/mod.rs

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;

use crate::models::{
    exam_record::{CheatingEvent, ExamResult},
    question::Question,
};

/// Failure of an external collaborator (database, remote store).
#[derive(Debug)]
pub enum StoreError {
    Database(String),
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(msg) => write!(f, "database error: {}", msg),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Supplies the question set of an exam.
#[async_trait]
pub trait QuestionProvider: Send + Sync {
    async fn fetch_questions(&self, exam_id: i64) -> Result<Vec<Question>, StoreError>;
}

/// Durable sink for session outcomes.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Must be idempotent per `session_id`: saving the same result twice
    /// leaves a single row.
    async fn save_result(&self, result: &ExamResult) -> Result<(), StoreError>;

    /// Best effort. Callers do not wait on it and tolerate loss.
    async fn save_cheating_event(&self, event: &CheatingEvent) -> Result<(), StoreError>;
}
