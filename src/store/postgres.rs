// src/store/postgres.rs

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    models::{
        exam_record::{CheatingEvent, ExamResult},
        question::{Question, QuestionRow},
    },
    store::{PersistenceGateway, QuestionProvider, StoreError},
};

/// Reads questions from the 'exam_questions' table.
#[derive(Clone)]
pub struct PgQuestionBank {
    pool: PgPool,
}

impl PgQuestionBank {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionProvider for PgQuestionBank {
    async fn fetch_questions(&self, exam_id: i64) -> Result<Vec<Question>, StoreError> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, text, options, correct_option
            FROM exam_questions
            WHERE exam_id = $1
            ORDER BY position, id
            "#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch questions for exam {}: {:?}", exam_id, e);
            StoreError::from(e)
        })?;

        Ok(rows.into_iter().map(Question::from).collect())
    }
}

/// Writes results and cheating events to Postgres.
#[derive(Clone)]
pub struct PgPersistence {
    pool: PgPool,
}

impl PgPersistence {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceGateway for PgPersistence {
    async fn save_result(&self, result: &ExamResult) -> Result<(), StoreError> {
        // A retried save after a lost acknowledgement hits the unique
        // session_id and inserts nothing.
        sqlx::query(
            r#"
            INSERT INTO exam_results (
                session_id, student_id, exam_id, score, max_score,
                correct_count, total_questions, cheating_attempts,
                reason, started_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (session_id) DO NOTHING
            "#,
        )
        .bind(result.session_id)
        .bind(result.student_id)
        .bind(result.exam_id)
        .bind(result.score)
        .bind(result.max_score)
        .bind(result.correct_count as i32)
        .bind(result.total_questions as i32)
        .bind(result.cheating_attempts as i32)
        .bind(result.reason.as_str())
        .bind(result.started_at)
        .bind(result.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_cheating_event(&self, event: &CheatingEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO cheating_events (session_id, reason, attempt, detected_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(event.session_id)
        .bind(event.reason.as_str())
        .bind(event.attempt as i32)
        .bind(event.detected_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
