// src/store/memory.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    models::{
        exam_record::{CheatingEvent, ExamResult},
        question::Question,
    },
    store::{PersistenceGateway, QuestionProvider, StoreError},
};

/// Question sets held in memory, keyed by exam id.
#[derive(Debug, Default)]
pub struct MemoryQuestionBank {
    exams: RwLock<HashMap<i64, Vec<Question>>>,
}

impl MemoryQuestionBank {
    pub fn with_exam(exam_id: i64, questions: Vec<Question>) -> Self {
        Self {
            exams: RwLock::new(HashMap::from([(exam_id, questions)])),
        }
    }
}

#[async_trait]
impl QuestionProvider for MemoryQuestionBank {
    async fn fetch_questions(&self, exam_id: i64) -> Result<Vec<Question>, StoreError> {
        Ok(self
            .exams
            .read()
            .await
            .get(&exam_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// In-memory persistence with injectable failures and latency.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    results: RwLock<HashMap<Uuid, ExamResult>>,
    events: RwLock<Vec<CheatingEvent>>,
    save_calls: AtomicUsize,
    failures_left: AtomicU32,
    latency: Duration,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `save_result` sleeps this long before answering.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// The next `n` calls to `save_result` fail.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub async fn results(&self) -> Vec<ExamResult> {
        self.results.read().await.values().cloned().collect()
    }

    pub async fn cheating_events(&self) -> Vec<CheatingEvent> {
        self.events.read().await.clone()
    }

    /// Calls to `save_result`, successful or not.
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceGateway for MemoryPersistence {
    async fn save_result(&self, result: &ExamResult) -> Result<(), StoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }

        self.results
            .write()
            .await
            .entry(result.session_id)
            .or_insert_with(|| result.clone());
        Ok(())
    }

    async fn save_cheating_event(&self, event: &CheatingEvent) -> Result<(), StoreError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::exam_record::SubmitReason;

    fn result(score: f64) -> ExamResult {
        ExamResult {
            session_id: Uuid::nil(),
            student_id: 1,
            exam_id: 1,
            score,
            max_score: 3.0,
            correct_count: score as u32,
            total_questions: 3,
            cheating_attempts: 0,
            reason: SubmitReason::Manual,
            started_at: Utc::now(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_result_is_idempotent_per_session() {
        let store = MemoryPersistence::new();
        store.save_result(&result(1.0)).await.unwrap();
        store.save_result(&result(2.0)).await.unwrap();

        let rows = store.results().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score, 1.0);
        assert_eq!(store.save_calls(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_run_out() {
        let store = MemoryPersistence::new();
        store.fail_next(2);

        assert!(store.save_result(&result(1.0)).await.is_err());
        assert!(store.save_result(&result(1.0)).await.is_err());
        assert!(store.save_result(&result(1.0)).await.is_ok());
        assert_eq!(store.results().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_exam_has_no_questions() {
        let bank = MemoryQuestionBank::with_exam(1, vec![Question::new(1, "Q", vec![], 0)]);
        assert!(bank.fetch_questions(2).await.unwrap().is_empty());
        assert_eq!(bank.fetch_questions(1).await.unwrap().len(), 1);
    }
}
