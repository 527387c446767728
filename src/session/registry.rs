// src/session/registry.rs

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use tokio::sync::{RwLock, broadcast::error::RecvError};
use uuid::Uuid;

use crate::session::{
    coordinator::{ExamSession, SessionDeps, SessionEvent, SessionStatus},
    error::SessionError,
    integrity::HostVisibility,
    policy::SessionPolicy,
    time::TimeSource,
};
use crate::store::{PersistenceGateway, QuestionProvider};

/// A live session plus the visibility state its page reports.
#[derive(Clone)]
pub struct SessionEntry {
    pub session: ExamSession,
    pub visibility: Arc<HostVisibility>,
}

#[derive(Default)]
struct Slots {
    sessions: HashMap<Uuid, SessionEntry>,
    /// Every (student, exam) pair that has opened an attempt. Closing or
    /// evicting a session leaves its pair here.
    attempts: HashSet<(i64, i64)>,
}

/// All sessions known to this process, keyed by session id.
///
/// A student gets a single attempt per exam. Finished sessions are evicted
/// after `SessionPolicy::completed_retention`; the attempt stays used.
#[derive(Clone)]
pub struct SessionRegistry {
    slots: Arc<RwLock<Slots>>,
    policy: SessionPolicy,
    questions: Arc<dyn QuestionProvider>,
    gateway: Arc<dyn PersistenceGateway>,
    time: Arc<dyn TimeSource>,
}

impl SessionRegistry {
    pub fn new(
        policy: SessionPolicy,
        questions: Arc<dyn QuestionProvider>,
        gateway: Arc<dyn PersistenceGateway>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            slots: Arc::default(),
            policy,
            questions,
            gateway,
            time,
        }
    }

    /// Registers a new, not yet started session.
    pub async fn open(&self, student_id: i64, exam_id: i64) -> Result<SessionEntry, SessionError> {
        let mut slots = self.slots.write().await;
        if !slots.attempts.insert((student_id, exam_id)) {
            return Err(SessionError::AttemptExists {
                student_id,
                exam_id,
            });
        }

        let visibility = Arc::new(HostVisibility::default());
        let session = ExamSession::new(
            student_id,
            exam_id,
            self.policy.clone(),
            SessionDeps {
                questions: self.questions.clone(),
                gateway: self.gateway.clone(),
                time: self.time.clone(),
                probe: visibility.clone(),
            },
        );
        let entry = SessionEntry {
            session,
            visibility,
        };
        slots.sessions.insert(entry.session.id(), entry.clone());
        drop(slots);

        self.evict_when_completed(&entry.session);
        tracing::info!(
            session_id = %entry.session.id(),
            student_id,
            exam_id,
            "Session opened"
        );
        Ok(entry)
    }

    pub async fn get(&self, id: Uuid) -> Option<SessionEntry> {
        self.slots.read().await.sessions.get(&id).cloned()
    }

    /// Unregisters and tears down a session. The attempt stays used.
    pub async fn remove(&self, id: Uuid) -> Option<SessionEntry> {
        let entry = self.slots.write().await.sessions.remove(&id)?;
        entry.session.teardown().await;
        Some(entry)
    }

    /// Drops a session that never started and gives its attempt back.
    /// Started sessions are left alone.
    pub async fn release(&self, id: Uuid) -> bool {
        let mut slots = self.slots.write().await;
        let Some(entry) = slots.sessions.get(&id) else {
            return false;
        };
        if entry.session.status().await != SessionStatus::NotStarted {
            return false;
        }

        let key = (entry.session.student_id(), entry.session.exam_id());
        slots.attempts.remove(&key);
        slots.sessions.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.sessions.len()
    }

    fn evict_when_completed(&self, session: &ExamSession) {
        let id = session.id();
        let mut events = session.subscribe();
        let slots: Weak<RwLock<Slots>> = Arc::downgrade(&self.slots);
        let retention = self.policy.completed_retention;

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Completed { .. }) => break,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    // The session was dropped.
                    Err(RecvError::Closed) => return,
                }
            }
            drop(events);

            tokio::time::sleep(retention).await;
            let Some(slots) = slots.upgrade() else {
                return;
            };
            if slots.write().await.sessions.remove(&id).is_some() {
                tracing::debug!(session_id = %id, "Evicted completed session");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        models::{exam_record::SubmitReason, question::Question},
        session::time::ManualTime,
        store::memory::{MemoryPersistence, MemoryQuestionBank},
    };

    fn registry_with(policy: SessionPolicy) -> SessionRegistry {
        let bank = MemoryQuestionBank::with_exam(
            1,
            vec![Question::new(1, "Q1", vec!["A".into(), "B".into()], 0)],
        );
        SessionRegistry::new(
            policy,
            Arc::new(bank),
            Arc::new(MemoryPersistence::default()),
            Arc::new(ManualTime::default()),
        )
    }

    fn registry() -> SessionRegistry {
        registry_with(SessionPolicy::default())
    }

    #[tokio::test]
    async fn test_single_attempt_per_student_and_exam() {
        let registry = registry();
        registry.open(10, 1).await.unwrap();

        let err = registry.open(10, 1).await.err().unwrap();
        assert!(matches!(
            err,
            SessionError::AttemptExists {
                student_id: 10,
                exam_id: 1
            }
        ));

        // Other students and other exams are unaffected.
        registry.open(11, 1).await.unwrap();
        registry.open(10, 2).await.unwrap();
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn test_remove_tears_down_but_keeps_the_attempt() {
        let registry = registry();
        let entry = registry.open(10, 1).await.unwrap();
        entry.session.start().await.unwrap();

        assert!(registry.remove(entry.session.id()).await.is_some());
        assert!(registry.get(entry.session.id()).await.is_none());
        assert!(matches!(
            registry.open(10, 1).await,
            Err(SessionError::AttemptExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_release_only_frees_unstarted_attempts() {
        let registry = registry();
        let unstarted = registry.open(10, 1).await.unwrap();
        assert!(registry.release(unstarted.session.id()).await);
        assert_eq!(registry.len().await, 0);

        let started = registry.open(10, 1).await.unwrap();
        started.session.start().await.unwrap();
        assert!(!registry.release(started.session.id()).await);
        assert!(registry.get(started.session.id()).await.is_some());
        assert!(registry.open(10, 1).await.is_err());
        started.session.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_sessions_are_evicted_after_retention() {
        let registry = registry_with(SessionPolicy {
            completed_retention: Duration::from_secs(60),
            ..SessionPolicy::default()
        });
        let entry = registry.open(10, 1).await.unwrap();
        let id = entry.session.id();
        entry.session.start().await.unwrap();
        entry.session.submit(SubmitReason::Manual).await.unwrap();
        drop(entry);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(registry.get(id).await.is_some());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(registry.get(id).await.is_none());
        assert_eq!(registry.len().await, 0);
        assert!(matches!(
            registry.open(10, 1).await,
            Err(SessionError::AttemptExists { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_sessions_are_not_evicted() {
        let registry = registry_with(SessionPolicy {
            completed_retention: Duration::from_secs(1),
            ..SessionPolicy::default()
        });
        let entry = registry.open(10, 1).await.unwrap();
        entry.session.start().await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(registry.get(entry.session.id()).await.is_some());
        entry.session.teardown().await;
    }
}
