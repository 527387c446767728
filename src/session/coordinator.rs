// src/session/coordinator.rs

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    models::{
        exam_record::{CheatingEvent, CheatingReason, ExamResult, SubmitReason},
        question::PublicQuestion,
    },
    session::{
        CommandOutcome,
        answers::AnswerStore,
        clock::{ClockEvent, SessionClock},
        error::SessionError,
        integrity::{Detection, IntegrityMonitor, IntegritySignal, VisibilityProbe},
        policy::SessionPolicy,
        scoring,
        sequencer::QuestionSequencer,
        time::{TimeSource, remaining_until},
    },
    store::{PersistenceGateway, QuestionProvider, StoreError},
};

/// Lifecycle of a session. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Submitting,
    Completed,
}

/// Broadcast to anyone following the session (e.g. the SSE stream).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Started { deadline_at: DateTime<Utc> },
    Tick { remaining_ms: u64 },
    Expired,
    CheatingDetected { reason: CheatingReason, attempts: u32 },
    Submitting { reason: SubmitReason },
    Completed { result: ExamResult },
    PersistenceFailed { message: String },
}

/// Outcome of a submission request.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// This call finalized the session.
    Finalized(ExamResult),
    /// Another trigger got there first, or the session is not running.
    Ignored,
}

/// Point-in-time view of a session for the caller to render.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub student_id: i64,
    pub exam_id: i64,
    pub status: SessionStatus,
    pub current_question: Option<PublicQuestion>,
    pub current_index: usize,
    pub total_questions: usize,
    pub remaining_ms: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub deadline_at: Option<DateTime<Utc>>,
    pub cheating_attempts: u32,
    /// Set after a cheating episode until the student acknowledges it.
    pub pending_acknowledgement: bool,
    pub answers: BTreeMap<i64, usize>,
    pub result: Option<ExamResult>,
    /// Last save failure while the session is stuck in SUBMITTING.
    pub persistence_error: Option<String>,
}

/// External collaborators of a session.
#[derive(Clone)]
pub struct SessionDeps {
    pub questions: Arc<dyn QuestionProvider>,
    pub gateway: Arc<dyn PersistenceGateway>,
    pub time: Arc<dyn TimeSource>,
    pub probe: Arc<dyn VisibilityProbe>,
}

/// Handle to one student's attempt. Cloning shares the same session.
#[derive(Clone)]
pub struct ExamSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: Uuid,
    student_id: i64,
    exam_id: i64,
    policy: SessionPolicy,
    deps: SessionDeps,
    events: broadcast::Sender<SessionEvent>,
    state: Mutex<SessionState>,
}

struct SessionState {
    status: SessionStatus,
    starting: bool,
    started_at: Option<DateTime<Utc>>,
    deadline_at: Option<DateTime<Utc>>,
    sequencer: QuestionSequencer,
    answers: AnswerStore,
    clock: SessionClock,
    monitor: IntegrityMonitor,
    /// A save_result call is in flight.
    saving: bool,
    /// Computed but not yet persisted.
    pending_result: Option<ExamResult>,
    result: Option<ExamResult>,
    persistence_error: Option<String>,
}

impl SessionState {
    fn advance(&mut self, to: SessionStatus) {
        debug_assert!(
            to > self.status,
            "status moved backwards: {:?} -> {:?}",
            self.status,
            to
        );
        self.status = to;
    }

    fn accepting_answers(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::InProgress && self.deadline_at.is_some_and(|d| now < d)
    }
}

impl ExamSession {
    pub fn new(student_id: i64, exam_id: i64, policy: SessionPolicy, deps: SessionDeps) -> Self {
        let (events, _rx) = broadcast::channel(256);
        let monitor = IntegrityMonitor::new(policy.integrity.clone());

        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                student_id,
                exam_id,
                policy,
                deps,
                events,
                state: Mutex::new(SessionState {
                    status: SessionStatus::NotStarted,
                    starting: false,
                    started_at: None,
                    deadline_at: None,
                    sequencer: QuestionSequencer::default(),
                    answers: AnswerStore::default(),
                    clock: SessionClock::new(),
                    monitor,
                    saving: false,
                    pending_result: None,
                    result: None,
                    persistence_error: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn student_id(&self) -> i64 {
        self.inner.student_id
    }

    pub fn exam_id(&self) -> i64 {
        self.inner.exam_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.state.lock().await.status
    }

    /// Fetches and shuffles the questions, fixes the deadline, and starts the
    /// clock and the integrity monitor.
    pub async fn start(&self) -> Result<CommandOutcome, SessionError> {
        {
            let mut st = self.inner.state.lock().await;
            if st.status != SessionStatus::NotStarted || st.starting {
                return Ok(CommandOutcome::Ignored);
            }
            st.starting = true;
        }

        let fetched = self
            .inner
            .deps
            .questions
            .fetch_questions(self.inner.exam_id)
            .await;

        let mut st = self.inner.state.lock().await;
        st.starting = false;
        let questions = fetched.map_err(SessionError::Provider)?;
        if questions.is_empty() {
            return Err(SessionError::EmptyQuestionSet {
                exam_id: self.inner.exam_id,
            });
        }

        let now = self.inner.deps.time.now();
        let deadline_at = TimeDelta::from_std(self.inner.policy.duration)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .ok_or(SessionError::InvalidDuration)?;

        st.answers = AnswerStore::new(&questions);
        st.sequencer.initialize(questions, &mut rand::thread_rng());
        st.started_at = Some(now);
        st.deadline_at = Some(deadline_at);
        st.advance(SessionStatus::InProgress);
        st.monitor.activate();
        self.start_clock(&mut st, deadline_at);
        self.start_polling(&mut st);
        let total = st.sequencer.len();
        drop(st);

        info!(
            session_id = %self.inner.id,
            student_id = self.inner.student_id,
            exam_id = self.inner.exam_id,
            total_questions = total,
            %deadline_at,
            "Session started"
        );
        let _ = self.inner.events.send(SessionEvent::Started { deadline_at });
        Ok(CommandOutcome::Applied)
    }

    /// Records the student's choice. Ignored unless the session is running
    /// and the deadline has not passed.
    pub async fn answer(
        &self,
        question_id: i64,
        option_index: usize,
    ) -> Result<CommandOutcome, SessionError> {
        let mut st = self.inner.state.lock().await;
        let now = self.inner.deps.time.now();
        if !st.accepting_answers(now) {
            return Ok(CommandOutcome::Ignored);
        }
        st.answers.record(question_id, option_index, now)
    }

    pub async fn next(&self) -> CommandOutcome {
        let mut st = self.inner.state.lock().await;
        if st.status != SessionStatus::InProgress {
            return CommandOutcome::Ignored;
        }
        st.sequencer.next().into()
    }

    pub async fn previous(&self) -> CommandOutcome {
        let mut st = self.inner.state.lock().await;
        if st.status != SessionStatus::InProgress {
            return CommandOutcome::Ignored;
        }
        st.sequencer.previous().into()
    }

    /// Feeds a focus/visibility signal from the host page.
    /// `Applied` means the signal opened a new cheating episode.
    pub async fn report_signal(&self, signal: IntegritySignal) -> CommandOutcome {
        let now = self.inner.deps.time.now();
        let detection = {
            let mut st = self.inner.state.lock().await;
            if st.status != SessionStatus::InProgress {
                return CommandOutcome::Ignored;
            }
            st.monitor.observe(signal.into(), now)
        };

        let opened = matches!(detection, Detection::Episode { .. });
        self.apply_detection(detection, now);
        opened.into()
    }

    /// Clears the pending cheating acknowledgement.
    pub async fn acknowledge(&self) -> CommandOutcome {
        let mut st = self.inner.state.lock().await;
        if st.status != SessionStatus::InProgress {
            return CommandOutcome::Ignored;
        }
        st.monitor.acknowledge().into()
    }

    /// Finalizes the session. Only the first trigger to find the session
    /// IN_PROGRESS gets past the guard; every other one is absorbed.
    pub async fn submit(&self, reason: SubmitReason) -> Result<Submission, SessionError> {
        let result = {
            let mut st = self.inner.state.lock().await;
            if st.status != SessionStatus::InProgress {
                debug!(
                    session_id = %self.inner.id,
                    reason = reason.as_str(),
                    status = ?st.status,
                    "Submission absorbed"
                );
                return Ok(Submission::Ignored);
            }
            st.advance(SessionStatus::Submitting);
            st.clock.stop();
            st.monitor.stop();
            st.answers.freeze();
            st.sequencer.freeze();

            let answers = st.answers.snapshot();
            let score = scoring::score(
                st.sequencer.questions(),
                &answers,
                &self.inner.policy.scoring,
            );
            let now = self.inner.deps.time.now();
            let result = ExamResult {
                session_id: self.inner.id,
                student_id: self.inner.student_id,
                exam_id: self.inner.exam_id,
                score: score.score,
                max_score: score.max_score,
                correct_count: score.correct_count as u32,
                total_questions: st.sequencer.len() as u32,
                cheating_attempts: st.monitor.attempts(),
                reason,
                started_at: st.started_at.unwrap_or(now),
                completed_at: now,
            };
            st.pending_result = Some(result.clone());
            st.saving = true;
            result
        };

        info!(
            session_id = %self.inner.id,
            reason = reason.as_str(),
            "Submitting session"
        );
        let _ = self.inner.events.send(SessionEvent::Submitting { reason });
        self.persist(result).await.map(Submission::Finalized)
    }

    /// Re-sends the retained result after a failed save.
    pub async fn retry_persistence(&self) -> Result<Submission, SessionError> {
        let result = {
            let mut st = self.inner.state.lock().await;
            if st.status != SessionStatus::Submitting || st.saving {
                return Ok(Submission::Ignored);
            }
            let Some(result) = st.pending_result.clone() else {
                return Ok(Submission::Ignored);
            };
            st.saving = true;
            result
        };

        info!(session_id = %self.inner.id, "Retrying result save");
        self.persist(result).await.map(Submission::Finalized)
    }

    /// Cancels the clock and the integrity poller without finalizing.
    pub async fn teardown(&self) {
        let mut st = self.inner.state.lock().await;
        st.clock.stop();
        st.monitor.stop();
        debug!(session_id = %self.inner.id, status = ?st.status, "Session torn down");
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let st = self.inner.state.lock().await;
        let now = self.inner.deps.time.now();

        SessionSnapshot {
            session_id: self.inner.id,
            student_id: self.inner.student_id,
            exam_id: self.inner.exam_id,
            status: st.status,
            current_question: st.sequencer.current_question().map(PublicQuestion::from),
            current_index: st.sequencer.current_index(),
            total_questions: st.sequencer.len(),
            remaining_ms: st
                .deadline_at
                .map(|d| remaining_until(d, now).as_millis() as u64),
            started_at: st.started_at,
            deadline_at: st.deadline_at,
            cheating_attempts: st.monitor.attempts(),
            pending_acknowledgement: st.monitor.pending_acknowledgement(),
            answers: st.answers.snapshot(),
            result: st.result.clone(),
            persistence_error: st.persistence_error.clone(),
        }
    }

    async fn persist(&self, result: ExamResult) -> Result<ExamResult, SessionError> {
        let saved = self.save_with_retry(&result).await;

        let mut st = self.inner.state.lock().await;
        st.saving = false;
        match saved {
            Ok(()) => {
                st.advance(SessionStatus::Completed);
                st.pending_result = None;
                st.persistence_error = None;
                st.result = Some(result.clone());
                drop(st);

                info!(
                    session_id = %self.inner.id,
                    score = result.score,
                    max_score = result.max_score,
                    cheating_attempts = result.cheating_attempts,
                    reason = result.reason.as_str(),
                    "Session completed"
                );
                let _ = self.inner.events.send(SessionEvent::Completed {
                    result: result.clone(),
                });
                Ok(result)
            }
            Err(e) => {
                st.persistence_error = Some(e.to_string());
                drop(st);

                error!(session_id = %self.inner.id, "Failed to save result: {}", e);
                let _ = self.inner.events.send(SessionEvent::PersistenceFailed {
                    message: e.to_string(),
                });
                Err(SessionError::Persistence(e))
            }
        }
    }

    async fn save_with_retry(&self, result: &ExamResult) -> Result<(), StoreError> {
        let retry = &self.inner.policy.retry;
        let mut attempt = 1;
        loop {
            match self.inner.deps.gateway.save_result(result).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < retry.max_attempts => {
                    let delay = retry.backoff(attempt);
                    warn!(
                        session_id = %self.inner.id,
                        attempt,
                        "Saving result failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn start_clock(&self, st: &mut SessionState, deadline_at: DateTime<Utc>) {
        let weak = Arc::downgrade(&self.inner);
        st.clock.start(
            deadline_at,
            self.inner.policy.tick_interval,
            self.inner.deps.time.clone(),
            move |event| {
                let Some(inner) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                match event {
                    ClockEvent::Tick { remaining } => {
                        let _ = inner.events.send(SessionEvent::Tick {
                            remaining_ms: remaining.as_millis() as u64,
                        });
                    }
                    ClockEvent::Expired => {
                        info!(session_id = %inner.id, "Deadline reached");
                        let _ = inner.events.send(SessionEvent::Expired);
                        ExamSession { inner }.spawn_submit(SubmitReason::Timeout);
                    }
                }
                ControlFlow::Continue(())
            },
        );
    }

    fn start_polling(&self, st: &mut SessionState) {
        let weak = Arc::downgrade(&self.inner);
        st.monitor
            .start_polling(self.inner.deps.probe.clone(), move |hidden| {
                let Some(inner) = weak.upgrade() else {
                    return ControlFlow::Break(());
                };
                let session = ExamSession { inner };
                let now = session.inner.deps.time.now();

                // A busy session skips this poll; the next one still sees
                // the visible -> hidden transition.
                let detection = match session.inner.state.try_lock() {
                    Ok(mut st) if st.status == SessionStatus::InProgress => {
                        st.monitor.observe_poll(hidden, now)
                    }
                    Ok(_) => return ControlFlow::Break(()),
                    Err(_) => return ControlFlow::Continue(()),
                };
                session.apply_detection(detection, now);
                ControlFlow::Continue(())
            });
    }

    fn apply_detection(&self, detection: Detection, now: DateTime<Utc>) {
        let Detection::Episode {
            reason,
            attempts,
            threshold_reached,
        } = detection
        else {
            return;
        };

        warn!(
            session_id = %self.inner.id,
            reason = reason.as_str(),
            attempts,
            "Cheating episode detected"
        );
        let _ = self
            .inner
            .events
            .send(SessionEvent::CheatingDetected { reason, attempts });

        let event = CheatingEvent {
            session_id: self.inner.id,
            reason,
            attempt: attempts,
            detected_at: now,
        };
        let gateway = self.inner.deps.gateway.clone();
        tokio::spawn(async move {
            if let Err(e) = gateway.save_cheating_event(&event).await {
                warn!(session_id = %event.session_id, "Cheating event lost: {}", e);
            }
        });

        if threshold_reached {
            warn!(
                session_id = %self.inner.id,
                attempts,
                "Cheating threshold reached, submitting"
            );
            self.clone().spawn_submit(SubmitReason::Integrity);
        }
    }

    /// Runs a submission on its own task so a clock or monitor callback never
    /// nests a transition inside itself.
    fn spawn_submit(self, reason: SubmitReason) {
        tokio::spawn(async move {
            if let Err(e) = self.submit(reason).await {
                error!(
                    session_id = %self.inner.id,
                    reason = reason.as_str(),
                    "Automatic submission failed: {}",
                    e
                );
            }
        });
    }
}
