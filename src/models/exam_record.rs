// src/models/exam_record.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What ended the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitReason {
    /// The student pressed submit.
    Manual,
    /// The deadline passed.
    Timeout,
    /// The cheating threshold was reached.
    Integrity,
}

impl SubmitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitReason::Manual => "manual",
            SubmitReason::Timeout => "timeout",
            SubmitReason::Integrity => "integrity",
        }
    }
}

/// Why a cheating episode was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheatingReason {
    VisibilityLost,
    FocusLost,
    /// The periodic visibility poll found the page hidden.
    HiddenOnPoll,
}

impl CheatingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheatingReason::VisibilityLost => "visibility_lost",
            CheatingReason::FocusLost => "focus_lost",
            CheatingReason::HiddenOnPoll => "hidden_on_poll",
        }
    }
}

/// Final, immutable outcome of one session.
/// Represents a row of the 'exam_results' table; `session_id` is unique there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    pub session_id: Uuid,
    pub student_id: i64,
    pub exam_id: i64,
    pub score: f64,
    pub max_score: f64,
    pub correct_count: u32,
    pub total_questions: u32,
    pub cheating_attempts: u32,
    pub reason: SubmitReason,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// One detected integrity episode.
/// Represents a row of the 'cheating_events' table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheatingEvent {
    pub session_id: Uuid,
    pub reason: CheatingReason,
    /// Attempt counter value after this episode.
    pub attempt: u32,
    pub detected_at: DateTime<Utc>,
}
