// src/models/session.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    models::exam_record::{ExamResult, SubmitReason},
    session::{SessionSnapshot, SessionStatus, integrity::IntegritySignal},
};

/// DTO for opening (and starting) a session.
#[derive(Debug, Deserialize, Validate)]
pub struct StartSessionRequest {
    #[validate(range(min = 1))]
    pub exam_id: i64,
}

/// DTO for recording an answer.
#[derive(Debug, Deserialize, Validate)]
pub struct AnswerRequest {
    #[validate(range(min = 1))]
    pub question_id: i64,
    #[validate(range(max = 64))]
    pub option_index: usize,
}

/// DTO for an explicit submission. Clients may only submit manually;
/// timeout and integrity submissions are raised by the server.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub reason: Option<SubmitReason>,
}

/// DTO for a focus/visibility signal reported by the page.
#[derive(Debug, Deserialize)]
pub struct SignalRequest {
    pub kind: IntegritySignal,
}

/// DTO for the page's visibility heartbeat, read by the periodic poll.
#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub hidden: bool,
}

/// Body returned by session commands.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// `false` when the command was a no-op for the current state.
    pub applied: bool,
    pub session: SessionSnapshot,
}

/// Body returned by submit and retry.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    /// `true` only for the call that finalized the session.
    pub finalized: bool,
    pub status: SessionStatus,
    pub result: Option<ExamResult>,
}
