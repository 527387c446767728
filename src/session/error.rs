// src/session/error.rs

use std::fmt;

use uuid::Uuid;

use crate::store::StoreError;

/// Errors a session command can surface to its caller.
///
/// Commands issued in the wrong state are not errors; they come back as
/// `CommandOutcome::Ignored` / `Submission::Ignored`.
#[derive(Debug)]
pub enum SessionError {
    /// The question provider failed.
    Provider(StoreError),

    /// The exam has no questions.
    EmptyQuestionSet { exam_id: i64 },

    /// The configured duration does not fit a wall-clock deadline.
    InvalidDuration,

    UnknownQuestion(i64),

    InvalidOption { question_id: i64, option_index: usize },

    /// Saving the result failed. The result is kept and can be retried.
    Persistence(StoreError),

    /// The student already has an attempt at this exam.
    AttemptExists { student_id: i64, exam_id: i64 },

    NotFound(Uuid),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Provider(e) => write!(f, "failed to fetch questions: {}", e),
            SessionError::EmptyQuestionSet { exam_id } => {
                write!(f, "exam {} has no questions", exam_id)
            }
            SessionError::InvalidDuration => write!(f, "exam duration is out of range"),
            SessionError::UnknownQuestion(id) => {
                write!(f, "question {} is not part of this session", id)
            }
            SessionError::InvalidOption {
                question_id,
                option_index,
            } => write!(
                f,
                "option {} does not exist for question {}",
                option_index, question_id
            ),
            SessionError::Persistence(e) => write!(f, "failed to save result: {}", e),
            SessionError::AttemptExists {
                student_id,
                exam_id,
            } => write!(
                f,
                "student {} already has an attempt at exam {}",
                student_id, exam_id
            ),
            SessionError::NotFound(id) => write!(f, "session {} not found", id),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Provider(e) | SessionError::Persistence(e) => Some(e),
            _ => None,
        }
    }
}
