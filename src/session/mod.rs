// src/session/mod.rs

//! The per-student exam session engine.
//!
//! `ExamSession` owns the state machine and drives the leaf components:
//! question order, answers, scoring, the countdown clock, and the integrity
//! monitor. Everything outside (question source, result sink, host page) is
//! reached through the traits in `crate::store` and `integrity`.

pub mod answers;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod integrity;
pub mod policy;
pub mod registry;
pub mod scoring;
pub mod sequencer;
pub mod time;

use serde::Serialize;

pub use coordinator::{
    ExamSession, SessionDeps, SessionEvent, SessionSnapshot, SessionStatus, Submission,
};
pub use error::SessionError;
pub use policy::SessionPolicy;
pub use registry::SessionRegistry;

/// Whether a command changed anything. Commands that arrive in a state that
/// does not allow them are `Ignored` rather than errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    Applied,
    Ignored,
}

impl CommandOutcome {
    pub fn applied(self) -> bool {
        self == CommandOutcome::Applied
    }
}

impl From<bool> for CommandOutcome {
    fn from(applied: bool) -> Self {
        if applied {
            CommandOutcome::Applied
        } else {
            CommandOutcome::Ignored
        }
    }
}
