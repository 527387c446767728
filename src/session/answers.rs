// src/session/answers.rs

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    models::question::Question,
    session::{CommandOutcome, error::SessionError},
};

/// The student's current choice for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub question_id: i64,
    pub selected_option_index: usize,
    pub recorded_at: DateTime<Utc>,
}

/// Current answer per question, last write wins.
///
/// Only ids of the session's own questions are accepted, so the keys are
/// always a subset of the fixed question set.
#[derive(Debug, Clone, Default)]
pub struct AnswerStore {
    /// question id -> number of options
    known: HashMap<i64, usize>,
    answers: HashMap<i64, Answer>,
    frozen: bool,
}

impl AnswerStore {
    pub fn new(questions: &[Question]) -> Self {
        Self {
            known: questions.iter().map(|q| (q.id, q.option_count())).collect(),
            answers: HashMap::new(),
            frozen: false,
        }
    }

    /// Records (or overwrites) the answer for `question_id`.
    ///
    /// A frozen store ignores the call. Unknown questions and out-of-range
    /// options are rejected.
    pub fn record(
        &mut self,
        question_id: i64,
        option_index: usize,
        at: DateTime<Utc>,
    ) -> Result<CommandOutcome, SessionError> {
        if self.frozen {
            return Ok(CommandOutcome::Ignored);
        }

        let option_count = *self
            .known
            .get(&question_id)
            .ok_or(SessionError::UnknownQuestion(question_id))?;

        if option_index >= option_count {
            return Err(SessionError::InvalidOption {
                question_id,
                option_index,
            });
        }

        self.answers.insert(
            question_id,
            Answer {
                question_id,
                selected_option_index: option_index,
                recorded_at: at,
            },
        );
        Ok(CommandOutcome::Applied)
    }

    pub fn get(&self, question_id: i64) -> Option<&Answer> {
        self.answers.get(&question_id)
    }

    /// Owned copy of the choices, keyed by question id.
    pub fn snapshot(&self) -> BTreeMap<i64, usize> {
        self.answers
            .values()
            .map(|a| (a.question_id, a.selected_option_index))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }
}
