// src/models/question.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};

/// A multiple-choice question as fetched for one exam.
/// Immutable once fetched; the session only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    /// The text content of the question.
    pub text: String,

    /// Ordered list of options (e.g., ["Option A", "Option B"]).
    pub options: Vec<String>,

    /// Zero-based index into `options` of the correct choice.
    pub correct_option_index: usize,
}

impl Question {
    pub fn new(id: i64, text: impl Into<String>, options: Vec<String>, correct: usize) -> Self {
        Self {
            id,
            text: text.into(),
            options,
            correct_option_index: correct,
        }
    }

    /// Number of selectable options.
    pub fn option_count(&self) -> usize {
        self.options.len()
    }
}

/// Represents a row of the 'exam_questions' table in the database.
/// Options are stored as a JSON array.
#[derive(Debug, Clone, FromRow)]
pub struct QuestionRow {
    pub id: i64,
    pub text: String,
    pub options: Json<Vec<String>>,
    pub correct_option: i32,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Question {
            id: row.id,
            text: row.text,
            options: row.options.0,
            correct_option_index: usize::try_from(row.correct_option).unwrap_or(usize::MAX),
        }
    }
}

/// DTO for sending a question to the client (excludes the correct option).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub text: String,
    pub options: Vec<String>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        PublicQuestion {
            id: q.id,
            text: q.text.clone(),
            options: q.options.clone(),
        }
    }
}
