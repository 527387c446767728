// src/session/scoring.rs

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::question::Question;

/// How correct answers turn into points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringPolicy {
    /// Points per correct answer.
    pub point_value: f64,
    /// When set, the raw score is rescaled so a perfect paper scores this much.
    pub scale_to: Option<f64>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            point_value: 1.0,
            scale_to: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub correct_count: usize,
    pub score: f64,
    pub max_score: f64,
}

/// Scores a paper. Unanswered questions contribute nothing.
///
/// Every answered id must belong to `questions`; anything else is a bug in
/// the caller and trips a debug assertion.
pub fn score(
    questions: &[Question],
    answers: &BTreeMap<i64, usize>,
    policy: &ScoringPolicy,
) -> Score {
    debug_assert!(
        answers
            .keys()
            .all(|id| questions.iter().any(|q| q.id == *id)),
        "answer recorded for a question outside the session"
    );

    let correct_count = questions
        .iter()
        .filter(|q| answers.get(&q.id) == Some(&q.correct_option_index))
        .count();

    let raw = correct_count as f64 * policy.point_value;
    let raw_max = questions.len() as f64 * policy.point_value;

    let (score, max_score) = match policy.scale_to {
        Some(scale) if raw_max > 0.0 => (raw / raw_max * scale, scale),
        Some(scale) => (0.0, scale),
        None => (raw, raw_max),
    };

    Score {
        correct_count,
        score,
        max_score,
    }
}
