// src/session/sequencer.rs

use rand::Rng;

use crate::models::question::Question;

/// Session-local question order and cursor.
///
/// The order is drawn once by `initialize` and never reshuffled. Moving past
/// either end is a no-op rather than an error.
#[derive(Debug, Clone, Default)]
pub struct QuestionSequencer {
    order: Vec<Question>,
    index: usize,
    frozen: bool,
}

impl QuestionSequencer {
    /// Stores a uniformly random permutation (Fisher–Yates) of `questions`
    /// and moves the cursor to the first one.
    pub fn initialize<R: Rng + ?Sized>(&mut self, questions: Vec<Question>, rng: &mut R) {
        let mut order = questions;
        for i in (1..order.len()).rev() {
            let j = rng.gen_range(0..=i);
            order.swap(i, j);
        }
        self.order = order;
        self.index = 0;
        self.frozen = false;
    }

    /// Returns `true` if the cursor moved.
    pub fn next(&mut self) -> bool {
        if self.frozen || self.index + 1 >= self.order.len() {
            return false;
        }
        self.index += 1;
        true
    }

    /// Returns `true` if the cursor moved.
    pub fn previous(&mut self) -> bool {
        if self.frozen || self.index == 0 {
            return false;
        }
        self.index -= 1;
        true
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.order.get(self.index)
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The fixed order, for scoring.
    pub fn questions(&self) -> &[Question] {
        &self.order
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }
}
