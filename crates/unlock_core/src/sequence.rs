use std::collections::VecDeque;

use shared::domain::InputEvent;

pub struct SequenceMatcher {
    target: Vec<InputEvent>,
    window: VecDeque<InputEvent>,
}

impl SequenceMatcher {
    pub fn new(target: Vec<InputEvent>) -> Self {
        let window = VecDeque::with_capacity(target.len());
        Self { target, window }
    }

    /// Feeds one event. Returns `true` exactly when the last N events equal
    /// the target; the window is cleared on a match.
    pub fn push(&mut self, event: InputEvent) -> bool {
        if self.target.is_empty() {
            return false;
        }

        self.window.push_back(event);
        while self.window.len() > self.target.len() {
            self.window.pop_front();
        }

        let matched = self.window.len() == self.target.len()
            && self.window.iter().eq(self.target.iter());
        if matched {
            self.window.clear();
        }
        matched
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn target_len(&self) -> usize {
        self.target.len()
    }
}

#[cfg(test)]
#[path = "tests/sequence_tests.rs"]
mod tests;
