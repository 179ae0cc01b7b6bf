//! Change detection.
//!
//! Remembers the identifiers of the most recently published items. An
//! identifier only enters memory through [`ChangeDetector::commit`], which
//! the dispatcher calls after a successful publish, so a failed publish is
//! retried on the next cycle.

use std::collections::VecDeque;

/// Tracks which items have already been published.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    recent: VecDeque<String>,
    capacity: usize,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeDetector {
    /// Remember only the last published identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::with_memory(1)
    }

    /// Remember the last `capacity` identifiers (at least one).
    #[must_use]
    pub fn with_memory(capacity: usize) -> Self {
        Self {
            recent: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Whether `identifier` has not been published yet.
    #[must_use]
    pub fn is_new(&self, identifier: &str) -> bool {
        !self.recent.iter().any(|seen| seen == identifier)
    }

    /// Record `identifier` as published.
    pub fn commit(&mut self, identifier: impl Into<String>) {
        let identifier = identifier.into();
        self.recent.retain(|seen| *seen != identifier);
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(identifier);
    }

    /// Most recently published identifier.
    #[must_use]
    pub fn last_published(&self) -> Option<&str> {
        self.recent.back().map(String::as_str)
    }

    /// Number of identifiers remembered.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_everything_is_new_at_start() {
        let detector = ChangeDetector::new();
        assert!(detector.is_new("L1"));
        assert!(detector.last_published().is_none());
    }

    #[test]
    fn test_commit_marks_seen() {
        let mut detector = ChangeDetector::new();
        detector.commit("L1");
        assert!(!detector.is_new("L1"));
        assert!(detector.is_new("L2"));
        assert_eq!(detector.last_published(), Some("L1"));
    }

    #[test]
    fn test_single_slot_forgets_older() {
        let mut detector = ChangeDetector::new();
        detector.commit("L1");
        detector.commit("L2");
        // A feed that flips back to an older entry republishes it.
        assert!(detector.is_new("L1"));
        assert_eq!(detector.last_published(), Some("L2"));
    }

    #[test]
    fn test_larger_memory_suppresses_flip_flop() {
        let mut detector = ChangeDetector::with_memory(3);
        detector.commit("L1");
        detector.commit("L2");
        assert!(!detector.is_new("L1"));
        detector.commit("L3");
        detector.commit("L4");
        assert!(detector.is_new("L1"));
        assert!(!detector.is_new("L2"));
    }

    #[test]
    fn test_recommit_moves_to_back() {
        let mut detector = ChangeDetector::with_memory(2);
        detector.commit("L1");
        detector.commit("L2");
        detector.commit("L1");
        assert_eq!(detector.last_published(), Some("L1"));
        detector.commit("L3");
        assert!(!detector.is_new("L1"));
        assert!(detector.is_new("L2"));
    }

    #[test]
    fn test_huge_memory_does_not_preallocate() {
        let mut detector = ChangeDetector::with_memory(usize::MAX);
        detector.commit("L1");
        assert_eq!(detector.capacity(), usize::MAX);
        assert!(!detector.is_new("L1"));
    }

    #[test]
    fn test_zero_memory_is_clamped() {
        let detector = ChangeDetector::with_memory(0);
        assert_eq!(detector.capacity(), 1);
    }
}
