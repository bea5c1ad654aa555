//! Run-scoped deduplication of paper identifiers.

use std::collections::HashSet;

/// Identifiers already emitted during the current collection run
///
/// Owned by the run that creates it; nothing is persisted between runs.
#[derive(Debug, Default, Clone)]
pub struct DedupSet {
    seen: HashSet<String>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `id` was already recorded
    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Record `id`, returning `false` if it was already present
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.seen.insert(id.into())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let mut seen = DedupSet::new();
        assert!(seen.is_empty());

        assert!(seen.insert("2401.00001"));
        assert!(!seen.insert("2401.00001"));
        assert!(seen.contains("2401.00001"));
        assert!(!seen.contains("2401.00002"));
        assert_eq!(seen.len(), 1);
    }
}
