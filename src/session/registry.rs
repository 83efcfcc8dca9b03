//! Topics the session should be subscribed to
//!
//! The registry is plain data; the session keeps it behind its single lock and
//! is the only writer.

/// Insertion-ordered set of short topic names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionRegistry {
    topics: Vec<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the topic was already present
    pub fn add(&mut self, topic: &str) -> bool {
        if self.contains(topic) {
            return false;
        }
        self.topics.push(topic.to_string());
        true
    }

    /// Returns false when the topic was absent
    pub fn remove(&mut self, topic: &str) -> bool {
        let before = self.topics.len();
        self.topics.retain(|t| t != topic);
        self.topics.len() != before
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }

    /// Snapshot in insertion order
    pub fn list(&self) -> Vec<String> {
        self.topics.clone()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_add_is_idempotent() {
        let mut registry = SubscriptionRegistry::new();
        assert!(registry.add("a"));
        assert!(!registry.add("a"));
        assert_eq!(registry.list(), vec!["a"]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut registry = SubscriptionRegistry::new();
        registry.add("a");
        assert!(!registry.remove("b"));
        assert_eq!(registry.list(), vec!["a"]);
    }

    #[test]
    fn test_add_then_remove() {
        let mut registry = SubscriptionRegistry::new();
        registry.add("a");
        assert!(registry.remove("a"));
        assert!(registry.list().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut registry = SubscriptionRegistry::new();
        for topic in ["c", "a", "b", "a"] {
            registry.add(topic);
        }
        registry.remove("a");
        registry.add("a");
        assert_eq!(registry.list(), vec!["c", "b", "a"]);
    }

    proptest! {
        #[test]
        fn registry_never_holds_duplicates(ops in prop::collection::vec((any::<bool>(), "[a-d]"), 0..64)) {
            let mut registry = SubscriptionRegistry::new();
            for (add, topic) in &ops {
                if *add {
                    registry.add(topic);
                } else {
                    registry.remove(topic);
                }
            }

            let list = registry.list();
            let mut deduped = list.clone();
            deduped.sort();
            deduped.dedup();
            prop_assert_eq!(deduped.len(), list.len());
        }
    }
}
