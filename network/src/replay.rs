//! Replay protection for processed message ids.
//!
//! Every id is remembered for the lifetime of the process.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct ReplayCache {
    ids: HashSet<String>,
}

impl ReplayCache {
    /// Remember every id forever.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Record `id`. Returns `true` if it was not seen before.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sighting_is_new() {
        let mut cache = ReplayCache::unbounded();
        assert!(cache.insert("a"));
        assert!(cache.contains("a"));
        assert!(!cache.insert("a"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn unbounded_never_forgets() {
        let mut cache = ReplayCache::unbounded();
        for i in 0..10_000 {
            cache.insert(&i.to_string());
        }
        assert!(cache.contains("0"));
        assert_eq!(cache.len(), 10_000);
    }
}
