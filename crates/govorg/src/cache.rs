use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub type PermissionSet = Arc<BTreeSet<String>>;

/// Read-through cache of resolved role permissions.
///
/// Entries are stamped with the org-spec generation they were computed
/// from; an insert computed against an older spec is dropped.
#[derive(Debug, Default)]
pub struct PermissionCache {
    inner: RwLock<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    entries: HashMap<String, PermissionSet>,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, generation: u64, role: &str) -> Option<PermissionSet> {
        let state = self.inner.read();
        if state.generation != generation {
            return None;
        }
        state.entries.get(role).cloned()
    }

    pub fn insert(&self, generation: u64, role: &str, permissions: PermissionSet) {
        let mut state = self.inner.write();
        if state.generation == generation {
            state.entries.insert(role.to_string(), permissions);
        }
    }

    /// Drop every entry and move to `generation`.
    pub fn invalidate(&self, generation: u64) {
        let mut state = self.inner.write();
        state.generation = generation;
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(items: &[&str]) -> PermissionSet {
        Arc::new(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn stale_inserts_are_ignored() {
        let cache = PermissionCache::new();
        cache.insert(0, "user", perms(&["execute:action"]));
        assert_eq!(cache.len(), 1);

        cache.invalidate(1);
        assert!(cache.is_empty());
        assert!(cache.get(0, "user").is_none());

        cache.insert(0, "user", perms(&["stale"]));
        assert!(cache.get(1, "user").is_none());

        cache.insert(1, "user", perms(&["fresh"]));
        assert!(cache.get(1, "user").unwrap().contains("fresh"));
    }
}
