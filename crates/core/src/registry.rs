//! Session Registry
//!
//! The map from room name to the handle of the session living in it. This is
//! the only mutable state shared between request handlers and session
//! supervisors. Every access goes through one `RwLock`: mutations are
//! exclusive and lookups never see a half-applied change. Never replace it
//! with an unguarded map.

use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("a session is already registered for room '{0}'")]
    AlreadyRegistered(String),
}

#[derive(Debug)]
pub struct SessionRegistry<H> {
    entries: RwLock<HashMap<String, H>>,
}

impl<H> Default for SessionRegistry<H> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<H: Clone> SessionRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session. At most one session may exist per room.
    pub fn register(&self, id: impl Into<String>, handle: H) -> Result<(), RegistryError> {
        use std::collections::hash_map::Entry;

        match self.entries.write().entry(id.into()) {
            Entry::Occupied(entry) => Err(RegistryError::AlreadyRegistered(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(handle);
                Ok(())
            }
        }
    }

    pub fn lookup(&self, id: &str) -> Option<H> {
        self.entries.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Removes a session. Removing an absent id is a no-op.
    pub fn deregister(&self, id: &str) -> Option<H> {
        self.entries.write().remove(id)
    }

    /// Removes the entry only if `predicate` accepts the current handle.
    ///
    /// The check and the removal happen under one write lock, so a cleanup
    /// path can never remove a newer session registered under the same id.
    pub fn deregister_if(&self, id: &str, predicate: impl FnOnce(&H) -> bool) -> Option<H> {
        let mut entries = self.entries.write();
        if entries.get(id).is_some_and(predicate) {
            entries.remove(id)
        } else {
            None
        }
    }

    /// A consistent copy of every entry, ordered by id.
    pub fn snapshot(&self) -> Vec<(String, H)> {
        let mut entries: Vec<(String, H)> = self
            .entries
            .read()
            .iter()
            .map(|(id, handle)| (id.clone(), handle.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn test_register_rejects_second_session_for_room() {
        let registry = SessionRegistry::new();
        registry.register("room-a", 1u32).unwrap();
        assert_eq!(
            registry.register("room-a", 2),
            Err(RegistryError::AlreadyRegistered("room-a".to_string()))
        );
        assert_eq!(registry.lookup("room-a"), Some(1));
    }

    #[test]
    fn test_deregister_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.register("room-a", 1u32).unwrap();
        assert_eq!(registry.deregister("room-a"), Some(1));
        assert_eq!(registry.deregister("room-a"), None);
        assert_eq!(registry.deregister("never-existed"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_deregister_if_leaves_newer_session_alone() {
        let registry = SessionRegistry::new();
        registry.register("room-a", 2u32).unwrap();
        assert_eq!(registry.deregister_if("room-a", |h| *h == 1), None);
        assert!(registry.contains("room-a"));
        assert_eq!(registry.deregister_if("room-a", |h| *h == 2), Some(2));
        assert!(!registry.contains("room-a"));
    }

    #[test]
    fn test_concurrent_callers_on_disjoint_ids_lose_nothing() {
        let registry = Arc::new(SessionRegistry::new());
        let workers: Vec<_> = (0..8)
            .map(|worker| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let id = format!("room-{worker}-{i}");
                        registry.register(id.clone(), worker).unwrap();
                        assert_eq!(registry.lookup(&id), Some(worker));
                        if i % 2 == 0 {
                            assert_eq!(registry.deregister(&id), Some(worker));
                            assert_eq!(registry.deregister(&id), None);
                        }
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(registry.len(), 8 * 100);
        let snapshot = registry.snapshot();
        assert!(snapshot.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
