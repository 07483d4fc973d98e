//! Session-scoped key/value storage.
//!
//! Durable for the lifetime of the process and isolated per scope: two
//! handles with different scopes never see each other's entries even when
//! they share the same backing map (one browser tab, one connection, one
//! user session each get their own scope).

use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Scoped handle onto a shared JSON store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    scope: String,
    entries: Arc<DashMap<(String, String), Value>>,
}

impl SessionStore {
    /// Create a store with a fresh backing map.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            entries: Arc::new(DashMap::new()),
        }
    }

    /// A handle on the same backing map under a different scope.
    pub fn scoped(&self, scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            entries: self.entries.clone(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    fn key(&self, key: &str) -> (String, String) {
        (self.scope.clone(), key.to_string())
    }

    /// Read an entry. Entries that no longer decode are treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(&self.key(key))?;
        decode(key, entry.value().clone())
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.entries.insert(self.key(key), value);
            }
            Err(e) => tracing::warn!(key, error = %e, "Failed to encode session entry"),
        }
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(&self.key(key));
    }

    /// Read-modify-write an entry under its shard lock.
    ///
    /// `f` receives the current value and returns the new one; `None` removes
    /// the entry. Returns what was stored.
    pub fn update<T, F>(&self, key: &str, f: F) -> Option<T>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: FnOnce(Option<T>) -> Option<T>,
    {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(self.key(key)) {
            Entry::Occupied(occupied) => {
                let current = decode(key, occupied.get().clone());
                match f(current) {
                    Some(next) => match serde_json::to_value(&next) {
                        Ok(value) => {
                            let mut occupied = occupied;
                            occupied.insert(value);
                            Some(next)
                        }
                        Err(e) => {
                            tracing::warn!(key, error = %e, "Failed to encode session entry");
                            occupied.remove();
                            None
                        }
                    },
                    None => {
                        occupied.remove();
                        None
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let next = f(None)?;
                match serde_json::to_value(&next) {
                    Ok(value) => {
                        vacant.insert(value);
                        Some(next)
                    }
                    Err(e) => {
                        tracing::warn!(key, error = %e, "Failed to encode session entry");
                        None
                    }
                }
            }
        }
    }

    /// Number of entries in this scope.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|r| r.key().0 == self.scope)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new("default")
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(key, error = %e, "Discarding undecodable session entry");
            None
        }
    }
}
