//! Concurrent registry of named stored queries
//!
//! The registry is the only structure mutated outside a single percolation
//! call's lifetime, so it is the concurrency-critical piece: mutators build a
//! new map and publish it with one atomic swap (copy-on-write), and readers
//! take an `Arc` snapshot that stays internally consistent for the whole
//! evaluation no matter how many mutations land meanwhile.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tantivy::query::Query;

/// A compiled, evaluable stored query
pub type Predicate = Arc<dyn Query>;

/// One registered query
#[derive(Debug, Clone)]
pub struct QueryEntry {
    name: String,
    predicate: Predicate,
    registered_at: u64,
    added_at: DateTime<Utc>,
}

impl QueryEntry {
    /// The unique query name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The compiled predicate
    pub fn predicate(&self) -> &dyn Query {
        self.predicate.as_ref()
    }

    /// Registry version at which this entry was published
    pub fn registered_at(&self) -> u64 {
        self.registered_at
    }

    /// Wall-clock registration time, for diagnostics only
    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }
}

struct Shared {
    entries: Arc<HashMap<String, QueryEntry>>,
    version: u64,
}

/// Concurrent mapping from query name to compiled predicate
pub struct QueryRegistry {
    shared: RwLock<Shared>,
}

impl QueryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            shared: RwLock::new(Shared {
                entries: Arc::new(HashMap::new()),
                version: 0,
            }),
        }
    }

    /// Insert or overwrite a query; returns the previous predicate if any
    pub fn add(&self, name: impl Into<String>, predicate: Predicate) -> Option<Predicate> {
        let name = name.into();
        let mut shared = self.shared.write();

        let mut entries = HashMap::clone(&shared.entries);
        shared.version += 1;
        let previous = entries.insert(
            name.clone(),
            QueryEntry {
                name: name.clone(),
                predicate,
                registered_at: shared.version,
                added_at: Utc::now(),
            },
        );
        shared.entries = Arc::new(entries);

        tracing::info!(
            query = %name,
            version = shared.version,
            replaced = previous.is_some(),
            "Registered query"
        );

        previous.map(|entry| entry.predicate)
    }

    /// Delete a query; true if something was removed, false (not an error)
    /// if the name was unknown
    pub fn remove(&self, name: &str) -> bool {
        let mut shared = self.shared.write();

        if !shared.entries.contains_key(name) {
            return false;
        }

        let mut entries = HashMap::clone(&shared.entries);
        entries.remove(name);
        shared.version += 1;
        shared.entries = Arc::new(entries);

        tracing::info!(query = %name, version = shared.version, "Removed query");
        true
    }

    /// Atomically empty the registry
    pub fn clear(&self) {
        let mut shared = self.shared.write();
        shared.version += 1;
        shared.entries = Arc::new(HashMap::new());
        tracing::info!(version = shared.version, "Cleared query registry");
    }

    /// Take an immutable point-in-time view
    ///
    /// O(1): clones the published `Arc`, never the map. Safe to iterate while
    /// mutators race; they publish new maps instead of touching this one.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let shared = self.shared.read();
        RegistrySnapshot {
            entries: Arc::clone(&shared.entries),
            version: shared.version,
        }
    }

    /// Number of registered queries
    pub fn len(&self) -> usize {
        self.shared.read().entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.shared.read().entries.is_empty()
    }

    /// Logical version, bumped by every mutation
    pub fn version(&self) -> u64 {
        self.shared.read().version
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// An immutable point-in-time view of the registry
#[derive(Clone)]
pub struct RegistrySnapshot {
    entries: Arc<HashMap<String, QueryEntry>>,
    version: u64,
}

impl RegistrySnapshot {
    /// Iterate the entries in this view
    pub fn iter(&self) -> impl Iterator<Item = &QueryEntry> {
        self.entries.values()
    }

    /// Look up one entry by name
    pub fn get(&self, name: &str) -> Option<&QueryEntry> {
        self.entries.get(name)
    }

    /// Number of entries in this view
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this view is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registry version this view was taken at
    pub fn version(&self) -> u64 {
        self.version
    }
}
