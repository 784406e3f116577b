//! # Release module
//!
//! Tracks the releases the chart reconciler manages, in memory, keyed by
//! release name. Restarting the process loses this cache; releases already
//! recorded in a custom resource's `status.release` are treated as
//! existing again the first time that resource is reconciled.

use std::{collections::HashMap, sync::RwLock};

use crate::svc::status::{ReleaseSnapshot, ReleaseStatus};

// -----------------------------------------------------------------------------
// Release structure

#[derive(Clone, Debug)]
pub struct Release {
    pub name: String,
    pub namespace: String,
    pub revision: u64,
    pub status: ReleaseStatus,
    /// (filename, rendered document) pairs applied for this release
    pub documents: Vec<(String, String)>,
}

impl Release {
    /// the slice of this release written back onto the owning custom
    /// resource's status
    pub fn snapshot(&self) -> ReleaseSnapshot {
        ReleaseSnapshot {
            name: self.name.to_owned(),
            revision: self.revision,
            status: self.status,
        }
    }
}

// -----------------------------------------------------------------------------
// ReleaseStore structure

#[derive(Default)]
pub struct ReleaseStore {
    releases: RwLock<HashMap<String, Release>>,
}

impl ReleaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.releases.read().expect("release store lock to not be poisoned").contains_key(name)
    }

    pub fn upsert(&self, release: Release) {
        self.releases
            .write()
            .expect("release store lock to not be poisoned")
            .insert(release.name.to_owned(), release);
    }

    pub fn remove(&self, name: &str) -> Option<Release> {
        self.releases.write().expect("release store lock to not be poisoned").remove(name)
    }

    pub fn len(&self) -> usize {
        self.releases.read().expect("release store lock to not be poisoned").len()
    }

    /// returns a clone of the release record tracked for `name`, if any
    pub fn get(&self, name: &str) -> Option<Release> {
        self.releases.read().expect("release store lock to not be poisoned").get(name).cloned()
    }

    /// the revision number the next install or upgrade of `name` should use
    pub fn next_revision(&self, name: &str) -> u64 {
        self.get(name).map(|release| release.revision + 1).unwrap_or(1)
    }

    /// rehydrates a release record for a name already tracked in a custom
    /// resource's status, without any document content, so `exists` treats
    /// it as already installed after a process restart
    pub fn rehydrate(&self, snapshot: &crate::svc::status::ReleaseSnapshot, namespace: &str) {
        let mut releases = self.releases.write().expect("release store lock to not be poisoned");
        releases.entry(snapshot.name.to_owned()).or_insert_with(|| Release {
            name: snapshot.name.to_owned(),
            namespace: namespace.to_string(),
            revision: snapshot.revision,
            status: snapshot.status,
            documents: Vec::new(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(name: &str, revision: u64) -> Release {
        Release {
            name: name.to_string(),
            namespace: "default".to_string(),
            revision,
            status: ReleaseStatus::Deployed,
            documents: Vec::new(),
        }
    }

    #[test]
    fn upsert_and_exists() {
        let store = ReleaseStore::new();
        assert!(!store.exists("r1"));

        store.upsert(release("r1", 1));

        assert!(store.exists("r1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_drops_release() {
        let store = ReleaseStore::new();
        store.upsert(release("r1", 1));

        assert!(store.remove("r1").is_some());
        assert!(!store.exists("r1"));
    }

    #[test]
    fn next_revision_starts_at_one_and_increments() {
        let store = ReleaseStore::new();
        assert_eq!(store.next_revision("r1"), 1);

        store.upsert(release("r1", 1));
        assert_eq!(store.next_revision("r1"), 2);
    }

    #[test]
    fn rehydrate_is_idempotent() {
        let store = ReleaseStore::new();
        let snapshot = ReleaseSnapshot {
            name: "r1".to_string(),
            revision: 3,
            status: ReleaseStatus::Deployed,
        };

        store.rehydrate(&snapshot, "default");
        store.rehydrate(&snapshot, "default");
        assert_eq!(store.len(), 1);
        assert_eq!(store.next_revision("r1"), 4);
    }
}
