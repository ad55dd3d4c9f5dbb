//! In-memory entitlement store
//!
//! Four independent partitions, one per lifecycle state. Each partition
//! keeps its entries by UID and indexes them by subject in a
//! [`SubjectTrie`], so policy resolution walks the address segments instead
//! of scanning every entry. Locks are held only for the in-memory work and
//! never across a network call.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::Entitlement;
use crate::subject::Subject;
use crate::trie::SubjectTrie;
use crate::{Error, Result};

#[derive(Debug, Default)]
struct Partition {
    entries: HashMap<String, Entitlement>,
    /// UIDs per subject in insertion order
    by_subject: SubjectTrie<Vec<String>>,
}

impl Partition {
    fn index(&mut self, ent: &Entitlement) {
        if let Some(uids) = self.by_subject.get_mut(&ent.subject) {
            uids.push(ent.uid.clone());
        } else {
            self.by_subject.insert(&ent.subject, vec![ent.uid.clone()]);
        }
    }

    fn unindex(&mut self, subject: &Subject, uid: &str) {
        let now_empty = self.by_subject.get_mut(subject).is_some_and(|uids| {
            uids.retain(|u| u != uid);
            uids.is_empty()
        });
        if now_empty {
            self.by_subject.remove(subject);
        }
    }

    fn insert(&mut self, ent: Entitlement, unique_subjects: bool) {
        self.remove(&ent.uid);

        if unique_subjects {
            if let Some(uids) = self.by_subject.remove(&ent.subject) {
                for uid in uids {
                    self.entries.remove(&uid);
                }
            }
        }

        self.index(&ent);
        self.entries.insert(ent.uid.clone(), ent);
    }

    fn remove(&mut self, uid: &str) -> Option<Entitlement> {
        let ent = self.entries.remove(uid)?;
        self.unindex(&ent.subject, &ent.uid);
        Some(ent)
    }

    fn uids_at(&self, subject: &Subject) -> &[String] {
        self.by_subject.get(subject).map(Vec::as_slice).unwrap_or_default()
    }
}

/// One lifecycle partition of the entitlement store
#[derive(Debug)]
pub struct EntitlementMap {
    unique_subjects: bool,
    inner: RwLock<Partition>,
}

impl EntitlementMap {
    /// A partition that may hold several entitlements per subject
    #[must_use]
    pub fn new() -> Self {
        Self {
            unique_subjects: false,
            inner: RwLock::new(Partition::default()),
        }
    }

    /// A partition holding at most one entitlement per subject
    ///
    /// Adding an entitlement for a subject that is already present evicts the
    /// existing one.
    #[must_use]
    pub fn unique_subjects() -> Self {
        Self {
            unique_subjects: true,
            inner: RwLock::new(Partition::default()),
        }
    }

    /// Insert an entitlement under its own UID
    pub async fn add(&self, ent: Entitlement) {
        self.inner.write().await.insert(ent, self.unique_subjects);
    }

    /// Look up an entitlement by UID
    pub async fn get(&self, uid: &str) -> Option<Entitlement> {
        self.inner.read().await.entries.get(uid).cloned()
    }

    /// Remove an entitlement by UID, returning it if it was present
    pub async fn delete(&self, uid: &str) -> Option<Entitlement> {
        self.inner.write().await.remove(uid)
    }

    /// Snapshot of every entitlement, ordered by subject then UID
    pub async fn all(&self) -> Vec<Entitlement> {
        let mut list: Vec<Entitlement> = self.inner.read().await.entries.values().cloned().collect();
        list.sort_by(|a, b| a.subject.cmp(&b.subject).then_with(|| a.uid.cmp(&b.uid)));
        list
    }

    /// Number of entitlements in the partition
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Whether the partition is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Apply a mutation to the entitlement with the given UID
    ///
    /// The UID cannot be changed by the mutator. If the subject changes the
    /// entitlement is re-indexed.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no entitlement has this UID, or whatever error
    /// the mutator returns (in which case nothing is changed)
    pub async fn update<F>(&self, uid: &str, mutate: F) -> Result<Entitlement>
    where
        F: FnOnce(&mut Entitlement) -> Result<()>,
    {
        let mut partition = self.inner.write().await;

        let current = partition
            .entries
            .get(uid)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("entitlement {uid}")))?;

        let mut updated = current.clone();
        mutate(&mut updated)?;
        updated.uid = current.uid;

        if updated.subject == current.subject {
            partition.entries.insert(updated.uid.clone(), updated.clone());
        } else {
            partition.insert(updated.clone(), self.unique_subjects);
        }

        Ok(updated)
    }

    /// Insert an entitlement, taking over the UID of any existing entry with
    /// the same subject
    ///
    /// Returns the entitlement as stored.
    pub async fn append_or_replace_on_subject(&self, mut ent: Entitlement) -> Entitlement {
        let mut partition = self.inner.write().await;

        let existing = partition.uids_at(&ent.subject).to_vec();
        if let Some((keep, extra)) = existing.split_first() {
            for uid in extra {
                partition.remove(uid);
            }
            ent.uid.clone_from(keep);
        }

        partition.insert(ent.clone(), self.unique_subjects);
        ent
    }

    /// Resolve the entitlement governing a subject
    ///
    /// Returns the entitlement bound to the most specific subject on the
    /// ancestor chain, or `None` if neither the subject nor any ancestor has
    /// one.
    pub async fn find_for_subject(&self, subject: &Subject) -> Option<Entitlement> {
        let partition = self.inner.read().await;
        let uid = partition.by_subject.longest_match(subject)?.first()?;
        partition.entries.get(uid).cloned()
    }

    /// Entitlements bound to exactly this subject
    pub async fn find_by_subject(&self, subject: &Subject) -> Vec<Entitlement> {
        let partition = self.inner.read().await;
        partition
            .uids_at(subject)
            .iter()
            .filter_map(|uid| partition.entries.get(uid).cloned())
            .collect()
    }
}

impl Default for EntitlementMap {
    fn default() -> Self {
        Self::new()
    }
}

/// All entitlements held by the node, partitioned by lifecycle state
#[derive(Debug)]
pub struct EntitlementStore {
    pub requested: EntitlementMap,
    pub accepted: EntitlementMap,
    pub declined: EntitlementMap,
    pub revoked: EntitlementMap,
}

impl EntitlementStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self {
            requested: EntitlementMap::new(),
            accepted: EntitlementMap::unique_subjects(),
            declined: EntitlementMap::new(),
            revoked: EntitlementMap::new(),
        }
    }
}

impl Default for EntitlementStore {
    fn default() -> Self {
        Self::new()
    }
}
