//! Descriptive metadata for subjects
//!
//! One record per subject, overwritten on write. A subject without its own
//! record inherits the record of its nearest ancestor, which is how a newly
//! seen field of a device picks up the device's name and description.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::subject::Subject;
use crate::trie::SubjectTrie;

/// Human-readable description of a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub subject: Subject,
    pub name: String,
    pub description: String,
    pub path: String,
}

impl Metadata {
    /// Copy of this record rebound to another subject
    #[must_use]
    pub fn rebind(&self, subject: &Subject) -> Self {
        Self {
            subject: subject.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            path: subject.to_string(),
        }
    }
}

/// In-memory metadata store keyed by subject
#[derive(Debug, Default)]
pub struct MetadataStore {
    records: RwLock<SubjectTrie<Metadata>>,
}

impl MetadataStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the record for its subject
    pub async fn add(&self, meta: Metadata) {
        let subject = meta.subject.clone();
        self.records.write().await.insert(&subject, meta);
    }

    /// Record bound to exactly this subject
    pub async fn get(&self, subject: &Subject) -> Option<Metadata> {
        self.records.read().await.get(subject).cloned()
    }

    /// Record for the subject or its nearest ancestor
    pub async fn find_by_subject(&self, subject: &Subject) -> Option<Metadata> {
        self.records.read().await.longest_match(subject).cloned()
    }

    /// Snapshot of every record, ordered by subject
    pub async fn all(&self) -> Vec<Metadata> {
        let mut list: Vec<Metadata> = self.records.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.subject.cmp(&b.subject));
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(subject: &str, name: &str) -> Metadata {
        let subject = Subject::parse(subject).unwrap();
        Metadata {
            path: subject.to_string(),
            subject,
            name: name.to_string(),
            description: format!("{name} description"),
        }
    }

    #[tokio::test]
    async fn test_add_overwrites() {
        let store = MetadataStore::new();
        store.add(record("data://dev", "first")).await;
        store.add(record("data://dev", "second")).await;

        let all = store.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "second");
    }

    #[tokio::test]
    async fn test_find_by_subject_inherits_from_ancestor() {
        let store = MetadataStore::new();
        store.add(record("data://dev", "device")).await;

        let leaf = Subject::parse("data://dev/temp").unwrap();
        assert!(store.get(&leaf).await.is_none());
        let found = store.find_by_subject(&leaf).await.unwrap();
        assert_eq!(found.name, "device");
        assert_eq!(found.subject.to_string(), "data://dev");

        assert!(store
            .find_by_subject(&Subject::parse("data://other/temp").unwrap())
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_exact_record_shadows_ancestor() {
        let store = MetadataStore::new();
        store.add(record("data://dev", "device")).await;
        store.add(record("data://dev/temp", "thermometer")).await;

        let found = store
            .find_by_subject(&Subject::parse("data://dev/temp").unwrap())
            .await
            .unwrap();
        assert_eq!(found.name, "thermometer");
    }

    #[test]
    fn test_rebind_sets_subject_and_path() {
        let root = record("data://dev", "device");
        let leaf = Subject::parse("data://dev/temp").unwrap();
        let copy = root.rebind(&leaf);
        assert_eq!(copy.subject, leaf);
        assert_eq!(copy.path, "data://dev/temp");
        assert_eq!(copy.name, root.name);
        assert_eq!(copy.description, root.description);
    }
}
