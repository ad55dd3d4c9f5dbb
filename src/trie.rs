//! Segment-keyed prefix tree over subjects
//!
//! Each edge is one address segment, so a lookup walks at most
//! `depth + 1` nodes regardless of how many subjects are stored. Used by
//! both the entitlement and metadata stores for most-specific-wins
//! resolution.

use std::collections::HashMap;

use crate::subject::Subject;

#[derive(Debug)]
struct Node<V> {
    value: Option<V>,
    children: HashMap<String, Node<V>>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            value: None,
            children: HashMap::new(),
        }
    }
}

impl<V> Node<V> {
    fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }
}

/// Prefix tree mapping subjects to values
#[derive(Debug)]
pub struct SubjectTrie<V> {
    roots: HashMap<String, Node<V>>,
    len: usize,
}

impl<V> Default for SubjectTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> SubjectTrie<V> {
    /// Create an empty trie
    #[must_use]
    pub fn new() -> Self {
        Self {
            roots: HashMap::new(),
            len: 0,
        }
    }

    /// Number of subjects holding a value
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no subject holds a value
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Store a value at a subject, returning the value it replaced
    pub fn insert(&mut self, subject: &Subject, value: V) -> Option<V> {
        let mut node = self.roots.entry(subject.root().to_string()).or_default();
        for segment in subject.segments() {
            node = node.children.entry(segment.clone()).or_default();
        }

        let previous = node.value.replace(value);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Value stored at exactly this subject
    #[must_use]
    pub fn get(&self, subject: &Subject) -> Option<&V> {
        self.node(subject).and_then(|n| n.value.as_ref())
    }

    /// Mutable value stored at exactly this subject
    pub fn get_mut(&mut self, subject: &Subject) -> Option<&mut V> {
        let mut node = self.roots.get_mut(subject.root())?;
        for segment in subject.segments() {
            node = node.children.get_mut(segment)?;
        }
        node.value.as_mut()
    }

    /// Value at the most specific subject on the ancestor chain
    ///
    /// Walks from the root towards the leaf and keeps the deepest hit, which
    /// is the first hit a leaf-first scan of `Subject::ancestor_chain` would
    /// find.
    #[must_use]
    pub fn longest_match(&self, subject: &Subject) -> Option<&V> {
        let mut node = self.roots.get(subject.root())?;
        let mut best = node.value.as_ref();

        for segment in subject.segments() {
            match node.children.get(segment) {
                Some(child) => {
                    node = child;
                    if node.value.is_some() {
                        best = node.value.as_ref();
                    }
                }
                None => break,
            }
        }

        best
    }

    /// Remove the value at a subject, pruning empty branches
    pub fn remove(&mut self, subject: &Subject) -> Option<V> {
        let root = self.roots.get_mut(subject.root())?;
        let removed = remove_at(root, subject.segments())?;

        if root.is_empty() {
            self.roots.remove(subject.root());
        }
        self.len -= 1;
        Some(removed)
    }

    /// All stored values, in no particular order
    pub fn values(&self) -> impl Iterator<Item = &V> {
        let mut stack: Vec<&Node<V>> = self.roots.values().collect();
        std::iter::from_fn(move || {
            while let Some(node) = stack.pop() {
                stack.extend(node.children.values());
                if let Some(value) = node.value.as_ref() {
                    return Some(value);
                }
            }
            None
        })
    }

    fn node(&self, subject: &Subject) -> Option<&Node<V>> {
        let mut node = self.roots.get(subject.root())?;
        for segment in subject.segments() {
            node = node.children.get(segment)?;
        }
        Some(node)
    }
}

fn remove_at<V>(node: &mut Node<V>, path: &[String]) -> Option<V> {
    let Some((head, rest)) = path.split_first() else {
        return node.value.take();
    };

    let child = node.children.get_mut(head)?;
    let removed = remove_at(child, rest)?;
    if child.is_empty() {
        node.children.remove(head);
    }
    Some(removed)
}
