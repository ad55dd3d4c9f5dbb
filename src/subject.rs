//! Hierarchical data addresses
//!
//! A subject names a single data field held by the node, e.g.
//! `data://3f0c.../temp`. The first segment after the `data://` preamble is
//! the root (the sensor or device), the rest is an ordered path beneath it.
//! Policies and metadata bound to an address apply to all of its
//! descendants unless a more specific record exists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Scheme prefix every subject carries in its canonical form
pub const PREAMBLE: &str = "data://";

/// A parsed data address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subject {
    root: String,
    segments: Vec<String>,
}

impl Subject {
    /// Build a subject from a root and path segments
    ///
    /// # Errors
    ///
    /// Returns `MalformedAddress` if the root or any segment is empty or
    /// contains a `/`, since such a subject would not survive a round trip
    /// through its string form
    pub fn build<I, S>(root: impl Into<String>, segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let root = root.into();
        validate_segment(&root)?;

        let segments = segments
            .into_iter()
            .map(Into::into)
            .collect::<Vec<String>>();
        for segment in &segments {
            validate_segment(segment)?;
        }

        Ok(Self { root, segments })
    }

    /// Build a root-level subject for a sensor or device
    ///
    /// # Errors
    ///
    /// Returns `MalformedAddress` if the root is empty or contains a `/`
    pub fn root_of(root: impl Into<String>) -> Result<Self> {
        Self::build(root, std::iter::empty::<String>())
    }

    /// Parse a canonical `data://root/seg/...` string
    ///
    /// # Errors
    ///
    /// Returns `MalformedAddress` if the preamble is missing or the root or a
    /// segment is empty
    pub fn parse(subject: &str) -> Result<Self> {
        let bare = subject
            .strip_prefix(PREAMBLE)
            .ok_or_else(|| Error::MalformedAddress(format!("missing {PREAMBLE} prefix: {subject}")))?;

        let mut bits = bare.split('/');
        let root = bits.next().unwrap_or_default();
        Self::build(root, bits).map_err(|_| Error::MalformedAddress(subject.to_string()))
    }

    /// The root segment (sensor or device identifier)
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Path segments below the root
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether this subject addresses a root with no path below it
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The subject itself followed by each ancestor, ending at the root
    ///
    /// The list is never empty and has one entry per segment plus the root, most specific
    /// first. Policy resolution walks it in this order.
    #[must_use]
    pub fn ancestor_chain(&self) -> Vec<Self> {
        (0..=self.segments.len())
            .rev()
            .map(|len| Self {
                root: self.root.clone(),
                segments: self.segments[..len].to_vec(),
            })
            .collect()
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::MalformedAddress("empty address segment".to_string()));
    }
    if segment.contains('/') {
        return Err(Error::MalformedAddress(format!(
            "address segment contains '/': {segment}"
        )));
    }
    Ok(())
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREAMBLE}{}", self.root)?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for Subject {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Subject {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        subject.to_string()
    }
}
