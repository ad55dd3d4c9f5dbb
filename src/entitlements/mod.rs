//! Entitlements: access policies bound to data subjects
//!
//! An entitlement states whether a subject (and every descendant without a
//! more specific entitlement of its own) is owner-only, discoverable, or
//! fully accessible. Entitlements move through a small lifecycle:
//!
//! ```text
//! Requested ──accept──▶ Accepted ──revoke──▶ Revoked
//!     │                    │
//!     └──decline──▶ Declined   amend (access level only)
//! ```

pub mod manager;
pub mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::subject::Subject;
use crate::Error;

pub use manager::EntitlementManager;
pub use store::{EntitlementMap, EntitlementStore};

/// How much of a subject's data may leave the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessLevel {
    /// Only the owner may see the data; nothing is announced
    OwnerOnly,
    /// Existence and value may both be shared
    CanAccess,
    /// Existence may be announced, the value stays private
    CanDiscover,
}

impl AccessLevel {
    /// Wire name of the level
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OwnerOnly => "owner-only",
            Self::CanAccess => "can-access",
            Self::CanDiscover => "can-discover",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner-only" => Ok(Self::OwnerOnly),
            "can-access" => Ok(Self::CanAccess),
            "can-discover" => Ok(Self::CanDiscover),
            other => Err(Error::Validation(format!("unknown access level: {other}"))),
        }
    }
}

/// Lifecycle state of an entitlement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Requested,
    Accepted,
    Declined,
    Revoked,
}

/// A policy record for a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    /// Unique identifier
    pub uid: String,
    /// Address the policy is bound to
    pub subject: Subject,
    /// Granted access level
    #[serde(rename = "level")]
    pub access_level: AccessLevel,
    /// Current lifecycle state
    pub status: Status,
}

impl Entitlement {
    /// Create an entitlement with a freshly generated UID
    #[must_use]
    pub fn new(subject: Subject, access_level: AccessLevel, status: Status) -> Self {
        Self {
            uid: Uuid::new_v4().to_string(),
            subject,
            access_level,
            status,
        }
    }

    /// Whether the existence of the data may be announced
    #[must_use]
    pub const fn is_discoverable(&self) -> bool {
        matches!(
            self.access_level,
            AccessLevel::CanAccess | AccessLevel::CanDiscover
        )
    }

    /// Whether the data itself may be read
    #[must_use]
    pub const fn is_accessible(&self) -> bool {
        matches!(self.access_level, AccessLevel::CanAccess)
    }
}
