//! Identity types for volunteers, subjects and classification events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Volunteer identity.
///
/// Registered volunteers carry a numeric id; anonymous ones are known only
/// by the name the platform assigned to their session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Id(u64),
    Name(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserId::Id(id) => write!(f, "{}", id),
            UserId::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        UserId::Id(id)
    }
}

impl From<&str> for UserId {
    fn from(name: &str) -> Self {
        UserId::Name(name.to_string())
    }
}

/// Subject (item under classification) identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub u64);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SubjectId {
    fn from(id: u64) -> Self {
        SubjectId(id)
    }
}

/// External, monotonically increasing classification event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationId(pub u64);

impl fmt::Display for ClassificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ClassificationId {
    fn from(id: u64) -> Self {
        ClassificationId(id)
    }
}
