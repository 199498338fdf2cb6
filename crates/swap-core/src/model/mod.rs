//! Volunteer and subject entities plus the small value types they share.
//!
//! Votes, gold labels and retirement states are enums in memory and plain
//! integers on the wire (`0` bogus, `1` real, `-1` unknown/unset), which
//! keeps snapshots and CSV exports compatible with existing tooling.

pub mod subject;
pub mod user;

pub use subject::{Subject, SubjectVote};
pub use user::{Counts, User, UserVote};

use serde::{Deserialize, Serialize};
use swap_common::{ClassificationId, SubjectId, UserId};

/// A volunteer's binary judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Vote {
    Bogus,
    Real,
}

impl Vote {
    pub fn from_bool(real: bool) -> Self {
        if real {
            Vote::Real
        } else {
            Vote::Bogus
        }
    }

    pub fn is_real(self) -> bool {
        matches!(self, Vote::Real)
    }

    /// `0.0` for bogus, `1.0` for real.
    pub fn as_f64(self) -> f64 {
        if self.is_real() {
            1.0
        } else {
            0.0
        }
    }

    /// Class index: 0 bogus, 1 real.
    pub fn index(self) -> usize {
        self.is_real() as usize
    }
}

impl From<Vote> for u8 {
    fn from(vote: Vote) -> Self {
        vote.index() as u8
    }
}

impl TryFrom<u8> for Vote {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Vote::Bogus),
            1 => Ok(Vote::Real),
            other => Err(format!("vote must be 0 or 1, got {}", other)),
        }
    }
}

/// Known ground truth for a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Gold {
    Bogus,
    Real,
    #[default]
    Unknown,
}

impl Gold {
    /// Class index for labelled subjects, `None` when unknown.
    pub fn index(self) -> Option<usize> {
        match self {
            Gold::Bogus => Some(0),
            Gold::Real => Some(1),
            Gold::Unknown => None,
        }
    }

    pub fn is_known(self) -> bool {
        self.index().is_some()
    }

    pub fn code(self) -> i8 {
        self.into()
    }
}

impl From<Gold> for i8 {
    fn from(gold: Gold) -> Self {
        match gold {
            Gold::Bogus => 0,
            Gold::Real => 1,
            Gold::Unknown => -1,
        }
    }
}

impl TryFrom<i8> for Gold {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Gold::Bogus),
            1 => Ok(Gold::Real),
            -1 => Ok(Gold::Unknown),
            other => Err(format!("gold must be -1, 0 or 1, got {}", other)),
        }
    }
}

impl std::fmt::Display for Gold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Retirement decision for a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Retirement {
    Bogus,
    Real,
}

impl Retirement {
    /// Export code: `-1` unretired, `0` bogus, `1` real.
    pub fn code(state: Option<Retirement>) -> i8 {
        match state {
            None => -1,
            Some(Retirement::Bogus) => 0,
            Some(Retirement::Real) => 1,
        }
    }
}

impl From<Retirement> for u8 {
    fn from(r: Retirement) -> Self {
        match r {
            Retirement::Bogus => 0,
            Retirement::Real => 1,
        }
    }
}

impl TryFrom<u8> for Retirement {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Retirement::Bogus),
            1 => Ok(Retirement::Real),
            other => Err(format!("retirement must be 0 or 1, got {}", other)),
        }
    }
}

/// Normalised classification event handed over by the ingestion layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub user: UserId,
    pub subject: SubjectId,
    pub vote: Vote,
    pub id: ClassificationId,
}

/// Entry of the flat classification log replayed by offline EM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub user: UserId,
    pub subject: SubjectId,
    pub vote: Vote,
}
