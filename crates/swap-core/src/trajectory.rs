//! Score trajectories for plotting and vote-count reporting.

use serde::{Deserialize, Serialize};
use swap_common::SubjectId;

use crate::model::{Gold, Subject};

/// Ordered posteriors of one subject, starting from its prior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: SubjectId,
    pub gold: Gold,
    pub prior: f64,
    /// Posterior after each vote in the retained history.
    pub scores: Vec<f64>,
}

impl Trajectory {
    pub fn from_subject(subject: &Subject) -> Self {
        Self {
            id: subject.id,
            gold: subject.gold,
            prior: subject.prior(),
            scores: subject.trajectory(),
        }
    }

    /// Final posterior, or the prior when nobody voted.
    pub fn last(&self) -> f64 {
        self.scores.last().copied().unwrap_or(self.prior)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Number of votes after which the trajectory first left the undecided
    /// band `(bogus, real)`, or `None` if it never did.
    pub fn retirement_point(&self, cutoffs: (f64, f64)) -> Option<usize> {
        let (bogus, real) = cutoffs;
        self.scores
            .iter()
            .position(|&p| p <= bogus || p >= real)
            .map(|idx| idx + 1)
    }
}
