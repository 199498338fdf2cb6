//! Retirement cutoffs calibrated on gold subjects.
//!
//! Given target error rates, the bogus cutoff is the largest real-gold
//! score such that at most `floor(mdr * n_real)` real gold subjects score at
//! or below it, and the real cutoff is the smallest bogus-gold score such
//! that at most `floor(fpr * n_bogus)` bogus gold subjects score at or above
//! it. Cutoffs are recomputed from scratch on every retirement pass.

use serde::{Deserialize, Serialize};
use swap_common::SubjectId;
use swap_math::{lower_tail_cutoff, upper_tail_cutoff};

use crate::collection::Subjects;
use crate::model::Gold;

/// Where a cutoff value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CutoffSource {
    /// Empirical quantile over gold scores.
    Calibrated,
    /// Gold exists but no score satisfies the target; pinned to 0 or 1.
    Unattainable,
    /// No gold of the calibrating class; configured fallback.
    Fallback,
}

/// Score of one subject at threshold time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub id: SubjectId,
    pub gold: Gold,
    pub score: f64,
}

/// Flat, persisted threshold record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Target false-positive rate.
    pub fpr: f64,
    /// Target missed-detection rate.
    pub mdr: f64,
    pub bogus_cutoff: f64,
    pub real_cutoff: f64,
    pub bogus_source: CutoffSource,
    pub real_source: CutoffSource,
    /// Every subject's score when the cutoffs were computed.
    pub scores: Vec<ScoreRecord>,
}

impl Thresholds {
    /// Calibrate cutoffs against the current subject scores.
    ///
    /// `fallback` is the `(bogus, real)` pair used for a side whose
    /// calibrating gold class is empty.
    pub fn compute(subjects: &Subjects, fpr: f64, mdr: f64, fallback: (f64, f64)) -> Self {
        let scores: Vec<ScoreRecord> = subjects
            .iter()
            .map(|s| ScoreRecord {
                id: s.id,
                gold: s.gold,
                score: s.score(),
            })
            .collect();

        let real_gold = sorted_scores(&scores, Gold::Real);
        let bogus_gold = sorted_scores(&scores, Gold::Bogus);

        let (mut bogus_cutoff, bogus_source) = if real_gold.is_empty() {
            (fallback.0, CutoffSource::Fallback)
        } else {
            match lower_tail_cutoff(&real_gold, mdr) {
                Some(c) => (c, CutoffSource::Calibrated),
                None => (0.0, CutoffSource::Unattainable),
            }
        };
        let (mut real_cutoff, real_source) = if bogus_gold.is_empty() {
            (fallback.1, CutoffSource::Fallback)
        } else {
            match upper_tail_cutoff(&bogus_gold, fpr) {
                Some(c) => (c, CutoffSource::Calibrated),
                None => (1.0, CutoffSource::Unattainable),
            }
        };

        // Overlapping gold distributions can cross the cutoffs; widen the
        // undecided band instead of letting the two retirement regions meet.
        if bogus_cutoff > real_cutoff {
            std::mem::swap(&mut bogus_cutoff, &mut real_cutoff);
        }
        if bogus_cutoff == real_cutoff {
            real_cutoff = real_cutoff.next_up();
        }

        Self {
            fpr,
            mdr,
            bogus_cutoff,
            real_cutoff,
            bogus_source,
            real_source,
            scores,
        }
    }

    /// `(bogus_cutoff, real_cutoff)`.
    pub fn cutoffs(&self) -> (f64, f64) {
        (self.bogus_cutoff, self.real_cutoff)
    }

    /// Per-gold-class tally of where the recorded scores fall.
    pub fn breakdown(&self) -> RetirementBreakdown {
        let mut breakdown = RetirementBreakdown::default();
        for record in &self.scores {
            let row = match record.gold {
                Gold::Bogus => &mut breakdown.bogus,
                Gold::Real => &mut breakdown.real,
                Gold::Unknown => &mut breakdown.unknown,
            };
            row.total += 1;
            if record.score >= self.real_cutoff {
                row.retired_real += 1;
            } else if record.score <= self.bogus_cutoff {
                row.retired_bogus += 1;
            } else {
                row.inconclusive += 1;
            }
        }
        breakdown
    }
}

fn sorted_scores(scores: &[ScoreRecord], gold: Gold) -> Vec<f64> {
    let mut values: Vec<f64> = scores
        .iter()
        .filter(|r| r.gold == gold)
        .map(|r| r.score)
        .collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

/// Counts for one gold class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassTally {
    pub total: usize,
    pub retired_real: usize,
    pub retired_bogus: usize,
    pub inconclusive: usize,
}

/// Retirement outcome by gold class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetirementBreakdown {
    pub bogus: ClassTally,
    pub real: ClassTally,
    pub unknown: ClassTally,
}
