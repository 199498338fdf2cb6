//! Skill rates and single-vote Bayesian updates.
//!
//! A voter is described by a confusion pair `(pd, pl)`: the probability of
//! calling a bogus subject bogus and a real subject real. Votes are binary,
//! `true` meaning "real".

use serde::{Deserialize, Serialize};

/// Skill reported for a class the voter has never been graded on.
pub const UNSEEN_RATE: f64 = 0.5;

/// Confusion pair for one voter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// True-negative rate.
    pub pd: f64,
    /// True-positive rate.
    pub pl: f64,
}

impl Default for Skill {
    fn default() -> Self {
        Self {
            pd: UNSEEN_RATE,
            pl: UNSEEN_RATE,
        }
    }
}

impl Skill {
    pub fn new(pd: f64, pl: f64) -> Self {
        Self { pd, pl }
    }

    /// Likelihood of `vote` under each hypothesis, as `(real, bogus)`.
    pub fn likelihoods(&self, vote: bool) -> (f64, f64) {
        if vote {
            (self.pl, 1.0 - self.pd)
        } else {
            (1.0 - self.pl, self.pd)
        }
    }
}

/// Laplace-smoothed success rate `(correct + gamma) / (seen + 2 gamma)`.
///
/// Returns [`UNSEEN_RATE`] when nothing has been seen.
pub fn laplace_rate(correct: f64, seen: f64, gamma: f64) -> f64 {
    if seen > 0.0 {
        (correct + gamma) / (seen + 2.0 * gamma)
    } else {
        UNSEEN_RATE
    }
}

/// One step of the sequential posterior update for a single vote.
///
/// A zero denominator leaves the prior untouched.
pub fn bayes_step(prior: f64, skill: Skill, vote: bool) -> f64 {
    let (real, bogus) = skill.likelihoods(vote);
    let numer = prior * real;
    let denom = numer + (1.0 - prior) * bogus;
    if denom <= 0.0 || !denom.is_finite() {
        return prior;
    }
    (numer / denom).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_rate_is_half() {
        assert_eq!(laplace_rate(0.0, 0.0, 1.0), 0.5);
    }

    #[test]
    fn laplace_rate_smooths() {
        assert!((laplace_rate(3.0, 4.0, 1.0) - 4.0 / 6.0).abs() < 1e-15);
    }

    #[test]
    fn positive_vote_raises_posterior() {
        let skill = Skill::new(0.9, 0.9);
        let post = bayes_step(0.01, skill, true);
        let expected = 0.01 * 0.9 / (0.01 * 0.9 + (1.0 - 0.01) * (1.0 - 0.9));
        assert_eq!(post, expected);
    }

    #[test]
    fn uninformative_voter_keeps_prior() {
        let post = bayes_step(0.3, Skill::default(), true);
        assert!((post - 0.3).abs() < 1e-15);
    }

    #[test]
    fn degenerate_denominator_keeps_prior() {
        let skill = Skill::new(1.0, 0.0);
        assert_eq!(bayes_step(1.0, skill, true), 1.0);
    }
}
