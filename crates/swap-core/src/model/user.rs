//! Volunteer skill model.
//!
//! A user accumulates `(subject, gold-at-vote-time, vote)` entries and turns
//! the ones with a known gold label into per-class counts. Skill is the
//! Laplace-smoothed hit rate per class:
//!
//! ```text
//! PD = (correct[0] + gamma) / (seen[0] + 2 gamma)
//! PL = (correct[1] + gamma) / (seen[1] + 2 gamma)
//! ```
//!
//! Buffered history can be folded into the prior with [`User::truncate`],
//! after which the raw votes are gone for good.

use serde::{Deserialize, Serialize};
use swap_common::{SubjectId, UserId};
use swap_math::{laplace_rate, Skill};

use super::{Gold, Subject, Vote};
use crate::collection::Keyed;

/// One vote as remembered by the user.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UserVote {
    pub subject: SubjectId,
    pub gold: Gold,
    pub vote: Vote,
}

/// Per-class tallies. Index 0 is bogus, index 1 is real.
///
/// Counts are fractional because the offline back-fill synthesizes them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Counts {
    pub correct: [f64; 2],
    pub seen: [f64; 2],
    /// Votes on subjects without a gold label.
    #[serde(default)]
    pub other_seen: f64,
}

fn default_gamma() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: Option<String>,
    #[serde(default = "default_gamma")]
    gamma: f64,
    prior: Counts,
    counts: Counts,
    history: Vec<UserVote>,
}

impl Keyed for User {
    type Key = UserId;

    fn key(&self) -> &UserId {
        &self.id
    }
}

impl User {
    pub fn new(id: UserId, name: Option<String>, gamma: f64) -> Self {
        Self {
            id,
            name,
            gamma,
            prior: Counts::default(),
            counts: Counts::default(),
            history: Vec::new(),
        }
    }

    /// Record a vote; skill is not touched until [`User::update_score`].
    pub fn classify(&mut self, subject: &Subject, vote: Vote) {
        self.history.push(UserVote {
            subject: subject.id,
            gold: subject.gold,
            vote,
        });
    }

    /// Backfill the subject's current gold label into matching entries.
    pub fn update_subject(&mut self, subject: &Subject) {
        for entry in self.history.iter_mut().filter(|h| h.subject == subject.id) {
            entry.gold = subject.gold;
        }
    }

    /// Backfill gold for every entry whose subject `lookup` resolves.
    pub fn backfill_golds(&mut self, lookup: impl Fn(&SubjectId) -> Option<Gold>) {
        for entry in &mut self.history {
            if let Some(gold) = lookup(&entry.subject) {
                entry.gold = gold;
            }
        }
    }

    /// Current `(PD, PL)`.
    pub fn score(&self) -> Skill {
        Skill::new(
            laplace_rate(self.counts.correct[0], self.counts.seen[0], self.gamma),
            laplace_rate(self.counts.correct[1], self.counts.seen[1], self.gamma),
        )
    }

    /// Recompute counts as prior plus buffered history and return the skill.
    ///
    /// Votes on subjects without gold only bump `other_seen`.
    pub fn update_score(&mut self) -> Skill {
        let mut counts = self.prior;
        for entry in &self.history {
            match entry.gold.index() {
                Some(class) => {
                    counts.seen[class] += 1.0;
                    if entry.vote.index() == class {
                        counts.correct[class] += 1.0;
                    }
                }
                None => counts.other_seen += 1.0,
            }
        }
        self.counts = counts;
        self.score()
    }

    /// Fold current counts into the prior and drop the raw history.
    ///
    /// Call [`User::update_score`] first or pending votes are lost.
    pub fn truncate(&mut self) {
        self.prior = self.counts;
        self.history.clear();
    }

    pub fn counts(&self) -> &Counts {
        &self.counts
    }

    pub fn prior(&self) -> &Counts {
        &self.prior
    }

    pub(crate) fn set_counts(&mut self, counts: Counts) {
        self.counts = counts;
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn history(&self) -> &[UserVote] {
        &self.history
    }

    /// Total graded votes.
    pub fn length(&self) -> f64 {
        self.counts.seen[0] + self.counts.seen[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject(id: u64, gold: Gold) -> Subject {
        let mut s = Subject::new(SubjectId(id), 0.01);
        s.gold = gold;
        s
    }

    #[test]
    fn unseen_user_scores_half() {
        let user = User::new(UserId::Id(1), None, 1.0);
        assert_eq!(user.score(), Skill::new(0.5, 0.5));
    }

    #[test]
    fn classify_defers_scoring() {
        let mut user = User::new(UserId::Id(1), None, 1.0);
        user.classify(&subject(1, Gold::Real), Vote::Real);
        assert_eq!(user.score(), Skill::new(0.5, 0.5));
        assert_eq!(user.history().len(), 1);
    }

    #[test]
    fn update_score_counts_gold_votes_only() {
        let mut user = User::new(UserId::Id(1), None, 1.0);
        user.classify(&subject(1, Gold::Real), Vote::Real);
        user.classify(&subject(2, Gold::Real), Vote::Bogus);
        user.classify(&subject(3, Gold::Bogus), Vote::Bogus);
        user.classify(&subject(4, Gold::Unknown), Vote::Real);

        let skill = user.update_score();
        assert_eq!(user.counts().seen, [1.0, 2.0]);
        assert_eq!(user.counts().correct, [1.0, 1.0]);
        assert_eq!(user.counts().other_seen, 1.0);
        assert!((skill.pd - 2.0 / 3.0).abs() < 1e-15);
        assert!((skill.pl - 2.0 / 4.0).abs() < 1e-15);
    }

    #[test]
    fn update_score_is_idempotent() {
        let mut user = User::new(UserId::Id(1), None, 1.0);
        user.classify(&subject(1, Gold::Real), Vote::Real);
        let first = user.update_score();
        let second = user.update_score();
        assert_eq!(first, second);
        assert_eq!(user.counts().seen, [0.0, 1.0]);
    }

    #[test]
    fn late_gold_is_backfilled_in_place() {
        let mut user = User::new(UserId::Id(1), None, 1.0);
        let mut s = subject(7, Gold::Unknown);
        user.classify(&subject(6, Gold::Bogus), Vote::Bogus);
        user.classify(&s, Vote::Real);
        s.gold = Gold::Real;
        user.update_subject(&s);

        let history = user.history();
        assert_eq!(history[0].subject, SubjectId(6));
        assert_eq!(history[1].gold, Gold::Real);
        assert_eq!(history[1].vote, Vote::Real);
        user.update_score();
        assert_eq!(user.counts().correct, [1.0, 1.0]);
    }

    #[test]
    fn truncate_keeps_counts_and_drops_history() {
        let mut user = User::new(UserId::Id(1), None, 1.0);
        user.classify(&subject(1, Gold::Real), Vote::Real);
        let before = user.update_score();
        user.truncate();
        assert!(user.history().is_empty());
        assert_eq!(user.update_score(), before);

        user.classify(&subject(2, Gold::Real), Vote::Real);
        user.update_score();
        assert_eq!(user.counts().seen, [0.0, 2.0]);
    }
}
