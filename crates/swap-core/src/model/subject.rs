//! Subject posterior model.
//!
//! Each vote is stored with the voter's skill snapshot. The posterior is a
//! sequential Bayes update over that history in arrival order, starting
//! from the subject prior:
//!
//! ```text
//! p' = p * L_real / (p * L_real + (1 - p) * L_bogus)
//! L_real  = PL^v (1 - PL)^(1 - v)
//! L_bogus = (1 - PD)^v PD^(1 - v)
//! ```
//!
//! [`Subject::update_user`] overwrites snapshots with a voter's latest skill.
//! The batch cycle relies on this: skills are refreshed first and every
//! posterior is then replayed with final skills, so the result is a
//! two-pass recompute rather than a strict replay of what each voter knew
//! at vote time.

use serde::{Deserialize, Serialize};
use swap_common::{SubjectId, UserId};
use swap_math::{bayes_step, Skill};

use super::{Gold, Retirement, User, Vote};
use crate::collection::Keyed;

/// One vote as remembered by the subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectVote {
    pub user: UserId,
    pub skill: Skill,
    pub vote: Vote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub gold: Gold,
    p0: f64,
    /// Starting point of the replay; `p0` until the first truncation.
    prior: f64,
    score: f64,
    seen: u64,
    retired: Option<Retirement>,
    history: Vec<SubjectVote>,
}

impl Keyed for Subject {
    type Key = SubjectId;

    fn key(&self) -> &SubjectId {
        &self.id
    }
}

impl Subject {
    pub fn new(id: SubjectId, p0: f64) -> Self {
        Self {
            id,
            gold: Gold::Unknown,
            p0,
            prior: p0,
            score: p0,
            seen: 0,
            retired: None,
            history: Vec::new(),
        }
    }

    /// Record a vote together with the voter's current skill.
    pub fn classify(&mut self, user: &User, vote: Vote) {
        self.history.push(SubjectVote {
            user: user.id.clone(),
            skill: user.score(),
            vote,
        });
        self.seen += 1;
    }

    /// Replace the skill snapshot of every vote cast by `user`.
    pub fn update_user(&mut self, user: &User) {
        let skill = user.score();
        for entry in self.history.iter_mut().filter(|h| h.user == user.id) {
            entry.skill = skill;
        }
    }

    /// Replay the history and store the resulting posterior.
    pub fn update_score(&mut self) -> f64 {
        self.score = self.replay().last().copied().unwrap_or(self.prior);
        self.score
    }

    /// Posterior after each vote, in arrival order.
    pub fn trajectory(&self) -> Vec<f64> {
        self.replay()
    }

    fn replay(&self) -> Vec<f64> {
        let mut p = self.prior;
        self.history
            .iter()
            .map(|entry| {
                p = bayes_step(p, entry.skill, entry.vote.is_real());
                p
            })
            .collect()
    }

    /// Set the retirement state from a `(bogus, real)` cutoff pair.
    pub fn retire(&mut self, cutoffs: (f64, f64)) -> Option<Retirement> {
        let (bogus, real) = cutoffs;
        self.retired = if self.score <= bogus {
            Some(Retirement::Bogus)
        } else if self.score >= real {
            Some(Retirement::Real)
        } else {
            None
        };
        self.retired
    }

    /// Drop any retirement decision.
    pub fn unretire(&mut self) {
        self.retired = None;
    }

    /// Fold the history into the prior and clear it.
    pub fn truncate(&mut self) {
        self.prior = self.score;
        self.history.clear();
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub(crate) fn set_score(&mut self, score: f64) {
        self.score = score.clamp(0.0, 1.0);
    }

    pub fn p0(&self) -> f64 {
        self.p0
    }

    pub fn prior(&self) -> f64 {
        self.prior
    }

    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn retired(&self) -> Option<Retirement> {
        self.retired
    }

    pub fn history(&self) -> &[SubjectVote] {
        &self.history
    }

    /// Users who voted on this subject, in vote order.
    pub fn voters(&self) -> impl Iterator<Item = &UserId> {
        self.history.iter().map(|h| &h.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skilled_user(id: u64, pd_hits: usize, pl_hits: usize, n: usize) -> User {
        let mut user = User::new(UserId::Id(id), None, 1.0);
        for i in 0..n {
            let mut s = Subject::new(SubjectId(1000 + i as u64), 0.5);
            s.gold = Gold::Bogus;
            user.classify(&s, Vote::from_bool(i >= pd_hits));
            s.gold = Gold::Real;
            s.id = SubjectId(2000 + i as u64);
            user.classify(&s, Vote::from_bool(i < pl_hits));
        }
        user.update_score();
        user
    }

    #[test]
    fn no_votes_keeps_prior() {
        let mut s = Subject::new(SubjectId(1), 0.01);
        assert_eq!(s.update_score(), 0.01);
        assert!(s.trajectory().is_empty());
    }

    #[test]
    fn sequential_update_matches_hand_calculation() {
        // 8 of 8 correct on each class: PD = PL = 9/10
        let user = skilled_user(1, 8, 8, 8);
        assert_eq!(user.score(), Skill::new(0.9, 0.9));

        let mut s = Subject::new(SubjectId(1), 0.01);
        s.classify(&user, Vote::Real);
        s.classify(&user, Vote::Real);
        s.classify(&user, Vote::Bogus);
        let score = s.update_score();

        let (pd, pl) = (0.9_f64, 0.9_f64);
        let mut p: f64 = 0.01;
        p = p * pl / (p * pl + (1.0 - p) * (1.0 - pd));
        p = p * pl / (p * pl + (1.0 - p) * (1.0 - pd));
        p = p * (1.0 - pl) / (p * (1.0 - pl) + (1.0 - p) * pd);
        assert_eq!(score, p);
        assert_eq!(s.trajectory().len(), 3);
        assert_eq!(s.seen(), 3);
    }

    #[test]
    fn update_user_rewrites_snapshots() {
        let novice = User::new(UserId::Id(1), None, 1.0);
        let mut s = Subject::new(SubjectId(1), 0.2);
        s.classify(&novice, Vote::Real);
        assert_eq!(s.update_score(), 0.2);

        let expert = skilled_user(1, 8, 8, 8);
        s.update_user(&expert);
        assert_eq!(s.history()[0].skill, Skill::new(0.9, 0.9));
        assert!(s.update_score() > 0.2);
    }

    #[test]
    fn retire_uses_inclusive_cutoffs() {
        let mut s = Subject::new(SubjectId(1), 0.001);
        assert_eq!(s.retire((0.001, 0.9)), Some(Retirement::Bogus));
        s.set_score(0.9);
        assert_eq!(s.retire((0.001, 0.9)), Some(Retirement::Real));
        s.set_score(0.5);
        assert_eq!(s.retire((0.001, 0.9)), None);
    }

    #[test]
    fn truncate_folds_score_into_prior() {
        let user = skilled_user(1, 8, 8, 8);
        let mut s = Subject::new(SubjectId(1), 0.01);
        s.classify(&user, Vote::Real);
        let score = s.update_score();
        s.truncate();
        assert!(s.history().is_empty());
        assert_eq!(s.prior(), score);
        assert_eq!(s.update_score(), score);
        assert_eq!(s.seen(), 1);
    }
}
