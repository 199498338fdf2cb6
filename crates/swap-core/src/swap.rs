//! The estimator: users, subjects, thresholds and the classification log.
//!
//! Online use is a loop of [`Swap::classify`] over a stream followed by one
//! batch [`Swap::cycle`]:
//!
//! 1. `score_users` refreshes every skill from buffered history,
//! 2. `apply_subjects` pushes the refreshed skills into the snapshots of
//!    every vote those users cast,
//! 3. `score_subjects` replays every posterior with the refreshed skills.
//!
//! Because step 2 overwrites vote-time snapshots, the posteriors after a
//! cycle are a two-pass batch recompute, not a strict streaming replay.

use std::collections::{HashMap, HashSet};

use swap_common::{ClassificationId, Config, SubjectId, UserId};

use crate::collection::{subject_factory, user_factory, Collection, Subjects, Users};
use crate::logging::{event_names, LogContext, Stage};
use crate::log_event;
use crate::model::{Classification, ClassificationRecord, Gold, Retirement, Subject, User, Vote};
use crate::thresholds::Thresholds;
use crate::trajectory::Trajectory;

#[derive(Debug, Clone)]
pub struct Swap {
    pub(crate) name: String,
    pub(crate) config: Config,
    pub(crate) users: Users,
    pub(crate) subjects: Subjects,
    pub(crate) thresholds: Option<Thresholds>,
    pub(crate) last_id: Option<ClassificationId>,
    pub(crate) seen: HashSet<(UserId, SubjectId)>,
    pub(crate) classifications: Vec<ClassificationRecord>,
    pub(crate) ctx: LogContext,
}

/// Outcome of a retirement pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetirementCounts {
    pub real: usize,
    pub bogus: usize,
    /// Gold subjects left out of retirement.
    pub exempt: usize,
    /// Subjects retired by an earlier pass, decision unchanged.
    pub kept: usize,
}

impl Swap {
    /// Empty estimator. Entities are created with the config's `p0` and
    /// `gamma`.
    pub fn new(name: impl Into<String>, config: Config) -> Self {
        let name = name.into();
        Self {
            ctx: LogContext::for_estimator(name.clone()),
            users: Collection::new(user_factory(config.gamma)),
            subjects: Collection::new(subject_factory(config.p0)),
            name,
            config,
            thresholds: None,
            last_id: None,
            seen: HashSet::new(),
            classifications: Vec::new(),
        }
    }

    /// Replace the logging context attached to every event.
    pub fn with_log_context(mut self, ctx: LogContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Record one vote. Returns `false` when the `(user, subject)` pair was
    /// already ingested; the vote is then ignored.
    ///
    /// `last_id` advances for duplicates too, so a resumed stream never
    /// re-reads them.
    pub fn classify(
        &mut self,
        user: UserId,
        subject: SubjectId,
        vote: Vote,
        id: ClassificationId,
    ) -> bool {
        if self.last_id.is_none_or(|last| id > last) {
            self.last_id = Some(id);
        }

        if self.seen.contains(&(user.clone(), subject)) {
            log_event!(
                self.ctx,
                DEBUG,
                event_names::INGEST_DUPLICATE,
                Stage::Ingest,
                "duplicate classification ignored",
                user = tracing::field::display(&user),
                subject = subject.0,
                classification = id.0
            );
            return false;
        }
        self.seen.insert((user.clone(), subject));

        let u = self.users.get_or_create(&user);
        let s = self.subjects.get_or_create(&subject);
        u.classify(s, vote);
        s.classify(u, vote);

        self.classifications.push(ClassificationRecord {
            user,
            subject,
            vote,
        });
        true
    }

    /// [`Swap::classify`] for an already normalised event.
    pub fn ingest(&mut self, classification: Classification) -> bool {
        let Classification {
            user,
            subject,
            vote,
            id,
        } = classification;
        self.classify(user, subject, vote, id)
    }

    /// Attach a display name to a user that has none yet.
    pub fn name_user(&mut self, user: &UserId, name: &str) {
        if let Some(u) = self.users.get_mut(user) {
            if u.name.is_none() {
                u.name = Some(name.to_string());
            }
        }
    }

    /// One online batch cycle: skills, then snapshots, then posteriors.
    pub fn cycle(&mut self) {
        self.score_users();
        self.apply_subjects();
        self.score_subjects();
        log_event!(
            self.ctx,
            INFO,
            event_names::SCORE_CYCLE_FINISHED,
            Stage::Score,
            "scoring cycle finished",
            users = self.users.len(),
            subjects = self.subjects.len()
        );
    }

    /// Recompute every user's skill from prior plus history.
    pub fn score_users(&mut self) {
        for user in self.users.iter_mut() {
            user.update_score();
        }
        log_event!(
            self.ctx,
            DEBUG,
            event_names::SCORE_USERS,
            Stage::Score,
            "user skills refreshed",
            users = self.users.len()
        );
    }

    /// Push each user's current skill into the snapshots of the votes the
    /// user cast.
    pub fn apply_subjects(&mut self) {
        for user in self.users.iter() {
            for entry in user.history() {
                if let Some(subject) = self.subjects.get_mut(&entry.subject) {
                    subject.update_user(user);
                }
            }
        }
    }

    /// Replay every subject posterior.
    pub fn score_subjects(&mut self) {
        for subject in self.subjects.iter_mut() {
            subject.update_score();
        }
        log_event!(
            self.ctx,
            DEBUG,
            event_names::SCORE_SUBJECTS,
            Stage::Score,
            "subject posteriors refreshed",
            subjects = self.subjects.len()
        );
    }

    /// Calibrate cutoffs on the gold subjects and retire every undecided
    /// subject.
    ///
    /// A retirement decision is final: subjects retired by an earlier pass
    /// keep it even if later votes move their score back into the undecided
    /// band. Gold subjects are unretired unless `config.retire_gold` is set.
    pub fn retire(&mut self, fpr: f64, mdr: f64) -> &Thresholds {
        let thresholds = Thresholds::compute(
            &self.subjects,
            fpr,
            mdr,
            (self.config.p_retire_dud, self.config.p_retire_lens),
        );
        let cutoffs = thresholds.cutoffs();
        log_event!(
            self.ctx,
            INFO,
            event_names::RETIRE_THRESHOLDS,
            Stage::Retire,
            "retirement cutoffs computed",
            fpr = fpr,
            mdr = mdr,
            bogus_cutoff = cutoffs.0,
            real_cutoff = cutoffs.1
        );

        let counts = self.retire_with(cutoffs);
        log_event!(
            self.ctx,
            INFO,
            event_names::RETIRE_FINISHED,
            Stage::Retire,
            "retirement pass finished",
            retired_real = counts.real,
            retired_bogus = counts.bogus,
            gold_exempt = counts.exempt,
            kept = counts.kept
        );

        self.thresholds.insert(thresholds)
    }

    /// Retire with the configured target rates.
    pub fn retire_default(&mut self) -> &Thresholds {
        let (fpr, mdr) = (self.config.fpr, self.config.mdr);
        self.retire(fpr, mdr)
    }

    fn retire_with(&mut self, cutoffs: (f64, f64)) -> RetirementCounts {
        let retire_gold = self.config.retire_gold;
        let mut counts = RetirementCounts::default();
        for subject in self.subjects.iter_mut() {
            if subject.gold.is_known() && !retire_gold {
                subject.unretire();
                counts.exempt += 1;
                continue;
            }
            let decision = match subject.retired() {
                Some(previous) => {
                    counts.kept += 1;
                    Some(previous)
                }
                None => subject.retire(cutoffs),
            };
            match decision {
                Some(Retirement::Real) => counts.real += 1,
                Some(Retirement::Bogus) => counts.bogus += 1,
                None => {}
            }
        }
        counts
    }

    /// Label one subject and backfill the label into its voters' histories.
    pub fn apply_gold(&mut self, subject: SubjectId, gold: Gold) {
        self.subjects.get_or_create(&subject).gold = gold;
        let Some(s) = self.subjects.get(&subject) else {
            return;
        };
        for voter in s.voters() {
            if let Some(user) = self.users.get_mut(voter) {
                user.update_subject(s);
            }
        }
    }

    /// Label many subjects with a single pass over user histories.
    ///
    /// New subjects are created in input order; a repeated subject keeps its
    /// last label.
    pub fn apply_golds(&mut self, golds: impl IntoIterator<Item = (SubjectId, Gold)>) {
        let mut labels = HashMap::new();
        for (id, gold) in golds {
            self.subjects.get_or_create(&id).gold = gold;
            labels.insert(id, gold);
        }
        for user in self.users.iter_mut() {
            user.backfill_golds(|id| labels.get(id).copied());
        }
        log_event!(
            self.ctx,
            INFO,
            event_names::GOLD_APPLIED,
            Stage::Gold,
            "gold labels applied",
            golds = labels.len()
        );
    }

    /// Fold every user's and subject's history into its prior.
    ///
    /// Run [`Swap::cycle`] first; unscored history is lost.
    pub fn truncate(&mut self) {
        for user in self.users.iter_mut() {
            user.truncate();
        }
        for subject in self.subjects.iter_mut() {
            subject.truncate();
        }
    }

    /// Score trajectory of one subject.
    pub fn trajectory(&self, subject: &SubjectId) -> Option<Trajectory> {
        self.subjects.get(subject).map(Trajectory::from_subject)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn users(&self) -> &Users {
        &self.users
    }

    pub fn subjects(&self) -> &Subjects {
        &self.subjects
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.get(id)
    }

    pub fn subject(&self, id: &SubjectId) -> Option<&Subject> {
        self.subjects.get(id)
    }

    /// Record of the last retirement pass.
    pub fn thresholds(&self) -> Option<&Thresholds> {
        self.thresholds.as_ref()
    }

    /// Highest classification id offered so far, duplicates included.
    pub fn last_id(&self) -> Option<ClassificationId> {
        self.last_id
    }

    /// Whether the pair has already contributed its vote.
    pub fn is_seen(&self, user: &UserId, subject: SubjectId) -> bool {
        self.seen.contains(&(user.clone(), subject))
    }

    /// Ingested votes in arrival order.
    pub fn classifications(&self) -> &[ClassificationRecord] {
        &self.classifications
    }

    pub fn log_context(&self) -> &LogContext {
        &self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swap_math::bayes_step;
    use swap_math::Skill;

    fn config(p0: f64) -> Config {
        Config {
            p0,
            ..Config::default()
        }
    }

    #[test]
    fn duplicates_are_ignored_but_advance_last_id() {
        let mut swap = Swap::new("t", config(0.1));
        assert!(swap.classify(UserId::Id(1), SubjectId(1), Vote::Real, ClassificationId(5)));
        assert!(!swap.classify(UserId::Id(1), SubjectId(1), Vote::Bogus, ClassificationId(9)));
        assert_eq!(swap.last_id(), Some(ClassificationId(9)));
        assert_eq!(swap.classifications().len(), 1);
        assert_eq!(swap.subject(&SubjectId(1)).unwrap().seen(), 1);
        assert!(swap.is_seen(&UserId::Id(1), SubjectId(1)));
    }

    #[test]
    fn last_id_tolerates_out_of_order_ids() {
        let mut swap = Swap::new("t", config(0.1));
        swap.classify(UserId::Id(1), SubjectId(1), Vote::Real, ClassificationId(10));
        swap.classify(UserId::Id(2), SubjectId(1), Vote::Real, ClassificationId(3));
        assert_eq!(swap.last_id(), Some(ClassificationId(10)));
    }

    #[test]
    fn late_gold_reaches_user_skill() {
        let mut swap = Swap::new("t", config(0.1));
        swap.classify(UserId::Id(1), SubjectId(1), Vote::Real, ClassificationId(1));
        swap.cycle();
        assert_eq!(swap.user(&UserId::Id(1)).unwrap().score(), Skill::new(0.5, 0.5));

        swap.apply_gold(SubjectId(1), Gold::Real);
        swap.cycle();
        let skill = swap.user(&UserId::Id(1)).unwrap().score();
        assert!((skill.pl - 2.0 / 3.0).abs() < 1e-15);
        assert_eq!(skill.pd, 0.5);
    }

    #[test]
    fn apply_golds_matches_apply_gold() {
        let mut a = Swap::new("a", config(0.1));
        let mut b = Swap::new("b", config(0.1));
        for swap in [&mut a, &mut b] {
            swap.classify(UserId::Id(1), SubjectId(1), Vote::Real, ClassificationId(1));
            swap.classify(UserId::Id(1), SubjectId(2), Vote::Real, ClassificationId(2));
            swap.classify(UserId::Id(2), SubjectId(2), Vote::Bogus, ClassificationId(3));
        }
        a.apply_gold(SubjectId(1), Gold::Real);
        a.apply_gold(SubjectId(2), Gold::Bogus);
        b.apply_golds([(SubjectId(1), Gold::Real), (SubjectId(2), Gold::Bogus)]);
        a.cycle();
        b.cycle();
        for id in [UserId::Id(1), UserId::Id(2)] {
            assert_eq!(a.user(&id).unwrap().counts(), b.user(&id).unwrap().counts());
        }
    }

    #[test]
    fn gold_for_unknown_subject_creates_it() {
        let mut swap = Swap::new("t", config(0.1));
        swap.apply_gold(SubjectId(42), Gold::Bogus);
        assert_eq!(swap.subject(&SubjectId(42)).unwrap().gold, Gold::Bogus);
    }

    #[test]
    fn cycle_uses_refreshed_skills() {
        let mut swap = Swap::new("t", config(0.1));
        // user 1 earns skill on gold subjects, then votes on subject 100
        swap.apply_golds([(SubjectId(1), Gold::Real), (SubjectId(2), Gold::Bogus)]);
        swap.classify(UserId::Id(1), SubjectId(1), Vote::Real, ClassificationId(1));
        swap.classify(UserId::Id(1), SubjectId(2), Vote::Bogus, ClassificationId(2));
        swap.classify(UserId::Id(1), SubjectId(100), Vote::Real, ClassificationId(3));
        swap.cycle();

        let skill = swap.user(&UserId::Id(1)).unwrap().score();
        assert_eq!(skill, Skill::new(2.0 / 3.0, 2.0 / 3.0));
        let expected = bayes_step(0.1, skill, true);
        assert_eq!(swap.subject(&SubjectId(100)).unwrap().score(), expected);
    }

    #[test]
    fn gold_subjects_are_exempt_from_retirement() {
        let mut swap = Swap::new("t", config(0.5));
        swap.apply_gold(SubjectId(1), Gold::Real);
        swap.subjects.get_or_create(&SubjectId(1)).set_score(0.99);
        swap.subjects.get_or_create(&SubjectId(2)).set_score(0.99);
        swap.retire(0.01, 0.1);
        assert_eq!(swap.subject(&SubjectId(1)).unwrap().retired(), None);
        assert_eq!(
            swap.subject(&SubjectId(2)).unwrap().retired(),
            Some(Retirement::Real)
        );

        swap.config.retire_gold = true;
        swap.retire(0.01, 0.1);
        assert_eq!(
            swap.subject(&SubjectId(1)).unwrap().retired(),
            Some(Retirement::Real)
        );
    }

    #[test]
    fn retirement_survives_later_votes() {
        let mut swap = Swap::new("t", config(0.5));
        swap.subjects.get_or_create(&SubjectId(1)).set_score(1e-4);
        swap.subjects.get_or_create(&SubjectId(2)).set_score(0.5);
        let first = swap.retire(0.01, 0.1).cutoffs();
        assert_eq!(first, (1e-3, 0.9));
        assert_eq!(
            swap.subject(&SubjectId(1)).unwrap().retired(),
            Some(Retirement::Bogus)
        );

        // new evidence lifts the retired subject back into the undecided band
        swap.subjects.get_or_create(&SubjectId(1)).set_score(0.5);
        swap.subjects.get_or_create(&SubjectId(2)).set_score(0.95);
        swap.retire(0.01, 0.1);
        assert_eq!(
            swap.subject(&SubjectId(1)).unwrap().retired(),
            Some(Retirement::Bogus)
        );
        assert_eq!(
            swap.subject(&SubjectId(2)).unwrap().retired(),
            Some(Retirement::Real)
        );
    }

    #[test]
    fn apply_golds_keeps_input_order() {
        let mut swap = Swap::new("t", config(0.1));
        swap.classify(UserId::Id(1), SubjectId(7), Vote::Real, ClassificationId(1));
        let order: Vec<u64> = (0..20).rev().collect();
        swap.apply_golds(order.iter().map(|&s| (SubjectId(s), Gold::Real)));

        let ids: Vec<u64> = swap.subjects().iter().map(|s| s.id.0).collect();
        let mut expected = vec![7];
        expected.extend(order.iter().copied().filter(|&s| s != 7));
        assert_eq!(ids, expected);
    }

    #[test]
    fn apply_golds_last_label_wins() {
        let mut swap = Swap::new("t", config(0.1));
        swap.classify(UserId::Id(1), SubjectId(3), Vote::Real, ClassificationId(1));
        swap.apply_golds([(SubjectId(3), Gold::Bogus), (SubjectId(3), Gold::Real)]);
        swap.cycle();
        assert_eq!(swap.subject(&SubjectId(3)).unwrap().gold, Gold::Real);
        assert_eq!(swap.user(&UserId::Id(1)).unwrap().counts().seen[1], 1.0);
    }

    #[test]
    fn retire_stores_thresholds() {
        let mut swap = Swap::new("t", config(0.5));
        swap.classify(UserId::Id(1), SubjectId(1), Vote::Real, ClassificationId(1));
        swap.cycle();
        let cutoffs = swap.retire_default().cutoffs();
        assert_eq!(cutoffs, (1e-3, 0.9));
        assert_eq!(swap.thresholds().unwrap().scores.len(), 1);
    }

    #[test]
    fn truncate_preserves_scores() {
        let mut swap = Swap::new("t", config(0.1));
        swap.apply_gold(SubjectId(1), Gold::Real);
        swap.classify(UserId::Id(1), SubjectId(1), Vote::Real, ClassificationId(1));
        swap.classify(UserId::Id(1), SubjectId(2), Vote::Real, ClassificationId(2));
        swap.cycle();
        let score = swap.subject(&SubjectId(2)).unwrap().score();
        let skill = swap.user(&UserId::Id(1)).unwrap().score();

        swap.truncate();
        swap.cycle();
        assert_eq!(swap.subject(&SubjectId(2)).unwrap().score(), score);
        assert_eq!(swap.user(&UserId::Id(1)).unwrap().score(), skill);
        assert!(swap.subject(&SubjectId(2)).unwrap().history().is_empty());
    }

    #[test]
    fn trajectory_follows_votes() {
        let mut swap = Swap::new("t", config(0.1));
        swap.classify(UserId::Id(1), SubjectId(1), Vote::Real, ClassificationId(1));
        swap.classify(UserId::Id(2), SubjectId(1), Vote::Bogus, ClassificationId(2));
        swap.cycle();
        let t = swap.trajectory(&SubjectId(1)).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.last(), swap.subject(&SubjectId(1)).unwrap().score());
        assert!(swap.trajectory(&SubjectId(9)).is_none());
    }
}
