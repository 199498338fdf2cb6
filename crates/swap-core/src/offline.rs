//! Offline EM refinement over the full classification log.
//!
//! Alternates between re-estimating every subject probability from the
//! current user confusions (E-step) and every user confusion from the
//! current probabilities (M-step). The M-step weights each vote by
//! `p_i`, the probability that its subject is real:
//!
//! ```text
//! PD = (gamma + sum (1 - v)(1 - p_i)) / (2 gamma + sum (1 - p_i))
//! PL = (gamma + sum v p_i)             / (2 gamma + sum p_i)
//! ```
//!
//! | unsupervised | ignore_gold_status | votes used         | `p_i` for gold subjects |
//! |--------------|--------------------|--------------------|-------------------------|
//! | no           | no                 | gold subjects only | forced to 0 or 1        |
//! | no           | yes                | gold subjects only | estimate                |
//! | yes          | no                 | all                | forced to 0 or 1        |
//! | yes          | yes                | all                | estimate                |
//!
//! Users and subjects absent from the log are left untouched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use swap_common::{EStep, SkillBackfill, SubjectId, UserId};
use swap_math::{ln_floor, mean_abs_change, two_class_share, Skill};

use crate::logging::{event_names, Stage};
use crate::log_event;
use crate::model::{Counts, Gold};
use crate::swap::Swap;

/// How gold labels take part in the M-step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineOptions {
    /// Count votes on subjects without gold.
    pub unsupervised: bool,
    /// Weight gold votes by the estimate instead of the label.
    pub ignore_gold_status: bool,
}

impl OfflineOptions {
    /// Gold labels are authoritative and nothing else is learned from.
    pub fn is_supervised(&self) -> bool {
        !self.unsupervised && !self.ignore_gold_status
    }
}

/// Summary of one EM run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OfflineReport {
    pub iterations: usize,
    /// Mean absolute probability change of the last iteration.
    pub convergence: f64,
    pub converged: bool,
    pub users: usize,
    pub subjects: usize,
}

struct EmVote {
    user: usize,
    subject: usize,
    vote: f64,
    gold: Gold,
}

/// Dense view of the classification log.
struct EmData {
    users: Vec<UserId>,
    subjects: Vec<SubjectId>,
    votes: Vec<EmVote>,
    /// Vote indices per subject.
    by_subject: Vec<Vec<usize>>,
    p0: Vec<f64>,
}

impl EmData {
    fn build(swap: &Swap) -> Self {
        let mut user_index: HashMap<&UserId, usize> = HashMap::new();
        let mut subject_index: HashMap<SubjectId, usize> = HashMap::new();
        let mut users = Vec::new();
        let mut subjects = Vec::new();
        let mut votes = Vec::with_capacity(swap.classifications.len());

        for record in &swap.classifications {
            let user = *user_index.entry(&record.user).or_insert_with(|| {
                users.push(record.user.clone());
                users.len() - 1
            });
            let subject = *subject_index.entry(record.subject).or_insert_with(|| {
                subjects.push(record.subject);
                subjects.len() - 1
            });
            let gold = swap
                .subjects
                .get(&record.subject)
                .map(|s| s.gold)
                .unwrap_or_default();
            votes.push(EmVote {
                user,
                subject,
                vote: record.vote.as_f64(),
                gold,
            });
        }

        let mut by_subject = vec![Vec::new(); subjects.len()];
        for (i, vote) in votes.iter().enumerate() {
            by_subject[vote.subject].push(i);
        }
        let p0 = subjects
            .iter()
            .map(|id| {
                swap.subjects
                    .get(id)
                    .map_or(swap.config.p0, |s| s.p0())
            })
            .collect();

        Self {
            users,
            subjects,
            votes,
            by_subject,
            p0,
        }
    }
}

impl Swap {
    /// Run EM over the classification log and write the result back.
    ///
    /// Converged confusions become user counts (see [`SkillBackfill`]),
    /// every user's skill is pushed into subject snapshots, and each
    /// subject score is then overwritten with its converged probability.
    /// Running out of iterations is not an error; the report says so.
    pub fn offline(&mut self, options: OfflineOptions) -> OfflineReport {
        let data = EmData::build(self);
        let cfg = self.config.offline.clone();
        let gamma = self.config.gamma;

        log_event!(
            self.ctx,
            INFO,
            event_names::OFFLINE_STARTED,
            Stage::Offline,
            "offline EM started",
            unsupervised = options.unsupervised,
            ignore_gold_status = options.ignore_gold_status,
            users = data.users.len(),
            subjects = data.subjects.len(),
            votes = data.votes.len()
        );

        if data.votes.is_empty() {
            log_event!(
                self.ctx,
                WARN,
                event_names::OFFLINE_FINISHED,
                Stage::Offline,
                "no classifications to refine"
            );
            return OfflineReport {
                iterations: 0,
                convergence: 0.0,
                converged: true,
                users: 0,
                subjects: 0,
            };
        }

        let mut confusions: Vec<Skill> = data
            .users
            .iter()
            .map(|id| self.users.get(id).map(|u| u.score()).unwrap_or_default())
            .collect();
        let mut probabilities: Vec<f64> = data
            .subjects
            .iter()
            .zip(&data.p0)
            .map(|(id, &p0)| self.subjects.get(id).map_or(p0, |s| s.score()))
            .collect();

        let min_iterations = if options.is_supervised() {
            cfg.min_iterations_supervised
        } else {
            cfg.min_iterations_unsupervised
        };

        let mut iterations = 0;
        let mut convergence = f64::INFINITY;
        while (convergence > cfg.epsilon && iterations < cfg.max_iterations)
            || iterations < min_iterations
        {
            let updated = e_step(&data, &confusions, &probabilities, cfg.e_step);
            convergence = mean_abs_change(&updated, &probabilities);
            probabilities = updated;

            let (numer, denom) = m_step_sums(&data, &probabilities, options);
            for (skill, (n, d)) in confusions.iter_mut().zip(numer.iter().zip(&denom)) {
                *skill = Skill::new(
                    (gamma + n[0]) / (2.0 * gamma + d[0]),
                    (gamma + n[1]) / (2.0 * gamma + d[1]),
                );
            }

            iterations += 1;
            log_event!(
                self.ctx,
                DEBUG,
                event_names::OFFLINE_ITERATION,
                Stage::Offline,
                "EM step",
                iteration = iterations,
                convergence = convergence
            );
        }
        let converged = convergence <= cfg.epsilon;

        let counts = match cfg.skill_backfill {
            SkillBackfill::PopulationScaled => population_scaled(&confusions, &probabilities, gamma),
            SkillBackfill::ExpectedCounts => {
                let (numer, denom) = m_step_sums(&data, &probabilities, options);
                numer
                    .iter()
                    .zip(&denom)
                    .map(|(n, d)| Counts {
                        correct: *n,
                        seen: *d,
                        other_seen: 0.0,
                    })
                    .collect()
            }
        };
        for (id, mut synthesized) in data.users.iter().zip(counts) {
            if let Some(user) = self.users.get_mut(id) {
                synthesized.other_seen = user.counts().other_seen;
                user.set_counts(synthesized);
            }
        }

        self.apply_subjects();

        for (id, &p) in data.subjects.iter().zip(&probabilities) {
            if let Some(subject) = self.subjects.get_mut(id) {
                subject.set_score(p);
            }
        }

        let report = OfflineReport {
            iterations,
            convergence,
            converged,
            users: data.users.len(),
            subjects: data.subjects.len(),
        };
        if converged {
            log_event!(
                self.ctx,
                INFO,
                event_names::OFFLINE_FINISHED,
                Stage::Offline,
                "offline EM finished",
                iterations = iterations,
                convergence = convergence
            );
        } else {
            log_event!(
                self.ctx,
                WARN,
                event_names::OFFLINE_NOT_CONVERGED,
                Stage::Offline,
                "offline EM hit the iteration cap",
                iterations = iterations,
                convergence = convergence
            );
        }
        report
    }
}

fn e_step(data: &EmData, confusions: &[Skill], previous: &[f64], rule: EStep) -> Vec<f64> {
    data.by_subject
        .iter()
        .enumerate()
        .map(|(s, vote_ids)| {
            if vote_ids.is_empty() {
                return previous[s];
            }
            let p0 = data.p0[s];
            match rule {
                EStep::JointLikelihood => {
                    let mut log_real = ln_floor(p0);
                    let mut log_bogus = ln_floor(1.0 - p0);
                    for &i in vote_ids {
                        let v = &data.votes[i];
                        let (real, bogus) = confusions[v.user].likelihoods(v.vote > 0.5);
                        log_real += ln_floor(real);
                        log_bogus += ln_floor(bogus);
                    }
                    two_class_share(log_real, log_bogus)
                }
                EStep::Averaged => {
                    let mut p_real = 0.0;
                    let mut p_bogus = 0.0;
                    for &i in vote_ids {
                        let v = &data.votes[i];
                        let (real, bogus) = confusions[v.user].likelihoods(v.vote > 0.5);
                        p_real += real * p0;
                        p_bogus += bogus * (1.0 - p0);
                    }
                    let total = p_real + p_bogus;
                    if total > 0.0 {
                        p_real / total / vote_ids.len() as f64
                    } else {
                        previous[s]
                    }
                }
            }
        })
        .collect()
}

/// Per-user `(numerators, denominators)` indexed `[bogus, real]`.
fn m_step_sums(
    data: &EmData,
    probabilities: &[f64],
    options: OfflineOptions,
) -> (Vec<[f64; 2]>, Vec<[f64; 2]>) {
    let mut numer = vec![[0.0; 2]; data.users.len()];
    let mut denom = vec![[0.0; 2]; data.users.len()];
    for v in &data.votes {
        if !options.unsupervised && !v.gold.is_known() {
            continue;
        }
        let p = if options.ignore_gold_status {
            probabilities[v.subject]
        } else {
            match v.gold {
                Gold::Bogus => 0.0,
                Gold::Real => 1.0,
                Gold::Unknown => probabilities[v.subject],
            }
        };
        numer[v.user][0] += (1.0 - v.vote) * (1.0 - p);
        numer[v.user][1] += v.vote * p;
        denom[v.user][0] += 1.0 - p;
        denom[v.user][1] += p;
    }
    (numer, denom)
}

/// Counts that reproduce each confusion through Laplace smoothing, scaled
/// by the population-wide expected number of real and bogus subjects.
///
/// Lossy: every user gets the same `seen`, and a class with fewer than
/// `2 gamma` expected subjects reads back as unseen.
fn population_scaled(confusions: &[Skill], probabilities: &[f64], gamma: f64) -> Vec<Counts> {
    let n_real: f64 = probabilities.iter().sum();
    let n_bogus = probabilities.len() as f64 - n_real;
    confusions
        .iter()
        .map(|skill| Counts {
            seen: [n_bogus - 2.0 * gamma, n_real - 2.0 * gamma],
            correct: [n_bogus * skill.pd - gamma, n_real * skill.pl - gamma],
            other_seen: 0.0,
        })
        .collect()
}
