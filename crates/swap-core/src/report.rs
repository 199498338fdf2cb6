//! Read-only summaries of an estimator.
//!
//! [`Report`] renders the plain-text report; [`export_subjects`] and
//! [`export_users`] write CSV tables. Nothing here mutates the estimator.

use std::fmt::Write as _;
use std::io::{self, Write};

use crate::model::{Retirement, Subject, User};
use crate::swap::Swap;
use crate::thresholds::{ClassTally, Thresholds};
use crate::trajectory::Trajectory;

/// Sections included in a text report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOptions {
    pub subjects: bool,
    pub users: bool,
    /// Per-entity vote listings inside the subject and user sections.
    pub classifications: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            subjects: true,
            users: true,
            classifications: true,
        }
    }
}

impl ReportOptions {
    /// Population and threshold summary only.
    pub fn summary() -> Self {
        Self {
            subjects: false,
            users: false,
            classifications: false,
        }
    }
}

pub struct Report<'a> {
    swap: &'a Swap,
    options: ReportOptions,
}

impl<'a> Report<'a> {
    pub fn new(swap: &'a Swap, options: ReportOptions) -> Self {
        Self { swap, options }
    }

    pub fn render(&self) -> String {
        let swap = self.swap;
        let mut out = String::new();
        let _ = writeln!(out, "Report for SWAP estimator {}", swap.name());

        // votes ever received survive truncation, unlike the log
        let n_votes: u64 = swap.subjects().iter().map(Subject::seen).sum();
        let _ = writeln!(
            out,
            "\n{} Subjects, {} Users, {} Classifications",
            swap.subjects().len(),
            swap.users().len(),
            n_votes
        );

        if let Some(thresholds) = swap.thresholds() {
            render_thresholds(&mut out, thresholds);
        }

        if self.options.subjects {
            out.push_str("\n#####\n# Subjects\n#####\n");
            let cutoffs = swap.thresholds().map(Thresholds::cutoffs);
            for subject in swap.subjects() {
                self.render_subject(&mut out, subject, cutoffs);
            }
        }

        if self.options.users {
            out.push_str("\n#####\n# Users\n#####\n\n");
            for user in swap.users() {
                self.render_user(&mut out, user);
            }
        }
        out
    }

    fn render_subject(&self, out: &mut String, subject: &Subject, cutoffs: Option<(f64, f64)>) {
        let _ = write!(
            out,
            "# subject id: {}, gold: {}, score: {:.6}, retired: {}, seen: {}",
            subject.id,
            subject.gold,
            subject.score(),
            Retirement::code(subject.retired()),
            subject.seen()
        );
        let votes_needed = cutoffs
            .and_then(|c| Trajectory::from_subject(subject).retirement_point(c));
        if let Some(votes) = votes_needed {
            let _ = write!(out, ", decided after {} votes", votes);
        }
        out.push('\n');

        if self.options.classifications {
            out.push_str("# User ID, PD, PL, Classification\n");
            for vote in subject.history() {
                let _ = writeln!(
                    out,
                    "{}, {:.3}, {:.3}, {}",
                    vote.user,
                    vote.skill.pd,
                    vote.skill.pl,
                    vote.vote.index()
                );
            }
            out.push('\n');
        }
    }

    fn render_user(&self, out: &mut String, user: &User) {
        let skill = user.score();
        let counts = user.counts();
        let _ = writeln!(
            out,
            "# user id: {}, name: {}, PD: {:.3}, PL: {:.3}, length: {}",
            user.id,
            user.name.as_deref().unwrap_or("-"),
            skill.pd,
            skill.pl,
            user.length()
        );
        let _ = writeln!(
            out,
            "## Bogus Seen: {}, Bogus Correct: {}, Real Seen: {}, Real Correct: {}, Other Seen: {}",
            counts.seen[0], counts.correct[0], counts.seen[1], counts.correct[1], counts.other_seen
        );
        if self.options.classifications {
            out.push_str("# Subject ID, Gold, Classification\n");
            for vote in user.history() {
                let _ = writeln!(out, "{}, {}, {}", vote.subject, vote.gold, vote.vote.index());
            }
            out.push('\n');
        }
    }

    /// Render into any writer.
    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(self.render().as_bytes())?;
        writer.flush()
    }
}

fn render_thresholds(out: &mut String, thresholds: &Thresholds) {
    let _ = writeln!(
        out,
        "\nTarget FPR: {:.3}, Target MDR: {:.3}, P(Retire Bogus): {:.6}, P(Retire Real): {:.6}",
        thresholds.fpr, thresholds.mdr, thresholds.bogus_cutoff, thresholds.real_cutoff
    );
    let breakdown = thresholds.breakdown();
    let rows: [(&str, ClassTally); 3] = [
        ("bogus", breakdown.bogus),
        ("real", breakdown.real),
        ("unknown", breakdown.unknown),
    ];
    for (label, tally) in rows {
        let _ = writeln!(
            out,
            "{} {}: {} classified real, {} classified bogus, {} inconclusive",
            label, tally.total, tally.retired_real, tally.retired_bogus, tally.inconclusive
        );
    }
}

/// Quote a CSV cell when it contains a delimiter, quote or newline.
fn csv_cell(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// `id,gold,score,retired,seen`, one row per subject in insertion order.
pub fn export_subjects<W: Write>(swap: &Swap, mut writer: W) -> io::Result<()> {
    writeln!(writer, "id,gold,score,retired,seen")?;
    for subject in swap.subjects() {
        writeln!(
            writer,
            "{},{},{},{},{}",
            subject.id,
            subject.gold,
            subject.score(),
            Retirement::code(subject.retired()),
            subject.seen()
        )?;
    }
    writer.flush()
}

/// `id,name,bogus_seen,real_seen,other_seen,bogus_correct,real_correct,PD,PL`.
pub fn export_users<W: Write>(swap: &Swap, mut writer: W) -> io::Result<()> {
    writeln!(
        writer,
        "id,name,bogus_seen,real_seen,other_seen,bogus_correct,real_correct,PD,PL"
    )?;
    for user in swap.users() {
        let counts = user.counts();
        let skill = user.score();
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{}",
            csv_cell(&user.id.to_string()),
            csv_cell(user.name.as_deref().unwrap_or("")),
            counts.seen[0],
            counts.seen[1],
            counts.other_seen,
            counts.correct[0],
            counts.correct[1],
            skill.pd,
            skill.pl
        )?;
    }
    writer.flush()
}
