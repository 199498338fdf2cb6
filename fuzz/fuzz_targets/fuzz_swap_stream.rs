//! Structured fuzz target for the scoring pipeline.
//!
//! Drives an estimator with an arbitrary interleaving of votes, gold labels,
//! scoring cycles and truncations, then checks the invariants every caller
//! relies on.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use swap_common::{ClassificationId, Config, SubjectId, UserId};
use swap_core::{Gold, OfflineOptions, Retirement, Swap, Vote};

#[derive(Debug, Arbitrary)]
enum Op {
    Classify { user: u8, subject: u8, real: bool, id: u16 },
    Gold { subject: u8, real: bool },
    Cycle,
    Truncate,
    Offline { unsupervised: bool, ignore_gold_status: bool },
}

fuzz_target!(|ops: Vec<Op>| {
    let mut swap = Swap::new("fuzz", Config::default());
    for op in ops.into_iter().take(256) {
        match op {
            Op::Classify { user, subject, real, id } => {
                swap.classify(
                    UserId::Id(u64::from(user % 16)),
                    SubjectId(u64::from(subject % 32)),
                    Vote::from_bool(real),
                    ClassificationId(u64::from(id)),
                );
            }
            Op::Gold { subject, real } => {
                let gold = if real { Gold::Real } else { Gold::Bogus };
                swap.apply_gold(SubjectId(u64::from(subject % 32)), gold);
            }
            Op::Cycle => swap.cycle(),
            Op::Truncate => {
                swap.cycle();
                swap.truncate();
            }
            Op::Offline {
                unsupervised,
                ignore_gold_status,
            } => {
                swap.offline(OfflineOptions {
                    unsupervised,
                    ignore_gold_status,
                });
            }
        }
    }

    swap.cycle();
    let (bogus_cutoff, real_cutoff) = swap.retire_default().cutoffs();
    assert!(bogus_cutoff < real_cutoff);
    for subject in swap.subjects() {
        assert!((0.0..=1.0).contains(&subject.score()));
        match subject.retired() {
            Some(Retirement::Real) => assert!(subject.score() >= real_cutoff),
            Some(Retirement::Bogus) => assert!(subject.score() <= bogus_cutoff),
            None => {}
        }
    }
});
