//! Property-based tests for estimator invariants.

use proptest::prelude::*;
use swap_common::{ClassificationId, Config, SubjectId, UserId};
use swap_core::{Gold, Retirement, Swap, Vote};

type Event = (u64, u64, bool, u64);

fn events() -> impl Strategy<Value = Vec<Event>> {
    prop::collection::vec((0u64..6, 0u64..12, any::<bool>(), 0u64..10_000), 0..80)
}

fn golds() -> impl Strategy<Value = Vec<(u64, bool)>> {
    prop::collection::vec((0u64..12, any::<bool>()), 0..8)
}

fn build(events: &[Event], golds: &[(u64, bool)]) -> Swap {
    let mut swap = Swap::new("prop", Config::default());
    for &(user, subject, vote, id) in events {
        swap.classify(
            UserId::Id(user),
            SubjectId(subject),
            Vote::from_bool(vote),
            ClassificationId(id),
        );
    }
    swap.apply_golds(golds.iter().map(|&(subject, real)| {
        let gold = if real { Gold::Real } else { Gold::Bogus };
        (SubjectId(subject), gold)
    }));
    swap.cycle();
    swap
}

proptest! {
    #[test]
    fn replaying_a_stream_changes_nothing(events in events(), golds in golds()) {
        let mut swap = build(&events, &golds);
        let classifications = swap.classifications().len();
        let scores: Vec<f64> = swap.subjects().iter().map(|s| s.score()).collect();

        for &(user, subject, vote, id) in &events {
            let ingested = swap.classify(
                UserId::Id(user),
                SubjectId(subject),
                Vote::from_bool(vote),
                ClassificationId(id),
            );
            prop_assert!(!ingested);
        }
        swap.cycle();

        prop_assert_eq!(swap.classifications().len(), classifications);
        let replayed: Vec<f64> = swap.subjects().iter().map(|s| s.score()).collect();
        prop_assert_eq!(replayed, scores);
    }

    #[test]
    fn one_vote_per_user_subject_pair(events in events()) {
        let swap = build(&events, &[]);
        let mut pairs: Vec<(u64, u64)> = events.iter().map(|e| (e.0, e.1)).collect();
        pairs.sort_unstable();
        pairs.dedup();
        prop_assert_eq!(swap.classifications().len(), pairs.len());
        let votes: u64 = swap.subjects().iter().map(|s| s.seen()).sum();
        prop_assert_eq!(votes as usize, pairs.len());
    }

    #[test]
    fn last_id_is_the_maximum_offered(events in events()) {
        let swap = build(&events, &[]);
        let expected = events.iter().map(|e| ClassificationId(e.3)).max();
        prop_assert_eq!(swap.last_id(), expected);
    }

    #[test]
    fn scores_stay_in_the_unit_interval(events in events(), golds in golds()) {
        let swap = build(&events, &golds);
        for subject in swap.subjects() {
            prop_assert!((0.0..=1.0).contains(&subject.score()));
            for p in subject.trajectory() {
                prop_assert!((0.0..=1.0).contains(&p));
            }
        }
        for user in swap.users() {
            let skill = user.score();
            prop_assert!(skill.pd > 0.0 && skill.pd < 1.0);
            prop_assert!(skill.pl > 0.0 && skill.pl < 1.0);
        }
    }

    #[test]
    fn retirement_respects_cutoffs(
        events in events(),
        golds in golds(),
        fpr in 0.0f64..0.5,
        mdr in 0.0f64..0.5,
    ) {
        let mut swap = build(&events, &golds);
        let (bogus_cutoff, real_cutoff) = swap.retire(fpr, mdr).cutoffs();
        prop_assert!(bogus_cutoff < real_cutoff);

        for subject in swap.subjects() {
            match subject.retired() {
                Some(Retirement::Real) => prop_assert!(subject.score() >= real_cutoff),
                Some(Retirement::Bogus) => prop_assert!(subject.score() <= bogus_cutoff),
                None => prop_assert!(
                    subject.gold.is_known()
                        || (subject.score() > bogus_cutoff && subject.score() < real_cutoff)
                ),
            }
            if subject.gold.is_known() {
                prop_assert_eq!(subject.retired(), None);
            }
        }
    }

    #[test]
    fn snapshot_round_trip_preserves_state(events in events(), golds in golds()) {
        let mut swap = build(&events, &golds);
        swap.retire_default();
        let snapshot = swap.snapshot();
        let restored = Swap::from_snapshot(snapshot.clone()).expect("restore");
        let mut again = restored.snapshot();
        again.saved_at = snapshot.saved_at;
        prop_assert_eq!(again, snapshot);
    }
}
