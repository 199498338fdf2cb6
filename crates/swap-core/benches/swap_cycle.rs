//! Criterion benchmarks for the scoring hot paths in `swap-core`.
//!
//! Populations are synthetic and seeded deterministically so runs compare
//! across machines.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use swap_common::{ClassificationId, Config, EStep, SubjectId, UserId};
use swap_core::{Gold, OfflineOptions, Swap, Vote};

/// `users` voters each classifying every subject; one subject in ten is
/// gold, one voter in five is unreliable.
fn population(users: u64, subjects: u64) -> Swap {
    let mut swap = Swap::new("bench", Config::default());
    let mut id = 0;
    for subject in 0..subjects {
        let truth = subject % 3 == 0;
        for user in 0..users {
            id += 1;
            let flip = user % 5 == 0 && (subject + user) % 4 == 0;
            swap.classify(
                UserId::Id(user),
                SubjectId(subject),
                Vote::from_bool(truth != flip),
                ClassificationId(id),
            );
        }
    }
    let golds: Vec<_> = (0..subjects)
        .step_by(10)
        .map(|s| {
            let gold = if s % 3 == 0 { Gold::Real } else { Gold::Bogus };
            (SubjectId(s), gold)
        })
        .collect();
    swap.apply_golds(golds);
    swap
}

fn bench_online_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("online");

    for (users, subjects) in [(20u64, 200u64), (50, 1_000)] {
        let base = population(users, subjects);
        group.bench_with_input(
            BenchmarkId::new("cycle", format!("{users}x{subjects}")),
            &base,
            |b, base| {
                b.iter(|| {
                    let mut swap = base.clone();
                    swap.cycle();
                    black_box(swap.retire_default().cutoffs());
                })
            },
        );
    }

    group.finish();
}

fn bench_offline(c: &mut Criterion) {
    let mut group = c.benchmark_group("offline");
    group.sample_size(20);

    for rule in [EStep::JointLikelihood, EStep::Averaged] {
        let mut snapshot = population(30, 500).snapshot();
        snapshot.config.offline.e_step = rule;
        let base = Swap::from_snapshot(snapshot).expect("snapshot should restore");
        group.bench_with_input(
            BenchmarkId::new("em", format!("{rule:?}")),
            &base,
            |b, base| {
                b.iter(|| {
                    let mut swap = base.clone();
                    let report = swap.offline(OfflineOptions::default());
                    black_box(report.convergence);
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_online_cycle, bench_offline);
criterion_main!(benches);
