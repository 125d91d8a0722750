//! Performance benchmarks for tasklane-engine

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::BTreeSet;
use tasklane_engine::{
    merge, migrate, Category, ManualClock, Snapshot, Task, TaskRepository, TaskUpdate, Tombstone,
};

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

/// Builds a snapshot of `size` tasks spread over all categories. `skew`
/// shifts every timestamp so two calls produce diverged replicas.
fn populated(size: usize, skew: i64) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for i in 0..size {
        let category = Category::ALL[i % Category::ALL.len()];
        let modified = base() + Duration::milliseconds(i as i64 * 10 + skew);
        let mut task = Task::new(format!("task-{i}"), format!("Task {i}"), modified)
            .with_tags(["home", "errand"]);
        if category.is_archived() {
            task.archived_on = Some(modified);
        }
        snapshot.categories.push(category, task);
    }
    for i in 0..size / 10 {
        let deleted = Task::new(format!("gone-{i}"), "deleted", base());
        snapshot
            .tombstones
            .push(Tombstone::new(deleted, Some(Category::Inbox), base()));
    }
    snapshot
}

fn bench_repository(c: &mut Criterion) {
    let mut group = c.benchmark_group("repository");

    group.bench_function("add", |b| {
        let mut repo = TaskRepository::new(Box::new(ManualClock::new(base())));
        b.iter(|| repo.add(Category::Inbox, black_box("Buy milk"), BTreeSet::new(), None))
    });

    group.bench_function("update", |b| {
        let mut repo =
            TaskRepository::from_snapshot(populated(1000, 0), Box::new(ManualClock::new(base())));
        b.iter(|| {
            repo.update(black_box("task-500"), TaskUpdate::new("renamed"))
                .unwrap()
        })
    });

    group.bench_function("find", |b| {
        let repo =
            TaskRepository::from_snapshot(populated(1000, 0), Box::new(ManualClock::new(base())));
        b.iter(|| repo.find(black_box("task-999")).unwrap().index)
    });

    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("diverged", size), size, |b, &size| {
            let local = populated(size, 0);
            let remote = populated(size, 5);
            b.iter(|| merge(black_box(&local), black_box(&remote)))
        });

        group.bench_with_input(BenchmarkId::new("identical", size), size, |b, &size| {
            let local = populated(size, 0);
            b.iter(|| merge(black_box(&local), black_box(&local)))
        });
    }

    group.finish();
}

fn bench_wire(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire");

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("to_json", size), size, |b, &size| {
            let snapshot = populated(size, 0);
            b.iter(|| snapshot.to_json().unwrap())
        });

        group.bench_with_input(BenchmarkId::new("from_json", size), size, |b, &size| {
            let json = populated(size, 0).to_json().unwrap();
            b.iter(|| Snapshot::from_json(black_box(&json)).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("migrate", size), size, |b, &size| {
            let value = serde_json::to_value(populated(size, 0)).unwrap();
            let clock = ManualClock::new(base());
            b.iter(|| migrate(black_box(&value), &clock).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_repository, bench_merge, bench_wire);
criterion_main!(benches);
