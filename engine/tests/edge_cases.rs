//! Edge case tests for tasklane-engine
//!
//! These tests drive two replicas through realistic edit/delete/merge
//! sequences and check the invariants hold after each cycle.

use chrono::{Duration, TimeZone, Utc};
use std::collections::BTreeSet;
use tasklane_engine::{
    merge, Category, ManualClock, Snapshot, Task, TaskRepository, TaskUpdate, Timestamp,
};

fn t(secs: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + Duration::seconds(secs)
}

fn replica(start: i64) -> TaskRepository {
    TaskRepository::new(Box::new(ManualClock::new(t(start))))
}

fn replica_from(snapshot: Snapshot, start: i64) -> TaskRepository {
    TaskRepository::from_snapshot(snapshot, Box::new(ManualClock::new(t(start))))
}

/// No id appears in a category and the tombstone list at once, and no id
/// appears twice.
fn assert_consistent(snapshot: &Snapshot) {
    let mut seen = BTreeSet::new();
    for (_, task) in snapshot.categories.iter() {
        assert!(seen.insert(task.id.clone()), "duplicate id {}", task.id);
        assert!(!snapshot.is_deleted(&task.id), "tombstoned id {} is live", task.id);
    }
    for (category, task) in snapshot.categories.iter() {
        assert_eq!(
            task.archived_on.is_some(),
            category.is_archived(),
            "archivedOn out of sync for {}",
            task.id
        );
    }
}

// ============================================================================
// Two-replica scenarios
// ============================================================================

#[test]
fn concurrent_edits_converge() {
    let mut a = replica(0);
    let task = a.add(Category::Inbox, "Shared", BTreeSet::new(), None);

    let mut b = replica_from(a.snapshot().clone(), 100);

    // A edits first, B edits later (B's clock is ahead)
    a.update(&task.id, TaskUpdate::new("from A")).unwrap();
    b.update(&task.id, TaskUpdate::new("from B").category(Category::Priority))
        .unwrap();

    let at_a = merge(a.snapshot(), b.snapshot());
    let at_b = merge(b.snapshot(), a.snapshot());

    assert_eq!(at_a.categories, at_b.categories);
    let (category, winner) = at_a.get_task(&task.id).unwrap();
    assert_eq!(category, Category::Priority);
    assert_eq!(winner.title, "from B");
    assert_consistent(&at_a);
}

#[test]
fn delete_then_stale_download_does_not_resurrect() {
    let mut local = replica(0);
    let keep = local.add(Category::Inbox, "keep", BTreeSet::new(), None);
    let doomed = local.add(Category::Inbox, "doomed", BTreeSet::new(), None);

    // Remote still holds the pre-deletion state
    let remote = local.snapshot().clone();

    local.remove(&doomed.id).unwrap();
    let merged = merge(local.snapshot(), &remote);

    assert!(merged.get_task(&doomed.id).is_none());
    assert!(merged.is_deleted(&doomed.id));
    assert!(merged.get_task(&keep.id).is_some());
    assert_consistent(&merged);
}

#[test]
fn remote_delete_beats_later_local_edit() {
    let mut local = replica(0);
    let task = local.add(Category::Someday, "X", BTreeSet::new(), None);

    let mut remote = replica_from(local.snapshot().clone(), 0);
    remote.remove(&task.id).unwrap();

    // Local edits after the remote deletion
    local.update(&task.id, TaskUpdate::new("X edited")).unwrap();
    local
        .update(&task.id, TaskUpdate::new("X edited again"))
        .unwrap();
    let edited = local.find(&task.id).unwrap().task.last_modified;
    let deleted = remote.snapshot().tombstones[0].deleted_on;
    assert!(edited > deleted);

    let merged = merge(local.snapshot(), remote.snapshot());
    assert!(merged.get_task(&task.id).is_none());
    assert!(merged.is_deleted(&task.id));
}

#[test]
fn repeated_sync_cycles_never_reintroduce_deleted_task() {
    let mut a = replica(0);
    let task = a.add(Category::Inbox, "t", BTreeSet::new(), None);
    let mut remote = a.snapshot().clone();
    let mut b = replica_from(remote.clone(), 50);

    a.remove(&task.id).unwrap();

    for round in 0..5 {
        // B keeps editing other things and syncing its stale view
        b.add(Category::Upcoming, format!("b-{round}"), BTreeSet::new(), None);
        remote = merge(b.snapshot(), &remote);
        b.replace_snapshot(remote.clone());

        remote = merge(a.snapshot(), &remote);
        a.replace_snapshot(remote.clone());

        assert!(remote.get_task(&task.id).is_none(), "round {round}");
        assert_consistent(&remote);
    }
    assert_eq!(remote.categories.get(Category::Upcoming).len(), 5);
}

#[test]
fn merge_sorts_each_category_by_recency() {
    let mut repo = replica(0);
    let first = repo.add(Category::Inbox, "first", BTreeSet::new(), None);
    repo.add(Category::Inbox, "second", BTreeSet::new(), None);
    repo.add(Category::Inbox, "third", BTreeSet::new(), None);
    repo.update(&first.id, TaskUpdate::new("first, touched")).unwrap();

    let merged = merge(repo.snapshot(), &Snapshot::new());
    let titles: Vec<_> = merged
        .categories
        .get(Category::Inbox)
        .iter()
        .map(|t| t.title.as_str())
        .collect();
    assert_eq!(titles, ["first, touched", "third", "second"]);
}

// ============================================================================
// Archive transitions
// ============================================================================

#[test]
fn archive_state_survives_merge() {
    let mut a = replica(0);
    let task = a.add(Category::Inbox, "done soon", BTreeSet::new(), None);
    let b = replica_from(a.snapshot().clone(), 0);

    a.toggle_completion(&task.id).unwrap();
    let merged = merge(b.snapshot(), a.snapshot());

    let (category, winner) = merged.get_task(&task.id).unwrap();
    assert_eq!(category, Category::Archived);
    assert!(winner.completed);
    assert!(winner.archived_on.is_some());
    assert_consistent(&merged);
}

// ============================================================================
// String edge cases
// ============================================================================

#[test]
fn unicode_titles_and_tags_roundtrip() {
    let mut repo = replica(0);
    let names = [
        "日本語テスト",
        "Привет мир",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
        "",
    ];
    for name in names {
        let tags: BTreeSet<String> = [name.to_string()].into_iter().collect();
        repo.add(Category::Someday, name, tags, None);
    }

    let json = repo.snapshot().to_json().unwrap();
    let restored = Snapshot::from_json(&json).unwrap();
    assert_eq!(&restored, repo.snapshot());
}

#[test]
fn very_long_title() {
    let long = "x".repeat(1024 * 1024);
    let snapshot = Snapshot::new().with_task(Category::Inbox, Task::new("a", long.clone(), t(0)));
    let restored = Snapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
    assert_eq!(restored.get_task("a").unwrap().1.title.len(), long.len());
}

// ============================================================================
// Volume
// ============================================================================

#[test]
fn large_merge() {
    let mut local = Snapshot::new();
    let mut remote = Snapshot::new();
    for i in 0..2000i64 {
        let category = Category::ALL[(i % 5) as usize];
        local
            .categories
            .push(category, Task::new(format!("t{i}"), "local", t(i)));
        if i % 2 == 0 {
            remote
                .categories
                .push(category, Task::new(format!("t{i}"), "remote", t(i + 1)));
        }
    }

    let merged = merge(&local, &remote);
    assert_eq!(merged.task_count(), 2000);
    let remote_wins = merged
        .categories
        .iter()
        .filter(|(_, t)| t.title == "remote")
        .count();
    assert_eq!(remote_wins, 1000);
}
