//! Behaviour shared by every policy store implementation
//!
//! Each scenario runs against both the in-memory and the file-backed store.

use pluvia_core::{Error, Policy, PolicyDraft, TxRef};
use pluvia_store::{FilePolicyStore, MemoryPolicyStore, PolicyStore, TriggerCommit};
use std::sync::Arc;
use tempfile::TempDir;

fn draft(location: &str) -> PolicyDraft {
    PolicyDraft {
        location: location.to_string(),
        rain_threshold_mm: 100.0,
        cooldown_days: 10,
        indemnity_amount: 1_000_000_000_000_000_000,
        expires_at: 1_800_000_000,
        trigger_cap: 2,
        beneficiary: None,
        created_at: 1_700_000_000,
    }
}

/// Runs `scenario` against a fresh memory store and a fresh file store
fn for_each_store(scenario: impl Fn(&dyn PolicyStore)) {
    let memory = MemoryPolicyStore::new();
    scenario(&memory);

    let dir = TempDir::new().unwrap();
    let file = FilePolicyStore::open(dir.path()).unwrap();
    scenario(&file);
}

fn commit(store: &dyn PolicyStore, snapshot: &Policy, now: i64, tx: &str) -> pluvia_core::Result<Policy> {
    store.commit_trigger(&TriggerCommit::from_snapshot(snapshot, now, TxRef::new(tx)))
}

#[test]
fn test_register_then_load_round_trip() {
    for_each_store(|store| {
        let registered = draft("Barcarena-PA");
        let id = store.register(registered.clone()).unwrap();
        let loaded = store.load(id).unwrap();

        assert_eq!(loaded, Policy::from_draft(id, registered));
        assert_eq!(loaded.trigger_count, 0);
        assert!(loaded.active);
        assert_eq!(store.list_monitored().unwrap(), vec![loaded]);
    });
}

#[test]
fn test_register_rejects_invalid_draft() {
    for_each_store(|store| {
        let mut bad = draft("");
        bad.location.clear();
        assert!(matches!(store.register(bad), Err(Error::InvalidPolicy(_))));
        assert!(store.list_live().unwrap().is_empty());
    });
}

#[test]
fn test_ids_never_reuse_archived_ids() {
    for_each_store(|store| {
        let first = store.register(draft("A")).unwrap();
        let second = store.register(draft("B")).unwrap();
        store.deactivate(second).unwrap();

        let third = store.register(draft("C")).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(third, 3);
    });
}

#[test]
fn test_load_unknown_is_not_found() {
    for_each_store(|store| {
        assert!(matches!(store.load(42), Err(Error::NotFound(42))));
    });
}

#[test]
fn test_commit_trigger_updates_exactly_once() {
    for_each_store(|store| {
        let id = store.register(draft("Barcarena-PA")).unwrap();
        let snapshot = store.load(id).unwrap();

        let updated = commit(store, &snapshot, 1_700_000_100, "0xaaa").unwrap();
        assert_eq!(updated.trigger_count, 1);
        assert_eq!(updated.last_triggered_at, Some(1_700_000_100));
        assert_eq!(updated.last_tx_ref, Some(TxRef::new("0xaaa")));

        // A second commit from the same snapshot is a stale double trigger
        let err = commit(store, &snapshot, 1_700_000_200, "0xbbb").unwrap_err();
        assert!(err.is_conflict());

        let stored = store.load(id).unwrap();
        assert_eq!(stored, updated);
    });
}

#[test]
fn test_commit_conflicts_after_deactivate_and_cap() {
    for_each_store(|store| {
        let id = store.register(draft("Barcarena-PA")).unwrap();
        let snapshot = store.load(id).unwrap();
        let after_first = commit(store, &snapshot, 1_700_000_100, "0x1").unwrap();
        let after_second = commit(store, &after_first, 1_700_000_200, "0x2").unwrap();
        assert_eq!(after_second.trigger_count, 2);

        // Cap of 2 is now reached
        let err = commit(store, &after_second, 1_700_000_300, "0x3").unwrap_err();
        assert!(err.is_conflict());

        let other = store.register(draft("Belem-PA")).unwrap();
        let other_snapshot = store.load(other).unwrap();
        store.deactivate(other).unwrap();
        // Archived since the snapshot was read
        let err = commit(store, &other_snapshot, 1_700_000_100, "0x4").unwrap_err();
        assert!(err.is_conflict());

        let mut ghost = other_snapshot.clone();
        ghost.id = 999;
        assert!(matches!(
            commit(store, &ghost, 1_700_000_100, "0x5"),
            Err(Error::NotFound(999))
        ));
    });
}

#[test]
fn test_commit_conflicts_after_expiry() {
    for_each_store(|store| {
        let id = store.register(draft("Barcarena-PA")).unwrap();
        let snapshot = store.load(id).unwrap();
        let err = commit(store, &snapshot, 1_800_000_001, "0x1").unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.load(id).unwrap().trigger_count, 0);
    });
}

#[test]
fn test_deactivate_and_restore() {
    for_each_store(|store| {
        let id = store.register(draft("Barcarena-PA")).unwrap();

        let archived = store.deactivate(id).unwrap();
        assert!(!archived.active);
        assert!(store.list_monitored().unwrap().is_empty());
        assert!(store.list_live().unwrap().is_empty());
        assert_eq!(store.list_archived().unwrap().len(), 1);
        assert!(!store.load(id).unwrap().active);

        assert!(matches!(store.deactivate(id), Err(Error::NotFound(_))));

        let restored = store.restore(id).unwrap();
        assert!(restored.active);
        assert_eq!(store.list_monitored().unwrap().len(), 1);
        assert!(store.list_archived().unwrap().is_empty());

        assert!(matches!(store.restore(id), Err(Error::AlreadyExists(_))));
        assert!(matches!(store.restore(77), Err(Error::NotFound(77))));
    });
}

#[test]
fn test_unmonitored_policy_is_not_listed() {
    for_each_store(|store| {
        let first = store.register(draft("A")).unwrap();
        let second = store.register(draft("B")).unwrap();

        store.set_monitored(first, false).unwrap();
        let monitored: Vec<_> = store.list_monitored().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(monitored, vec![second]);
        assert_eq!(store.list_live().unwrap().len(), 2);

        store.set_monitored(first, true).unwrap();
        let monitored: Vec<_> = store.list_monitored().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(monitored, vec![second, first]);

        assert!(matches!(store.set_monitored(99, true), Err(Error::NotFound(99))));
    });
}

#[test]
fn test_concurrent_commits_from_one_snapshot_apply_once() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FilePolicyStore::open(dir.path()).unwrap());
    let id = store.register(draft("Barcarena-PA")).unwrap();
    let snapshot = store.load(id).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            let snapshot = snapshot.clone();
            std::thread::spawn(move || {
                store
                    .commit_trigger(&TriggerCommit::from_snapshot(
                        &snapshot,
                        1_700_000_100,
                        TxRef::new(format!("0x{i}")),
                    ))
                    .is_ok()
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 1);
    assert_eq!(store.load(id).unwrap().trigger_count, 1);
}
