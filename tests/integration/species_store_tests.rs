//! Integration tests for the species store: schedule pool deduplication,
//! persistence, legacy migration and signed export/import.

use std::sync::Arc;

use terrarium::app::ports::StorageError;
use terrarium::climate::ClimateSchedule;
use terrarium::error::Error;
use terrarium::species::{
    CUSTOM_PROFILE_MAX, DeleteOutcome, KEY_ACTIVE, KEY_CATALOG, KEY_LEGACY, KEY_SECRET, LoadOutcome,
    NAMESPACE, ProfileMetadata, ProfileRef, SpeciesStore, default_builtin,
};

use crate::mocks::{MockNvs, legacy_blob};

fn schedule(day_temp: f32) -> ClimateSchedule {
    let mut s = ClimateSchedule::default();
    s.day.temperature_c = day_temp;
    s
}

fn loaded_store(nvs: &MockNvs) -> SpeciesStore<MockNvs> {
    let store = SpeciesStore::new(nvs.clone());
    store.load().unwrap();
    store
}

fn meta() -> ProfileMetadata {
    ProfileMetadata::new("Desert", "Zone 3", "Dry winter", 4.5)
}

// ── Pool deduplication ────────────────────────────────────────

#[test]
fn identical_schedules_share_one_pool_entry() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);

    store.save_custom("Leo A", &schedule(30.0), meta()).unwrap();
    store.save_custom("Leo B", &schedule(30.0), meta()).unwrap();
    store.save_custom("Beardie", &schedule(35.0), meta()).unwrap();

    let pool = store.pool_entries().unwrap();
    assert_eq!(pool.len(), 2);
    assert_eq!(pool[0].2, 2, "shared schedule carries both references");
    assert_eq!(pool[1].2, 1);
    assert_eq!(store.custom_count().unwrap(), 3);
}

#[test]
fn deleting_a_middle_schedule_keeps_every_profile_resolvable() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);

    store.save_custom("a", &schedule(28.0), meta()).unwrap();
    store.save_custom("b", &schedule(30.0), meta()).unwrap();
    store.save_custom("c", &schedule(32.0), meta()).unwrap();
    store.save_custom("d", &schedule(34.0), meta()).unwrap();

    assert_eq!(
        store.delete_custom("custom:b").unwrap(),
        DeleteOutcome::Removed
    );

    assert_eq!(store.pool_entries().unwrap().len(), 3);
    for (key, temp) in [("custom:a", 28.0), ("custom:c", 32.0), ("custom:d", 34.0)] {
        match store.find(key).unwrap() {
            ProfileRef::Custom(view) => assert_eq!(view.schedule.day.temperature_c, temp),
            ProfileRef::Builtin(_) => panic!("{key} resolved to a built-in"),
        }
    }

    // Order of the remaining profiles is preserved.
    let keys: Vec<_> = store
        .custom_profiles()
        .unwrap()
        .into_iter()
        .map(|v| v.key.to_string())
        .collect();
    assert_eq!(keys, ["custom:a", "custom:c", "custom:d"]);
}

#[test]
fn updating_a_profile_moves_its_reference() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);

    store.save_custom("a", &schedule(30.0), meta()).unwrap();
    store.save_custom("b", &schedule(30.0), meta()).unwrap();
    store.save_custom("a", &schedule(31.0), meta()).unwrap();

    let pool = store.pool_entries().unwrap();
    assert_eq!(pool.len(), 2);
    assert!(pool.iter().all(|&(_, _, refs)| refs == 1));
    assert_eq!(store.custom_count().unwrap(), 2);
}

#[test]
fn full_table_rejects_new_profiles_without_mutation() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);
    for i in 0..CUSTOM_PROFILE_MAX {
        store
            .save_custom(&format!("p{i}"), &schedule(20.0 + i as f32), meta())
            .unwrap();
    }
    let before = nvs.get(NAMESPACE, KEY_CATALOG);

    assert_eq!(
        store.save_custom("overflow", &schedule(40.0), meta()),
        Err(Error::ResourceExhausted)
    );
    assert_eq!(store.custom_count().unwrap(), CUSTOM_PROFILE_MAX);
    assert_eq!(nvs.get(NAMESPACE, KEY_CATALOG), before);

    // Updating an existing profile still works when full.
    store.save_custom("p0", &schedule(41.0), meta()).unwrap();
}

#[test]
fn invalid_schedule_is_rejected_untouched() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);
    let mut bad = schedule(30.0);
    bad.night.humidity_pct = 120.0;

    assert!(matches!(
        store.save_custom("bad", &bad, meta()),
        Err(Error::InvalidArgument(_))
    ));
    assert_eq!(store.custom_count().unwrap(), 0);
    assert!(nvs.get(NAMESPACE, KEY_CATALOG).is_none());
}

// ── Persistence ───────────────────────────────────────────────

#[test]
fn catalog_survives_a_reload() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);
    store.save_custom("Leopard Gecko", &schedule(29.0), meta()).unwrap();
    store.save_custom("Crested Gecko", &schedule(29.0), meta()).unwrap();
    store.apply("custom:leopard_gecko").unwrap();
    let before = store.custom_profiles().unwrap();

    let reloaded = loaded_store(&nvs);
    assert_eq!(reloaded.custom_profiles().unwrap(), before);
    assert_eq!(reloaded.pool_entries().unwrap(), store.pool_entries().unwrap());
    assert_eq!(
        reloaded.active_key().unwrap().as_deref(),
        Some("custom:leopard_gecko")
    );
}

#[test]
fn operations_before_load_are_rejected() {
    let store = SpeciesStore::new(MockNvs::new());
    assert!(!store.is_loaded());
    assert!(matches!(store.custom_count(), Err(Error::InvalidState(_))));
    assert!(matches!(
        store.save_custom("x", &schedule(30.0), meta()),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn corrupt_catalog_fails_load_and_recovers_empty() {
    let nvs = MockNvs::new();
    nvs.put(NAMESPACE, KEY_CATALOG, &[0x01, 0x00, 0x01, 0x09]);
    let store = SpeciesStore::new(nvs.clone());

    assert!(matches!(store.load(), Err(Error::InvalidState(_))));
    assert!(!store.is_loaded());

    store.recover_empty().unwrap();
    assert_eq!(store.custom_count().unwrap(), 0);
    // The unreadable blob stays until the next successful save.
    assert_eq!(
        nvs.get(NAMESPACE, KEY_CATALOG).as_deref(),
        Some(&[0x01, 0x00, 0x01, 0x09][..])
    );
}

#[test]
fn failed_commit_is_reported_but_state_is_kept() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);
    nvs.set_fail_writes(true);

    assert_eq!(
        store.save_custom("a", &schedule(30.0), meta()),
        Err(Error::Storage(StorageError::IoError))
    );
    assert_eq!(store.custom_count().unwrap(), 1);
}

// ── Apply / delete ────────────────────────────────────────────

#[test]
fn apply_builtin_marks_it_active() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);
    let builtin = default_builtin();

    let s = store.apply(builtin.key).unwrap();
    assert_eq!(s, builtin.schedule);
    assert_eq!(store.active_key().unwrap().as_deref(), Some(builtin.key));
    assert_eq!(
        nvs.get(NAMESPACE, KEY_ACTIVE).as_deref(),
        Some(builtin.key.as_bytes())
    );
    assert_eq!(store.apply("builtin:unknown"), Err(Error::NotFound));
}

#[test]
fn apply_returns_schedule_even_when_active_key_commit_fails() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);
    store.save_custom("a", &schedule(30.0), meta()).unwrap();
    nvs.set_fail_writes(true);

    assert_eq!(store.apply("custom:a").unwrap(), schedule(30.0));
    assert_eq!(store.active_key().unwrap().as_deref(), Some("custom:a"));
}

#[test]
fn deleting_the_active_profile_clears_it() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);
    store.save_custom("a", &schedule(30.0), meta()).unwrap();
    store.apply("custom:a").unwrap();

    assert_eq!(
        store.delete_custom("custom:a").unwrap(),
        DeleteOutcome::RemovedActive
    );
    assert_eq!(store.active_key().unwrap(), None);
    assert!(nvs.get(NAMESPACE, KEY_ACTIVE).is_none());
    assert_eq!(store.delete_custom("custom:a"), Err(Error::NotFound));
}

#[test]
fn builtins_cannot_be_deleted() {
    let store = loaded_store(&MockNvs::new());
    assert_eq!(
        store.delete_custom(default_builtin().key),
        Err(Error::NotFound)
    );
    assert!(!store.builtin_profiles().is_empty());
}

// ── Legacy migration ──────────────────────────────────────────

#[test]
fn legacy_catalog_is_migrated_on_load() {
    let nvs = MockNvs::new();
    let mut bad = schedule(30.0);
    bad.day.temperature_c = 80.0;
    let blob = legacy_blob(
        &[
            ("custom:leo", "Leo", schedule(30.0)),
            ("", "Tank Two", schedule(30.0)),
            ("custom:broken", "Broken", bad),
        ],
        CUSTOM_PROFILE_MAX,
    );
    nvs.put(NAMESPACE, KEY_LEGACY, &blob);

    let store = SpeciesStore::new(nvs.clone());
    assert_eq!(store.load().unwrap(), LoadOutcome::Migrated);
    let keys: Vec<_> = store
        .custom_profiles()
        .unwrap()
        .into_iter()
        .map(|v| v.key.to_string())
        .collect();
    assert_eq!(keys, ["custom:leo", "custom:tank_two"]);
    assert_eq!(store.pool_entries().unwrap().len(), 1, "shared schedule deduplicated");

    assert!(nvs.get(NAMESPACE, KEY_CATALOG).is_some());
    assert!(nvs.get(NAMESPACE, KEY_LEGACY).is_none());

    // Second boot reads the migrated catalog.
    let again = loaded_store(&nvs);
    assert_eq!(again.custom_count().unwrap(), 2);
}

#[test]
fn migration_survives_a_failed_commit() {
    let nvs = MockNvs::new();
    let blob = legacy_blob(
        &[
            ("custom:leo", "Leo", schedule(30.0)),
            ("custom:rex", "Rex", schedule(33.0)),
        ],
        2,
    );
    nvs.put(NAMESPACE, KEY_LEGACY, &blob);
    nvs.set_fail_writes(true);

    let store = SpeciesStore::new(nvs.clone());
    assert_eq!(
        store.load().unwrap(),
        LoadOutcome::MigrationUncommitted(StorageError::IoError)
    );
    assert!(store.is_loaded());
    assert_eq!(store.custom_count().unwrap(), 2);
    assert_eq!(nvs.get(NAMESPACE, KEY_LEGACY), Some(blob));
    assert!(nvs.get(NAMESPACE, KEY_CATALOG).is_none());

    // The next successful save commits everything and retires the old blob.
    nvs.set_fail_writes(false);
    store.save_custom("New", &schedule(28.0), meta()).unwrap();
    assert!(nvs.get(NAMESPACE, KEY_LEGACY).is_none());

    let rebooted = loaded_store(&nvs);
    let keys: Vec<_> = rebooted
        .custom_profiles()
        .unwrap()
        .into_iter()
        .map(|v| v.key.to_string())
        .collect();
    assert_eq!(keys, ["custom:leo", "custom:rex", "custom:new"]);
}

#[test]
fn migration_retries_erasing_the_legacy_blob() {
    let nvs = MockNvs::new();
    nvs.put(
        NAMESPACE,
        KEY_LEGACY,
        &legacy_blob(&[("custom:leo", "Leo", schedule(30.0))], 1),
    );
    nvs.set_fail_deletes(true);

    let store = SpeciesStore::new(nvs.clone());
    assert_eq!(
        store.load().unwrap(),
        LoadOutcome::MigrationUncommitted(StorageError::IoError)
    );
    assert!(nvs.get(NAMESPACE, KEY_CATALOG).is_some());
    assert!(nvs.get(NAMESPACE, KEY_LEGACY).is_some());

    // The committed catalog wins on the next boot even with the old blob left.
    assert_eq!(loaded_store(&nvs).custom_count().unwrap(), 1);

    nvs.set_fail_deletes(false);
    store.save_custom("Rex", &schedule(33.0), meta()).unwrap();
    assert!(nvs.get(NAMESPACE, KEY_LEGACY).is_none());
}

#[test]
fn truncated_legacy_blob_is_left_in_place() {
    let nvs = MockNvs::new();
    let mut blob = legacy_blob(&[("custom:leo", "Leo", schedule(30.0))], 1);
    blob.pop();
    nvs.put(NAMESPACE, KEY_LEGACY, &blob);

    let store = SpeciesStore::new(nvs.clone());
    assert!(store.load().is_err());
    assert!(nvs.get(NAMESPACE, KEY_LEGACY).is_some());
    assert!(nvs.get(NAMESPACE, KEY_CATALOG).is_none());
}

// ── Export / import ───────────────────────────────────────────

#[test]
fn export_then_import_restores_the_catalog() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);
    store.save_custom("a", &schedule(30.0), meta()).unwrap();
    store.save_custom("b", &schedule(30.0), meta()).unwrap();
    store.save_custom("c", &schedule(33.0), meta()).unwrap();
    let before = store.custom_profiles().unwrap();

    let export = store.export_secure().unwrap();
    store.reset().unwrap();
    assert_eq!(store.custom_count().unwrap(), 0);

    store.import_envelope(&export).unwrap();
    assert_eq!(store.custom_profiles().unwrap(), before);
    assert_eq!(store.pool_entries().unwrap().len(), 2);
}

#[test]
fn export_envelope_survives_json_transport() {
    let store = loaded_store(&MockNvs::new());
    store.save_custom("a", &schedule(30.0), meta()).unwrap();
    let json = store.export_secure().unwrap().to_json().unwrap();

    store.reset().unwrap();
    let envelope = terrarium::species::SecureExport::from_json(&json).unwrap();
    store.import_envelope(&envelope).unwrap();
    assert_eq!(store.custom_count().unwrap(), 1);
}

#[test]
fn tampered_import_is_rejected_without_mutation() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);
    store.save_custom("a", &schedule(30.0), meta()).unwrap();
    let export = store.export_secure().unwrap();
    store.save_custom("b", &schedule(31.0), meta()).unwrap();
    let stored = nvs.get(NAMESPACE, KEY_CATALOG);

    let mut payload = export.payload.clone();
    let last = payload.len() - 1;
    payload[last] ^= 0x01;
    assert_eq!(
        store.import_secure(&payload, &export.nonce, &export.signature),
        Err(Error::AuthenticationFailed)
    );

    let mut nonce = export.nonce;
    nonce[0] ^= 0xFF;
    assert_eq!(
        store.import_secure(&export.payload, &nonce, &export.signature),
        Err(Error::AuthenticationFailed)
    );

    assert_eq!(store.custom_count().unwrap(), 2);
    assert_eq!(nvs.get(NAMESPACE, KEY_CATALOG), stored);
}

#[test]
fn export_from_another_device_does_not_verify() {
    let ours = loaded_store(&MockNvs::new());
    let theirs = loaded_store(&MockNvs::new());
    theirs.save_custom("a", &schedule(30.0), meta()).unwrap();
    let export = theirs.export_secure().unwrap();

    assert_eq!(ours.import_envelope(&export), Err(Error::AuthenticationFailed));
    assert_eq!(ours.custom_count().unwrap(), 0);
}

#[test]
fn export_imports_into_a_store_provisioned_with_the_same_secret() {
    let source_nvs = MockNvs::new();
    let source = loaded_store(&source_nvs);
    source.save_custom("Leo", &schedule(30.0), meta()).unwrap();
    source.save_custom("Beardie", &schedule(35.0), meta()).unwrap();
    let export = source.export_secure().unwrap();

    let target_nvs = MockNvs::new();
    let secret = source_nvs.get(NAMESPACE, KEY_SECRET).unwrap();
    target_nvs.put(NAMESPACE, KEY_SECRET, &secret);
    let target = loaded_store(&target_nvs);

    target.import_envelope(&export).unwrap();
    assert_eq!(
        target.custom_profiles().unwrap(),
        source.custom_profiles().unwrap()
    );
    assert_eq!(target.pool_entries().unwrap(), source.pool_entries().unwrap());
}

#[test]
fn oversized_import_is_rejected_before_verification() {
    let store = loaded_store(&MockNvs::new());
    let payload = vec![0u8; 4097];
    assert!(matches!(
        store.import_secure(&payload, &[0; 16], &[0; 32]),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn import_clears_an_orphaned_active_key() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);
    store.save_custom("a", &schedule(30.0), meta()).unwrap();
    let export = store.export_secure().unwrap();
    store.save_custom("b", &schedule(31.0), meta()).unwrap();
    store.apply("custom:b").unwrap();

    store.import_envelope(&export).unwrap();
    assert_eq!(store.active_key().unwrap(), None);
    assert!(nvs.get(NAMESPACE, KEY_ACTIVE).is_none());
}

#[test]
fn reset_keeps_the_export_secret() {
    let nvs = MockNvs::new();
    let store = loaded_store(&nvs);
    store.save_custom("a", &schedule(30.0), meta()).unwrap();
    let export = store.export_secure().unwrap();
    store.reset().unwrap();

    // A fresh store over the same storage still accepts the old export.
    let rebooted = loaded_store(&nvs);
    rebooted.import_envelope(&export).unwrap();
    assert_eq!(rebooted.custom_count().unwrap(), 1);
}

// ── Concurrency ───────────────────────────────────────────────

#[test]
fn concurrent_writers_leave_a_consistent_pool() {
    let store = Arc::new(loaded_store(&MockNvs::new()));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..25 {
                    let name = format!("t{t}");
                    let s = schedule(25.0 + ((t + i) % 3) as f32);
                    match store.save_custom(&name, &s, ProfileMetadata::default()) {
                        Ok(_) | Err(Error::ResourceExhausted) => {}
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                    if i % 5 == 4 {
                        let _ = store.delete_custom(&format!("custom:t{t}"));
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let profiles = store.custom_profiles().unwrap();
    let pool = store.pool_entries().unwrap();
    let refs: u32 = pool.iter().map(|&(_, _, r)| u32::from(r)).sum();
    assert_eq!(refs as usize, profiles.len());
    assert!(pool.iter().all(|&(_, _, r)| r > 0));
}
