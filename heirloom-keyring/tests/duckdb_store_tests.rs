//! DuckDB store tests: conditional-update semantics and field fidelity
//! across a write/read cycle, plus one full lifecycle pass to show the
//! manager behaves the same on the persistent store.

use chrono::{Duration as ChronoDuration, DurationRound, Utc};
use heirloom_crypto::{EncryptedData, KdfParams, Salt};
use heirloom_keyring::{
    DuckDbKeyStore, KeyLifecycleManager, KeyRecord, KeyRecordStore, KeyringConfig, KeyringError,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn sample_record(user_id: &str, version: u32) -> KeyRecord {
    // millisecond precision matches what the BIGINT columns store
    let now = Utc::now().duration_trunc(ChronoDuration::milliseconds(1)).unwrap();
    KeyRecord {
        user_id: user_id.to_string(),
        version,
        public_key: [7u8; 32],
        wrapped_private_key: EncryptedData {
            nonce: [3u8; 12],
            ciphertext: vec![1, 2, 3, 4, 5],
        },
        kdf_salt: Salt::random(),
        kdf_params: KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        is_active: true,
        is_compromised: false,
        failed_attempts: 0,
        locked_until: None,
        created_at: now,
        rotated_at: None,
    }
}

#[test]
fn roundtrips_every_field() {
    let store = DuckDbKeyStore::open_in_memory().unwrap();
    let mut record = sample_record("alice", 1);
    record.failed_attempts = 2;
    record.locked_until = Some(
        (Utc::now() + ChronoDuration::minutes(15))
            .duration_trunc(ChronoDuration::milliseconds(1))
            .unwrap(),
    );
    store.insert_active(record.clone()).unwrap();

    let loaded = store.active_record("alice").unwrap().unwrap();
    assert_eq!(loaded.user_id, record.user_id);
    assert_eq!(loaded.version, record.version);
    assert_eq!(loaded.public_key, record.public_key);
    assert_eq!(loaded.wrapped_private_key.nonce, record.wrapped_private_key.nonce);
    assert_eq!(
        loaded.wrapped_private_key.ciphertext,
        record.wrapped_private_key.ciphertext
    );
    assert_eq!(loaded.kdf_salt, record.kdf_salt);
    assert_eq!(loaded.kdf_params, record.kdf_params);
    assert_eq!(loaded.is_active, record.is_active);
    assert_eq!(loaded.is_compromised, record.is_compromised);
    assert_eq!(loaded.failed_attempts, record.failed_attempts);
    assert_eq!(loaded.locked_until, record.locked_until);
    assert_eq!(loaded.created_at, record.created_at);
    assert_eq!(loaded.rotated_at, record.rotated_at);
}

#[test]
fn second_active_insert_conflicts() {
    let store = DuckDbKeyStore::open_in_memory().unwrap();
    store.insert_active(sample_record("alice", 1)).unwrap();

    assert!(matches!(
        store.insert_active(sample_record("alice", 2)),
        Err(KeyringError::Conflict)
    ));
    // different user is unaffected
    store.insert_active(sample_record("bob", 1)).unwrap();
}

#[test]
fn missing_user_reads_as_none() {
    let store = DuckDbKeyStore::open_in_memory().unwrap();
    assert!(store.active_record("nobody").unwrap().is_none());
    assert!(store.record_version("nobody", 1).unwrap().is_none());
}

#[test]
fn record_failure_is_conditional_on_the_observed_count() {
    let store = DuckDbKeyStore::open_in_memory().unwrap();
    store.insert_active(sample_record("alice", 1)).unwrap();

    assert!(store.record_failure("alice", 1, 0, None).unwrap());
    assert!(store.record_failure("alice", 1, 1, None).unwrap());

    // stale expectations lose
    assert!(!store.record_failure("alice", 1, 0, None).unwrap());
    assert!(!store.record_failure("alice", 99, 2, None).unwrap());

    let record = store.active_record("alice").unwrap().unwrap();
    assert_eq!(record.failed_attempts, 2);

    let until = (Utc::now() + ChronoDuration::minutes(15))
        .duration_trunc(ChronoDuration::milliseconds(1))
        .unwrap();
    assert!(store.record_failure("alice", 1, 2, Some(until)).unwrap());
    let record = store.active_record("alice").unwrap().unwrap();
    assert_eq!(record.failed_attempts, 3);
    assert_eq!(record.locked_until, Some(until));
}

#[test]
fn clear_failures_resets_count_and_lock() {
    let store = DuckDbKeyStore::open_in_memory().unwrap();
    store.insert_active(sample_record("alice", 1)).unwrap();
    let until = Utc::now() + ChronoDuration::minutes(15);
    store.record_failure("alice", 1, 0, Some(until)).unwrap();

    store.clear_failures("alice", 1).unwrap();
    let record = store.active_record("alice").unwrap().unwrap();
    assert_eq!(record.failed_attempts, 0);
    assert!(record.locked_until.is_none());
}

#[test]
fn supersede_swaps_the_active_record_atomically() {
    let store = DuckDbKeyStore::open_in_memory().unwrap();
    store.insert_active(sample_record("alice", 1)).unwrap();

    let mut v2 = sample_record("alice", 2);
    v2.rotated_at = Some(Utc::now().duration_trunc(ChronoDuration::milliseconds(1)).unwrap());
    assert!(store.supersede("alice", 1, v2).unwrap());

    let active = store.active_record("alice").unwrap().unwrap();
    assert_eq!(active.version, 2);
    assert!(active.rotated_at.is_some());

    let old = store.record_version("alice", 1).unwrap().unwrap();
    assert!(!old.is_active);
}

#[test]
fn supersede_with_a_stale_version_rolls_back() {
    let store = DuckDbKeyStore::open_in_memory().unwrap();
    store.insert_active(sample_record("alice", 1)).unwrap();

    // version 1 is active, not 5
    assert!(!store.supersede("alice", 5, sample_record("alice", 2)).unwrap());

    let active = store.active_record("alice").unwrap().unwrap();
    assert_eq!(active.version, 1);
    assert!(store.record_version("alice", 2).unwrap().is_none());
}

#[test]
fn mark_compromised_covers_all_versions() {
    let store = DuckDbKeyStore::open_in_memory().unwrap();
    store.insert_active(sample_record("alice", 1)).unwrap();
    store.supersede("alice", 1, sample_record("alice", 2)).unwrap();

    assert!(store.mark_compromised("alice").unwrap());
    assert!(store.active_record("alice").unwrap().unwrap().is_compromised);
    assert!(store.record_version("alice", 1).unwrap().unwrap().is_compromised);

    assert!(!store.mark_compromised("nobody").unwrap());
}

#[test]
fn reopening_a_database_file_keeps_records() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("keyring.db");

    {
        let store = DuckDbKeyStore::open(&db_path).unwrap();
        store.insert_active(sample_record("alice", 1)).unwrap();
    }

    let store = DuckDbKeyStore::open(&db_path).unwrap();
    let record = store.active_record("alice").unwrap().unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(record.public_key, [7u8; 32]);
}

#[tokio::test]
async fn manager_lifecycle_runs_on_duckdb() {
    let store = Arc::new(DuckDbKeyStore::open_in_memory().unwrap());
    let config = KeyringConfig {
        kdf_params: KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        ..KeyringConfig::default()
    };
    let manager = KeyLifecycleManager::new(store, config);
    let password = "Str0ng!Passw0rd123";

    let created = manager.create_user_keys("alice", password).await.unwrap();
    let unlocked = manager.get_user_private_key("alice", password).await.unwrap();
    assert_eq!(unlocked.version, 1);

    let rotated = manager.rotate_user_keys("alice", password, None).await.unwrap();
    assert_eq!(rotated.version, 2);
    assert_ne!(rotated.new_public_key, created.public_key);

    let unlocked = manager.get_user_private_key("alice", password).await.unwrap();
    assert_eq!(unlocked.version, 2);
}
