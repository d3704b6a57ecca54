//! Key record persistence.
//!
//! Every mutation that touches `failed_attempts`, `locked_until`, or the
//! active version is conditional on the caller's last-read state, so two
//! concurrent wrong-password attempts both count and two concurrent
//! rotations cannot both succeed. Implementations must apply each
//! conditional update atomically.

use crate::error::{KeyringError, KeyringResult};
use crate::record::KeyRecord;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// Durable store of [`KeyRecord`]s, one logical table keyed by
/// `(user_id, version)` with a single-active-per-user constraint.
pub trait KeyRecordStore: Send + Sync {
    /// Inserts the first active record for a user. Fails with
    /// [`KeyringError::Conflict`] if an active record already exists.
    fn insert_active(&self, record: KeyRecord) -> KeyringResult<()>;

    /// The currently active record, if any.
    fn active_record(&self, user_id: &str) -> KeyringResult<Option<KeyRecord>>;

    /// A specific retained version, active or superseded.
    fn record_version(&self, user_id: &str, version: u32) -> KeyringResult<Option<KeyRecord>>;

    /// Conditionally increments the failure counter on the active record
    /// and stores the new lock expiry.
    ///
    /// Applies only if the active record still is `expected_version` with
    /// `expected_failures`; returns `false` otherwise so the caller can
    /// reload and retry. This is what makes concurrent failures count
    /// without lost updates.
    fn record_failure(
        &self,
        user_id: &str,
        expected_version: u32,
        expected_failures: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> KeyringResult<bool>;

    /// Resets the failure counter and clears any lock on the active record.
    fn clear_failures(&self, user_id: &str, version: u32) -> KeyringResult<()>;

    /// Atomically deactivates `expected_version` and inserts `new_record`
    /// as the active one. Returns `false`, leaving the store unchanged,
    /// if the active version is no longer `expected_version` (a
    /// concurrent rotation won).
    fn supersede(
        &self,
        user_id: &str,
        expected_version: u32,
        new_record: KeyRecord,
    ) -> KeyringResult<bool>;

    /// Flags every record for the user as compromised. Returns `false`
    /// if the user has no records.
    fn mark_compromised(&self, user_id: &str) -> KeyringResult<bool>;
}

/// In-memory store for tests and single-process embedding.
#[derive(Default)]
pub struct MemoryKeyStore {
    records: RwLock<HashMap<String, Vec<KeyRecord>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> KeyringResult<std::sync::RwLockReadGuard<'_, HashMap<String, Vec<KeyRecord>>>> {
        self.records
            .read()
            .map_err(|e| KeyringError::Internal(e.to_string()))
    }

    fn write(
        &self,
    ) -> KeyringResult<std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<KeyRecord>>>> {
        self.records
            .write()
            .map_err(|e| KeyringError::Internal(e.to_string()))
    }
}

impl KeyRecordStore for MemoryKeyStore {
    fn insert_active(&self, record: KeyRecord) -> KeyringResult<()> {
        let mut records = self.write()?;
        let versions = records.entry(record.user_id.clone()).or_default();
        if versions.iter().any(|r| r.is_active) {
            return Err(KeyringError::Conflict);
        }
        versions.push(record);
        Ok(())
    }

    fn active_record(&self, user_id: &str) -> KeyringResult<Option<KeyRecord>> {
        Ok(self
            .read()?
            .get(user_id)
            .and_then(|versions| versions.iter().find(|r| r.is_active))
            .cloned())
    }

    fn record_version(&self, user_id: &str, version: u32) -> KeyringResult<Option<KeyRecord>> {
        Ok(self
            .read()?
            .get(user_id)
            .and_then(|versions| versions.iter().find(|r| r.version == version))
            .cloned())
    }

    fn record_failure(
        &self,
        user_id: &str,
        expected_version: u32,
        expected_failures: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> KeyringResult<bool> {
        let mut records = self.write()?;
        let Some(record) = records
            .get_mut(user_id)
            .and_then(|versions| versions.iter_mut().find(|r| r.is_active))
        else {
            return Ok(false);
        };

        if record.version != expected_version || record.failed_attempts != expected_failures {
            return Ok(false);
        }

        record.failed_attempts += 1;
        record.locked_until = locked_until;
        Ok(true)
    }

    fn clear_failures(&self, user_id: &str, version: u32) -> KeyringResult<()> {
        let mut records = self.write()?;
        if let Some(record) = records
            .get_mut(user_id)
            .and_then(|versions| versions.iter_mut().find(|r| r.is_active && r.version == version))
        {
            record.failed_attempts = 0;
            record.locked_until = None;
        }
        Ok(())
    }

    fn supersede(
        &self,
        user_id: &str,
        expected_version: u32,
        new_record: KeyRecord,
    ) -> KeyringResult<bool> {
        let mut records = self.write()?;
        let Some(versions) = records.get_mut(user_id) else {
            return Ok(false);
        };

        let Some(active) = versions.iter_mut().find(|r| r.is_active) else {
            return Ok(false);
        };
        if active.version != expected_version {
            return Ok(false);
        }

        active.is_active = false;
        versions.push(new_record);
        Ok(true)
    }

    fn mark_compromised(&self, user_id: &str) -> KeyringResult<bool> {
        let mut records = self.write()?;
        match records.get_mut(user_id) {
            Some(versions) if !versions.is_empty() => {
                for record in versions.iter_mut() {
                    record.is_compromised = true;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
