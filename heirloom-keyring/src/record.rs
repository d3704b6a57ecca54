//! Per-user key records.

use chrono::{DateTime, Utc};
use heirloom_crypto::{EncryptedData, KdfParams, Salt};
use serde::{Deserialize, Serialize};

/// One row per user per key version. Exactly one version per user is
/// active at any time; superseded versions are retained so payloads
/// encrypted under older keys stay decryptable during migration.
///
/// `wrapped_private_key` is only meaningful together with this record's
/// own `kdf_salt` and `kdf_params`; they are never mixed across records.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyRecord {
    pub user_id: String,
    /// Monotonically increasing per user, starting at 1.
    pub version: u32,
    /// X25519 public key; safe to disclose.
    pub public_key: [u8; 32],
    /// Private key wrapped under the password-derived KEK.
    pub wrapped_private_key: EncryptedData,
    /// Salt used to derive this record's KEK. Unique per record.
    pub kdf_salt: Salt,
    /// Cost parameters in force when this record was wrapped.
    pub kdf_params: KdfParams,
    pub is_active: bool,
    /// Set by the incident process; never cleared by normal flows.
    pub is_compromised: bool,
    /// Consecutive failed unlock attempts; reset to 0 on success.
    pub failed_attempts: u32,
    /// While `now < locked_until`, unlock attempts are rejected before
    /// the KDF runs.
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub rotated_at: Option<DateTime<Utc>>,
}

impl KeyRecord {
    /// Whether the record is locked at `now`.
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| now < until)
    }

    /// Timestamp rotation age is measured from.
    pub fn rotation_basis(&self) -> DateTime<Utc> {
        self.rotated_at.unwrap_or(self.created_at)
    }

    /// The record's lifecycle state at `now`. A user with no records at
    /// all is uninitialized, which has no record to ask.
    pub fn state_at(&self, now: DateTime<Utc>) -> KeyState {
        if self.is_compromised {
            KeyState::Compromised
        } else if !self.is_active {
            KeyState::Superseded
        } else if self.is_locked_at(now) {
            KeyState::Locked
        } else {
            KeyState::Active
        }
    }
}

/// Lifecycle state of a key record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyState {
    Active,
    Locked,
    /// Terminal until an out-of-band recovery replaces the active record.
    Compromised,
    /// Retained for historical decryption only.
    Superseded,
}
