//! Key lifecycle orchestration.
//!
//! The manager owns the per-user record state machine: create, unlock,
//! rotate, compromise, and the failure bookkeeping in between. It is
//! constructed with an injected store and audit sink; Argon2id runs on
//! the blocking pool behind a semaphore so a burst of unlock attempts
//! cannot starve the rest of the process, and every derivation is
//! time-boxed.
//!
//! Unwrapped private keys live only for the duration of the call that
//! produced them; nothing here caches or logs key material.

use crate::audit::{AuditEvent, AuditSink, TracingAuditSink};
use crate::error::{KeyringError, KeyringResult};
use crate::lockout::LockoutPolicy;
use crate::password::PasswordPolicy;
use crate::record::KeyRecord;
use crate::store::KeyRecordStore;
use crate::types::{encode_public_key, CreatedKeys, KeyStatus, PublicKeyInfo, RotatedKeys};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crypto_box::{PublicKey, SecretKey};
use heirloom_crypto::envelope::{generate_user_keypair, unwrap_private_key, wrap_private_key};
use heirloom_crypto::{derive_key, DerivedKey, KdfParams, Salt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Tuning knobs for the lifecycle manager.
#[derive(Clone, Debug)]
pub struct KeyringConfig {
    /// Cost parameters for newly wrapped records. Existing records keep
    /// the parameters they were wrapped with.
    pub kdf_params: KdfParams,
    pub lockout: LockoutPolicy,
    pub password_policy: PasswordPolicy,
    /// Key age at which `check_rotation_needed` reports true.
    pub rotation_interval_days: i64,
    /// Upper bound on concurrently running derivations.
    pub max_concurrent_derivations: usize,
    /// Time box for a single derivation.
    pub derivation_timeout: Duration,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            kdf_params: KdfParams::default(),
            lockout: LockoutPolicy::default(),
            password_policy: PasswordPolicy::default(),
            rotation_interval_days: 90,
            max_concurrent_derivations: 4,
            derivation_timeout: Duration::from_secs(5),
        }
    }
}

/// Unwrapped key material for a single operation.
///
/// Not serializable and never cached; the secret key zeroizes on drop
/// (from crypto_box). Callers must drop it as soon as the operation that
/// needed it completes.
pub struct UnlockedKeys {
    pub private_key: SecretKey,
    pub public_key: PublicKey,
    pub version: u32,
}

impl std::fmt::Debug for UnlockedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // key material must never end up in logs
        f.debug_struct("UnlockedKeys")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Orchestrates the per-user key lifecycle against an injected store.
pub struct KeyLifecycleManager {
    store: Arc<dyn KeyRecordStore>,
    audit: Arc<dyn AuditSink>,
    config: KeyringConfig,
    derivation_pool: Arc<Semaphore>,
}

impl KeyLifecycleManager {
    pub fn new(store: Arc<dyn KeyRecordStore>, config: KeyringConfig) -> Self {
        Self::with_audit(store, Arc::new(TracingAuditSink), config)
    }

    pub fn with_audit(
        store: Arc<dyn KeyRecordStore>,
        audit: Arc<dyn AuditSink>,
        config: KeyringConfig,
    ) -> Self {
        let derivation_pool = Arc::new(Semaphore::new(config.max_concurrent_derivations.max(1)));
        Self {
            store,
            audit,
            config,
            derivation_pool,
        }
    }

    /// Creates the first key record for a user.
    ///
    /// Generates a fresh keypair, wraps the private key under a KEK
    /// derived from the password with a fresh salt, and persists the
    /// record as version 1. Only the public key is returned; the private
    /// key is never persisted unwrapped.
    pub async fn create_user_keys(
        &self,
        user_id: &str,
        password: &str,
    ) -> KeyringResult<CreatedKeys> {
        self.config
            .password_policy
            .validate(password)
            .map_err(KeyringError::WeakPassword)?;

        if self.store.active_record(user_id)?.is_some() {
            return Err(KeyringError::Conflict);
        }

        let salt = Salt::random();
        let params = self.config.kdf_params.clone();
        let kek = self.derive_kek(password, &salt, &params).await?;

        let keypair = generate_user_keypair();
        let wrapped = wrap_private_key(&keypair.secret, &kek)
            .map_err(|e| KeyringError::Internal(format!("key wrap failed: {e}")))?;

        let record = KeyRecord {
            user_id: user_id.to_string(),
            version: 1,
            public_key: keypair.public_bytes(),
            wrapped_private_key: wrapped,
            kdf_salt: salt,
            kdf_params: params,
            is_active: true,
            is_compromised: false,
            failed_attempts: 0,
            locked_until: None,
            created_at: Utc::now(),
            rotated_at: None,
        };

        // The store enforces single-active transactionally, so a racing
        // create still ends with exactly one record.
        self.store.insert_active(record)?;
        debug!(%user_id, "created user key record");
        self.audit.record(AuditEvent::KeyCreated {
            user_id: user_id.to_string(),
            version: 1,
        });

        Ok(CreatedKeys {
            public_key: encode_public_key(&keypair.public_bytes()),
        })
    }

    /// Unwraps the active private key with the user's password.
    ///
    /// The returned material is a single-use secret: the caller must not
    /// cache or log it, and must drop it when the calling operation
    /// completes.
    pub async fn get_user_private_key(
        &self,
        user_id: &str,
        password: &str,
    ) -> KeyringResult<UnlockedKeys> {
        let (record, secret) = self.unlock_active(user_id, password).await?;
        Ok(UnlockedKeys {
            private_key: secret,
            public_key: PublicKey::from(record.public_key),
            version: record.version,
        })
    }

    /// Unwraps a retained superseded private key for historical decrypt
    /// during a rotation migration window.
    ///
    /// Gated by the same compromise and lockout checks as the active
    /// record; the password is the one that wrapped the requested
    /// version, which differs from the current password after a rotation
    /// that changed it. A wrong password counts against the active
    /// record's failure counter like any other attempt.
    pub async fn get_superseded_private_key(
        &self,
        user_id: &str,
        password: &str,
        version: u32,
    ) -> KeyringResult<UnlockedKeys> {
        let active = self.store.active_record(user_id)?.ok_or(KeyringError::NotFound)?;
        self.gate(&active, Utc::now())?;

        let record = self
            .store
            .record_version(user_id, version)?
            .ok_or(KeyringError::NotFound)?;

        let kek = self
            .derive_kek(password, &record.kdf_salt, &record.kdf_params)
            .await?;

        match unwrap_private_key(&record.wrapped_private_key, &kek) {
            Ok(secret) => Ok(UnlockedKeys {
                private_key: secret,
                public_key: PublicKey::from(record.public_key),
                version: record.version,
            }),
            Err(_) => {
                self.penalize(user_id)?;
                Err(KeyringError::InvalidCredentials)
            }
        }
    }

    /// The active public key plus metadata. No password required.
    pub fn get_user_public_key(&self, user_id: &str) -> KeyringResult<PublicKeyInfo> {
        let record = self.store.active_record(user_id)?.ok_or(KeyringError::NotFound)?;
        Ok(PublicKeyInfo {
            public_key: encode_public_key(&record.public_key),
            version: record.version,
            created_at: record.created_at,
        })
    }

    /// Retires the current keypair and activates a freshly generated one.
    ///
    /// The replacement password is validated before the unlock sequence
    /// runs, so a weak replacement is reported even when the account is
    /// locked or compromised; the unlock itself then applies the full
    /// check sequence against `current_password`, so rotation obeys
    /// lockout and compromise rules. A new keypair is always generated
    /// — rotation retires
    /// potentially exposed key material, it does not re-wrap it — and
    /// the salt is fresh even when the password is unchanged. The prior
    /// record is marked inactive but retained.
    pub async fn rotate_user_keys(
        &self,
        user_id: &str,
        current_password: &str,
        new_password: Option<&str>,
    ) -> KeyringResult<RotatedKeys> {
        if let Some(new_password) = new_password {
            self.config
                .password_policy
                .validate(new_password)
                .map_err(KeyringError::WeakPassword)?;
        }

        let (old_record, old_secret) = self.unlock_active(user_id, current_password).await?;
        drop(old_secret); // proof of knowledge only; zeroized here

        let wrap_password = new_password.unwrap_or(current_password);
        let salt = Salt::random();
        let params = self.config.kdf_params.clone();
        let kek = self.derive_kek(wrap_password, &salt, &params).await?;

        let keypair = generate_user_keypair();
        let wrapped = wrap_private_key(&keypair.secret, &kek)
            .map_err(|e| KeyringError::Internal(format!("key wrap failed: {e}")))?;

        let new_version = old_record.version + 1;
        let new_record = KeyRecord {
            user_id: user_id.to_string(),
            version: new_version,
            public_key: keypair.public_bytes(),
            wrapped_private_key: wrapped,
            kdf_salt: salt,
            kdf_params: params,
            is_active: true,
            is_compromised: false,
            failed_attempts: 0,
            locked_until: None,
            created_at: Utc::now(),
            rotated_at: Some(Utc::now()),
        };

        if !self.store.supersede(user_id, old_record.version, new_record)? {
            // a concurrent rotation moved the active version first
            return Err(KeyringError::Conflict);
        }

        debug!(%user_id, new_version, "rotated user keys");
        self.audit.record(AuditEvent::KeyRotated {
            user_id: user_id.to_string(),
            new_version,
        });

        Ok(RotatedKeys {
            new_public_key: encode_public_key(&keypair.public_bytes()),
            version: new_version,
        })
    }

    /// Whether the active key is due for rotation: compromised, or older
    /// than the configured interval. Pure read, no password.
    pub fn check_rotation_needed(&self, user_id: &str) -> KeyringResult<bool> {
        let record = self.store.active_record(user_id)?.ok_or(KeyringError::NotFound)?;
        if record.is_compromised {
            return Ok(true);
        }
        let age = Utc::now() - record.rotation_basis();
        Ok(age > ChronoDuration::days(self.config.rotation_interval_days))
    }

    /// Passwordless status summary for the status surface.
    pub fn status(&self, user_id: &str) -> KeyringResult<KeyStatus> {
        let now = Utc::now();
        Ok(match self.store.active_record(user_id)? {
            None => KeyStatus {
                has_keys: false,
                is_compromised: false,
                is_locked: false,
                locked_until: None,
            },
            Some(record) => KeyStatus {
                has_keys: true,
                is_compromised: record.is_compromised,
                is_locked: record.is_locked_at(now),
                locked_until: record.locked_until.filter(|until| now < *until),
            },
        })
    }

    /// Incident path: flags all of a user's records as compromised.
    /// Irreversible by normal flows; recovery replaces the records
    /// out-of-band.
    pub fn mark_compromised(&self, user_id: &str) -> KeyringResult<()> {
        if !self.store.mark_compromised(user_id)? {
            return Err(KeyringError::NotFound);
        }
        self.audit.record(AuditEvent::MarkedCompromised {
            user_id: user_id.to_string(),
        });
        Ok(())
    }

    /// Gate checks shared by every password-bearing operation. Order
    /// matters: compromise and lockout short-circuit before the
    /// expensive derivation, so a locked account costs the server
    /// nothing per attempt.
    fn gate(&self, record: &KeyRecord, now: DateTime<Utc>) -> KeyringResult<()> {
        if record.is_compromised {
            return Err(KeyringError::Compromised);
        }
        if let Some(until) = record.locked_until {
            if now < until {
                return Err(KeyringError::Locked {
                    remaining_secs: (until - now).num_seconds().max(1),
                });
            }
        }
        Ok(())
    }

    /// Full unlock sequence against the active record: gate, derive,
    /// unwrap. Success resets the failure counter; any unwrap failure
    /// counts an attempt and reports the one generic credentials error.
    async fn unlock_active(
        &self,
        user_id: &str,
        password: &str,
    ) -> KeyringResult<(KeyRecord, SecretKey)> {
        let record = self.store.active_record(user_id)?.ok_or(KeyringError::NotFound)?;
        self.gate(&record, Utc::now())?;

        let kek = self
            .derive_kek(password, &record.kdf_salt, &record.kdf_params)
            .await?;

        match unwrap_private_key(&record.wrapped_private_key, &kek) {
            Ok(secret) => {
                self.store.clear_failures(user_id, record.version)?;
                self.audit.record(AuditEvent::UnlockSucceeded {
                    user_id: user_id.to_string(),
                    version: record.version,
                });
                Ok((record, secret))
            }
            Err(_) => {
                // wrong password and corrupted record look identical here,
                // and both count
                self.penalize(user_id)?;
                Err(KeyringError::InvalidCredentials)
            }
        }
    }

    /// Counts a failed attempt and applies any lock the policy calls
    /// for. The conditional update is retried on contention so
    /// concurrent failures all land.
    fn penalize(&self, user_id: &str) -> KeyringResult<()> {
        loop {
            let Some(record) = self.store.active_record(user_id)? else {
                return Ok(());
            };

            let failures = record.failed_attempts + 1;
            let locked_until = self.config.lockout.next_lock_expiry(failures, Utc::now());

            if self.store.record_failure(
                user_id,
                record.version,
                record.failed_attempts,
                locked_until,
            )? {
                self.audit.record(AuditEvent::UnlockFailed {
                    user_id: user_id.to_string(),
                    failed_attempts: failures,
                });
                if let Some(until) = locked_until {
                    self.audit.record(AuditEvent::LockoutTriggered {
                        user_id: user_id.to_string(),
                        failed_attempts: failures,
                        locked_until: until,
                    });
                }
                return Ok(());
            }
            // another attempt updated the counter first; reload and retry
        }
    }

    /// Runs Argon2id on the blocking pool, bounded and time-boxed.
    ///
    /// The semaphore keeps an unlock burst from monopolizing blocking
    /// threads needed elsewhere; the timeout keeps a wedged derivation
    /// from pinning its operation. No record lock is held across this.
    async fn derive_kek(
        &self,
        password: &str,
        salt: &Salt,
        params: &KdfParams,
    ) -> KeyringResult<DerivedKey> {
        let permit = self
            .derivation_pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| KeyringError::Internal("derivation pool closed".into()))?;

        let password = Zeroizing::new(password.to_string());
        let salt = salt.clone();
        let params = params.clone();

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            derive_key(&password, &salt, &params)
        });

        match tokio::time::timeout(self.config.derivation_timeout, task).await {
            Ok(Ok(Ok(kek))) => Ok(kek),
            Ok(Ok(Err(e))) => Err(KeyringError::Internal(format!("key derivation failed: {e}"))),
            Ok(Err(join_err)) => Err(KeyringError::Internal(format!(
                "derivation task failed: {join_err}"
            ))),
            Err(_) => {
                warn!(timeout = ?self.config.derivation_timeout, "key derivation timed out");
                Err(KeyringError::Internal("key derivation timed out".into()))
            }
        }
    }
}
