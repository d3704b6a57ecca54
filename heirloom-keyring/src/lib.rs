//! Per-user encryption key lifecycle for Heirloom.
//!
//! Each user has a password-protected X25519 keypair used for
//! zero-knowledge document encryption. This crate owns that keypair's
//! lifecycle: creation, password unlock, brute-force lockout, compromise
//! handling, and rotation. Documents themselves are encrypted against
//! the public key by `heirloom_crypto::filecrypt`; decrypting them
//! requires the private key unwrapped here.
//!
//! The lifecycle manager is an explicit instance constructed with an
//! injected record store and audit sink — no globals — so tests can run
//! against the in-memory store with cheap KDF parameters.

pub mod audit;
mod duckdb_store;
mod error;
pub mod lockout;
mod manager;
pub mod password;
mod record;
mod store;
pub mod types;

pub use audit::{AuditEvent, AuditSink, NullAuditSink, TracingAuditSink};
pub use duckdb_store::DuckDbKeyStore;
pub use error::{KeyringError, KeyringResult};
pub use lockout::LockoutPolicy;
pub use manager::{KeyLifecycleManager, KeyringConfig, UnlockedKeys};
pub use password::{PasswordIssue, PasswordPolicy};
pub use record::{KeyRecord, KeyState};
pub use store::{KeyRecordStore, MemoryKeyStore};
pub use types::{CreatedKeys, KeyStatus, PublicKeyInfo, RotatedKeys};
