//! Key lifecycle error taxonomy.
//!
//! Password-adjacent failures are deliberately uninformative: a caller
//! cannot tell a wrong password from a corrupted record, and an attempt
//! that triggered a lock still reports `InvalidCredentials`. Storage and
//! crypto faults are logged internally and surfaced as `Internal` with
//! no secret material attached.

use crate::password::PasswordIssue;
use thiserror::Error;

/// Result type for key lifecycle operations.
pub type KeyringResult<T> = Result<T, KeyringError>;

/// Errors surfaced by the key lifecycle manager.
#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("password does not meet policy")]
    WeakPassword(Vec<PasswordIssue>),

    #[error("invalid credentials")]
    InvalidCredentials,

    /// The remaining lock duration is disclosed on purpose: it helps
    /// legitimate users and leaks nothing secret.
    #[error("key is locked for {remaining_secs}s")]
    Locked { remaining_secs: i64 },

    #[error("key is marked compromised")]
    Compromised,

    #[error("no key found for user")]
    NotFound,

    #[error("an active key already exists")]
    Conflict,

    #[error("internal error: {0}")]
    Internal(String),
}
