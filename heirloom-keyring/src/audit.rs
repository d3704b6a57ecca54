//! Best-effort audit events.
//!
//! The lifecycle manager emits an event after each security-relevant
//! transition. Delivery is fire-and-forget: sinks must not block and a
//! sink failure never fails the operation. Events carry no secret
//! material — user ids, versions, and counters only.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Security-relevant lifecycle transitions.
#[derive(Clone, Debug)]
pub enum AuditEvent {
    KeyCreated {
        user_id: String,
        version: u32,
    },
    UnlockSucceeded {
        user_id: String,
        version: u32,
    },
    UnlockFailed {
        user_id: String,
        failed_attempts: u32,
    },
    LockoutTriggered {
        user_id: String,
        failed_attempts: u32,
        locked_until: DateTime<Utc>,
    },
    KeyRotated {
        user_id: String,
        new_version: u32,
    },
    MarkedCompromised {
        user_id: String,
    },
}

/// Receives audit events. Implementations must be non-blocking.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Logs audit events through `tracing`.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event {
            AuditEvent::KeyCreated { user_id, version } => {
                info!(%user_id, version, "user keys created");
            }
            AuditEvent::UnlockSucceeded { user_id, version } => {
                info!(%user_id, version, "key unlocked");
            }
            AuditEvent::UnlockFailed {
                user_id,
                failed_attempts,
            } => {
                info!(%user_id, failed_attempts, "key unlock failed");
            }
            AuditEvent::LockoutTriggered {
                user_id,
                failed_attempts,
                locked_until,
            } => {
                warn!(%user_id, failed_attempts, %locked_until, "key lockout triggered");
            }
            AuditEvent::KeyRotated {
                user_id,
                new_version,
            } => {
                info!(%user_id, new_version, "user keys rotated");
            }
            AuditEvent::MarkedCompromised { user_id } => {
                warn!(%user_id, "user keys marked compromised");
            }
        }
    }
}

/// Discards audit events.
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) {}
}
