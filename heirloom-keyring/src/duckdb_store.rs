//! DuckDB-backed key record store.
//!
//! One `key_records` table keyed by `(user_id, version)`. All access goes
//! through a single shared connection behind a mutex; conditional updates
//! are expressed as `UPDATE ... WHERE` guards on the expected version and
//! failure count, with the affected-row count as the success signal.

use crate::error::{KeyringError, KeyringResult};
use crate::record::KeyRecord;
use crate::store::KeyRecordStore;
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use heirloom_crypto::{EncryptedData, KdfParams, Salt, SALT_SIZE};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Key record store persisted in DuckDB.
pub struct DuckDbKeyStore {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbKeyStore {
    /// Opens (or creates) a store at the given database path.
    pub fn open(db_path: &Path) -> KeyringResult<Self> {
        let conn = Connection::open(db_path).map_err(storage_err)?;
        // Cap memory/threads — DuckDB defaults to ~80% RAM per connection
        conn.execute_batch("PRAGMA memory_limit='64MB'; PRAGMA threads=1;")
            .map_err(storage_err)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory store (tests, ephemeral use).
    pub fn open_in_memory() -> KeyringResult<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> KeyringResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.ensure_table()?;
        Ok(store)
    }

    fn ensure_table(&self) -> KeyringResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS key_records (
                user_id VARCHAR NOT NULL,
                version INTEGER NOT NULL,
                public_key BLOB NOT NULL,
                wrapped_private_key BLOB NOT NULL,
                kdf_salt BLOB NOT NULL,
                kdf_memory_kib INTEGER NOT NULL,
                kdf_iterations INTEGER NOT NULL,
                kdf_parallelism INTEGER NOT NULL,
                is_active BOOLEAN NOT NULL,
                is_compromised BOOLEAN NOT NULL,
                failed_attempts INTEGER NOT NULL,
                locked_until BIGINT,
                created_at BIGINT NOT NULL,
                rotated_at BIGINT,
                PRIMARY KEY (user_id, version)
            );",
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn lock(&self) -> KeyringResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| KeyringError::Internal(e.to_string()))
    }

    fn insert_row(conn: &Connection, record: &KeyRecord) -> KeyringResult<()> {
        let wrapped = serde_json::to_vec(&record.wrapped_private_key)
            .map_err(|e| KeyringError::Internal(e.to_string()))?;

        conn.execute(
            "INSERT INTO key_records (
                user_id, version, public_key, wrapped_private_key, kdf_salt,
                kdf_memory_kib, kdf_iterations, kdf_parallelism,
                is_active, is_compromised, failed_attempts, locked_until,
                created_at, rotated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.user_id,
                record.version,
                record.public_key.to_vec(),
                wrapped,
                record.kdf_salt.as_bytes().to_vec(),
                record.kdf_params.memory_kib,
                record.kdf_params.iterations,
                record.kdf_params.parallelism,
                record.is_active,
                record.is_compromised,
                record.failed_attempts,
                record.locked_until.map(|t| t.timestamp_millis()),
                record.created_at.timestamp_millis(),
                record.rotated_at.map(|t| t.timestamp_millis()),
            ],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn query_one(
        conn: &Connection,
        sql: &str,
        query_params: &[&dyn duckdb::ToSql],
    ) -> KeyringResult<Option<KeyRecord>> {
        let mut stmt = conn.prepare(sql).map_err(storage_err)?;
        let mut rows = stmt
            .query_map(query_params, raw_row)
            .map_err(storage_err)?;

        match rows.next() {
            None => Ok(None),
            Some(raw) => Ok(Some(raw.map_err(storage_err)?.into_record()?)),
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT user_id, version, public_key, wrapped_private_key, kdf_salt,
        kdf_memory_kib, kdf_iterations, kdf_parallelism,
        is_active, is_compromised, failed_attempts, locked_until,
        created_at, rotated_at
 FROM key_records";

impl KeyRecordStore for DuckDbKeyStore {
    fn insert_active(&self, record: KeyRecord) -> KeyringResult<()> {
        // The connection mutex serializes the check-then-insert
        let conn = self.lock()?;

        let active: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM key_records WHERE user_id = ? AND is_active",
                params![record.user_id],
                |row| row.get(0),
            )
            .map_err(storage_err)?;
        if active > 0 {
            return Err(KeyringError::Conflict);
        }

        Self::insert_row(&conn, &record)
    }

    fn active_record(&self, user_id: &str) -> KeyringResult<Option<KeyRecord>> {
        let conn = self.lock()?;
        Self::query_one(
            &conn,
            &format!("{SELECT_COLUMNS} WHERE user_id = ? AND is_active"),
            &[&user_id],
        )
    }

    fn record_version(&self, user_id: &str, version: u32) -> KeyringResult<Option<KeyRecord>> {
        let conn = self.lock()?;
        Self::query_one(
            &conn,
            &format!("{SELECT_COLUMNS} WHERE user_id = ? AND version = ?"),
            &[&user_id, &version],
        )
    }

    fn record_failure(
        &self,
        user_id: &str,
        expected_version: u32,
        expected_failures: u32,
        locked_until: Option<DateTime<Utc>>,
    ) -> KeyringResult<bool> {
        let conn = self.lock()?;
        let affected = conn
            .execute(
                "UPDATE key_records
                 SET failed_attempts = failed_attempts + 1, locked_until = ?
                 WHERE user_id = ? AND version = ? AND is_active AND failed_attempts = ?",
                params![
                    locked_until.map(|t| t.timestamp_millis()),
                    user_id,
                    expected_version,
                    expected_failures,
                ],
            )
            .map_err(storage_err)?;
        Ok(affected == 1)
    }

    fn clear_failures(&self, user_id: &str, version: u32) -> KeyringResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE key_records
             SET failed_attempts = 0, locked_until = NULL
             WHERE user_id = ? AND version = ? AND is_active",
            params![user_id, version],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn supersede(
        &self,
        user_id: &str,
        expected_version: u32,
        new_record: KeyRecord,
    ) -> KeyringResult<bool> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN TRANSACTION;").map_err(storage_err)?;

        let deactivated = match conn.execute(
            "UPDATE key_records SET is_active = FALSE
             WHERE user_id = ? AND version = ? AND is_active",
            params![user_id, expected_version],
        ) {
            Ok(n) => n,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK;");
                return Err(storage_err(e));
            }
        };

        if deactivated == 0 {
            let _ = conn.execute_batch("ROLLBACK;");
            return Ok(false);
        }

        if let Err(e) = Self::insert_row(&conn, &new_record) {
            let _ = conn.execute_batch("ROLLBACK;");
            return Err(e);
        }

        conn.execute_batch("COMMIT;").map_err(storage_err)?;
        Ok(true)
    }

    fn mark_compromised(&self, user_id: &str) -> KeyringResult<bool> {
        let conn = self.lock()?;
        let affected = conn
            .execute(
                "UPDATE key_records SET is_compromised = TRUE WHERE user_id = ?",
                params![user_id],
            )
            .map_err(storage_err)?;
        Ok(affected > 0)
    }
}

fn storage_err(e: duckdb::Error) -> KeyringError {
    KeyringError::Internal(format!("storage error: {e}"))
}

/// Column values as read from DuckDB, before JSON/length validation.
struct RawRecord {
    user_id: String,
    version: u32,
    public_key: Vec<u8>,
    wrapped_private_key: Vec<u8>,
    kdf_salt: Vec<u8>,
    kdf_memory_kib: u32,
    kdf_iterations: u32,
    kdf_parallelism: u32,
    is_active: bool,
    is_compromised: bool,
    failed_attempts: u32,
    locked_until: Option<i64>,
    created_at: i64,
    rotated_at: Option<i64>,
}

fn raw_row(row: &duckdb::Row<'_>) -> duckdb::Result<RawRecord> {
    Ok(RawRecord {
        user_id: row.get(0)?,
        version: row.get(1)?,
        public_key: row.get(2)?,
        wrapped_private_key: row.get(3)?,
        kdf_salt: row.get(4)?,
        kdf_memory_kib: row.get(5)?,
        kdf_iterations: row.get(6)?,
        kdf_parallelism: row.get(7)?,
        is_active: row.get(8)?,
        is_compromised: row.get(9)?,
        failed_attempts: row.get(10)?,
        locked_until: row.get(11)?,
        created_at: row.get(12)?,
        rotated_at: row.get(13)?,
    })
}

impl RawRecord {
    fn into_record(self) -> KeyringResult<KeyRecord> {
        let public_key: [u8; 32] = self
            .public_key
            .try_into()
            .map_err(|_| KeyringError::Internal("invalid public key length".into()))?;

        let salt: [u8; SALT_SIZE] = self
            .kdf_salt
            .try_into()
            .map_err(|_| KeyringError::Internal("invalid salt length".into()))?;

        let wrapped_private_key: EncryptedData =
            serde_json::from_slice(&self.wrapped_private_key)
                .map_err(|e| KeyringError::Internal(e.to_string()))?;

        Ok(KeyRecord {
            user_id: self.user_id,
            version: self.version,
            public_key,
            wrapped_private_key,
            kdf_salt: Salt::from_bytes(salt),
            kdf_params: KdfParams {
                memory_kib: self.kdf_memory_kib,
                iterations: self.kdf_iterations,
                parallelism: self.kdf_parallelism,
            },
            is_active: self.is_active,
            is_compromised: self.is_compromised,
            failed_attempts: self.failed_attempts,
            locked_until: self.locked_until.and_then(DateTime::from_timestamp_millis),
            created_at: DateTime::from_timestamp_millis(self.created_at)
                .ok_or_else(|| KeyringError::Internal("invalid created_at".into()))?,
            rotated_at: self.rotated_at.and_then(DateTime::from_timestamp_millis),
        })
    }
}
