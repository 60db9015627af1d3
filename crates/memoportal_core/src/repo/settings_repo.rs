//! System-wide key/value settings.

use crate::clock::EpochMillis;
use crate::repo::{ensure_connection_ready, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

pub const LOCK_DURATION_MINUTES_KEY: &str = "lock.duration_minutes";
pub const LOCK_DURATION_SECONDS_KEY: &str = "lock.duration_seconds";

pub trait SettingsRepository {
    fn get_setting(&self, key: &str) -> RepoResult<Option<String>>;
    /// Writes all pairs atomically.
    fn put_settings(&self, entries: &[(&str, String)], now: EpochMillis) -> RepoResult<()>;
}

pub struct SqliteSettingsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSettingsRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, "system_settings", &["key", "value", "updated_at"])?;
        Ok(Self { conn })
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn get_setting(&self, key: &str) -> RepoResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM system_settings WHERE key = ?1;",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put_settings(&self, entries: &[(&str, String)], now: EpochMillis) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO system_settings (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at;",
                params![key, value.as_str(), now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
