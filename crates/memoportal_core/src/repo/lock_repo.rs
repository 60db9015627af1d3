//! Resource lock storage.
//!
//! # Responsibility
//! - Persist advisory edit locks keyed by `(resource_type, resource_id)`.
//! - Provide the compare-and-set primitive used for acquisition.
//!
//! # Invariants
//! - The primary key guarantees one row per resource.
//! - Acquisition is one conditional upsert inside an immediate transaction:
//!   it succeeds only when no row exists, the row is expired, or the row is
//!   already owned by the caller. Two concurrent callers cannot both win.
//! - Conditional deletes re-check ownership/expiry in SQL so a lock
//!   refreshed between read and delete is never removed by a stale reader.

use crate::clock::EpochMillis;
use crate::model::actor::ActorId;
use crate::model::lock::{LockHolder, ResourceKey, ResourceLock};
use crate::repo::{ensure_connection_ready, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const LOCK_SELECT_SQL: &str = "SELECT
    resource_type,
    resource_id,
    owner_id,
    owner_name,
    owner_email,
    locked_at,
    expires_at
FROM resource_locks";

// `locked_at` is kept across a same-owner refresh; `expires_at` never moves
// backwards for the same owner.
const ACQUIRE_SQL: &str = "INSERT INTO resource_locks (
    resource_type,
    resource_id,
    owner_id,
    owner_name,
    owner_email,
    locked_at,
    expires_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT(resource_type, resource_id) DO UPDATE SET
    locked_at = CASE
        WHEN resource_locks.owner_id = excluded.owner_id
             AND resource_locks.expires_at > excluded.locked_at
        THEN resource_locks.locked_at
        ELSE excluded.locked_at
    END,
    expires_at = CASE
        WHEN resource_locks.owner_id = excluded.owner_id
             AND resource_locks.expires_at > excluded.expires_at
        THEN resource_locks.expires_at
        ELSE excluded.expires_at
    END,
    owner_id = excluded.owner_id,
    owner_name = excluded.owner_name,
    owner_email = excluded.owner_email
WHERE resource_locks.owner_id = excluded.owner_id
   OR resource_locks.expires_at <= excluded.locked_at;";

/// Result of one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// A new lock row was written. `replaced_expired` holds the expired row
    /// it superseded, if any.
    Created {
        lock: ResourceLock,
        replaced_expired: Option<ResourceLock>,
    },
    /// The caller already held an unexpired lock; expiry was pushed out.
    Refreshed(ResourceLock),
    /// Another actor holds an unexpired lock; nothing was written.
    Held(ResourceLock),
}

pub trait LockRepository {
    fn try_acquire(
        &self,
        key: &ResourceKey,
        holder: &LockHolder,
        now: EpochMillis,
        expires_at: EpochMillis,
    ) -> RepoResult<AcquireOutcome>;
    fn find_lock(&self, key: &ResourceKey) -> RepoResult<Option<ResourceLock>>;
    /// Unconditional delete. Returns whether a row was removed.
    fn delete_lock(&self, key: &ResourceKey) -> RepoResult<bool>;
    /// Deletes only when `holder_id` owns the row.
    fn delete_lock_held_by(&self, key: &ResourceKey, holder_id: ActorId) -> RepoResult<bool>;
    /// Deletes only when the row is expired at `now`.
    fn delete_if_expired(&self, key: &ResourceKey, now: EpochMillis) -> RepoResult<bool>;
    /// Adds `delta_ms` to the current expiry of an unexpired lock owned by
    /// `holder_id`. Returns the updated lock, or `None` when no such lock.
    fn extend_lock(
        &self,
        key: &ResourceKey,
        holder_id: ActorId,
        delta_ms: i64,
        now: EpochMillis,
    ) -> RepoResult<Option<ResourceLock>>;
    /// All stored rows, expired or not, optionally filtered by owner.
    fn list_locks(&self, holder_id: Option<ActorId>) -> RepoResult<Vec<ResourceLock>>;
    /// Deletes every row expired at `now`. Returns the number removed.
    fn delete_expired(&self, now: EpochMillis) -> RepoResult<usize>;
}

pub struct SqliteLockRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLockRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            "resource_locks",
            &[
                "resource_type",
                "resource_id",
                "owner_id",
                "owner_name",
                "owner_email",
                "locked_at",
                "expires_at",
            ],
        )?;
        Ok(Self { conn })
    }
}

impl LockRepository for SqliteLockRepository<'_> {
    fn try_acquire(
        &self,
        key: &ResourceKey,
        holder: &LockHolder,
        now: EpochMillis,
        expires_at: EpochMillis,
    ) -> RepoResult<AcquireOutcome> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let previous = select_lock(&tx, key)?;
        let changed = tx.execute(
            ACQUIRE_SQL,
            params![
                key.resource_type.as_str(),
                key.resource_id.as_str(),
                holder.id.to_string(),
                holder.name.as_str(),
                holder.email.as_str(),
                now,
                expires_at,
            ],
        )?;
        let current = select_lock(&tx, key)?.ok_or_else(|| RepoError::NotFound {
            entity: "resource lock",
            id: key.to_string(),
        })?;
        tx.commit()?;

        let outcome = match previous {
            None => AcquireOutcome::Created {
                lock: current,
                replaced_expired: None,
            },
            Some(_) if changed == 0 => AcquireOutcome::Held(current),
            Some(previous) if previous.is_held_by(holder.id) && !previous.is_expired(now) => {
                AcquireOutcome::Refreshed(current)
            }
            Some(previous) => AcquireOutcome::Created {
                lock: current,
                replaced_expired: Some(previous),
            },
        };
        Ok(outcome)
    }

    fn find_lock(&self, key: &ResourceKey) -> RepoResult<Option<ResourceLock>> {
        select_lock(self.conn, key)
    }

    fn delete_lock(&self, key: &ResourceKey) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM resource_locks WHERE resource_type = ?1 AND resource_id = ?2;",
            params![key.resource_type.as_str(), key.resource_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    fn delete_lock_held_by(&self, key: &ResourceKey, holder_id: ActorId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM resource_locks
             WHERE resource_type = ?1
               AND resource_id = ?2
               AND owner_id = ?3;",
            params![
                key.resource_type.as_str(),
                key.resource_id.as_str(),
                holder_id.to_string(),
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_if_expired(&self, key: &ResourceKey, now: EpochMillis) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM resource_locks
             WHERE resource_type = ?1
               AND resource_id = ?2
               AND expires_at <= ?3;",
            params![key.resource_type.as_str(), key.resource_id.as_str(), now],
        )?;
        Ok(changed > 0)
    }

    fn extend_lock(
        &self,
        key: &ResourceKey,
        holder_id: ActorId,
        delta_ms: i64,
        now: EpochMillis,
    ) -> RepoResult<Option<ResourceLock>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE resource_locks
             SET expires_at = expires_at + ?4
             WHERE resource_type = ?1
               AND resource_id = ?2
               AND owner_id = ?3
               AND expires_at > ?5;",
            params![
                key.resource_type.as_str(),
                key.resource_id.as_str(),
                holder_id.to_string(),
                delta_ms,
                now,
            ],
        )?;
        let updated = if changed == 0 {
            None
        } else {
            select_lock(&tx, key)?
        };
        tx.commit()?;
        Ok(updated)
    }

    fn list_locks(&self, holder_id: Option<ActorId>) -> RepoResult<Vec<ResourceLock>> {
        let mut stmt = self.conn.prepare(&format!(
            "{LOCK_SELECT_SQL}
             WHERE (?1 IS NULL OR owner_id = ?1)
             ORDER BY locked_at ASC, resource_type ASC, resource_id ASC;"
        ))?;
        let mut rows = stmt.query([holder_id.map(|id| id.to_string())])?;
        let mut locks = Vec::new();
        while let Some(row) = rows.next()? {
            locks.push(parse_lock_row(row)?);
        }
        Ok(locks)
    }

    fn delete_expired(&self, now: EpochMillis) -> RepoResult<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM resource_locks WHERE expires_at <= ?1;", [now])?;
        Ok(removed)
    }
}

fn select_lock(conn: &Connection, key: &ResourceKey) -> RepoResult<Option<ResourceLock>> {
    let mut stmt = conn.prepare(&format!(
        "{LOCK_SELECT_SQL}
         WHERE resource_type = ?1 AND resource_id = ?2;"
    ))?;
    let row = stmt
        .query_row(
            params![key.resource_type.as_str(), key.resource_id.as_str()],
            |row| Ok(parse_lock_row(row)),
        )
        .optional()?;
    row.transpose()
}

fn parse_lock_row(row: &Row<'_>) -> RepoResult<ResourceLock> {
    let owner_id: String = row.get("owner_id")?;
    Ok(ResourceLock {
        key: ResourceKey::new(
            row.get::<_, String>("resource_type")?,
            row.get::<_, String>("resource_id")?,
        ),
        holder: LockHolder {
            id: parse_uuid(&owner_id, "resource_locks.owner_id")?,
            name: row.get("owner_name")?,
            email: row.get("owner_email")?,
        },
        locked_at: row.get("locked_at")?,
        expires_at: row.get("expires_at")?,
    })
}
