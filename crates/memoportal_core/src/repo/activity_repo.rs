//! Activity trail storage.
//!
//! # Invariants
//! - Rows are insert-only; the only delete path is bulk purge.
//! - Listing order is deterministic: `created_at DESC, id ASC`.

use crate::clock::EpochMillis;
use crate::model::activity::{ActivityLogEntry, ActorSnapshot, RequestContext};
use crate::model::role::Role;
use crate::repo::{ensure_connection_ready, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};
use serde_json::Value;

const ACTIVITY_SELECT_SQL: &str = "SELECT
    id,
    actor_id,
    actor_email,
    actor_role,
    actor_department,
    action,
    target,
    target_id,
    details,
    ip_address,
    user_agent,
    created_at
FROM activity_logs";

pub trait ActivityRepository {
    fn append(&self, entry: &ActivityLogEntry) -> RepoResult<()>;
    fn list_recent(&self, limit: u32) -> RepoResult<Vec<ActivityLogEntry>>;
    fn list_for_target(&self, target_id: &str) -> RepoResult<Vec<ActivityLogEntry>>;
    /// Deletes entries created before `before`, or every entry when `None`.
    fn purge(&self, before: Option<EpochMillis>) -> RepoResult<usize>;
}

pub struct SqliteActivityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteActivityRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            "activity_logs",
            &[
                "id",
                "actor_id",
                "actor_email",
                "actor_role",
                "actor_department",
                "action",
                "target",
                "target_id",
                "details",
                "ip_address",
                "user_agent",
                "created_at",
            ],
        )?;
        Ok(Self { conn })
    }

    fn query_entries(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> RepoResult<Vec<ActivityLogEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_activity_row(row)?);
        }
        Ok(entries)
    }
}

impl ActivityRepository for SqliteActivityRepository<'_> {
    fn append(&self, entry: &ActivityLogEntry) -> RepoResult<()> {
        let details = serde_json::to_string(&entry.details)
            .map_err(|err| RepoError::InvalidData(format!("activity details: {err}")))?;
        let actor = entry.actor.as_ref();
        self.conn.execute(
            "INSERT INTO activity_logs (
                id,
                actor_id,
                actor_email,
                actor_role,
                actor_department,
                action,
                target,
                target_id,
                details,
                ip_address,
                user_agent,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);",
            params![
                entry.id.to_string(),
                actor.map(|snapshot| snapshot.id.to_string()),
                actor.map(|snapshot| snapshot.email.as_str()),
                actor.map(|snapshot| snapshot.role.as_str()),
                actor.and_then(|snapshot| snapshot.department.as_deref()),
                entry.action.as_str(),
                entry.target.as_str(),
                entry.target_id.as_deref(),
                details,
                entry.request.ip_address.as_deref(),
                entry.request.user_agent.as_deref(),
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    fn list_recent(&self, limit: u32) -> RepoResult<Vec<ActivityLogEntry>> {
        self.query_entries(
            &format!("{ACTIVITY_SELECT_SQL} ORDER BY created_at DESC, id ASC LIMIT ?1;"),
            [i64::from(limit)],
        )
    }

    fn list_for_target(&self, target_id: &str) -> RepoResult<Vec<ActivityLogEntry>> {
        self.query_entries(
            &format!(
                "{ACTIVITY_SELECT_SQL}
                 WHERE target_id = ?1
                 ORDER BY created_at DESC, id ASC;"
            ),
            [target_id],
        )
    }

    fn purge(&self, before: Option<EpochMillis>) -> RepoResult<usize> {
        let removed = match before {
            Some(cutoff) => self
                .conn
                .execute("DELETE FROM activity_logs WHERE created_at < ?1;", [cutoff])?,
            None => self.conn.execute("DELETE FROM activity_logs;", [])?,
        };
        Ok(removed)
    }
}

fn parse_activity_row(row: &Row<'_>) -> RepoResult<ActivityLogEntry> {
    let id: String = row.get("id")?;
    let actor = match row.get::<_, Option<String>>("actor_id")? {
        Some(actor_id) => {
            let role_text: String = row.get("actor_role")?;
            let role = Role::parse(&role_text).ok_or_else(|| {
                RepoError::InvalidData(format!(
                    "invalid role `{role_text}` in activity_logs.actor_role"
                ))
            })?;
            Some(ActorSnapshot {
                id: parse_uuid(&actor_id, "activity_logs.actor_id")?,
                email: row.get("actor_email")?,
                role,
                department: row.get("actor_department")?,
            })
        }
        None => None,
    };

    let details_text: String = row.get("details")?;
    let details = match serde_json::from_str::<Value>(&details_text) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            return Err(RepoError::InvalidData(format!(
                "activity_logs.details for `{id}` is not a JSON object"
            )));
        }
    };

    Ok(ActivityLogEntry {
        id: parse_uuid(&id, "activity_logs.id")?,
        actor,
        action: row.get("action")?,
        target: row.get("target")?,
        target_id: row.get("target_id")?,
        details,
        request: RequestContext {
            ip_address: row.get("ip_address")?,
            user_agent: row.get("user_agent")?,
        },
        created_at: row.get("created_at")?,
    })
}
