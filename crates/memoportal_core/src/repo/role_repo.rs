//! Role permission-set storage.
//!
//! # Responsibility
//! - Persist the ordered permission list of each fixed role.
//! - Seed default role definitions without overwriting edits.
//!
//! # Invariants
//! - Stored keys are always registry keys; unknown keys are rejected on save.
//! - Permission order is preserved via `position`.

use crate::model::permission::{is_known_permission, list_roles};
use crate::model::role::Role;
use crate::repo::{ensure_connection_ready, RepoError, RepoResult};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

/// Stored role with its granted permission keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRecord {
    pub role: Role,
    pub description: String,
    pub permissions: Vec<String>,
}

impl RoleRecord {
    pub fn grants(&self, permission_key: &str) -> bool {
        self.permissions.iter().any(|key| key == permission_key)
    }
}

pub trait RoleRepository {
    fn find_role(&self, role: Role) -> RepoResult<Option<RoleRecord>>;
    fn list_roles(&self) -> RepoResult<Vec<RoleRecord>>;
    /// Replaces the role's permission list.
    fn save_role(&self, record: &RoleRecord) -> RepoResult<()>;
    /// Inserts default definitions for roles that are not stored yet.
    /// Returns how many roles were inserted.
    fn seed_default_roles(&self) -> RepoResult<usize>;
}

pub struct SqliteRoleRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRoleRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, "roles", &["name", "description", "updated_at"])?;
        ensure_connection_ready(
            conn,
            "role_permissions",
            &["role_name", "permission_key", "position"],
        )?;
        Ok(Self { conn })
    }
}

impl RoleRepository for SqliteRoleRepository<'_> {
    fn find_role(&self, role: Role) -> RepoResult<Option<RoleRecord>> {
        let description: Option<String> = self
            .conn
            .query_row(
                "SELECT description FROM roles WHERE name = ?1;",
                [role.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(description) = description else {
            return Ok(None);
        };

        Ok(Some(RoleRecord {
            role,
            description,
            permissions: load_permissions(self.conn, role)?,
        }))
    }

    fn list_roles(&self) -> RepoResult<Vec<RoleRecord>> {
        let mut records = Vec::new();
        for role in Role::ALL {
            if let Some(record) = self.find_role(role)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn save_role(&self, record: &RoleRecord) -> RepoResult<()> {
        if let Some(unknown) = record
            .permissions
            .iter()
            .find(|key| !is_known_permission(key))
        {
            return Err(RepoError::Validation(format!(
                "role `{}` references unknown permission `{unknown}`",
                record.role
            )));
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        write_role(&tx, record)?;
        tx.commit()?;
        info!(
            "event=role_save module=repo status=ok role={} permissions={}",
            record.role,
            record.permissions.len()
        );
        Ok(())
    }

    fn seed_default_roles(&self) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut inserted = 0;
        for definition in list_roles() {
            let exists: i64 = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM roles WHERE name = ?1);",
                [definition.role.as_str()],
                |row| row.get(0),
            )?;
            if exists == 1 {
                continue;
            }
            write_role(
                &tx,
                &RoleRecord {
                    role: definition.role,
                    description: definition.description.to_string(),
                    permissions: definition
                        .permissions
                        .iter()
                        .map(|key| key.to_string())
                        .collect(),
                },
            )?;
            inserted += 1;
        }
        tx.commit()?;
        info!("event=role_seed module=repo status=ok inserted={inserted}");
        Ok(inserted)
    }
}

fn write_role(tx: &Transaction<'_>, record: &RoleRecord) -> RepoResult<()> {
    tx.execute(
        "INSERT INTO roles (name, description, updated_at)
         VALUES (?1, ?2, strftime('%s', 'now') * 1000)
         ON CONFLICT(name) DO UPDATE SET
            description = excluded.description,
            updated_at = excluded.updated_at;",
        params![record.role.as_str(), record.description.as_str()],
    )?;
    tx.execute(
        "DELETE FROM role_permissions WHERE role_name = ?1;",
        [record.role.as_str()],
    )?;
    for (position, key) in record.permissions.iter().enumerate() {
        tx.execute(
            "INSERT OR IGNORE INTO role_permissions (role_name, permission_key, position)
             VALUES (?1, ?2, ?3);",
            params![record.role.as_str(), key.as_str(), position as i64],
        )?;
    }
    Ok(())
}

fn load_permissions(conn: &Connection, role: Role) -> RepoResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT permission_key
         FROM role_permissions
         WHERE role_name = ?1
         ORDER BY position ASC;",
    )?;
    let keys = stmt
        .query_map([role.as_str()], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
}
