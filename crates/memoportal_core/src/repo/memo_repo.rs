//! Memo and acknowledgment storage.
//!
//! # Responsibility
//! - Persist memo documents and their workflow fields.
//! - Apply a status transition and its delivery rows atomically.
//!
//! # Invariants
//! - Writes call `Memo::validate()` before SQL mutations.
//! - Status writes are compare-and-set on the previous status.
//! - Acknowledgment rows are unique per `(memo_id, recipient)`; re-delivery
//!   resets them to unacknowledged.

use crate::clock::EpochMillis;
use crate::model::memo::{Memo, MemoAcknowledgment, MemoId, MemoPriority, MemoStatus};
use crate::repo::{bool_to_int, ensure_connection_ready, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const MEMO_SELECT_SQL: &str = "SELECT
    id,
    subject,
    content,
    sender_id,
    sender_email,
    recipients,
    department,
    priority,
    status,
    attachments,
    approved_by,
    approved_at,
    rejected_by,
    rejected_at,
    rejection_reason,
    scheduled_send_at,
    sent_at,
    archived_from,
    deleted_from,
    created_at,
    updated_at
FROM memos";

pub trait MemoRepository {
    fn create_memo(&self, memo: &Memo) -> RepoResult<MemoId>;
    fn get_memo(&self, id: MemoId) -> RepoResult<Option<Memo>>;
    /// Persists `memo` if the stored status still equals `expected`.
    ///
    /// When `delivered_at` is set, one acknowledgment row per recipient is
    /// created or reset in the same transaction and returned.
    fn save_transition(
        &self,
        memo: &Memo,
        expected: MemoStatus,
        delivered_at: Option<EpochMillis>,
    ) -> RepoResult<Vec<MemoAcknowledgment>>;
    fn list_acknowledgments(&self, memo_id: MemoId) -> RepoResult<Vec<MemoAcknowledgment>>;
    fn acknowledge(
        &self,
        memo_id: MemoId,
        recipient: &str,
        at: EpochMillis,
    ) -> RepoResult<MemoAcknowledgment>;
    /// Approved memos whose scheduled send time has passed.
    fn list_due_scheduled(&self, now: EpochMillis) -> RepoResult<Vec<Memo>>;
}

pub struct SqliteMemoRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMemoRepository<'conn> {
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(
            conn,
            "memos",
            &[
                "id",
                "status",
                "approved_at",
                "rejected_at",
                "archived_from",
                "deleted_from",
                "scheduled_send_at",
            ],
        )?;
        ensure_connection_ready(
            conn,
            "memo_acknowledgments",
            &["memo_id", "recipient", "sent_at", "is_acknowledged", "acknowledged_at"],
        )?;
        Ok(Self { conn })
    }
}

impl MemoRepository for SqliteMemoRepository<'_> {
    fn create_memo(&self, memo: &Memo) -> RepoResult<MemoId> {
        memo.validate()?;
        self.conn.execute(
            "INSERT INTO memos (
                id,
                subject,
                content,
                sender_id,
                sender_email,
                recipients,
                department,
                priority,
                status,
                attachments,
                approved_by,
                approved_at,
                rejected_by,
                rejected_at,
                rejection_reason,
                scheduled_send_at,
                sent_at,
                archived_from,
                deleted_from,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21);",
            params![
                memo.id.to_string(),
                memo.subject.as_str(),
                memo.content.as_str(),
                memo.sender_id.to_string(),
                memo.sender_email.as_str(),
                to_json_list(&memo.recipients)?,
                memo.department.as_deref(),
                memo.priority.as_str(),
                memo.status.as_str(),
                to_json_list(&memo.attachments)?,
                memo.approved_by.map(|id| id.to_string()),
                memo.approved_at,
                memo.rejected_by.map(|id| id.to_string()),
                memo.rejected_at,
                memo.rejection_reason.as_deref(),
                memo.scheduled_send_at,
                memo.sent_at,
                memo.archived_from.map(MemoStatus::as_str),
                memo.deleted_from.map(MemoStatus::as_str),
                memo.created_at,
                memo.updated_at,
            ],
        )?;
        Ok(memo.id)
    }

    fn get_memo(&self, id: MemoId) -> RepoResult<Option<Memo>> {
        select_memo(self.conn, id)
    }

    fn save_transition(
        &self,
        memo: &Memo,
        expected: MemoStatus,
        delivered_at: Option<EpochMillis>,
    ) -> RepoResult<Vec<MemoAcknowledgment>> {
        memo.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE memos
             SET
                status = ?3,
                approved_by = ?4,
                approved_at = ?5,
                rejected_by = ?6,
                rejected_at = ?7,
                rejection_reason = ?8,
                sent_at = ?9,
                archived_from = ?10,
                deleted_from = ?11,
                updated_at = ?12
             WHERE id = ?1 AND status = ?2;",
            params![
                memo.id.to_string(),
                expected.as_str(),
                memo.status.as_str(),
                memo.approved_by.map(|id| id.to_string()),
                memo.approved_at,
                memo.rejected_by.map(|id| id.to_string()),
                memo.rejected_at,
                memo.rejection_reason.as_deref(),
                memo.sent_at,
                memo.archived_from.map(MemoStatus::as_str),
                memo.deleted_from.map(MemoStatus::as_str),
                memo.updated_at,
            ],
        )?;

        if changed == 0 {
            let exists: i64 = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM memos WHERE id = ?1);",
                [memo.id.to_string()],
                |row| row.get(0),
            )?;
            let id = memo.id.to_string();
            return Err(if exists == 1 {
                RepoError::StaleWrite {
                    entity: "memo",
                    id,
                }
            } else {
                RepoError::NotFound {
                    entity: "memo",
                    id,
                }
            });
        }

        let Some(sent_at) = delivered_at else {
            tx.commit()?;
            return Ok(Vec::new());
        };

        for recipient in &memo.recipients {
            tx.execute(
                "INSERT INTO memo_acknowledgments (
                    memo_id,
                    recipient,
                    sent_at,
                    is_acknowledged,
                    acknowledged_at
                ) VALUES (?1, ?2, ?3, 0, NULL)
                ON CONFLICT(memo_id, recipient) DO UPDATE SET
                    sent_at = excluded.sent_at,
                    is_acknowledged = 0,
                    acknowledged_at = NULL;",
                params![memo.id.to_string(), recipient.as_str(), sent_at],
            )?;
        }
        let acknowledgments = select_acknowledgments(&tx, memo.id)?;
        tx.commit()?;
        Ok(acknowledgments)
    }

    fn list_acknowledgments(&self, memo_id: MemoId) -> RepoResult<Vec<MemoAcknowledgment>> {
        select_acknowledgments(self.conn, memo_id)
    }

    fn acknowledge(
        &self,
        memo_id: MemoId,
        recipient: &str,
        at: EpochMillis,
    ) -> RepoResult<MemoAcknowledgment> {
        let changed = self.conn.execute(
            "UPDATE memo_acknowledgments
             SET is_acknowledged = ?3,
                 acknowledged_at = COALESCE(acknowledged_at, ?4)
             WHERE memo_id = ?1 AND recipient = ?2;",
            params![memo_id.to_string(), recipient, bool_to_int(true), at],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound {
                entity: "memo acknowledgment",
                id: format!("{memo_id}/{recipient}"),
            });
        }

        select_acknowledgments(self.conn, memo_id)?
            .into_iter()
            .find(|row| row.recipient == recipient)
            .ok_or_else(|| RepoError::NotFound {
                entity: "memo acknowledgment",
                id: format!("{memo_id}/{recipient}"),
            })
    }

    fn list_due_scheduled(&self, now: EpochMillis) -> RepoResult<Vec<Memo>> {
        let mut stmt = self.conn.prepare(&format!(
            "{MEMO_SELECT_SQL}
             WHERE status = 'approved'
               AND scheduled_send_at IS NOT NULL
               AND scheduled_send_at <= ?1
             ORDER BY scheduled_send_at ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([now])?;
        let mut memos = Vec::new();
        while let Some(row) = rows.next()? {
            memos.push(parse_memo_row(row)?);
        }
        Ok(memos)
    }
}

fn select_memo(conn: &Connection, id: MemoId) -> RepoResult<Option<Memo>> {
    let mut stmt = conn.prepare(&format!("{MEMO_SELECT_SQL} WHERE id = ?1;"))?;
    let row = stmt
        .query_row([id.to_string()], |row| Ok(parse_memo_row(row)))
        .optional()?;
    row.transpose()
}

fn select_acknowledgments(
    conn: &Connection,
    memo_id: MemoId,
) -> RepoResult<Vec<MemoAcknowledgment>> {
    let mut stmt = conn.prepare(
        "SELECT memo_id, recipient, sent_at, is_acknowledged, acknowledged_at
         FROM memo_acknowledgments
         WHERE memo_id = ?1
         ORDER BY recipient ASC;",
    )?;
    let mut rows = stmt.query([memo_id.to_string()])?;
    let mut acknowledgments = Vec::new();
    while let Some(row) = rows.next()? {
        let memo_id: String = row.get("memo_id")?;
        let is_acknowledged = match row.get::<_, i64>("is_acknowledged")? {
            0 => false,
            1 => true,
            other => {
                return Err(RepoError::InvalidData(format!(
                    "invalid is_acknowledged value `{other}`"
                )));
            }
        };
        acknowledgments.push(MemoAcknowledgment {
            memo_id: parse_uuid(&memo_id, "memo_acknowledgments.memo_id")?,
            recipient: row.get("recipient")?,
            sent_at: row.get("sent_at")?,
            is_acknowledged,
            acknowledged_at: row.get("acknowledged_at")?,
        });
    }
    Ok(acknowledgments)
}

fn parse_memo_row(row: &Row<'_>) -> RepoResult<Memo> {
    let id: String = row.get("id")?;
    let sender_id: String = row.get("sender_id")?;

    let priority_text: String = row.get("priority")?;
    let priority = MemoPriority::parse(&priority_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid priority `{priority_text}` in memos.priority"))
    })?;
    let status_text: String = row.get("status")?;
    let status = parse_status(&status_text, "memos.status")?;

    let memo = Memo {
        id: parse_uuid(&id, "memos.id")?,
        subject: row.get("subject")?,
        content: row.get("content")?,
        sender_id: parse_uuid(&sender_id, "memos.sender_id")?,
        sender_email: row.get("sender_email")?,
        recipients: from_json_list(&row.get::<_, String>("recipients")?, "memos.recipients")?,
        department: row.get("department")?,
        priority,
        status,
        attachments: from_json_list(&row.get::<_, String>("attachments")?, "memos.attachments")?,
        approved_by: optional_uuid(row, "approved_by")?,
        approved_at: row.get("approved_at")?,
        rejected_by: optional_uuid(row, "rejected_by")?,
        rejected_at: row.get("rejected_at")?,
        rejection_reason: row.get("rejection_reason")?,
        scheduled_send_at: row.get("scheduled_send_at")?,
        sent_at: row.get("sent_at")?,
        archived_from: optional_status(row, "archived_from")?,
        deleted_from: optional_status(row, "deleted_from")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    memo.validate()?;
    Ok(memo)
}

fn parse_status(value: &str, column: &str) -> RepoResult<MemoStatus> {
    MemoStatus::parse(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid memo status `{value}` in {column}")))
}

fn optional_status(row: &Row<'_>, column: &str) -> RepoResult<Option<MemoStatus>> {
    row.get::<_, Option<String>>(column)?
        .map(|value| parse_status(&value, column))
        .transpose()
}

fn optional_uuid(row: &Row<'_>, column: &str) -> RepoResult<Option<uuid::Uuid>> {
    row.get::<_, Option<String>>(column)?
        .map(|value| parse_uuid(&value, column))
        .transpose()
}

fn to_json_list(values: &[String]) -> RepoResult<String> {
    serde_json::to_string(values)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode list: {err}")))
}

fn from_json_list(value: &str, column: &str) -> RepoResult<Vec<String>> {
    serde_json::from_str(value)
        .map_err(|err| RepoError::InvalidData(format!("invalid JSON list in {column}: {err}")))
}
