//! Memo domain model.
//!
//! # Responsibility
//! - Define the memo record and its status vocabulary.
//! - Validate consistency between status and approval/rejection fields.
//!
//! # Invariants
//! - `approved_at` and `rejected_at` are never both set.
//! - `approved` status implies approval fields set; `rejected` status implies
//!   rejection fields set.
//! - Drafts and delivered or archived memos carry no rejection fields.
//! - `archived` and `deleted` always carry the status they were parked from.

use crate::clock::EpochMillis;
use crate::model::actor::{Actor, ActorId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type MemoId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoStatus {
    Draft,
    Pending,
    Sent,
    Read,
    Approved,
    Rejected,
    Archived,
    Deleted,
}

impl MemoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Read => "read",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "read" => Some(Self::Read),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "archived" => Some(Self::Archived),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    /// Parked states remember their predecessor for restore.
    pub fn is_parked(self) -> bool {
        matches!(self, Self::Archived | Self::Deleted)
    }
}

impl Display for MemoStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl MemoPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
    pub id: MemoId,
    pub subject: String,
    pub content: String,
    pub sender_id: ActorId,
    pub sender_email: String,
    /// Recipient e-mail addresses.
    pub recipients: Vec<String>,
    pub department: Option<String>,
    pub priority: MemoPriority,
    pub status: MemoStatus,
    /// Stored attachment file names.
    pub attachments: Vec<String>,
    pub approved_by: Option<ActorId>,
    pub approved_at: Option<EpochMillis>,
    pub rejected_by: Option<ActorId>,
    pub rejected_at: Option<EpochMillis>,
    pub rejection_reason: Option<String>,
    pub scheduled_send_at: Option<EpochMillis>,
    pub sent_at: Option<EpochMillis>,
    pub archived_from: Option<MemoStatus>,
    pub deleted_from: Option<MemoStatus>,
    pub created_at: EpochMillis,
    pub updated_at: EpochMillis,
}

impl Memo {
    /// Creates a draft authored by `sender`.
    pub fn draft(
        sender: &Actor,
        subject: impl Into<String>,
        content: impl Into<String>,
        recipients: Vec<String>,
        now: EpochMillis,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject: subject.into(),
            content: content.into(),
            sender_id: sender.id,
            sender_email: sender.email.clone(),
            recipients,
            department: sender.department.clone(),
            priority: MemoPriority::Medium,
            status: MemoStatus::Draft,
            attachments: Vec::new(),
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            scheduled_send_at: None,
            sent_at: None,
            archived_from: None,
            deleted_from: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn has_rejection(&self) -> bool {
        self.rejected_at.is_some() || self.rejected_by.is_some() || self.rejection_reason.is_some()
    }

    pub fn validate(&self) -> Result<(), MemoValidationError> {
        if self.subject.trim().is_empty() {
            return Err(MemoValidationError::BlankSubject);
        }
        if self.approved_at.is_some() && self.rejected_at.is_some() {
            return Err(MemoValidationError::ApprovedAndRejected);
        }
        match self.status {
            MemoStatus::Approved if self.approved_at.is_none() || self.approved_by.is_none() => {
                return Err(MemoValidationError::StatusMismatch {
                    status: self.status,
                    detail: "approved memo requires approved_by and approved_at",
                });
            }
            MemoStatus::Rejected if self.rejected_at.is_none() || self.rejected_by.is_none() => {
                return Err(MemoValidationError::StatusMismatch {
                    status: self.status,
                    detail: "rejected memo requires rejected_by and rejected_at",
                });
            }
            MemoStatus::Archived if self.archived_from.is_none() => {
                return Err(MemoValidationError::StatusMismatch {
                    status: self.status,
                    detail: "archived memo requires archived_from",
                });
            }
            MemoStatus::Deleted if self.deleted_from.is_none() => {
                return Err(MemoValidationError::StatusMismatch {
                    status: self.status,
                    detail: "deleted memo requires deleted_from",
                });
            }
            MemoStatus::Draft | MemoStatus::Sent | MemoStatus::Read | MemoStatus::Archived
                if self.has_rejection() =>
            {
                return Err(MemoValidationError::StatusMismatch {
                    status: self.status,
                    detail: "only rejected, pending or deleted memos keep rejection fields",
                });
            }
            _ => {}
        }
        if matches!(self.archived_from, Some(status) if status.is_parked()) {
            return Err(MemoValidationError::StatusMismatch {
                status: self.status,
                detail: "archived_from must not be a parked status",
            });
        }
        if self.deleted_from == Some(MemoStatus::Deleted) {
            return Err(MemoValidationError::StatusMismatch {
                status: self.status,
                detail: "deleted_from must not be deleted",
            });
        }
        Ok(())
    }
}

/// Per-recipient delivery/acknowledgment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoAcknowledgment {
    pub memo_id: MemoId,
    pub recipient: String,
    pub sent_at: EpochMillis,
    pub is_acknowledged: bool,
    pub acknowledged_at: Option<EpochMillis>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoValidationError {
    BlankSubject,
    ApprovedAndRejected,
    StatusMismatch {
        status: MemoStatus,
        detail: &'static str,
    },
}

impl Display for MemoValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankSubject => write!(f, "memo subject must not be blank"),
            Self::ApprovedAndRejected => {
                write!(f, "memo cannot be both approved and rejected")
            }
            Self::StatusMismatch { status, detail } => {
                write!(f, "memo status `{status}` is inconsistent: {detail}")
            }
        }
    }
}

impl Error for MemoValidationError {}
