//! Service-level error taxonomy.
//!
//! # Responsibility
//! - Give callers one typed error per refusal class.
//! - Carry enough structured detail (lock owner, remaining seconds) to render
//!   a message without a second round trip.

use crate::clock::EpochMillis;
use crate::model::lock::{LockHolder, ResourceKey};
use crate::model::memo::MemoStatus;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug)]
pub enum CoreError {
    /// Actor lacks the named permission.
    Unauthorized { permission: String },
    /// Another actor holds an unexpired lock on the resource.
    ResourceLocked {
        key: ResourceKey,
        holder: LockHolder,
        locked_at: EpochMillis,
        expires_at: EpochMillis,
        seconds_remaining: i64,
    },
    /// Release/extend attempted by someone other than the owner.
    LockNotOwned { key: ResourceKey, holder: LockHolder },
    InvalidTransition { from: MemoStatus, to: MemoStatus },
    NotFound { entity: &'static str, id: String },
    Validation(String),
    Repo(RepoError),
}

impl CoreError {
    /// HTTP-equivalent status class for route handlers.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Unauthorized { .. } => 403,
            Self::ResourceLocked { .. } => 409,
            Self::LockNotOwned { .. } => 403,
            Self::InvalidTransition { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Validation(_) => 422,
            Self::Repo(RepoError::NotFound { .. }) => 404,
            Self::Repo(RepoError::StaleWrite { .. }) => 409,
            Self::Repo(_) => 500,
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized { permission } => {
                write!(f, "permission `{permission}` is required")
            }
            Self::ResourceLocked {
                key,
                holder,
                seconds_remaining,
                ..
            } => write!(
                f,
                "{key} is being edited by {} <{}> for another {seconds_remaining}s",
                holder.name, holder.email
            ),
            Self::LockNotOwned { key, holder } => write!(
                f,
                "you do not own this lock: {key} is held by {} <{}>",
                holder.name, holder.email
            ),
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid memo transition from `{from}` to `{to}`")
            }
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Validation(message) => write!(f, "{message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CoreError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

#[cfg(test)]
mod tests {
    use super::CoreError;
    use crate::model::memo::MemoStatus;
    use crate::repo::RepoError;

    #[test]
    fn status_codes_follow_refusal_class() {
        let denied = CoreError::Unauthorized {
            permission: "memo.send".to_string(),
        };
        assert_eq!(denied.status_code(), 403);
        assert!(denied.to_string().contains("memo.send"));

        let invalid = CoreError::InvalidTransition {
            from: MemoStatus::Rejected,
            to: MemoStatus::Sent,
        };
        assert_eq!(invalid.status_code(), 400);
        assert_eq!(
            invalid.to_string(),
            "invalid memo transition from `rejected` to `sent`"
        );

        let stale = CoreError::from(RepoError::StaleWrite {
            entity: "memo",
            id: "m1".to_string(),
        });
        assert_eq!(stale.status_code(), 409);
        assert_eq!(
            CoreError::Validation("bad".to_string()).status_code(),
            422
        );
    }
}
