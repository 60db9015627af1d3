//! Advisory edit-lock model.
//!
//! # Invariants
//! - At most one unexpired lock exists per `(resource_type, resource_id)`.
//! - A lock whose `expires_at <= now` is treated as absent everywhere.
//! - Owner identity is a snapshot taken at acquisition time.

use crate::clock::{seconds_until, to_iso8601, EpochMillis};
use crate::model::actor::{Actor, ActorId};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Resource type used for user-record edit locks.
pub const RESOURCE_USER: &str = "user";
/// Resource type callers use to serialize memo edits.
pub const RESOURCE_MEMO: &str = "memo";

const MAX_LOCK_DURATION_SECS: u64 = 24 * 60 * 60;

/// Owner identity snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub id: ActorId,
    pub name: String,
    pub email: String,
}

impl From<&Actor> for LockHolder {
    fn from(actor: &Actor) -> Self {
        Self {
            id: actor.id,
            name: actor.name.clone(),
            email: actor.email.clone(),
        }
    }
}

/// Identifies a lockable record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub resource_type: String,
    pub resource_id: String,
}

impl ResourceKey {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self::new(RESOURCE_USER, user_id)
    }

    pub fn memo(memo_id: impl Into<String>) -> Self {
        Self::new(RESOURCE_MEMO, memo_id)
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.resource_id)
    }
}

/// Time-boxed exclusive claim on one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLock {
    pub key: ResourceKey,
    pub holder: LockHolder,
    pub locked_at: EpochMillis,
    pub expires_at: EpochMillis,
}

impl ResourceLock {
    pub fn is_expired(&self, now: EpochMillis) -> bool {
        self.expires_at <= now
    }

    pub fn is_held_by(&self, actor_id: ActorId) -> bool {
        self.holder.id == actor_id
    }

    pub fn seconds_remaining(&self, now: EpochMillis) -> i64 {
        seconds_until(self.expires_at, now)
    }

    pub fn expires_at_iso(&self) -> String {
        to_iso8601(self.expires_at)
    }
}

/// Configured lock lifetime as a minutes + seconds pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDuration {
    pub minutes: u32,
    pub seconds: u32,
}

impl Default for LockDuration {
    fn default() -> Self {
        Self {
            minutes: 1,
            seconds: 50,
        }
    }
}

impl LockDuration {
    /// Builds a validated duration.
    pub fn new(minutes: u32, seconds: u32) -> Result<Self, LockDurationError> {
        let duration = Self { minutes, seconds };
        duration.validate()?;
        Ok(duration)
    }

    /// Builds a duration from a seconds total, carrying whole minutes.
    pub fn from_total_seconds(total: u64) -> Result<Self, LockDurationError> {
        if total == 0 {
            return Err(LockDurationError::Zero);
        }
        if total > MAX_LOCK_DURATION_SECS {
            return Err(LockDurationError::TooLong(total));
        }
        // Both halves fit in u32 once the total is capped.
        Self::new((total / 60) as u32, (total % 60) as u32)
    }

    pub fn validate(&self) -> Result<(), LockDurationError> {
        if self.seconds >= 60 {
            return Err(LockDurationError::SecondsOutOfRange(self.seconds));
        }
        let total = self.total_seconds();
        if total == 0 {
            return Err(LockDurationError::Zero);
        }
        if total > MAX_LOCK_DURATION_SECS {
            return Err(LockDurationError::TooLong(total));
        }
        Ok(())
    }

    pub fn total_seconds(&self) -> u64 {
        u64::from(self.minutes) * 60 + u64::from(self.seconds)
    }

    pub fn as_millis(&self) -> i64 {
        // Bounded by MAX_LOCK_DURATION_SECS after validation, and by
        // u32::MAX minutes otherwise; both fit in i64.
        (self.total_seconds() * 1000) as i64
    }
}

/// Lock duration validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockDurationError {
    SecondsOutOfRange(u32),
    Zero,
    TooLong(u64),
}

impl Display for LockDurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SecondsOutOfRange(value) => {
                write!(f, "lock duration seconds must be below 60, got {value}")
            }
            Self::Zero => write!(f, "lock duration must be at least one second"),
            Self::TooLong(total) => write!(
                f,
                "lock duration must not exceed {MAX_LOCK_DURATION_SECS} seconds, got {total}"
            ),
        }
    }
}

impl Error for LockDurationError {}
