//! Resource lock manager.
//!
//! # Responsibility
//! - Grant, refresh, extend and release time-boxed edit locks.
//! - Own the configured lock duration setting.
//!
//! # Invariants
//! - Expiry is evaluated against the injected clock on every call; nothing
//!   runs in the background.
//! - Acquisition is one compare-and-set in the store, never read-then-write.
//! - `release` never removes a lock owned by someone else.
//! - Duration changes affect only locks acquired or refreshed afterwards.

use crate::clock::{to_iso8601, Clock, EpochMillis};
use crate::error::{CoreError, CoreResult};
use crate::model::activity::ActivityLogEntry;
use crate::model::actor::{Actor, ActorId};
use crate::model::lock::{LockDuration, LockHolder, ResourceKey, ResourceLock};
use crate::model::permission::{SETTINGS_MANAGE, USER_UNLOCK};
use crate::repo::lock_repo::{AcquireOutcome, LockRepository};
use crate::repo::settings_repo::{
    SettingsRepository, LOCK_DURATION_MINUTES_KEY, LOCK_DURATION_SECONDS_KEY,
};
use crate::service::activity_logger::ActivityLogger;
use crate::service::rbac::Authorizer;
use log::{info, warn};
use serde::Serialize;

/// Plain result object returned to route handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockResponse {
    pub success: bool,
    pub message: String,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_by: Option<LockHolder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_remaining: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_duration_seconds: Option<u64>,
}

impl LockResponse {
    fn unlocked(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            locked: false,
            locked_by: None,
            locked_at: None,
            expires_at: None,
            seconds_remaining: None,
            lock_duration_seconds: None,
        }
    }

    fn for_lock(lock: &ResourceLock, now: EpochMillis, message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            locked: true,
            locked_by: Some(lock.holder.clone()),
            locked_at: Some(to_iso8601(lock.locked_at)),
            expires_at: Some(lock.expires_at_iso()),
            seconds_remaining: Some(lock.seconds_remaining(now)),
            lock_duration_seconds: None,
        }
    }

    fn with_duration(mut self, duration: LockDuration) -> Self {
        self.lock_duration_seconds = Some(duration.total_seconds());
        self
    }

    /// Failure object for lock conflicts; `None` for other error classes.
    pub fn from_error(err: &CoreError) -> Option<Self> {
        match err {
            CoreError::ResourceLocked {
                holder,
                locked_at,
                expires_at,
                seconds_remaining,
                ..
            } => Some(Self {
                success: false,
                message: err.to_string(),
                locked: true,
                locked_by: Some(holder.clone()),
                locked_at: Some(to_iso8601(*locked_at)),
                expires_at: Some(to_iso8601(*expires_at)),
                seconds_remaining: Some(*seconds_remaining),
                lock_duration_seconds: None,
            }),
            CoreError::LockNotOwned { holder, .. } => Some(Self {
                success: false,
                message: err.to_string(),
                locked: true,
                locked_by: Some(holder.clone()),
                locked_at: None,
                expires_at: None,
                seconds_remaining: None,
                lock_duration_seconds: None,
            }),
            _ => None,
        }
    }
}

pub struct ResourceLockManager<'a, L: LockRepository, S: SettingsRepository> {
    locks: L,
    settings: S,
    authorizer: &'a dyn Authorizer,
    audit: &'a dyn ActivityLogger,
    clock: &'a dyn Clock,
}

impl<'a, L: LockRepository, S: SettingsRepository> ResourceLockManager<'a, L, S> {
    pub fn new(
        locks: L,
        settings: S,
        authorizer: &'a dyn Authorizer,
        audit: &'a dyn ActivityLogger,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            locks,
            settings,
            authorizer,
            audit,
            clock,
        }
    }

    /// Grants or refreshes `actor`'s lock on `key`.
    ///
    /// A refresh pushes expiry to `now + duration`; it never shortens it.
    ///
    /// # Errors
    /// - `ResourceLocked` when another actor holds an unexpired lock.
    pub fn acquire(&self, key: &ResourceKey, actor: &Actor) -> CoreResult<LockResponse> {
        let duration = self.get_lock_duration()?;
        let now = self.clock.now_ms();
        let holder = LockHolder::from(actor);

        match self
            .locks
            .try_acquire(key, &holder, now, now + duration.as_millis())?
        {
            AcquireOutcome::Created {
                lock,
                replaced_expired,
            } => {
                if let Some(expired) = replaced_expired {
                    info!(
                        "event=lock_expired module=service status=ok resource={key} previous_owner={}",
                        expired.holder.id
                    );
                }
                info!(
                    "event=lock_acquire module=service status=ok resource={key} owner={}",
                    actor.id
                );
                self.record(actor, "lock.acquire", key, |entry| {
                    entry.with_detail("expires_at", lock.expires_at_iso())
                });
                Ok(LockResponse::for_lock(&lock, now, "Lock acquired").with_duration(duration))
            }
            AcquireOutcome::Refreshed(lock) => {
                Ok(LockResponse::for_lock(&lock, now, "Lock refreshed").with_duration(duration))
            }
            AcquireOutcome::Held(lock) => {
                info!(
                    "event=lock_acquire module=service status=conflict resource={key} requester={} owner={}",
                    actor.id, lock.holder.id
                );
                Err(locked_error(lock, now))
            }
        }
    }

    /// Releases `actor`'s lock. Releasing an absent or expired lock succeeds.
    ///
    /// # Errors
    /// - `LockNotOwned` when an unexpired lock belongs to someone else.
    pub fn release(&self, key: &ResourceKey, actor: &Actor) -> CoreResult<LockResponse> {
        let now = self.clock.now_ms();
        let Some(lock) = self.locks.find_lock(key)? else {
            return Ok(LockResponse::unlocked("No lock to release"));
        };

        if lock.is_held_by(actor.id) {
            if self.locks.delete_lock_held_by(key, actor.id)? {
                info!(
                    "event=lock_release module=service status=ok resource={key} owner={}",
                    actor.id
                );
                self.record(actor, "lock.release", key, |entry| entry);
            }
            return Ok(LockResponse::unlocked("Lock released"));
        }

        if lock.is_expired(now) {
            self.locks.delete_if_expired(key, now)?;
            return Ok(LockResponse::unlocked("No lock to release"));
        }

        warn!(
            "event=lock_release module=service status=denied resource={key} requester={} owner={}",
            actor.id, lock.holder.id
        );
        Err(CoreError::LockNotOwned {
            key: key.clone(),
            holder: lock.holder,
        })
    }

    /// Removes any lock on `key` regardless of owner. Requires `user.unlock`.
    pub fn force_release(&self, key: &ResourceKey, actor: &Actor) -> CoreResult<LockResponse> {
        self.authorizer.require(Some(actor), USER_UNLOCK)?;

        let previous = self.locks.find_lock(key)?;
        if !self.locks.delete_lock(key)? {
            return Ok(LockResponse::unlocked("No lock to release"));
        }

        warn!(
            "event=lock_force_release module=service status=ok resource={key} actor={}",
            actor.id
        );
        self.record(actor, "lock.force_release", key, |entry| match &previous {
            Some(lock) => entry
                .with_detail("previous_owner_id", lock.holder.id.to_string())
                .with_detail("previous_owner_email", lock.holder.email.as_str()),
            None => entry,
        });
        Ok(LockResponse::unlocked("Lock force released"))
    }

    /// Current lock state. An expired lock is deleted and reported unlocked.
    pub fn status(&self, key: &ResourceKey) -> CoreResult<LockResponse> {
        let now = self.clock.now_ms();
        match self.locks.find_lock(key)? {
            None => Ok(LockResponse::unlocked("Resource is not locked")),
            Some(lock) if lock.is_expired(now) => {
                self.locks.delete_if_expired(key, now)?;
                info!(
                    "event=lock_expired module=service status=ok resource={key} previous_owner={}",
                    lock.holder.id
                );
                Ok(LockResponse::unlocked("Resource is not locked"))
            }
            Some(lock) => Ok(LockResponse::for_lock(&lock, now, "Resource is locked")),
        }
    }

    /// Adds `extra_minutes` plus `extra_seconds` to the current expiry.
    /// Seconds past 59 carry into minutes, so `(0, 90)` adds 1 min 30 s.
    ///
    /// # Errors
    /// - `Validation` when the extension totals zero or more than 24h.
    /// - `LockNotOwned` when another actor holds the lock.
    /// - `NotFound` when no unexpired lock exists.
    pub fn extend(
        &self,
        key: &ResourceKey,
        actor: &Actor,
        extra_minutes: u32,
        extra_seconds: u32,
    ) -> CoreResult<LockResponse> {
        let total = u64::from(extra_minutes) * 60 + u64::from(extra_seconds);
        let extra = LockDuration::from_total_seconds(total)
            .map_err(|err| CoreError::Validation(err.to_string()))?;
        let now = self.clock.now_ms();

        if let Some(lock) = self
            .locks
            .extend_lock(key, actor.id, extra.as_millis(), now)?
        {
            info!(
                "event=lock_extend module=service status=ok resource={key} owner={} extra_seconds={}",
                actor.id,
                extra.total_seconds()
            );
            self.record(actor, "lock.extend", key, |entry| {
                entry
                    .with_detail("extra_seconds", extra.total_seconds())
                    .with_detail("expires_at", lock.expires_at_iso())
            });
            return Ok(LockResponse::for_lock(&lock, now, "Lock extended"));
        }

        match self.locks.find_lock(key)? {
            Some(lock) if !lock.is_expired(now) => Err(CoreError::LockNotOwned {
                key: key.clone(),
                holder: lock.holder,
            }),
            Some(_) => {
                self.locks.delete_if_expired(key, now)?;
                Err(lock_not_found(key))
            }
            None => Err(lock_not_found(key)),
        }
    }

    /// Unexpired locks, optionally for one owner. Expired rows met during the
    /// scan are deleted instead of returned.
    pub fn list_active(&self, owner: Option<ActorId>) -> CoreResult<Vec<ResourceLock>> {
        let now = self.clock.now_ms();
        let mut active = Vec::new();
        let mut swept = 0usize;
        for lock in self.locks.list_locks(owner)? {
            if lock.is_expired(now) {
                if self.locks.delete_if_expired(&lock.key, now)? {
                    swept += 1;
                }
            } else {
                active.push(lock);
            }
        }
        if swept > 0 {
            info!("event=lock_sweep module=service status=ok removed={swept} trigger=list_active");
        }
        Ok(active)
    }

    /// Deletes every expired lock. Safe to call repeatedly.
    pub fn cleanup_expired(&self) -> CoreResult<usize> {
        let removed = self.locks.delete_expired(self.clock.now_ms())?;
        if removed > 0 {
            info!("event=lock_sweep module=service status=ok removed={removed} trigger=cleanup");
        }
        Ok(removed)
    }

    /// Configured duration; missing or malformed settings yield the default.
    pub fn get_lock_duration(&self) -> CoreResult<LockDuration> {
        let minutes = self.settings.get_setting(LOCK_DURATION_MINUTES_KEY)?;
        let seconds = self.settings.get_setting(LOCK_DURATION_SECONDS_KEY)?;
        if minutes.is_none() && seconds.is_none() {
            return Ok(LockDuration::default());
        }

        match parse_duration(minutes.as_deref(), seconds.as_deref()) {
            Some(duration) => Ok(duration),
            None => {
                warn!(
                    "event=lock_duration_read module=service status=fallback minutes={:?} seconds={:?}",
                    minutes, seconds
                );
                Ok(LockDuration::default())
            }
        }
    }

    /// Stores a new duration. Requires `settings.manage`.
    pub fn set_lock_duration(
        &self,
        actor: &Actor,
        duration: LockDuration,
    ) -> CoreResult<LockResponse> {
        self.authorizer.require(Some(actor), SETTINGS_MANAGE)?;
        duration
            .validate()
            .map_err(|err| CoreError::Validation(err.to_string()))?;

        let previous = self.get_lock_duration()?;
        let now = self.clock.now_ms();
        self.settings.put_settings(
            &[
                (LOCK_DURATION_MINUTES_KEY, duration.minutes.to_string()),
                (LOCK_DURATION_SECONDS_KEY, duration.seconds.to_string()),
            ],
            now,
        )?;

        info!(
            "event=lock_duration_update module=service status=ok seconds={} previous_seconds={}",
            duration.total_seconds(),
            previous.total_seconds()
        );
        self.audit.record(
            &ActivityLogEntry::new(
                Some(actor),
                "settings.lock_duration",
                "Lock duration",
                now,
            )
            .with_detail("minutes", duration.minutes)
            .with_detail("seconds", duration.seconds)
            .with_detail("previous_seconds", previous.total_seconds()),
        );

        Ok(LockResponse::unlocked("Lock duration updated").with_duration(duration))
    }

    fn record(
        &self,
        actor: &Actor,
        action: &str,
        key: &ResourceKey,
        decorate: impl FnOnce(ActivityLogEntry) -> ActivityLogEntry,
    ) {
        let entry = ActivityLogEntry::new(Some(actor), action, key.to_string(), self.clock.now_ms())
            .with_target_id(key.resource_id.as_str())
            .with_detail("resource_type", key.resource_type.as_str());
        self.audit.record(&decorate(entry));
    }
}

fn locked_error(lock: ResourceLock, now: EpochMillis) -> CoreError {
    let seconds_remaining = lock.seconds_remaining(now);
    CoreError::ResourceLocked {
        key: lock.key,
        holder: lock.holder,
        locked_at: lock.locked_at,
        expires_at: lock.expires_at,
        seconds_remaining,
    }
}

fn lock_not_found(key: &ResourceKey) -> CoreError {
    CoreError::NotFound {
        entity: "resource lock",
        id: key.to_string(),
    }
}

fn parse_duration(minutes: Option<&str>, seconds: Option<&str>) -> Option<LockDuration> {
    let parse = |value: Option<&str>| match value {
        Some(text) => text.trim().parse::<u32>().ok(),
        None => Some(0),
    };
    LockDuration::new(parse(minutes)?, parse(seconds)?).ok()
}

#[cfg(test)]
mod tests {
    use super::{parse_duration, LockResponse};
    use crate::error::CoreError;
    use crate::model::lock::{LockDuration, LockHolder, ResourceKey};
    use uuid::Uuid;

    #[test]
    fn parse_duration_treats_missing_half_as_zero() {
        assert_eq!(
            parse_duration(Some("2"), None),
            Some(LockDuration {
                minutes: 2,
                seconds: 0
            })
        );
        assert_eq!(
            parse_duration(None, Some(" 45 ")),
            Some(LockDuration {
                minutes: 0,
                seconds: 45
            })
        );
    }

    #[test]
    fn parse_duration_rejects_garbage_and_out_of_range() {
        assert_eq!(parse_duration(Some("two"), Some("0")), None);
        assert_eq!(parse_duration(Some("1"), Some("75")), None);
        assert_eq!(parse_duration(Some("0"), Some("0")), None);
        assert_eq!(parse_duration(Some("-1"), Some("10")), None);
    }

    #[test]
    fn conflict_error_converts_to_failure_object() {
        let holder = LockHolder {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@uni.edu".to_string(),
        };
        let err = CoreError::ResourceLocked {
            key: ResourceKey::user("42"),
            holder: holder.clone(),
            locked_at: 0,
            expires_at: 90_000,
            seconds_remaining: 85,
        };

        let response = LockResponse::from_error(&err).expect("conflicts map to a response");
        assert!(!response.success);
        assert!(response.locked);
        assert_eq!(response.locked_by, Some(holder));
        assert_eq!(response.expires_at.as_deref(), Some("1970-01-01T00:01:30.000Z"));
        assert_eq!(response.seconds_remaining, Some(85));

        let json = serde_json::to_value(&response).expect("response serializes");
        assert_eq!(json["locked_by"]["email"], "ada@uni.edu");
        assert!(json.get("lock_duration_seconds").is_none());

        assert!(LockResponse::from_error(&CoreError::Validation("x".to_string())).is_none());
    }
}
