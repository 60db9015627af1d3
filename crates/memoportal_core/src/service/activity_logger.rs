//! Audit trail sink and activity-log use cases.
//!
//! # Responsibility
//! - Accept audit entries from the resolver, lock manager and workflow.
//! - Keep audit write failures from failing the calling operation.
//!
//! # Invariants
//! - `ActivityLogger::record` never returns an error and never panics on a
//!   store failure; failures go to the diagnostic log instead.
//! - Purge is gated by `activity.purge` and leaves one entry describing it.

use crate::clock::{Clock, EpochMillis};
use crate::error::CoreResult;
use crate::model::activity::ActivityLogEntry;
use crate::model::actor::Actor;
use crate::model::permission::{ACTIVITY_PURGE, ACTIVITY_VIEW};
use crate::repo::activity_repo::ActivityRepository;
use crate::service::rbac::Authorizer;
use log::{info, warn};
use std::sync::Mutex;

/// Fire-and-forget audit sink.
pub trait ActivityLogger {
    fn record(&self, entry: &ActivityLogEntry);
}

/// Writes entries through an [`ActivityRepository`].
pub struct RepositoryActivityLogger<R: ActivityRepository> {
    repo: R,
}

impl<R: ActivityRepository> RepositoryActivityLogger<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }
}

impl<R: ActivityRepository> ActivityLogger for RepositoryActivityLogger<R> {
    fn record(&self, entry: &ActivityLogEntry) {
        if let Err(err) = self.repo.append(entry) {
            warn!(
                "event=activity_log_write module=service status=error action={} entry_id={} error={}",
                entry.action, entry.id, err
            );
        }
    }
}

/// Keeps entries in memory. Useful for callers without a store and for tests.
#[derive(Debug, Default)]
pub struct MemoryActivityLogger {
    entries: Mutex<Vec<ActivityLogEntry>>,
}

impl MemoryActivityLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded entries in insertion order.
    pub fn entries(&self) -> Vec<ActivityLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn actions(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .map(|entry| entry.action)
            .collect()
    }
}

impl ActivityLogger for MemoryActivityLogger {
    fn record(&self, entry: &ActivityLogEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry.clone()),
            Err(poisoned) => poisoned.into_inner().push(entry.clone()),
        }
    }
}

/// Read and purge entry points over the stored trail.
pub struct ActivityLogService<'a, R: ActivityRepository> {
    repo: R,
    authorizer: &'a dyn Authorizer,
    audit: &'a dyn ActivityLogger,
    clock: &'a dyn Clock,
}

impl<'a, R: ActivityRepository> ActivityLogService<'a, R> {
    pub fn new(
        repo: R,
        authorizer: &'a dyn Authorizer,
        audit: &'a dyn ActivityLogger,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            repo,
            authorizer,
            audit,
            clock,
        }
    }

    /// Newest entries first. Requires `activity.view`.
    pub fn list_recent(&self, actor: &Actor, limit: u32) -> CoreResult<Vec<ActivityLogEntry>> {
        self.authorizer.require(Some(actor), ACTIVITY_VIEW)?;
        Ok(self.repo.list_recent(limit)?)
    }

    /// Entries about one record. Requires `activity.view`.
    pub fn list_for_target(
        &self,
        actor: &Actor,
        target_id: &str,
    ) -> CoreResult<Vec<ActivityLogEntry>> {
        self.authorizer.require(Some(actor), ACTIVITY_VIEW)?;
        Ok(self.repo.list_for_target(target_id)?)
    }

    /// Bulk-deletes entries older than `before` (all entries when `None`).
    ///
    /// The purge itself is recorded after the delete, so it survives.
    pub fn purge(&self, actor: &Actor, before: Option<EpochMillis>) -> CoreResult<usize> {
        self.authorizer.require(Some(actor), ACTIVITY_PURGE)?;
        let removed = self.repo.purge(before)?;
        info!(
            "event=activity_purge module=service status=ok removed={removed} actor_id={}",
            actor.id
        );

        let mut entry = ActivityLogEntry::new(
            Some(actor),
            "activity.purge",
            "Activity logs",
            self.clock.now_ms(),
        )
        .with_detail("removed", removed as u64);
        if let Some(cutoff) = before {
            entry = entry.with_detail("before", cutoff);
        }
        self.audit.record(&entry);
        Ok(removed)
    }
}
