//! Access-control core for the memo portal.
//! Permission resolution, edit locks and the memo workflow live here; route
//! handlers and views call into this crate.

pub mod clock;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use clock::{Clock, EpochMillis, ManualClock, SystemClock};
pub use db::{open_db, open_db_in_memory, DbError};
pub use error::{CoreError, CoreResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::activity::{ActivityLogEntry, ActorSnapshot, RequestContext};
pub use model::actor::{Actor, ActorId, SecretaryControls, SecretaryFeature};
pub use model::lock::{LockDuration, LockHolder, ResourceKey, ResourceLock};
pub use model::memo::{Memo, MemoAcknowledgment, MemoId, MemoPriority, MemoStatus};
pub use model::role::Role;
pub use repo::{RepoError, RepoResult};
pub use service::activity_logger::{
    ActivityLogService, ActivityLogger, MemoryActivityLogger, RepositoryActivityLogger,
};
pub use service::lock_service::{LockResponse, ResourceLockManager};
pub use service::memo_workflow::{
    plan_transition, MemoTransition, MemoWorkflow, TransitionExtra, TransitionOutcome,
};
pub use service::rbac::{Authorizer, PermissionResolver};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
