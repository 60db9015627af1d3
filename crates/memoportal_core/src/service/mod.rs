//! Core use-case services.
//!
//! # Responsibility
//! - Combine repositories into the resolver, lock manager, memo workflow
//!   and activity-log entry points.
//! - Receive collaborators (authorizer, audit sink, clock) by injection.

pub mod activity_logger;
pub mod lock_service;
pub mod memo_workflow;
pub mod rbac;
