//! Domain model for the access-control core.
//!
//! # Responsibility
//! - Define actors, roles, permissions, locks, memos and audit entries.
//! - Keep invariants checkable without a database.
//!
//! # Invariants
//! - The role set is closed: admin, secretary, faculty.
//! - Memo soft-delete and archive remember the status they came from.

pub mod activity;
pub mod actor;
pub mod calendar;
pub mod lock;
pub mod memo;
pub mod permission;
pub mod role;
