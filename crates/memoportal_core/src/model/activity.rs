//! Append-only activity trail model.
//!
//! # Invariants
//! - Actor identity is snapshotted at write time and never re-joined.
//! - Entries are immutable once written; only bulk purge removes them.

use crate::clock::EpochMillis;
use crate::model::actor::{Actor, ActorId};
use crate::model::role::Role;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Actor identity as it was when the entry was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub id: ActorId,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
}

impl From<&Actor> for ActorSnapshot {
    fn from(actor: &Actor) -> Self {
        Self {
            id: actor.id,
            email: actor.email.clone(),
            role: actor.role,
            department: actor.department.clone(),
        }
    }
}

/// Origin of the request that triggered an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    /// `None` for system-initiated entries such as scheduled sweeps.
    pub actor: Option<ActorSnapshot>,
    pub action: String,
    /// Human-readable description of what was acted on.
    pub target: String,
    pub target_id: Option<String>,
    pub details: Map<String, Value>,
    pub request: RequestContext,
    pub created_at: EpochMillis,
}

impl ActivityLogEntry {
    pub fn new(
        actor: Option<&Actor>,
        action: impl Into<String>,
        target: impl Into<String>,
        created_at: EpochMillis,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor: actor.map(ActorSnapshot::from),
            action: action.into(),
            target: target.into(),
            target_id: None,
            details: Map::new(),
            request: RequestContext::default(),
            created_at,
        }
    }

    pub fn with_target_id(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_request(mut self, request: RequestContext) -> Self {
        self.request = request;
        self
    }
}
