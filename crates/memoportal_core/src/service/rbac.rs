//! Role-permission resolver.
//!
//! # Responsibility
//! - Answer "may this actor do X" from role records, the legacy static
//!   table and secretary feature toggles.
//!
//! # Invariants
//! - Resolution never errors and never mutates role or actor data.
//! - Inactive or missing actors are denied everything.
//! - Admin is granted every key, including keys on no role's list.
//! - A role store failure degrades to the legacy static table.
//! - Secretary checks on gated features need both the role grant and the
//!   per-actor toggle; an unstored toggle resolves to allowed and is audited.

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::model::activity::ActivityLogEntry;
use crate::model::actor::{Actor, SecretaryFeature};
use crate::model::permission::{
    classify_permission_key, dotted_to_legacy, legacy_role_grants, legacy_to_dotted,
    PermissionKeyKind,
};
use crate::model::role::Role;
use crate::repo::role_repo::RoleRepository;
use crate::service::activity_logger::ActivityLogger;
use log::{debug, warn};

/// Permission check seam injected into the lock manager, memo workflow and
/// activity-log service.
pub trait Authorizer {
    fn can(&self, actor: Option<&Actor>, permission_key: &str) -> bool;

    /// Like [`Authorizer::can`] but returns `Unauthorized` on denial.
    fn require(&self, actor: Option<&Actor>, permission_key: &str) -> CoreResult<()> {
        if self.can(actor, permission_key) {
            Ok(())
        } else {
            Err(CoreError::Unauthorized {
                permission: permission_key.to_string(),
            })
        }
    }
}

pub struct PermissionResolver<'a, R: RoleRepository> {
    roles: R,
    audit: &'a dyn ActivityLogger,
    clock: &'a dyn Clock,
}

impl<'a, R: RoleRepository> PermissionResolver<'a, R> {
    pub fn new(roles: R, audit: &'a dyn ActivityLogger, clock: &'a dyn Clock) -> Self {
        Self {
            roles,
            audit,
            clock,
        }
    }

    fn role_grants(&self, role: Role, dotted_key: &str) -> bool {
        match self.roles.find_role(role) {
            Ok(Some(record)) => record.grants(dotted_key),
            Ok(None) => false,
            Err(err) => {
                let granted = dotted_to_legacy(dotted_key)
                    .is_some_and(|legacy_key| legacy_role_grants(role, legacy_key));
                warn!(
                    "event=rbac_fallback module=service status=degraded role={role} permission={dotted_key} granted={granted} error={err}"
                );
                granted
            }
        }
    }

    fn secretary_toggle_allows(&self, actor: &Actor, dotted_key: &str) -> bool {
        if actor.role != Role::Secretary {
            return true;
        }
        let Some(feature) = SecretaryFeature::for_permission(dotted_key) else {
            return true;
        };

        let decision = actor.secretary_control(feature);
        if decision.defaulted {
            let entry = ActivityLogEntry::new(
                Some(actor),
                "rbac.secretary_control_defaulted",
                format!("Secretary control {}", feature.field_name()),
                self.clock.now_ms(),
            )
            .with_target_id(actor.id.to_string())
            .with_detail("feature", feature.field_name())
            .with_detail("permission", dotted_key)
            .with_detail("allowed", decision.allowed);
            self.audit.record(&entry);
        }
        decision.allowed
    }
}

impl<R: RoleRepository> Authorizer for PermissionResolver<'_, R> {
    fn can(&self, actor: Option<&Actor>, permission_key: &str) -> bool {
        let Some(actor) = actor else {
            return false;
        };
        if !actor.is_active {
            return false;
        }
        if actor.role == Role::Admin {
            return true;
        }

        let dotted_key = match classify_permission_key(permission_key) {
            PermissionKeyKind::Dotted(key) => key,
            PermissionKeyKind::Legacy(key) => match legacy_to_dotted(key) {
                Some(dotted) => dotted,
                None => {
                    debug!(
                        "event=rbac_check module=service status=denied reason=unmapped_legacy_key permission={key}"
                    );
                    return false;
                }
            },
            PermissionKeyKind::Malformed => {
                debug!(
                    "event=rbac_check module=service status=denied reason=malformed_key permission={permission_key}"
                );
                return false;
            }
        };

        self.role_grants(actor.role, dotted_key) && self.secretary_toggle_allows(actor, dotted_key)
    }
}
