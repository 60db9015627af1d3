//! Authenticated actor model.
//!
//! # Responsibility
//! - Carry the identity, role and department used by permission checks.
//! - Carry per-secretary feature toggles.
//!
//! # Invariants
//! - `admin` actors have no department.
//! - `secretary` and `faculty` actors have a non-blank department.
//! - Secretary controls that are absent or malformed resolve to `true`.

use crate::clock::EpochMillis;
use crate::model::permission::{
    ACCOUNT_CHANGE_PASSWORD, CALENDAR_CREATE, MEMO_ARCHIVE, MEMO_ATTACH, MEMO_SEND, MEMO_SIGN,
};
use crate::model::role::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type ActorId = Uuid;

/// Secretary feature gated by a per-user toggle on top of role grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecretaryFeature {
    AddSignature,
    SendMemo,
    ArchiveMemo,
    AddEvent,
    AttachFiles,
    ChangePassword,
}

impl SecretaryFeature {
    pub const ALL: [SecretaryFeature; 6] = [
        SecretaryFeature::AddSignature,
        SecretaryFeature::SendMemo,
        SecretaryFeature::ArchiveMemo,
        SecretaryFeature::AddEvent,
        SecretaryFeature::AttachFiles,
        SecretaryFeature::ChangePassword,
    ];

    /// Field name used in the stored controls document.
    pub fn field_name(self) -> &'static str {
        match self {
            Self::AddSignature => "addSignature",
            Self::SendMemo => "sendMemo",
            Self::ArchiveMemo => "archiveMemo",
            Self::AddEvent => "addEvent",
            Self::AttachFiles => "attachFiles",
            Self::ChangePassword => "changePassword",
        }
    }

    /// Permission key this toggle additionally gates.
    pub fn permission_key(self) -> &'static str {
        match self {
            Self::AddSignature => MEMO_SIGN,
            Self::SendMemo => MEMO_SEND,
            Self::ArchiveMemo => MEMO_ARCHIVE,
            Self::AddEvent => CALENDAR_CREATE,
            Self::AttachFiles => MEMO_ATTACH,
            Self::ChangePassword => ACCOUNT_CHANGE_PASSWORD,
        }
    }

    pub fn for_permission(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|feature| feature.permission_key() == key)
    }
}

/// Per-secretary feature toggles.
///
/// `None` means no usable stored value; such a feature resolves to allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretaryControls {
    pub add_signature: Option<bool>,
    pub send_memo: Option<bool>,
    pub archive_memo: Option<bool>,
    pub add_event: Option<bool>,
    pub attach_files: Option<bool>,
    pub change_password: Option<bool>,
}

/// Outcome of reading one secretary toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlDecision {
    pub allowed: bool,
    /// `true` when no stored value existed and the default was applied.
    pub defaulted: bool,
}

impl SecretaryControls {
    /// Every feature explicitly enabled.
    pub fn all_enabled() -> Self {
        Self::uniform(true)
    }

    /// Every feature explicitly disabled.
    pub fn all_disabled() -> Self {
        Self::uniform(false)
    }

    fn uniform(value: bool) -> Self {
        Self {
            add_signature: Some(value),
            send_memo: Some(value),
            archive_memo: Some(value),
            add_event: Some(value),
            attach_files: Some(value),
            change_password: Some(value),
        }
    }

    /// Leniently reads a stored controls document.
    ///
    /// Non-object documents and non-boolean fields are treated as absent
    /// rather than rejected.
    pub fn from_json(value: &Value) -> Self {
        let Some(fields) = value.as_object() else {
            return Self::default();
        };
        let read = |feature: SecretaryFeature| {
            fields
                .get(feature.field_name())
                .and_then(Value::as_bool)
        };
        Self {
            add_signature: read(SecretaryFeature::AddSignature),
            send_memo: read(SecretaryFeature::SendMemo),
            archive_memo: read(SecretaryFeature::ArchiveMemo),
            add_event: read(SecretaryFeature::AddEvent),
            attach_files: read(SecretaryFeature::AttachFiles),
            change_password: read(SecretaryFeature::ChangePassword),
        }
    }

    pub fn stored(&self, feature: SecretaryFeature) -> Option<bool> {
        match feature {
            SecretaryFeature::AddSignature => self.add_signature,
            SecretaryFeature::SendMemo => self.send_memo,
            SecretaryFeature::ArchiveMemo => self.archive_memo,
            SecretaryFeature::AddEvent => self.add_event,
            SecretaryFeature::AttachFiles => self.attach_files,
            SecretaryFeature::ChangePassword => self.change_password,
        }
    }

    pub fn set(&mut self, feature: SecretaryFeature, enabled: bool) {
        let slot = match feature {
            SecretaryFeature::AddSignature => &mut self.add_signature,
            SecretaryFeature::SendMemo => &mut self.send_memo,
            SecretaryFeature::ArchiveMemo => &mut self.archive_memo,
            SecretaryFeature::AddEvent => &mut self.add_event,
            SecretaryFeature::AttachFiles => &mut self.attach_files,
            SecretaryFeature::ChangePassword => &mut self.change_password,
        };
        *slot = Some(enabled);
    }

    pub fn decide(&self, feature: SecretaryFeature) -> ControlDecision {
        match self.stored(feature) {
            Some(allowed) => ControlDecision {
                allowed,
                defaulted: false,
            },
            None => ControlDecision {
                allowed: true,
                defaulted: true,
            },
        }
    }
}

/// Authenticated user performing an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<String>,
    /// Only consulted when `role == Role::Secretary`.
    pub secretary_controls: Option<SecretaryControls>,
    pub is_active: bool,
    pub login_attempts: u32,
    pub lock_until: Option<EpochMillis>,
}

impl Actor {
    /// Creates an active actor with no secretary controls stored.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        department: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            role,
            department,
            secretary_controls: None,
            is_active: true,
            login_attempts: 0,
            lock_until: None,
        }
    }

    pub fn admin(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::new(name, email, Role::Admin, None)
    }

    pub fn secretary(
        name: impl Into<String>,
        email: impl Into<String>,
        department: impl Into<String>,
    ) -> Self {
        Self::new(name, email, Role::Secretary, Some(department.into()))
    }

    pub fn faculty(
        name: impl Into<String>,
        email: impl Into<String>,
        department: impl Into<String>,
    ) -> Self {
        Self::new(name, email, Role::Faculty, Some(department.into()))
    }

    pub fn with_controls(mut self, controls: SecretaryControls) -> Self {
        self.secretary_controls = Some(controls);
        self
    }

    /// Validates the department invariant.
    pub fn validate(&self) -> Result<(), ActorValidationError> {
        if self.email.trim().is_empty() {
            return Err(ActorValidationError::MissingEmail);
        }
        let department = self
            .department
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());
        match (self.role.requires_department(), department) {
            (false, Some(department)) => Err(ActorValidationError::AdminHasDepartment(
                department.to_string(),
            )),
            (true, None) => Err(ActorValidationError::MissingDepartment(self.role)),
            _ => Ok(()),
        }
    }

    /// Whether login is currently blocked by too many failed attempts.
    pub fn is_locked_out(&self, now: EpochMillis) -> bool {
        self.lock_until.is_some_and(|until| until > now)
    }

    /// Resolves one secretary toggle. Non-secretaries are never gated.
    pub fn secretary_control(&self, feature: SecretaryFeature) -> ControlDecision {
        match self.role {
            Role::Secretary => self
                .secretary_controls
                .unwrap_or_default()
                .decide(feature),
            Role::Admin | Role::Faculty => ControlDecision {
                allowed: true,
                defaulted: false,
            },
        }
    }
}

/// Actor invariant violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorValidationError {
    MissingEmail,
    AdminHasDepartment(String),
    MissingDepartment(Role),
}

impl Display for ActorValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEmail => write!(f, "actor email must not be blank"),
            Self::AdminHasDepartment(department) => {
                write!(f, "admin must not belong to a department, got `{department}`")
            }
            Self::MissingDepartment(role) => write!(f, "{role} requires a department"),
        }
    }
}

impl Error for ActorValidationError {}

#[cfg(test)]
mod tests {
    use super::{Actor, ActorValidationError, Role, SecretaryControls, SecretaryFeature};
    use serde_json::json;

    #[test]
    fn validates_department_by_role() {
        assert!(Actor::admin("Ada", "ada@uni.edu").validate().is_ok());
        assert!(Actor::secretary("Sam", "sam@uni.edu", "CS").validate().is_ok());

        let mut admin = Actor::admin("Ada", "ada@uni.edu");
        admin.department = Some("CS".to_string());
        assert_eq!(
            admin.validate(),
            Err(ActorValidationError::AdminHasDepartment("CS".to_string()))
        );

        let faculty = Actor::new("Fay", "fay@uni.edu", Role::Faculty, Some("  ".to_string()));
        assert_eq!(
            faculty.validate(),
            Err(ActorValidationError::MissingDepartment(Role::Faculty))
        );
    }

    #[test]
    fn controls_from_json_ignore_malformed_fields() {
        let controls = SecretaryControls::from_json(&json!({
            "sendMemo": false,
            "archiveMemo": "no",
            "addEvent": true
        }));
        assert_eq!(controls.send_memo, Some(false));
        assert_eq!(controls.archive_memo, None);
        assert_eq!(controls.add_event, Some(true));

        assert_eq!(
            SecretaryControls::from_json(&json!(["sendMemo"])),
            SecretaryControls::default()
        );
    }

    #[test]
    fn missing_controls_default_open_and_report_it() {
        let secretary = Actor::secretary("Sam", "sam@uni.edu", "CS");
        let decision = secretary.secretary_control(SecretaryFeature::SendMemo);
        assert!(decision.allowed);
        assert!(decision.defaulted);

        let restricted = secretary.with_controls(SecretaryControls::all_disabled());
        let decision = restricted.secretary_control(SecretaryFeature::SendMemo);
        assert!(!decision.allowed);
        assert!(!decision.defaulted);
    }

    #[test]
    fn lockout_respects_clock() {
        let mut actor = Actor::faculty("Fay", "fay@uni.edu", "Math");
        actor.login_attempts = 5;
        actor.lock_until = Some(10_000);
        assert!(actor.is_locked_out(9_999));
        assert!(!actor.is_locked_out(10_000));
    }
}
