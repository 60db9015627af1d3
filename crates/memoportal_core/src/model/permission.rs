//! Permission vocabulary and default role grants.
//!
//! # Responsibility
//! - Enumerate every grantable permission key, grouped by category.
//! - Provide the default permission set of each role for seeding.
//! - Keep the legacy boolean-permission tables as constant inputs to the
//!   resolver.
//!
//! # Invariants
//! - Keys use `category.action` form (lowercase, underscores allowed).
//! - Registry order is stable; UI rendering and seeding rely on it.
//! - Every legacy key maps to exactly one registry key.

use crate::model::role::Role;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

static PERMISSION_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z_]*\.[a-z][a-z_]*$").expect("valid permission key regex"));
static LEGACY_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^can[A-Z][A-Za-z]*$").expect("valid legacy key regex"));

/// Presentation group for permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionCategory {
    Users,
    Memos,
    Calendar,
    Reports,
    Activity,
    Settings,
    Roles,
    Account,
}

impl PermissionCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Users => "User Management",
            Self::Memos => "Memos",
            Self::Calendar => "Calendar",
            Self::Reports => "Reports",
            Self::Activity => "Activity Logs",
            Self::Settings => "System Settings",
            Self::Roles => "Roles & Permissions",
            Self::Account => "Account",
        }
    }
}

/// One grantable capability. Purely descriptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PermissionDef {
    pub key: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub category: PermissionCategory,
}

pub const USER_VIEW: &str = "user.view";
pub const USER_CREATE: &str = "user.create";
pub const USER_EDIT: &str = "user.edit";
pub const USER_DELETE: &str = "user.delete";
pub const USER_UNLOCK: &str = "user.unlock";
pub const MEMO_VIEW: &str = "memo.view";
pub const MEMO_CREATE: &str = "memo.create";
pub const MEMO_EDIT: &str = "memo.edit";
pub const MEMO_DELETE: &str = "memo.delete";
pub const MEMO_SEND: &str = "memo.send";
pub const MEMO_APPROVE: &str = "memo.approve";
pub const MEMO_REJECT: &str = "memo.reject";
pub const MEMO_ARCHIVE: &str = "memo.archive";
pub const MEMO_SIGN: &str = "memo.sign";
pub const MEMO_ATTACH: &str = "memo.attach";
pub const MEMO_ACKNOWLEDGE: &str = "memo.acknowledge";
pub const CALENDAR_VIEW: &str = "calendar.view";
pub const CALENDAR_CREATE: &str = "calendar.create";
pub const CALENDAR_EDIT: &str = "calendar.edit";
pub const CALENDAR_DELETE: &str = "calendar.delete";
pub const REPORT_GENERATE: &str = "report.generate";
pub const ACTIVITY_VIEW: &str = "activity.view";
pub const ACTIVITY_PURGE: &str = "activity.purge";
pub const SETTINGS_VIEW: &str = "settings.view";
pub const SETTINGS_MANAGE: &str = "settings.manage";
pub const ROLE_VIEW: &str = "role.view";
pub const ROLE_MANAGE: &str = "role.manage";
pub const ACCOUNT_CHANGE_PASSWORD: &str = "account.change_password";

const fn def(
    key: &'static str,
    label: &'static str,
    description: &'static str,
    category: PermissionCategory,
) -> PermissionDef {
    PermissionDef {
        key,
        label,
        description,
        category,
    }
}

const PERMISSIONS: &[PermissionDef] = &[
    def(
        USER_VIEW,
        "View users",
        "List and inspect user accounts.",
        PermissionCategory::Users,
    ),
    def(
        USER_CREATE,
        "Create users",
        "Register new user accounts.",
        PermissionCategory::Users,
    ),
    def(
        USER_EDIT,
        "Edit users",
        "Change profile, role and department of a user.",
        PermissionCategory::Users,
    ),
    def(
        USER_DELETE,
        "Delete users",
        "Remove user accounts.",
        PermissionCategory::Users,
    ),
    def(
        USER_UNLOCK,
        "Override edit locks",
        "Force-release another administrator's edit lock.",
        PermissionCategory::Users,
    ),
    def(
        MEMO_VIEW,
        "View memos",
        "Read memos addressed to the actor or department.",
        PermissionCategory::Memos,
    ),
    def(
        MEMO_CREATE,
        "Create memos",
        "Draft new memos.",
        PermissionCategory::Memos,
    ),
    def(
        MEMO_EDIT,
        "Edit memos",
        "Change drafts and submit them for approval.",
        PermissionCategory::Memos,
    ),
    def(
        MEMO_DELETE,
        "Delete memos",
        "Move memos to trash and restore them.",
        PermissionCategory::Memos,
    ),
    def(
        MEMO_SEND,
        "Send memos",
        "Distribute memos to recipients.",
        PermissionCategory::Memos,
    ),
    def(
        MEMO_APPROVE,
        "Approve memos",
        "Approve memos pending review.",
        PermissionCategory::Memos,
    ),
    def(
        MEMO_REJECT,
        "Reject memos",
        "Reject memos pending review with a reason.",
        PermissionCategory::Memos,
    ),
    def(
        MEMO_ARCHIVE,
        "Archive memos",
        "Archive and unarchive memos.",
        PermissionCategory::Memos,
    ),
    def(
        MEMO_SIGN,
        "Add signature",
        "Attach a signature block to memos.",
        PermissionCategory::Memos,
    ),
    def(
        MEMO_ATTACH,
        "Attach files",
        "Upload attachments to memos.",
        PermissionCategory::Memos,
    ),
    def(
        MEMO_ACKNOWLEDGE,
        "Acknowledge memos",
        "Confirm receipt of a memo.",
        PermissionCategory::Memos,
    ),
    def(
        CALENDAR_VIEW,
        "View calendar",
        "See scheduled events.",
        PermissionCategory::Calendar,
    ),
    def(
        CALENDAR_CREATE,
        "Add events",
        "Schedule calendar events.",
        PermissionCategory::Calendar,
    ),
    def(
        CALENDAR_EDIT,
        "Edit events",
        "Reschedule or change calendar events.",
        PermissionCategory::Calendar,
    ),
    def(
        CALENDAR_DELETE,
        "Cancel events",
        "Cancel or remove calendar events.",
        PermissionCategory::Calendar,
    ),
    def(
        REPORT_GENERATE,
        "Generate reports",
        "Export memo and activity reports.",
        PermissionCategory::Reports,
    ),
    def(
        ACTIVITY_VIEW,
        "View activity logs",
        "Browse the audit trail.",
        PermissionCategory::Activity,
    ),
    def(
        ACTIVITY_PURGE,
        "Purge activity logs",
        "Bulk-delete audit trail entries.",
        PermissionCategory::Activity,
    ),
    def(
        SETTINGS_VIEW,
        "View settings",
        "Read system-wide settings.",
        PermissionCategory::Settings,
    ),
    def(
        SETTINGS_MANAGE,
        "Manage settings",
        "Change system-wide settings such as lock duration.",
        PermissionCategory::Settings,
    ),
    def(
        ROLE_VIEW,
        "View roles",
        "Inspect role permission sets.",
        PermissionCategory::Roles,
    ),
    def(
        ROLE_MANAGE,
        "Manage roles",
        "Change role permission sets.",
        PermissionCategory::Roles,
    ),
    def(
        ACCOUNT_CHANGE_PASSWORD,
        "Change password",
        "Change the actor's own password.",
        PermissionCategory::Account,
    ),
];

const SECRETARY_DEFAULTS: &[&str] = &[
    USER_VIEW,
    MEMO_VIEW,
    MEMO_CREATE,
    MEMO_EDIT,
    MEMO_DELETE,
    MEMO_SEND,
    MEMO_ARCHIVE,
    MEMO_SIGN,
    MEMO_ATTACH,
    MEMO_ACKNOWLEDGE,
    CALENDAR_VIEW,
    CALENDAR_CREATE,
    CALENDAR_EDIT,
    CALENDAR_DELETE,
    REPORT_GENERATE,
    ACCOUNT_CHANGE_PASSWORD,
];

const FACULTY_DEFAULTS: &[&str] = &[
    MEMO_VIEW,
    MEMO_CREATE,
    MEMO_EDIT,
    MEMO_ATTACH,
    MEMO_ACKNOWLEDGE,
    CALENDAR_VIEW,
    ACCOUNT_CHANGE_PASSWORD,
];

/// Legacy boolean flag name to registry key.
const LEGACY_PERMISSION_KEYS: &[(&str, &str)] = &[
    ("canViewUsers", USER_VIEW),
    ("canManageUsers", USER_EDIT),
    ("canViewMemos", MEMO_VIEW),
    ("canCreateMemo", MEMO_CREATE),
    ("canDeleteMemo", MEMO_DELETE),
    ("canSendMemo", MEMO_SEND),
    ("canApproveMemo", MEMO_APPROVE),
    ("canRejectMemo", MEMO_REJECT),
    ("canArchiveMemo", MEMO_ARCHIVE),
    ("canAddSignature", MEMO_SIGN),
    ("canAttachFiles", MEMO_ATTACH),
    ("canViewCalendar", CALENDAR_VIEW),
    ("canCreateEvent", CALENDAR_CREATE),
    ("canGenerateReports", REPORT_GENERATE),
    ("canViewActivityLogs", ACTIVITY_VIEW),
    ("canManageSettings", SETTINGS_MANAGE),
    ("canChangePassword", ACCOUNT_CHANGE_PASSWORD),
];

/// Static per-role boolean table predating role records. Lists the legacy
/// flags that are `true`; everything absent is `false`.
const ROLE_PERMISSIONS: &[(Role, &[&str])] = &[
    (
        Role::Admin,
        &[
            "canViewUsers",
            "canManageUsers",
            "canViewMemos",
            "canCreateMemo",
            "canDeleteMemo",
            "canSendMemo",
            "canApproveMemo",
            "canRejectMemo",
            "canArchiveMemo",
            "canAddSignature",
            "canAttachFiles",
            "canViewCalendar",
            "canCreateEvent",
            "canGenerateReports",
            "canViewActivityLogs",
            "canManageSettings",
            "canChangePassword",
        ],
    ),
    (
        Role::Secretary,
        &[
            "canViewUsers",
            "canViewMemos",
            "canCreateMemo",
            "canDeleteMemo",
            "canSendMemo",
            "canArchiveMemo",
            "canAddSignature",
            "canAttachFiles",
            "canViewCalendar",
            "canCreateEvent",
            "canGenerateReports",
            "canChangePassword",
        ],
    ),
    (
        Role::Faculty,
        &[
            "canViewMemos",
            "canCreateMemo",
            "canAttachFiles",
            "canViewCalendar",
            "canChangePassword",
        ],
    ),
];

/// Default definition of one role, used for seeding and admin UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleDefinition {
    pub role: Role,
    pub description: &'static str,
    pub permissions: Vec<&'static str>,
}

/// Shape of a permission key as seen by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionKeyKind<'a> {
    /// Registry-style `category.action` key.
    Dotted(&'a str),
    /// Legacy boolean flag name such as `canCreateMemo`.
    Legacy(&'a str),
    Malformed,
}

/// Returns all permissions in registry order.
pub fn list_permissions() -> &'static [PermissionDef] {
    PERMISSIONS
}

/// Returns the three fixed roles with their default permission sets.
pub fn list_roles() -> Vec<RoleDefinition> {
    Role::ALL
        .into_iter()
        .map(|role| RoleDefinition {
            role,
            description: role.description(),
            permissions: default_permissions(role).to_vec(),
        })
        .collect()
}

/// Default permission keys granted to `role`.
pub fn default_permissions(role: Role) -> Vec<&'static str> {
    match role {
        Role::Admin => PERMISSIONS.iter().map(|permission| permission.key).collect(),
        Role::Secretary => SECRETARY_DEFAULTS.to_vec(),
        Role::Faculty => FACULTY_DEFAULTS.to_vec(),
    }
}

/// Groups registry entries by category, preserving registry order inside
/// each group.
pub fn permissions_by_category() -> BTreeMap<PermissionCategory, Vec<&'static PermissionDef>> {
    let mut grouped: BTreeMap<PermissionCategory, Vec<&'static PermissionDef>> = BTreeMap::new();
    for permission in PERMISSIONS {
        grouped.entry(permission.category).or_default().push(permission);
    }
    grouped
}

pub fn find_permission(key: &str) -> Option<&'static PermissionDef> {
    PERMISSIONS.iter().find(|permission| permission.key == key)
}

pub fn is_known_permission(key: &str) -> bool {
    find_permission(key).is_some()
}

pub fn classify_permission_key(key: &str) -> PermissionKeyKind<'_> {
    if PERMISSION_KEY_RE.is_match(key) {
        PermissionKeyKind::Dotted(key)
    } else if LEGACY_KEY_RE.is_match(key) {
        PermissionKeyKind::Legacy(key)
    } else {
        PermissionKeyKind::Malformed
    }
}

/// Maps a legacy boolean flag name to its registry key.
pub fn legacy_to_dotted(legacy_key: &str) -> Option<&'static str> {
    LEGACY_PERMISSION_KEYS
        .iter()
        .find(|(legacy, _)| *legacy == legacy_key)
        .map(|(_, dotted)| *dotted)
}

/// Maps a registry key back to its legacy boolean flag name, if one exists.
pub fn dotted_to_legacy(dotted_key: &str) -> Option<&'static str> {
    LEGACY_PERMISSION_KEYS
        .iter()
        .find(|(_, dotted)| *dotted == dotted_key)
        .map(|(legacy, _)| *legacy)
}

/// Looks up the legacy static table.
pub fn legacy_role_grants(role: Role, legacy_key: &str) -> bool {
    ROLE_PERMISSIONS
        .iter()
        .find(|(candidate, _)| *candidate == role)
        .is_some_and(|(_, granted)| granted.contains(&legacy_key))
}
