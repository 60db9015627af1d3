use memoportal_core::db::open_db_in_memory;
use memoportal_core::model::actor::{SecretaryControls, SecretaryFeature};
use memoportal_core::repo::activity_repo::{ActivityRepository, SqliteActivityRepository};
use memoportal_core::repo::role_repo::{RoleRecord, RoleRepository, SqliteRoleRepository};
use memoportal_core::repo::{RepoError, RepoResult};
use memoportal_core::{
    Actor, Authorizer, ManualClock, MemoryActivityLogger, PermissionResolver,
    RepositoryActivityLogger, Role,
};
use rusqlite::Connection;

const SECRETARY_CONTROL_DEFAULTED: &str = "rbac.secretary_control_defaulted";

fn seeded_db() -> Connection {
    let conn = open_db_in_memory().unwrap();
    SqliteRoleRepository::try_new(&conn)
        .unwrap()
        .seed_default_roles()
        .unwrap();
    conn
}

fn secretary_with_send(enabled: bool) -> Actor {
    let mut controls = SecretaryControls::all_enabled();
    controls.set(SecretaryFeature::SendMemo, enabled);
    Actor::secretary("Sam", "sam@uni.edu", "Registrar").with_controls(controls)
}

#[test]
fn admin_is_granted_every_key() {
    let conn = seeded_db();
    let audit = MemoryActivityLogger::new();
    let clock = ManualClock::new(0);
    let resolver =
        PermissionResolver::new(SqliteRoleRepository::try_new(&conn).unwrap(), &audit, &clock);
    let admin = Actor::admin("Ada", "ada@uni.edu");

    assert!(resolver.can(Some(&admin), "memo.approve"));
    assert!(resolver.can(Some(&admin), "reports.unlisted_action"));
    assert!(resolver.can(Some(&admin), "canApproveMemo"));
}

#[test]
fn admin_bypass_survives_an_emptied_role_record() {
    let conn = seeded_db();
    let roles = SqliteRoleRepository::try_new(&conn).unwrap();
    roles
        .save_role(&RoleRecord {
            role: Role::Admin,
            description: "Stripped".to_string(),
            permissions: Vec::new(),
        })
        .unwrap();

    let audit = MemoryActivityLogger::new();
    let clock = ManualClock::new(0);
    let resolver = PermissionResolver::new(roles, &audit, &clock);
    assert!(resolver.can(Some(&Actor::admin("Ada", "ada@uni.edu")), "settings.manage"));
}

#[test]
fn secretary_send_memo_requires_role_grant_and_control_flag() {
    let conn = seeded_db();
    let audit = MemoryActivityLogger::new();
    let clock = ManualClock::new(0);
    let resolver =
        PermissionResolver::new(SqliteRoleRepository::try_new(&conn).unwrap(), &audit, &clock);

    let blocked = secretary_with_send(false);
    assert!(!resolver.can(Some(&blocked), "memo.send"));
    assert!(!resolver.can(Some(&blocked), "canSendMemo"));
    assert!(resolver.can(Some(&blocked), "memo.create"));

    let allowed = secretary_with_send(true);
    assert!(resolver.can(Some(&allowed), "memo.send"));
    assert!(resolver.can(Some(&allowed), "canSendMemo"));

    assert!(!resolver.can(Some(&allowed), "memo.approve"));
    assert!(audit.entries().is_empty());
}

#[test]
fn missing_controls_default_to_allowed_and_are_audited() {
    let conn = seeded_db();
    let audit = RepositoryActivityLogger::new(SqliteActivityRepository::try_new(&conn).unwrap());
    let clock = ManualClock::new(5_000);
    let resolver =
        PermissionResolver::new(SqliteRoleRepository::try_new(&conn).unwrap(), &audit, &clock);
    let secretary = Actor::secretary("Sam", "sam@uni.edu", "Registrar");

    assert!(resolver.can(Some(&secretary), "memo.send"));
    assert!(resolver.can(Some(&secretary), "memo.view"));

    let entries = SqliteActivityRepository::try_new(&conn)
        .unwrap()
        .list_recent(10)
        .unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.action, SECRETARY_CONTROL_DEFAULTED);
    assert_eq!(entry.created_at, 5_000);
    assert_eq!(entry.details["feature"], "sendMemo");
    assert_eq!(entry.details["permission"], "memo.send");
    assert_eq!(
        entry.actor.as_ref().map(|snapshot| snapshot.id),
        Some(secretary.id)
    );
}

#[test]
fn partially_stored_controls_only_default_missing_fields() {
    let conn = seeded_db();
    let audit = MemoryActivityLogger::new();
    let clock = ManualClock::new(0);
    let resolver =
        PermissionResolver::new(SqliteRoleRepository::try_new(&conn).unwrap(), &audit, &clock);

    let controls = SecretaryControls::from_json(&serde_json::json!({
        "sendMemo": false,
        "archiveMemo": "yes"
    }));
    let secretary =
        Actor::secretary("Sam", "sam@uni.edu", "Registrar").with_controls(controls);

    assert!(!resolver.can(Some(&secretary), "memo.send"));
    assert!(resolver.can(Some(&secretary), "memo.archive"));
    assert_eq!(audit.actions(), vec![SECRETARY_CONTROL_DEFAULTED.to_string()]);
}

#[test]
fn legacy_keys_resolve_through_role_records() {
    let conn = seeded_db();
    let audit = MemoryActivityLogger::new();
    let clock = ManualClock::new(0);
    let resolver =
        PermissionResolver::new(SqliteRoleRepository::try_new(&conn).unwrap(), &audit, &clock);
    let faculty = Actor::faculty("Fay", "fay@uni.edu", "Physics");

    assert!(resolver.can(Some(&faculty), "canCreateMemo"));
    assert!(!resolver.can(Some(&faculty), "canApproveMemo"));
    assert!(!resolver.can(Some(&faculty), "canFly"));
}

#[test]
fn role_edits_apply_to_later_checks() {
    let conn = seeded_db();
    let roles = SqliteRoleRepository::try_new(&conn).unwrap();
    let mut faculty_role = roles.find_role(Role::Faculty).unwrap().unwrap();
    faculty_role.permissions.push("memo.send".to_string());
    roles.save_role(&faculty_role).unwrap();

    let audit = MemoryActivityLogger::new();
    let clock = ManualClock::new(0);
    let resolver = PermissionResolver::new(roles, &audit, &clock);
    let faculty = Actor::faculty("Fay", "fay@uni.edu", "Physics");
    assert!(resolver.can(Some(&faculty), "memo.send"));
}

#[test]
fn unseeded_role_denies_non_admins() {
    let conn = open_db_in_memory().unwrap();
    let audit = MemoryActivityLogger::new();
    let clock = ManualClock::new(0);
    let resolver =
        PermissionResolver::new(SqliteRoleRepository::try_new(&conn).unwrap(), &audit, &clock);

    assert!(!resolver.can(Some(&Actor::faculty("Fay", "fay@uni.edu", "Physics")), "memo.view"));
    assert!(resolver.can(Some(&Actor::admin("Ada", "ada@uni.edu")), "memo.view"));
}

#[test]
fn save_role_rejects_unknown_permission() {
    let conn = seeded_db();
    let roles = SqliteRoleRepository::try_new(&conn).unwrap();
    let err = roles
        .save_role(&RoleRecord {
            role: Role::Faculty,
            description: "Faculty".to_string(),
            permissions: vec!["memo.teleport".to_string()],
        })
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}

#[test]
fn seeding_keeps_existing_role_edits() {
    let conn = seeded_db();
    let roles = SqliteRoleRepository::try_new(&conn).unwrap();
    roles
        .save_role(&RoleRecord {
            role: Role::Faculty,
            description: "Faculty".to_string(),
            permissions: vec!["memo.view".to_string()],
        })
        .unwrap();

    assert_eq!(roles.seed_default_roles().unwrap(), 0);
    let faculty = roles.find_role(Role::Faculty).unwrap().unwrap();
    assert_eq!(faculty.permissions, vec!["memo.view".to_string()]);
}

struct UnreachableRoles;

impl RoleRepository for UnreachableRoles {
    fn find_role(&self, _role: Role) -> RepoResult<Option<RoleRecord>> {
        Err(RepoError::InvalidData("role store unreachable".to_string()))
    }

    fn list_roles(&self) -> RepoResult<Vec<RoleRecord>> {
        Err(RepoError::InvalidData("role store unreachable".to_string()))
    }

    fn save_role(&self, _record: &RoleRecord) -> RepoResult<()> {
        Err(RepoError::InvalidData("role store unreachable".to_string()))
    }

    fn seed_default_roles(&self) -> RepoResult<usize> {
        Err(RepoError::InvalidData("role store unreachable".to_string()))
    }
}

#[test]
fn role_store_failure_falls_back_to_legacy_table() {
    let audit = MemoryActivityLogger::new();
    let clock = ManualClock::new(0);
    let resolver = PermissionResolver::new(UnreachableRoles, &audit, &clock);

    let secretary = secretary_with_send(true);
    assert!(resolver.can(Some(&secretary), "memo.send"));
    assert!(resolver.can(Some(&secretary), "canSendMemo"));
    assert!(!resolver.can(Some(&secretary), "memo.approve"));

    let blocked = secretary_with_send(false);
    assert!(!resolver.can(Some(&blocked), "memo.send"));

    let faculty = Actor::faculty("Fay", "fay@uni.edu", "Physics");
    assert!(resolver.can(Some(&faculty), "canCreateMemo"));
    assert!(!resolver.can(Some(&faculty), "memo.send"));
    // No legacy flag exists for memo.edit, so the fallback denies it.
    assert!(!resolver.can(Some(&faculty), "memo.edit"));
}
