use memoportal_core::db::open_db_in_memory;
use memoportal_core::model::activity::RequestContext;
use memoportal_core::repo::activity_repo::{ActivityRepository, SqliteActivityRepository};
use memoportal_core::repo::role_repo::{RoleRepository, SqliteRoleRepository};
use memoportal_core::{
    ActivityLogEntry, ActivityLogService, ActivityLogger, Actor, CoreError, ManualClock,
    PermissionResolver, RepositoryActivityLogger, Role,
};
use rusqlite::Connection;

const T0: i64 = 1_700_000_000_000;

fn seeded_db() -> Connection {
    let conn = open_db_in_memory().unwrap();
    SqliteRoleRepository::try_new(&conn)
        .unwrap()
        .seed_default_roles()
        .unwrap();
    conn
}

#[test]
fn entries_keep_the_actor_snapshot_from_write_time() {
    let conn = seeded_db();
    let repo = SqliteActivityRepository::try_new(&conn).unwrap();
    let mut actor = Actor::faculty("Fay", "fay@uni.edu", "Physics");

    let entry = ActivityLogEntry::new(Some(&actor), "memo.submit", "Exam schedule", T0)
        .with_target_id("memo-1")
        .with_detail("from", "draft")
        .with_request(RequestContext {
            ip_address: Some("10.0.0.7".to_string()),
            user_agent: Some("portal-web".to_string()),
        });
    repo.append(&entry).unwrap();

    actor.department = Some("Chemistry".to_string());
    actor.role = Role::Secretary;

    let stored = repo.list_for_target("memo-1").unwrap();
    assert_eq!(stored, vec![entry]);
    let snapshot = stored[0].actor.as_ref().unwrap();
    assert_eq!(snapshot.department.as_deref(), Some("Physics"));
    assert_eq!(snapshot.role, Role::Faculty);
}

#[test]
fn list_recent_is_newest_first_and_limited() {
    let conn = seeded_db();
    let repo = SqliteActivityRepository::try_new(&conn).unwrap();
    for offset in 0..5 {
        repo.append(&ActivityLogEntry::new(
            None,
            format!("event.{offset}"),
            "system",
            T0 + offset,
        ))
        .unwrap();
    }

    let recent = repo.list_recent(3).unwrap();
    let actions = recent
        .iter()
        .map(|entry| entry.action.as_str())
        .collect::<Vec<_>>();
    assert_eq!(actions, vec!["event.4", "event.3", "event.2"]);
    assert!(recent.iter().all(|entry| entry.actor.is_none()));
}

#[test]
fn viewing_and_purging_are_permission_gated() {
    let conn = seeded_db();
    let clock = ManualClock::new(T0 + 10_000);
    let audit = RepositoryActivityLogger::new(SqliteActivityRepository::try_new(&conn).unwrap());
    let resolver =
        PermissionResolver::new(SqliteRoleRepository::try_new(&conn).unwrap(), &audit, &clock);
    let service = ActivityLogService::new(
        SqliteActivityRepository::try_new(&conn).unwrap(),
        &resolver,
        &audit,
        &clock,
    );

    audit.record(&ActivityLogEntry::new(None, "lock.acquire", "user/1", T0));
    audit.record(&ActivityLogEntry::new(None, "lock.release", "user/1", T0 + 5_000));

    let faculty = Actor::faculty("Fay", "fay@uni.edu", "Physics");
    let secretary = Actor::secretary("Sam", "sam@uni.edu", "Registrar");
    let admin = Actor::admin("Ada", "ada@uni.edu");

    assert!(matches!(
        service.list_recent(&faculty, 10),
        Err(CoreError::Unauthorized { .. })
    ));
    assert!(matches!(
        service.purge(&secretary, None),
        Err(CoreError::Unauthorized { .. })
    ));

    let removed = service.purge(&admin, Some(T0 + 1_000)).unwrap();
    assert_eq!(removed, 1);

    let remaining = service.list_recent(&admin, 10).unwrap();
    let actions = remaining
        .iter()
        .map(|entry| entry.action.as_str())
        .collect::<Vec<_>>();
    assert_eq!(actions, vec!["activity.purge", "lock.release"]);
    assert_eq!(remaining[0].details["removed"], 1);
    assert_eq!(remaining[0].details["before"], T0 + 1_000);
}

#[test]
fn purge_everything_keeps_only_the_purge_record() {
    let conn = seeded_db();
    let clock = ManualClock::new(T0);
    let audit = RepositoryActivityLogger::new(SqliteActivityRepository::try_new(&conn).unwrap());
    let resolver =
        PermissionResolver::new(SqliteRoleRepository::try_new(&conn).unwrap(), &audit, &clock);
    let service = ActivityLogService::new(
        SqliteActivityRepository::try_new(&conn).unwrap(),
        &resolver,
        &audit,
        &clock,
    );

    for offset in 0..3 {
        audit.record(&ActivityLogEntry::new(None, "memo.send", "Memo", T0 - offset));
    }
    let admin = Actor::admin("Ada", "ada@uni.edu");
    assert_eq!(service.purge(&admin, None).unwrap(), 3);

    let remaining = service.list_for_target(&admin, "missing").unwrap();
    assert!(remaining.is_empty());
    let all = service.list_recent(&admin, 10).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].action, "activity.purge");
}
