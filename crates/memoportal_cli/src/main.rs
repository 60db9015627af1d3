//! CLI smoke and maintenance entry point.
//!
//! # Responsibility
//! - Verify `memoportal_core` linkage and print the role/permission matrix.
//! - With a database path, sweep expired locks and dispatch due memos.
//!
//! Usage: `memoportal_cli [DB_PATH]`. Set `MEMOPORTAL_LOG_DIR` to an absolute
//! directory to write diagnostic logs.

use log::error;
use memoportal_core::model::permission::{list_roles, permissions_by_category};
use memoportal_core::repo::activity_repo::SqliteActivityRepository;
use memoportal_core::repo::lock_repo::SqliteLockRepository;
use memoportal_core::repo::memo_repo::SqliteMemoRepository;
use memoportal_core::repo::role_repo::{RoleRepository, SqliteRoleRepository};
use memoportal_core::repo::settings_repo::SqliteSettingsRepository;
use memoportal_core::{
    default_log_level, init_logging, open_db, MemoWorkflow, PermissionResolver,
    RepositoryActivityLogger, ResourceLockManager, SystemClock,
};
use std::error::Error;
use std::process::ExitCode;

const LOG_DIR_ENV: &str = "MEMOPORTAL_LOG_DIR";

fn main() -> ExitCode {
    if let Ok(log_dir) = std::env::var(LOG_DIR_ENV) {
        if let Err(err) = init_logging(default_log_level(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    println!("memoportal_core ping={}", memoportal_core::ping());
    println!("memoportal_core version={}", memoportal_core::core_version());
    print_role_matrix();

    let Some(db_path) = std::env::args().nth(1) else {
        return ExitCode::SUCCESS;
    };
    match run_maintenance(&db_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_maintenance module=cli status=error error={err}");
            eprintln!("maintenance failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn print_role_matrix() {
    let roles = list_roles();
    for (category, permissions) in permissions_by_category() {
        println!("[{}]", category.label());
        for permission in permissions {
            let granted = roles
                .iter()
                .map(|definition| {
                    let mark = if definition.permissions.contains(&permission.key) {
                        "x"
                    } else {
                        "-"
                    };
                    format!("{}={mark}", definition.role)
                })
                .collect::<Vec<_>>()
                .join(" ");
            println!("  {:<26} {granted}", permission.key);
        }
    }
}

fn run_maintenance(db_path: &str) -> Result<(), Box<dyn Error>> {
    let conn = open_db(db_path)?;
    let clock = SystemClock;
    let audit = RepositoryActivityLogger::new(SqliteActivityRepository::try_new(&conn)?);

    let roles = SqliteRoleRepository::try_new(&conn)?;
    let seeded = roles.seed_default_roles()?;
    let resolver = PermissionResolver::new(roles, &audit, &clock);

    let locks = ResourceLockManager::new(
        SqliteLockRepository::try_new(&conn)?,
        SqliteSettingsRepository::try_new(&conn)?,
        &resolver,
        &audit,
        &clock,
    );
    let removed = locks.cleanup_expired()?;
    let duration = locks.get_lock_duration()?;

    let workflow = MemoWorkflow::new(
        SqliteMemoRepository::try_new(&conn)?,
        &resolver,
        &audit,
        &clock,
    );
    let dispatched = workflow.send_due_scheduled()?;

    println!("roles_seeded={seeded}");
    println!("lock_duration_seconds={}", duration.total_seconds());
    println!("expired_locks_removed={removed}");
    println!("scheduled_memos_sent={}", dispatched.len());
    Ok(())
}
