use anyhow::Result;
use std::path::PathBuf;

use sqlbackup::RestoreStats;

use super::util::{backup_config, db_config};

pub fn exec(
    config: String,
    path: PathBuf,
    no_session_tuning: bool,
    strict: bool,
    config_dir: Option<PathBuf>,
) -> Result<()> {
    let mut cfg = backup_config(config_dir);
    if no_session_tuning {
        cfg = cfg.with_session_tuning(false);
    }
    if strict {
        cfg = cfg.with_strict_tail(true);
    }
    let db = db_config(&config, &cfg)?;

    let stats = run(&db, &path, &cfg)?;
    println!(
        "Push complete: {} ({} statement(s))",
        path.display(),
        stats.statements
    );
    Ok(())
}

#[cfg(feature = "mysql")]
fn run(
    db: &sqlbackup::DbConfig,
    path: &std::path::Path,
    cfg: &sqlbackup::BackupConfig,
) -> Result<RestoreStats> {
    sqlbackup::push_database(&sqlbackup::source::server::MySqlConnector, db, path, cfg)
}

#[cfg(not(feature = "mysql"))]
fn run(
    _db: &sqlbackup::DbConfig,
    _path: &std::path::Path,
    _cfg: &sqlbackup::BackupConfig,
) -> Result<RestoreStats> {
    anyhow::bail!("push needs a database driver: rebuild with `--features mysql`")
}
