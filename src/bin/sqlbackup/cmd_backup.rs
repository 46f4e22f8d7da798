use anyhow::Result;
use std::path::PathBuf;

use super::util::{backup_config, db_config};

pub fn exec(
    config: String,
    path: PathBuf,
    incremental: Option<u64>,
    batch_size: Option<u64>,
    config_dir: Option<PathBuf>,
) -> Result<()> {
    let mut cfg = backup_config(config_dir);
    if let Some(keep) = incremental {
        cfg = cfg.with_keep(Some(keep as usize));
    }
    if let Some(n) = batch_size {
        cfg = cfg.with_batch_size(n as usize);
    }
    cfg.validate()?;
    let db = db_config(&config, &cfg)?;

    let written = run(&db, &path, &cfg)?;
    println!("Backup complete: {}", written.display());
    Ok(())
}

#[cfg(feature = "mysql")]
fn run(
    db: &sqlbackup::DbConfig,
    path: &std::path::Path,
    cfg: &sqlbackup::BackupConfig,
) -> Result<PathBuf> {
    sqlbackup::backup_database(&sqlbackup::source::server::MySqlConnector, db, path, cfg)
}

#[cfg(not(feature = "mysql"))]
fn run(
    _db: &sqlbackup::DbConfig,
    _path: &std::path::Path,
    _cfg: &sqlbackup::BackupConfig,
) -> Result<PathBuf> {
    anyhow::bail!("backup needs a database driver: rebuild with `--features mysql`")
}
