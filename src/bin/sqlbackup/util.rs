use anyhow::Result;
use std::path::PathBuf;

use sqlbackup::config::{load_config, BackupConfig, DbConfig};

/// Env-derived tunables with the CLI config dir applied on top.
pub fn backup_config(config_dir: Option<PathBuf>) -> BackupConfig {
    let mut cfg = BackupConfig::from_env();
    if let Some(dir) = config_dir {
        cfg = cfg.with_config_dir(dir);
    }
    cfg
}

pub fn db_config(name: &str, cfg: &BackupConfig) -> Result<DbConfig> {
    load_config(name, &cfg.config_dir)
}
