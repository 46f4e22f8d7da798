//! Configuration: database connection files and engine tunables.
//!
//! Two pieces:
//! - [`DbConfig`]: connection parameters loaded from `<config_dir>/<name>.json`
//!   (`host`, `port`, `user`, `password`, `database`; extra keys are ignored).
//! - [`BackupConfig`]: engine tunables. `BackupConfig::from_env()` reads the
//!   `SQLBACKUP_*` variables, fluent `with_*` setters override single fields
//!   (the CLI applies its flags on top of the environment this way).
//!
//! The config directory is always an explicit value. The process working directory
//! is consulted exactly once, in `BackupConfig::from_env()`, to derive the default
//! `<cwd>/configs`; nothing below that reads global state.
//!
//! Defaults:
//! - batch_size = 1000 rows per INSERT
//! - keep = None (plain, non-incremental dumps)
//! - session_tuning = true
//! - strict_tail = false (unterminated trailing statement is dropped with a warning)

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use zeroize::Zeroize;

use crate::dump::DEFAULT_BATCH_SIZE;
use crate::error::BackupError;

/// Sub-directory of the working directory holding `<name>.json` files.
pub const CONFIG_DIR: &str = "configs";
pub const CONFIG_EXT: &str = "json";

pub const REQUIRED_CONFIG_KEYS: [&str; 5] = ["database", "host", "password", "port", "user"];

/// Connection parameters of one database.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct DbConfig {
    pub host: String,
    #[serde(deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Drop for DbConfig {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

impl fmt::Display for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

fn port_from_number_or_string<'de, D>(d: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Num(u64),
        Str(String),
    }
    let n = match Port::deserialize(d)? {
        Port::Num(n) => n,
        Port::Str(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| de::Error::custom(format!("invalid port {:?}", s)))?,
    };
    u16::try_from(n).map_err(|_| de::Error::custom(format!("port {} out of range", n)))
}

/// Path of the config file `name` inside `config_dir`.
pub fn config_path(name: &str, config_dir: &Path) -> PathBuf {
    config_dir.join(format!("{}.{}", name, CONFIG_EXT))
}

/// Load `<config_dir>/<name>.json`.
pub fn load_config(name: &str, config_dir: &Path) -> Result<DbConfig> {
    let path = config_path(name, config_dir);
    if !path.exists() {
        return Err(
            BackupError::Config(format!("Config file not found: {}", path.display())).into(),
        );
    }

    let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let data: serde_json::Value = serde_json::from_str(&text).map_err(|_| {
        BackupError::Config(format!("Invalid JSON in config file: {}", path.display()))
    })?;

    let obj = data.as_object().ok_or_else(|| {
        BackupError::Config(format!(
            "Invalid config file {}: expected a JSON object",
            path.display()
        ))
    })?;
    let missing: Vec<&str> = REQUIRED_CONFIG_KEYS
        .iter()
        .copied()
        .filter(|k| !obj.contains_key(*k))
        .collect();
    if !missing.is_empty() {
        return Err(
            BackupError::Config(format!("Missing required keys: {}", missing.join(", "))).into(),
        );
    }

    let cfg: DbConfig = serde_json::from_value(data).map_err(|e| {
        BackupError::Config(format!("Invalid config file {}: {}", path.display(), e))
    })?;
    Ok(cfg)
}

/// Engine tunables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackupConfig {
    /// Rows per INSERT batch (>= 1).
    /// Env: SQLBACKUP_BATCH_SIZE (default 1000)
    pub batch_size: usize,

    /// Incremental mode: keep this many newest timestamped dumps.
    /// Env: SQLBACKUP_KEEP (default unset = plain dump to the given path)
    pub keep: Option<usize>,

    /// Issue session-tuning statements (timeouts, packet size) before a push.
    /// Env: SQLBACKUP_SESSION_TUNING = 0|1 (default 1)
    pub session_tuning: bool,

    /// Treat an unterminated trailing statement as an error instead of dropping it.
    /// Env: SQLBACKUP_STRICT_TAIL = 0|1 (default 0)
    pub strict_tail: bool,

    /// Directory with `<name>.json` connection files.
    /// Env: SQLBACKUP_CONFIG_DIR (default <cwd>/configs)
    pub config_dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            keep: None,
            session_tuning: true,
            strict_tail: false,
            config_dir: PathBuf::from(CONFIG_DIR),
        }
    }
}

fn env_flag(s: &str) -> bool {
    let s = s.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}

impl BackupConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.config_dir = std::env::current_dir()
            .map(|d| d.join(CONFIG_DIR))
            .unwrap_or_else(|_| PathBuf::from(CONFIG_DIR));

        if let Ok(v) = std::env::var("SQLBACKUP_BATCH_SIZE") {
            if let Ok(n) = v.trim().parse::<usize>() {
                if n > 0 {
                    cfg.batch_size = n;
                }
            }
        }

        if let Ok(v) = std::env::var("SQLBACKUP_KEEP") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.keep = Some(n);
            }
        }

        if let Ok(v) = std::env::var("SQLBACKUP_SESSION_TUNING") {
            cfg.session_tuning = env_flag(&v);
        }

        if let Ok(v) = std::env::var("SQLBACKUP_STRICT_TAIL") {
            cfg.strict_tail = env_flag(&v);
        }

        if let Ok(v) = std::env::var("SQLBACKUP_CONFIG_DIR") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.config_dir = PathBuf::from(s);
            }
        }

        cfg
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn with_keep(mut self, keep: Option<usize>) -> Self {
        self.keep = keep;
        self
    }

    pub fn with_session_tuning(mut self, on: bool) -> Self {
        self.session_tuning = on;
        self
    }

    pub fn with_strict_tail(mut self, on: bool) -> Self {
        self.strict_tail = on;
        self
    }

    pub fn with_config_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config_dir = dir.into();
        self
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(BackupError::Config("batch_size must be >= 1".into()).into());
        }
        if self.keep == Some(0) {
            return Err(BackupError::Config("keep must be >= 1 in incremental mode".into()).into());
        }
        Ok(())
    }
}

impl fmt::Display for BackupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BackupConfig {{ \
             batch_size: {}, \
             keep: {}, \
             session_tuning: {}, \
             strict_tail: {}, \
             config_dir: {} \
             }}",
            self.batch_size,
            self.keep
                .map(|v| v.to_string())
                .unwrap_or_else(|| "off".to_string()),
            self.session_tuning,
            self.strict_tail,
            self.config_dir.display(),
        )
    }
}
