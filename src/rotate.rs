//! rotate: инкрементальные бэкапы: имена файлов с таймстампом и ротация (BackupRotator).
//!
//! Имя: `<parent>/<yyyyMMdd_HHmmss>_<file name>` (UTC). Префикс фиксированной ширины,
//! поэтому лексикографический порядок имён совпадает с хронологическим.
//! Два дампа в одну секунду получат одно и то же имя: это известное ограничение.
//!
//! cleanup() вызывается ТОЛЬКО после успешной записи нового дампа: упавший
//! посередине дамп не должен удалять старые хорошие копии.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};

/// strftime pattern of the incremental prefix (`20260213_143022`).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Timestamped sibling of `base` for the current UTC time.
pub fn resolve_incremental_path(base: &Path) -> PathBuf {
    resolve_incremental_path_at(base, Utc::now())
}

pub fn resolve_incremental_path_at(base: &Path, now: DateTime<Utc>) -> PathBuf {
    let name = file_name(base);
    let stamped = format!("{}_{}", now.format(TIMESTAMP_FORMAT), name);
    parent_dir(base).join(stamped)
}

/// Existing incremental backups of `base`, oldest first.
///
/// Matches regular, non-hidden files named `*_<file name>` in the parent directory.
pub fn list_backups(base: &Path) -> Result<Vec<PathBuf>> {
    let dir = parent_dir(base);
    let suffix = format!("_{}", file_name(base));

    let mut out = Vec::new();
    let rd = match fs::read_dir(&dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e).with_context(|| format!("read_dir {}", dir.display())),
    };
    for entry in rd {
        let entry = entry.with_context(|| format!("read_dir {}", dir.display()))?;
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(s) => s,
            None => continue,
        };
        if name.starts_with('.') || !name.ends_with(&suffix) {
            continue;
        }
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        out.push(entry.path());
    }
    out.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(out)
}

/// Delete all but the newest `keep` incremental backups of `base`. Returns removed paths.
pub fn cleanup(base: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let backups = list_backups(base)?;
    let excess = backups.len().saturating_sub(keep);
    let mut removed = Vec::with_capacity(excess);
    for old in backups.into_iter().take(excess) {
        fs::remove_file(&old).with_context(|| format!("remove old backup {}", old.display()))?;
        debug!("rotate: removed {}", old.display());
        removed.push(old);
    }
    if !removed.is_empty() {
        info!("rotate: removed {} old backup(s), keep={}", removed.len(), keep);
    }
    Ok(removed)
}

fn file_name(base: &Path) -> String {
    base.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn parent_dir(base: &Path) -> PathBuf {
    match base.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    fn unique_root(prefix: &str) -> PathBuf {
        let pid = std::process::id();
        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("sqlbtest-rotate-{prefix}-{pid}-{t}-{id}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn incremental_name_format() {
        let now = Utc.with_ymd_and_hms(2026, 2, 13, 14, 30, 22).unwrap();
        let p = resolve_incremental_path_at(Path::new("backups/db.sql"), now);
        assert_eq!(p, PathBuf::from("backups/20260213_143022_db.sql"));

        let p = resolve_incremental_path_at(Path::new("db.sql"), now);
        assert_eq!(p, PathBuf::from("./20260213_143022_db.sql"));
    }

    #[test]
    fn list_is_sorted_and_filtered() {
        let dir = unique_root("list");
        for n in [
            "20260102_000000_db.sql",
            "20260101_000000_db.sql",
            "db.sql",
            "20260101_000000_other.sql",
            ".20260103_000000_db.sql.partial",
        ] {
            fs::write(dir.join(n), b"x").unwrap();
        }
        fs::create_dir_all(dir.join("20260104_000000_db.sql")).unwrap();

        let got: Vec<String> = list_backups(&dir.join("db.sql"))
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(got, vec!["20260101_000000_db.sql", "20260102_000000_db.sql"]);
    }

    #[test]
    fn cleanup_keeps_newest() {
        let dir = unique_root("keep");
        let base = dir.join("db.sql");
        for day in 1..=5 {
            fs::write(dir.join(format!("202601{:02}_120000_db.sql", day)), b"x").unwrap();
        }
        let removed = cleanup(&base, 2).unwrap();
        assert_eq!(removed.len(), 3);
        let left = list_backups(&base).unwrap();
        assert_eq!(left.len(), 2);
        assert!(left[0].ends_with("20260104_120000_db.sql"));
        assert!(left[1].ends_with("20260105_120000_db.sql"));
    }

    #[test]
    fn cleanup_fewer_than_keep_is_noop() {
        let dir = unique_root("few");
        let base = dir.join("db.sql");
        fs::write(dir.join("20260101_000000_db.sql"), b"x").unwrap();
        assert!(cleanup(&base, 5).unwrap().is_empty());
        assert_eq!(list_backups(&base).unwrap().len(), 1);
    }

    #[test]
    fn missing_dir_lists_nothing() {
        let dir = unique_root("missing").join("nope");
        assert!(list_backups(&dir.join("db.sql")).unwrap().is_empty());
    }
}
