//! util: общие утилиты.
//!
//! Содержит:
//! - now_nanos(): Unix-время в наносекундах (для уникальных имён временных файлов).
//! - fsync_parent_dir(): fsync каталога после rename (best-effort на не-unix).
//! - partial_path(): имя временного файла дампа рядом с целевым.

use std::path::{Path, PathBuf};

/// Текущее Unix-время в наносекундах.
#[inline]
pub fn now_nanos() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

#[cfg(unix)]
pub fn fsync_parent_dir(path: &Path) -> std::io::Result<()> {
    use std::fs::File;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }
    }
    Ok(())
}
#[cfg(not(unix))]
pub fn fsync_parent_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Hidden sibling the dump is written to before the final rename:
/// `dir/name.sql` → `dir/.name.sql.partial`.
pub fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.partial", name))
}
