//! backup: оркестрация, dump базы в файл и push файла в базу.
//!
//! backup_database():
//! - инкрементальный режим (cfg.keep = Some(k)): целевой путь = `<dir>/<yyyyMMdd_HHmmss>_<name>`;
//!   иначе существующий файл не перезаписывается (BackupError::DestinationExists);
//! - родительские каталоги создаются; на каталог берётся advisory lock (fs2);
//! - дамп пишется в скрытый `.<name>.partial` рядом с целевым, затем
//!   flush + fsync → rename → fsync каталога. Упавший дамп не оставляет файла под целевым именем;
//! - ротация (cleanup): только после успешного rename.
//!
//! push_database():
//! - SqlFileNotFound, если файла нет (до подключения к серверу);
//! - файл читается построчно (BufReader), выражения выполняются по мере разбора.
//!
//! Сессия открывается через Connector и закрывается в Drop на любом пути выхода.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::{BackupConfig, DbConfig};
use crate::dump::{dump_database, DumpStats};
use crate::error::BackupError;
use crate::lock::acquire_dir_lock;
use crate::restore::{restore, RestoreStats};
use crate::rotate::{cleanup, resolve_incremental_path};
use crate::source::{Connector, DataSource};
use crate::splitter::StatementSplitter;
use crate::util::{fsync_parent_dir, partial_path};

/// Dump the database described by `db` into `output`. Returns the path actually written.
pub fn backup_database<C>(
    connector: &C,
    db: &DbConfig,
    output: &Path,
    cfg: &BackupConfig,
) -> Result<PathBuf>
where
    C: Connector + ?Sized,
{
    cfg.validate()?;

    let target = match cfg.keep {
        Some(_) => resolve_incremental_path(output),
        None => {
            if output.exists() {
                return Err(BackupError::DestinationExists {
                    path: output.to_path_buf(),
                }
                .into());
            }
            output.to_path_buf()
        }
    };

    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("create backup dir {}", dir.display()))?;
    let _lock = acquire_dir_lock(&dir)?;

    // Повторная проверка под локом: параллельный запуск мог успеть записать файл
    if cfg.keep.is_none() && target.exists() {
        return Err(BackupError::DestinationExists { path: target }.into());
    }

    info!("backup: {} -> {}", db, target.display());
    let mut session = connector
        .connect(db)
        .with_context(|| format!("connect to {}", db))?;

    let partial = partial_path(&target);
    let stats = match write_dump(&mut session, &partial, &db.database, cfg.batch_size) {
        Ok(s) => s,
        Err(e) => {
            if let Err(rm) = fs::remove_file(&partial) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!("backup: cannot remove {}: {}", partial.display(), rm);
                }
            }
            return Err(e);
        }
    };
    drop(session);

    fs::rename(&partial, &target)
        .with_context(|| format!("rename {} -> {}", partial.display(), target.display()))?;
    fsync_parent_dir(&target).with_context(|| format!("fsync dir of {}", target.display()))?;

    info!(
        "backup: wrote {} (tables={}, rows={}, inserts={})",
        target.display(),
        stats.tables,
        stats.rows,
        stats.inserts
    );

    if let Some(keep) = cfg.keep {
        cleanup(output, keep)?;
    }
    Ok(target)
}

fn write_dump<S>(source: &mut S, path: &Path, database: &str, batch_size: usize) -> Result<DumpStats>
where
    S: DataSource + ?Sized,
{
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    let stats = dump_database(source, &mut w, database, batch_size)?;
    w.flush().with_context(|| format!("flush {}", path.display()))?;
    let f = w
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("flush {}", path.display()))?;
    f.sync_all().with_context(|| format!("fsync {}", path.display()))?;
    Ok(stats)
}

/// Execute every statement of `sql_path` against the database described by `db`.
pub fn push_database<C>(
    connector: &C,
    db: &DbConfig,
    sql_path: &Path,
    cfg: &BackupConfig,
) -> Result<RestoreStats>
where
    C: Connector + ?Sized,
{
    if !sql_path.is_file() {
        return Err(BackupError::SqlFileNotFound {
            path: sql_path.to_path_buf(),
        }
        .into());
    }
    let f = File::open(sql_path).with_context(|| format!("open {}", sql_path.display()))?;
    let statements = StatementSplitter::new(BufReader::new(f)).strict_tail(cfg.strict_tail);

    info!("push: {} -> {}", sql_path.display(), db);
    let mut session = connector
        .connect(db)
        .with_context(|| format!("connect to {}", db))?;
    let stats = restore(&mut session, statements, cfg.session_tuning)
        .with_context(|| format!("push {}", sql_path.display()))?;

    info!("push: done {} statement(s)", stats.statements);
    Ok(stats)
}
