//! Domain error kinds.
//!
//! Everything in the crate returns `anyhow::Result`; the kinds below are raised as
//! `anyhow::Error::new(BackupError::...)` so callers (CLI, tests) can tell them apart
//! with `err.downcast_ref::<BackupError>()`. Plain I/O failures are not wrapped and
//! travel as `std::io::Error` with a path context attached.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    /// Non-incremental dump target is already present; we never overwrite it.
    #[error("Backup file already exists: {}", path.display())]
    DestinationExists { path: PathBuf },

    /// A value that has no SQL literal (e.g. NaN) or a server type we do not map.
    #[error("unsupported value in `{table}`.`{column}`: {detail}")]
    UnsupportedValue {
        table: String,
        column: String,
        detail: String,
    },

    /// Row arity differs from the table's column list.
    #[error("table `{table}`: row has {got} value(s), expected {expected}")]
    ColumnMismatch {
        table: String,
        expected: usize,
        got: usize,
    },

    #[error("SQL file not found: {}", path.display())]
    SqlFileNotFound { path: PathBuf },

    /// The executor rejected a main (non session-tuning) statement.
    #[error("statement #{index} failed: {message} (statement: {preview})")]
    ExecutionFailure {
        index: usize,
        preview: String,
        message: String,
    },

    /// Strict mode only: input ended while a statement was still being accumulated.
    #[error("input ended inside an unterminated statement ({pending_lines} pending line(s) from line {first_line})")]
    TruncatedInput {
        pending_lines: usize,
        first_line: usize,
    },

    #[error("{0}")]
    Config(String),
}

impl BackupError {
    /// Short single-line preview of a statement for error messages.
    pub fn preview(sql: &str) -> String {
        const MAX: usize = 80;
        let first = sql.lines().next().unwrap_or("");
        let mut out: String = first.chars().take(MAX).collect();
        if first.chars().count() > MAX || sql.contains('\n') {
            out.push_str("...");
        }
        out
    }
}
