//! restore: выполнение потока SQL-выражений через StatementExecutor.
//!
//! Порядок:
//! 1) (опционально) session-tuning: таймауты и max_allowed_packet. Ошибки этих
//!    выражений только логируются (warn), сервер может их не поддерживать/запрещать.
//! 2) основные выражения строго по порядку; первая ошибка прерывает прогон
//!    (BackupError::ExecutionFailure с порядковым номером и превью выражения).
//!
//! Ошибки самого потока (I/O, TruncatedInput в strict-режиме) пробрасываются как есть.

use anyhow::Result;
use log::{debug, info, warn};

use crate::error::BackupError;
use crate::source::StatementExecutor;
use crate::splitter::Statement;

/// Session settings issued before a push.
pub const SESSION_TUNING: [&str; 4] = [
    "SET SESSION wait_timeout = 28800",
    "SET SESSION net_read_timeout = 600",
    "SET SESSION net_write_timeout = 600",
    "SET SESSION max_allowed_packet = 1073741824",
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreStats {
    /// Main statements executed successfully.
    pub statements: usize,
    pub tuning_applied: usize,
    pub tuning_failed: usize,
}

/// Best-effort session tuning. Returns (applied, failed).
pub fn apply_session_tuning<E>(exec: &mut E) -> (usize, usize)
where
    E: StatementExecutor + ?Sized,
{
    let mut applied = 0;
    let mut failed = 0;
    for sql in SESSION_TUNING {
        match exec.execute(sql) {
            Ok(()) => applied += 1,
            Err(e) => {
                warn!("restore: session tuning '{}' failed: {:#}", sql, e);
                failed += 1;
            }
        }
    }
    (applied, failed)
}

/// Execute `statements` in order. Stops at the first failure.
pub fn restore<E, I>(exec: &mut E, statements: I, session_tuning: bool) -> Result<RestoreStats>
where
    E: StatementExecutor + ?Sized,
    I: IntoIterator<Item = Result<Statement>>,
{
    let mut stats = RestoreStats::default();
    if session_tuning {
        let (applied, failed) = apply_session_tuning(exec);
        stats.tuning_applied = applied;
        stats.tuning_failed = failed;
    }

    for (i, stmt) in statements.into_iter().enumerate() {
        let stmt = stmt?;
        let index = i + 1;
        if let Err(e) = exec.execute(&stmt) {
            return Err(BackupError::ExecutionFailure {
                index,
                preview: BackupError::preview(&stmt),
                message: format!("{:#}", e),
            }
            .into());
        }
        debug!("restore: #{} ok (line {})", index, stmt.line);
        stats.statements += 1;
    }

    info!(
        "restore: done statements={}, tuning={}/{}",
        stats.statements,
        stats.tuning_applied,
        SESSION_TUNING.len()
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::split_str;
    use anyhow::bail;

    /// Records statements, fails on those starting with a prefix.
    #[derive(Default)]
    struct Recorder {
        seen: Vec<String>,
        fail_prefix: Option<&'static str>,
    }

    impl StatementExecutor for Recorder {
        fn execute(&mut self, sql: &str) -> Result<()> {
            self.seen.push(sql.to_string());
            if let Some(p) = self.fail_prefix {
                if sql.starts_with(p) {
                    bail!("rejected");
                }
            }
            Ok(())
        }
    }

    #[test]
    fn tuning_then_statements_in_order() {
        let mut r = Recorder::default();
        let stmts = split_str("CREATE TABLE a (x INT);\nINSERT INTO a (x) VALUES (1);\n").unwrap();
        let stats = restore(&mut r, stmts.into_iter().map(Ok), true).unwrap();
        assert_eq!(stats.statements, 2);
        assert_eq!(stats.tuning_applied, 4);
        assert_eq!(&r.seen[..4], &SESSION_TUNING[..]);
        assert_eq!(r.seen[4], "CREATE TABLE a (x INT)");
        assert_eq!(r.seen[5], "INSERT INTO a (x) VALUES (1)");
    }

    #[test]
    fn tuning_failures_are_swallowed() {
        let mut r = Recorder {
            fail_prefix: Some("SET SESSION"),
            ..Default::default()
        };
        let stmts = split_str("SELECT 1;").unwrap();
        let stats = restore(&mut r, stmts.into_iter().map(Ok), true).unwrap();
        assert_eq!(stats.tuning_failed, 4);
        assert_eq!(stats.statements, 1);
    }

    #[test]
    fn no_tuning_when_disabled() {
        let mut r = Recorder::default();
        let stats = restore(&mut r, Vec::<Result<Statement>>::new(), false).unwrap();
        assert_eq!(stats, RestoreStats::default());
        assert!(r.seen.is_empty());
    }

    #[test]
    fn first_failure_aborts_with_index() {
        let mut r = Recorder {
            fail_prefix: Some("DROP"),
            ..Default::default()
        };
        let stmts = split_str("SELECT 1;\nDROP TABLE x;\nSELECT 2;\n").unwrap();
        let err = restore(&mut r, stmts.into_iter().map(Ok), false).unwrap_err();
        match err.downcast_ref::<BackupError>() {
            Some(BackupError::ExecutionFailure { index, preview, .. }) => {
                assert_eq!(*index, 2);
                assert_eq!(preview, "DROP TABLE x");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(r.seen.len(), 2);
    }
}
