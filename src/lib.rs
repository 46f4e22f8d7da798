//! sqlbackup: потоковый dump/restore SQL-баз в текстовые скрипты.
//!
//! Dump: DataSource → (батчи строк) → форматированный SQL-текст в Write.
//! Push: BufRead → StatementSplitter → StatementExecutor.

// Базовые модули
pub mod config;
pub mod error;
pub mod value;

// Движок
pub mod dump;
pub mod restore;
pub mod rotate;
pub mod splitter;

// Коллабораторы: DataSource / StatementExecutor / Connector + backends
pub mod source; // src/source/{mod,memory,server}.rs

// Оркестрация (файлы, локи, ротация)
pub mod backup;
pub mod lock;

// Утилиты (now_nanos, fsync_parent_dir, partial_path)
pub mod util; // src/util/mod.rs

// Удобные реэкспорты
pub use backup::{backup_database, push_database};
pub use config::{load_config, BackupConfig, DbConfig};
pub use dump::{dump_database, dump_table, DumpStats, TableSchema, DEFAULT_BATCH_SIZE};
pub use error::BackupError;
pub use restore::{restore, RestoreStats, SESSION_TUNING};
pub use rotate::{cleanup, list_backups, resolve_incremental_path};
pub use source::{BatchStream, Connector, DataSource, StatementExecutor};
pub use splitter::{split_str, Statement, StatementSplitter};
pub use value::{format_value, Row, RowBatch, Value};
