//! dump: потоковая запись SQL-дампа (TableDumper).
//!
//! Формат документа:
//! ```text
//! -- sqlbackup dump
//! -- Database: <name>
//! -- Date: <yyyy-mm-dd HH:MM:SS UTC>
//!
//! SET FOREIGN_KEY_CHECKS = 0;
//!
//! DROP TABLE IF EXISTS `t`;
//!
//! CREATE TABLE `t` (...);
//!
//! INSERT INTO `t` (`a`, `b`) VALUES
//! (1, 'x'),
//! (2, 'y');
//!
//! SET FOREIGN_KEY_CHECKS = 1;
//! ```
//!
//! В памяти одновременно находится не больше одного батча: батч рендерится в буфер,
//! проверяется целиком (арность, кодируемость) и только потом пишется в sink.
//! Ошибка записи в sink прерывает дамп сразу.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::error::BackupError;
use crate::source::DataSource;
use crate::value::{write_row, RowBatch};

/// Rows per INSERT statement unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

const HEADER_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Schema of one table as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    /// Column names; order defines row field order.
    pub columns: Vec<String>,
    /// `CREATE TABLE ...` text, opaque here.
    pub ddl: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub rows: u64,
    pub inserts: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpStats {
    pub tables: usize,
    pub rows: u64,
    pub inserts: u64,
}

/// Backtick-quote an identifier; embedded backticks are doubled (as in SHOW CREATE TABLE).
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

pub fn write_header<W: Write + ?Sized>(w: &mut W, database: &str, now: DateTime<Utc>) -> Result<()> {
    write!(
        w,
        "-- sqlbackup dump\n-- Database: {}\n-- Date: {}\n\nSET FOREIGN_KEY_CHECKS = 0;\n\n",
        database,
        now.format(HEADER_DATE_FORMAT)
    )
    .context("write dump header")?;
    Ok(())
}

pub fn write_footer<W: Write + ?Sized>(w: &mut W) -> Result<()> {
    w.write_all(b"SET FOREIGN_KEY_CHECKS = 1;\n")
        .context("write dump footer")?;
    Ok(())
}

/// Write DROP, DDL and INSERT blocks for one table.
///
/// With an empty column list the batch source is never pulled and no INSERT is written.
pub fn dump_table<W, I>(w: &mut W, schema: &TableSchema, batches: I) -> Result<TableStats>
where
    W: Write + ?Sized,
    I: IntoIterator<Item = Result<RowBatch>>,
{
    let table = quote_ident(&schema.name);
    write!(w, "DROP TABLE IF EXISTS {};\n\n", table)
        .with_context(|| format!("write DROP for {}", table))?;
    write!(w, "{};\n\n", schema.ddl).with_context(|| format!("write DDL for {}", table))?;

    let mut stats = TableStats::default();
    if schema.columns.is_empty() {
        debug!("dump: table {} has no columns, skipping data", table);
        return Ok(stats);
    }

    let col_list = schema
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let insert_head = format!("INSERT INTO {} ({}) VALUES\n", table, col_list);

    for batch in batches {
        let batch = batch.with_context(|| format!("read rows of {}", table))?;
        if batch.is_empty() {
            continue;
        }
        let text = render_insert(&insert_head, schema, &batch)?;
        w.write_all(text.as_bytes())
            .with_context(|| format!("write INSERT for {}", table))?;
        stats.rows += batch.len() as u64;
        stats.inserts += 1;
        debug!("dump: {} +{} row(s), total {}", table, batch.len(), stats.rows);
    }
    Ok(stats)
}

fn render_insert(head: &str, schema: &TableSchema, batch: &RowBatch) -> Result<String> {
    let mut out = String::with_capacity(head.len() + batch.len() * 32);
    out.push_str(head);
    for (i, row) in batch.iter().enumerate() {
        if row.len() != schema.columns.len() {
            return Err(BackupError::ColumnMismatch {
                table: schema.name.clone(),
                expected: schema.columns.len(),
                got: row.len(),
            }
            .into());
        }
        if let Some(pos) = row.iter().position(|v| !v.is_encodable()) {
            return Err(BackupError::UnsupportedValue {
                table: schema.name.clone(),
                column: schema.columns[pos].clone(),
                detail: format!("{} value {:?} has no SQL literal", row[pos].kind(), row[pos]),
            }
            .into());
        }
        if i > 0 {
            out.push_str(",\n");
        }
        write_row(&mut out, row);
    }
    out.push_str(";\n\n");
    Ok(out)
}

/// Dump every table of `source` (in source order) between header and footer.
pub fn dump_database<S, W>(
    source: &mut S,
    w: &mut W,
    database: &str,
    batch_size: usize,
) -> Result<DumpStats>
where
    S: DataSource + ?Sized,
    W: Write + ?Sized,
{
    write_header(w, database, Utc::now())?;

    let tables = source.list_tables().context("list tables")?;
    info!("dump: database={}, tables={}, batch_size={}", database, tables.len(), batch_size);

    let mut stats = DumpStats::default();
    for name in &tables {
        let schema = source
            .table_schema(name)
            .with_context(|| format!("read schema of `{}`", name))?;
        // Для таблицы без колонок даже не открываем курсор
        let batches = if schema.columns.is_empty() {
            None
        } else {
            Some(source.stream_rows(name, batch_size)?)
        };
        let t = dump_table(w, &schema, batches.into_iter().flatten())?;
        stats.tables += 1;
        stats.rows += t.rows;
        stats.inserts += t.inserts;
    }

    write_footer(w)?;
    w.flush().context("flush dump")?;

    info!(
        "dump: done tables={}, rows={}, inserts={}",
        stats.tables, stats.rows, stats.inserts
    );
    Ok(stats)
}
