//! source: внешние коллабораторы движка dump/restore.
//!
//! - [`DataSource`]: перечисление таблиц, DDL, колонки и ленивый поток батчей строк.
//! - [`StatementExecutor`]: выполнение одного SQL-выражения (commit: на стороне исполнителя).
//! - [`Connector`]: открывает сессию (scoped): сессия закрывается в Drop на любом пути выхода.
//!
//! Реализации:
//! - [`memory`]: in-memory база (тесты, dry-run);
//! - `server`: MySQL/MariaDB через crate `mysql` (фича `mysql`).

use anyhow::Result;

use crate::config::DbConfig;
use crate::dump::TableSchema;
use crate::value::{Row, RowBatch};

pub mod memory;
#[cfg(feature = "mysql")]
pub mod server;

/// Lazy sequence of row batches for one table. Borrows the source while alive.
pub type BatchStream<'a> = Box<dyn Iterator<Item = Result<RowBatch>> + 'a>;

pub trait DataSource {
    /// Table names in the order the server reports them.
    fn list_tables(&mut self) -> Result<Vec<String>>;

    /// `CREATE TABLE ...` text, without a trailing `;`.
    fn get_ddl(&mut self, table: &str) -> Result<String>;

    /// Column names in row order.
    fn get_columns(&mut self, table: &str) -> Result<Vec<String>>;

    /// Rows of `table`, at most `batch_size` per batch, no empty batches.
    fn stream_rows<'a>(&'a mut self, table: &str, batch_size: usize) -> Result<BatchStream<'a>>;

    fn table_schema(&mut self, table: &str) -> Result<TableSchema> {
        let ddl = self.get_ddl(table)?;
        let columns = self.get_columns(table)?;
        Ok(TableSchema {
            name: table.to_string(),
            columns,
            ddl,
        })
    }
}

pub trait StatementExecutor {
    fn execute(&mut self, sql: &str) -> Result<()>;
}

/// Opens sessions against a database described by [`DbConfig`].
pub trait Connector {
    type Session: DataSource + StatementExecutor;

    fn connect(&self, cfg: &DbConfig) -> Result<Self::Session>;
}

/// Groups a row iterator into batches of up to `size` rows.
///
/// The first row error ends the stream: it is yielded after nothing else (the rows
/// collected so far for the current batch are dropped) and iteration stops.
pub struct Batches<I> {
    rows: I,
    size: usize,
    done: bool,
}

impl<I> Batches<I>
where
    I: Iterator<Item = Result<Row>>,
{
    pub fn new(rows: I, size: usize) -> Self {
        Self {
            rows,
            size: size.max(1),
            done: false,
        }
    }
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<RowBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut batch = Vec::with_capacity(self.size.min(1024));
        while batch.len() < self.size {
            match self.rows.next() {
                Some(Ok(row)) => batch.push(row),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use anyhow::anyhow;

    fn rows(n: i64) -> impl Iterator<Item = Result<Row>> {
        (0..n).map(|i| Ok(vec![Value::Integer(i)]))
    }

    #[test]
    fn batches_split_evenly_and_remainder() {
        let sizes: Vec<usize> = Batches::new(rows(7), 3)
            .map(|b| b.map(|b| b.len()))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(sizes, vec![3, 3, 1]);

        let sizes: Vec<usize> = Batches::new(rows(6), 3)
            .map(|b| b.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![3, 3]);
    }

    #[test]
    fn batches_empty_source_yields_nothing() {
        assert_eq!(Batches::new(rows(0), 10).count(), 0);
    }

    #[test]
    fn batches_zero_size_is_clamped() {
        assert_eq!(Batches::new(rows(2), 0).count(), 2);
    }

    #[test]
    fn batches_stop_after_error() {
        let src = vec![
            Ok(vec![Value::Integer(1)]),
            Err(anyhow!("boom")),
            Ok(vec![Value::Integer(2)]),
        ];
        let mut it = Batches::new(src.into_iter(), 10);
        assert!(it.next().unwrap().is_err());
        assert!(it.next().is_none());
    }
}
