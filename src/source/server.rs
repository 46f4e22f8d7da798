//! MySQL/MariaDB backend over the `mysql` crate (feature `mysql`).
//!
//! Text protocol only: every non-NULL value arrives as bytes and is mapped by the
//! column metadata:
//! - integer types → Integer (unsigned beyond i64 → Text, decimal digits preserved);
//! - FLOAT/DOUBLE → Float;
//! - BIT, and string/blob types with the binary charset (63) → Bytes;
//! - everything else → Text (invalid UTF-8 → Bytes).
//!
//! Rows are read with an unbuffered `query_iter`, so only the current batch is resident.

use anyhow::{anyhow, Context, Result};
use log::debug;
use mysql::consts::{ColumnFlags, ColumnType};
use mysql::prelude::Queryable;
use mysql::{Column, Conn, OptsBuilder};

use super::{Batches, BatchStream, Connector, DataSource, StatementExecutor};
use crate::config::DbConfig;
use crate::dump::quote_ident;
use crate::error::BackupError;
use crate::value::{Row, Value};

const BINARY_CHARSET: u16 = 63;

/// Opens TCP sessions with `utf8mb4` as the connection charset.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

impl Connector for MySqlConnector {
    type Session = MySqlSession;

    fn connect(&self, cfg: &DbConfig) -> Result<MySqlSession> {
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(cfg.host.clone()))
            .tcp_port(cfg.port)
            .user(Some(cfg.user.clone()))
            .pass(Some(cfg.password.clone()))
            .db_name(Some(cfg.database.clone()))
            .init(vec!["SET NAMES utf8mb4"]);
        let conn = Conn::new(opts).with_context(|| format!("mysql connect {}", cfg))?;
        debug!("mysql: connected {}", cfg);
        Ok(MySqlSession { conn })
    }
}

/// One server connection; closed when dropped.
pub struct MySqlSession {
    conn: Conn,
}

impl DataSource for MySqlSession {
    fn list_tables(&mut self) -> Result<Vec<String>> {
        let names: Vec<String> = self.conn.query("SHOW TABLES").context("SHOW TABLES")?;
        Ok(names)
    }

    fn get_ddl(&mut self, table: &str) -> Result<String> {
        let sql = format!("SHOW CREATE TABLE {}", quote_ident(table));
        let row: mysql::Row = self
            .conn
            .query_first(&sql)
            .with_context(|| sql.clone())?
            .ok_or_else(|| anyhow!("{}: empty result", sql))?;
        let ddl: Option<String> = row.get(1);
        ddl.ok_or_else(|| anyhow!("{}: no DDL column", sql))
    }

    fn get_columns(&mut self, table: &str) -> Result<Vec<String>> {
        let sql = format!("SELECT * FROM {} LIMIT 0", quote_ident(table));
        let result = self.conn.query_iter(&sql).with_context(|| sql.clone())?;
        let columns = result
            .columns()
            .as_ref()
            .iter()
            .map(|c| c.name_str().into_owned())
            .collect();
        Ok(columns)
    }

    fn stream_rows<'a>(&'a mut self, table: &str, batch_size: usize) -> Result<BatchStream<'a>> {
        let sql = format!("SELECT * FROM {}", quote_ident(table));
        let result = self.conn.query_iter(&sql).with_context(|| sql.clone())?;
        let table = table.to_string();
        let rows = result.map(move |r| {
            let row = r.with_context(|| format!("read row of `{}`", table))?;
            convert_row(&table, row)
        });
        Ok(Box::new(Batches::new(rows, batch_size)))
    }
}

impl StatementExecutor for MySqlSession {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.conn.query_drop(sql)?;
        Ok(())
    }
}

fn convert_row(table: &str, row: mysql::Row) -> Result<Row> {
    let columns = row.columns();
    let values = row.unwrap();
    columns
        .iter()
        .zip(values)
        .map(|(col, v)| convert_value(table, col, v))
        .collect()
}

fn convert_value(table: &str, col: &Column, v: mysql::Value) -> Result<Value> {
    let unsupported = |detail: String| -> anyhow::Error {
        BackupError::UnsupportedValue {
            table: table.to_string(),
            column: col.name_str().into_owned(),
            detail,
        }
        .into()
    };

    let bytes = match v {
        mysql::Value::NULL => return Ok(Value::Null),
        mysql::Value::Int(i) => return Ok(Value::Integer(i)),
        mysql::Value::UInt(u) => {
            return Ok(i64::try_from(u)
                .map(Value::Integer)
                .unwrap_or_else(|_| Value::Text(u.to_string())))
        }
        mysql::Value::Float(f) => return Ok(Value::Float(f as f64)),
        mysql::Value::Double(f) => return Ok(Value::Float(f)),
        mysql::Value::Date(y, mo, d, h, mi, s, us) => {
            return Ok(Value::Text(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                y, mo, d, h, mi, s, us
            )))
        }
        mysql::Value::Time(neg, days, h, mi, s, us) => {
            let hours = days * 24 + u32::from(h);
            return Ok(Value::Text(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                if neg { "-" } else { "" },
                hours,
                mi,
                s,
                us
            )));
        }
        mysql::Value::Bytes(b) => b,
    };

    match col.column_type() {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => {
            let s = std::str::from_utf8(&bytes)
                .map_err(|_| unsupported("non-ASCII integer".into()))?;
            if let Ok(i) = s.parse::<i64>() {
                Ok(Value::Integer(i))
            } else if col.flags().contains(ColumnFlags::UNSIGNED_FLAG) && s.parse::<u64>().is_ok() {
                Ok(Value::Text(s.to_string()))
            } else {
                Err(unsupported(format!("invalid integer {:?}", s)))
            }
        }
        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
            let s = std::str::from_utf8(&bytes).map_err(|_| unsupported("non-ASCII float".into()))?;
            s.parse::<f64>()
                .map(Value::Float)
                .map_err(|_| unsupported(format!("invalid float {:?}", s)))
        }
        ColumnType::MYSQL_TYPE_BIT => Ok(Value::Bytes(bytes)),
        ColumnType::MYSQL_TYPE_VARCHAR
        | ColumnType::MYSQL_TYPE_VAR_STRING
        | ColumnType::MYSQL_TYPE_STRING
        | ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_GEOMETRY
            if col.character_set() == BINARY_CHARSET =>
        {
            Ok(Value::Bytes(bytes))
        }
        _ => Ok(text_or_bytes(bytes)),
    }
}

fn text_or_bytes(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(s) => Value::Text(s),
        Err(e) => Value::Bytes(e.into_bytes()),
    }
}
