//! memory: in-memory база для тестов и dry-run.
//!
//! Понимает ровно тот диалект, который пишет dump:
//! - `SET ...` (принимается и логируется);
//! - ``DROP TABLE IF EXISTS `t` ``;
//! - ``CREATE TABLE `t` (...)``: имена и грубые типы колонок берутся из тела DDL;
//! - ``INSERT INTO `t` (`a`, `b`) VALUES (...), (...)`` с литералами NULL, числами,
//!   `X'..'` и строками в одинарных кавычках (MySQL-экранирование через `\`).
//!
//! Литерал приводится к типу колонки: 0/1 в BOOL-колонке → Boolean, целое в
//! FLOAT/DOUBLE → Float. Этого хватает, чтобы dump → push возвращал те же строки.
//!
//! [`MemoryConnector`] раздаёт сессии над общей базой (Arc<Mutex<..>>) и считает
//! открытые/закрытые сессии: тесты проверяют, что сессия освобождается на любом пути.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, bail, Context, Result};
use log::debug;

use super::{Batches, BatchStream, Connector, DataSource, StatementExecutor};
use crate::config::DbConfig;
use crate::value::{Row, Value};

/// Coarse column type, only what literal coercion needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Boolean,
    Integer,
    Float,
    Bytes,
    Text,
}

impl ColumnKind {
    fn from_type_name(ty: &str) -> Self {
        let ty = ty.to_ascii_uppercase();
        if ty.starts_with("BOOL") {
            ColumnKind::Boolean
        } else if ty.contains("INT") {
            ColumnKind::Integer
        } else if ty.starts_with("FLOAT") || ty.starts_with("DOUBLE") || ty.starts_with("REAL") {
            ColumnKind::Float
        } else if ty.contains("BLOB") || ty.contains("BINARY") {
            ColumnKind::Bytes
        } else {
            ColumnKind::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    pub name: String,
    pub columns: Vec<String>,
    pub kinds: Vec<ColumnKind>,
    pub ddl: String,
    pub rows: Vec<Row>,
}

#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: Vec<MemoryTable>,
    executed: Vec<String>,
    fail_on: Option<String>,
    refuse_connect: bool,
    sessions_opened: usize,
    sessions_closed: usize,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table from its DDL and fill it with `rows`.
    pub fn add_table(&mut self, ddl: &str, rows: Vec<Row>) -> Result<()> {
        let mut table = parse_create_table(ddl)?;
        if self.table(&table.name).is_some() {
            bail!("table `{}` already exists", table.name);
        }
        for row in &rows {
            if row.len() != table.columns.len() {
                bail!(
                    "table `{}`: row has {} value(s), expected {}",
                    table.name,
                    row.len(),
                    table.columns.len()
                );
            }
        }
        table.rows = rows;
        self.tables.push(table);
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn tables(&self) -> &[MemoryTable] {
        &self.tables
    }

    /// Every statement passed to `execute`, in order (including rejected ones).
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Make `execute` fail for any statement containing `needle`.
    pub fn fail_on<S: Into<String>>(&mut self, needle: Option<S>) {
        self.fail_on = needle.map(Into::into);
    }

    /// Make `MemoryConnector::connect` fail.
    pub fn refuse_connect(&mut self, on: bool) {
        self.refuse_connect = on;
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened
    }

    pub fn sessions_closed(&self) -> usize {
        self.sessions_closed
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable> {
        self.tables
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| anyhow!("Table '{}' doesn't exist", name))
    }

    fn find(&self, name: &str) -> Result<&MemoryTable> {
        self.table(name)
            .ok_or_else(|| anyhow!("Table '{}' doesn't exist", name))
    }

    fn apply(&mut self, sql: &str) -> Result<()> {
        let sql = sql.trim();
        let upper_head: String = sql.chars().take(32).collect::<String>().to_ascii_uppercase();

        if upper_head.starts_with("SET ") {
            return Ok(());
        }
        if upper_head.starts_with("DROP TABLE IF EXISTS ") {
            let mut cur = Cursor::new(&sql["DROP TABLE IF EXISTS ".len()..]);
            let name = cur.ident()?;
            cur.expect_end()?;
            self.tables.retain(|t| t.name != name);
            return Ok(());
        }
        if upper_head.starts_with("CREATE TABLE ") {
            let table = parse_create_table(sql)?;
            if self.table(&table.name).is_some() {
                bail!("Table '{}' already exists", table.name);
            }
            self.tables.push(table);
            return Ok(());
        }
        if upper_head.starts_with("INSERT INTO ") {
            return self.apply_insert(&sql["INSERT INTO ".len()..]);
        }
        bail!("unsupported statement: {}", sql.lines().next().unwrap_or(""))
    }

    fn apply_insert(&mut self, rest: &str) -> Result<()> {
        let mut cur = Cursor::new(rest);
        let name = cur.ident()?;
        cur.expect('(')?;
        let mut cols = Vec::new();
        loop {
            cols.push(cur.ident()?);
            if !cur.eat(',') {
                break;
            }
        }
        cur.expect(')')?;
        cur.keyword("VALUES")?;

        let table = self.table_mut(&name)?;
        if cols != table.columns {
            bail!(
                "INSERT columns {:?} do not match table `{}` columns {:?}",
                cols,
                name,
                table.columns
            );
        }

        let mut new_rows = Vec::new();
        loop {
            cur.expect('(')?;
            let mut row = Vec::with_capacity(cols.len());
            loop {
                let v = cur.literal()?;
                let kind = table.kinds.get(row.len()).copied().unwrap_or(ColumnKind::Text);
                row.push(coerce(v, kind));
                if !cur.eat(',') {
                    break;
                }
            }
            cur.expect(')')?;
            if row.len() != cols.len() {
                bail!("Column count doesn't match value count");
            }
            new_rows.push(row);
            if !cur.eat(',') {
                break;
            }
        }
        cur.expect_end()?;
        table.rows.extend(new_rows);
        Ok(())
    }
}

impl DataSource for MemoryDatabase {
    fn list_tables(&mut self) -> Result<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    fn get_ddl(&mut self, table: &str) -> Result<String> {
        Ok(self.find(table)?.ddl.clone())
    }

    fn get_columns(&mut self, table: &str) -> Result<Vec<String>> {
        Ok(self.find(table)?.columns.clone())
    }

    fn stream_rows<'a>(&'a mut self, table: &str, batch_size: usize) -> Result<BatchStream<'a>> {
        let rows = self.find(table)?.rows.iter().cloned().map(Ok);
        Ok(Box::new(Batches::new(rows, batch_size)))
    }
}

impl StatementExecutor for MemoryDatabase {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.executed.push(sql.to_string());
        if let Some(needle) = &self.fail_on {
            if sql.contains(needle.as_str()) {
                bail!("simulated failure on statement containing {:?}", needle);
            }
        }
        self.apply(sql)
    }
}

/// Hands out sessions over one shared [`MemoryDatabase`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    db: Arc<Mutex<MemoryDatabase>>,
}

impl MemoryConnector {
    pub fn new(db: MemoryDatabase) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Lock the shared database (inspection in tests).
    pub fn db(&self) -> Result<MutexGuard<'_, MemoryDatabase>> {
        lock(&self.db)
    }
}

fn lock(db: &Mutex<MemoryDatabase>) -> Result<MutexGuard<'_, MemoryDatabase>> {
    db.lock().map_err(|_| anyhow!("memory database lock poisoned"))
}

impl Connector for MemoryConnector {
    type Session = MemorySession;

    fn connect(&self, cfg: &DbConfig) -> Result<MemorySession> {
        let mut db = lock(&self.db)?;
        if db.refuse_connect {
            bail!("Can't connect to server on '{}' ({})", cfg.host, cfg.port);
        }
        db.sessions_opened += 1;
        debug!("memory: session opened for {}", cfg);
        Ok(MemorySession {
            db: Arc::clone(&self.db),
        })
    }
}

/// One open session; released (counted) on drop.
pub struct MemorySession {
    db: Arc<Mutex<MemoryDatabase>>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if let Ok(mut db) = self.db.lock() {
            db.sessions_closed += 1;
        }
    }
}

impl DataSource for MemorySession {
    fn list_tables(&mut self) -> Result<Vec<String>> {
        lock(&self.db)?.list_tables()
    }

    fn get_ddl(&mut self, table: &str) -> Result<String> {
        lock(&self.db)?.get_ddl(table)
    }

    fn get_columns(&mut self, table: &str) -> Result<Vec<String>> {
        lock(&self.db)?.get_columns(table)
    }

    fn stream_rows<'a>(&'a mut self, table: &str, batch_size: usize) -> Result<BatchStream<'a>> {
        // копия строк таблицы: блокировку держать на время стрима нельзя
        let rows = lock(&self.db)?.find(table)?.rows.clone();
        Ok(Box::new(Batches::new(rows.into_iter().map(Ok), batch_size)))
    }
}

impl StatementExecutor for MemorySession {
    fn execute(&mut self, sql: &str) -> Result<()> {
        lock(&self.db)?.execute(sql)
    }
}

fn coerce(v: Value, kind: ColumnKind) -> Value {
    match (kind, v) {
        (ColumnKind::Boolean, Value::Integer(0)) => Value::Boolean(false),
        (ColumnKind::Boolean, Value::Integer(1)) => Value::Boolean(true),
        (ColumnKind::Float, Value::Integer(i)) => Value::Float(i as f64),
        (_, v) => v,
    }
}

const NON_COLUMN_DEFS: [&str; 9] = [
    "PRIMARY", "KEY", "UNIQUE", "INDEX", "CONSTRAINT", "FOREIGN", "FULLTEXT", "SPATIAL", "CHECK",
];

/// Table name, column names and kinds from `CREATE TABLE name (defs...) options`.
fn parse_create_table(ddl: &str) -> Result<MemoryTable> {
    let trimmed = ddl.trim();
    let head_len = "CREATE TABLE ".len();
    if !starts_with_ci(trimmed, "CREATE TABLE ") {
        bail!("not a CREATE TABLE statement");
    }
    let mut cur = Cursor::new(&trimmed[head_len..]);
    let name = cur.ident()?;

    let open = trimmed
        .find('(')
        .ok_or_else(|| anyhow!("CREATE TABLE `{}`: missing column list", name))?;
    let close = trimmed
        .rfind(')')
        .filter(|c| *c > open)
        .ok_or_else(|| anyhow!("CREATE TABLE `{}`: unbalanced parentheses", name))?;

    let mut columns = Vec::new();
    let mut kinds = Vec::new();
    for def in split_top_level(&trimmed[open + 1..close]) {
        let def = def.trim();
        if def.is_empty() {
            continue;
        }
        let first_word = def.split_whitespace().next().unwrap_or("");
        if !def.starts_with('`')
            && NON_COLUMN_DEFS
                .iter()
                .any(|k| first_word.eq_ignore_ascii_case(k))
        {
            continue;
        }
        let mut c = Cursor::new(def);
        let col = c.ident()?;
        c.skip_ws();
        let ty: String = c
            .rest()
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .collect();
        columns.push(col);
        kinds.push(ColumnKind::from_type_name(&ty));
    }

    Ok(MemoryTable {
        name,
        columns,
        kinds,
        ddl: trimmed.to_string(),
        rows: Vec::new(),
    })
}

fn starts_with_ci(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}

/// Split on commas that are not nested in parentheses or quotes.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => quote = Some(ch),
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

/// Minimal cursor over statement text.
struct Cursor<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Self { s, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.s[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn eat(&mut self, ch: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(ch) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<()> {
        if self.eat(ch) {
            Ok(())
        } else {
            bail!("expected '{}' at offset {}", ch, self.pos)
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        self.skip_ws();
        if self.rest().is_empty() {
            Ok(())
        } else {
            bail!("unexpected trailing input at offset {}", self.pos)
        }
    }

    fn keyword(&mut self, kw: &str) -> Result<()> {
        self.skip_ws();
        if starts_with_ci(self.rest(), kw) {
            self.pos += kw.len();
            Ok(())
        } else {
            bail!("expected {} at offset {}", kw, self.pos)
        }
    }

    /// `quoted` (backticks doubled inside) or a bare word.
    fn ident(&mut self) -> Result<String> {
        self.skip_ws();
        if self.peek() == Some('`') {
            self.bump();
            let mut out = String::new();
            loop {
                match self.bump() {
                    Some('`') if self.peek() == Some('`') => {
                        self.bump();
                        out.push('`');
                    }
                    Some('`') => return Ok(out),
                    Some(c) => out.push(c),
                    None => bail!("unterminated identifier"),
                }
            }
        }
        let word: String = self
            .rest()
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
            .collect();
        if word.is_empty() {
            bail!("expected identifier at offset {}", self.pos);
        }
        self.pos += word.len();
        Ok(word)
    }

    fn literal(&mut self) -> Result<Value> {
        self.skip_ws();
        match self.peek() {
            Some('\'') => {
                self.bump();
                Ok(Value::Text(self.string_body()?))
            }
            Some('X') | Some('x') if self.rest()[1..].starts_with('\'') => {
                self.pos += 2;
                let start = self.pos;
                let end = self.rest().find('\'').ok_or_else(|| anyhow!("unterminated X'' literal"))?;
                let hex = &self.s[start..start + end];
                self.pos += end + 1;
                Ok(Value::Bytes(decode_hex(hex)?))
            }
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            _ => {
                if starts_with_ci(self.rest(), "NULL") {
                    self.pos += 4;
                    Ok(Value::Null)
                } else {
                    bail!("unsupported literal at offset {}", self.pos)
                }
            }
        }
    }

    /// Body of a '...' literal after the opening quote, MySQL escapes applied.
    fn string_body(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.bump() {
                    Some('0') => out.push('\0'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('b') => out.push('\u{8}'),
                    Some('Z') => out.push('\u{1a}'),
                    Some(c) => out.push(c),
                    None => bail!("unterminated string literal"),
                },
                Some('\'') if self.peek() == Some('\'') => {
                    self.bump();
                    out.push('\'');
                }
                Some('\'') => return Ok(out),
                Some(c) => out.push(c),
                None => bail!("unterminated string literal"),
            }
        }
    }

    fn number(&mut self) -> Result<Value> {
        let text: String = self
            .rest()
            .chars()
            .take_while(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
            .collect();
        self.pos += text.len();
        if text.contains(['.', 'e', 'E']) {
            let f: f64 = text
                .parse()
                .with_context(|| format!("invalid float literal {}", text))?;
            Ok(Value::Float(f))
        } else {
            let i: i64 = text
                .parse()
                .with_context(|| format!("invalid integer literal {}", text))?;
            Ok(Value::Integer(i))
        }
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        bail!("hex literal must have even length");
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(s.len() / 2);
    for i in (0..bytes.len()).step_by(2) {
        let h = (bytes[i] as char)
            .to_digit(16)
            .ok_or_else(|| anyhow!("invalid hex at pos {}", i))?;
        let l = (bytes[i + 1] as char)
            .to_digit(16)
            .ok_or_else(|| anyhow!("invalid hex at pos {}", i + 1))?;
        out.push(((h << 4) | l) as u8);
    }
    Ok(out)
}
