//! splitter: разбиение текста дампа на SQL-выражения (StatementSplitter).
//!
//! Вход читается построчно из `BufRead` (файл целиком в память не грузится).
//! Между строками переносится состояние кавычек [`QuoteState`] и накопитель строк
//! текущего выражения.
//!
//! Для каждой строки:
//! 1) допуск: вне строкового литерала пустые строки и строки `-- ...` отбрасываются
//!    (и не сканируются: апостроф в комментарии не открывает литерал);
//! 2) скан кавычек: `'` открывает/закрывает литерал, внутри литерала `\` съедает
//!    следующий символ целиком (экранированный символ состояние не меняет);
//! 3) завершение: если после скана мы вне литерала и строка кончается на `;`,
//!    накопленные строки склеиваются через `\n`, хвостовые `;` срезаются, выражение
//!    отдаётся наружу, накопитель сбрасывается.
//!
//! Обрезка пробелов применяется только к частям строки вне литерала: строка,
//! начавшаяся внутри литерала, не обрезается слева, а закончившаяся внутри: справа.
//! Так многострочные текстовые значения доезжают до сервера байт в байт.
//!
//! Хвост без закрывающей `;` в конце входа по умолчанию отбрасывается с warn-логом;
//! в strict-режиме это ошибка [`BackupError::TruncatedInput`].

use std::fmt;
use std::io::BufRead;
use std::ops::Deref;

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::error::BackupError;

/// Quote tracking state, carried across line boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuoteState {
    #[default]
    Outside,
    InString,
}

impl QuoteState {
    /// Run the state machine over one line and return the state at its end.
    ///
    /// Transition table:
    /// - Outside  + `'`        → InString
    /// - Outside  + other      → Outside
    /// - InString + `\` + any  → InString (both characters consumed)
    /// - InString + `'`        → Outside
    /// - InString + other      → InString
    ///
    /// A `\` that ends the line escapes the line break itself.
    pub fn scan(self, line: &str) -> QuoteState {
        let mut state = self;
        let mut chars = line.chars();
        while let Some(ch) = chars.next() {
            state = match (state, ch) {
                (QuoteState::Outside, '\'') => QuoteState::InString,
                (QuoteState::Outside, _) => QuoteState::Outside,
                (QuoteState::InString, '\\') => {
                    chars.next();
                    QuoteState::InString
                }
                (QuoteState::InString, '\'') => QuoteState::Outside,
                (QuoteState::InString, _) => QuoteState::InString,
            };
        }
        state
    }
}

/// One complete statement: trimmed, trailing `;` removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    /// 1-based line number where the statement starts in the input.
    pub line: usize,
}

impl Deref for Statement {
    type Target = str;

    fn deref(&self) -> &str {
        &self.text
    }
}

impl AsRef<str> for Statement {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Lazy statement iterator over a line-oriented reader.
pub struct StatementSplitter<R> {
    reader: R,
    line_buf: String,
    pending: Vec<String>,
    pending_start: usize,
    state: QuoteState,
    line_no: usize,
    strict_tail: bool,
    finished: bool,
}

impl<R: BufRead> StatementSplitter<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buf: String::new(),
            pending: Vec::new(),
            pending_start: 0,
            state: QuoteState::Outside,
            line_no: 0,
            strict_tail: false,
            finished: false,
        }
    }

    /// Fail with `TruncatedInput` instead of dropping an unterminated tail.
    pub fn strict_tail(mut self, on: bool) -> Self {
        self.strict_tail = on;
        self
    }

    /// Number of accumulated lines of the statement in progress.
    pub fn pending_lines(&self) -> usize {
        self.pending.len()
    }

    /// Lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.line_no
    }

    /// Feed one line (without its line terminator). Returns a statement if it completes one.
    fn push_line(&mut self, raw: &str) -> Option<Statement> {
        let start = self.state;
        if start == QuoteState::Outside {
            let t = raw.trim();
            if t.is_empty() || t.starts_with("--") {
                return None;
            }
        }

        let end = start.scan(raw);

        let mut piece = raw;
        if start == QuoteState::Outside {
            piece = piece.trim_start();
        }
        if end == QuoteState::Outside {
            piece = piece.trim_end();
        }

        if self.pending.is_empty() {
            self.pending_start = self.line_no;
        }
        self.pending.push(piece.to_string());
        self.state = end;

        if end == QuoteState::Outside && piece.ends_with(';') {
            let joined = self.pending.join("\n");
            self.pending.clear();
            let text = joined.trim_end_matches(';').trim_end();
            if text.is_empty() {
                debug!("split: empty statement at line {}", self.pending_start);
                return None;
            }
            return Some(Statement {
                text: text.to_string(),
                line: self.pending_start,
            });
        }
        None
    }

    fn finish(&mut self) -> Option<Result<Statement>> {
        self.finished = true;
        if self.pending.is_empty() {
            return None;
        }
        let pending_lines = self.pending.len();
        let first_line = self.pending_start;
        self.pending.clear();
        if self.strict_tail {
            return Some(Err(BackupError::TruncatedInput {
                pending_lines,
                first_line,
            }
            .into()));
        }
        warn!(
            "split: dropping unterminated statement at end of input ({} line(s) from line {}, in_string={})",
            pending_lines,
            first_line,
            self.state == QuoteState::InString
        );
        None
    }
}

impl<R: BufRead> Iterator for StatementSplitter<R> {
    type Item = Result<Statement>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            self.line_buf.clear();
            let n = match self
                .reader
                .read_line(&mut self.line_buf)
                .with_context(|| format!("read line {}", self.line_no + 1))
            {
                Ok(n) => n,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            if n == 0 {
                return self.finish();
            }
            self.line_no += 1;

            // Только терминатор строки; `\r` внутри литерала: это данные
            let mut line = std::mem::take(&mut self.line_buf);
            if line.ends_with('\n') {
                line.pop();
            }
            let stmt = self.push_line(&line);
            self.line_buf = line;
            if let Some(stmt) = stmt {
                return Some(Ok(stmt));
            }
        }
    }
}

/// Split a whole in-memory script (convenience for small inputs and tests).
pub fn split_str(sql: &str) -> Result<Vec<Statement>> {
    StatementSplitter::new(sql.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(sql: &str) -> Vec<String> {
        split_str(sql).unwrap().into_iter().map(|s| s.text).collect()
    }

    #[test]
    fn state_machine_transitions() {
        use QuoteState::*;
        assert_eq!(Outside.scan("abc"), Outside);
        assert_eq!(Outside.scan("'abc"), InString);
        assert_eq!(Outside.scan("'abc'"), Outside);
        assert_eq!(Outside.scan("'a\\'b"), InString);
        assert_eq!(Outside.scan("'a\\\\'"), Outside);
        assert_eq!(InString.scan("x'"), Outside);
        assert_eq!(InString.scan("\\"), InString);
        assert_eq!(Outside.scan("'it''s'"), Outside);
        // обратный слэш вне литерала ничего не экранирует
        assert_eq!(Outside.scan("\\'"), InString);
    }

    #[test]
    fn escaped_quote_and_semicolon_inside_literal() {
        let got = texts("INSERT INTO t (a) VALUES ('x\\'y;z');\n");
        assert_eq!(got, vec!["INSERT INTO t (a) VALUES ('x\\'y;z')".to_string()]);
        assert!(got[0].contains("x\\'y;z"));
    }

    #[test]
    fn semicolon_at_end_of_line_inside_literal() {
        let sql = "INSERT INTO t (a) VALUES ('a;\nb;');\nSELECT 1;\n";
        assert_eq!(
            texts(sql),
            vec![
                "INSERT INTO t (a) VALUES ('a;\nb;')".to_string(),
                "SELECT 1".to_string()
            ]
        );
    }

    #[test]
    fn comments_and_blanks_only() {
        assert!(texts("-- a comment\n\n   \n-- don't\n").is_empty());
        assert!(texts("").is_empty());
    }

    #[test]
    fn comment_lines_between_statements() {
        let sql = "-- This is a comment\n\nDROP TABLE IF EXISTS `users`;\n\n-- Another comment\n";
        assert_eq!(texts(sql), vec!["DROP TABLE IF EXISTS `users`".to_string()]);
    }

    #[test]
    fn multiline_statement_joined_trimmed() {
        let sql = "CREATE TABLE `users` (\n  `id` int NOT NULL,\n  PRIMARY KEY (`id`)\n) ENGINE=InnoDB;\n";
        assert_eq!(
            texts(sql),
            vec!["CREATE TABLE `users` (\n`id` int NOT NULL,\nPRIMARY KEY (`id`)\n) ENGINE=InnoDB"
                .to_string()]
        );
    }

    #[test]
    fn literal_lines_are_not_trimmed_or_dropped() {
        // внутри литерала: пробелы, пустая строка и "--": это данные
        let sql = "INSERT INTO t (a) VALUES ('one  \n\n  -- two\n  three');\n";
        assert_eq!(
            texts(sql),
            vec!["INSERT INTO t (a) VALUES ('one  \n\n  -- two\n  three')".to_string()]
        );
    }

    #[test]
    fn crlf_outside_is_trimmed() {
        assert_eq!(texts("SELECT 1;\r\nSELECT 2;\r\n"), vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn statement_line_numbers() {
        let stmts = split_str("-- c\nSELECT 1;\n\nSELECT\n2;\n").unwrap();
        assert_eq!(stmts[0].line, 2);
        assert_eq!(stmts[1].line, 4);
        assert_eq!(&*stmts[1], "SELECT\n2");
    }

    #[test]
    fn unterminated_tail_dropped_by_default() {
        let mut sp = StatementSplitter::new("SELECT 1;\nSELECT 2\n".as_bytes());
        assert_eq!(sp.next().unwrap().unwrap().text, "SELECT 1");
        assert_eq!(sp.pending_lines(), 0);
        assert_eq!(sp.lines_read(), 1);
        assert!(sp.next().is_none());
        assert_eq!(sp.lines_read(), 2);
        assert!(sp.next().is_none());
    }

    #[test]
    fn unterminated_literal_never_completes() {
        // `;` внутри открытого литерала: данные, выражение не завершается
        assert!(texts("INSERT INTO t VALUES ('abc;\n").is_empty());
    }

    #[test]
    fn unterminated_tail_is_error_in_strict_mode() {
        let mut sp = StatementSplitter::new("SELECT 1;\nSELECT\n2\n".as_bytes()).strict_tail(true);
        assert_eq!(sp.next().unwrap().unwrap().text, "SELECT 1");
        let err = sp.next().unwrap().unwrap_err();
        match err.downcast_ref::<BackupError>() {
            Some(BackupError::TruncatedInput {
                pending_lines,
                first_line,
            }) => {
                assert_eq!(*pending_lines, 2);
                assert_eq!(*first_line, 2);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(sp.next().is_none());
    }

    #[test]
    fn lone_semicolons_are_skipped() {
        assert_eq!(texts(";\nSELECT 1;;\n"), vec!["SELECT 1"]);
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let bytes: &[u8] = b"SELECT '\xff';\n";
        let res: Result<Vec<Statement>> = StatementSplitter::new(bytes).collect();
        assert!(res.is_err());
    }
}
