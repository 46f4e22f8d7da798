use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use sqlbackup::{BackupError, StatementSplitter};

#[derive(Serialize)]
struct StatementOut {
    index: usize,
    line: usize,
    bytes: usize,
    preview: String,
}

#[derive(Serialize)]
struct SplitReport {
    path: String,
    lines: usize,
    statements: usize,
    items: Vec<StatementOut>,
}

pub fn exec(path: PathBuf, strict: bool, json: bool) -> Result<()> {
    if !path.is_file() {
        return Err(BackupError::SqlFileNotFound { path }.into());
    }
    let f = File::open(&path).with_context(|| format!("open {}", path.display()))?;
    let mut splitter = StatementSplitter::new(BufReader::new(f)).strict_tail(strict);

    let mut items = Vec::new();
    for (i, stmt) in splitter.by_ref().enumerate() {
        let stmt = stmt?;
        items.push(StatementOut {
            index: i + 1,
            line: stmt.line,
            bytes: stmt.len(),
            preview: BackupError::preview(&stmt),
        });
    }

    let lines = splitter.lines_read();

    if json {
        let report = SplitReport {
            path: path.display().to_string(),
            lines,
            statements: items.len(),
            items,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}: {} statement(s) in {} line(s)", path.display(), items.len(), lines);
    for it in &items {
        println!("  #{:<5} line {:<7} {:>9} B  {}", it.index, it.line, it.bytes, it.preview);
    }
    Ok(())
}
