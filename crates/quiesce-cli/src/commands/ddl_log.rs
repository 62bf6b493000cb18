//! DDL log command implementation

use anyhow::{Context, Result};
use quiesce::DdlLogLine;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

pub fn execute(file: &Path) -> Result<()> {
    let input = std::fs::File::open(file)
        .with_context(|| format!("Failed to open DDL log {}", file.display()))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let count = decode(BufReader::new(input), &mut out)?;
    tracing::debug!("Decoded {} record(s) from {}", count, file.display());
    Ok(())
}

/// Write one JSON object per log record. Blank lines are skipped.
pub fn decode(input: impl BufRead, out: &mut impl Write) -> Result<usize> {
    let mut count = 0;
    for (idx, line) in input.lines().enumerate() {
        let line = line.context("Failed to read DDL log")?;
        if line.is_empty() {
            continue;
        }
        let record = DdlLogLine::parse(&line)
            .with_context(|| format!("Malformed record on line {}", idx + 1))?;
        serde_json::to_writer(&mut *out, &record)?;
        writeln!(out)?;
        count += 1;
    }
    Ok(count)
}
