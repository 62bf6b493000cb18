//! Run command implementation
//!
//! Scripts are plain text, one statement per line, each prefixed with the
//! name of the session that runs it:
//!
//! ```text
//! # the backup tool
//! backup: BACKUP STAGE START
//! app:    BEGIN ddl shop.orders
//! backup: BACKUP STAGE BLOCK_DDL        # waits, then times out
//! app:    END STATEMENT
//! backup: BACKUP STAGE BLOCK_DDL
//! backup: BACKUP STAGE END
//! ```
//!
//! Besides the BACKUP statements, sessions understand `BEGIN <class>
//! <db.table>...`, `END STATEMENT`, `COMMIT` and `DISCONNECT`. Statements
//! run one after another on this thread, so a statement that would block
//! waits out the lock wait timeout and reports an error. Without a config
//! file that timeout is [`DEFAULT_LOCK_WAIT_TIMEOUT_MS`], so a script like
//! the one above finishes in about a second.

use anyhow::{bail, Context, Result};
use quiesce::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;

/// Lock wait timeout for scripts run without a config file.
pub const DEFAULT_LOCK_WAIT_TIMEOUT_MS: u64 = 1_000;

/// Configuration for a script run without a config file.
pub fn script_config(data_dir: &Path, lock_wait_timeout_ms: Option<u64>) -> BackupConfig {
    BackupConfig::new(data_dir)
        .with_lock_wait_timeout(lock_wait_timeout_ms.unwrap_or(DEFAULT_LOCK_WAIT_TIMEOUT_MS))
}

/// One script statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptCommand {
    Backup(BackupStatement),
    Begin {
        class: StatementClass,
        objects: Vec<ObjectName>,
    },
    EndStatement,
    Commit,
    Disconnect,
}

impl ScriptCommand {
    pub fn parse(text: &str) -> Result<Self> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let upper: Vec<String> = words.iter().map(|w| w.to_ascii_uppercase()).collect();
        let upper: Vec<&str> = upper.iter().map(String::as_str).collect();

        match upper.as_slice() {
            ["BACKUP", ..] => Ok(ScriptCommand::Backup(BackupStatement::parse(text)?)),
            ["BEGIN", _, ..] => {
                let class: StatementClass = words[1].parse()?;
                let objects = words[2..]
                    .iter()
                    .map(|w| w.trim_end_matches(',').parse())
                    .collect::<quiesce::Result<Vec<ObjectName>>>()?;
                Ok(ScriptCommand::Begin { class, objects })
            }
            ["END", "STATEMENT"] => Ok(ScriptCommand::EndStatement),
            ["COMMIT"] => Ok(ScriptCommand::Commit),
            ["DISCONNECT"] => Ok(ScriptCommand::Disconnect),
            _ => bail!("unknown statement '{}'", text),
        }
    }
}

/// Parse `<session>: <statement>`, dropping `#` comments. Returns `None`
/// for blank lines.
pub fn parse_line(line: &str) -> Result<Option<(String, String)>> {
    let line = line.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (session, statement) = line
        .split_once(':')
        .context("expected '<session>: <statement>'")?;
    let session = session.trim();
    let statement = statement.trim();
    if session.is_empty() || statement.is_empty() {
        bail!("expected '<session>: <statement>'");
    }
    Ok(Some((session.to_string(), statement.to_string())))
}

pub fn execute(config: BackupConfig, script: &Path, strict: bool) -> Result<()> {
    let text = std::fs::read_to_string(script)
        .with_context(|| format!("Failed to read script {}", script.display()))?;
    let coordinator = BackupCoordinator::builder(config)
        .build()
        .context("Failed to set up backup coordinator")?;

    let mut stdout = std::io::stdout().lock();
    let failures = run_script(&coordinator, &text, &mut stdout)?;

    if strict && failures > 0 {
        bail!("{} statement(s) failed", failures);
    }
    Ok(())
}

/// Run every line of `text`, writing one result line per statement and the
/// final coordinator status. Returns the number of failed statements.
pub fn run_script(
    coordinator: &BackupCoordinator,
    text: &str,
    out: &mut impl std::io::Write,
) -> Result<usize> {
    let mut sessions: BTreeMap<String, Session> = BTreeMap::new();
    let mut failures = 0;

    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        let Some((name, statement)) =
            parse_line(raw).with_context(|| format!("Line {}", lineno))?
        else {
            continue;
        };

        let session = sessions
            .entry(name.clone())
            .or_insert_with(|| coordinator.new_session());
        let result = ScriptCommand::parse(&statement)
            .and_then(|cmd| apply(coordinator, session, &cmd, &statement));

        match result {
            Ok(()) => writeln!(out, "{:>4} {}: {} -> OK", lineno, name, statement)?,
            Err(e) => {
                failures += 1;
                writeln!(out, "{:>4} {}: {} -> ERROR: {:#}", lineno, name, statement, e)?;
            }
        }
    }

    let status = coordinator.status();
    writeln!(out, "{}", serde_json::to_string_pretty(&status)?)?;

    for session in sessions.values_mut() {
        coordinator.close_session(session);
    }
    Ok(failures)
}

fn apply(
    coordinator: &BackupCoordinator,
    session: &mut Session,
    cmd: &ScriptCommand,
    text: &str,
) -> Result<()> {
    match cmd {
        ScriptCommand::Backup(stmt) => stmt.execute(coordinator, session)?,
        ScriptCommand::Begin { class, objects } => {
            coordinator.begin_statement(session, *class, objects)?;
            if *class == StatementClass::Ddl {
                if let Some(object) = objects.first() {
                    let source = DdlObjectInfo::new("", &object.database, &object.table);
                    coordinator.log_ddl(&DdlLogRecord::new(text, source));
                }
            }
        }
        ScriptCommand::EndStatement => coordinator.end_statement(session),
        ScriptCommand::Commit => coordinator.commit(session)?,
        ScriptCommand::Disconnect => coordinator.close_session(session),
    }
    Ok(())
}
