//! Database connection management, migrations, and error types.
//!
//! This module handles SQLite connection setup (WAL mode, busy timeout, the
//! `regexp` SQL function used by keyword search), schema versioning via
//! embedded migrations, and the error type for failures that happen before or
//! around the storage adapter.

use regex::{Regex, RegexBuilder};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Error type for setup, I/O and file format failures.
///
/// Storage operations themselves report through `Causes` instead.
#[derive(Debug, Error)]
pub enum SnipError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// I/O operation failed (file/directory creation, reading import files, etc).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON document could not be parsed or produced.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input provided by the user or caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Opens a SQLite connection at the specified path with proper settings.
///
/// Creates the parent directory if it doesn't exist. Configured with:
/// - **WAL mode**: concurrent readers with serialized writers
/// - **Busy timeout**: 5 seconds
/// - **regexp()**: case-insensitive regular expression match
///
/// # Errors
///
/// Returns `SnipError::Io` if the parent directory cannot be created and
/// `SnipError::Db` if the connection cannot be opened or configured.
pub fn open_connection_at(path: &Path) -> Result<Connection, SnipError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    register_functions(&conn)?;

    tracing::debug!(path = %path.display(), "sqlite database opened");
    Ok(conn)
}

/// Opens an in-memory connection with the same functions registered.
#[cfg(test)]
pub fn open_in_memory() -> Result<Connection, SnipError> {
    let conn = Connection::open_in_memory()?;
    register_functions(&conn)?;
    Ok(conn)
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Registers `regexp(pattern, value)` so `column REGEXP ?` works.
///
/// SQLite rewrites `X REGEXP Y` to `regexp(Y, X)`, so the pattern is the
/// first argument. NULL values never match.
pub fn register_functions(conn: &Connection) -> Result<(), SnipError> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            // The pattern is compiled once per statement and kept as aux data.
            let re: Arc<Regex> = ctx.get_or_create_aux(0, |pattern| -> Result<Regex, BoxError> {
                Ok(RegexBuilder::new(pattern.as_str()?).case_insensitive(true).build()?)
            })?;
            let value: Option<String> = ctx.get(1)?;
            Ok(value.map_or(false, |v| re.is_match(&v)))
        },
    )?;
    Ok(())
}

/// Runs all pending database migrations.
///
/// Migrations are applied transactionally and idempotently:
/// 1. Reads the current schema version from `schema_meta` (0 if the table doesn't exist)
/// 2. Runs each embedded migration with version > current version, in order
/// 3. Each migration runs in its own transaction
///
/// # Errors
///
/// Returns `SnipError::Db` if migration SQL execution or commit fails.
pub fn run_migrations(conn: &mut Connection) -> Result<(), SnipError> {
    let current_version: i64 = conn
        .query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0); // Fresh database starts at version 0

    let migrations: Vec<(i64, &str)> = vec![(1, include_str!("../migrations/001_initial.sql"))];

    for (target_version, sql) in migrations {
        if target_version > current_version {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.commit()?;
            tracing::debug!(version = target_version, "migration applied");
        }
    }

    Ok(())
}

/// Column names of the `contents` table, in table order.
pub fn content_columns(conn: &Connection) -> Result<Vec<String>, SnipError> {
    let mut stmt = conn.prepare("PRAGMA table_info('contents')")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}
