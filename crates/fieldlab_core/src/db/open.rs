//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections expose `fold_case(text)`, a Unicode lowercase fold.
//! - Returned connections have migrations fully applied.
//! - `*_existing` openers never create a missing database file.

use super::migrations::{apply_migration_set, Migration, MIGRATIONS};
use super::DbResult;
use log::{error, info};
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQL name of the Unicode case-fold function registered on every connection.
pub(crate) const FOLD_CASE_FN: &str = "fold_case";

/// Opens (or creates) the relational database file and applies migrations.
///
/// # Side effects
/// - Performs connection bootstrap and migration checks.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_store("db", "file", MIGRATIONS, || Connection::open(path))
}

/// Opens an in-memory relational database and applies migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_store("db", "memory", MIGRATIONS, Connection::open_in_memory)
}

/// Opens an existing relational database for one request session.
///
/// Fails with `SQLITE_CANTOPEN` when the file does not exist.
pub fn open_db_existing(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_store("db", "session", MIGRATIONS, || {
        Connection::open_with_flags(path, session_flags())
    })
}

/// Flags for request-scoped sessions: read-write, never create.
pub(crate) fn session_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

/// Shared open + bootstrap sequence for every store this crate manages.
pub(crate) fn open_store(
    module: &'static str,
    mode: &'static str,
    migrations: &[Migration],
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module={module} status=start mode={mode}");

    let mut conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module={module} status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn, migrations) {
        Ok(()) => {
            info!(
                "event=db_open module={module} status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module={module} status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection, migrations: &[Migration]) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    register_fold_case(conn)?;
    apply_migration_set(conn, migrations)?;
    Ok(())
}

/// `LIKE` folds ASCII only; free-text matching folds both sides with this.
fn register_fold_case(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        FOLD_CASE_FN,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text = ctx.get::<Option<String>>(0)?;
            Ok(text.map(|text| text.to_lowercase()))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::{open_store, FOLD_CASE_FN, MIGRATIONS};
    use rusqlite::Connection;

    #[test]
    fn fold_case_lowercases_non_ascii_text() {
        let conn = open_store("db", "memory", MIGRATIONS, Connection::open_in_memory).unwrap();
        let folded: String = conn
            .query_row(&format!("SELECT {FOLD_CASE_FN}('ÉLODIE Ärger');"), [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(folded, "élodie ärger");

        let null: Option<String> = conn
            .query_row(&format!("SELECT {FOLD_CASE_FN}(NULL);"), [], |row| row.get(0))
            .unwrap();
        assert_eq!(null, None);
    }
}
