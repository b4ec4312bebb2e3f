//! SQLite bootstrap shared by the relational store and the document index.
//!
//! # Responsibility
//! - Open and configure connections for either store.
//! - Apply each store's versioned migration set before handing out a
//!   connection.
//! - Tell store-level failures (cannot open, busy, corrupt) apart from
//!   statement errors.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - No application data is read or written before migrations succeed.

use rusqlite::ErrorCode;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_existing, open_db_in_memory};
pub(crate) use open::{open_store, session_flags, FOLD_CASE_FN};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// One migration step failed; the whole set was rolled back.
    Migration {
        version: u32,
        source: rusqlite::Error,
    },
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl DbError {
    /// SQLite primary result code, when the failure came from the engine.
    pub fn sqlite_code(&self) -> Option<ErrorCode> {
        let err = match self {
            Self::Sqlite(err) | Self::Migration { source: err, .. } => err,
            Self::UnsupportedSchemaVersion { .. } => return None,
        };
        match err {
            rusqlite::Error::SqliteFailure(failure, _) => Some(failure.code),
            _ => None,
        }
    }

    /// True when the store itself is unusable rather than one statement.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self.sqlite_code(),
            Some(
                ErrorCode::CannotOpen
                    | ErrorCode::DatabaseBusy
                    | ErrorCode::DatabaseLocked
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::NotADatabase
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::PermissionDenied
            )
        )
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Migration { version, source } => {
                write!(f, "migration {version} failed: {source}")
            }
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Migration { source, .. } => Some(source),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

#[cfg(test)]
mod tests {
    use super::DbError;
    use rusqlite::{ffi, ErrorCode};

    fn failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn store_failures_are_distinguished_from_statement_errors() {
        assert!(DbError::Sqlite(failure(ffi::SQLITE_CANTOPEN)).is_store_failure());
        assert!(DbError::Migration {
            version: 1,
            source: failure(ffi::SQLITE_CORRUPT),
        }
        .is_store_failure());
        assert!(!DbError::Sqlite(failure(ffi::SQLITE_CONSTRAINT)).is_store_failure());
        assert!(!DbError::UnsupportedSchemaVersion {
            db_version: 9,
            latest_supported: 1,
        }
        .is_store_failure());
    }

    #[test]
    fn sqlite_code_ignores_non_engine_errors() {
        assert_eq!(
            DbError::Sqlite(failure(ffi::SQLITE_BUSY)).sqlite_code(),
            Some(ErrorCode::DatabaseBusy)
        );
        assert_eq!(
            DbError::Sqlite(rusqlite::Error::InvalidQuery).sqlite_code(),
            None
        );
    }
}
