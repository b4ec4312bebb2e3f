use super::query::Backend;
use crate::db::DbError;
use crate::model::value::InvalidValue;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type for query engine APIs.
pub type EngineResult<T> = Result<T, SearchError>;

/// Query engine error.
#[derive(Debug)]
pub enum SearchError {
    /// Request shape is invalid (page bounds, malformed `between`, bad FTS text).
    InvalidQuery(String),
    /// A filter operand cannot be coerced to the attribute's type.
    InvalidValue(InvalidValue),
    /// Backing store cannot be opened or failed at the I/O level.
    BackendUnavailable { backend: Backend, message: String },
    Db(DbError),
    /// Persisted data failed to decode.
    InvalidData(String),
}

impl SearchError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }

    /// Wraps any open/bootstrap failure of `backend`'s store.
    pub(crate) fn unavailable(backend: Backend, err: impl Display) -> Self {
        Self::BackendUnavailable {
            backend,
            message: err.to_string(),
        }
    }

    /// Reclassifies storage failures that mean the store is not usable.
    pub(crate) fn classify(self, backend: Backend) -> Self {
        match self {
            Self::Db(err) if err.is_store_failure() => Self::unavailable(backend, err),
            other => other,
        }
    }
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
            Self::InvalidValue(err) => write!(f, "{err}"),
            Self::BackendUnavailable { backend, message } => {
                write!(f, "{backend} backend unavailable: {message}")
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid search row: {message}"),
        }
    }
}

impl Error for SearchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidQuery(_) => None,
            Self::InvalidValue(err) => Some(err),
            Self::BackendUnavailable { .. } => None,
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for SearchError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for SearchError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<InvalidValue> for SearchError {
    fn from(value: InvalidValue) -> Self {
        Self::InvalidValue(value)
    }
}

impl From<RepoError> for SearchError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Db(err) => Self::Db(err),
            RepoError::InvalidData(message) => Self::InvalidData(message),
            RepoError::NotFound(id) => Self::InvalidData(format!("entity not found: {id}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::ffi;

    #[test]
    fn classify_maps_io_failures_to_unavailable() {
        let busy = rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_BUSY), None);
        let classified = SearchError::from(busy).classify(Backend::Indexed);
        assert!(matches!(
            classified,
            SearchError::BackendUnavailable {
                backend: Backend::Indexed,
                ..
            }
        ));
    }

    #[test]
    fn classify_keeps_other_failures() {
        let constraint =
            rusqlite::Error::SqliteFailure(ffi::Error::new(ffi::SQLITE_CONSTRAINT), None);
        let classified = SearchError::from(constraint).classify(Backend::Relational);
        assert!(matches!(classified, SearchError::Db(_)));
    }
}
