//! Flattened document index (search-engine backend).
//!
//! # Responsibility
//! - Own the index store: one denormalized document per record, with every
//!   dynamic attribute as a first-class field of `custom_fields`.
//! - Keep a trigram FTS5 table over `name` and `email` for substring search.
//! - Apply sync events produced by the relational write path.
//!
//! # Invariants
//! - The index is a separate database from the relational store.
//! - The index is eventually consistent with the relational store.

mod document;
mod store;
mod sync;

pub use document::IndexDocument;
pub use store::{DocumentIndex, SqliteDocumentIndex};
pub(crate) use store::parse_document_row;
pub use sync::{IndexSync, SyncEvent};

use crate::db::migrations::{latest_version_of, Migration};
use crate::db::{open_store, session_flags, DbResult};
use rusqlite::Connection;
use std::path::Path;

const INDEX_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/0001_documents.sql"),
}];

/// Returns the latest index schema version known by this binary.
pub fn latest_index_version() -> u32 {
    latest_version_of(INDEX_MIGRATIONS)
}

/// Opens (or creates) the index database file and applies migrations.
pub fn open_index(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_store("index", "file", INDEX_MIGRATIONS, || Connection::open(path))
}

/// Opens an in-memory index database and applies migrations.
pub fn open_index_in_memory() -> DbResult<Connection> {
    open_store("index", "memory", INDEX_MIGRATIONS, Connection::open_in_memory)
}

/// Opens an existing index for one request session; never creates it.
pub fn open_index_existing(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_store("index", "session", INDEX_MIGRATIONS, || {
        Connection::open_with_flags(path, session_flags())
    })
}
