//! Read-only attribute catalog consumed by the query engine.
//!
//! # Responsibility
//! - Resolve wire names and ids to typed attribute definitions.
//! - Provide a process-wide cached snapshot with an explicit refresh contract.
//!
//! # Invariants
//! - A snapshot is immutable; refreshing swaps in a new `Arc`.
//! - Snapshots hold inactive definitions too, so historical values resolve.

mod cache;

pub use cache::CatalogCache;

use crate::db::open_db_existing;
use crate::model::attribute::{AttributeDefinition, AttributeId};
use crate::repo::attribute_repo::{AttributeRepository, SqliteAttributeRepository};
use crate::repo::RepoResult;
use std::collections::HashMap;
use std::path::PathBuf;

/// Immutable snapshot of all attribute definitions.
#[derive(Debug, Clone, Default)]
pub struct AttributeCatalog {
    by_wire_name: HashMap<String, AttributeDefinition>,
    wire_name_by_id: HashMap<AttributeId, String>,
}

impl AttributeCatalog {
    pub fn new(definitions: impl IntoIterator<Item = AttributeDefinition>) -> Self {
        let mut catalog = Self::default();
        for definition in definitions {
            catalog
                .wire_name_by_id
                .insert(definition.id, definition.wire_name.clone());
            catalog
                .by_wire_name
                .insert(definition.wire_name.clone(), definition);
        }
        catalog
    }

    pub fn resolve(&self, wire_name: &str) -> Option<&AttributeDefinition> {
        self.by_wire_name.get(wire_name)
    }

    pub fn resolve_id(&self, id: AttributeId) -> Option<&AttributeDefinition> {
        self.wire_name_by_id
            .get(&id)
            .and_then(|wire_name| self.by_wire_name.get(wire_name))
    }

    /// Active definitions sorted by display order, then wire name.
    pub fn all_active(&self) -> Vec<&AttributeDefinition> {
        let mut active = self
            .by_wire_name
            .values()
            .filter(|definition| definition.is_active())
            .collect::<Vec<_>>();
        active.sort_by(|left, right| {
            left.display_order
                .cmp(&right.display_order)
                .then_with(|| left.wire_name.cmp(&right.wire_name))
        });
        active
    }

    pub fn len(&self) -> usize {
        self.by_wire_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_wire_name.is_empty()
    }
}

/// Source of catalog snapshots.
pub trait CatalogSource: Send + Sync {
    fn load_definitions(&self) -> RepoResult<Vec<AttributeDefinition>>;
}

/// Loads definitions from the relational store, one session per load.
#[derive(Debug, Clone)]
pub struct SqliteCatalogSource {
    db_path: PathBuf,
}

impl SqliteCatalogSource {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

impl CatalogSource for SqliteCatalogSource {
    fn load_definitions(&self) -> RepoResult<Vec<AttributeDefinition>> {
        let conn = open_db_existing(&self.db_path)?;
        SqliteAttributeRepository::new(&conn).list_definitions()
    }
}

/// Fixed definition list; useful for embedding and tests.
impl CatalogSource for Vec<AttributeDefinition> {
    fn load_definitions(&self) -> RepoResult<Vec<AttributeDefinition>> {
        Ok(self.clone())
    }
}
