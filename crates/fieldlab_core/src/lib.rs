//! Core of fieldlab: records with user-defined typed attributes, stored as
//! EAV rows and as flattened index documents, queried through one engine.

pub mod catalog;
pub mod config;
pub mod db;
pub mod index;
pub mod logging;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use catalog::{AttributeCatalog, CatalogCache, CatalogSource, SqliteCatalogSource};
pub use config::{ConfigError, EngineConfig};
pub use index::{DocumentIndex, IndexDocument, IndexSync, SqliteDocumentIndex, SyncEvent};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status};
pub use model::attribute::{
    AttributeDefinition, AttributeId, AttributeValidationError, NewAttributeDefinition, ValueType,
};
pub use model::record::{FixedAttributes, Record, RecordError, RecordId, RecordValidationError};
pub use model::value::{from_storage_form, to_storage_form, InvalidValue, TypedValue};
pub use repo::{RepoError, RepoResult};
pub use search::{
    Backend, EngineResult, Filter, FilterOperator, FilterValue, QueryDispatcher, QueryWarning,
    SearchError, SearchQuery, SearchResult, SortDirection, SortTerm,
};
pub use service::catalog_service::{CatalogService, CatalogServiceError};
pub use service::record_service::{
    CreateRecordRequest, RecordService, RecordServiceError, UpdateRecordRequest,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
