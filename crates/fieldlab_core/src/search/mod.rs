//! Dual-backend query engine.
//!
//! # Responsibility
//! - Accept one logical request and answer it from the relational EAV store
//!   or from the flattened document index.
//! - Normalize both answers into the same typed envelope.
//!
//! # Invariants
//! - Each request takes exactly one catalog snapshot.
//! - Both paths apply the same fallback sort and tie-breaker, so queries
//!   both can answer agree on `total`, `page` and `pageSize`.

mod dispatcher;
mod error;
mod indexed;
mod query;
mod relational;

pub use dispatcher::QueryDispatcher;
pub use error::{EngineResult, SearchError};
pub use indexed::{run_indexed_search, IndexedBackend};
pub use query::{
    AttributePath, Backend, BackendPage, Filter, FilterBound, FilterOperator, FilterValue,
    FixedField, GroupCount, QueryWarning, RecordProjection, SearchBackend, SearchQuery,
    SearchResult, SortDirection, SortTerm,
};
pub use relational::{run_relational_search, RelationalBackend};
