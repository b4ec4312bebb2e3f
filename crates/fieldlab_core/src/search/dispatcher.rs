//! Backend selection, timing and envelope assembly.
//!
//! # Responsibility
//! - Validate a request, snapshot the catalog once, run the chosen backend.
//! - Wrap the backend page into the normalized `SearchResult`.
//!
//! # Invariants
//! - No retries and no failover between backends.
//! - Failed requests carry no timing; only successful envelopes do.

use super::error::{EngineResult, SearchError};
use super::indexed::IndexedBackend;
use super::query::{Backend, SearchBackend, SearchQuery, SearchResult};
use super::relational::RelationalBackend;
use crate::catalog::{AttributeCatalog, CatalogCache, CatalogSource, SqliteCatalogSource};
use crate::config::EngineConfig;
use crate::repo::RepoError;
use log::{error, info};
use std::sync::Arc;
use std::time::Instant;

/// Entry point of the query engine.
pub struct QueryDispatcher {
    catalog_cache: CatalogCache,
    catalog_source: Box<dyn CatalogSource>,
    relational: Box<dyn SearchBackend>,
    indexed: Box<dyn SearchBackend>,
}

impl QueryDispatcher {
    pub fn new(
        catalog_cache: CatalogCache,
        catalog_source: Box<dyn CatalogSource>,
        relational: Box<dyn SearchBackend>,
        indexed: Box<dyn SearchBackend>,
    ) -> Self {
        Self {
            catalog_cache,
            catalog_source,
            relational,
            indexed,
        }
    }

    /// Wires the SQLite backends and catalog source described by `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            CatalogCache::new(config.catalog_ttl()),
            Box::new(SqliteCatalogSource::new(&config.relational_path)),
            Box::new(RelationalBackend::new(&config.relational_path)),
            Box::new(IndexedBackend::new(&config.index_path)),
        )
    }

    /// Forces the next request to reload the catalog.
    pub fn invalidate_catalog(&self) {
        self.catalog_cache.invalidate();
    }

    pub fn search(&self, query: &SearchQuery) -> EngineResult<SearchResult> {
        query.validate()?;

        let started_at = Instant::now();
        let catalog = self.catalog_snapshot()?;
        let backend = self.backend_for(query.backend);

        let page = match backend.execute(&catalog, query) {
            Ok(page) => page,
            Err(err) => {
                error!(
                    "event=search module=search status=error backend={} error_code={} error={}",
                    query.backend,
                    error_code(&err),
                    err
                );
                return Err(err);
            }
        };
        let elapsed_millis = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            "event=search module=search status=ok backend={} total={} returned={} warnings={} duration_ms={}",
            query.backend,
            page.total,
            page.records.len(),
            page.warnings.len(),
            elapsed_millis
        );

        Ok(SearchResult {
            total_pages: total_pages(page.total, query.page_size),
            records: page.records,
            total: page.total,
            page: query.page,
            page_size: query.page_size,
            elapsed_millis,
            backend: query.backend,
            groups: page.groups,
            warnings: page.warnings,
        })
    }

    fn backend_for(&self, backend: Backend) -> &dyn SearchBackend {
        match backend {
            Backend::Relational => self.relational.as_ref(),
            Backend::Indexed => self.indexed.as_ref(),
        }
    }

    /// The catalog lives in the relational store, whichever backend runs.
    fn catalog_snapshot(&self) -> EngineResult<Arc<AttributeCatalog>> {
        self.catalog_cache
            .snapshot(self.catalog_source.as_ref())
            .map_err(|err| match err {
                RepoError::Db(db_err) => SearchError::unavailable(Backend::Relational, db_err),
                other => SearchError::from(other),
            })
    }
}

fn total_pages(total: u64, page_size: u32) -> u64 {
    total.div_ceil(u64::from(page_size.max(1)))
}

fn error_code(err: &SearchError) -> &'static str {
    match err {
        SearchError::InvalidQuery(_) => "invalid_query",
        SearchError::InvalidValue(_) => "invalid_value",
        SearchError::BackendUnavailable { .. } => "backend_unavailable",
        SearchError::Db(_) => "db_error",
        SearchError::InvalidData(_) => "invalid_data",
    }
}

#[cfg(test)]
mod tests {
    use super::total_pages;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(5, 2), 3);
        assert_eq!(total_pages(4, 2), 2);
    }
}
