//! Engine facade over the hosted index.
//!
//! [`AlgoliaEngine`] owns the configuration and a lazily built client. It
//! answers the host's questions (is the engine usable, run this query,
//! index this document) by delegating to the core crate with the hosted
//! client plugged in as the [`SearchIndex`].
//!
//! Readiness is checked in two steps. [`is_server_configured`] verifies
//! credentials and key grants; [`is_server_ready`] additionally pushes
//! index settings once per engine.
//!
//! [`is_server_configured`]: AlgoliaEngine::is_server_configured
//! [`is_server_ready`]: AlgoliaEngine::is_server_ready

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use search_algolia_core::area::AreaRegistry;
use search_algolia_core::document::{EngineDocument, RenderedDocument};
use search_algolia_core::highlight::HighlightMarkers;
use search_algolia_core::index::{IndexSettings, SearchIndex};
use search_algolia_core::maintenance;
use search_algolia_core::models::{Document, FileIndexStatus, QueryCriteria, StoredFile, VisibleContexts};
use search_algolia_core::paging::{paged_search, PagedResults};
use search_algolia_core::search::{execute_query, QueryOutcome, QueryRequest};
use tracing::{debug, info, warn};

use crate::client::{AlgoliaClient, ApiKeys};
use crate::config::Config;
use crate::error::EngineError;

/// Grants the API key needs for every engine operation.
pub const REQUIRED_ACLS: [&str; 6] = [
    "addObject",
    "deleteObject",
    "listIndexes",
    "deleteIndex",
    "settings",
    "editSettings",
];

/// Required grants absent from `granted`, in [`REQUIRED_ACLS`] order.
pub fn missing_acls(granted: &[String]) -> Vec<String> {
    REQUIRED_ACLS
        .iter()
        .filter(|acl| !granted.iter().any(|g| g == *acl))
        .map(|acl| acl.to_string())
        .collect()
}

/// Check that `keys` belongs to a usable API key.
///
/// A key allowed to list API keys is an admin key and passes outright.
/// Any other key must carry every grant in [`REQUIRED_ACLS`].
pub fn validate_credentials<K: ApiKeys + ?Sized>(keys: &K) -> Result<(), EngineError> {
    match keys.list_api_keys() {
        Ok(()) => {
            debug!("API key can list keys; treating it as an admin key");
            return Ok(());
        }
        Err(e) => debug!("API key cannot list keys ({}); checking its ACL", e),
    }

    let acl = keys.key_acl().map_err(EngineError::InvalidCredentials)?;
    let missing = missing_acls(&acl);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::MissingAcls(missing))
    }
}

pub struct AlgoliaEngine {
    config: Config,
    client: OnceCell<Arc<AlgoliaClient>>,
    settings_applied: AtomicBool,
}

impl AlgoliaEngine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            client: OnceCell::new(),
            settings_applied: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn markers(&self) -> HighlightMarkers {
        self.config.engine.markers()
    }

    /// The index client, built on first use and reused when
    /// `engine.cache_client` is set.
    pub fn client(&self) -> Result<Arc<AlgoliaClient>, EngineError> {
        let build = || AlgoliaClient::new(&self.config.algolia, &self.config.http).map(Arc::new);
        if self.config.engine.cache_client {
            self.client.get_or_try_init(build).cloned()
        } else {
            build()
        }
    }

    /// Credentials are present, accepted, and carry the required grants.
    pub fn is_server_configured(&self) -> Result<(), EngineError> {
        if !self.config.algolia.has_credentials() {
            return Err(EngineError::NotConfigured);
        }
        let client = self.client()?;
        validate_credentials(client.as_ref())
    }

    /// Configured, and index settings have been applied.
    pub fn is_server_ready(&self) -> Result<(), EngineError> {
        self.is_server_configured()?;
        self.setup_index()
    }

    /// Push index settings, once per engine.
    pub fn setup_index(&self) -> Result<(), EngineError> {
        if self.settings_applied.load(Ordering::SeqCst) {
            return Ok(());
        }
        let client = self.client()?;
        client
            .set_settings(&IndexSettings::for_documents(&self.markers()))
            .map_err(EngineError::IndexSetup)?;
        self.settings_applied.store(true, Ordering::SeqCst);
        info!("Applied settings to index {}", client.index_name());
        Ok(())
    }

    pub fn execute_query<A: AreaRegistry + ?Sized>(
        &self,
        areas: &A,
        criteria: &QueryCriteria,
        contexts: &VisibleContexts,
        user_id: i64,
        limit: usize,
    ) -> Result<QueryOutcome, EngineError> {
        let client = self.client()?;
        let req = QueryRequest::new(criteria, contexts, user_id)
            .with_limit(limit)
            .with_params(self.config.engine.query_params());
        Ok(execute_query(client.as_ref(), areas, &req))
    }

    pub fn paged_search<A: AreaRegistry + ?Sized>(
        &self,
        areas: &A,
        criteria: &QueryCriteria,
        contexts: &VisibleContexts,
        user_id: i64,
        page: usize,
    ) -> Result<PagedResults, EngineError> {
        let client = self.client()?;
        let req = QueryRequest::new(criteria, contexts, user_id)
            .with_params(self.config.engine.query_params());
        Ok(paged_search(
            client.as_ref(),
            areas,
            &req,
            page,
            self.config.engine.per_page,
        ))
    }

    pub fn render(&self, doc: &Document) -> RenderedDocument {
        RenderedDocument::from_document(doc, &self.markers())
    }

    fn maintenance_client(&self, operation: &str) -> Option<Arc<AlgoliaClient>> {
        match self.client() {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Skipping {}: {}", operation, e);
                None
            }
        }
    }

    pub fn add_document<D: EngineDocument + ?Sized>(&self, doc: &D) -> bool {
        self.maintenance_client("add_document").map_or(false, |client| {
            maintenance::add_document(client.as_ref(), doc, self.config.engine.wait_for_tasks)
        })
    }

    pub fn add_file_document<D: EngineDocument + ?Sized>(
        &self,
        doc: &D,
        file: &StoredFile,
        status: FileIndexStatus,
    ) -> bool {
        self.maintenance_client("add_file_document").map_or(false, |client| {
            maintenance::add_file_document(
                client.as_ref(),
                doc,
                file,
                status,
                self.config.engine.wait_for_tasks,
            )
        })
    }

    pub fn delete_by_id(&self, id: &str) -> bool {
        self.maintenance_client("delete_by_id")
            .map_or(false, |client| maintenance::delete_by_id(client.as_ref(), id))
    }

    /// Delete the records of `area_id`, or all records.
    pub fn delete(&self, area_id: Option<&str>) -> bool {
        self.maintenance_client("delete")
            .map_or(false, |client| maintenance::delete_area(client.as_ref(), area_id))
    }

    /// Drop index `name`, or every index of the application.
    pub fn clear_indices(&self, name: Option<&str>) -> bool {
        let cleared = self
            .maintenance_client("clear_indices")
            .map_or(false, |client| maintenance::clear_indices(client.as_ref(), name));
        if cleared {
            self.settings_applied.store(false, Ordering::SeqCst);
        }
        cleared
    }

    /// The hosted index needs no optimisation pass.
    pub fn optimize(&self) {}

    /// An area's indexing run is complete once it produced any document.
    pub fn area_index_complete(&self, documents: usize) -> bool {
        documents > 0
    }
}
