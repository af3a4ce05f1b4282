//! Boundary to the hosted search index.
//!
//! The [`SearchIndex`] trait covers every remote operation the adapter
//! performs: queries, multi-queries, object upserts and deletes, settings
//! and index administration. Implementations translate transport or remote
//! failures into [`IndexError`]; nothing else crosses the boundary.
//!
//! Operations are blocking. A client handle may be reused across queries,
//! but it holds no per-query state.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`search`](SearchIndex::search) | One query page |
//! | [`multi_query`](SearchIndex::multi_query) | Several queries in one round-trip |
//! | [`add_object`](SearchIndex::add_object) | Upsert a record by id |
//! | [`wait_task`](SearchIndex::wait_task) | Block until an indexing task is published |
//! | [`delete_object`](SearchIndex::delete_object) | Delete a record by id |
//! | [`delete_by_query`](SearchIndex::delete_by_query) | Delete every record matching a filter |
//! | [`set_settings`](SearchIndex::set_settings) | Replace index settings |
//! | [`list_indexes`](SearchIndex::list_indexes) | Names of all indexes in the application |
//! | [`delete_index`](SearchIndex::delete_index) | Drop an index |

pub mod memory;

use serde::Serialize;
use thiserror::Error;

use crate::highlight::HighlightMarkers;
use crate::models::{FieldMap, RawResponse, FACET_FIELDS, HIGHLIGHT_FIELDS};

/// Failure talking to the hosted index.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The index answered with a non-success status.
    #[error("remote error {status}: {message}")]
    Remote { status: u16, message: String },

    /// The response body could not be understood.
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Identifier of an asynchronous indexing task.
pub type TaskId = i64;

/// Parameters of one query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchArgs {
    pub query: String,
    /// Words a hit may omit and still match.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub optional_words: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub filters: String,
    pub offset: usize,
    pub length: usize,
    /// Search only these attributes instead of every searchable one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restrict_searchable_attributes: Option<Vec<String>>,
}

impl SearchArgs {
    /// A query for `text` where every word is optional.
    pub fn new(text: &str, filters: String, length: usize) -> Self {
        Self {
            query: text.to_string(),
            optional_words: text.split_whitespace().map(str::to_string).collect(),
            filters,
            offset: 0,
            length,
            restrict_searchable_attributes: None,
        }
    }
}

/// Index configuration pushed by [`SearchIndex::set_settings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSettings {
    pub searchable_attributes: Vec<String>,
    pub attributes_for_faceting: Vec<String>,
    pub attributes_to_highlight: Vec<String>,
    pub highlight_pre_tag: String,
    pub highlight_post_tag: String,
    pub restrict_highlight_and_snippet_arrays: bool,
    pub typo_tolerance: bool,
}

impl IndexSettings {
    /// Settings for the document model: highlight fields are searchable in
    /// any word order, facet fields are filter-only.
    pub fn for_documents(markers: &HighlightMarkers) -> Self {
        Self {
            searchable_attributes: HIGHLIGHT_FIELDS
                .iter()
                .map(|f| format!("unordered({})", f))
                .collect(),
            attributes_for_faceting: FACET_FIELDS
                .iter()
                .map(|f| format!("filterOnly({})", f))
                .collect(),
            attributes_to_highlight: HIGHLIGHT_FIELDS.iter().map(|f| f.to_string()).collect(),
            highlight_pre_tag: markers.start.clone(),
            highlight_post_tag: markers.end.clone(),
            restrict_highlight_and_snippet_arrays: true,
            typo_tolerance: false,
        }
    }
}

/// Remote search index operations.
pub trait SearchIndex {
    /// Run one query page.
    fn search(&self, args: &SearchArgs) -> Result<RawResponse, IndexError>;

    /// Run several queries in one round-trip; responses come back in
    /// request order.
    fn multi_query(&self, queries: &[SearchArgs]) -> Result<Vec<RawResponse>, IndexError>;

    /// Upsert `object` under `object_id`.
    fn add_object(&self, object: &FieldMap, object_id: &str) -> Result<TaskId, IndexError>;

    /// Block until `task` has been applied.
    fn wait_task(&self, task: TaskId) -> Result<(), IndexError>;

    fn delete_object(&self, object_id: &str) -> Result<(), IndexError>;

    /// Delete every record matching `filters`, or every record when `None`.
    fn delete_by_query(&self, filters: Option<&str>) -> Result<(), IndexError>;

    fn set_settings(&self, settings: &IndexSettings) -> Result<(), IndexError>;

    fn list_indexes(&self) -> Result<Vec<String>, IndexError>;

    fn delete_index(&self, name: &str) -> Result<(), IndexError>;
}
