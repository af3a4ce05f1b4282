//! Core data models shared by the filter builder, the reconciler and the
//! document exporter.
//!
//! Documents travel to and from the hosted index as flat JSON objects
//! ([`FieldMap`]); the wire names of every field are declared here.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

/// A flat field map as stored in, and returned by, the hosted index.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Owner id meaning "visible to all users".
pub const NO_OWNER_ID: i64 = 0;

/// Results returned when a caller asks for limit 0.
pub const MAX_RESULTS: usize = 100;

/// Largest page requested from the hosted index in one call.
pub const QUERY_SIZE: usize = 120;

/// Results per page for [`paged_search`](crate::paging::paged_search).
pub const DISPLAY_RESULTS_PER_PAGE: usize = 10;

/// Fields searched as full text and eligible for highlighting.
pub const HIGHLIGHT_FIELDS: [&str; 4] = ["title", "content", "description1", "description2"];

/// Fields indexed for filtering only.
pub const FACET_FIELDS: [&str; 7] = [
    "areaid",
    "itemid",
    "contextid",
    "courseid",
    "owneruserid",
    "modified",
    "type",
];

/// Every field a [`Document`] declares, in export order.
pub const DOCUMENT_FIELDS: [&str; 18] = [
    "id",
    "itemid",
    "title",
    "content",
    "contextid",
    "areaid",
    "type",
    "courseid",
    "owneruserid",
    "modified",
    "userid",
    "description1",
    "description2",
    "filegroupingid",
    "fileid",
    "filecontenthash",
    "fileindexstatus",
    "filecontent",
];

/// Kind of indexed record.
///
/// Only [`DocumentType::Text`] records take part in the primary text match;
/// file sub-documents are filtered out by the type clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentType {
    Text,
    File,
}

impl DocumentType {
    pub fn as_i64(self) -> i64 {
        match self {
            DocumentType::Text => 1,
            DocumentType::File => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(DocumentType::Text),
            2 => Some(DocumentType::File),
            _ => None,
        }
    }
}

impl Serialize for DocumentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

impl<'de> Deserialize<'de> for DocumentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        DocumentType::from_i64(raw)
            .ok_or_else(|| de::Error::custom(format!("unknown document type {}", raw)))
    }
}

/// Whether the body of a file sub-document made it into the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileIndexStatus {
    Error,
    NotIndexed,
    Indexed,
}

impl FileIndexStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            FileIndexStatus::Error => -1,
            FileIndexStatus::NotIndexed => 0,
            FileIndexStatus::Indexed => 1,
        }
    }
}

/// A search area's verdict on a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessResult {
    Granted,
    Denied,
    /// The backing record no longer exists; the hit is stale.
    Deleted,
}

/// Caller-supplied query criteria. Never mutated by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryCriteria {
    /// Free text.
    pub q: String,
    /// Restrict matches to documents whose title matches this phrase.
    pub title: Option<String>,
    /// Inclusive lower bound on `modified`.
    pub time_start: Option<i64>,
    /// Inclusive upper bound on `modified`.
    pub time_end: Option<i64>,
    /// Only these areas (empty = all).
    pub area_ids: Vec<String>,
    /// Only these courses (empty = all).
    pub course_ids: Vec<i64>,
    /// Only these contexts (empty = no explicit restriction).
    pub context_ids: Vec<i64>,
}

impl QueryCriteria {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            ..Default::default()
        }
    }
}

/// Contexts the requesting user may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibleContexts {
    /// No context restriction at all.
    All,
    /// Visible context ids, keyed by area id.
    ByArea(BTreeMap<String, Vec<i64>>),
}

/// A file attached to a document, indexed as its own sub-document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: i64,
    pub content_hash: String,
    pub filename: String,
    pub modified: i64,
}

/// Host-format search document.
///
/// Built fresh from each authorized hit and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(rename = "itemid")]
    pub item_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "contextid")]
    pub context_id: i64,
    #[serde(rename = "areaid")]
    pub area_id: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    #[serde(rename = "courseid")]
    pub course_id: i64,
    #[serde(rename = "owneruserid", default)]
    pub owner_user_id: i64,
    pub modified: i64,
    #[serde(rename = "userid", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description2: Option<String>,
    #[serde(rename = "filegroupingid", default, skip_serializing_if = "Option::is_none")]
    pub file_grouping_id: Option<String>,
}

impl Document {
    /// Build a document from standardized hit fields.
    pub fn from_fields(fields: &FieldMap) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(fields.clone()))
    }

    /// True if `user_id` may see this document on ownership grounds.
    pub fn visible_to(&self, user_id: i64) -> bool {
        self.owner_user_id == NO_OWNER_ID || self.owner_user_id == user_id
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.id, self.area_id, self.title)
    }
}

/// One raw record returned by the hosted index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(rename = "_highlightResult", default, skip_serializing_if = "FieldMap::is_empty")]
    pub highlight: FieldMap,
    #[serde(flatten)]
    pub fields: FieldMap,
}

impl RawHit {
    /// Document id this hit belongs to, falling back to the object id.
    pub fn doc_id(&self) -> &str {
        self.fields
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.object_id)
    }

    pub fn area_id(&self) -> Option<&str> {
        self.fields.get("areaid").and_then(|v| v.as_str())
    }

    pub fn item_id(&self) -> Option<i64> {
        self.fields.get("itemid").and_then(|v| v.as_i64())
    }

    /// Owner of the record; absent owners count as [`NO_OWNER_ID`].
    pub fn owner_user_id(&self) -> i64 {
        self.fields
            .get("owneruserid")
            .and_then(|v| v.as_i64())
            .unwrap_or(NO_OWNER_ID)
    }

    /// Highlighted excerpt for `field`, if the index returned one.
    pub fn highlighted(&self, field: &str) -> Option<&str> {
        self.highlight
            .get(field)
            .and_then(|h| h.get("value"))
            .and_then(|v| v.as_str())
    }

    /// Declared document fields of this hit, with highlighted values
    /// replacing the stored ones where available.
    pub fn standardize(&self) -> FieldMap {
        let mut data = FieldMap::new();
        data.insert(
            "objectID".to_string(),
            serde_json::Value::String(self.object_id.clone()),
        );
        for field in DOCUMENT_FIELDS {
            if let Some(value) = self.fields.get(field) {
                data.insert(field.to_string(), value.clone());
            }
        }
        for field in self.highlight.keys() {
            if !data.contains_key(field) {
                continue;
            }
            if let Some(value) = self.highlighted(field) {
                data.insert(field.clone(), serde_json::Value::String(value.to_string()));
            }
        }
        data
    }
}

/// A response from a single query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    #[serde(default)]
    pub hits: Vec<RawHit>,
    #[serde(rename = "nbHits", default)]
    pub nb_hits: i64,
}

impl RawResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `(hits included in this page, hits the index reports in total)`.
    pub fn counts(&self) -> (i64, i64) {
        (self.hits.len() as i64, self.nb_hits)
    }
}
