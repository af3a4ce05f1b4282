//! Export of host documents into the flat records the index stores.
//!
//! Each document variant implements [`EngineDocument`]. A document exports
//! one text record, plus one file sub-record per attached file. File
//! sub-records carry no body text of their own (that lives in the parent)
//! and are typed [`DocumentType::File`], so the type clause keeps them out
//! of ordinary text search.

use serde::Serialize;
use serde_json::Value;

use crate::highlight::HighlightMarkers;
use crate::models::{Document, DocumentType, FieldMap, FileIndexStatus, StoredFile};

/// Largest string value, in bytes, the index accepts for a text field.
pub const MAX_FIELD_BYTES: usize = 32766;

/// Text fields capped at [`MAX_FIELD_BYTES`] on export.
const TEXT_FIELDS: [&str; 4] = ["title", "content", "description1", "description2"];

/// Export and formatting capabilities of a searchable document.
pub trait EngineDocument {
    /// Identifier the record is stored under.
    fn engine_id(&self) -> &str;

    /// Fill unset engine fields before export.
    fn apply_defaults(&mut self);

    /// The flat record for the document itself.
    fn export_for_engine(&self) -> FieldMap;

    /// The flat record for `file`, tagged with `status`.
    fn export_file_for_engine(&self, file: &StoredFile, status: FileIndexStatus) -> FieldMap;

    /// Render engine text (with highlight markers) as display HTML.
    fn format_text(&self, text: &str, markers: &HighlightMarkers) -> String {
        markers.to_html(text)
    }
}

impl EngineDocument for Document {
    fn engine_id(&self) -> &str {
        &self.id
    }

    fn apply_defaults(&mut self) {
        if self.file_grouping_id.is_none() {
            self.file_grouping_id = Some(self.id.clone());
        }
    }

    fn export_for_engine(&self) -> FieldMap {
        let mut doc = self.clone();
        doc.apply_defaults();
        let mut data = to_field_map(&doc);
        for field in TEXT_FIELDS {
            if let Some(Value::String(text)) = data.get_mut(field) {
                let cut = truncate_to_bytes(text, MAX_FIELD_BYTES).len();
                text.truncate(cut);
            }
        }
        data
    }

    fn export_file_for_engine(&self, file: &StoredFile, status: FileIndexStatus) -> FieldMap {
        let mut data = self.export_for_engine();

        for field in ["content", "description1", "description2"] {
            data.remove(field);
        }

        data.insert("id".into(), Value::String(file_record_id(&self.id, file.id)));
        data.insert("type".into(), Value::from(DocumentType::File.as_i64()));
        data.insert("fileid".into(), Value::from(file.id));
        data.insert("filecontenthash".into(), Value::String(file.content_hash.clone()));
        data.insert("fileindexstatus".into(), Value::from(status.as_i64()));
        data.insert(
            "title".into(),
            Value::String(truncate_to_bytes(&file.filename, MAX_FIELD_BYTES).to_string()),
        );
        data.insert("modified".into(), Value::from(file.modified));
        data
    }
}

/// Id of the sub-record for file `file_id` of document `parent_id`.
pub fn file_record_id(parent_id: &str, file_id: i64) -> String {
    format!("{}-file{}", parent_id, file_id)
}

/// Longest prefix of `text` within `max_bytes` that ends on a char boundary.
pub fn truncate_to_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn to_field_map<T: Serialize>(value: &T) -> FieldMap {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        _ => FieldMap::new(),
    }
}

/// A document prepared for display: highlight markers turned into markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedDocument {
    pub id: String,
    pub area_id: String,
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description2: Option<String>,
    pub modified: i64,
}

impl RenderedDocument {
    pub fn from_document(doc: &Document, markers: &HighlightMarkers) -> Self {
        Self {
            id: doc.id.clone(),
            area_id: doc.area_id.clone(),
            title: doc.format_text(&doc.title, markers),
            content: doc.format_text(&doc.content, markers),
            description1: doc.description1.as_deref().map(|d| doc.format_text(d, markers)),
            description2: doc.description2.as_deref().map(|d| doc.format_text(d, markers)),
            modified: doc.modified,
        }
    }
}
