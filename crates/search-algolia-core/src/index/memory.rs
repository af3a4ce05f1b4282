//! In-memory [`SearchIndex`] implementation for testing and local tooling.
//!
//! Records are kept in insertion order behind `parking_lot` locks. Queries
//! evaluate the same filter syntax the filter builder emits, match words
//! exactly (no typo tolerance) and rank by the number of query words a
//! record contains, keeping insertion order among equals.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use parking_lot::RwLock;
use serde_json::{json, Value};

use super::{IndexError, IndexSettings, SearchArgs, SearchIndex, TaskId};
use crate::highlight::HighlightMarkers;
use crate::models::{FieldMap, RawHit, RawResponse, HIGHLIGHT_FIELDS};

/// In-memory index. Every query and multi-query counts as one round-trip.
pub struct InMemoryIndex {
    name: String,
    objects: RwLock<Vec<(String, FieldMap)>>,
    indexes: RwLock<Vec<String>>,
    settings: RwLock<Option<IndexSettings>>,
    deleted: RwLock<Vec<String>>,
    query_failure: RwLock<Option<String>>,
    round_trips: AtomicUsize,
    next_task: AtomicI64,
}

impl InMemoryIndex {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            indexes: RwLock::new(vec![name.clone()]),
            name,
            objects: RwLock::new(Vec::new()),
            settings: RwLock::new(None),
            deleted: RwLock::new(Vec::new()),
            query_failure: RwLock::new(None),
            round_trips: AtomicUsize::new(0),
            next_task: AtomicI64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    pub fn get(&self, object_id: &str) -> Option<FieldMap> {
        self.objects
            .read()
            .iter()
            .find(|(id, _)| id == object_id)
            .map(|(_, fields)| fields.clone())
    }

    /// Number of query round-trips served so far.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Ids removed through [`SearchIndex::delete_object`], in call order.
    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted.read().clone()
    }

    pub fn settings(&self) -> Option<IndexSettings> {
        self.settings.read().clone()
    }

    /// Make every following query fail with `message`, or recover with `None`.
    pub fn fail_queries(&self, message: Option<&str>) {
        *self.query_failure.write() = message.map(str::to_string);
    }

    fn markers(&self) -> HighlightMarkers {
        match self.settings.read().as_ref() {
            Some(s) => HighlightMarkers::new(s.highlight_pre_tag.clone(), s.highlight_post_tag.clone()),
            None => HighlightMarkers::default(),
        }
    }

    fn check_available(&self) -> Result<(), IndexError> {
        match self.query_failure.read().as_ref() {
            Some(message) => Err(IndexError::Remote {
                status: 503,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn run_query(&self, args: &SearchArgs) -> Result<RawResponse, IndexError> {
        let filter = ParsedFilter::parse(&args.filters)?;
        let terms: Vec<String> = if args.query.trim() == "*" {
            Vec::new()
        } else {
            tokens(&args.query)
        };
        let optional: HashSet<String> = args
            .optional_words
            .iter()
            .flat_map(|w| tokens(w))
            .collect();
        let fields: Vec<String> = match &args.restrict_searchable_attributes {
            Some(restricted) => restricted.clone(),
            None => HIGHLIGHT_FIELDS.iter().map(|f| f.to_string()).collect(),
        };

        let objects = self.objects.read();
        let mut scored: Vec<(usize, &String, &FieldMap)> = Vec::new();
        for (id, object) in objects.iter() {
            if !filter.matches(object) {
                continue;
            }
            let words: HashSet<String> = fields
                .iter()
                .filter_map(|f| object.get(f).and_then(|v| v.as_str()))
                .flat_map(tokens)
                .collect();
            let matched = terms.iter().filter(|t| words.contains(*t)).count();
            let missing_required = terms
                .iter()
                .any(|t| !optional.contains(t) && !words.contains(t));
            if missing_required || (!terms.is_empty() && matched == 0) {
                continue;
            }
            scored.push((matched, id, object));
        }
        // Stable: insertion order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        let markers = self.markers();
        let term_set: HashSet<&str> = terms.iter().map(String::as_str).collect();
        let hits = scored
            .iter()
            .skip(args.offset)
            .take(args.length)
            .map(|(_, id, object)| {
                let mut highlight = FieldMap::new();
                for field in HIGHLIGHT_FIELDS {
                    if let Some(text) = object.get(field).and_then(|v| v.as_str()) {
                        highlight.insert(
                            field.to_string(),
                            json!({ "value": mark_terms(text, &term_set, &markers) }),
                        );
                    }
                }
                RawHit {
                    object_id: (*id).clone(),
                    highlight,
                    fields: (*object).clone(),
                }
            })
            .collect();

        Ok(RawResponse {
            hits,
            nb_hits: scored.len() as i64,
        })
    }
}

impl SearchIndex for InMemoryIndex {
    fn search(&self, args: &SearchArgs) -> Result<RawResponse, IndexError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.run_query(args)
    }

    fn multi_query(&self, queries: &[SearchArgs]) -> Result<Vec<RawResponse>, IndexError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        queries.iter().map(|q| self.run_query(q)).collect()
    }

    fn add_object(&self, object: &FieldMap, object_id: &str) -> Result<TaskId, IndexError> {
        let mut objects = self.objects.write();
        match objects.iter_mut().find(|(id, _)| id == object_id) {
            Some(slot) => slot.1 = object.clone(),
            None => objects.push((object_id.to_string(), object.clone())),
        }
        Ok(self.next_task.fetch_add(1, Ordering::SeqCst))
    }

    fn wait_task(&self, _task: TaskId) -> Result<(), IndexError> {
        Ok(())
    }

    fn delete_object(&self, object_id: &str) -> Result<(), IndexError> {
        self.objects.write().retain(|(id, _)| id != object_id);
        self.deleted.write().push(object_id.to_string());
        Ok(())
    }

    fn delete_by_query(&self, filters: Option<&str>) -> Result<(), IndexError> {
        let filter = ParsedFilter::parse(filters.unwrap_or(""))?;
        self.objects.write().retain(|(_, object)| !filter.matches(object));
        Ok(())
    }

    fn set_settings(&self, settings: &IndexSettings) -> Result<(), IndexError> {
        *self.settings.write() = Some(settings.clone());
        Ok(())
    }

    fn list_indexes(&self) -> Result<Vec<String>, IndexError> {
        Ok(self.indexes.read().clone())
    }

    fn delete_index(&self, name: &str) -> Result<(), IndexError> {
        self.indexes.write().retain(|n| n != name);
        if name == self.name {
            self.objects.write().clear();
            *self.settings.write() = None;
        }
        Ok(())
    }
}

/// Lowercased alphanumeric words of `text`.
fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Wrap every word of `text` found in `terms` with the markers, leaving
/// the rest of the text untouched.
fn mark_terms(text: &str, terms: &HashSet<&str>, markers: &HighlightMarkers) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word_start: Option<usize> = None;
    let flush = |out: &mut String, word: &str| {
        if terms.contains(word.to_lowercase().as_str()) {
            out.push_str(&markers.mark(word));
        } else {
            out.push_str(word);
        }
    };
    for (i, c) in text.char_indices() {
        if c.is_alphanumeric() {
            word_start.get_or_insert(i);
            continue;
        }
        if let Some(start) = word_start.take() {
            flush(&mut out, &text[start..i]);
        }
        out.push(c);
    }
    if let Some(start) = word_start {
        flush(&mut out, &text[start..]);
    }
    out
}

fn unescape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    IntEq(String, i64),
    StrEq(String, String),
    Range(String, i64, i64),
    AtLeast(String, i64),
    AtMost(String, i64),
}

impl Condition {
    fn parse(term: &str) -> Result<Self, IndexError> {
        let invalid = || IndexError::Remote {
            status: 400,
            message: format!("invalid filter term: {}", term),
        };
        let int = |s: &str| s.trim().parse::<i64>().map_err(|_| invalid());

        if let Some((field, value)) = term.split_once(" >= ") {
            return Ok(Condition::AtLeast(field.trim().to_string(), int(value)?));
        }
        if let Some((field, value)) = term.split_once(" <= ") {
            return Ok(Condition::AtMost(field.trim().to_string(), int(value)?));
        }
        if let Some((field, value)) = term.split_once(':') {
            let field = field.trim().to_string();
            let value = value.trim();
            if let Some(quoted) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
                return Ok(Condition::StrEq(field, unescape_quoted(quoted)));
            }
            if let Some((lo, hi)) = value.split_once(" TO ") {
                return Ok(Condition::Range(field, int(lo)?, int(hi)?));
            }
            return Ok(match value.parse::<i64>() {
                Ok(v) => Condition::IntEq(field, v),
                Err(_) => Condition::StrEq(field, value.to_string()),
            });
        }
        if let Some((field, value)) = term.split_once('=') {
            return Ok(Condition::IntEq(field.trim().to_string(), int(value)?));
        }
        Err(invalid())
    }

    fn matches(&self, object: &FieldMap) -> bool {
        let int_of = |field: &str| object.get(field).and_then(Value::as_i64);
        match self {
            Condition::IntEq(f, v) => int_of(f) == Some(*v),
            Condition::StrEq(f, v) => object.get(f).and_then(Value::as_str) == Some(v.as_str()),
            Condition::Range(f, lo, hi) => int_of(f).map_or(false, |x| *lo <= x && x <= *hi),
            Condition::AtLeast(f, v) => int_of(f).map_or(false, |x| x >= *v),
            Condition::AtMost(f, v) => int_of(f).map_or(false, |x| x <= *v),
        }
    }
}

/// AND of OR-clauses.
#[derive(Debug, Clone, Default)]
struct ParsedFilter(Vec<Vec<Condition>>);

impl ParsedFilter {
    fn parse(filters: &str) -> Result<Self, IndexError> {
        if filters.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut clauses = Vec::new();
        for clause in filters.split(" AND ") {
            let clause = clause.trim();
            let inner = clause
                .strip_prefix('(')
                .and_then(|c| c.strip_suffix(')'))
                .unwrap_or(clause);
            let terms = inner
                .split(" OR ")
                .map(|t| Condition::parse(t.trim()))
                .collect::<Result<Vec<_>, _>>()?;
            clauses.push(terms);
        }
        Ok(Self(clauses))
    }

    fn matches(&self, object: &FieldMap) -> bool {
        self.0
            .iter()
            .all(|clause| clause.iter().any(|c| c.matches(object)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(id: &str, title: &str, content: &str, modified: i64) -> FieldMap {
        json!({
            "id": id,
            "itemid": 1,
            "title": title,
            "content": content,
            "contextid": 1,
            "areaid": "core_mocksearch-mock_search_area",
            "type": 1,
            "courseid": 1,
            "owneruserid": 0,
            "modified": modified,
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn seeded() -> InMemoryIndex {
        let index = InMemoryIndex::new("test");
        index.add_object(&object("a", "Alpha", "one two", 10), "a").unwrap();
        index.add_object(&object("b", "Beta", "one", 20), "b").unwrap();
        index.add_object(&object("c", "Gamma", "three", 30), "c").unwrap();
        index
    }

    #[test]
    fn test_ranking_by_matched_words() {
        let index = seeded();
        let resp = index.search(&SearchArgs::new("two one", String::new(), 10)).unwrap();
        let ids: Vec<&str> = resp.hits.iter().map(|h| h.object_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(resp.nb_hits, 2);
        assert_eq!(index.round_trips(), 1);
    }

    #[test]
    fn test_required_words_without_optional() {
        let index = seeded();
        let mut args = SearchArgs::new("two one", String::new(), 10);
        args.optional_words.clear();
        let resp = index.search(&args).unwrap();
        assert_eq!(resp.nb_hits, 1);
    }

    #[test]
    fn test_offset_and_length() {
        let index = seeded();
        let mut args = SearchArgs::new("*", String::new(), 1);
        args.offset = 1;
        let resp = index.search(&args).unwrap();
        assert_eq!(resp.nb_hits, 3);
        assert_eq!(resp.hits.len(), 1);
        assert_eq!(resp.hits[0].object_id, "b");
    }

    #[test]
    fn test_escaped_string_values_match() {
        let index = InMemoryIndex::new("test");
        let mut record = object("d", "Delta", "one", 40);
        record.insert("areaid".into(), json!("area\\"));
        index.add_object(&record, "d").unwrap();
        index.add_object(&object("e", "Epsilon", "one", 50), "e").unwrap();

        let filters = crate::filter::Clause::any_str("areaid", ["area\\"]).to_string();
        let resp = index.search(&SearchArgs::new("", filters, 10)).unwrap();
        let ids: Vec<&str> = resp.hits.iter().map(|h| h.object_id.as_str()).collect();
        assert_eq!(ids, vec!["d"]);
    }

    #[test]
    fn test_filters_evaluated() {
        let index = seeded();
        let filters = "(modified >= 20) AND (areaid:\"core_mocksearch-mock_search_area\" OR areaid:\"x\") AND (type=1)";
        let resp = index.search(&SearchArgs::new("", filters.into(), 10)).unwrap();
        assert_eq!(resp.nb_hits, 2);
        let resp = index
            .search(&SearchArgs::new("", "(modified:5 TO 15)".into(), 10))
            .unwrap();
        assert_eq!(resp.hits[0].object_id, "a");
    }

    #[test]
    fn test_invalid_filter_is_remote_error() {
        let index = seeded();
        let err = index
            .search(&SearchArgs::new("", "(modified >= soon)".into(), 10))
            .unwrap_err();
        assert!(matches!(err, IndexError::Remote { status: 400, .. }));
    }

    #[test]
    fn test_highlight_marks_matched_words() {
        let index = seeded();
        let resp = index.search(&SearchArgs::new("one", String::new(), 10)).unwrap();
        assert_eq!(resp.hits[0].highlighted("content"), Some("@@HI_S@@one@@HI_E@@ two"));
        assert_eq!(resp.hits[0].highlighted("title"), Some("Alpha"));
    }

    #[test]
    fn test_restricted_attributes() {
        let index = seeded();
        let mut args = SearchArgs::new("alpha", String::new(), 10);
        args.restrict_searchable_attributes = Some(vec!["content".into()]);
        assert_eq!(index.search(&args).unwrap().nb_hits, 0);
        args.restrict_searchable_attributes = Some(vec!["title".into()]);
        assert_eq!(index.search(&args).unwrap().nb_hits, 1);
    }

    #[test]
    fn test_delete_by_query_and_object() {
        let index = seeded();
        index.delete_by_query(Some("areaid:\"nope\"")).unwrap();
        assert_eq!(index.len(), 3);
        index.delete_object("a").unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.deleted_ids(), vec!["a".to_string()]);
        index.delete_by_query(None).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn test_failure_injection() {
        let index = seeded();
        index.fail_queries(Some("down"));
        let err = index.search(&SearchArgs::new("one", String::new(), 10)).unwrap_err();
        assert_eq!(err.to_string(), "remote error 503: down");
        index.fail_queries(None);
        assert!(index.multi_query(&[SearchArgs::new("one", String::new(), 10)]).is_ok());
        assert_eq!(index.round_trips(), 2);
    }

    #[test]
    fn test_delete_index_drops_records() {
        let index = seeded();
        assert_eq!(index.list_indexes().unwrap(), vec!["test".to_string()]);
        index.delete_index("test").unwrap();
        assert!(index.is_empty());
        assert!(index.list_indexes().unwrap().is_empty());
    }
}
