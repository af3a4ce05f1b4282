//! Command implementations behind the `search-algolia` binary.
//!
//! Each `run_*` function loads nothing itself: it receives the engine built
//! from the loaded config and prints human-readable output to stdout.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use search_algolia_core::area::{AreaSet, OpenArea};
use search_algolia_core::document::RenderedDocument;
use search_algolia_core::models::{Document, QueryCriteria, VisibleContexts};
use serde::Deserialize;
use tracing::warn;

use crate::engine::AlgoliaEngine;

/// Filters accepted by `search`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub title: Option<String>,
    /// `YYYY-MM-DD`, inclusive from the start of the day (UTC).
    pub since: Option<String>,
    /// `YYYY-MM-DD`, inclusive to the end of the day (UTC).
    pub until: Option<String>,
    pub areas: Vec<String>,
    pub courses: Vec<i64>,
    pub contexts: Vec<i64>,
    pub user_id: i64,
    pub page: usize,
    pub json: bool,
}

/// Report whether the engine is usable. Returns false when it is not.
pub fn run_status(engine: &AlgoliaEngine) -> bool {
    let algolia = &engine.config().algolia;
    println!("index: {}", algolia.index_name);
    match engine.is_server_configured() {
        Ok(()) => {
            println!("status: ready");
            true
        }
        Err(e) => {
            println!("status: not ready ({})", e);
            false
        }
    }
}

pub fn run_setup(engine: &AlgoliaEngine) -> Result<()> {
    engine.is_server_ready()?;
    println!("Index {} is ready.", engine.config().algolia.index_name);
    Ok(())
}

pub fn build_criteria(query: &str, opts: &SearchOptions) -> Result<QueryCriteria> {
    let mut criteria = QueryCriteria::new(query);
    criteria.title = opts.title.clone();
    criteria.time_start = opts.since.as_deref().map(day_start).transpose()?;
    criteria.time_end = opts.until.as_deref().map(day_end).transpose()?;
    criteria.area_ids = opts.areas.clone();
    criteria.course_ids = opts.courses.clone();
    criteria.context_ids = opts.contexts.clone();

    if let (Some(start), Some(end)) = (criteria.time_start, criteria.time_end) {
        if start > end {
            bail!("--since must not be after --until");
        }
    }
    Ok(criteria)
}

pub fn run_search(engine: &AlgoliaEngine, query: &str, opts: &SearchOptions) -> Result<()> {
    let criteria = build_criteria(query, opts)?;

    let areas = engine
        .config()
        .engine
        .registered_areas
        .iter()
        .fold(AreaSet::new(), |set, id| set.with(OpenArea::new(id.clone())));

    let page = engine.paged_search(&areas, &criteria, &VisibleContexts::All, opts.user_id, opts.page)?;

    if let Some(e) = &page.query_error {
        warn!("Query failed: {}", e);
    }

    let rendered: Vec<RenderedDocument> = page.results.iter().map(|d| engine.render(d)).collect();

    if opts.json {
        let out = serde_json::json!({
            "page": page.actual_page,
            "total": page.total_count,
            "results": rendered,
            "error": page.query_error.as_ref().map(|e| e.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if page.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!(
        "Page {} ({} result{} in total)",
        page.actual_page + 1,
        page.total_count,
        if page.total_count == 1 { "" } else { "s" }
    );
    println!();

    let markers = engine.markers();
    let offset = page.actual_page * engine.config().engine.per_page;
    for (i, doc) in page.results.iter().enumerate() {
        println!("{}. {} / {}", offset + i + 1, doc.area_id, markers.strip(&doc.title));
        println!("    modified: {}", format_ts_iso(doc.modified));
        println!(
            "    excerpt: \"{}\"",
            markers.strip(&doc.content).replace('\n', " ").trim()
        );
        println!("    id: {}", doc.id);
        println!();
    }
    Ok(())
}

/// A single document or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentInput {
    One(Box<Document>),
    Many(Vec<Document>),
}

pub fn read_documents(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read documents file: {}", path.display()))?;
    let input: DocumentInput = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse documents file: {}", path.display()))?;
    Ok(match input {
        DocumentInput::One(doc) => vec![*doc],
        DocumentInput::Many(docs) => docs,
    })
}

pub fn run_index(engine: &AlgoliaEngine, path: &Path) -> Result<()> {
    let docs = read_documents(path)?;
    let failed = docs.iter().filter(|doc| !engine.add_document(*doc)).count();

    println!("Indexed {} of {} document(s).", docs.len() - failed, docs.len());
    if failed > 0 {
        bail!("{} document(s) failed to index", failed);
    }
    Ok(())
}

pub fn run_delete(engine: &AlgoliaEngine, area: Option<&str>) -> Result<()> {
    if !engine.delete(area) {
        bail!("Delete failed; see log for details");
    }
    match area {
        Some(area) => println!("Deleted records of {}.", area),
        None => println!("Deleted all records."),
    }
    Ok(())
}

pub fn run_clear(engine: &AlgoliaEngine, index: Option<&str>) -> Result<()> {
    if !engine.clear_indices(index) {
        bail!("Clearing indexes failed; see log for details");
    }
    match index {
        Some(index) => println!("Deleted index {}.", index),
        None => println!("Deleted all indexes."),
    }
    Ok(())
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

fn day_start(s: &str) -> Result<i64> {
    let date = parse_day(s)?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .with_context(|| format!("Invalid date '{}'", s))
}

fn day_end(s: &str) -> Result<i64> {
    let date = parse_day(s)?;
    date.and_hms_opt(23, 59, 59)
        .map(|dt| dt.and_utc().timestamp())
        .with_context(|| format!("Invalid date '{}'", s))
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_build_criteria_dates() {
        let opts = SearchOptions {
            since: Some("2024-01-02".into()),
            until: Some("2024-01-02".into()),
            courses: vec![4],
            ..Default::default()
        };
        let criteria = build_criteria("forum", &opts).unwrap();
        assert_eq!(criteria.time_start, Some(1_704_153_600));
        assert_eq!(criteria.time_end, Some(1_704_239_999));
        assert_eq!(criteria.course_ids, vec![4]);
        assert_eq!(criteria.q, "forum");
    }

    #[test]
    fn test_build_criteria_rejects_bad_dates() {
        let opts = SearchOptions {
            since: Some("02/01/2024".into()),
            ..Default::default()
        };
        assert!(build_criteria("x", &opts).is_err());

        let opts = SearchOptions {
            since: Some("2024-02-01".into()),
            until: Some("2024-01-01".into()),
            ..Default::default()
        };
        assert!(build_criteria("x", &opts).is_err());
    }

    #[test]
    fn test_read_single_and_many_documents() {
        let doc = r#"{"id":"a-1","itemid":1,"title":"T","content":"C","contextid":1,
            "areaid":"a","type":1,"courseid":1,"owneruserid":0,"modified":5}"#;

        let mut one = tempfile::NamedTempFile::new().unwrap();
        write!(one, "{}", doc).unwrap();
        assert_eq!(read_documents(one.path()).unwrap().len(), 1);

        let mut many = tempfile::NamedTempFile::new().unwrap();
        write!(many, "[{},{}]", doc, doc).unwrap();
        let docs = read_documents(many.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].area_id, "a");
    }

    #[test]
    fn test_format_ts_iso() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
    }
}
