//! Filter expressions for the hosted index.
//!
//! A query's filters are an ordered list of clauses that the index ANDs
//! together; each clause is a parenthesized OR of terms over one field.
//! Integer facets compare with bare operators (`courseid=2`), string facets
//! use the quoted form (`areaid:"mod_forum-post"`).
//!
//! Two clauses are always present: owner visibility (no owner, or the
//! requesting user) and the document type (text only, which keeps file
//! sub-documents out of the primary match set).

use std::collections::HashSet;
use std::fmt;

use crate::models::{DocumentType, QueryCriteria, VisibleContexts, NO_OWNER_ID};

/// A single comparison inside a clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    IntEq(&'static str, i64),
    StrEq(&'static str, String),
    Range(&'static str, i64, i64),
    AtLeast(&'static str, i64),
    AtMost(&'static str, i64),
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::IntEq(field, v) => write!(f, "{}={}", field, v),
            Term::StrEq(field, v) => write!(f, "{}:\"{}\"", field, escape_quoted(v)),
            Term::Range(field, lo, hi) => write!(f, "{}:{} TO {}", field, lo, hi),
            Term::AtLeast(field, v) => write!(f, "{} >= {}", field, v),
            Term::AtMost(field, v) => write!(f, "{} <= {}", field, v),
        }
    }
}

/// Backslash-escape `\\` and `"` for a quoted filter value.
pub fn escape_quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// OR of terms, rendered in parentheses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause(pub Vec<Term>);

impl Clause {
    pub fn any_int(field: &'static str, values: impl IntoIterator<Item = i64>) -> Self {
        Clause(values.into_iter().map(|v| Term::IntEq(field, v)).collect())
    }

    pub fn any_str<S: AsRef<str>>(field: &'static str, values: impl IntoIterator<Item = S>) -> Self {
        Clause(
            values
                .into_iter()
                .map(|v| Term::StrEq(field, v.as_ref().to_string()))
                .collect(),
        )
    }

    pub fn single(term: Term) -> Self {
        Clause(vec![term])
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.0.iter().map(|t| t.to_string()).collect();
        write!(f, "({})", terms.join(" OR "))
    }
}

/// Filters derived from one set of criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilters {
    /// Facet clauses, ANDed together.
    pub facet_filters: Vec<String>,
    /// Normalized title phrase; drives a separate title-only sub-query.
    pub title_filter: Option<String>,
}

impl QueryFilters {
    /// The `filters` parameter sent to the index.
    pub fn joined(&self) -> String {
        self.facet_filters.join(" AND ")
    }
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Build the filters for `criteria` as seen by `user_id`.
///
/// Returns `None` when the user can see no context at all; the caller must
/// then answer with zero results without querying the index.
pub fn build_filters(
    criteria: &QueryCriteria,
    contexts: &VisibleContexts,
    user_id: i64,
) -> Option<QueryFilters> {
    let mut clauses: Vec<Clause> = Vec::new();

    let title_filter = criteria
        .title
        .as_deref()
        .map(normalize_whitespace)
        .filter(|t| !t.is_empty());

    if !criteria.area_ids.is_empty() {
        clauses.push(Clause::any_str("areaid", &criteria.area_ids));
    }
    if !criteria.course_ids.is_empty() {
        clauses.push(Clause::any_int(
            "courseid",
            criteria.course_ids.iter().copied(),
        ));
    }

    match (criteria.time_start, criteria.time_end) {
        (Some(start), Some(end)) => clauses.push(Clause::single(Term::Range("modified", start, end))),
        (Some(start), None) => clauses.push(Clause::single(Term::AtLeast("modified", start))),
        (None, Some(end)) => clauses.push(Clause::single(Term::AtMost("modified", end))),
        (None, None) => {}
    }

    clauses.push(Clause::any_int("owneruserid", [NO_OWNER_ID, user_id]));

    if let Some(context_ids) = allowed_contexts(criteria, contexts) {
        if context_ids.is_empty() {
            return None;
        }
        clauses.push(Clause::any_int("contextid", context_ids));
    }

    clauses.push(Clause::any_int("type", [DocumentType::Text.as_i64()]));

    Some(QueryFilters {
        facet_filters: clauses.iter().map(|c| c.to_string()).collect(),
        title_filter,
    })
}

/// Context ids the query may touch, or `None` for "no restriction".
///
/// Areas outside the requested area set are skipped; an explicit context
/// set on the criteria narrows the result further. Order of first
/// appearance is preserved.
fn allowed_contexts(criteria: &QueryCriteria, contexts: &VisibleContexts) -> Option<Vec<i64>> {
    let requested: Option<HashSet<i64>> = if criteria.context_ids.is_empty() {
        None
    } else {
        Some(criteria.context_ids.iter().copied().collect())
    };

    let by_area = match contexts {
        VisibleContexts::All => {
            return requested.map(|_| dedup(criteria.context_ids.iter().copied()));
        }
        VisibleContexts::ByArea(by_area) => by_area,
    };

    let visible = by_area
        .iter()
        .filter(|(area_id, _)| {
            criteria.area_ids.is_empty() || criteria.area_ids.iter().any(|a| a == *area_id)
        })
        .flat_map(|(_, ids)| ids.iter().copied())
        .filter(|id| requested.as_ref().map_or(true, |r| r.contains(id)));

    Some(dedup(visible))
}

fn dedup(ids: impl Iterator<Item = i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn by_area(entries: &[(&str, &[i64])]) -> VisibleContexts {
        let map: BTreeMap<String, Vec<i64>> = entries
            .iter()
            .map(|(a, ids)| (a.to_string(), ids.to_vec()))
            .collect();
        VisibleContexts::ByArea(map)
    }

    #[test]
    fn test_minimal_filters() {
        let filters = build_filters(&QueryCriteria::new("message"), &VisibleContexts::All, 7).unwrap();
        assert_eq!(
            filters.facet_filters,
            vec!["(owneruserid=0 OR owneruserid=7)", "(type=1)"]
        );
        assert_eq!(filters.title_filter, None);
        assert_eq!(filters.joined(), "(owneruserid=0 OR owneruserid=7) AND (type=1)");
    }

    #[test]
    fn test_area_and_course_clauses() {
        let criteria = QueryCriteria {
            area_ids: vec!["mod_forum-post".into(), "core_mocksearch-mock_search_area".into()],
            course_ids: vec![1, 2],
            ..QueryCriteria::new("x")
        };
        let filters = build_filters(&criteria, &VisibleContexts::All, 3).unwrap();
        assert_eq!(
            filters.facet_filters[0],
            "(areaid:\"mod_forum-post\" OR areaid:\"core_mocksearch-mock_search_area\")"
        );
        assert_eq!(filters.facet_filters[1], "(courseid=1 OR courseid=2)");
    }

    #[test]
    fn test_time_range_variants() {
        let both = QueryCriteria {
            time_start: Some(10),
            time_end: Some(20),
            ..Default::default()
        };
        let start = QueryCriteria {
            time_start: Some(10),
            ..Default::default()
        };
        let end = QueryCriteria {
            time_end: Some(20),
            ..Default::default()
        };
        let first = |c: &QueryCriteria| build_filters(c, &VisibleContexts::All, 1).unwrap().facet_filters[0].clone();
        assert_eq!(first(&both), "(modified:10 TO 20)");
        assert_eq!(first(&start), "(modified >= 10)");
        assert_eq!(first(&end), "(modified <= 20)");
    }

    #[test]
    fn test_title_is_normalized_not_anded() {
        let criteria = QueryCriteria {
            title: Some("  Special \t  title ".into()),
            ..Default::default()
        };
        let filters = build_filters(&criteria, &VisibleContexts::All, 1).unwrap();
        assert_eq!(filters.title_filter.as_deref(), Some("Special title"));
        assert!(filters.facet_filters.iter().all(|f| !f.contains("title")));
    }

    #[test]
    fn test_blank_title_ignored() {
        let criteria = QueryCriteria {
            title: Some("   ".into()),
            ..Default::default()
        };
        let filters = build_filters(&criteria, &VisibleContexts::All, 1).unwrap();
        assert_eq!(filters.title_filter, None);
    }

    #[test]
    fn test_contexts_union_deduplicated() {
        let contexts = by_area(&[("a", &[5, 6]), ("b", &[6, 7])]);
        let filters = build_filters(&QueryCriteria::default(), &contexts, 1).unwrap();
        assert!(filters
            .facet_filters
            .contains(&"(contextid=5 OR contextid=6 OR contextid=7)".to_string()));
        assert_eq!(filters.facet_filters.last().unwrap(), "(type=1)");
    }

    #[test]
    fn test_contexts_skip_unrequested_areas() {
        let contexts = by_area(&[("a", &[5]), ("b", &[9])]);
        let criteria = QueryCriteria {
            area_ids: vec!["b".into()],
            ..Default::default()
        };
        let filters = build_filters(&criteria, &contexts, 1).unwrap();
        assert!(filters.facet_filters.contains(&"(contextid=9)".to_string()));
    }

    #[test]
    fn test_no_visible_contexts_means_no_results() {
        let contexts = by_area(&[("a", &[5])]);
        let criteria = QueryCriteria {
            area_ids: vec!["other".into()],
            ..Default::default()
        };
        assert_eq!(build_filters(&criteria, &contexts, 1), None);
        assert_eq!(build_filters(&QueryCriteria::default(), &by_area(&[]), 1), None);
    }

    #[test]
    fn test_explicit_contexts_narrow_visible_set() {
        let contexts = by_area(&[("a", &[5, 6])]);
        let criteria = QueryCriteria {
            context_ids: vec![6, 99],
            ..Default::default()
        };
        let filters = build_filters(&criteria, &contexts, 1).unwrap();
        assert!(filters.facet_filters.contains(&"(contextid=6)".to_string()));

        let all = build_filters(&criteria, &VisibleContexts::All, 1).unwrap();
        assert!(all.facet_filters.contains(&"(contextid=6 OR contextid=99)".to_string()));
    }

    #[test]
    fn test_string_terms_escape_quotes() {
        assert_eq!(
            Term::StrEq("areaid", "a\"b".into()).to_string(),
            "areaid:\"a\\\"b\""
        );
    }

    #[test]
    fn test_trailing_backslash_stays_inside_quotes() {
        let criteria = QueryCriteria {
            area_ids: vec!["a\\".into()],
            ..QueryCriteria::new("x")
        };
        let filters = build_filters(&criteria, &VisibleContexts::All, 1).unwrap();
        assert_eq!(filters.facet_filters[0], r#"(areaid:"a\\")"#);
        assert_eq!(
            Term::StrEq("areaid", r#"a\"b"#.into()).to_string(),
            r#"areaid:"a\\\"b""#
        );
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace(" a \n b\t\tc "), "a b c");
        assert_eq!(normalize_whitespace(""), "");
    }
}
