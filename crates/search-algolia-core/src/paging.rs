//! Page-numbered search on top of [`execute_query`].
//!
//! A request for page `n` asks the engine for the first `(n + 1) × per_page`
//! authorized documents and slices out the last page. Requests past the
//! last page with results fall back to that page.

use crate::area::AreaRegistry;
use crate::index::{IndexError, SearchIndex};
use crate::models::Document;
use crate::search::{execute_query, QueryRequest};

/// One page of results.
#[derive(Debug, Clone, Default)]
pub struct PagedResults {
    pub results: Vec<Document>,
    /// Estimated results available across all pages.
    pub total_count: u64,
    /// Page actually returned; lower than requested past the last page.
    pub actual_page: usize,
    pub query_error: Option<IndexError>,
}

/// Fetch page `page` (0-based) of `per_page` results.
///
/// The limit in `req` is ignored and derived from the page.
pub fn paged_search<I, A>(
    index: &I,
    areas: &A,
    req: &QueryRequest<'_>,
    page: usize,
    per_page: usize,
) -> PagedResults
where
    I: SearchIndex + ?Sized,
    A: AreaRegistry + ?Sized,
{
    let per_page = per_page.max(1);
    let max_results = req.params.max_results;
    let limit = page
        .saturating_add(1)
        .saturating_mul(per_page)
        .min(max_results)
        .max(1);

    let outcome = execute_query(index, areas, &req.clone().with_limit(limit));
    let count = outcome.documents.len();

    let total_count = if count < limit {
        count as u64
    } else {
        outcome.query_total_count().max(count as u64)
    }
    .min(max_results as u64);

    let actual_page = if count > page.saturating_mul(per_page) {
        page
    } else if count == 0 {
        0
    } else {
        (count - 1) / per_page
    };

    let results = outcome
        .documents
        .into_iter()
        .skip(actual_page * per_page)
        .take(per_page)
        .collect();

    PagedResults {
        results,
        total_count,
        actual_page,
        query_error: outcome.query_error,
    }
}
