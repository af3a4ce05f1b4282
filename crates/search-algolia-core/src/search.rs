//! Query execution and result reconciliation.
//!
//! The hosted index knows which records match, but not who may see them.
//! Access is decided locally, per hit, after the fact. This module pages
//! through the remote result set, discards what the user may not see and
//! keeps an honest estimate of how many results remain.
//!
//! # Algorithm
//!
//! 1. Build filters; if no context is visible, answer with nothing.
//! 2. Fetch the first page with `min(3 × limit, query_size)` hits. With a
//!    title phrase, a title-only and a general sub-query go out together and
//!    are intersected (see [`merge`](crate::merge)).
//! 3. Walk the hits in ranking order. Foreign-owned hits and hits from
//!    unregistered areas are dropped silently. Otherwise ask the area:
//!    granted hits become documents, denied hits count as skipped, hits
//!    whose source was deleted are removed from the index and taken back
//!    out of the processed and total counts.
//! 4. While the limit is not reached and the index reports more hits than
//!    were processed, fetch the next `query_size` hits at offset
//!    `processed`. An empty page ends the loop.
//!
//! The caller-visible count is `total - skipped`, clamped at zero. It
//! assumes every hit not yet scanned will be granted.

use tracing::{debug, warn};

use crate::area::AreaRegistry;
use crate::filter::{build_filters, normalize_whitespace, QueryFilters};
use crate::index::{IndexError, SearchArgs, SearchIndex};
use crate::merge::merge_title_response;
use crate::models::{
    AccessResult, Document, QueryCriteria, RawResponse, VisibleContexts, HIGHLIGHT_FIELDS,
    MAX_RESULTS, NO_OWNER_ID, QUERY_SIZE,
};

/// Paging knobs, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryParams {
    /// Largest page requested from the index.
    pub query_size: usize,
    /// Limit used when the caller passes 0.
    pub max_results: usize,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            query_size: QUERY_SIZE,
            max_results: MAX_RESULTS,
        }
    }
}

/// Bundles all inputs for a single query execution.
#[derive(Debug, Clone)]
pub struct QueryRequest<'a> {
    pub criteria: &'a QueryCriteria,
    pub contexts: &'a VisibleContexts,
    /// The requesting user; never read from ambient state.
    pub user_id: i64,
    /// Maximum documents to return; 0 means `params.max_results`.
    pub limit: usize,
    pub params: QueryParams,
}

impl<'a> QueryRequest<'a> {
    pub fn new(criteria: &'a QueryCriteria, contexts: &'a VisibleContexts, user_id: i64) -> Self {
        Self {
            criteria,
            contexts,
            user_id,
            limit: 0,
            params: QueryParams::default(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            self.params.max_results
        } else {
            self.limit
        }
    }
}

/// Running counters of one query execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileState {
    /// Hit count the index reported for the most recent page.
    pub total: i64,
    /// Hits pulled from the index so far, minus stale ones removed.
    pub processed: i64,
    /// Hits denied by access checks.
    pub skipped: i64,
}

impl ReconcileState {
    /// Estimated results still available to the user, never negative.
    pub fn available(&self) -> u64 {
        (self.total - self.skipped).max(0) as u64
    }

    fn remote_remaining(&self) -> i64 {
        self.total - self.processed
    }
}

/// Result of [`execute_query`].
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    /// Authorized documents in ranking order, at most `limit`.
    pub documents: Vec<Document>,
    pub state: ReconcileState,
    /// Query round-trips issued.
    pub round_trips: usize,
    /// Set when a fetch failed; `documents` then holds what was gathered
    /// before the failure.
    pub query_error: Option<IndexError>,
}

impl QueryOutcome {
    /// Caller-visible estimate of remaining results: `total - skipped`.
    pub fn query_total_count(&self) -> u64 {
        self.state.available()
    }
}

/// The remote query, as one or two sub-queries.
#[derive(Debug, Clone, PartialEq, Eq)]
enum QueryPlan {
    Single(SearchArgs),
    /// Title-only sub-query plus the general one, sent together.
    TitleMatch {
        title: SearchArgs,
        general: SearchArgs,
    },
}

impl QueryPlan {
    fn new(text: &str, filters: &QueryFilters, length: usize) -> Self {
        let mut general = SearchArgs::new(text, filters.joined(), length);
        match &filters.title_filter {
            None => QueryPlan::Single(general),
            Some(title_phrase) => {
                general.restrict_searchable_attributes = Some(
                    HIGHLIGHT_FIELDS
                        .iter()
                        .filter(|f| **f != "title")
                        .map(|f| f.to_string())
                        .collect(),
                );
                let title = SearchArgs {
                    query: title_phrase.clone(),
                    optional_words: Vec::new(),
                    restrict_searchable_attributes: Some(vec!["title".to_string()]),
                    ..general.clone()
                };
                QueryPlan::TitleMatch { title, general }
            }
        }
    }

    fn set_page(&mut self, offset: usize, length: usize) {
        let pages: Vec<&mut SearchArgs> = match self {
            QueryPlan::Single(args) => vec![args],
            QueryPlan::TitleMatch { title, general } => vec![title, general],
        };
        for args in pages {
            args.offset = offset;
            args.length = length;
        }
    }

    fn fetch<I: SearchIndex + ?Sized>(&self, index: &I) -> Result<RawResponse, IndexError> {
        match self {
            QueryPlan::Single(args) => index.search(args),
            QueryPlan::TitleMatch { title, general } => {
                let mut responses = index
                    .multi_query(&[title.clone(), general.clone()])?
                    .into_iter();
                match (responses.next(), responses.next()) {
                    (Some(t), Some(g)) => Ok(merge_title_response(t, g)),
                    _ => Err(IndexError::Decode(
                        "multi-query returned fewer than two responses".to_string(),
                    )),
                }
            }
        }
    }
}

/// Per-call reconciliation context. Never shared between calls.
struct Reconciler<'a, I: ?Sized, A: ?Sized> {
    index: &'a I,
    areas: &'a A,
    user_id: i64,
    state: ReconcileState,
    round_trips: usize,
    error: Option<IndexError>,
}

impl<'a, I, A> Reconciler<'a, I, A>
where
    I: SearchIndex + ?Sized,
    A: AreaRegistry + ?Sized,
{
    fn fetch(&mut self, plan: &QueryPlan) -> Option<RawResponse> {
        self.round_trips += 1;
        match plan.fetch(self.index) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!("Error executing search query: {}", e);
                self.error = Some(e);
                None
            }
        }
    }

    /// Convert one page of hits into at most `limit` authorized documents.
    fn process_page(&mut self, response: &RawResponse, limit: usize) -> Vec<Document> {
        let mut out = Vec::new();
        if response.nb_hits == 0 {
            return out;
        }
        let areas = self.areas;

        for hit in &response.hits {
            let owner = hit.owner_user_id();
            if owner != NO_OWNER_ID && owner != self.user_id {
                continue;
            }

            let area = match hit.area_id().and_then(|id| areas.lookup_area(id)) {
                Some(area) => area,
                None => continue,
            };

            let item_id = hit.item_id().unwrap_or_default();

            match area.check_access(item_id) {
                AccessResult::Deleted => {
                    if let Err(e) = self.index.delete_object(&hit.object_id) {
                        warn!("Failed to delete stale record {}: {}", hit.object_id, e);
                    }
                    self.state.processed -= 1;
                    self.state.total -= 1;
                }
                AccessResult::Denied => {
                    self.state.skipped += 1;
                }
                AccessResult::Granted => match Document::from_fields(&hit.standardize()) {
                    Ok(doc) => out.push(doc),
                    Err(e) => warn!("Discarding malformed record {}: {}", hit.object_id, e),
                },
            }

            if out.len() >= limit {
                break;
            }
        }

        out
    }
}

/// Run a query against `index`, authorizing hits through `areas`.
///
/// Never fails: a remote error ends the call with whatever was gathered and
/// is reported in [`QueryOutcome::query_error`].
pub fn execute_query<I, A>(index: &I, areas: &A, req: &QueryRequest<'_>) -> QueryOutcome
where
    I: SearchIndex + ?Sized,
    A: AreaRegistry + ?Sized,
{
    let limit = req.effective_limit();

    let filters = match build_filters(req.criteria, req.contexts, req.user_id) {
        Some(filters) => filters,
        None => {
            debug!("No visible contexts for user {}; skipping query", req.user_id);
            return QueryOutcome::default();
        }
    };

    let text = normalize_whitespace(&req.criteria.q);
    let length = limit.saturating_mul(3).min(req.params.query_size);
    let mut plan = QueryPlan::new(&text, &filters, length);

    let mut rec = Reconciler {
        index,
        areas,
        user_id: req.user_id,
        state: ReconcileState::default(),
        round_trips: 0,
        error: None,
    };
    let mut results: Vec<Document> = Vec::new();

    if let Some(response) = rec.fetch(&plan) {
        let (included, found) = response.counts();
        rec.state.total = found;
        debug!("First page: {} of {} hits", included, found);

        if included > 0 && found > 0 {
            results = rec.process_page(&response, limit);
            rec.state.processed += included;

            while results.len() < limit && rec.state.remote_remaining() > 0 {
                let offset = rec.state.processed.max(0) as usize;
                plan.set_page(offset, req.params.query_size);

                let response = match rec.fetch(&plan) {
                    Some(response) => response,
                    None => break,
                };
                let (included, found) = response.counts();
                debug!("Page at offset {}: {} of {} hits", offset, included, found);
                if included == 0 || found == 0 {
                    break;
                }
                rec.state.total = found;

                let page = rec.process_page(&response, limit - results.len());
                results.extend(page);
                rec.state.processed += included;
            }
        }
    }

    QueryOutcome {
        documents: results,
        state: rec.state,
        round_trips: rec.round_trips,
        query_error: rec.error,
    }
}
