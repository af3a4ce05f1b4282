//! Merging of title-restricted and general sub-query responses.
//!
//! When a title phrase is supplied the engine asks the index two questions
//! at once: which records match the phrase in their title, and which match
//! the free text in any other field. A record qualifies only if it answers
//! both, and the title sub-query's ranking decides the order.

use std::collections::HashSet;

use crate::models::RawResponse;

/// Intersect `title` with `general`, keeping the title order.
///
/// A title sub-query with no hits yields an empty response regardless of
/// the general sub-query.
pub fn merge_title_response(title: RawResponse, general: RawResponse) -> RawResponse {
    if title.nb_hits == 0 {
        return RawResponse::empty();
    }

    let general_ids: HashSet<&str> = general.hits.iter().map(|h| h.doc_id()).collect();

    let hits: Vec<_> = title
        .hits
        .into_iter()
        .filter(|h| general_ids.contains(h.doc_id()))
        .collect();

    RawResponse {
        nb_hits: hits.len() as i64,
        hits,
    }
}
