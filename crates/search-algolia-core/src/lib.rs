//! # Search Algolia Core
//!
//! Network-free logic of the hosted-index search adapter: data models,
//! filter building, the index trait, multi-query merging, result
//! reconciliation, paging, document export and highlight rendering.
//!
//! This crate performs no HTTP, reads no configuration and holds no global
//! state. The requesting user and every collaborator (index client, area
//! registry) are passed in explicitly.

pub mod area;
pub mod document;
pub mod filter;
pub mod highlight;
pub mod index;
pub mod maintenance;
pub mod merge;
pub mod models;
pub mod paging;
pub mod search;
