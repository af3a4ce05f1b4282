//! # Search Algolia
//!
//! Hosted-index search adapter: runs faceted queries against an Algolia
//! application, authorizes every hit locally and keeps an accurate estimate
//! of the results the user can still page through.
//!
//! The algorithms live in [`search_algolia_core`]; this crate adds the
//! configuration, the HTTP client and the engine facade.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Filter       │──▶│ AlgoliaClient │──▶│ Hosted index │
//! │ builder      │   │ (blocking)   │   │              │
//! └──────────────┘   └──────┬───────┘   └──────────────┘
//!                           ▼
//!                    ┌──────────────┐   ┌──────────────┐
//!                    │ Reconciler   │──▶│ Search areas │
//!                    │ + paging     │   │ (access)     │
//!                    └──────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`client`] | REST client implementing the index trait |
//! | [`engine`] | Readiness checks, queries and maintenance |
//! | [`error`] | Engine-level errors |
//! | [`commands`] | CLI command implementations |

pub mod client;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;

pub use engine::AlgoliaEngine;
pub use error::EngineError;
