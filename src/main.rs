//! # Search Algolia CLI (`search-algolia`)
//!
//! Administrative and diagnostic interface to the hosted search index.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `status` | Check credentials and API key grants |
//! | `setup` | Check credentials and apply index settings |
//! | `search "<query>"` | Run a query as a given user |
//! | `index <file.json>` | Add one document or a list of documents |
//! | `delete [--area <id>]` | Delete an area's records, or all records |
//! | `clear [--index <name>]` | Drop one index, or every index |
//!
//! ## Examples
//!
//! ```bash
//! search-algolia --config ./config/algolia.toml status
//! search-algolia search "forum post" --title "Weekly update" --since 2024-01-01
//! RUST_LOG=search_algolia=debug search-algolia search "exam"
//! ```

use clap::{Parser, Subcommand};
use search_algolia::commands::{self, SearchOptions};
use search_algolia::config;
use search_algolia::AlgoliaEngine;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "search-algolia",
    about = "Hosted-index search adapter: queries, readiness checks and index maintenance",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/algolia.toml")]
    config: PathBuf,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that credentials are present and the API key carries the
    /// required ACLs.
    Status,

    /// Check readiness and push index settings.
    Setup,

    /// Search the index.
    ///
    /// Only areas listed in `engine.registered_areas` are searchable; their
    /// items are all treated as visible.
    Search {
        /// Free-text query.
        query: String,

        /// Only documents whose title matches this phrase.
        #[arg(long)]
        title: Option<String>,

        /// Only documents modified on or after this date (YYYY-MM-DD).
        #[arg(long)]
        since: Option<String>,

        /// Only documents modified on or before this date (YYYY-MM-DD).
        #[arg(long)]
        until: Option<String>,

        /// Restrict to an area id (repeatable).
        #[arg(long = "area")]
        areas: Vec<String>,

        /// Restrict to a course id (repeatable).
        #[arg(long = "course")]
        courses: Vec<i64>,

        /// Restrict to a context id (repeatable).
        #[arg(long = "context")]
        contexts: Vec<i64>,

        /// Requesting user id.
        #[arg(long, default_value_t = 0)]
        user: i64,

        /// Result page, starting at 0.
        #[arg(long, default_value_t = 0)]
        page: usize,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Add documents from a JSON file (one document or an array).
    Index {
        /// Path to the JSON file.
        path: PathBuf,
    },

    /// Delete records from the index.
    Delete {
        /// Only records of this area.
        #[arg(long)]
        area: Option<String>,
    },

    /// Drop indexes.
    Clear {
        /// Only this index; every index of the application otherwise.
        #[arg(long)]
        index: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "search_algolia=debug,search_algolia_core=debug"
    } else {
        "search_algolia=info,search_algolia_core=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    let engine = AlgoliaEngine::new(cfg);

    match cli.command {
        Commands::Status => {
            if !commands::run_status(&engine) {
                std::process::exit(1);
            }
        }
        Commands::Setup => {
            commands::run_setup(&engine)?;
        }
        Commands::Search {
            query,
            title,
            since,
            until,
            areas,
            courses,
            contexts,
            user,
            page,
            json,
        } => {
            let opts = SearchOptions {
                title,
                since,
                until,
                areas,
                courses,
                contexts,
                user_id: user,
                page,
                json,
            };
            commands::run_search(&engine, &query, &opts)?;
        }
        Commands::Index { path } => {
            commands::run_index(&engine, &path)?;
        }
        Commands::Delete { area } => {
            commands::run_delete(&engine, area.as_deref())?;
        }
        Commands::Clear { index } => {
            commands::run_clear(&engine, index.as_deref())?;
        }
    }

    Ok(())
}
