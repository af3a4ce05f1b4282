use anyhow::{Context, Result};
use search_algolia_core::highlight::HighlightMarkers;
use search_algolia_core::models::{DISPLAY_RESULTS_PER_PAGE, MAX_RESULTS, QUERY_SIZE};
use search_algolia_core::search::QueryParams;
use serde::Deserialize;
use std::path::Path;

pub const API_KEY_ENV: &str = "ALGOLIA_API_KEY";
pub const APPLICATION_ID_ENV: &str = "ALGOLIA_APPLICATION_ID";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub algolia: AlgoliaConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlgoliaConfig {
    #[serde(default)]
    pub application_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_index_name")]
    pub index_name: String,
    /// Overrides both the read and the write host.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for AlgoliaConfig {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            api_key: String::new(),
            index_name: default_index_name(),
            base_url: None,
        }
    }
}

fn default_index_name() -> String {
    "search".to_string()
}

impl AlgoliaConfig {
    pub fn has_credentials(&self) -> bool {
        !self.application_id.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_query_size")]
    pub query_size: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    #[serde(default = "default_highlight_start")]
    pub highlight_start: String,
    #[serde(default = "default_highlight_end")]
    pub highlight_end: String,
    #[serde(default = "default_true")]
    pub cache_client: bool,
    #[serde(default = "default_true")]
    pub wait_for_tasks: bool,
    /// Area ids the command line treats as registered.
    #[serde(default)]
    pub registered_areas: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            query_size: QUERY_SIZE,
            max_results: MAX_RESULTS,
            per_page: DISPLAY_RESULTS_PER_PAGE,
            highlight_start: default_highlight_start(),
            highlight_end: default_highlight_end(),
            cache_client: true,
            wait_for_tasks: true,
            registered_areas: Vec::new(),
        }
    }
}

fn default_query_size() -> usize {
    QUERY_SIZE
}
fn default_max_results() -> usize {
    MAX_RESULTS
}
fn default_per_page() -> usize {
    DISPLAY_RESULTS_PER_PAGE
}
fn default_highlight_start() -> String {
    HighlightMarkers::default().start
}
fn default_highlight_end() -> String {
    HighlightMarkers::default().end
}
fn default_true() -> bool {
    true
}

impl EngineConfig {
    pub fn markers(&self) -> HighlightMarkers {
        HighlightMarkers::new(self.highlight_start.clone(), self.highlight_end.clone())
    }

    pub fn query_params(&self) -> QueryParams {
        QueryParams {
            query_size: self.query_size,
            max_results: self.max_results,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_env_fallbacks(&mut config.algolia);
    validate(&config)?;

    Ok(config)
}

/// Fill empty credentials from the environment.
fn apply_env_fallbacks(algolia: &mut AlgoliaConfig) {
    if algolia.api_key.trim().is_empty() {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            algolia.api_key = key;
        }
    }
    if algolia.application_id.trim().is_empty() {
        if let Ok(id) = std::env::var(APPLICATION_ID_ENV) {
            algolia.application_id = id;
        }
    }
}

pub fn validate(config: &Config) -> Result<()> {
    let engine = &config.engine;

    if engine.query_size == 0 {
        anyhow::bail!("engine.query_size must be > 0");
    }
    if engine.max_results == 0 {
        anyhow::bail!("engine.max_results must be > 0");
    }
    if engine.per_page == 0 {
        anyhow::bail!("engine.per_page must be > 0");
    }

    if engine.highlight_start.is_empty() || engine.highlight_end.is_empty() {
        anyhow::bail!("engine.highlight_start and engine.highlight_end must not be empty");
    }
    if engine.highlight_start == engine.highlight_end {
        anyhow::bail!("engine.highlight_start and engine.highlight_end must differ");
    }

    if config.algolia.index_name.trim().is_empty() {
        anyhow::bail!("algolia.index_name must not be empty");
    }
    if config.http.timeout_secs == 0 {
        anyhow::bail!("http.timeout_secs must be > 0");
    }

    Ok(())
}
