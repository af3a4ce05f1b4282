use search_algolia::config::{load_config, API_KEY_ENV};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config(content: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("algolia.toml");
    fs::write(&path, content).unwrap();
    (tmp, path)
}

#[test]
fn test_defaults_applied() {
    let (_tmp, path) = write_config(
        r#"[algolia]
application_id = "APP"
api_key = "key"
"#,
    );
    let cfg = load_config(&path).unwrap();
    assert_eq!(cfg.algolia.index_name, "search");
    assert!(cfg.algolia.base_url.is_none());
    assert_eq!(cfg.engine.query_size, 120);
    assert_eq!(cfg.engine.max_results, 100);
    assert_eq!(cfg.engine.per_page, 10);
    assert_eq!(cfg.engine.highlight_start, "@@HI_S@@");
    assert_eq!(cfg.engine.highlight_end, "@@HI_E@@");
    assert!(cfg.engine.cache_client);
    assert!(cfg.engine.wait_for_tasks);
    assert!(cfg.engine.registered_areas.is_empty());
    assert_eq!(cfg.http.timeout_secs, 30);
}

#[test]
fn test_full_config() {
    let (_tmp, path) = write_config(
        r#"[algolia]
application_id = "APP"
api_key = "key"
index_name = "moodle_search"
base_url = "http://localhost:8080"

[engine]
query_size = 50
max_results = 40
per_page = 5
highlight_start = "[["
highlight_end = "]]"
cache_client = false
registered_areas = ["mod_forum-post", "mod_page-activity"]

[http]
timeout_secs = 5
"#,
    );
    let cfg = load_config(&path).unwrap();
    assert_eq!(cfg.algolia.index_name, "moodle_search");
    assert_eq!(cfg.algolia.base_url.as_deref(), Some("http://localhost:8080"));
    let params = cfg.engine.query_params();
    assert_eq!((params.query_size, params.max_results), (50, 40));
    assert_eq!(cfg.engine.markers().mark("x"), "[[x]]");
    assert!(!cfg.engine.cache_client);
    assert_eq!(cfg.engine.registered_areas.len(), 2);
    assert_eq!(cfg.http.timeout_secs, 5);
}

#[test]
fn test_missing_credentials_are_not_a_load_error() {
    let (_tmp, path) = write_config("[engine]\nper_page = 20\n");
    let cfg = load_config(&path).unwrap();
    assert_eq!(cfg.engine.per_page, 20);
    assert!(cfg.algolia.application_id.is_empty() || std::env::var("ALGOLIA_APPLICATION_ID").is_ok());
}

#[test]
fn test_api_key_env_fallback() {
    std::env::set_var(API_KEY_ENV, "from-env");
    let (_tmp, path) = write_config("[algolia]\napplication_id = \"APP\"\napi_key = \"\"\n");
    let cfg = load_config(&path).unwrap();
    std::env::remove_var(API_KEY_ENV);
    assert_eq!(cfg.algolia.api_key, "from-env");
    assert!(cfg.algolia.has_credentials());
}

#[test]
fn test_invalid_sizes_rejected() {
    for (section, message) in [
        ("query_size = 0", "engine.query_size"),
        ("max_results = 0", "engine.max_results"),
        ("per_page = 0", "engine.per_page"),
    ] {
        let (_tmp, path) = write_config(&format!("[engine]\n{}\n", section));
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains(message), "{}", err);
    }
}

#[test]
fn test_invalid_markers_rejected() {
    let (_tmp, path) = write_config("[engine]\nhighlight_start = \"##\"\nhighlight_end = \"##\"\n");
    assert!(load_config(&path).unwrap_err().to_string().contains("must differ"));

    let (_tmp, path) = write_config("[engine]\nhighlight_start = \"\"\n");
    assert!(load_config(&path).unwrap_err().to_string().contains("must not be empty"));
}

#[test]
fn test_missing_file_and_bad_toml() {
    let err = load_config(std::path::Path::new("/nonexistent/algolia.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));

    let (_tmp, path) = write_config("[engine\nquery_size = ");
    let err = load_config(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}
