//! Tests for the `search-algolia` binary.
//!
//! None of these reach the network: they run without credentials, or point
//! the client at a closed local port.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env(algolia_section: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("algolia.toml");
    let config_content = format!(
        r#"{}

[engine]
registered_areas = ["mod_forum-post"]

[http]
timeout_secs = 2
"#,
        algolia_section
    );
    fs::write(&config_path, config_content).unwrap();
    (tmp, config_path)
}

fn unconfigured() -> (TempDir, PathBuf) {
    setup_test_env("[algolia]\nindex_name = \"test\"")
}

/// Credentials present, but the service is a closed local port.
fn unreachable() -> (TempDir, PathBuf) {
    setup_test_env(
        r#"[algolia]
application_id = "TESTAPP"
api_key = "testkey"
index_name = "test"
base_url = "http://127.0.0.1:9""#,
    )
}

fn run_cli(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_search-algolia"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("ALGOLIA_API_KEY")
        .env_remove("ALGOLIA_APPLICATION_ID")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run search-algolia: {}", e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_status_without_credentials() {
    let (_tmp, config_path) = unconfigured();
    let (stdout, _stderr, success) = run_cli(&config_path, &["status"]);
    assert!(!success);
    assert!(stdout.contains("index: test"));
    assert!(stdout.contains("not ready"));
    assert!(stdout.contains("not configured"));
}

#[test]
fn test_status_with_unreachable_service() {
    let (_tmp, config_path) = unreachable();
    let (stdout, _stderr, success) = run_cli(&config_path, &["status"]);
    assert!(!success);
    assert!(stdout.contains("not ready"));
    assert!(stdout.contains("invalid credentials"));
}

#[test]
fn test_search_without_credentials_fails() {
    let (_tmp, config_path) = unconfigured();
    let (_stdout, stderr, success) = run_cli(&config_path, &["search", "forum"]);
    assert!(!success);
    assert!(stderr.contains("not configured"), "stderr={}", stderr);
}

#[test]
fn test_search_query_error_yields_no_results() {
    let (_tmp, config_path) = unreachable();
    let (stdout, stderr, success) = run_cli(&config_path, &["search", "forum"]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("No results."));
    assert!(stderr.contains("Error executing search query"));
}

#[test]
fn test_search_json_reports_error() {
    let (_tmp, config_path) = unreachable();
    let (stdout, _stderr, success) = run_cli(&config_path, &["search", "forum", "--json"]);
    assert!(success);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["total"], 0);
    assert_eq!(value["page"], 0);
    assert!(value["results"].as_array().unwrap().is_empty());
    assert!(value["error"].as_str().unwrap().contains("transport error"));
}

#[test]
fn test_search_rejects_bad_date() {
    let (_tmp, config_path) = unreachable();
    let (_stdout, stderr, success) =
        run_cli(&config_path, &["search", "forum", "--since", "yesterday"]);
    assert!(!success);
    assert!(stderr.contains("expected YYYY-MM-DD"));
}

#[test]
fn test_delete_failure_is_reported() {
    let (_tmp, config_path) = unreachable();
    let (_stdout, stderr, success) =
        run_cli(&config_path, &["delete", "--area", "mod_forum-post"]);
    assert!(!success);
    assert!(stderr.contains("Delete failed"));
}

#[test]
fn test_index_reads_documents_file() {
    let (tmp, config_path) = unconfigured();
    let docs = tmp.path().join("docs.json");
    fs::write(
        &docs,
        r#"[{"id":"mod_forum-post-1","itemid":1,"title":"T","content":"C","contextid":1,
            "areaid":"mod_forum-post","type":1,"courseid":1,"owneruserid":0,"modified":5}]"#,
    )
    .unwrap();
    let (stdout, stderr, success) = run_cli(&config_path, &["index", docs.to_str().unwrap()]);
    assert!(!success);
    assert!(stdout.contains("Indexed 0 of 1 document(s)."));
    assert!(stderr.contains("1 document(s) failed to index"));
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("algolia.toml");
    fs::write(&config_path, "[engine]\nquery_size = 0\n").unwrap();
    let (_stdout, stderr, success) = run_cli(&config_path, &["status"]);
    assert!(!success);
    assert!(stderr.contains("engine.query_size must be > 0"));
}
