//! Blocking HTTP client for the hosted index REST API.
//!
//! Reads go to the DSN host (`https://{app}-dsn.algolia.net`), writes to
//! the primary host (`https://{app}.algolia.net`); a configured `base_url`
//! replaces both. Every request carries the application id and API key
//! headers.
//!
//! Query parameters travel as a form-encoded `params` string, the way the
//! REST API expects them for search and multi-query requests. Array values
//! are JSON-encoded inside that string.

use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Method;
use search_algolia_core::index::{IndexError, IndexSettings, SearchArgs, SearchIndex, TaskId};
use search_algolia_core::models::{FieldMap, RawResponse};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use crate::config::{AlgoliaConfig, HttpConfig};
use crate::error::EngineError;

const APPLICATION_ID_HEADER: &str = "X-Algolia-Application-Id";
const API_KEY_HEADER: &str = "X-Algolia-API-Key";

/// Polls before giving up on an indexing task.
const TASK_POLL_ATTEMPTS: u32 = 50;
const TASK_POLL_MAX_DELAY_MS: u64 = 2000;

/// Access to the API key administration endpoints, used to validate
/// credentials before the engine is declared ready.
pub trait ApiKeys {
    /// Succeeds only for keys allowed to list every API key (admin keys).
    fn list_api_keys(&self) -> Result<(), IndexError>;

    /// ACL grants of the configured key.
    fn key_acl(&self) -> Result<Vec<String>, IndexError>;
}

/// Client bound to one application and one index.
pub struct AlgoliaClient {
    http: Client,
    read_host: Url,
    write_host: Url,
    application_id: String,
    api_key: String,
    index_name: String,
}

#[derive(Deserialize)]
struct TaskResponse {
    #[serde(rename = "taskID")]
    task_id: TaskId,
}

#[derive(Deserialize)]
struct TaskStatus {
    status: String,
}

#[derive(Deserialize)]
struct MultiResponse {
    results: Vec<RawResponse>,
}

#[derive(Deserialize)]
struct IndexList {
    #[serde(default)]
    items: Vec<IndexItem>,
}

#[derive(Deserialize)]
struct IndexItem {
    name: String,
}

#[derive(Deserialize)]
struct KeyInfo {
    #[serde(default)]
    acl: Vec<String>,
}

impl AlgoliaClient {
    pub fn new(algolia: &AlgoliaConfig, http: &HttpConfig) -> Result<Self, EngineError> {
        if !algolia.has_credentials() {
            return Err(EngineError::NotConfigured);
        }
        let app = algolia.application_id.trim();

        let (read_host, write_host) = match &algolia.base_url {
            Some(base) => {
                let url = parse_host(base)?;
                (url.clone(), url)
            }
            None => (
                parse_host(&format!("https://{}-dsn.algolia.net", app.to_lowercase()))?,
                parse_host(&format!("https://{}.algolia.net", app.to_lowercase()))?,
            ),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(http.timeout_secs))
            .build()
            .map_err(|e| EngineError::Client(e.to_string()))?;

        Ok(Self {
            http: client,
            read_host,
            write_host,
            application_id: app.to_string(),
            api_key: algolia.api_key.trim().to_string(),
            index_name: algolia.index_name.clone(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn url(&self, host: &Url, segments: &[&str]) -> Result<Url, IndexError> {
        let mut url = host.clone();
        url.path_segments_mut()
            .map_err(|_| IndexError::Transport(format!("invalid base url: {}", host)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(APPLICATION_ID_HEADER, &self.application_id)
            .header(API_KEY_HEADER, &self.api_key)
    }

    fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, IndexError> {
        let response = builder
            .send()
            .map_err(|e| IndexError::Transport(e.to_string()))?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(IndexError::Remote {
                status: status.as_u16(),
                message: remote_message(&body),
            });
        }

        response
            .json::<T>()
            .map_err(|e| IndexError::Decode(e.to_string()))
    }

    fn read<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<T, IndexError> {
        let url = self.url(&self.read_host, segments)?;
        self.execute(method, url, body)
    }

    fn write<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<T, IndexError> {
        let url = self.url(&self.write_host, segments)?;
        self.execute(method, url, body)
    }

    fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<T, IndexError> {
        debug!("{} {}", method, url);
        let mut builder = self.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send(builder)
    }

    /// Every sub-request targets this client's index.
    fn multi_query_body(&self, queries: &[SearchArgs]) -> Result<Value, IndexError> {
        let requests = queries
            .iter()
            .map(|args| Ok(json!({ "indexName": self.index_name, "params": encode_params(args)? })))
            .collect::<Result<Vec<_>, IndexError>>()?;
        Ok(json!({ "requests": requests }))
    }
}

impl SearchIndex for AlgoliaClient {
    fn search(&self, args: &SearchArgs) -> Result<RawResponse, IndexError> {
        let body = json!({ "params": encode_params(args)? });
        self.read(
            Method::POST,
            &["1", "indexes", &self.index_name, "query"],
            Some(&body),
        )
    }

    fn multi_query(&self, queries: &[SearchArgs]) -> Result<Vec<RawResponse>, IndexError> {
        let body = self.multi_query_body(queries)?;
        let response: MultiResponse =
            self.read(Method::POST, &["1", "indexes", "*", "queries"], Some(&body))?;
        Ok(response.results)
    }

    fn add_object(&self, object: &FieldMap, object_id: &str) -> Result<TaskId, IndexError> {
        let body = Value::Object(object.clone());
        let response: TaskResponse = self.write(
            Method::PUT,
            &["1", "indexes", &self.index_name, object_id],
            Some(&body),
        )?;
        Ok(response.task_id)
    }

    fn wait_task(&self, task: TaskId) -> Result<(), IndexError> {
        let task_id = task.to_string();
        let mut delay_ms = 100;

        for _ in 0..TASK_POLL_ATTEMPTS {
            let status: TaskStatus = self.read(
                Method::GET,
                &["1", "indexes", &self.index_name, "task", &task_id],
                None,
            )?;
            if status.status == "published" {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(delay_ms));
            delay_ms = (delay_ms * 2).min(TASK_POLL_MAX_DELAY_MS);
        }

        Err(IndexError::Transport(format!(
            "task {} not published after {} polls",
            task, TASK_POLL_ATTEMPTS
        )))
    }

    fn delete_object(&self, object_id: &str) -> Result<(), IndexError> {
        let _: Value = self.write(
            Method::DELETE,
            &["1", "indexes", &self.index_name, object_id],
            None,
        )?;
        Ok(())
    }

    fn delete_by_query(&self, filters: Option<&str>) -> Result<(), IndexError> {
        let _: Value = match filters {
            Some(filters) => {
                let params = url::form_urlencoded::Serializer::new(String::new())
                    .append_pair("filters", filters)
                    .finish();
                self.write(
                    Method::POST,
                    &["1", "indexes", &self.index_name, "deleteByQuery"],
                    Some(&json!({ "params": params })),
                )?
            }
            None => self.write(
                Method::POST,
                &["1", "indexes", &self.index_name, "clear"],
                None,
            )?,
        };
        Ok(())
    }

    fn set_settings(&self, settings: &IndexSettings) -> Result<(), IndexError> {
        let body = serde_json::to_value(settings).map_err(|e| IndexError::Decode(e.to_string()))?;
        let _: Value = self.write(
            Method::PUT,
            &["1", "indexes", &self.index_name, "settings"],
            Some(&body),
        )?;
        Ok(())
    }

    fn list_indexes(&self) -> Result<Vec<String>, IndexError> {
        let list: IndexList = self.read(Method::GET, &["1", "indexes"], None)?;
        Ok(list.items.into_iter().map(|i| i.name).collect())
    }

    fn delete_index(&self, name: &str) -> Result<(), IndexError> {
        let _: Value = self.write(Method::DELETE, &["1", "indexes", name], None)?;
        Ok(())
    }
}

impl ApiKeys for AlgoliaClient {
    fn list_api_keys(&self) -> Result<(), IndexError> {
        let _: Value = self.read(Method::GET, &["1", "keys"], None)?;
        Ok(())
    }

    fn key_acl(&self) -> Result<Vec<String>, IndexError> {
        let info: KeyInfo = self.read(Method::GET, &["1", "keys", &self.api_key], None)?;
        Ok(info.acl)
    }
}

fn parse_host(raw: &str) -> Result<Url, EngineError> {
    let url = Url::parse(raw).map_err(|e| EngineError::Client(format!("{}: {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(EngineError::Client(format!("{}: not a base url", raw)));
    }
    Ok(url)
}

/// Form-encode query parameters. Strings are sent as-is, everything else
/// as JSON text.
pub fn encode_params(args: &SearchArgs) -> Result<String, IndexError> {
    let value = serde_json::to_value(args).map_err(|e| IndexError::Decode(e.to_string()))?;
    let mut params = url::form_urlencoded::Serializer::new(String::new());

    if let Value::Object(map) = value {
        for (key, value) in &map {
            match value {
                Value::String(s) => params.append_pair(key, s),
                other => params.append_pair(key, &other.to_string()),
            };
        }
    }

    Ok(params.finish())
}

/// The `message` field of an error body, or the body itself.
fn remote_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: Option<&str>) -> AlgoliaConfig {
        AlgoliaConfig {
            application_id: "APPID".into(),
            api_key: "secret".into(),
            index_name: "moodle".into(),
            base_url: base_url.map(str::to_string),
        }
    }

    #[test]
    fn test_new_requires_credentials() {
        let mut algolia = config(None);
        algolia.api_key.clear();
        assert!(matches!(
            AlgoliaClient::new(&algolia, &HttpConfig::default()),
            Err(EngineError::NotConfigured)
        ));
    }

    #[test]
    fn test_hosts_derived_from_application_id() {
        let client = AlgoliaClient::new(&config(None), &HttpConfig::default()).unwrap();
        let url = client
            .url(&client.read_host, &["1", "indexes", "moodle", "query"])
            .unwrap();
        assert_eq!(url.as_str(), "https://appid-dsn.algolia.net/1/indexes/moodle/query");
        let url = client.url(&client.write_host, &["1", "indexes", "*", "queries"]).unwrap();
        assert_eq!(url.as_str(), "https://appid.algolia.net/1/indexes/*/queries");
    }

    #[test]
    fn test_base_url_override_and_segment_escaping() {
        let client =
            AlgoliaClient::new(&config(Some("http://127.0.0.1:9/")), &HttpConfig::default())
                .unwrap();
        let url = client
            .url(&client.write_host, &["1", "indexes", "moodle", "a b/c"])
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9/1/indexes/moodle/a%20b%2Fc");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = AlgoliaClient::new(&config(Some("not a url")), &HttpConfig::default());
        assert!(matches!(result, Err(EngineError::Client(_))));
    }

    #[test]
    fn test_encode_params() {
        let mut args = SearchArgs::new("forum post", "(type=1)".into(), 30);
        args.restrict_searchable_attributes = Some(vec!["title".into()]);
        let encoded = encode_params(&args).unwrap();
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(encoded.as_bytes())
            .into_owned()
            .collect();
        assert!(pairs.contains(&("query".into(), "forum post".into())));
        assert!(pairs.contains(&("filters".into(), "(type=1)".into())));
        assert!(pairs.contains(&("optionalWords".into(), "[\"forum\",\"post\"]".into())));
        assert!(pairs.contains(&("restrictSearchableAttributes".into(), "[\"title\"]".into())));
        assert!(pairs.contains(&("length".into(), "30".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "indexName"));
    }

    #[test]
    fn test_multi_query_targets_own_index() {
        let client = AlgoliaClient::new(&config(None), &HttpConfig::default()).unwrap();
        let title = SearchArgs::new("weekly", "(type=1)".into(), 10);
        let general = SearchArgs::new("forum", "(type=1)".into(), 10);
        let body = client.multi_query_body(&[title, general]).unwrap();
        let requests = body["requests"].as_array().unwrap();
        assert_eq!(requests.len(), 2);
        for request in requests {
            assert_eq!(request["indexName"], "moodle");
            assert!(request["params"].as_str().unwrap().contains("filters=%28type%3D1%29"));
        }
    }

    #[test]
    fn test_remote_message_extraction() {
        assert_eq!(remote_message(r#"{"message":"Invalid Application-ID or API key","status":403}"#), "Invalid Application-ID or API key");
        assert_eq!(remote_message("Bad gateway\n"), "Bad gateway");
    }

    #[test]
    fn test_unreachable_host_is_transport_error() {
        let client =
            AlgoliaClient::new(&config(Some("http://127.0.0.1:9/")), &HttpConfig { timeout_secs: 2 })
                .unwrap();
        let err = client.search(&SearchArgs::new("x", String::new(), 1)).unwrap_err();
        assert!(matches!(err, IndexError::Transport(_)));
    }
}
