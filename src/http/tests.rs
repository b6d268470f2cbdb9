//! Tests for the HTTP client module

use super::*;
use crate::config::{BackoffConfig, HttpConfig};
use crate::error::{Error, ErrorKind};
use crate::types::BackoffType;
use reqwest::Method;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        backoff_type: BackoffType::Constant,
        initial_ms: 10,
        max_ms: 1000,
    }
}

fn client_for(server: &MockServer) -> HttpClient {
    let config = HttpClientConfig::builder()
        .base_url(server.uri())
        .max_retries(3)
        .backoff(fast_backoff())
        .build();
    HttpClient::with_config(config).unwrap()
}

#[test]
fn test_http_client_config_from_http_config() {
    let http = HttpConfig {
        timeout_seconds: 12,
        max_retries: 7,
        ignore_statuses: vec![404],
        ..HttpConfig::default()
    };
    let config = HttpClientConfig::from(&http);
    assert_eq!(config.timeout, Duration::from_secs(12));
    assert_eq!(config.max_retries, 7);
    assert_eq!(config.ignore_statuses, vec![404]);
    assert!(config.base_url.is_none());
}

#[test]
fn test_http_client_config_builder() {
    let config = HttpClientConfig::builder()
        .base_url("https://api.example.com")
        .timeout(Duration::from_secs(60))
        .max_retries(5)
        .ignore_status(403)
        .header("X-Custom", "value")
        .user_agent("test-agent/1.0")
        .build();

    assert_eq!(config.base_url, Some("https://api.example.com".to_string()));
    assert_eq!(config.timeout, Duration::from_secs(60));
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.ignore_statuses, vec![403]);
    assert_eq!(
        config.default_headers.get("X-Custom"),
        Some(&"value".to_string())
    );
    assert_eq!(config.user_agent, "test-agent/1.0");
}

#[test]
fn test_request_config_builder() {
    let config = RequestConfig::new()
        .query("page", "1")
        .header("X-Request-Id", "abc123")
        .json(serde_json::json!({"key": "value"}))
        .timeout(Duration::from_secs(10))
        .retries(2);

    assert_eq!(config.query.get("page"), Some(&"1".to_string()));
    assert_eq!(
        config.headers.get("X-Request-Id"),
        Some(&"abc123".to_string())
    );
    assert!(config.body.is_some());
    assert_eq!(config.timeout, Some(Duration::from_secs(10)));
    assert_eq!(config.max_retries, Some(2));
}

#[tokio::test]
async fn test_send_request_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/jobs"))
        .and(query_param("type", "export"))
        .and(header("X-Tenant", "acme"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "j1"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let request = RequestConfig::new()
        .query("type", "export")
        .header("X-Tenant", "acme")
        .json(serde_json::json!({"range": "2024"}));

    let response = client
        .send_request(Method::POST, "/jobs", request, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["id"], "j1");
}

#[tokio::test]
async fn test_send_request_uses_log_formatter() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let calls = std::sync::atomic::AtomicUsize::new(0);
    // Borrows a local, so it cannot be 'static
    let formatter: &LogFormatter<'_> = &|response| {
        calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("poll answered {}", response.status())
    };

    let response = client
        .send_request(Method::GET, "/status", RequestConfig::new(), Some(formatter))
        .await
        .unwrap();
    assert!(response.is_some());
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ignored_status_returns_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(mock_server.uri())
        .ignore_status(404)
        .build();
    let client = HttpClient::with_config(config).unwrap();

    assert!(client.get("/gone").await.unwrap().is_none());
}

#[tokio::test]
async fn test_client_error_is_system_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.get("/missing").await.unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 400, ref body } if body == "bad request"));
    assert_eq!(err.kind(), ErrorKind::System);
}

#[tokio::test]
async fn test_retry_on_500() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let response = client.get("/flaky").await.unwrap().unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_rate_limit_honors_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let response = client.get("/limited").await.unwrap().unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_rate_limit_wait_above_ceiling_is_transient() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7200"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server);
    let err = client.get("/limited").await.unwrap_err();

    assert!(matches!(
        err,
        Error::BackoffExceeded {
            wait_seconds: 7200,
            max_seconds: 600
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Transient);
}

#[tokio::test]
async fn test_max_retries_exceeded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/always-fail"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(mock_server.uri())
        .max_retries(2)
        .backoff(fast_backoff())
        .build();
    let client = HttpClient::with_config(config).unwrap();
    let err = client.get("/always-fail").await.unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
    assert!(err.is_partition_scoped());
}

#[tokio::test]
async fn test_full_url_bypasses_base() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/download/file.jsonl"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url("https://unused.example.com")
        .build();
    let client = HttpClient::with_config(config).unwrap();

    let url = format!("{}/download/file.jsonl", mock_server.uri());
    assert!(client.get(&url).await.unwrap().is_some());
}

#[tokio::test]
async fn test_base_url_with_prefix_keeps_prefix() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v2/jobs"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .base_url(format!("{}/api/v2/", mock_server.uri()))
        .build();
    let client = HttpClient::with_config(config).unwrap();

    assert!(client.get("/jobs").await.unwrap().is_some());
}

#[tokio::test]
async fn test_relative_path_without_base_is_invalid() {
    let client = HttpClient::new().unwrap();
    let err = client.get("/jobs").await.unwrap_err();
    assert!(matches!(err, Error::InvalidUrl(_)));
}
