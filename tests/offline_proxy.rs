use std::{sync::Arc, time::Duration};

use axum::http::StatusCode;
use axum_test::TestServer;
use krishisahay_offline::{
    cache::CacheStorage,
    config::ProxyConfig,
    error::LifecycleError,
    fetch::{Fetcher, UpstreamFetcher},
    http::{router, HEALTH_PATH},
    request::MAX_BODY_BYTES,
    OfflineInterceptor, Phase, ProxyRequest,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

const OFFLINE_BODY: &str = r#"{"answer":"You are offline. Please check your connection. For urgent help call 1800-180-1551.","method":"offline","sources":[],"related":[]}"#;

fn config_for(upstream: &str, assets: &[&str]) -> ProxyConfig {
    ProxyConfig {
        upstream: upstream.to_string(),
        static_assets: assets.iter().map(|a| a.to_string()).collect(),
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn interceptor_with(config: ProxyConfig, storage: CacheStorage) -> Arc<OfflineInterceptor> {
    let fetcher =
        UpstreamFetcher::new(config.upstream_url().unwrap(), config.request_timeout).unwrap();
    Arc::new(OfflineInterceptor::new(
        config,
        Arc::new(storage),
        Arc::new(fetcher),
    ))
}

fn interceptor_for(upstream: &str, assets: &[&str]) -> Arc<OfflineInterceptor> {
    interceptor_with(config_for(upstream, assets), CacheStorage::in_memory())
}

async fn html_upstream() -> mockito::ServerGuard {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html>root</html>")
        .create_async()
        .await;
    upstream
        .mock("GET", "/index.html")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html>index</html>")
        .create_async()
        .await;
    upstream
}

/// An address nothing listens on.
fn unreachable_upstream() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// An upstream that accepts connections and never answers.
async fn silent_upstream() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_install_caches_static_assets_and_serves_them_offline() {
    let mut upstream = mockito::Server::new_async().await;
    let root = upstream
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html>root</html>")
        .expect(1)
        .create_async()
        .await;
    let index = upstream
        .mock("GET", "/index.html")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html>index</html>")
        .expect(1)
        .create_async()
        .await;

    let interceptor = interceptor_for(&upstream.url(), &["/", "/index.html"]);
    interceptor.start().await.unwrap();

    let cache = interceptor.storage().open("krishisahay-v1").await.unwrap();
    assert_eq!(cache.keys().await, vec!["/", "/index.html"]);

    let server = TestServer::new(router(interceptor)).unwrap();
    for _ in 0..3 {
        let response = server.get("/index.html").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "<html>index</html>");
        assert_eq!(response.header("content-type"), "text/html");
    }

    root.assert_async().await;
    index.assert_async().await;
}

#[tokio::test]
async fn test_install_fails_on_missing_asset() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("GET", "/")
        .with_status(200)
        .with_body("root")
        .create_async()
        .await;
    upstream
        .mock("GET", "/index.html")
        .with_status(404)
        .create_async()
        .await;

    let interceptor = interceptor_for(&upstream.url(), &["/", "/index.html"]);
    let err = interceptor.start().await.unwrap_err();

    assert!(matches!(err, LifecycleError::Install(_)));
    assert_eq!(interceptor.phase().await, Phase::Redundant);
    assert!(interceptor
        .storage()
        .open("krishisahay-v1")
        .await
        .unwrap()
        .is_empty()
        .await);
}

#[tokio::test]
async fn test_activation_removes_stale_generations() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("GET", "/")
        .with_status(200)
        .with_body("root")
        .create_async()
        .await;

    let interceptor = interceptor_for(&upstream.url(), &["/"]);
    interceptor.storage().open("krishisahay-v0").await.unwrap();

    let deleted = interceptor.start().await.unwrap();

    assert_eq!(deleted, vec!["krishisahay-v0"]);
    assert_eq!(interceptor.storage().keys().await, vec!["krishisahay-v1"]);
}

#[tokio::test]
async fn test_query_passes_through_when_online() {
    let mut upstream = mockito::Server::new_async().await;
    let query = upstream
        .mock("POST", "/query")
        .match_body(mockito::Matcher::Json(json!({"query": "How to grow wheat?"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"answer":"Sow Oct-Nov","sources":[]}"#)
        .create_async()
        .await;

    let interceptor = interceptor_for(&upstream.url(), &[]);
    interceptor.start().await.unwrap();
    let server = TestServer::new(router(interceptor)).unwrap();

    let response = server
        .post("/query")
        .json(&json!({"query": "How to grow wheat?"}))
        .await;

    response.assert_status_ok();
    assert_eq!(response.text(), r#"{"answer":"Sow Oct-Nov","sources":[]}"#);
    query.assert_async().await;
}

#[tokio::test]
async fn test_query_http_error_is_not_replaced() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("POST", "/query")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let interceptor = interceptor_for(&upstream.url(), &[]);
    interceptor.start().await.unwrap();
    let server = TestServer::new(router(interceptor)).unwrap();

    let response = server.post("/query").json(&json!({"query": "aphids"})).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.text(), "boom");
}

#[tokio::test]
async fn test_query_offline_returns_fallback() {
    let interceptor = interceptor_for(&unreachable_upstream(), &[]);
    interceptor.start().await.unwrap();
    let server = TestServer::new(router(interceptor)).unwrap();

    let response = server.post("/query").json(&json!({"query": "PM-KISAN"})).await;

    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "application/json");
    assert_eq!(response.text(), OFFLINE_BODY);
}

#[tokio::test]
async fn test_query_timeout_returns_fallback() {
    let config = ProxyConfig {
        request_timeout: Duration::from_millis(200),
        ..config_for(&silent_upstream().await, &[])
    };
    let interceptor = interceptor_with(config, CacheStorage::in_memory());
    interceptor.start().await.unwrap();
    let server = TestServer::new(router(interceptor)).unwrap();

    let response = tokio::time::timeout(
        Duration::from_secs(5),
        server.post("/query").json(&json!({"query": "rust on wheat"})),
    )
    .await
    .unwrap();

    response.assert_status_ok();
    assert_eq!(response.text(), OFFLINE_BODY);
}

#[tokio::test]
async fn test_oversized_body_is_payload_too_large() {
    let interceptor = interceptor_for(&unreachable_upstream(), &[]);
    interceptor.start().await.unwrap();
    let server = TestServer::new(router(interceptor)).unwrap();

    let response = server
        .post("/query")
        .bytes(vec![b'a'; MAX_BODY_BYTES + 1].into())
        .await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_scheme_relative_target_stays_on_upstream() {
    let mut upstream = mockito::Server::new_async().await;
    let mut other = mockito::Server::new_async().await;
    let stolen = other
        .mock("GET", "/secret")
        .with_status(200)
        .with_body("secret")
        .expect(0)
        .create_async()
        .await;
    let local = upstream
        .mock("GET", mockito::Matcher::Any)
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let fetcher = UpstreamFetcher::new(
        url::Url::parse(&upstream.url()).unwrap(),
        Duration::from_secs(5),
    )
    .unwrap();
    let target = format!("//{}/secret", other.host_with_port());
    let response = fetcher.fetch(ProxyRequest::get(target)).await.unwrap();

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    local.assert_async().await;
    stolen.assert_async().await;
}

#[tokio::test]
async fn test_new_generation_replaces_old_one_on_disk() {
    let cache_dir = TempDir::new().unwrap();
    let upstream = html_upstream().await;

    let v1 = interceptor_with(
        config_for(&upstream.url(), &["/", "/index.html"]),
        CacheStorage::load(cache_dir.path()).await.unwrap(),
    );
    v1.start().await.unwrap();
    assert!(cache_dir.path().join("krishisahay-v1").is_dir());
    drop(v1);

    let config = ProxyConfig {
        cache_name: "krishisahay-v2".into(),
        ..config_for(&upstream.url(), &["/", "/index.html"])
    };
    let v2 = interceptor_with(config, CacheStorage::load(cache_dir.path()).await.unwrap());
    assert_eq!(v2.storage().keys().await, vec!["krishisahay-v1"]);

    let deleted = v2.start().await.unwrap();

    assert_eq!(deleted, vec!["krishisahay-v1"]);
    assert!(!cache_dir.path().join("krishisahay-v1").exists());
    let reloaded = CacheStorage::load(cache_dir.path()).await.unwrap();
    assert_eq!(reloaded.keys().await, vec!["krishisahay-v2"]);
}

#[tokio::test]
async fn test_restart_while_offline_serves_persisted_cache() {
    let cache_dir = TempDir::new().unwrap();
    {
        let upstream = html_upstream().await;
        let first = interceptor_with(
            config_for(&upstream.url(), &["/", "/index.html"]),
            CacheStorage::load(cache_dir.path()).await.unwrap(),
        );
        first.start().await.unwrap();
    }

    let restarted = interceptor_with(
        config_for(&unreachable_upstream(), &["/", "/index.html"]),
        CacheStorage::load(cache_dir.path()).await.unwrap(),
    );
    assert!(restarted.start().await.is_err());
    assert!(restarted.storage().has_entries().await);

    let server = TestServer::new(router(restarted)).unwrap();
    let response = server.get("/index.html").await;

    response.assert_status_ok();
    assert_eq!(response.text(), "<html>index</html>");
    assert_eq!(response.header("content-type"), "text/html");
}

#[tokio::test]
async fn test_uncached_request_offline_is_bad_gateway() {
    let interceptor = interceptor_for(&unreachable_upstream(), &[]);
    interceptor.start().await.unwrap();
    let server = TestServer::new(router(interceptor)).unwrap();

    let response = server.get("/schemes").await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["message"], "Upstream unreachable");
}

#[tokio::test]
async fn test_uncached_request_forwarded_unmodified() {
    let mut upstream = mockito::Server::new_async().await;
    let schemes = upstream
        .mock("GET", "/schemes")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"schemes":[]}"#)
        .expect(2)
        .create_async()
        .await;

    let interceptor = interceptor_for(&upstream.url(), &[]);
    interceptor.start().await.unwrap();
    let server = TestServer::new(router(interceptor)).unwrap();

    // Runtime responses are not added to the cache, so both go upstream.
    for _ in 0..2 {
        let response = server.get("/schemes").await;
        response.assert_status_ok();
        assert_eq!(response.text(), r#"{"schemes":[]}"#);
    }

    schemes.assert_async().await;
}

#[tokio::test]
async fn test_health_is_answered_locally() {
    let interceptor = interceptor_for(&unreachable_upstream(), &[]);
    interceptor.start().await.unwrap();
    let server = TestServer::new(router(interceptor)).unwrap();

    let response = server.get(HEALTH_PATH).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["phase"], "activated");
    assert_eq!(body["cache"], "krishisahay-v1");
}
