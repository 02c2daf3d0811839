//! Integration tests for ghql_server

use ghql_runtime::{Executor, HttpUserSource, Registry, UpstreamConfig};
use ghql_server::{GhqlServer, ServerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::oneshot;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestServer {
    base: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(upstream: &MockServer) -> Self {
        Self::start_with(upstream, ServerConfig::new()).await
    }

    async fn start_with(upstream: &MockServer, config: ServerConfig) -> Self {
        let source = HttpUserSource::new(UpstreamConfig::new().base_url(upstream.uri())).unwrap();
        let executor = Executor::new(Arc::new(Registry::github()), Arc::new(source));
        let server = GhqlServer::new(config.port(0), Arc::new(executor));

        let listener = server.bind().await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve_with_shutdown(listener, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            base,
            shutdown: Some(tx),
            handle,
        }
    }

    async fn post_graphql(&self, body: String) -> (u16, Value) {
        let response = reqwest::Client::new()
            .post(format!("{}/graphql", self.base))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        let bytes = response.bytes().await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn get(&self, route: &str) -> (u16, String) {
        let response = reqwest::get(format!("{}{}", self.base, route)).await.unwrap();
        let status = response.status().as_u16();
        (status, response.text().await.unwrap())
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap();
    }
}

async fn upstream() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/ada"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "bio": "Mathematician",
            "following": 3,
            "followers": 120
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/doesnotexist"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&server)
        .await;
    server
}

/// Test a full query over HTTP
#[tokio::test]
async fn test_post_graphql() {
    let upstream = upstream().await;
    let server = TestServer::start(&upstream).await;

    let body = json!({
        "query": "query ($login: String!) { user(login: $login) { name email about following followers } }",
        "variables": {"login": "ada"}
    });
    let (status, value) = server.post_graphql(body.to_string()).await;

    assert_eq!(status, 200);
    assert_eq!(
        value,
        json!({
            "data": {
                "user": {
                    "name": "Ada Lovelace",
                    "email": "ada@example.com",
                    "about": "Mathematician",
                    "following": 3,
                    "followers": 120
                }
            }
        })
    );

    server.stop().await;
}

/// Test the not-found profile over HTTP
#[tokio::test]
async fn test_post_graphql_not_found() {
    let upstream = upstream().await;
    let server = TestServer::start(&upstream).await;

    let body = json!({"query": r#"{ user(login: "doesnotexist") { name about } }"#});
    let (status, value) = server.post_graphql(body.to_string()).await;

    assert_eq!(status, 200);
    assert_eq!(value, json!({"data": {"user": {"name": null, "about": null}}}));

    server.stop().await;
}

/// Test malformed request bodies
#[tokio::test]
async fn test_post_graphql_bad_request() {
    let upstream = upstream().await;
    let server = TestServer::start(&upstream).await;

    let (status, value) = server.post_graphql("{".to_string()).await;
    assert_eq!(status, 400);
    assert!(value["errors"].is_array());

    server.stop().await;
}

/// Test health, schema and unknown routes
#[tokio::test]
async fn test_other_routes() {
    let upstream = upstream().await;
    let server = TestServer::start(&upstream).await;

    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({"status": "healthy"}));

    let (status, body) = server.get("/schema").await;
    assert_eq!(status, 200);
    assert_eq!(body, Registry::github().to_sdl());

    let (status, _) = server.get("/graphql").await;
    assert_eq!(status, 404);
    let (status, _) = server.get("/nope").await;
    assert_eq!(status, 404);

    server.stop().await;
}

/// Concurrent requests are served independently
#[tokio::test]
async fn test_concurrent_requests() {
    let upstream = upstream().await;
    let server = TestServer::start(&upstream).await;

    let body = json!({"query": r#"{ user(login: "ada") { followers } }"#}).to_string();
    let (a, b, c) = tokio::join!(
        server.post_graphql(body.clone()),
        server.post_graphql(body.clone()),
        server.post_graphql(body),
    );
    for (status, value) in [a, b, c] {
        assert_eq!(status, 200);
        assert_eq!(value["data"]["user"]["followers"], 120);
    }

    server.stop().await;
}

/// Test that deeply nested documents are rejected and the server keeps serving
#[tokio::test]
async fn test_deeply_nested_query() {
    let upstream = upstream().await;
    let server = TestServer::start(&upstream).await;

    let query = format!(
        "{{ user(login: {}\"ada\"{}) {{ name }} }}",
        "[".repeat(50_000),
        "]".repeat(50_000)
    );
    let (status, body) = server
        .post_graphql(json!({ "query": query }).to_string())
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["errors"][0]["extensions"]["code"], "PARSE_ERROR");
    assert!(body.get("data").is_none());

    let (status, _) = server.get("/health").await;
    assert_eq!(status, 200);

    server.stop().await;
}

/// Test that bodies over the configured limit get a 413
#[tokio::test]
async fn test_oversized_body() {
    let upstream = upstream().await;
    let server = TestServer::start_with(&upstream, ServerConfig::new().max_body_bytes(256)).await;

    let padding = " ".repeat(1024);
    let (status, body) = server
        .post_graphql(format!(r#"{{"query": "{{ __typename }}"{padding}}}"#))
        .await;
    assert_eq!(status, 413);
    assert_eq!(body["errors"][0]["extensions"]["code"], "PARSE_ERROR");

    let (status, body) = server
        .post_graphql(json!({"query": "{ __typename }"}).to_string())
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({"data": {"__typename": "Query"}}));

    server.stop().await;
}
