//! Integration tests for the `user` field against a mocked REST upstream

use ghql_runtime::{
    ErrorCode, Executor, HttpUserSource, Registry, Request, UpstreamConfig,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FULL_SELECTION: &str =
    r#"{ user(login: "%LOGIN%") { name email about following followers } }"#;

fn user_query(login: &str) -> Request {
    Request::new(FULL_SELECTION.replace("%LOGIN%", login))
}

fn executor(config: UpstreamConfig) -> Executor {
    let source = HttpUserSource::new(config).expect("valid upstream config");
    Executor::new(Arc::new(Registry::github()), Arc::new(source))
}

/// A profile with every field maps straight through, `bio` landing on `about`
#[tokio::test]
async fn test_full_profile() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/ada"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "login": "ada",
            "id": 1,
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "bio": "Mathematician",
            "following": 3,
            "followers": 120,
            "public_repos": 2
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let executor = executor(UpstreamConfig::new().base_url(upstream.uri()));
    let response = executor.execute(&user_query("ada")).await;

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
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
}

/// GitHub's not-found body has none of the keys, so every field is null
#[tokio::test]
async fn test_unknown_login() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/doesnotexist"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "message": "Not Found",
            "documentation_url": "https://docs.github.com/rest/users/users#get-a-user"
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let executor = executor(UpstreamConfig::new().base_url(upstream.uri()));
    let response = executor.execute(&user_query("doesnotexist")).await;

    assert!(!response.has_errors());
    assert_eq!(
        response.data,
        Some(json!({
            "user": {
                "name": null,
                "email": null,
                "about": null,
                "following": null,
                "followers": null
            }
        }))
    );
}

/// With status rejection on, the same not-found answer is an error
#[tokio::test]
async fn test_unknown_login_rejected() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
        .mount(&upstream)
        .await;

    let executor = executor(
        UpstreamConfig::new()
            .base_url(upstream.uri())
            .reject_error_status(true),
    );
    let response = executor.execute(&user_query("doesnotexist")).await;

    assert!(response.data.is_none());
    assert_eq!(response.error_code(), Some(ErrorCode::UpstreamStatusError));
}

/// An upstream that never answers in time surfaces as a fetch error
#[tokio::test]
async fn test_upstream_timeout() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "Ada"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&upstream)
        .await;

    let executor = executor(
        UpstreamConfig::new()
            .base_url(upstream.uri())
            .timeout(Duration::from_millis(100)),
    );
    let response = executor.execute(&user_query("ada")).await;

    assert!(response.data.is_none());
    assert_eq!(response.error_code(), Some(ErrorCode::UpstreamFetchError));
}

/// A transport failure yields an error and no data
#[tokio::test]
async fn test_unreachable_upstream() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let executor = executor(UpstreamConfig::new().base_url(format!("http://127.0.0.1:{port}")));
    let response = executor.execute(&user_query("ada")).await;

    assert!(response.data.is_none());
    let errors = response.errors.as_ref().expect("errors");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].path, Some(vec!["user".to_string()]));
    assert_eq!(response.error_code(), Some(ErrorCode::UpstreamFetchError));
}

/// Rejected queries do not reach the upstream at all
#[tokio::test]
async fn test_invalid_queries_skip_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&upstream)
        .await;

    let executor = executor(UpstreamConfig::new().base_url(upstream.uri()));

    for (query, code) in [
        ("{ user { name } }", ErrorCode::MissingArgument),
        (r#"{ user(login: "ada") { login } }"#, ErrorCode::ValidationError),
        (
            r#"{ a: user(login: "ada") { name } b: user(login: "bob") { name } }"#,
            ErrorCode::ValidationError,
        ),
        (r#"mutation { user(login: "ada") { name } }"#, ErrorCode::ValidationError),
        ("{ user(login: ", ErrorCode::ParseError),
        (r#"{ user(login: "..") { name } }"#, ErrorCode::InvalidArgument),
        (r#"{ user(login: ".") { name } }"#, ErrorCode::InvalidArgument),
        (
            r#"{ user(login: "ada") { x: name x: email } }"#,
            ErrorCode::ValidationError,
        ),
    ] {
        let response = executor.execute(&Request::new(query)).await;
        assert_eq!(response.error_code(), Some(code), "query {query}");
        assert!(response.data.is_none(), "query {query}");
    }
}
