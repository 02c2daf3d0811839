//! HTTP routes.
//!
//! - POST /graphql - Query execution
//! - GET /health - Health check
//! - GET /schema - SDL of the registry

use bytes::Bytes;
use ghql_runtime::{ErrorCode, Executor, GraphQLError, Request, Response as GraphQLResponse};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use hyper::{Method, Request as HttpRequest, Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Path of the query endpoint.
pub const GRAPHQL_PATH: &str = "/graphql";

/// Largest `POST /graphql` body read by default, in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

pub(crate) type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

const JSON: &str = "application/json";

fn full<T: Into<Bytes>>(chunk: T) -> BoxBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

fn response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<BoxBody> {
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

fn json_response<T: Serialize>(status: StatusCode, data: &T) -> Response<BoxBody> {
    match serde_json::to_vec(data) {
        Ok(body) => response(status, JSON, body),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            response(
                StatusCode::INTERNAL_SERVER_ERROR,
                JSON,
                r#"{"errors":[{"message":"failed to serialize response","extensions":{"code":"INTERNAL_ERROR"}}]}"#,
            )
        }
    }
}

fn bad_request(message: String) -> Response<BoxBody> {
    json_response(
        StatusCode::BAD_REQUEST,
        &GraphQLResponse::error(GraphQLError::new(message).with_code(ErrorCode::ParseError)),
    )
}

fn payload_too_large(max_bytes: usize) -> Response<BoxBody> {
    json_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        &GraphQLResponse::error(
            GraphQLError::new(format!("request body exceeds {max_bytes} bytes"))
                .with_code(ErrorCode::ParseError),
        ),
    )
}

/// Reads a request body of at most `max_bytes`.
async fn read_body<B>(body: B, max_bytes: usize) -> Result<Bytes, Response<BoxBody>>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, max_bytes).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => {
            debug!(max_bytes, "Rejected oversized request body");
            Err(payload_too_large(max_bytes))
        }
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            Err(bad_request(format!("failed to read request body: {e}")))
        }
    }
}

fn health_response() -> &'static str {
    r#"{"status":"healthy"}"#
}

/// Executes a raw `POST /graphql` body.
///
/// Execution failures still answer `200`; only an unreadable body is a
/// `400`.
pub async fn graphql_response(executor: &Executor, body: &[u8]) -> Response<BoxBody> {
    let request: Request = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            debug!("Rejected request body: {}", e);
            return bad_request(format!("invalid request body: {e}"));
        }
    };

    debug!(
        operation = request.operation_name.as_deref().unwrap_or_default(),
        "Executing query: {}",
        request.query.chars().take(100).collect::<String>()
    );

    let result = executor.execute(&request).await;
    json_response(StatusCode::OK, &result)
}

/// Routes one request.
pub(crate) async fn handle(
    req: HttpRequest<Incoming>,
    executor: Arc<Executor>,
    max_body_bytes: usize,
) -> Result<Response<BoxBody>, Infallible> {
    let (parts, body) = req.into_parts();
    debug!(method = %parts.method, path = parts.uri.path(), "request");

    let response = match (&parts.method, parts.uri.path()) {
        (&Method::POST, GRAPHQL_PATH) => match read_body(body, max_body_bytes).await {
            Ok(bytes) => graphql_response(&executor, &bytes).await,
            Err(rejected) => rejected,
        },

        (&Method::GET, "/health") => response(StatusCode::OK, JSON, health_response()),

        (&Method::GET, "/schema") => response(
            StatusCode::OK,
            "text/plain; charset=utf-8",
            executor.registry().to_sdl(),
        ),

        _ => response(StatusCode::NOT_FOUND, JSON, r#"{"error":"Not Found"}"#),
    };

    Ok(response)
}
