//! Upstream REST source for the `user` root field.
//!
//! One call per query execution: a single GET, no retries, no caching.

use crate::error::ErrorCode;
use crate::resolver::RawRecord;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default upstream base URL.
pub const GITHUB_API: &str = "https://api.github.com";

/// Error raised while fetching the upstream record.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("invalid upstream base url `{url}`: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("response from {url} is not valid JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{url} answered with HTTP status {status}")]
    Status { url: String, status: u16 },

    #[error("login `{0}` cannot be used as a path segment")]
    InvalidLogin(String),
}

impl UpstreamError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Status { .. } => ErrorCode::UpstreamStatusError,
            Self::InvalidLogin(_) => ErrorCode::InvalidArgument,
            Self::InvalidUrl { .. } | Self::Client(_) => ErrorCode::InternalError,
            Self::Request { .. } | Self::Decode { .. } => ErrorCode::UpstreamFetchError,
        }
    }
}

/// Upstream configuration.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL; user records live under `{base_url}/users/{login}`.
    pub base_url: String,
    /// `User-Agent` header. GitHub rejects requests without one.
    pub user_agent: String,
    /// Overall request timeout. `None` keeps the client default.
    pub timeout: Option<Duration>,
    /// Fail on non-2xx statuses instead of treating the body as data.
    pub reject_error_status: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: GITHUB_API.to_string(),
            user_agent: concat!("ghql/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: None,
            reject_error_status: false,
        }
    }
}

impl UpstreamConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the `User-Agent` header.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Treats non-2xx statuses as errors.
    pub fn reject_error_status(mut self, reject: bool) -> Self {
        self.reject_error_status = reject;
        self
    }
}

/// Source of user records.
#[async_trait]
pub trait UserSource: Send + Sync {
    /// Fetches the raw record for `login`.
    async fn fetch_user(&self, login: &str) -> Result<RawRecord, UpstreamError>;
}

/// [`UserSource`] backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct HttpUserSource {
    client: reqwest::Client,
    base_url: Url,
    reject_error_status: bool,
}

impl HttpUserSource {
    /// Creates a source from configuration.
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let invalid = |message: String| UpstreamError::InvalidUrl {
            url: config.base_url.clone(),
            message,
        };
        let base_url = Url::parse(&config.base_url).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("url cannot be a base".to_string()));
        }

        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(UpstreamError::Client)?;

        Ok(Self {
            client,
            base_url,
            reject_error_status: config.reject_error_status,
        })
    }

    /// Creates a source for the public GitHub API.
    pub fn github() -> Result<Self, UpstreamError> {
        Self::new(UpstreamConfig::default())
    }

    /// URL of the user record for `login`. The login is percent-encoded as
    /// a single path segment.
    ///
    /// Empty, `.` and `..` logins are rejected: as path segments they would
    /// address `/users` or its parent rather than a user.
    pub fn user_url(&self, login: &str) -> Result<Url, UpstreamError> {
        if matches!(login, "" | "." | "..") {
            return Err(UpstreamError::InvalidLogin(login.to_string()));
        }

        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("users").push(login);
        }
        Ok(url)
    }
}

#[async_trait]
impl UserSource for HttpUserSource {
    async fn fetch_user(&self, login: &str) -> Result<RawRecord, UpstreamError> {
        let url = self.user_url(login)?;
        debug!(%url, "fetching upstream user");

        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(|source| UpstreamError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            if self.reject_error_status {
                return Err(UpstreamError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            warn!(%url, status = status.as_u16(), "upstream status is not a success; using body as data");
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| UpstreamError::Request {
                url: url.to_string(),
                source,
            })?;
        let value: Value =
            serde_json::from_slice(&body).map_err(|source| UpstreamError::Decode {
                url: url.to_string(),
                source,
            })?;

        Ok(into_record(value))
    }
}

/// A JSON body that is not an object carries none of the expected keys.
pub fn into_record(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        other => {
            debug!(kind = crate::resolver::json_kind(&other), "upstream body is not an object");
            RawRecord::new()
        }
    }
}
