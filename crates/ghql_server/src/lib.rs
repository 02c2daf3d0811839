//! HTTP transport for ghql.
//!
//! Serves an [`Executor`] over HTTP/1 with hyper. Each connection runs on
//! its own tokio task; the executor is shared read-only.

pub mod error;
pub mod http;

pub use error::{ServerError, ServerResult};
pub use http::{graphql_response, DEFAULT_MAX_BODY_BYTES, GRAPHQL_PATH};

use ghql_runtime::Executor;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on. `0` picks a free port.
    pub port: u16,
    /// Largest `POST /graphql` body accepted; larger ones get a 413.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Sets the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the request body limit.
    pub fn max_body_bytes(mut self, max_bytes: usize) -> Self {
        self.max_body_bytes = max_bytes;
        self
    }

    /// `host:port`, as passed to the listener.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The ghql HTTP server.
#[derive(Debug)]
pub struct GhqlServer {
    config: ServerConfig,
    executor: Arc<Executor>,
}

impl GhqlServer {
    /// Creates a server for the given executor.
    pub fn new(config: ServerConfig, executor: Arc<Executor>) -> Self {
        Self { config, executor }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured address.
    pub async fn bind(&self) -> ServerResult<TcpListener> {
        let addr = self.config.addr();
        TcpListener::bind(addr.as_str())
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Binds and serves until the process exits.
    pub async fn listen(self) -> ServerResult<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serves connections from `listener` until an accept fails.
    pub async fn serve(self, listener: TcpListener) -> ServerResult<()> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Serves connections from `listener` until `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their tasks.
    pub async fn serve_with_shutdown(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> ServerResult<()> {
        let local: SocketAddr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        info!("Listening on http://{}", local);
        info!("GraphQL endpoint: http://{}{}", local, GRAPHQL_PATH);

        tokio::pin!(shutdown);
        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted.map_err(ServerError::Accept)?,
                () = &mut shutdown => {
                    info!("Shutting down");
                    return Ok(());
                }
            };
            debug!(%peer, "accepted connection");

            let executor = Arc::clone(&self.executor);
            let max_body_bytes = self.config.max_body_bytes;
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    http::handle(req, Arc::clone(&executor), max_body_bytes)
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    if !err.is_incomplete_message() {
                        error!("Connection error: {:?}", err);
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "127.0.0.1:4000");

        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);

        let config = ServerConfig::new()
            .host("0.0.0.0")
            .port(8080)
            .max_body_bytes(4096);
        assert_eq!(config.addr(), "0.0.0.0:8080");
        assert_eq!(config.max_body_bytes, 4096);
    }
}
