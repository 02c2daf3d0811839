//! Command-line interface for ghql.
//!
//! # Usage
//!
//! ```bash
//! # Serve the GraphQL endpoint on 127.0.0.1:4000
//! ghql serve
//!
//! # Run one query and print the response
//! ghql query '{ user(login: "octocat") { name about followers } }'
//!
//! # Print the schema
//! ghql schema
//! ```

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use ghql_runtime::upstream::GITHUB_API;
use ghql_runtime::{
    Executor, HttpUserSource, Registry, Request, Response, UpstreamConfig, UpstreamError,
};
use ghql_server::{GhqlServer, ServerConfig, ServerError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ghql")]
#[command(author, version, about = "GraphQL front for GitHub user profiles", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Upstream flags shared by `serve` and `query`.
#[derive(Args, Debug, Clone)]
pub struct UpstreamArgs {
    /// Base URL of the GitHub REST API
    #[arg(long, env = "GHQL_UPSTREAM", default_value = GITHUB_API)]
    pub upstream: String,

    /// Upstream request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Fail on non-2xx upstream statuses instead of reading the body
    #[arg(long)]
    pub reject_error_status: bool,
}

impl UpstreamArgs {
    /// Builds the upstream configuration.
    pub fn config(&self) -> UpstreamConfig {
        let mut config = UpstreamConfig::new()
            .base_url(self.upstream.clone())
            .reject_error_status(self.reject_error_status);
        if let Some(secs) = self.timeout_secs {
            config = config.timeout(Duration::from_secs(secs));
        }
        config
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, env = "GHQL_PORT", default_value = "4000")]
        port: u16,

        #[command(flatten)]
        upstream: UpstreamArgs,
    },

    /// Execute a single query and print the JSON response
    Query {
        /// Query document
        query: String,

        /// Variables as a JSON object
        #[arg(long)]
        variables: Option<String>,

        /// Operation to run when the document has several
        #[arg(long)]
        operation_name: Option<String>,

        #[command(flatten)]
        upstream: UpstreamArgs,
    },

    /// Print the schema in SDL
    Schema,
}

/// CLI failure.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("--variables must be a JSON object: {0}")]
    InvalidVariables(String),

    #[error("failed to render response: {0}")]
    Output(#[source] serde_json::Error),
}

/// Runs a command and returns the process exit code.
pub async fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Commands::Serve {
            host,
            port,
            upstream,
        } => serve(ServerConfig::new().host(host).port(port), &upstream).await,
        Commands::Query {
            query,
            variables,
            operation_name,
            upstream,
        } => {
            let mut request = Request::new(query);
            if let Some(raw) = variables {
                request = request.variables(parse_variables(&raw)?);
            }
            if let Some(name) = operation_name {
                request = request.operation_name(name);
            }

            let response = execute(&request, &upstream).await?;
            let rendered = serde_json::to_string_pretty(&response).map_err(CliError::Output)?;
            println!("{}", rendered);

            if response.has_errors() {
                if !cli.quiet {
                    eprintln!("{} query returned errors", "Error:".red().bold());
                }
                Ok(1)
            } else {
                Ok(0)
            }
        }
        Commands::Schema => {
            print!("{}", Registry::github().to_sdl());
            Ok(0)
        }
    }
}

fn executor(upstream: &UpstreamArgs) -> Result<Executor, CliError> {
    let source = HttpUserSource::new(upstream.config())?;
    Ok(Executor::new(Arc::new(Registry::github()), Arc::new(source)))
}

/// Executes one request against the configured upstream.
pub async fn execute(request: &Request, upstream: &UpstreamArgs) -> Result<Response, CliError> {
    Ok(executor(upstream)?.execute(request).await)
}

async fn serve(config: ServerConfig, upstream: &UpstreamArgs) -> Result<i32, CliError> {
    let executor = Arc::new(executor(upstream)?);
    let server = GhqlServer::new(config, executor);
    let listener = server.bind().await?;
    info!(upstream = %upstream.upstream, "Starting ghql server");

    server
        .serve_with_shutdown(listener, async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(0)
}

/// Parses `--variables` into a JSON object.
pub fn parse_variables(raw: &str) -> Result<serde_json::Map<String, serde_json::Value>, CliError> {
    match serde_json::from_str(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(CliError::InvalidVariables(format!("got {other}"))),
        Err(e) => Err(CliError::InvalidVariables(e.to_string())),
    }
}
