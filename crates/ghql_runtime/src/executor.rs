//! Query execution for ghql.

use crate::error::{ErrorCode, ExecutionError};
use crate::query::{parse_with_max_depth, QueryError, DEFAULT_MAX_DEPTH, QueryPlan, QueryPlanner, RootSelection};
use crate::resolver::{json_kind, resolve_object, ResolverArgs};
use crate::schema::Registry;
use crate::upstream::UserSource;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Executor configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Resolve sibling fields on the rayon pool.
    pub parallel_fields: bool,
    /// Deepest nesting of selection sets and list/object values a query
    /// document may use.
    pub max_depth: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallel_fields: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// A GraphQL request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Map<String, Value>>,
    #[serde(
        default,
        rename = "operationName",
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,
}

impl Request {
    /// Creates a request with no variables.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Sets the variables.
    pub fn variables(mut self, variables: serde_json::Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Sets the operation name.
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

/// A GraphQL response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

impl Response {
    /// Creates a successful response with data.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// Creates an error response.
    pub fn error(error: GraphQLError) -> Self {
        Self {
            data: None,
            errors: Some(vec![error]),
        }
    }

    /// Returns true if the response has errors.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Returns the code of the first error, if any.
    pub fn error_code(&self) -> Option<ErrorCode> {
        let code = self.errors.as_ref()?.first()?.extensions.as_ref()?.get("code")?;
        serde_json::from_value(code.clone()).ok()
    }
}

/// An error in a GraphQL response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<IndexMap<String, Value>>,
}

impl GraphQLError {
    /// Creates a new error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }

    /// Adds a path to the error.
    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = Some(path);
        self
    }

    /// Adds an extension.
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions
            .get_or_insert_with(IndexMap::new)
            .insert(key.into(), value);
        self
    }

    /// Sets the error code extension.
    pub fn with_code(self, code: ErrorCode) -> Self {
        self.with_extension("code", Value::String(code.as_str().to_string()))
    }
}

impl From<&ExecutionError> for GraphQLError {
    fn from(error: &ExecutionError) -> Self {
        GraphQLError::new(error.to_string()).with_code(error.code())
    }
}

/// An execution error and the root field it happened at.
struct Failure {
    error: ExecutionError,
    path: Option<String>,
}

impl From<ExecutionError> for Failure {
    fn from(error: ExecutionError) -> Self {
        Self { error, path: None }
    }
}

impl From<QueryError> for Failure {
    fn from(error: QueryError) -> Self {
        ExecutionError::from(error).into()
    }
}

/// The query executor.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<Registry>,
    source: Arc<dyn UserSource>,
    config: ExecutorConfig,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Creates an executor over a registry and a user source.
    pub fn new(registry: Arc<Registry>, source: Arc<dyn UserSource>) -> Self {
        Self {
            registry,
            source,
            config: ExecutorConfig::default(),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// The registry queries are validated against.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Executes a request.
    ///
    /// Any failure (parse, validation, argument or upstream) yields a
    /// response with no data and a single error.
    pub async fn execute(&self, request: &Request) -> Response {
        match self.run(request).await {
            Ok(data) => Response::data(data),
            Err(Failure { error, path }) => {
                if error.code().is_client_error() {
                    debug!(%error, "query rejected");
                } else {
                    warn!(%error, "query execution failed");
                }
                let mut gql_error = GraphQLError::from(&error);
                if let Some(path) = path {
                    gql_error = gql_error.with_path(vec![path]);
                }
                Response::error(gql_error)
            }
        }
    }

    /// Rejects bound arguments whose JSON shape does not match the declared
    /// scalar. `null` is left for the resolver to judge.
    fn check_argument_types(&self, bound: &[(String, Value)]) -> Result<(), ExecutionError> {
        let declared = &self.registry.root_field().arguments;
        for (name, value) in bound {
            let Some(spec) = declared.get(name) else {
                continue;
            };
            if !value.is_null() && !spec.ty.accepts(value) {
                return Err(ExecutionError::InvalidArgument {
                    name: name.clone(),
                    expected: spec.ty,
                    found: json_kind(value),
                });
            }
        }
        Ok(())
    }

    async fn run(&self, request: &Request) -> Result<Value, Failure> {
        let document = parse_with_max_depth(&request.query, self.config.max_depth)?;
        let plan = QueryPlanner::new(&self.registry)
            .plan(&document, request.operation_name.as_deref())?;
        let variables = coerce_variables(&plan, request.variables.as_ref())?;

        let mut data = serde_json::Map::new();
        for selection in &plan.root {
            match selection {
                RootSelection::Typename { response_key } => {
                    data.insert(
                        response_key.clone(),
                        Value::String(self.registry.query_type().to_string()),
                    );
                }
                RootSelection::Upstream {
                    response_key,
                    arguments,
                    return_type,
                    selection,
                } => {
                    let at = |error: ExecutionError| Failure {
                        error,
                        path: Some(response_key.clone()),
                    };

                    let bound: Vec<(String, Value)> = arguments
                        .iter()
                        .filter_map(|(name, value)| {
                            value.bind(&variables).map(|v| (name.clone(), v))
                        })
                        .collect();
                    self.check_argument_types(&bound).map_err(at)?;

                    let args = ResolverArgs::from_pairs(bound);
                    let login = args.require_str("login").map_err(at)?;

                    let raw = self
                        .source
                        .fetch_user(login)
                        .await
                        .map_err(|e| at(e.into()))?;

                    let object = self
                        .registry
                        .object(return_type)
                        .ok_or_else(|| at(ExecutionError::UnknownType(return_type.clone())))?;
                    let output =
                        resolve_object(object, selection, &raw, self.config.parallel_fields);

                    data.insert(response_key.clone(), Value::Object(output.into_iter().collect()));
                }
            }
        }

        Ok(Value::Object(data))
    }
}

/// Applies variable defaults and rejects missing non-null variables.
fn coerce_variables(
    plan: &QueryPlan,
    provided: Option<&serde_json::Map<String, Value>>,
) -> Result<serde_json::Map<String, Value>, ExecutionError> {
    let mut variables = provided.cloned().unwrap_or_default();

    for definition in &plan.variables {
        if variables.contains_key(&definition.name) {
            continue;
        }
        if let Some(default) = &definition.default_value {
            variables.insert(definition.name.clone(), default.clone());
        } else if definition.ty.is_non_null() {
            return Err(ExecutionError::MissingArgument(format!("${}", definition.name)));
        }
    }

    Ok(variables)
}
