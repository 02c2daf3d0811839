//! Runtime for ghql.
//!
//! This crate maps a GitHub user profile onto a typed GraphQL surface:
//! - `schema`: Type registry (`UserType`) and the `user(login)` root field
//! - `query`: Query document parsing and planning against the registry
//! - `resolver`: Field resolution over the upstream record
//! - `upstream`: The REST source the root field fetches from
//! - `executor`: Query execution
//! - `error`: Error codes and execution errors

pub mod error;
pub mod executor;
pub mod query;
pub mod resolver;
pub mod schema;
pub mod upstream;

pub use error::{ErrorCode, ExecutionError};
pub use executor::{Executor, ExecutorConfig, GraphQLError, Request, Response};
pub use query::{
    parse, parse_with_max_depth, Document, QueryError, QueryPlan, QueryPlanner, DEFAULT_MAX_DEPTH,
};
pub use resolver::{resolve_field, resolve_object, OutputRecord, RawRecord, ResolverArgs};
pub use schema::{
    ArgumentSpec, FieldResolve, FieldSpec, ObjectType, Registry, RegistryBuilder, RootField,
    ScalarType,
};
pub use upstream::{HttpUserSource, UpstreamConfig, UpstreamError, UserSource};
