//! Error codes and execution errors.

use crate::query::QueryError;
use crate::schema::ScalarType;
use crate::upstream::UpstreamError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error codes, reported in `extensions.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // Query errors
    ParseError,
    ValidationError,

    // Argument errors
    MissingArgument,
    InvalidArgument,

    // Upstream errors
    UpstreamFetchError,
    UpstreamStatusError,

    InternalError,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ParseError => "PARSE_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::MissingArgument => "MISSING_ARGUMENT",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::UpstreamFetchError => "UPSTREAM_FETCH_ERROR",
            Self::UpstreamStatusError => "UPSTREAM_STATUS_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Returns true if the caller's request is at fault.
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::ParseError | Self::ValidationError | Self::MissingArgument | Self::InvalidArgument
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a whole query execution.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("missing required argument `{0}`")]
    MissingArgument(String),

    #[error("argument `{name}` expects {expected}, found {found}")]
    InvalidArgument {
        name: String,
        expected: ScalarType,
        found: &'static str,
    },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("type `{0}` is not declared in the registry")]
    UnknownType(String),
}

impl ExecutionError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Query(e) => e.code(),
            Self::MissingArgument(_) => ErrorCode::MissingArgument,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Upstream(e) => e.code(),
            Self::UnknownType(_) => ErrorCode::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::UpstreamFetchError).unwrap();
        assert_eq!(json, "\"UPSTREAM_FETCH_ERROR\"");
        assert_eq!(ErrorCode::MissingArgument.to_string(), "MISSING_ARGUMENT");
    }

    #[test]
    fn test_error_code_properties() {
        assert!(ErrorCode::ParseError.is_client_error());
        assert!(ErrorCode::InvalidArgument.is_client_error());
        assert!(!ErrorCode::UpstreamFetchError.is_client_error());
        assert!(!ErrorCode::InternalError.is_client_error());
    }

    #[test]
    fn test_execution_error_codes() {
        let err = ExecutionError::MissingArgument("login".into());
        assert_eq!(err.code(), ErrorCode::MissingArgument);
        assert_eq!(err.to_string(), "missing required argument `login`");

        let err = ExecutionError::InvalidArgument {
            name: "login".into(),
            expected: ScalarType::String,
            found: "Int",
        };
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert_eq!(err.to_string(), "argument `login` expects String, found Int");

        let err = ExecutionError::from(QueryError::NoOperation);
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}
