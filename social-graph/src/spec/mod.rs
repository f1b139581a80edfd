#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub(crate) mod introspection;
pub(crate) mod operation_limits;
pub(crate) mod query;
pub(crate) mod schema;
pub(crate) mod selection;

use displaydoc::Display;
pub(crate) use query::OperationKind;
pub(crate) use query::Query;
pub use schema::Schema;
pub(crate) use selection::Selection;
use thiserror::Error;

use crate::error::ValidationErrors;
use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::graphql::IntoGraphQLErrors;
use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;

pub(crate) const TYPENAME: &str = "__typename";

/// Errors that reject a request before execution starts.
#[derive(Error, Debug, Display, Clone, PartialEq)]
#[non_exhaustive]
pub(crate) enum SpecError {
    /// must provide a query string
    MissingQuery,
    /// parsing error: {0}
    ParsingError(ValidationErrors),
    /// validation error: {0}
    ValidationError(ValidationErrors),
    /// unknown operation named "{0}"
    UnknownOperation(String),
    /// must provide operation name if query contains multiple operations
    AmbiguousOperation,
    /// variable '{0}' is required but was not provided
    MissingVariable(String),
    /// invalid variable value: {0}
    InvalidVariable(String),
    /// selection processing recursion limit exceeded
    RecursionLimitExceeded,
    /// maximum operation depth of {max_depth} exceeded
    MaxDepthExceeded {
        max_depth: u32,
        path: Path,
        location: Option<Location>,
    },
}

impl ErrorExtension for SpecError {
    fn extension_code(&self) -> String {
        match self {
            SpecError::MissingQuery => "MISSING_QUERY_STRING",
            SpecError::ParsingError(_) => "PARSING_ERROR",
            SpecError::ValidationError(_) => "GRAPHQL_VALIDATION_FAILED",
            SpecError::UnknownOperation(_) => "UNKNOWN_OPERATION",
            SpecError::AmbiguousOperation => "GRAPHQL_VALIDATION_FAILED",
            SpecError::MissingVariable(_) | SpecError::InvalidVariable(_) => {
                "VALIDATION_INVALID_TYPE_VARIABLE"
            }
            SpecError::RecursionLimitExceeded => "RECURSION_LIMIT_EXCEEDED",
            SpecError::MaxDepthExceeded { .. } => "MAX_DEPTH_LIMIT",
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        let mut obj = Object::new();
        match self {
            SpecError::MaxDepthExceeded { max_depth, .. } => {
                obj.insert("maxDepth", Value::Number((*max_depth).into()));
            }
            SpecError::MissingVariable(name) => {
                obj.insert("name", name.clone().into());
            }
            _ => (),
        }

        (!obj.is_empty()).then_some(obj)
    }
}

impl IntoGraphQLErrors for SpecError {
    fn into_graphql_errors(self) -> Result<Vec<Error>, Self> {
        let code = self.extension_code();
        match self {
            SpecError::ParsingError(errors) | SpecError::ValidationError(errors) => {
                Ok(errors.into_graphql_errors_with_code(&code))
            }
            SpecError::MaxDepthExceeded {
                ref path,
                ref location,
                ..
            } => Ok(vec![Error::builder()
                .message(self.to_string())
                .locations(location.iter().cloned().collect::<Vec<_>>())
                .path(path.clone())
                .extension_code(code)
                .extensions(self.custom_extension_details().unwrap_or_default())
                .build()]),
            _ => Ok(vec![Error::builder()
                .message(self.to_string())
                .extension_code(code)
                .extensions(self.custom_extension_details().unwrap_or_default())
                .build()]),
        }
    }
}
