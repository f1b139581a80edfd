//! Service errors.
use apollo_compiler::validation::DiagnosticList;
use apollo_compiler::validation::WithErrors;
use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub(crate) use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::graphql::IntoGraphQLErrors;
use crate::graphql::Location as ErrorLocation;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::storage::StorageError;

/// Error delivered to every waiter of a batch that could not be completed.
///
/// Cloned once per waiter: the batch function ran once, so all of its callers
/// observe the same failure.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum LoadError {
    /// batch fetch '{loader}' failed: {reason}
    FetchFailed {
        /// The loader whose batch function failed.
        loader: &'static str,
        /// The reason the batch function failed.
        reason: String,
    },

    /// batch fetch '{loader}' returned {actual} results for {expected} keys
    LengthMismatch {
        loader: &'static str,
        expected: usize,
        actual: usize,
    },

    /// batch fetch '{loader}' was abandoned before delivering a result
    Cancelled { loader: &'static str },
}

impl LoadError {
    pub fn loader(&self) -> &'static str {
        match self {
            LoadError::FetchFailed { loader, .. }
            | LoadError::LengthMismatch { loader, .. }
            | LoadError::Cancelled { loader } => *loader,
        }
    }
}

impl ErrorExtension for LoadError {
    fn extension_code(&self) -> String {
        "BATCH_FETCH_FAILED".to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        let mut extensions = Object::new();
        extensions.insert("loader", self.loader().into());
        Some(extensions)
    }
}

/// Error types for field resolution.
///
/// These are not returned to the client as is: they are converted to a GraphQL
/// [`struct@Error`] carrying the response path of the failed field.
#[derive(Error, Display, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub(crate) enum FetchError {
    /// invalid value for argument '{name}': {reason}
    InvalidArgument {
        /// Name of the argument.
        name: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// cannot query field '{field}' on type '{type_name}'
    UnknownField { type_name: String, field: String },

    /// {0}
    Load(#[from] LoadError),

    /// {0}
    Storage(#[from] StorageError),
}

impl FetchError {
    /// Convert the fetch error to a GraphQL error.
    pub(crate) fn to_graphql_error(&self, path: Option<Path>) -> Error {
        let mut extensions = match self {
            FetchError::Load(load) => load.custom_extension_details().unwrap_or_default(),
            FetchError::InvalidArgument { name, .. } => {
                let mut extensions = Object::new();
                extensions.insert("argument", name.clone().into());
                extensions
            }
            FetchError::UnknownField { type_name, field } => {
                let mut extensions = Object::new();
                extensions.insert("type", type_name.clone().into());
                extensions.insert("field", field.clone().into());
                extensions
            }
            FetchError::Storage(_) => Object::new(),
        };
        extensions.insert("code", self.extension_code().into());

        Error {
            message: self.to_string(),
            locations: Default::default(),
            path,
            extensions,
        }
    }
}

impl ErrorExtension for FetchError {
    fn extension_code(&self) -> String {
        match self {
            FetchError::InvalidArgument { .. } => "INVALID_ARGUMENT".to_string(),
            FetchError::UnknownField { .. } => "INVALID_FIELD".to_string(),
            FetchError::Load(load) => load.extension_code(),
            FetchError::Storage(_) => "STORAGE_ERROR".to_string(),
        }
    }
}

/// Error types for service building.
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum ServiceBuildError {
    /// schema error: {0}
    Schema(#[from] SchemaError),

    /// invalid GraphQL endpoint path '{0}': it must start with '/'
    InvalidPath(String),
}

/// Errors raised while loading the GraphQL schema.
#[derive(Error, Debug, Display)]
#[non_exhaustive]
pub enum SchemaError {
    /// GraphQL schema validation error: {0}
    Validate(ValidationErrors),

    /// object type '{0}' is missing from the schema
    MissingType(String),

    /// the schema does not declare a {0} root type
    MissingRoot(&'static str),
}

/// Collection of GraphQL diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationErrors {
    pub(crate) errors: Vec<Error>,
}

impl ValidationErrors {
    /// Converts every diagnostic into a GraphQL error tagged with `code`.
    pub(crate) fn into_graphql_errors_with_code(self, code: &str) -> Vec<Error> {
        self.errors
            .into_iter()
            .map(|mut error| {
                error
                    .extensions
                    .entry("code")
                    .or_insert_with(|| code.into());
                error
            })
            .collect()
    }
}

impl From<DiagnosticList> for ValidationErrors {
    fn from(errors: DiagnosticList) -> Self {
        Self {
            errors: errors.iter().map(|e| e.to_json().into()).collect(),
        }
    }
}

impl<T> From<WithErrors<T>> for ValidationErrors {
    fn from(WithErrors { errors, .. }: WithErrors<T>) -> Self {
        errors.into()
    }
}

impl IntoGraphQLErrors for ValidationErrors {
    fn into_graphql_errors(self) -> Result<Vec<Error>, Self> {
        Ok(self.into_graphql_errors_with_code("GRAPHQL_VALIDATION_FAILED"))
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, error) in self.errors.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            if let Some(ErrorLocation { line, column }) = error.locations.first() {
                write!(f, "[{line}:{column}] {}", error.message)?;
            } else {
                write!(f, "{}", error.message)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::graphql;

    #[test]
    fn test_into_graphql_error() {
        let error = FetchError::Load(LoadError::LengthMismatch {
            loader: "UserById",
            expected: 3,
            actual: 2,
        });
        let expected_gql_error = graphql::Error::builder()
            .message("batch fetch 'UserById' returned 2 results for 3 keys")
            .path(Path::from("users/0/profile"))
            .extension_code("BATCH_FETCH_FAILED")
            .extension("loader", "UserById")
            .build();

        assert_eq!(
            error.to_graphql_error(Some(Path::from("users/0/profile"))),
            expected_gql_error
        );
    }

    #[test]
    fn invalid_argument_names_the_argument() {
        let error = FetchError::InvalidArgument {
            name: "id".to_string(),
            reason: "invalid character".to_string(),
        }
        .to_graphql_error(Some(Path::from("user")));

        assert_eq!(error.extension_code().as_deref(), Some("INVALID_ARGUMENT"));
        assert_eq!(error.extensions.get("argument"), Some(&json!("id")));
    }

    #[test]
    fn storage_errors_keep_their_message() {
        let error = FetchError::from(StorageError::NotFound {
            entity: "user",
            id: "42".to_string(),
        })
        .to_graphql_error(None);

        assert_eq!(error.message, "user '42' not found");
        assert_eq!(error.extension_code().as_deref(), Some("STORAGE_ERROR"));
    }
}
