//! Schema introspection.
//!
//! `__schema` and `__type` are answered from the schema alone. They never reach the
//! resolvers or storage.

use apollo_compiler::executable;
use apollo_compiler::introspection;
use apollo_compiler::request::coerce_variable_values;
use apollo_compiler::request::RequestError;
use apollo_compiler::validation::Valid;
use apollo_compiler::ExecutableDocument;
use serde_json_bytes::ByteString;

use crate::graphql::Error;
use crate::json_ext::Object;
use crate::spec::Schema;
use crate::spec::Selection;
use crate::spec::SpecError;

const SCHEMA_FIELD: &str = "__schema";
const TYPE_FIELD: &str = "__type";

/// Whether `name` is one of the introspection fields of the query root.
pub(crate) fn is_root_field(name: &str) -> bool {
    name == SCHEMA_FIELD || name == TYPE_FIELD
}

/// Introspection part of a response, keyed by response key.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Introspection {
    pub(crate) data: Object,
    pub(crate) errors: Vec<Error>,
}

/// Runs the introspection root fields of `operation`.
///
/// Returns `None` when the operation selects none of them. Other root fields are left out
/// of the result.
pub(crate) fn execute(
    schema: &Schema,
    document: &Valid<ExecutableDocument>,
    operation: &executable::Operation,
    selections: &[Selection],
    variables: &Object,
) -> Result<Option<Introspection>, SpecError> {
    if !selections.iter().any(|field| is_root_field(&field.name)) {
        return Ok(None);
    }

    let request_error = |error: RequestError| {
        SpecError::InvalidVariable(error.to_graphql_error(&document.sources).message)
    };
    let variables =
        coerce_variable_values(&schema.definitions, operation, variables).map_err(request_error)?;
    let response = introspection::partial_execute(
        &schema.definitions,
        &schema.implementers_map,
        document,
        operation,
        &variables,
    )
    .map_err(request_error)?;

    let answers = response.data.unwrap_or_default();
    let data: Object = selections
        .iter()
        .filter(|field| is_root_field(&field.name))
        .filter_map(|field| {
            let key = field.response_key.as_str();
            answers
                .get(key)
                .map(|value| (ByteString::from(key), value.clone()))
        })
        .collect();
    tracing::trace!(fields = data.len(), "introspection executed");

    Ok(Some(Introspection {
        data,
        errors: response.errors.into_iter().map(Error::from).collect(),
    }))
}
