//! Query parsing and operation selection.

use apollo_compiler::ast::OperationType;
use apollo_compiler::executable;
use apollo_compiler::parser::Parser;

use crate::graphql::Request;
use crate::json_ext::Object;
use crate::spec::introspection;
use crate::spec::introspection::Introspection;
use crate::spec::selection::collect_fields;
use crate::spec::selection::value_to_json;
use crate::spec::Schema;
use crate::spec::Selection;
use crate::spec::SpecError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OperationKind {
    Query,
    Mutation,
}

/// A parsed and validated operation, ready to be checked and executed.
#[derive(Debug, Clone)]
pub(crate) struct Query {
    pub(crate) kind: OperationKind,
    pub(crate) operation_name: Option<String>,
    pub(crate) selections: Vec<Selection>,
    /// Answers to the `__schema`/`__type` root fields, if any were selected.
    pub(crate) introspection: Option<Introspection>,
}

impl Query {
    /// Parses and validates the request's document, then builds the selection tree of the
    /// operation it names.
    pub(crate) fn parse(request: &Request, schema: &Schema) -> Result<Self, SpecError> {
        let text = request.query.as_deref().ok_or(SpecError::MissingQuery)?;

        let mut parser = Parser::new();
        let ast = parser
            .parse_ast(text, "query.graphql")
            .map_err(|invalid| SpecError::ParsingError(invalid.into()))?;

        // Trace log recursion limit data
        let recursion_limit = parser.recursion_reached();
        tracing::trace!(?recursion_limit, "recursion limit data");

        let document = ast
            .to_executable_validate(&schema.definitions)
            .map_err(|invalid| SpecError::ValidationError(invalid.into()))?;

        let operation_name = request.operation_name.as_deref();
        let operation = document
            .operations
            .get(operation_name)
            .map_err(|_| match operation_name {
                Some(name) => SpecError::UnknownOperation(name.to_string()),
                None => SpecError::AmbiguousOperation,
            })?;

        let kind = match operation.operation_type {
            OperationType::Mutation => OperationKind::Mutation,
            // subscriptions have no root type in the schema and fail validation
            _ => OperationKind::Query,
        };
        let variables = variables_with_defaults(operation, &request.variables)?;
        let selections = collect_fields(&document, &operation.selection_set, &variables)?;
        let introspection = match kind {
            OperationKind::Query => introspection::execute(
                schema,
                &document,
                operation,
                &selections,
                &request.variables,
            )?,
            OperationKind::Mutation => None,
        };

        Ok(Query {
            kind,
            operation_name: operation.name.as_ref().map(|name| name.to_string()),
            selections,
            introspection,
        })
    }
}

/// Applies declared defaults and rejects missing required variables.
fn variables_with_defaults(
    operation: &executable::Operation,
    provided: &Object,
) -> Result<Object, SpecError> {
    let mut variables = Object::new();
    for definition in &operation.variables {
        let name = definition.name.as_str();
        match provided.get(name) {
            Some(value) if !value.is_null() || !definition.ty.is_non_null() => {
                variables.insert(name, value.clone());
            }
            _ => {
                if let Some(default) = &definition.default_value {
                    // defaults are constants and cannot reference variables
                    variables.insert(name, value_to_json(default, &Object::new()));
                } else if definition.ty.is_non_null() {
                    return Err(SpecError::MissingVariable(name.to_string()));
                }
            }
        }
    }
    Ok(variables)
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    fn parse(request: Request) -> Result<Query, SpecError> {
        Query::parse(&request, &Schema::bundled().unwrap())
    }

    #[test]
    fn picks_the_named_operation() {
        let query = parse(
            Request::builder()
                .query("query A { users { id } } mutation B { deleteUser(id: \"x\") }")
                .operation_name("B")
                .build(),
        )
        .unwrap();
        assert_eq!(query.kind, OperationKind::Mutation);
        assert_eq!(query.operation_name.as_deref(), Some("B"));
        assert_eq!(query.selections[0].name, "deleteUser");
    }

    #[test]
    fn unknown_and_ambiguous_operations() {
        let text = "query A { users { id } } query B { posts { id } }";
        assert_eq!(
            parse(Request::builder().query(text).operation_name("C").build()).unwrap_err(),
            SpecError::UnknownOperation("C".to_string())
        );
        assert_eq!(
            parse(Request::builder().query(text).build()).unwrap_err(),
            SpecError::AmbiguousOperation
        );
    }

    #[test]
    fn syntax_errors_are_parsing_errors() {
        let error = parse(Request::builder().query("{ users { id }").build()).unwrap_err();
        assert!(matches!(error, SpecError::ParsingError(_)), "{error:?}");
    }

    #[test]
    fn unknown_fields_are_validation_errors() {
        let error = parse(Request::builder().query("{ users { email } }").build()).unwrap_err();
        assert!(matches!(error, SpecError::ValidationError(_)), "{error:?}");
    }

    #[test]
    fn missing_query_string() {
        assert_eq!(
            parse(Request::builder().build()).unwrap_err(),
            SpecError::MissingQuery
        );
    }

    #[test]
    fn required_variables_must_be_provided() {
        let text = "query($id: UUID!) { user(id: $id) { id } }";
        assert_eq!(
            parse(Request::builder().query(text).build()).unwrap_err(),
            SpecError::MissingVariable("id".to_string())
        );

        let query = parse(
            Request::builder()
                .query(text)
                .variable("id", "8c1f0c1e-8cbe-4c73-9b26-6e1c2a8a8c39")
                .build(),
        )
        .unwrap();
        assert_eq!(
            query.selections[0].arguments.get("id"),
            Some(&json!("8c1f0c1e-8cbe-4c73-9b26-6e1c2a8a8c39"))
        );
    }

    #[test]
    fn default_values_apply() {
        let query = parse(
            Request::builder()
                .query("query($posts: Boolean = false) { users { id posts @include(if: $posts) { id } } }")
                .build(),
        )
        .unwrap();
        assert!(query.selections[0]
            .selections
            .iter()
            .all(|field| field.name != "posts"));
    }
}
