use std::collections::HashMap;

use apollo_compiler::executable;
use apollo_compiler::ExecutableDocument;
use indexmap::IndexMap;
use serde_json_bytes::ByteString;

use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::spec::SpecError;

/// A field of the selection tree, with fragments already expanded.
///
/// Fields sharing a response key are merged into a single node whose sub-selections are
/// the union of theirs, so the tree has exactly the shape of the response.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Selection {
    pub(crate) response_key: String,
    pub(crate) name: String,
    /// Argument values with variables substituted.
    pub(crate) arguments: Object,
    /// Empty for leaf fields.
    pub(crate) selections: Vec<Selection>,
    pub(crate) location: Option<Location>,
}

/// Flattens `selection_set` into a field tree.
///
/// `@skip` and `@include` are evaluated against `variables`; skipped fields do not appear
/// in the tree at all.
pub(crate) fn collect_fields(
    document: &ExecutableDocument,
    selection_set: &executable::SelectionSet,
    variables: &Object,
) -> Result<Vec<Selection>, SpecError> {
    let mut collector = Collector {
        document,
        variables,
        fragment_cache: HashMap::new(),
    };
    let mut fields = Vec::new();
    collector.collect(selection_set, 0, &mut fields)?;
    Ok(merge(fields))
}

struct Collector<'a> {
    document: &'a ExecutableDocument,
    variables: &'a Object,
    /// Merged fields of each fragment, expanded once per document.
    fragment_cache: HashMap<&'a str, Computation<Vec<Selection>>>,
}

enum Computation<T> {
    InProgress,
    Done(T),
}

impl<'a> Collector<'a> {
    fn collect(
        &mut self,
        selection_set: &'a executable::SelectionSet,
        mut count: usize,
        fields: &mut Vec<Selection>,
    ) -> Result<(), SpecError> {
        // The RECURSION_LIMIT is chosen to be:
        //   < # expected to cause stack overflow &&
        //   > # expected in a legitimate query
        const RECURSION_LIMIT: usize = 512;
        if count > RECURSION_LIMIT {
            tracing::error!("selection processing recursion limit({RECURSION_LIMIT}) exceeded");
            return Err(SpecError::RecursionLimitExceeded);
        }
        count += 1;

        for selection in &selection_set.selections {
            match selection {
                executable::Selection::Field(field) => {
                    if !self.included(&field.directives) {
                        continue;
                    }
                    let mut selections = Vec::new();
                    self.collect(&field.selection_set, count, &mut selections)?;
                    fields.push(Selection {
                        response_key: field.response_key().to_string(),
                        name: field.name.to_string(),
                        arguments: field
                            .arguments
                            .iter()
                            .map(|argument| {
                                (
                                    ByteString::from(argument.name.as_str()),
                                    self.value(&argument.value),
                                )
                            })
                            .collect(),
                        selections,
                        location: field
                            .line_column_range(&self.document.sources)
                            .map(|range| Location {
                                line: range.start.line as u32,
                                column: range.start.column as u32,
                            }),
                    });
                }
                executable::Selection::InlineFragment(inline_fragment) => {
                    if !self.included(&inline_fragment.directives) {
                        continue;
                    }
                    self.collect(&inline_fragment.selection_set, count, fields)?;
                }
                executable::Selection::FragmentSpread(fragment_spread) => {
                    if !self.included(&fragment_spread.directives) {
                        continue;
                    }
                    let Some(fragment) = fragment_spread.fragment_def(self.document) else {
                        // Undefined fragment, already rejected by validation.
                        continue;
                    };
                    let name = fragment_spread.fragment_name.as_str();
                    match self.fragment_cache.get(name) {
                        Some(Computation::Done(cached)) => fields.extend(cached.iter().cloned()),
                        Some(Computation::InProgress) => {
                            // Fragment cycle, already rejected by validation.
                            continue;
                        }
                        None => {
                            self.fragment_cache.insert(name, Computation::InProgress);
                            let mut nested = Vec::new();
                            self.collect(&fragment.selection_set, count, &mut nested)?;
                            let nested = merge(nested);
                            fields.extend(nested.iter().cloned());
                            self.fragment_cache.insert(name, Computation::Done(nested));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn included(&self, directives: &executable::DirectiveList) -> bool {
        let condition = |name: &str| {
            directives
                .get(name)
                .and_then(|directive| directive.specified_argument_by_name("if"))
                .and_then(|value| match self.value(value) {
                    Value::Bool(b) => Some(b),
                    _ => None,
                })
        };
        !condition("skip").unwrap_or(false) && condition("include").unwrap_or(true)
    }

    fn value(&self, value: &executable::Value) -> Value {
        value_to_json(value, self.variables)
    }
}

/// Converts an argument value to JSON, substituting variables.
pub(crate) fn value_to_json(value: &executable::Value, variables: &Object) -> Value {
    match value {
        executable::Value::Null => Value::Null,
        executable::Value::Enum(name) => Value::String(name.as_str().into()),
        executable::Value::Variable(name) => {
            variables.get(name.as_str()).cloned().unwrap_or(Value::Null)
        }
        executable::Value::String(s) => Value::String(s.as_str().into()),
        executable::Value::Float(f) => f
            .try_to_f64()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        executable::Value::Int(i) => match i.try_to_i32() {
            Ok(i) => Value::Number(i.into()),
            Err(_) => i
                .try_to_f64()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        },
        executable::Value::Boolean(b) => Value::Bool(*b),
        executable::Value::List(items) => Value::Array(
            items
                .iter()
                .map(|item| value_to_json(item, variables))
                .collect(),
        ),
        executable::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (ByteString::from(name.as_str()), value_to_json(value, variables)))
                .collect(),
        ),
    }
}

/// Groups fields by response key, in first-seen order, merging their sub-selections.
fn merge(fields: Vec<Selection>) -> Vec<Selection> {
    let mut merged: IndexMap<String, Selection> = IndexMap::new();
    for field in fields {
        match merged.get_mut(&field.response_key) {
            Some(existing) => existing.selections.extend(field.selections),
            None => {
                merged.insert(field.response_key.clone(), field);
            }
        }
    }
    merged
        .into_values()
        .map(|mut field| {
            field.selections = merge(field.selections);
            field
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use apollo_compiler::validation::Valid;
    use serde_json_bytes::json;

    use super::*;
    use crate::spec::Schema;

    fn fields(query: &str, variables: serde_json_bytes::Value) -> Vec<Selection> {
        let schema = Schema::bundled().unwrap();
        let document: Valid<ExecutableDocument> =
            ExecutableDocument::parse_and_validate(&schema.definitions, query, "query.graphql")
                .unwrap();
        let operation = document.operations.get(None).unwrap();
        let variables = variables.as_object().cloned().unwrap_or_default();
        collect_fields(&document, &operation.selection_set, &variables).unwrap()
    }

    fn shape(fields: &[Selection]) -> Vec<String> {
        fields
            .iter()
            .map(|field| {
                if field.selections.is_empty() {
                    field.response_key.clone()
                } else {
                    format!("{}{{{}}}", field.response_key, shape(&field.selections).join(","))
                }
            })
            .collect()
    }

    #[test]
    fn fragments_are_expanded_and_merged() {
        let fields = fields(
            r#"
            query {
              users { id ...UserPosts }
              users { name ... on User { profile { id } } }
            }
            fragment UserPosts on User { posts { title } }
            "#,
            json!({}),
        );
        assert_eq!(shape(&fields), vec!["users{id,posts{title},name,profile{id}}"]);
    }

    #[test]
    fn aliases_become_response_keys() {
        let fields = fields(
            r#"{ first: user(id: "8c1f0c1e-8cbe-4c73-9b26-6e1c2a8a8c39") { id } second: users { id } }"#,
            json!({}),
        );
        assert_eq!(fields[0].response_key, "first");
        assert_eq!(fields[0].name, "user");
        assert_eq!(
            fields[0].arguments.get("id"),
            Some(&json!("8c1f0c1e-8cbe-4c73-9b26-6e1c2a8a8c39"))
        );
        assert_eq!(fields[1].response_key, "second");
        assert_eq!(fields[0].location, Some(Location { line: 1, column: 3 }));
    }

    #[test]
    fn skip_and_include_use_variables() {
        let query = r#"
            query($withPosts: Boolean!, $id: UUID!) {
              user(id: $id) {
                id
                posts @include(if: $withPosts) { id }
                name @skip(if: true)
              }
            }
        "#;
        let with_posts = fields(query, json!({ "withPosts": true, "id": "x" }));
        assert_eq!(shape(&with_posts), vec!["user{id,posts{id}}"]);
        assert_eq!(with_posts[0].arguments.get("id"), Some(&json!("x")));

        let without_posts = fields(query, json!({ "withPosts": false, "id": "x" }));
        assert_eq!(shape(&without_posts), vec!["user{id}"]);
    }

    #[test]
    fn input_objects_are_converted() {
        let fields = fields(
            r#"mutation { createUser(dto: { name: "ann", balance: 10 }) { id } }"#,
            json!({}),
        );
        assert_eq!(
            fields[0].arguments.get("dto"),
            Some(&json!({ "name": "ann", "balance": 10 }))
        );
    }

    #[test]
    fn repeated_fragment_spreads_are_expanded_once() {
        const LEVELS: usize = 20;
        let mut document = String::from("query { users { ...F0 } }\n");
        for level in 0..LEVELS {
            let next = level + 1;
            document.push_str(&format!(
                "fragment F{level} on User {{ ...F{next} ...F{next} }}\n"
            ));
        }
        document.push_str(&format!("fragment F{LEVELS} on User {{ id name }}\n"));

        let fields = fields(&document, json!({}));
        assert_eq!(shape(&fields), vec!["users{id,name}"]);
    }
}
