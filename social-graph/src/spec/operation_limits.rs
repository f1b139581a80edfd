use crate::graphql::Location;
use crate::json_ext::Path;
use crate::spec::Query;
use crate::spec::Selection;
use crate::spec::SpecError;

/// A field found beyond the configured depth.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Violation {
    depth: u32,
    path: Path,
    location: Option<Location>,
}

/// Rejects the query if any field sits deeper than `max_depth`.
///
/// Root fields are at depth 0 and every nested field is one deeper than its parent. The
/// tree is walked depth first in declaration order and the first offending field is
/// reported. Introspection fields (`__schema`, `__type`, `__typename`) and everything under
/// them are not counted. `None` disables the check.
pub(crate) fn check(query: &Query, max_depth: Option<u32>) -> Result<(), SpecError> {
    let Some(max_depth) = max_depth else {
        // No configured limit
        return Ok(());
    };

    match first_violation(&query.selections, 0, max_depth, &Path::empty()) {
        None => {
            tracing::trace!(depth = ?measure(&query.selections), max_depth, "operation depth");
            Ok(())
        }
        Some(Violation {
            depth,
            path,
            location,
        }) => {
            tracing::warn!(
                "request exceeded depth limit: depth: {depth}, max_depth: {max_depth}, \
                path: {path}, operation name: {:?}",
                query.operation_name
            );
            Err(SpecError::MaxDepthExceeded {
                max_depth,
                path,
                location,
            })
        }
    }
}

fn first_violation(
    selections: &[Selection],
    depth: u32,
    max_depth: u32,
    parent: &Path,
) -> Option<Violation> {
    for field in selections.iter().filter(|field| !is_introspection(field)) {
        let path = parent.join_key(field.response_key.as_str());
        if depth > max_depth {
            return Some(Violation {
                depth,
                path,
                location: field.location.clone(),
            });
        }
        if let Some(violation) = first_violation(&field.selections, depth + 1, max_depth, &path) {
            return Some(violation);
        }
    }
    None
}

/// Depth of the deepest field, `None` for an empty selection.
pub(crate) fn measure(selections: &[Selection]) -> Option<u32> {
    selections
        .iter()
        .filter(|field| !is_introspection(field))
        .map(|field| measure(&field.selections).map_or(0, |nested| nested + 1))
        .max()
}

fn is_introspection(field: &Selection) -> bool {
    field.name.starts_with("__")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::Request;
    use crate::spec::Schema;

    fn query(text: &str) -> Query {
        Query::parse(
            &Request::builder().query(text).build(),
            &Schema::bundled().unwrap(),
        )
        .unwrap()
    }

    /// `users { posts { author { posts { author { ... } } } } }` nested to `depth`.
    fn nested(depth: u32) -> String {
        let mut selection = String::from("id");
        for level in (1..=depth).rev() {
            let field = if level % 2 == 1 { "posts" } else { "author" };
            selection = format!("{field} {{ {selection} }}");
        }
        format!("{{ users {{ {selection} }} }}")
    }

    #[test]
    fn depth_at_the_limit_passes() {
        let query = query(&nested(4));
        assert_eq!(measure(&query.selections), Some(5));
        assert_eq!(check(&query, Some(5)), Ok(()));
    }

    #[test]
    fn depth_above_the_limit_is_rejected_with_its_path() {
        let query = query(&nested(5));
        assert_eq!(measure(&query.selections), Some(6));
        match check(&query, Some(5)) {
            Err(SpecError::MaxDepthExceeded {
                max_depth, path, ..
            }) => {
                assert_eq!(max_depth, 5);
                assert_eq!(path.to_string(), "/users/posts/author/posts/author/posts/id");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn root_scalars_always_pass() {
        let query = query("mutation { deleteUser(id: \"8c1f0c1e-8cbe-4c73-9b26-6e1c2a8a8c39\") }");
        assert_eq!(measure(&query.selections), Some(0));
        assert_eq!(check(&query, Some(0)), Ok(()));
    }

    #[test]
    fn fragments_do_not_hide_depth() {
        let query = query(
            r#"
            query {
              users { ...Deep }
            }
            fragment Deep on User {
              posts { author { ... on User { posts { author { id } } } } }
            }
            "#,
        );
        assert_eq!(measure(&query.selections), Some(5));
        assert!(check(&query, Some(4)).is_err());
        assert_eq!(check(&query, Some(5)), Ok(()));
    }

    #[test]
    fn first_violation_in_declaration_order() {
        let query = query("{ users { name posts { id } } profiles { user { posts { id } } } }");
        match check(&query, Some(1)) {
            Err(SpecError::MaxDepthExceeded { path, location, .. }) => {
                assert_eq!(path.to_string(), "/users/posts/id");
                assert!(location.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn disabled_limit() {
        let query = query(&nested(12));
        assert_eq!(check(&query, None), Ok(()));
    }

    #[test]
    fn introspection_fields_are_not_counted() {
        let query = query(
            r#"{
              users { posts { author { posts { author { __typename id } } } } }
              __type(name: "User") {
                fields { type { ofType { fields { type { name } } } } }
              }
            }"#,
        );
        assert_eq!(measure(&query.selections), Some(5));
        assert_eq!(check(&query, Some(5)), Ok(()));
    }
}
