//! GraphQL schema.

use std::collections::HashMap;

use apollo_compiler::ast::OperationType;
use apollo_compiler::schema::Implementers;
use apollo_compiler::validation::Valid;
use apollo_compiler::Name;
use indexmap::IndexMap;

use crate::error::SchemaError;

const SCHEMA_SDL: &str = include_str!("schema.graphql");

/// Object types known to the resolvers.
///
/// Descriptors refer to each other through these identifiers, so `User.posts` and
/// `Post.author` never hold references to one another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ObjectKind {
    Query,
    Mutation,
    User,
    Profile,
    Post,
    MemberType,
}

impl ObjectKind {
    const ALL: [ObjectKind; 6] = [
        ObjectKind::Query,
        ObjectKind::Mutation,
        ObjectKind::User,
        ObjectKind::Profile,
        ObjectKind::Post,
        ObjectKind::MemberType,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FieldDescriptor {
    pub(crate) is_list: bool,
    /// Set when the field returns one of the registered object types.
    pub(crate) object: Option<ObjectKind>,
}

#[derive(Clone, Debug)]
pub(crate) struct ObjectDescriptor {
    pub(crate) name: String,
    pub(crate) fields: IndexMap<String, FieldDescriptor>,
}

/// A GraphQL schema.
pub struct Schema {
    pub(crate) definitions: Valid<apollo_compiler::Schema>,
    pub(crate) implementers_map: apollo_compiler::collections::HashMap<Name, Implementers>,
    /// Indexed by [`ObjectKind`].
    objects: Vec<ObjectDescriptor>,
}

impl Schema {
    /// The schema served by this crate.
    pub fn bundled() -> Result<Self, SchemaError> {
        Self::parse(SCHEMA_SDL)
    }

    pub(crate) fn parse(sdl: &str) -> Result<Self, SchemaError> {
        let definitions = apollo_compiler::Schema::parse_and_validate(sdl, "schema.graphql")
            .map_err(|errors| SchemaError::Validate(errors.into()))?;

        let mut names = Vec::with_capacity(ObjectKind::ALL.len());
        for kind in ObjectKind::ALL {
            let name = match kind {
                ObjectKind::Query => definitions
                    .root_operation(OperationType::Query)
                    .ok_or(SchemaError::MissingRoot("query"))?
                    .as_str(),
                ObjectKind::Mutation => definitions
                    .root_operation(OperationType::Mutation)
                    .ok_or(SchemaError::MissingRoot("mutation"))?
                    .as_str(),
                ObjectKind::User => "User",
                ObjectKind::Profile => "Profile",
                ObjectKind::Post => "Post",
                ObjectKind::MemberType => "MemberType",
            };
            names.push(name.to_string());
        }
        let kinds: HashMap<&str, ObjectKind> = names
            .iter()
            .map(String::as_str)
            .zip(ObjectKind::ALL)
            .collect();

        let mut objects = Vec::with_capacity(names.len());
        for name in &names {
            let object = definitions
                .get_object(name)
                .ok_or_else(|| SchemaError::MissingType(name.clone()))?;
            let fields = object
                .fields
                .iter()
                .map(|(field_name, definition)| {
                    let descriptor = FieldDescriptor {
                        is_list: definition.ty.is_list(),
                        object: kinds
                            .get(definition.ty.inner_named_type().as_str())
                            .copied(),
                    };
                    (field_name.to_string(), descriptor)
                })
                .collect();
            objects.push(ObjectDescriptor {
                name: name.clone(),
                fields,
            });
        }

        let implementers_map = definitions.implementers_map();
        Ok(Schema {
            definitions,
            implementers_map,
            objects,
        })
    }

    pub(crate) fn object(&self, kind: ObjectKind) -> &ObjectDescriptor {
        &self.objects[kind.index()]
    }

    pub(crate) fn field(&self, kind: ObjectKind, name: &str) -> Option<&FieldDescriptor> {
        self.object(kind).fields.get(name)
    }

    pub(crate) fn type_name(&self, kind: ObjectKind) -> &str {
        &self.object(kind).name
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field(
                "objects",
                &self.objects.iter().map(|o| &o.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_schema_links_object_types() {
        let schema = Schema::bundled().unwrap();

        assert_eq!(schema.type_name(ObjectKind::Query), "RootQueryType");
        assert_eq!(schema.type_name(ObjectKind::Mutation), "Mutations");
        assert_eq!(
            schema.field(ObjectKind::User, "posts"),
            Some(&FieldDescriptor {
                is_list: true,
                object: Some(ObjectKind::Post),
            })
        );
        assert_eq!(
            schema.field(ObjectKind::Post, "author"),
            Some(&FieldDescriptor {
                is_list: false,
                object: Some(ObjectKind::User),
            })
        );
        assert_eq!(
            schema.field(ObjectKind::Profile, "yearOfBirth"),
            Some(&FieldDescriptor {
                is_list: false,
                object: None,
            })
        );
        assert!(schema.field(ObjectKind::User, "email").is_none());
    }

    #[test]
    fn missing_object_type_is_reported() {
        let sdl = r#"
            schema { query: Query mutation: Mutation }
            type Query { me: User }
            type Mutation { noop: Boolean }
            type User { id: ID }
        "#;
        let error = Schema::parse(sdl).unwrap_err();
        assert_eq!(error.to_string(), "object type 'Profile' is missing from the schema");
    }

    #[test]
    fn invalid_sdl_is_rejected() {
        let error = Schema::parse("type Query { me: Missing }").unwrap_err();
        assert!(matches!(error, SchemaError::Validate(_)));
    }
}
