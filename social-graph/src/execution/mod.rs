//! Field resolution.
//!
//! The selection tree is walked in one task per request. Sibling fields of a query are
//! polled together so that their loads land in the same batch; mutation root fields run
//! one after the other.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

mod context;
pub(crate) mod loaders;
mod resolvers;

pub(crate) use context::RequestContext;
use futures::future::join_all;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json_bytes::ByteString;

use crate::error::FetchError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::spec::introspection;
use crate::spec::schema::ObjectKind;
use crate::spec::OperationKind;
use crate::spec::Query;
use crate::spec::Selection;
use crate::spec::TYPENAME;
use crate::storage::MemberType;
use crate::storage::Post;
use crate::storage::Profile;
use crate::storage::User;

/// The parent value a field is resolved on.
#[derive(Clone, Debug)]
pub(crate) enum Record {
    Query,
    Mutation,
    User(User),
    Profile(Profile),
    Post(Post),
    MemberType(MemberType),
}

impl Record {
    fn kind(&self) -> ObjectKind {
        match self {
            Record::Query => ObjectKind::Query,
            Record::Mutation => ObjectKind::Mutation,
            Record::User(_) => ObjectKind::User,
            Record::Profile(_) => ObjectKind::Profile,
            Record::Post(_) => ObjectKind::Post,
            Record::MemberType(_) => ObjectKind::MemberType,
        }
    }
}

/// What a resolver produced for one field.
#[derive(Debug)]
pub(crate) enum Resolved {
    /// Scalars, enums and `null`.
    Leaf(Value),
    /// A single object, `None` when the relation is absent.
    Object(Option<Record>),
    List(Vec<Record>),
}

/// Executes `query` and returns the `data` member of the response.
///
/// Field errors do not fail the request: the field is set to `null` and the error, with
/// its response path, is recorded on `context`.
pub(crate) async fn execute(context: &RequestContext, query: &Query) -> Value {
    let root = match query.kind {
        OperationKind::Query => Record::Query,
        OperationKind::Mutation => Record::Mutation,
    };
    let data = match query.kind {
        OperationKind::Query => {
            let mut data = execute_fields(context, &root, &query.selections, Path::empty()).await;
            if let Some(answers) = &query.introspection {
                for (key, value) in answers.data.iter() {
                    data.insert(key.clone(), value.clone());
                }
                for error in &answers.errors {
                    context.push_error(error.clone());
                }
            }
            data
        }
        OperationKind::Mutation => {
            let mut data = Object::new();
            for field in &query.selections {
                let value =
                    execute_field(context, &root, field, Path::empty().join_key(field.response_key.as_str()))
                        .await;
                data.insert(ByteString::from(field.response_key.as_str()), value);
            }
            data
        }
    };
    Value::Object(data)
}

fn execute_fields<'a>(
    context: &'a RequestContext,
    record: &'a Record,
    selections: &'a [Selection],
    path: Path,
) -> BoxFuture<'a, Object> {
    async move {
        let values = join_all(selections.iter().map(|field| {
            execute_field(
                context,
                record,
                field,
                path.join_key(field.response_key.as_str()),
            )
        }))
        .await;

        selections
            .iter()
            .zip(values)
            .map(|(field, value)| (ByteString::from(field.response_key.as_str()), value))
            .collect()
    }
    .boxed()
}

fn execute_field<'a>(
    context: &'a RequestContext,
    record: &'a Record,
    field: &'a Selection,
    path: Path,
) -> BoxFuture<'a, Value> {
    async move {
        let kind = record.kind();
        if field.name == TYPENAME {
            return Value::String(context.schema().type_name(kind).into());
        }
        if kind == ObjectKind::Query && introspection::is_root_field(&field.name) {
            // filled in from the query's introspection answers
            return Value::Null;
        }
        if context.schema().field(kind, &field.name).is_none() {
            let error = FetchError::UnknownField {
                type_name: context.schema().type_name(kind).to_string(),
                field: field.name.clone(),
            };
            context.push_error(error.to_graphql_error(Some(path)));
            return Value::Null;
        }

        match resolvers::resolve(context, record, field).await {
            Ok(Resolved::Leaf(value)) => value,
            Ok(Resolved::Object(None)) => Value::Null,
            Ok(Resolved::Object(Some(child))) => {
                Value::Object(execute_fields(context, &child, &field.selections, path).await)
            }
            Ok(Resolved::List(children)) => {
                let items = join_all(children.iter().enumerate().map(|(index, child)| {
                    execute_fields(context, child, &field.selections, path.join_index(index))
                }))
                .await;
                Value::Array(items.into_iter().map(Value::Object).collect())
            }
            Err(error) => {
                tracing::debug!(%path, %error, "field resolution failed");
                context.push_error(error.to_graphql_error(Some(path)));
                Value::Null
            }
        }
    }
    .boxed()
}
