//! The request pipeline.

use std::sync::Arc;

use tracing::Instrument;

use crate::configuration::Configuration;
use crate::error::ServiceBuildError;
use crate::execution;
use crate::execution::RequestContext;
use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::graphql::IntoGraphQLErrors;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::spec::operation_limits;
use crate::spec::Query;
use crate::spec::Schema;
use crate::spec::SpecError;
use crate::storage::Storage;

/// Turns GraphQL requests into responses.
///
/// Parsing, validation and the depth limit all run before anything touches storage. Each
/// call to [`GraphQLService::execute`] gets its own loaders, so nothing memoized while
/// serving one request is visible to another.
#[derive(Clone)]
pub struct GraphQLService {
    schema: Arc<Schema>,
    storage: Arc<dyn Storage>,
    max_depth: Option<u32>,
}

impl GraphQLService {
    /// Builds the service for the bundled schema.
    pub fn new(
        configuration: &Configuration,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, ServiceBuildError> {
        let schema = Schema::bundled()?;
        Ok(Self {
            schema: Arc::new(schema),
            storage,
            max_depth: configuration.limits().max_depth(),
        })
    }

    pub async fn execute(&self, request: Request) -> Response {
        let span = tracing::info_span!(
            "graphql_request",
            "graphql.operation.name" = request.operation_name.as_deref().unwrap_or_default(),
        );
        self.execute_request(request).instrument(span).await
    }

    async fn execute_request(&self, request: Request) -> Response {
        let query = match self.prepare(&request) {
            Ok(query) => query,
            Err(error) => {
                tracing::debug!(%error, "request rejected before execution");
                return Response::from_errors(to_graphql_errors(error));
            }
        };

        let context = RequestContext::new(self.schema.clone(), self.storage.clone());
        let data = execution::execute(&context, &query).await;
        let errors = context.take_errors();
        tracing::debug!(errors = errors.len(), "request executed");

        Response::builder().data(data).errors(errors).build()
    }

    fn prepare(&self, request: &Request) -> Result<Query, SpecError> {
        let query = Query::parse(request, &self.schema)?;
        operation_limits::check(&query, self.max_depth)?;
        Ok(query)
    }
}

impl std::fmt::Debug for GraphQLService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQLService")
            .field("schema", &self.schema)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

fn to_graphql_errors(error: SpecError) -> Vec<Error> {
    error.into_graphql_errors().unwrap_or_else(|error| {
        vec![Error::builder()
            .message(error.to_string())
            .extension_code(error.extension_code())
            .build()]
    })
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;
    use test_log::test;

    use super::*;
    use crate::configuration::Limits;
    use crate::storage::CreateUserInput;
    use crate::storage::MemoryStorage;

    async fn service(max_depth: Option<u32>) -> (GraphQLService, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::builder().build());
        storage
            .create_user(CreateUserInput {
                name: "ann".to_string(),
                balance: 1.5,
            })
            .await
            .unwrap();
        let limits = match max_depth {
            Some(max_depth) => Limits::builder().max_depth(max_depth).build(),
            None => Limits::unlimited(),
        };
        let configuration = Configuration::builder().limits(limits).build();
        let service = GraphQLService::new(&configuration, storage.clone()).unwrap();
        (service, storage)
    }

    #[test(tokio::test)]
    async fn executes_a_query() {
        let (service, _) = service(Some(5)).await;
        let response = service
            .execute(
                Request::builder()
                    .query("{ users { name balance } memberTypes { id postsLimitPerMonth } }")
                    .build(),
            )
            .await;
        insta::assert_json_snapshot!(response, @r#"
        {
          "data": {
            "users": [
              {
                "name": "ann",
                "balance": 1.5
              }
            ],
            "memberTypes": [
              {
                "id": "basic",
                "postsLimitPerMonth": 20
              },
              {
                "id": "business",
                "postsLimitPerMonth": 100
              }
            ]
          }
        }
        "#);
    }

    #[test(tokio::test)]
    async fn too_deep_queries_never_execute() {
        let (service, _) = service(Some(1)).await;
        let response = service
            .execute(
                Request::builder()
                    .query("{ users { posts { id } } }")
                    .build(),
            )
            .await;
        assert_eq!(response.data, None);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(
            response.errors[0].extension_code().as_deref(),
            Some("MAX_DEPTH_LIMIT")
        );
        assert_eq!(
            response.errors[0].path.as_ref().map(ToString::to_string).as_deref(),
            Some("/users/posts/id")
        );
    }

    #[test(tokio::test)]
    async fn disabled_limit_allows_any_depth() {
        let (service, _) = service(None).await;
        let response = service
            .execute(
                Request::builder()
                    .query("{ users { posts { author { posts { author { posts { author { name } } } } } } } }")
                    .build(),
            )
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(response.data, Some(json!({ "users": [{ "posts": [] }] })));
    }

    #[test(tokio::test)]
    async fn validation_errors_are_reported_without_data() {
        let (service, _) = service(Some(5)).await;
        let response = service
            .execute(Request::builder().query("{ users { email } }").build())
            .await;
        assert_eq!(response.data, None);
        assert_eq!(
            response.errors[0].extension_code().as_deref(),
            Some("GRAPHQL_VALIDATION_FAILED")
        );
        assert!(!response.errors[0].locations.is_empty());
    }

    #[test(tokio::test)]
    async fn subscriptions_are_not_part_of_the_schema() {
        let (service, _) = service(Some(5)).await;
        let response = service
            .execute(
                Request::builder()
                    .query("subscription { users { id } }")
                    .build(),
            )
            .await;
        assert_eq!(response.data, None);
        assert_eq!(
            response.errors[0].extension_code().as_deref(),
            Some("GRAPHQL_VALIDATION_FAILED")
        );
    }

    #[test(tokio::test)]
    async fn introspection_is_not_depth_limited() {
        let (service, _) = service(Some(2)).await;
        let response = service
            .execute(
                Request::builder()
                    .query(
                        "{ __schema { types { name fields { name type { name ofType { name } } } } } }",
                    )
                    .build(),
            )
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.unwrap();
        let types = data["__schema"]["types"].as_array().unwrap();
        assert!(types
            .iter()
            .any(|ty| ty["name"] == json!("MemberType")));
    }
}
