//! HTTP transport.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Json;
use axum::Router;
use tower_http::trace::TraceLayer;

use super::GraphQLService;
use crate::configuration::Configuration;
use crate::error::ServiceBuildError;
use crate::graphql;

/// Builds the axum router serving `service` on the configured path.
pub fn main_router(
    configuration: &Configuration,
    service: GraphQLService,
) -> Result<Router, ServiceBuildError> {
    let path = configuration.server().path();
    if !path.starts_with('/') {
        return Err(ServiceBuildError::InvalidPath(path.to_string()));
    }

    Ok(Router::new()
        .route(path, post(handle_post))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(service))))
}

async fn handle_post(
    Extension(service): Extension<Arc<GraphQLService>>,
    request: Result<Json<graphql::Request>, JsonRejection>,
) -> impl IntoResponse {
    match request {
        Ok(Json(request)) => (StatusCode::OK, Json(service.execute(request).await)),
        Err(rejection) => {
            tracing::debug!(%rejection, "invalid GraphQL request");
            let error = graphql::Error::builder()
                .message(format!("invalid GraphQL request: {}", rejection.body_text()))
                .extension_code("INVALID_GRAPHQL_REQUEST")
                .build();
            (
                StatusCode::BAD_REQUEST,
                Json(graphql::Response::from_errors(vec![error])),
            )
        }
    }
}

/// Serves `router` on the configured address until Ctrl-C.
pub async fn serve(configuration: &Configuration, router: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(configuration.server().listen()).await?;
    tracing::info!(
        "GraphQL endpoint exposed at http://{}{} 🚀",
        listener.local_addr()?,
        configuration.server().path()
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "cannot listen for the shutdown signal");
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json_bytes::json;
    use test_log::test;
    use tower::ServiceExt;

    use super::*;
    use crate::configuration::Server;
    use crate::storage::MemoryStorage;

    fn router(path: &str) -> Result<Router, ServiceBuildError> {
        let configuration = Configuration::builder()
            .server(Server::builder().path(path).build())
            .build();
        let service =
            GraphQLService::new(&configuration, Arc::new(MemoryStorage::builder().build()))?;
        main_router(&configuration, service)
    }

    async fn post_body(router: Router, uri: &str, body: &'static str) -> (StatusCode, serde_json_bytes::Value) {
        let response = router
            .oneshot(
                http::Request::post(uri)
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test(tokio::test)]
    async fn serves_the_configured_path() {
        let (status, body) = post_body(
            router("/graphql").unwrap(),
            "/graphql",
            r#"{ "query": "{ memberType(id: basic) { discount } }" }"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "data": { "memberType": { "discount": 2.3 } } }));
    }

    #[test(tokio::test)]
    async fn malformed_body_is_a_bad_request() {
        let (status, body) = post_body(router("/").unwrap(), "/", r#"{ "query": 42 }"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["errors"][0]["extensions"]["code"],
            json!("INVALID_GRAPHQL_REQUEST")
        );
    }

    #[test]
    fn relative_paths_are_rejected() {
        let error = router("graphql").unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid GraphQL endpoint path 'graphql': it must start with '/'"
        );
    }
}
