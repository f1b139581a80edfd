//! Implementation of the request processing pipeline and its HTTP endpoint.

mod graphql_service;
pub mod http;

pub use self::graphql_service::GraphQLService;
