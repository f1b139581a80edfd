//! A GraphQL service over users, profiles, posts and member types.
//!
//! Relations are resolved through request scoped [`loader::BatchLoader`]s, which coalesce the
//! lookups issued while one level of the selection tree resolves into a single storage call.
//! Operations nested deeper than the configured limit are rejected before any storage access.

#![warn(unreachable_pub)]

pub mod json_ext;

pub mod configuration;
pub mod error;
mod executable;
mod execution;
pub mod graphql;
pub mod loader;
pub mod services;
mod spec;
pub mod storage;

pub use configuration::Configuration;
pub use executable::main;
pub use services::GraphQLService;
pub use spec::Schema;
