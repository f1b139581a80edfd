//! The storage collaborator.
//!
//! Batch reads take an ordered key slice and return matching rows in the storage's own
//! order. Nothing here re-aligns rows to keys: that is the job of the per key type batch
//! functions in [`crate::execution::loaders`].

mod memory;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use displaydoc::Display;
pub use memory::MemoryStorage;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Storage errors.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageError {
    /// {entity} '{id}' not found
    NotFound { entity: &'static str, id: String },

    /// conflict: {0}
    Conflict(String),

    /// storage unavailable: {0}
    Unavailable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Identifier of a membership tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberTypeId {
    Basic,
    Business,
}

impl MemberTypeId {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberTypeId::Basic => "basic",
            MemberTypeId::Business => "business",
        }
    }
}

impl fmt::Display for MemberTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberTypeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(MemberTypeId::Basic),
            "business" => Ok(MemberTypeId::Business),
            other => Err(format!("unknown member type id '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberType {
    pub id: MemberTypeId,
    pub discount: f64,
    pub posts_limit_per_month: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub balance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub is_male: bool,
    pub year_of_birth: i32,
    pub user_id: Uuid,
    pub member_type_id: MemberTypeId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub author_id: Uuid,
}

/// A subscription edge: `subscriber_id` follows `author_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscriber_id: Uuid,
    pub author_id: Uuid,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateUserInput {
    pub name: String,
    pub balance: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChangeUserInput {
    pub name: Option<String>,
    pub balance: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateProfileInput {
    pub user_id: Uuid,
    pub member_type_id: MemberTypeId,
    pub is_male: bool,
    pub year_of_birth: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChangeProfileInput {
    pub member_type_id: Option<MemberTypeId>,
    pub is_male: Option<bool>,
    pub year_of_birth: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreatePostInput {
    pub author_id: Uuid,
    pub content: String,
    pub title: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChangePostInput {
    pub author_id: Option<Uuid>,
    pub content: Option<String>,
    pub title: Option<String>,
}

/// Relational storage used by the resolvers.
///
/// `*_by_*` methods are the batch entry points: they accept keys in any order, possibly
/// with duplicates, and never fabricate rows for keys that do not exist.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    async fn member_types(&self) -> StorageResult<Vec<MemberType>>;
    async fn member_types_by_ids(&self, ids: &[MemberTypeId]) -> StorageResult<Vec<MemberType>>;

    async fn users(&self) -> StorageResult<Vec<User>>;
    async fn users_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<User>>;

    async fn posts(&self) -> StorageResult<Vec<Post>>;
    async fn posts_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Post>>;
    async fn posts_by_author_ids(&self, author_ids: &[Uuid]) -> StorageResult<Vec<Post>>;

    async fn profiles(&self) -> StorageResult<Vec<Profile>>;
    async fn profiles_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Profile>>;
    async fn profiles_by_user_ids(&self, user_ids: &[Uuid]) -> StorageResult<Vec<Profile>>;
    async fn profiles_by_member_type_ids(
        &self,
        member_type_ids: &[MemberTypeId],
    ) -> StorageResult<Vec<Profile>>;

    async fn subscriptions_by_subscriber_ids(
        &self,
        subscriber_ids: &[Uuid],
    ) -> StorageResult<Vec<Subscription>>;
    async fn subscriptions_by_author_ids(
        &self,
        author_ids: &[Uuid],
    ) -> StorageResult<Vec<Subscription>>;

    async fn create_user(&self, input: CreateUserInput) -> StorageResult<User>;
    async fn change_user(&self, id: Uuid, input: ChangeUserInput) -> StorageResult<User>;
    /// Removes the user along with its profile, posts and subscription edges.
    async fn delete_user(&self, id: Uuid) -> StorageResult<()>;

    async fn create_profile(&self, input: CreateProfileInput) -> StorageResult<Profile>;
    async fn change_profile(&self, id: Uuid, input: ChangeProfileInput)
        -> StorageResult<Profile>;
    async fn delete_profile(&self, id: Uuid) -> StorageResult<()>;

    async fn create_post(&self, input: CreatePostInput) -> StorageResult<Post>;
    async fn change_post(&self, id: Uuid, input: ChangePostInput) -> StorageResult<Post>;
    async fn delete_post(&self, id: Uuid) -> StorageResult<()>;

    async fn subscribe(&self, subscriber_id: Uuid, author_id: Uuid) -> StorageResult<()>;
    async fn unsubscribe(&self, subscriber_id: Uuid, author_id: Uuid) -> StorageResult<()>;
}
