//! Field resolvers, one function per object type.

use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::context::RequestContext;
use super::Record;
use super::Resolved;
use crate::error::FetchError;
use crate::json_ext::Value;
use crate::loader::LoadResult;
use crate::spec::schema::ObjectKind;
use crate::spec::Selection;
use crate::storage::ChangePostInput;
use crate::storage::ChangeProfileInput;
use crate::storage::ChangeUserInput;
use crate::storage::CreatePostInput;
use crate::storage::CreateProfileInput;
use crate::storage::CreateUserInput;
use crate::storage::MemberType;
use crate::storage::MemberTypeId;
use crate::storage::Post;
use crate::storage::Profile;
use crate::storage::StorageError;
use crate::storage::User;

/// Resolves `field` on `record`.
///
/// Relations go through the request's loaders, mutations straight to storage.
pub(crate) async fn resolve(
    context: &RequestContext,
    record: &Record,
    field: &Selection,
) -> Result<Resolved, FetchError> {
    match record {
        Record::Query => query(context, field).await,
        Record::Mutation => mutation(context, field).await,
        Record::User(user) => user_field(context, user, field).await,
        Record::Profile(profile) => profile_field(context, profile, field).await,
        Record::Post(post) => post_field(context, post, field).await,
        Record::MemberType(member_type) => member_type_field(context, member_type, field).await,
    }
}

async fn query(context: &RequestContext, field: &Selection) -> Result<Resolved, FetchError> {
    let storage = context.storage();
    Ok(match field.name.as_str() {
        "memberTypes" => list(storage.member_types().await?, Record::MemberType),
        "memberType" => {
            let id: MemberTypeId = argument(field, "id")?;
            object(context.member_type_by_id().load(id).await, Record::MemberType)?
        }
        "posts" => list(storage.posts().await?, Record::Post),
        "post" => {
            let id: Uuid = argument(field, "id")?;
            object(context.post_by_id().load(id).await, Record::Post)?
        }
        "users" => list(storage.users().await?, Record::User),
        "user" => {
            let id: Uuid = argument(field, "id")?;
            object(context.user_by_id().load(id).await, Record::User)?
        }
        "profiles" => list(storage.profiles().await?, Record::Profile),
        "profile" => {
            let id: Uuid = argument(field, "id")?;
            object(context.profile_by_id().load(id).await, Record::Profile)?
        }
        _ => return Err(unknown_field(context, ObjectKind::Query, field)),
    })
}

async fn mutation(context: &RequestContext, field: &Selection) -> Result<Resolved, FetchError> {
    let storage = context.storage();
    let resolved = match field.name.as_str() {
        "createUser" => {
            let dto: CreateUserInput = argument(field, "dto")?;
            Resolved::Object(Some(Record::User(storage.create_user(dto).await?)))
        }
        "changeUser" => {
            let id: Uuid = argument(field, "id")?;
            let dto: ChangeUserInput = argument(field, "dto")?;
            Resolved::Object(Some(Record::User(storage.change_user(id, dto).await?)))
        }
        "deleteUser" => {
            storage.delete_user(argument(field, "id")?).await?;
            Resolved::Leaf(Value::Bool(true))
        }
        "createProfile" => {
            let dto: CreateProfileInput = argument(field, "dto")?;
            Resolved::Object(Some(Record::Profile(storage.create_profile(dto).await?)))
        }
        "changeProfile" => {
            let id: Uuid = argument(field, "id")?;
            let dto: ChangeProfileInput = argument(field, "dto")?;
            Resolved::Object(Some(Record::Profile(
                storage.change_profile(id, dto).await?,
            )))
        }
        "deleteProfile" => {
            storage.delete_profile(argument(field, "id")?).await?;
            Resolved::Leaf(Value::Bool(true))
        }
        "createPost" => {
            let dto: CreatePostInput = argument(field, "dto")?;
            Resolved::Object(Some(Record::Post(storage.create_post(dto).await?)))
        }
        "changePost" => {
            let id: Uuid = argument(field, "id")?;
            let dto: ChangePostInput = argument(field, "dto")?;
            Resolved::Object(Some(Record::Post(storage.change_post(id, dto).await?)))
        }
        "deletePost" => {
            storage.delete_post(argument(field, "id")?).await?;
            Resolved::Leaf(Value::Bool(true))
        }
        "subscribeTo" => {
            let user_id: Uuid = argument(field, "userId")?;
            let author_id: Uuid = argument(field, "authorId")?;
            storage.subscribe(user_id, author_id).await?;
            // the subscriber, freshly read so its relations reflect the new edge
            let subscriber = storage
                .users_by_ids(&[user_id])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| StorageError::NotFound {
                    entity: "user",
                    id: user_id.to_string(),
                })?;
            Resolved::Object(Some(Record::User(subscriber)))
        }
        "unsubscribeFrom" => {
            let user_id: Uuid = argument(field, "userId")?;
            let author_id: Uuid = argument(field, "authorId")?;
            storage.unsubscribe(user_id, author_id).await?;
            Resolved::Leaf(Value::Bool(true))
        }
        _ => return Err(unknown_field(context, ObjectKind::Mutation, field)),
    };
    tracing::debug!(mutation = %field.name, "mutation applied");
    Ok(resolved)
}

async fn user_field(
    context: &RequestContext,
    user: &User,
    field: &Selection,
) -> Result<Resolved, FetchError> {
    Ok(match field.name.as_str() {
        "id" => leaf(user.id.to_string()),
        "name" => leaf(user.name.as_str()),
        "balance" => Resolved::Leaf(float(user.balance)),
        "profile" => object(
            context.profile_by_user_id().load(user.id).await,
            Record::Profile,
        )?,
        "posts" => list(
            context
                .posts_by_author_id()
                .load(user.id)
                .await?
                .unwrap_or_default(),
            Record::Post,
        ),
        "userSubscribedTo" => {
            let ids = context
                .author_ids_by_subscriber_id()
                .load(user.id)
                .await?
                .unwrap_or_default();
            users(context, ids).await?
        }
        "subscribedToUser" => {
            let ids = context
                .subscriber_ids_by_author_id()
                .load(user.id)
                .await?
                .unwrap_or_default();
            users(context, ids).await?
        }
        _ => return Err(unknown_field(context, ObjectKind::User, field)),
    })
}

async fn profile_field(
    context: &RequestContext,
    profile: &Profile,
    field: &Selection,
) -> Result<Resolved, FetchError> {
    Ok(match field.name.as_str() {
        "id" => leaf(profile.id.to_string()),
        "isMale" => leaf(profile.is_male),
        "yearOfBirth" => leaf(profile.year_of_birth),
        "userId" => leaf(profile.user_id.to_string()),
        "memberTypeId" => leaf(profile.member_type_id.as_str()),
        "memberType" => object(
            context
                .member_type_by_id()
                .load(profile.member_type_id)
                .await,
            Record::MemberType,
        )?,
        "user" => object(
            context.user_by_id().load(profile.user_id).await,
            Record::User,
        )?,
        _ => return Err(unknown_field(context, ObjectKind::Profile, field)),
    })
}

async fn post_field(
    context: &RequestContext,
    post: &Post,
    field: &Selection,
) -> Result<Resolved, FetchError> {
    Ok(match field.name.as_str() {
        "id" => leaf(post.id.to_string()),
        "title" => leaf(post.title.as_str()),
        "content" => leaf(post.content.as_str()),
        "authorId" => leaf(post.author_id.to_string()),
        "author" => object(
            context.user_by_id().load(post.author_id).await,
            Record::User,
        )?,
        _ => return Err(unknown_field(context, ObjectKind::Post, field)),
    })
}

async fn member_type_field(
    context: &RequestContext,
    member_type: &MemberType,
    field: &Selection,
) -> Result<Resolved, FetchError> {
    Ok(match field.name.as_str() {
        "id" => leaf(member_type.id.as_str()),
        "discount" => Resolved::Leaf(float(member_type.discount)),
        "postsLimitPerMonth" => leaf(member_type.posts_limit_per_month),
        "profiles" => list(
            context
                .profiles_by_member_type_id()
                .load(member_type.id)
                .await?
                .unwrap_or_default(),
            Record::Profile,
        ),
        _ => return Err(unknown_field(context, ObjectKind::MemberType, field)),
    })
}

/// Resolves user ids through `UserById`, dropping ids that no longer exist.
async fn users(context: &RequestContext, ids: Vec<Uuid>) -> Result<Resolved, FetchError> {
    let loader = context.user_by_id();
    let mut records = Vec::with_capacity(ids.len());
    for user in loader.load_many(ids).await {
        if let Some(user) = user? {
            records.push(Record::User(user));
        }
    }
    Ok(Resolved::List(records))
}

fn argument<T: DeserializeOwned>(field: &Selection, name: &str) -> Result<T, FetchError> {
    let value = field.arguments.get(name).cloned().unwrap_or(Value::Null);
    serde_json_bytes::from_value(value).map_err(|error| FetchError::InvalidArgument {
        name: name.to_string(),
        reason: error.to_string(),
    })
}

fn unknown_field(context: &RequestContext, kind: ObjectKind, field: &Selection) -> FetchError {
    FetchError::UnknownField {
        type_name: context.schema().type_name(kind).to_string(),
        field: field.name.clone(),
    }
}

fn leaf(value: impl Into<Value>) -> Resolved {
    Resolved::Leaf(value.into())
}

fn float(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn object<V>(
    loaded: LoadResult<V>,
    record: impl FnOnce(V) -> Record,
) -> Result<Resolved, FetchError> {
    Ok(Resolved::Object(loaded?.map(record)))
}

fn list<V>(rows: Vec<V>, record: impl Fn(V) -> Record) -> Resolved {
    Resolved::List(rows.into_iter().map(record).collect())
}
