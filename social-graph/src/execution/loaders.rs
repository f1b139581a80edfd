//! Batch functions, one per key type.
//!
//! Storage returns matching rows in its own order. Each batch function re-aligns them to
//! the order of the requested keys so that position `i` of its output always belongs to
//! `keys[i]`.

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use tower::BoxError;
use uuid::Uuid;

use crate::loader::BatchFetch;
use crate::storage::MemberType;
use crate::storage::MemberTypeId;
use crate::storage::Post;
use crate::storage::Profile;
use crate::storage::Storage;
use crate::storage::User;

/// Declares a batch function holding a storage handle.
macro_rules! batch_fetch {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        pub(crate) struct $name {
            storage: Arc<dyn Storage>,
        }

        impl $name {
            pub(crate) fn new(storage: Arc<dyn Storage>) -> Self {
                Self { storage }
            }
        }
    };
}

batch_fetch!(
    /// `User.id` to user.
    UserById
);
batch_fetch!(
    /// `Post.id` to post.
    PostById
);
batch_fetch!(
    /// `Profile.id` to profile.
    ProfileById
);
batch_fetch!(
    /// `User.id` to the profile of that user.
    ProfileByUserId
);
batch_fetch!(
    /// `User.id` to the posts written by that user.
    PostsByAuthorId
);
batch_fetch!(
    /// `MemberType.id` to the profiles on that tier.
    ProfilesByMemberTypeId
);
batch_fetch!(
    /// `MemberType.id` to member type.
    MemberTypeById
);
batch_fetch!(
    /// Subscriber id to the ids of the authors they follow.
    AuthorIdsBySubscriberId
);
batch_fetch!(
    /// Author id to the ids of their followers.
    SubscriberIdsByAuthorId
);

#[async_trait]
impl BatchFetch for UserById {
    type Key = Uuid;
    type Value = User;

    async fn fetch(&self, keys: &[Uuid]) -> Result<Vec<Option<User>>, BoxError> {
        let rows = self.storage.users_by_ids(keys).await?;
        Ok(align_one(self.name(), keys, rows, |user| user.id))
    }
}

#[async_trait]
impl BatchFetch for PostById {
    type Key = Uuid;
    type Value = Post;

    async fn fetch(&self, keys: &[Uuid]) -> Result<Vec<Option<Post>>, BoxError> {
        let rows = self.storage.posts_by_ids(keys).await?;
        Ok(align_one(self.name(), keys, rows, |post| post.id))
    }
}

#[async_trait]
impl BatchFetch for ProfileById {
    type Key = Uuid;
    type Value = Profile;

    async fn fetch(&self, keys: &[Uuid]) -> Result<Vec<Option<Profile>>, BoxError> {
        let rows = self.storage.profiles_by_ids(keys).await?;
        Ok(align_one(self.name(), keys, rows, |profile| profile.id))
    }
}

#[async_trait]
impl BatchFetch for ProfileByUserId {
    type Key = Uuid;
    type Value = Profile;

    async fn fetch(&self, keys: &[Uuid]) -> Result<Vec<Option<Profile>>, BoxError> {
        let rows = self.storage.profiles_by_user_ids(keys).await?;
        Ok(align_one(self.name(), keys, rows, |profile| profile.user_id))
    }
}

#[async_trait]
impl BatchFetch for PostsByAuthorId {
    type Key = Uuid;
    type Value = Vec<Post>;

    async fn fetch(&self, keys: &[Uuid]) -> Result<Vec<Option<Vec<Post>>>, BoxError> {
        let rows = self.storage.posts_by_author_ids(keys).await?;
        Ok(align_many(self.name(), keys, rows, |post| {
            (post.author_id, post.clone())
        }))
    }
}

#[async_trait]
impl BatchFetch for ProfilesByMemberTypeId {
    type Key = MemberTypeId;
    type Value = Vec<Profile>;

    async fn fetch(&self, keys: &[MemberTypeId]) -> Result<Vec<Option<Vec<Profile>>>, BoxError> {
        let rows = self.storage.profiles_by_member_type_ids(keys).await?;
        Ok(align_many(self.name(), keys, rows, |profile| {
            (profile.member_type_id, profile.clone())
        }))
    }
}

#[async_trait]
impl BatchFetch for MemberTypeById {
    type Key = MemberTypeId;
    type Value = MemberType;

    async fn fetch(&self, keys: &[MemberTypeId]) -> Result<Vec<Option<MemberType>>, BoxError> {
        let rows = self.storage.member_types_by_ids(keys).await?;
        Ok(align_one(self.name(), keys, rows, |member_type| {
            member_type.id
        }))
    }
}

#[async_trait]
impl BatchFetch for AuthorIdsBySubscriberId {
    type Key = Uuid;
    type Value = Vec<Uuid>;

    async fn fetch(&self, keys: &[Uuid]) -> Result<Vec<Option<Vec<Uuid>>>, BoxError> {
        let rows = self.storage.subscriptions_by_subscriber_ids(keys).await?;
        Ok(align_many(self.name(), keys, rows, |edge| {
            (edge.subscriber_id, edge.author_id)
        }))
    }
}

#[async_trait]
impl BatchFetch for SubscriberIdsByAuthorId {
    type Key = Uuid;
    type Value = Vec<Uuid>;

    async fn fetch(&self, keys: &[Uuid]) -> Result<Vec<Option<Vec<Uuid>>>, BoxError> {
        let rows = self.storage.subscriptions_by_author_ids(keys).await?;
        Ok(align_many(self.name(), keys, rows, |edge| {
            (edge.author_id, edge.subscriber_id)
        }))
    }
}

/// One row per key. Keys without a row are absent.
fn align_one<K, V>(
    loader: &'static str,
    keys: &[K],
    rows: Vec<V>,
    key_of: impl Fn(&V) -> K,
) -> Vec<Option<V>>
where
    K: Eq + Hash + fmt::Debug,
    V: Clone,
{
    let requested: HashSet<&K> = keys.iter().collect();
    let mut by_key: HashMap<K, V> = HashMap::with_capacity(rows.len());
    for row in rows {
        let key = key_of(&row);
        if !requested.contains(&key) {
            tracing::trace!(loader, ?key, "ignoring row for a key that was not requested");
            continue;
        }
        by_key.entry(key).or_insert(row);
    }
    keys.iter().map(|key| by_key.get(key).cloned()).collect()
}

/// Any number of rows per key. Keys without rows get an empty list, never an absent value.
fn align_many<K, R, V>(
    loader: &'static str,
    keys: &[K],
    rows: Vec<R>,
    split: impl Fn(&R) -> (K, V),
) -> Vec<Option<Vec<V>>>
where
    K: Eq + Hash + fmt::Debug,
    V: Clone,
{
    let requested: HashSet<&K> = keys.iter().collect();
    let mut by_key: HashMap<K, Vec<V>> = HashMap::with_capacity(keys.len());
    for row in &rows {
        let (key, value) = split(row);
        if !requested.contains(&key) {
            tracing::trace!(loader, ?key, "ignoring row for a key that was not requested");
            continue;
        }
        by_key.entry(key).or_default().push(value);
    }
    keys.iter()
        .map(|key| Some(by_key.get(key).cloned().unwrap_or_default()))
        .collect()
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::storage::CreatePostInput;
    use crate::storage::CreateProfileInput;
    use crate::storage::CreateUserInput;
    use crate::storage::MemoryStorage;

    #[test]
    fn rows_are_realigned_to_key_order() {
        let rows = vec![(3, "c"), (1, "a"), (2, "b")];
        let aligned = align_one("Test", &[2, 4, 1, 3], rows, |row| row.0);
        assert_eq!(
            aligned,
            vec![Some((2, "b")), None, Some((1, "a")), Some((3, "c"))]
        );
    }

    #[test]
    fn unrequested_rows_are_ignored() {
        let rows = vec![(9, "z"), (1, "a")];
        let aligned = align_one("Test", &[1], rows, |row| row.0);
        assert_eq!(aligned, vec![Some((1, "a"))]);

        let grouped = align_many("Test", &[1], vec![(9, "z"), (1, "a")], |row| *row);
        assert_eq!(grouped, vec![Some(vec!["a"])]);
    }

    #[test]
    fn keys_without_rows_get_an_empty_list() {
        let rows = vec![(1, "a"), (2, "b"), (1, "c")];
        let grouped = align_many("Test", &[3, 1, 2], rows, |row| *row);
        assert_eq!(
            grouped,
            vec![Some(vec![]), Some(vec!["a", "c"]), Some(vec!["b"])]
        );
    }

    #[test(tokio::test)]
    async fn storage_backed_batch_functions() {
        let storage = Arc::new(MemoryStorage::builder().build());
        let ann = storage
            .create_user(CreateUserInput {
                name: "ann".to_string(),
                balance: 1.0,
            })
            .await
            .unwrap();
        let bob = storage
            .create_user(CreateUserInput {
                name: "bob".to_string(),
                balance: 2.0,
            })
            .await
            .unwrap();
        storage
            .create_post(CreatePostInput {
                author_id: bob.id,
                title: "hello".to_string(),
                content: "world".to_string(),
            })
            .await
            .unwrap();
        storage
            .create_profile(CreateProfileInput {
                user_id: ann.id,
                member_type_id: MemberTypeId::Business,
                is_male: false,
                year_of_birth: 1990,
            })
            .await
            .unwrap();
        storage.subscribe(ann.id, bob.id).await.unwrap();

        let users = UserById::new(storage.clone())
            .fetch(&[bob.id, Uuid::nil(), ann.id])
            .await
            .unwrap();
        assert_eq!(users, vec![Some(bob.clone()), None, Some(ann.clone())]);

        let posts = PostsByAuthorId::new(storage.clone())
            .fetch(&[ann.id, bob.id])
            .await
            .unwrap();
        assert_eq!(posts[0], Some(vec![]));
        assert_eq!(posts[1].as_ref().map(Vec::len), Some(1));

        let profiles = ProfileByUserId::new(storage.clone())
            .fetch(&[bob.id, ann.id])
            .await
            .unwrap();
        assert!(profiles[0].is_none());
        assert_eq!(
            profiles[1].as_ref().map(|profile| profile.member_type_id),
            Some(MemberTypeId::Business)
        );

        let followed = AuthorIdsBySubscriberId::new(storage.clone())
            .fetch(&[ann.id, bob.id])
            .await
            .unwrap();
        assert_eq!(followed, vec![Some(vec![bob.id]), Some(vec![])]);

        let followers = SubscriberIdsByAuthorId::new(storage.clone())
            .fetch(&[bob.id])
            .await
            .unwrap();
        assert_eq!(followers, vec![Some(vec![ann.id])]);

        let tiers = MemberTypeById::new(storage)
            .fetch(&[MemberTypeId::Business, MemberTypeId::Basic])
            .await
            .unwrap();
        assert_eq!(
            tiers
                .iter()
                .map(|tier| tier.as_ref().map(|tier| tier.posts_limit_per_month))
                .collect::<Vec<_>>(),
            vec![Some(100), Some(20)]
        );
    }
}
