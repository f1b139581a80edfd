//! In-memory storage.
//!
//! Tables are insertion ordered. Batch reads scan a table and keep the rows whose key is in
//! the requested set, so rows come back in table order whatever order the keys were given in.

use std::collections::HashSet;
use std::hash::Hash;

use async_trait::async_trait;
use indexmap::IndexMap;
use indexmap::IndexSet;
use parking_lot::RwLock;
use uuid::Uuid;

use super::ChangePostInput;
use super::ChangeProfileInput;
use super::ChangeUserInput;
use super::CreatePostInput;
use super::CreateProfileInput;
use super::CreateUserInput;
use super::MemberType;
use super::MemberTypeId;
use super::Post;
use super::Profile;
use super::Storage;
use super::StorageError;
use super::StorageResult;
use super::Subscription;
use super::User;

#[derive(Debug, Default)]
struct Tables {
    member_types: IndexMap<MemberTypeId, MemberType>,
    users: IndexMap<Uuid, User>,
    profiles: IndexMap<Uuid, Profile>,
    posts: IndexMap<Uuid, Post>,
    subscriptions: IndexSet<Subscription>,
}

/// [`Storage`] kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

#[buildstructor::buildstructor]
impl MemoryStorage {
    /// Builds a storage, optionally pre-populated with the two membership tiers.
    #[builder]
    pub fn new(seed_member_types: Option<bool>) -> Self {
        let storage = Self::default();
        if seed_member_types.unwrap_or(true) {
            let mut tables = storage.tables.write();
            for member_type in default_member_types() {
                tables.member_types.insert(member_type.id, member_type);
            }
        }
        storage
    }
}

fn default_member_types() -> [MemberType; 2] {
    [
        MemberType {
            id: MemberTypeId::Basic,
            discount: 2.3,
            posts_limit_per_month: 20,
        },
        MemberType {
            id: MemberTypeId::Business,
            discount: 7.7,
            posts_limit_per_month: 100,
        },
    ]
}

fn select<K, V, F>(rows: &IndexMap<K, V>, keys: &[K], key_of: F) -> Vec<V>
where
    K: Hash + Eq,
    V: Clone,
    F: Fn(&V) -> &K,
{
    let wanted: HashSet<&K> = keys.iter().collect();
    rows.values()
        .filter(|row| wanted.contains(key_of(row)))
        .cloned()
        .collect()
}

fn not_found(entity: &'static str, id: impl ToString) -> StorageError {
    StorageError::NotFound {
        entity,
        id: id.to_string(),
    }
}

impl Tables {
    fn ensure_user(&self, id: Uuid) -> StorageResult<()> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(not_found("user", id))
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn member_types(&self) -> StorageResult<Vec<MemberType>> {
        Ok(self.tables.read().member_types.values().cloned().collect())
    }

    async fn member_types_by_ids(&self, ids: &[MemberTypeId]) -> StorageResult<Vec<MemberType>> {
        Ok(select(&self.tables.read().member_types, ids, |m| &m.id))
    }

    async fn users(&self) -> StorageResult<Vec<User>> {
        Ok(self.tables.read().users.values().cloned().collect())
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<User>> {
        Ok(select(&self.tables.read().users, ids, |u| &u.id))
    }

    async fn posts(&self) -> StorageResult<Vec<Post>> {
        Ok(self.tables.read().posts.values().cloned().collect())
    }

    async fn posts_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Post>> {
        Ok(select(&self.tables.read().posts, ids, |p| &p.id))
    }

    async fn posts_by_author_ids(&self, author_ids: &[Uuid]) -> StorageResult<Vec<Post>> {
        let wanted: HashSet<&Uuid> = author_ids.iter().collect();
        Ok(self
            .tables
            .read()
            .posts
            .values()
            .filter(|post| wanted.contains(&post.author_id))
            .cloned()
            .collect())
    }

    async fn profiles(&self) -> StorageResult<Vec<Profile>> {
        Ok(self.tables.read().profiles.values().cloned().collect())
    }

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> StorageResult<Vec<Profile>> {
        Ok(select(&self.tables.read().profiles, ids, |p| &p.id))
    }

    async fn profiles_by_user_ids(&self, user_ids: &[Uuid]) -> StorageResult<Vec<Profile>> {
        let wanted: HashSet<&Uuid> = user_ids.iter().collect();
        Ok(self
            .tables
            .read()
            .profiles
            .values()
            .filter(|profile| wanted.contains(&profile.user_id))
            .cloned()
            .collect())
    }

    async fn profiles_by_member_type_ids(
        &self,
        member_type_ids: &[MemberTypeId],
    ) -> StorageResult<Vec<Profile>> {
        let wanted: HashSet<&MemberTypeId> = member_type_ids.iter().collect();
        Ok(self
            .tables
            .read()
            .profiles
            .values()
            .filter(|profile| wanted.contains(&profile.member_type_id))
            .cloned()
            .collect())
    }

    async fn subscriptions_by_subscriber_ids(
        &self,
        subscriber_ids: &[Uuid],
    ) -> StorageResult<Vec<Subscription>> {
        let wanted: HashSet<&Uuid> = subscriber_ids.iter().collect();
        Ok(self
            .tables
            .read()
            .subscriptions
            .iter()
            .filter(|edge| wanted.contains(&edge.subscriber_id))
            .copied()
            .collect())
    }

    async fn subscriptions_by_author_ids(
        &self,
        author_ids: &[Uuid],
    ) -> StorageResult<Vec<Subscription>> {
        let wanted: HashSet<&Uuid> = author_ids.iter().collect();
        Ok(self
            .tables
            .read()
            .subscriptions
            .iter()
            .filter(|edge| wanted.contains(&edge.author_id))
            .copied()
            .collect())
    }

    async fn create_user(&self, input: CreateUserInput) -> StorageResult<User> {
        let user = User {
            id: Uuid::new_v4(),
            name: input.name,
            balance: input.balance,
        };
        self.tables.write().users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn change_user(&self, id: Uuid, input: ChangeUserInput) -> StorageResult<User> {
        let mut tables = self.tables.write();
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| not_found("user", id))?;
        if let Some(name) = input.name {
            user.name = name;
        }
        if let Some(balance) = input.balance {
            user.balance = balance;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> StorageResult<()> {
        let mut tables = self.tables.write();
        tables
            .users
            .shift_remove(&id)
            .ok_or_else(|| not_found("user", id))?;
        tables.profiles.retain(|_, profile| profile.user_id != id);
        tables.posts.retain(|_, post| post.author_id != id);
        tables
            .subscriptions
            .retain(|edge| edge.subscriber_id != id && edge.author_id != id);
        Ok(())
    }

    async fn create_profile(&self, input: CreateProfileInput) -> StorageResult<Profile> {
        let mut tables = self.tables.write();
        tables.ensure_user(input.user_id)?;
        if !tables.member_types.contains_key(&input.member_type_id) {
            return Err(not_found("member type", input.member_type_id));
        }
        if tables
            .profiles
            .values()
            .any(|profile| profile.user_id == input.user_id)
        {
            return Err(StorageError::Conflict(format!(
                "user '{}' already has a profile",
                input.user_id
            )));
        }
        let profile = Profile {
            id: Uuid::new_v4(),
            is_male: input.is_male,
            year_of_birth: input.year_of_birth,
            user_id: input.user_id,
            member_type_id: input.member_type_id,
        };
        tables.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }

    async fn change_profile(
        &self,
        id: Uuid,
        input: ChangeProfileInput,
    ) -> StorageResult<Profile> {
        let mut tables = self.tables.write();
        if let Some(member_type_id) = input.member_type_id {
            if !tables.member_types.contains_key(&member_type_id) {
                return Err(not_found("member type", member_type_id));
            }
        }
        let profile = tables
            .profiles
            .get_mut(&id)
            .ok_or_else(|| not_found("profile", id))?;
        if let Some(member_type_id) = input.member_type_id {
            profile.member_type_id = member_type_id;
        }
        if let Some(is_male) = input.is_male {
            profile.is_male = is_male;
        }
        if let Some(year_of_birth) = input.year_of_birth {
            profile.year_of_birth = year_of_birth;
        }
        Ok(profile.clone())
    }

    async fn delete_profile(&self, id: Uuid) -> StorageResult<()> {
        self.tables
            .write()
            .profiles
            .shift_remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("profile", id))
    }

    async fn create_post(&self, input: CreatePostInput) -> StorageResult<Post> {
        let mut tables = self.tables.write();
        tables.ensure_user(input.author_id)?;
        let post = Post {
            id: Uuid::new_v4(),
            title: input.title,
            content: input.content,
            author_id: input.author_id,
        };
        tables.posts.insert(post.id, post.clone());
        Ok(post)
    }

    async fn change_post(&self, id: Uuid, input: ChangePostInput) -> StorageResult<Post> {
        let mut tables = self.tables.write();
        if let Some(author_id) = input.author_id {
            tables.ensure_user(author_id)?;
        }
        let post = tables
            .posts
            .get_mut(&id)
            .ok_or_else(|| not_found("post", id))?;
        if let Some(author_id) = input.author_id {
            post.author_id = author_id;
        }
        if let Some(title) = input.title {
            post.title = title;
        }
        if let Some(content) = input.content {
            post.content = content;
        }
        Ok(post.clone())
    }

    async fn delete_post(&self, id: Uuid) -> StorageResult<()> {
        self.tables
            .write()
            .posts
            .shift_remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("post", id))
    }

    async fn subscribe(&self, subscriber_id: Uuid, author_id: Uuid) -> StorageResult<()> {
        let mut tables = self.tables.write();
        tables.ensure_user(subscriber_id)?;
        tables.ensure_user(author_id)?;
        let edge = Subscription {
            subscriber_id,
            author_id,
        };
        if !tables.subscriptions.insert(edge) {
            return Err(StorageError::Conflict(format!(
                "user '{subscriber_id}' is already subscribed to '{author_id}'"
            )));
        }
        Ok(())
    }

    async fn unsubscribe(&self, subscriber_id: Uuid, author_id: Uuid) -> StorageResult<()> {
        let edge = Subscription {
            subscriber_id,
            author_id,
        };
        if self.tables.write().subscriptions.shift_remove(&edge) {
            Ok(())
        } else {
            Err(not_found(
                "subscription",
                format!("{subscriber_id}->{author_id}"),
            ))
        }
    }
}
