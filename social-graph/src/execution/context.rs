use std::sync::Arc;

use parking_lot::Mutex;

use super::loaders::AuthorIdsBySubscriberId;
use super::loaders::MemberTypeById;
use super::loaders::PostById;
use super::loaders::PostsByAuthorId;
use super::loaders::ProfileById;
use super::loaders::ProfileByUserId;
use super::loaders::ProfilesByMemberTypeId;
use super::loaders::SubscriberIdsByAuthorId;
use super::loaders::UserById;
use crate::graphql::Error;
use crate::loader::BatchLoader;
use crate::loader::LoaderCache;
use crate::spec::Schema;
use crate::storage::Storage;

/// Everything a resolver may touch while one request executes.
///
/// Built once per request, before the first field is resolved, and dropped with the
/// response. The loaders it hands out memoize for that lifetime only.
pub(crate) struct RequestContext {
    schema: Arc<Schema>,
    storage: Arc<dyn Storage>,
    loaders: LoaderCache,
    errors: Mutex<Vec<Error>>,
}

impl RequestContext {
    pub(crate) fn new(schema: Arc<Schema>, storage: Arc<dyn Storage>) -> Self {
        Self {
            schema,
            storage,
            loaders: LoaderCache::new(),
            errors: Default::default(),
        }
    }

    pub(crate) fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Direct storage access, for mutations and root lists.
    pub(crate) fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub(crate) fn user_by_id(&self) -> Arc<BatchLoader<UserById>> {
        self.loaders.get(|| UserById::new(self.storage.clone()))
    }

    pub(crate) fn post_by_id(&self) -> Arc<BatchLoader<PostById>> {
        self.loaders.get(|| PostById::new(self.storage.clone()))
    }

    pub(crate) fn profile_by_id(&self) -> Arc<BatchLoader<ProfileById>> {
        self.loaders.get(|| ProfileById::new(self.storage.clone()))
    }

    pub(crate) fn profile_by_user_id(&self) -> Arc<BatchLoader<ProfileByUserId>> {
        self.loaders.get(|| ProfileByUserId::new(self.storage.clone()))
    }

    pub(crate) fn posts_by_author_id(&self) -> Arc<BatchLoader<PostsByAuthorId>> {
        self.loaders.get(|| PostsByAuthorId::new(self.storage.clone()))
    }

    pub(crate) fn profiles_by_member_type_id(&self) -> Arc<BatchLoader<ProfilesByMemberTypeId>> {
        self.loaders
            .get(|| ProfilesByMemberTypeId::new(self.storage.clone()))
    }

    pub(crate) fn member_type_by_id(&self) -> Arc<BatchLoader<MemberTypeById>> {
        self.loaders.get(|| MemberTypeById::new(self.storage.clone()))
    }

    pub(crate) fn author_ids_by_subscriber_id(&self) -> Arc<BatchLoader<AuthorIdsBySubscriberId>> {
        self.loaders
            .get(|| AuthorIdsBySubscriberId::new(self.storage.clone()))
    }

    pub(crate) fn subscriber_ids_by_author_id(&self) -> Arc<BatchLoader<SubscriberIdsByAuthorId>> {
        self.loaders
            .get(|| SubscriberIdsByAuthorId::new(self.storage.clone()))
    }

    /// Records a field error. Errors come out in the order they were pushed.
    pub(crate) fn push_error(&self, error: Error) {
        self.errors.lock().push(error);
    }

    pub(crate) fn take_errors(&self) -> Vec<Error> {
        std::mem::take(&mut *self.errors.lock())
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("loaders", &self.loaders)
            .field("errors", &self.errors.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn context() -> RequestContext {
        RequestContext::new(
            Arc::new(Schema::bundled().unwrap()),
            Arc::new(MemoryStorage::builder().build()),
        )
    }

    #[test]
    fn loaders_are_shared_within_a_request() {
        let context = context();
        assert!(Arc::ptr_eq(&context.user_by_id(), &context.user_by_id()));
        context.post_by_id();
        assert_eq!(context.loaders.len(), 2);
    }

    #[test]
    fn contexts_do_not_share_loaders() {
        let first = context();
        let second = context();
        assert!(!Arc::ptr_eq(&first.user_by_id(), &second.user_by_id()));
    }

    #[test]
    fn errors_are_drained() {
        let context = context();
        context.push_error(Error::builder().message("one").build());
        context.push_error(Error::builder().message("two").build());
        let errors = context.take_errors();
        assert_eq!(
            errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>(),
            vec!["one", "two"]
        );
        assert!(context.take_errors().is_empty());
    }
}
