use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::BatchFetch;
use super::BatchLoader;

/// The loaders of one request, one per batch function type.
///
/// Loaders are built on first use and live as long as the cache. There is no eviction and
/// no invalidation: a cache is created for every request and dropped with it.
#[derive(Default)]
pub struct LoaderCache {
    loaders: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl LoaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the loader for `F`, building it with `init` if this cache has none yet.
    pub fn get<F: BatchFetch>(&self, init: impl FnOnce() -> F) -> Arc<BatchLoader<F>> {
        let mut loaders = self.loaders.lock();
        let type_id = TypeId::of::<F>();
        if let Some(loader) = loaders
            .get(&type_id)
            .and_then(|loader| loader.downcast_ref::<Arc<BatchLoader<F>>>())
        {
            return loader.clone();
        }

        tracing::trace!(loader = std::any::type_name::<F>(), "creating loader");
        let loader = Arc::new(BatchLoader::new(init()));
        loaders.insert(type_id, Box::new(loader.clone()));
        loader
    }

    pub fn len(&self) -> usize {
        self.loaders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for LoaderCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderCache")
            .field("loaders", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;
    use test_log::test;
    use tower::BoxError;

    use super::*;

    #[derive(Default)]
    struct Counted {
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BatchFetch for Counted {
        type Key = &'static str;
        type Value = usize;

        async fn fetch(&self, keys: &[&'static str]) -> Result<Vec<Option<usize>>, BoxError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(keys.iter().map(|_| Some(n)).collect())
        }
    }

    struct Lengths;

    #[async_trait]
    impl BatchFetch for Lengths {
        type Key = &'static str;
        type Value = usize;

        async fn fetch(&self, keys: &[&'static str]) -> Result<Vec<Option<usize>>, BoxError> {
            Ok(keys.iter().map(|k| Some(k.len())).collect())
        }
    }

    #[test]
    fn loader_is_built_once_per_type() {
        let cache = LoaderCache::new();
        let mut built = 0;
        let first = cache.get(|| {
            built += 1;
            Counted::default()
        });
        let second = cache.get(|| {
            built += 1;
            Counted::default()
        });

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(built, 1);
        assert_eq!(cache.len(), 1);

        cache.get(|| Lengths);
        assert_eq!(cache.len(), 2);
    }

    #[test(tokio::test)]
    async fn requests_do_not_share_memoized_results() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let first_request = LoaderCache::new();
        let second_request = LoaderCache::new();

        let init = || Counted {
            fetches: fetches.clone(),
        };
        let a = first_request.get(init).load("ann");
        let b = second_request.get(init).load("ann");
        let (a, b) = futures::join!(a, b);

        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert_ne!(a, b);
        assert!(!Arc::ptr_eq(
            &first_request.get(init),
            &second_request.get(init)
        ));
    }
}
