//! Batch dispatcher.
//!
//! A [`BatchLoader`] coalesces the point lookups issued while one resolution pass is being
//! polled into a single call to its [`BatchFetch`] implementation.
//!
//! `load` only registers the key. The returned future yields once to the scheduler so that
//! every sibling resolver polled in the same pass gets a chance to register its own keys;
//! after that, the first waiter whose batch is still pending takes the whole queue and
//! performs the fetch on behalf of everybody else. Keys registered after the queue was taken
//! land in the next batch.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::future::Shared;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tower::BoxError;

use crate::error::LoadError;

/// Outcome of a single key lookup: `Ok(None)` is an absent key, not an error.
pub type LoadResult<V> = Result<Option<V>, LoadError>;

type SharedLoad<V> = Shared<BoxFuture<'static, LoadResult<V>>>;

/// The batch function behind a [`BatchLoader`].
#[async_trait]
pub trait BatchFetch: Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;
    type Value: Clone + Send + Sync + 'static;

    /// Name used in logs and error extensions.
    fn name(&self) -> &'static str {
        let name = std::any::type_name::<Self>();
        name.rsplit("::").next().unwrap_or(name)
    }

    /// Fetches `keys` in one go.
    ///
    /// The output must be positionally aligned with `keys`: `result[i]` is the value for
    /// `keys[i]`, `None` when the key does not exist.
    async fn fetch(&self, keys: &[Self::Key]) -> Result<Vec<Option<Self::Value>>, BoxError>;
}

struct State<F: BatchFetch> {
    /// Every key ever requested from this loader, resolved or in flight.
    memo: HashMap<F::Key, SharedLoad<F::Value>>,
    /// Keys waiting for the next dispatch, in first-request order.
    pending: Vec<(F::Key, oneshot::Sender<LoadResult<F::Value>>)>,
    /// Incremented every time the pending queue is taken.
    generation: u64,
}

impl<F: BatchFetch> Default for State<F> {
    fn default() -> Self {
        Self {
            memo: HashMap::new(),
            pending: Vec::new(),
            generation: 0,
        }
    }
}

/// Deduplicating, coalescing loader over a [`BatchFetch`].
///
/// A loader memoizes every key for its whole lifetime, so it must not outlive the request
/// it was created for. See [`crate::loader::LoaderCache`].
pub struct BatchLoader<F: BatchFetch> {
    fetcher: Arc<F>,
    state: Arc<Mutex<State<F>>>,
}

impl<F: BatchFetch> BatchLoader<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            state: Default::default(),
        }
    }

    /// Requests the value for `key`.
    ///
    /// Nothing is fetched until the returned future is polled. Requesting a key that was
    /// already requested from this loader returns the same outcome without new work.
    pub fn load(&self, key: F::Key) -> impl Future<Output = LoadResult<F::Value>> + Send + 'static {
        let (shared, generation) = self.register(key);
        let fetcher = self.fetcher.clone();
        let state = self.state.clone();

        async move {
            if let Some(ready) = shared.peek() {
                return ready.clone();
            }

            tokio::task::yield_now().await;

            let batch = {
                let mut state = state.lock();
                if state.generation == generation && !state.pending.is_empty() {
                    state.generation += 1;
                    Some(std::mem::take(&mut state.pending))
                } else {
                    None
                }
            };
            if let Some(batch) = batch {
                dispatch(fetcher.as_ref(), batch).await;
            }

            shared.await
        }
    }

    /// Requests several keys at once, results in the order of `keys`.
    pub async fn load_many(&self, keys: impl IntoIterator<Item = F::Key>) -> Vec<LoadResult<F::Value>> {
        futures::future::join_all(keys.into_iter().map(|key| self.load(key))).await
    }

    fn register(&self, key: F::Key) -> (SharedLoad<F::Value>, u64) {
        let mut state = self.state.lock();
        let generation = state.generation;
        if let Some(shared) = state.memo.get(&key) {
            return (shared.clone(), generation);
        }

        let (sender, receiver) = oneshot::channel();
        let loader = self.fetcher.name();
        let shared = async move {
            receiver
                .await
                .unwrap_or(Err(LoadError::Cancelled { loader }))
        }
        .boxed()
        .shared();

        state.memo.insert(key.clone(), shared.clone());
        state.pending.push((key, sender));
        (shared, generation)
    }
}

impl<F: BatchFetch> fmt::Debug for BatchLoader<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BatchLoader")
            .field("name", &self.fetcher.name())
            .field("memoized", &state.memo.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

async fn dispatch<F: BatchFetch>(
    fetcher: &F,
    batch: Vec<(F::Key, oneshot::Sender<LoadResult<F::Value>>)>,
) {
    let loader = fetcher.name();
    let (keys, senders): (Vec<_>, Vec<_>) = batch.into_iter().unzip();
    tracing::debug!(loader, keys = keys.len(), "dispatching batch");

    let error = match fetcher.fetch(&keys).await {
        Ok(values) if values.len() == keys.len() => {
            for (sender, value) in senders.into_iter().zip(values) {
                // the receiving side may already be gone with its request
                let _ = sender.send(Ok(value));
            }
            return;
        }
        Ok(values) => LoadError::LengthMismatch {
            loader,
            expected: keys.len(),
            actual: values.len(),
        },
        Err(err) => LoadError::FetchFailed {
            loader,
            reason: err.to_string(),
        },
    };

    tracing::error!(loader, keys = keys.len(), %error, "batch fetch failed");
    for sender in senders {
        let _ = sender.send(Err(error.clone()));
    }
}
