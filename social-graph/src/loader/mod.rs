//! Request-scoped batch loading.

mod batch;
mod cache;

pub use batch::BatchFetch;
pub use batch::BatchLoader;
pub use batch::LoadResult;
pub use cache::LoaderCache;
