pub mod buffer_pool_manager_instance;
pub mod lru_replacer;
pub mod parallel_buffer_pool_manager;

use crate::common::config::PageId;
use crate::storage::page::page::Page;
use parking_lot::RwLock;
use std::sync::Arc;

/// The buffer pool contract consumed by everything above the storage layer
/// (index, catalog, executors). Implemented by a single
/// [`buffer_pool_manager_instance::BufferPoolManagerInstance`] and by the
/// sharded [`parallel_buffer_pool_manager::ParallelBufferPoolManager`].
///
/// Failures are unexceptional: `new_page`/`fetch_page` return `None` when no
/// frame can be freed, the `bool` operations report not-found / in-use.
///
/// Pool operations may take a resident page's lock internally, so a caller
/// must release any page guard it holds before calling back into the pool
/// for that same page (holding guards on *other*, pinned pages is fine).
pub trait BufferPoolManager: Send + Sync {
    /// Creates a pinned, zeroed page and returns it; the page carries its
    /// freshly allocated id.
    fn new_page(&self) -> Option<Arc<RwLock<Page>>>;

    /// Returns the page pinned, reading it from disk if not resident.
    fn fetch_page(&self, page_id: PageId) -> Option<Arc<RwLock<Page>>>;

    /// Drops one pin, ORing `is_dirty` into the page's dirty flag.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool;

    /// Forces the page image to disk.
    fn flush_page(&self, page_id: PageId) -> bool;

    /// Forces every resident page to disk.
    fn flush_all_pages(&self);

    /// Deallocates the page and frees its frame; `false` if it is pinned.
    fn delete_page(&self, page_id: PageId) -> bool;

    /// The number of frames this pool manages.
    fn get_pool_size(&self) -> usize;
}
