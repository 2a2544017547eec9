use crate::buffer::buffer_pool_manager_instance::BufferPoolManagerInstance;
use crate::buffer::BufferPoolManager;
use crate::common::config::PageId;
use crate::recovery::log_manager::LogManager;
use crate::storage::disk::disk_manager::DiskManager;
use crate::storage::page::page::Page;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// A logical buffer pool sharded across `num_instances` independent
/// instances.
///
/// Every page-addressed operation routes to `instances[page_id %
/// num_instances]`; since each shard mints ids in its own residue class the
/// routing is stable across the page's whole lifetime. Only `new_page` is
/// unrouted: a round-robin cursor (behind its own mutex) picks the shard to
/// ask first, advancing after every attempt whether or not it succeeds.
/// Advancing on failure spreads contention; advancing on success spreads
/// growth.
///
/// Operations on distinct shards run in parallel; there is no cross-shard
/// ordering guarantee.
pub struct ParallelBufferPoolManager {
    instances: Vec<Arc<BufferPoolManagerInstance>>,
    next_instance: Mutex<usize>,
    num_instances: usize,
    pool_size: usize,
}

impl ParallelBufferPoolManager {
    /// Creates `num_instances` shards of `pool_size` frames each.
    pub fn new(
        num_instances: usize,
        pool_size: usize,
        disk_manager: Arc<dyn DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let instances = (0..num_instances)
            .map(|i| {
                Arc::new(BufferPoolManagerInstance::new_sharded(
                    pool_size,
                    num_instances as u32,
                    i as u32,
                    Arc::clone(&disk_manager),
                    log_manager.clone(),
                ))
            })
            .collect();
        Self {
            instances,
            next_instance: Mutex::new(0),
            num_instances,
            pool_size,
        }
    }

    /// The shard responsible for `page_id`.
    fn get_buffer_pool_manager(&self, page_id: PageId) -> &BufferPoolManagerInstance {
        &self.instances[page_id.rem_euclid(self.num_instances as PageId) as usize]
    }
}

impl BufferPoolManager for ParallelBufferPoolManager {
    /// Asks each shard in round-robin order for a new page; `None` only when
    /// every shard refuses.
    fn new_page(&self) -> Option<Arc<RwLock<Page>>> {
        let mut next_instance = self.next_instance.lock();
        for _ in 0..self.num_instances {
            let instance = &self.instances[*next_instance];
            let page = instance.new_page();
            *next_instance = (*next_instance + 1) % self.num_instances;
            if page.is_some() {
                return page;
            }
        }
        None
    }

    fn fetch_page(&self, page_id: PageId) -> Option<Arc<RwLock<Page>>> {
        self.get_buffer_pool_manager(page_id).fetch_page(page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.get_buffer_pool_manager(page_id)
            .unpin_page(page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> bool {
        self.get_buffer_pool_manager(page_id).flush_page(page_id)
    }

    fn flush_all_pages(&self) {
        for instance in &self.instances {
            instance.flush_all_pages();
        }
    }

    fn delete_page(&self, page_id: PageId) -> bool {
        self.get_buffer_pool_manager(page_id).delete_page(page_id)
    }

    /// The logical pool size, `num_instances * pool_size`.
    fn get_pool_size(&self) -> usize {
        self.num_instances * self.pool_size
    }
}
