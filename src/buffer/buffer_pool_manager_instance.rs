use crate::buffer::lru_replacer::LRUReplacer;
use crate::buffer::BufferPoolManager;
use crate::common::config::{FrameId, PageId, INVALID_PAGE_ID};
use crate::recovery::log_manager::LogManager;
use crate::storage::disk::disk_manager::DiskManager;
use crate::storage::page::page::Page;
use log::trace;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Bookkeeping guarded by the instance latch: which page sits in which
/// frame, which frames are free, and the id allocation cursor.
struct PoolCore {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    next_page_id: PageId,
}

/// One buffer pool instance: a fixed array of frames fronting the disk
/// manager.
///
/// Every resident page is either pinned by clients or evictable through the
/// [`LRUReplacer`], never both and never neither, and
/// `page_table.len() + free_list.len() == pool_size` at every quiescent
/// point. A single coarse latch serializes all public operations; the
/// replacer's own mutex is only ever taken while the latch is held, so the
/// lock order is fixed and deadlock-free. Disk I/O happens under the latch
/// on purpose: correctness first, and the parallel pool recovers
/// concurrency across shards.
///
/// When the instance is one shard of a parallel pool it mints page ids in
/// its own residue class: every id allocated here satisfies
/// `id % num_instances == instance_index`.
pub struct BufferPoolManagerInstance {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    pages: Vec<Arc<RwLock<Page>>>,
    core: Mutex<PoolCore>,
    replacer: LRUReplacer,
    disk_manager: Arc<dyn DiskManager>,
    log_manager: Option<Arc<LogManager>>,
}

impl BufferPoolManagerInstance {
    /// Constructs a stand-alone instance (a parallel pool of one).
    pub fn new(
        pool_size: usize,
        disk_manager: Arc<dyn DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        Self::new_sharded(pool_size, 1, 0, disk_manager, log_manager)
    }

    /// Constructs one shard of a parallel pool.
    pub fn new_sharded(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<dyn DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        assert!(num_instances > 0, "a pool must have at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index must fall inside the pool"
        );
        let pages = (0..pool_size)
            .map(|_| Arc::new(RwLock::new(Page::new())))
            .collect();
        let free_list: VecDeque<FrameId> = (0..pool_size as FrameId).collect();
        Self {
            pool_size,
            num_instances,
            instance_index,
            pages,
            core: Mutex::new(PoolCore {
                page_table: HashMap::new(),
                free_list,
                next_page_id: instance_index as PageId,
            }),
            replacer: LRUReplacer::new(pool_size),
            disk_manager,
            log_manager,
        }
    }

    pub fn get_pool_size(&self) -> usize {
        self.pool_size
    }

    /// Mints the next page id of this instance's residue class.
    fn allocate_page(&self, core: &mut PoolCore) -> PageId {
        let next_page_id = core.next_page_id;
        core.next_page_id += self.num_instances as PageId;
        self.validate_page_id(next_page_id);
        next_page_id
    }

    fn validate_page_id(&self, page_id: PageId) {
        // Allocated pages mod back to this instance.
        assert!(page_id as u32 % self.num_instances == self.instance_index);
    }

    /// Draws a frame for incoming content: the front of the free list if any,
    /// otherwise an LRU victim. A dirty victim is written back (behind a log
    /// flush when logging is attached) and its page evicted from the table.
    fn find_victim_frame(&self, core: &mut PoolCore) -> Option<FrameId> {
        if let Some(frame_id) = core.free_list.pop_front() {
            return Some(frame_id);
        }
        let frame_id = self.replacer.victim()?;
        let mut page = self.pages[frame_id as usize].write();
        if page.is_dirty() {
            if let Some(log_manager) = &self.log_manager {
                // Write-ahead: the log reaches disk before the page does.
                log_manager.flush();
            }
            self.disk_manager.write_page(page.get_page_id(), page.get_data());
        }
        core.page_table.remove(&page.get_page_id());
        trace!(
            "evicted page {} from frame {}",
            page.get_page_id(),
            frame_id
        );
        Some(frame_id)
    }

    /// Creates a pinned, zeroed page in the pool. Returns `None` when every
    /// frame is pinned.
    pub fn new_page(&self) -> Option<Arc<RwLock<Page>>> {
        let mut core = self.core.lock();
        let frame_id = self.find_victim_frame(&mut core)?;
        let new_page_id = self.allocate_page(&mut core);
        {
            let mut page = self.pages[frame_id as usize].write();
            page.set_page_id(new_page_id);
            page.set_pin_count(1);
            page.set_dirty(false);
            page.reset_memory();
        }
        core.page_table.insert(new_page_id, frame_id);
        self.replacer.pin(frame_id);
        Some(Arc::clone(&self.pages[frame_id as usize]))
    }

    /// Returns the requested page pinned, loading it from disk on a miss.
    /// Returns `None` when the page is absent and every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Option<Arc<RwLock<Page>>> {
        let mut core = self.core.lock();
        if let Some(&frame_id) = core.page_table.get(&page_id) {
            self.pages[frame_id as usize].write().increment_pin_count();
            self.replacer.pin(frame_id);
            return Some(Arc::clone(&self.pages[frame_id as usize]));
        }

        let frame_id = self.find_victim_frame(&mut core)?;
        {
            let mut page = self.pages[frame_id as usize].write();
            page.set_page_id(page_id);
            page.set_pin_count(1);
            page.set_dirty(false);
            self.disk_manager.read_page(page_id, page.get_data_mut());
        }
        core.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        Some(Arc::clone(&self.pages[frame_id as usize]))
    }

    /// Releases one pin. The dirty hint is ORed in; an unpin can never
    /// launder an already-dirty page clean. Returns `false` on a miss or if
    /// the page was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let core = self.core.lock();
        let Some(&frame_id) = core.page_table.get(&page_id) else {
            return false;
        };
        let mut page = self.pages[frame_id as usize].write();
        if page.get_pin_count() <= 0 {
            return false;
        }
        page.decrement_pin_count();
        if is_dirty {
            page.set_dirty(true);
        }
        if page.get_pin_count() == 0 {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Writes the page image to disk and clears its dirty flag. Pin state is
    /// untouched. Returns `false` for [`INVALID_PAGE_ID`] or a miss.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let core = self.core.lock();
        if page_id == INVALID_PAGE_ID {
            return false;
        }
        let Some(&frame_id) = core.page_table.get(&page_id) else {
            return false;
        };
        let mut page = self.pages[frame_id as usize].write();
        self.disk_manager.write_page(page_id, page.get_data());
        page.set_dirty(false);
        true
    }

    /// Writes every resident page to disk. Dirty flags are left as they are.
    pub fn flush_all_pages(&self) {
        let core = self.core.lock();
        for (&page_id, &frame_id) in core.page_table.iter() {
            let page = self.pages[frame_id as usize].read();
            self.disk_manager.write_page(page_id, page.get_data());
        }
    }

    /// Deallocates a page and, if it is resident and unpinned, returns its
    /// frame to the free list. Returns `false` only when the page is pinned.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut core = self.core.lock();
        self.disk_manager.deallocate_page(page_id);
        let Some(&frame_id) = core.page_table.get(&page_id) else {
            return true;
        };
        let mut page = self.pages[frame_id as usize].write();
        if page.get_pin_count() > 0 {
            return false;
        }
        if page.is_dirty() {
            // The id was just deallocated, but reclamation is deferred: the
            // image may still be read before the id is reused.
            self.disk_manager.write_page(page.get_page_id(), page.get_data());
        }
        self.replacer.pin(frame_id);
        core.page_table.remove(&page_id);
        page.set_dirty(false);
        page.set_pin_count(0);
        page.set_page_id(INVALID_PAGE_ID);
        page.reset_memory();
        core.free_list.push_back(frame_id);
        true
    }
}

impl BufferPoolManager for BufferPoolManagerInstance {
    fn new_page(&self) -> Option<Arc<RwLock<Page>>> {
        BufferPoolManagerInstance::new_page(self)
    }

    fn fetch_page(&self, page_id: PageId) -> Option<Arc<RwLock<Page>>> {
        BufferPoolManagerInstance::fetch_page(self, page_id)
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        BufferPoolManagerInstance::unpin_page(self, page_id, is_dirty)
    }

    fn flush_page(&self, page_id: PageId) -> bool {
        BufferPoolManagerInstance::flush_page(self, page_id)
    }

    fn flush_all_pages(&self) {
        BufferPoolManagerInstance::flush_all_pages(self)
    }

    fn delete_page(&self, page_id: PageId) -> bool {
        BufferPoolManagerInstance::delete_page(self, page_id)
    }

    fn get_pool_size(&self) -> usize {
        BufferPoolManagerInstance::get_pool_size(self)
    }
}
