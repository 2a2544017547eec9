use crate::common::config::{Lsn, PageId, DB_PAGE_SIZE};
use crate::storage::page::hash_table_page_defs::{DIRECTORY_ARRAY_SIZE, MAX_BUCKET_DEPTH};
use log::{debug, warn};
use std::collections::HashMap;

/**
 * Directory page for the extendible hash table.
 *
 * Directory format (size in byte):
 * ---------------------------------------------------------------------------------------------
 * | PageId (4) | LSN (4) | GlobalDepth (4) | LocalDepths (512) | BucketPageIds (2048) | Free...
 * ---------------------------------------------------------------------------------------------
 *
 * The struct is the page image: a directory page is never copied out of its
 * frame, it is reinterpreted in place via [`Self::view`] / [`Self::view_mut`].
 */
#[repr(C)]
pub struct HashTableDirectoryPage {
    page_id: PageId,
    lsn: Lsn,
    global_depth: u32,
    local_depths: [u8; DIRECTORY_ARRAY_SIZE],
    bucket_page_ids: [PageId; DIRECTORY_ARRAY_SIZE],
}

const _: () = assert!(std::mem::size_of::<HashTableDirectoryPage>() <= DB_PAGE_SIZE);
const _: () = assert!(1 << MAX_BUCKET_DEPTH == DIRECTORY_ARRAY_SIZE);

impl HashTableDirectoryPage {
    /// Reinterprets a frame's bytes as a directory page.
    ///
    /// The buffer must come from a pool frame (frames are 8-byte aligned); a
    /// zeroed page is a valid empty directory at global depth 0.
    pub fn view(data: &[u8; DB_PAGE_SIZE]) -> &Self {
        debug_assert_eq!(data.as_ptr() as usize % std::mem::align_of::<Self>(), 0);
        unsafe { &*(data.as_ptr() as *const Self) }
    }

    pub fn view_mut(data: &mut [u8; DB_PAGE_SIZE]) -> &mut Self {
        debug_assert_eq!(data.as_ptr() as usize % std::mem::align_of::<Self>(), 0);
        unsafe { &mut *(data.as_mut_ptr() as *mut Self) }
    }

    pub fn get_page_id(&self) -> PageId {
        self.page_id
    }

    pub fn set_page_id(&mut self, page_id: PageId) {
        self.page_id = page_id;
    }

    pub fn get_lsn(&self) -> Lsn {
        self.lsn
    }

    pub fn set_lsn(&mut self, lsn: Lsn) {
        self.lsn = lsn;
    }

    pub fn get_global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Returns a mask of `global_depth` ones from the LSB upwards.
    ///
    /// The directory slot for a key is `hash(key) & global_depth_mask`; at
    /// global depth 3 the 32-bit mask is `0x0000_0007`.
    pub fn get_global_depth_mask(&self) -> u32 {
        (1 << self.global_depth) - 1
    }

    /// Same as the global depth mask, but built from the local depth of the
    /// bucket at `bucket_idx`.
    pub fn get_local_depth_mask(&self, bucket_idx: u32) -> u32 {
        (1 << self.get_local_depth(bucket_idx)) - 1
    }

    /// The number of addressable directory slots, `2^global_depth`.
    pub fn size(&self) -> u32 {
        1 << self.global_depth
    }

    /// Doubles the directory: the first `size()` entries of both arrays are
    /// duplicated into the newly exposed upper half, then the depth is bumped.
    /// The bucket population is unchanged.
    pub fn incr_global_depth(&mut self) {
        assert!(self.global_depth < MAX_BUCKET_DEPTH);
        let org_num = self.size() as usize;
        for org_index in 0..org_num {
            self.bucket_page_ids[org_num + org_index] = self.bucket_page_ids[org_index];
            self.local_depths[org_num + org_index] = self.local_depths[org_index];
        }
        self.global_depth += 1;
    }

    /// Halves the directory. The upper half's contents are simply hidden by
    /// the smaller mask and need no cleanup.
    pub fn decr_global_depth(&mut self) {
        assert!(self.global_depth > 0);
        self.global_depth -= 1;
    }

    /// The directory can shrink iff every addressable slot has a local depth
    /// strictly below the global depth.
    pub fn can_shrink(&self) -> bool {
        for i in 0..self.size() {
            if u32::from(self.local_depths[i as usize]) >= self.global_depth {
                return false;
            }
        }
        true
    }

    pub fn get_bucket_page_id(&self, bucket_idx: u32) -> PageId {
        self.bucket_page_ids[bucket_idx as usize]
    }

    pub fn set_bucket_page_id(&mut self, bucket_idx: u32, bucket_page_id: PageId) {
        self.bucket_page_ids[bucket_idx as usize] = bucket_page_id;
    }

    pub fn get_local_depth(&self, bucket_idx: u32) -> u32 {
        u32::from(self.local_depths[bucket_idx as usize])
    }

    pub fn set_local_depth(&mut self, bucket_idx: u32, local_depth: u8) {
        assert!(u32::from(local_depth) <= self.global_depth);
        self.local_depths[bucket_idx as usize] = local_depth;
    }

    pub fn incr_local_depth(&mut self, bucket_idx: u32) {
        assert!(self.get_local_depth(bucket_idx) < self.global_depth);
        self.local_depths[bucket_idx as usize] += 1;
    }

    pub fn decr_local_depth(&mut self, bucket_idx: u32) {
        assert!(self.local_depths[bucket_idx as usize] > 0);
        self.local_depths[bucket_idx as usize] -= 1;
    }

    /// The sibling directory slot that shares `bucket_idx`'s bucket before a
    /// split and receives the new bucket after one: the slot whose index
    /// differs only in the bucket's highest local-depth bit.
    ///
    /// At local depth 3 and `bucket_idx = 0b00100`, the split image is
    /// `0b00100 ^ 0b00100 = 0b00000`.
    pub fn get_split_image_index(&self, bucket_idx: u32) -> u32 {
        let local_depth = self.get_local_depth(bucket_idx);
        assert!(local_depth > 0);
        bucket_idx ^ (1 << (local_depth - 1))
    }

    /// Checks the directory invariants:
    /// (1) every local depth is <= the global depth,
    /// (2) each bucket has exactly 2^(global_depth - local_depth) slots
    ///     pointing to it,
    /// (3) all slots pointing to the same bucket record the same local depth.
    ///
    /// Violations are assertion failures, not recoverable errors.
    pub fn verify_integrity(&self) {
        let mut page_id_to_count: HashMap<PageId, u32> = HashMap::new();
        let mut page_id_to_ld: HashMap<PageId, u32> = HashMap::new();

        for curr_idx in 0..self.size() {
            let curr_page_id = self.get_bucket_page_id(curr_idx);
            let curr_ld = self.get_local_depth(curr_idx);
            assert!(curr_ld <= self.global_depth);

            *page_id_to_count.entry(curr_page_id).or_insert(0) += 1;

            match page_id_to_ld.get(&curr_page_id) {
                Some(&old_ld) if old_ld != curr_ld => {
                    warn!(
                        "verify_integrity: local depth {} != {} for page_id {}",
                        curr_ld, old_ld, curr_page_id
                    );
                    self.print_directory();
                    panic!("local depth mismatch for bucket page {}", curr_page_id);
                }
                Some(_) => {}
                None => {
                    page_id_to_ld.insert(curr_page_id, curr_ld);
                }
            }
        }

        for (curr_page_id, curr_count) in &page_id_to_count {
            let curr_ld = page_id_to_ld[curr_page_id];
            let required_count = 0x1 << (self.global_depth - curr_ld);
            if *curr_count != required_count {
                warn!(
                    "verify_integrity: count {} != required {} for page_id {}",
                    curr_count, required_count, curr_page_id
                );
                self.print_directory();
                panic!("pointer count mismatch for bucket page {}", curr_page_id);
            }
        }
    }

    pub fn print_directory(&self) {
        debug!("======== DIRECTORY (global_depth: {}) ========", self.global_depth);
        debug!("| bucket_idx | page_id | local_depth |");
        for idx in 0..self.size() {
            debug!(
                "|      {}     |     {}     |     {}     |",
                idx,
                self.get_bucket_page_id(idx),
                self.get_local_depth(idx)
            );
        }
        debug!("================ END DIRECTORY ================");
    }
}
