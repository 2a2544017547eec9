use crate::buffer::BufferPoolManager;
use crate::common::config::{PageId, INVALID_LSN};
use crate::container::hash_function::HashFunction;
use crate::storage::page::hash_table_bucket_page::HashTableBucketPage;
use crate::storage::page::hash_table_directory_page::HashTableDirectoryPage;
use crate::storage::page::hash_table_page_defs::MAX_BUCKET_DEPTH;
use log::{debug, info};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

/// Disk-backed extendible hash table. Supports non-unique keys, insert and
/// remove; buckets split and merge as they fill and drain, and the directory
/// doubles and shrinks with them.
///
/// Directory and bucket pages are referenced by page id only and resolved
/// through the buffer pool on every operation, never by a held pointer. A
/// table-level latch serializes structural changes; finer-grained concurrent
/// index operations are out of scope.
pub struct DiskExtendibleHashTable<K, V, C> {
    index_name: String,
    bpm: Arc<dyn BufferPoolManager>,
    comparator: C,
    hash_fn: HashFunction<K>,
    directory_page_id: PageId,
    table_latch: RwLock<()>,
    _marker: PhantomData<V>,
}

enum InsertOutcome {
    Done(bool),
    SplitRetry,
}

impl<K, V, C> DiskExtendibleHashTable<K, V, C>
where
    K: Copy + Hash,
    V: Copy + PartialEq,
    C: Fn(&K, &K) -> Ordering,
{
    /// Creates the table: a directory page at global depth 0 whose only slot
    /// points at one empty bucket.
    pub fn new(
        index_name: String,
        bpm: Arc<dyn BufferPoolManager>,
        comparator: C,
        hash_fn: HashFunction<K>,
    ) -> Self {
        let directory_page = bpm
            .new_page()
            .expect("buffer pool exhausted while creating hash table directory");
        let directory_page_id = {
            let mut guard = directory_page.write();
            let page_id = guard.get_page_id();
            let directory = HashTableDirectoryPage::view_mut(guard.get_data_mut());
            directory.set_page_id(page_id);
            directory.set_lsn(INVALID_LSN);
            page_id
        };

        let bucket_page = bpm
            .new_page()
            .expect("buffer pool exhausted while creating initial hash bucket");
        let bucket_page_id = bucket_page.read().get_page_id();
        {
            let mut guard = directory_page.write();
            let directory = HashTableDirectoryPage::view_mut(guard.get_data_mut());
            directory.set_bucket_page_id(0, bucket_page_id);
            directory.set_local_depth(0, 0);
        }

        bpm.unpin_page(bucket_page_id, true);
        bpm.unpin_page(directory_page_id, true);
        info!(
            "created extendible hash table '{}' (directory page {}, first bucket {})",
            index_name, directory_page_id, bucket_page_id
        );

        Self {
            index_name,
            bpm,
            comparator,
            hash_fn,
            directory_page_id,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        }
    }

    pub fn get_index_name(&self) -> &str {
        &self.index_name
    }

    fn hash(&self, key: &K) -> u32 {
        self.hash_fn.get_hash(key) as u32
    }

    /// Collects every value stored under `key`.
    pub fn get_value(&self, key: &K) -> Vec<V> {
        let _guard = self.table_latch.read();
        let mut result = Vec::new();

        let directory_page = self
            .bpm
            .fetch_page(self.directory_page_id)
            .expect("hash table directory page unavailable");
        let bucket_page_id = {
            let guard = directory_page.read();
            let directory = HashTableDirectoryPage::view(guard.get_data());
            let bucket_idx = self.hash(key) & directory.get_global_depth_mask();
            directory.get_bucket_page_id(bucket_idx)
        };

        let bucket_page = self
            .bpm
            .fetch_page(bucket_page_id)
            .expect("hash bucket page unavailable");
        {
            let mut guard = bucket_page.write();
            let bucket = HashTableBucketPage::<K, V>::new(guard.get_data_mut());
            bucket.get_value(key, &self.comparator, &mut result);
        }

        self.bpm.unpin_page(bucket_page_id, false);
        self.bpm.unpin_page(self.directory_page_id, false);
        result
    }

    /// Inserts a (key, value) pair, splitting the target bucket (and growing
    /// the directory) as often as needed. Returns `false` for an exact
    /// duplicate pair, or when the table cannot grow any further.
    pub fn insert(&self, key: K, value: V) -> bool {
        let _guard = self.table_latch.write();
        loop {
            match self.try_insert(key, value) {
                InsertOutcome::Done(inserted) => return inserted,
                InsertOutcome::SplitRetry => continue,
            }
        }
    }

    fn try_insert(&self, key: K, value: V) -> InsertOutcome {
        let directory_page = self
            .bpm
            .fetch_page(self.directory_page_id)
            .expect("hash table directory page unavailable");
        let mut dir_guard = directory_page.write();
        let directory = HashTableDirectoryPage::view_mut(dir_guard.get_data_mut());

        let bucket_idx = self.hash(&key) & directory.get_global_depth_mask();
        let bucket_page_id = directory.get_bucket_page_id(bucket_idx);
        let bucket_page = self
            .bpm
            .fetch_page(bucket_page_id)
            .expect("hash bucket page unavailable");
        let mut bucket_guard = bucket_page.write();
        let mut bucket = HashTableBucketPage::<K, V>::new(bucket_guard.get_data_mut());

        if !bucket.is_full() {
            let inserted = bucket.insert(key, value, &self.comparator);
            drop(bucket_guard);
            drop(dir_guard);
            self.bpm.unpin_page(bucket_page_id, inserted);
            self.bpm.unpin_page(self.directory_page_id, false);
            return InsertOutcome::Done(inserted);
        }

        // A full bucket still rejects an exact duplicate without splitting.
        let mut existing = Vec::new();
        bucket.get_value(&key, &self.comparator, &mut existing);
        if existing.contains(&value) {
            drop(bucket_guard);
            drop(dir_guard);
            self.bpm.unpin_page(bucket_page_id, false);
            self.bpm.unpin_page(self.directory_page_id, false);
            return InsertOutcome::Done(false);
        }

        // Split. The directory doubles first when the bucket already uses
        // every directory bit.
        if directory.get_local_depth(bucket_idx) == directory.get_global_depth() {
            if directory.get_global_depth() >= MAX_BUCKET_DEPTH {
                drop(bucket_guard);
                drop(dir_guard);
                self.bpm.unpin_page(bucket_page_id, false);
                self.bpm.unpin_page(self.directory_page_id, false);
                debug!(
                    "insert into '{}' failed: bucket full at maximum depth",
                    self.index_name
                );
                return InsertOutcome::Done(false);
            }
            directory.incr_global_depth();
        }

        let Some(new_bucket_page) = self.bpm.new_page() else {
            drop(bucket_guard);
            drop(dir_guard);
            self.bpm.unpin_page(bucket_page_id, false);
            // The grown directory is left as is; its invariants still hold.
            self.bpm.unpin_page(self.directory_page_id, true);
            return InsertOutcome::Done(false);
        };
        let mut new_bucket_guard = new_bucket_page.write();
        let new_bucket_page_id = new_bucket_guard.get_page_id();
        let mut new_bucket = HashTableBucketPage::<K, V>::new(new_bucket_guard.get_data_mut());

        // Slots whose index differs from bucket_idx in the (old) high bit
        // follow the split image to the new page; every sibling slot gains a
        // depth bit.
        let high_bit = 1u32 << directory.get_local_depth(bucket_idx);
        for i in 0..directory.size() {
            if directory.get_bucket_page_id(i) == bucket_page_id {
                directory.incr_local_depth(i);
                if (i & high_bit) != (bucket_idx & high_bit) {
                    directory.set_bucket_page_id(i, new_bucket_page_id);
                }
            }
        }

        // Redistribute the full bucket by the new depth bit.
        let global_mask = directory.get_global_depth_mask();
        for slot in 0..HashTableBucketPage::<K, V>::ARRAY_SIZE as u32 {
            if !bucket.is_readable(slot) {
                continue;
            }
            let slot_key = bucket.key_at(slot);
            let slot_value = bucket.value_at(slot);
            let target_idx = self.hash(&slot_key) & global_mask;
            if directory.get_bucket_page_id(target_idx) == new_bucket_page_id {
                bucket.remove_at(slot);
                new_bucket.insert(slot_key, slot_value, &self.comparator);
            }
        }

        debug!(
            "split bucket page {} of '{}' into page {} (global depth {})",
            bucket_page_id,
            self.index_name,
            new_bucket_page_id,
            directory.get_global_depth()
        );

        drop(new_bucket_guard);
        drop(bucket_guard);
        drop(dir_guard);
        self.bpm.unpin_page(new_bucket_page_id, true);
        self.bpm.unpin_page(bucket_page_id, true);
        self.bpm.unpin_page(self.directory_page_id, true);
        InsertOutcome::SplitRetry
    }

    /// Removes an exact (key, value) pair. A bucket left empty merges into
    /// its split image when their depths match, cascading upward, and the
    /// directory shrinks whenever it can.
    pub fn remove(&self, key: &K, value: &V) -> bool {
        let _guard = self.table_latch.write();

        let directory_page = self
            .bpm
            .fetch_page(self.directory_page_id)
            .expect("hash table directory page unavailable");
        let mut dir_guard = directory_page.write();
        let directory = HashTableDirectoryPage::view_mut(dir_guard.get_data_mut());

        let bucket_idx = self.hash(key) & directory.get_global_depth_mask();
        let bucket_page_id = directory.get_bucket_page_id(bucket_idx);
        let bucket_page = self
            .bpm
            .fetch_page(bucket_page_id)
            .expect("hash bucket page unavailable");
        let (removed, now_empty) = {
            let mut bucket_guard = bucket_page.write();
            let mut bucket = HashTableBucketPage::<K, V>::new(bucket_guard.get_data_mut());
            let removed = bucket.remove(key, value, &self.comparator);
            (removed, bucket.is_empty())
        };
        self.bpm.unpin_page(bucket_page_id, removed);

        let mut directory_dirty = false;
        if removed && now_empty {
            directory_dirty = self.merge(directory, key);
        }

        drop(dir_guard);
        self.bpm.unpin_page(self.directory_page_id, directory_dirty);
        removed
    }

    /// Folds the (empty) bucket for `key` into its split image, repeating
    /// while the merged bucket is itself empty and mergeable. Returns whether
    /// the directory changed.
    fn merge(&self, directory: &mut HashTableDirectoryPage, key: &K) -> bool {
        let mut merged_any = false;
        loop {
            let bucket_idx = self.hash(key) & directory.get_global_depth_mask();
            if directory.get_local_depth(bucket_idx) == 0 {
                break;
            }
            let bucket_page_id = directory.get_bucket_page_id(bucket_idx);
            let split_image_idx = directory.get_split_image_index(bucket_idx);
            // Only same-depth siblings share a full depth bit and may merge.
            if directory.get_local_depth(split_image_idx) != directory.get_local_depth(bucket_idx) {
                break;
            }
            let image_page_id = directory.get_bucket_page_id(split_image_idx);
            if image_page_id == bucket_page_id {
                break;
            }

            let bucket_page = self
                .bpm
                .fetch_page(bucket_page_id)
                .expect("hash bucket page unavailable");
            let empty = {
                let mut guard = bucket_page.write();
                HashTableBucketPage::<K, V>::new(guard.get_data_mut()).is_empty()
            };
            self.bpm.unpin_page(bucket_page_id, false);
            if !empty {
                break;
            }

            for i in 0..directory.size() {
                if directory.get_bucket_page_id(i) == bucket_page_id {
                    directory.set_bucket_page_id(i, image_page_id);
                }
            }
            for i in 0..directory.size() {
                if directory.get_bucket_page_id(i) == image_page_id {
                    directory.decr_local_depth(i);
                }
            }
            self.bpm.delete_page(bucket_page_id);
            merged_any = true;

            while directory.can_shrink() {
                directory.decr_global_depth();
            }
            debug!(
                "merged bucket page {} of '{}' into page {} (global depth {})",
                bucket_page_id,
                self.index_name,
                image_page_id,
                directory.get_global_depth()
            );
        }
        merged_any
    }

    /// The directory's current global depth.
    pub fn get_global_depth(&self) -> u32 {
        let _guard = self.table_latch.read();
        let directory_page = self
            .bpm
            .fetch_page(self.directory_page_id)
            .expect("hash table directory page unavailable");
        let depth = {
            let guard = directory_page.read();
            HashTableDirectoryPage::view(guard.get_data()).get_global_depth()
        };
        self.bpm.unpin_page(self.directory_page_id, false);
        depth
    }

    /// Asserts the directory invariants; for tests and debugging.
    pub fn verify_integrity(&self) {
        let _guard = self.table_latch.read();
        let directory_page = self
            .bpm
            .fetch_page(self.directory_page_id)
            .expect("hash table directory page unavailable");
        {
            let guard = directory_page.read();
            HashTableDirectoryPage::view(guard.get_data()).verify_integrity();
        }
        self.bpm.unpin_page(self.directory_page_id, false);
    }
}
