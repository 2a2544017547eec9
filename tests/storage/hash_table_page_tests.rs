use hematite::buffer::buffer_pool_manager_instance::BufferPoolManagerInstance;
use hematite::common::config::{DB_PAGE_SIZE, PageId};
use hematite::storage::disk::disk_manager::MemoryDiskManager;
use hematite::storage::page::hash_table_bucket_page::HashTableBucketPage;
use hematite::storage::page::hash_table_directory_page::HashTableDirectoryPage;
use hematite::storage::page::hash_table_page_defs::{
    bucket_array_size, DIRECTORY_ARRAY_SIZE, MAX_BUCKET_DEPTH,
};
use std::cmp::Ordering;
use std::sync::Arc;

fn int_cmp(a: &i32, b: &i32) -> Ordering {
    a.cmp(b)
}

fn test_bpm(pool_size: usize) -> BufferPoolManagerInstance {
    BufferPoolManagerInstance::new(pool_size, Arc::new(MemoryDiskManager::new()), None)
}

type IntBucketPage<'a> = HashTableBucketPage<'a, i32, i32>;

#[test]
fn bucket_capacity_is_maximal_for_the_page() {
    // The capacity formula must give the largest n such that n slots plus
    // two ceil(n/8)-byte bitmaps still fit in one page.
    let n = bucket_array_size::<i32, i32>();
    let pair = std::mem::size_of::<(i32, i32)>();
    assert!(2 * n.div_ceil(8) + n * pair <= DB_PAGE_SIZE);
    let m = n + 1;
    assert!(2 * m.div_ceil(8) + m * pair > DB_PAGE_SIZE);
}

#[test]
fn directory_page_image_matches_the_layout() {
    assert_eq!(1 << MAX_BUCKET_DEPTH, DIRECTORY_ARRAY_SIZE);
    // PageId(4) | LSN(4) | GlobalDepth(4) | LocalDepths[512] | BucketPageIds[512 * 4]
    assert_eq!(
        std::mem::size_of::<HashTableDirectoryPage>(),
        4 + 4 + 4 + DIRECTORY_ARRAY_SIZE + DIRECTORY_ARRAY_SIZE * 4
    );
    assert!(std::mem::size_of::<HashTableDirectoryPage>() <= DB_PAGE_SIZE);
}

#[test]
fn directory_sample_test() {
    let bpm = test_bpm(5);
    let page = bpm.new_page().expect("failed to create directory page");
    let page_id = page.read().get_page_id();
    let mut guard = page.write();
    let directory = HashTableDirectoryPage::view_mut(guard.get_data_mut());
    directory.set_page_id(page_id);

    // An all-zero page is an empty directory at global depth 0.
    assert_eq!(directory.get_global_depth(), 0);
    assert_eq!(directory.size(), 1);
    assert_eq!(directory.get_global_depth_mask(), 0);

    directory.set_bucket_page_id(0, 10);
    assert_eq!(directory.get_bucket_page_id(0), 10);
    assert_eq!(directory.get_local_depth(0), 0);
    assert_eq!(directory.get_page_id(), page_id);
}

#[test]
fn global_depth_growth_duplicates_the_directory() {
    let bpm = test_bpm(5);
    let page = bpm.new_page().expect("failed to create directory page");
    let mut guard = page.write();
    let directory = HashTableDirectoryPage::view_mut(guard.get_data_mut());

    // Build a depth-2 directory over four distinct buckets.
    directory.incr_global_depth();
    directory.incr_global_depth();
    for i in 0..4 {
        directory.set_bucket_page_id(i, 100 + i as PageId);
        directory.set_local_depth(i, 2);
    }
    directory.verify_integrity();

    directory.incr_global_depth();
    assert_eq!(directory.get_global_depth(), 3);
    assert_eq!(directory.size(), 8);
    // The upper half mirrors the lower half, local depths included.
    for i in 0..4u32 {
        assert_eq!(
            directory.get_bucket_page_id(i + 4),
            directory.get_bucket_page_id(i)
        );
        assert_eq!(directory.get_local_depth(i + 4), 2);
    }
    directory.verify_integrity();

    // Every local depth sits below the global depth now.
    assert!(directory.can_shrink());
    directory.decr_global_depth();
    assert_eq!(directory.size(), 4);
    assert!(!directory.can_shrink());
    directory.verify_integrity();
}

#[test]
fn masks_track_depths() {
    let bpm = test_bpm(5);
    let page = bpm.new_page().expect("failed to create directory page");
    let mut guard = page.write();
    let directory = HashTableDirectoryPage::view_mut(guard.get_data_mut());

    directory.incr_global_depth();
    directory.incr_global_depth();
    directory.incr_global_depth();
    assert_eq!(directory.get_global_depth_mask(), 0x0000_0007);

    directory.set_local_depth(5, 2);
    assert_eq!(directory.get_local_depth_mask(5), 0x0000_0003);
}

#[test]
fn split_image_index_is_an_involution() {
    let bpm = test_bpm(5);
    let page = bpm.new_page().expect("failed to create directory page");
    let mut guard = page.write();
    let directory = HashTableDirectoryPage::view_mut(guard.get_data_mut());

    directory.incr_global_depth();
    directory.incr_global_depth();
    directory.incr_global_depth();
    for i in 0..8u32 {
        directory.set_local_depth(i, 3);
    }
    for i in 0..8u32 {
        let image = directory.get_split_image_index(i);
        assert_ne!(image, i);
        assert_eq!(directory.get_split_image_index(image), i);
    }

    // At local depth 2 the split image flips bit 1 instead of bit 2.
    directory.set_local_depth(0, 2);
    assert_eq!(directory.get_split_image_index(0), 2);
}

#[test]
fn bucket_page_sample_test() {
    let bpm = test_bpm(5);
    let page = bpm.new_page().expect("failed to create bucket page");
    let mut guard = page.write();
    let mut bucket = IntBucketPage::new(guard.get_data_mut());

    assert!(bucket.is_empty());

    // Insert a few (key, value) pairs.
    for i in 0..10 {
        assert!(bucket.insert(i, i, &int_cmp));
    }
    assert_eq!(bucket.num_readable(), 10);
    assert!(!bucket.is_empty());
    assert!(!bucket.is_full());

    // Duplicate pairs are rejected, distinct values under the same key are not.
    assert!(!bucket.insert(5, 5, &int_cmp));
    assert!(bucket.insert(5, 500, &int_cmp));

    let mut result = Vec::new();
    assert!(bucket.get_value(&5, &int_cmp, &mut result));
    result.sort_unstable();
    assert_eq!(result, vec![5, 500]);

    // Removal clears only the readable bit; the slot stays occupied.
    assert!(bucket.remove(&5, &500, &int_cmp));
    assert!(!bucket.remove(&5, &500, &int_cmp));
    let removed_slot = 10; // (5, 500) landed in the first free slot, index 10
    assert!(!bucket.is_readable(removed_slot));
    assert!(bucket.is_occupied(removed_slot));

    let mut result = Vec::new();
    assert!(bucket.get_value(&5, &int_cmp, &mut result));
    assert_eq!(result, vec![5]);
}

#[test]
fn bucket_fills_to_capacity_and_reuses_freed_slots() {
    let bpm = test_bpm(5);
    let page = bpm.new_page().expect("failed to create bucket page");
    let mut guard = page.write();
    let mut bucket = IntBucketPage::new(guard.get_data_mut());

    let capacity = IntBucketPage::ARRAY_SIZE as i32;
    for i in 0..capacity {
        assert!(bucket.insert(i, i, &int_cmp));
    }
    assert!(bucket.is_full());
    assert_eq!(bucket.num_readable(), capacity as u32);

    // One more does not fit.
    assert!(!bucket.insert(capacity, capacity, &int_cmp));

    // Freeing a middle slot makes room for exactly one distinct pair, which
    // lands in the freed slot.
    assert!(bucket.remove(&17, &17, &int_cmp));
    assert!(bucket.insert(capacity, capacity, &int_cmp));
    assert_eq!(bucket.key_at(17), capacity);
    assert!(bucket.is_full());
}

#[test]
fn bucket_bitmaps_count_live_pairs() {
    let bpm = test_bpm(5);
    let page = bpm.new_page().expect("failed to create bucket page");
    let mut guard = page.write();
    let mut bucket = IntBucketPage::new(guard.get_data_mut());

    for i in 0..64 {
        assert!(bucket.insert(i, -i, &int_cmp));
    }
    for i in 0..64 {
        if i % 2 == 0 {
            assert!(bucket.remove(&i, &-i, &int_cmp));
        }
    }
    assert_eq!(bucket.num_readable(), 32);
    for i in 0..64u32 {
        assert!(bucket.is_occupied(i));
        assert_eq!(bucket.is_readable(i), i % 2 == 1);
    }
}

#[test]
fn bucket_contents_survive_a_disk_round_trip() {
    let disk_manager = Arc::new(MemoryDiskManager::new());
    let bpm = BufferPoolManagerInstance::new(3, disk_manager, None);

    let page = bpm.new_page().expect("failed to create bucket page");
    let page_id = page.read().get_page_id();
    {
        let mut guard = page.write();
        let mut bucket = IntBucketPage::new(guard.get_data_mut());
        for i in 0..100 {
            assert!(bucket.insert(i, i * 2, &int_cmp));
        }
    }
    assert!(bpm.unpin_page(page_id, true));

    // Churn the pool until the bucket page is evicted.
    for _ in 0..6 {
        let page = bpm.new_page().expect("an evictable frame exists");
        let id = page.read().get_page_id();
        assert!(bpm.unpin_page(id, false));
    }

    let page = bpm.fetch_page(page_id).expect("bucket page readable from disk");
    let mut guard = page.write();
    let bucket = IntBucketPage::new(guard.get_data_mut());
    assert_eq!(bucket.num_readable(), 100);
    let mut result = Vec::new();
    assert!(bucket.get_value(&42, &int_cmp, &mut result));
    assert_eq!(result, vec![84]);
}
