use crate::common::TestContext;
use hematite::buffer::buffer_pool_manager_instance::BufferPoolManagerInstance;
use hematite::common::config::{DB_PAGE_SIZE, INVALID_PAGE_ID};
use hematite::recovery::log_manager::LogManager;
use hematite::storage::disk::disk_manager::MemoryDiskManager;
use rand::Rng;
use std::sync::Arc;

#[test]
fn binary_data_test() {
    let ctx = TestContext::new("binary_data_test");
    let buffer_pool_size = 10;
    let bpm = BufferPoolManagerInstance::new(buffer_pool_size, ctx.disk_manager.clone(), None);

    // Scenario: The buffer pool is empty. We should be able to create a new page.
    let page0 = bpm.new_page().expect("failed to create a new page");
    assert_eq!(page0.read().get_page_id(), 0);

    // Generate random binary data, with terminal bytes in the middle and at
    // the end.
    let mut random_binary_data = [0u8; DB_PAGE_SIZE];
    rand::thread_rng().fill(&mut random_binary_data[..]);
    random_binary_data[DB_PAGE_SIZE / 2] = 0;
    random_binary_data[DB_PAGE_SIZE - 1] = 0;

    // Scenario: Once we have a page, we should be able to read and write content.
    page0
        .write()
        .get_data_mut()
        .copy_from_slice(&random_binary_data);
    assert_eq!(page0.read().get_data(), &random_binary_data);

    // Scenario: We should be able to create new pages until we fill up the
    // buffer pool.
    for _ in 1..buffer_pool_size {
        assert!(bpm.new_page().is_some());
    }

    // Scenario: Once the buffer pool is full, we should not be able to
    // create any new pages.
    for _ in buffer_pool_size..buffer_pool_size * 2 {
        assert!(bpm.new_page().is_none());
    }

    // Scenario: After unpinning pages {0, 1, 2, 3, 4} we should be able to
    // create 5 new pages.
    for i in 0..5 {
        assert!(bpm.unpin_page(i, true));
    }
    for _ in 0..5 {
        let page = bpm.new_page().expect("failed to create a page after unpinning");
        let page_id = page.read().get_page_id();
        bpm.unpin_page(page_id, false);
    }

    // Scenario: We should be able to fetch the data we wrote a while ago.
    let page0 = bpm.fetch_page(0).expect("failed to fetch page 0");
    assert_eq!(page0.read().get_data(), &random_binary_data);
}

#[test]
fn new_page_allocates_sequential_ids_and_reuses_frames() {
    let ctx = TestContext::new("new_page_ids");
    let bpm = BufferPoolManagerInstance::new(10, ctx.disk_manager.clone(), None);

    for expected_id in 0..10 {
        let page = bpm.new_page().expect("pool should not be full yet");
        assert_eq!(page.read().get_page_id(), expected_id);
    }
    assert!(bpm.new_page().is_none());

    // Freeing one frame lets exactly one more allocation through, with the
    // next id in sequence.
    assert!(bpm.unpin_page(1, false));
    let page = bpm.new_page().expect("an evictable frame exists");
    assert_eq!(page.read().get_page_id(), 10);
    assert!(bpm.new_page().is_none());
}

#[test]
fn dirty_page_survives_eviction() {
    let ctx = TestContext::new("dirty_eviction");
    let bpm = BufferPoolManagerInstance::new(3, ctx.disk_manager.clone(), None);

    let page0 = bpm.new_page().expect("failed to create page");
    let page0_id = page0.read().get_page_id();
    page0.write().get_data_mut().fill(0xab);
    assert!(bpm.unpin_page(page0_id, true));

    // Cycle enough pages through the pool to evict page0.
    for _ in 0..6 {
        let page = bpm.new_page().expect("an evictable frame exists");
        let page_id = page.read().get_page_id();
        assert!(bpm.unpin_page(page_id, false));
    }

    let page0 = bpm.fetch_page(page0_id).expect("failed to fetch page back");
    assert!(page0.read().get_data().iter().all(|&b| b == 0xab));
}

#[test]
fn unpin_hint_never_clears_dirty() {
    let ctx = TestContext::new("unpin_dirty_hint");
    let bpm = BufferPoolManagerInstance::new(5, ctx.disk_manager.clone(), None);

    let page = bpm.new_page().expect("failed to create page");
    let page_id = page.read().get_page_id();
    page.write().get_data_mut()[0] = 1;
    assert!(bpm.unpin_page(page_id, true));
    assert!(page.read().is_dirty());

    // A later clean unpin must not launder the page.
    let page = bpm.fetch_page(page_id).expect("page is resident");
    assert!(bpm.unpin_page(page_id, false));
    assert!(page.read().is_dirty());
}

#[test]
fn unpin_misses_and_double_unpin_fail() {
    let ctx = TestContext::new("unpin_misses");
    let bpm = BufferPoolManagerInstance::new(5, ctx.disk_manager.clone(), None);

    assert!(!bpm.unpin_page(99, false));

    let page = bpm.new_page().expect("failed to create page");
    let page_id = page.read().get_page_id();
    assert!(bpm.unpin_page(page_id, false));
    assert!(!bpm.unpin_page(page_id, false));
}

#[test]
fn flush_page_clears_dirty_but_flush_all_does_not() {
    let ctx = TestContext::new("flush_dirty_flags");
    let bpm = BufferPoolManagerInstance::new(5, ctx.disk_manager.clone(), None);

    let page = bpm.new_page().expect("failed to create page");
    let page_id = page.read().get_page_id();
    page.write().get_data_mut()[0] = 7;
    assert!(bpm.unpin_page(page_id, true));

    bpm.flush_all_pages();
    assert!(page.read().is_dirty());

    assert!(bpm.flush_page(page_id));
    assert!(!page.read().is_dirty());

    assert!(!bpm.flush_page(INVALID_PAGE_ID));
    assert!(!bpm.flush_page(12345));
}

#[test]
fn delete_page_respects_pins_and_frees_the_frame() {
    let ctx = TestContext::new("delete_page");
    let bpm = BufferPoolManagerInstance::new(10, ctx.disk_manager.clone(), None);

    let page0 = bpm.new_page().expect("failed to create page");
    let page0_id = page0.read().get_page_id();
    let _pin2 = bpm.fetch_page(page0_id).expect("page is resident");
    assert_eq!(page0.read().get_pin_count(), 2);

    // Two pins outstanding: the page is in use.
    assert!(!bpm.delete_page(page0_id));
    assert!(bpm.unpin_page(page0_id, false));
    assert!(!bpm.delete_page(page0_id));
    assert!(bpm.unpin_page(page0_id, false));

    assert!(bpm.delete_page(page0_id));
    assert!(!bpm.unpin_page(page0_id, false));

    // Deleting a non-resident page succeeds.
    assert!(bpm.delete_page(4242));

    // The freed frame is usable again even with the rest of the pool pinned.
    for _ in 1..10 {
        assert!(bpm.new_page().is_some());
    }
    assert!(bpm.new_page().is_some());
    assert!(bpm.new_page().is_none());
}

#[test]
fn fetch_miss_with_all_frames_pinned_fails() {
    let ctx = TestContext::new("fetch_all_pinned");
    let bpm = BufferPoolManagerInstance::new(3, ctx.disk_manager.clone(), None);

    for _ in 0..3 {
        assert!(bpm.new_page().is_some());
    }
    assert!(bpm.fetch_page(1000).is_none());
}

#[test]
fn fetch_hit_counts_pins() {
    let ctx = TestContext::new("fetch_hit_pins");
    let bpm = BufferPoolManagerInstance::new(3, ctx.disk_manager.clone(), None);

    let page = bpm.new_page().expect("failed to create page");
    let page_id = page.read().get_page_id();
    let _again = bpm.fetch_page(page_id).expect("resident page");
    assert_eq!(page.read().get_pin_count(), 2);

    assert!(bpm.unpin_page(page_id, false));
    assert_eq!(page.read().get_pin_count(), 1);
    assert!(bpm.unpin_page(page_id, false));
    assert_eq!(page.read().get_pin_count(), 0);
}

#[test]
fn wal_is_flushed_before_dirty_write_back() {
    let disk_manager = Arc::new(MemoryDiskManager::new());
    let log_manager = Arc::new(LogManager::new(disk_manager.clone()));
    let bpm =
        BufferPoolManagerInstance::new(1, disk_manager, Some(log_manager.clone()));

    let page = bpm.new_page().expect("failed to create page");
    let page_id = page.read().get_page_id();
    page.write().get_data_mut()[0] = 9;
    log_manager.append_log_record(b"update page");
    assert!(bpm.unpin_page(page_id, true));

    // Recycling the only frame must force the log first.
    let _next = bpm.new_page().expect("frame is evictable");
    assert_eq!(log_manager.get_persistent_lsn(), 0);
}
