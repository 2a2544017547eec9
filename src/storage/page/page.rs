use crate::common::config::{PageId, DB_PAGE_SIZE, INVALID_PAGE_ID};

/// Page-sized byte buffer. Alignment is raised so that a frame's bytes can be
/// reinterpreted in place as a typed page image (directory pages carry 32-bit
/// fields at 4-byte offsets).
#[repr(C, align(8))]
struct PageData([u8; DB_PAGE_SIZE]);

/// A `Page` is one frame of the buffer pool: a page-sized buffer together
/// with the bookkeeping the pool needs to manage it.
///
/// The frame holds at most one disk page at a time; `page_id` is
/// [`INVALID_PAGE_ID`] while the frame is free. `pin_count` counts the
/// outstanding references handed to clients, and `is_dirty` records whether
/// the in-memory image has diverged from the disk image since it was loaded.
pub struct Page {
    data: Box<PageData>,
    page_id: PageId,
    pin_count: i32,
    is_dirty: bool,
}

impl Page {
    pub fn new() -> Self {
        Self {
            data: Box::new(PageData([0; DB_PAGE_SIZE])),
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
        }
    }

    pub fn get_data(&self) -> &[u8; DB_PAGE_SIZE] {
        &self.data.0
    }

    pub fn get_data_mut(&mut self) -> &mut [u8; DB_PAGE_SIZE] {
        &mut self.data.0
    }

    pub fn get_page_id(&self) -> PageId {
        self.page_id
    }

    pub fn set_page_id(&mut self, page_id: PageId) {
        self.page_id = page_id;
    }

    pub fn get_pin_count(&self) -> i32 {
        self.pin_count
    }

    pub fn set_pin_count(&mut self, pin_count: i32) {
        self.pin_count = pin_count;
    }

    pub fn increment_pin_count(&mut self) {
        self.pin_count += 1;
    }

    pub fn decrement_pin_count(&mut self) {
        self.pin_count -= 1;
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn set_dirty(&mut self, is_dirty: bool) {
        self.is_dirty = is_dirty;
    }

    /// Zeroes the page image. Metadata is untouched.
    pub fn reset_memory(&mut self) {
        self.data.0.fill(0);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
