use crate::common::config::{PageId, DB_PAGE_SIZE};
use crate::common::exception::DiskError;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicI32, Ordering};

/// The seam between the buffer pool and persistent storage: synchronous,
/// page-granular I/O plus a separate log channel.
///
/// Page id allocation here is a plain monotone counter for callers that do
/// not shard their id space; sharded buffer pool instances mint their own
/// ids. `deallocate_page` is deferred reclamation: freed ids may be reused
/// lazily, so a freed page's image must still be written back before its
/// frame is recycled.
///
/// I/O faults after construction are fatal to the storage engine and abort
/// the process.
pub trait DiskManager: Send + Sync {
    /// Reads a page into `page_data`. A page that was never written (or a
    /// short tail) is zero-filled.
    fn read_page(&self, page_id: PageId, page_data: &mut [u8; DB_PAGE_SIZE]);

    /// Writes a page image and flushes it.
    fn write_page(&self, page_id: PageId, page_data: &[u8; DB_PAGE_SIZE]);

    /// Returns the next unused page id.
    fn allocate_page(&self) -> PageId;

    /// Marks a page id as reusable. Reclamation is deferred.
    fn deallocate_page(&self, page_id: PageId);

    /// Appends raw bytes to the log file and forces them to disk.
    fn write_log(&self, log_data: &[u8]);

    /// Reads log bytes starting at `offset`; a short read zero-fills the
    /// tail. Returns `false` at clean end-of-log.
    fn read_log(&self, log_data: &mut [u8], offset: u64) -> bool;
}

/// File-backed disk manager: one database file addressed by page id, one
/// append-style log file.
pub struct FileDiskManager {
    file_name: String,
    log_name: String,
    db_io: Mutex<File>,
    log_io: Mutex<File>,
    next_page_id: AtomicI32,
    num_writes: AtomicI32,
    num_flushes: AtomicI32,
}

impl FileDiskManager {
    pub fn new(db_file: &str, log_file: &str) -> Result<Self, DiskError> {
        let db_io = Self::open(db_file)?;
        let log_io = Self::open(log_file)?;
        Ok(Self {
            file_name: db_file.to_string(),
            log_name: log_file.to_string(),
            db_io: Mutex::new(db_io),
            log_io: Mutex::new(log_io),
            next_page_id: AtomicI32::new(0),
            num_writes: AtomicI32::new(0),
            num_flushes: AtomicI32::new(0),
        })
    }

    fn open(path: &str) -> Result<File, DiskError> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|source| DiskError::Open {
                path: path.to_string(),
                source,
            })
    }

    /// Flushes both files; call before dropping the manager at shutdown.
    pub fn shut_down(&self) -> Result<(), DiskError> {
        self.db_io.lock().sync_all()?;
        self.log_io.lock().sync_all()?;
        Ok(())
    }

    pub fn get_file_name(&self) -> &str {
        &self.file_name
    }

    pub fn get_log_name(&self) -> &str {
        &self.log_name
    }

    pub fn get_num_writes(&self) -> i32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn get_num_flushes(&self) -> i32 {
        self.num_flushes.load(Ordering::Relaxed)
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&self, page_id: PageId, page_data: &mut [u8; DB_PAGE_SIZE]) {
        let offset = page_id as u64 * DB_PAGE_SIZE as u64;
        let mut db_io = self.db_io.lock();
        db_io
            .seek(SeekFrom::Start(offset))
            .expect("seek in database file failed");

        let mut read = 0;
        while read < DB_PAGE_SIZE {
            match db_io.read(&mut page_data[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) => panic!("read of page {} failed: {}", page_id, e),
            }
        }
        if read < DB_PAGE_SIZE {
            // Reading past the materialized end of file yields zeros.
            debug!("read less than a page for page {}", page_id);
            page_data[read..].fill(0);
        }
    }

    fn write_page(&self, page_id: PageId, page_data: &[u8; DB_PAGE_SIZE]) {
        let offset = page_id as u64 * DB_PAGE_SIZE as u64;
        let mut db_io = self.db_io.lock();
        db_io
            .seek(SeekFrom::Start(offset))
            .expect("seek in database file failed");
        db_io
            .write_all(page_data)
            .unwrap_or_else(|e| panic!("write of page {} failed: {}", page_id, e));
        db_io.flush().expect("flush of database file failed");
        self.num_writes.fetch_add(1, Ordering::Relaxed);
    }

    fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }

    fn deallocate_page(&self, page_id: PageId) {
        // Deferred: the id becomes reusable but no file space is reclaimed.
        debug!("deallocate page {} (deferred)", page_id);
    }

    fn write_log(&self, log_data: &[u8]) {
        let mut log_io = self.log_io.lock();
        log_io
            .seek(SeekFrom::End(0))
            .expect("seek in log file failed");
        log_io
            .write_all(log_data)
            .expect("write to log file failed");
        log_io.sync_data().expect("sync of log file failed");
        self.num_flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn read_log(&self, log_data: &mut [u8], offset: u64) -> bool {
        let mut log_io = self.log_io.lock();
        let file_len = log_io.metadata().expect("stat of log file failed").len();
        if offset >= file_len {
            return false;
        }
        log_io
            .seek(SeekFrom::Start(offset))
            .expect("seek in log file failed");
        let n = log_io.read(log_data).expect("read of log file failed");
        if n < log_data.len() {
            log_data[n..].fill(0);
        }
        true
    }
}

/// In-memory disk manager, primarily for data-structure tests: pages live in
/// a hash map, the log in a growable byte vector.
pub struct MemoryDiskManager {
    pages: RwLock<HashMap<PageId, Box<[u8; DB_PAGE_SIZE]>>>,
    log: Mutex<Vec<u8>>,
    next_page_id: AtomicI32,
}

impl MemoryDiskManager {
    pub fn new() -> Self {
        Self {
            pages: RwLock::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            next_page_id: AtomicI32::new(0),
        }
    }
}

impl Default for MemoryDiskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&self, page_id: PageId, page_data: &mut [u8; DB_PAGE_SIZE]) {
        match self.pages.read().get(&page_id) {
            Some(stored) => page_data.copy_from_slice(&stored[..]),
            None => {
                warn!("read of never-written page {}", page_id);
                page_data.fill(0);
            }
        }
    }

    fn write_page(&self, page_id: PageId, page_data: &[u8; DB_PAGE_SIZE]) {
        let mut pages = self.pages.write();
        pages.insert(page_id, Box::new(*page_data));
    }

    fn allocate_page(&self) -> PageId {
        self.next_page_id.fetch_add(1, Ordering::SeqCst)
    }

    fn deallocate_page(&self, _page_id: PageId) {}

    fn write_log(&self, log_data: &[u8]) {
        self.log.lock().extend_from_slice(log_data);
    }

    fn read_log(&self, log_data: &mut [u8], offset: u64) -> bool {
        let log = self.log.lock();
        let offset = offset as usize;
        if offset >= log.len() {
            return false;
        }
        let n = log_data.len().min(log.len() - offset);
        log_data[..n].copy_from_slice(&log[offset..offset + n]);
        log_data[n..].fill(0);
        true
    }
}
