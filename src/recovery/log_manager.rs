use crate::common::config::{Lsn, INVALID_LSN, LOG_BUFFER_SIZE};
use crate::storage::disk::disk_manager::DiskManager;
use log::trace;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Minimal write-ahead log front end.
///
/// Records are framed as `lsn (4) | len (4) | payload` and accumulate in an
/// in-memory buffer; `flush` forces the buffer through the disk manager's
/// log channel. The buffer pool calls `flush` before writing back any dirty
/// page so the log always reaches disk first.
pub struct LogManager {
    disk_manager: Arc<dyn DiskManager>,
    log_buffer: Mutex<Vec<u8>>,
    next_lsn: AtomicI32,
    persistent_lsn: AtomicI32,
}

impl LogManager {
    pub fn new(disk_manager: Arc<dyn DiskManager>) -> Self {
        Self {
            disk_manager,
            log_buffer: Mutex::new(Vec::with_capacity(LOG_BUFFER_SIZE)),
            next_lsn: AtomicI32::new(0),
            persistent_lsn: AtomicI32::new(INVALID_LSN),
        }
    }

    /// Appends a record to the log buffer and returns its lsn. The record
    /// is durable only after the next `flush`.
    pub fn append_log_record(&self, payload: &[u8]) -> Lsn {
        let mut log_buffer = self.log_buffer.lock();
        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);
        log_buffer.extend_from_slice(&lsn.to_le_bytes());
        log_buffer.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        log_buffer.extend_from_slice(payload);
        trace!("appended log record {} ({} bytes)", lsn, payload.len());
        lsn
    }

    /// Forces buffered records to disk and advances the persistent lsn.
    pub fn flush(&self) {
        let mut log_buffer = self.log_buffer.lock();
        if log_buffer.is_empty() {
            return;
        }
        self.disk_manager.write_log(&log_buffer);
        log_buffer.clear();
        self.persistent_lsn
            .store(self.next_lsn.load(Ordering::SeqCst) - 1, Ordering::SeqCst);
    }

    /// The lsn the next record will receive.
    pub fn get_next_lsn(&self) -> Lsn {
        self.next_lsn.load(Ordering::SeqCst)
    }

    /// The highest lsn known to be on disk, or [`INVALID_LSN`] if nothing
    /// has been flushed.
    pub fn get_persistent_lsn(&self) -> Lsn {
        self.persistent_lsn.load(Ordering::SeqCst)
    }
}
