pub const INVALID_PAGE_ID: PageId = -1; // invalid page id
pub const INVALID_LSN: Lsn = -1; // invalid log sequence number
pub const DB_PAGE_SIZE: usize = 4096; // size of a data page in bytes
pub const BUFFER_POOL_SIZE: usize = 10; // default size of buffer pool
pub const LOG_BUFFER_SIZE: usize = (BUFFER_POOL_SIZE + 1) * DB_PAGE_SIZE; // size of a log buffer in bytes

pub type FrameId = i32; // frame id type
pub type PageId = i32; // page id type
pub type Lsn = i32; // log sequence number type
