use crate::common::config::DB_PAGE_SIZE;

pub type MappingType<KeyType, ValueType> = (KeyType, ValueType);

/**
 * BUCKET_ARRAY_SIZE is the number of (key, value) pairs that can be stored in
 * an extendible hash index bucket page. For each pair we need two additional
 * bits for the occupied_ and readable_ bitmaps, so the capacity is
 * 4 * DB_PAGE_SIZE / (4 * sizeof(MappingType) + 1) =
 * DB_PAGE_SIZE / (sizeof(MappingType) + 0.25), 0.25 bytes being the two flag
 * bits per pair.
 */
pub const fn bucket_array_size<KeyType, ValueType>() -> usize {
    (4 * DB_PAGE_SIZE) / (4 * std::mem::size_of::<MappingType<KeyType, ValueType>>() + 1)
}

/**
 * DIRECTORY_ARRAY_SIZE is the number of page_ids that can fit in the
 * directory page of an extendible hash index. This is 512 because the
 * directory array must grow in powers of 2, and 1024 page_ids leaves zero
 * room for the other members: page_id_, lsn_, global_depth_, and the
 * local_depths_ array. Spanning the directory across multiple pages would be
 * a meaningful extension.
 */
pub const DIRECTORY_ARRAY_SIZE: usize = 512;

/// Upper bound on the directory's global depth; 1 << MAX_BUCKET_DEPTH must
/// equal DIRECTORY_ARRAY_SIZE.
pub const MAX_BUCKET_DEPTH: u32 = 9;
