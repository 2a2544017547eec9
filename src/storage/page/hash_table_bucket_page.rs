use crate::common::config::DB_PAGE_SIZE;
use crate::storage::page::hash_table_page_defs::{bucket_array_size, MappingType};
use log::info;
use std::cmp::Ordering;
use std::marker::PhantomData;
use std::mem::size_of;

/**
 * Bucket page for the extendible hash table. Supports non-unique keys.
 *
 * Bucket page format (size in byte):
 * -----------------------------------------------------------------------
 * | occupied_ (ceil(N/8)) | readable_ (ceil(N/8)) | KEY(1)+VALUE(1) | ...
 * -----------------------------------------------------------------------
 *
 * where N is `bucket_array_size::<K, V>()` and each slot is a (key, value)
 * pair packed contiguously. Bit i of a bitmap lives at byte i/8, bit i%8,
 * LSB first. `occupied_` records "slot was ever used"; `readable_` records
 * "slot currently holds a live pair". Removal clears only the readable bit
 * so that iteration may still stop at the first never-occupied slot.
 *
 * The page is kept as raw bytes and accessed through this typed view; `K`
 * and `V` must be plain fixed-width value types (every bit pattern valid),
 * which is what lets a bucket survive the disk round-trip unchanged.
 */
pub struct HashTableBucketPage<'a, K, V> {
    data: &'a mut [u8; DB_PAGE_SIZE],
    _marker: PhantomData<(K, V)>,
}

impl<'a, K, V> HashTableBucketPage<'a, K, V>
where
    K: Copy,
    V: Copy + PartialEq,
{
    pub const ARRAY_SIZE: usize = bucket_array_size::<K, V>();
    const BITMAP_BYTES: usize = (Self::ARRAY_SIZE + 7) / 8;
    const OCCUPIED_OFFSET: usize = 0;
    const READABLE_OFFSET: usize = Self::BITMAP_BYTES;
    const ARRAY_OFFSET: usize = 2 * Self::BITMAP_BYTES;

    /// Wraps a frame's bytes in a bucket view. A zeroed page is a valid
    /// empty bucket.
    pub fn new(data: &'a mut [u8; DB_PAGE_SIZE]) -> Self {
        debug_assert!(
            Self::ARRAY_OFFSET + Self::ARRAY_SIZE * size_of::<MappingType<K, V>>() <= DB_PAGE_SIZE
        );
        Self {
            data,
            _marker: PhantomData,
        }
    }

    /// Scans the bucket and appends every value stored under a key equal to
    /// `key`. Returns `true` iff at least one value matched.
    pub fn get_value<C>(&self, key: &K, cmp: &C, result: &mut Vec<V>) -> bool
    where
        C: Fn(&K, &K) -> Ordering,
    {
        let mut found = false;
        for i in 0..Self::ARRAY_SIZE as u32 {
            if self.is_readable(i) && cmp(&self.key_at(i), key) == Ordering::Equal {
                result.push(self.value_at(i));
                found = true;
            }
        }
        found
    }

    /// Attempts to insert a (key, value) pair.
    ///
    /// A single scan both rejects an exact duplicate pair and remembers the
    /// first non-readable slot; the pair lands in that slot only when no
    /// duplicate exists. Returns `false` on a duplicate or a full bucket
    /// (the caller must split).
    pub fn insert<C>(&mut self, key: K, value: V, cmp: &C) -> bool
    where
        C: Fn(&K, &K) -> Ordering,
    {
        let mut available: Option<u32> = None;
        for i in 0..Self::ARRAY_SIZE as u32 {
            if self.is_readable(i) {
                if cmp(&self.key_at(i), &key) == Ordering::Equal && self.value_at(i) == value {
                    return false;
                }
            } else if available.is_none() {
                available = Some(i);
            }
        }

        match available {
            Some(bucket_idx) => {
                self.put_slot(bucket_idx, (key, value));
                self.set_occupied(bucket_idx);
                self.set_readable(bucket_idx);
                true
            }
            None => false,
        }
    }

    /// Removes the first readable slot holding exactly `(key, value)`.
    /// Returns `false` if no such pair is present.
    pub fn remove<C>(&mut self, key: &K, value: &V, cmp: &C) -> bool
    where
        C: Fn(&K, &K) -> Ordering,
    {
        for i in 0..Self::ARRAY_SIZE as u32 {
            if self.is_readable(i)
                && cmp(&self.key_at(i), key) == Ordering::Equal
                && self.value_at(i) == *value
            {
                self.remove_at(i);
                return true;
            }
        }
        false
    }

    /// Clears the readable bit at `bucket_idx`. The occupied bit is left set
    /// on purpose: it records "ever used".
    pub fn remove_at(&mut self, bucket_idx: u32) {
        self.data[Self::READABLE_OFFSET + bucket_idx as usize / 8] &= !(1 << (bucket_idx % 8));
    }

    /// Raw slot read; meaningless unless the slot is readable.
    pub fn key_at(&self, bucket_idx: u32) -> K {
        self.get_slot(bucket_idx).0
    }

    /// Raw slot read; meaningless unless the slot is readable.
    pub fn value_at(&self, bucket_idx: u32) -> V {
        self.get_slot(bucket_idx).1
    }

    pub fn is_occupied(&self, bucket_idx: u32) -> bool {
        let byte = self.data[Self::OCCUPIED_OFFSET + bucket_idx as usize / 8];
        (byte & (1 << (bucket_idx % 8))) != 0
    }

    pub fn set_occupied(&mut self, bucket_idx: u32) {
        self.data[Self::OCCUPIED_OFFSET + bucket_idx as usize / 8] |= 1 << (bucket_idx % 8);
    }

    pub fn is_readable(&self, bucket_idx: u32) -> bool {
        let byte = self.data[Self::READABLE_OFFSET + bucket_idx as usize / 8];
        (byte & (1 << (bucket_idx % 8))) != 0
    }

    pub fn set_readable(&mut self, bucket_idx: u32) {
        self.data[Self::READABLE_OFFSET + bucket_idx as usize / 8] |= 1 << (bucket_idx % 8);
    }

    /// `true` iff every slot is readable.
    pub fn is_full(&self) -> bool {
        let full_bytes = Self::ARRAY_SIZE / 8;
        let readable = &self.data[Self::READABLE_OFFSET..Self::READABLE_OFFSET + Self::BITMAP_BYTES];
        if readable[..full_bytes].iter().any(|&b| b != 0xff) {
            return false;
        }
        let remainder = Self::ARRAY_SIZE % 8;
        if remainder > 0 {
            let mask = (1u8 << remainder) - 1;
            if readable[full_bytes] & mask != mask {
                return false;
            }
        }
        true
    }

    /// `true` iff no slot is readable.
    pub fn is_empty(&self) -> bool {
        self.data[Self::READABLE_OFFSET..Self::READABLE_OFFSET + Self::BITMAP_BYTES]
            .iter()
            .all(|&b| b == 0)
    }

    /// The number of readable slots, i.e. the current size of the bucket.
    pub fn num_readable(&self) -> u32 {
        // Bits past ARRAY_SIZE are never set, so a plain popcount is exact.
        self.data[Self::READABLE_OFFSET..Self::READABLE_OFFSET + Self::BITMAP_BYTES]
            .iter()
            .map(|b| b.count_ones())
            .sum()
    }

    /// Logs the bucket's occupancy, stopping at the first never-occupied
    /// slot the way iteration does.
    pub fn print_bucket(&self) {
        let mut size = 0;
        let mut taken = 0;
        let mut free = 0;
        for bucket_idx in 0..Self::ARRAY_SIZE as u32 {
            if !self.is_occupied(bucket_idx) {
                break;
            }
            size += 1;
            if self.is_readable(bucket_idx) {
                taken += 1;
            } else {
                free += 1;
            }
        }
        info!(
            "Bucket Capacity: {}, Size: {}, Taken: {}, Free: {}",
            Self::ARRAY_SIZE,
            size,
            taken,
            free
        );
    }

    fn slot_offset(bucket_idx: u32) -> usize {
        Self::ARRAY_OFFSET + bucket_idx as usize * size_of::<MappingType<K, V>>()
    }

    fn get_slot(&self, bucket_idx: u32) -> MappingType<K, V> {
        debug_assert!((bucket_idx as usize) < Self::ARRAY_SIZE);
        let offset = Self::slot_offset(bucket_idx);
        // SAFETY: the offset is in bounds (debug-asserted in new()) and K/V
        // are plain fixed-width value types per the view's contract; the
        // read is unaligned because slots are packed.
        unsafe {
            std::ptr::read_unaligned(self.data.as_ptr().add(offset) as *const MappingType<K, V>)
        }
    }

    fn put_slot(&mut self, bucket_idx: u32, pair: MappingType<K, V>) {
        debug_assert!((bucket_idx as usize) < Self::ARRAY_SIZE);
        let offset = Self::slot_offset(bucket_idx);
        // SAFETY: same bounds argument as get_slot; unaligned write into the
        // packed slot array.
        unsafe {
            std::ptr::write_unaligned(
                self.data.as_mut_ptr().add(offset) as *mut MappingType<K, V>,
                pair,
            );
        }
    }
}
