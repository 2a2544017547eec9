use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use xxhash_rust::xxh3;

/// Hash function for index keys, backed by xxh3.
pub struct HashFunction<K> {
    _marker: PhantomData<K>,
}

impl<K: Hash> HashFunction<K> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Returns the hash value of the given key.
    pub fn get_hash(&self, key: &K) -> u64 {
        let mut hasher = xxh3::Xxh3::new();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

impl<K: Hash> Default for HashFunction<K> {
    fn default() -> Self {
        Self::new()
    }
}
