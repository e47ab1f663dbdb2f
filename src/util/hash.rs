//! Content hashing for cache keys.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Hash a value with a fixed-key hasher, so equal values produce equal hashes across frames.
pub fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Fold `value` into an existing hash.
pub fn append_hash<T: Hash + ?Sized>(seed: u64, value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write_u64(seed);
    value.hash(&mut hasher);
    hasher.finish()
}

/// Hash an `f32` by its bit pattern. Clear values are compared exactly.
pub(crate) fn hash_f32<H: Hasher>(value: f32, state: &mut H) {
    state.write_u32(value.to_bits());
}
