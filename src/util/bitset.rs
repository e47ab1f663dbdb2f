//! Fixed-capacity bitset used for read/write masks over handle index space.

use std::fmt::{Debug, Formatter};
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// A bitset of `WORDS * 64` bits stored inline. Never allocates.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitSet<const WORDS: usize> {
    words: [u64; WORDS],
}

impl<const WORDS: usize> BitSet<WORDS> {
    /// Number of bits this set can address.
    pub const CAPACITY: usize = WORDS * 64;

    /// Create an empty bitset.
    pub const fn new() -> Self {
        Self {
            words: [0; WORDS],
        }
    }

    /// Set bit `index`. Panics if the index is out of range.
    pub fn set(&mut self, index: usize) {
        assert!(index < Self::CAPACITY, "bit {index} out of range for bitset of {} bits", Self::CAPACITY);
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    /// Clear bit `index`.
    pub fn unset(&mut self, index: usize) {
        assert!(index < Self::CAPACITY, "bit {index} out of range for bitset of {} bits", Self::CAPACITY);
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Returns true if bit `index` is set.
    pub fn get(&self, index: usize) -> bool {
        index < Self::CAPACITY && self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Returns true if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// Returns true if any bit is set in both sets.
    pub fn intersects(&self, other: &Self) -> bool {
        self.words.iter().zip(other.words.iter()).any(|(a, b)| a & b != 0)
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Iterate over the indices of all set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut word = word;
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros() as usize;
                word &= word - 1;
                Some(i * 64 + bit)
            })
        })
    }
}

impl<const WORDS: usize> Default for BitSet<WORDS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WORDS: usize> BitAnd for BitSet<WORDS> {
    type Output = Self;

    fn bitand(mut self, rhs: Self) -> Self::Output {
        self.words.iter_mut().zip(rhs.words.iter()).for_each(|(a, b)| *a &= b);
        self
    }
}

impl<const WORDS: usize> BitOr for BitSet<WORDS> {
    type Output = Self;

    fn bitor(mut self, rhs: Self) -> Self::Output {
        self |= rhs;
        self
    }
}

impl<const WORDS: usize> BitOrAssign for BitSet<WORDS> {
    fn bitor_assign(&mut self, rhs: Self) {
        self.words.iter_mut().zip(rhs.words.iter()).for_each(|(a, b)| *a |= b);
    }
}

impl<const WORDS: usize> Debug for BitSet<WORDS> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
