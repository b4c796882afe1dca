//! Fixed-size bit maps
//!
//! Dense bit sets indexed by block id or local slot. The ordering pass keeps
//! its visited/active sets and the loop membership matrix in these, and the
//! merge reads liveness and stores-in-loops maps through them.

use serde::{Deserialize, Serialize};
use std::fmt;

const WORD_BITS: usize = 64;

#[inline]
fn words_for(bits: usize) -> usize {
    (bits + WORD_BITS - 1) / WORD_BITS
}

/// A bit map with a fixed logical size.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BitMap {
    words: Vec<u64>,
    size: usize,
}

impl BitMap {
    /// Create a bit map of `size` bits, all clear.
    pub fn new(size: usize) -> Self {
        Self {
            words: vec![0; words_for(size)],
            size,
        }
    }

    /// Create a bit map of `size` bits, all set.
    pub fn filled(size: usize) -> Self {
        let mut map = Self::new(size);
        map.set_all();
        map
    }

    /// Build a bit map from the given set indices.
    pub fn from_indices(size: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut map = Self::new(size);
        for index in indices {
            map.set(index);
        }
        map
    }

    /// Number of addressable bits.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        if index >= self.size {
            return false;
        }
        self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    /// Set a bit. Panics if `index` is outside the map.
    #[inline]
    pub fn set(&mut self, index: usize) {
        assert!(index < self.size, "bit {} out of range {}", index, self.size);
        self.words[index / WORD_BITS] |= 1 << (index % WORD_BITS);
    }

    #[inline]
    pub fn clear(&mut self, index: usize) {
        if index < self.size {
            self.words[index / WORD_BITS] &= !(1 << (index % WORD_BITS));
        }
    }

    pub fn set_all(&mut self) {
        for word in &mut self.words {
            *word = u64::MAX;
        }
        let tail = self.size % WORD_BITS;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last = (1u64 << tail) - 1;
            }
        }
    }

    pub fn clear_all(&mut self) {
        for word in &mut self.words {
            *word = 0;
        }
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Iterate over the indices of set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.size).filter(move |&i| self.get(i))
    }
}

impl fmt::Debug for BitMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitMap[")?;
        for i in 0..self.size {
            write!(f, "{}", if self.get(i) { '1' } else { '0' })?;
        }
        write!(f, "]")
    }
}

/// A two-dimensional bit matrix stored row-major.
///
/// The ordering pass uses one row per loop and one column per block id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitMap2D {
    rows: usize,
    columns: usize,
    bits: BitMap,
}

impl BitMap2D {
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            bits: BitMap::new(rows * columns),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.columns
    }

    #[inline]
    fn offset(&self, row: usize, column: usize) -> usize {
        assert!(
            row < self.rows && column < self.columns,
            "bit ({}, {}) out of range ({}, {})",
            row,
            column,
            self.rows,
            self.columns
        );
        row * self.columns + column
    }

    #[inline]
    pub fn at(&self, row: usize, column: usize) -> bool {
        if row >= self.rows || column >= self.columns {
            return false;
        }
        self.bits.get(row * self.columns + column)
    }

    #[inline]
    pub fn set_bit(&mut self, row: usize, column: usize) {
        let offset = self.offset(row, column);
        self.bits.set(offset);
    }

    #[inline]
    pub fn clear_bit(&mut self, row: usize, column: usize) {
        let offset = self.offset(row, column);
        self.bits.clear(offset);
    }

    /// Clear every bit in `row`.
    pub fn clear_row(&mut self, row: usize) {
        for column in 0..self.columns {
            self.clear_bit(row, column);
        }
    }

    pub fn clear(&mut self) {
        self.bits.clear_all();
    }

    /// Whether any bit in `row` is set.
    pub fn row_is_empty(&self, row: usize) -> bool {
        (0..self.columns).all(|column| !self.at(row, column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut map = BitMap::new(130);
        map.set(0);
        map.set(64);
        map.set(129);
        assert!(map.get(0) && map.get(64) && map.get(129));
        assert!(!map.get(1));
        assert_eq!(map.count(), 3);

        map.clear(64);
        assert!(!map.get(64));
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![0, 129]);

        // Out of range reads are simply false.
        assert!(!map.get(500));
    }

    #[test]
    fn test_set_all_respects_size() {
        let mut map = BitMap::new(70);
        map.set_all();
        assert_eq!(map.count(), 70);
        map.clear_all();
        assert!(map.is_empty());
    }

    #[test]
    fn test_bitmap_2d_rows_are_independent() {
        let mut matrix = BitMap2D::new(3, 10);
        matrix.set_bit(0, 4);
        matrix.set_bit(2, 4);
        assert!(matrix.at(0, 4));
        assert!(!matrix.at(1, 4));
        assert!(matrix.at(2, 4));

        matrix.clear_row(2);
        assert!(matrix.row_is_empty(2));
        assert!(!matrix.row_is_empty(0));
    }
}
