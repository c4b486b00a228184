//! Two-index free list with boundary coalescing
//!
//! Free blocks are indexed twice:
//!
//! ```text
//! by_offset: 0 → 64, 128 → 128          (neighbor lookup for merging)
//! by_size:   (64, 0), (128, 128)        (best fit: smallest size ≥ n)
//! ```
//!
//! Both indices always describe exactly the same set of blocks. Every
//! mutation goes through `insert`/`remove`, which update them together.

use std::collections::{BTreeMap, BTreeSet};

/// A maximal run of free slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlock {
    pub offset: u32,
    pub size: u32,
}

impl FreeBlock {
    pub fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }

    /// One past the last slot of the block
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }
}

#[derive(Debug, Default)]
pub struct FreeList {
    by_offset: BTreeMap<u32, u32>,
    /// (size, offset); ties on size resolve to the lowest offset
    by_size: BTreeSet<(u32, u32)>,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Free list covering `capacity` slots as a single block
    pub fn with_capacity(capacity: u32) -> Self {
        let mut list = Self::new();
        if capacity > 0 {
            list.insert(FreeBlock::new(0, capacity));
        }
        list
    }

    pub fn len(&self) -> usize {
        self.by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }

    /// Blocks in offset order
    pub fn blocks(&self) -> impl Iterator<Item = FreeBlock> + '_ {
        self.by_offset
            .iter()
            .map(|(&offset, &size)| FreeBlock::new(offset, size))
    }

    pub fn largest(&self) -> Option<FreeBlock> {
        self.by_size
            .iter()
            .next_back()
            .map(|&(size, offset)| FreeBlock::new(offset, size))
    }

    /// Sum of all block sizes
    pub fn total(&self) -> u64 {
        self.by_offset.values().map(|&size| size as u64).sum()
    }

    /// Smallest block holding at least `count` slots
    pub fn find_best_fit(&self, count: u32) -> Option<FreeBlock> {
        self.by_size
            .range((count, 0)..)
            .next()
            .map(|&(size, offset)| FreeBlock::new(offset, size))
    }

    pub fn has_space(&self, count: u32) -> bool {
        self.find_best_fit(count).is_some()
    }

    /// Take `count` slots from the best-fitting block
    ///
    /// The remainder of the block goes back unmerged: it was carved from a
    /// maximal block, so it cannot touch another free block.
    pub fn take(&mut self, count: u32) -> Option<u32> {
        let block = self.find_best_fit(count)?;
        self.remove(block);
        if block.size > count {
            self.insert(FreeBlock::new(block.offset + count, block.size - count));
        }
        Some(block.offset)
    }

    /// Return a range and merge it with its free neighbors
    ///
    /// Returns the block that ends up in the list.
    pub fn release(&mut self, offset: u32, size: u32) -> FreeBlock {
        let mut merged = FreeBlock::new(offset, size);

        let prev = self
            .by_offset
            .range(..offset)
            .next_back()
            .map(|(&o, &s)| FreeBlock::new(o, s));
        if let Some(prev) = prev.filter(|p| p.end() == offset) {
            self.remove(prev);
            merged.offset = prev.offset;
            merged.size += prev.size;
        }

        let next = self
            .by_offset
            .get(&(offset + size))
            .map(|&s| FreeBlock::new(offset + size, s));
        if let Some(next) = next {
            self.remove(next);
            merged.size += next.size;
        }

        self.insert(merged);
        merged
    }

    fn insert(&mut self, block: FreeBlock) {
        self.by_offset.insert(block.offset, block.size);
        self.by_size.insert((block.size, block.offset));
    }

    fn remove(&mut self, block: FreeBlock) {
        self.by_offset.remove(&block.offset);
        self.by_size.remove(&(block.size, block.offset));
    }

    /// Check that both indices agree and that no blocks touch or overlap
    pub(crate) fn check(&self, capacity: u32) -> Result<(), String> {
        if self.by_offset.len() != self.by_size.len() {
            return Err(format!(
                "index sizes differ: {} by offset, {} by size",
                self.by_offset.len(),
                self.by_size.len()
            ));
        }

        let mut prev_end: Option<u32> = None;
        for block in self.blocks() {
            if block.size == 0 {
                return Err(format!("empty block at offset {}", block.offset));
            }
            if !self.by_size.contains(&(block.size, block.offset)) {
                return Err(format!(
                    "block ({}, {}) missing from size index",
                    block.offset, block.size
                ));
            }
            if block.end() > capacity {
                return Err(format!(
                    "block ({}, {}) exceeds capacity {}",
                    block.offset, block.size, capacity
                ));
            }
            match prev_end {
                Some(end) if end == block.offset => {
                    return Err(format!("blocks adjacent at offset {}", block.offset));
                }
                Some(end) if end > block.offset => {
                    return Err(format!("blocks overlap at offset {}", block.offset));
                }
                _ => {}
            }
            prev_end = Some(block.end());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(list: &FreeList) -> Vec<(u32, u32)> {
        list.blocks().map(|b| (b.offset, b.size)).collect()
    }

    #[test]
    fn test_take_splits_block() {
        let mut list = FreeList::with_capacity(256);

        assert_eq!(list.take(64), Some(0));
        assert_eq!(blocks(&list), vec![(64, 192)]);
        assert_eq!(list.take(64), Some(64));
        assert_eq!(blocks(&list), vec![(128, 128)]);
        assert_eq!(list.take(129), None);
        assert_eq!(list.take(128), Some(128));
        assert!(list.is_empty());
    }

    #[test]
    fn test_best_fit_prefers_smallest_block() {
        let mut list = FreeList::new();
        list.release(0, 10);
        list.release(20, 4);
        list.release(40, 6);
        list.release(60, 4);

        // Smallest sufficient, lowest offset on equal size
        assert_eq!(list.find_best_fit(3), Some(FreeBlock::new(20, 4)));
        assert_eq!(list.find_best_fit(5), Some(FreeBlock::new(40, 6)));
        assert_eq!(list.find_best_fit(7), Some(FreeBlock::new(0, 10)));
        assert_eq!(list.find_best_fit(11), None);
        assert_eq!(list.largest(), Some(FreeBlock::new(0, 10)));
    }

    #[test]
    fn test_release_merges_neighbors() {
        let mut list = FreeList::new();
        list.release(0, 4);
        list.release(8, 4);
        assert_eq!(blocks(&list), vec![(0, 4), (8, 4)]);

        // Fills the gap, merges both sides
        let merged = list.release(4, 4);
        assert_eq!(merged, FreeBlock::new(0, 12));
        assert_eq!(blocks(&list), vec![(0, 12)]);
        assert_eq!(list.find_best_fit(12), Some(FreeBlock::new(0, 12)));
        assert_eq!(list.total(), 12);
        assert!(list.check(12).is_ok());
    }

    #[test]
    fn test_release_merges_one_side() {
        let mut list = FreeList::new();
        list.release(10, 5);

        assert_eq!(list.release(15, 5), FreeBlock::new(10, 10));
        assert_eq!(list.release(5, 5), FreeBlock::new(5, 15));
        assert_eq!(list.release(30, 5), FreeBlock::new(30, 5));
        assert_eq!(blocks(&list), vec![(5, 15), (30, 5)]);
    }

    #[test]
    fn test_check_detects_overflow() {
        let list = FreeList::with_capacity(16);
        assert!(list.check(16).is_ok());
        assert!(list.check(8).is_err());
    }
}
