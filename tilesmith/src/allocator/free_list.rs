use std::collections::BTreeMap;

fn align_up(
    value: usize,
    alignment: usize,
) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Free ranges of one arena, keyed by offset. Adjacent ranges are always merged.
#[derive(Debug)]
pub(super) struct FreeList {
    capacity: usize,
    free: BTreeMap<usize, usize>,
}

impl FreeList {
    pub(super) fn new(capacity: usize) -> Self {
        let mut free = BTreeMap::new();
        if capacity > 0 {
            free.insert(0, capacity);
        }
        Self {
            capacity,
            free,
        }
    }

    pub(super) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(super) fn available(&self) -> usize {
        self.free.values().sum()
    }

    pub(super) fn largest_block(&self) -> usize {
        self.free.values().copied().max().unwrap_or(0)
    }

    /// Places `size` bytes at an `alignment`-aligned offset in the smallest range that fits.
    pub(super) fn allocate(
        &mut self,
        size: usize,
        alignment: usize,
    ) -> Option<usize> {
        let (block_offset, block_size, start) = self
            .free
            .iter()
            .filter_map(|(&offset, &block_size)| {
                let start = align_up(offset, alignment);
                (start + size <= offset + block_size).then_some((offset, block_size, start))
            })
            .min_by_key(|&(offset, block_size, _)| (block_size, offset))?;

        self.free.remove(&block_offset);
        if start > block_offset {
            self.free.insert(block_offset, start - block_offset);
        }
        let end = start + size;
        let block_end = block_offset + block_size;
        if block_end > end {
            self.free.insert(end, block_end - end);
        }
        Some(start)
    }

    pub(super) fn release(
        &mut self,
        offset: usize,
        size: usize,
    ) {
        let mut start = offset;
        let mut end = offset + size;

        if let Some((&previous, &previous_size)) = self.free.range(..offset).next_back() {
            if previous + previous_size == offset {
                self.free.remove(&previous);
                start = previous;
            }
        }
        if let Some(&next_size) = self.free.get(&end) {
            self.free.remove(&end);
            end += next_size;
        }
        self.free.insert(start, end - start);
    }

    /// Whether `[offset, offset + size)` is entirely in use.
    pub(super) fn is_allocated(
        &self,
        offset: usize,
        size: usize,
    ) -> bool {
        if offset + size > self.capacity {
            return false;
        }
        let overlaps_previous = self
            .free
            .range(..=offset)
            .next_back()
            .is_some_and(|(&free_offset, &free_size)| free_offset + free_size > offset);
        let overlaps_next = self.free.range(offset..offset + size).next().is_some();
        !overlaps_previous && !overlaps_next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_fit_prefers_the_smallest_hole() {
        let mut list = FreeList::new(4096);
        let a = list.allocate(1024, 256).unwrap();
        let b = list.allocate(512, 256).unwrap();
        let c = list.allocate(1024, 256).unwrap();
        let _d = list.allocate(256, 256).unwrap();
        list.release(a, 1024);
        list.release(c, 1024);
        // Holes: [0, 1024) and [1536, 2560) plus the tail; a 512-byte request should not split the tail.
        let e = list.allocate(512, 256).unwrap();
        assert!(e == 0 || e == 1536);
        assert_eq!(b, 1024);
    }

    #[test]
    fn release_coalesces_neighbours() {
        let mut list = FreeList::new(3072);
        let a = list.allocate(1024, 256).unwrap();
        let b = list.allocate(1024, 256).unwrap();
        let c = list.allocate(1024, 256).unwrap();
        assert_eq!(list.available(), 0);
        list.release(a, 1024);
        list.release(c, 1024);
        assert_eq!(list.largest_block(), 1024);
        list.release(b, 1024);
        assert_eq!(list.largest_block(), 3072);
        assert_eq!(list.allocate(3072, 256), Some(0));
    }

    #[test]
    fn aligned_placement_keeps_the_padding_free() {
        let mut list = FreeList::new(8192);
        assert_eq!(list.allocate(256, 256), Some(0));
        assert_eq!(list.allocate(256, 4096), Some(4096));
        assert_eq!(list.available(), 8192 - 512);
        assert!(list.is_allocated(4096, 256));
        assert!(!list.is_allocated(256, 256));
    }
}
