/// Inclusive range of free IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IdRange {
    first: u32,
    last: u32,
}

impl IdRange {
    fn len(&self) -> u32 {
        self.last - self.first + 1
    }
}

/// Allocator for compact 16-bit resource IDs.
///
/// Free IDs are kept as a sorted array of disjoint inclusive ranges. Every
/// mutation re-establishes the sorted-and-disjoint invariant, so lookups are
/// binary searches and adjacent frees coalesce into a single range.
///
/// Exhaustion and double-frees are value-level failures (`None` / `false`),
/// never panics.
pub struct IdAllocator {
    free: Vec<IdRange>,
    max_id: u16,
}

impl IdAllocator {
    /// All IDs in `0..=max_id` start out free.
    pub fn new(max_id: u16) -> Self {
        Self {
            free: vec![IdRange {
                first: 0,
                last: max_id as u32,
            }],
            max_id,
        }
    }

    /// Hands out the smallest available ID, or `None` when exhausted.
    pub fn create_id(&mut self) -> Option<u16> {
        let range = self.free.first_mut()?;
        let id = range.first;
        if range.first == range.last {
            self.free.remove(0);
        } else {
            range.first += 1;
        }
        Some(id as u16)
    }

    /// Reserves `count` contiguous IDs and returns the first, or fails with
    /// no side effects. The reservation is all-or-nothing.
    pub fn create_range_id(&mut self, count: u16) -> Option<u16> {
        if count == 0 {
            return None;
        }
        let need = count as u32;
        let idx = self.free.iter().position(|r| r.len() >= need)?;
        let range = &mut self.free[idx];
        let id = range.first;
        if range.len() == need {
            self.free.remove(idx);
        } else {
            range.first += need;
        }
        Some(id as u16)
    }

    /// Returns a single ID to the pool. `false` if the ID was out of bounds
    /// or not live.
    pub fn destroy_id(&mut self, id: u16) -> bool {
        self.destroy_range_id(id, 1)
    }

    /// Returns `count` contiguous IDs starting at `id` to the pool,
    /// coalescing with adjacent free ranges. Fails without side effects if
    /// any ID in the span is out of bounds or already free.
    pub fn destroy_range_id(&mut self, id: u16, count: u16) -> bool {
        if count == 0 {
            return false;
        }
        let first = id as u32;
        let last = first + count as u32 - 1;
        if last > self.max_id as u32 {
            return false;
        }

        let idx = self.free.partition_point(|r| r.last < first);
        if idx < self.free.len() && self.free[idx].first <= last {
            // Some ID in the span is already free.
            return false;
        }

        let merge_left = idx > 0 && self.free[idx - 1].last + 1 == first;
        let merge_right = idx < self.free.len() && last + 1 == self.free[idx].first;
        match (merge_left, merge_right) {
            (true, true) => {
                self.free[idx - 1].last = self.free[idx].last;
                self.free.remove(idx);
            }
            (true, false) => self.free[idx - 1].last = last,
            (false, true) => self.free[idx].first = first,
            (false, false) => self.free.insert(idx, IdRange { first, last }),
        }
        true
    }

    /// Liveness test: `true` while the ID is allocated.
    pub fn is_id(&self, id: u16) -> bool {
        if id > self.max_id {
            return false;
        }
        let id = id as u32;
        let idx = self.free.partition_point(|r| r.last < id);
        !(idx < self.free.len() && self.free[idx].first <= id)
    }

    /// Number of IDs still available.
    pub fn available_ids(&self) -> u32 {
        self.free.iter().map(IdRange::len).sum()
    }

    /// Length of the largest contiguous run of free IDs.
    pub fn largest_continuous_range(&self) -> u32 {
        self.free.iter().map(IdRange::len).max().unwrap_or(0)
    }

    pub fn max_id(&self) -> u16 {
        self.max_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_come_out_smallest_first() {
        let mut alloc = IdAllocator::new(7);
        for expected in 0..=7u16 {
            assert_eq!(alloc.create_id(), Some(expected));
        }
        assert_eq!(alloc.create_id(), None);
    }

    #[test]
    fn destroyed_id_is_recycled() {
        let mut alloc = IdAllocator::new(3);
        let a = alloc.create_id().unwrap();
        let _b = alloc.create_id().unwrap();
        assert!(alloc.is_id(a));
        assert!(alloc.destroy_id(a));
        assert!(!alloc.is_id(a));
        // Smallest-first means the freed slot is handed back out.
        assert_eq!(alloc.create_id(), Some(a));
    }

    #[test]
    fn double_free_is_rejected() {
        let mut alloc = IdAllocator::new(3);
        let a = alloc.create_id().unwrap();
        assert!(alloc.destroy_id(a));
        assert!(!alloc.destroy_id(a));
        assert_eq!(alloc.available_ids(), 4);
    }

    #[test]
    fn range_reservation_is_contiguous() {
        let mut alloc = IdAllocator::new(15);
        let base = alloc.create_range_id(4).unwrap();
        for i in 0..4 {
            assert!(alloc.is_id(base + i));
        }
        assert_eq!(alloc.available_ids(), 12);
        assert!(alloc.destroy_range_id(base, 4));
        assert_eq!(alloc.available_ids(), 16);
    }

    #[test]
    fn failed_range_reservation_has_no_side_effects() {
        let mut alloc = IdAllocator::new(9);
        // Fragment the space: take everything, free every other ID.
        while alloc.create_id().is_some() {}
        for id in (0..=9u16).step_by(2) {
            assert!(alloc.destroy_id(id));
        }
        let available = alloc.available_ids();
        let largest = alloc.largest_continuous_range();
        assert_eq!(largest, 1);
        assert_eq!(alloc.create_range_id(2), None);
        assert_eq!(alloc.available_ids(), available);
        assert_eq!(alloc.largest_continuous_range(), largest);
    }

    #[test]
    fn adjacent_frees_coalesce() {
        let mut alloc = IdAllocator::new(9);
        while alloc.create_id().is_some() {}
        assert!(alloc.destroy_id(4));
        assert_eq!(alloc.largest_continuous_range(), 1);
        assert!(alloc.destroy_id(6));
        assert_eq!(alloc.largest_continuous_range(), 1);
        // Freeing the ID between two free neighbours merges all three.
        assert!(alloc.destroy_id(5));
        assert_eq!(alloc.largest_continuous_range(), 3);
        assert!(alloc.create_range_id(3).is_some());
    }

    #[test]
    fn partial_range_free_is_atomic() {
        let mut alloc = IdAllocator::new(9);
        while alloc.create_id().is_some() {}
        assert!(alloc.destroy_id(2));
        // 1..=3 overlaps the already-free 2, so nothing may change.
        assert!(!alloc.destroy_range_id(1, 3));
        assert!(alloc.is_id(1));
        assert!(alloc.is_id(3));
        assert_eq!(alloc.available_ids(), 1);
    }

    #[test]
    fn out_of_bounds_ids_are_rejected() {
        let mut alloc = IdAllocator::new(3);
        assert!(!alloc.destroy_id(4));
        assert!(!alloc.is_id(4));
        assert!(!alloc.destroy_range_id(2, 3));
    }
}
