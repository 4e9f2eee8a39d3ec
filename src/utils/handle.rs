use std::hash::Hash;
use std::marker::PhantomData;

use bytemuck::{Pod, Zeroable};

use super::id_allocator::IdAllocator;

/// Typed handle to a pooled resource: a 16-bit slot plus a 16-bit generation.
///
/// The generation guards against use-after-free. A handle whose slot was
/// recycled no longer resolves because the pool bumped the slot's generation.
#[repr(C)]
#[derive(Debug)]
pub struct Handle<T> {
    pub slot: u16,
    pub generation: u16,
    phantom: PhantomData<T>,
}

impl<T> Handle<T> {
    pub fn new(slot: u16, generation: u16) -> Self {
        Self {
            slot,
            generation,
            phantom: PhantomData,
        }
    }

    /// Sentinel that never resolves in any pool.
    pub const INVALID: Self = Self {
        slot: u16::MAX,
        generation: u16::MAX,
        phantom: PhantomData,
    };

    pub fn is_valid(&self) -> bool {
        self.slot != u16::MAX || self.generation != u16::MAX
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::INVALID
    }
}

// Handle is four bytes of plain data; PhantomData occupies no storage. The
// manual impls keep `T: Pod` from leaking into every payload bound.
unsafe impl<T: 'static> Zeroable for Handle<T> {}
unsafe impl<T: 'static> Pod for Handle<T> {}

/// Re-types a handle between a public marker category and a backend's
/// payload type. Slot and generation carry over unchanged.
pub(crate) fn retype<A, B>(handle: Handle<A>) -> Handle<B> {
    Handle::new(handle.slot, handle.generation)
}

struct Entry<T> {
    item: T,
    refs: u32,
}

/// Outcome of a [`Pool::release`] call.
pub enum Release<T> {
    /// Other owners remain; the post-decrement count is reported.
    Alive(u32),
    /// The last reference was dropped. The payload is handed back so the
    /// caller can tear down native objects exactly once.
    Destroyed(T),
}

/// Slot pool with intrusive reference counting.
///
/// Slot numbers come from an [`IdAllocator`], so an ID is never handed out
/// twice while live and destroyed slots are recycled smallest-first. Inserting
/// takes the first reference; [`Pool::release`] drops one and evicts the entry
/// when the count reaches zero.
pub struct Pool<T> {
    items: Vec<Option<Entry<T>>>,
    generations: Vec<u16>,
    ids: IdAllocator,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl<T> Pool<T> {
    /// Pool holding at most `capacity` live entries. Capped below `u16::MAX`
    /// so the invalid-handle sentinel never aliases a slot.
    pub fn new(capacity: u16) -> Self {
        let capacity = capacity.clamp(1, u16::MAX - 1);
        let mut items = Vec::with_capacity(capacity as usize);
        items.resize_with(capacity as usize, || None);
        Self {
            items,
            generations: vec![0; capacity as usize],
            ids: IdAllocator::new(capacity - 1),
        }
    }

    /// Whether the next insert would fail. Backends check this before
    /// allocating native objects whose ownership would move into the entry.
    pub fn is_full(&self) -> bool {
        self.ids.available_ids() == 0
    }

    /// Inserts with a reference count of one. `None` when the pool is full.
    pub fn insert(&mut self, item: T) -> Option<Handle<T>> {
        let slot = self.ids.create_id()?;
        self.items[slot as usize] = Some(Entry { item, refs: 1 });
        Some(Handle::new(slot, self.generations[slot as usize]))
    }

    /// Takes another reference. Returns the new count, or `None` for a stale
    /// or invalid handle.
    pub fn add_ref(&mut self, handle: Handle<T>) -> Option<u32> {
        let entry = self.entry_mut(handle)?;
        entry.refs += 1;
        Some(entry.refs)
    }

    /// Drops one reference. On the last release the entry is evicted, its
    /// slot generation bumped and its ID returned to the allocator.
    pub fn release(&mut self, handle: Handle<T>) -> Option<Release<T>> {
        let slot = handle.slot as usize;
        if !self.is_live(handle) {
            return None;
        }
        let entry = self.items[slot].as_mut().unwrap();
        entry.refs -= 1;
        if entry.refs > 0 {
            return Some(Release::Alive(entry.refs));
        }
        let entry = self.items[slot].take().unwrap();
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.ids.destroy_id(handle.slot);
        Some(Release::Destroyed(entry.item))
    }

    pub fn get_ref(&self, handle: Handle<T>) -> Option<&T> {
        let slot = handle.slot as usize;
        if slot >= self.items.len() || self.generations[slot] != handle.generation {
            return None;
        }
        self.items[slot].as_ref().map(|e| &e.item)
    }

    pub fn get_mut_ref(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.entry_mut(handle).map(|e| &mut e.item)
    }

    pub fn ref_count(&self, handle: Handle<T>) -> Option<u32> {
        let slot = handle.slot as usize;
        if slot >= self.items.len() || self.generations[slot] != handle.generation {
            return None;
        }
        self.items[slot].as_ref().map(|e| e.refs)
    }

    pub fn is_live(&self, handle: Handle<T>) -> bool {
        self.get_ref(handle).is_some()
    }

    pub fn live_count(&self) -> u32 {
        self.items.len() as u32 - self.ids.available_ids()
    }

    /// Handles of every live entry, for shutdown sweeps and leak reports.
    pub fn live_handles(&self) -> Vec<Handle<T>> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_some())
            .map(|(slot, _)| Handle::new(slot as u16, self.generations[slot]))
            .collect()
    }

    /// Evicts an entry regardless of its reference count. Shutdown-only.
    pub fn evict(&mut self, handle: Handle<T>) -> Option<T> {
        if !self.is_live(handle) {
            return None;
        }
        let slot = handle.slot as usize;
        let entry = self.items[slot].take().unwrap();
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.ids.destroy_id(handle.slot);
        Some(entry.item)
    }

    fn entry_mut(&mut self, handle: Handle<T>) -> Option<&mut Entry<T>> {
        let slot = handle.slot as usize;
        if slot >= self.items.len() || self.generations[slot] != handle.generation {
            return None;
        }
        self.items[slot].as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_ref_release_pair_is_a_liveness_noop() {
        let mut pool = Pool::new(8);
        let h = pool.insert("res").unwrap();
        assert_eq!(pool.ref_count(h), Some(1));
        pool.add_ref(h).unwrap();
        assert!(matches!(pool.release(h), Some(Release::Alive(1))));
        assert_eq!(pool.ref_count(h), Some(1));
        assert!(pool.is_live(h));
    }

    #[test]
    fn last_release_destroys_and_recycles_slot() {
        let mut pool = Pool::new(8);
        let h = pool.insert(7u32).unwrap();
        assert!(matches!(pool.release(h), Some(Release::Destroyed(7))));
        assert!(!pool.is_live(h));

        // The slot is recycled with a new generation, so the old handle
        // stays dead.
        let h2 = pool.insert(9u32).unwrap();
        assert_eq!(h2.slot, h.slot);
        assert_ne!(h2.generation, h.generation);
        assert!(pool.get_ref(h).is_none());
        assert_eq!(pool.get_ref(h2), Some(&9));
    }

    #[test]
    fn stale_handles_do_not_resolve() {
        let mut pool = Pool::new(4);
        let h = pool.insert(1u8).unwrap();
        pool.release(h);
        assert!(pool.add_ref(h).is_none());
        assert!(pool.release(h).is_none());
        assert!(pool.get_ref(Handle::INVALID).is_none());
    }

    #[test]
    fn insert_fails_when_full() {
        let mut pool = Pool::new(2);
        let _a = pool.insert(0u8).unwrap();
        let _b = pool.insert(1u8).unwrap();
        assert!(pool.insert(2u8).is_none());
        assert_eq!(pool.live_count(), 2);
    }

    #[test]
    fn release_in_any_order() {
        let mut pool = Pool::new(4);
        let handles: Vec<_> = (0..4u32).map(|i| pool.insert(i).unwrap()).collect();
        for h in handles.iter().rev() {
            assert!(matches!(pool.release(*h), Some(Release::Destroyed(_))));
        }
        assert_eq!(pool.live_count(), 0);
    }
}
