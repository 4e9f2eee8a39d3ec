use nori::IdAllocator;

#[test]
fn live_ids_stay_within_bounds_and_never_alias() {
    let mut alloc = IdAllocator::new(31);
    let mut live = std::collections::HashSet::new();
    for _ in 0..=31 {
        let id = alloc.create_id().unwrap();
        assert!(id <= 31);
        // No ID is handed out twice while still live.
        assert!(live.insert(id));
    }
    assert_eq!(alloc.create_id(), None);

    // Interleave frees and re-allocations; the invariant holds throughout.
    for id in [3u16, 17, 30] {
        assert!(alloc.destroy_id(id));
        live.remove(&id);
    }
    for _ in 0..3 {
        let id = alloc.create_id().unwrap();
        assert!(live.insert(id));
    }
    assert_eq!(alloc.create_id(), None);
}

#[test]
fn destroy_increases_available_by_exactly_one() {
    let mut alloc = IdAllocator::new(15);
    while alloc.create_id().is_some() {}
    let mut expected = 0;
    for id in 0..=15u16 {
        assert_eq!(alloc.available_ids(), expected);
        assert!(alloc.destroy_id(id));
        expected += 1;
    }
    assert_eq!(alloc.available_ids(), 16);
}

#[test]
fn largest_range_is_monotonic_while_freeing_neighbours() {
    let mut alloc = IdAllocator::new(63);
    while alloc.create_id().is_some() {}
    let mut previous = 0;
    // Free a contiguous block one ID at a time; the largest continuous
    // range never shrinks.
    for id in 8..24u16 {
        assert!(alloc.destroy_id(id));
        let largest = alloc.largest_continuous_range();
        assert!(largest >= previous);
        previous = largest;
    }
    assert_eq!(previous, 16);
}

#[test]
fn range_reservation_is_all_or_nothing() {
    let mut alloc = IdAllocator::new(15);
    let base = alloc.create_range_id(8).unwrap();
    assert_eq!(base, 0);
    assert_eq!(alloc.available_ids(), 8);

    // Nothing left that is 9 wide: the call must not disturb state.
    let before = alloc.available_ids();
    assert_eq!(alloc.create_range_id(9), None);
    assert_eq!(alloc.available_ids(), before);

    let second = alloc.create_range_id(8).unwrap();
    assert_eq!(second, 8);
    assert_eq!(alloc.available_ids(), 0);

    assert!(alloc.destroy_range_id(base, 8));
    assert!(alloc.destroy_range_id(second, 8));
    assert_eq!(alloc.available_ids(), 16);
    assert_eq!(alloc.largest_continuous_range(), 16);
}

#[test]
fn is_id_tracks_liveness_through_reuse() {
    let mut alloc = IdAllocator::new(7);
    let a = alloc.create_id().unwrap();
    assert!(alloc.is_id(a));
    assert!(alloc.destroy_id(a));
    assert!(!alloc.is_id(a));
    // The recycled slot is live again after re-allocation.
    let b = alloc.create_id().unwrap();
    assert_eq!(a, b);
    assert!(alloc.is_id(b));
}
