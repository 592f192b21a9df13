//! Cross-block integration tests: chaining, leak accounting, and
//! property coverage, all driven through the public API with the mock
//! backend counting reservations.

use std::sync::Arc;

use proptest::prelude::*;

use loam_arena::{Arena, ArenaParams, HEADER_SIZE};
use loam_test_utils::MockMemory;

/// Tiny blocks force chaining after a few small pushes.
fn tiny_arena() -> (Arena, Arc<MockMemory>) {
    let backend = Arc::new(MockMemory::new());
    let arena =
        Arena::new(ArenaParams::with_sizes(4096, 4096), backend.clone()).expect("arena creation");
    (arena, backend)
}

#[test]
fn chained_allocations_are_writable_and_do_not_overlap() {
    let (mut arena, _backend) = tiny_arena();

    // Write a distinct pattern into every allocation, then verify all of
    // them afterwards; any overlap or block-straddling bug shows up as a
    // clobbered pattern.
    let sizes = [600u64, 1200, 3000, 64, 4500, 900, 2048, 2048, 10];
    let mut allocations = Vec::new();
    for (i, &size) in sizes.iter().enumerate() {
        let ptr = arena.push(size, 8, false).expect("push");
        let byte = 0x10 + i as u8;
        // SAFETY: push returned `size` committed bytes exclusive to this
        // allocation; the arena is not rewound while we hold the pointer.
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), byte, size as usize);
        }
        allocations.push((ptr, size, byte));
    }

    assert!(arena.block_count() > 1, "test must actually chain");

    for (ptr, size, byte) in allocations {
        // SAFETY: no pop/clear has run; every range is still live.
        let data = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size as usize) };
        assert!(
            data.iter().all(|&b| b == byte),
            "pattern {byte:#x} clobbered"
        );
    }
}

#[test]
fn dropping_a_long_chain_releases_every_reservation() {
    let (mut arena, backend) = tiny_arena();
    for _ in 0..50 {
        arena.push(2048, 8, true).expect("push");
    }
    assert!(backend.outstanding_reservations() > 10);

    drop(arena);
    assert_eq!(backend.outstanding_reservations(), 0);
    assert_eq!(backend.committed_bytes(), 0);
}

#[test]
fn pop_to_mid_chain_releases_only_trailing_blocks() {
    let (mut arena, backend) = tiny_arena();
    arena.push(2000, 8, false).expect("push");
    arena.push(2000, 8, false).expect("push");
    let mid = arena.position();
    assert_eq!(arena.block_count(), 2);

    arena.push(2000, 8, false).expect("push");
    assert_eq!(arena.block_count(), 3);

    arena.pop_to(mid);
    assert_eq!(arena.position(), mid);
    assert_eq!(arena.block_count(), 2);
    assert_eq!(backend.outstanding_reservations(), 2);
}

#[test]
fn oversized_request_is_satisfied_by_an_exact_fit_block() {
    let (mut arena, backend) = tiny_arena();
    let ptr = arena.push(100_000, 32, true).expect("push");

    // SAFETY: push returned 100_000 committed, zeroed bytes.
    let data = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), 100_000) };
    assert!(data.iter().all(|&b| b == 0));
    assert_eq!(ptr.as_ptr() as usize % 32, 0);
    assert_eq!(backend.outstanding_reservations(), 2);
    assert!(arena.reserved_bytes() >= 100_000 + HEADER_SIZE + 4096);
}

proptest! {
    #[test]
    fn pushes_stay_aligned_and_monotone(
        ops in prop::collection::vec((1u64..5000, 0u32..7), 1..40),
    ) {
        let (mut arena, _backend) = tiny_arena();
        for (size, shift) in ops {
            let align = 1u64 << shift;
            let before = arena.position();
            let ptr = arena.push(size, align, false).unwrap();
            let after = arena.position();

            prop_assert_eq!(ptr.as_ptr() as usize % align as usize, 0);
            // The returned range is [after - size, after): it never
            // reaches below any earlier position.
            prop_assert!(after - size >= before);
        }
    }

    #[test]
    fn zeroed_pushes_always_read_zero(
        sizes in prop::collection::vec(1u64..9000, 1..20),
    ) {
        let (mut arena, _backend) = tiny_arena();
        for size in sizes {
            let ptr = arena.push(size, 8, true).unwrap();
            // SAFETY: push returned `size` committed bytes.
            let data = unsafe {
                std::slice::from_raw_parts_mut(ptr.as_ptr(), size as usize)
            };
            prop_assert!(data.iter().all(|&b| b == 0));
            // Dirty the range so stale-data reuse would be caught on a
            // later iteration after pops below.
            data.fill(0xEE);
            if size % 3 == 0 {
                arena.pop(size);
            }
        }
    }

    #[test]
    fn temp_scopes_restore_across_arbitrary_bursts(
        burst in prop::collection::vec(1u64..6000, 1..25),
        prefix in 0u64..2000,
    ) {
        let (mut arena, backend) = tiny_arena();
        arena.push(prefix, 8, false).unwrap();

        let blocks_before = arena.block_count();
        let reservations_before = backend.outstanding_reservations();
        let scope = arena.begin_temp();
        for size in burst {
            arena.push(size, 8, false).unwrap();
        }
        arena.end_temp(scope);

        prop_assert_eq!(arena.position(), scope.position());
        prop_assert_eq!(arena.block_count(), blocks_before);
        prop_assert_eq!(backend.outstanding_reservations(), reservations_before);
    }
}
