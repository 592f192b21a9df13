//! Test utilities for Loam development.
//!
//! Provides [`MockMemory`], a heap-backed [`MemoryBackend`] that checks
//! the reserve/commit contract, counts outstanding reservations (so tests
//! can assert that dropping an arena leaks nothing), and injects
//! reservation/commit failures for error-path coverage.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::ptr::NonNull;
use std::sync::Mutex;

use indexmap::IndexMap;
use loam_core::{MemoryBackend, SystemInfo};

/// Mock reservations are aligned to this many bytes, so alignment
/// guarantees observed through an arena hold for any `align` up to it.
const BASE_ALIGN: usize = 4096;

struct Reservation {
    /// Backing storage, oversized by `BASE_ALIGN` so an aligned base can
    /// be carved out of it.
    buf: Box<[u8]>,
    /// Offset of the aligned base within `buf`.
    start: usize,
    size: u64,
    /// Contiguous commit watermark from the base. Commits only zero bytes
    /// above it, so recommitting a live range never wipes caller data.
    committed: u64,
}

#[derive(Default)]
struct MockState {
    reservations: IndexMap<usize, Reservation>,
    reserve_calls: u64,
    commit_calls: u64,
    large_reserve_calls: u64,
    large_commit_calls: u64,
    fail_reserves: u64,
    fail_commits: u64,
}

/// A [`MemoryBackend`] over plain heap allocations.
///
/// Behaves like the OS contract the arena relies on: reservations hand
/// out stable aligned bases, commits are idempotent and zero freshly
/// covered bytes, decommits re-zero, and releases must exactly match a
/// live reservation (anything else panics, turning contract violations
/// into test failures).
pub struct MockMemory {
    state: Mutex<MockState>,
    page_size: u64,
    large_page_size: u64,
}

impl MockMemory {
    /// A mock with a 4096-byte page size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_page_size(4096)
    }

    /// A mock with an arbitrary page size; useful for forcing chaining
    /// with tiny reservations. The large-page size is 16 pages.
    #[must_use]
    pub fn with_page_size(page_size: u64) -> Self {
        assert!(page_size > 0, "page size must be nonzero");
        Self {
            state: Mutex::new(MockState::default()),
            page_size,
            large_page_size: page_size * 16,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    /// Make the next `n` reserve calls (normal and large) fail.
    pub fn fail_next_reserves(&self, n: u64) {
        self.state().fail_reserves = n;
    }

    /// Make the next `n` commit calls (normal and large) fail.
    pub fn fail_next_commits(&self, n: u64) {
        self.state().fail_commits = n;
    }

    /// Number of reservations that have not been released.
    pub fn outstanding_reservations(&self) -> usize {
        self.state().reservations.len()
    }

    /// Total bytes across live reservations.
    pub fn reserved_bytes(&self) -> u64 {
        self.state().reservations.values().map(|r| r.size).sum()
    }

    /// Total committed bytes across live reservations.
    pub fn committed_bytes(&self) -> u64 {
        self.state().reservations.values().map(|r| r.committed).sum()
    }

    /// How many times reserve was called, successful or not, large
    /// variant included.
    pub fn reserve_calls(&self) -> u64 {
        self.state().reserve_calls
    }

    /// How many times commit was called, successful or not, large
    /// variant included.
    pub fn commit_calls(&self) -> u64 {
        self.state().commit_calls
    }

    /// How many of the reserve calls used the large-page variant.
    pub fn large_reserve_calls(&self) -> u64 {
        self.state().large_reserve_calls
    }

    /// How many of the commit calls used the large-page variant.
    pub fn large_commit_calls(&self) -> u64 {
        self.state().large_commit_calls
    }

    fn reserve_impl(&self, size: u64) -> Option<NonNull<u8>> {
        let mut state = self.state();
        state.reserve_calls += 1;
        if state.fail_reserves > 0 {
            state.fail_reserves -= 1;
            return None;
        }
        let len = usize::try_from(size).ok()?.checked_add(BASE_ALIGN)?;
        let mut buf = vec![0u8; len].into_boxed_slice();
        let addr = buf.as_mut_ptr() as usize;
        let start = addr.next_multiple_of(BASE_ALIGN) - addr;
        let base = NonNull::new(buf[start..].as_mut_ptr())?;
        state.reservations.insert(
            base.as_ptr() as usize,
            Reservation {
                buf,
                start,
                size,
                committed: 0,
            },
        );
        Some(base)
    }

    fn commit_impl(&self, ptr: NonNull<u8>, size: u64) -> bool {
        let mut state = self.state();
        state.commit_calls += 1;
        if state.fail_commits > 0 {
            state.fail_commits -= 1;
            return false;
        }
        let addr = ptr.as_ptr() as usize;
        let Some((offset, reservation)) = find_containing(&mut state.reservations, addr) else {
            panic!("commit outside any live reservation");
        };
        let end = offset + size;
        assert!(
            end <= reservation.size,
            "commit of {size} bytes at offset {offset} exceeds reservation of {} bytes",
            reservation.size,
        );
        // Zero only the bytes newly covered; idempotent recommits must
        // not wipe live data.
        if end > reservation.committed {
            let from = reservation.start + reservation.committed as usize;
            let to = reservation.start + end as usize;
            reservation.buf[from..to].fill(0);
            reservation.committed = end;
        }
        true
    }
}

fn find_containing(
    reservations: &mut IndexMap<usize, Reservation>,
    addr: usize,
) -> Option<(u64, &mut Reservation)> {
    for (&base, reservation) in reservations.iter_mut() {
        if addr >= base && (addr - base) as u64 <= reservation.size {
            return Some(((addr - base) as u64, reservation));
        }
    }
    None
}

impl Default for MockMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend for MockMemory {
    fn system_info(&self) -> SystemInfo {
        SystemInfo {
            logical_processors: 1,
            page_size: self.page_size,
            large_page_size: self.large_page_size,
            allocation_granularity: self.page_size,
        }
    }

    fn reserve(&self, size: u64) -> Option<NonNull<u8>> {
        self.reserve_impl(size)
    }

    fn commit(&self, ptr: NonNull<u8>, size: u64) -> bool {
        self.commit_impl(ptr, size)
    }

    fn decommit(&self, ptr: NonNull<u8>, size: u64) {
        let mut state = self.state();
        let addr = ptr.as_ptr() as usize;
        let Some((offset, reservation)) = find_containing(&mut state.reservations, addr) else {
            panic!("decommit outside any live reservation");
        };
        let end = (offset + size).min(reservation.size);
        let from = reservation.start + offset as usize;
        let to = reservation.start + end as usize;
        reservation.buf[from..to].fill(0);
        reservation.committed = reservation.committed.min(offset);
    }

    fn release(&self, ptr: NonNull<u8>, size: u64) {
        let mut state = self.state();
        let addr = ptr.as_ptr() as usize;
        let Some(reservation) = state.reservations.shift_remove(&addr) else {
            panic!("release of an address that is not a live reservation base");
        };
        assert_eq!(
            reservation.size, size,
            "release size does not match the reservation",
        );
    }

    fn reserve_large(&self, size: u64) -> Option<NonNull<u8>> {
        self.state().large_reserve_calls += 1;
        self.reserve_impl(size)
    }

    fn commit_large(&self, ptr: NonNull<u8>, size: u64) -> bool {
        self.state().large_commit_calls += 1;
        self.commit_impl(ptr, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_returns_aligned_base() {
        let mock = MockMemory::new();
        let base = mock.reserve(8192).unwrap();
        assert_eq!(base.as_ptr() as usize % BASE_ALIGN, 0);
        mock.release(base, 8192);
    }

    #[test]
    fn commit_zeroes_fresh_bytes_only_once() {
        let mock = MockMemory::new();
        let base = mock.reserve(8192).unwrap();
        assert!(mock.commit(base, 4096));

        // Write through the committed range, then recommit it: data must
        // survive because the watermark already covers it.
        let addr = base.as_ptr() as usize;
        {
            let mut state = mock.state();
            let (offset, reservation) = find_containing(&mut state.reservations, addr).unwrap();
            assert_eq!(offset, 0);
            reservation.buf[reservation.start] = 0x5A;
        }
        assert!(mock.commit(base, 4096));
        {
            let mut state = mock.state();
            let (_, reservation) = find_containing(&mut state.reservations, addr).unwrap();
            assert_eq!(reservation.buf[reservation.start], 0x5A);
        }
        mock.release(base, 8192);
    }

    #[test]
    fn decommit_rezeros_and_rewinds_watermark() {
        let mock = MockMemory::new();
        let base = mock.reserve(8192).unwrap();
        assert!(mock.commit(base, 8192));
        let addr = base.as_ptr() as usize;
        {
            let mut state = mock.state();
            let (_, reservation) = find_containing(&mut state.reservations, addr).unwrap();
            reservation.buf[reservation.start + 5000] = 0xFF;
        }
        mock.decommit(base, 8192);
        assert_eq!(mock.committed_bytes(), 0);
        {
            let mut state = mock.state();
            let (_, reservation) = find_containing(&mut state.reservations, addr).unwrap();
            assert_eq!(reservation.buf[reservation.start + 5000], 0);
        }
        mock.release(base, 8192);
    }

    #[test]
    fn failure_injection_is_consumed() {
        let mock = MockMemory::new();
        mock.fail_next_reserves(1);
        assert!(mock.reserve(4096).is_none());
        let base = mock.reserve(4096).unwrap();

        mock.fail_next_commits(2);
        assert!(!mock.commit(base, 4096));
        assert!(!mock.commit(base, 4096));
        assert!(mock.commit(base, 4096));
        mock.release(base, 4096);
    }

    #[test]
    #[should_panic(expected = "not a live reservation base")]
    fn release_of_unknown_address_panics() {
        let mock = MockMemory::new();
        let base = mock.reserve(4096).unwrap();
        let inner = NonNull::new(offset_addr(base, 16)).unwrap();
        mock.release(inner, 4096);
    }

    // Pointer arithmetic without unsafe: recompute the address as an int.
    fn offset_addr(base: NonNull<u8>, offset: usize) -> *mut u8 {
        (base.as_ptr() as usize + offset) as *mut u8
    }

    #[test]
    fn counters_track_calls_and_outstanding() {
        let mock = MockMemory::new();
        let a = mock.reserve(4096).unwrap();
        let b = mock.reserve(8192).unwrap();
        assert!(mock.commit(a, 4096));
        assert_eq!(mock.outstanding_reservations(), 2);
        assert_eq!(mock.reserved_bytes(), 12_288);
        assert_eq!(mock.committed_bytes(), 4096);
        assert_eq!(mock.reserve_calls(), 2);
        assert_eq!(mock.commit_calls(), 1);

        mock.release(a, 4096);
        mock.release(b, 8192);
        assert_eq!(mock.outstanding_reservations(), 0);
    }

    #[test]
    fn large_variants_share_the_table_but_count_separately() {
        let mock = MockMemory::new();
        let base = mock.reserve_large(65_536).unwrap();
        assert!(mock.commit_large(base, 4096));
        assert_eq!(mock.large_reserve_calls(), 1);
        assert_eq!(mock.large_commit_calls(), 1);
        assert_eq!(mock.outstanding_reservations(), 1);
        mock.release(base, 65_536);
    }
}
