//! A single reserved block in an arena chain.

use std::ptr::NonNull;

use loam_core::MemoryBackend;

/// One contiguous virtual address reservation owned by an arena.
///
/// A block tracks how much of its reservation has physical backing
/// (`committed`) and where the bump cursor stands (`pos`, measured from
/// the block's own base, header included). Blocks never shrink their
/// commit watermark during their lifetime; they are released whole when
/// the chain is popped past them or the arena is dropped.
pub(crate) struct Block {
    base: NonNull<u8>,
    /// Logical byte offset of this block's start within the chained
    /// address space (sum of all previous blocks' reservations).
    base_offset: u64,
    /// Next free byte offset within this block, from `base`.
    pos: u64,
    committed: u64,
    reserved: u64,
    /// Caller-owned backing memory: never committed, never released.
    external: bool,
}

impl Block {
    pub(crate) fn new(
        base: NonNull<u8>,
        base_offset: u64,
        reserved: u64,
        committed: u64,
        pos: u64,
    ) -> Self {
        debug_assert!(committed <= reserved);
        debug_assert!(pos <= committed);
        Self {
            base,
            base_offset,
            pos,
            committed,
            reserved,
            external: false,
        }
    }

    /// A block over caller-owned memory. The whole range counts as
    /// committed; the commit path is never taken and drop never releases.
    pub(crate) fn external(base: NonNull<u8>, len: u64, pos: u64) -> Self {
        debug_assert!(pos <= len);
        Self {
            base,
            base_offset: 0,
            pos,
            committed: len,
            reserved: len,
            external: true,
        }
    }

    pub(crate) fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub(crate) fn pos(&self) -> u64 {
        self.pos
    }

    pub(crate) fn set_pos(&mut self, pos: u64) {
        debug_assert!(pos <= self.committed);
        self.pos = pos;
    }

    pub(crate) fn committed(&self) -> u64 {
        self.committed
    }

    pub(crate) fn reserved(&self) -> u64 {
        self.reserved
    }

    pub(crate) fn is_external(&self) -> bool {
        self.external
    }

    /// Pointer `offset` bytes past the block base.
    pub(crate) fn ptr_at(&self, offset: u64) -> NonNull<u8> {
        debug_assert!(offset <= self.reserved);
        // SAFETY: offset stays within this block's reservation, so the
        // resulting address is in bounds of the same allocated object and
        // cannot be null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset as usize)) }
    }

    /// Grow the commit watermark so that at least `end` bytes are backed,
    /// rounding up to `granularity` and clamping at the reservation.
    ///
    /// Returns whether `end` is backed afterwards. On a backend commit
    /// failure the watermark is left unchanged, so a later call retries
    /// from a consistent state.
    pub(crate) fn commit_to(
        &mut self,
        end: u64,
        granularity: u64,
        large: bool,
        backend: &dyn MemoryBackend,
    ) -> bool {
        if end <= self.committed {
            return true;
        }
        if end > self.reserved {
            return false;
        }
        let target = end
            .checked_next_multiple_of(granularity)
            .unwrap_or(self.reserved)
            .min(self.reserved);
        let delta = target - self.committed;
        let ptr = self.ptr_at(self.committed);
        let ok = if large {
            backend.commit_large(ptr, delta)
        } else {
            backend.commit(ptr, delta)
        };
        if ok {
            self.committed = target;
        }
        self.committed >= end
    }

    /// Return this block's reservation to the backend. External blocks
    /// are caller-owned and are left alone.
    pub(crate) fn release(self, backend: &dyn MemoryBackend) {
        if !self.external {
            backend.release(self.base, self.reserved);
        }
    }
}

#[cfg(test)]
mod tests {
    use loam_core::MemoryBackend;
    use loam_test_utils::MockMemory;

    use super::*;

    fn reserve_block(backend: &MockMemory, reserved: u64, committed: u64) -> Block {
        let base = backend.reserve(reserved).unwrap();
        assert!(backend.commit(base, committed));
        Block::new(base, 0, reserved, committed, committed)
    }

    #[test]
    fn commit_to_rounds_to_granularity() {
        let backend = MockMemory::new();
        let mut block = reserve_block(&backend, 64 * 1024, 4096);

        assert!(block.commit_to(5000, 4096, false, &backend));
        assert_eq!(block.committed(), 8192);
    }

    #[test]
    fn commit_to_clamps_at_reservation() {
        let backend = MockMemory::new();
        let mut block = reserve_block(&backend, 10_000, 4096);

        // 8192..12288 would round past the reservation; clamp to 10_000.
        assert!(block.commit_to(9000, 4096, false, &backend));
        assert_eq!(block.committed(), 10_000);
    }

    #[test]
    fn commit_past_reservation_fails_without_commit_call() {
        let backend = MockMemory::new();
        let mut block = reserve_block(&backend, 8192, 4096);
        let calls_before = backend.commit_calls();

        assert!(!block.commit_to(8193, 4096, false, &backend));
        assert_eq!(block.committed(), 4096);
        assert_eq!(backend.commit_calls(), calls_before);
    }

    #[test]
    fn failed_commit_keeps_watermark() {
        let backend = MockMemory::new();
        let mut block = reserve_block(&backend, 64 * 1024, 4096);

        backend.fail_next_commits(1);
        assert!(!block.commit_to(10_000, 4096, false, &backend));
        assert_eq!(block.committed(), 4096);

        // Next attempt retries from the same watermark and succeeds.
        assert!(block.commit_to(10_000, 4096, false, &backend));
        assert_eq!(block.committed(), 12_288);
    }

    #[test]
    fn release_returns_reservation() {
        let backend = MockMemory::new();
        let block = reserve_block(&backend, 8192, 4096);
        assert_eq!(backend.outstanding_reservations(), 1);
        block.release(&backend);
        assert_eq!(backend.outstanding_reservations(), 0);
    }
}
