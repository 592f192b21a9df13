//! The arena allocator: chained blocks, bump allocation, positional
//! reclamation.

use std::fmt;
use std::mem;
use std::ptr::NonNull;
use std::slice;
use std::sync::Arc;

use bytemuck::Zeroable;
use smallvec::SmallVec;

use loam_core::{checked_align_up, AllocSite, MemoryBackend, SystemInfo};

use crate::block::Block;
use crate::config::{ArenaFlags, ArenaParams};
use crate::error::ArenaError;

/// Bytes reserved at the front of every block, never handed to callers.
///
/// The original region layout stored the allocator's own bookkeeping in
/// this prefix; here the bookkeeping lives in the [`Arena`] handle and the
/// prefix survives as a layout constant, so positions and rewind targets
/// are stable and a freshly created arena reports
/// [`position()`](Arena::position) `== HEADER_SIZE`.
pub const HEADER_SIZE: u64 = 128;

/// A region allocator over reserved-then-committed virtual memory.
///
/// Allocation is monotonic bump allocation: [`push`](Arena::push) aligns
/// the cursor, commits more of the reservation on demand, and chains a
/// fresh block when the reservation runs out (unless
/// [`no_chain`](ArenaFlags::no_chain) is set). Reclamation is positional:
/// [`pop_to`](Arena::pop_to) rewinds the cursor and releases any blocks
/// created entirely after the target. Dropping the arena releases every
/// block it owns.
///
/// An arena has one logical owner; all mutating operations take
/// `&mut self` and instances are `Send` but not `Sync`. Use one arena per
/// worker rather than sharing.
pub struct Arena {
    backend: Arc<dyn MemoryBackend>,
    /// Block chain; the last element is the current block. Never empty.
    blocks: SmallVec<[Block; 2]>,
    flags: ArenaFlags,
    /// Page-rounded address-space reservation for chained default blocks.
    reserve_size: u64,
    /// Page-rounded commit growth increment.
    commit_size: u64,
    site: AllocSite,
}

// SAFETY: an arena exclusively owns its blocks' reservations, and every
// operation that touches them requires `&mut Arena`; moving the arena to
// another thread moves sole access with it.
unsafe impl Send for Arena {}

impl Arena {
    /// Create an arena backed by `backend`'s virtual memory.
    ///
    /// `params.reserve_size` and `params.commit_size` are rounded up to
    /// the backend's page size (large-page size when
    /// [`large_pages`](ArenaFlags::large_pages) is set), the range is
    /// reserved, and the initial commit is made. The allocation site of
    /// the caller is captured for diagnostics.
    ///
    /// # Errors
    ///
    /// [`ArenaError::InvalidConfig`] for zero sizes or a commit increment
    /// too small to hold the block header; [`ArenaError::ReserveFailed`]
    /// or [`ArenaError::CommitFailed`] when the backend cannot provide
    /// the initial block.
    #[track_caller]
    pub fn new(params: ArenaParams, backend: Arc<dyn MemoryBackend>) -> Result<Self, ArenaError> {
        let site = AllocSite::caller();
        if params.reserve_size == 0 || params.commit_size == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "reserve_size and commit_size must be nonzero".into(),
            });
        }
        let info = backend.system_info();
        let page = page_granularity(&info, params.flags);
        if page == 0 {
            return Err(ArenaError::InvalidConfig {
                reason: "backend reports a zero page size".into(),
            });
        }
        let reserve_size = params
            .reserve_size
            .checked_next_multiple_of(page)
            .ok_or_else(|| ArenaError::InvalidConfig {
                reason: format!(
                    "reserve_size {} overflows when rounded to the {page}-byte page",
                    params.reserve_size
                ),
            })?;
        let commit_size = params
            .commit_size
            .checked_next_multiple_of(page)
            .unwrap_or(reserve_size)
            .min(reserve_size);
        if commit_size < HEADER_SIZE {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "initial commit of {commit_size} bytes cannot hold the \
                     {HEADER_SIZE}-byte block header"
                ),
            });
        }

        let block = make_block(
            backend.as_ref(),
            params.flags.large_pages,
            reserve_size,
            commit_size,
            0,
            site,
        )?;
        let mut blocks = SmallVec::new();
        blocks.push(block);
        Ok(Self {
            backend,
            blocks,
            flags: params.flags,
            reserve_size,
            commit_size,
            site,
        })
    }

    /// Create an arena over caller-owned memory.
    ///
    /// The arena allocates from `base..base + len` directly: no OS
    /// mapping is made, the block never chains, and dropping the arena
    /// does not free the memory. `len` must be at least [`HEADER_SIZE`].
    ///
    /// # Safety
    ///
    /// `base` must point to `len` bytes of writable memory exclusively
    /// owned by the caller, outliving the arena, and aligned at least as
    /// strictly as the largest alignment that will be requested from it.
    #[track_caller]
    pub unsafe fn with_memory_block(base: NonNull<u8>, len: u64) -> Result<Self, ArenaError> {
        if len < HEADER_SIZE {
            return Err(ArenaError::InvalidConfig {
                reason: format!(
                    "backing buffer of {len} bytes cannot hold the \
                     {HEADER_SIZE}-byte block header"
                ),
            });
        }
        let mut blocks = SmallVec::new();
        blocks.push(Block::external(base, len, HEADER_SIZE));
        Ok(Self {
            backend: Arc::new(NullMemory),
            blocks,
            flags: ArenaFlags {
                no_chain: true,
                large_pages: false,
            },
            reserve_size: len,
            commit_size: len,
            site: AllocSite::caller(),
        })
    }

    /// Allocate `size` bytes at the given alignment.
    ///
    /// The returned pointer is valid until a
    /// [`pop_to`](Self::pop_to)/[`clear`](Self::clear) rewinds past it or
    /// the arena is dropped. When `zero` is set, every byte of the
    /// returned range reads as zero. Padding introduced by alignment is
    /// never reused by a later allocation.
    ///
    /// # Errors
    ///
    /// [`ArenaError::CapacityExceeded`] when the request cannot fit and
    /// chaining is disabled; [`ArenaError::ReserveFailed`] /
    /// [`ArenaError::CommitFailed`] when the backend cannot grow the
    /// arena. A failed call leaves the arena exactly as it was.
    ///
    /// # Panics
    ///
    /// Panics if `align` is not a power of two.
    pub fn push(&mut self, size: u64, align: u64, zero: bool) -> Result<NonNull<u8>, ArenaError> {
        assert!(align.is_power_of_two(), "push alignment must be a power of two");

        let (mut pos_pre, mut pos_post) = cursor_range(self.current(), size, align)
            .ok_or_else(|| self.capacity_error(size))?;

        if pos_post > self.current().reserved() {
            if self.flags.no_chain || self.current().is_external() {
                return Err(self.capacity_error(size));
            }
            self.chain_block(size, align)?;
            (pos_pre, pos_post) = cursor_range(self.current(), size, align)
                .ok_or_else(|| self.capacity_error(size))?;
            debug_assert!(pos_post <= self.current().reserved());
        }

        // Bytes of the returned range that already have backing; fresh
        // commits read as zero per the backend contract, so this is all
        // that ever needs an explicit wipe.
        let zero_len = if zero {
            self.current().committed().min(pos_post).saturating_sub(pos_pre)
        } else {
            0
        };

        let commit_size = self.commit_size;
        let large = self.flags.large_pages;
        let cur = self.blocks.last_mut().expect("arena always has a current block");
        if !cur.commit_to(pos_post, commit_size, large, self.backend.as_ref()) {
            return Err(ArenaError::CommitFailed {
                requested: size,
                committed: cur.committed(),
                site: self.site,
            });
        }

        let ptr = cur.ptr_at(pos_pre);
        cur.set_pos(pos_post);
        if zero_len > 0 {
            // SAFETY: `[pos_pre, pos_pre + zero_len)` is committed, lies
            // inside this block's reservation, and nothing else aliases
            // it: the cursor just moved past it.
            unsafe {
                std::ptr::write_bytes(ptr.as_ptr(), 0, zero_len as usize);
            }
        }
        Ok(ptr)
    }

    /// Allocate a zeroed byte slice.
    ///
    /// Safe wrapper over [`push`](Self::push): the borrow keeps every
    /// invalidating operation (which all need `&mut self`) away while the
    /// slice is alive.
    pub fn push_bytes(&mut self, len: usize, align: usize) -> Result<&mut [u8], ArenaError> {
        let ptr = self.push(len as u64, align as u64, true)?;
        // SAFETY: `push` returned `len` committed, zeroed bytes that
        // nothing else aliases.
        Ok(unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), len) })
    }

    /// Allocate a zeroed array of `count` values of `T`.
    ///
    /// Aligned to at least 8 bytes, more when `T` demands it.
    pub fn push_array<T: Zeroable>(&mut self, count: usize) -> Result<&mut [T], ArenaError> {
        let bytes = (mem::size_of::<T>() as u64)
            .checked_mul(count as u64)
            .ok_or_else(|| self.capacity_error(u64::MAX))?;
        let align = mem::align_of::<T>().max(8) as u64;
        let ptr = self.push(bytes, align, true)?.cast::<T>();
        // SAFETY: the range holds `count` properly aligned `T`s, every
        // byte zero, and `T: Zeroable` makes all-zeroes a valid value.
        Ok(unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), count) })
    }

    /// Allocate a single zeroed `T`.
    pub fn push_value<T: Zeroable>(&mut self) -> Result<&mut T, ArenaError> {
        let align = mem::align_of::<T>().max(8) as u64;
        let ptr = self.push(mem::size_of::<T>() as u64, align, true)?.cast::<T>();
        // SAFETY: as in `push_array`, for a single zeroed value.
        Ok(unsafe { &mut *ptr.as_ptr() })
    }

    /// The arena-wide logical position: the current block's start offset
    /// plus its cursor. Monotone across chaining, usable as a high-water
    /// mark for [`pop_to`](Self::pop_to).
    #[must_use]
    pub fn position(&self) -> u64 {
        let cur = self.current();
        cur.base_offset() + cur.pos()
    }

    /// Rewind the arena to a position previously returned by
    /// [`position`](Self::position), releasing every block created
    /// entirely after it. The target is clamped up to [`HEADER_SIZE`].
    ///
    /// # Panics
    ///
    /// Panics if `position` exceeds the current position, or does not
    /// correspond to a previously allocated position — both indicate a
    /// logic bug such as a double-ended temp scope.
    pub fn pop_to(&mut self, position: u64) {
        let target = position.max(HEADER_SIZE);
        let current = self.position();
        assert!(
            target <= current,
            "rewind target {target} is past the current position {current}"
        );

        while self.blocks.len() > 1 && self.current().base_offset() >= target {
            let block = self.blocks.pop().expect("arena always has a current block");
            block.release(self.backend.as_ref());
        }

        let cur = self.blocks.last_mut().expect("arena always has a current block");
        let pos = target - cur.base_offset();
        assert!(
            pos <= cur.pos(),
            "rewind target {target} does not correspond to an allocated position"
        );
        debug_assert!(pos >= HEADER_SIZE, "rewind target lands inside a block header");
        cur.set_pos(pos);
    }

    /// Rewind by `size` bytes, clamped so it never rewinds past the
    /// start.
    pub fn pop(&mut self, size: u64) {
        let position = self.position();
        self.pop_to(position.saturating_sub(size));
    }

    /// Rewind everything: chained blocks are released, the original block
    /// is retained with its cursor reset, ready for reuse.
    pub fn clear(&mut self) {
        self.pop_to(0);
    }

    /// Where this arena was created.
    #[must_use]
    pub fn allocation_site(&self) -> AllocSite {
        self.site
    }

    /// The arena's behavioral flags.
    #[must_use]
    pub fn flags(&self) -> ArenaFlags {
        self.flags
    }

    /// Number of blocks in the chain.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Address space reserved across the whole chain, in bytes.
    #[must_use]
    pub fn reserved_bytes(&self) -> u64 {
        self.blocks.iter().map(Block::reserved).sum()
    }

    /// Physically backed bytes across the whole chain.
    #[must_use]
    pub fn committed_bytes(&self) -> u64 {
        self.blocks.iter().map(Block::committed).sum()
    }

    fn current(&self) -> &Block {
        self.blocks.last().expect("arena always has a current block")
    }

    fn capacity_error(&self, size: u64) -> ArenaError {
        let cur = self.current();
        ArenaError::CapacityExceeded {
            requested: size,
            remaining: cur.reserved().saturating_sub(cur.pos()),
            site: self.site,
        }
    }

    /// Reserve and link a fresh block able to satisfy a `size`-byte push
    /// at `align`. Default-sized unless the request itself is larger, in
    /// which case the block is sized exactly to fit it. On failure the
    /// existing chain is untouched.
    fn chain_block(&mut self, size: u64, align: u64) -> Result<(), ArenaError> {
        let info = self.backend.system_info();
        let page = page_granularity(&info, self.flags);
        let header = checked_align_up(HEADER_SIZE, align).ok_or_else(|| self.capacity_error(size))?;
        let needed = header.checked_add(size).ok_or_else(|| self.capacity_error(size))?;

        let (reserve, commit) = if needed > self.reserve_size {
            (needed, needed)
        } else {
            (self.reserve_size, self.commit_size)
        };
        let reserve = reserve
            .checked_next_multiple_of(page)
            .ok_or_else(|| self.capacity_error(size))?;
        let commit = commit
            .checked_next_multiple_of(page)
            .unwrap_or(reserve)
            .min(reserve);

        let cur = self.current();
        let base_offset = cur
            .base_offset()
            .checked_add(cur.reserved())
            .ok_or_else(|| self.capacity_error(size))?;

        let block = make_block(
            self.backend.as_ref(),
            self.flags.large_pages,
            reserve,
            commit,
            base_offset,
            self.site,
        )?;
        self.blocks.push(block);
        Ok(())
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        for block in self.blocks.drain(..) {
            block.release(self.backend.as_ref());
        }
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("site", &format_args!("{}", self.site))
            .field("blocks", &self.blocks.len())
            .field("position", &self.position())
            .field("reserved_bytes", &self.reserved_bytes())
            .field("committed_bytes", &self.committed_bytes())
            .finish()
    }
}

/// Aligned cursor range for a `size`-byte push against `block`, or `None`
/// when the arithmetic overflows `u64`.
fn cursor_range(block: &Block, size: u64, align: u64) -> Option<(u64, u64)> {
    let pos_pre = checked_align_up(block.pos(), align)?;
    let pos_post = pos_pre.checked_add(size)?;
    Some((pos_pre, pos_post))
}

fn page_granularity(info: &SystemInfo, flags: ArenaFlags) -> u64 {
    if flags.large_pages {
        info.large_page_size
    } else {
        info.page_size
    }
}

/// Reserve a block and make its initial commit. A commit failure releases
/// the reservation before reporting, so no half-built block leaks.
fn make_block(
    backend: &dyn MemoryBackend,
    large: bool,
    reserve: u64,
    commit: u64,
    base_offset: u64,
    site: AllocSite,
) -> Result<Block, ArenaError> {
    let base = if large {
        backend.reserve_large(reserve)
    } else {
        backend.reserve(reserve)
    }
    .ok_or(ArenaError::ReserveFailed {
        requested: reserve,
        site,
    })?;

    let ok = if large {
        backend.commit_large(base, commit)
    } else {
        backend.commit(base, commit)
    };
    if !ok {
        backend.release(base, reserve);
        return Err(ArenaError::CommitFailed {
            requested: commit,
            committed: 0,
            site,
        });
    }
    Ok(Block::new(base, base_offset, reserve, commit, HEADER_SIZE))
}

/// Backend for arenas over caller-owned memory: it can never reserve or
/// commit, and external blocks are never released through it.
struct NullMemory;

impl MemoryBackend for NullMemory {
    fn system_info(&self) -> SystemInfo {
        SystemInfo {
            logical_processors: 1,
            page_size: 1,
            large_page_size: 1,
            allocation_granularity: 1,
        }
    }

    fn reserve(&self, _size: u64) -> Option<NonNull<u8>> {
        None
    }

    fn commit(&self, _ptr: NonNull<u8>, _size: u64) -> bool {
        false
    }

    fn decommit(&self, _ptr: NonNull<u8>, _size: u64) {}

    fn release(&self, _ptr: NonNull<u8>, _size: u64) {}

    fn reserve_large(&self, _size: u64) -> Option<NonNull<u8>> {
        None
    }

    fn commit_large(&self, _ptr: NonNull<u8>, _size: u64) -> bool {
        false
    }
}
