//! The virtual memory backend contract.
//!
//! [`MemoryBackend`] is the only seam through which the arena touches the
//! operating system. It exposes the reserve/commit/decommit/release
//! lifecycle of a virtual address range, plus a huge-page variant of the
//! reserve/commit pair and a [`SystemInfo`] query.
//!
//! All failure is reported by sentinel return (`None` / `false`), never by
//! panicking: the arena layer is responsible for turning a backend failure
//! into a typed allocation error.

use std::ptr::NonNull;

/// Properties of the host's virtual memory system.
///
/// Queried once per backend and used by the arena to round reservation and
/// commit sizes to granularities the OS will accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemInfo {
    /// Number of logical processors. Useful for sizing per-worker arenas.
    pub logical_processors: u32,
    /// Size of a normal page in bytes.
    pub page_size: u64,
    /// Size of a huge page in bytes (used when large-page backing is
    /// requested).
    pub large_page_size: u64,
    /// Granularity at which reservations are made. Equal to `page_size` on
    /// unix; 64KiB on Windows.
    pub allocation_granularity: u64,
}

/// Operating-system virtual memory facilities, as consumed by the arena.
///
/// Implementations must uphold the reserve/commit model:
///
/// - [`reserve`](Self::reserve) claims an address range with no read/write
///   access and no physical backing.
/// - [`commit`](Self::commit) makes a sub-range of a reservation
///   accessible, backing it with physical memory or swap. Committing an
///   already-committed sub-range is a no-op that still reports success.
///   **Memory committed for the first time since the reservation was made
///   (or since the last [`decommit`](Self::decommit) covering it) must
///   read as zero** — the guarantee anonymous mappings give on every major
///   OS. The arena's zero-on-request bookkeeping relies on it.
/// - [`decommit`](Self::decommit) releases physical backing while keeping
///   the reservation; accessing the range before a new commit is undefined
///   behavior.
/// - [`release`](Self::release) unconditionally returns a reservation to
///   the OS. Undefined behavior if `ptr`/`size` do not exactly match a
///   live reservation.
///
/// The `Send + Sync` bound lets a single backend instance serve many
/// arenas across threads; the arenas themselves remain single-owner.
pub trait MemoryBackend: Send + Sync {
    /// Page sizes and granularities for this backend.
    fn system_info(&self) -> SystemInfo;

    /// Reserve `size` bytes of address space. No access, no physical
    /// backing. Returns `None` if the OS cannot satisfy the reservation;
    /// callers must treat that as allocator exhaustion, never retry
    /// blindly.
    fn reserve(&self, size: u64) -> Option<NonNull<u8>>;

    /// Commit `size` bytes starting at `ptr`, which must lie within a live
    /// reservation. Returns `false` if the OS cannot back the range.
    fn commit(&self, ptr: NonNull<u8>, size: u64) -> bool;

    /// Release physical backing for `size` bytes at `ptr`, keeping the
    /// reservation valid for a future commit.
    fn decommit(&self, ptr: NonNull<u8>, size: u64);

    /// Return the reservation starting at `ptr` (of exactly `size`
    /// reserved bytes) to the OS.
    fn release(&self, ptr: NonNull<u8>, size: u64);

    /// Huge-page variant of [`reserve`](Self::reserve). Same contract,
    /// [`SystemInfo::large_page_size`] granularity.
    fn reserve_large(&self, size: u64) -> Option<NonNull<u8>>;

    /// Huge-page variant of [`commit`](Self::commit).
    fn commit_large(&self, ptr: NonNull<u8>, size: u64) -> bool;
}
