//! Raw mmap/mprotect wrappers for unix targets.
//!
//! Reservations are `PROT_NONE` anonymous private mappings; committing is
//! an `mprotect` to read/write, decommitting is `MADV_DONTNEED` followed
//! by a protection drop back to `PROT_NONE`.

use std::ptr::{self, NonNull};

use loam_core::SystemInfo;

/// Huge pages are 2MiB on every linux configuration we target.
const LARGE_PAGE_SIZE: u64 = 2 * 1024 * 1024;

pub(crate) fn system_info() -> SystemInfo {
    // SAFETY: sysconf with a valid name has no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let page_size = u64::try_from(page_size).unwrap_or(4096);
    let logical_processors = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1);
    SystemInfo {
        logical_processors,
        page_size,
        large_page_size: LARGE_PAGE_SIZE,
        allocation_granularity: page_size,
    }
}

pub(crate) fn reserve(size: usize) -> Option<NonNull<u8>> {
    // SAFETY: anonymous mapping with no requested address; the kernel
    // either returns a fresh range or MAP_FAILED.
    let map = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if map == libc::MAP_FAILED {
        return None;
    }
    NonNull::new(map.cast::<u8>())
}

pub(crate) fn commit(ptr: NonNull<u8>, size: usize) -> bool {
    // SAFETY: callers pass a sub-range of a live reservation.
    unsafe { libc::mprotect(ptr.as_ptr().cast(), size, libc::PROT_READ | libc::PROT_WRITE) == 0 }
}

pub(crate) fn decommit(ptr: NonNull<u8>, size: usize) {
    // SAFETY: callers pass a sub-range of a live reservation. DONTNEED
    // drops the physical pages; the protection change makes stray access
    // fault instead of silently faulting pages back in.
    unsafe {
        libc::madvise(ptr.as_ptr().cast(), size, libc::MADV_DONTNEED);
        libc::mprotect(ptr.as_ptr().cast(), size, libc::PROT_NONE);
    }
}

pub(crate) fn release(ptr: NonNull<u8>, size: usize) {
    // SAFETY: callers pass the exact base and size of a live reservation.
    unsafe {
        libc::munmap(ptr.as_ptr().cast(), size);
    }
}

#[cfg(target_os = "linux")]
pub(crate) fn reserve_large(size: usize) -> Option<NonNull<u8>> {
    // SAFETY: as `reserve`, with hugetlb backing requested up front.
    let map = unsafe {
        libc::mmap(
            ptr::null_mut(),
            size,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_HUGETLB,
            -1,
            0,
        )
    };
    if map == libc::MAP_FAILED {
        return None;
    }
    NonNull::new(map.cast::<u8>())
}

/// Non-linux unix has no hugetlb mapping flag; fall back to normal pages.
#[cfg(not(target_os = "linux"))]
pub(crate) fn reserve_large(size: usize) -> Option<NonNull<u8>> {
    reserve(size)
}

pub(crate) fn commit_large(ptr: NonNull<u8>, size: usize) -> bool {
    commit(ptr, size)
}
