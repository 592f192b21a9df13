//! Raw VirtualAlloc/VirtualFree wrappers for Windows targets.
//!
//! Reservations are `MEM_RESERVE` with `PAGE_NOACCESS`; committing is a
//! second `VirtualAlloc` with `MEM_COMMIT`. Large pages on Windows must be
//! committed at reservation time, so the large-page reserve commits the
//! whole range and the large-page commit is a successful no-op.

use std::ffi::c_void;
use std::ptr::{self, NonNull};

use loam_core::SystemInfo;

use windows_sys::Win32::System::Memory::{
    GetLargePageMinimum, VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_DECOMMIT, MEM_LARGE_PAGES,
    MEM_RELEASE, MEM_RESERVE, PAGE_NOACCESS, PAGE_READWRITE,
};
use windows_sys::Win32::System::SystemInformation::{GetSystemInfo, SYSTEM_INFO};

pub(crate) fn system_info() -> SystemInfo {
    // SAFETY: SYSTEM_INFO is a plain C struct; all-zero is a valid
    // (if meaningless) value, and GetSystemInfo overwrites every field.
    let mut raw: SYSTEM_INFO = unsafe { std::mem::zeroed() };
    // SAFETY: GetSystemInfo writes a fully initialised SYSTEM_INFO.
    unsafe {
        GetSystemInfo(&mut raw);
    }
    // SAFETY: no preconditions; returns 0 when large pages are
    // unavailable.
    let large = unsafe { GetLargePageMinimum() };
    let large_page_size = if large == 0 {
        2 * 1024 * 1024
    } else {
        large as u64
    };
    SystemInfo {
        logical_processors: std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1),
        page_size: u64::from(raw.dwPageSize),
        large_page_size,
        allocation_granularity: u64::from(raw.dwAllocationGranularity),
    }
}

pub(crate) fn reserve(size: usize) -> Option<NonNull<u8>> {
    // SAFETY: reserving with no base address has no preconditions; failure
    // is reported as a null return.
    let ptr = unsafe { VirtualAlloc(ptr::null(), size, MEM_RESERVE, PAGE_NOACCESS) };
    NonNull::new(ptr.cast::<u8>())
}

pub(crate) fn commit(ptr: NonNull<u8>, size: usize) -> bool {
    // SAFETY: callers pass a sub-range of a live reservation.
    let committed =
        unsafe { VirtualAlloc(ptr.as_ptr().cast::<c_void>(), size, MEM_COMMIT, PAGE_READWRITE) };
    !committed.is_null()
}

pub(crate) fn decommit(ptr: NonNull<u8>, size: usize) {
    // SAFETY: callers pass a sub-range of a live reservation.
    unsafe {
        VirtualFree(ptr.as_ptr().cast::<c_void>(), size, MEM_DECOMMIT);
    }
}

pub(crate) fn release(ptr: NonNull<u8>, _size: usize) {
    // Size must be 0 when releasing a whole reservation on Windows.
    // SAFETY: callers pass the base of a live reservation.
    unsafe {
        VirtualFree(ptr.as_ptr().cast::<c_void>(), 0, MEM_RELEASE);
    }
}

pub(crate) fn reserve_large(size: usize) -> Option<NonNull<u8>> {
    // SAFETY: as `reserve`. MEM_LARGE_PAGES requires the lock-pages
    // privilege; without it the call fails and we report None.
    let ptr = unsafe {
        VirtualAlloc(
            ptr::null(),
            size,
            MEM_RESERVE | MEM_COMMIT | MEM_LARGE_PAGES,
            PAGE_READWRITE,
        )
    };
    NonNull::new(ptr.cast::<u8>())
}

pub(crate) fn commit_large(_ptr: NonNull<u8>, _size: usize) -> bool {
    // Large-page ranges were committed in reserve_large.
    true
}
