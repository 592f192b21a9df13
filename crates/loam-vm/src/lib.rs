//! Operating-system virtual memory backend for Loam arenas.
//!
//! [`OsMemory`] implements [`MemoryBackend`] over anonymous mappings:
//! `mmap`/`mprotect`/`madvise`/`munmap` on unix, `VirtualAlloc`/
//! `VirtualFree` on Windows. Reservations are made with no access
//! protection, so committing is a protection change rather than a fresh
//! mapping, and freshly committed pages read as zero — the property the
//! arena's zero-on-request bookkeeping depends on.
//!
//! This crate is one of two in the workspace that may contain `unsafe`
//! code (along with `loam-arena`). Every `unsafe` block carries a
//! `// SAFETY:` comment.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::ptr::NonNull;

use loam_core::{MemoryBackend, SystemInfo};

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as sys;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use windows as sys;

/// The production [`MemoryBackend`]: real OS virtual memory.
///
/// Stateless apart from the [`SystemInfo`] cached at construction; a
/// single instance (typically behind an `Arc`) can serve every arena in
/// the process.
#[derive(Clone, Debug)]
pub struct OsMemory {
    info: SystemInfo,
}

impl OsMemory {
    /// Query the OS for page sizes and granularities and build a backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            info: sys::system_info(),
        }
    }

    /// Convenience: a freshly constructed backend behind an `Arc`, ready
    /// to hand to [`loam-arena`]'s `Arena::new`.
    ///
    /// [`loam-arena`]: https://docs.rs/loam-arena
    #[must_use]
    pub fn shared() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::new())
    }
}

impl Default for OsMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend for OsMemory {
    fn system_info(&self) -> SystemInfo {
        self.info
    }

    fn reserve(&self, size: u64) -> Option<NonNull<u8>> {
        let size = usize::try_from(size).ok()?;
        sys::reserve(size)
    }

    fn commit(&self, ptr: NonNull<u8>, size: u64) -> bool {
        let Ok(size) = usize::try_from(size) else {
            return false;
        };
        sys::commit(ptr, size)
    }

    fn decommit(&self, ptr: NonNull<u8>, size: u64) {
        if let Ok(size) = usize::try_from(size) {
            sys::decommit(ptr, size);
        }
    }

    fn release(&self, ptr: NonNull<u8>, size: u64) {
        if let Ok(size) = usize::try_from(size) {
            sys::release(ptr, size);
        }
    }

    fn reserve_large(&self, size: u64) -> Option<NonNull<u8>> {
        let size = usize::try_from(size).ok()?;
        sys::reserve_large(size)
    }

    fn commit_large(&self, ptr: NonNull<u8>, size: u64) -> bool {
        let Ok(size) = usize::try_from(size) else {
            return false;
        };
        sys::commit_large(ptr, size)
    }
}
