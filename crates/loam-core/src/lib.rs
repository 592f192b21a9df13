//! Core traits and primitives for the Loam arena allocator.
//!
//! This is the leaf crate with zero dependencies. It defines the
//! [`MemoryBackend`] contract that separates the arena from the operating
//! system's virtual memory facilities, the [`SystemInfo`] it reports, the
//! [`AllocSite`] diagnostics type, and the power-of-two alignment helpers
//! used throughout the workspace.
//!
//! Backends are injected into arenas at construction. Production code uses
//! `loam-vm`'s `OsMemory`; tests use `loam-test-utils`' `MockMemory`. There
//! is no process-global allocator state anywhere in the workspace.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod align;
pub mod backend;
pub mod site;

pub use align::{align_up, checked_align_up};
pub use backend::{MemoryBackend, SystemInfo};
pub use site::AllocSite;
