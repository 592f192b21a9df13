//! Loam: region-based memory allocation over reserved-then-committed
//! virtual memory.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the Loam sub-crates. For most users, adding `loam` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use loam::prelude::*;
//!
//! // One OS backend serves every arena in the process.
//! let backend = OsMemory::shared();
//! let mut arena = Arena::new(ArenaParams::new(), backend).unwrap();
//!
//! // Bump-allocate; commit grows lazily inside a 64MiB reservation.
//! let frame: &mut [u8] = arena.push_bytes(16 * 1024, 64).unwrap();
//! frame[0] = 1;
//!
//! // Temp scopes reclaim everything allocated inside them.
//! let mark = arena.position();
//! {
//!     let mut scratch = arena.temp();
//!     scratch.push_array::<f32>(10_000).unwrap();
//! }
//! assert_eq!(arena.position(), mark);
//!
//! // Positional reclamation: O(1), no per-object free.
//! arena.clear();
//! ```
//!
//! # Crates
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `loam-arena` | `Arena`, params, errors, temp scopes |
//! | [`backend`] | `loam-core` | `MemoryBackend` trait, `SystemInfo`, helpers |
//! | [`vm`] | `loam-vm` | `OsMemory`, the OS virtual memory backend |
//!
//! Tests inject `loam-test-utils`' `MockMemory` instead of `OsMemory` to
//! count reservations and force failures; no global state stands in the
//! way.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub use loam_arena::{
    Arena, ArenaError, ArenaFlags, ArenaParams, TempGuard, TempScope, HEADER_SIZE,
};
pub use loam_core::{AllocSite, MemoryBackend, SystemInfo};
pub use loam_vm::OsMemory;

/// The arena allocator sub-crate.
pub mod arena {
    pub use loam_arena::*;
}

/// Core traits and primitives.
pub mod backend {
    pub use loam_core::*;
}

/// The OS virtual memory backend.
pub mod vm {
    pub use loam_vm::*;
}

/// The commonly used subset of the API.
pub mod prelude {
    pub use crate::{Arena, ArenaError, ArenaFlags, ArenaParams, MemoryBackend, OsMemory, TempScope};
}
