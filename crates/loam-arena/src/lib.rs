//! Chained virtual-memory bump arena with positional reclamation.
//!
//! An [`Arena`] hands out variably-sized, aligned blocks of memory from a
//! growable, OS-backed reservation. There is no per-object free:
//! reclamation is positional — rewind the cursor with [`Arena::pop_to`],
//! wipe everything with [`Arena::clear`], or bracket a burst of
//! allocations with a [`TempScope`].
//!
//! # Architecture
//!
//! ```text
//! Arena (owning handle)
//! ├── SmallVec<Block>      block chain, last = current
//! │   └── Block            one OS reservation: base, cursor,
//! │                        committed/reserved watermarks
//! ├── Arc<dyn MemoryBackend>   injected OS seam (loam-vm / mock)
//! ├── ArenaFlags           no_chain, large_pages
//! └── AllocSite            construction site, for capacity diagnostics
//! ```
//!
//! Each block reserves address space up front and commits it lazily in
//! fixed increments as the cursor advances. When a block's reservation is
//! exhausted, a new block is reserved and pushed onto the chain; logical
//! positions keep numbering contiguously across blocks, so
//! [`Arena::position`] is a single monotone coordinate usable as a
//! high-water mark.
//!
//! The first [`HEADER_SIZE`] bytes of every block are reserved and never
//! handed to callers.
//!
//! This crate is one of two in the workspace that may contain `unsafe`
//! code (along with `loam-vm`). Every `unsafe` block carries a
//! `// SAFETY:` comment.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod arena;
mod block;
pub mod config;
pub mod error;
pub mod temp;

pub use arena::{Arena, HEADER_SIZE};
pub use config::{ArenaFlags, ArenaParams};
pub use error::ArenaError;
pub use temp::{TempGuard, TempScope};
