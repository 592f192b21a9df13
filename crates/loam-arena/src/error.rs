//! Arena-specific error types.

use std::error::Error;
use std::fmt;

use loam_core::AllocSite;

/// Errors that can occur during arena operations.
///
/// All variants describe resource exhaustion or bad configuration and are
/// returned to the immediate caller. Caller-contract violations (rewinding
/// past the current position, non-power-of-two alignment) are not errors —
/// they panic, since they indicate corruption of the allocator's
/// invariants rather than external resource pressure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The OS could not grant the requested address-space reservation.
    ReserveFailed {
        /// Number of bytes of address space requested.
        requested: u64,
        /// Where the arena was created.
        site: AllocSite,
    },
    /// The OS could not back a committed sub-range with physical memory.
    CommitFailed {
        /// Size of the allocation that triggered the commit.
        requested: u64,
        /// Bytes actually committed in the current block; subsequent calls
        /// retry from this watermark.
        committed: u64,
        /// Where the arena was created.
        site: AllocSite,
    },
    /// The request cannot fit and chaining is not permitted.
    CapacityExceeded {
        /// Number of bytes requested.
        requested: u64,
        /// Bytes remaining in the current block's reservation.
        remaining: u64,
        /// Where the arena was created.
        site: AllocSite,
    },
    /// Arena parameters were rejected at construction.
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReserveFailed { requested, site } => {
                write!(
                    f,
                    "address-space reservation of {requested} bytes failed (arena created at {site})"
                )
            }
            Self::CommitFailed {
                requested,
                committed,
                site,
            } => {
                write!(
                    f,
                    "commit failed for a {requested}-byte allocation; \
                     {committed} bytes committed in the current block (arena created at {site})"
                )
            }
            Self::CapacityExceeded {
                requested,
                remaining,
                site,
            } => {
                write!(
                    f,
                    "allocation of {requested} bytes exceeds the arena's remaining \
                     capacity of {remaining} bytes (arena created at {site})"
                )
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid arena config: {reason}")
            }
        }
    }
}

impl Error for ArenaError {}
