//! Arena configuration parameters.

/// Behavioral modifiers for an arena.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaFlags {
    /// Fail allocations that would not fit in the first block instead of
    /// chaining a new one.
    pub no_chain: bool,
    /// Back the arena with huge pages (the backend's large-page
    /// reserve/commit variants).
    pub large_pages: bool,
}

/// Parameters for creating an [`Arena`](crate::Arena).
///
/// Sizes are rounded up to the page size (or large-page size, when
/// flagged) at construction; the defaults suit most arenas. Validated at
/// construction; values are immutable afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaParams {
    /// Behavioral modifiers.
    pub flags: ArenaFlags,
    /// Address space reserved per block, in bytes.
    ///
    /// Default: 64MiB. Reservation costs address space, not memory, so
    /// erring large is cheap.
    pub reserve_size: u64,
    /// Commit growth increment, in bytes.
    ///
    /// Default: 64KiB. Physical backing is added in multiples of this as
    /// the cursor advances.
    pub commit_size: u64,
}

impl ArenaParams {
    /// Default address-space reservation per block: 64MiB.
    pub const DEFAULT_RESERVE_SIZE: u64 = 64 * 1024 * 1024;

    /// Default commit increment: 64KiB. Most OS page granularities divide
    /// this evenly.
    pub const DEFAULT_COMMIT_SIZE: u64 = 64 * 1024;

    /// Parameters with default sizes and no flags.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flags: ArenaFlags::default(),
            reserve_size: Self::DEFAULT_RESERVE_SIZE,
            commit_size: Self::DEFAULT_COMMIT_SIZE,
        }
    }

    /// Parameters with explicit reserve and commit sizes.
    #[must_use]
    pub fn with_sizes(reserve_size: u64, commit_size: u64) -> Self {
        Self {
            flags: ArenaFlags::default(),
            reserve_size,
            commit_size,
        }
    }

    /// Set the no-chain flag.
    #[must_use]
    pub fn no_chain(mut self) -> Self {
        self.flags.no_chain = true;
        self
    }

    /// Set the large-pages flag.
    #[must_use]
    pub fn large_pages(mut self) -> Self {
        self.flags.large_pages = true;
        self
    }
}

impl Default for ArenaParams {
    fn default() -> Self {
        Self::new()
    }
}
