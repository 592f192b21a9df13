//! Scoped snapshot/restore over an arena's position.
//!
//! A temp scope brackets a burst of allocations: everything pushed
//! between [`Arena::begin_temp`] and [`Arena::end_temp`] is reclaimed at
//! the end, no matter how many blocks were chained in between. Scopes
//! nest, provided they close in strict reverse order of opening.
//!
//! [`Arena::temp`] is the guard form: it restores on drop, so the scope
//! closes on every exit path, early returns and panics included.

use std::ops::{Deref, DerefMut};

use crate::arena::Arena;

/// A restore point for an arena's position.
///
/// Holds no memory — only the coordinate to rewind to. It must be ended
/// against the same arena it was begun on; scopes are plain values, so
/// nothing stops a caller mixing arenas, but the rewind will be
/// meaningless at best and a panic at worst.
#[must_use = "a temp scope reclaims nothing unless ended"]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TempScope {
    position: u64,
}

impl TempScope {
    /// The position this scope will rewind to.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl Arena {
    /// Open a temp scope at the current position.
    pub fn begin_temp(&self) -> TempScope {
        TempScope {
            position: self.position(),
        }
    }

    /// Close a temp scope, reclaiming everything allocated since
    /// [`begin_temp`](Self::begin_temp) — including any blocks chained in
    /// the meantime.
    ///
    /// # Panics
    ///
    /// Panics if the arena has already been rewound below the scope's
    /// snapshot (closing scopes out of order, or ending a scope twice
    /// after further pops).
    pub fn end_temp(&mut self, scope: TempScope) {
        self.pop_to(scope.position);
    }

    /// Open a temp scope that closes itself when the guard drops.
    ///
    /// The guard dereferences to the arena, so allocation code inside the
    /// scope looks the same as outside it.
    pub fn temp(&mut self) -> TempGuard<'_> {
        let position = self.position();
        TempGuard {
            arena: self,
            position,
        }
    }
}

/// RAII form of [`TempScope`]: rewinds the arena on drop.
pub struct TempGuard<'a> {
    arena: &'a mut Arena,
    position: u64,
}

impl Deref for TempGuard<'_> {
    type Target = Arena;

    fn deref(&self) -> &Arena {
        self.arena
    }
}

impl DerefMut for TempGuard<'_> {
    fn deref_mut(&mut self) -> &mut Arena {
        self.arena
    }
}

impl Drop for TempGuard<'_> {
    fn drop(&mut self) {
        self.arena.pop_to(self.position);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use loam_test_utils::MockMemory;

    use crate::{Arena, ArenaParams};

    fn mock_arena(reserve: u64, commit: u64) -> (Arena, Arc<MockMemory>) {
        let backend = Arc::new(MockMemory::new());
        let arena = Arena::new(ArenaParams::with_sizes(reserve, commit), backend.clone())
            .expect("arena creation");
        (arena, backend)
    }

    #[test]
    fn end_restores_the_exact_position() {
        let (mut arena, _backend) = mock_arena(64 * 1024, 4096);
        arena.push(100, 8, false).unwrap();
        let scope = arena.begin_temp();

        arena.push(5000, 8, false).unwrap();
        arena.push(300, 16, true).unwrap();
        assert_ne!(arena.position(), scope.position());

        arena.end_temp(scope);
        assert_eq!(arena.position(), scope.position());
    }

    #[test]
    fn scope_spanning_chained_blocks_releases_them() {
        let (mut arena, backend) = mock_arena(4096, 4096);
        // Establish what the next allocation's address would be.
        let probe = arena.push(64, 8, false).unwrap();
        arena.pop(64);

        let scope = arena.begin_temp();
        for _ in 0..12 {
            arena.push(2048, 8, false).unwrap();
        }
        assert!(arena.block_count() > 1);

        arena.end_temp(scope);
        assert_eq!(arena.position(), scope.position());
        assert_eq!(arena.block_count(), 1);
        assert_eq!(backend.outstanding_reservations(), 1);

        // The arena behaves as if the scope never happened.
        let after = arena.push(64, 8, false).unwrap();
        assert_eq!(after.as_ptr(), probe.as_ptr());
    }

    #[test]
    fn scopes_nest_in_reverse_order() {
        let (mut arena, _backend) = mock_arena(64 * 1024, 4096);
        let outer = arena.begin_temp();
        arena.push(100, 8, false).unwrap();

        let inner = arena.begin_temp();
        arena.push(200, 8, false).unwrap();
        arena.end_temp(inner);
        assert_eq!(arena.position(), inner.position());

        arena.end_temp(outer);
        assert_eq!(arena.position(), outer.position());
    }

    #[test]
    fn guard_restores_on_drop() {
        let (mut arena, _backend) = mock_arena(64 * 1024, 4096);
        let before = arena.position();
        {
            let mut scratch = arena.temp();
            scratch.push(10_000, 8, true).unwrap();
            assert_ne!(scratch.position(), before);
        }
        assert_eq!(arena.position(), before);
    }

    #[test]
    fn guard_restores_when_the_scope_panics() {
        let (mut arena, _backend) = mock_arena(64 * 1024, 4096);
        let before = arena.position();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut scratch = arena.temp();
            scratch.push(10_000, 8, false).unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(arena.position(), before);
    }

    #[test]
    fn empty_scope_is_a_no_op() {
        let (mut arena, backend) = mock_arena(64 * 1024, 4096);
        let reserves = backend.reserve_calls();
        let scope = arena.begin_temp();
        arena.end_temp(scope);
        assert_eq!(arena.position(), scope.position());
        assert_eq!(backend.reserve_calls(), reserves);
    }
}
