//! Branded access control for forest state.
//!
//! Every [`ContractionForest`](crate::ContractionForest) lives inside one
//! `GhostToken::new` scope. The scope's lifetime `'brand` is stamped on the
//! forest, on its version keys, and on every [`GhostCell`] holding forest
//! state, so:
//!
//! - a `VersionKey<'brand>` minted by one forest cannot index another;
//! - shared reads need `&GhostToken<'brand>` and can fan out across threads;
//! - structural writes need `&mut GhostToken<'brand>`, and the borrow checker
//!   proves there is exactly one writer at a time.
//!
//! The round engine leans on the last two points: each phase first computes
//! in parallel under a shared token, then commits under the exclusive one.

use core::cell::UnsafeCell;
use core::marker::PhantomData;

/// A marker that is invariant in `'id`, so brands never unify by subtyping.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InvariantLifetime<'id>(PhantomData<fn(&'id ()) -> &'id ()>);

impl<'id> InvariantLifetime<'id> {
    /// Creates the marker.
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

/// The zero-sized capability that gates a forest's cells.
///
/// Not `Clone`: holding `&mut GhostToken<'brand>` is the proof of exclusive
/// write access to every cell of that brand.
#[derive(Debug)]
pub struct GhostToken<'brand>(InvariantLifetime<'brand>);

impl<'brand> GhostToken<'brand> {
    /// Runs `f` with a fresh token whose brand cannot escape the closure.
    ///
    /// ```rust
    /// use rake_compress::{ContractionForest, ForestConfig, GhostToken};
    ///
    /// let rounds = GhostToken::new(|mut token| {
    ///     let forest = ContractionForest::initialize(&mut token, &[0, 0, 1], ForestConfig::default())
    ///         .expect("well-formed forest");
    ///     forest.last_report().rounds
    /// });
    /// assert!(rounds > 0);
    /// ```
    pub fn new<F, R>(f: F) -> R
    where
        F: for<'new_brand> FnOnce(GhostToken<'new_brand>) -> R,
    {
        f(GhostToken(InvariantLifetime::new()))
    }
}

/// A cell whose contents are reachable only through a token of its brand.
pub struct GhostCell<'brand, T> {
    _brand: InvariantLifetime<'brand>,
    value: UnsafeCell<T>,
}

impl<'brand, T> GhostCell<'brand, T> {
    /// Wraps `value`.
    pub const fn new(value: T) -> Self {
        Self {
            _brand: InvariantLifetime::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Shared access; any number of readers may hold `&GhostToken` at once.
    #[inline]
    pub fn borrow<'a>(&'a self, _token: &'a GhostToken<'brand>) -> &'a T {
        // SAFETY: a live `&GhostToken<'brand>` rules out any `&mut` borrow
        // obtained through `borrow_mut`, which needs `&mut GhostToken<'brand>`.
        unsafe { &*self.value.get() }
    }

    /// Exclusive access, proven by the exclusive token borrow.
    #[inline]
    pub fn borrow_mut<'a>(&'a self, _token: &'a mut GhostToken<'brand>) -> &'a mut T {
        // SAFETY: the token is unique per brand and borrowed mutably for 'a,
        // so no other borrow of any cell of this brand can be live.
        unsafe { &mut *self.value.get() }
    }

    /// Direct access when the cell itself is held exclusively.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Unwraps the cell.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<'brand, T: Default> Default for GhostCell<'brand, T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// SAFETY: moving the cell moves the value.
unsafe impl<'brand, T: Send> Send for GhostCell<'brand, T> {}
// SAFETY: shared access hands out `&T` to many threads (needs `T: Sync`), and
// a thread holding `&mut GhostToken` may obtain `&mut T` (needs `T: Send`).
unsafe impl<'brand, T: Send + Sync> Sync for GhostCell<'brand, T> {}
