//! `VersionArena`: token-gated slot storage for versions with generational keys.
//!
//! A key records the slot generation at allocation time. Freeing bumps the
//! generation, so a key held past reclamation (a stale `prior` link, say)
//! resolves to `None` instead of aliasing whatever reuses the slot.

use crate::brand::{GhostCell, GhostToken};
use crate::forest::version::{Version, VersionKey};

enum Slot<'brand> {
    Occupied { generation: u32, version: Version<'brand> },
    Vacant { generation: u32, next_free: Option<u32> },
}

struct ArenaState<'brand> {
    slots: Vec<Slot<'brand>>,
    free_head: Option<u32>,
    len: usize,
}

/// Generational arena of [`Version`]s.
pub struct VersionArena<'brand> {
    state: GhostCell<'brand, ArenaState<'brand>>,
}

impl<'brand> VersionArena<'brand> {
    /// Empty arena with room for `capacity` versions.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: GhostCell::new(ArenaState {
                slots: Vec::with_capacity(capacity),
                free_head: None,
                len: 0,
            }),
        }
    }

    /// Stores `version`, reusing a vacant slot when one exists.
    ///
    /// # Panics
    /// If the arena already holds `u32::MAX` slots, or if the free list is
    /// corrupted and points at an occupied slot.
    pub fn alloc(&self, token: &mut GhostToken<'brand>, version: Version<'brand>) -> VersionKey<'brand> {
        let state = self.state.borrow_mut(token);
        state.len += 1;

        if let Some(idx) = state.free_head {
            let slot = &mut state.slots[idx as usize];
            let (generation, next_free) = match *slot {
                Slot::Vacant { generation, next_free } => (generation, next_free),
                Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };
            state.free_head = next_free;
            *slot = Slot::Occupied { generation, version };
            return VersionKey::new(idx, generation);
        }

        let idx = u32::try_from(state.slots.len()).unwrap_or_else(|_| {
            panic!("version arena exhausted the u32 index space");
        });
        state.slots.push(Slot::Occupied { generation: 0, version });
        VersionKey::new(idx, 0)
    }

    /// Live version behind `key`.
    #[inline]
    pub fn get<'a>(&'a self, token: &'a GhostToken<'brand>, key: VersionKey<'brand>) -> Option<&'a Version<'brand>> {
        match self.state.borrow(token).slots.get(key.index as usize)? {
            Slot::Occupied { generation, version } if *generation == key.generation => Some(version),
            _ => None,
        }
    }

    /// Mutable live version behind `key`.
    #[inline]
    pub fn get_mut<'a>(
        &'a self,
        token: &'a mut GhostToken<'brand>,
        key: VersionKey<'brand>,
    ) -> Option<&'a mut Version<'brand>> {
        match self.state.borrow_mut(token).slots.get_mut(key.index as usize)? {
            Slot::Occupied { generation, version } if *generation == key.generation => Some(version),
            _ => None,
        }
    }

    /// Reclaims `key`'s slot and returns the version. `None` if stale.
    pub fn free(&self, token: &mut GhostToken<'brand>, key: VersionKey<'brand>) -> Option<Version<'brand>> {
        let state = self.state.borrow_mut(token);
        let idx = key.index as usize;
        match state.slots.get(idx) {
            Some(Slot::Occupied { generation, .. }) if *generation == key.generation => {}
            _ => return None,
        }
        let vacant = Slot::Vacant {
            generation: key.generation.wrapping_add(1),
            next_free: state.free_head,
        };
        let Slot::Occupied { version, .. } = core::mem::replace(&mut state.slots[idx], vacant) else {
            return None;
        };
        state.free_head = Some(key.index);
        state.len -= 1;
        Some(version)
    }

    /// Versions currently stored.
    pub fn len(&self, token: &GhostToken<'brand>) -> usize {
        self.state.borrow(token).len
    }
}
