//! Ownership arbitration: which group may advance a vertex.
//!
//! One atomic word per vertex, `UNSET` or a group id. A group claims a vertex
//! with a single compare-exchange from `UNSET`, so among any number of
//! concurrent claimants exactly one wins and the rest observe the winner.
//! Entries are only released when the vertex is freed.

#[cfg(loom)]
use loom::sync::atomic::{AtomicU32, Ordering};
#[cfg(not(loom))]
use core::sync::atomic::{AtomicU32, Ordering};

use crate::{GroupId, VertexId};

const UNSET: u32 = u32::MAX;

/// `vertex -> group | unset`.
pub struct OwnershipMap {
    slots: Box<[AtomicU32]>,
}

impl OwnershipMap {
    /// Map for `n` vertices, all unset.
    pub fn new(n: usize) -> Self {
        Self {
            slots: (0..n).map(|_| AtomicU32::new(UNSET)).collect(),
        }
    }

    /// Number of vertices covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Covers no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// First announcement wins: sets `v`'s owner to `group` if it is unset.
    ///
    /// # Errors
    /// The current owner when the entry was already set (possibly to `group`
    /// itself).
    #[inline]
    pub fn claim(&self, v: VertexId, group: GroupId) -> Result<(), GroupId> {
        debug_assert_ne!(group, UNSET, "group id collides with the unset marker");
        match self.slots.get(v as usize) {
            Some(slot) => slot
                .compare_exchange(UNSET, group, Ordering::AcqRel, Ordering::Acquire)
                .map(|_| ()),
            None => Err(UNSET),
        }
    }

    /// Current owner of `v`.
    #[inline]
    pub fn owner(&self, v: VertexId) -> Option<GroupId> {
        let g = self.slots.get(v as usize)?.load(Ordering::Acquire);
        (g != UNSET).then_some(g)
    }

    /// Owned by some group.
    #[inline]
    pub fn is_affected(&self, v: VertexId) -> bool {
        self.owner(v).is_some()
    }

    /// Resets `v` to unset. Called when `v` is freed.
    #[inline]
    pub fn release(&self, v: VertexId) {
        if let Some(slot) = self.slots.get(v as usize) {
            slot.store(UNSET, Ordering::Release);
        }
    }

    /// Number of owned vertices.
    pub fn owned_count(&self) -> usize {
        self.slots.iter().filter(|s| s.load(Ordering::Acquire) != UNSET).count()
    }
}

impl core::fmt::Debug for OwnershipMap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OwnershipMap")
            .field("len", &self.len())
            .field("owned", &self.owned_count())
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    use core::sync::atomic::AtomicUsize;

    #[test]
    fn claim_is_first_writer_wins() {
        let map = OwnershipMap::new(4);
        assert_eq!(map.owner(2), None);
        assert_eq!(map.claim(2, 7), Ok(()));
        assert_eq!(map.claim(2, 9), Err(7));
        assert_eq!(map.claim(2, 7), Err(7));
        assert!(map.is_affected(2));
        assert_eq!(map.owned_count(), 1);

        map.release(2);
        assert_eq!(map.owner(2), None);
        assert_eq!(map.claim(2, 9), Ok(()));
    }

    #[test]
    fn out_of_range_claims_fail() {
        let map = OwnershipMap::new(1);
        assert!(map.claim(5, 0).is_err());
        assert_eq!(map.owner(5), None);
        map.release(5);
    }

    #[test]
    fn contended_claims_have_one_winner_per_vertex() {
        const VERTICES: usize = 64;
        const GROUPS: u32 = 8;

        let map = OwnershipMap::new(VERTICES);
        let wins: Vec<AtomicUsize> = (0..VERTICES).map(|_| AtomicUsize::new(0)).collect();

        std::thread::scope(|s| {
            for g in 0..GROUPS {
                let (map, wins) = (&map, &wins);
                s.spawn(move || {
                    for i in 0..VERTICES {
                        // Stagger groups so they sweep the vertices from different offsets.
                        let v = (i + g as usize * 7) % VERTICES;
                        if i % 3 == 0 {
                            std::thread::yield_now();
                        }
                        if map.claim(v as VertexId, g).is_ok() {
                            wins[v].fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        for (v, w) in wins.iter().enumerate() {
            assert_eq!(w.load(Ordering::Relaxed), 1, "vertex {v}");
            assert!(map.owner(v as VertexId).is_some());
        }
    }
}
