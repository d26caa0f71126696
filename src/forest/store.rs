//! `ForestStore`: per-vertex version chains over a shared arena.
//!
//! Vertex `v`'s chain holds one key per round, `chain[r]` describing `v` at
//! the start of round `r`. The last entry is the head. A chain stops growing
//! when the vertex is raked, compressed or finalized; its slot then turns
//! [`Slot::Freed`], which is also the moment its ownership entry is reset.

use crate::brand::{GhostCell, GhostToken};
use crate::error::{Error, ForestDefect, InvariantViolation, Result};
use crate::forest::arena::VersionArena;
use crate::forest::version::{ChildSet, Contraction, Version, VersionKey};
use crate::update::OwnershipMap;
use crate::{Round, VertexId};

/// Lifecycle of a vertex's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot<'brand> {
    /// The engine is still extending the chain; holds the newest version.
    Live(VersionKey<'brand>),
    /// The chain ended in round `epoch`.
    Freed {
        /// Terminal version.
        head: VersionKey<'brand>,
        /// Round in which the vertex left the forest.
        epoch: Round,
    },
}

impl<'brand> Slot<'brand> {
    /// Still being extended.
    pub fn is_live(&self) -> bool {
        matches!(self, Slot::Live(_))
    }

    /// Round the chain ended, if it has.
    pub fn epoch(&self) -> Option<Round> {
        match *self {
            Slot::Freed { epoch, .. } => Some(epoch),
            Slot::Live(_) => None,
        }
    }
}

struct VertexEntry<'brand> {
    chain: Vec<VersionKey<'brand>>,
    slot: Slot<'brand>,
}

/// Canonical owner of every vertex's versions.
pub struct ForestStore<'brand> {
    n: usize,
    arena: VersionArena<'brand>,
    entries: GhostCell<'brand, Vec<VertexEntry<'brand>>>,
}

impl<'brand> ForestStore<'brand> {
    /// Builds round-0 versions from a parent array (`parents[v] == v` marks a root).
    ///
    /// # Errors
    /// `MalformedForest` for out-of-range parents, cycles, or a vertex with
    /// more than `max_degree` children.
    pub fn from_parents(
        token: &mut GhostToken<'brand>,
        parents: &[VertexId],
        max_degree: Option<usize>,
    ) -> Result<Self> {
        let n = parents.len();
        if u32::try_from(n).is_err() {
            return Err(Error::MalformedForest {
                vertex: u32::MAX,
                reason: ForestDefect::TooManyVertices,
            });
        }
        validate_parents(parents)?;

        let mut children: Vec<ChildSet> = vec![ChildSet::new(); n];
        for (v, &p) in parents.iter().enumerate() {
            let v = v as VertexId;
            if p != v {
                children[p as usize].insert(v);
            }
        }
        if let Some(max_degree) = max_degree {
            if let Some(v) = children.iter().position(|c| c.len() > max_degree) {
                return Err(Error::MalformedForest {
                    vertex: v as VertexId,
                    reason: ForestDefect::DegreeExceeded { max_degree },
                });
            }
        }

        let arena = VersionArena::with_capacity(2 * n);
        let mut entries = Vec::with_capacity(n);
        for (v, kids) in children.into_iter().enumerate() {
            let v = v as VertexId;
            let key = arena.alloc(token, Version::new(v, 0, parents[v as usize], kids));
            entries.push(VertexEntry { chain: vec![key], slot: Slot::Live(key) });
        }

        Ok(Self {
            n,
            arena,
            entries: GhostCell::new(entries),
        })
    }

    /// Number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.n
    }

    /// Versions currently held by the arena, stale ones included.
    pub fn version_count(&self, token: &GhostToken<'brand>) -> usize {
        self.arena.len(token)
    }

    /// Key of `v`'s version for round `r`.
    #[inline]
    pub fn key_at(&self, token: &GhostToken<'brand>, v: VertexId, r: Round) -> Option<VersionKey<'brand>> {
        self.entries.borrow(token).get(v as usize)?.chain.get(r as usize).copied()
    }

    /// `v`'s version for round `r`.
    #[inline]
    pub fn version_at<'a>(&'a self, token: &'a GhostToken<'brand>, v: VertexId, r: Round) -> Option<&'a Version<'brand>> {
        let key = self.key_at(token, v, r)?;
        self.arena.get(token, key)
    }

    /// Resolves any key, stale or not.
    #[inline]
    pub fn get<'a>(&'a self, token: &'a GhostToken<'brand>, key: VersionKey<'brand>) -> Option<&'a Version<'brand>> {
        self.arena.get(token, key)
    }

    /// Newest version in `v`'s chain.
    pub fn head<'a>(&'a self, token: &'a GhostToken<'brand>, v: VertexId) -> Option<&'a Version<'brand>> {
        let key = *self.entries.borrow(token).get(v as usize)?.chain.last()?;
        self.arena.get(token, key)
    }

    /// `v`'s slot.
    pub fn slot(&self, token: &GhostToken<'brand>, v: VertexId) -> Option<Slot<'brand>> {
        self.entries.borrow(token).get(v as usize).map(|e| e.slot)
    }

    /// Number of rounds `v`'s chain covers.
    pub fn chain_len(&self, token: &GhostToken<'brand>, v: VertexId) -> usize {
        self.entries.borrow(token).get(v as usize).map_or(0, |e| e.chain.len())
    }

    /// `v`'s versions, round 0 first.
    pub fn chain<'a>(&'a self, token: &'a GhostToken<'brand>, v: VertexId) -> impl Iterator<Item = &'a Version<'brand>> + 'a {
        let keys: &'a [VersionKey<'brand>] = self
            .entries
            .borrow(token)
            .get(v as usize)
            .map_or(&[][..], |e| e.chain.as_slice());
        keys.iter().filter_map(move |&k| self.arena.get(token, k))
    }

    /// Records the decision and frontier flag of `v` in round `r`.
    pub fn record(
        &self,
        token: &mut GhostToken<'brand>,
        v: VertexId,
        r: Round,
        contraction: Contraction,
        frontier: bool,
    ) -> Result<()> {
        let key = self.key_at(token, v, r).ok_or(InvariantViolation::MissingVersion { vertex: v, round: r })?;
        let version = self
            .arena
            .get_mut(token, key)
            .ok_or(InvariantViolation::MissingVersion { vertex: v, round: r })?;
        version.state.contraction = contraction;
        version.state.frontier = frontier;
        Ok(())
    }

    /// Ends `v`'s chain at round `epoch`, releases its ownership entry, and
    /// returns the now-stale later versions for deferred reclamation.
    pub fn free_vertex(
        &self,
        token: &mut GhostToken<'brand>,
        owners: &OwnershipMap,
        v: VertexId,
        epoch: Round,
    ) -> Result<Vec<VersionKey<'brand>>> {
        let entry = self
            .entries
            .borrow_mut(token)
            .get_mut(v as usize)
            .ok_or(InvariantViolation::MissingVersion { vertex: v, round: epoch })?;
        let keep = epoch as usize + 1;
        if entry.chain.len() < keep {
            return Err(InvariantViolation::MissingVersion { vertex: v, round: epoch }.into());
        }
        let stale = entry.chain.split_off(keep);
        entry.slot = Slot::Freed { head: entry.chain[epoch as usize], epoch };
        owners.release(v);
        Ok(stale)
    }

    /// Publishes `next` as `v`'s version for `next.round()`, sealing the
    /// previous round. Returns the same-round version it displaced, if any;
    /// later rounds keep their recorded versions until they are redone too.
    pub fn advance(&self, token: &mut GhostToken<'brand>, next: Version<'brand>) -> Result<Option<VersionKey<'brand>>> {
        let v = next.vertex();
        let round = next.round();
        let prior = next.prior();

        let len = self.chain_len(token, v);
        if round == 0 || len < round as usize {
            return Err(InvariantViolation::MissingVersion { vertex: v, round: round.saturating_sub(1) }.into());
        }

        let key = self.arena.alloc(token, next);
        if let Some(prior) = prior {
            if let Some(old) = self.arena.get_mut(token, prior) {
                old.successor = Some(key);
            }
        }

        let entry = &mut self.entries.borrow_mut(token)[v as usize];
        entry.slot = Slot::Live(key);
        if entry.chain.len() == round as usize {
            entry.chain.push(key);
            Ok(None)
        } else {
            Ok(Some(core::mem::replace(&mut entry.chain[round as usize], key)))
        }
    }

    /// Replaces `v`'s round-0 version with an edited copy and returns the
    /// superseded key. The rest of the chain is left for the engine to redo.
    pub fn rewrite_base(&self, token: &mut GhostToken<'brand>, next: Version<'brand>) -> Result<VersionKey<'brand>> {
        let v = next.vertex();
        let old = self.key_at(token, v, 0).ok_or(InvariantViolation::MissingVersion { vertex: v, round: 0 })?;
        let key = self.arena.alloc(token, next);
        if let Some(prev) = self.arena.get_mut(token, old) {
            prev.successor = Some(key);
        }
        let entry = &mut self.entries.borrow_mut(token)[v as usize];
        entry.chain[0] = key;
        entry.slot = Slot::Live(key);
        Ok(old)
    }

    /// Returns a stale version's slot to the arena.
    pub fn reclaim(&self, token: &mut GhostToken<'brand>, key: VersionKey<'brand>) -> bool {
        self.arena.free(token, key).is_some()
    }

    /// Round-0 parent of every vertex.
    pub fn parents(&self, token: &GhostToken<'brand>) -> Vec<VertexId> {
        (0..self.n as VertexId)
            .map(|v| self.version_at(token, v, 0).map_or(v, Version::parent))
            .collect()
    }
}

/// Checks ranges and acyclicity in O(n).
fn validate_parents(parents: &[VertexId]) -> Result<()> {
    const UNSEEN: u8 = 0;
    const ON_PATH: u8 = 1;
    const DONE: u8 = 2;

    let n = parents.len();
    for (v, &p) in parents.iter().enumerate() {
        if p as usize >= n {
            return Err(Error::MalformedForest {
                vertex: v as VertexId,
                reason: ForestDefect::ParentOutOfRange { parent: p },
            });
        }
    }

    let mut mark = vec![UNSEEN; n];
    let mut path = Vec::new();
    for start in 0..n {
        let mut v = start;
        while mark[v] == UNSEEN {
            mark[v] = ON_PATH;
            path.push(v);
            let p = parents[v] as usize;
            if p == v {
                break;
            }
            v = p;
        }
        if mark[v] == ON_PATH && parents[v] as usize != v {
            return Err(Error::MalformedForest {
                vertex: v as VertexId,
                reason: ForestDefect::Cycle,
            });
        }
        for u in path.drain(..) {
            mark[u] = DONE;
        }
    }
    Ok(())
}
