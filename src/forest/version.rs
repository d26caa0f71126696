//! One snapshot of a vertex's contraction state.

use core::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::brand::InvariantLifetime;
use crate::{Round, VertexId};

/// Children kept inline before spilling to the heap.
pub const INLINE_CHILDREN: usize = 4;

/// A directed forest edge, `parent -> child`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    /// The upper endpoint.
    pub parent: VertexId,
    /// The lower endpoint.
    pub child: VertexId,
}

impl Edge {
    /// `parent -> child`.
    pub const fn new(parent: VertexId, child: VertexId) -> Self {
        Self { parent, child }
    }
}

impl From<(VertexId, VertexId)> for Edge {
    fn from((parent, child): (VertexId, VertexId)) -> Self {
        Self { parent, child }
    }
}

/// What a vertex did in a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Contraction {
    /// Survived into the next round (or not evaluated yet).
    #[default]
    Live,
    /// Leaf absorbed into its parent.
    Rake,
    /// Single-child vertex spliced out between parent and child.
    Compress,
    /// Isolated root; its tree is fully contracted.
    Finalize,
}

impl Contraction {
    /// Raked or compressed.
    #[inline]
    pub const fn is_contracted(self) -> bool {
        matches!(self, Contraction::Rake | Contraction::Compress)
    }

    /// The chain ends in this round.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Contraction::Live)
    }
}

/// Per-round flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionState {
    /// Decision taken in this version's round.
    pub contraction: Contraction,
    /// Leaf status of the version this one replaced (or its own, if fresh).
    pub singleton: bool,
    /// A neighbour changed contraction status in this round.
    pub frontier: bool,
}

/// Generational handle to a [`Version`] in a forest's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionKey<'brand> {
    pub(crate) index: u32,
    pub(crate) generation: u32,
    _brand: InvariantLifetime<'brand>,
}

impl<'brand> VersionKey<'brand> {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _brand: InvariantLifetime::new(),
        }
    }

    /// Arena slot.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when the key was minted.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for VersionKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionKey({}v{})", self.index, self.generation)
    }
}

/// Sorted child list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ChildSet(SmallVec<[VertexId; INLINE_CHILDREN]>);

impl ChildSet {
    /// Empty set.
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Number of children.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No children.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Membership test.
    #[inline]
    pub fn contains(&self, v: VertexId) -> bool {
        self.0.binary_search(&v).is_ok()
    }

    /// Inserts `v`; returns false if it was present.
    pub fn insert(&mut self, v: VertexId) -> bool {
        match self.0.binary_search(&v) {
            Ok(_) => false,
            Err(at) => {
                self.0.insert(at, v);
                true
            }
        }
    }

    /// Removes `v`; returns false if it was absent.
    pub fn remove(&mut self, v: VertexId) -> bool {
        match self.0.binary_search(&v) {
            Ok(at) => {
                self.0.remove(at);
                true
            }
            Err(_) => false,
        }
    }

    /// Children in ascending order.
    #[inline]
    pub fn as_slice(&self) -> &[VertexId] {
        &self.0
    }

    /// Iterates in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<VertexId> for ChildSet {
    fn from_iter<I: IntoIterator<Item = VertexId>>(iter: I) -> Self {
        let mut v: SmallVec<[VertexId; INLINE_CHILDREN]> = iter.into_iter().collect();
        v.sort_unstable();
        v.dedup();
        Self(v)
    }
}

/// A vertex as it stands at the start of one round.
///
/// Topology (`parent`, `children`) is fixed once the version is published
/// into a chain; only the per-round [`VersionState`] is recomputed, and only
/// by the group owning the vertex.
#[derive(Debug, Clone)]
pub struct Version<'brand> {
    vertex: VertexId,
    round: Round,
    parent: VertexId,
    children: ChildSet,
    pub(crate) state: VersionState,
    pub(crate) prior: Option<VersionKey<'brand>>,
    pub(crate) successor: Option<VersionKey<'brand>>,
}

impl<'brand> Version<'brand> {
    /// A fresh version. `parent == vertex` marks a root.
    pub fn new(vertex: VertexId, round: Round, parent: VertexId, children: ChildSet) -> Self {
        let singleton = children.is_empty();
        Self {
            vertex,
            round,
            parent,
            children,
            state: VersionState { singleton, ..VersionState::default() },
            prior: None,
            successor: None,
        }
    }

    /// Copy-on-write clone for the next round: same topology, fresh state,
    /// no links. Still mutable until published.
    pub fn prepare(&self) -> Self {
        Self {
            vertex: self.vertex,
            round: self.round + 1,
            parent: self.parent,
            children: self.children.clone(),
            state: VersionState { singleton: self.children.is_empty(), ..VersionState::default() },
            prior: None,
            successor: None,
        }
    }

    /// Copy-on-write clone for the same round, used when a batch edits the
    /// live topology. `prior` must be the key of `self`.
    pub(crate) fn rewrite(&self, prior: VersionKey<'brand>) -> Self {
        Self {
            vertex: self.vertex,
            round: self.round,
            parent: self.parent,
            children: self.children.clone(),
            state: VersionState { singleton: self.children.is_empty(), ..VersionState::default() },
            prior: Some(prior),
            successor: None,
        }
    }

    /// Owning vertex.
    #[inline]
    pub fn vertex(&self) -> VertexId {
        self.vertex
    }

    /// Round this version describes.
    #[inline]
    pub fn round(&self) -> Round {
        self.round
    }

    /// Parent vertex (itself for a root).
    #[inline]
    pub fn parent(&self) -> VertexId {
        self.parent
    }

    /// Children.
    #[inline]
    pub fn children(&self) -> &ChildSet {
        &self.children
    }

    /// Number of children.
    #[inline]
    pub fn degree(&self) -> usize {
        self.children.len()
    }

    /// Own parent.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent == self.vertex
    }

    /// Recorded leaf status before this version's edits.
    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.state.singleton
    }

    /// Raked or compressed in this round.
    #[inline]
    pub fn is_contracted(&self) -> bool {
        self.state.contraction.is_contracted()
    }

    /// Per-round flags.
    #[inline]
    pub fn state(&self) -> VersionState {
        self.state
    }

    /// Decision recorded for this round.
    #[inline]
    pub fn contraction(&self) -> Contraction {
        self.state.contraction
    }

    /// Whether a neighbour changed contraction status in this round.
    #[inline]
    pub fn is_frontier(&self) -> bool {
        self.state.frontier
    }

    /// Leaf status changed relative to the replaced version
    /// (`degree() == 0 XOR is_singleton()`); the parent must be re-evaluated.
    #[inline]
    pub fn topology_flipped(&self) -> bool {
        (self.degree() == 0) ^ self.is_singleton()
    }

    /// Version this one superseded, if it was an update.
    #[inline]
    pub fn prior(&self) -> Option<VersionKey<'brand>> {
        self.prior
    }

    /// Version that superseded this one, if any.
    #[inline]
    pub fn successor(&self) -> Option<VersionKey<'brand>> {
        self.successor
    }

    /// The other endpoint for every incident edge, parent first.
    pub fn neighbours(&self) -> impl Iterator<Item = VertexId> + '_ {
        let parent = (!self.is_root()).then_some(self.parent);
        parent.into_iter().chain(self.children.iter())
    }

    /// Re-points the parent.
    #[inline]
    pub fn set_parent(&mut self, parent: VertexId) {
        self.parent = parent;
    }

    /// Adds a child; false if already present.
    #[inline]
    pub fn add_child(&mut self, child: VertexId) -> bool {
        self.children.insert(child)
    }

    /// Removes a child; false if absent.
    #[inline]
    pub fn remove_child(&mut self, child: VertexId) -> bool {
        self.children.remove(child)
    }

    /// Replaces the whole child list.
    #[inline]
    pub(crate) fn set_children(&mut self, children: ChildSet) {
        self.children = children;
    }

    /// Records the leaf status of the version being replaced.
    #[inline]
    pub(crate) fn set_singleton(&mut self, singleton: bool) {
        self.state.singleton = singleton;
    }
}
