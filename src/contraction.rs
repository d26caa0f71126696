//! The contraction predicate.
//!
//! The engine asks an oracle one question per vertex and round: does this
//! vertex leave the forest now? The answer must depend only on the vertex's
//! local view (its id, degree, parent, only child) and the round, and a
//! vertex whose surroundings stop changing must eventually be told yes.
//!
//! What a yes means is decided by shape:
//! - a leaf is **raked** into its parent;
//! - a vertex with one child is **compressed**, splicing the child onto the
//!   parent;
//! - an isolated root is **finalized** by the engine without asking.
//!
//! Answers the shape cannot honour (contracting a root or a branching
//! vertex, compressing above a leaf, compressing two neighbours at once) are
//! rejected by the engine as invariant violations.

use core::hash::Hasher;

use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher13;

use crate::{Round, VertexId};

/// Everything an oracle may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalView {
    /// Vertex being decided.
    pub vertex: VertexId,
    /// Current round.
    pub round: Round,
    /// Parent, or `None` for a root.
    pub parent: Option<VertexId>,
    /// Number of children.
    pub degree: usize,
    /// The only child and whether it is a leaf, when `degree == 1`.
    ///
    /// Only the child's leaf status is exposed: it is the one property of a
    /// neighbour whose change the engine propagates to the parent.
    pub only_child: Option<(VertexId, bool)>,
}

impl LocalView {
    /// True for a non-root vertex without children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.parent.is_some() && self.degree == 0
    }

    /// True for a non-root vertex whose single child is not a leaf.
    #[inline]
    pub fn is_chain(&self) -> bool {
        self.parent.is_some() && matches!(self.only_child, Some((_, false)))
    }
}

/// A round-dependent contraction predicate.
pub trait ContractionOracle: Send + Sync {
    /// Whether `view.vertex` contracts in `view.round`.
    fn is_contracted(&self, view: &LocalView) -> bool;
}

impl<O: ContractionOracle + ?Sized> ContractionOracle for &O {
    fn is_contracted(&self, view: &LocalView) -> bool {
        (**self).is_contracted(view)
    }
}

/// The predicates shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractionScheme {
    /// Rake every leaf, never compress. Rounds are bounded by tree height.
    RakeOnly,
    /// Rake every leaf; compress chain vertices chosen by coin flips so that
    /// no two neighbours compress together. Expected O(log n) rounds.
    RakeCompress {
        /// Key for the per-(vertex, round) coins.
        seed: u64,
    },
}

impl Default for ContractionScheme {
    fn default() -> Self {
        ContractionScheme::RakeCompress { seed: 0x5eed_cafe }
    }
}

impl ContractionScheme {
    /// Deterministic fair coin for `(vertex, round)`.
    #[inline]
    pub fn heads(seed: u64, vertex: VertexId, round: Round) -> bool {
        let mut h = SipHasher13::new_with_keys(seed, 0x7261_6b65);
        h.write_u32(vertex);
        h.write_u32(round);
        h.finish() & 1 == 1
    }
}

impl ContractionOracle for ContractionScheme {
    fn is_contracted(&self, view: &LocalView) -> bool {
        if view.is_leaf() {
            return true;
        }
        match *self {
            ContractionScheme::RakeOnly => false,
            ContractionScheme::RakeCompress { seed } => {
                if !view.is_chain() {
                    return false;
                }
                let (Some(parent), Some((child, _))) = (view.parent, view.only_child) else {
                    return false;
                };
                Self::heads(seed, view.vertex, view.round)
                    && !Self::heads(seed, parent, view.round)
                    && !Self::heads(seed, child, view.round)
            }
        }
    }
}
