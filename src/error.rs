//! Error taxonomy.
//!
//! Caller mistakes (`InvalidEdge`, `MalformedForest`) are reported before any
//! state is touched. `InvariantViolation` means the oracle or the engine broke
//! a structural rule mid-batch; the forest must be considered corrupted and
//! rebuilt with [`ContractionForest::initialize`](crate::ContractionForest::initialize).

use core::fmt;

use crate::forest::{Contraction, Edge};
use crate::{GroupId, Round, VertexId};

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors surfaced by forest construction and batch updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A batch edge was rejected; nothing was applied.
    InvalidEdge {
        /// The offending edge as supplied by the caller.
        edge: Edge,
        /// Why it was rejected.
        reason: EdgeRejection,
    },
    /// The parent array handed to `initialize` is not a forest.
    MalformedForest {
        /// First vertex found to break the shape.
        vertex: VertexId,
        /// What is wrong with it.
        reason: ForestDefect,
    },
    /// A structural rule failed mid-round. Not recoverable.
    InvariantViolation(InvariantViolation),
}

/// Reasons a batch edge is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeRejection {
    /// An endpoint is `>= vertex_count()`.
    UnknownVertex,
    /// `parent == child`.
    SelfLoop,
    /// Deleting an edge that is not in the forest.
    MissingEdge,
    /// Inserting an edge that is already in the forest.
    DuplicateEdge,
    /// Inserting an edge between two vertices of the same tree.
    WouldCreateCycle,
    /// The parent would exceed the configured degree bound.
    DegreeExceeded {
        /// Configured bound.
        max_degree: usize,
    },
}

/// Reasons a parent array is not a forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForestDefect {
    /// The parent index is `>= n`.
    ParentOutOfRange {
        /// The parent that was named.
        parent: VertexId,
    },
    /// Following parents from this vertex never reaches a root.
    Cycle,
    /// The vertex has more children than the configured bound.
    DegreeExceeded {
        /// Configured bound.
        max_degree: usize,
    },
    /// More vertices than a `VertexId` can name.
    TooManyVertices,
}

/// Internal invariants checked while rounds execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A group produced a write for a vertex it does not own this round.
    ForeignWrite {
        /// Vertex written.
        vertex: VertexId,
        /// Group that wrote it.
        group: GroupId,
        /// Group recorded in the ownership map, if any.
        owner: Option<GroupId>,
    },
    /// The oracle contracted a vertex that cannot contract in its shape.
    IllegalContraction {
        /// Vertex concerned.
        vertex: VertexId,
        /// Round of the decision.
        round: Round,
        /// Its degree in that round.
        degree: usize,
        /// Whether it was a root.
        root: bool,
    },
    /// A compress was scheduled next to a rake or another compress.
    ConflictingContraction {
        /// The compressing vertex.
        vertex: VertexId,
        /// Its neighbour that also left the forest.
        neighbour: VertexId,
        /// What the neighbour did.
        neighbour_contraction: Contraction,
        /// Round of the conflict.
        round: Round,
    },
    /// A vertex that should be alive in `round` has no version there.
    MissingVersion {
        /// Vertex concerned.
        vertex: VertexId,
        /// Round that was looked up.
        round: Round,
    },
    /// A vertex's leaf status flipped (`degree() == 0 XOR is_singleton()`)
    /// but its parent has nothing to re-evaluate in the next round.
    DetachedFlip {
        /// Vertex whose topology flipped.
        vertex: VertexId,
        /// Its parent in the next round.
        parent: VertexId,
        /// Round in which the flip was observed.
        round: Round,
    },
    /// The engine stopped with a vertex still marked live or still owned.
    Unsettled {
        /// Vertex concerned.
        vertex: VertexId,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidEdge { edge, reason } => {
                write!(f, "invalid edge {} -> {}: {reason}", edge.parent, edge.child)
            }
            Error::MalformedForest { vertex, reason } => {
                write!(f, "malformed forest at vertex {vertex}: {reason}")
            }
            Error::InvariantViolation(v) => write!(f, "invariant violation: {v}"),
        }
    }
}

impl fmt::Display for EdgeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeRejection::UnknownVertex => f.write_str("endpoint is not a vertex of the forest"),
            EdgeRejection::SelfLoop => f.write_str("edge is a self loop"),
            EdgeRejection::MissingEdge => f.write_str("edge is not in the forest"),
            EdgeRejection::DuplicateEdge => f.write_str("edge is already in the forest"),
            EdgeRejection::WouldCreateCycle => f.write_str("endpoints are already connected"),
            EdgeRejection::DegreeExceeded { max_degree } => {
                write!(f, "parent would exceed {max_degree} children")
            }
        }
    }
}

impl fmt::Display for ForestDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForestDefect::ParentOutOfRange { parent } => write!(f, "parent {parent} is out of range"),
            ForestDefect::Cycle => f.write_str("parent chain never reaches a root"),
            ForestDefect::DegreeExceeded { max_degree } => {
                write!(f, "more than {max_degree} children")
            }
            ForestDefect::TooManyVertices => f.write_str("vertex count exceeds u32::MAX"),
        }
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::ForeignWrite { vertex, group, owner } => match owner {
                Some(owner) => write!(f, "group {group} wrote vertex {vertex} owned by group {owner}"),
                None => write!(f, "group {group} wrote unowned vertex {vertex}"),
            },
            InvariantViolation::IllegalContraction { vertex, round, degree, root } => write!(
                f,
                "vertex {vertex} contracted in round {round} with degree {degree} (root: {root})"
            ),
            InvariantViolation::ConflictingContraction {
                vertex,
                neighbour,
                neighbour_contraction,
                round,
            } => write!(
                f,
                "vertex {vertex} compressed in round {round} next to {neighbour} ({neighbour_contraction:?})"
            ),
            InvariantViolation::MissingVersion { vertex, round } => {
                write!(f, "vertex {vertex} has no version for round {round}")
            }
            InvariantViolation::DetachedFlip { vertex, parent, round } => write!(
                f,
                "vertex {vertex} flipped leaf status in round {round} under dead parent {parent}"
            ),
            InvariantViolation::Unsettled { vertex } => {
                write!(f, "vertex {vertex} is still live or owned after convergence")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<InvariantViolation> for Error {
    fn from(v: InvariantViolation) -> Self {
        Error::InvariantViolation(v)
    }
}
