//! Per-run diagnostics.

use core::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use serde::{Deserialize, Serialize};

use crate::{GroupId, Round, RoundCount, VertexId};

/// Why a group came to own a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSource {
    /// Endpoint of a batch edge.
    Batch,
    /// Parent of a vertex whose leaf status flipped.
    Flip,
    /// Neighbour of a vertex whose contraction status mattered this round.
    Propose,
    /// Parent of a vertex whose leaf status flipped while advancing.
    Reseed,
    /// Block assignment during a from-scratch build.
    Construction,
}

/// One successful ownership write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Round of the claim, `None` before the first round.
    pub round: Option<Round>,
    /// Vertex claimed.
    pub vertex: VertexId,
    /// Winning group.
    pub group: GroupId,
    /// Phase that claimed it.
    pub source: ClaimSource,
}

impl ClaimRecord {
    pub(crate) fn new(round: Option<Round>, vertex: VertexId, group: GroupId, source: ClaimSource) -> Self {
        Self { round, vertex, group, source }
    }
}

/// Summary of the last `initialize` or `apply_batch`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReport {
    /// Rounds executed until no group was active.
    pub rounds: RoundCount,
    /// Groups opened.
    pub groups: usize,
    /// Vertices marked affected before the first round.
    pub initial_affected: usize,
    /// Vertex-rounds recomputed.
    pub vertices_processed: u64,
    /// Ownership claims that succeeded during rounds.
    pub claims_won: u64,
    /// Claims that found the vertex owned by another group.
    pub claims_lost: u64,
    /// Versions written.
    pub versions_published: u64,
    /// Stale versions returned to the arena.
    pub versions_reclaimed: u64,
    /// Vertex-rounds whose frontier flag was set.
    pub frontier_vertices: u64,
}

/// Counters bumped from parallel phases.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub processed: CachePadded<AtomicU64>,
    pub claims_won: CachePadded<AtomicU64>,
    pub claims_lost: CachePadded<AtomicU64>,
    pub frontier: CachePadded<AtomicU64>,
}

impl Counters {
    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        if n != 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn load(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
