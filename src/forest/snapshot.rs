//! Owned, comparable copy of a forest's contraction.

use serde::{Deserialize, Serialize};

use crate::forest::version::{Contraction, Version};
use crate::{Round, VertexId};

/// One vertex in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundState {
    /// Parent at the start of the round (itself for a root).
    pub parent: VertexId,
    /// Children at the start of the round, ascending.
    pub children: Vec<VertexId>,
    /// Decision taken in the round.
    pub contraction: Contraction,
}

impl From<&Version<'_>> for RoundState {
    fn from(v: &Version<'_>) -> Self {
        Self {
            parent: v.parent(),
            children: v.children().as_slice().to_vec(),
            contraction: v.contraction(),
        }
    }
}

/// Every vertex's history, round 0 first.
///
/// Two forests over the same topology and oracle have equal snapshots no
/// matter how they got there (from-scratch build, batches, either execution
/// mode). Arena keys and frontier flags are deliberately left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractionSnapshot {
    /// `vertices[v][r]` is vertex `v` in round `r`.
    pub vertices: Vec<Vec<RoundState>>,
}

impl ContractionSnapshot {
    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Rounds until the last tree collapsed.
    pub fn depth(&self) -> usize {
        self.vertices.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// `v` in round `r`, if it was still alive.
    pub fn at(&self, v: VertexId, r: Round) -> Option<&RoundState> {
        self.vertices.get(v as usize)?.get(r as usize)
    }

    /// `v`'s terminal decision.
    pub fn final_contraction(&self, v: VertexId) -> Option<Contraction> {
        self.vertices.get(v as usize)?.last().map(|s| s.contraction)
    }

    /// Whether `v` was raked or compressed in round `r`; false if it was not
    /// alive then.
    pub fn contracted_at(&self, v: VertexId, r: Round) -> bool {
        self.at(v, r).is_some_and(|s| s.contraction.is_contracted())
    }

    /// Serialises to JSON.
    ///
    /// # Errors
    /// The `serde_json` error, which cannot occur for well-formed snapshots.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
