//! Batch applier: validates a batch of edge edits against the round-0
//! topology, then rewrites the touched base versions and seeds one group per
//! touched vertex.
//!
//! Deletions are simulated before insertions on a working overlay, so a
//! vertex cut loose and re-attached in the same batch sees the intermediate
//! state. Nothing is written until the whole batch has been validated.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::brand::GhostToken;
use crate::error::{EdgeRejection, Error, InvariantViolation, Result};
use crate::forest::{ChildSet, Edge, ForestStore};
use crate::update::groups::GroupPartition;
use crate::update::ownership::OwnershipMap;
use crate::update::report::{ClaimRecord, ClaimSource};
use crate::VertexId;

/// Edge edits applied together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Batch {
    /// Edges to add, `parent -> child`. Applied after the deletions.
    pub insertions: Vec<Edge>,
    /// Edges to remove, `parent -> child`.
    pub deletions: Vec<Edge>,
}

impl Batch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of `parent -> child`.
    #[must_use]
    pub fn insert(mut self, parent: VertexId, child: VertexId) -> Self {
        self.insertions.push(Edge::new(parent, child));
        self
    }

    /// Builder-style deletion of `parent -> child`.
    #[must_use]
    pub fn delete(mut self, parent: VertexId, child: VertexId) -> Self {
        self.deletions.push(Edge::new(parent, child));
        self
    }

    /// No edits.
    pub fn is_empty(&self) -> bool {
        self.insertions.is_empty() && self.deletions.is_empty()
    }

    /// Number of edits.
    pub fn len(&self) -> usize {
        self.insertions.len() + self.deletions.len()
    }
}

/// New round-0 topology of a vertex the batch touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Touched {
    pub vertex: VertexId,
    pub parent: VertexId,
    pub children: ChildSet,
}

/// Round-0 topology with the batch's edits layered on top.
struct Overlay<'s, 'brand> {
    token: &'s GhostToken<'brand>,
    store: &'s ForestStore<'brand>,
    index: HashMap<VertexId, usize>,
    touched: Vec<Touched>,
}

impl<'s, 'brand> Overlay<'s, 'brand> {
    fn new(token: &'s GhostToken<'brand>, store: &'s ForestStore<'brand>) -> Self {
        Self {
            token,
            store,
            index: HashMap::new(),
            touched: Vec::new(),
        }
    }

    fn parent(&self, v: VertexId) -> VertexId {
        match self.index.get(&v) {
            Some(&i) => self.touched[i].parent,
            None => self.store.version_at(self.token, v, 0).map_or(v, |b| b.parent()),
        }
    }

    fn degree(&self, v: VertexId) -> usize {
        match self.index.get(&v) {
            Some(&i) => self.touched[i].children.len(),
            None => self.store.version_at(self.token, v, 0).map_or(0, |b| b.degree()),
        }
    }

    fn root(&self, mut v: VertexId) -> VertexId {
        for _ in 0..=self.store.vertex_count() {
            let p = self.parent(v);
            if p == v {
                break;
            }
            v = p;
        }
        v
    }

    /// Path from `v` up to its root, `v` first.
    fn path_to_root(&self, mut v: VertexId) -> Vec<VertexId> {
        let mut path = vec![v];
        for _ in 0..self.store.vertex_count() {
            let p = self.parent(v);
            if p == v {
                break;
            }
            path.push(p);
            v = p;
        }
        path
    }

    fn touch(&mut self, v: VertexId) -> Result<&mut Touched> {
        let i = match self.index.get(&v) {
            Some(&i) => i,
            None => {
                let base = self
                    .store
                    .version_at(self.token, v, 0)
                    .ok_or(InvariantViolation::MissingVersion { vertex: v, round: 0 })?;
                self.touched.push(Touched {
                    vertex: v,
                    parent: base.parent(),
                    children: base.children().clone(),
                });
                self.index.insert(v, self.touched.len() - 1);
                self.touched.len() - 1
            }
        };
        Ok(&mut self.touched[i])
    }

    fn link(&mut self, parent: VertexId, child: VertexId) -> Result<()> {
        self.touch(parent)?.children.insert(child);
        self.touch(child)?.parent = parent;
        Ok(())
    }

    fn cut(&mut self, parent: VertexId, child: VertexId) -> Result<()> {
        self.touch(parent)?.children.remove(child);
        self.touch(child)?.parent = child;
        Ok(())
    }
}

fn reject(edge: Edge, reason: EdgeRejection) -> Error {
    Error::InvalidEdge { edge, reason }
}

fn check_endpoints(n: usize, edge: Edge) -> Result<()> {
    if edge.parent as usize >= n || edge.child as usize >= n {
        return Err(reject(edge, EdgeRejection::UnknownVertex));
    }
    if edge.parent == edge.child {
        return Err(reject(edge, EdgeRejection::SelfLoop));
    }
    Ok(())
}

/// Validates `batch` and returns the new round-0 topology of every touched
/// vertex, in order of first touch. Reads only.
pub(crate) fn plan<'brand>(
    token: &GhostToken<'brand>,
    store: &ForestStore<'brand>,
    batch: &Batch,
    max_degree: Option<usize>,
) -> Result<Vec<Touched>> {
    let n = store.vertex_count();
    let mut overlay = Overlay::new(token, store);

    for &edge in &batch.deletions {
        check_endpoints(n, edge)?;
        if overlay.parent(edge.child) != edge.parent {
            return Err(reject(edge, EdgeRejection::MissingEdge));
        }
        overlay.cut(edge.parent, edge.child)?;
    }

    for &edge in &batch.insertions {
        check_endpoints(n, edge)?;
        let Edge { parent, child } = edge;
        if overlay.parent(child) == parent {
            return Err(reject(edge, EdgeRejection::DuplicateEdge));
        }
        if overlay.root(parent) == overlay.root(child) {
            return Err(reject(edge, EdgeRejection::WouldCreateCycle));
        }
        if let Some(max_degree) = max_degree {
            if overlay.degree(parent) + 1 > max_degree {
                return Err(reject(edge, EdgeRejection::DegreeExceeded { max_degree }));
            }
        }

        overlay.touch(parent)?;
        overlay.touch(child)?;

        // Evert: make `child` the root of its tree by reversing its root path.
        let path = overlay.path_to_root(child);
        if path.len() > 1 {
            if let Some(max_degree) = max_degree {
                if overlay.degree(child) + 1 > max_degree {
                    return Err(reject(edge, EdgeRejection::DegreeExceeded { max_degree }));
                }
            }
            for w in path.windows(2) {
                overlay.cut(w[1], w[0])?;
            }
            for w in path.windows(2) {
                overlay.link(w[0], w[1])?;
            }
        }
        overlay.link(parent, child)?;
    }

    Ok(overlay.touched)
}

/// What seeding a batch produced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Seeded {
    pub groups: usize,
    pub affected: usize,
    pub published: u64,
}

/// Rewrites the base version of every touched vertex and opens one group per
/// touched vertex. A vertex whose leaf status flipped also marks its parent,
/// in the same group, when nobody owns the parent yet.
pub(crate) fn seed<'brand>(
    token: &mut GhostToken<'brand>,
    store: &ForestStore<'brand>,
    owners: &OwnershipMap,
    touched: Vec<Touched>,
    partition: &mut GroupPartition<'brand>,
    mut log: Option<&mut Vec<ClaimRecord>>,
) -> Result<Seeded> {
    let mut seeded = Seeded::default();
    let mut flipped = Vec::new();

    for t in touched {
        let v = t.vertex;
        let old_key = store.key_at(token, v, 0).ok_or(InvariantViolation::MissingVersion { vertex: v, round: 0 })?;
        let mut next = store
            .get(token, old_key)
            .ok_or(InvariantViolation::MissingVersion { vertex: v, round: 0 })?
            .rewrite(old_key);
        next.set_parent(t.parent);
        next.set_children(t.children);
        let flip = (!next.is_root() && next.topology_flipped()).then_some(next.parent());

        let stale = store.rewrite_base(token, next)?;
        seeded.published += 1;

        let g = partition.open();
        seeded.groups += 1;
        partition.group_mut(g).deleted.push(stale);
        if owners.claim(v, g).is_ok() {
            partition.group_mut(g).live.push(v);
            seeded.affected += 1;
            if let Some(log) = log.as_deref_mut() {
                log.push(ClaimRecord::new(None, v, g, ClaimSource::Batch));
            }
        }
        if let Some(p) = flip {
            flipped.push((p, g));
        }
    }

    for (p, g) in flipped {
        if owners.claim(p, g).is_ok() {
            trace!(vertex = p, group = g, "parent of flipped vertex marked");
            partition.group_mut(g).live.push(p);
            seeded.affected += 1;
            if let Some(log) = log.as_deref_mut() {
                log.push(ClaimRecord::new(None, p, g, ClaimSource::Flip));
            }
        }
    }

    Ok(seeded)
}
