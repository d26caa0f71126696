//! Shared workloads and an independent from-scratch contraction.
#![allow(dead_code)]

use std::collections::BTreeSet;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::DiGraph;
use proptest::prelude::*;
use rake_compress::{Contraction, ContractionOracle, ContractionSnapshot, LocalView, RoundState};

/// Path rooted at 0: `parent(i) = i - 1`.
pub fn bamboo(n: u32) -> Vec<u32> {
    (0..n).map(|i| i.saturating_sub(1)).collect()
}

/// Complete binary tree rooted at 0: `parent(i) = (i - 1) / 2`.
pub fn binary_tree(n: u32) -> Vec<u32> {
    (0..n).map(|i| if i == 0 { 0 } else { (i - 1) / 2 }).collect()
}

/// Whether `parents` describes a forest, checked with petgraph.
pub fn is_forest(parents: &[u32]) -> bool {
    let mut g = DiGraph::<(), ()>::new();
    let nodes: Vec<_> = parents.iter().map(|_| g.add_node(())).collect();
    for (v, &p) in parents.iter().enumerate() {
        if p as usize >= parents.len() {
            return false;
        }
        if p as usize != v {
            g.add_edge(nodes[p as usize], nodes[v], ());
        }
    }
    !is_cyclic_directed(&g)
}

pub fn root_of(parents: &[u32], mut v: u32) -> u32 {
    while parents[v as usize] != v {
        v = parents[v as usize];
    }
    v
}

/// Contracts `parents` round by round with plain vectors, no versions,
/// groups or ownership.
pub fn reference_snapshot<O: ContractionOracle>(parents: &[u32], oracle: &O) -> ContractionSnapshot {
    let n = parents.len();
    let mut parent = parents.to_vec();
    let mut children: Vec<BTreeSet<u32>> = vec![BTreeSet::new(); n];
    for (v, &p) in parents.iter().enumerate() {
        if p as usize != v {
            children[p as usize].insert(v as u32);
        }
    }
    let mut alive = vec![true; n];
    let mut history: Vec<Vec<RoundState>> = vec![Vec::new(); n];
    let mut round = 0u32;

    while alive.iter().any(|&a| a) {
        let decide = |v: usize| -> Contraction {
            let root = parent[v] as usize == v;
            let degree = children[v].len();
            if root && degree == 0 {
                return Contraction::Finalize;
            }
            let only_child = (degree == 1).then(|| {
                let c = *children[v].iter().next().unwrap();
                (c, children[c as usize].is_empty())
            });
            let view = LocalView {
                vertex: v as u32,
                round,
                parent: (!root).then_some(parent[v]),
                degree,
                only_child,
            };
            match (oracle.is_contracted(&view), degree) {
                (false, _) => Contraction::Live,
                (true, 0) => Contraction::Rake,
                (true, 1) => Contraction::Compress,
                (true, d) => panic!("oracle contracted vertex {v} of degree {d}"),
            }
        };
        let decisions: Vec<Option<Contraction>> = (0..n).map(|v| alive[v].then(|| decide(v))).collect();

        let mut next_parent = parent.clone();
        let mut next_children = children.clone();
        for v in 0..n {
            let Some(d) = decisions[v] else { continue };
            history[v].push(RoundState {
                parent: parent[v],
                children: children[v].iter().copied().collect(),
                contraction: d,
            });
            if d != Contraction::Live {
                alive[v] = false;
                continue;
            }
            let p = parent[v] as usize;
            if p != v && decisions[p] == Some(Contraction::Compress) {
                next_parent[v] = parent[p];
            }
            for &c in &children[v] {
                match decisions[c as usize] {
                    Some(Contraction::Rake) => {
                        next_children[v].remove(&c);
                    }
                    Some(Contraction::Compress) => {
                        next_children[v].remove(&c);
                        next_children[v].extend(children[c as usize].iter().copied());
                    }
                    _ => {}
                }
            }
        }
        parent = next_parent;
        children = next_children;
        round += 1;
        assert!(round < 100_000, "reference contraction did not converge");
    }

    ContractionSnapshot { vertices: history }
}

/// Random forest: vertex `i` hangs under some `j <= i` (itself means root).
pub fn forest_strategy(max_n: u32) -> impl Strategy<Value = Vec<u32>> {
    (1..=max_n).prop_flat_map(|n| {
        (0..n)
            .map(|i| (0..=i).boxed())
            .collect::<Vec<_>>()
    })
}

/// Raw edit choices, resolved against a concrete forest by [`make_batch`].
pub fn edits_strategy() -> impl Strategy<Value = (Vec<u32>, Vec<(u32, u32)>)> {
    (
        proptest::collection::vec(any::<u32>(), 0..6),
        proptest::collection::vec((any::<u32>(), any::<u32>()), 0..6),
    )
}

/// Turns raw choices into a valid batch and the parent array it produces.
///
/// Deletions cut a non-root vertex from its parent. Insertions hang the
/// child under a vertex of another tree; a non-root child first has its
/// root path reversed, as the batch applier does.
pub fn make_batch(parents: &[u32], cuts: &[u32], links: &[(u32, u32)]) -> (rake_compress::Batch, Vec<u32>) {
    let n = parents.len() as u32;
    let mut after = parents.to_vec();
    let mut batch = rake_compress::Batch::new();
    for &c in cuts {
        let c = c % n;
        let p = after[c as usize];
        if p != c {
            batch = batch.delete(p, c);
            after[c as usize] = c;
        }
    }
    for &(p, c) in links {
        let (p, c) = (p % n, c % n);
        if root_of(&after, p) == root_of(&after, c) {
            continue;
        }
        evert(&mut after, c);
        batch = batch.insert(p, c);
        after[c as usize] = p;
    }
    (batch, after)
}

/// Makes `v` the root of its tree by reversing the path from `v` to the old root.
pub fn evert(parents: &mut [u32], v: u32) {
    let mut path = vec![v];
    while parents[*path.last().unwrap() as usize] != *path.last().unwrap() {
        let up = parents[*path.last().unwrap() as usize];
        path.push(up);
    }
    parents[v as usize] = v;
    for w in path.windows(2) {
        parents[w[1] as usize] = w[0];
    }
}
