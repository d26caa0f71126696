//! Round engine: synchronous supersteps over the active groups.
//!
//! Each round runs `SWAP -> PROPOSE -> COMMIT -> RESEED -> ADVANCE -> COMPACT`.
//! Phases that only read forest state (PROPOSE, the compute half of COMMIT,
//! RESEED) run in parallel across groups under a shared token; their results
//! are applied sequentially under the exclusive token. Every parallel loop
//! returns only when all groups are done, so a phase never observes a
//! half-written ownership map.
//!
//! For a vertex `v` alive in round `r` the engine recomputes, from the
//! round-`r` versions of `v` and its neighbours:
//! - `v`'s decision (live, rake, compress, finalize);
//! - if `v` stays live, its round-`r + 1` version: a compressing parent is
//!   replaced by the grandparent, a raked child is dropped, a compressing
//!   child is replaced by its only child.

use tracing::{debug, trace};

use crate::brand::GhostToken;
use crate::contraction::{ContractionOracle, LocalView};
use crate::error::{InvariantViolation, Result};
use crate::forest::{Contraction, ForestStore, Version};
use crate::parallel::{filter, fork_join, parallel_for, parallel_map, Parallelism};
use crate::update::groups::{GroupPartition, GroupSets};
use crate::update::ownership::OwnershipMap;
use crate::update::report::{ClaimRecord, ClaimSource, Counters, UpdateReport};
use crate::{GroupId, Round, RoundCount, VertexId};

/// Whether a run builds the forest or repairs it after a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunMode {
    /// Every vertex starts affected; there is no earlier state to compare with.
    Construction,
    /// Only batch-touched vertices start affected.
    Update,
}

/// All round state of one run. Created when a run starts and dropped when it
/// converges, so nothing leaks from one batch into the next.
pub(crate) struct RoundContext<'brand> {
    pub partition: GroupPartition<'brand>,
    pub log: Option<Vec<ClaimRecord>>,
    pub report: UpdateReport,
    counters: Counters,
}

impl<'brand> RoundContext<'brand> {
    pub fn new(record_ownership: bool) -> Self {
        Self {
            partition: GroupPartition::new(),
            log: record_ownership.then(Vec::new),
            report: UpdateReport::default(),
            counters: Counters::default(),
        }
    }

    fn log(&mut self, records: Vec<ClaimRecord>) {
        if let Some(log) = self.log.as_mut() {
            log.extend(records);
        }
    }
}

/// A vertex's outcome for one round.
struct Settled<'brand> {
    vertex: VertexId,
    contraction: Contraction,
    frontier: bool,
    /// Round `r + 1` version when the vertex stays live.
    next: Option<Version<'brand>>,
}

/// What one group claimed in PROPOSE.
struct Proposal {
    group: GroupId,
    claimed: Vec<VertexId>,
    log: Vec<ClaimRecord>,
}

/// What one group claimed in RESEED.
struct Reseed {
    claimed: Vec<VertexId>,
    log: Vec<ClaimRecord>,
}

pub(crate) struct Engine<'a, 'brand, O> {
    store: &'a ForestStore<'brand>,
    owners: &'a OwnershipMap,
    oracle: &'a O,
    par: Parallelism,
    mode: RunMode,
}

impl<'a, 'brand, O: ContractionOracle> Engine<'a, 'brand, O> {
    pub fn new(
        store: &'a ForestStore<'brand>,
        owners: &'a OwnershipMap,
        oracle: &'a O,
        par: Parallelism,
        mode: RunMode,
    ) -> Self {
        Self { store, owners, oracle, par, mode }
    }

    /// Splits all vertices into contiguous blocks of `block`, one group each,
    /// every vertex affected and owned by its block's group. Blocks are
    /// disjoint, so their claims run in parallel.
    pub fn seed_construction(&self, ctx: &mut RoundContext<'brand>, block: usize) {
        let n = self.store.vertex_count();
        let block = block.max(1);
        let blocks: Vec<(GroupId, usize, usize)> = (0..n)
            .step_by(block)
            .map(|start| (ctx.partition.open(), start, (start + block).min(n)))
            .collect();

        let owners = self.owners;
        parallel_for(self.par, 0, blocks.len(), |b| {
            let (g, start, end) = blocks[b];
            for v in start..end {
                let _ = owners.claim(v as VertexId, g);
            }
        });

        for &(g, start, end) in &blocks {
            let mut records = Vec::new();
            for v in start as VertexId..end as VertexId {
                if self.owners.owner(v) == Some(g) {
                    ctx.partition.group_mut(g).live.push(v);
                    if ctx.log.is_some() {
                        records.push(ClaimRecord::new(None, v, g, ClaimSource::Construction));
                    }
                }
            }
            ctx.log(records);
        }
        ctx.report.groups = ctx.partition.len();
        ctx.report.initial_affected = n;
    }

    /// Runs rounds until no group is active and returns how many ran.
    pub fn run(&self, token: &mut GhostToken<'brand>, ctx: &mut RoundContext<'brand>) -> Result<RoundCount> {
        ctx.partition.retain_nonempty();
        let mut round: Round = 0;
        while !ctx.partition.active().is_empty() {
            self.round(token, ctx, round)?;
            round += 1;
        }

        #[cfg(debug_assertions)]
        self.check_settled(token)?;

        let c = &ctx.counters;
        let report = &mut ctx.report;
        report.rounds = round;
        report.vertices_processed = Counters::load(&c.processed);
        report.claims_won = Counters::load(&c.claims_won);
        report.claims_lost = Counters::load(&c.claims_lost);
        report.frontier_vertices = Counters::load(&c.frontier);
        Ok(round)
    }

    fn round(&self, token: &mut GhostToken<'brand>, ctx: &mut RoundContext<'brand>, r: Round) -> Result<()> {
        let active = ctx.partition.active().to_vec();

        // SWAP
        for &g in &active {
            ctx.partition.group_mut(g).swap();
        }

        // PROPOSE
        let proposals: Vec<Proposal> = if self.mode == RunMode::Update {
            let (tok, part, logging) = (&*token, &ctx.partition, ctx.log.is_some());
            parallel_map(self.par, &active, |&g| self.propose(tok, part.group(g), g, r, logging, &ctx.counters))
                .into_iter()
                .collect::<Result<_>>()?
        } else {
            active
                .iter()
                .map(|&group| Proposal { group, claimed: Vec::new(), log: Vec::new() })
                .collect()
        };

        // COMMIT: compute under the shared token...
        let commits: Vec<Vec<Settled<'brand>>> = {
            let (tok, part) = (&*token, &ctx.partition);
            parallel_map(self.par, &proposals, |p| self.commit(tok, part.group(p.group), p, r))
                .into_iter()
                .collect::<Result<_>>()?
        };

        // ...then record decisions and free terminal vertices.
        let mut processed = 0u64;
        let mut frontier = 0u64;
        for (p, settled) in proposals.iter().zip(&commits) {
            for s in settled {
                processed += 1;
                frontier += u64::from(s.frontier);
                self.store.record(token, s.vertex, r, s.contraction, s.frontier)?;
                if s.next.is_none() {
                    let stale = self.store.free_vertex(token, self.owners, s.vertex, r)?;
                    ctx.partition.group_mut(p.group).deleted.extend(stale);
                }
            }
        }
        Counters::add(&ctx.counters.processed, processed);
        Counters::add(&ctx.counters.frontier, frontier);

        // RESEED
        let reseeds: Vec<Reseed> = {
            let (tok, logging) = (&*token, ctx.log.is_some());
            let work: Vec<(GroupId, &[Settled<'brand>])> =
                proposals.iter().zip(&commits).map(|(p, s)| (p.group, s.as_slice())).collect();
            parallel_map(self.par, &work, |&(g, settled)| self.reseed(tok, g, settled, r, logging, &ctx.counters))
                .into_iter()
                .collect::<Result<_>>()?
        };

        // ADVANCE
        let mut published = 0u64;
        for ((p, settled), reseed) in proposals.into_iter().zip(commits).zip(reseeds) {
            for s in settled {
                let Some(next) = s.next else { continue };
                let stale = self.store.advance(token, next)?;
                published += 1;
                let group = ctx.partition.group_mut(p.group);
                group.deleted.extend(stale);
                group.live.push(s.vertex);
            }
            ctx.partition.group_mut(p.group).live.extend(reseed.claimed);
            ctx.log(p.log);
            ctx.log(reseed.log);
        }
        ctx.report.versions_published += published;

        // COMPACT: reclaiming and the activity filter touch disjoint state.
        let stale: Vec<_> = active
            .iter()
            .flat_map(|&g| core::mem::take(&mut ctx.partition.group_mut(g).old_deleted))
            .collect();
        let (reclaimed, still_active) = {
            let (store, part) = (self.store, &ctx.partition);
            let tok = &mut *token;
            fork_join(
                self.par,
                move || stale.into_iter().map(|key| u64::from(store.reclaim(tok, key))).sum::<u64>(),
                || filter(self.par, &active, |&g| part.group(g).is_active()),
            )
        };
        ctx.report.versions_reclaimed += reclaimed;
        ctx.partition.set_active(still_active);

        debug!(
            round = r,
            groups = active.len(),
            processed,
            published,
            reclaimed,
            still_active = ctx.partition.active().len(),
            "round complete"
        );
        Ok(())
    }

    fn version<'t>(&'t self, token: &'t GhostToken<'brand>, v: VertexId, r: Round) -> Result<&'t Version<'brand>> {
        self.store
            .version_at(token, v, r)
            .ok_or_else(|| InvariantViolation::MissingVersion { vertex: v, round: r }.into())
    }

    /// Asks the oracle about `cur` and maps the answer onto its shape.
    fn decide(&self, token: &GhostToken<'brand>, cur: &Version<'brand>) -> Result<Contraction> {
        let (v, r) = (cur.vertex(), cur.round());
        if cur.is_root() && cur.degree() == 0 {
            return Ok(Contraction::Finalize);
        }
        let only_child = match cur.children().as_slice() {
            &[c] => Some((c, self.version(token, c, r)?.degree() == 0)),
            _ => None,
        };
        let view = LocalView {
            vertex: v,
            round: r,
            parent: (!cur.is_root()).then_some(cur.parent()),
            degree: cur.degree(),
            only_child,
        };
        if !self.oracle.is_contracted(&view) {
            return Ok(Contraction::Live);
        }
        match (cur.is_root(), cur.degree()) {
            (false, 0) => Ok(Contraction::Rake),
            (false, 1) => Ok(Contraction::Compress),
            (root, degree) => Err(InvariantViolation::IllegalContraction { vertex: v, round: r, degree, root }.into()),
        }
    }

    /// Decision recorded for `cur`'s round before this batch: the superseded
    /// version's, if `cur` replaced one that is still readable.
    fn recorded(&self, token: &GhostToken<'brand>, cur: &Version<'brand>) -> Contraction {
        cur.prior()
            .and_then(|k| self.store.get(token, k))
            .map_or(cur.contraction(), Version::contraction)
    }

    /// Claims the unowned neighbours of every queued vertex whose
    /// contraction status, now or as recorded, is contracted.
    fn propose(
        &self,
        token: &GhostToken<'brand>,
        group: &GroupSets<'brand>,
        g: GroupId,
        r: Round,
        logging: bool,
        counters: &Counters,
    ) -> Result<Proposal> {
        let mut claimed = Vec::new();
        let mut log = Vec::new();
        let (mut won, mut lost) = (0u64, 0u64);

        for &v in group.old_live() {
            let cur = self.version(token, v, r)?;
            let now = self.decide(token, cur)?.is_contracted();
            let prior = cur.prior().and_then(|k| self.store.get(token, k));
            let before = prior.map_or(cur.contraction(), Version::contraction).is_contracted();
            if !now && !before {
                continue;
            }

            let superseded = prior.filter(|_| before).into_iter().flat_map(Version::neighbours);
            for n in cur.neighbours().chain(superseded) {
                if self.store.version_at(token, n, r).is_none() {
                    continue;
                }
                match self.owners.claim(n, g) {
                    Ok(()) => {
                        trace!(round = r, vertex = n, group = g, "claimed");
                        claimed.push(n);
                        won += 1;
                        if logging {
                            log.push(ClaimRecord::new(Some(r), n, g, ClaimSource::Propose));
                        }
                    }
                    Err(owner) if owner != g => lost += 1,
                    Err(_) => {}
                }
            }
        }

        Counters::add(&counters.claims_won, won);
        Counters::add(&counters.claims_lost, lost);
        Ok(Proposal { group: g, claimed, log })
    }

    /// Settles every vertex the group owns this round.
    fn commit(
        &self,
        token: &GhostToken<'brand>,
        group: &GroupSets<'brand>,
        proposal: &Proposal,
        r: Round,
    ) -> Result<Vec<Settled<'brand>>> {
        let g = proposal.group;
        let vertices = group.old_live().iter().chain(&proposal.claimed);
        let mut out = Vec::with_capacity(group.old_live().len() + proposal.claimed.len());
        for &v in vertices {
            match self.owners.owner(v) {
                Some(owner) if owner == g => {}
                owner => return Err(InvariantViolation::ForeignWrite { vertex: v, group: g, owner }.into()),
            }
            out.push(self.settle(token, v, r)?);
        }
        Ok(out)
    }

    fn settle(&self, token: &GhostToken<'brand>, v: VertexId, r: Round) -> Result<Settled<'brand>> {
        let cur = self.version(token, v, r)?;
        let contraction = self.decide(token, cur)?;

        let parent = if cur.is_root() {
            None
        } else {
            let pv = self.version(token, cur.parent(), r)?;
            Some((pv, self.decide(token, pv)?))
        };
        let mut children = Vec::with_capacity(cur.degree());
        for c in cur.children().iter() {
            let cv = self.version(token, c, r)?;
            children.push((cv, self.decide(token, cv)?));
        }
        let neighbours = || parent.iter().chain(children.iter());

        if contraction == Contraction::Compress {
            if let Some(&(nv, nd)) = neighbours().find(|(_, nd)| nd.is_contracted()) {
                return Err(InvariantViolation::ConflictingContraction {
                    vertex: v,
                    neighbour: nv.vertex(),
                    neighbour_contraction: nd,
                    round: r,
                }
                .into());
            }
        }

        let frontier = self.mode == RunMode::Update
            && neighbours().any(|&(nv, nd)| nd.is_contracted() != self.recorded(token, nv).is_contracted());

        if contraction.is_terminal() {
            return Ok(Settled { vertex: v, contraction, frontier, next: None });
        }

        let mut next = cur.prepare();
        if let Some((pv, Contraction::Compress)) = parent {
            next.set_parent(pv.parent());
        }
        for &(cv, cd) in &children {
            match cd {
                Contraction::Rake => {
                    next.remove_child(cv.vertex());
                }
                Contraction::Compress => {
                    next.remove_child(cv.vertex());
                    if let Some(grandchild) = cv.children().iter().next() {
                        next.add_child(grandchild);
                    }
                }
                Contraction::Live | Contraction::Finalize => {}
            }
        }

        let old = self.store.key_at(token, v, r + 1);
        let singleton = old
            .and_then(|k| self.store.get(token, k))
            .map_or(next.degree() == 0, |o| o.degree() == 0);
        next.set_singleton(singleton);
        next.prior = old;

        Ok(Settled { vertex: v, contraction, frontier, next: Some(next) })
    }

    /// Marks the round-`r + 1` parent of every vertex whose leaf status
    /// flipped, so the parent's decision is redone next round.
    fn reseed(
        &self,
        token: &GhostToken<'brand>,
        g: GroupId,
        settled: &[Settled<'brand>],
        r: Round,
        logging: bool,
        counters: &Counters,
    ) -> Result<Reseed> {
        let mut out = Reseed { claimed: Vec::new(), log: Vec::new() };
        let (mut won, mut lost) = (0u64, 0u64);

        for next in settled.iter().filter_map(|s| s.next.as_ref()) {
            if next.is_root() || !next.topology_flipped() {
                continue;
            }
            let q = next.parent();
            let alive = self
                .store
                .slot(token, q)
                .is_some_and(|s| s.is_live() || s.epoch().is_some_and(|e| e > r));
            if !alive {
                return Err(InvariantViolation::DetachedFlip { vertex: next.vertex(), parent: q, round: r }.into());
            }
            match self.owners.claim(q, g) {
                Ok(()) => {
                    trace!(round = r, vertex = q, group = g, "reseeded");
                    out.claimed.push(q);
                    won += 1;
                    if logging {
                        out.log.push(ClaimRecord::new(Some(r), q, g, ClaimSource::Reseed));
                    }
                }
                Err(owner) if owner != g => lost += 1,
                Err(_) => {}
            }
        }

        Counters::add(&counters.claims_won, won);
        Counters::add(&counters.claims_lost, lost);
        Ok(out)
    }

    /// After convergence every chain is terminal and every ownership entry
    /// released. Reports the lowest offending vertex.
    #[cfg(debug_assertions)]
    fn check_settled(&self, token: &GhostToken<'brand>) -> Result<()> {
        use core::sync::atomic::{AtomicU32, Ordering};

        let first = AtomicU32::new(VertexId::MAX);
        parallel_for(self.par, 0, self.store.vertex_count(), |i| {
            let v = i as VertexId;
            let live = self.store.slot(token, v).map_or(true, |s| s.is_live());
            if live || self.owners.is_affected(v) {
                first.fetch_min(v, Ordering::Relaxed);
            }
        });
        match first.into_inner() {
            VertexId::MAX => Ok(()),
            vertex => Err(InvariantViolation::Unsettled { vertex }.into()),
        }
    }
}
