//! `ContractionForest`: the public handle.

use tracing::{info, info_span};

use crate::brand::GhostToken;
use crate::config::ForestConfig;
use crate::contraction::{ContractionOracle, ContractionScheme};
use crate::error::Result;
use crate::forest::snapshot::{ContractionSnapshot, RoundState};
use crate::forest::store::{ForestStore, Slot};
use crate::forest::version::{ChildSet, Contraction, Version};
use crate::update::batch::{self, Batch};
use crate::update::engine::{Engine, RoundContext, RunMode};
use crate::update::ownership::OwnershipMap;
use crate::update::report::{ClaimRecord, UpdateReport};
use crate::{Round, RoundCount, VertexId};

/// A rooted forest together with its maintained rake-and-compress
/// contraction.
///
/// Created inside a [`GhostToken::new`] scope; all queries read through
/// `&GhostToken<'brand>` and all updates take `&mut GhostToken<'brand>`.
/// Queries are answered from the converged state left by the last
/// [`initialize`](Self::initialize) or [`apply_batch`](Self::apply_batch).
///
/// ```rust
/// use rake_compress::{Batch, ContractionForest, ForestConfig, GhostToken};
///
/// GhostToken::new(|mut token| {
///     // 0 <- 1 <- 2 <- 3
///     let mut forest = ContractionForest::initialize(&mut token, &[0, 0, 1, 2], ForestConfig::default())?;
///     forest.apply_batch(&mut token, &Batch::new().delete(1, 2))?;
///     assert_eq!(forest.current_parent(&token, 2), Some(2));
///     assert_eq!(forest.degree(&token, 1), Some(0));
///     Ok::<_, rake_compress::Error>(())
/// })
/// .unwrap();
/// ```
pub struct ContractionForest<'brand, O = ContractionScheme> {
    store: ForestStore<'brand>,
    owners: OwnershipMap,
    oracle: O,
    config: ForestConfig,
    report: UpdateReport,
    log: Vec<ClaimRecord>,
}

impl<'brand> ContractionForest<'brand, ContractionScheme> {
    /// Builds the forest given by `parents` (`parents[v] == v` marks a root)
    /// and contracts it from scratch with `config.scheme`.
    ///
    /// # Errors
    /// `MalformedForest` if `parents` is not a forest (or breaks
    /// `config.max_degree`); `InvariantViolation` if contraction breaks a
    /// structural rule.
    pub fn initialize(token: &mut GhostToken<'brand>, parents: &[VertexId], config: ForestConfig) -> Result<Self> {
        let oracle = config.scheme;
        Self::with_oracle(token, parents, config, oracle)
    }
}

impl<'brand, O: ContractionOracle> ContractionForest<'brand, O> {
    /// Like [`initialize`](ContractionForest::initialize) with a caller
    /// supplied oracle; `config.scheme` is ignored.
    ///
    /// # Errors
    /// As for `initialize`.
    pub fn with_oracle(
        token: &mut GhostToken<'brand>,
        parents: &[VertexId],
        config: ForestConfig,
        oracle: O,
    ) -> Result<Self> {
        let span = info_span!("initialize", vertices = parents.len());
        let _guard = span.enter();

        let store = ForestStore::from_parents(token, parents, config.max_degree)?;
        let mut forest = Self {
            store,
            owners: OwnershipMap::new(parents.len()),
            oracle,
            config,
            report: UpdateReport::default(),
            log: Vec::new(),
        };

        let mut ctx = RoundContext::new(forest.config.record_ownership);
        ctx.report.versions_published = parents.len() as u64;
        let engine = forest.engine(RunMode::Construction);
        engine.seed_construction(&mut ctx, forest.config.effective_block());
        let rounds = engine.run(token, &mut ctx)?;
        forest.finish(ctx);

        info!(
            vertices = parents.len(),
            rounds,
            groups = forest.report.groups,
            versions = forest.store.version_count(token),
            "forest contracted"
        );
        Ok(forest)
    }

    fn engine(&self, mode: RunMode) -> Engine<'_, 'brand, O> {
        Engine::new(&self.store, &self.owners, &self.oracle, self.config.parallelism(), mode)
    }

    fn finish(&mut self, ctx: RoundContext<'brand>) {
        self.report = ctx.report;
        self.log = ctx.log.unwrap_or_default();
    }

    /// Applies `batch` (deletions first, then insertions) and runs the
    /// update rounds to convergence. Returns the number of rounds executed;
    /// an empty batch executes none.
    ///
    /// # Errors
    /// `InvalidEdge` if any edit is rejected, in which case nothing was
    /// applied. `InvariantViolation` if a structural rule fails mid-update;
    /// the forest must then be rebuilt.
    pub fn apply_batch(&mut self, token: &mut GhostToken<'brand>, batch: &Batch) -> Result<RoundCount> {
        let span = info_span!("apply_batch", insertions = batch.insertions.len(), deletions = batch.deletions.len());
        let _guard = span.enter();

        let touched = batch::plan(token, &self.store, batch, self.config.max_degree)?;

        let mut ctx = RoundContext::new(self.config.record_ownership);
        let seeded = batch::seed(token, &self.store, &self.owners, touched, &mut ctx.partition, ctx.log.as_mut())?;
        ctx.report.groups = seeded.groups;
        ctx.report.initial_affected = seeded.affected;
        ctx.report.versions_published = seeded.published;

        let rounds = self.engine(RunMode::Update).run(token, &mut ctx)?;
        self.finish(ctx);

        info!(
            rounds,
            groups = self.report.groups,
            affected = self.report.initial_affected,
            processed = self.report.vertices_processed,
            claims_won = self.report.claims_won,
            claims_lost = self.report.claims_lost,
            "batch applied"
        );
        Ok(rounds)
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.store.vertex_count()
    }

    /// Configuration the forest was built with.
    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    /// The contraction predicate.
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Diagnostics of the last `initialize` or `apply_batch`.
    pub fn last_report(&self) -> &UpdateReport {
        &self.report
    }

    /// Ownership marks and claims of the last run; empty unless
    /// `record_ownership` is set.
    pub fn ownership_log(&self) -> &[ClaimRecord] {
        &self.log
    }

    fn terminal<'a>(&'a self, token: &'a GhostToken<'brand>, v: VertexId) -> Option<&'a Version<'brand>> {
        match self.store.slot(token, v)? {
            Slot::Freed { head, .. } => self.store.get(token, head),
            Slot::Live(_) => self.store.head(token, v),
        }
    }

    /// Whether `v` was raked or compressed (as opposed to being the root its
    /// tree collapsed into).
    pub fn is_contracted(&self, token: &GhostToken<'brand>, v: VertexId) -> bool {
        self.terminal(token, v).is_some_and(Version::is_contracted)
    }

    /// How `v` left the forest.
    pub fn contraction(&self, token: &GhostToken<'brand>, v: VertexId) -> Option<Contraction> {
        self.terminal(token, v).map(Version::contraction)
    }

    /// Round in which `v` left the forest.
    pub fn contraction_round(&self, token: &GhostToken<'brand>, v: VertexId) -> Option<Round> {
        self.store.slot(token, v)?.epoch()
    }

    /// `v`'s parent in the current topology; `v` itself for a root.
    pub fn current_parent(&self, token: &GhostToken<'brand>, v: VertexId) -> Option<VertexId> {
        self.store.version_at(token, v, 0).map(Version::parent)
    }

    /// `v`'s number of children in the current topology.
    pub fn degree(&self, token: &GhostToken<'brand>, v: VertexId) -> Option<usize> {
        self.store.version_at(token, v, 0).map(Version::degree)
    }

    /// `v`'s children in the current topology.
    pub fn children<'a>(&'a self, token: &'a GhostToken<'brand>, v: VertexId) -> Option<&'a ChildSet> {
        self.store.version_at(token, v, 0).map(Version::children)
    }

    /// `v`'s parent at the start of round `r`, if it was alive then.
    pub fn parent_at(&self, token: &GhostToken<'brand>, v: VertexId, r: Round) -> Option<VertexId> {
        self.store.version_at(token, v, r).map(Version::parent)
    }

    /// Whether a neighbour of `v` changed contraction status in round `r`
    /// during the last batch.
    pub fn frontier_at(&self, token: &GhostToken<'brand>, v: VertexId, r: Round) -> bool {
        self.store.version_at(token, v, r).is_some_and(Version::is_frontier)
    }

    /// `v`'s versions, round 0 first.
    pub fn history<'a>(&'a self, token: &'a GhostToken<'brand>, v: VertexId) -> impl Iterator<Item = &'a Version<'brand>> + 'a {
        self.store.chain(token, v)
    }

    /// Current parent array.
    pub fn parents(&self, token: &GhostToken<'brand>) -> Vec<VertexId> {
        self.store.parents(token)
    }

    /// Owned copy of every vertex's history.
    pub fn snapshot(&self, token: &GhostToken<'brand>) -> ContractionSnapshot {
        ContractionSnapshot {
            vertices: (0..self.vertex_count() as VertexId)
                .map(|v| self.store.chain(token, v).map(RoundState::from).collect())
                .collect(),
        }
    }
}

impl<O> core::fmt::Debug for ContractionForest<'_, O> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ContractionForest")
            .field("vertices", &self.store.vertex_count())
            .field("config", &self.config)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}
