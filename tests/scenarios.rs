mod common;

use std::collections::HashMap;

use common::{bamboo, binary_tree, reference_snapshot};
use rake_compress::{
    Batch, ClaimSource, Contraction, ContractionForest, ContractionOracle, ContractionScheme, EdgeRejection, Error,
    ExecutionMode, ForestConfig, ForestDefect, GhostToken, InvariantViolation, LocalView,
};

fn logged() -> ForestConfig {
    ForestConfig::default().with_ownership_log(true)
}

#[test]
fn test_round_trip_bamboo_rehang() -> anyhow::Result<()> {
    GhostToken::new(|mut token| {
        let mut forest = ContractionForest::initialize(&mut token, &bamboo(8), logged())?;
        let batch = Batch::new().delete(3, 4).insert(3, 7);
        let rounds = forest.apply_batch(&mut token, &batch)?;
        assert!(rounds > 0);
        assert_eq!(forest.last_report().rounds, rounds);

        // Endpoints are marked before round 0.
        let marked: Vec<u32> = forest
            .ownership_log()
            .iter()
            .filter(|r| r.round.is_none() && r.source == ClaimSource::Batch)
            .map(|r| r.vertex)
            .collect();
        for v in [3, 4, 7] {
            assert!(marked.contains(&v), "vertex {v} not marked: {marked:?}");
        }

        // 0 <- 1 <- 2 <- 3 <- 7 <- 6 <- 5 <- 4
        let expected = vec![0, 0, 1, 2, 5, 6, 7, 3];
        assert_eq!(forest.parents(&token), expected);
        assert_eq!(forest.degree(&token, 4), Some(0));
        assert_eq!(forest.children(&token, 7).map(|c| c.as_slice().to_vec()), Some(vec![6]));

        let snapshot = forest.snapshot(&token);
        assert_eq!(snapshot, reference_snapshot(&expected, &ContractionScheme::default()));

        let fresh = ContractionForest::initialize(&mut token, &expected, ForestConfig::default())?;
        assert_eq!(snapshot, fresh.snapshot(&token));
        Ok(())
    })
}

#[test]
fn test_conflict_shared_parent_has_single_owner() -> anyhow::Result<()> {
    GhostToken::new(|mut token| {
        // 5 is the parent of both 6 and 7; 8 hangs under 6.
        let parents = [0, 0, 1, 2, 3, 4, 5, 5, 6];
        let mut forest = ContractionForest::initialize(&mut token, &parents, logged())?;
        forest.apply_batch(&mut token, &Batch::new().delete(5, 6).delete(5, 7))?;

        let log = forest.ownership_log();
        let owners_of_5: Vec<u32> = log.iter().filter(|r| r.vertex == 5).map(|r| r.group).collect();
        assert!(!owners_of_5.is_empty());
        assert!(owners_of_5.iter().all(|&g| g == owners_of_5[0]), "{owners_of_5:?}");

        let mut writes: HashMap<(Option<u32>, u32), usize> = HashMap::new();
        for r in log {
            *writes.entry((r.round, r.vertex)).or_default() += 1;
        }
        assert!(writes.values().all(|&w| w == 1), "a vertex was claimed twice in one round");

        let after = [0, 0, 1, 2, 3, 4, 6, 7, 6];
        assert_eq!(forest.parents(&token), after);
        assert_eq!(forest.snapshot(&token), reference_snapshot(&after, &ContractionScheme::default()));
        Ok(())
    })
}

#[test]
fn test_empty_batch_is_a_no_op() -> anyhow::Result<()> {
    GhostToken::new(|mut token| {
        let mut forest = ContractionForest::initialize(&mut token, &binary_tree(63), ForestConfig::default())?;
        let before = forest.snapshot(&token);
        assert_eq!(forest.apply_batch(&mut token, &Batch::new())?, 0);
        assert_eq!(forest.last_report().rounds, 0);
        assert_eq!(forest.last_report().groups, 0);
        assert_eq!(forest.snapshot(&token), before);
        Ok(())
    })
}

#[test]
fn test_rejected_batch_changes_nothing() -> anyhow::Result<()> {
    GhostToken::new(|mut token| {
        let mut forest = ContractionForest::initialize(&mut token, &bamboo(6), ForestConfig::default())?;
        let before = forest.snapshot(&token);

        // The deletion is fine; the insertion would close a cycle.
        let batch = Batch::new().delete(2, 3).insert(2, 0);
        let err = forest.apply_batch(&mut token, &batch).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidEdge { edge: (2, 0).into(), reason: EdgeRejection::WouldCreateCycle }
        );
        assert_eq!(forest.snapshot(&token), before);

        let missing = forest.apply_batch(&mut token, &Batch::new().delete(0, 5)).unwrap_err();
        assert!(matches!(missing, Error::InvalidEdge { reason: EdgeRejection::MissingEdge, .. }));
        let unknown = forest.apply_batch(&mut token, &Batch::new().insert(0, 6)).unwrap_err();
        assert!(matches!(unknown, Error::InvalidEdge { reason: EdgeRejection::UnknownVertex, .. }));
        let duplicate = forest.apply_batch(&mut token, &Batch::new().insert(0, 1)).unwrap_err();
        assert!(matches!(duplicate, Error::InvalidEdge { reason: EdgeRejection::DuplicateEdge, .. }));

        // The forest is still usable.
        forest.apply_batch(&mut token, &Batch::new().delete(2, 3))?;
        assert_eq!(forest.current_parent(&token, 3), Some(3));
        Ok(())
    })
}

#[test]
fn test_degree_bound_is_enforced() -> anyhow::Result<()> {
    GhostToken::new(|mut token| {
        let config = ForestConfig { max_degree: Some(2), ..ForestConfig::default() };
        let malformed = ContractionForest::initialize(&mut token, &[0, 0, 0, 0], config.clone()).unwrap_err();
        assert_eq!(
            malformed,
            Error::MalformedForest { vertex: 0, reason: ForestDefect::DegreeExceeded { max_degree: 2 } }
        );

        let mut forest = ContractionForest::initialize(&mut token, &[0, 0, 0, 3], config)?;
        let err = forest.apply_batch(&mut token, &Batch::new().insert(0, 3)).unwrap_err();
        assert!(matches!(err, Error::InvalidEdge { reason: EdgeRejection::DegreeExceeded { max_degree: 2 }, .. }));
        Ok(())
    })
}

#[test]
fn test_malformed_parent_arrays() {
    GhostToken::new(|mut token| {
        let cycle = ContractionForest::initialize(&mut token, &[1, 0], ForestConfig::default()).unwrap_err();
        assert!(matches!(cycle, Error::MalformedForest { reason: ForestDefect::Cycle, .. }));
        let range = ContractionForest::initialize(&mut token, &[0, 7], ForestConfig::default()).unwrap_err();
        assert!(matches!(range, Error::MalformedForest { reason: ForestDefect::ParentOutOfRange { parent: 7 }, .. }));
    });
}

struct Always;

impl ContractionOracle for Always {
    fn is_contracted(&self, _view: &LocalView) -> bool {
        true
    }
}

struct EveryChain;

impl ContractionOracle for EveryChain {
    fn is_contracted(&self, view: &LocalView) -> bool {
        view.parent.is_some() && view.degree <= 1
    }
}

#[test]
fn test_oracle_misuse_is_an_invariant_violation() {
    GhostToken::new(|mut token| {
        let err = ContractionForest::with_oracle(&mut token, &[0, 0], ForestConfig::default(), Always).unwrap_err();
        assert!(matches!(
            err,
            Error::InvariantViolation(InvariantViolation::IllegalContraction { root: true, .. })
        ));

        let err = ContractionForest::with_oracle(&mut token, &bamboo(4), ForestConfig::sequential(), EveryChain).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(InvariantViolation::ConflictingContraction { .. })));
    });
}

#[test]
fn test_rake_only_bamboo_takes_height_rounds() -> anyhow::Result<()> {
    GhostToken::new(|mut token| {
        let config = ForestConfig::default().with_scheme(ContractionScheme::RakeOnly);
        let forest = ContractionForest::initialize(&mut token, &bamboo(10), config)?;
        // One leaf per round, then the root finalizes.
        assert_eq!(forest.last_report().rounds, 10);
        assert_eq!(forest.contraction(&token, 0), Some(Contraction::Finalize));
        assert!(!forest.is_contracted(&token, 0));
        for v in 1..10 {
            assert_eq!(forest.contraction(&token, v), Some(Contraction::Rake));
            assert_eq!(forest.contraction_round(&token, v), Some(9 - v));
        }
        assert_eq!(forest.parent_at(&token, 3, 2), Some(2));
        assert_eq!(forest.parent_at(&token, 9, 1), None);
        Ok(())
    })
}

#[test]
fn test_queries_out_of_range() -> anyhow::Result<()> {
    GhostToken::new(|mut token| {
        let forest = ContractionForest::initialize(&mut token, &bamboo(3), ForestConfig::default())?;
        assert_eq!(forest.vertex_count(), 3);
        assert_eq!(forest.current_parent(&token, 3), None);
        assert_eq!(forest.degree(&token, 3), None);
        assert_eq!(forest.contraction(&token, 3), None);
        assert!(!forest.is_contracted(&token, 3));
        assert!(!forest.frontier_at(&token, 3, 0));
        Ok(())
    })
}

#[test]
fn test_config_from_json_drives_construction() -> anyhow::Result<()> {
    let config = ForestConfig::from_json_str(
        r#"{ "execution": "sequential", "construction_block": 3, "scheme": { "rake_compress": { "seed": 7 } } }"#,
    )?;
    assert_eq!(config.execution, ExecutionMode::Sequential);
    GhostToken::new(|mut token| {
        let forest = ContractionForest::initialize(&mut token, &binary_tree(20), config.clone())?;
        assert_eq!(forest.last_report().groups, 7);
        assert_eq!(forest.last_report().initial_affected, 20);
        assert_eq!(forest.snapshot(&token), reference_snapshot(&binary_tree(20), &config.scheme));
        Ok(())
    })
}

#[test]
fn test_snapshot_serialises() -> anyhow::Result<()> {
    GhostToken::new(|mut token| {
        let forest = ContractionForest::initialize(&mut token, &binary_tree(7), ForestConfig::default())?;
        let json = forest.snapshot(&token).to_json()?;
        let back: rake_compress::ContractionSnapshot = serde_json::from_str(&json)?;
        assert_eq!(back, forest.snapshot(&token));
        Ok(())
    })
}

#[test]
fn test_randomized_scheme_converges_in_logarithmic_rounds() -> anyhow::Result<()> {
    const N: u32 = 1 << 14;
    let log_n = N.ilog2();
    GhostToken::new(|mut token| {
        let mut forest = ContractionForest::initialize(&mut token, &bamboo(N), ForestConfig::default())?;
        let built = forest.last_report().rounds;
        // A path only rakes its one leaf per round; compression must do the rest.
        assert!(built <= 8 * log_n, "construction took {built} rounds for {N} vertices");

        let rounds = forest.apply_batch(&mut token, &Batch::new().delete(N / 2 - 1, N / 2))?;
        assert!(rounds <= 8 * log_n, "split took {rounds} rounds for {N} vertices");
        let processed = forest.last_report().vertices_processed;
        assert!(processed < u64::from(N / 8), "split recomputed {processed} vertex rounds");
        Ok(())
    })
}

#[test]
fn test_construction_blocks_claim_their_own_vertices() -> anyhow::Result<()> {
    GhostToken::new(|mut token| {
        let config = ForestConfig { construction_block: 5, granularity: 1, ..logged() };
        let forest = ContractionForest::initialize(&mut token, &binary_tree(23), config)?;
        let marks: Vec<(u32, u32)> = forest
            .ownership_log()
            .iter()
            .filter(|r| r.source == ClaimSource::Construction)
            .map(|r| (r.vertex, r.group))
            .collect();
        assert_eq!(marks, (0..23).map(|v| (v, v / 5)).collect::<Vec<_>>());
        assert_eq!(forest.last_report().groups, 5);
        assert!(forest.last_report().versions_reclaimed <= forest.last_report().versions_published);
        Ok(())
    })
}
