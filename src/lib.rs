//! # `rake-compress` - Incremental Tree Contraction
//!
//! Maintains the rake-and-compress contraction of a rooted forest under
//! batches of edge insertions and deletions, without recomputing it from
//! scratch.
//!
//! Contraction proceeds in rounds. In each round every leaf may be **raked**
//! into its parent and every single-child vertex may be **compressed** out of
//! its chain, until each tree has collapsed into its root. The forest keeps
//! the whole history: for each vertex, one version per round it survived.
//! After a batch, only the vertices whose history can differ are recomputed.
//!
//! ## Architecture
//!
//! 1. **Versions** ([`forest::Version`]): one vertex in one round, stored in a
//!    generational arena and addressed by branded [`forest::VersionKey`]s.
//! 2. **Forest store**: per-vertex version chains; a vertex's slot is live
//!    while the engine extends it and freed once it contracts.
//! 3. **Groups** ([`update::GroupPartition`]): one per vertex a batch touched,
//!    each with its own affected sets.
//! 4. **Ownership** ([`update::OwnershipMap`]): first-announcement-wins claims
//!    decide which group advances a vertex several groups reach.
//! 5. **Round engine**: lock-step rounds over the active groups, parallel
//!    where the phase only reads, sequential where it writes.
//! 6. **Batch applier** ([`update::Batch`]): validates edits and seeds groups.
//!
//! ## Branding
//!
//! All forest state is gated by a [`GhostToken`]. Queries take
//! `&GhostToken<'brand>`, updates take `&mut GhostToken<'brand>`, and version
//! keys carry the brand, so keys from one forest cannot be used on another.
//!
//! ## Example
//!
//! ```rust
//! use rake_compress::{Batch, ContractionForest, ForestConfig, GhostToken};
//!
//! GhostToken::new(|mut token| {
//!     // A path 0 <- 1 <- ... <- 7.
//!     let parents: Vec<u32> = (0..8).map(|i: u32| i.saturating_sub(1)).collect();
//!     let mut forest = ContractionForest::initialize(&mut token, &parents, ForestConfig::default()).unwrap();
//!
//!     // Cut 4..7 loose, then hang it back by its far end.
//!     let batch = Batch::new().delete(3, 4).insert(3, 7);
//!     let rounds = forest.apply_batch(&mut token, &batch).unwrap();
//!
//!     assert!(rounds > 0);
//!     assert_eq!(forest.current_parent(&token, 7), Some(3));
//!     assert_eq!(forest.current_parent(&token, 4), Some(5));
//!     assert!(!forest.is_contracted(&token, 0));
//! });
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

pub mod brand;
pub mod config;
pub mod contraction;
pub mod error;
pub mod forest;
pub mod parallel;
pub mod update;

/// Stable vertex identity in `[0, n)`.
pub type VertexId = u32;
/// Round index, starting at 0.
pub type Round = u32;
/// Number of rounds a run executed.
pub type RoundCount = u32;
/// Update group identity.
pub type GroupId = u32;

pub use brand::{GhostCell, GhostToken};
pub use config::{ExecutionMode, ForestConfig};
pub use contraction::{ContractionOracle, ContractionScheme, LocalView};
pub use error::{EdgeRejection, Error, ForestDefect, InvariantViolation, Result};
pub use forest::{ChildSet, Contraction, ContractionForest, ContractionSnapshot, Edge, RoundState, Version, VersionKey};
pub use update::{Batch, ClaimRecord, ClaimSource, UpdateReport};

const _: () = {
    use core::mem;

    // Tokens are ZSTs.
    assert!(mem::size_of::<GhostToken<'static>>() == 0);
    // Keys stay two words of u32.
    assert!(mem::size_of::<VersionKey<'static>>() == 8);
    // Contraction decisions fit a byte.
    assert!(mem::size_of::<Contraction>() == 1);
};
