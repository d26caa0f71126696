//! Versioned forest state.
//!
//! - [`Version`]: one vertex in one round, immutable once sealed.
//! - `VersionArena`: generational storage for versions.
//! - `ForestStore`: per-vertex version chains and slot lifecycle.
//! - [`ContractionForest`]: the public handle tying store, ownership map and
//!   oracle together.

mod arena;
mod handle;
mod snapshot;
mod store;
mod version;

pub(crate) use store::{ForestStore, Slot};

pub use handle::ContractionForest;
pub use snapshot::{ContractionSnapshot, RoundState};
pub use version::{ChildSet, Contraction, Edge, Version, VersionKey, VersionState, INLINE_CHILDREN};
