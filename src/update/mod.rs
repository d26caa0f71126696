//! Incremental update machinery.
//!
//! A batch is validated and turned into initial marks by [`batch`]; the marks
//! seed one group per touched vertex ([`groups`]); the round engine then
//! advances every group in lock step, arbitrating shared vertices through the
//! [`OwnershipMap`], until no group has work left.

pub mod batch;
pub(crate) mod engine;
pub mod groups;
pub mod ownership;
pub mod report;

pub use batch::Batch;
pub use groups::{GroupPartition, GroupSets};
pub use ownership::OwnershipMap;
pub use report::{ClaimRecord, ClaimSource, UpdateReport};
