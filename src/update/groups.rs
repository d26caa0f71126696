//! Group partition: per-group affected sets and the active list.

use crate::forest::VersionKey;
use crate::{GroupId, VertexId};

/// The two per-round sets of one group, double buffered.
#[derive(Debug, Default)]
pub struct GroupSets<'brand> {
    /// Vertices to re-evaluate in the round being built.
    pub live: Vec<VertexId>,
    /// Versions to reclaim once no group can read them.
    pub deleted: Vec<VersionKey<'brand>>,
    /// `live` of the round being executed.
    pub(crate) old_live: Vec<VertexId>,
    /// `deleted` of the round being executed.
    pub(crate) old_deleted: Vec<VersionKey<'brand>>,
}

impl<'brand> GroupSets<'brand> {
    /// Rotates the current sets into the old buffers and leaves empty ones,
    /// reusing the previous old buffers' allocations.
    pub fn swap(&mut self) {
        core::mem::swap(&mut self.live, &mut self.old_live);
        core::mem::swap(&mut self.deleted, &mut self.old_deleted);
        self.live.clear();
        self.deleted.clear();
    }

    /// Vertices being executed this round.
    pub fn old_live(&self) -> &[VertexId] {
        &self.old_live
    }

    /// Still has work or garbage.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.live.len() + self.deleted.len() > 0
    }
}

/// All groups of one run, and which of them are still active.
///
/// Groups are created up front and never afterwards; a group that goes
/// inactive stays inactive.
#[derive(Debug, Default)]
pub struct GroupPartition<'brand> {
    groups: Vec<GroupSets<'brand>>,
    active: Vec<GroupId>,
}

impl<'brand> GroupPartition<'brand> {
    /// No groups.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new group and returns its id.
    pub fn open(&mut self) -> GroupId {
        let id = self.groups.len() as GroupId;
        self.groups.push(GroupSets::default());
        self.active.push(id);
        id
    }

    /// Number of groups ever opened.
    #[inline]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// No groups were opened.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Active group ids, in creation order.
    #[inline]
    pub fn active(&self) -> &[GroupId] {
        &self.active
    }

    /// Group `g`.
    #[inline]
    pub fn group(&self, g: GroupId) -> &GroupSets<'brand> {
        &self.groups[g as usize]
    }

    /// Group `g`, mutably.
    #[inline]
    pub fn group_mut(&mut self, g: GroupId) -> &mut GroupSets<'brand> {
        &mut self.groups[g as usize]
    }

    /// Replaces the active list (after filtering).
    pub(crate) fn set_active(&mut self, active: Vec<GroupId>) {
        debug_assert!(active.iter().all(|g| self.active.contains(g)), "inactive group revived");
        self.active = active;
    }

    /// Drops groups that opened but never received work.
    pub(crate) fn retain_nonempty(&mut self) {
        let groups = &self.groups;
        self.active.retain(|&g| groups[g as usize].is_active());
    }
}
