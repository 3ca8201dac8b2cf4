//! Polyphony group registry.
//!
//! Flat, preallocated map from group id to per-group configuration and
//! live usage. Groups are materialized on first reference; group 0
//! always exists with the physical voice count as its limit.

use arrayvec::ArrayVec;
use pvx_core::{MonoFeatures, PlayMode, PolyGroup, StealingPriority, DEFAULT_GROUP};

/// Most groups a host can reference. Hosts use a handful; one record per
/// layer or zone is typical.
pub(crate) const GROUP_CAP: usize = 64;

#[derive(Clone, Debug)]
pub(crate) struct GroupRecord {
    pub id: PolyGroup,
    pub limit: i32,
    pub stealing: StealingPriority,
    pub play_mode: PlayMode,
    pub mono_features: MonoFeatures,
    pub used: i32,
}

impl GroupRecord {
    fn new(id: PolyGroup, limit: i32) -> Self {
        Self {
            id,
            limit,
            stealing: StealingPriority::Oldest,
            play_mode: PlayMode::PolyVoices,
            mono_features: MonoFeatures::empty(),
            used: 0,
        }
    }
}

pub(crate) struct GroupRegistry {
    groups: ArrayVec<GroupRecord, GROUP_CAP>,
    /// Limit handed to newly materialized groups.
    default_limit: i32,
}

impl GroupRegistry {
    pub fn new(default_limit: i32) -> Self {
        let mut groups = ArrayVec::new();
        groups.push(GroupRecord::new(DEFAULT_GROUP, default_limit));
        Self { groups, default_limit }
    }

    /// Look up a group, materializing it with defaults on first
    /// reference.
    pub fn guarantee(&mut self, id: PolyGroup) -> &mut GroupRecord {
        if let Some(pos) = self.groups.iter().position(|g| g.id == id) {
            return &mut self.groups[pos];
        }
        debug_assert!(!self.groups.is_full(), "polyphony group capacity exhausted");
        self.groups.push(GroupRecord::new(id, self.default_limit));
        let last = self.groups.len() - 1;
        &mut self.groups[last]
    }

    pub fn get(&self, id: PolyGroup) -> Option<&GroupRecord> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn add_used(&mut self, id: PolyGroup, delta: i32) {
        let g = self.guarantee(id);
        g.used += delta;
        debug_assert!(g.used >= 0, "group usage went negative");
    }

    /// Sum of live counters across all groups; mirrors the engine's
    /// total as an invariant check.
    #[cfg(test)]
    pub fn total_used(&self) -> i32 {
        self.groups.iter().map(|g| g.used).sum()
    }
}
