//! Stealing selector: pick the next voice to terminate when a group is
//! out of room.

use pvx_core::{PolyGroup, StealingPriority};

use crate::slot::VoiceSlot;

/// Scan all bound slots and pick a victim for `group` under the given
/// priority. Candidates are partitioned into released voices (in their
/// tail) and gated-or-sustained voices; a released victim always wins
/// over a gated one. Ties break toward the lower slot index, so the
/// choice is deterministic.
///
/// `cross_group` widens the scan to every group; the dispatcher permits
/// that only when the requesting group has slack in its own limit but no
/// physical voices are free.
pub(crate) fn find_stealable<C: Copy + PartialEq>(
    slots: &[VoiceSlot<C>],
    group: PolyGroup,
    priority: StealingPriority,
    cross_group: bool,
) -> Option<usize> {
    let mut best_released: Option<(usize, i64)> = None;
    let mut best_gated: Option<(usize, i64)> = None;

    for (idx, slot) in slots.iter().enumerate() {
        if !slot.in_use() || (slot.poly_group != group && !cross_group) {
            continue;
        }
        // Lower rank steals first.
        let rank = match priority {
            StealingPriority::Oldest => slot.voice_counter as i64,
            StealingPriority::Highest => -i64::from(slot.address.key),
            StealingPriority::Lowest => i64::from(slot.address.key),
        };
        let bucket = if slot.in_release() { &mut best_released } else { &mut best_gated };
        if bucket.map_or(true, |(_, r)| rank < r) {
            *bucket = Some((idx, rank));
        }
    }

    best_released.or(best_gated).map(|(idx, _)| idx)
}
