//! Key-state ledger: which keys are physically held, how hard they were
//! struck, and whether the sustain pedal is prolonging them.
//!
//! One entry per `(port, channel, key, group)`. The dispatcher records
//! an entry for every intended voice of a note-on (even ones the host
//! declined), so a later note-off always finds the press, and the mono
//! state machines can answer "is any other key still held in this
//! group?" and "which key do we fall back to?".

use pvx_core::{PolyGroup, ReleaseTarget, WILDCARD};

/// Preallocated entry capacity: 16 channels × 128 keys is the worst case
/// for one group on one port.
const LEDGER_CAP: usize = 2048;

#[derive(Clone, Copy, Debug)]
pub(crate) struct KeyState {
    pub port: i16,
    pub channel: i16,
    pub key: i16,
    pub group: PolyGroup,
    /// Transaction that (most recently) created this press; orders
    /// presses for latest-note fallback.
    pub transaction_id: u64,
    pub inception_velocity: f32,
    /// The key has been physically released and only the pedal keeps it.
    pub held_by_sustain: bool,
}

pub(crate) struct KeyLedger {
    entries: Vec<KeyState>,
}

impl KeyLedger {
    pub fn new() -> Self {
        Self { entries: Vec::with_capacity(LEDGER_CAP) }
    }

    /// Record a press, refreshing the transaction and velocity if the
    /// key is already down in this group.
    pub fn record(
        &mut self,
        port: i16,
        channel: i16,
        key: i16,
        group: PolyGroup,
        transaction_id: u64,
        velocity: f32,
    ) {
        for e in &mut self.entries {
            if e.port == port && e.channel == channel && e.key == key && e.group == group {
                e.transaction_id = transaction_id;
                e.inception_velocity = velocity;
                e.held_by_sustain = false;
                return;
            }
        }
        self.entries.push(KeyState {
            port,
            channel,
            key,
            group,
            transaction_id,
            inception_velocity: velocity,
            held_by_sustain: false,
        });
    }

    /// Remove the press records for a key across all groups.
    pub fn clear_key(&mut self, port: i16, channel: i16, key: i16) {
        self.entries
            .retain(|e| !(e.port == port && e.channel == channel && e.key == key));
    }

    /// Mark a key's press records as pedal-prolonged.
    pub fn sustain_key(&mut self, port: i16, channel: i16, key: i16) {
        for e in &mut self.entries {
            if e.port == port && e.channel == channel && e.key == key {
                e.held_by_sustain = true;
            }
        }
    }

    /// Drop pedal-prolonged records on `(port, channel)`; a wildcard
    /// channel sweeps every channel on the port.
    pub fn purge_sustained(&mut self, port: i16, channel: i16) {
        self.entries.retain(|e| {
            !(e.held_by_sustain && e.port == port && (channel == WILDCARD || e.channel == channel))
        });
    }

    /// Is any key other than `(port, channel, key)` physically held in
    /// this group? Pedal-prolonged keys do not count.
    pub fn any_other_held(&self, group: PolyGroup, port: i16, channel: i16, key: i16) -> bool {
        self.entries.iter().any(|e| {
            e.group == group
                && !e.held_by_sustain
                && !(e.port == port && e.channel == channel && e.key == key)
        })
    }

    /// Pick the fallback key for a mono group. Physically-held keys are
    /// preferred; pedal-prolonged keys are eligible only when no
    /// physical key remains.
    pub fn best_fallback(&self, group: PolyGroup, target: ReleaseTarget) -> Option<KeyState> {
        self.fallback_among(group, target, false)
            .or_else(|| self.fallback_among(group, target, true))
    }

    fn fallback_among(
        &self,
        group: PolyGroup,
        target: ReleaseTarget,
        sustained: bool,
    ) -> Option<KeyState> {
        let mut best: Option<KeyState> = None;
        for e in &self.entries {
            if e.group != group || e.held_by_sustain != sustained {
                continue;
            }
            let wins = match (&best, target) {
                (None, _) => true,
                (Some(b), ReleaseTarget::Latest) => e.transaction_id > b.transaction_id,
                (Some(b), ReleaseTarget::Highest) => e.key > b.key,
                (Some(b), ReleaseTarget::Lowest) => e.key < b.key,
            };
            if wins {
                best = Some(*e);
            }
        }
        best
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
