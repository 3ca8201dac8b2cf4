//! Voice slot records: one per physical voice the host can provide.

use arrayvec::ArrayVec;
use pvx_core::{NoteAddress, PolyGroup, DEFAULT_GROUP, NO_NOTE_ID};

/// Upper bound on logical notes layered on one voice (piano stacking,
/// MPE retrigger). Oldest ids fall off when the stack is full.
pub(crate) const NOTE_ID_STACK_CAP: usize = 16;

/// One entry in the engine's voice table.
///
/// A slot with `cookie == None` is unused and carries no other
/// meaningful state; [`VoiceSlot::clear`] is the only way a slot becomes
/// empty.
#[derive(Clone, Debug)]
pub(crate) struct VoiceSlot<C> {
    /// Host voice reference, or `None` for an unused slot.
    pub cookie: Option<C>,
    /// Current addressable identity. Legato moves rewrite this.
    pub address: NoteAddress,
    /// Identity at voice birth. Never changes after creation.
    pub original: NoteAddress,
    /// Immutable host-facing id for parameter-modulation routing. Stays
    /// put while `address.note_id` tracks the most recent logical note.
    pub voice_id: i32,
    /// Active note ids layered on this voice, oldest first.
    pub note_ids: ArrayVec<i32, NOTE_ID_STACK_CAP>,
    /// True between note-on and note-off.
    pub gated: bool,
    /// True when note-off arrived while the sustain pedal was down.
    pub gated_due_to_sustain: bool,
    /// Group this voice counts against.
    pub poly_group: PolyGroup,
    /// Monotonic creation sequence, for oldest/newest tie-breaks.
    pub voice_counter: u64,
    /// Creation-transaction sequence; voices born together die together.
    pub transaction_id: u64,
}

impl<C: Copy + PartialEq> VoiceSlot<C> {
    pub fn empty() -> Self {
        Self {
            cookie: None,
            address: NoteAddress::new(0, 0, 0, NO_NOTE_ID),
            original: NoteAddress::new(0, 0, 0, NO_NOTE_ID),
            voice_id: NO_NOTE_ID,
            note_ids: ArrayVec::new(),
            gated: false,
            gated_due_to_sustain: false,
            poly_group: DEFAULT_GROUP,
            voice_counter: 0,
            transaction_id: 0,
        }
    }

    pub fn in_use(&self) -> bool {
        self.cookie.is_some()
    }

    /// Reset to the unused state.
    pub fn clear(&mut self) {
        *self = Self::empty();
    }

    /// True when this voice is neither gated nor pedal-prolonged, i.e.
    /// released and ringing out.
    pub fn in_release(&self) -> bool {
        !self.gated && !self.gated_due_to_sustain
    }

    /// Standard wildcard match against the current identity. The note-id
    /// stack is searched as well as the scalar field, so any logical
    /// note layered on this voice addresses it.
    pub fn matches(&self, probe: NoteAddress) -> bool {
        self.in_use()
            && self.address.pck_matches(probe)
            && (self.address.matches(probe) || self.note_ids.contains(&probe.note_id))
    }

    /// Parameter-modulation match: the birth identity plus the immutable
    /// voice id, so a legato-moved voice keeps receiving modulation
    /// addressed to where it started.
    pub fn matches_voice_id(&self, probe: NoteAddress) -> bool {
        self.in_use()
            && self.original.pck_matches(probe)
            && (self.voice_id == NO_NOTE_ID
                || probe.note_id == NO_NOTE_ID
                || self.voice_id == probe.note_id)
    }

    /// Record a logical note id on this voice. `NO_NOTE_ID` is not
    /// stacked. When full, the oldest id falls off.
    pub fn push_note_id(&mut self, note_id: i32) {
        if note_id == NO_NOTE_ID || self.note_ids.contains(&note_id) {
            return;
        }
        if self.note_ids.is_full() {
            self.note_ids.remove(0);
        }
        self.note_ids.push(note_id);
    }

    /// Drop a logical note id and refresh the scalar field from the
    /// newest remaining entry.
    pub fn pop_note_id(&mut self, note_id: i32) {
        if let Some(pos) = self.note_ids.iter().position(|&id| id == note_id) {
            self.note_ids.remove(pos);
        }
        if self.address.note_id == note_id {
            self.address.note_id = self.note_ids.last().copied().unwrap_or(NO_NOTE_ID);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvx_core::WILDCARD;

    fn slot_at(key: i16, note_id: i32) -> VoiceSlot<u32> {
        let mut s = VoiceSlot::empty();
        s.cookie = Some(1);
        s.address = NoteAddress::new(0, 0, key, note_id);
        s.original = s.address;
        s.voice_id = note_id;
        s.push_note_id(note_id);
        s.gated = true;
        s
    }

    #[test]
    fn empty_slot_matches_nothing() {
        let s: VoiceSlot<u32> = VoiceSlot::empty();
        assert!(!s.matches(NoteAddress::new(WILDCARD, WILDCARD, WILDCARD, NO_NOTE_ID)));
    }

    #[test]
    fn stack_search_matches_layered_ids() {
        let mut s = slot_at(60, 173);
        s.push_note_id(864);
        s.address.note_id = 864;
        assert!(s.matches(NoteAddress::new(0, 0, 60, 173)));
        assert!(s.matches(NoteAddress::new(0, 0, 60, 864)));
        assert!(!s.matches(NoteAddress::new(0, 0, 60, 999)));
    }

    #[test]
    fn pop_refreshes_scalar_id() {
        let mut s = slot_at(60, 173);
        s.push_note_id(864);
        s.address.note_id = 864;
        s.pop_note_id(864);
        assert_eq!(s.address.note_id, 173);
        s.pop_note_id(173);
        assert_eq!(s.address.note_id, NO_NOTE_ID);
    }

    #[test]
    fn stack_overflow_drops_oldest() {
        let mut s = slot_at(60, 0);
        for id in 1..=(NOTE_ID_STACK_CAP as i32 + 3) {
            s.push_note_id(id);
        }
        assert_eq!(s.note_ids.len(), NOTE_ID_STACK_CAP);
        assert!(!s.note_ids.contains(&1));
        assert!(s.note_ids.contains(&(NOTE_ID_STACK_CAP as i32 + 3)));
    }

    #[test]
    fn voice_id_match_uses_birth_identity() {
        let mut s = slot_at(60, 742);
        // Legato move to key 62; voice id and original stay put.
        s.address = NoteAddress::new(0, 0, 62, 8433);
        assert!(s.matches_voice_id(NoteAddress::new(0, 0, 60, 742)));
        assert!(!s.matches_voice_id(NoteAddress::new(0, 0, 62, 742)));
        assert!(!s.matches_voice_id(NoteAddress::new(0, 0, 60, 8433)));
        // Wildcard id addresses it wherever it started.
        assert!(s.matches_voice_id(NoteAddress::new(0, 0, 60, NO_NOTE_ID)));
    }
}
