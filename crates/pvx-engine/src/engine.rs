//! The event dispatcher: play-mode state machines, voice-creation
//! transactions, sustain semantics, and control routing.

use arrayvec::ArrayVec;
use tracing::{debug, trace};

use pvx_core::{
    Midi1Dialect, MonoFeatures, NoteAddress, PlayMode, PolyGroup, RepeatedKeyMode,
    StealingPriority, VoiceBegin, VoiceInit, VoiceResponder, MonoResponder, NO_NOTE_ID, WILDCARD,
};

use crate::groups::{GroupRegistry, GROUP_CAP};
use crate::ledger::KeyLedger;
use crate::slot::VoiceSlot;
use crate::steal::find_stealable;

/// Polyphonic voice-allocation engine.
///
/// Owns the voice slot table, group registry, key-state ledger, and the
/// per-channel controller caches, plus the two host responders it
/// drives. All storage is sized at construction from `max_voices`; event
/// processing never allocates.
///
/// Voices themselves belong to the host: the engine holds opaque
/// cookies and learns about voice death by draining
/// [`VoiceResponder::next_ended_voice`], which happens inside every
/// event call and in [`VoiceManager::reap`].
pub struct VoiceManager<R: VoiceResponder, M: MonoResponder> {
    /// How channel messages are interpreted.
    pub dialect: Midi1Dialect,
    /// What a repeated key press does while the key is still ringing.
    pub repeated_key_mode: RepeatedKeyMode,
    /// The MPE global channel (only consulted in MPE dialect).
    pub mpe_global_channel: i16,
    /// CC routed per-voice as MPE timbre on member channels.
    pub mpe_timbre_cc: u8,

    responder: R,
    mono: M,

    max_voices: usize,
    slots: Vec<VoiceSlot<R::Cookie>>,
    groups: GroupRegistry,
    ledger: KeyLedger,

    next_voice_counter: u64,
    next_transaction_id: u64,
    total_used: i32,

    /// Last seen pitch bend per channel, stored as offset from center.
    last_pb_by_channel: [i16; 16],
    cc_cache: [[u8; 128]; 16],
    sustain_down: [bool; 16],

    begin_buffer: Vec<VoiceBegin>,
    init_instructions: Vec<VoiceInit>,
    init_cookies: Vec<Option<R::Cookie>>,
}

impl<R: VoiceResponder, M: MonoResponder> VoiceManager<R, M> {
    pub fn new(max_voices: usize, responder: R, mono: M) -> Self {
        debug_assert!(max_voices > 0, "engine needs at least one voice");
        Self {
            dialect: Midi1Dialect::default(),
            repeated_key_mode: RepeatedKeyMode::default(),
            mpe_global_channel: 0,
            mpe_timbre_cc: 74,
            max_voices,
            slots: (0..max_voices).map(|_| VoiceSlot::empty()).collect(),
            groups: GroupRegistry::new(max_voices as i32),
            ledger: KeyLedger::new(),
            next_voice_counter: 0,
            next_transaction_id: 0,
            total_used: 0,
            last_pb_by_channel: [0; 16],
            cc_cache: [[0; 128]; 16],
            sustain_down: [false; 16],
            begin_buffer: vec![VoiceBegin::default(); max_voices],
            init_instructions: vec![VoiceInit::Start; max_voices],
            init_cookies: vec![None; max_voices],
            responder,
            mono,
        }
    }

    // ===== configuration =====

    pub fn set_polyphony_group_voice_limit(&mut self, group: PolyGroup, limit: i32) {
        debug_assert!(limit > 0, "voice limit must be positive");
        self.groups.guarantee(group).limit = limit;
    }

    pub fn set_playmode(&mut self, group: PolyGroup, mode: PlayMode, features: MonoFeatures) {
        let rec = self.groups.guarantee(group);
        rec.play_mode = mode;
        rec.mono_features = features;
    }

    pub fn set_stealing_priority_mode(&mut self, group: PolyGroup, priority: StealingPriority) {
        self.groups.guarantee(group).stealing = priority;
    }

    /// Materialize a group before the host references it from a
    /// voice-creation transaction.
    pub fn guarantee_group(&mut self, group: PolyGroup) {
        self.groups.guarantee(group);
    }

    // ===== host access =====

    pub fn responder(&self) -> &R {
        &self.responder
    }

    pub fn responder_mut(&mut self) -> &mut R {
        &mut self.responder
    }

    pub fn mono_responder(&self) -> &M {
        &self.mono
    }

    pub fn mono_responder_mut(&mut self) -> &mut M {
        &mut self.mono
    }

    // ===== observation =====

    pub fn voice_count(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use()).count()
    }

    pub fn gated_voice_count(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use() && s.gated).count()
    }

    // ===== voice-end delivery =====

    /// Drain the host's finished-voice queue. Called internally at every
    /// event boundary; hosts whose release tails end between events call
    /// this after each audio block.
    pub fn reap(&mut self) {
        while let Some(cookie) = self.responder.next_ended_voice() {
            self.retire_cookie(cookie);
        }
    }

    fn retire_cookie(&mut self, cookie: R::Cookie) {
        for i in 0..self.slots.len() {
            if self.slots[i].cookie == Some(cookie) {
                let group = self.slots[i].poly_group;
                self.slots[i].clear();
                self.groups.add_used(group, -1);
                self.total_used -= 1;
                trace!(?cookie, group, "voice retired");
            }
        }
    }

    // ===== note on =====

    /// Returns `false` when not all requested voices could be placed;
    /// host-elected no-ops count as success.
    pub fn process_note_on(
        &mut self,
        port: i16,
        channel: i16,
        key: i16,
        note_id: i32,
        velocity: f32,
        retune: f32,
    ) -> bool {
        self.reap();
        debug_assert!((0..16).contains(&channel), "channel out of range");
        debug_assert!((0..128).contains(&key), "key out of range");

        if self.repeated_key_mode == RepeatedKeyMode::Piano
            && self.reuse_ringing_voices(port, channel, key, note_id, velocity)
        {
            return true;
        }

        let wanted = self.responder.begin_voice_creation_transaction(
            &mut self.begin_buffer,
            port,
            channel,
            key,
            note_id,
            velocity,
        );

        if wanted == 0 {
            self.responder
                .end_voice_creation_transaction(port, channel, key, note_id, velocity);
            return true;
        }

        // A request no amount of stealing can satisfy fails up front,
        // before any voice is disturbed.
        if wanted > self.max_voices {
            self.responder
                .end_voice_creation_transaction(port, channel, key, note_id, velocity);
            return false;
        }

        let mut intended: ArrayVec<(PolyGroup, i32), GROUP_CAP> = ArrayVec::new();
        for begin in &self.begin_buffer[..wanted] {
            match intended.iter_mut().find(|(g, _)| *g == begin.polyphony_group) {
                Some((_, n)) => *n += 1,
                None => intended.push((begin.polyphony_group, 1)),
            }
        }

        debug!(port, channel, key, note_id, wanted, "launching voices");

        for inst in self.init_instructions[..wanted].iter_mut() {
            *inst = VoiceInit::Start;
        }

        for &(group, count) in &intended {
            let (play_mode, features) = {
                let rec = self.groups.guarantee(group);
                (rec.play_mode, rec.mono_features)
            };
            match play_mode {
                PlayMode::PolyVoices => self.steal_for_group(group, count),
                PlayMode::MonoNotes => self.prepare_mono_group(
                    group, features, count, wanted, port, channel, key, note_id, velocity,
                ),
            }
        }

        // Bring the new voices up to date with the channel's controllers.
        if (0..16).contains(&channel) {
            let ch = channel as usize;
            if self.last_pb_by_channel[ch] != 0 {
                let pb = (i32::from(self.last_pb_by_channel[ch]) + 8192) as u16;
                self.mono.set_midi_pitch_bend(channel, pb);
            }
            for cc in 0..128 {
                let val = self.cc_cache[ch][cc];
                if val != 0 {
                    self.mono.set_midi1_cc(channel, cc as u8, val);
                }
            }
        }

        for cookie in self.init_cookies[..wanted].iter_mut() {
            *cookie = None;
        }
        self.responder.initialize_multiple_voices(
            &self.init_instructions[..wanted],
            &mut self.init_cookies[..wanted],
            port,
            channel,
            key,
            note_id,
            velocity,
            retune,
        );

        let tx = self.next_transaction();
        let mut started = 0usize;
        let mut placed = 0usize;
        for i in 0..wanted {
            if self.init_instructions[i] == VoiceInit::Skip {
                continue;
            }
            started += 1;
            let Some(cookie) = self.init_cookies[i] else {
                // Host declined this entry; tolerated. The ledger below
                // still records the press so a later release matches.
                continue;
            };
            let Some(idx) = self.slots.iter().position(|s| !s.in_use()) else {
                break;
            };
            let counter = self.next_counter();
            let group = self.begin_buffer[i].polyphony_group;
            let slot = &mut self.slots[idx];
            slot.cookie = Some(cookie);
            slot.address = NoteAddress::new(port, channel, key, note_id);
            slot.original = slot.address;
            slot.voice_id = note_id;
            slot.note_ids.clear();
            slot.push_note_id(note_id);
            slot.gated = true;
            slot.gated_due_to_sustain = false;
            slot.poly_group = group;
            slot.voice_counter = counter;
            slot.transaction_id = tx;
            self.groups.add_used(group, 1);
            self.total_used += 1;
            placed += 1;
        }

        for begin in &self.begin_buffer[..wanted] {
            self.ledger
                .record(port, channel, key, begin.polyphony_group, tx, velocity);
        }

        self.responder
            .end_voice_creation_transaction(port, channel, key, note_id, velocity);

        placed == started
    }

    /// Piano-mode reuse: re-strike every ringing (released or
    /// pedal-prolonged) voice on this key instead of layering a new one.
    /// Actively gated voices are left alone so chords can still stack.
    fn reuse_ringing_voices(
        &mut self,
        port: i16,
        channel: i16,
        key: i16,
        note_id: i32,
        velocity: f32,
    ) -> bool {
        let probe = NoteAddress::new(port, channel, key, NO_NOTE_ID);
        let tx = self.next_transaction();
        let mut reused = false;
        for i in 0..self.slots.len() {
            if !self.slots[i].matches(probe) {
                continue;
            }
            if self.slots[i].gated && !self.slots[i].gated_due_to_sustain {
                continue;
            }
            let Some(cookie) = self.slots[i].cookie else { continue };
            self.responder
                .retrigger_voice_with_new_note_id(cookie, note_id, velocity);
            let counter = self.next_counter();
            let group = self.slots[i].poly_group;
            let slot = &mut self.slots[i];
            slot.gated = true;
            slot.gated_due_to_sustain = false;
            slot.voice_counter = counter;
            slot.transaction_id = tx;
            slot.push_note_id(note_id);
            slot.address.note_id = note_id;
            self.ledger.record(port, channel, key, group, tx, velocity);
            reused = true;
        }
        if reused {
            debug!(port, channel, key, note_id, "piano reuse");
        }
        reused
    }

    /// Make room for `intended` new voices in a poly group, terminating
    /// victims (and their transaction mates) until the group and the
    /// physical pool both fit.
    fn steal_for_group(&mut self, group: PolyGroup, intended: i32) {
        let (limit, used, priority) = {
            let rec = self.groups.guarantee(group);
            (rec.limit, rec.used, rec.stealing)
        };
        let group_free = (limit - used).max(0);
        let global_free = self.max_voices as i32 - self.total_used;
        let free = group_free.min(global_free);
        let mut to_steal = (intended - free).max(0);
        // Victims outside the group are fair game only when the group
        // itself has room but the physical pool is exhausted.
        let cross_group = group_free > 0 && global_free == 0;

        let mut last = to_steal + 1;
        while to_steal > 0 && to_steal != last {
            last = to_steal;
            let Some(victim) = find_stealable(&self.slots, group, priority, cross_group) else {
                continue;
            };
            let Some(victim_cookie) = self.slots[victim].cookie else { continue };
            let victim_tx = self.slots[victim].transaction_id;
            debug!(group, victim, to_steal, "stealing voice");
            self.responder.terminate_voice(victim_cookie);
            to_steal -= 1;
            // Voices born in the same transaction die together, so a
            // stolen chord never fragments.
            for i in 0..self.slots.len() {
                let s = &self.slots[i];
                if let Some(c) = s.cookie {
                    if c != victim_cookie && s.transaction_id == victim_tx {
                        self.responder.terminate_voice(c);
                        to_steal -= 1;
                    }
                }
            }
            self.reap();
        }
    }

    /// Mono-group handling for a note-on: legato-move live voices, or
    /// terminate the group so the init pass starts fresh ones.
    #[allow(clippy::too_many_arguments)]
    fn prepare_mono_group(
        &mut self,
        group: PolyGroup,
        features: MonoFeatures,
        intended: i32,
        wanted: usize,
        port: i16,
        channel: i16,
        key: i16,
        note_id: i32,
        velocity: f32,
    ) {
        let has_live = self.slots.iter().any(|s| s.in_use() && s.poly_group == group);
        if features.legato() && has_live {
            for i in 0..self.slots.len() {
                if !self.slots[i].in_use() || self.slots[i].poly_group != group {
                    continue;
                }
                let Some(cookie) = self.slots[i].cookie else { continue };
                if self.slots[i].in_release() {
                    // The voice is ringing out; moving it needs a fresh
                    // attack.
                    self.responder
                        .move_and_retrigger_voice(cookie, port, channel, key, velocity);
                } else {
                    // Still sounding, gated or pedal-prolonged.
                    self.responder.move_voice(cookie, port, channel, key, velocity);
                }
                let slot = &mut self.slots[i];
                slot.gated = true;
                slot.gated_due_to_sustain = false;
                slot.address.port = port;
                slot.address.channel = channel;
                slot.address.key = key;
                slot.address.note_id = note_id;
                slot.push_note_id(note_id);
            }
            // The group keeps its voices; the host must not also create
            // fresh ones for it.
            for i in 0..wanted {
                if self.begin_buffer[i].polyphony_group == group {
                    self.init_instructions[i] = VoiceInit::Skip;
                }
            }
        } else {
            for i in 0..self.slots.len() {
                if self.slots[i].in_use() && self.slots[i].poly_group == group {
                    if let Some(cookie) = self.slots[i].cookie {
                        self.responder.terminate_voice(cookie);
                    }
                }
            }
            self.reap();
            self.steal_for_group(group, intended);
        }
    }

    // ===== note off =====

    pub fn process_note_off(
        &mut self,
        port: i16,
        channel: i16,
        key: i16,
        note_id: i32,
        velocity: f32,
    ) {
        self.reap();
        let sustain = self.sustain_is_down(self.sustain_channel_for(channel));
        let probe = NoteAddress::new(port, channel, key, note_id);
        let mut retrig: ArrayVec<PolyGroup, GROUP_CAP> = ArrayVec::new();

        for i in 0..self.slots.len() {
            if !self.slots[i].matches(probe) {
                continue;
            }
            let group = self.slots[i].poly_group;
            let (play_mode, features) = {
                let rec = self.groups.guarantee(group);
                (rec.play_mode, rec.mono_features)
            };
            if play_mode == PlayMode::MonoNotes {
                let other_held = self.ledger.any_other_held(group, port, channel, key);
                if features.legato() && other_held {
                    push_unique(&mut retrig, group);
                } else if sustain && other_held {
                    // A different held key should become the sounding
                    // one; this voice cannot survive the swap.
                    if let Some(cookie) = self.slots[i].cookie {
                        self.responder.terminate_voice(cookie);
                    }
                    push_unique(&mut retrig, group);
                } else if sustain {
                    self.slots[i].gated = false;
                    self.slots[i].gated_due_to_sustain = true;
                } else if other_held {
                    if let Some(cookie) = self.slots[i].cookie {
                        self.responder.terminate_voice(cookie);
                    }
                    push_unique(&mut retrig, group);
                } else {
                    if self.slots[i].gated {
                        if let Some(cookie) = self.slots[i].cookie {
                            self.responder.release_voice(cookie, velocity);
                        }
                    }
                    self.slots[i].gated = false;
                }
            } else if sustain {
                self.slots[i].gated = false;
                self.slots[i].gated_due_to_sustain = true;
            } else if self.slots[i].gated {
                if let Some(cookie) = self.slots[i].cookie {
                    self.responder.release_voice(cookie, velocity);
                }
                self.slots[i].gated = false;
            }
        }
        self.reap();

        if sustain {
            self.ledger.sustain_key(port, channel, key);
        } else {
            self.ledger.clear_key(port, channel, key);
        }

        for &group in &retrig {
            self.mono_retrigger(group);
        }

        if note_id != NO_NOTE_ID {
            for &group in &retrig {
                for slot in self.slots.iter_mut() {
                    if slot.in_use() && slot.poly_group == group {
                        slot.pop_note_id(note_id);
                    }
                }
            }
        }
    }

    /// Bring a mono group back to its best fallback key: a legato group
    /// moves its voices there, a retrigger group launches a fresh voice
    /// with the key's inception velocity.
    fn mono_retrigger(&mut self, group: PolyGroup) {
        let features = {
            let rec = self.groups.guarantee(group);
            debug_assert!(rec.play_mode == PlayMode::MonoNotes);
            rec.mono_features
        };
        let Some(fb) = self.ledger.best_fallback(group, features.release_target()) else {
            return;
        };
        debug!(group, key = fb.key, "mono fallback");

        if features.legato() {
            for i in 0..self.slots.len() {
                if !self.slots[i].in_use() || self.slots[i].poly_group != group {
                    continue;
                }
                let Some(cookie) = self.slots[i].cookie else { continue };
                if self.slots[i].in_release() {
                    self.responder.move_and_retrigger_voice(
                        cookie,
                        fb.port,
                        fb.channel,
                        fb.key,
                        fb.inception_velocity,
                    );
                } else {
                    self.responder
                        .move_voice(cookie, fb.port, fb.channel, fb.key, fb.inception_velocity);
                }
                let slot = &mut self.slots[i];
                slot.gated = true;
                slot.gated_due_to_sustain = false;
                slot.address.port = fb.port;
                slot.address.channel = fb.channel;
                slot.address.key = fb.key;
            }
            return;
        }

        // Abbreviated creation transaction: only this group gets a voice.
        let wanted = self
            .responder
            .begin_voice_creation_transaction(
                &mut self.begin_buffer,
                fb.port,
                fb.channel,
                fb.key,
                NO_NOTE_ID,
                fb.inception_velocity,
            )
            .min(self.max_voices);
        if wanted == 0 {
            self.responder.end_voice_creation_transaction(
                fb.port,
                fb.channel,
                fb.key,
                NO_NOTE_ID,
                fb.inception_velocity,
            );
            return;
        }
        for i in 0..wanted {
            self.init_instructions[i] = if self.begin_buffer[i].polyphony_group == group {
                VoiceInit::Start
            } else {
                VoiceInit::Skip
            };
            self.init_cookies[i] = None;
        }
        self.responder.initialize_multiple_voices(
            &self.init_instructions[..wanted],
            &mut self.init_cookies[..wanted],
            fb.port,
            fb.channel,
            fb.key,
            NO_NOTE_ID,
            fb.inception_velocity,
            0.0,
        );
        let tx = self.next_transaction();
        for i in 0..wanted {
            if self.init_instructions[i] == VoiceInit::Skip {
                continue;
            }
            let Some(cookie) = self.init_cookies[i] else { continue };
            let Some(idx) = self.slots.iter().position(|s| !s.in_use()) else {
                break;
            };
            let counter = self.next_counter();
            let slot = &mut self.slots[idx];
            slot.cookie = Some(cookie);
            slot.address = NoteAddress::new(fb.port, fb.channel, fb.key, NO_NOTE_ID);
            slot.original = slot.address;
            slot.voice_id = NO_NOTE_ID;
            slot.note_ids.clear();
            slot.gated = true;
            slot.gated_due_to_sustain = false;
            slot.poly_group = group;
            slot.voice_counter = counter;
            slot.transaction_id = tx;
            self.groups.add_used(group, 1);
            self.total_used += 1;
        }
        self.responder.end_voice_creation_transaction(
            fb.port,
            fb.channel,
            fb.key,
            NO_NOTE_ID,
            fb.inception_velocity,
        );
    }

    // ===== sustain pedal =====

    /// Level above 64 means down. On the release transition, voices the
    /// pedal was prolonging are let go (mono groups fall back first),
    /// and ledger entries for keys only the pedal was holding are
    /// purged.
    pub fn update_sustain_pedal(&mut self, port: i16, channel: i16, level: u8) {
        self.reap();
        let down = level > 64;
        if !(0..16).contains(&channel) {
            return;
        }
        let was_down = self.sustain_down[channel as usize];
        self.sustain_down[channel as usize] = down;
        if !was_down || down {
            return;
        }

        // In MPE the pedal is global and sweeps every member channel.
        let sweep = match self.dialect {
            Midi1Dialect::Midi1 => NoteAddress::channel_wide(port, channel),
            Midi1Dialect::Midi1Mpe => NoteAddress::channel_wide(port, WILDCARD),
        };
        let mut retrig: ArrayVec<PolyGroup, GROUP_CAP> = ArrayVec::new();
        for i in 0..self.slots.len() {
            if !self.slots[i].gated_due_to_sustain || !self.slots[i].matches(sweep) {
                continue;
            }
            let group = self.slots[i].poly_group;
            let is_mono = self
                .groups
                .get(group)
                .map(|rec| rec.play_mode == PlayMode::MonoNotes)
                .unwrap_or(false);
            if is_mono {
                push_unique(&mut retrig, group);
            }
            if let Some(cookie) = self.slots[i].cookie {
                self.responder.release_voice(cookie, 0.0);
            }
            self.slots[i].gated = false;
            self.slots[i].gated_due_to_sustain = false;
        }
        self.reap();

        match self.dialect {
            Midi1Dialect::Midi1 => self.ledger.purge_sustained(port, channel),
            Midi1Dialect::Midi1Mpe => self.ledger.purge_sustained(port, WILDCARD),
        }

        for &group in &retrig {
            self.mono_retrigger(group);
        }
    }

    // ===== routing =====

    pub fn route_midi_pitch_bend(&mut self, port: i16, channel: i16, pb14: u16) {
        match self.dialect {
            Midi1Dialect::Midi1 => self.mono_pitch_bend(channel, pb14),
            Midi1Dialect::Midi1Mpe => {
                if channel == self.mpe_global_channel {
                    self.mono_pitch_bend(WILDCARD, pb14);
                } else {
                    let probe = NoteAddress::channel_wide(port, channel);
                    for i in 0..self.slots.len() {
                        if self.slots[i].matches(probe) && self.slots[i].gated {
                            let Some(cookie) = self.slots[i].cookie else { continue };
                            self.responder.set_voice_mpe_channel_pitch_bend(cookie, pb14);
                        }
                    }
                }
            }
        }
    }

    fn mono_pitch_bend(&mut self, channel: i16, pb14: u16) {
        if (0..16).contains(&channel) {
            self.last_pb_by_channel[channel as usize] = (i32::from(pb14) - 8192) as i16;
        }
        self.mono.set_midi_pitch_bend(channel, pb14);
    }

    pub fn route_midi1_cc(&mut self, port: i16, channel: i16, cc: u8, value: u8) {
        if self.dialect == Midi1Dialect::Midi1Mpe
            && channel != self.mpe_global_channel
            && cc == self.mpe_timbre_cc
        {
            let probe = NoteAddress::channel_wide(port, channel);
            for i in 0..self.slots.len() {
                if self.slots[i].matches(probe) && self.slots[i].gated {
                    let Some(cookie) = self.slots[i].cookie else { continue };
                    self.responder.set_voice_mpe_timbre(cookie, value);
                }
            }
            return;
        }
        if (0..16).contains(&channel) && (cc as usize) < 128 {
            self.cc_cache[channel as usize][cc as usize] = value;
        }
        self.mono.set_midi1_cc(channel, cc, value);
    }

    pub fn route_channel_pressure(&mut self, port: i16, channel: i16, value: u8) {
        let per_voice =
            self.dialect == Midi1Dialect::Midi1Mpe && channel != self.mpe_global_channel;
        if !per_voice {
            self.mono.set_midi_channel_pressure(channel, value);
            return;
        }
        let probe = NoteAddress::channel_wide(port, channel);
        for i in 0..self.slots.len() {
            if self.slots[i].matches(probe) && self.slots[i].gated {
                let Some(cookie) = self.slots[i].cookie else { continue };
                self.responder.set_voice_mpe_channel_pressure(cookie, value);
            }
        }
    }

    pub fn route_polyphonic_aftertouch(&mut self, port: i16, channel: i16, key: i16, value: u8) {
        let probe = NoteAddress::new(port, channel, key, NO_NOTE_ID);
        for i in 0..self.slots.len() {
            if self.slots[i].matches(probe) {
                let Some(cookie) = self.slots[i].cookie else { continue };
                self.responder.set_polyphonic_aftertouch(cookie, value);
            }
        }
    }

    pub fn route_note_expression(
        &mut self,
        port: i16,
        channel: i16,
        key: i16,
        note_id: i32,
        expression: i32,
        value: f64,
    ) {
        let probe = NoteAddress::new(port, channel, key, note_id);
        for i in 0..self.slots.len() {
            if self.slots[i].matches(probe) {
                let Some(cookie) = self.slots[i].cookie else { continue };
                self.responder.set_note_expression(cookie, expression, value);
            }
        }
    }

    /// Parameter modulation is addressed by the voice's birth identity
    /// and immutable voice id, so it follows a voice through legato
    /// moves.
    pub fn route_polyphonic_parameter_modulation(
        &mut self,
        port: i16,
        channel: i16,
        key: i16,
        note_id: i32,
        parameter: u32,
        value: f64,
    ) {
        let probe = NoteAddress::new(port, channel, key, note_id);
        for i in 0..self.slots.len() {
            if self.slots[i].matches_voice_id(probe) {
                let Some(cookie) = self.slots[i].cookie else { continue };
                self.responder
                    .set_voice_polyphonic_parameter_modulation(cookie, parameter, value);
            }
        }
    }

    pub fn route_monophonic_parameter_modulation(
        &mut self,
        _port: i16,
        channel: i16,
        parameter: u32,
        value: f64,
    ) {
        self.mono
            .set_monophonic_parameter_modulation(channel, parameter, value);
    }

    // ===== panic =====

    /// Release every voice gracefully. Idempotent.
    pub fn all_notes_off(&mut self) {
        self.reap();
        for i in 0..self.slots.len() {
            if !self.slots[i].in_use() {
                continue;
            }
            if let Some(cookie) = self.slots[i].cookie {
                self.responder.release_voice(cookie, 0.0);
            }
            self.slots[i].gated = false;
            self.slots[i].gated_due_to_sustain = false;
        }
        self.ledger.clear();
        self.reap();
    }

    /// Terminate every voice immediately. Idempotent.
    pub fn all_sounds_off(&mut self) {
        self.reap();
        for i in 0..self.slots.len() {
            if let Some(cookie) = self.slots[i].cookie {
                self.responder.terminate_voice(cookie);
            }
        }
        self.ledger.clear();
        self.reap();
    }

    // ===== internals =====

    fn next_counter(&mut self) -> u64 {
        self.next_voice_counter += 1;
        self.next_voice_counter
    }

    fn next_transaction(&mut self) -> u64 {
        self.next_transaction_id += 1;
        self.next_transaction_id
    }

    /// The channel whose pedal state governs a note event.
    fn sustain_channel_for(&self, channel: i16) -> i16 {
        match self.dialect {
            Midi1Dialect::Midi1 => channel,
            Midi1Dialect::Midi1Mpe => self.mpe_global_channel,
        }
    }

    fn sustain_is_down(&self, channel: i16) -> bool {
        (0..16).contains(&channel) && self.sustain_down[channel as usize]
    }
}

fn push_unique(groups: &mut ArrayVec<PolyGroup, GROUP_CAP>, group: PolyGroup) {
    if !groups.contains(&group) {
        groups.push(group);
    }
}
