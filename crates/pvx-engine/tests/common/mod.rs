//! Scriptable test host for driving the engine.
//!
//! The host "plays" voices by updating plain records: a released voice
//! fades over [`RELEASE_TAIL`] calls to `process` and then reports
//! itself ended. By default one voice is created per note at or below
//! key 72 and three voices above it; alternative plans create one voice
//! per configured group for every key, or a fixed fan-out.

// Each test binary compiles its own copy and uses a different subset.
#![allow(dead_code)]

use std::collections::VecDeque;

use pvx_core::{MonoResponder, VoiceBegin, VoiceInit, VoiceResponder, NO_NOTE_ID};
use pvx_engine::VoiceManager;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Opaque cookie handed to the engine.
    pub struct VoiceKey;
}

/// Calls to `process` a released voice survives before ending.
pub const RELEASE_TAIL: i32 = 5;

/// Keys at or below this get one voice; higher keys get three.
pub const MULTI_VOICE_SPLIT: i16 = 72;

#[derive(Clone, Debug)]
pub struct HostVoice {
    pub runtime: i32,
    pub creation_count: i32,
    pub gated: bool,
    pub release_countdown: i32,
    pub velocity: f32,
    pub release_velocity: f32,
    pub port: i16,
    pub channel: i16,
    pub key: i16,
    pub note_id: i32,
    pub original_key: i16,
    pub voice_id: i32,
    pub poly_at: u8,
    pub mpe_bend: u16,
    pub mpe_pressure: u8,
    pub mpe_timbre: u8,
    pub note_expression: Vec<(i32, f64)>,
    pub param_modulation: Vec<(u32, f64)>,
}

/// How the host answers a voice-creation transaction.
pub enum BeginPlan {
    /// One voice per key up to [`MULTI_VOICE_SPLIT`], three above.
    PerKey,
    /// One voice per listed group for every key.
    EveryKey(Vec<u64>),
    /// A fixed fan-out in the default group, regardless of key.
    Fixed(usize),
}

pub struct TestHost {
    pub voices: SlotMap<VoiceKey, HostVoice>,
    ended: VecDeque<VoiceKey>,
    pub creation_count: i32,
    pub plan: BeginPlan,
    pub group_for_key: Option<fn(i16) -> u64>,
    capacity: usize,
}

impl TestHost {
    pub fn new(capacity: usize) -> Self {
        Self {
            voices: SlotMap::with_capacity_and_key(capacity),
            ended: VecDeque::with_capacity(capacity),
            creation_count: 0,
            plan: BeginPlan::PerKey,
            group_for_key: None,
            capacity,
        }
    }

    /// Advance all voices by one step; finished tails report ended.
    pub fn process(&mut self) {
        let ended = &mut self.ended;
        self.voices.retain(|key, v| {
            v.runtime += 1;
            if !v.gated {
                v.release_countdown -= 1;
                if v.release_countdown <= 0 {
                    ended.push_back(key);
                    return false;
                }
            }
            true
        });
    }

    fn wanted_for(&self, key: i16) -> usize {
        match &self.plan {
            BeginPlan::PerKey => {
                if key > MULTI_VOICE_SPLIT {
                    3
                } else {
                    1
                }
            }
            BeginPlan::EveryKey(groups) => groups.len(),
            BeginPlan::Fixed(n) => *n,
        }
    }
}

impl VoiceResponder for TestHost {
    type Cookie = VoiceKey;

    fn begin_voice_creation_transaction(
        &mut self,
        begins: &mut [VoiceBegin],
        _port: i16,
        _channel: i16,
        key: i16,
        _note_id: i32,
        _velocity: f32,
    ) -> usize {
        let wanted = self.wanted_for(key);
        for (i, begin) in begins.iter_mut().take(wanted).enumerate() {
            begin.polyphony_group = match &self.plan {
                BeginPlan::EveryKey(groups) => groups[i],
                _ => self.group_for_key.map_or(0, |f| f(key)),
            };
        }
        wanted
    }

    fn initialize_multiple_voices(
        &mut self,
        instructions: &[VoiceInit],
        cookies: &mut [Option<VoiceKey>],
        port: i16,
        channel: i16,
        key: i16,
        note_id: i32,
        velocity: f32,
        _retune: f32,
    ) -> usize {
        let required = instructions.iter().filter(|i| **i == VoiceInit::Start).count();
        if self.capacity - self.voices.len() < required {
            return 0;
        }
        let mut created = 0;
        for (i, instruction) in instructions.iter().enumerate() {
            if *instruction == VoiceInit::Skip {
                cookies[i] = None;
                continue;
            }
            self.creation_count += 1;
            let voice = HostVoice {
                runtime: 0,
                creation_count: self.creation_count,
                gated: true,
                release_countdown: 0,
                velocity,
                release_velocity: 0.0,
                port,
                channel,
                key,
                note_id,
                original_key: key,
                voice_id: note_id,
                poly_at: 0,
                mpe_bend: 0,
                mpe_pressure: 0,
                mpe_timbre: 0,
                note_expression: Vec::new(),
                param_modulation: Vec::new(),
            };
            cookies[i] = Some(self.voices.insert(voice));
            created += 1;
        }
        created
    }

    fn end_voice_creation_transaction(
        &mut self,
        _port: i16,
        _channel: i16,
        _key: i16,
        _note_id: i32,
        _velocity: f32,
    ) {
    }

    fn terminate_voice(&mut self, voice: VoiceKey) {
        if self.voices.remove(voice).is_some() {
            self.ended.push_back(voice);
        }
    }

    fn release_voice(&mut self, voice: VoiceKey, velocity: f32) {
        if let Some(v) = self.voices.get_mut(voice) {
            v.gated = false;
            v.release_countdown = RELEASE_TAIL;
            v.release_velocity = velocity;
        }
    }

    fn move_voice(&mut self, voice: VoiceKey, port: i16, channel: i16, key: i16, _velocity: f32) {
        if let Some(v) = self.voices.get_mut(voice) {
            v.port = port;
            v.channel = channel;
            v.key = key;
        }
    }

    fn move_and_retrigger_voice(
        &mut self,
        voice: VoiceKey,
        port: i16,
        channel: i16,
        key: i16,
        velocity: f32,
    ) {
        if let Some(v) = self.voices.get_mut(voice) {
            assert!(!v.gated, "retrigger-move of a gated voice");
            v.port = port;
            v.channel = channel;
            v.key = key;
            v.gated = true;
            v.release_countdown = 0;
            v.velocity = velocity;
        }
    }

    fn retrigger_voice_with_new_note_id(&mut self, voice: VoiceKey, note_id: i32, velocity: f32) {
        if let Some(v) = self.voices.get_mut(voice) {
            v.gated = true;
            v.release_countdown = 0;
            v.velocity = velocity;
            v.note_id = note_id;
        }
    }

    fn set_note_expression(&mut self, voice: VoiceKey, expression: i32, value: f64) {
        if let Some(v) = self.voices.get_mut(voice) {
            upsert(&mut v.note_expression, expression, value);
        }
    }

    fn set_voice_polyphonic_parameter_modulation(
        &mut self,
        voice: VoiceKey,
        parameter: u32,
        value: f64,
    ) {
        if let Some(v) = self.voices.get_mut(voice) {
            upsert(&mut v.param_modulation, parameter, value);
        }
    }

    fn set_polyphonic_aftertouch(&mut self, voice: VoiceKey, value: u8) {
        if let Some(v) = self.voices.get_mut(voice) {
            v.poly_at = value;
        }
    }

    fn set_voice_mpe_channel_pitch_bend(&mut self, voice: VoiceKey, value: u16) {
        if let Some(v) = self.voices.get_mut(voice) {
            v.mpe_bend = value;
        }
    }

    fn set_voice_mpe_channel_pressure(&mut self, voice: VoiceKey, value: u8) {
        if let Some(v) = self.voices.get_mut(voice) {
            v.mpe_pressure = value;
        }
    }

    fn set_voice_mpe_timbre(&mut self, voice: VoiceKey, value: u8) {
        if let Some(v) = self.voices.get_mut(voice) {
            v.mpe_timbre = value;
        }
    }

    fn next_ended_voice(&mut self) -> Option<VoiceKey> {
        self.ended.pop_front()
    }
}

fn upsert<K: PartialEq>(entries: &mut Vec<(K, f64)>, key: K, value: f64) {
    if let Some(e) = entries.iter_mut().find(|(k, _)| *k == key) {
        e.1 = value;
    } else {
        entries.push((key, value));
    }
}

pub struct MonoRecorder {
    pub pitch_bend: [u16; 16],
    pub midi1_cc: [[u8; 128]; 16],
    pub channel_pressure: [u8; 16],
    pub param_modulation: Vec<(i16, u32, f64)>,
}

impl MonoRecorder {
    pub fn new() -> Self {
        Self {
            pitch_bend: [0; 16],
            midi1_cc: [[0; 128]; 16],
            channel_pressure: [0; 16],
            param_modulation: Vec::new(),
        }
    }
}

impl MonoResponder for MonoRecorder {
    fn set_midi_pitch_bend(&mut self, channel: i16, pb14: u16) {
        self.pitch_bend[channel.clamp(0, 15) as usize] = pb14;
    }

    fn set_midi1_cc(&mut self, channel: i16, cc: u8, value: u8) {
        self.midi1_cc[channel.clamp(0, 15) as usize][cc as usize] = value;
    }

    fn set_midi_channel_pressure(&mut self, channel: i16, value: u8) {
        self.channel_pressure[channel.clamp(0, 15) as usize] = value;
    }

    fn set_monophonic_parameter_modulation(&mut self, channel: i16, parameter: u32, value: f64) {
        self.param_modulation.push((channel, parameter, value));
    }
}

pub struct TestPlayer {
    pub vm: VoiceManager<TestHost, MonoRecorder>,
}

impl TestPlayer {
    pub fn new(max_voices: usize) -> Self {
        Self {
            vm: VoiceManager::new(max_voices, TestHost::new(max_voices), MonoRecorder::new()),
        }
    }

    /// A player whose host creates one voice in each listed group for
    /// every key.
    pub fn with_groups(max_voices: usize, groups: &[u64]) -> Self {
        let mut tp = Self::new(max_voices);
        tp.host_mut().plan = BeginPlan::EveryKey(groups.to_vec());
        for &g in groups {
            tp.vm.guarantee_group(g);
        }
        tp
    }

    pub fn host(&self) -> &TestHost {
        self.vm.responder()
    }

    pub fn host_mut(&mut self) -> &mut TestHost {
        self.vm.responder_mut()
    }

    pub fn mono(&self) -> &MonoRecorder {
        self.vm.mono_responder()
    }

    /// One host step plus a reap, the way a real host pumps its audio
    /// thread.
    pub fn process(&mut self) {
        self.vm.responder_mut().process();
        self.vm.reap();
    }

    pub fn process_for(&mut self, times: usize) {
        for _ in 0..times {
            self.process();
        }
    }

    // ----- event shorthand (port 0) -----

    pub fn note_on(&mut self, channel: i16, key: i16, note_id: i32, velocity: f32) -> bool {
        self.vm.process_note_on(0, channel, key, note_id, velocity, 0.0)
    }

    pub fn note_off(&mut self, channel: i16, key: i16, note_id: i32, velocity: f32) {
        self.vm.process_note_off(0, channel, key, note_id, velocity)
    }

    pub fn simple_on(&mut self, key: i16) -> bool {
        self.note_on(0, key, NO_NOTE_ID, 0.8)
    }

    pub fn simple_off(&mut self, key: i16) {
        self.note_off(0, key, NO_NOTE_ID, 0.8)
    }

    // ----- probes -----

    pub fn active_matching(&self, pred: impl Fn(&HostVoice) -> bool) -> usize {
        self.host().voices.values().filter(|v| pred(v)).count()
    }

    /// True when every active voice passing `filter` satisfies `cond`,
    /// and at least one did.
    pub fn all_active(
        &self,
        filter: impl Fn(&HostVoice) -> bool,
        cond: impl Fn(&HostVoice) -> bool,
    ) -> bool {
        let mut any = false;
        for v in self.host().voices.values() {
            if filter(v) {
                any = true;
                if !cond(v) {
                    return false;
                }
            }
        }
        any
    }

    pub fn key_count(&self, key: i16) -> usize {
        self.active_matching(|v| v.key == key)
    }

    /// Assert the engine's counts and the host's live-voice total.
    ///
    /// The host-side gated count is not compared: a pedal-prolonged
    /// voice is un-gated to the engine while the host never saw a
    /// release.
    #[track_caller]
    pub fn assert_counts(&self, total: usize, gated: usize) {
        assert_eq!(self.vm.voice_count(), total, "engine voice count");
        assert_eq!(self.vm.gated_voice_count(), gated, "engine gated count");
        assert_eq!(self.host().voices.len(), total, "host voice count");
    }

    #[track_caller]
    pub fn assert_no_voices(&self) {
        self.assert_counts(0, 0);
    }
}
