//! Collaborator contracts between the engine and its host.
//!
//! The engine never owns voices. It drives a [`VoiceResponder`], the
//! host-side object that creates, moves, releases, and terminates real
//! voices, and a [`MonoResponder`] for channel-wide control data. Both
//! are generic parameters of the engine so the per-event call chain
//! stays statically dispatched.

use crate::PolyGroup;

/// One intended voice announced by the host at the start of a
/// voice-creation transaction.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoiceBegin {
    /// Group the intended voice wants to join.
    pub polyphony_group: PolyGroup,
}

/// Engine instruction for one intended voice at initialization time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoiceInit {
    /// Create this voice.
    #[default]
    Start,
    /// Do not create this voice (the engine satisfied it another way,
    /// for example by a legato move).
    Skip,
}

/// Standard MIDI velocity-byte to unit-range conversion.
pub fn midi_to_float_velocity(vel: u8) -> f32 {
    f32::from(vel) / 127.0
}

/// Host-side per-voice operations.
///
/// Voice identity is an opaque `Cookie` the host hands out at
/// initialization; the engine only stores and compares cookies, never
/// inspects them.
///
/// # Voice lifetime
///
/// Every voice the host creates must eventually be reported finished
/// through [`next_ended_voice`](VoiceResponder::next_ended_voice):
/// immediately for [`terminate_voice`](VoiceResponder::terminate_voice),
/// after the release tail for
/// [`release_voice`](VoiceResponder::release_voice). The engine drains
/// that queue inside every event call; hosts whose tails finish between
/// events call the engine's `reap` entry point.
pub trait VoiceResponder {
    /// Opaque reference to one host voice.
    type Cookie: Copy + PartialEq + core::fmt::Debug;

    /// Decide how many voices this note-on should create and which
    /// group each joins. Write one entry per intended voice into
    /// `begins` (sized to the physical voice count) and return the
    /// count. Zero means "swallow this event"; a count above the buffer
    /// length fails the note-on without touching any voice.
    fn begin_voice_creation_transaction(
        &mut self,
        begins: &mut [VoiceBegin],
        port: i16,
        channel: i16,
        key: i16,
        note_id: i32,
        velocity: f32,
    ) -> usize;

    /// Create the intended voices. For each `Start` instruction, write a
    /// cookie into the matching `cookies` entry; leave `Skip` entries
    /// (and any the host cannot satisfy) as `None`. Returns the number
    /// of voices created.
    #[allow(clippy::too_many_arguments)]
    fn initialize_multiple_voices(
        &mut self,
        instructions: &[VoiceInit],
        cookies: &mut [Option<Self::Cookie>],
        port: i16,
        channel: i16,
        key: i16,
        note_id: i32,
        velocity: f32,
        retune: f32,
    ) -> usize;

    /// Always called exactly once per `begin_voice_creation_transaction`.
    fn end_voice_creation_transaction(
        &mut self,
        port: i16,
        channel: i16,
        key: i16,
        note_id: i32,
        velocity: f32,
    );

    /// Kill a voice with no release tail.
    fn terminate_voice(&mut self, voice: Self::Cookie);

    /// Begin a graceful release.
    fn release_voice(&mut self, voice: Self::Cookie, velocity: f32);

    /// Legato-move a still-gated voice to a new location.
    fn move_voice(&mut self, voice: Self::Cookie, port: i16, channel: i16, key: i16, velocity: f32);

    /// Move a voice that is in its release tail and re-attack it.
    fn move_and_retrigger_voice(
        &mut self,
        voice: Self::Cookie,
        port: i16,
        channel: i16,
        key: i16,
        velocity: f32,
    );

    /// Re-strike a ringing voice under a new logical note id.
    fn retrigger_voice_with_new_note_id(&mut self, voice: Self::Cookie, note_id: i32, velocity: f32);

    fn set_note_expression(&mut self, voice: Self::Cookie, expression: i32, value: f64);
    fn set_voice_polyphonic_parameter_modulation(
        &mut self,
        voice: Self::Cookie,
        parameter: u32,
        value: f64,
    );
    fn set_polyphonic_aftertouch(&mut self, voice: Self::Cookie, value: u8);
    fn set_voice_mpe_channel_pitch_bend(&mut self, voice: Self::Cookie, value: u16);
    fn set_voice_mpe_channel_pressure(&mut self, voice: Self::Cookie, value: u8);
    fn set_voice_mpe_timbre(&mut self, voice: Self::Cookie, value: u8);

    /// Drain one cookie whose voice has finished since the last call,
    /// or `None` when the queue is empty.
    fn next_ended_voice(&mut self) -> Option<Self::Cookie>;
}

/// Host-side channel-wide operations.
///
/// `channel` may be −1 when the engine broadcasts (MPE global-channel
/// pitch bend); hosts should treat that as "all channels" or clamp.
pub trait MonoResponder {
    fn set_midi_pitch_bend(&mut self, channel: i16, pb14: u16);
    fn set_midi1_cc(&mut self, channel: i16, cc: u8, value: u8);
    fn set_midi_channel_pressure(&mut self, channel: i16, value: u8);
    fn set_monophonic_parameter_modulation(&mut self, channel: i16, parameter: u32, value: f64);
}
