//! Polyphonic voice-allocation engine.
//!
//! Sits between a musical event stream (note on/off, sustain pedal,
//! pitch bend, controllers, aftertouch, note expressions, per-note
//! parameter modulation) and a host-owned voice pool. The engine decides
//! which voices are created, moved, released, or terminated for each
//! event, honoring per-group play modes (poly, mono retrigger, mono
//! legato), repeated-key behavior (multi-voice or piano), stealing
//! priorities, per-group voice limits, sustain-pedal semantics, and an
//! MPE-aware reading of channel messages.
//!
//! The engine produces no audio and owns no voice memory: hosts
//! implement [`pvx_core::VoiceResponder`] and hand out opaque cookies.
//! All storage is preallocated at construction; nothing on the event
//! path touches the heap.

mod engine;
mod groups;
mod ledger;
pub mod midi1;
mod slot;
mod steal;

pub use engine::VoiceManager;
pub use midi1::{apply_midi1_message, MidiParseError};
