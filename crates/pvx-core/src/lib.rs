//! Core vocabulary for the polyvox voice-allocation engine.
//!
//! This crate defines the types shared between a host synthesizer and the
//! engine: voice addresses with wildcard matching, play-mode and dialect
//! enums, the voice-creation transaction buffer entries, and the two
//! collaborator contracts the engine is driven against.
//!
//! The engine itself lives in `pvx-engine`; nothing here allocates or
//! does I/O.

mod address;
mod modes;
mod responder;

pub use address::{NoteAddress, NO_NOTE_ID, WILDCARD};
pub use modes::{
    Midi1Dialect, MonoFeatures, PlayMode, PolyGroup, ReleaseTarget, RepeatedKeyMode,
    StealingPriority, DEFAULT_GROUP,
};
pub use responder::{
    midi_to_float_velocity, MonoResponder, VoiceBegin, VoiceInit, VoiceResponder,
};
