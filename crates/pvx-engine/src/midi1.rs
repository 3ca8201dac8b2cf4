//! Thin MIDI 1.0 channel-message translator.
//!
//! Decodes one already-framed channel-voice message and forwards it to
//! the engine. Hosts with richer event streams (note ids, expressions)
//! call the engine surface directly; this exists for hosts that only
//! have raw MIDI bytes.

use pvx_core::{midi_to_float_velocity, MonoResponder, VoiceResponder, NO_NOTE_ID};

use crate::VoiceManager;

/// Error type for message translation.
#[derive(Debug, PartialEq, Eq)]
pub enum MidiParseError {
    /// Message is shorter than its status byte requires.
    Truncated,
    /// Status byte is not a channel-voice message this translator
    /// handles (e.g. system messages).
    UnsupportedStatus(u8),
}

/// Apply one MIDI 1.0 channel-voice message to the engine.
///
/// The engine is left untouched on error.
pub fn apply_midi1_message<R: VoiceResponder, M: MonoResponder>(
    vm: &mut VoiceManager<R, M>,
    port: i16,
    data: &[u8],
) -> Result<(), MidiParseError> {
    let &status = data.first().ok_or(MidiParseError::Truncated)?;
    let message = status & 0xF0;
    let channel = i16::from(status & 0x0F);

    let data1 = |d: &[u8]| d.get(1).copied().ok_or(MidiParseError::Truncated);
    let data2 = |d: &[u8]| d.get(2).copied().ok_or(MidiParseError::Truncated);

    match message {
        0x90 => {
            let key = data1(data)?;
            let vel = data2(data)?;
            if vel == 0 {
                // Running-status convention: velocity zero is a release.
                vm.process_note_off(port, channel, i16::from(key), NO_NOTE_ID, 0.0);
            } else {
                vm.process_note_on(
                    port,
                    channel,
                    i16::from(key),
                    NO_NOTE_ID,
                    midi_to_float_velocity(vel),
                    0.0,
                );
            }
        }
        0x80 => {
            let key = data1(data)?;
            let vel = data2(data)?;
            vm.process_note_off(
                port,
                channel,
                i16::from(key),
                NO_NOTE_ID,
                midi_to_float_velocity(vel),
            );
        }
        0xA0 => {
            let key = data1(data)?;
            let pressure = data2(data)?;
            vm.route_polyphonic_aftertouch(port, channel, i16::from(key), pressure);
        }
        0xB0 => {
            let cc = data1(data)?;
            let value = data2(data)?;
            match cc {
                64 => vm.update_sustain_pedal(port, channel, value),
                120 => vm.all_sounds_off(),
                123 => vm.all_notes_off(),
                _ => vm.route_midi1_cc(port, channel, cc, value),
            }
        }
        0xD0 => {
            let pressure = data1(data)?;
            vm.route_channel_pressure(port, channel, pressure);
        }
        0xE0 => {
            let lsb = data1(data)?;
            let msb = data2(data)?;
            let bend = u16::from(lsb) | (u16::from(msb) << 7);
            vm.route_midi_pitch_bend(port, channel, bend);
        }
        other => return Err(MidiParseError::UnsupportedStatus(other)),
    }
    Ok(())
}
