//! Play engines
//!
//! Two engines translate held notes into voltages: [`MonoEngine`] (note
//! stack, glide, pressure-driven aux CV) and [`ArpEngine`] (pattern stepping
//! over the held set on a BPM grid). Both implement [`PlayEngine`], the
//! capability set the mode selector dispatches on; [`MidiEngine`] is the
//! inert placeholder behind the third panel mode.

pub mod arp;
pub mod midi_stub;
pub mod mono;
pub mod note_stack;
pub mod step_grid;

pub use arp::{ArpEngine, ArpPattern};
pub use midi_stub::MidiEngine;
pub use mono::MonoEngine;
pub use note_stack::{Note, NoteStack};
pub use step_grid::StepGrid;

use crate::constants::{
    NUM_KEYS, PITCH_CENTER_VOLTAGE, PITCH_REFERENCE_MIDI_NOTE, VOLTS_PER_OCTAVE,
};
use crate::input::InputEvents;
use crate::output::OutputSnapshot;
use crate::time::TickInstant;

/// Capability set of a play engine
///
/// Note edges and aftertouch for a tick arrive before [`tick`](PlayEngine::tick)
/// runs, so the snapshot taken afterwards already reflects them. The
/// snapshot consumes the engine's one-shot flags (retrigger, UI effect).
pub trait PlayEngine {
    /// A key crossed its press threshold
    fn on_note_on(&mut self, now: TickInstant, pitch: u8, value: u16);

    /// A key crossed its release threshold
    fn on_note_off(&mut self, pitch: u8);

    /// Fresh smoothed pressure for a held key (every tick while held)
    fn on_aftertouch(&mut self, key: u8, pressure: u16);

    /// Apply this tick's control events
    fn process_inputs(
        &mut self,
        now: TickInstant,
        events: &InputEvents,
        pressed_keys: &[bool; NUM_KEYS],
    );

    /// Advance timing and voltage smoothing
    fn tick(&mut self, now: TickInstant);

    /// Produce the output snapshot, consuming one-shot flags
    fn snapshot(&mut self) -> OutputSnapshot;
}

/// Map a MIDI note to the pitch CV in volts
///
/// 1 V per octave around the reference note at the center voltage, with the
/// octave transpose folded in before the mapping.
pub fn midi_to_voltage(note: u8, octave_offset: i32) -> f32 {
    let transposed = note as i32 + octave_offset * 12;
    let delta = (transposed - PITCH_REFERENCE_MIDI_NOTE) as f32;
    PITCH_CENTER_VOLTAGE + delta / 12.0 * VOLTS_PER_OCTAVE
}
