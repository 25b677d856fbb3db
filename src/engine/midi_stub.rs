//! Placeholder engine behind the third panel mode
//!
//! Keeps the output contract satisfied with safe values (center pitch, no
//! gate) until the MIDI feature set lands.
//!
//! TODO: drive pitch/gate from the serial MIDI input once the receiver
//! hardware is finalized.

use crate::constants::{NUM_KEYS, PITCH_CENTER_VOLTAGE};
use crate::input::InputEvents;
use crate::output::OutputSnapshot;
use crate::time::TickInstant;

use super::PlayEngine;

/// Inert engine with safe outputs
#[derive(Debug, Clone, Default)]
pub struct MidiEngine;

impl MidiEngine {
    /// Create the placeholder engine
    pub fn new() -> Self {
        MidiEngine
    }
}

impl PlayEngine for MidiEngine {
    fn on_note_on(&mut self, _now: TickInstant, _pitch: u8, _value: u16) {}

    fn on_note_off(&mut self, _pitch: u8) {}

    fn on_aftertouch(&mut self, _key: u8, _pressure: u16) {}

    fn process_inputs(
        &mut self,
        _now: TickInstant,
        _events: &InputEvents,
        _pressed_keys: &[bool; NUM_KEYS],
    ) {
    }

    fn tick(&mut self, _now: TickInstant) {}

    fn snapshot(&mut self) -> OutputSnapshot {
        OutputSnapshot {
            pitch_v: PITCH_CENTER_VOLTAGE,
            ..Default::default()
        }
    }
}
