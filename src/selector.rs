//! Mode selector: owns both play engines and dispatches to the active one
//!
//! Engines live side by side in static storage; a tagged mode decides which
//! one receives note edges, aftertouch and control events, and whose output
//! snapshot reaches the output stage. Inactive engines are frozen. The
//! selector also carries the shared aftertouch smoothing coefficient from
//! the mono engine to the arpeggiator each tick.

use log::info;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive as _;

use crate::constants::{LOWEST_MIDI_NOTE, NUM_KEYS};
use crate::engine::{ArpEngine, MidiEngine, MonoEngine, PlayEngine};
use crate::input::InputEvents;
use crate::output::{OutputSnapshot, UiEffect};
use crate::time::TickInstant;

/// Panel modes, cycled by a short press of the Mode button
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum Mode {
    /// Monophonic pressure/glide engine
    PressureGlide = 0,
    /// Arpeggiator engine
    Interval,
    /// MIDI placeholder engine
    Midi,
}

/// Number of panel modes
pub const MODE_COUNT: i32 = 3;

impl Mode {
    /// Next mode in the cycle
    pub fn next(self) -> Mode {
        Mode::from_i32((self as i32 + 1) % MODE_COUNT).unwrap_or(Mode::PressureGlide)
    }
}

/// Dispatches events to the active engine and produces the authoritative
/// output snapshot
#[derive(Debug, Clone)]
pub struct ModeSelector {
    mode: Mode,
    mono: MonoEngine,
    arp: ArpEngine,
    midi: MidiEngine,
    mode_changed: bool,
}

impl ModeSelector {
    /// Create a selector starting in the pressure/glide mode
    pub fn new() -> Self {
        ModeSelector {
            mode: Mode::PressureGlide,
            mono: MonoEngine::new(),
            arp: ArpEngine::new(),
            midi: MidiEngine::new(),
            mode_changed: false,
        }
    }

    /// Active mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The mono engine (owner of the shared aftertouch parameters)
    pub fn mono(&self) -> &MonoEngine {
        &self.mono
    }

    /// The arpeggiator engine
    pub fn arp(&self) -> &ArpEngine {
        &self.arp
    }

    /// Aftertouch deadzone the pressure pipeline should apply this tick
    pub fn deadzone_offset(&self) -> u16 {
        self.mono.deadzone_offset()
    }

    fn active(&mut self) -> &mut dyn PlayEngine {
        match self.mode {
            Mode::PressureGlide => &mut self.mono,
            Mode::Interval => &mut self.arp,
            Mode::Midi => &mut self.midi,
        }
    }

    /// Key went down: translate to a pitch and hand to the active engine
    pub fn on_key_down(&mut self, now: TickInstant, key: usize, value: u16) {
        self.active()
            .on_note_on(now, LOWEST_MIDI_NOTE + key as u8, value);
    }

    /// Key released
    pub fn on_key_up(&mut self, key: usize) {
        self.active().on_note_off(LOWEST_MIDI_NOTE + key as u8);
    }

    /// Fresh smoothed pressure for a held key
    pub fn on_aftertouch(&mut self, key: usize, pressure: u16) {
        self.active().on_aftertouch(key as u8, pressure);
    }

    /// Route this tick's control events
    ///
    /// A short press of Mode cycles the active engine; everything else goes
    /// to the active engine. The aftertouch smoothing coefficient the mono
    /// engine owns is mirrored into the arpeggiator afterwards.
    pub fn process_inputs(
        &mut self,
        now: TickInstant,
        events: &InputEvents,
        pressed_keys: &[bool; NUM_KEYS],
    ) {
        if events.mode_short {
            self.mode = self.mode.next();
            self.mode_changed = true;
            info!("mode -> {:?}", self.mode);
        }
        self.active().process_inputs(now, events, pressed_keys);
        let alpha = self.mono.aux_alpha();
        self.arp.set_shared_aux_alpha(alpha);
    }

    /// Advance the active engine's timing and smoothing
    pub fn tick(&mut self, now: TickInstant) {
        self.active().tick(now);
    }

    /// Output snapshot of the active engine, with the mode-change effect
    /// injected on transitions
    pub fn snapshot(&mut self) -> OutputSnapshot {
        let mut snapshot = self.active().snapshot();
        if self.mode_changed {
            snapshot.ui_effect = UiEffect::ModeChange;
            self.mode_changed = false;
        }
        snapshot
    }
}

impl Default for ModeSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_KEYS: [bool; NUM_KEYS] = [false; NUM_KEYS];

    fn at(ms: u32) -> TickInstant {
        TickInstant::new(ms, ms.wrapping_mul(1000))
    }

    fn cycle_mode(selector: &mut ModeSelector, now: TickInstant) {
        let events = InputEvents {
            mode_short: true,
            ..Default::default()
        };
        selector.process_inputs(now, &events, &NO_KEYS);
    }

    #[test]
    fn test_mode_cycles_through_all() {
        let mut selector = ModeSelector::new();
        assert_eq!(selector.mode(), Mode::PressureGlide);
        cycle_mode(&mut selector, at(0));
        assert_eq!(selector.mode(), Mode::Interval);
        cycle_mode(&mut selector, at(1));
        assert_eq!(selector.mode(), Mode::Midi);
        cycle_mode(&mut selector, at(2));
        assert_eq!(selector.mode(), Mode::PressureGlide);
    }

    #[test]
    fn test_mode_change_effect_is_one_shot() {
        let mut selector = ModeSelector::new();
        cycle_mode(&mut selector, at(0));
        assert_eq!(selector.snapshot().ui_effect, UiEffect::ModeChange);
        assert_eq!(selector.snapshot().ui_effect, UiEffect::None);
    }

    #[test]
    fn test_inactive_engine_is_frozen() {
        let mut selector = ModeSelector::new();
        // keys pressed in pressure/glide mode never reach the arpeggiator
        selector.on_key_down(at(0), 0, 100);
        assert_eq!(selector.arp().note_count(), 0);

        cycle_mode(&mut selector, at(1));
        selector.on_key_down(at(2), 4, 100);
        assert_eq!(selector.arp().notes(), [40]);
    }

    #[test]
    fn test_gate_comes_from_active_engine() {
        let mut selector = ModeSelector::new();
        selector.on_key_down(at(0), 0, 100);
        selector.tick(at(1));
        assert!(selector.snapshot().gate);

        // switching to the empty arpeggiator drops the gate
        cycle_mode(&mut selector, at(2));
        selector.tick(at(3));
        assert!(!selector.snapshot().gate);
    }

    #[test]
    fn test_aux_alpha_is_shared() {
        let mut selector = ModeSelector::new();
        let events = InputEvents {
            rotary_turned: true,
            rotary_delta: 20,
            oct_plus_long: true,
            ..Default::default()
        };
        selector.process_inputs(at(0), &events, &NO_KEYS);
        let alpha = selector.mono().aux_alpha();
        assert!((selector.arp().aux_alpha() - alpha).abs() < f32::EPSILON);
    }
}
