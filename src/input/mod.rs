//! Input dispatcher: buttons, encoder and potentiometer to events
//!
//! Reads the raw control surface once per tick and derives the one-shot
//! [`InputEvents`] record the engines consume: debounced button edges,
//! short/long press classification, the octave buttons doubling as shift
//! keys (with combo-suppressed shorts), encoder detents with turn velocity
//! and the smoothed sensitivity potentiometer.

pub mod button;
pub mod encoder;
pub mod events;

pub use button::{Button, ButtonSnapshot};
pub use encoder::{QuadratureDecoder, VelocityTracker};
pub use events::InputEvents;

use crate::constants::{
    BUTTON_DEBOUNCE_MS, LONG_PRESS_MS, OCT_LONG_PRESS_MS, POT_DEADZONE, POT_SMOOTHING_ALPHA,
};
use crate::hal::{ButtonId, ControlSurface};
use crate::time::TickInstant;

/// Per-tick snapshots of all four buttons, for consumers that poll buttons
/// below the event layer (the calibration procedure)
#[derive(Debug, Clone, Copy, Default)]
pub struct PanelButtons {
    /// Hold button
    pub hold: ButtonSnapshot,
    /// Mode button
    pub mode: ButtonSnapshot,
    /// Octave-up button
    pub oct_plus: ButtonSnapshot,
    /// Octave-down button
    pub oct_minus: ButtonSnapshot,
}

/// Velocity-scaled parameter step
///
/// Maps normalized turn velocity through a power curve onto a step range,
/// so slow turns give fine resolution and fast turns cover the range.
pub fn velocity_scaled_step(velocity: f32, min_step: f32, max_step: f32, curve: f32) -> f32 {
    min_step + velocity.clamp(0.0, 1.0).powf(curve) * (max_step - min_step)
}

/// Turns the raw control surface into per-tick [`InputEvents`]
#[derive(Debug, Clone)]
pub struct InputDispatcher {
    hold: Button,
    mode: Button,
    oct_plus: Button,
    oct_minus: Button,
    decoder: QuadratureDecoder,
    velocity: VelocityTracker,
    pot_smoothed: f32,
    pot_last_sent: i32,
    hold_long_fired: bool,
    mode_long_fired: bool,
    oct_plus_long_armed: bool,
    oct_minus_long_armed: bool,
    oct_plus_combo: bool,
    oct_minus_combo: bool,
    events: InputEvents,
}

impl InputDispatcher {
    /// Create a dispatcher synced to the current encoder phase
    pub fn new(controls: &dyn ControlSurface) -> Self {
        let (a, b) = controls.encoder_pins();
        InputDispatcher {
            hold: Button::new(BUTTON_DEBOUNCE_MS),
            mode: Button::new(BUTTON_DEBOUNCE_MS),
            oct_plus: Button::new(BUTTON_DEBOUNCE_MS),
            oct_minus: Button::new(BUTTON_DEBOUNCE_MS),
            decoder: QuadratureDecoder::new(a, b),
            velocity: VelocityTracker::new(),
            pot_smoothed: 0.0,
            // force an initial pot event so consumers start in sync
            pot_last_sent: -(2 * POT_DEADZONE as i32),
            hold_long_fired: false,
            mode_long_fired: false,
            oct_plus_long_armed: false,
            oct_minus_long_armed: false,
            oct_plus_combo: false,
            oct_minus_combo: false,
            events: InputEvents::default(),
        }
    }

    /// Derived events of the last [`update`](InputDispatcher::update)
    pub fn events(&self) -> &InputEvents {
        &self.events
    }

    /// Raw button snapshots of the last update
    pub fn panel_buttons(&self) -> PanelButtons {
        PanelButtons {
            hold: self.hold.snapshot(),
            mode: self.mode.snapshot(),
            oct_plus: self.oct_plus.snapshot(),
            oct_minus: self.oct_minus.snapshot(),
        }
    }

    /// Read the control surface and rebuild the event record
    pub fn update(&mut self, now: TickInstant, controls: &dyn ControlSurface) {
        self.events = InputEvents::default();
        let now_ms = now.ms;

        self.hold.read(now_ms, controls.button_pressed(ButtonId::Hold));
        self.mode.read(now_ms, controls.button_pressed(ButtonId::Mode));
        self.oct_plus
            .read(now_ms, controls.button_pressed(ButtonId::OctPlus));
        self.oct_minus
            .read(now_ms, controls.button_pressed(ButtonId::OctMinus));

        // shift levels
        self.events.oct_plus_long = self.oct_plus.pressed_for(now_ms, OCT_LONG_PRESS_MS);
        self.events.oct_minus_long = self.oct_minus.pressed_for(now_ms, OCT_LONG_PRESS_MS);

        // potentiometer: one-pole smoothing plus an emission deadzone
        let raw = controls.pot_raw() as f32;
        self.pot_smoothed =
            POT_SMOOTHING_ALPHA * raw + (1.0 - POT_SMOOTHING_ALPHA) * self.pot_smoothed;
        let pot = self.pot_smoothed as i32;
        if (pot - self.pot_last_sent).unsigned_abs() > POT_DEADZONE as u32 {
            self.events.sens_pot_moved = true;
            self.events.sens_pot_value = pot as u16;
            self.pot_last_sent = pot;
        }

        // encoder
        let (a, b) = controls.encoder_pins();
        let delta = self.decoder.read(now_ms, a, b);
        self.velocity.update(now_ms, delta);
        if delta != 0 {
            self.events.rotary_turned = true;
            self.events.rotary_delta = delta;
            self.events.rotary_velocity = self.velocity.normalized();
        }

        self.classify_hold_and_mode(now_ms);
        self.classify_shift_buttons();
    }

    fn classify_hold_and_mode(&mut self, now_ms: u32) {
        if self.hold.is_pressed() {
            if self.hold.pressed_for(now_ms, LONG_PRESS_MS) && !self.hold_long_fired {
                self.events.hold_long = true;
                self.hold_long_fired = true;
            }
        } else if self.hold.was_released() {
            if !self.hold_long_fired {
                self.events.hold_short = true;
            }
            self.hold_long_fired = false;
        }

        if self.mode.is_pressed() {
            if self.mode.pressed_for(now_ms, LONG_PRESS_MS) && !self.mode_long_fired {
                self.events.mode_long = true;
                self.mode_long_fired = true;
            }
        } else if self.mode.was_released() {
            if !self.mode_long_fired {
                self.events.mode_short = true;
            }
            self.mode_long_fired = false;
        }
    }

    /// Octave buttons act on release so they can double as shift keys: a
    /// rotary turn during the hold, or crossing the shift threshold, eats
    /// the short press.
    fn classify_shift_buttons(&mut self) {
        if self.oct_plus.is_pressed() {
            if self.events.oct_plus_long {
                self.oct_plus_long_armed = true;
            }
            if self.events.rotary_turned {
                self.oct_plus_combo = true;
            }
        } else if self.oct_plus.was_released() {
            if !self.oct_plus_combo && !self.oct_plus_long_armed {
                self.events.oct_plus_short = true;
            }
            self.oct_plus_combo = false;
            self.oct_plus_long_armed = false;
        }

        if self.oct_minus.is_pressed() {
            if self.events.oct_minus_long {
                self.oct_minus_long_armed = true;
            }
            if self.events.rotary_turned {
                self.oct_minus_combo = true;
            }
        } else if self.oct_minus.was_released() {
            if !self.oct_minus_combo && !self.oct_minus_long_armed {
                self.events.oct_minus_short = true;
            }
            self.oct_minus_combo = false;
            self.oct_minus_long_armed = false;
        }
    }
}
