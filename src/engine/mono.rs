//! Monophonic pressure/glide engine
//!
//! Last-note priority over a fixed note stack. The top of the stack drives
//! the pitch CV (with exponential glide) and its pressure drives the aux CV
//! (one-pole smoothed). Legato changes of the sounding note raise a
//! retrigger while the gate stays open; releasing the last note closes the
//! gate but holds the pitch for a clean envelope release.

use crate::constants::{
    AUX_ALPHA_DEFAULT, AUX_ALPHA_MAX, AUX_ALPHA_MIN, CV_RESOLUTION, DAC_VOLTAGE_RANGE,
    DEADZONE_MAX_OFFSET, GLIDE_ACCEL_CURVE, GLIDE_MAX_MS, GLIDE_SNAP_MS, GLIDE_STEP_MAX,
    GLIDE_STEP_MIN, LOWEST_MIDI_NOTE, MAX_OCTAVE, MIN_OCTAVE, NUM_KEYS, PITCH_CENTER_VOLTAGE,
};
use crate::input::{velocity_scaled_step, InputEvents};
use crate::output::{OutputSnapshot, UiEffect};
use crate::time::{elapsed_us, TickInstant};

use super::note_stack::NoteStack;
use super::{midi_to_voltage, PlayEngine};

/// Note-stack monophonic engine
#[derive(Debug, Clone)]
pub struct MonoEngine {
    octave_offset: i32,
    latch: bool,
    stack: NoteStack,
    active_pitch: Option<u8>,

    current_pitch_v: f32,
    target_pitch_v: f32,
    last_active_pitch_v: f32,
    glide_ms: f32,

    current_aux_v: f32,
    target_aux_v: f32,
    aux_alpha: f32,

    deadzone_offset: u16,

    gate: bool,
    retrigger: bool,
    ui_effect: UiEffect,
    bar_graph: u8,

    last_tick_us: Option<u32>,
}

impl MonoEngine {
    /// Create an idle engine at the center pitch
    pub fn new() -> Self {
        MonoEngine {
            octave_offset: 0,
            latch: false,
            stack: NoteStack::new(),
            active_pitch: None,
            current_pitch_v: PITCH_CENTER_VOLTAGE,
            target_pitch_v: PITCH_CENTER_VOLTAGE,
            last_active_pitch_v: PITCH_CENTER_VOLTAGE,
            glide_ms: 0.0,
            current_aux_v: 0.0,
            target_aux_v: 0.0,
            aux_alpha: AUX_ALPHA_DEFAULT,
            deadzone_offset: 0,
            gate: false,
            retrigger: false,
            ui_effect: UiEffect::None,
            bar_graph: 0,
            last_tick_us: None,
        }
    }

    /// Current aux smoothing coefficient (shared with the arpeggiator)
    pub fn aux_alpha(&self) -> f32 {
        self.aux_alpha
    }

    /// Current aftertouch deadzone offset (owned here, applied by the
    /// pressure pipeline)
    pub fn deadzone_offset(&self) -> u16 {
        self.deadzone_offset
    }

    /// Whether latch is engaged
    pub fn latch_active(&self) -> bool {
        self.latch
    }

    /// Current glide time in milliseconds
    pub fn glide_ms(&self) -> f32 {
        self.glide_ms
    }

    /// Set the glide time directly (also reachable via the encoder)
    pub fn set_glide_ms(&mut self, glide_ms: f32) {
        self.glide_ms = glide_ms.clamp(0.0, GLIDE_MAX_MS);
    }

    fn set_latch(&mut self, enabled: bool, pressed_keys: &[bool; NUM_KEYS]) {
        self.latch = enabled;
        if !enabled {
            // keep only notes whose physical key is still down
            self.stack.retain(|note| {
                let key = note.pitch as i32 - LOWEST_MIDI_NOTE as i32;
                (0..NUM_KEYS as i32).contains(&key) && pressed_keys[key as usize]
            });
            self.refresh_active_note();
        }
    }

    /// Re-derive targets from the top of the stack
    fn refresh_active_note(&mut self) {
        match self.stack.top() {
            None => {
                self.gate = false;
                self.target_aux_v = 0.0;
                // hold the last pitch so the release tail stays in tune
                self.target_pitch_v = self.last_active_pitch_v;
            }
            Some(top) => {
                if self.gate && self.active_pitch != Some(top.pitch) {
                    self.retrigger = true;
                }
                self.active_pitch = Some(top.pitch);
                self.target_pitch_v = midi_to_voltage(top.pitch, self.octave_offset);
                self.last_active_pitch_v = self.target_pitch_v;
                self.target_aux_v =
                    top.value as f32 / CV_RESOLUTION as f32 * DAC_VOLTAGE_RANGE;
            }
        }
    }
}

impl PlayEngine for MonoEngine {
    fn on_note_on(&mut self, _now: TickInstant, pitch: u8, value: u16) {
        self.gate = true;
        self.retrigger = true;
        self.stack.push(pitch, value);
        self.refresh_active_note();
    }

    fn on_note_off(&mut self, pitch: u8) {
        if !self.latch {
            self.stack.remove(pitch);
            self.refresh_active_note();
        }
    }

    fn on_aftertouch(&mut self, key: u8, pressure: u16) {
        let pitch = LOWEST_MIDI_NOTE + key;
        if self.stack.update_value(pitch, pressure) {
            // the sounding note changed pressure: retarget the aux CV now
            self.refresh_active_note();
        }
    }

    fn process_inputs(
        &mut self,
        _now: TickInstant,
        events: &InputEvents,
        pressed_keys: &[bool; NUM_KEYS],
    ) {
        if events.hold_short {
            let latch = !self.latch;
            self.set_latch(latch, pressed_keys);
            self.ui_effect = UiEffect::Validate;
        }
        if events.oct_plus_short && self.octave_offset < MAX_OCTAVE {
            self.octave_offset += 1;
            self.refresh_active_note();
        }
        if events.oct_minus_short && self.octave_offset > MIN_OCTAVE {
            self.octave_offset -= 1;
            self.refresh_active_note();
        }

        if events.rotary_turned {
            if events.oct_plus_long {
                let step = (AUX_ALPHA_MAX - AUX_ALPHA_MIN) / 100.0;
                self.aux_alpha = (self.aux_alpha + events.rotary_delta as f32 * step)
                    .clamp(AUX_ALPHA_MIN, AUX_ALPHA_MAX);
            } else if events.oct_minus_long {
                let step = (DEADZONE_MAX_OFFSET / 50) as i32;
                let offset = self.deadzone_offset as i32 + events.rotary_delta * step;
                self.deadzone_offset = offset.clamp(0, DEADZONE_MAX_OFFSET as i32) as u16;
            } else {
                let step = velocity_scaled_step(
                    events.rotary_velocity,
                    GLIDE_STEP_MIN,
                    GLIDE_STEP_MAX,
                    GLIDE_ACCEL_CURVE,
                );
                self.glide_ms = (self.glide_ms + events.rotary_delta as f32 * step)
                    .clamp(0.0, GLIDE_MAX_MS);
                self.bar_graph = (self.glide_ms / GLIDE_MAX_MS * 100.0) as u8;
            }
        }
    }

    fn tick(&mut self, now: TickInstant) {
        let dt_ms = match self.last_tick_us {
            Some(last) => elapsed_us(now.us, last) as f32 / 1000.0,
            None => 0.0,
        };
        self.last_tick_us = Some(now.us);

        if self.glide_ms > GLIDE_SNAP_MS {
            let alpha = 1.0 - (-dt_ms / self.glide_ms).exp();
            self.current_pitch_v =
                (1.0 - alpha) * self.current_pitch_v + alpha * self.target_pitch_v;
        } else {
            self.current_pitch_v = self.target_pitch_v;
        }

        self.current_aux_v =
            (1.0 - self.aux_alpha) * self.current_aux_v + self.aux_alpha * self.target_aux_v;
    }

    fn snapshot(&mut self) -> OutputSnapshot {
        let retrigger = std::mem::take(&mut self.retrigger);
        let ui_effect = std::mem::take(&mut self.ui_effect);
        OutputSnapshot {
            pitch_v: self.current_pitch_v,
            aux_v: self.current_aux_v,
            gate: self.gate,
            retrigger,
            ui_effect,
            bar_graph: self.bar_graph,
            octave: self.octave_offset,
        }
    }
}

impl Default for MonoEngine {
    fn default() -> Self {
        Self::new()
    }
}
