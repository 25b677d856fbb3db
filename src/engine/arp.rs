//! Arpeggiator engine
//!
//! Steps through the held notes on a BPM-locked grid. The note set is kept
//! sorted ascending by pitch with parallel pressure and press-time arrays;
//! twelve patterns decide how the play index moves. Latch keeps released
//! notes in the set until they are double-tapped out or latch is turned off.

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive as _;

use crate::constants::{
    BPM_ACCEL_CURVE, BPM_DEFAULT, BPM_MAX, BPM_MIN, BPM_STEP_MAX, BPM_STEP_MIN, CV_RESOLUTION,
    DAC_VOLTAGE_RANGE, DOUBLE_TAP_MS, GATE_LENGTH_MAX, GATE_LENGTH_MIN, GATE_LENGTH_STEP,
    LOWEST_MIDI_NOTE, MAX_ARP_NOTES, MAX_OCTAVE, MIN_OCTAVE, NUM_KEYS,
};
use crate::input::{velocity_scaled_step, InputEvents};
use crate::output::{OutputSnapshot, UiEffect};
use crate::time::{elapsed_ms, TickInstant};

use super::step_grid::StepGrid;
use super::{midi_to_voltage, PlayEngine};

/// Step-order patterns, cycled by the shifted encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum ArpPattern {
    /// Ascending
    Up = 0,
    /// Descending
    Down,
    /// Ascending then descending, endpoints not repeated
    UpDown,
    /// Uniform random, never the same note twice in a row
    Random,
    /// Cycle for consumers that treat the set as one chord
    Chord,
    /// Ascending, alternating octaves on each wrap
    UpOctave,
    /// Descending, alternating octaves on each wrap
    DownOctave,
    /// Outside in: lowest, highest, second-lowest, ...
    Converge,
    /// Center outwards
    Diverge,
    /// Lowest note alternating with the others ascending
    PedalUp,
    /// Every note twice
    Cascade,
    /// Weighted random favoring low notes
    Probability,
}

/// Number of selectable patterns
pub const PATTERN_COUNT: i32 = 12;

impl ArpPattern {
    /// Pattern reached by moving `delta` detents, with proper wrap-around
    /// over negative values
    pub fn cycled(self, delta: i32) -> ArpPattern {
        let raw = (self as i32 + delta) % PATTERN_COUNT;
        let wrapped = (raw + PATTERN_COUNT) % PATTERN_COUNT;
        ArpPattern::from_i32(wrapped).unwrap_or(ArpPattern::Up)
    }
}

/// Pattern-stepping arpeggiator over the held note set
#[derive(Debug, Clone)]
pub struct ArpEngine {
    notes: [u8; MAX_ARP_NOTES],
    pressures: [u16; MAX_ARP_NOTES],
    last_press_ms: [u32; MAX_ARP_NOTES],
    count: usize,
    index: usize,

    pattern: ArpPattern,
    direction_up: bool,
    octave_toggle: bool,
    cascade_count: u8,
    pedal_index: usize,
    converge_step: usize,
    diverge_offset: usize,

    grid: StepGrid,
    bpm: f32,
    gate_length: f32,
    gate_on: bool,
    gate_hold_ms: f32,

    latch: bool,
    octave_offset: i32,

    current_pitch_v: f32,
    current_aux_v: f32,
    aux_alpha: f32,

    gate: bool,
    retrigger: bool,
    ui_effect: UiEffect,
    bar_graph: u8,

    rng_state: u32,
}

impl ArpEngine {
    /// Create an idle arpeggiator at the default tempo
    pub fn new() -> Self {
        ArpEngine {
            notes: [0; MAX_ARP_NOTES],
            pressures: [0; MAX_ARP_NOTES],
            last_press_ms: [0; MAX_ARP_NOTES],
            count: 0,
            index: 0,
            pattern: ArpPattern::Up,
            direction_up: true,
            octave_toggle: false,
            cascade_count: 0,
            pedal_index: 0,
            converge_step: 0,
            diverge_offset: 0,
            grid: StepGrid::new(),
            bpm: BPM_DEFAULT as f32,
            gate_length: 0.5,
            gate_on: false,
            gate_hold_ms: 0.0,
            latch: false,
            octave_offset: 0,
            current_pitch_v: midi_to_voltage(LOWEST_MIDI_NOTE, 0),
            current_aux_v: 0.0,
            aux_alpha: 0.3,
            gate: false,
            retrigger: false,
            ui_effect: UiEffect::None,
            bar_graph: bpm_bar_graph(BPM_DEFAULT as f32),
            rng_state: 1,
        }
    }

    /// Number of notes currently in the set
    pub fn note_count(&self) -> usize {
        self.count
    }

    /// The sorted note set
    pub fn notes(&self) -> &[u8] {
        &self.notes[..self.count]
    }

    /// Pitch the pattern is currently on
    pub fn playing_pitch(&self) -> Option<u8> {
        (self.count > 0).then(|| self.notes[self.index.min(self.count - 1)])
    }

    /// Selected pattern
    pub fn pattern(&self) -> ArpPattern {
        self.pattern
    }

    /// Current tempo, rounded to whole BPM
    pub fn bpm(&self) -> u16 {
        self.bpm.round() as u16
    }

    /// Current gate length as a fraction of the step
    pub fn gate_length(&self) -> f32 {
        self.gate_length
    }

    /// Whether latch is engaged
    pub fn latch_active(&self) -> bool {
        self.latch
    }

    /// Aftertouch smoothing coefficient in use
    pub fn aux_alpha(&self) -> f32 {
        self.aux_alpha
    }

    /// Adopt the aftertouch smoothing coefficient owned by the mono engine
    pub fn set_shared_aux_alpha(&mut self, alpha: f32) {
        self.aux_alpha = alpha;
    }

    fn find(&self, pitch: u8) -> Option<usize> {
        self.notes[..self.count].iter().position(|&n| n == pitch)
    }

    fn remove_at(&mut self, at: usize) {
        for i in at..self.count - 1 {
            self.notes[i] = self.notes[i + 1];
            self.pressures[i] = self.pressures[i + 1];
            self.last_press_ms[i] = self.last_press_ms[i + 1];
        }
        self.count -= 1;
        if self.count == 0 {
            self.index = 0;
            self.gate = false;
            self.gate_on = false;
        } else if at < self.index {
            self.index -= 1;
        } else if self.index >= self.count {
            self.index = self.count - 1;
        }
    }

    /// Insert keeping the set sorted ascending by pitch
    fn insert(&mut self, pitch: u8, value: u16, now_ms: u32) {
        let pos = self.notes[..self.count]
            .iter()
            .position(|&n| n > pitch)
            .unwrap_or(self.count);
        for i in (pos..self.count).rev() {
            self.notes[i + 1] = self.notes[i];
            self.pressures[i + 1] = self.pressures[i];
            self.last_press_ms[i + 1] = self.last_press_ms[i];
        }
        self.notes[pos] = pitch;
        self.pressures[pos] = value;
        self.last_press_ms[pos] = now_ms;
        self.count += 1;
    }

    fn reset_pattern(&mut self, now_ms: u32) {
        self.index = 0;
        self.direction_up = true;
        self.octave_toggle = false;
        self.cascade_count = 0;
        self.pedal_index = 0;
        self.converge_step = 0;
        self.diverge_offset = 0;
        self.grid.reset(now_ms);
    }

    fn set_latch(&mut self, enabled: bool, pressed_keys: &[bool; NUM_KEYS]) {
        self.latch = enabled;
        if !enabled {
            // drop notes whose physical key has been released
            let mut i = self.count;
            while i > 0 {
                i -= 1;
                let key = self.notes[i] as i32 - LOWEST_MIDI_NOTE as i32;
                let held =
                    (0..NUM_KEYS as i32).contains(&key) && pressed_keys[key as usize];
                if !held {
                    self.remove_at(i);
                }
            }
        }
    }

    fn next_random(&mut self, bound: usize) -> usize {
        self.rng_state = self.rng_state.wrapping_mul(214013).wrapping_add(2531011);
        (((self.rng_state >> 16) & 0x7fff) as usize) % bound.max(1)
    }

    fn step_to_next(&mut self) {
        let n = self.count;
        if n <= 1 {
            self.index = 0;
            return;
        }
        match self.pattern {
            ArpPattern::Up => self.index = (self.index + 1) % n,
            ArpPattern::Down => self.index = (self.index + n - 1) % n,
            ArpPattern::UpDown => self.step_up_down(n),
            ArpPattern::Random => {
                // uniform over everything except the current note
                let pick = self.next_random(n - 1);
                self.index = if pick >= self.index { pick + 1 } else { pick };
            }
            ArpPattern::Chord => self.index = (self.index + 1) % n,
            ArpPattern::UpOctave => {
                self.index += 1;
                if self.index >= n {
                    self.index = 0;
                    self.octave_toggle = !self.octave_toggle;
                }
            }
            ArpPattern::DownOctave => {
                if self.index == 0 {
                    self.index = n - 1;
                    self.octave_toggle = !self.octave_toggle;
                } else {
                    self.index -= 1;
                }
            }
            ArpPattern::Converge => {
                self.index = if self.converge_step % 2 == 0 {
                    self.converge_step / 2
                } else {
                    n - 1 - self.converge_step / 2
                };
                self.converge_step += 1;
                if self.converge_step >= n * 2 {
                    self.converge_step = 0;
                }
            }
            ArpPattern::Diverge => {
                let center = (n / 2) as i32;
                let candidate = if self.diverge_offset % 2 == 0 {
                    center - (self.diverge_offset / 2) as i32
                } else {
                    center + (self.diverge_offset as i32 + 1) / 2
                };
                if candidate < 0 || candidate >= n as i32 {
                    self.diverge_offset = 0;
                    self.index = center as usize;
                } else {
                    self.index = candidate as usize;
                    self.diverge_offset += 1;
                }
            }
            ArpPattern::PedalUp => {
                if self.pedal_index % 2 == 0 {
                    self.index = 0;
                } else {
                    let up = 1 + self.pedal_index / 2;
                    if up >= n {
                        self.pedal_index = 0;
                        self.index = 0;
                        return;
                    }
                    self.index = up;
                }
                self.pedal_index += 1;
            }
            ArpPattern::Cascade => {
                if self.cascade_count == 0 {
                    self.cascade_count = 1;
                } else {
                    self.cascade_count = 0;
                    self.index = (self.index + 1) % n;
                }
            }
            ArpPattern::Probability => {
                // weight of index i is n - i: the lowest note is most likely
                let total = n * (n + 1) / 2;
                let roll = self.next_random(total);
                let mut accum = 0;
                for i in 0..n {
                    accum += n - i;
                    if roll < accum {
                        self.index = i;
                        break;
                    }
                }
            }
        }
    }

    fn step_up_down(&mut self, n: usize) {
        if n == 2 {
            self.index = 1 - self.index;
            return;
        }
        if self.direction_up {
            self.index += 1;
            if self.index >= n - 1 {
                self.index = n - 1;
                self.direction_up = false;
            }
        } else {
            if self.index > 0 {
                self.index -= 1;
            }
            if self.index == 0 {
                self.direction_up = true;
            }
        }
    }

    fn pattern_octave_shift(&self) -> i32 {
        match self.pattern {
            ArpPattern::UpOctave if self.octave_toggle => 1,
            ArpPattern::DownOctave if self.octave_toggle => -1,
            _ => 0,
        }
    }

    fn aux_target(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        // average pressure of the held set drives the aux CV
        let total: u32 = self.pressures[..self.count].iter().map(|&p| p as u32).sum();
        let average = (total / self.count as u32) as f32;
        average / CV_RESOLUTION as f32 * DAC_VOLTAGE_RANGE
    }
}

impl PlayEngine for ArpEngine {
    fn on_note_on(&mut self, now: TickInstant, pitch: u8, value: u16) {
        if let Some(at) = self.find(pitch) {
            if self.latch && elapsed_ms(now.ms, self.last_press_ms[at]) < DOUBLE_TAP_MS {
                // double-tap drops a latched note
                self.remove_at(at);
            } else {
                self.pressures[at] = value;
                self.last_press_ms[at] = now.ms;
            }
            return;
        }

        let playing = self.playing_pitch();
        if self.count == MAX_ARP_NOTES {
            // set is full: the bottom slot of the sorted set makes room,
            // never the new note
            self.remove_at(0);
        }
        self.insert(pitch, value, now.ms);

        if self.count == 1 {
            self.reset_pattern(now.ms);
            self.gate = true;
            self.retrigger = true;
        } else if let Some(previous) = playing {
            match self.find(previous) {
                Some(at) => self.index = at,
                None => self.index = self.index.min(self.count - 1),
            }
        }
    }

    fn on_note_off(&mut self, pitch: u8) {
        if !self.latch {
            if let Some(at) = self.find(pitch) {
                self.remove_at(at);
            }
        }
    }

    fn on_aftertouch(&mut self, key: u8, pressure: u16) {
        let pitch = LOWEST_MIDI_NOTE + key;
        if let Some(at) = self.find(pitch) {
            self.pressures[at] = pressure;
        }
    }

    fn process_inputs(
        &mut self,
        now: TickInstant,
        events: &InputEvents,
        pressed_keys: &[bool; NUM_KEYS],
    ) {
        if events.hold_short {
            let was_latched = self.latch;
            let latch = !self.latch;
            self.set_latch(latch, pressed_keys);
            // only the latch -> normal transition restarts the pattern
            if was_latched && !self.latch {
                self.reset_pattern(now.ms);
            }
            self.ui_effect = UiEffect::Validate;
        }
        if events.oct_plus_short && self.octave_offset < MAX_OCTAVE {
            self.octave_offset += 1;
        }
        if events.oct_minus_short && self.octave_offset > MIN_OCTAVE {
            self.octave_offset -= 1;
        }

        if events.rotary_turned {
            if events.oct_plus_long {
                self.pattern = self.pattern.cycled(events.rotary_delta);
                if self.pattern == ArpPattern::UpDown {
                    self.direction_up = true;
                }
                if self.count > 0 && self.index >= self.count {
                    self.index = self.count - 1;
                }
            } else if events.oct_minus_long {
                self.gate_length = (self.gate_length
                    + events.rotary_delta as f32 * GATE_LENGTH_STEP)
                    .clamp(GATE_LENGTH_MIN, GATE_LENGTH_MAX);
            } else {
                let step = velocity_scaled_step(
                    events.rotary_velocity,
                    BPM_STEP_MIN,
                    BPM_STEP_MAX,
                    BPM_ACCEL_CURVE,
                );
                self.bpm = (self.bpm + events.rotary_delta as f32 * step)
                    .clamp(BPM_MIN as f32, BPM_MAX as f32);
                self.bar_graph = bpm_bar_graph(self.bpm);
            }
        }
    }

    fn tick(&mut self, now: TickInstant) {
        match self.count {
            0 => {
                self.gate = false;
                self.gate_on = false;
                self.current_aux_v = 0.0;
            }
            1 => {
                // monophonic behavior: gate tracks presence, pitch snaps
                self.current_pitch_v = midi_to_voltage(self.notes[0], self.octave_offset);
                self.gate = true;
                let target = self.aux_target();
                self.current_aux_v =
                    (1.0 - self.aux_alpha) * self.current_aux_v + self.aux_alpha * target;
            }
            _ => {
                let interval = 60_000.0 / self.bpm;
                if self.grid.advance(now.ms, interval) {
                    self.step_to_next();
                    self.retrigger = true;
                    self.gate_on = true;
                    self.gate_hold_ms = interval * self.gate_length;
                    self.ui_effect = UiEffect::Beat;
                }
                if self.gate_on
                    && elapsed_ms(now.ms, self.grid.current_step_ms()) as f32
                        >= self.gate_hold_ms
                {
                    self.gate_on = false;
                }
                self.gate = self.gate_on;

                let shift = self.pattern_octave_shift();
                self.current_pitch_v = midi_to_voltage(
                    self.notes[self.index.min(self.count - 1)],
                    self.octave_offset + shift,
                );
                let target = self.aux_target();
                self.current_aux_v =
                    (1.0 - self.aux_alpha) * self.current_aux_v + self.aux_alpha * target;
            }
        }
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

impl Default for ArpEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn bpm_bar_graph(bpm: f32) -> u8 {
    ((bpm - BPM_MIN as f32) / (BPM_MAX - BPM_MIN) as f32 * 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const NO_KEYS: [bool; NUM_KEYS] = [false; NUM_KEYS];

    fn at(ms: u32) -> TickInstant {
        TickInstant::new(ms, ms.wrapping_mul(1000))
    }

    fn engine_with(pitches: &[u8]) -> ArpEngine {
        let mut engine = ArpEngine::new();
        for (i, &pitch) in pitches.iter().enumerate() {
            engine.on_note_on(at(i as u32), pitch, 0);
        }
        engine
    }

    fn latch_on(engine: &mut ArpEngine, now: TickInstant) {
        let events = InputEvents {
            hold_short: true,
            ..Default::default()
        };
        engine.process_inputs(now, &events, &NO_KEYS);
    }

    fn step_indices(engine: &mut ArpEngine, steps: usize) -> Vec<usize> {
        (0..steps)
            .map(|_| {
                engine.step_to_next();
                engine.index
            })
            .collect()
    }

    #[test]
    fn test_set_stays_sorted_without_duplicates() {
        let mut engine = engine_with(&[64, 57, 60]);
        assert_eq!(engine.notes(), &[57, 60, 64]);
        engine.on_note_on(at(10), 60, 0);
        assert_eq!(engine.note_count(), 3);
    }

    #[test]
    fn test_up_pattern_wraps() {
        let mut engine = engine_with(&[57, 60, 64]);
        engine.index = 0;
        assert_eq!(step_indices(&mut engine, 4), vec![1, 2, 0, 1]);
    }

    #[test]
    fn test_down_pattern_wraps() {
        let mut engine = engine_with(&[57, 60, 64]);
        engine.pattern = ArpPattern::Down;
        engine.index = 0;
        assert_eq!(step_indices(&mut engine, 3), vec![2, 1, 0]);
    }

    #[test]
    fn test_up_down_bounces() {
        let mut engine = engine_with(&[57, 60, 64]);
        engine.pattern = ArpPattern::UpDown;
        engine.index = 0;
        assert_eq!(step_indices(&mut engine, 6), vec![1, 2, 1, 0, 1, 2]);
    }

    #[test]
    fn test_up_down_two_notes_alternates() {
        let mut engine = engine_with(&[57, 60]);
        engine.pattern = ArpPattern::UpDown;
        engine.index = 0;
        assert_eq!(step_indices(&mut engine, 4), vec![1, 0, 1, 0]);
    }

    #[test]
    fn test_single_note_always_index_zero() {
        let mut engine = engine_with(&[57]);
        engine.pattern = ArpPattern::UpDown;
        assert_eq!(step_indices(&mut engine, 3), vec![0, 0, 0]);
    }

    #[test]
    fn test_random_never_repeats_current() {
        let mut engine = engine_with(&[57, 60, 64, 67]);
        engine.pattern = ArpPattern::Random;
        let mut last = engine.index;
        for _ in 0..200 {
            engine.step_to_next();
            assert_ne!(engine.index, last);
            assert!(engine.index < engine.note_count());
            last = engine.index;
        }
    }

    #[test]
    fn test_converge_sequence() {
        let mut engine = engine_with(&[50, 55, 60, 65]);
        engine.pattern = ArpPattern::Converge;
        // outside-in, then mirrored back out: period 2n
        assert_eq!(step_indices(&mut engine, 8), vec![0, 3, 1, 2, 2, 1, 3, 0]);
        assert_eq!(step_indices(&mut engine, 2), vec![0, 3]);
    }

    #[test]
    fn test_cascade_plays_each_note_twice() {
        let mut engine = engine_with(&[57, 60, 64]);
        engine.pattern = ArpPattern::Cascade;
        engine.index = 0;
        assert_eq!(step_indices(&mut engine, 6), vec![0, 1, 1, 2, 2, 0]);
    }

    #[test]
    fn test_pedal_up_alternates_with_lowest() {
        let mut engine = engine_with(&[57, 60, 64]);
        engine.pattern = ArpPattern::PedalUp;
        // 0,1,0,2,0 then exhausted: reset to 0
        assert_eq!(step_indices(&mut engine, 6), vec![0, 1, 0, 2, 0, 0]);
    }

    #[test]
    fn test_probability_bounded_and_biased_low() {
        let mut engine = engine_with(&[57, 60, 64, 67]);
        engine.pattern = ArpPattern::Probability;
        let mut hits = [0u32; 4];
        for _ in 0..4000 {
            engine.step_to_next();
            hits[engine.index] += 1;
        }
        assert!(hits[0] > hits[3]);
    }

    #[test]
    fn test_octave_pattern_toggles_on_wrap() {
        let mut engine = engine_with(&[57, 60]);
        engine.pattern = ArpPattern::UpOctave;
        engine.index = 0;
        engine.step_to_next(); // -> 1
        assert_eq!(engine.pattern_octave_shift(), 0);
        engine.step_to_next(); // wrap -> 0, octave up
        assert_eq!(engine.pattern_octave_shift(), 1);
        engine.step_to_next();
        engine.step_to_next(); // second wrap: back down
        assert_eq!(engine.pattern_octave_shift(), 0);
    }

    #[test]
    fn test_pattern_cycling_is_modular() {
        assert_eq!(ArpPattern::Up.cycled(1), ArpPattern::Down);
        assert_eq!(ArpPattern::Up.cycled(-1), ArpPattern::Probability);
        assert_eq!(ArpPattern::Up.cycled(12), ArpPattern::Up);
        assert_eq!(ArpPattern::Down.cycled(-14), ArpPattern::Probability);
    }

    #[test]
    fn test_double_tap_removes_latched_note() {
        let mut engine = engine_with(&[60, 64, 67]);
        latch_on(&mut engine, at(10));
        engine.on_note_on(at(1000), 64, 0);
        assert_eq!(engine.note_count(), 3); // slow re-press: stays
        engine.on_note_on(at(1100), 64, 0);
        assert_eq!(engine.notes(), &[60, 67]); // within the window: dropped
    }

    #[test]
    fn test_triple_tap_restores_then_removes() {
        let mut engine = engine_with(&[60, 64, 67]);
        latch_on(&mut engine, at(10));
        engine.on_note_on(at(1000), 64, 0);
        engine.on_note_on(at(1100), 64, 0);
        assert_eq!(engine.note_count(), 2);
        engine.on_note_on(at(2000), 64, 0);
        assert_eq!(engine.notes(), &[60, 64, 67]);
        engine.on_note_on(at(2100), 64, 0);
        assert_eq!(engine.notes(), &[60, 67]);
    }

    #[test]
    fn test_latch_off_drops_unheld_notes() {
        let mut engine = ArpEngine::new();
        latch_on(&mut engine, at(0));
        engine.on_note_on(at(1), 36, 0); // key 0
        engine.on_note_on(at(2), 40, 0); // key 4
        engine.on_note_off(36);
        engine.on_note_off(40);
        assert_eq!(engine.note_count(), 2);

        let mut keys = NO_KEYS;
        keys[4] = true;
        let events = InputEvents {
            hold_short: true,
            ..Default::default()
        };
        engine.process_inputs(at(3), &events, &keys);
        assert_eq!(engine.notes(), &[40]);
    }

    #[test]
    fn test_capacity_evicts_bottom_of_sorted_set() {
        let mut engine = ArpEngine::new();
        latch_on(&mut engine, at(0));
        // press a high note first, then fill the set from below
        engine.on_note_on(at(1), 60, 0);
        for (i, pitch) in (45..52u8).enumerate() {
            engine.on_note_on(at(1000 + 1000 * i as u32), pitch, 0);
        }
        assert_eq!(engine.note_count(), MAX_ARP_NOTES);

        // overflow drops slot 0 (the lowest pitch), not the earliest press
        engine.on_note_on(at(60_000), 52, 0);
        assert_eq!(engine.note_count(), MAX_ARP_NOTES);
        assert_eq!(engine.notes(), &[46, 47, 48, 49, 50, 51, 52, 60]);
    }

    #[test]
    fn test_eviction_keeps_playing_pitch() {
        let mut engine = ArpEngine::new();
        latch_on(&mut engine, at(0));
        for i in 0..MAX_ARP_NOTES as u8 {
            engine.on_note_on(at(1000 * i as u32), 40 + i, 0);
        }
        engine.index = 4; // playing pitch 44
        engine.on_note_on(at(60_000), 50, 0);
        assert_eq!(engine.playing_pitch(), Some(44));
        assert!(!engine.notes().contains(&40));
    }

    #[test]
    fn test_step_grid_and_gate_length() {
        let mut engine = engine_with(&[57, 60, 64]);
        // bpm 120: 500 ms steps, gate high for the first 250 ms
        engine.bpm = 120.0;
        engine.gate_length = 0.5;
        engine.reset_pattern(0);
        engine.snapshot(); // consume the note-on retrigger

        let mut retriggers = 0;
        let mut gate_profile = Vec::new();
        for ms in 1..=1500u32 {
            engine.tick(at(ms));
            let snap = engine.snapshot();
            retriggers += snap.retrigger as u32;
            if ms % 100 == 0 {
                gate_profile.push(snap.gate);
            }
        }
        assert_eq!(retriggers, 3);
        // sampled every 100 ms: the gate rides high for the first 250 ms of
        // each 500 ms step
        assert_eq!(
            gate_profile,
            vec![
                false, false, false, false, // before the first step
                true, true, true, false, false, // step at 500, off at 750
                true, true, true, false, false, // step at 1000
                true, // step at 1500
            ]
        );
    }

    #[test]
    fn test_arp_steps_walk_the_set() {
        let mut engine = engine_with(&[57, 60, 64]);
        engine.bpm = 120.0;
        engine.reset_pattern(0);
        let mut pitches = Vec::new();
        for ms in 1..=1600u32 {
            engine.tick(at(ms));
            if engine.snapshot().retrigger {
                pitches.push(engine.playing_pitch().unwrap());
            }
        }
        // the note-on retrigger sounds the lowest note, then the grid walks up
        assert_eq!(pitches, vec![57, 60, 64, 57]);
    }

    #[test]
    fn test_empty_set_closes_gate() {
        let mut engine = engine_with(&[60]);
        engine.tick(at(1));
        assert!(engine.snapshot().gate);
        engine.on_note_off(60);
        engine.tick(at(2));
        let snap = engine.snapshot();
        assert!(!snap.gate);
        assert_relative_eq!(snap.aux_v, 0.0);
    }

    #[test]
    fn test_gate_length_adjustment_clamped() {
        let mut engine = ArpEngine::new();
        let events = InputEvents {
            rotary_turned: true,
            rotary_delta: -100,
            oct_minus_long: true,
            ..Default::default()
        };
        engine.process_inputs(at(0), &events, &NO_KEYS);
        assert_relative_eq!(engine.gate_length(), GATE_LENGTH_MIN);
    }

    #[test]
    fn test_bpm_adjustment_clamped() {
        let mut engine = ArpEngine::new();
        let events = InputEvents {
            rotary_turned: true,
            rotary_delta: 10_000,
            rotary_velocity: 1.0,
            ..Default::default()
        };
        engine.process_inputs(at(0), &events, &NO_KEYS);
        assert_eq!(engine.bpm(), BPM_MAX);
    }
}
