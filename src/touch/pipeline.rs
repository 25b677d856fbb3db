//! Per-key pressure pipeline
//!
//! Turns raw capacitance deltas into press/release edges and a smoothed
//! aftertouch value per key:
//!
//! 1. delta against the sensor baseline
//! 2. press/release hysteresis against calibration-derived thresholds
//! 3. normalization from the press-time "relative zero" to the calibrated
//!    maximum delta, with an adjustable deadzone
//! 4. response shaping (linear blended towards exponential or iterated
//!    smoothstep by a single shape parameter)
//! 5. slew limiting, then a short moving average
//!
//! Edges are exposed as one-shot queries valid until the next
//! [`update`](PressurePipeline::update).

use crate::constants::{
    CURVE_EXP_INTENSITY, CURVE_SIG_ITERATIONS, CV_RESOLUTION, DEADZONE_MAX_OFFSET,
    DEFAULT_MAX_DELTA, MIN_PRESS_THRESHOLD, MIN_RELEASE_THRESHOLD, NUM_KEYS,
    PRESS_THRESHOLD_RATIO, RELEASE_THRESHOLD_RATIO, SLEW_RATE_LIMIT, SMOOTHING_WINDOW,
};

/// Pressure state and detection thresholds for all 24 keys
#[derive(Debug, Clone)]
pub struct PressurePipeline {
    is_pressed: [bool; NUM_KEYS],
    last_is_pressed: [bool; NUM_KEYS],
    press_delta_start: [u16; NUM_KEYS],
    slewed: [f32; NUM_KEYS],
    smoothed: [f32; NUM_KEYS],
    history: [[f32; SMOOTHING_WINDOW]; NUM_KEYS],
    history_index: [usize; NUM_KEYS],
    max_delta: [u16; NUM_KEYS],
    press_threshold: [u16; NUM_KEYS],
    release_threshold: [u16; NUM_KEYS],
    response_shape: f32,
    deadzone_offset: u16,
}

impl PressurePipeline {
    /// Create a pipeline with default calibration (max delta 400 per key)
    pub fn new() -> Self {
        let mut pipeline = PressurePipeline {
            is_pressed: [false; NUM_KEYS],
            last_is_pressed: [false; NUM_KEYS],
            press_delta_start: [0; NUM_KEYS],
            slewed: [0.0; NUM_KEYS],
            smoothed: [0.0; NUM_KEYS],
            history: [[0.0; SMOOTHING_WINDOW]; NUM_KEYS],
            history_index: [0; NUM_KEYS],
            max_delta: [DEFAULT_MAX_DELTA; NUM_KEYS],
            press_threshold: [0; NUM_KEYS],
            release_threshold: [0; NUM_KEYS],
            response_shape: 0.5,
            deadzone_offset: 0,
        };
        for key in 0..NUM_KEYS {
            pipeline.recompute_thresholds(key);
        }
        pipeline
    }

    /// Set the response shape: 0 = exponential, 0.5 = linear, 1 = sigmoid
    pub fn set_response_shape(&mut self, shape: f32) {
        self.response_shape = shape.clamp(0.0, 1.0);
    }

    /// Set the aftertouch deadzone offset in raw counts
    pub fn set_deadzone_offset(&mut self, offset: u16) {
        self.deadzone_offset = offset.min(DEADZONE_MAX_OFFSET);
    }

    /// Current aftertouch deadzone offset
    pub fn deadzone_offset(&self) -> u16 {
        self.deadzone_offset
    }

    /// Calibrated maximum delta of one key
    pub fn max_delta(&self, key: usize) -> u16 {
        self.max_delta[key]
    }

    /// Replace the calibrated maximum delta of one key
    ///
    /// The detection thresholds of that key are recomputed immediately; this
    /// is the only mutation path calibration uses.
    pub fn set_max_delta(&mut self, key: usize, delta: u16) {
        if key < NUM_KEYS {
            self.max_delta[key] = delta;
            self.recompute_thresholds(key);
        }
    }

    /// Replace all 24 maximum deltas at once (calibration load)
    pub fn load_max_deltas(&mut self, deltas: &[u16; NUM_KEYS]) {
        self.max_delta = *deltas;
        for key in 0..NUM_KEYS {
            self.recompute_thresholds(key);
        }
    }

    /// Press threshold of one key, in raw counts
    pub fn press_threshold(&self, key: usize) -> u16 {
        self.press_threshold[key]
    }

    /// Release threshold of one key, in raw counts
    pub fn release_threshold(&self, key: usize) -> u16 {
        self.release_threshold[key]
    }

    fn recompute_thresholds(&mut self, key: usize) {
        let max_delta = self.max_delta[key] as f32;
        let press = ((max_delta * PRESS_THRESHOLD_RATIO) as u16).max(MIN_PRESS_THRESHOLD);
        let mut release = ((max_delta * RELEASE_THRESHOLD_RATIO) as u16).max(MIN_RELEASE_THRESHOLD);
        // hysteresis: release strictly below press, or chatter follows
        if release >= press {
            release = press.saturating_sub(1);
        }
        self.press_threshold[key] = press;
        self.release_threshold[key] = release;
    }

    /// Run one tick over fresh sensor data
    pub fn update(&mut self, filtered: &[u16; NUM_KEYS], baseline: &[u16; NUM_KEYS]) {
        self.last_is_pressed = self.is_pressed;

        for key in 0..NUM_KEYS {
            let delta = baseline[key].saturating_sub(filtered[key]);

            if !self.is_pressed[key] && delta > self.press_threshold[key] {
                self.is_pressed[key] = true;
                // the delta at note-on is the relative zero for aftertouch
                self.press_delta_start[key] = delta;
            } else if self.is_pressed[key] && delta < self.release_threshold[key] {
                self.is_pressed[key] = false;
                self.slewed[key] = 0.0;
                self.smoothed[key] = 0.0;
                self.history[key] = [0.0; SMOOTHING_WINDOW];
            }

            let target = if self.is_pressed[key] {
                self.shaped_target(key, delta)
            } else {
                0.0
            };

            // stage 1: slew limiter
            let diff = target - self.slewed[key];
            self.slewed[key] += diff.clamp(-SLEW_RATE_LIMIT, SLEW_RATE_LIMIT);

            // stage 2: moving average
            self.history[key][self.history_index[key]] = self.slewed[key];
            self.history_index[key] = (self.history_index[key] + 1) % SMOOTHING_WINDOW;
            self.smoothed[key] =
                self.history[key].iter().sum::<f32>() / SMOOTHING_WINDOW as f32;
        }
    }

    fn shaped_target(&self, key: usize, delta: u16) -> f32 {
        let max_delta = self.max_delta[key];
        let press_delta = self.press_delta_start[key].saturating_add(self.deadzone_offset);

        let norm = if max_delta > press_delta {
            delta.saturating_sub(press_delta) as f32 / (max_delta - press_delta) as f32
        } else {
            0.0
        };
        shape_response(norm.min(1.0), self.response_shape) * CV_RESOLUTION as f32
    }

    /// Whether a key is currently held
    pub fn is_pressed(&self, key: usize) -> bool {
        key < NUM_KEYS && self.is_pressed[key]
    }

    /// True exactly once, on the tick the key went down
    pub fn note_on(&self, key: usize) -> bool {
        key < NUM_KEYS && self.is_pressed[key] && !self.last_is_pressed[key]
    }

    /// True exactly once, on the tick the key was released
    pub fn note_off(&self, key: usize) -> bool {
        key < NUM_KEYS && !self.is_pressed[key] && self.last_is_pressed[key]
    }

    /// Smoothed pressure of one key in the CV value domain
    pub fn pressure(&self, key: usize) -> u16 {
        if key < NUM_KEYS {
            self.smoothed[key] as u16
        } else {
            0
        }
    }

    /// Snapshot of every key's held state (latch reconciliation input)
    pub fn pressed_keys(&self) -> &[bool; NUM_KEYS] {
        &self.is_pressed
    }
}

impl Default for PressurePipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Blend the normalized pressure through the response curve
///
/// Below 0.5 the linear response is mixed towards a fourth-power
/// exponential; above 0.5 towards an iterated smoothstep sigmoid. Exactly
/// 0.5 is the identity.
fn shape_response(x: f32, shape: f32) -> f32 {
    if shape < 0.5 {
        let t = 1.0 - shape * 2.0;
        x * (1.0 - t) + x.powi(CURVE_EXP_INTENSITY) * t
    } else {
        let mut sig = x;
        for _ in 0..CURVE_SIG_ITERATIONS {
            sig = sig * sig * (3.0 - 2.0 * sig);
        }
        let t = (shape - 0.5) * 2.0;
        x * (1.0 - t) + sig * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quiet() -> ([u16; NUM_KEYS], [u16; NUM_KEYS]) {
        ([550; NUM_KEYS], [550; NUM_KEYS])
    }

    fn press(filtered: &mut [u16; NUM_KEYS], key: usize, delta: u16) {
        filtered[key] = 550 - delta;
    }

    #[test]
    fn test_default_thresholds() {
        let pipeline = PressurePipeline::new();
        for key in 0..NUM_KEYS {
            assert_eq!(pipeline.press_threshold(key), 60);
            assert_eq!(pipeline.release_threshold(key), 32);
        }
    }

    #[test]
    fn test_threshold_floors_and_hysteresis() {
        let mut pipeline = PressurePipeline::new();
        pipeline.set_max_delta(3, 50);
        // floors kick in: 50 * 0.15 = 7 -> 20, 50 * 0.08 = 4 -> 10
        assert_eq!(pipeline.press_threshold(3), 20);
        assert_eq!(pipeline.release_threshold(3), 10);

        // degenerate calibration still keeps release below press
        pipeline.set_max_delta(4, 0);
        assert!(pipeline.release_threshold(4) < pipeline.press_threshold(4));
    }

    #[test]
    fn test_note_edges_fire_once() {
        let mut pipeline = PressurePipeline::new();
        let (mut filtered, baseline) = quiet();

        press(&mut filtered, 0, 100);
        pipeline.update(&filtered, &baseline);
        assert!(pipeline.note_on(0));
        assert!(pipeline.is_pressed(0));

        pipeline.update(&filtered, &baseline);
        assert!(!pipeline.note_on(0));
        assert!(pipeline.is_pressed(0));

        press(&mut filtered, 0, 0);
        pipeline.update(&filtered, &baseline);
        assert!(pipeline.note_off(0));
        pipeline.update(&filtered, &baseline);
        assert!(!pipeline.note_off(0));
    }

    #[test]
    fn test_hysteresis_band_holds_state() {
        let mut pipeline = PressurePipeline::new();
        let (mut filtered, baseline) = quiet();

        // between release (32) and press (60): no press
        press(&mut filtered, 0, 45);
        pipeline.update(&filtered, &baseline);
        assert!(!pipeline.is_pressed(0));

        press(&mut filtered, 0, 61);
        pipeline.update(&filtered, &baseline);
        assert!(pipeline.is_pressed(0));

        // falling back into the band keeps the note held
        press(&mut filtered, 0, 45);
        pipeline.update(&filtered, &baseline);
        assert!(pipeline.is_pressed(0));

        press(&mut filtered, 0, 31);
        pipeline.update(&filtered, &baseline);
        assert!(!pipeline.is_pressed(0));
    }

    #[test]
    fn test_release_resets_pressure_state() {
        let mut pipeline = PressurePipeline::new();
        let (mut filtered, baseline) = quiet();

        press(&mut filtered, 2, 400);
        for _ in 0..50 {
            pipeline.update(&filtered, &baseline);
        }
        assert!(pipeline.pressure(2) > 0);

        press(&mut filtered, 2, 0);
        pipeline.update(&filtered, &baseline);
        assert_eq!(pipeline.pressure(2), 0);
    }

    #[test]
    fn test_slew_limits_rise_per_tick() {
        let mut pipeline = PressurePipeline::new();
        let (mut filtered, baseline) = quiet();

        // instant full press: target jumps to CV_RESOLUTION but each tick
        // may only add SLEW_RATE_LIMIT counts
        press(&mut filtered, 0, 400);
        pipeline.update(&filtered, &baseline);
        let first = pipeline.pressure(0) as f32;
        assert!(first <= SLEW_RATE_LIMIT / SMOOTHING_WINDOW as f32 + 1.0);

        pipeline.update(&filtered, &baseline);
        let second = pipeline.pressure(0) as f32;
        assert!(second > first);
        assert!(second - first <= SLEW_RATE_LIMIT);
    }

    #[test]
    fn test_saturates_at_full_scale() {
        let mut pipeline = PressurePipeline::new();
        let (mut filtered, baseline) = quiet();

        // press threshold crossing at 61, then push well past max delta
        press(&mut filtered, 0, 61);
        pipeline.update(&filtered, &baseline);
        press(&mut filtered, 0, 500);
        for _ in 0..100 {
            pipeline.update(&filtered, &baseline);
        }
        assert_eq!(pipeline.pressure(0), CV_RESOLUTION);
    }

    #[test]
    fn test_shape_linear_at_midpoint() {
        for x in [0.0, 0.25, 0.5, 0.75, 1.0] {
            assert_relative_eq!(shape_response(x, 0.5), x);
        }
    }

    #[test]
    fn test_shape_exponential_end() {
        assert_relative_eq!(shape_response(0.5, 0.0), 0.5f32.powi(4));
        assert_relative_eq!(shape_response(0.8, 0.0), 0.8f32.powi(4), epsilon = 1e-6);
    }

    #[test]
    fn test_shape_sigmoid_end() {
        let x = 0.3f32;
        let once = x * x * (3.0 - 2.0 * x);
        let twice = once * once * (3.0 - 2.0 * once);
        assert_relative_eq!(shape_response(x, 1.0), twice, epsilon = 1e-6);
    }

    #[test]
    fn test_deadzone_delays_aftertouch_rise() {
        let mut with_deadzone = PressurePipeline::new();
        with_deadzone.set_deadzone_offset(100);
        let mut without = PressurePipeline::new();

        let (mut filtered, baseline) = quiet();
        press(&mut filtered, 0, 61);
        with_deadzone.update(&filtered, &baseline);
        without.update(&filtered, &baseline);

        press(&mut filtered, 0, 150);
        for _ in 0..20 {
            with_deadzone.update(&filtered, &baseline);
            without.update(&filtered, &baseline);
        }
        assert!(with_deadzone.pressure(0) < without.pressure(0));
    }

    #[test]
    fn test_deadzone_offset_clamped() {
        let mut pipeline = PressurePipeline::new();
        pipeline.set_deadzone_offset(9999);
        assert_eq!(pipeline.deadzone_offset(), DEADZONE_MAX_OFFSET);
    }
}
