//! Core constants for the keyboard, its sensors and the CV outputs
//!
//! Everything the signal path and the engines agree on lives here: key
//! counts, bus addresses, threshold ratios, smoothing parameters and the
//! voltage mapping of the pitch output.

/// Number of playable keys on the keyboard
pub const NUM_KEYS: usize = 24;

/// Channels exposed by one capacitive sensor device
pub const KEYS_PER_SENSOR: usize = 12;

/// Bus address of the first capacitive sensor (keys 0-11)
pub const SENSOR_ADDR_A: u8 = 0x5A;

/// Bus address of the second capacitive sensor (keys 12-23)
pub const SENSOR_ADDR_B: u8 = 0x5B;

/// Bus address of the two-channel DAC
pub const DAC_ADDR: u8 = 0x5F;

/// Full scale of the pressure / CV value domain (12-bit)
pub const CV_RESOLUTION: u16 = 4095;

/// Output range of both DAC channels in volts
pub const DAC_VOLTAGE_RANGE: f32 = 10.0;

/// MIDI note produced by key 0
pub const LOWEST_MIDI_NOTE: u8 = 36;

/// Pitch CV emitted for the reference MIDI note
pub const PITCH_CENTER_VOLTAGE: f32 = 5.0;

/// MIDI note mapped to the center voltage
pub const PITCH_REFERENCE_MIDI_NOTE: i32 = 47;

/// Volts per octave of the pitch output
pub const VOLTS_PER_OCTAVE: f32 = 1.0;

/// Lowest selectable octave transpose
pub const MIN_OCTAVE: i32 = -2;

/// Highest selectable octave transpose
pub const MAX_OCTAVE: i32 = 2;

// --- Pressure pipeline ---

/// Per-key maximum delta assumed before any calibration has run
pub const DEFAULT_MAX_DELTA: u16 = 400;

/// Sensor baseline target applied before any calibration has run
pub const DEFAULT_TARGET_BASELINE: u16 = 550;

/// Press threshold as a fraction of the calibrated maximum delta
pub const PRESS_THRESHOLD_RATIO: f32 = 0.15;

/// Release threshold as a fraction of the calibrated maximum delta
pub const RELEASE_THRESHOLD_RATIO: f32 = 0.08;

/// Floor for the derived press threshold, in raw counts
pub const MIN_PRESS_THRESHOLD: u16 = 20;

/// Floor for the derived release threshold, in raw counts
pub const MIN_RELEASE_THRESHOLD: u16 = 10;

/// Upper bound of the adjustable aftertouch deadzone offset, in raw counts
pub const DEADZONE_MAX_OFFSET: u16 = 250;

/// Exponent of the exponential end of the response-shape blend
pub const CURVE_EXP_INTENSITY: i32 = 4;

/// Smoothstep applications at the sigmoid end of the response-shape blend
pub const CURVE_SIG_ITERATIONS: u32 = 2;

/// Maximum pressure change per tick out of the slew limiter, in counts
pub const SLEW_RATE_LIMIT: f32 = 150.0;

/// Moving-average window over the slew limiter output, in ticks
pub const SMOOTHING_WINDOW: usize = 4;

// --- Play engines ---

/// Capacity of the monophonic engine's note stack
pub const NOTE_STACK_SIZE: usize = 16;

/// Capacity of the arpeggiator note set
pub const MAX_ARP_NOTES: usize = 8;

/// Re-press interval that removes a latched arpeggiator note, in ms
pub const DOUBLE_TAP_MS: u32 = 250;

/// Lowest selectable arpeggiator tempo
pub const BPM_MIN: u16 = 5;

/// Highest selectable arpeggiator tempo
pub const BPM_MAX: u16 = 900;

/// Default arpeggiator tempo
pub const BPM_DEFAULT: u16 = 120;

/// Lowest gate length as a fraction of the step interval
pub const GATE_LENGTH_MIN: f32 = 0.1;

/// Highest gate length as a fraction of the step interval
pub const GATE_LENGTH_MAX: f32 = 0.9;

/// Gate length change per encoder detent
pub const GATE_LENGTH_STEP: f32 = 0.05;

/// Lower bound of the aftertouch CV smoothing coefficient
pub const AUX_ALPHA_MIN: f32 = 0.001;

/// Upper bound of the aftertouch CV smoothing coefficient
pub const AUX_ALPHA_MAX: f32 = 0.9;

/// Aftertouch CV smoothing coefficient before any adjustment
pub const AUX_ALPHA_DEFAULT: f32 = 0.3;

/// Glide times at or below this snap the pitch CV to its target, in ms
pub const GLIDE_SNAP_MS: f32 = 5.0;

/// Upper bound of the glide time, in ms
pub const GLIDE_MAX_MS: f32 = 1000.0;

/// Glide change per detent at zero encoder velocity, in ms
pub const GLIDE_STEP_MIN: f32 = 0.5;

/// Glide change per detent at full encoder velocity, in ms
pub const GLIDE_STEP_MAX: f32 = 50.0;

/// Curve exponent of the glide step acceleration
pub const GLIDE_ACCEL_CURVE: f32 = 2.2;

/// BPM change per detent at zero encoder velocity
pub const BPM_STEP_MIN: f32 = 0.5;

/// BPM change per detent at full encoder velocity
pub const BPM_STEP_MAX: f32 = 35.0;

/// Curve exponent of the BPM step acceleration
pub const BPM_ACCEL_CURVE: f32 = 1.8;

// --- Input dispatcher ---

/// Button debounce window, in ms
pub const BUTTON_DEBOUNCE_MS: u32 = 30;

/// Long-press threshold for the Hold and Mode buttons, in ms
pub const LONG_PRESS_MS: u32 = 1000;

/// Long-press threshold for the octave buttons (shift keys), in ms
pub const OCT_LONG_PRESS_MS: u32 = 500;

/// Minimum interval between accepted encoder transitions, in ms
pub const ENCODER_DEBOUNCE_MS: u32 = 2;

/// Window over which encoder velocity is estimated, in ms
pub const VELOCITY_WINDOW_MS: u32 = 80;

/// Ceiling of the instantaneous encoder velocity, in detents per window
pub const VELOCITY_MAX: f32 = 20.0;

/// Sensitivity potentiometer one-pole smoothing coefficient
pub const POT_SMOOTHING_ALPHA: f32 = 0.05;

/// Sensitivity potentiometer change required to emit an event, in counts
pub const POT_DEADZONE: u16 = 4;

// --- Calibration ---

/// Selectable autoconfiguration baseline targets, least to most sensitive
pub const SENSITIVITY_TARGETS: [u16; 5] = [550, 650, 750, 850, 900];

/// Display names matching [`SENSITIVITY_TARGETS`]
pub const SENSITIVITY_NAMES: [&str; 5] =
    ["Standard", "Sensitive", "Very Sensitive", "High Perf", "Max Gain"];

/// Measured deltas below this are accepted with a warning
pub const CAL_MIN_ACCEPT_DELTA: u16 = 300;

/// Visible countdown after autoconfiguration, in ms
pub const CAL_COUNTDOWN_MS: u32 = 1000;

// --- Output stage ---

/// Width of the trigger pulse raised on each retrigger event, in ms
pub const TRIGGER_PULSE_MS: u32 = 5;
