//! Control core for a pressure-sensitive capacitive CV keyboard
//!
//! A 24-key capacitive keyboard scanned over a two-wire bus is turned into
//! control voltages for external modular-synthesizer hardware: pitch CV on
//! one DAC channel, a pressure-derived auxiliary CV on the other, plus gate
//! and trigger lines.
//!
//! # Features
//! - Touch front-end driver for two 12-channel capacitive sensors (autoconfig,
//!   38-byte data block polling)
//! - Per-key pressure pipeline: baseline delta, hysteresis press/release
//!   detection, response shaping, slew limiting and moving-average smoothing
//! - Monophonic note-stack engine with voltage glide and aftertouch CV
//! - Arpeggiator engine with 12 patterns, BPM-locked step grid, latch with
//!   double-tap removal and gate-length control
//! - Interactive calibration procedure persisted to non-volatile storage
//! - Debounced buttons, quadrature encoder with velocity, shift combinations
//!
//! # Hardware seams
//! All hardware access goes through the traits in [`hal`] (`Bus`,
//! `AnalogOutputs`, `GateOutputs`, `NvStorage`, `LedDisplay`, `Clock`), so the
//! whole core runs unmodified against the software rig in [`hal::sim`].
//!
//! # Quick start
//! ```
//! use touchcv::firmware::Firmware;
//! use touchcv::hal::sim::SimRig;
//!
//! let mut rig = SimRig::new();
//! let mut fw = Firmware::boot(&mut rig.parts()).expect("sim devices present");
//!
//! rig.press_key(0, 400); // full-pressure touch on the lowest key
//! for _ in 0..200 {
//!     rig.advance_ms(1);
//!     fw.tick(&mut rig.parts());
//! }
//! assert!(rig.gate_high());
//! ```

#![warn(missing_docs)]

pub mod calibration;
pub mod constants;
pub mod engine;
pub mod firmware;
pub mod hal;
pub mod input;
pub mod output;
pub mod selector;
pub mod time;
pub mod touch;

/// Error types for keyboard core operations
///
/// This enum only contains errors that can occur in the control core itself.
/// Anything above it (CLI, host integration) wraps these with `anyhow`.
#[derive(thiserror::Error, Debug)]
pub enum TouchCvError {
    /// A bus device did not acknowledge its address
    #[error("device at bus address {addr:#04x} did not acknowledge")]
    DeviceAbsent {
        /// Seven-bit bus address of the absent device
        addr: u8,
    },

    /// A bus transaction failed after the device was found
    #[error("bus error: {0}")]
    Bus(String),

    /// Non-volatile storage could not be read or written
    #[error("storage error: {0}")]
    Storage(String),

    /// A persisted record failed to parse
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for TouchCvError {
    /// Converts a String into `TouchCvError::Other`.
    fn from(msg: String) -> Self {
        TouchCvError::Other(msg)
    }
}

impl From<&str> for TouchCvError {
    /// Converts a string slice into `TouchCvError::Other`.
    fn from(msg: &str) -> Self {
        TouchCvError::Other(msg.to_string())
    }
}

/// Result type for keyboard core operations
pub type Result<T> = std::result::Result<T, TouchCvError>;

// Public API exports
pub use engine::{ArpEngine, ArpPattern, MonoEngine, PlayEngine};
pub use firmware::Firmware;
pub use input::{InputDispatcher, InputEvents};
pub use output::{OutputSnapshot, UiEffect};
pub use selector::{Mode, ModeSelector};
pub use touch::{PressurePipeline, TouchSensors};
