//! Capacitive touch front end
//!
//! Two 12-channel capacitive sensors on the two-wire bus are polled each tick
//! and turned into per-key pressure. [`registers`] holds the device register
//! map, [`TouchSensors`] drives the hardware (autoconfiguration and data
//! block polling) and [`PressurePipeline`] converts raw deltas into note
//! edges and smoothed aftertouch values.

pub mod pipeline;
pub mod registers;
pub mod sensor;

pub use pipeline::PressurePipeline;
pub use sensor::TouchSensors;
