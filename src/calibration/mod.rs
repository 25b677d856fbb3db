//! Calibration: persistent per-key sensitivity data and the interactive
//! measurement procedure
//!
//! [`store`] owns the non-volatile record (magic/version framing, bit-exact
//! round trip, defaults on mismatch). [`fsm`] is the interactive procedure
//! that measures each key's maximum delta and selects the autoconfiguration
//! sensitivity preset; it runs instead of the play loop when requested at
//! boot.

pub mod fsm;
pub mod store;

pub use fsm::{CalibrationFsm, CalibrationPhase};
pub use store::{CalibrationRecord, RECORD_LEN, RECORD_MAGIC, RECORD_OFFSET, RECORD_VERSION};
