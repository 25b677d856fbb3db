//! Register map of the capacitive sensor devices
//!
//! Only the registers the core actually programs or reads are listed. The
//! autoconfiguration control bits are modeled as flags so the enable value
//! is composed rather than written as a magic constant.

use bitflags::bitflags;

/// Electrode configuration register (run/stop mode, electrode count)
pub const ECR: u8 = 0x5E;

/// Auto-configuration control register 0
pub const AUTOCONFIG0: u8 = 0x7B;

/// Auto-configuration charge control register
pub const CHARGE_CONTROL: u8 = 0x5B;

/// Auto-configuration upper side limit
pub const USL: u8 = 0x7D;

/// Auto-configuration lower side limit
pub const LSL: u8 = 0x7E;

/// Auto-configuration target level
pub const TARGET_LEVEL: u8 = 0x7F;

/// Touch threshold register of electrode `i` (unused by the pipeline)
pub fn touch_threshold(electrode: u8) -> u8 {
    0x41 + 2 * electrode
}

/// Release threshold register of electrode `i` (unused by the pipeline)
pub fn release_threshold(electrode: u8) -> u8 {
    0x42 + 2 * electrode
}

/// First register of the filtered-data / baseline block
pub const DATA_START: u8 = 0x04;

/// Size of one data block read: 12 x 2 filtered bytes, 2 reserved,
/// 12 baseline bytes
pub const DATA_BLOCK_LEN: usize = 38;

/// Stop mode: all electrodes disabled, registers writable
pub const ECR_STOP: u8 = 0x00;

/// Run mode with all 12 electrodes enabled
pub const ECR_RUN_12_ELECTRODES: u8 = 0x0C;

/// Per-electrode touch threshold programmed during autoconfiguration
pub const ELECTRODE_TOUCH_THRESHOLD: u8 = 12;

/// Per-electrode release threshold programmed during autoconfiguration
pub const ELECTRODE_RELEASE_THRESHOLD: u8 = 6;

bitflags! {
    /// Auto-configuration control register 0 bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AutoConfigFlags: u8 {
        /// Enable automatic charge configuration
        const ENABLE = 0x01;
        /// Enable automatic reconfiguration on out-of-range baselines
        const RECONFIG = 0x02;
        /// Baseline adjusting on enable
        const BASELINE_ADJUST = 0x08;
    }
}

impl AutoConfigFlags {
    /// The enable value the core programs: autoconfig + reconfig with
    /// baseline adjust
    pub fn run_value() -> u8 {
        (AutoConfigFlags::ENABLE | AutoConfigFlags::RECONFIG | AutoConfigFlags::BASELINE_ADJUST)
            .bits()
    }
}
