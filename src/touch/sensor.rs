//! Driver for the pair of capacitive sensor devices
//!
//! Handles autoconfiguration (baseline servo targets, electrode thresholds,
//! run mode) and the per-tick poll of the 38-byte data block from each
//! device. Channels 0-11 come from the first device, 12-23 from the second.

use log::{debug, error, info};
use nom::bytes::complete::take;
use nom::multi::count;
use nom::number::complete::{le_u16, le_u8};
use nom::IResult;

use super::registers as reg;
use crate::constants::{
    DEFAULT_TARGET_BASELINE, KEYS_PER_SENSOR, NUM_KEYS, SENSOR_ADDR_A, SENSOR_ADDR_B,
};
use crate::hal::Bus;
use crate::{Result, TouchCvError};

/// Bus addresses of the sensor pair, in key order
const SENSOR_ADDRS: [u8; 2] = [SENSOR_ADDR_A, SENSOR_ADDR_B];

/// Filtered and baseline data of one polled device
struct DataBlock {
    filtered: [u16; KEYS_PER_SENSOR],
    baseline: [u16; KEYS_PER_SENSOR],
}

/// Front-end driver for the two capacitive sensors
///
/// Owns the concatenated 24-key `filtered` / `baseline` arrays. Until
/// [`run_autoconfiguration`](TouchSensors::run_autoconfiguration) succeeds
/// the driver reports uninitialized and the pressure pipeline stays silent.
#[derive(Debug, Clone)]
pub struct TouchSensors {
    filtered: [u16; NUM_KEYS],
    baseline: [u16; NUM_KEYS],
    target_baseline: u16,
    initialized: bool,
}

impl TouchSensors {
    /// Create an uninitialized driver
    pub fn new() -> Self {
        TouchSensors {
            filtered: [0; NUM_KEYS],
            baseline: [0; NUM_KEYS],
            target_baseline: DEFAULT_TARGET_BASELINE,
            initialized: false,
        }
    }

    /// Whether autoconfiguration has completed on both devices
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Baseline target of the last successful autoconfiguration
    pub fn target_baseline(&self) -> u16 {
        self.target_baseline
    }

    /// Latest filtered values, one per key
    pub fn filtered_data(&self) -> &[u16; NUM_KEYS] {
        &self.filtered
    }

    /// Latest baseline values, one per key (already on the filtered scale)
    pub fn baseline_data(&self) -> &[u16; NUM_KEYS] {
        &self.baseline
    }

    /// Filtered value of one key
    pub fn filtered(&self, key: usize) -> u16 {
        self.filtered.get(key).copied().unwrap_or(0)
    }

    /// Baseline value of one key
    pub fn baseline(&self, key: usize) -> u16 {
        self.baseline.get(key).copied().unwrap_or(0)
    }

    /// Program both devices to servo their baselines onto `target_baseline`
    ///
    /// Runs the full sequence on each device: stop mode, electrode
    /// thresholds, charge control, side limits and target level, then
    /// autoconfig enable and run mode for 12 electrodes. On success the
    /// driver polls once so the data arrays are valid before the next scan.
    ///
    /// A device that does not acknowledge leaves the driver uninitialized
    /// and the error names its address.
    pub fn run_autoconfiguration(&mut self, bus: &mut dyn Bus, target_baseline: u16) -> Result<()> {
        let tl = (target_baseline / 4) as u8;
        let usl = (target_baseline as f32 * 1.1 / 4.0) as u8;
        let lsl = (target_baseline as f32 * 0.7 / 4.0) as u8;
        info!("sensor autoconfig: target {target_baseline} (TL {tl}, USL {usl}, LSL {lsl})");

        self.initialized = false;
        for addr in SENSOR_ADDRS {
            if let Err(e) = bus.probe(addr) {
                error!("capacitive sensor at {addr:#04x} not found");
                return Err(e);
            }

            bus.write_register(addr, reg::ECR, reg::ECR_STOP)?;
            for electrode in 0..KEYS_PER_SENSOR as u8 {
                bus.write_register(
                    addr,
                    reg::touch_threshold(electrode),
                    reg::ELECTRODE_TOUCH_THRESHOLD,
                )?;
                bus.write_register(
                    addr,
                    reg::release_threshold(electrode),
                    reg::ELECTRODE_RELEASE_THRESHOLD,
                )?;
            }
            bus.write_register(addr, reg::CHARGE_CONTROL, 0)?;
            bus.write_register(addr, reg::USL, usl)?;
            bus.write_register(addr, reg::LSL, lsl)?;
            bus.write_register(addr, reg::TARGET_LEVEL, tl)?;
            bus.write_register(addr, reg::AUTOCONFIG0, reg::AutoConfigFlags::run_value())?;
            bus.write_register(addr, reg::ECR, reg::ECR_RUN_12_ELECTRODES)?;
            debug!("sensor {addr:#04x} configured");
        }

        self.target_baseline = target_baseline;
        self.initialized = true;
        self.poll(bus)?;
        info!("sensor autoconfig complete");
        Ok(())
    }

    /// Read the data block from both devices and refresh the key arrays
    ///
    /// A failed read leaves the previous values of that device in place and
    /// surfaces the error to the caller.
    pub fn poll(&mut self, bus: &mut dyn Bus) -> Result<()> {
        for (device, addr) in SENSOR_ADDRS.into_iter().enumerate() {
            let mut raw = [0u8; reg::DATA_BLOCK_LEN];
            bus.read_block(addr, reg::DATA_START, &mut raw)?;
            let block = parse_data_block(&raw)
                .map(|(_, block)| block)
                .map_err(|e| TouchCvError::Bus(format!("sensor {addr:#04x} data block: {e}")))?;

            let offset = device * KEYS_PER_SENSOR;
            self.filtered[offset..offset + KEYS_PER_SENSOR].copy_from_slice(&block.filtered);
            self.baseline[offset..offset + KEYS_PER_SENSOR].copy_from_slice(&block.baseline);
        }
        Ok(())
    }
}

impl Default for TouchSensors {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse one 38-byte data block: 12 little-endian filtered words, two
/// reserved bytes, 12 baseline bytes scaled up to the filtered range
fn parse_data_block(input: &[u8]) -> IResult<&[u8], DataBlock> {
    let (input, filtered) = count(le_u16, KEYS_PER_SENSOR)(input)?;
    let (input, _reserved) = take(2usize)(input)?;
    let (input, baseline_raw) = count(le_u8, KEYS_PER_SENSOR)(input)?;

    let mut block = DataBlock {
        filtered: [0; KEYS_PER_SENSOR],
        baseline: [0; KEYS_PER_SENSOR],
    };
    block.filtered.copy_from_slice(&filtered);
    for (dst, src) in block.baseline.iter_mut().zip(baseline_raw) {
        *dst = (src as u16) << 2;
    }
    Ok((input, block))
}
