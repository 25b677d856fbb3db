//! Software rig implementing every hardware seam
//!
//! Emulates the two capacitive sensor devices (autoconfiguration register
//! behavior and the 38-byte data block), captures DAC/gate/LED activity and
//! provides a manually-advanced clock, so the complete core can be driven
//! deterministically from tests and from the CLI demo.

use super::{
    AnalogOutputs, Bus, ButtonId, Clock, ControlSurface, GateOutputs, HalParts, LedDisplay,
    NvStorage,
};
use crate::constants::{KEYS_PER_SENSOR, NUM_KEYS, SENSOR_ADDR_A, SENSOR_ADDR_B};
use crate::output::UiEffect;
use crate::touch::registers as reg;
use crate::{Result, TouchCvError};

/// One emulated 12-channel capacitive sensor
#[derive(Debug, Clone)]
struct SimSensor {
    present: bool,
    registers: [u8; 0x80],
    /// Baseline level per channel, on the filtered (10-bit) scale
    baseline: [u16; KEYS_PER_SENSOR],
    /// Applied touch delta per channel, subtracted from the baseline
    delta: [u16; KEYS_PER_SENSOR],
}

impl SimSensor {
    fn new() -> Self {
        SimSensor {
            present: true,
            registers: [0; 0x80],
            baseline: [0; KEYS_PER_SENSOR],
            delta: [0; KEYS_PER_SENSOR],
        }
    }

    fn write_register(&mut self, register: u8, value: u8) {
        self.registers[register as usize & 0x7F] = value;
        // Entering run mode settles every electrode onto the programmed
        // target level, like the real part's autoconfiguration does.
        if register == reg::ECR && value & 0x0F != 0 {
            let target = (self.registers[reg::TARGET_LEVEL as usize] as u16) * 4;
            self.baseline = [target; KEYS_PER_SENSOR];
        }
    }

    fn filtered(&self, channel: usize) -> u16 {
        self.baseline[channel].saturating_sub(self.delta[channel])
    }

    /// Serialize the 38-byte data block starting at the data register
    fn data_block(&self) -> [u8; reg::DATA_BLOCK_LEN] {
        let mut block = [0u8; reg::DATA_BLOCK_LEN];
        for ch in 0..KEYS_PER_SENSOR {
            let f = self.filtered(ch);
            block[ch * 2] = (f & 0xFF) as u8;
            block[ch * 2 + 1] = (f >> 8) as u8;
        }
        // two reserved bytes, then one baseline byte per channel
        for ch in 0..KEYS_PER_SENSOR {
            block[26 + ch] = (self.baseline[ch] >> 2) as u8;
        }
        block
    }
}

/// Simulated two-wire bus hosting the sensor pair
#[derive(Debug, Clone)]
pub struct SimBus {
    sensors: [SimSensor; 2],
}

impl SimBus {
    fn new() -> Self {
        SimBus {
            sensors: [SimSensor::new(), SimSensor::new()],
        }
    }

    fn sensor_mut(&mut self, addr: u8) -> Result<&mut SimSensor> {
        let index = match addr {
            SENSOR_ADDR_A => 0,
            SENSOR_ADDR_B => 1,
            _ => return Err(TouchCvError::DeviceAbsent { addr }),
        };
        if !self.sensors[index].present {
            return Err(TouchCvError::DeviceAbsent { addr });
        }
        Ok(&mut self.sensors[index])
    }
}

impl Bus for SimBus {
    fn probe(&mut self, addr: u8) -> Result<()> {
        self.sensor_mut(addr).map(|_| ())
    }

    fn write_register(&mut self, addr: u8, register: u8, value: u8) -> Result<()> {
        self.sensor_mut(addr)?.write_register(register, value);
        Ok(())
    }

    fn read_register(&mut self, addr: u8, register: u8) -> Result<u8> {
        let sensor = self.sensor_mut(addr)?;
        Ok(sensor.registers[register as usize & 0x7F])
    }

    fn read_block(&mut self, addr: u8, start: u8, buf: &mut [u8]) -> Result<()> {
        let sensor = self.sensor_mut(addr)?;
        if start != reg::DATA_START || buf.len() != reg::DATA_BLOCK_LEN {
            return Err(TouchCvError::Bus(format!(
                "unsupported block read at {start:#04x} ({} bytes)",
                buf.len()
            )));
        }
        buf.copy_from_slice(&sensor.data_block());
        Ok(())
    }
}

/// Captures the two CV channels
#[derive(Debug, Clone, Default)]
pub struct SimDac {
    volts: [f32; 2],
}

impl AnalogOutputs for SimDac {
    fn set_voltage(&mut self, channel: u8, volts: f32) {
        if channel < 2 {
            // millivolt-resolution part
            self.volts[channel as usize] = (volts.clamp(0.0, 10.0) * 1000.0).round() / 1000.0;
        }
    }
}

/// Captures the gate level and counts trigger pulses
#[derive(Debug, Clone, Default)]
pub struct SimGates {
    gate: bool,
    trigger: bool,
    pulses: u32,
}

impl GateOutputs for SimGates {
    fn set_gate(&mut self, high: bool) {
        self.gate = high;
    }

    fn set_trigger(&mut self, high: bool) {
        if high && !self.trigger {
            self.pulses += 1;
        }
        self.trigger = high;
    }
}

/// In-memory byte storage, erased to 0xFF like fresh flash
#[derive(Debug, Clone)]
pub struct SimStorage {
    bytes: Vec<u8>,
}

impl SimStorage {
    fn new() -> Self {
        SimStorage {
            bytes: vec![0xFF; 1024],
        }
    }
}

impl NvStorage for SimStorage {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let end = offset + buf.len();
        if end > self.bytes.len() {
            return Err(TouchCvError::Storage(format!(
                "read past end of storage ({end} > {})",
                self.bytes.len()
            )));
        }
        buf.copy_from_slice(&self.bytes[offset..end]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let end = offset + data.len();
        if end > self.bytes.len() {
            return Err(TouchCvError::Storage(format!(
                "write past end of storage ({end} > {})",
                self.bytes.len()
            )));
        }
        self.bytes[offset..end].copy_from_slice(data);
        Ok(())
    }
}

/// Records what the core asked the display layer to show
#[derive(Debug, Clone, Default)]
pub struct SimLeds {
    /// Last octave sent to the indicator
    pub octave: i32,
    /// Last bar graph value
    pub bar_graph: u8,
    /// Number of one-shot effects played, by kind
    pub effects: Vec<UiEffect>,
    /// Whether the display is in calibration mode
    pub calibration_mode: bool,
    /// Last static pattern shown
    pub static_pattern: u8,
}

impl LedDisplay for SimLeds {
    fn render_octave(&mut self, octave: i32) {
        self.octave = octave;
    }

    fn render_bar_graph(&mut self, value: u8) {
        self.bar_graph = value;
    }

    fn play_effect(&mut self, effect: UiEffect) {
        if effect != UiEffect::None {
            self.effects.push(effect);
        }
    }

    fn enter_calibration_mode(&mut self) {
        self.calibration_mode = true;
    }

    fn exit_calibration_mode(&mut self) {
        self.calibration_mode = false;
    }

    fn play_countdown(&mut self, _duration_ms: u32) {}

    fn play_validation(&mut self, _duration_ms: u32, _times: u8) {}

    fn display_static_pattern(&mut self, mask: u8) {
        self.static_pattern = mask;
    }
}

/// Manually advanced monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualClock {
    ms: u32,
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.ms
    }

    fn now_us(&self) -> u32 {
        self.ms.wrapping_mul(1000)
    }
}

/// Scriptable control surface state
#[derive(Debug, Clone, Default)]
pub struct SimControls {
    buttons: [bool; 4],
    enc_a: bool,
    enc_b: bool,
    pot: u16,
}

impl ControlSurface for SimControls {
    fn button_pressed(&self, id: ButtonId) -> bool {
        self.buttons[button_index(id)]
    }

    fn encoder_pins(&self) -> (bool, bool) {
        (self.enc_a, self.enc_b)
    }

    fn pot_raw(&self) -> u16 {
        self.pot
    }
}

fn button_index(id: ButtonId) -> usize {
    match id {
        ButtonId::Hold => 0,
        ButtonId::Mode => 1,
        ButtonId::OctPlus => 2,
        ButtonId::OctMinus => 3,
    }
}

// Quadrature phase sequence for one clockwise rotation: 00 -> 10 -> 11 -> 01
const QUAD_SEQUENCE: [(bool, bool); 4] =
    [(false, false), (true, false), (true, true), (false, true)];

/// Complete software rig: every peripheral plus scripting helpers
///
/// ```
/// use touchcv::hal::sim::SimRig;
///
/// let mut rig = SimRig::new();
/// rig.press_key(5, 300);
/// rig.advance_ms(1);
/// ```
#[derive(Debug, Clone)]
pub struct SimRig {
    bus: SimBus,
    dac: SimDac,
    gates: SimGates,
    storage: SimStorage,
    leds: SimLeds,
    clock: ManualClock,
    controls: SimControls,
    quad_phase: usize,
}

impl SimRig {
    /// Create a rig with both sensors present and empty storage
    pub fn new() -> Self {
        SimRig {
            bus: SimBus::new(),
            dac: SimDac::default(),
            gates: SimGates::default(),
            storage: SimStorage::new(),
            leds: SimLeds::default(),
            clock: ManualClock::default(),
            controls: SimControls::default(),
            quad_phase: 0,
        }
    }

    /// Borrow every peripheral as the trait bundle the core consumes
    pub fn parts(&mut self) -> HalParts<'_> {
        HalParts {
            bus: &mut self.bus,
            dac: &mut self.dac,
            gates: &mut self.gates,
            storage: &mut self.storage,
            leds: &mut self.leds,
            clock: &self.clock,
            controls: &self.controls,
        }
    }

    /// Advance the clock by `ms` milliseconds
    pub fn advance_ms(&mut self, ms: u32) {
        self.clock.ms = self.clock.ms.wrapping_add(ms);
    }

    /// Apply a touch delta (raw counts) to one key
    pub fn press_key(&mut self, key: usize, delta: u16) {
        assert!(key < NUM_KEYS);
        let sensor = &mut self.bus.sensors[key / KEYS_PER_SENSOR];
        sensor.delta[key % KEYS_PER_SENSOR] = delta;
    }

    /// Remove the touch from one key
    pub fn release_key(&mut self, key: usize) {
        self.press_key(key, 0);
    }

    /// Set one button's level (`true` = held down)
    pub fn set_button(&mut self, id: ButtonId, pressed: bool) {
        self.controls.buttons[button_index(id)] = pressed;
    }

    /// Set the raw sensitivity potentiometer reading
    pub fn set_pot(&mut self, raw: u16) {
        self.controls.pot = raw;
    }

    /// Advance the encoder by one valid quadrature transition
    ///
    /// Positive direction is clockwise. The caller is responsible for
    /// advancing the clock between steps to clear the decoder's debounce.
    pub fn step_encoder(&mut self, direction: i32) {
        self.quad_phase = if direction >= 0 {
            (self.quad_phase + 1) % 4
        } else {
            (self.quad_phase + 3) % 4
        };
        let (a, b) = QUAD_SEQUENCE[self.quad_phase];
        self.controls.enc_a = a;
        self.controls.enc_b = b;
    }

    /// Disconnect one sensor device, as if it stopped acknowledging
    pub fn disconnect_sensor(&mut self, addr: u8) {
        match addr {
            SENSOR_ADDR_A => self.bus.sensors[0].present = false,
            SENSOR_ADDR_B => self.bus.sensors[1].present = false,
            _ => {}
        }
    }

    /// Current gate level
    pub fn gate_high(&self) -> bool {
        self.gates.gate
    }

    /// Number of trigger pulses seen so far
    pub fn trigger_pulses(&self) -> u32 {
        self.gates.pulses
    }

    /// Current pitch CV in volts
    pub fn pitch_v(&self) -> f32 {
        self.dac.volts[0]
    }

    /// Current aux CV in volts
    pub fn aux_v(&self) -> f32 {
        self.dac.volts[1]
    }

    /// Display activity recorded so far
    pub fn leds(&self) -> &SimLeds {
        &self.leds
    }
}

impl Default for SimRig {
    fn default() -> Self {
        Self::new()
    }
}
