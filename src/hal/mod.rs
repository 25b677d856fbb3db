//! Hardware seams of the control core
//!
//! The core never touches hardware directly. Everything it needs from the
//! outside world is expressed as a trait here: the two-wire bus carrying the
//! capacitive sensors, the DAC behind the CV outputs, the gate/trigger pins,
//! non-volatile storage for the calibration record, the LED display layer
//! and a monotonic clock. Production firmware implements these over the real
//! peripherals; [`sim`] implements them in software so the whole core can be
//! exercised on a workstation.

pub mod sim;

use crate::output::UiEffect;
use crate::Result;

/// Two-wire serial bus transactions
///
/// Implementations are expected to run the bus at 400 kHz and to complete
/// each call before returning; the core performs at most two block reads per
/// tick.
pub trait Bus {
    /// Address a device without transferring data, to test for its presence
    fn probe(&mut self, addr: u8) -> Result<()>;

    /// Write a single register on a device
    fn write_register(&mut self, addr: u8, reg: u8, value: u8) -> Result<()>;

    /// Read a single register from a device
    fn read_register(&mut self, addr: u8, reg: u8) -> Result<u8>;

    /// Read a contiguous register block starting at `start`, filling `buf`
    fn read_block(&mut self, addr: u8, start: u8, buf: &mut [u8]) -> Result<()>;
}

/// Analog CV output contract
///
/// Channel 0 carries the pitch CV, channel 1 the auxiliary (pressure) CV.
/// Implementations clamp to the DAC's 0..10 V range at millivolt resolution.
pub trait AnalogOutputs {
    /// Set the output voltage of one channel
    fn set_voltage(&mut self, channel: u8, volts: f32);
}

/// Digital gate and trigger lines
pub trait GateOutputs {
    /// Drive the gate pin (high while a note is active)
    fn set_gate(&mut self, high: bool);

    /// Drive the trigger pin (pulsed on note events)
    fn set_trigger(&mut self, high: bool);
}

/// Byte-addressed non-volatile storage
pub trait NvStorage {
    /// Read `buf.len()` bytes starting at `offset`
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at `offset`
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<()>;
}

/// LED display layer
///
/// The core only requests what should be shown; rendering, brightness and
/// timing of the physical LEDs belong to the display controller.
pub trait LedDisplay {
    /// Show the current octave transpose on the indicator
    fn render_octave(&mut self, octave: i32);

    /// Show a 0..100 value on the bar graph
    fn render_bar_graph(&mut self, value: u8);

    /// Play a one-shot effect
    fn play_effect(&mut self, effect: UiEffect);

    /// Switch the display into calibration mode
    fn enter_calibration_mode(&mut self);

    /// Restore the normal play display
    fn exit_calibration_mode(&mut self);

    /// Play a countdown animation of roughly the given duration
    fn play_countdown(&mut self, duration_ms: u32);

    /// Blink a validation pattern `times` times
    fn play_validation(&mut self, duration_ms: u32, times: u8);

    /// Show a raw 5-bit static pattern
    fn display_static_pattern(&mut self, mask: u8);
}

/// Monotonic time source
///
/// Both counters are free-running and wrap; consumers use the helpers in
/// [`crate::time`] for interval math.
pub trait Clock {
    /// Milliseconds since an arbitrary epoch
    fn now_ms(&self) -> u32;

    /// Microseconds since an arbitrary epoch
    fn now_us(&self) -> u32;
}

/// Identifies one of the four panel buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonId {
    /// Latch toggle / calibration confirm
    Hold,
    /// Mode cycle / calibration restart
    Mode,
    /// Octave up / shift
    OctPlus,
    /// Octave down / shift
    OctMinus,
}

/// Raw state of the control surface
///
/// Levels are already polarity-resolved: `true` means the button is held
/// down. Debouncing and event derivation happen in the input dispatcher.
pub trait ControlSurface {
    /// Current level of one button
    fn button_pressed(&self, id: ButtonId) -> bool;

    /// Current levels of the encoder's A and B phases
    fn encoder_pins(&self) -> (bool, bool);

    /// Current raw sensitivity potentiometer reading (0..1023)
    fn pot_raw(&self) -> u16;
}

/// Borrowed bundle of every hardware seam, passed into the core per call
///
/// Keeping the peripherals outside the core lets the owner (firmware `main`,
/// the simulation rig, a test) retain access between ticks.
pub struct HalParts<'a> {
    /// Two-wire bus with the capacitive sensors
    pub bus: &'a mut dyn Bus,
    /// CV DAC
    pub dac: &'a mut dyn AnalogOutputs,
    /// Gate and trigger pins
    pub gates: &'a mut dyn GateOutputs,
    /// Calibration storage
    pub storage: &'a mut dyn NvStorage,
    /// LED display layer
    pub leds: &'a mut dyn LedDisplay,
    /// Monotonic clock
    pub clock: &'a dyn Clock,
    /// Buttons, encoder and potentiometer
    pub controls: &'a dyn ControlSurface,
}
