//! Engine output snapshot and the commit stage
//!
//! Each tick the active engine produces an [`OutputSnapshot`]; the
//! [`OutputStage`] is the only code that talks to the DAC and the gate and
//! trigger pins. The retrigger flag is a one-shot: the engine raises it, the
//! commit turns it into a timed trigger pulse.

use crate::constants::{DAC_VOLTAGE_RANGE, TRIGGER_PULSE_MS};
use crate::hal::{AnalogOutputs, GateOutputs};
use crate::time::elapsed_ms;

/// One-shot display effect requested by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEffect {
    /// Nothing to play
    None,
    /// Confirmation blink (latch toggled, value applied)
    Validate,
    /// Mode change announcement
    ModeChange,
    /// Arpeggiator step fired
    Beat,
}

impl Default for UiEffect {
    fn default() -> Self {
        UiEffect::None
    }
}

/// What the active engine wants on the output hardware this tick
#[derive(Debug, Clone, Copy)]
pub struct OutputSnapshot {
    /// Pitch CV in volts
    pub pitch_v: f32,
    /// Auxiliary (pressure) CV in volts
    pub aux_v: f32,
    /// Gate level
    pub gate: bool,
    /// One-shot retrigger request
    pub retrigger: bool,
    /// One-shot display effect request
    pub ui_effect: UiEffect,
    /// Bar-graph value for the display layer (0..100)
    pub bar_graph: u8,
    /// Octave transpose for the display layer
    pub octave: i32,
}

impl Default for OutputSnapshot {
    fn default() -> Self {
        OutputSnapshot {
            pitch_v: 0.0,
            aux_v: 0.0,
            gate: false,
            retrigger: false,
            ui_effect: UiEffect::None,
            bar_graph: 0,
            octave: 0,
        }
    }
}

/// Commits snapshots to the DAC and the gate/trigger pins
#[derive(Debug, Clone, Default)]
pub struct OutputStage {
    trigger_active: bool,
    trigger_started_ms: u32,
}

impl OutputStage {
    /// Create an idle output stage
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive the hardware from one snapshot
    pub fn commit(
        &mut self,
        now_ms: u32,
        snapshot: &OutputSnapshot,
        dac: &mut dyn AnalogOutputs,
        gates: &mut dyn GateOutputs,
    ) {
        dac.set_voltage(0, snapshot.pitch_v.clamp(0.0, DAC_VOLTAGE_RANGE));
        dac.set_voltage(1, snapshot.aux_v.clamp(0.0, DAC_VOLTAGE_RANGE));
        gates.set_gate(snapshot.gate);

        if snapshot.retrigger {
            self.trigger_active = true;
            self.trigger_started_ms = now_ms;
            gates.set_trigger(true);
        } else if self.trigger_active
            && elapsed_ms(now_ms, self.trigger_started_ms) >= TRIGGER_PULSE_MS
        {
            self.trigger_active = false;
            gates.set_trigger(false);
        }
    }

    /// Force every output to its safe level (0 V, gate and trigger low)
    pub fn force_safe(&mut self, dac: &mut dyn AnalogOutputs, gates: &mut dyn GateOutputs) {
        dac.set_voltage(0, 0.0);
        dac.set_voltage(1, 0.0);
        gates.set_gate(false);
        gates.set_trigger(false);
        self.trigger_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::SimRig;

    #[test]
    fn test_trigger_pulse_width() {
        let mut rig = SimRig::new();
        let mut stage = OutputStage::new();
        let snapshot = OutputSnapshot {
            retrigger: true,
            gate: true,
            ..Default::default()
        };

        {
            let parts = rig.parts();
            stage.commit(0, &snapshot, parts.dac, parts.gates);
        }
        assert_eq!(rig.trigger_pulses(), 1);

        let quiet = OutputSnapshot {
            gate: true,
            ..Default::default()
        };
        for now in 1..TRIGGER_PULSE_MS + 2 {
            let parts = rig.parts();
            stage.commit(now, &quiet, parts.dac, parts.gates);
        }
        // the pulse ended, no second rising edge happened
        assert_eq!(rig.trigger_pulses(), 1);
    }

    #[test]
    fn test_voltages_clamped() {
        let mut rig = SimRig::new();
        let mut stage = OutputStage::new();
        let snapshot = OutputSnapshot {
            pitch_v: 42.0,
            aux_v: -3.0,
            ..Default::default()
        };
        {
            let parts = rig.parts();
            stage.commit(0, &snapshot, parts.dac, parts.gates);
        }
        assert_eq!(rig.pitch_v(), 10.0);
        assert_eq!(rig.aux_v(), 0.0);
    }
}
