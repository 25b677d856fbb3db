//! Interactive calibration procedure
//!
//! A linear state machine driven one step per tick, replacing the play loop
//! while it runs. Phase one selects the autoconfiguration sensitivity
//! preset; phase two measures the maximum delta of each key in turn against
//! baselines snapshotted once after tuning; phase three confirms and
//! persists the record. The firmware holds every output at 0 V with the
//! gate closed for the whole procedure.

use log::{debug, error, info, warn};

use crate::calibration::store::CalibrationRecord;
use crate::constants::{
    CAL_COUNTDOWN_MS, CAL_MIN_ACCEPT_DELTA, NUM_KEYS, SENSITIVITY_NAMES, SENSITIVITY_TARGETS,
};
use crate::hal::{Bus, LedDisplay, NvStorage};
use crate::input::PanelButtons;
use crate::time::{elapsed_ms, TickInstant};
use crate::touch::{PressurePipeline, TouchSensors};

/// Phases of the calibration procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    /// Autoconfigure with the current preset and play a countdown
    Init,
    /// Preset selection: Oct+/- cycle, Mode applies, Hold confirms
    TuneSensitivity,
    /// Re-running autoconfiguration after a preset change
    ApplyingConfig,
    /// Waiting for Hold to clear before key measurement starts
    WaitReleaseAfterTune,
    /// Arm measurement of the current key
    PrepareKey,
    /// Tracking the maximum delta of the current key
    MeasureKey,
    /// Waiting for Hold to clear before the next key
    WaitReleaseAfterMeasure,
    /// Summary shown: Hold saves, Mode restarts
    FinalConfirmation,
    /// Persist the record and leave the calibration display
    SaveExit,
    /// Done, record saved
    Finished,
    /// Aborted (a sensor stopped acknowledging)
    Failed,
}

/// Poll-per-tick calibration state machine
#[derive(Debug, Clone)]
pub struct CalibrationFsm {
    phase: CalibrationPhase,
    phase_entered_ms: Option<u32>,
    sensitivity_index: usize,
    current_key: usize,
    reference_baselines: [u16; NUM_KEYS],
    measured: [u16; NUM_KEYS],
    current_max_delta: u16,
    last_logged_delta: u16,
}

impl CalibrationFsm {
    /// Create a procedure ready to run from its first phase
    pub fn new() -> Self {
        CalibrationFsm {
            phase: CalibrationPhase::Init,
            phase_entered_ms: None,
            sensitivity_index: 0,
            current_key: 0,
            reference_baselines: [0; NUM_KEYS],
            measured: [0; NUM_KEYS],
            current_max_delta: 0,
            last_logged_delta: 0,
        }
    }

    /// Current phase
    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    /// Whether the procedure has ended (successfully or not)
    pub fn is_finished(&self) -> bool {
        matches!(
            self.phase,
            CalibrationPhase::Finished | CalibrationPhase::Failed
        )
    }

    /// Whether the procedure ended with a saved record
    pub fn succeeded(&self) -> bool {
        self.phase == CalibrationPhase::Finished
    }

    /// Key currently being measured
    pub fn current_key(&self) -> usize {
        self.current_key
    }

    fn set_phase(&mut self, phase: CalibrationPhase) {
        debug!("calibration -> {phase:?}");
        self.phase = phase;
        self.phase_entered_ms = None;
    }

    /// Run one tick of the procedure
    ///
    /// The caller has already polled the sensors and read the buttons for
    /// this tick.
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        now: TickInstant,
        buttons: &PanelButtons,
        bus: &mut dyn Bus,
        storage: &mut dyn NvStorage,
        leds: &mut dyn LedDisplay,
        sensors: &mut TouchSensors,
        pipeline: &mut PressurePipeline,
    ) {
        let entering = self.phase_entered_ms.is_none();
        if entering {
            self.phase_entered_ms = Some(now.ms);
            self.enter_phase(bus, storage, leds, sensors, pipeline);
            if self.is_finished() {
                return;
            }
        }
        let entered_ms = self.phase_entered_ms.unwrap_or(now.ms);

        match self.phase {
            CalibrationPhase::Init => {
                if elapsed_ms(now.ms, entered_ms) >= CAL_COUNTDOWN_MS {
                    self.set_phase(CalibrationPhase::TuneSensitivity);
                }
            }
            CalibrationPhase::TuneSensitivity => {
                if buttons.oct_plus.was_pressed
                    && self.sensitivity_index < SENSITIVITY_TARGETS.len() - 1
                {
                    self.sensitivity_index += 1;
                    leds.display_static_pattern(1 << self.sensitivity_index);
                }
                if buttons.oct_minus.was_pressed && self.sensitivity_index > 0 {
                    self.sensitivity_index -= 1;
                    leds.display_static_pattern(1 << self.sensitivity_index);
                }
                if buttons.mode.was_pressed {
                    self.set_phase(CalibrationPhase::ApplyingConfig);
                } else if buttons.hold.was_pressed {
                    self.set_phase(CalibrationPhase::WaitReleaseAfterTune);
                }
            }
            CalibrationPhase::ApplyingConfig => {
                if !buttons.mode.pressed {
                    self.set_phase(CalibrationPhase::TuneSensitivity);
                }
            }
            CalibrationPhase::WaitReleaseAfterTune => {
                if !buttons.hold.pressed {
                    self.current_key = 0;
                    self.set_phase(CalibrationPhase::PrepareKey);
                }
            }
            CalibrationPhase::PrepareKey => {
                self.set_phase(CalibrationPhase::MeasureKey);
            }
            CalibrationPhase::MeasureKey => {
                let filtered = sensors.filtered(self.current_key);
                let delta = self.reference_baselines[self.current_key].saturating_sub(filtered);
                if delta > self.current_max_delta {
                    self.current_max_delta = delta;
                    if self.current_max_delta > self.last_logged_delta + 20 {
                        debug!(
                            "key {}: new max delta {}",
                            self.current_key, self.current_max_delta
                        );
                        self.last_logged_delta = self.current_max_delta;
                    }
                }
                if buttons.hold.was_pressed {
                    self.set_phase(CalibrationPhase::WaitReleaseAfterMeasure);
                }
            }
            CalibrationPhase::WaitReleaseAfterMeasure => {
                if !buttons.hold.pressed {
                    self.current_key += 1;
                    if self.current_key < NUM_KEYS {
                        self.set_phase(CalibrationPhase::PrepareKey);
                    } else {
                        self.set_phase(CalibrationPhase::FinalConfirmation);
                    }
                }
            }
            CalibrationPhase::FinalConfirmation => {
                if buttons.hold.was_pressed {
                    self.set_phase(CalibrationPhase::SaveExit);
                } else if buttons.mode.was_pressed {
                    info!("calibration restarted");
                    self.set_phase(CalibrationPhase::Init);
                }
            }
            CalibrationPhase::SaveExit
            | CalibrationPhase::Finished
            | CalibrationPhase::Failed => {}
        }
    }

    /// One-shot actions on entering the current phase
    fn enter_phase(
        &mut self,
        bus: &mut dyn Bus,
        storage: &mut dyn NvStorage,
        leds: &mut dyn LedDisplay,
        sensors: &mut TouchSensors,
        pipeline: &mut PressurePipeline,
    ) {
        match self.phase {
            CalibrationPhase::Init => {
                leds.enter_calibration_mode();
                info!("calibration started");
                let target = SENSITIVITY_TARGETS[self.sensitivity_index];
                if let Err(e) = sensors.run_autoconfiguration(bus, target) {
                    error!("calibration aborted: {e}");
                    self.set_phase(CalibrationPhase::Failed);
                    return;
                }
                leds.play_countdown(CAL_COUNTDOWN_MS);
            }
            CalibrationPhase::TuneSensitivity => {
                info!(
                    "sensitivity: [{}] (target {}) - Oct+/- change, Mode apply, Hold confirm",
                    SENSITIVITY_NAMES[self.sensitivity_index],
                    SENSITIVITY_TARGETS[self.sensitivity_index]
                );
                leds.display_static_pattern(1 << self.sensitivity_index);
            }
            CalibrationPhase::ApplyingConfig => {
                let target = SENSITIVITY_TARGETS[self.sensitivity_index];
                info!("applying sensitivity preset (target {target})");
                leds.play_validation(100, 1);
                if let Err(e) = sensors.run_autoconfiguration(bus, target) {
                    error!("calibration aborted: {e}");
                    self.set_phase(CalibrationPhase::Failed);
                }
            }
            CalibrationPhase::WaitReleaseAfterTune => {
                leds.play_validation(100, 2);
                // one snapshot per attempt: every key measures against these
                self.reference_baselines = *sensors.baseline_data();
                info!(
                    "sensitivity confirmed (target {})",
                    sensors.target_baseline()
                );
            }
            CalibrationPhase::PrepareKey => {
                self.current_max_delta = 0;
                self.last_logged_delta = 0;
                leds.display_static_pattern(0);
                info!(
                    "measuring key {}: press fully, then confirm with Hold",
                    self.current_key
                );
            }
            CalibrationPhase::WaitReleaseAfterMeasure => {
                leds.play_validation(180, 1);
                self.measured[self.current_key] = self.current_max_delta;
                pipeline.set_max_delta(self.current_key, self.current_max_delta);
                info!(
                    "key {} accepted with max delta {}",
                    self.current_key, self.current_max_delta
                );
                if self.current_max_delta < CAL_MIN_ACCEPT_DELTA {
                    warn!(
                        "key {}: max delta {} is low, expect a narrow pressure range",
                        self.current_key, self.current_max_delta
                    );
                }
            }
            CalibrationPhase::FinalConfirmation => {
                info!("measured deltas: {:?}", &self.measured);
                info!("Hold saves and exits, Mode restarts the calibration");
            }
            CalibrationPhase::SaveExit => {
                let mut record = CalibrationRecord {
                    target_baseline: sensors.target_baseline(),
                    max_delta: [0; NUM_KEYS],
                };
                for (key, delta) in record.max_delta.iter_mut().enumerate() {
                    *delta = pipeline.max_delta(key);
                }
                if let Err(e) = record.save(storage) {
                    error!("calibration record not saved: {e}");
                }
                leds.play_validation(180, 3);
                leds.exit_calibration_mode();
                info!("calibration finished");
                self.set_phase(CalibrationPhase::Finished);
            }
            CalibrationPhase::MeasureKey
            | CalibrationPhase::Finished
            | CalibrationPhase::Failed => {}
        }
    }
}

impl Default for CalibrationFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::store::CalibrationRecord;
    use crate::constants::SENSOR_ADDR_A;
    use crate::hal::sim::SimRig;
    use crate::input::ButtonSnapshot;

    struct Harness {
        rig: SimRig,
        fsm: CalibrationFsm,
        sensors: TouchSensors,
        pipeline: PressurePipeline,
        now_ms: u32,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                rig: SimRig::new(),
                fsm: CalibrationFsm::new(),
                sensors: TouchSensors::new(),
                pipeline: PressurePipeline::new(),
                now_ms: 0,
            }
        }

        fn step(&mut self, buttons: PanelButtons) {
            self.now_ms += 1;
            let parts = self.rig.parts();
            if self.sensors.is_initialized() {
                let _ = self.sensors.poll(parts.bus);
            }
            self.fsm.step(
                TickInstant::new(self.now_ms, self.now_ms.wrapping_mul(1000)),
                &buttons,
                parts.bus,
                parts.storage,
                parts.leds,
                &mut self.sensors,
                &mut self.pipeline,
            );
        }

        fn idle(&mut self, ticks: u32) {
            for _ in 0..ticks {
                self.step(PanelButtons::default());
            }
        }

        /// A full press-and-release of the Hold button
        fn tap_hold(&mut self) {
            self.step(press_of(true));
            self.step(PanelButtons::default());
        }
    }

    fn press_of(hold: bool) -> PanelButtons {
        let down = ButtonSnapshot {
            pressed: true,
            was_pressed: true,
            was_released: false,
        };
        let mut buttons = PanelButtons::default();
        if hold {
            buttons.hold = down;
        } else {
            buttons.mode = down;
        }
        buttons
    }

    #[test]
    fn test_init_runs_countdown_then_tunes() {
        let mut harness = Harness::new();
        harness.step(PanelButtons::default());
        assert_eq!(harness.fsm.phase(), CalibrationPhase::Init);
        assert!(harness.rig.leds().calibration_mode);
        assert!(harness.sensors.is_initialized());

        harness.idle(CAL_COUNTDOWN_MS + 1);
        assert_eq!(harness.fsm.phase(), CalibrationPhase::TuneSensitivity);
    }

    #[test]
    fn test_sensor_failure_aborts_without_touching_storage() {
        let mut harness = Harness::new();
        let before = {
            let mut bytes = [0u8; crate::calibration::RECORD_LEN];
            harness.rig.parts().storage.read(0, &mut bytes).unwrap();
            bytes
        };
        harness.rig.disconnect_sensor(SENSOR_ADDR_A);
        harness.step(PanelButtons::default());
        assert_eq!(harness.fsm.phase(), CalibrationPhase::Failed);
        assert!(harness.fsm.is_finished());
        assert!(!harness.fsm.succeeded());

        let mut after = [0u8; crate::calibration::RECORD_LEN];
        harness.rig.parts().storage.read(0, &mut after).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_full_run_measures_and_saves() {
        let mut harness = Harness::new();
        harness.step(PanelButtons::default());
        harness.idle(CAL_COUNTDOWN_MS + 1);
        assert_eq!(harness.fsm.phase(), CalibrationPhase::TuneSensitivity);

        // confirm the default preset
        harness.tap_hold();
        assert_eq!(harness.fsm.phase(), CalibrationPhase::PrepareKey);

        for key in 0..NUM_KEYS {
            // arm measurement, press the key to a key-specific depth
            harness.idle(1);
            assert_eq!(harness.fsm.phase(), CalibrationPhase::MeasureKey);
            assert_eq!(harness.fsm.current_key(), key);
            let depth = if key == 5 { 412 } else { 350 };
            harness.rig.press_key(key, depth);
            harness.idle(3);
            harness.rig.release_key(key);
            harness.tap_hold();
        }

        assert_eq!(harness.fsm.phase(), CalibrationPhase::FinalConfirmation);
        harness.tap_hold();
        assert!(harness.fsm.succeeded());
        assert!(!harness.rig.leds().calibration_mode);

        // thresholds follow the measured delta immediately
        assert_eq!(harness.pipeline.max_delta(5), 412);
        assert_eq!(harness.pipeline.press_threshold(5), 61);
        assert_eq!(harness.pipeline.release_threshold(5), 32);

        // and the record round-trips through storage
        let record = CalibrationRecord::load(harness.rig.parts().storage).unwrap();
        assert_eq!(record.max_delta[5], 412);
        assert_eq!(record.max_delta[0], 350);
        assert_eq!(record.target_baseline, SENSITIVITY_TARGETS[0]);
    }

    #[test]
    fn test_preset_cycling_clamps() {
        let mut harness = Harness::new();
        harness.step(PanelButtons::default());
        harness.idle(CAL_COUNTDOWN_MS + 1);

        let oct_plus = {
            let mut b = PanelButtons::default();
            b.oct_plus = ButtonSnapshot {
                pressed: true,
                was_pressed: true,
                was_released: false,
            };
            b
        };
        for _ in 0..10 {
            harness.step(oct_plus);
        }
        assert_eq!(harness.fsm.sensitivity_index, SENSITIVITY_TARGETS.len() - 1);
        assert_eq!(
            harness.rig.leds().static_pattern,
            1 << (SENSITIVITY_TARGETS.len() - 1)
        );
    }

    #[test]
    fn test_mode_applies_preset_again() {
        let mut harness = Harness::new();
        harness.step(PanelButtons::default());
        harness.idle(CAL_COUNTDOWN_MS + 1);

        harness.step(press_of(false)); // Mode pressed
        assert_eq!(harness.fsm.phase(), CalibrationPhase::ApplyingConfig);
        let held = {
            let mut b = PanelButtons::default();
            b.mode.pressed = true;
            b
        };
        harness.step(held);
        assert_eq!(harness.fsm.phase(), CalibrationPhase::ApplyingConfig);
        harness.step(PanelButtons::default());
        assert_eq!(harness.fsm.phase(), CalibrationPhase::TuneSensitivity);
    }
}
