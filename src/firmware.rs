//! Top-level wiring: boot sequence and the fixed per-tick schedule
//!
//! Single-threaded cooperative core. Every iteration runs, in order: input
//! dispatch, sensor poll, pressure pipeline (delivering note edges and
//! aftertouch to the active engine), engine tick, output commit, LED render.
//! When the calibration procedure is active it replaces the play path
//! entirely and the outputs are held safe.

use log::{error, info, warn};

use crate::calibration::{CalibrationFsm, CalibrationRecord};
use crate::constants::NUM_KEYS;
use crate::hal::{ButtonId, HalParts};
use crate::input::InputDispatcher;
use crate::output::OutputStage;
use crate::selector::ModeSelector;
use crate::time::TickInstant;
use crate::touch::{PressurePipeline, TouchSensors};
use crate::Result;

/// The assembled control core
pub struct Firmware {
    dispatcher: InputDispatcher,
    sensors: TouchSensors,
    pipeline: PressurePipeline,
    selector: ModeSelector,
    output: OutputStage,
    calibration: Option<CalibrationFsm>,
}

impl Firmware {
    /// Boot the core: load calibration, configure the sensors, arm the
    /// calibration procedure if Hold is down at power-on
    ///
    /// A missing or invalid calibration record falls back to defaults; an
    /// absent sensor leaves the keyboard in a safe idle (no events, outputs
    /// at 0 V) rather than failing the boot. Only unreadable storage is an
    /// error.
    pub fn boot(parts: &mut HalParts) -> Result<Self> {
        info!("keyboard core starting");
        let record = CalibrationRecord::load(parts.storage)?;

        let mut pipeline = PressurePipeline::new();
        pipeline.load_max_deltas(&record.max_delta);

        let mut sensors = TouchSensors::new();
        let calibration = if parts.controls.button_pressed(ButtonId::Hold) {
            info!("Hold held at power-on: calibration will run first");
            Some(CalibrationFsm::new())
        } else {
            if let Err(e) = sensors.run_autoconfiguration(parts.bus, record.target_baseline) {
                error!("touch front end unavailable, keyboard stays silent: {e}");
            }
            None
        };

        let mut output = OutputStage::new();
        output.force_safe(parts.dac, parts.gates);

        Ok(Firmware {
            dispatcher: InputDispatcher::new(parts.controls),
            sensors,
            pipeline,
            selector: ModeSelector::new(),
            output,
            calibration,
        })
    }

    /// Whether the calibration procedure is currently running
    pub fn in_calibration(&self) -> bool {
        self.calibration.is_some()
    }

    /// The mode selector (active engine state)
    pub fn selector(&self) -> &ModeSelector {
        &self.selector
    }

    /// The pressure pipeline
    pub fn pipeline(&self) -> &PressurePipeline {
        &self.pipeline
    }

    /// The touch front-end driver
    pub fn sensors(&self) -> &TouchSensors {
        &self.sensors
    }

    /// Run one scheduler iteration
    pub fn tick(&mut self, parts: &mut HalParts) {
        let now = TickInstant::new(parts.clock.now_ms(), parts.clock.now_us());

        // 1: input dispatch
        self.dispatcher.update(now, parts.controls);

        // 2: sensor poll
        if self.sensors.is_initialized() {
            if let Err(e) = self.sensors.poll(parts.bus) {
                warn!("sensor poll failed: {e}");
            }
        }

        // calibration owns the loop while it runs; outputs stay safe
        if let Some(cal) = self.calibration.as_mut() {
            let buttons = self.dispatcher.panel_buttons();
            cal.step(
                now,
                &buttons,
                parts.bus,
                parts.storage,
                parts.leds,
                &mut self.sensors,
                &mut self.pipeline,
            );
            self.output.force_safe(parts.dac, parts.gates);
            if cal.is_finished() {
                if cal.succeeded() {
                    info!("calibration complete, resuming play mode");
                } else {
                    warn!("calibration failed, keyboard stays silent");
                }
                self.calibration = None;
            }
            return;
        }

        // 3: pressure pipeline, delivering edges before the engine tick
        if self.sensors.is_initialized() {
            self.pipeline
                .update(self.sensors.filtered_data(), self.sensors.baseline_data());
            for key in 0..NUM_KEYS {
                if self.pipeline.note_on(key) {
                    self.selector
                        .on_key_down(now, key, self.pipeline.pressure(key));
                } else if self.pipeline.note_off(key) {
                    self.selector.on_key_up(key);
                } else if self.pipeline.is_pressed(key) {
                    self.selector.on_aftertouch(key, self.pipeline.pressure(key));
                }
            }
        }

        // control events, then parameter routing into the pipeline
        let events = *self.dispatcher.events();
        let pressed_keys = *self.pipeline.pressed_keys();
        self.selector.process_inputs(now, &events, &pressed_keys);
        if events.sens_pot_moved {
            self.pipeline
                .set_response_shape(events.sens_pot_value as f32 / 1023.0);
        }
        self.pipeline
            .set_deadzone_offset(self.selector.deadzone_offset());

        // 4: engine timing and smoothing
        self.selector.tick(now);

        // 5: output commit
        let snapshot = self.selector.snapshot();
        if self.sensors.is_initialized() {
            self.output.commit(now.ms, &snapshot, parts.dac, parts.gates);
        } else {
            self.output.force_safe(parts.dac, parts.gates);
        }

        // 6: display
        parts.leds.render_octave(snapshot.octave);
        parts.leds.render_bar_graph(snapshot.bar_graph);
        parts.leds.play_effect(snapshot.ui_effect);
    }
}
