//! Simulation demo: drives the keyboard core against the software rig
//!
//! Scripts a short performance (a pressed key with rising pressure, a
//! legato change, then a latched three-note arpeggio) and prints the
//! resulting CV/gate timeline. Run with `RUST_LOG=info` for the core's
//! diagnostics.

use anyhow::{Context, Result};
use log::info;

use touchcv::hal::{sim::SimRig, ButtonId};
use touchcv::Firmware;

/// Advance the rig and the core by `ms` milliseconds of 1 kHz ticks
fn run_ms(rig: &mut SimRig, fw: &mut Firmware, ms: u32) {
    for _ in 0..ms {
        rig.advance_ms(1);
        fw.tick(&mut rig.parts());
    }
}

/// Tap a panel button long enough to clear the debounce window
fn tap(rig: &mut SimRig, fw: &mut Firmware, button: ButtonId) {
    rig.set_button(button, true);
    run_ms(rig, fw, 60);
    rig.set_button(button, false);
    run_ms(rig, fw, 60);
}

fn print_state(rig: &SimRig, label: &str) {
    println!(
        "{label:<32} pitch {:>6.3} V   aux {:>6.3} V   gate {}   triggers {}",
        rig.pitch_v(),
        rig.aux_v(),
        if rig.gate_high() { "on " } else { "off" },
        rig.trigger_pulses(),
    );
}

fn main() -> Result<()> {
    env_logger::init();

    let mut rig = SimRig::new();
    let mut fw = Firmware::boot(&mut rig.parts()).context("boot against the simulation rig")?;
    info!("core booted against the simulation rig");

    println!("-- mono engine: pressure and release --");
    print_state(&rig, "idle");

    // press the lowest key and lean into it
    rig.press_key(0, 100);
    run_ms(&mut rig, &mut fw, 30);
    print_state(&rig, "key 0 touched");

    rig.press_key(0, 400);
    run_ms(&mut rig, &mut fw, 300);
    print_state(&rig, "key 0 at full pressure");

    // legato to one octave up
    rig.press_key(12, 400);
    run_ms(&mut rig, &mut fw, 300);
    print_state(&rig, "key 12 added (legato)");

    rig.release_key(12);
    rig.release_key(0);
    run_ms(&mut rig, &mut fw, 100);
    print_state(&rig, "all released");

    println!("-- arpeggiator: latched three-note chord at 120 BPM --");
    tap(&mut rig, &mut fw, ButtonId::Mode); // switch engines
    tap(&mut rig, &mut fw, ButtonId::Hold); // latch on

    for key in [21, 0, 12] {
        rig.press_key(key, 350);
        run_ms(&mut rig, &mut fw, 40);
        rig.release_key(key);
        run_ms(&mut rig, &mut fw, 40);
    }

    for step in 0..6 {
        run_ms(&mut rig, &mut fw, 500);
        print_state(&rig, &format!("arp step {step}"));
    }

    Ok(())
}
