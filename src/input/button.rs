//! Debounced momentary button
//!
//! Level changes are accepted only after they have been stable for the
//! debounce window. Edge queries are valid for one tick, until the next
//! [`read`](Button::read).

use crate::time::elapsed_ms;

/// One debounced button
#[derive(Debug, Clone)]
pub struct Button {
    debounce_ms: u32,
    stable: bool,
    raw: bool,
    last_raw_change_ms: u32,
    pressed_since_ms: u32,
    was_pressed: bool,
    was_released: bool,
}

/// One-tick view of a button's state, handed to consumers that poll buttons
/// directly (the calibration procedure)
#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonSnapshot {
    /// Debounced level
    pub pressed: bool,
    /// Went down this tick
    pub was_pressed: bool,
    /// Went up this tick
    pub was_released: bool,
}

impl Button {
    /// Create a released button with the given debounce window
    pub fn new(debounce_ms: u32) -> Self {
        Button {
            debounce_ms,
            stable: false,
            raw: false,
            last_raw_change_ms: 0,
            pressed_since_ms: 0,
            was_pressed: false,
            was_released: false,
        }
    }

    /// Feed the current raw level; must be called once per tick
    pub fn read(&mut self, now_ms: u32, raw_pressed: bool) {
        self.was_pressed = false;
        self.was_released = false;

        if raw_pressed != self.raw {
            self.raw = raw_pressed;
            self.last_raw_change_ms = now_ms;
        }

        if self.raw != self.stable && elapsed_ms(now_ms, self.last_raw_change_ms) >= self.debounce_ms
        {
            self.stable = self.raw;
            if self.stable {
                self.was_pressed = true;
                self.pressed_since_ms = now_ms;
            } else {
                self.was_released = true;
            }
        }
    }

    /// Debounced level
    pub fn is_pressed(&self) -> bool {
        self.stable
    }

    /// Went down this tick
    pub fn was_pressed(&self) -> bool {
        self.was_pressed
    }

    /// Went up this tick
    pub fn was_released(&self) -> bool {
        self.was_released
    }

    /// Held down for at least `ms` milliseconds
    pub fn pressed_for(&self, now_ms: u32, ms: u32) -> bool {
        self.stable && elapsed_ms(now_ms, self.pressed_since_ms) >= ms
    }

    /// One-tick snapshot of the edge and level state
    pub fn snapshot(&self) -> ButtonSnapshot {
        ButtonSnapshot {
            pressed: self.stable,
            was_pressed: self.was_pressed,
            was_released: self.was_released,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::BUTTON_DEBOUNCE_MS;

    #[test]
    fn test_press_after_debounce_window() {
        let mut btn = Button::new(BUTTON_DEBOUNCE_MS);
        btn.read(0, true);
        assert!(!btn.is_pressed());
        btn.read(BUTTON_DEBOUNCE_MS - 1, true);
        assert!(!btn.is_pressed());
        btn.read(BUTTON_DEBOUNCE_MS, true);
        assert!(btn.is_pressed());
        assert!(btn.was_pressed());
        btn.read(BUTTON_DEBOUNCE_MS + 1, true);
        assert!(!btn.was_pressed());
    }

    #[test]
    fn test_bounce_is_squelched() {
        let mut btn = Button::new(BUTTON_DEBOUNCE_MS);
        btn.read(0, true);
        btn.read(10, false);
        btn.read(20, true);
        btn.read(25, false);
        // raw level never settled, the stable state never moved
        assert!(!btn.is_pressed());
        for t in 26..=26 + BUTTON_DEBOUNCE_MS {
            btn.read(t, true);
        }
        assert!(btn.is_pressed());
    }

    #[test]
    fn test_pressed_for_duration() {
        let mut btn = Button::new(BUTTON_DEBOUNCE_MS);
        btn.read(0, true);
        btn.read(BUTTON_DEBOUNCE_MS, true);
        assert!(btn.is_pressed());
        assert!(!btn.pressed_for(BUTTON_DEBOUNCE_MS + 100, 1000));
        assert!(btn.pressed_for(BUTTON_DEBOUNCE_MS + 1000, 1000));
    }

    #[test]
    fn test_release_edge() {
        let mut btn = Button::new(BUTTON_DEBOUNCE_MS);
        btn.read(0, true);
        btn.read(BUTTON_DEBOUNCE_MS, true);
        btn.read(100, false);
        assert!(btn.is_pressed());
        btn.read(100 + BUTTON_DEBOUNCE_MS, false);
        assert!(btn.was_released());
        assert!(!btn.is_pressed());
    }
}
