//! Press-duration measurement for the credential button.
//!
//! The button is polled; a duration is produced once per press, on release.
//! Timestamps are a wrapping millisecond counter.

/// Classification of a completed press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonPress {
    /// Released before the short-press limit.
    Short,
    /// Held for at least the long-press threshold.
    Long,
    /// Anything in between.
    Ignored,
}

/// Press thresholds in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressThresholds {
    /// A press strictly shorter than this is short.
    pub short_max_ms: u32,
    /// A press at least this long is long.
    pub long_min_ms: u32,
}

impl PressThresholds {
    pub fn classify(&self, duration_ms: u32) -> ButtonPress {
        if duration_ms >= self.long_min_ms {
            ButtonPress::Long
        } else if duration_ms < self.short_max_ms {
            ButtonPress::Short
        } else {
            ButtonPress::Ignored
        }
    }
}

/// Last observed button level and when the current press began.
#[derive(Debug, Clone, Default)]
pub struct ButtonTracker {
    pressed: bool,
    pressed_at_ms: u32,
}

impl ButtonTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample. Returns the press duration when this sample is a release.
    pub fn sample(&mut self, pressed: bool, now_ms: u32) -> Option<u32> {
        let duration = match (self.pressed, pressed) {
            (false, true) => {
                self.pressed_at_ms = now_ms;
                None
            }
            (true, false) => Some(now_ms.wrapping_sub(self.pressed_at_ms)),
            _ => None,
        };
        self.pressed = pressed;
        duration
    }

    /// Whether the button was down at the last sample.
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }
}
