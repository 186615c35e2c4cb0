//! Pulse animation for the indicator

use std::f32::consts::TAU;
use std::time::{Duration, Instant};

pub const PULSE_PERIOD: Duration = Duration::from_millis(1500);
/// Opacity factor at the dimmest point of the cycle
pub const PULSE_MIN_OPACITY: f32 = 0.7;
/// Scale at the largest point of the cycle
pub const PULSE_MAX_SCALE: f32 = 1.1;

/// One sample of the animation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseFrame {
    /// Multiplied with the base opacity
    pub opacity: f32,
    pub scale: f32,
}

impl PulseFrame {
    pub const NEUTRAL: PulseFrame = PulseFrame {
        opacity: 1.0,
        scale: 1.0,
    };
}

/// Continuous oscillation that can be toggled without recreating anything.
/// Time is passed in so rendering and tests share one clock source.
#[derive(Debug, Clone, Default)]
pub struct Pulse {
    started: Option<Instant>,
}

impl Pulse {
    pub fn is_enabled(&self) -> bool {
        self.started.is_some()
    }

    /// Start (or restart) from the neutral point of the cycle
    pub fn enable(&mut self, now: Instant) {
        self.started = Some(now);
    }

    pub fn disable(&mut self) {
        self.started = None;
    }

    pub fn set_enabled(&mut self, enabled: bool, now: Instant) {
        match (enabled, self.is_enabled()) {
            (true, false) => self.enable(now),
            (false, true) => self.disable(),
            _ => {}
        }
    }

    pub fn sample(&self, now: Instant) -> PulseFrame {
        let Some(started) = self.started else {
            return PulseFrame::NEUTRAL;
        };

        let elapsed = now.saturating_duration_since(started).as_secs_f32();
        let phase = (elapsed / PULSE_PERIOD.as_secs_f32()).fract();
        // 0 at the start of each cycle, 1 half way through
        let wave = (1.0 - (phase * TAU).cos()) * 0.5;

        PulseFrame {
            opacity: 1.0 - (1.0 - PULSE_MIN_OPACITY) * wave,
            scale: 1.0 + (PULSE_MAX_SCALE - 1.0) * wave,
        }
    }
}
