//! Duty-cycle timers.
//!
//! A `Countdown` accumulates elapsed game time and reports when its period has been
//! crossed. Repeating countdowns rewind themselves; one-shot countdowns stay finished
//! until the caller calls [`Countdown::rewind`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Countdown {
    period: f32,
    elapsed: f32,
    repeating: bool,
}

impl Countdown {
    /// A timer that fires every `period` seconds.
    pub fn repeating(period: f32) -> Self {
        Self {
            period: period.max(0.0),
            elapsed: 0.0,
            repeating: true,
        }
    }

    /// A timer that fires once after `period` seconds and then stays finished.
    pub fn one_shot(period: f32) -> Self {
        Self {
            period: period.max(0.0),
            elapsed: 0.0,
            repeating: false,
        }
    }

    /// Start part-way through the period; `phase` is a fraction in [0, 1].
    /// Used to spread per-agent duty cycles across ticks.
    pub fn with_phase(mut self, phase: f32) -> Self {
        self.elapsed = self.period * phase.clamp(0.0, 1.0);
        self
    }

    /// Start already expired, so the first `tick` fires. Any phase set before is kept
    /// for the cycles that follow.
    pub fn expired(mut self) -> Self {
        self.elapsed += self.period;
        self
    }

    /// Advance by `dt`; returns `true` on the tick the period is crossed.
    pub fn tick(&mut self, dt: f32) -> bool {
        if !self.repeating && self.elapsed >= self.period {
            // Already fired, waiting for an explicit rewind.
            return false;
        }
        self.elapsed += dt;
        if self.elapsed < self.period {
            return false;
        }
        if self.repeating {
            if self.period > 0.0 {
                self.elapsed %= self.period;
            } else {
                self.elapsed = 0.0;
            }
        } else {
            // Clamp so `is_finished` holds until rewind.
            self.elapsed = self.period;
        }
        true
    }

    pub fn rewind(&mut self) {
        self.elapsed = 0.0;
    }

    /// Change the period, keeping elapsed time.
    pub fn set_period(&mut self, period: f32) {
        self.period = period.max(0.0);
    }

    pub fn period(&self) -> f32 {
        self.period
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.period
    }

    pub fn remaining(&self) -> f32 {
        (self.period - self.elapsed).max(0.0)
    }
}
