//! Periodic NaN/Inf detection with automatic recovery.
//!
//! Scanning every state variable on every sample costs too much, so the
//! checker scans once per `interval` calls. A crash therefore produces at most
//! one interval of bad output before the engine is reset to a known-good
//! low-energy state.

use log::warn;

pub const CRASH_CHECK_INTERVAL: u32 = 10_000;

/// An engine that can report non-finite state and put itself back together.
pub trait CrashRecoverable {
    /// True when every state variable and output is finite.
    fn is_finite(&self) -> bool;

    /// Clear outputs, filters and AGC, and restore a low-energy state.
    fn recover(&mut self);
}

#[derive(Copy, Clone, Debug)]
pub struct CrashChecker {
    interval: u32,
    countdown: u32,
}

impl Default for CrashChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl CrashChecker {
    pub fn new() -> Self {
        Self::with_interval(CRASH_CHECK_INTERVAL)
    }

    /// Scan once every `interval` calls (at least 1).
    pub fn with_interval(interval: u32) -> Self {
        Self { interval: interval.max(1), countdown: 0 }
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    /// Call once per sample. Returns true if this call found and repaired a crash.
    pub fn check<E: CrashRecoverable + ?Sized>(&mut self, engine: &mut E) -> bool {
        if self.countdown > 0 {
            self.countdown -= 1;
            return false;
        }
        self.countdown = self.interval - 1;
        if engine.is_finite() {
            return false;
        }
        warn!("non-finite engine state detected; resetting");
        engine.recover();
        true
    }
}
