//! Linear on/off ramp for click-free power toggling.
//!
//! `update(active)` is called once per sample with the desired state. While
//! ramping, `process` scales a frame by `count / ramp_length`.

use crate::dsp::clamp;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SlewState {
    /// No slewing at all: the caller's gate passes straight through.
    Disabled,
    /// Slewing enabled, output currently disconnected.
    Off,
    /// Rising or falling ramp in progress.
    Ramping,
    /// Slewing enabled, output currently connected.
    On,
}

#[derive(Copy, Clone, Debug)]
pub struct Slewer {
    state: SlewState,
    ramp_length: u32,
    count: u32, // only meaningful while Ramping
}

impl Default for Slewer {
    fn default() -> Self {
        Self::new()
    }
}

impl Slewer {
    pub fn new() -> Self {
        Self { state: SlewState::Disabled, ramp_length: 1, count: 0 }
    }

    pub fn set_ramp_length(&mut self, samples: u32) {
        self.ramp_length = samples.max(1);
    }

    /// Back to `Disabled`. The ramp length is kept.
    pub fn reset(&mut self) {
        self.state = SlewState::Disabled;
    }

    /// Start slewing from a settled on or off state.
    pub fn enable(&mut self, active: bool) {
        self.state = if active { SlewState::On } else { SlewState::Off };
    }

    pub fn is_enabled(&self) -> bool {
        self.state != SlewState::Disabled
    }

    pub fn is_ramping(&self) -> bool {
        self.state == SlewState::Ramping
    }

    /// Advance one sample. Returns whether the output should be produced.
    pub fn update(&mut self, active: bool) -> bool {
        match self.state {
            SlewState::Disabled => return active,
            SlewState::Off => {
                if active {
                    self.state = SlewState::Ramping;
                    self.count = 0;
                }
            }
            SlewState::On => {
                if !active {
                    self.state = SlewState::Ramping;
                    self.count = self.ramp_length - 1;
                }
            }
            SlewState::Ramping => {
                // zig-zag allowed if `active` flips mid-ramp
                if active {
                    if self.count < self.ramp_length {
                        self.count += 1;
                    } else {
                        self.state = SlewState::On;
                    }
                } else if self.count > 0 {
                    self.count -= 1;
                } else {
                    self.state = SlewState::Off;
                }
            }
        }
        self.state != SlewState::Off
    }

    /// Apply the ramp gain to a frame. No-op unless ramping.
    pub fn process(&self, frame: &mut [f32]) {
        if self.state != SlewState::Ramping {
            return;
        }
        // the ramp length can change mid-ramp, so bound the ratio
        let gain = clamp(self.count as f32 / self.ramp_length as f32, 0.0, 1.0);
        for x in frame.iter_mut() {
            *x *= gain;
        }
    }
}
