//! Realtime driver core.
//!
//! This module defines the `StereoEngine` trait every physics engine exposes to
//! the outside world, and `Host<E>`, a lightweight wrapper that owns an engine,
//! tracks sample rate and time, and produces one **stereo** frame at a time with
//! zero heap work per sample.
//!
//! Design goals
//! - No dynamic allocations in the audio thread
//! - SR changes handled lazily (if the host reconfigures), with cheap branching
//! - Generic over the engine type; boxed engines work through the blanket impl
//! - Crash checks and the power ramp live here, not in every engine

use log::{debug, warn};
use sapphire_core::slewer::Slewer;

use crate::crash::{CrashChecker, CrashRecoverable};
use crate::error::{check_sample_rate, EngineResult};

/// Power ramp length in seconds.
pub const POWER_RAMP_SECONDS: f32 = 0.02;

/// Anything that turns one stereo input frame into one stereo output frame.
pub trait StereoEngine {
    /// Restore default parameters and a silent state.
    fn initialize(&mut self);

    /// Called once when the host reports a new sample rate.
    fn set_sample_rate(&mut self, _sample_rate: f32) {}

    /// Process one frame. `input` is `[left, right]`.
    fn process(&mut self, sample_rate: f32, input: [f32; 2]) -> [f32; 2];

    /// Names accepted by [`set_param`](Self::set_param), in a stable order.
    fn param_names(&self) -> &'static [&'static str];

    /// Set a parameter by name. Returns false for unknown names.
    fn set_param(&mut self, name: &str, value: f32) -> bool;

    /// 0 when the output limiter is idle.
    fn agc_distortion(&self) -> f32;

    /// Engines with crash recovery expose it here so the host can check them.
    fn crash_recoverable(&mut self) -> Option<&mut dyn CrashRecoverable> {
        None
    }
}

impl<E: StereoEngine + ?Sized> StereoEngine for Box<E> {
    fn initialize(&mut self) {
        (**self).initialize()
    }
    fn set_sample_rate(&mut self, sample_rate: f32) {
        (**self).set_sample_rate(sample_rate)
    }
    fn process(&mut self, sample_rate: f32, input: [f32; 2]) -> [f32; 2] {
        (**self).process(sample_rate, input)
    }
    fn param_names(&self) -> &'static [&'static str] {
        (**self).param_names()
    }
    fn set_param(&mut self, name: &str, value: f32) -> bool {
        (**self).set_param(name, value)
    }
    fn agc_distortion(&self) -> f32 {
        (**self).agc_distortion()
    }
    fn crash_recoverable(&mut self) -> Option<&mut dyn CrashRecoverable> {
        (**self).crash_recoverable()
    }
}

/// Lightweight realtime host that owns an engine.
///
/// The audio callback should call `next_frame(sr, input)` for every output
/// frame. If the `sr` reported by the device changes, the host will call
/// `set_sample_rate(sr)` on the inner engine once and continue.
pub struct Host<E: StereoEngine> {
    sr: f32,
    t: f64,
    frames: u64,
    engine: E,
    power: bool,
    slewer: Slewer,
    checker: CrashChecker,
    crashes: u32,
}

impl<E: StereoEngine> Host<E> {
    /// Construct with an already-configured engine. The engine is told the
    /// sample rate immediately.
    pub fn new(mut engine: E, sample_rate: f32) -> EngineResult<Self> {
        let sr = check_sample_rate(sample_rate)?;
        engine.set_sample_rate(sr);
        let mut slewer = Slewer::new();
        slewer.set_ramp_length(ramp_samples(sr));
        slewer.enable(true);
        Ok(Self {
            sr,
            t: 0.0,
            frames: 0,
            engine,
            power: true,
            slewer,
            checker: CrashChecker::new(),
            crashes: 0,
        })
    }

    /// Produce **one** stereo frame at the given sample rate.
    ///
    /// - A new positive `sr` is passed on to the engine once; invalid rates are
    ///   ignored and the previous rate is kept.
    /// - While powered off the engine is not run and the host outputs silence
    ///   after the ramp has finished.
    #[inline]
    pub fn next_frame(&mut self, sr: f32, input: [f32; 2]) -> [f32; 2] {
        if sr != self.sr {
            if let Err(e) = self.set_sample_rate(sr) {
                warn!("host: {e}");
            }
        }
        self.t += 1.0 / f64::from(self.sr);
        self.frames += 1;

        let running = self.slewer.update(self.power);
        let mut frame = if running { self.engine.process(self.sr, input) } else { [0.0, 0.0] };

        if let Some(engine) = self.engine.crash_recoverable() {
            if self.checker.check(engine) {
                self.crashes += 1;
                frame = [0.0, 0.0];
            }
        }
        self.slewer.process(&mut frame);
        frame
    }

    /// Switch to a new sample rate now rather than on the next frame.
    pub fn set_sample_rate(&mut self, sr: f32) -> EngineResult<()> {
        let sr = check_sample_rate(sr)?;
        if sr != self.sr {
            debug!("host: sample rate {} -> {} Hz", self.sr, sr);
            self.sr = sr;
            self.slewer.set_ramp_length(ramp_samples(sr));
            self.engine.set_sample_rate(sr);
        }
        Ok(())
    }

    /// Fill an interleaved buffer of `channels` channels.
    ///
    /// `input` is called with the frame index since the host was created.
    /// Mono buffers get the average of left and right; channels past the
    /// second are zeroed. Returns the number of frames rendered.
    pub fn render_interleaved<F>(&mut self, out: &mut [f32], channels: usize, mut input: F) -> usize
    where
        F: FnMut(u64) -> [f32; 2],
    {
        if channels == 0 {
            return 0;
        }
        let mut frames = 0;
        for chunk in out.chunks_exact_mut(channels) {
            let stim = input(self.frames);
            let [l, r] = self.next_frame(self.sr, stim);
            match chunk {
                [mono] => *mono = 0.5 * (l + r),
                [left, right, rest @ ..] => {
                    *left = l;
                    *right = r;
                    rest.fill(0.0);
                }
                [] => {}
            }
            frames += 1;
        }
        frames
    }

    /// Power the engine on or off with a click-free ramp.
    pub fn set_power(&mut self, on: bool) {
        self.power = on;
    }

    #[inline] pub fn is_powered(&self) -> bool { self.power }

    /// Return the host's current sample rate.
    #[inline] pub fn sample_rate(&self) -> f32 { self.sr }

    /// Return elapsed time (seconds) since this host was created.
    #[inline] pub fn time(&self) -> f64 { self.t }

    #[inline] pub fn frames(&self) -> u64 { self.frames }

    /// Number of crashes detected and repaired so far.
    #[inline] pub fn crash_count(&self) -> u32 { self.crashes }

    /// Re-initialize the engine, keeping the sample rate.
    pub fn reset(&mut self) {
        self.engine.initialize();
        self.engine.set_sample_rate(self.sr);
        self.slewer.reset();
        self.slewer.enable(self.power);
    }

    /// Get a mutable reference to the inner engine for live parameter tweaks.
    #[inline] pub fn engine_mut(&mut self) -> &mut E { &mut self.engine }

    #[inline] pub fn engine(&self) -> &E { &self.engine }

    /// Look up `name` in the engine's parameter table and set it.
    pub fn set_param(&mut self, name: &str, value: f32) -> bool {
        let ok = self.engine.set_param(name, value);
        if !ok {
            warn!("host: unknown parameter {name:?}");
        }
        ok
    }
}

fn ramp_samples(sr: f32) -> u32 {
    ((POWER_RAMP_SECONDS * sr).round() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Echoes its input, or NaN once poisoned.
    struct Echo {
        poisoned: bool,
        recovered: u32,
        rates: Vec<f32>,
    }

    impl CrashRecoverable for Echo {
        fn is_finite(&self) -> bool {
            !self.poisoned
        }
        fn recover(&mut self) {
            self.poisoned = false;
            self.recovered += 1;
        }
    }

    impl StereoEngine for Echo {
        fn initialize(&mut self) {
            self.poisoned = false;
        }
        fn set_sample_rate(&mut self, sample_rate: f32) {
            self.rates.push(sample_rate);
        }
        fn process(&mut self, _sr: f32, input: [f32; 2]) -> [f32; 2] {
            if self.poisoned { [f32::NAN; 2] } else { input }
        }
        fn param_names(&self) -> &'static [&'static str] {
            &["poison"]
        }
        fn set_param(&mut self, name: &str, value: f32) -> bool {
            if name != "poison" {
                return false;
            }
            self.poisoned = value > 0.0;
            true
        }
        fn agc_distortion(&self) -> f32 {
            0.0
        }
        fn crash_recoverable(&mut self) -> Option<&mut dyn CrashRecoverable> {
            Some(self)
        }
    }

    fn echo() -> Echo {
        Echo { poisoned: false, recovered: 0, rates: Vec::new() }
    }

    #[test]
    fn sample_rate_changes_are_forwarded_once() {
        let mut host = Host::new(echo(), 48_000.0).unwrap();
        host.next_frame(48_000.0, [0.0; 2]);
        host.next_frame(44_100.0, [0.0; 2]);
        host.next_frame(44_100.0, [0.0; 2]);
        host.next_frame(-1.0, [0.0; 2]);
        assert_eq!(host.engine().rates, [48_000.0, 44_100.0]);
        assert_eq!(host.sample_rate(), 44_100.0);
        assert_eq!(host.frames(), 4);
    }

    #[test]
    fn power_ramps_down_then_silences() {
        let mut host = Host::new(echo(), 1000.0).unwrap(); // 20-sample ramp
        let [l, _] = host.next_frame(1000.0, [1.0, 1.0]);
        assert_eq!(l, 1.0);
        host.set_power(false);
        let mut last = 1.0;
        for _ in 0..20 {
            let [l, _] = host.next_frame(1000.0, [1.0, 1.0]);
            assert!(l <= last);
            last = l;
        }
        assert_eq!(host.next_frame(1000.0, [1.0, 1.0]), [0.0, 0.0]);
    }

    #[test]
    fn crash_is_repaired_on_first_frame() {
        let mut host = Host::new(echo(), 48_000.0).unwrap();
        assert!(host.set_param("poison", 1.0));
        assert!(!host.set_param("nope", 1.0));
        assert_eq!(host.next_frame(48_000.0, [0.5, 0.5]), [0.0, 0.0]);
        assert_eq!(host.crash_count(), 1);
        assert_eq!(host.engine().recovered, 1);
        assert_eq!(host.next_frame(48_000.0, [0.5, 0.5]), [0.5, 0.5]);
    }

    #[test]
    fn interleaved_render_layouts() {
        let mut host = Host::new(echo(), 48_000.0).unwrap();
        let mut mono = [9.0_f32; 3];
        assert_eq!(host.render_interleaved(&mut mono, 1, |_| [1.0, 0.0]), 3);
        assert_eq!(mono, [0.5; 3]);

        let mut quad = [9.0_f32; 8];
        let n = host.render_interleaved(&mut quad, 4, |i| [i as f32, -1.0]);
        assert_eq!(n, 2);
        assert_eq!(quad, [3.0, -1.0, 0.0, 0.0, 4.0, -1.0, 0.0, 0.0]);
    }
}
