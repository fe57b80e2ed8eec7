//! Automatic gain limiter.
//!
//! A peak follower that never drops below 1.0. Every channel of a frame is
//! divided by the follower, so the output settles at or under the ceiling.
//!
//! - attack: the follower moves toward `peak / ceiling` with the attack half-life
//! - release: the same smoothing with the decay half-life, floored at 1.0
//!
//! An attack half-life of zero makes the attack instantaneous, so no sample ever
//! leaves over the ceiling. The engines run that way.
//!
//! `follower − 1` is the amount of gain reduction currently applied, exported
//! to callers as a distortion metric for warning indicators.

use crate::dsp::one_half_to_power;

/// Default attack half-life, seconds. Zero means instantaneous.
pub const AGC_ATTACK_HALFLIFE: f64 = 0.0;

/// Default release half-life of the follower, seconds.
pub const AGC_DECAY_HALFLIFE: f64 = 0.1;

/// Smallest ceiling accepted by [`AutomaticGainLimiter::set_ceiling`].
pub const AGC_MIN_CEILING: f32 = 1.0e-3;

#[derive(Copy, Clone, Debug)]
pub struct AutomaticGainLimiter {
    ceiling: f32,
    attack_halflife: f64,
    decay_halflife: f64,
    follower: f64,
    attack: f64,
    decay: f64,
    cached_sr: f32,
}

impl Default for AutomaticGainLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl AutomaticGainLimiter {
    /// Ceiling 1.0, instantaneous attack, default release.
    pub fn new() -> Self {
        Self::with_halflives(1.0, AGC_ATTACK_HALFLIFE, AGC_DECAY_HALFLIFE)
    }

    /// Limiter with explicit attack and decay half-lives in seconds.
    /// Negative or non-finite half-lives are treated as zero.
    pub fn with_halflives(ceiling: f32, attack_halflife: f64, decay_halflife: f64) -> Self {
        let mut agc = Self {
            ceiling: 1.0,
            attack_halflife: sanitize_halflife(attack_halflife),
            decay_halflife: sanitize_halflife(decay_halflife),
            follower: 1.0,
            attack: 0.0,
            decay: 0.0,
            cached_sr: 0.0,
        };
        agc.set_ceiling(ceiling);
        agc
    }

    /// Forget any gain reduction.
    #[inline]
    pub fn initialize(&mut self) {
        self.follower = 1.0;
    }

    /// Target peak level in the caller's signal units.
    #[inline]
    pub fn set_ceiling(&mut self, ceiling: f32) {
        self.ceiling = if ceiling.is_finite() { ceiling.max(AGC_MIN_CEILING) } else { 1.0 };
    }

    #[inline]
    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    pub fn set_attack_halflife(&mut self, seconds: f64) {
        self.attack_halflife = sanitize_halflife(seconds);
        self.cached_sr = 0.0;
    }

    pub fn set_decay_halflife(&mut self, seconds: f64) {
        self.decay_halflife = sanitize_halflife(seconds);
        self.cached_sr = 0.0;
    }

    #[inline]
    pub fn attack_halflife(&self) -> f64 {
        self.attack_halflife
    }

    #[inline]
    pub fn decay_halflife(&self) -> f64 {
        self.decay_halflife
    }

    /// Current gain-reduction divisor, always ≥ 1.
    #[inline]
    pub fn follower(&self) -> f32 {
        self.follower as f32
    }

    #[inline]
    fn update_factors(&mut self, sample_rate: f32) {
        if sample_rate != self.cached_sr {
            self.cached_sr = sample_rate;
            let sr = f64::from(sample_rate.max(1.0));
            self.attack = smoothing_factor(sr, self.attack_halflife);
            self.decay = smoothing_factor(sr, self.decay_halflife);
        }
    }

    /// Limit one frame in place.
    ///
    /// Non-finite frames pass through untouched and leave the follower as is,
    /// so the engine's crash checker still sees them.
    pub fn process(&mut self, sample_rate: f32, channels: &mut [f32]) {
        let peak = channels.iter().fold(0.0_f32, |m, &x| m.max(x.abs()));
        if !peak.is_finite() || channels.iter().any(|x| !x.is_finite()) {
            return;
        }
        self.update_factors(sample_rate);
        let target = f64::from(peak) / f64::from(self.ceiling);
        let k = if target > self.follower { self.attack } else { self.decay };
        self.follower = (k * self.follower + (1.0 - k) * target).max(1.0);
        for x in channels.iter_mut() {
            *x = (f64::from(*x) / self.follower) as f32;
        }
    }

    /// Two-channel convenience wrapper around [`process`](Self::process).
    #[inline]
    pub fn process_stereo(&mut self, sample_rate: f32, left: &mut f32, right: &mut f32) {
        let mut frame = [*left, *right];
        self.process(sample_rate, &mut frame);
        *left = frame[0];
        *right = frame[1];
    }
}

fn sanitize_halflife(seconds: f64) -> f64 {
    if seconds.is_finite() && seconds > 0.0 { seconds } else { 0.0 }
}

/// Per-sample retention for a half-life; 0 when the half-life is 0.
fn smoothing_factor(sample_rate: f64, halflife: f64) -> f64 {
    if halflife > 0.0 {
        one_half_to_power(1.0 / (sample_rate * halflife))
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::StagedFilter;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const SR: f32 = 44_100.0;

    #[test]
    fn quiet_signal_is_untouched() {
        let mut agc = AutomaticGainLimiter::new();
        let mut frame = [0.5, -0.9];
        agc.process(SR, &mut frame);
        assert_eq!(frame, [0.5, -0.9]);
        assert_eq!(agc.follower(), 1.0);
    }

    #[test]
    fn pulses_are_held_at_ceiling() {
        let mut agc = AutomaticGainLimiter::new();
        agc.set_ceiling(1.0);
        let period = (SR as usize) / 40;
        for n in 0..(5 * SR as usize) {
            let x = if n % period == 0 { 10.0 } else { 0.0 };
            let (mut l, mut r) = (x, x);
            agc.process_stereo(SR, &mut l, &mut r);
            assert!(l.abs() <= 1.0 + 1e-6 && r.abs() <= 1.0 + 1e-6, "n={n} l={l}");
            if n % period == 0 {
                assert_relative_eq!(agc.follower(), 10.0, max_relative = 1e-6);
            }
        }
        assert!(agc.follower() >= 1.0);
    }

    #[test]
    fn filtered_noise_never_exceeds_ceiling() {
        let mut rng = StdRng::seed_from_u64(0x539a_0c27);
        let mut lo = StagedFilter::<f32, 3>::new();
        let mut hi = StagedFilter::<f32, 3>::new();
        lo.set_cutoff_frequency(1000.0);
        hi.set_cutoff_frequency(20.0);
        let mut agc = AutomaticGainLimiter::new();
        agc.set_ceiling(0.8);
        let mut max_out = 0.0_f32;
        for _ in 0..(2 * SR as usize) {
            let s: f32 = rng.gen_range(-1.0..1.0);
            let s = 25.0 * hi.update_hi_pass(lo.update_lo_pass(s, SR), SR);
            let mut frame = [s, -0.5 * s];
            agc.process(SR, &mut frame);
            max_out = max_out.max(frame[0].abs()).max(frame[1].abs());
            assert!(agc.follower() >= 1.0);
        }
        assert!(max_out <= 0.8 * (1.0 + 1e-6), "max_out={max_out}");
        assert!(max_out > 0.5, "limiter should not crush the signal: {max_out}");
    }

    #[test]
    fn follower_releases_toward_unity() {
        let mut agc = AutomaticGainLimiter::new();
        let mut frame = [4.0];
        agc.process(SR, &mut frame);
        assert_relative_eq!(agc.follower(), 4.0);
        for _ in 0..(SR as usize) {
            let mut silent = [0.0];
            agc.process(SR, &mut silent);
        }
        // ten half-lives later
        assert!(agc.follower() - 1.0 < 3.0 * 2.0e-3, "follower={}", agc.follower());
        agc.initialize();
        assert_eq!(agc.follower(), 1.0);
    }

    #[test]
    fn smoothed_attack_settles_near_ceiling() {
        let mut agc = AutomaticGainLimiter::with_halflives(5.0, 0.01, 1.0);
        let mut right = 0.0_f32;
        let mut settled_peak = 0.0_f32;
        for i in 0..44_100 {
            right = (10.0 * (f64::from(i) / 44_100.0 * 440.0 * std::f64::consts::TAU).cos()) as f32;
            let mut left = 0.0;
            agc.process_stereo(SR, &mut left, &mut right);
            if i >= 22_050 {
                settled_peak = settled_peak.max(right.abs());
            }
        }
        // 10 V of 440 Hz against a 5 V ceiling, one second in.
        assert_abs_diff_eq!(right, 5.152_809, epsilon = 1.0e-3);
        assert!(settled_peak <= 5.0 * 1.084, "settled_peak={settled_peak}");
        assert!(settled_peak > 5.0, "a smoothed attack lets peaks through");
        assert_abs_diff_eq!(agc.follower(), 1.937, epsilon = 1.0e-2);
    }

    #[test]
    fn attack_halflife_delays_the_follower() {
        let mut agc = AutomaticGainLimiter::with_halflives(1.0, 0.01, 1.0);
        let mut frame = [4.0];
        agc.process(SR, &mut frame);
        assert!(agc.follower() > 1.0 && agc.follower() < 1.1, "follower={}", agc.follower());
        assert!(frame[0] > 3.5);

        // one attack half-life of steady 4 V closes half the gap
        for _ in 1..441 {
            let mut frame = [4.0];
            agc.process(SR, &mut frame);
        }
        assert_abs_diff_eq!(agc.follower(), 2.5, epsilon = 1.0e-2);

        agc.set_attack_halflife(-1.0);
        assert_eq!(agc.attack_halflife(), 0.0);
        let mut frame = [8.0];
        agc.process(SR, &mut frame);
        assert_relative_eq!(agc.follower(), 8.0);
        assert_relative_eq!(frame[0], 1.0);
    }

    #[test]
    fn nonsense_ceiling_is_guarded() {
        let mut agc = AutomaticGainLimiter::new();
        agc.set_ceiling(-5.0);
        assert_eq!(agc.ceiling(), AGC_MIN_CEILING);
        agc.set_ceiling(f32::NAN);
        assert_eq!(agc.ceiling(), 1.0);
    }

    #[test]
    fn non_finite_frame_passes_through() {
        let mut agc = AutomaticGainLimiter::new();
        let mut frame = [f32::NAN, 3.0];
        agc.process(SR, &mut frame);
        assert!(frame[0].is_nan());
        assert_eq!(frame[1], 3.0);
        assert_eq!(agc.follower(), 1.0);
    }
}
