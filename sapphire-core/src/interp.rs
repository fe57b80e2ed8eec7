//! Fractional-delay reads from a [`DelayLine`] with a Hann-windowed sinc kernel.
//!
//! The kernel spans `2 · INTERPOLATOR_STEPS` taps around the requested delay.
//! Weights depend only on the delay, so they are computed once in
//! [`Interpolator::set_delay`] and reused on every sample.

use core::f32::consts::PI;
use core::ops::{Add, Mul};

use crate::delay::DelayLine;

/// Kernel radius in samples.
pub const INTERPOLATOR_STEPS: usize = 5;

const TAPS: usize = 2 * INTERPOLATOR_STEPS;

/// Anything a delay line can carry and the kernel can weight.
pub trait Tap: Copy + Default + Add<Output = Self> + Mul<f32, Output = Self> {}

impl<T> Tap for T where T: Copy + Default + Add<Output = T> + Mul<f32, Output = T> {}

#[derive(Copy, Clone, Debug)]
pub struct Interpolator {
    whole: usize,
    exact: bool,
    weights: [f32; TAPS],
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpolator {
    pub fn new() -> Self {
        Self { whole: INTERPOLATOR_STEPS, exact: true, weights: [0.0; TAPS] }
    }

    /// Smallest delay that keeps every tap in front of the write cursor.
    #[inline]
    pub const fn min_delay() -> f32 {
        (INTERPOLATOR_STEPS - 1) as f32
    }

    /// Largest delay a line of `len` samples supports.
    #[inline]
    pub fn max_delay(len: usize) -> f32 {
        len.saturating_sub(INTERPOLATOR_STEPS + 1) as f32
    }

    /// Prepare weights for reading `delay` samples back from a line of `len`.
    ///
    /// The delay is clamped so that the kernel never wraps.
    pub fn set_delay(&mut self, delay: f32, len: usize) {
        let hi = Self::max_delay(len).max(Self::min_delay());
        let d = if delay.is_finite() { delay.clamp(Self::min_delay(), hi) } else { Self::min_delay() };
        let n = d.floor();
        let f = d - n;
        self.whole = n as usize;
        self.exact = f < 1.0e-6;
        if self.exact {
            return;
        }
        let sp = (PI * f).sin();
        let radius = (INTERPOLATOR_STEPS + 1) as f32;
        for (i, w) in self.weights.iter_mut().enumerate() {
            let k = i as f32 - (INTERPOLATOR_STEPS - 1) as f32;
            let t = k - f;
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            // sin(π(k − f)) = (−1)^(k+1)·sin(πf); k starts at −(STEPS−1), which is even
            let sinc = -sign * sp / (PI * t);
            let window = 0.5 * (1.0 + (PI * t / radius).cos());
            *w = sinc * window;
        }
    }

    pub fn read<T: Tap>(&self, line: &DelayLine<T>) -> T {
        if self.exact {
            return line.read(self.whole);
        }
        let first = self.whole + 1 - INTERPOLATOR_STEPS;
        let mut sum = T::default();
        for (i, &w) in self.weights.iter().enumerate() {
            sum = sum + line.read(first + i) * w;
        }
        sum
    }
}
