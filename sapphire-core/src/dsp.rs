//! Generic math helpers used across the engines.
//!
//! Conventions:
//! - Simulation math is `f64`, audio-rate math is `f32`.
//! - All functions are `#[inline]` where useful to help the optimizer.
//! - Argument and return domains are documented per function.
//!
//! Features used by this file:
//! - `fast-math` : enables a polynomial `2^x` in [`one_half_to_power`]

#![allow(clippy::excessive_precision)]

use cfg_if::cfg_if;

// --------------------------------- Utilities -------------------------------------

/// Clamp `x` into `[lo, hi]`.
#[inline]
pub fn clamp(x: f32, lo: f32, hi: f32) -> f32 {
    if x < lo { lo } else if x > hi { hi } else { x }
}

// --------------------------------- Powers ----------------------------------------

/// `0.5^x`, the decay factor after `x` half-lives.
///
/// With `fast-math` the fractional part of the exponent goes through a
/// degree-4 polynomial for `2^f` (relative error below 1e-3).
#[inline]
pub fn one_half_to_power(x: f64) -> f64 {
    cfg_if! {
        if #[cfg(feature = "fast-math")] {
            let y = -x;
            if !y.is_finite() {
                return if y > 0.0 { f64::INFINITY } else { 0.0 };
            }
            let whole = y.floor();
            let f = y - whole;
            let p = 1.0 + f * (0.693_147_180_6 + f * (0.240_226_506_9 + f * (0.055_504_108_7 + f * 0.009_618_129_1)));
            // `whole` is small in practice; powi keeps the exact power of two.
            p * 2.0_f64.powi(whole as i32)
        } else {
            (-x).exp2()
        }
    }
}

/// `10^x`
#[inline]
pub fn ten_to_power(x: f32) -> f32 {
    10.0_f32.powf(x)
}

/// `2^x`
#[inline]
pub fn two_to_power(x: f32) -> f32 {
    x.exp2()
}

// --------------------------------- Slider mapping --------------------------------

/// How a [`SliderMapping`] treats its polynomial value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SliderScale {
    /// Return the polynomial value `y` as-is.
    Linear,
    /// Return `10^y`.
    Exponential,
}

/// Maps a slider position onto a polynomial, optionally exponentiated.
///
/// Coefficients are indexed by exponent: `[c0, c1, c2, ...]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SliderMapping {
    scale: SliderScale,
    polynomial: &'static [f32],
}

impl SliderMapping {
    #[inline]
    pub const fn new(scale: SliderScale, polynomial: &'static [f32]) -> Self {
        Self { scale, polynomial }
    }

    #[inline]
    pub fn evaluate(&self, x: f32) -> f32 {
        let mut y = 0.0;
        let mut xpower = 1.0;
        for &coeff in self.polynomial {
            y += coeff * xpower;
            xpower *= x;
        }
        match self.scale {
            SliderScale::Linear => y,
            SliderScale::Exponential => ten_to_power(y),
        }
    }
}

// --------------------------------- Tests -----------------------------------------
