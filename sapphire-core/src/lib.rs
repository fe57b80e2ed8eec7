//! Sapphire Core: numerics and DSP primitives shared by the physics engines.
//!
//! Features
//! - `fast-math`: polynomial `2^x` for the friction and AGC decay factors
//!
//! Modules
//! - [`dsp`]      : math helpers, power functions, slider mappings
//! - [`vector`]   : `PhysicsVector`, the 3D double-precision state vector
//! - [`complex`]  : `Complex`, the two-component pair used by waveguides
//! - [`limiter`]  : bicubic limiter and effective velocity
//! - [`filters`]  : cascaded one-pole low/high-pass filters
//! - [`agc`]      : automatic gain limiter
//! - [`slewer`]   : linear on/off ramp for click-free power toggling
//! - [`delay`]    : fixed-capacity circular delay line
//! - [`interp`]   : windowed-sinc fractional delay reader
//!
//! Design
//! - Buffers are sized at construction; nothing allocates per sample
//! - Setup failures are reported as [`CoreError`]

pub mod agc;
pub mod complex;
pub mod delay;
pub mod dsp;
pub mod error;
pub mod filters;
pub mod interp;
pub mod limiter;
pub mod slewer;
pub mod vector;

pub use error::CoreError;

/// Commonly used types/functions for convenience:
pub mod prelude {
    pub use crate::agc::AutomaticGainLimiter;
    pub use crate::complex::Complex;
    pub use crate::delay::DelayLine;
    pub use crate::dsp::{
        clamp, one_half_to_power, ten_to_power, two_to_power,
        SliderMapping, SliderScale,
    };
    pub use crate::filters::{LoHiPassFilter, StagedFilter};
    pub use crate::interp::{Interpolator, INTERPOLATOR_STEPS};
    pub use crate::limiter::{bicubic_limiter, effective_velocity};
    pub use crate::slewer::Slewer;
    pub use crate::vector::PhysicsVector;
    pub use crate::CoreError;
}
