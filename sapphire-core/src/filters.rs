//! Filters: a bilinear one-pole low/high-pass section and a cascade of them.
//!
//! Contents
//! - `LoHiPassFilter` : one section producing both low-pass and high-pass taps
//! - `StagedFilter`   : `N` sections in series, used for DC rejection and smoothing
//!
//! Notes
//! - Each section computes `c = sr / (π fc)` and
//!   `y[n] = (x[n] + x[n-1] − y[n-1]·(1 − c)) / (1 + c)`;
//!   the low-pass tap is `y`, the high-pass tap is `x − y`.
//! - `c` is cached and only recomputed when the cutoff or sample rate changes.
//! - The first sample after a reset primes the state with `x`, so the high-pass
//!   tap starts at zero instead of popping.

use num_traits::{Float, FloatConst};

/// One bilinear low/high-pass section.
#[derive(Copy, Clone, Debug)]
pub struct LoHiPassFilter<T> {
    first: bool,
    xprev: T,
    yprev: T,
    fc: T,
    // cached coefficient and the (fc, sr) it was computed for
    c: T,
    c_fc: T,
    c_sr: T,
}

impl<T: Float + FloatConst> Default for LoHiPassFilter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float + FloatConst> LoHiPassFilter<T> {
    /// Default cutoff is 20 Hz.
    pub fn new() -> Self {
        let twenty = T::from(20.0).unwrap_or_else(T::one);
        Self {
            first: true,
            xprev: T::zero(),
            yprev: T::zero(),
            fc: twenty,
            c: T::zero(),
            c_fc: T::zero(),
            c_sr: T::zero(),
        }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.first = true;
        self.xprev = T::zero();
        self.yprev = T::zero();
    }

    #[inline]
    pub fn set_cutoff_frequency(&mut self, hz: T) {
        self.fc = hz.max(T::min_positive_value());
    }

    #[inline]
    pub fn cutoff_frequency(&self) -> T {
        self.fc
    }

    /// Prime the state as if `x` had been steady forever.
    #[inline]
    pub fn snap(&mut self, x: T) {
        self.first = false;
        self.xprev = x;
        self.yprev = x;
    }

    #[inline]
    fn coefficient(&mut self, sample_rate: T) -> T {
        if self.fc != self.c_fc || sample_rate != self.c_sr {
            self.c_fc = self.fc;
            self.c_sr = sample_rate;
            self.c = sample_rate / (T::PI() * self.fc);
        }
        self.c
    }

    #[inline]
    pub fn update(&mut self, x: T, sample_rate: T) {
        if self.first {
            self.snap(x);
            return;
        }
        let c = self.coefficient(sample_rate);
        let y = (x + self.xprev - self.yprev * (T::one() - c)) / (T::one() + c);
        self.xprev = x;
        self.yprev = y;
    }

    #[inline]
    pub fn hi_pass(&self) -> T {
        self.xprev - self.yprev
    }

    #[inline]
    pub fn lo_pass(&self) -> T {
        self.yprev
    }
}

/// `N` one-pole sections in series.
#[derive(Copy, Clone, Debug)]
pub struct StagedFilter<T, const N: usize> {
    stages: [LoHiPassFilter<T>; N],
}

impl<T: Float + FloatConst, const N: usize> Default for StagedFilter<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float + FloatConst, const N: usize> StagedFilter<T, N> {
    pub fn new() -> Self {
        Self { stages: [LoHiPassFilter::new(); N] }
    }

    pub fn reset(&mut self) {
        for s in &mut self.stages {
            s.reset();
        }
    }

    pub fn set_cutoff_frequency(&mut self, hz: T) {
        for s in &mut self.stages {
            s.set_cutoff_frequency(hz);
        }
    }

    /// Push `x` through every section's low-pass tap.
    #[inline]
    pub fn update_lo_pass(&mut self, x: T, sample_rate: T) -> T {
        let mut y = x;
        for s in &mut self.stages {
            s.update(y, sample_rate);
            y = s.lo_pass();
        }
        y
    }

    /// Push `x` through every section's high-pass tap.
    #[inline]
    pub fn update_hi_pass(&mut self, x: T, sample_rate: T) -> T {
        let mut y = x;
        for s in &mut self.stages {
            s.update(y, sample_rate);
            y = s.hi_pass();
        }
        y
    }

    /// Prime the cascade so that a steady input `x` is already fully rejected.
    ///
    /// The first section settles on `x`; later sections see the first
    /// section's zero high-pass output and settle on zero.
    pub fn snap_hi_pass(&mut self, x: T) {
        let mut level = x;
        for s in &mut self.stages {
            s.snap(level);
            level = T::zero();
        }
    }
}

// ------------------------------------ Tests --------------------------------------
