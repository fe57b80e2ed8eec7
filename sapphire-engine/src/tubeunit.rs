//! Tube Unit: a complex-valued waveguide resonator with a piston bypass valve.
//!
//! Two delay lines carry pressure waves between the breech (closed end) and
//! the bell (open end). One round trip lasts `sample_rate / (2·f)` samples:
//! the inbound line holds the whole-sample half, the outbound line holds the
//! rest and is read through a windowed-sinc [`Interpolator`].
//!
//! Per sample:
//! 1. bell  = interpolated outbound tail, DC-rejected
//! 2. breech = inbound tail
//! 3. a spring-loaded piston moves under `mouth − breech`; while it sits inside
//!    the bypass aperture, a flow proportional to that difference leaks through
//! 4. outbound ← breech + bypass + input
//! 5. inbound ← −reflection · bell
//!
//! The left/right channels are the real/imaginary parts of the complex signal.

use log::{debug, warn};
use sapphire_core::prelude::*;

use crate::crash::CrashRecoverable;
use crate::error::{check_sample_rate, EngineResult};
use crate::graph::StereoEngine;

pub const TUBE_STEPS: usize = INTERPOLATOR_STEPS;
pub const TUBE_FILTER_LAYERS: usize = 3;
pub const TUBE_DC_REJECT_HZ: f32 = 20.0;
pub const TUBE_LOWPASS_HZ: f32 = 5000.0;
pub const TUBE_MIN_FREQUENCY: f32 = 4.0;

/// Default root, in octaves above [`TUBE_MIN_FREQUENCY`].
pub const TUBE_DEFAULT_ROOT_OCTAVE: f32 = 2.727_924_8;

pub const PISTON_MASS: f32 = 1.0e-5;
pub const PISTON_MIN_POSITION: f32 = 0.0;
pub const PISTON_MAX_POSITION: f32 = 10.0;

/// Delay-line split for one root frequency.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TubeGeometry {
    /// Samples per round trip, at least `2·(TUBE_STEPS + 1)`.
    pub round_trip: f32,
    pub inbound_len: usize,
    pub outbound_len: usize,
    /// Fractional samples the outbound leg contributes.
    pub outbound_delay: f32,
}

impl TubeGeometry {
    pub fn new(sample_rate: f32, frequency: f32) -> Self {
        let floor = (2 * (TUBE_STEPS + 1)) as f32;
        let raw = sample_rate / (2.0 * frequency);
        let round_trip = if raw.is_finite() { raw.max(floor) } else { floor };
        let inbound_len = (round_trip / 2.0).floor() as usize;
        let outbound_delay = round_trip - inbound_len as f32;
        let outbound_len = outbound_delay.ceil() as usize + TUBE_STEPS + 1;
        Self { round_trip, inbound_len, outbound_len, outbound_delay }
    }
}

/// Samples per round trip at `frequency`, without the engine's range clamp.
pub fn round_trip_samples(sample_rate: f32, frequency: f32) -> f32 {
    TubeGeometry::new(sample_rate, frequency).round_trip
}

/// Delay-line storage needed to reach the lowest root at `sample_rate`.
pub fn tube_capacity(sample_rate: f32) -> usize {
    (sample_rate / (2.0 * TUBE_MIN_FREQUENCY)).ceil() as usize + 2 * TUBE_STEPS + 2
}

#[derive(Clone, Debug)]
pub struct TubeUnitEngine {
    sample_rate: f32,
    geometry: TubeGeometry,
    outbound: DelayLine<Complex>,
    inbound: DelayLine<Complex>,
    bell_reader: Interpolator,
    dc_reject: [StagedFilter<f32, TUBE_FILTER_LAYERS>; 2],
    lowpass: [StagedFilter<f32, TUBE_FILTER_LAYERS>; 2],
    agc: AutomaticGainLimiter,
    enable_agc: bool,
    quiet: bool,
    piston_pos: Complex,
    piston_vel: Complex,

    airflow: f32,
    vortex: f32,
    bypass_width: f32,
    bypass_center: f32,
    reflection_decay: f32,
    reflection_angle: f32,
    root_frequency: f32,
    spring_constant: f32,
    gain: f32,
    reflection: Complex,
}

impl TubeUnitEngine {
    pub fn new(sample_rate: f32) -> EngineResult<Self> {
        let sample_rate = check_sample_rate(sample_rate)?;
        let capacity = tube_capacity(sample_rate);
        let mut engine = Self {
            sample_rate,
            geometry: TubeGeometry::new(sample_rate, TUBE_MIN_FREQUENCY),
            outbound: DelayLine::new(capacity)?,
            inbound: DelayLine::new(capacity)?,
            bell_reader: Interpolator::new(),
            dc_reject: [StagedFilter::new(); 2],
            lowpass: [StagedFilter::new(); 2],
            agc: AutomaticGainLimiter::new(),
            enable_agc: false,
            quiet: false,
            piston_pos: Complex::zero(),
            piston_vel: Complex::zero(),
            airflow: 0.0,
            vortex: 0.0,
            bypass_width: 0.0,
            bypass_center: 0.0,
            reflection_decay: 0.0,
            reflection_angle: 0.0,
            root_frequency: TUBE_MIN_FREQUENCY,
            spring_constant: 0.0,
            gain: 0.0,
            reflection: Complex::zero(),
        };
        engine.initialize();
        Ok(engine)
    }

    /// Restore default parameters and silence the tube.
    pub fn initialize(&mut self) {
        debug!("tube unit: initialize at {} Hz", self.sample_rate);
        self.airflow = 1.0;
        self.vortex = 0.0;
        self.bypass_width = 6.0;
        self.bypass_center = 5.0;
        self.reflection_decay = 0.5;
        self.reflection_angle = 0.1;
        self.spring_constant = 0.5;
        self.gain = 1.0;
        self.quiet = false;
        for f in &mut self.dc_reject {
            f.set_cutoff_frequency(TUBE_DC_REJECT_HZ);
        }
        for f in &mut self.lowpass {
            f.set_cutoff_frequency(TUBE_LOWPASS_HZ);
        }
        self.agc.set_ceiling(1.0);
        self.enable_agc = false;
        self.set_agc_enabled(true);
        self.set_root_frequency(TUBE_MIN_FREQUENCY * two_to_power(TUBE_DEFAULT_ROOT_OCTAVE));
        self.reset_state();
    }

    /// Clear delay lines, filters, AGC and the piston. Parameters are kept.
    pub fn reset_state(&mut self) {
        self.outbound.clear();
        self.inbound.clear();
        for f in self.dc_reject.iter_mut().chain(self.lowpass.iter_mut()) {
            f.reset();
        }
        self.agc.initialize();
        self.piston_pos = Complex::zero();
        self.piston_vel = Complex::zero();
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Reallocate the delay lines for a new rate. History is lost.
    pub fn set_sample_rate(&mut self, sample_rate: f32) -> EngineResult<()> {
        let sample_rate = check_sample_rate(sample_rate)?;
        if sample_rate == self.sample_rate {
            return Ok(());
        }
        debug!("tube unit: sample rate {} -> {} Hz", self.sample_rate, sample_rate);
        self.sample_rate = sample_rate;
        let capacity = tube_capacity(sample_rate);
        self.outbound.reserve(capacity)?;
        self.inbound.reserve(capacity)?;
        self.set_root_frequency(self.root_frequency);
        self.reset_state();
        Ok(())
    }

    pub fn geometry(&self) -> TubeGeometry {
        self.geometry
    }

    pub fn root_frequency(&self) -> f32 {
        self.root_frequency
    }

    /// Clamped to `[4, sample_rate / 24]` Hz.
    pub fn set_root_frequency(&mut self, hz: f32) {
        let hi = (self.sample_rate / 24.0).max(TUBE_MIN_FREQUENCY);
        self.root_frequency = if hz.is_finite() { hz.clamp(TUBE_MIN_FREQUENCY, hi) } else { TUBE_MIN_FREQUENCY };
        self.geometry = TubeGeometry::new(self.sample_rate, self.root_frequency);
        self.inbound.set_len(self.geometry.inbound_len);
        self.outbound.set_len(self.geometry.outbound_len);
        self.bell_reader.set_delay(self.geometry.outbound_delay - 1.0, self.outbound.len());
        self.update_reflection();
    }

    /// Mouth pressure, `[0, 5]`.
    pub fn set_airflow(&mut self, airflow: f32) {
        self.airflow = clamp(airflow, 0.0, 5.0);
    }

    /// Rotation of the piston force, `[0, 1]` → `[0, π/4]`.
    pub fn set_vortex(&mut self, vortex: f32) {
        self.vortex = clamp(vortex, 0.0, 1.0);
    }

    pub fn set_bypass_width(&mut self, width: f32) {
        self.bypass_width = clamp(width, 0.5, 20.0);
    }

    pub fn set_bypass_center(&mut self, center: f32) {
        self.bypass_center = clamp(center, -10.0, 10.0);
    }

    /// `[0, 1]` → half-life `0.01 · 100^d` seconds.
    pub fn set_reflection_decay(&mut self, decay: f32) {
        self.reflection_decay = clamp(decay, 0.0, 1.0);
        self.update_reflection();
    }

    /// `[0, 1]` → phase `π·a`.
    pub fn set_reflection_angle(&mut self, angle: f32) {
        self.reflection_angle = clamp(angle, 0.0, 1.0);
        self.update_reflection();
    }

    pub fn set_spring_constant(&mut self, k: f32) {
        self.spring_constant = clamp(k, 0.005, 50.0);
    }

    /// `[0, 2]` → `s^4`.
    pub fn set_gain(&mut self, slider: f32) {
        self.gain = clamp(slider, 0.0, 2.0).powi(4);
    }

    /// Close the mouth: no airflow, no external input. Delay-line history survives.
    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn agc_enabled(&self) -> bool {
        self.enable_agc
    }

    pub fn set_agc_enabled(&mut self, enable: bool) {
        if enable && !self.enable_agc {
            self.agc.initialize();
        }
        self.enable_agc = enable;
    }

    pub fn set_agc_level(&mut self, level: f32) {
        self.agc.set_ceiling(level / 5.0);
    }

    pub fn agc_distortion(&self) -> f32 {
        if self.enable_agc { self.agc.follower() - 1.0 } else { 0.0 }
    }

    pub fn piston_position(&self) -> Complex {
        self.piston_pos
    }

    fn update_reflection(&mut self) {
        let halflife = 0.01 * 100.0_f32.powf(self.reflection_decay);
        let magnitude = one_half_to_power(1.0 / f64::from(self.root_frequency * halflife)) as f32;
        self.reflection = Complex::from_polar(magnitude, core::f32::consts::PI * self.reflection_angle);
    }

    fn move_piston(&mut self, dp: Complex) {
        let dt = 1.0 / self.sample_rate;
        let twist = Complex::from_polar(1.0, self.vortex * core::f32::consts::FRAC_PI_4);
        let force = (dp - self.spring_constant * self.piston_pos) * twist;
        self.piston_vel += force * (dt / PISTON_MASS);
        self.piston_pos += self.piston_vel * dt;
        if self.piston_pos.re < PISTON_MIN_POSITION {
            self.piston_pos.re = PISTON_MIN_POSITION;
            self.piston_vel = Complex::zero();
        } else if self.piston_pos.re > PISTON_MAX_POSITION {
            self.piston_pos.re = PISTON_MAX_POSITION;
            self.piston_vel = Complex::zero();
        }
        // sideways travel is stopped symmetrically
        if self.piston_pos.im.abs() > PISTON_MAX_POSITION {
            self.piston_pos.im = self.piston_pos.im.clamp(-PISTON_MAX_POSITION, PISTON_MAX_POSITION);
            self.piston_vel.im = 0.0;
        }
    }

    pub fn process(&mut self, left_in: f32, right_in: f32) -> (f32, f32) {
        let sr = self.sample_rate;
        let raw_bell = self.bell_reader.read(&self.outbound);
        let bell = Complex::new(
            self.dc_reject[0].update_hi_pass(raw_bell.re, sr),
            self.dc_reject[1].update_hi_pass(raw_bell.im, sr),
        );
        let breech = self.inbound.read(self.geometry.inbound_len - 1);
        let mouth = if self.quiet { Complex::zero() } else { Complex::new(self.airflow, 0.0) };

        let dp = mouth - breech;
        let opening = self.bypass_center - self.bypass_width / 2.0;
        let gate = clamp((self.piston_pos.re - opening) / self.bypass_width, 0.0, 1.0);
        let bypass = gate * dp;
        self.move_piston(dp);

        let mut signal = breech + bypass;
        if !self.quiet {
            signal += Complex::new(left_in, right_in);
        }
        self.outbound.write(signal);
        self.inbound.write(-(self.reflection * bell));

        let mut left = self.gain * self.lowpass[0].update_lo_pass(bell.re, sr);
        let mut right = self.gain * self.lowpass[1].update_lo_pass(bell.im, sr);
        if self.enable_agc {
            self.agc.process_stereo(sr, &mut left, &mut right);
        }
        (left, right)
    }
}

impl CrashRecoverable for TubeUnitEngine {
    fn is_finite(&self) -> bool {
        self.piston_pos.is_finite()
            && self.piston_vel.is_finite()
            && (0..self.outbound.len()).all(|k| self.outbound.read(k).is_finite())
            && (0..self.inbound.len()).all(|k| self.inbound.read(k).is_finite())
    }

    fn recover(&mut self) {
        self.reset_state();
    }
}

const TUBE_PARAMS: &[&str] = &[
    "airflow",
    "vortex",
    "bypass_width",
    "bypass_center",
    "decay",
    "angle",
    "root",
    "spring",
    "gain",
    "quiet",
    "agc",
    "agc_level",
];

impl StereoEngine for TubeUnitEngine {
    fn initialize(&mut self) {
        TubeUnitEngine::initialize(self);
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if let Err(e) = TubeUnitEngine::set_sample_rate(self, sample_rate) {
            warn!("tube unit: {e}");
        }
    }

    fn process(&mut self, sample_rate: f32, input: [f32; 2]) -> [f32; 2] {
        if sample_rate != self.sample_rate {
            StereoEngine::set_sample_rate(self, sample_rate);
        }
        let (l, r) = TubeUnitEngine::process(self, input[0], input[1]);
        [l, r]
    }

    fn param_names(&self) -> &'static [&'static str] {
        TUBE_PARAMS
    }

    fn set_param(&mut self, name: &str, value: f32) -> bool {
        match name {
            "airflow" => self.set_airflow(value),
            "vortex" => self.set_vortex(value),
            "bypass_width" => self.set_bypass_width(value),
            "bypass_center" => self.set_bypass_center(value),
            "decay" => self.set_reflection_decay(value),
            "angle" => self.set_reflection_angle(value),
            "root" => self.set_root_frequency(value),
            "spring" => self.set_spring_constant(value),
            "gain" => self.set_gain(value),
            "quiet" => self.set_quiet(value >= 0.5),
            "agc" => self.set_agc_enabled(value >= 0.5),
            "agc_level" => self.set_agc_level(value),
            _ => return false,
        }
        true
    }

    fn agc_distortion(&self) -> f32 {
        TubeUnitEngine::agc_distortion(self)
    }

    fn crash_recoverable(&mut self) -> Option<&mut dyn CrashRecoverable> {
        Some(self)
    }
}
