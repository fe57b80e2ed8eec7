//! Nucleus: an N-body simulation of mutually interacting charged particles.
//!
//! Every unordered pair `(a, b)` with separation `d > 1e-4` feels
//!
//! ```text
//! f = (d − 1/d³)·Δr + (μ/d³)·((v_b − v_a) × Δr)
//! ```
//!
//! where `Δr = b.pos − a.pos`, `μ` is the magnetic coupling and the velocities
//! are bicubic-limited effective velocities. `a` receives `+f`, `b` receives `−f`.
//! An optional "aether" adds viscosity and spin to every mobile particle.
//!
//! Integration is an explicit midpoint step: forces now, half-step
//! extrapolation, forces at the midpoint, full step with those forces, then
//! friction. Steps longer than [`NUCLEUS_MAX_DT`] are split.
//!
//! Particle 0 is the input. The host writes its position every sample; the
//! engine never moves it but does include it in every force calculation.
//!
//! Outputs are the particle positions, optionally DC-rejected, scaled by the
//! caller's gain and optionally AGC-limited. Toggling DC rejection crossfades
//! between the raw and filtered signals.

use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::StandardNormal;
use sapphire_core::prelude::*;

use crate::crash::CrashRecoverable;
use crate::error::{EngineError, EngineResult};
use crate::graph::StereoEngine;
use crate::mesh::substep_count;

pub const NUCLEUS_MAX_DT: f64 = 0.0005;
pub const NUCLEUS_SPEED_LIMIT: f64 = 1000.0;
pub const NUCLEUS_PARTICLE_MASS: f64 = 1.0e-3;
pub const NUCLEUS_OVERLAP_DISTANCE: f64 = 1.0e-4;
pub const NUCLEUS_FILTER_LAYERS: usize = 3;
pub const NUCLEUS_DC_REJECT_HZ: f32 = 30.0;

/// Crossfade length at 44.1 kHz; scaled with the sample rate.
pub const NUCLEUS_CROSSFADE_SAMPLES: f32 = 2000.0;

pub const NUM_PARTICLES: usize = 5;
pub const INPUT_SCALE: f32 = 0.015;
pub const INPUT_EXPONENT: i32 = 4;
pub const OUTPUT_EXPONENT: i32 = 10;

const AETHER_SCALE: f64 = 0.01;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Particle {
    pub pos: PhysicsVector,
    pub vel: PhysicsVector,
    pub force: PhysicsVector,
    pub mass: f64,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            pos: PhysicsVector::zero(),
            vel: PhysicsVector::zero(),
            force: PhysicsVector::zero(),
            mass: NUCLEUS_PARTICLE_MASS,
        }
    }
}

impl Particle {
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.pos.is_finite() && self.vel.is_finite()
    }
}

/// Pairwise and aether force parameters.
#[derive(Copy, Clone, Debug)]
struct Interaction {
    coupling: f64,
    speed_limit: f64,
    visc: f64,
    spin: f64,
}

impl Interaction {
    fn calculate_forces(&self, array: &mut [Particle]) {
        let limit_sq = NUCLEUS_OVERLAP_DISTANCE * NUCLEUS_OVERLAP_DISTANCE;
        let z = PhysicsVector::new(0.0, 0.0, 1.0);

        for (i, p) in array.iter_mut().enumerate() {
            p.force = if i == 0 || (self.visc == 0.0 && self.spin == 0.0) {
                PhysicsVector::zero()
            } else {
                let v = effective_velocity(p.vel, self.speed_limit);
                (-self.visc * AETHER_SCALE) * v + (self.spin * AETHER_SCALE) * v.cross(z)
            };
        }

        let n = array.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (array[i], array[j]);
                let dr = b.pos - a.pos;
                let dist2 = dr.quadrature();
                if dist2 <= limit_sq {
                    continue;
                }
                let dist = dist2.sqrt();
                let dist3 = dist2 * dist;
                let av = effective_velocity(a.vel, self.speed_limit);
                let bv = effective_velocity(b.vel, self.speed_limit);
                let f = (dist - 1.0 / dist3) * dr + (self.coupling / dist3) * (bv - av).cross(dr);
                array[i].force += f;
                array[j].force -= f;
            }
        }
    }
}

/// `curr → next` over `dt`, using the forces stored in `curr`. Particle 0 is copied.
fn extrapolate(dt: f64, speed_limit: f64, curr: &[Particle], next: &mut [Particle]) {
    for (i, (p1, p2)) in curr.iter().zip(next.iter_mut()).enumerate() {
        if i == 0 {
            *p2 = *p1;
            continue;
        }
        let dv = (dt / p1.mass) * p1.force;
        let v2 = p1.vel + 0.5 * dv;
        p2.pos = p1.pos + dt * effective_velocity(v2, speed_limit);
        p2.vel = p1.vel + dv;
        p2.mass = p1.mass;
    }
}

#[derive(Clone, Debug)]
pub struct NucleusEngine {
    curr: Vec<Particle>,
    next: Vec<Particle>,
    interaction: Interaction,
    fixed_oversample: Option<u32>,
    output: Vec<f32>,
    filters: Vec<StagedFilter<f32, NUCLEUS_FILTER_LAYERS>>,
    dc_reject: bool,
    crossfade: u32,
    crossfade_limit: u32,
    crossfade_sr: f32,
    agc: AutomaticGainLimiter,
    enable_agc: bool,
}

impl NucleusEngine {
    pub fn new(num_particles: usize) -> EngineResult<Self> {
        if num_particles < 2 {
            return Err(EngineError::ParticleCount(num_particles));
        }
        let mut engine = Self {
            curr: vec![Particle::default(); num_particles],
            next: vec![Particle::default(); num_particles],
            interaction: Interaction { coupling: 0.0, speed_limit: NUCLEUS_SPEED_LIMIT, visc: 0.0, spin: 0.0 },
            fixed_oversample: None,
            output: vec![0.0; 3 * num_particles],
            filters: vec![StagedFilter::new(); 3 * num_particles],
            dc_reject: false,
            crossfade: 0,
            crossfade_limit: 1,
            crossfade_sr: 0.0,
            agc: AutomaticGainLimiter::new(),
            enable_agc: false,
        };
        engine.initialize();
        Ok(engine)
    }

    /// Default parameters, zeroed outputs and filters. Particle state is kept.
    pub fn initialize(&mut self) {
        debug!("nucleus: initialize ({} particles)", self.curr.len());
        self.interaction = Interaction { coupling: 0.0, speed_limit: NUCLEUS_SPEED_LIMIT, visc: 0.0, spin: 0.0 };
        self.fixed_oversample = None;
        self.set_dc_reject_frequency(NUCLEUS_DC_REJECT_HZ);
        self.dc_reject = false;
        self.agc.set_ceiling(1.0);
        self.enable_agc = false;
        self.set_agc_enabled(true);
        self.reset_after_crash();
    }

    /// Zero the outputs and forget filter and AGC history.
    ///
    /// Particle positions and velocities are the caller's business; see
    /// [`set_minimum_energy`].
    pub fn reset_after_crash(&mut self) {
        self.output.fill(0.0);
        for f in &mut self.filters {
            f.reset();
        }
        self.crossfade = 0;
        self.agc.initialize();
    }

    pub fn num_particles(&self) -> usize {
        self.curr.len()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.curr
    }

    /// # Panics
    /// If `index` is out of range.
    pub fn particle(&self, index: usize) -> &Particle {
        &self.curr[index]
    }

    /// # Panics
    /// If `index` is out of range.
    pub fn particle_mut(&mut self, index: usize) -> &mut Particle {
        &mut self.curr[index]
    }

    /// Output of the last update for one particle axis.
    ///
    /// # Panics
    /// If `particle` or `axis` is out of range.
    pub fn output(&self, particle: usize, axis: usize) -> f32 {
        assert!(axis < 3, "axis {axis} out of range");
        self.output[3 * particle + axis]
    }

    pub fn output_vector(&self, particle: usize) -> [f32; 3] {
        [self.output(particle, 0), self.output(particle, 1), self.output(particle, 2)]
    }

    pub fn magnetic_coupling(&self) -> f64 {
        self.interaction.coupling
    }

    pub fn set_magnetic_coupling(&mut self, coupling: f64) {
        self.interaction.coupling = coupling;
    }

    /// `[0, 1]`, default 0.
    pub fn set_aether_visc(&mut self, visc: f64) {
        self.interaction.visc = visc.clamp(0.0, 1.0);
    }

    /// `[-1, 1]`, default 0.
    pub fn set_aether_spin(&mut self, spin: f64) {
        self.interaction.spin = spin.clamp(-1.0, 1.0);
    }

    pub fn speed_limit(&self) -> f64 {
        self.interaction.speed_limit
    }

    /// `None` picks `ceil(dt / max_dt)` substeps; `Some(n)` always uses `n ≥ 1`.
    pub fn set_fixed_oversample(&mut self, factor: Option<u32>) {
        self.fixed_oversample = factor.map(|n| n.max(1));
    }

    pub fn dc_reject_enabled(&self) -> bool {
        self.dc_reject
    }

    pub fn set_dc_reject_enabled(&mut self, enable: bool) {
        self.dc_reject = enable;
    }

    pub fn set_dc_reject_frequency(&mut self, hz: f32) {
        for f in &mut self.filters {
            f.set_cutoff_frequency(hz);
        }
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

    /// Ceiling in volts; ±5 V is unit level.
    pub fn set_agc_level(&mut self, level: f32) {
        self.agc.set_ceiling(level / 5.0);
    }

    pub fn agc_distortion(&self) -> f32 {
        if self.enable_agc { self.agc.follower() - 1.0 } else { 0.0 }
    }

    /// Advance by `dt` seconds of simulated time and refresh the outputs.
    ///
    /// Returns false if any output is not finite.
    pub fn update(&mut self, dt: f64, halflife: f64, sample_rate: f32, gain: f32) -> bool {
        let n = match self.fixed_oversample {
            Some(n) => n,
            None => substep_count(dt, NUCLEUS_MAX_DT) as u32,
        };
        let et = dt / f64::from(n);
        let friction = if halflife > 0.0 { one_half_to_power(et / halflife) } else { 1.0 };
        for _ in 0..n {
            self.step(et, friction);
        }
        self.refresh_outputs(sample_rate, gain);
        self.output.iter().all(|x| x.is_finite())
    }

    fn step(&mut self, dt: f64, friction: f64) {
        let law = self.interaction;
        law.calculate_forces(&mut self.curr);
        extrapolate(dt / 2.0, law.speed_limit, &self.curr, &mut self.next);
        law.calculate_forces(&mut self.next);
        for (c, m) in self.curr.iter_mut().zip(&self.next) {
            c.force = m.force;
        }
        extrapolate(dt, law.speed_limit, &self.curr, &mut self.next);
        for (i, (c, m)) in self.curr.iter_mut().zip(&self.next).enumerate() {
            *c = *m;
            if i > 0 {
                c.vel *= friction;
            }
        }
    }

    fn refresh_outputs(&mut self, sample_rate: f32, gain: f32) {
        if sample_rate != self.crossfade_sr {
            self.crossfade_sr = sample_rate;
            let scaled = (NUCLEUS_CROSSFADE_SAMPLES * sample_rate / 44_100.0).round();
            self.crossfade_limit = if scaled.is_finite() { (scaled as u32).max(1) } else { 1 };
            self.crossfade = self.crossfade.min(self.crossfade_limit);
        }

        if self.dc_reject {
            if self.crossfade == 0 {
                for (p, chunk) in self.curr.iter().zip(self.filters.chunks_mut(3)) {
                    for (k, f) in chunk.iter_mut().enumerate() {
                        f.reset();
                        f.snap_hi_pass(p.pos[k] as f32);
                    }
                }
            }
            if self.crossfade < self.crossfade_limit {
                self.crossfade += 1;
            }
        } else if self.crossfade > 0 {
            self.crossfade -= 1;
        }

        let mix = self.crossfade as f32 / self.crossfade_limit as f32;
        for (i, p) in self.curr.iter().enumerate() {
            for k in 0..3 {
                let raw = p.pos[k] as f32;
                let y = if self.crossfade > 0 {
                    let filtered = self.filters[3 * i + k].update_hi_pass(raw, sample_rate);
                    (1.0 - mix) * raw + mix * filtered
                } else {
                    raw
                };
                self.output[3 * i + k] = gain * y;
            }
        }

        if self.enable_agc {
            // particle 0 echoes the input, so it stays out of the limiter
            self.agc.process(sample_rate, &mut self.output[3..]);
        }
    }
}

impl CrashRecoverable for NucleusEngine {
    fn is_finite(&self) -> bool {
        self.curr.iter().all(Particle::is_finite) && self.output.iter().all(|x| x.is_finite())
    }

    fn recover(&mut self) {
        self.reset_after_crash();
        set_minimum_energy(self);
    }
}

// ------------------------------- Minimum energy ----------------------------------

/// Equilibrium of 5 particles with particle 0 at the origin.
const MINIMUM_ENERGY_5: [[f64; 3]; 4] = [
    [0.830_169_504_077_714_7, -0.603_227_958_425_492_2, -0.387_024_715_665_196_3],
    [0.018_724_401_841_196_92, -0.882_611_821_823_623_7, -0.138_146_728_143_481],
    [-0.107_693_482_154_634_5, -0.534_779_690_097_375_9, -0.951_454_834_883_293_7],
    [0.462_926_279_441_104_4, 0.123_940_056_141_652_6, -0.754_172_972_222_019_4],
];

/// Put the particles into a low-energy configuration at rest.
///
/// Five-particle engines get the precomputed equilibrium. Other sizes get a
/// unit ring around the origin, which is finite and calm enough to restart from.
pub fn set_minimum_energy(engine: &mut NucleusEngine) {
    let n = engine.num_particles();
    for (i, p) in engine.curr.iter_mut().enumerate() {
        p.vel = PhysicsVector::zero();
        p.force = PhysicsVector::zero();
        p.pos = if i == 0 {
            PhysicsVector::zero()
        } else if n == NUM_PARTICLES {
            let [x, y, z] = MINIMUM_ENERGY_5[i - 1];
            PhysicsVector::new(x, y, z)
        } else {
            let angle = std::f64::consts::TAU * (i - 1) as f64 / (n - 1) as f64;
            PhysicsVector::new(angle.cos(), angle.sin(), 0.0)
        };
    }
}

/// Let the particles fall from a random start into equilibrium.
///
/// Particle 0 is pinned at the origin, the others start at standard-normal
/// positions drawn from `seed`. Each iteration advances one [`NUCLEUS_MAX_DT`]
/// step under heavy friction until every speed is below `tolerance`.
/// Returns the number of iterations taken.
pub fn solve_minimum_energy(
    engine: &mut NucleusEngine,
    seed: u64,
    tolerance: f64,
    max_iterations: usize,
) -> EngineResult<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    for (i, p) in engine.curr.iter_mut().enumerate() {
        p.vel = PhysicsVector::zero();
        p.pos = if i == 0 {
            PhysicsVector::zero()
        } else {
            PhysicsVector::new(rng.sample(StandardNormal), rng.sample(StandardNormal), rng.sample(StandardNormal))
        };
    }

    let halflife = 0.01;
    for iteration in 1..=max_iterations {
        engine.update(NUCLEUS_MAX_DT, halflife, 44_100.0, 1.0);
        if !CrashRecoverable::is_finite(engine) {
            break;
        }
        let fastest = engine.curr.iter().skip(1).map(|p| p.vel.magnitude()).fold(0.0, f64::max);
        if iteration > 1 && fastest < tolerance {
            engine.reset_after_crash();
            return Ok(iteration);
        }
    }
    Err(EngineError::NoConvergence { iterations: max_iterations })
}

// ------------------------------- Slider mappings ---------------------------------

/// Input displacement per unit of input signal: `0.015 · s^4`, `s ∈ [0, 2]`.
pub fn input_drive(slider: f32) -> f32 {
    INPUT_SCALE * clamp(slider, 0.0, 2.0).powi(INPUT_EXPONENT)
}

/// Output gain: `s^10`, `s ∈ [0, 2]`.
pub fn output_level(slider: f32) -> f32 {
    clamp(slider, 0.0, 2.0).powi(OUTPUT_EXPONENT)
}

/// Simulated seconds per real second: `2^(s − 1)`.
pub fn speed_factor(slider: f32) -> f64 {
    f64::from(two_to_power(slider - 1.0))
}

/// Velocity half-life in seconds for a decay slider in `[0, 1]`: `10^(5s − 3)`.
pub fn decay_halflife(slider: f32) -> f64 {
    f64::from(ten_to_power(5.0 * clamp(slider, 0.0, 1.0) - 3.0))
}

// --------------------------------- Stereo voice ----------------------------------

/// Five-particle Nucleus wired for stereo: left/right in move particle 0 in
/// x/y, particle 1's x/y come out.
#[derive(Clone, Debug)]
pub struct NucleusSynth {
    engine: NucleusEngine,
    speed: f32,
    decay: f32,
    drive: f32,
    level: f32,
}

const NUCLEUS_PARAMS: &[&str] =
    &["speed", "decay", "magnet", "in_drive", "out_level", "visc", "spin", "dc_reject", "agc", "agc_level"];

const MAGNET_SCALE: f64 = 0.09;

impl NucleusSynth {
    pub fn new() -> EngineResult<Self> {
        let mut synth = Self { engine: NucleusEngine::new(NUM_PARTICLES)?, speed: 5.0, decay: 0.85, drive: 1.0, level: 1.0 };
        synth.initialize();
        Ok(synth)
    }

    pub fn initialize(&mut self) {
        self.engine.initialize();
        self.engine.set_magnetic_coupling(0.21 * MAGNET_SCALE);
        self.engine.set_dc_reject_enabled(true);
        set_minimum_energy(&mut self.engine);
        self.speed = 5.0;
        self.decay = 0.85;
        self.drive = 1.0;
        self.level = 1.0;
    }

    pub fn engine(&self) -> &NucleusEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut NucleusEngine {
        &mut self.engine
    }
}

impl StereoEngine for NucleusSynth {
    fn initialize(&mut self) {
        NucleusSynth::initialize(self);
    }

    fn process(&mut self, sample_rate: f32, input: [f32; 2]) -> [f32; 2] {
        let drive = f64::from(input_drive(self.drive));
        let p0 = self.engine.particle_mut(0);
        p0.pos = PhysicsVector::new(drive * f64::from(input[0]), drive * f64::from(input[1]), 0.0);
        p0.vel = PhysicsVector::zero();
        let dt = speed_factor(self.speed) / f64::from(sample_rate);
        self.engine.update(dt, decay_halflife(self.decay), sample_rate, output_level(self.level));
        [self.engine.output(1, 0), self.engine.output(1, 1)]
    }

    fn param_names(&self) -> &'static [&'static str] {
        NUCLEUS_PARAMS
    }

    fn set_param(&mut self, name: &str, value: f32) -> bool {
        match name {
            "speed" => self.speed = clamp(value, 0.0, 8.0),
            "decay" => self.decay = clamp(value, 0.0, 1.0),
            "magnet" => self.engine.set_magnetic_coupling(f64::from(clamp(value, -1.0, 1.0)) * MAGNET_SCALE),
            "in_drive" => self.drive = clamp(value, 0.0, 2.0),
            "out_level" => self.level = clamp(value, 0.0, 2.0),
            "visc" => self.engine.set_aether_visc(f64::from(value)),
            "spin" => self.engine.set_aether_spin(f64::from(value)),
            "dc_reject" => self.engine.set_dc_reject_enabled(value >= 0.5),
            "agc" => self.engine.set_agc_enabled(value >= 0.5),
            "agc_level" => self.engine.set_agc_level(value),
            _ => return false,
        }
        true
    }

    fn agc_distortion(&self) -> f32 {
        self.engine.agc_distortion()
    }

    fn crash_recoverable(&mut self) -> Option<&mut dyn CrashRecoverable> {
        Some(&mut self.engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    const SR: f32 = 44_100.0;

    #[test]
    fn needs_two_particles() {
        assert_eq!(NucleusEngine::new(1).unwrap_err(), EngineError::ParticleCount(1));
        assert!(NucleusEngine::new(2).is_ok());
    }

    #[test]
    fn pair_settles_at_unit_distance() {
        // d − 1/d³ vanishes at d = 1
        let mut e = NucleusEngine::new(2).unwrap();
        e.particle_mut(1).pos = PhysicsVector::new(1.7, 0.0, 0.0);
        for _ in 0..20_000 {
            e.update(1.0 / 44_100.0, 0.01, SR, 1.0);
        }
        assert_abs_diff_eq!(e.particle(1).pos.magnitude(), 1.0, epsilon = 1e-6);
        assert_eq!(e.particle(0).pos, PhysicsVector::zero());
    }

    #[test]
    fn overlapping_particles_feel_nothing() {
        let mut e = NucleusEngine::new(2).unwrap();
        e.particle_mut(1).pos = PhysicsVector::new(5.0e-5, 0.0, 0.0);
        e.update(1.0e-4, 1.0, SR, 1.0);
        assert_eq!(e.particle(1).vel, PhysicsVector::zero());
        assert_eq!(e.particle(1).pos, PhysicsVector::new(5.0e-5, 0.0, 0.0));
    }

    #[test]
    fn table_is_an_equilibrium() {
        let mut e = NucleusEngine::new(NUM_PARTICLES).unwrap();
        set_minimum_energy(&mut e);
        for _ in 0..1000 {
            e.update(1.0 / 44_100.0, 0.01, SR, 1.0);
        }
        for p in e.particles() {
            assert!(p.vel.magnitude() < 1e-6, "{p:?}");
        }
    }

    #[test]
    fn positions_respect_the_effective_speed_bound() {
        let mut e = NucleusEngine::new(3).unwrap();
        e.particle_mut(1).pos = PhysicsVector::new(30.0, 0.0, 0.0);
        e.particle_mut(2).pos = PhysicsVector::new(0.0, -40.0, 0.0);
        let dt = NUCLEUS_MAX_DT;
        for _ in 0..200 {
            let before: Vec<PhysicsVector> = e.particles().iter().map(|p| p.pos).collect();
            e.update(dt, 0.0, SR, 1.0);
            for (p, b) in e.particles().iter().zip(&before) {
                let moved = (p.pos - *b).magnitude();
                assert!(moved <= dt * NUCLEUS_SPEED_LIMIT * (1.0 + 1e-9), "moved {moved}");
            }
        }
    }

    #[test]
    fn dc_reject_crossfades_in_without_a_click() {
        let mut e = NucleusEngine::new(NUM_PARTICLES).unwrap();
        set_minimum_energy(&mut e);
        e.set_agc_enabled(false);
        e.update(1.0 / 44_100.0, 0.01, SR, 1.0);
        let raw = e.output(1, 0);
        assert_relative_eq!(raw, MINIMUM_ENERGY_5[0][0] as f32, max_relative = 1e-4);

        e.set_dc_reject_enabled(true);
        let mut prev = raw;
        for _ in 0..3000 {
            e.update(1.0 / 44_100.0, 0.01, SR, 1.0);
            let y = e.output(1, 0);
            assert!((y - prev).abs() < 2e-3, "jump from {prev} to {y}");
            prev = y;
        }
        assert!(prev.abs() < 1e-3, "DC should be gone, got {prev}");
    }

    #[test]
    fn crossfade_scales_with_sample_rate() {
        let mut e = NucleusEngine::new(2).unwrap();
        e.set_dc_reject_enabled(true);
        e.update(1.0e-5, 1.0, 88_200.0, 1.0);
        assert_eq!(e.crossfade_limit, 4000);
        e.update(1.0e-5, 1.0, 22_050.0, 1.0);
        assert_eq!(e.crossfade_limit, 1000);
    }

    #[test]
    fn aether_spin_drives_rotation() {
        let mut e = NucleusEngine::new(2).unwrap();
        e.particle_mut(1).pos = PhysicsVector::new(1.0, 0.0, 0.0);
        e.particle_mut(1).vel = PhysicsVector::new(0.0, 1.0, 0.0);
        e.set_aether_spin(1.0);
        e.update(1.0e-3, 0.0, SR, 1.0);
        // v × ẑ for v = +y is +x
        assert!(e.particle(1).force.x > 0.0);
        e.set_aether_visc(5.0);
        e.set_aether_spin(0.0);
        let speed = e.particle(1).vel.magnitude();
        e.update(1.0e-3, 0.0, SR, 1.0);
        assert!(e.particle(1).vel.magnitude() < speed + 1e-9);
    }

    #[test]
    fn recover_restores_a_finite_state() {
        let mut e = NucleusEngine::new(NUM_PARTICLES).unwrap();
        e.particle_mut(2).pos.x = f64::NAN;
        assert!(!e.update(1.0 / 44_100.0, 0.01, SR, 1.0));
        assert!(!CrashRecoverable::is_finite(&e));
        e.recover();
        assert!(CrashRecoverable::is_finite(&e));
        assert!(e.update(1.0 / 44_100.0, 0.01, SR, 1.0));
    }

    #[test]
    fn infinite_step_is_a_single_recoverable_substep() {
        let mut e = NucleusEngine::new(NUM_PARTICLES).unwrap();
        set_minimum_energy(&mut e);
        e.particle_mut(1).vel.x = 0.5;
        assert!(!e.update(f64::INFINITY, 0.01, SR, 1.0));
        e.recover();
        assert!(e.update(1.0 / 44_100.0, 0.01, SR, 1.0));
    }

    #[test]
    fn solver_finds_the_three_particle_triangle() {
        let mut e = NucleusEngine::new(3).unwrap();
        let iterations = solve_minimum_energy(&mut e, 0x7c3a_af29, 1e-6, 200_000).unwrap();
        assert!(iterations > 1);
        for p in &e.particles()[1..] {
            assert_abs_diff_eq!(p.pos.magnitude(), 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn slider_mappings() {
        assert_relative_eq!(input_drive(1.0), 0.015);
        assert_relative_eq!(output_level(2.0), 1024.0);
        assert_relative_eq!(speed_factor(5.0), 16.0, max_relative = 1e-6);
        assert_relative_eq!(decay_halflife(0.6), 1.0, max_relative = 1e-5);
    }

    #[test]
    fn synth_is_quiet_without_input() {
        let mut s = NucleusSynth::new().unwrap();
        for _ in 0..4410 {
            let [l, r] = s.process(SR, [0.0, 0.0]);
            assert!(l.is_finite() && r.is_finite());
        }
        assert!(s.set_param("magnet", 0.5));
        assert!(!s.set_param("warp", 1.0));
    }
}
