//! Elastika: stereo audio through a mass-spring mesh.
//!
//! Audio enters by displacing an input ball from its origin along a direction
//! vector and leaves as the dot product of an output ball's displacement with
//! another direction. Each direction is tilted between two endpoints by the
//! input/output tilt sliders.
//!
//! Per sample:
//! - inject `drive · in` on both channels
//! - advance the mesh by `1/sr`, split into substeps no longer than [`ELASTIKA_MAX_DT`]
//! - extract, DC-reject (3-layer high-pass at 20 Hz), apply `gain`, optional AGC
//! - every [`OUTPUT_VERIFY_INTERVAL`] samples, quiet the mesh if the output is not finite

use log::{debug, warn};
use sapphire_core::prelude::*;

use crate::crash::CrashRecoverable;
use crate::error::{EngineError, MeshError};
use crate::graph::StereoEngine;
use crate::mesh::{MeshAudioParameters, PhysicsMesh};
use crate::topology::elastika_mesh;

pub const ELASTIKA_FILTER_LAYERS: usize = 3;

/// Longest substep the mesh is advanced by, seconds.
pub const ELASTIKA_MAX_DT: f64 = 1.0 / 40_000.0;

pub const OUTPUT_VERIFY_INTERVAL: u32 = 11_000;

const DC_REJECT_HZ: f32 = 20.0;
const VAR_MASS_BASE: f64 = 1.0e-6;

const FRICTION_MAP: SliderMapping = SliderMapping::new(SliderScale::Exponential, &[1.3, -4.5]);
const STIFFNESS_MAP: SliderMapping = SliderMapping::new(SliderScale::Exponential, &[-0.1, 3.4]);
const SPAN_MAP: SliderMapping = SliderMapping::new(SliderScale::Linear, &[0.0008, 0.0003]);
const CURL_MAP: SliderMapping = SliderMapping::new(SliderScale::Linear, &[0.0, 1.0]);
const MASS_MAP: SliderMapping = SliderMapping::new(SliderScale::Exponential, &[0.0, 1.0]);

/// Builds a topology into a mesh.
pub type TopologyBuilder = fn(&mut PhysicsMesh) -> Result<MeshAudioParameters, MeshError>;

/// Drives one ball's position from an audio sample.
#[derive(Copy, Clone, Debug)]
pub struct MeshInput {
    ball_index: usize,
}

impl MeshInput {
    pub fn new(ball_index: usize) -> Self {
        Self { ball_index }
    }

    /// Place the ball at `origin + sample · direction`.
    /// Returns false when the mesh has no such ball.
    pub fn inject(&self, mesh: &mut PhysicsMesh, direction: PhysicsVector, sample: f32) -> bool {
        match mesh.ball_origin(self.ball_index) {
            Some(origin) => mesh
                .set_ball_position(self.ball_index, origin + f64::from(sample) * direction)
                .is_ok(),
            None => false,
        }
    }
}

/// Reads one ball's displacement as an audio sample.
#[derive(Copy, Clone, Debug)]
pub struct MeshOutput {
    ball_index: usize,
}

impl MeshOutput {
    pub fn new(ball_index: usize) -> Self {
        Self { ball_index }
    }

    pub fn extract(&self, mesh: &PhysicsMesh, direction: PhysicsVector) -> f32 {
        mesh.ball_displacement(self.ball_index)
            .map_or(0.0, |d| d.dot(direction) as f32)
    }
}

#[derive(Clone, Debug)]
pub struct ElastikaEngine {
    mesh: PhysicsMesh,
    mp: MeshAudioParameters,
    left_input: MeshInput,
    right_input: MeshInput,
    left_output: MeshOutput,
    right_output: MeshOutput,
    left_lo_cut: StagedFilter<f32, ELASTIKA_FILTER_LAYERS>,
    right_lo_cut: StagedFilter<f32, ELASTIKA_FILTER_LAYERS>,
    half_life: f64,
    drive: f32,
    gain: f32,
    in_tilt: f32,
    out_tilt: f32,
    agc: AutomaticGainLimiter,
    enable_agc: bool,
    verify_counter: u32,
}

impl ElastikaEngine {
    /// Engine on the standard 34-ball Elastika mesh.
    pub fn new() -> Result<Self, EngineError> {
        Self::with_topology(elastika_mesh)
    }

    /// Engine on any topology, such as [`crate::topology::create_string`].
    pub fn with_topology(build: TopologyBuilder) -> Result<Self, EngineError> {
        let mut mesh = PhysicsMesh::new();
        let mp = build(&mut mesh)?;
        mesh.check_audio_parameters(&mp)?;
        let mut engine = Self {
            mesh,
            mp,
            left_input: MeshInput::new(mp.left_input),
            right_input: MeshInput::new(mp.right_input),
            left_output: MeshOutput::new(mp.left_output),
            right_output: MeshOutput::new(mp.right_output),
            left_lo_cut: StagedFilter::new(),
            right_lo_cut: StagedFilter::new(),
            half_life: 1.0,
            drive: 1.0,
            gain: 1.0,
            in_tilt: 0.5,
            out_tilt: 0.5,
            agc: AutomaticGainLimiter::new(),
            enable_agc: false,
            verify_counter: 0,
        };
        engine.initialize();
        Ok(engine)
    }

    /// Restore every parameter to its default and quiet the mesh.
    pub fn initialize(&mut self) {
        debug!("elastika: initialize ({} balls)", self.mesh.num_balls());
        self.verify_counter = 0;
        self.set_dc_reject_frequency(DC_REJECT_HZ);
        self.set_friction(0.5);
        self.set_span(0.5);
        self.set_stiffness(0.5);
        self.set_curl(0.0);
        self.set_mass(0.0);
        self.set_drive(1.0);
        self.set_gain(1.0);
        self.set_input_tilt(0.5);
        self.set_output_tilt(0.5);
        self.agc.set_ceiling(1.0);
        self.enable_agc = false;
        self.set_agc_enabled(true);
        self.quiet();
    }

    /// Return the mesh to rest and clear the filters and AGC.
    pub fn quiet(&mut self) {
        self.mesh.quiet();
        self.left_lo_cut.reset();
        self.right_lo_cut.reset();
        self.agc.initialize();
    }

    pub fn mesh(&self) -> &PhysicsMesh {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut PhysicsMesh {
        &mut self.mesh
    }

    pub fn audio_parameters(&self) -> &MeshAudioParameters {
        &self.mp
    }

    pub fn set_dc_reject_frequency(&mut self, hz: f32) {
        self.left_lo_cut.set_cutoff_frequency(hz);
        self.right_lo_cut.set_cutoff_frequency(hz);
    }

    /// `[0, 1]`, default 0.5. Maps to a velocity half-life of `10^(1.3 − 4.5 s)` seconds.
    pub fn set_friction(&mut self, slider: f32) {
        self.half_life = f64::from(FRICTION_MAP.evaluate(clamp(slider, 0.0, 1.0)));
    }

    pub fn half_life(&self) -> f64 {
        self.half_life
    }

    /// `[0, 1]`, default 0.5. Spring rest length `0.8..1.1` mm.
    pub fn set_span(&mut self, slider: f32) {
        self.mesh.set_rest_length(f64::from(SPAN_MAP.evaluate(clamp(slider, 0.0, 1.0))));
    }

    /// `[0, 1]`, default 0.5.
    pub fn set_stiffness(&mut self, slider: f32) {
        self.mesh.set_stiffness(f64::from(STIFFNESS_MAP.evaluate(clamp(slider, 0.0, 1.0))));
    }

    /// `[-1, 1]`, default 0. Positive curl points the field along +x, negative curl along +z.
    pub fn set_curl(&mut self, slider: f32) {
        let curl = f64::from(CURL_MAP.evaluate(clamp(slider, -1.0, 1.0)));
        let field = if curl >= 0.0 {
            curl * PhysicsVector::new(0.005, 0.0, 0.0)
        } else {
            curl * PhysicsVector::new(0.0, 0.0, -0.005)
        };
        self.mesh.set_magnetic_field(field);
    }

    /// `[-1, 1]`, default 0. Mass of the two variable-mass balls, `1e-6 · 10^s` kg.
    pub fn set_mass(&mut self, slider: f32) {
        let mass = VAR_MASS_BASE * f64::from(MASS_MAP.evaluate(clamp(slider, -1.0, 1.0)));
        for index in [self.mp.left_var_mass, self.mp.right_var_mass].into_iter().flatten() {
            if let Err(e) = self.mesh.set_ball_mass(index, mass) {
                warn!("elastika: {e}");
            }
        }
    }

    /// `[0, 2]`, default 1 (0 dB). Applied as `s^4`.
    pub fn set_drive(&mut self, slider: f32) {
        self.drive = clamp(slider, 0.0, 2.0).powi(4);
    }

    /// `[0, 2]`, default 1 (0 dB). Applied as `s^4`.
    pub fn set_gain(&mut self, slider: f32) {
        self.gain = clamp(slider, 0.0, 2.0).powi(4);
    }

    pub fn set_input_tilt(&mut self, slider: f32) {
        self.in_tilt = clamp(slider, 0.0, 1.0);
    }

    pub fn set_output_tilt(&mut self, slider: f32) {
        self.out_tilt = clamp(slider, 0.0, 1.0);
    }

    pub fn agc_enabled(&self) -> bool {
        self.enable_agc
    }

    /// Turning the AGC on makes it forget any gain reduction it had settled on.
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

    /// 0 with no gain reduction, growing with the amount applied.
    pub fn agc_distortion(&self) -> f32 {
        if self.enable_agc { self.agc.follower() - 1.0 } else { 0.0 }
    }

    pub fn process(&mut self, sample_rate: f32, left_in: f32, right_in: f32) -> (f32, f32) {
        let tilt = f64::from(self.in_tilt);
        let left_dir = PhysicsVector::interpolate(tilt, self.mp.left_input_dir1, self.mp.left_input_dir2);
        let right_dir = PhysicsVector::interpolate(tilt, self.mp.right_input_dir1, self.mp.right_input_dir2);
        let placed = self.left_input.inject(&mut self.mesh, left_dir, self.drive * left_in)
            & self.right_input.inject(&mut self.mesh, right_dir, self.drive * right_in);
        debug_assert!(placed, "input balls are checked at construction");

        self.mesh.update_oversampled(1.0 / f64::from(sample_rate), self.half_life, ELASTIKA_MAX_DT);

        let tilt = f64::from(self.out_tilt);
        let left_dir = PhysicsVector::interpolate(tilt, self.mp.left_output_dir1, self.mp.left_output_dir2);
        let right_dir = PhysicsVector::interpolate(tilt, self.mp.right_output_dir1, self.mp.right_output_dir2);
        let mut left = self.left_output.extract(&self.mesh, left_dir);
        let mut right = self.right_output.extract(&self.mesh, right_dir);
        left = self.gain * self.left_lo_cut.update_hi_pass(left, sample_rate);
        right = self.gain * self.right_lo_cut.update_hi_pass(right, sample_rate);

        if self.enable_agc {
            self.agc.process_stereo(sample_rate, &mut left, &mut right);
        }

        self.verify_counter += 1;
        if self.verify_counter >= OUTPUT_VERIFY_INTERVAL {
            self.verify_counter = 0;
            if !left.is_finite() || !right.is_finite() {
                warn!("elastika: non-finite output, quieting mesh");
                self.quiet();
                return (0.0, 0.0);
            }
        }
        (left, right)
    }
}

impl CrashRecoverable for ElastikaEngine {
    fn is_finite(&self) -> bool {
        self.mesh.is_finite()
    }

    fn recover(&mut self) {
        self.quiet();
    }
}

const ELASTIKA_PARAMS: &[&str] = &[
    "friction",
    "stiffness",
    "span",
    "curl",
    "mass",
    "drive",
    "gain",
    "in_tilt",
    "out_tilt",
    "agc",
    "agc_level",
];

impl StereoEngine for ElastikaEngine {
    fn initialize(&mut self) {
        ElastikaEngine::initialize(self);
    }

    fn process(&mut self, sample_rate: f32, input: [f32; 2]) -> [f32; 2] {
        let (l, r) = ElastikaEngine::process(self, sample_rate, input[0], input[1]);
        [l, r]
    }

    fn param_names(&self) -> &'static [&'static str] {
        ELASTIKA_PARAMS
    }

    fn set_param(&mut self, name: &str, value: f32) -> bool {
        match name {
            "friction" => self.set_friction(value),
            "stiffness" => self.set_stiffness(value),
            "span" => self.set_span(value),
            "curl" => self.set_curl(value),
            "mass" => self.set_mass(value),
            "drive" => self.set_drive(value),
            "gain" => self.set_gain(value),
            "in_tilt" => self.set_input_tilt(value),
            "out_tilt" => self.set_output_tilt(value),
            "agc" => self.set_agc_enabled(value >= 0.5),
            "agc_level" => self.set_agc_level(value),
            _ => return false,
        }
        true
    }

    fn agc_distortion(&self) -> f32 {
        ElastikaEngine::agc_distortion(self)
    }

    fn crash_recoverable(&mut self) -> Option<&mut dyn CrashRecoverable> {
        Some(self)
    }
}
