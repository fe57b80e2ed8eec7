//! Mass-spring mesh integrator.
//!
//! A mesh is an ordered list of balls (point masses or anchors) and a list of
//! springs joining pairs of balls. Stiffness and rest length are global to the
//! mesh. Topology is fixed once built; `quiet()` only resets dynamic state.
//!
//! One `update(dt, halflife)` step:
//! 1. forces at the current state
//! 2. extrapolate half a step to the midpoint
//! 3. forces at the midpoint
//! 4. extrapolate a full step from the current state with the midpoint forces
//! 5. friction `vel *= 0.5^(dt/halflife)` on the new velocities
//!
//! Velocities are hard-clamped to the speed limit during extrapolation.
//! Anchors (mass ≤ 0) are copied through untouched.
//!
//! Spring forces use a uniform loop over index pairs rather than code unrolled
//! per topology.

use log::warn;
use sapphire_core::prelude::*;

use crate::error::MeshError;

pub const MESH_DEFAULT_STIFFNESS: f64 = 10.0;
pub const MESH_DEFAULT_REST_LENGTH: f64 = 1.0e-3;
pub const MESH_DEFAULT_SPEED_LIMIT: f64 = 2.0;

/// Springs shorter than this exert no force.
const MIN_SPRING_LENGTH: f64 = 1.0e-9;

/// Most substeps a single oversampled update will take.
pub const MAX_SUBSTEPS: usize = 4096;

/// `ceil(dt / max_dt)` clamped to `[1, MAX_SUBSTEPS]`. Non-finite ratios give 1.
pub fn substep_count(dt: f64, max_dt: f64) -> usize {
    let ratio = dt / max_dt;
    if max_dt > 0.0 && ratio.is_finite() && ratio > 1.0 {
        (ratio.ceil() as usize).min(MAX_SUBSTEPS)
    } else {
        1
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ball {
    pub pos: PhysicsVector,
    pub vel: PhysicsVector,
    pub mass: f64,
}

impl Ball {
    /// A mobile ball at rest.
    pub const fn new(mass: f64, pos: PhysicsVector) -> Self {
        Self { pos, vel: PhysicsVector::zero(), mass }
    }

    pub const fn anchor(pos: PhysicsVector) -> Self {
        Self::new(-1.0, pos)
    }

    #[inline]
    pub fn is_anchor(&self) -> bool {
        self.mass <= 0.0
    }

    #[inline]
    pub fn is_mobile(&self) -> bool {
        self.mass > 0.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Spring {
    pub ball_index1: usize,
    pub ball_index2: usize,
}

impl Spring {
    pub const fn new(ball_index1: usize, ball_index2: usize) -> Self {
        Self { ball_index1, ball_index2 }
    }
}

/// Where a topology wants stereo audio to enter and leave.
///
/// Directions come in pairs; the engine tilts between them.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MeshAudioParameters {
    pub left_input: usize,
    pub right_input: usize,
    pub left_output: usize,
    pub right_output: usize,
    pub left_var_mass: Option<usize>,
    pub right_var_mass: Option<usize>,
    pub left_input_dir1: PhysicsVector,
    pub left_input_dir2: PhysicsVector,
    pub right_input_dir1: PhysicsVector,
    pub right_input_dir2: PhysicsVector,
    pub left_output_dir1: PhysicsVector,
    pub left_output_dir2: PhysicsVector,
    pub right_output_dir1: PhysicsVector,
    pub right_output_dir2: PhysicsVector,
}

impl MeshAudioParameters {
    /// Taps only, with the default stimulus and response directions.
    pub fn with_taps(left_input: usize, right_input: usize, left_output: usize, right_output: usize) -> Self {
        let stim = 1.0e-4;
        let resp = 6000.0;
        Self {
            left_input,
            right_input,
            left_output,
            right_output,
            left_var_mass: None,
            right_var_mass: None,
            left_input_dir1: PhysicsVector::new(0.0, 0.0, stim),
            left_input_dir2: PhysicsVector::new(0.7 * stim, -0.7 * stim, 0.0),
            right_input_dir1: PhysicsVector::new(0.0, 0.0, stim),
            right_input_dir2: PhysicsVector::new(-0.7 * stim, 0.7 * stim, 0.0),
            left_output_dir1: PhysicsVector::new(0.0, 0.0, resp),
            left_output_dir2: PhysicsVector::new(0.0, -resp, 0.0),
            right_output_dir1: PhysicsVector::new(0.0, 0.0, resp),
            right_output_dir2: PhysicsVector::new(0.0, resp, 0.0),
        }
    }

    /// Every ball index the parameters refer to.
    pub fn ball_indices(&self) -> impl Iterator<Item = usize> + '_ {
        [self.left_input, self.right_input, self.left_output, self.right_output]
            .into_iter()
            .chain(self.left_var_mass)
            .chain(self.right_var_mass)
    }
}

/// Mesh-global force parameters.
#[derive(Copy, Clone, Debug)]
struct ForceLaw {
    stiffness: f64,
    rest_length: f64,
    gravity: PhysicsVector,
    magnet: PhysicsVector,
}

impl ForceLaw {
    fn calc_forces(&self, springs: &[Spring], balls: &[Ball], forces: &mut [PhysicsVector]) {
        for (f, b) in forces.iter_mut().zip(balls) {
            *f = if b.is_mobile() {
                b.mass * self.gravity + b.vel.cross(self.magnet)
            } else {
                PhysicsVector::zero()
            };
        }

        for s in springs {
            let b1 = &balls[s.ball_index1];
            let b2 = &balls[s.ball_index2];
            let dr = b2.pos - b1.pos;
            let dist = dr.magnitude();
            if dist < MIN_SPRING_LENGTH {
                continue;
            }
            let force = (self.stiffness * (dist - self.rest_length) / dist) * dr;
            if b1.is_mobile() {
                forces[s.ball_index1] += force;
            }
            if b2.is_mobile() {
                forces[s.ball_index2] -= force;
            }
        }
    }
}

fn extrapolate(dt: f64, speed_limit: f64, forces: &[PhysicsVector], source: &[Ball], target: &mut [Ball]) {
    let limit_sq = speed_limit * speed_limit;
    for ((next, curr), f) in target.iter_mut().zip(source).zip(forces) {
        if curr.is_anchor() {
            *next = *curr;
            continue;
        }
        next.mass = curr.mass;
        next.vel = curr.vel + (dt / curr.mass) * *f;
        if speed_limit > 0.0 {
            let speed_sq = next.vel.quadrature();
            if speed_sq > limit_sq {
                next.vel *= speed_limit / speed_sq.sqrt();
            }
        }
        next.pos = curr.pos + (dt / 2.0) * (curr.vel + next.vel);
    }
}

#[derive(Clone, Debug)]
pub struct PhysicsMesh {
    springs: Vec<Spring>,
    original: Vec<PhysicsVector>,
    curr: Vec<Ball>,
    mid: Vec<Ball>,
    next: Vec<Ball>,
    forces: Vec<PhysicsVector>,
    law: ForceLaw,
    speed_limit: f64,
}

impl Default for PhysicsMesh {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsMesh {
    pub fn new() -> Self {
        Self {
            springs: Vec::new(),
            original: Vec::new(),
            curr: Vec::new(),
            mid: Vec::new(),
            next: Vec::new(),
            forces: Vec::new(),
            law: ForceLaw {
                stiffness: MESH_DEFAULT_STIFFNESS,
                rest_length: MESH_DEFAULT_REST_LENGTH,
                gravity: PhysicsVector::zero(),
                magnet: PhysicsVector::zero(),
            },
            speed_limit: MESH_DEFAULT_SPEED_LIMIT,
        }
    }

    /// Remove every ball and spring and restore the default globals.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Append a ball. Returns its index.
    pub fn add_ball(&mut self, ball: Ball) -> usize {
        let index = self.curr.len();
        self.original.push(ball.pos);
        self.curr.push(ball);
        self.mid.push(ball);
        self.next.push(ball);
        self.forces.push(PhysicsVector::zero());
        index
    }

    /// Append a spring between two existing, distinct balls.
    pub fn add_spring(&mut self, spring: Spring) -> Result<(), MeshError> {
        let count = self.curr.len();
        let result = if spring.ball_index1 >= count {
            Err(MeshError::BallIndexOutOfRange { index: spring.ball_index1, count })
        } else if spring.ball_index2 >= count {
            Err(MeshError::BallIndexOutOfRange { index: spring.ball_index2, count })
        } else if spring.ball_index1 == spring.ball_index2 {
            Err(MeshError::SelfSpring(spring.ball_index1))
        } else {
            self.springs.push(spring);
            Ok(())
        };
        if let Err(e) = &result {
            warn!("rejected spring {spring:?}: {e}");
        }
        result
    }

    /// Put every ball back at its original position with zero velocity.
    pub fn quiet(&mut self) {
        for (b, &origin) in self.curr.iter_mut().zip(&self.original) {
            b.pos = origin;
            b.vel = PhysicsVector::zero();
        }
    }

    /// Advance by one step of `dt` seconds.
    pub fn update(&mut self, dt: f64, halflife: f64) {
        let law = self.law;
        law.calc_forces(&self.springs, &self.curr, &mut self.forces);
        extrapolate(dt / 2.0, self.speed_limit, &self.forces, &self.curr, &mut self.mid);
        law.calc_forces(&self.springs, &self.mid, &mut self.forces);
        extrapolate(dt, self.speed_limit, &self.forces, &self.curr, &mut self.next);
        if halflife > 0.0 {
            let damp = one_half_to_power(dt / halflife);
            for b in self.next.iter_mut().filter(|b| b.is_mobile()) {
                b.vel *= damp;
            }
        }
        std::mem::swap(&mut self.curr, &mut self.next);
    }

    /// Advance `dt` in `ceil(dt / max_dt)` equal substeps. Returns the count.
    pub fn update_oversampled(&mut self, dt: f64, halflife: f64, max_dt: f64) -> usize {
        let steps = substep_count(dt, max_dt);
        let et = dt / steps as f64;
        for _ in 0..steps {
            self.update(et, halflife);
        }
        steps
    }

    /// True when every ball's position and velocity is finite.
    pub fn is_finite(&self) -> bool {
        self.curr.iter().all(|b| b.pos.is_finite() && b.vel.is_finite())
    }

    // ---- global parameters -------------------------------------------------

    pub fn stiffness(&self) -> f64 {
        self.law.stiffness
    }

    /// Negative stiffness would push balls apart without bound, so it is floored at 0.
    pub fn set_stiffness(&mut self, stiffness: f64) {
        self.law.stiffness = stiffness.max(0.0);
    }

    pub fn rest_length(&self) -> f64 {
        self.law.rest_length
    }

    pub fn set_rest_length(&mut self, rest_length: f64) {
        self.law.rest_length = rest_length.max(0.0);
    }

    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    /// Zero or negative disables the clamp.
    pub fn set_speed_limit(&mut self, speed_limit: f64) {
        self.speed_limit = speed_limit;
    }

    pub fn gravity(&self) -> PhysicsVector {
        self.law.gravity
    }

    pub fn set_gravity(&mut self, gravity: PhysicsVector) {
        self.law.gravity = gravity;
    }

    pub fn magnetic_field(&self) -> PhysicsVector {
        self.law.magnet
    }

    pub fn set_magnetic_field(&mut self, magnet: PhysicsVector) {
        self.law.magnet = magnet;
    }

    // ---- topology and state access ----------------------------------------

    pub fn num_balls(&self) -> usize {
        self.curr.len()
    }

    pub fn num_springs(&self) -> usize {
        self.springs.len()
    }

    pub fn balls(&self) -> &[Ball] {
        &self.curr
    }

    pub fn springs(&self) -> &[Spring] {
        &self.springs
    }

    pub fn ball(&self, index: usize) -> Option<&Ball> {
        self.curr.get(index)
    }

    pub fn ball_mut(&mut self, index: usize) -> Option<&mut Ball> {
        self.curr.get_mut(index)
    }

    pub fn spring(&self, index: usize) -> Result<Spring, MeshError> {
        self.springs
            .get(index)
            .copied()
            .ok_or(MeshError::SpringIndexOutOfRange { index, count: self.springs.len() })
    }

    /// Position the ball had when it was added.
    pub fn ball_origin(&self, index: usize) -> Option<PhysicsVector> {
        self.original.get(index).copied()
    }

    /// Current position relative to the original position.
    pub fn ball_displacement(&self, index: usize) -> Option<PhysicsVector> {
        Some(self.curr.get(index)?.pos - *self.original.get(index)?)
    }

    pub fn set_ball_position(&mut self, index: usize, pos: PhysicsVector) -> Result<(), MeshError> {
        let count = self.curr.len();
        let ball = self.curr.get_mut(index).ok_or(MeshError::BallIndexOutOfRange { index, count })?;
        ball.pos = pos;
        Ok(())
    }

    /// Change a ball's mass. A non-positive mass turns it into an anchor.
    pub fn set_ball_mass(&mut self, index: usize, mass: f64) -> Result<(), MeshError> {
        let count = self.curr.len();
        let ball = self.curr.get_mut(index).ok_or(MeshError::BallIndexOutOfRange { index, count })?;
        ball.mass = mass;
        if ball.is_anchor() {
            ball.vel = PhysicsVector::zero();
        }
        Ok(())
    }

    /// Verify that every index in `mp` refers to a ball of this mesh.
    pub fn check_audio_parameters(&self, mp: &MeshAudioParameters) -> Result<(), MeshError> {
        let count = self.curr.len();
        match mp.ball_indices().find(|&i| i >= count) {
            Some(index) => Err(MeshError::BallIndexOutOfRange { index, count }),
            None => Ok(()),
        }
    }
}

/// Speed of the fastest mobile ball.
pub fn max_speed(mesh: &PhysicsMesh) -> f64 {
    mesh.balls()
        .iter()
        .filter(|b| b.is_mobile())
        .map(|b| b.vel.magnitude())
        .fold(0.0, f64::max)
}
