//! Setup-time failures of mesh construction and engine configuration.
//!
//! Nothing here is produced on the per-sample path.

use sapphire_core::CoreError;
use thiserror::Error;

/// A topology referenced something that does not exist.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    #[error("ball index {index} out of range (mesh has {count} balls)")]
    BallIndexOutOfRange { index: usize, count: usize },

    #[error("spring index {index} out of range (mesh has {count} springs)")]
    SpringIndexOutOfRange { index: usize, count: usize },

    /// Both ends of a spring are the same ball.
    #[error("spring would connect ball {0} to itself")]
    SelfSpring(usize),

    /// A lattice builder stepped outside its grid.
    #[error("grid coordinates ({u}, {v}) out of range")]
    GridOutOfRange { u: i32, v: i32 },

    /// A lattice builder expected a ball where there is none.
    #[error("no ball at grid coordinates ({u}, {v})")]
    EmptyGridCell { u: i32, v: i32 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Particle engines need at least two bodies to interact.
    #[error("need at least 2 particles, got {0}")]
    ParticleCount(usize),

    #[error("sample rate must be positive and finite, got {0}")]
    SampleRate(f32),

    #[error("minimum-energy search did not converge after {iterations} iterations")]
    NoConvergence { iterations: usize },

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Reject non-positive or non-finite sample rates.
pub(crate) fn check_sample_rate(sample_rate: f32) -> EngineResult<f32> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(sample_rate)
    } else {
        Err(EngineError::SampleRate(sample_rate))
    }
}
