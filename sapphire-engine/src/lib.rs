//! Sapphire Engine: physics simulations that make sound.
//!
//! Crate layout:
//! - [`mesh`]     : `PhysicsMesh`, balls joined by springs, midpoint integrator
//! - [`topology`] : mesh builders (string, drum, hex lattice, Elastika)
//! - [`elastika`] : stereo audio through a mesh
//! - [`nucleus`]  : N-body charged particles, minimum-energy states, stereo voice
//! - [`tubeunit`] : complex waveguide with a piston bypass valve
//! - [`crash`]    : periodic NaN/Inf detection and recovery
//! - [`graph`]    : `StereoEngine` trait and `Host<E>` driver
//! - [`error`]    : setup-time errors
//!
//! The engines deliberately avoid heap allocations in the audio thread.
//! All buffers are sized at construction; parameters are plain clamped setters.

pub mod crash;
pub mod elastika;
pub mod error;
pub mod graph;
pub mod mesh;
pub mod nucleus;
pub mod topology;
pub mod tubeunit;

// Re-export some commonly used items to make downstream imports ergonomic.
pub use crash::{CrashChecker, CrashRecoverable};
pub use elastika::ElastikaEngine;
pub use error::{EngineError, EngineResult, MeshError};
pub use graph::{Host, StereoEngine};
pub use mesh::{Ball, MeshAudioParameters, PhysicsMesh, Spring};
pub use nucleus::{NucleusEngine, NucleusSynth, Particle};
pub use tubeunit::TubeUnitEngine;

/// Which engine a driver should build.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineKind {
    Elastika,
    Nucleus,
    TubeUnit,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Elastika, EngineKind::Nucleus, EngineKind::TubeUnit];

    pub fn name(self) -> &'static str {
        match self {
            EngineKind::Elastika => "elastika",
            EngineKind::Nucleus => "nucleus",
            EngineKind::TubeUnit => "tubeunit",
        }
    }

    /// Stable numeric id used across the C ABI.
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Build a boxed engine of this kind, ready to run at `sample_rate`.
    pub fn build(self, sample_rate: f32) -> EngineResult<Box<dyn StereoEngine + Send>> {
        Ok(match self {
            EngineKind::Elastika => Box::new(ElastikaEngine::new()?),
            EngineKind::Nucleus => Box::new(NucleusSynth::new()?),
            EngineKind::TubeUnit => Box::new(TubeUnitEngine::new(sample_rate)?),
        })
    }
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown engine {s:?} (expected elastika, nucleus or tubeunit)"))
    }
}

#[cfg(test)]
mod smoke {
    use super::*;

    #[test]
    fn every_kind_builds_and_runs() {
        for kind in EngineKind::ALL {
            let engine = kind.build(48_000.0).unwrap();
            let mut host = Host::new(engine, 48_000.0).unwrap();
            let mut buf = [0.0_f32; 256];
            assert_eq!(host.render_interleaved(&mut buf, 2, |i| if i == 0 { [0.5, 0.5] } else { [0.0; 2] }), 128);
            assert!(buf.iter().all(|x| x.is_finite()), "{kind:?}");
            assert_eq!(kind.name().parse::<EngineKind>().unwrap(), kind);
        }
        assert_eq!(EngineKind::from_id(1), Some(EngineKind::Nucleus));
        assert_eq!(EngineKind::from_id(3), None);
    }
}
