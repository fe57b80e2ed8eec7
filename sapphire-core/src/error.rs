//! Setup-time failures of the core primitives.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// A delay line was asked for zero samples of storage.
    #[error("delay line capacity must be at least one sample")]
    ZeroCapacity,
}
