//! Error types for the water simulation.
//!
//! The simulation is a deterministic fixed-timestep process with no I/O;
//! the only hard failure mode is failing to start its worker thread.
//! Everything else in the error taxonomy (degenerate input, numerical
//! degeneracy, stale query owners) is handled in place and never surfaces.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WaterError {
    /// The engine cannot function without its worker thread.
    #[error("failed to spawn water simulation worker: {0}")]
    ThreadSpawn(#[from] std::io::Error),
}
