//! src/error.rs
//! Error type shared by configuration, integration and the collective layer.
//! Every precondition violation gets its own variant so that a failed setup can
//! be told apart from a failed solver call or a broken collective.

use thiserror::Error;

use crate::parameters::IntegrateMode;
use crate::solver::SpinKind;

/// The primary error type for all fallible operations in this library.
#[derive(Error, Debug)]
pub enum BcdError {
    // --- Configuration errors, detected before any k-point is computed ---
    #[error("Berry curvature dipole is only available for nspin = 1 or 4, but the model is {0:?}")]
    UnsupportedSpin(SpinKind),

    #[error("Since the integration is of a tensor, only Grid integrate_mode is available, got {0:?}")]
    InvalidIntegrateMode(IntegrateMode),

    #[error("Every dimension of '{name}' must be a positive integer, got {dims:?}")]
    InvalidGrid { name: &'static str, dims: [usize; 3] },

    #[error("The energy window must satisfy E_min < E_max, got omega = [{min}, {max}]")]
    InvalidEnergyRange { min: f64, max: f64 },

    #[error("domega must be a positive finite number, got {0}")]
    InvalidEnergyStep(f64),

    #[error("adaptive_grid_threshold must be a positive finite number, got {0}")]
    InvalidThreshold(f64),

    #[error("max_kpoint_num must be at least 1")]
    InvalidBatchSize,

    // --- Data handed over by collaborators ---
    #[error("Dimension mismatch for '{context}': expected {expected}, got {found}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    #[error("Electronic-structure solver failed: {0}")]
    Solver(String),

    #[error("Collective operation failed: {0}")]
    Collective(String),

    // --- Output ---
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for this library's operations.
pub type Result<T> = std::result::Result<T, BcdError>;
