//! Berry curvature dipole of a tight-binding band structure, integrated over
//! the Brillouin zone on a coarse mesh that is refined around hot k points.
//!
//! The tensor
//! $$D_{ab}(E)=\f{V}{(2\pi)^3}\sum_n\int\dd\bm k\\,\p_a\ve_n\\,\Og_n^b\\,\dt(\ve_n-E)$$
//! is binned in energy over $[E_\tx{min},E_\tx{max}]$ with step $\dd E$, one row
//! per bin and column `a*3+b`.
//!
//! The crate does not build Hamiltonians. Eigenvalues and velocity matrices come
//! from a [`BandSolver`], and the work is spread over the ranks of a
//! [`Collective`]:
//!
//! ```ignore
//! use rustb_bcd::*;
//!
//! let params = BcdParameters::new([-0.5, 0.5], 0.01, [50, 50, 50], [5, 5, 5], 100.0);
//! let config = BcdConfig::for_solver(&model, IntegrateMode::Grid, &params)?;
//! let result = calculate_berry_curvature_dipole(&model, &SerialComm, &config)?;
//! result.output(&SerialComm, "bcd")?;
//! ```
pub mod bcd;
pub mod error;
pub mod integrate;
pub mod io;
pub mod kpoints;
pub mod math;
pub mod parallel;
pub mod parameters;
pub mod solver;

pub use crate::bcd::{DEGENERACY_CUTOFF, bcd_onek, bcd_pl, berry_curvature_n};
pub use crate::error::{BcdError, Result};
pub use crate::integrate::{
    AreaJudge, BcdResult, area_judge, calculate_berry_curvature_dipole, geometric_constant,
    refine_hot_point,
};
pub use crate::kpoints::{BrillouinCell, KBatch, KMeshBatches, local_block, local_kpoints};
#[cfg(feature = "mpi-support")]
pub use crate::parallel::MpiComm;
pub use crate::parallel::{Collective, LocalComm, ROOT, SerialComm};
pub use crate::parameters::{BcdConfig, BcdParameters, EnergyAxis, IntegrateMode};
pub use crate::solver::{BandSample, BandSolver, SpinKind};
