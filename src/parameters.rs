//! Configuration surface of the Berry curvature dipole calculation.
//!
//! [`BcdParameters`] is what a user writes (it deserializes with serde);
//! [`BcdConfig::new`] checks every precondition up front and produces the
//! immutable record the integration runs on.
use log::info;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{BcdError, Result};
use crate::kpoints::BrillouinCell;
use crate::solver::{BandSolver, SpinKind};

/// How the Brillouin zone integral is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrateMode {
    /// Uniform mesh, refined around hot k points.
    Grid,
    /// Adaptive scalar quadrature, which cannot integrate a tensor.
    Adaptive,
}

fn default_max_kpoint_num() -> usize {
    8000
}
fn default_k_vect1() -> [f64; 3] {
    [1.0, 0.0, 0.0]
}
fn default_k_vect2() -> [f64; 3] {
    [0.0, 1.0, 0.0]
}
fn default_k_vect3() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}

/// User-facing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcdParameters {
    /// Energy window $[E_\tx{min},E_\tx{max}]$ in eV.
    pub omega: [f64; 2],
    /// Width of one energy bin.
    pub domega: f64,
    /// Coarse mesh $(n_1,n_2,n_3)$.
    pub integrate_grid: [usize; 3],
    /// Fine mesh $(m_1,m_2,m_3)$ laid over every hot coarse cell.
    pub adaptive_grid: [usize; 3],
    /// A coarse k point is hot once any entry of its tensor reaches this magnitude.
    pub adaptive_grid_threshold: f64,
    /// Largest number of k points handed to the solver at once.
    #[serde(default = "default_max_kpoint_num")]
    pub max_kpoint_num: usize,
    #[serde(default)]
    pub k_start: [f64; 3],
    #[serde(default = "default_k_vect1")]
    pub k_vect1: [f64; 3],
    #[serde(default = "default_k_vect2")]
    pub k_vect2: [f64; 3],
    #[serde(default = "default_k_vect3")]
    pub k_vect3: [f64; 3],
}

impl BcdParameters {
    /// Parameters over the whole Brillouin zone with the default batch size.
    pub fn new(
        omega: [f64; 2],
        domega: f64,
        integrate_grid: [usize; 3],
        adaptive_grid: [usize; 3],
        adaptive_grid_threshold: f64,
    ) -> Self {
        BcdParameters {
            omega,
            domega,
            integrate_grid,
            adaptive_grid,
            adaptive_grid_threshold,
            max_kpoint_num: default_max_kpoint_num(),
            k_start: [0.0; 3],
            k_vect1: default_k_vect1(),
            k_vect2: default_k_vect2(),
            k_vect3: default_k_vect3(),
        }
    }
}

/// Floor that tolerates the rounding of $(E-E_\tx{min})/\dd E$ when $E$ sits on a bin edge.
#[inline(always)]
fn edge_floor(x: f64) -> f64 {
    let r = x.round();
    if (x - r).abs() <= 1e-9 * r.abs().max(1.0) {
        r
    } else {
        x.floor()
    }
}

/// Energy bins $[E_\tx{min}+i\dd E,E_\tx{min}+(i+1)\dd E)$ for $i<N$,
/// with $N=\lfloor(E_\tx{max}-E_\tx{min})/\dd E\rfloor+1$.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyAxis {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub num: usize,
}

impl EnergyAxis {
    pub fn new(min: f64, max: f64, step: f64) -> Result<Self> {
        if !(min.is_finite() && max.is_finite()) || min >= max {
            return Err(BcdError::InvalidEnergyRange { min, max });
        }
        if !step.is_finite() || step <= 0.0 {
            return Err(BcdError::InvalidEnergyStep(step));
        }
        let ratio = edge_floor((max - min) / step);
        if !ratio.is_finite() || ratio >= usize::MAX as f64 {
            return Err(BcdError::InvalidEnergyStep(step));
        }
        let num = (ratio as usize)
            .checked_add(1)
            .ok_or(BcdError::InvalidEnergyStep(step))?;
        Ok(EnergyAxis {
            min,
            max,
            step,
            num,
        })
    }

    /// Bin holding energy `e`, or `None` outside the window.
    ///
    /// A quotient `(e - min) / step` within `1e-9·max(|n|, 1)` of an integer `n`
    /// is taken as `n`, so an energy a hair below `min` still lands in bin 0.
    #[inline(always)]
    pub fn bin(&self, e: f64) -> Option<usize> {
        let x = edge_floor((e - self.min) / self.step);
        if x.is_finite() && x >= 0.0 && x < self.num as f64 {
            Some(x as usize)
        } else {
            None
        }
    }

    /// Lower edge of every bin, $E_\tx{min}+i\dd E$.
    pub fn energies(&self) -> Array1<f64> {
        Array1::from_iter((0..self.num).map(|i| self.min + i as f64 * self.step))
    }
}

/// Validated, immutable configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BcdConfig {
    pub energy: EnergyAxis,
    /// Cell and mesh of the coarse scan.
    pub cell: BrillouinCell,
    pub adaptive_grid: [usize; 3],
    pub threshold: f64,
    pub max_kpoint_num: usize,
}

fn check_grid(name: &'static str, dims: [usize; 3]) -> Result<()> {
    if dims.iter().any(|&n| n == 0) {
        return Err(BcdError::InvalidGrid { name, dims });
    }
    Ok(())
}

impl BcdConfig {
    pub fn new(params: &BcdParameters, spin: SpinKind, mode: IntegrateMode) -> Result<Self> {
        if spin == SpinKind::Collinear {
            return Err(BcdError::UnsupportedSpin(spin));
        }
        if mode != IntegrateMode::Grid {
            return Err(BcdError::InvalidIntegrateMode(mode));
        }
        check_grid("integrate_grid", params.integrate_grid)?;
        check_grid("adaptive_grid", params.adaptive_grid)?;
        let energy = EnergyAxis::new(params.omega[0], params.omega[1], params.domega)?;
        let threshold = params.adaptive_grid_threshold;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(BcdError::InvalidThreshold(threshold));
        }
        if params.max_kpoint_num == 0 {
            return Err(BcdError::InvalidBatchSize);
        }
        Ok(BcdConfig {
            energy,
            cell: BrillouinCell {
                k_start: params.k_start,
                k_vect: [params.k_vect1, params.k_vect2, params.k_vect3],
                grid: params.integrate_grid,
            },
            adaptive_grid: params.adaptive_grid,
            threshold,
            max_kpoint_num: params.max_kpoint_num,
        })
    }

    /// Same as [`BcdConfig::new`] with the spin configuration taken from `solver`.
    pub fn for_solver<S: BandSolver + ?Sized>(
        solver: &S,
        mode: IntegrateMode,
        params: &BcdParameters,
    ) -> Result<Self> {
        BcdConfig::new(params, solver.spin(), mode)
    }

    /// Number of points of one refinement mesh, $m_1m_2m_3$.
    #[inline(always)]
    pub fn adaptive_nk(&self) -> usize {
        self.adaptive_grid.iter().product()
    }

    pub fn log_parameters(&self) {
        let [n1, n2, n3] = self.cell.grid;
        let [m1, m2, m3] = self.adaptive_grid;
        info!("Berry Curvature Dipole");
        info!("Parameter setting :");
        info!(" >> omega    : {:<8.4} {:<8.4}", self.energy.min, self.energy.max);
        info!(" >> domega   : {:<10.6}", self.energy.step);
        info!(" >> integrate_grid          : {:<8} {:<8} {:<8}", n1, n2, n3);
        info!(" >> adaptive_grid           : {:<8} {:<8} {:<8}", m1, m2, m3);
        info!(" >> adaptive_grid_threshold : {:<10.4}", self.threshold);
    }
}
