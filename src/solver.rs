//! Contract with the electronic-structure solver.
//!
//! The solver diagonalizes the Hamiltonian for a batch of k points and returns
//! the band energies $\ve_{n\bm k}$ with the velocity matrices
//! $v^a_{nm}=\bra{\psi_{n\bm k}}\p_{k_a}H_{\bm k}\ket{\psi_{m\bm k}}$ in the
//! eigenbasis. Nothing in this crate builds Hamiltonians.
use ndarray::{Array2, Array4, Axis};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::error::{BcdError, Result};

/// Spin configuration of the model, by the usual `nspin` convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpinKind {
    /// nspin = 1
    Unpolarized,
    /// nspin = 2, spin up and down solved separately
    Collinear,
    /// nspin = 4, spinor basis
    Noncollinear,
}

impl SpinKind {
    pub fn nspin(&self) -> usize {
        match self {
            SpinKind::Unpolarized => 1,
            SpinKind::Collinear => 2,
            SpinKind::Noncollinear => 4,
        }
    }

    pub fn from_nspin(nspin: usize) -> Option<SpinKind> {
        match nspin {
            1 => Some(SpinKind::Unpolarized),
            2 => Some(SpinKind::Collinear),
            4 => Some(SpinKind::Noncollinear),
            _ => None,
        }
    }
}

/// Eigenvalues `band[[k, n]]` and velocity matrices `velocity[[k, a, n, m]]`
/// for a batch of k points.
#[derive(Debug, Clone, PartialEq)]
pub struct BandSample {
    pub band: Array2<f64>,
    pub velocity: Array4<Complex<f64>>,
}

impl BandSample {
    /// A batch without any k point.
    pub fn empty(nband: usize) -> Self {
        BandSample {
            band: Array2::zeros((0, nband)),
            velocity: Array4::zeros((0, 3, nband, nband)),
        }
    }

    #[inline(always)]
    pub fn nk(&self) -> usize {
        self.band.len_of(Axis(0))
    }

    #[inline(always)]
    pub fn nband(&self) -> usize {
        self.band.len_of(Axis(1))
    }

    /// Checks the shapes against a request for `nk` points.
    pub fn check(&self, nk: usize) -> Result<()> {
        let nband = self.nband();
        if self.nk() != nk {
            return Err(BcdError::DimensionMismatch {
                context: "number of k points in eigenvalues".to_string(),
                expected: nk,
                found: self.nk(),
            });
        }
        let (vk, dir, n1, n2) = self.velocity.dim();
        let checks = [
            ("number of k points in velocity matrix", nk, vk),
            ("number of velocity components", 3, dir),
            ("velocity matrix rows", nband, n1),
            ("velocity matrix columns", nband, n2),
        ];
        for (context, expected, found) in checks {
            if expected != found {
                return Err(BcdError::DimensionMismatch {
                    context: context.to_string(),
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }
}

/// The external electronic-structure solver.
pub trait BandSolver {
    /// Spin configuration of the underlying model.
    fn spin(&self) -> SpinKind;

    /// Cartesian reciprocal lattice vectors $\bm b_1,\bm b_2,\bm b_3$ along axis 0.
    fn reciprocal_lattice(&self) -> Array2<f64>;

    /// Eigenvalues and velocity matrices for `kvec` (fractional, one k point per row).
    fn solve(&self, kvec: &Array2<f64>) -> Result<BandSample>;
}
