//! Per-k-point Berry curvature dipole.
//!
//! For every band $n$ whose energy falls in the window, the Berry curvature
//! pseudovector
//! $$\Og_n^c=\sum_{m\neq n,\ \lt|\ve_m-\ve_n\rt|>10^{-4}}\f{\tx{Re}\lt(2i\\,v^a_{nm}v^b_{mn}\rt)}{(\ve_m-\ve_n)^2},\qquad (a,b,c)\in\\{(1,2,0),(2,0,1),(0,1,2)\\}$$
//! is weighted with the group velocity $\tx{Re}\\,v^a_{nn}$ and added to the energy bin of $\ve_n$:
//! $$D_{ab}(\ve_n)\mathrel{+}=\tx{Re}\\,v^a_{nn}\\,\Og_n^b.$$
//! Integrated over the zone and binned in energy this is the Fermi-surface
//! weighted dipole $\sum_n\int\dd\bm k\\,\p_a\ve_n\Og_n^b\\,\dt(\ve_n-E)$.
use ndarray::prelude::*;
use num_complex::Complex;
use rayon::prelude::*;

use crate::math::re_two_i;
use crate::parameters::EnergyAxis;
use crate::solver::BandSample;

/// Band pairs closer than this are degenerate and left out of the curvature.
pub const DEGENERACY_CUTOFF: f64 = 1e-4;

/// $(a,b,c)$: component $c$ of the curvature is built from $v^a$ and $v^b$.
const CYCLIC: [(usize, usize, usize); 3] = [(1, 2, 0), (2, 0, 1), (0, 1, 2)];

/// Berry curvature vector $\bm\Og_n$ of band `n` at one k point.
///
/// `band` holds the eigenvalues, `v` the velocity matrices with shape `[3, B, B]`.
#[inline(always)]
pub fn berry_curvature_n(
    band: ArrayView1<f64>,
    v: ArrayView3<Complex<f64>>,
    n: usize,
) -> [f64; 3] {
    let mut omega = [0.0; 3];
    let e_n = band[n];
    for (m, &e_m) in band.iter().enumerate() {
        let de = e_m - e_n;
        if m == n || de.abs() <= DEGENERACY_CUTOFF {
            continue;
        }
        let c2 = de * de;
        for &(a, b, c) in CYCLIC.iter() {
            omega[c] += re_two_i(v[[a, n, m]], v[[b, m, n]]) / c2;
        }
    }
    omega
}

/// Dipole contribution of one k point, shape `[n_bins, 9]`, row entry `a*3+b`.
pub fn bcd_onek(
    band: ArrayView1<f64>,
    v: ArrayView3<Complex<f64>>,
    energy: &EnergyAxis,
) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((energy.num, 9));
    for (n, &e_n) in band.iter().enumerate() {
        let Some(idx) = energy.bin(e_n) else {
            continue;
        };
        let omega = berry_curvature_n(band, v, n);
        let mut row = out.row_mut(idx);
        for a in 0..3 {
            let v_a = v[[a, n, n]].re;
            for b in 0..3 {
                row[a * 3 + b] += v_a * omega[b];
            }
        }
    }
    out
}

/// Dipole contribution of every k point of a solved batch, shape `[K, n_bins, 9]`.
///
/// The k points are processed in parallel; each row only depends on its own k point.
pub fn bcd_pl(sample: &BandSample, energy: &EnergyAxis) -> Array3<f64> {
    let mut out = Array3::<f64>::zeros((sample.nk(), energy.num, 9));
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(sample.band.axis_iter(Axis(0)).into_par_iter())
        .zip(sample.velocity.axis_iter(Axis(0)).into_par_iter())
        .for_each(|((mut o, band), v)| o.assign(&bcd_onek(band, v, energy)));
    out
}
