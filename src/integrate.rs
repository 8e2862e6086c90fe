//! Brillouin zone integration of the Berry curvature dipole on a coarse mesh
//! with local refinement.
//!
//! 1. [`area_judge`] runs the kernel over the coarse mesh. A k point whose
//!    tensor reaches the threshold anywhere in the spectrum is left out of the
//!    baseline and recorded as hot.
//! 2. [`refine_hot_point`] replaces every hot point by the average over a fine
//!    mesh covering its coarse cell.
//! 3. [`calculate_berry_curvature_dipole`] adds both, divides by the number of
//!    coarse points and multiplies by $\lt|\det(\bm v_1,\bm v_2,\bm v_3)\rt|/(2\pi)^3$.
//!
//! Every worker walks the same batches and the same hot points and enters the
//! same collectives; only the k points it computes differ.
use log::{debug, info};
use ndarray::prelude::*;
use serde::Serialize;
use std::f64::consts::PI;

use crate::bcd::bcd_pl;
use crate::error::{BcdError, Result};
use crate::kpoints::{BrillouinCell, KBatch, local_kpoints};
use crate::math::{det3, direct_to_cartesian};
use crate::parallel::Collective;
use crate::parameters::{BcdConfig, EnergyAxis};
use crate::solver::BandSolver;

/// Baseline of the coarse scan and the hot points it found.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaJudge {
    /// Sum over the coarse mesh without the hot points, `[n_bins, 9]`.
    pub bcd: Array2<f64>,
    /// Hot k points in mesh order, `[n_hot, 3]`.
    pub hot_points: Array2<f64>,
}

/// Final result of the calculation, identical on every worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BcdResult {
    /// Lower edge of every energy bin.
    pub energies: Array1<f64>,
    /// $D_{ab}(E)$, one row per energy, column `a*3+b`.
    pub bcd: Array2<f64>,
    /// Fractional coordinates of the refined k points, in mesh order.
    pub hot_points: Array2<f64>,
}

/// Solves and evaluates this worker's share of `batch`.
fn local_bcd<S, C>(
    solver: &S,
    comm: &C,
    batch: &KBatch,
    energy: &EnergyAxis,
) -> Result<(KBatch, Array3<f64>)>
where
    S: BandSolver + ?Sized,
    C: Collective + ?Sized,
{
    let local = local_kpoints(batch, comm.size(), comm.rank());
    if local.is_empty() {
        return Ok((local, Array3::zeros((0, energy.num, 9))));
    }
    let sample = solver.solve(&local.kvec)?;
    sample.check(local.len())?;
    let bcd = bcd_pl(&sample, energy);
    Ok((local, bcd))
}

fn all_reduce_array<C: Collective + ?Sized>(comm: &C, a: &mut Array2<f64>) -> Result<()> {
    match a.as_slice_mut() {
        Some(buf) => comm.all_reduce_sum(buf),
        None => {
            let mut buf: Vec<f64> = a.iter().copied().collect();
            comm.all_reduce_sum(&mut buf)?;
            a.iter_mut().zip(buf).for_each(|(x, y)| *x = y);
            Ok(())
        }
    }
}

/// True when any entry of the per-k tensor reaches `bar` in magnitude.
#[inline(always)]
fn is_hot(bcd: &ArrayView2<f64>, bar: f64) -> bool {
    let (max, min) = bcd.fold((f64::NEG_INFINITY, f64::INFINITY), |(max, min), &x| {
        (max.max(x), min.min(x))
    });
    max >= bar || min <= -bar
}

/// Coarse scan over `config.cell`.
pub fn area_judge<S, C>(solver: &S, comm: &C, config: &BcdConfig) -> Result<AreaJudge>
where
    S: BandSolver + ?Sized,
    C: Collective + ?Sized,
{
    let energy = &config.energy;
    let mut bcd_local = Array2::<f64>::zeros((energy.num, 9));
    // rows of [mesh index, k1, k2, k3]
    let mut hot_local: Vec<f64> = Vec::new();
    for batch in config.cell.batches(config.max_kpoint_num) {
        let (local, bcd) = local_bcd(solver, comm, &batch, energy)?;
        let mut n_hot = 0;
        for (i, (k, d)) in local.kvec.outer_iter().zip(bcd.outer_iter()).enumerate() {
            if is_hot(&d, config.threshold) {
                hot_local.extend([(local.offset + i) as f64, k[0], k[1], k[2]]);
                n_hot += 1;
            } else {
                bcd_local += &d;
            }
        }
        debug!(
            "rank {}: coarse batch at {} done, {} k points, {} hot",
            comm.rank(),
            batch.offset,
            local.len(),
            n_hot
        );
    }
    all_reduce_array(comm, &mut bcd_local)?;
    let rows = comm.gather_rows(&hot_local, 4)?;
    let mut rows: Vec<&[f64]> = rows.chunks_exact(4).collect();
    rows.sort_by(|a, b| a[0].total_cmp(&b[0]));
    let mut hot_points = Array2::<f64>::zeros((rows.len(), 3));
    for (mut h, r) in hot_points.outer_iter_mut().zip(rows) {
        h.assign(&aview1(&r[1..]));
    }
    Ok(AreaJudge {
        bcd: bcd_local,
        hot_points,
    })
}

/// Average of the kernel over the fine mesh centred on the hot point `center`.
pub fn refine_hot_point<S, C>(
    solver: &S,
    comm: &C,
    config: &BcdConfig,
    center: &[f64; 3],
) -> Result<Array2<f64>>
where
    S: BandSolver + ?Sized,
    C: Collective + ?Sized,
{
    let energy = &config.energy;
    let fine: BrillouinCell = config.cell.sub_cell(center, config.adaptive_grid);
    let mut bcd_local = Array2::<f64>::zeros((energy.num, 9));
    for batch in fine.batches(config.max_kpoint_num) {
        let (_, bcd) = local_bcd(solver, comm, &batch, energy)?;
        bcd_local += &bcd.sum_axis(Axis(0));
    }
    all_reduce_array(comm, &mut bcd_local)?;
    Ok(bcd_local / config.adaptive_nk() as f64)
}

/// $\lt|\det(\bm v_1,\bm v_2,\bm v_3)\rt|/(2\pi)^3$ with the cell vectors in cartesian coordinates.
pub fn geometric_constant(reciprocal: &Array2<f64>, cell: &BrillouinCell) -> Result<f64> {
    if reciprocal.dim() != (3, 3) {
        return Err(BcdError::DimensionMismatch {
            context: "reciprocal lattice".to_string(),
            expected: 9,
            found: reciprocal.len(),
        });
    }
    let mut v = Array2::<f64>::zeros((3, 3));
    for (mut row, k) in v.outer_iter_mut().zip(cell.k_vect.iter()) {
        row.assign(&direct_to_cartesian(k, reciprocal));
    }
    Ok(det3(&v).abs() / (2.0 * PI).powi(3))
}

/// Berry curvature dipole over `config.cell`, refined around hot k points.
///
/// Must be called by every worker of `comm`. A failing solver on one worker
/// leaves the others waiting in the next collective.
pub fn calculate_berry_curvature_dipole<S, C>(
    solver: &S,
    comm: &C,
    config: &BcdConfig,
) -> Result<BcdResult>
where
    S: BandSolver + ?Sized,
    C: Collective + ?Sized,
{
    if comm.is_root() {
        config.log_parameters();
    }
    let constant = geometric_constant(&solver.reciprocal_lattice(), &config.cell)?;
    let AreaJudge {
        mut bcd,
        hot_points,
    } = area_judge(solver, comm, config)?;
    if comm.is_root() {
        info!(
            "coarse scan of {} k points finished, {} hot k points to refine",
            config.cell.nk(),
            hot_points.nrows()
        );
    }
    for (i, h) in hot_points.outer_iter().enumerate() {
        bcd += &refine_hot_point(solver, comm, config, &[h[0], h[1], h[2]])?;
        debug!("rank {}: refined hot point {}", comm.rank(), i);
    }
    bcd *= constant / config.cell.nk() as f64;
    Ok(BcdResult {
        energies: config.energy.energies(),
        bcd,
        hot_points,
    })
}
