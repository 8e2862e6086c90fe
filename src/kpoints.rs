//! Lazy k-point meshes over a parallelepiped of the Brillouin zone, and the
//! block partition that hands each worker its share of a batch.
use ndarray::{Array2, Axis, s};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A parallelepiped in fractional k space together with its sampling.
///
/// The point with multi-index $(i_1,i_2,i_3)$ is
/// $$\bm k=\bm k_0+\f{i_1}{n_1}\bm v_1+\f{i_2}{n_2}\bm v_2+\f{i_3}{n_3}\bm v_3.$$
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrillouinCell {
    /// Origin of the cell, fractional coordinates.
    pub k_start: [f64; 3],
    /// Basis vectors $\bm v_1,\bm v_2,\bm v_3$, fractional coordinates.
    pub k_vect: [[f64; 3]; 3],
    /// Subdivisions along each basis vector.
    pub grid: [usize; 3],
}

impl BrillouinCell {
    /// The whole Brillouin zone sampled with `grid`.
    pub fn full_zone(grid: [usize; 3]) -> Self {
        BrillouinCell {
            k_start: [0.0; 3],
            k_vect: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            grid,
        }
    }

    /// Number of points, $n_1n_2n_3$.
    #[inline(always)]
    pub fn nk(&self) -> usize {
        self.grid.iter().product()
    }

    /// The `index`-th point in row-major order over $(i_1,i_2,i_3)$.
    pub fn kpoint(&self, index: usize) -> [f64; 3] {
        let [n1, n2, n3] = self.grid;
        let i1 = index / (n2 * n3);
        let i2 = (index / n3) % n2;
        let i3 = index % n3;
        let f = [
            i1 as f64 / n1 as f64,
            i2 as f64 / n2 as f64,
            i3 as f64 / n3 as f64,
        ];
        let mut k = self.k_start;
        for (d, kd) in k.iter_mut().enumerate() {
            for r in 0..3 {
                *kd += f[r] * self.k_vect[r][d];
            }
        }
        k
    }

    /// One cell of this mesh: the basis vectors divided by the subdivisions.
    pub fn step_vectors(&self) -> [[f64; 3]; 3] {
        let mut v = self.k_vect;
        for (r, row) in v.iter_mut().enumerate() {
            for x in row.iter_mut() {
                *x /= self.grid[r] as f64;
            }
        }
        v
    }

    /// The cell of size one mesh step, centred on `center`, sampled by `grid`.
    ///
    /// The origin is `center` shifted back by half of the cell diagonal
    /// $(\bm v_1/n_1+\bm v_2/n_2+\bm v_3/n_3)/2$.
    pub fn sub_cell(&self, center: &[f64; 3], grid: [usize; 3]) -> BrillouinCell {
        let k_vect = self.step_vectors();
        let mut k_start = *center;
        for (d, kd) in k_start.iter_mut().enumerate() {
            let delta: f64 = k_vect.iter().map(|v| v[d]).sum();
            *kd -= delta / 2.0;
        }
        BrillouinCell {
            k_start,
            k_vect,
            grid,
        }
    }

    /// Batches of at most `max_kpoint_num` points covering the whole mesh.
    pub fn batches(&self, max_kpoint_num: usize) -> KMeshBatches {
        KMeshBatches {
            cell: *self,
            max_kpoint_num: max_kpoint_num.max(1),
            next: 0,
        }
    }
}

/// A contiguous run of mesh points. `offset` is the mesh index of the first row.
#[derive(Debug, Clone, PartialEq)]
pub struct KBatch {
    pub offset: usize,
    pub kvec: Array2<f64>,
}

impl KBatch {
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.kvec.len_of(Axis(0))
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Iterator over the batches of a [`BrillouinCell`] mesh.
///
/// Only one batch is materialized at a time. Cloning or calling [`KMeshBatches::reset`]
/// restarts the sequence from the first point.
#[derive(Debug, Clone)]
pub struct KMeshBatches {
    cell: BrillouinCell,
    max_kpoint_num: usize,
    next: usize,
}

impl KMeshBatches {
    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// Number of batches still to come.
    pub fn remaining(&self) -> usize {
        (self.cell.nk() - self.next).div_ceil(self.max_kpoint_num)
    }
}

impl Iterator for KMeshBatches {
    type Item = KBatch;

    fn next(&mut self) -> Option<KBatch> {
        let nk = self.cell.nk();
        if self.next >= nk {
            return None;
        }
        let offset = self.next;
        let end = offset.saturating_add(self.max_kpoint_num).min(nk);
        let mut kvec = Array2::<f64>::zeros((end - offset, 3));
        for (mut row, index) in kvec.outer_iter_mut().zip(offset..end) {
            let k = self.cell.kpoint(index);
            row[0] = k[0];
            row[1] = k[1];
            row[2] = k[2];
        }
        self.next = end;
        Some(KBatch { offset, kvec })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for KMeshBatches {}

/// Index range of a batch of `nk` points owned by `rank` out of `size` workers.
///
/// The first `nk % size` ranks receive one extra point. A rank may own nothing.
pub fn local_block(nk: usize, size: usize, rank: usize) -> Range<usize> {
    let size = size.max(1);
    let base = nk / size;
    let rem = nk % size;
    let start = rank * base + rank.min(rem);
    let len = if rank < rem { base + 1 } else { base };
    let start = start.min(nk);
    start..(start + len).min(nk)
}

/// The part of `batch` this worker computes, keeping track of mesh indices.
pub fn local_kpoints(batch: &KBatch, size: usize, rank: usize) -> KBatch {
    let range = local_block(batch.len(), size, rank);
    KBatch {
        offset: batch.offset + range.start,
        kvec: batch.kvec.slice(s![range, ..]).to_owned(),
    }
}
