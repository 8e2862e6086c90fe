use ndarray::*;
use num_complex::Complex;

/// Real part of $2i\\,xy$.
///
/// Since $\tx{Re}(2i z)=-2\tx{Im}(z)$ this is the same number as $-2\tx{Im}(xy)$,
/// which is the form used in the Berry curvature
/// $$\Og_n^c=\sum_{m\neq n}\f{\tx{Re}\lt(2i\\,v^a_{nm}v^b_{mn}\rt)}{(\ve_m-\ve_n)^2}.$$
#[inline(always)]
pub fn re_two_i(x: Complex<f64>, y: Complex<f64>) -> f64 {
    -2.0 * (x * y).im
}

/// Determinant of a 3$\times$3 matrix.
#[allow(non_snake_case)]
#[inline(always)]
pub fn det3<S: Data<Elem = f64>>(A: &ArrayBase<S, Ix2>) -> f64 {
    A[[0, 0]] * (A[[1, 1]] * A[[2, 2]] - A[[1, 2]] * A[[2, 1]])
        - A[[0, 1]] * (A[[1, 0]] * A[[2, 2]] - A[[1, 2]] * A[[2, 0]])
        + A[[0, 2]] * (A[[1, 0]] * A[[2, 1]] - A[[1, 1]] * A[[2, 0]])
}

/// Converts a fractional k vector into cartesian coordinates.
///
/// `reciprocal` stores $\bm b_1,\bm b_2,\bm b_3$ along axis 0, so the result is
/// $\sum_i k_i\bm b_i$.
#[inline(always)]
pub fn direct_to_cartesian<S: Data<Elem = f64>>(
    k_direct: &[f64; 3],
    reciprocal: &ArrayBase<S, Ix2>,
) -> Array1<f64> {
    let k = arr1(k_direct);
    k.dot(reciprocal)
}
