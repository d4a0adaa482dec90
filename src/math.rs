use faer::MatRef;
use itertools::izip;
use multiversion::multiversion;

#[multiversion(targets("x86_64+avx+avx2+fma", "x86+sse"))]
pub(crate) fn axpy(x: &[f64], y: &mut [f64], a: f64) {
    assert!(x.len() == y.len());
    izip!(x, y).for_each(|(x, y)| *y = a.mul_add(*x, *y));
}

#[multiversion(targets("x86_64+avx+avx2+fma", "x86+sse"))]
pub(crate) fn vector_dot(a: &[f64], b: &[f64]) -> f64 {
    assert!(a.len() == b.len());
    izip!(a, b).map(|(a, b)| a * b).sum()
}

/// `out = m * x` for a square matrix view.
pub(crate) fn mat_vec(m: MatRef<'_, f64>, x: &[f64], out: &mut [f64]) {
    let dim = x.len();
    assert!(m.nrows() == dim);
    assert!(m.ncols() == dim);
    assert!(out.len() == dim);

    for i in 0..dim {
        let mut sum = 0.0;
        for j in 0..dim {
            sum += m[(i, j)] * x[j];
        }
        out[i] = sum;
    }
}

/// Quadratic-form kinetic term `0.5 * p' * m * p`.
pub(crate) fn scaled_dot_product(m: MatRef<'_, f64>, p: &[f64]) -> f64 {
    let mut scratch = vec![0f64; p.len()];
    mat_vec(m, p, &mut scratch);
    0.5 * vector_dot(p, &scratch)
}
