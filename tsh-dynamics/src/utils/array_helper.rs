use crate::c64;
use nalgebra::DMatrix;
use ndarray::prelude::*;

/// Copy an ndarray matrix into a nalgebra matrix
pub fn to_nalgebra(matrix: ArrayView2<c64>) -> DMatrix<c64> {
    DMatrix::from_fn(matrix.nrows(), matrix.ncols(), |i, j| matrix[[i, j]])
}

/// Copy a nalgebra matrix into an ndarray matrix
pub fn to_ndarray(matrix: &DMatrix<c64>) -> Array2<c64> {
    Array2::from_shape_fn((matrix.nrows(), matrix.ncols()), |(i, j)| matrix[(i, j)])
}

/// Conjugate transpose
pub fn adjoint(matrix: ArrayView2<c64>) -> Array2<c64> {
    matrix.t().mapv(|val| val.conj())
}

/// Promote a real matrix to a complex one
pub fn to_complex(matrix: ArrayView2<f64>) -> Array2<c64> {
    matrix.mapv(|val| c64::new(val, 0.0))
}

/// Eigendecomposition of a Hermitian matrix. The eigenvalues are returned in ascending
/// order, the eigenvectors are the columns of the second array.
/// Only the Hermitian part of the input is used.
pub fn eigh(matrix: ArrayView2<c64>) -> (Array1<f64>, Array2<c64>) {
    let n: usize = matrix.nrows();
    let hermitian: DMatrix<c64> =
        DMatrix::from_fn(n, n, |i, j| 0.5 * (matrix[[i, j]] + matrix[[j, i]].conj()));
    let decomposition = hermitian.symmetric_eigen();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| {
        decomposition.eigenvalues[*a].total_cmp(&decomposition.eigenvalues[*b])
    });

    let values: Array1<f64> = order
        .iter()
        .map(|idx| decomposition.eigenvalues[*idx])
        .collect();
    let vectors: Array2<c64> =
        Array2::from_shape_fn((n, n), |(i, j)| decomposition.eigenvectors[(i, order[j])]);
    (values, vectors)
}

/// The short-time propagator exp(-i H tau) of a Hermitian matrix H.
/// The result is unitary up to the accuracy of the eigendecomposition.
pub fn unitary_propagator(hamiltonian: ArrayView2<c64>, tau: f64) -> Array2<c64> {
    let (eig, eig_vec): (Array1<f64>, Array2<c64>) = eigh(hamiltonian);
    let diag: Array1<c64> = eig.mapv(|val| c64::new(0.0, -val * tau).exp());
    let scaled: Array2<c64> = &eig_vec * &diag.view().insert_axis(Axis(0));
    scaled.dot(&adjoint(eig_vec.view()))
}

/// Squared moduli of the amplitudes
pub fn populations(coefficients: ArrayView1<c64>) -> Array1<f64> {
    coefficients.mapv(|val| val.norm_sqr())
}

/// Sum of the squared moduli of the amplitudes
pub fn squared_norm(coefficients: ArrayView1<c64>) -> f64 {
    coefficients.iter().map(|val| val.norm_sqr()).sum()
}

/// Normalize the state coefficients in place. A zero vector is left untouched.
pub fn normalize_coefficients(mut coefficients: ArrayViewMut1<c64>) {
    let norm: f64 = squared_norm(coefficients.view()).sqrt();
    if norm > 0.0 {
        coefficients.mapv_inplace(|val| val / norm);
    }
}

/// True if every element is finite
pub fn all_finite(array: ArrayView2<f64>) -> bool {
    array.iter().all(|val| val.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn test_matrix() -> Array2<c64> {
        array![
            [c64::new(1.0, 0.0), c64::new(0.2, 0.1), c64::new(0.0, -0.3)],
            [c64::new(0.2, -0.1), c64::new(-0.5, 0.0), c64::new(0.05, 0.0)],
            [c64::new(0.0, 0.3), c64::new(0.05, 0.0), c64::new(0.25, 0.0)]
        ]
    }

    #[test]
    fn eigh_reconstructs_hermitian_matrix() {
        let h: Array2<c64> = test_matrix();
        let (eig, vecs) = eigh(h.view());
        for k in 1..eig.len() {
            assert!(eig[k - 1] <= eig[k]);
        }
        let diag: Array2<c64> = Array2::from_diag(&eig.mapv(|val| c64::new(val, 0.0)));
        let rebuilt: Array2<c64> = vecs.dot(&diag).dot(&adjoint(vecs.view()));
        for (a, b) in rebuilt.iter().zip(h.iter()) {
            assert_abs_diff_eq!(a.re, b.re, epsilon = 1e-12);
            assert_abs_diff_eq!(a.im, b.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn propagator_is_unitary() {
        let u: Array2<c64> = unitary_propagator(test_matrix().view(), 0.7);
        let identity: Array2<c64> = adjoint(u.view()).dot(&u);
        for i in 0..3 {
            for j in 0..3 {
                let expected: f64 = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(identity[[i, j]].re, expected, epsilon = 1e-12);
                assert_abs_diff_eq!(identity[[i, j]].im, 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn propagator_of_diagonal_matrix_is_phase() {
        let h: Array2<c64> = array![
            [c64::new(0.5, 0.0), c64::new(0.0, 0.0)],
            [c64::new(0.0, 0.0), c64::new(-1.0, 0.0)]
        ];
        let u: Array2<c64> = unitary_propagator(h.view(), 2.0);
        let expected: c64 = c64::new(0.0, -1.0).exp();
        assert_abs_diff_eq!(u[[0, 0]].re, expected.re, epsilon = 1e-12);
        assert_abs_diff_eq!(u[[0, 0]].im, expected.im, epsilon = 1e-12);
        assert_abs_diff_eq!(u[[0, 1]].norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn normalization() {
        let mut c: Array1<c64> = array![c64::new(3.0, 0.0), c64::new(0.0, 4.0)];
        normalize_coefficients(c.view_mut());
        assert_abs_diff_eq!(squared_norm(c.view()), 1.0, epsilon = 1e-14);
        let mut zero: Array1<c64> = Array1::zeros(2);
        normalize_coefficients(zero.view_mut());
        assert_eq!(squared_norm(zero.view()), 0.0);
    }
}
