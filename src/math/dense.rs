//! Dense solve for the small reduced systems of the active-set iteration.
//!
//! The reduced systems are square and symmetric but indefinite once equality constraints are
//! present (the multiplier block has zeros on its diagonal), so Cholesky is not an option. We
//! use LU with partial pivoting and treat a pivot that is tiny relative to the largest entry as
//! singular.

use nalgebra::{DMatrix, DVector};

/// Pivots below `PIVOT_TOLERANCE × max|m|` are considered zero.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Solve `m · x = b` for square `m`.
///
/// Returns `None` if `m` is singular (numerically) or the result is not finite.
pub fn solve_dense(m: DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let n = m.nrows();
    if n != m.ncols() || n != b.len() {
        return None;
    }
    if n == 0 {
        return Some(DVector::zeros(0));
    }

    let scale = m.amax();
    if !(scale.is_finite() && scale > 0.0) {
        return None;
    }

    let lu = m.lu();
    let min_pivot = lu.u().diagonal().amin();
    if !(min_pivot > scale * PIVOT_TOLERANCE) {
        return None;
    }

    let x = lu.solve(b)?;
    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_simple_system() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0]);
        let x = solve_dense(m.clone(), &b).unwrap();
        let residual = &m * &x - &b;
        assert!(residual.amax() < 1e-12);
    }

    #[test]
    fn solves_saddle_point_system() {
        // [[2, 1], [1, 0]]: an indefinite KKT block.
        let m = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 0.0]);
        let b = DVector::from_row_slice(&[2.0, 1.0]);
        let x = solve_dense(m, &b).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);
    }

    #[test]
    fn rejects_singular_and_zero_matrices() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0]);
        assert!(solve_dense(m, &b).is_none());
        assert!(solve_dense(DMatrix::zeros(3, 3), &DVector::zeros(3)).is_none());
    }

    #[test]
    fn empty_system_has_empty_solution() {
        let x = solve_dense(DMatrix::zeros(0, 0), &DVector::zeros(0)).unwrap();
        assert_eq!(x.len(), 0);
    }
}
