//! Augmented normal-equation systems.
//!
//! Layout of one system with `I` instances, `F` library functions and `C` constraints:
//!
//! ```text
//! index 0 .. I                       constant term of instance b
//! index I·(k+1) + b                  library function k, instance b
//! index core .. core + C             constraint rows/columns (Lagrange multipliers)
//! ```
//!
//! with `core = I·(F+1)`. The right-hand side has one column per observation channel; every
//! channel shares the same `AᵗA`.
//!
//! The constraint block is written once by [`AugmentedSystem::new`]. Accumulation goes through
//! [`AugmentedSystem::add_to_lhs`] / [`AugmentedSystem::add_to_rhs`], which only address the core
//! block.

use nalgebra::{DMatrix, DMatrixView, DVector};

use crate::error::FitError;

/// A linear equality constraint `Σ_j coefficients[j] · x_j = rhs` over the core variables.
///
/// Coefficients beyond the given slice are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualityConstraint {
    pub coefficients: Vec<f64>,
    pub rhs: f64,
}

impl EqualityConstraint {
    pub fn new(coefficients: Vec<f64>, rhs: f64) -> Self {
        Self { coefficients, rhs }
    }

    /// Build the coefficients from a function of the core variable index.
    pub fn from_fn(size: usize, f: impl Fn(usize) -> f64, rhs: f64) -> Self {
        Self {
            coefficients: (0..size).map(f).collect(),
            rhs,
        }
    }

    /// Constraint on the constant terms only: `Σ_b weight(b) · constant_b = rhs`.
    pub fn on_constants(instance_count: usize, weight: impl Fn(usize) -> f64, rhs: f64) -> Self {
        Self::from_fn(instance_count, weight, rhs)
    }
}

/// `AᵗA` and `Aᵗb` of one system, augmented with equality constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedSystem {
    core_size: usize,
    constraint_count: usize,
    lhs: DMatrix<f64>,
    rhs: DMatrix<f64>,
}

impl AugmentedSystem {
    /// Allocate a zero system and write the constraint block.
    pub fn new(
        core_size: usize,
        channel_count: usize,
        constraints: &[EqualityConstraint],
    ) -> Result<Self, FitError> {
        let constraint_count = constraints.len();
        let n = core_size + constraint_count;
        let mut lhs = DMatrix::zeros(n, n);
        let mut rhs = DMatrix::zeros(n, channel_count);

        for (i, constraint) in constraints.iter().enumerate() {
            if constraint.coefficients.len() > core_size {
                return Err(FitError::invalid(format!(
                    "constraint {i} has {} coefficients but the system only has {core_size} variables",
                    constraint.coefficients.len()
                )));
            }
            if !constraint.rhs.is_finite() || constraint.coefficients.iter().any(|c| !c.is_finite()) {
                return Err(FitError::invalid(format!("constraint {i} is not finite")));
            }
            let row = core_size + i;
            for (j, &c) in constraint.coefficients.iter().enumerate() {
                lhs[(row, j)] = c;
                lhs[(j, row)] = c;
            }
            rhs.row_mut(row).fill(constraint.rhs);
        }

        Ok(Self {
            core_size,
            constraint_count,
            lhs,
            rhs,
        })
    }

    pub fn unconstrained(core_size: usize, channel_count: usize) -> Self {
        Self {
            core_size,
            constraint_count: 0,
            lhs: DMatrix::zeros(core_size, core_size),
            rhs: DMatrix::zeros(core_size, channel_count),
        }
    }

    /// Reassemble a system from raw parts (e.g. a reference build).
    pub fn from_parts(
        lhs: DMatrix<f64>,
        rhs: DMatrix<f64>,
        constraint_count: usize,
    ) -> Result<Self, FitError> {
        let n = lhs.nrows();
        if lhs.ncols() != n || rhs.nrows() != n || constraint_count > n {
            return Err(FitError::invalid(format!(
                "inconsistent augmented system: lhs {}x{}, rhs {}x{}, {} constraints",
                lhs.nrows(),
                lhs.ncols(),
                rhs.nrows(),
                rhs.ncols(),
                constraint_count
            )));
        }
        Ok(Self {
            core_size: n - constraint_count,
            constraint_count,
            lhs,
            rhs,
        })
    }

    pub fn core_size(&self) -> usize {
        self.core_size
    }

    pub fn constraint_count(&self) -> usize {
        self.constraint_count
    }

    pub fn size(&self) -> usize {
        self.core_size + self.constraint_count
    }

    pub fn channel_count(&self) -> usize {
        self.rhs.ncols()
    }

    #[inline]
    pub fn add_to_lhs(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.core_size && col < self.core_size);
        self.lhs[(row, col)] += value;
    }

    #[inline]
    pub fn add_to_rhs(&mut self, row: usize, channel: usize, value: f64) {
        debug_assert!(row < self.core_size);
        self.rhs[(row, channel)] += value;
    }

    pub fn lhs(&self) -> &DMatrix<f64> {
        &self.lhs
    }

    pub fn rhs(&self) -> &DMatrix<f64> {
        &self.rhs
    }

    pub fn rhs_column(&self, channel: usize) -> DVector<f64> {
        self.rhs.column(channel).into_owned()
    }

    pub fn core_lhs(&self) -> DMatrixView<'_, f64> {
        self.lhs.view((0, 0), (self.core_size, self.core_size))
    }

    pub fn core_rhs(&self) -> DMatrixView<'_, f64> {
        self.rhs.view((0, 0), (self.core_size, self.rhs.ncols()))
    }

    /// Constraint rows (`C × core`) of the left-hand side.
    pub fn constraint_block(&self) -> DMatrixView<'_, f64> {
        self.lhs
            .view((self.core_size, 0), (self.constraint_count, self.core_size))
    }

    /// True if nothing has been accumulated into the core block.
    pub fn is_core_zero(&self) -> bool {
        self.core_lhs().iter().all(|&v| v == 0.0) && self.core_rhs().iter().all(|&v| v == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_block_is_written_symmetrically() {
        let constraint = EqualityConstraint::on_constants(2, |b| (b + 1) as f64, 3.0);
        let system = AugmentedSystem::new(6, 2, &[constraint]).unwrap();

        assert_eq!(system.size(), 7);
        assert_eq!(system.lhs()[(6, 0)], 1.0);
        assert_eq!(system.lhs()[(0, 6)], 1.0);
        assert_eq!(system.lhs()[(6, 1)], 2.0);
        assert_eq!(system.lhs()[(1, 6)], 2.0);
        assert_eq!(system.lhs()[(6, 6)], 0.0);
        assert_eq!(system.rhs()[(6, 0)], 3.0);
        assert_eq!(system.rhs()[(6, 1)], 3.0);
        assert_eq!(system.constraint_block().shape(), (1, 6));
        assert!(system.is_core_zero());
    }

    #[test]
    fn oversized_constraint_is_rejected() {
        let constraint = EqualityConstraint::new(vec![1.0; 5], 1.0);
        assert!(matches!(
            AugmentedSystem::new(4, 1, &[constraint]),
            Err(FitError::InvalidArgument(_))
        ));
    }

    #[test]
    fn accumulation_only_touches_the_core_block() {
        let mut system = AugmentedSystem::unconstrained(3, 1);
        system.add_to_lhs(1, 2, 0.5);
        system.add_to_rhs(2, 0, 1.5);
        assert!(!system.is_core_zero());
        assert_eq!(system.rhs_column(0)[2], 1.5);
        assert_eq!(system.lhs()[(1, 2)], 0.5);
    }
}
