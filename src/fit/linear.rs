//! Direct weighted least squares over a small set of per-sample basis values.
//!
//! Used for the instance weights of each system, the other half of an alternating fit: every
//! sample evaluates `weight_count` basis values `f_b` and a target `y` (each possibly
//! multi-component), and the system accumulates
//!
//! ```text
//! AᵗA[b1, b2] += w · ⟨f_b1, f_b2⟩
//! Aᵗb[b1]     += w · ⟨f_b1, y⟩
//! ```
//!
//! Unlike [`SystemMatrixBuilder`](crate::fit::SystemMatrixBuilder) there is no domain ordering,
//! so samples are added as they arrive.

use rayon::prelude::*;
use tracing::debug;

use crate::error::FitError;
use crate::fit::{AugmentedSystem, BuildOutput, EqualityConstraint};

/// Per-system view of one streamed batch for a direct linear fit.
pub trait LinearModel<S>: Sync {
    fn is_valid(&self, batch: &S, system: usize) -> bool;

    fn sample_weight(&self, batch: &S, system: usize) -> f64;

    /// Number of components of targets and basis values (e.g. 3 for RGB).
    fn component_count(&self) -> usize;

    /// Write the target value of the sample into `out`.
    fn target(&self, batch: &S, system: usize, out: &mut [f64]);

    /// Write basis function `index` evaluated at the sample into `out`.
    fn basis_value(&self, batch: &S, system: usize, index: usize, out: &mut [f64]);
}

fn inner_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

struct LinearState {
    system: AugmentedSystem,
    valid: bool,
    samples: usize,
    basis: Vec<f64>,
    target: Vec<f64>,
}

/// Builder of one augmented linear system per system index.
#[derive(Debug, Clone)]
pub struct LinearSystemBuilder {
    system_count: usize,
    weight_count: usize,
    constraints: Vec<EqualityConstraint>,
}

impl LinearSystemBuilder {
    pub fn new(
        system_count: usize,
        weight_count: usize,
        constraints: Vec<EqualityConstraint>,
    ) -> Result<Self, FitError> {
        if weight_count == 0 {
            return Err(FitError::invalid("weight_count must be >= 1"));
        }
        // Validates the constraint sizes once, up front.
        AugmentedSystem::new(weight_count, 1, &constraints)?;
        Ok(Self {
            system_count,
            weight_count,
            constraints,
        })
    }

    /// Weights that sum to one: `Σ_b w_b = 1`.
    pub fn partition_of_unity(system_count: usize, weight_count: usize) -> Result<Self, FitError> {
        Self::new(
            system_count,
            weight_count,
            vec![EqualityConstraint::from_fn(weight_count, |_| 1.0, 1.0)],
        )
    }

    pub fn weight_count(&self) -> usize {
        self.weight_count
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Consume `stream` once and build every system (single right-hand-side column).
    pub fn build<S, I, M, V>(
        &self,
        stream: I,
        model: &M,
        mark_valid: V,
    ) -> Result<BuildOutput, FitError>
    where
        I: IntoIterator<Item = S>,
        S: Sync,
        M: LinearModel<S> + ?Sized,
        V: Fn(usize) + Sync,
    {
        let template = AugmentedSystem::new(self.weight_count, 1, &self.constraints)?;
        let components = model.component_count();
        let weight_count = self.weight_count;

        let mut states: Vec<LinearState> = (0..self.system_count)
            .map(|_| LinearState {
                system: template.clone(),
                valid: false,
                samples: 0,
                basis: vec![0.0; weight_count * components],
                target: vec![0.0; components],
            })
            .collect();

        let mut batch_count = 0usize;
        for batch in stream {
            states.par_iter_mut().enumerate().for_each(|(p, state)| {
                if !model.is_valid(&batch, p) {
                    return;
                }
                if !state.valid {
                    state.valid = true;
                    mark_valid(p);
                }

                let weight = model.sample_weight(&batch, p);
                model.target(&batch, p, &mut state.target);
                for (b, chunk) in state.basis.chunks_mut(components.max(1)).enumerate() {
                    model.basis_value(&batch, p, b, chunk);
                }

                for b1 in 0..weight_count {
                    let f1 = &state.basis[b1 * components..(b1 + 1) * components];
                    state
                        .system
                        .add_to_rhs(b1, 0, weight * inner_product(f1, &state.target));
                    for b2 in 0..weight_count {
                        let f2 = &state.basis[b2 * components..(b2 + 1) * components];
                        state
                            .system
                            .add_to_lhs(b1, b2, weight * inner_product(f1, f2));
                    }
                }
                state.samples += 1;
            });
            batch_count += 1;
        }

        let mut output = BuildOutput {
            systems: Vec::with_capacity(states.len()),
            valid: Vec::with_capacity(states.len()),
            sample_counts: Vec::with_capacity(states.len()),
            batch_count,
        };
        for state in states {
            output.systems.push(state.system);
            output.valid.push(state.valid);
            output.sample_counts.push(state.samples);
        }

        debug!(
            systems = self.system_count,
            weights = weight_count,
            batches = batch_count,
            valid = output.valid_count(),
            "linear systems built"
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::nnls;
    use approx::assert_abs_diff_eq;

    /// Each batch is a list of (basis_0, basis_1, target) scalars, one per system.
    struct Pairs;

    impl LinearModel<Vec<(f64, f64, f64)>> for Pairs {
        fn is_valid(&self, batch: &Vec<(f64, f64, f64)>, system: usize) -> bool {
            batch[system].2.is_finite()
        }

        fn sample_weight(&self, _batch: &Vec<(f64, f64, f64)>, _system: usize) -> f64 {
            1.0
        }

        fn component_count(&self) -> usize {
            1
        }

        fn target(&self, batch: &Vec<(f64, f64, f64)>, system: usize, out: &mut [f64]) {
            out[0] = batch[system].2;
        }

        fn basis_value(&self, batch: &Vec<(f64, f64, f64)>, system: usize, index: usize, out: &mut [f64]) {
            out[0] = if index == 0 { batch[system].0 } else { batch[system].1 };
        }
    }

    #[test]
    fn builds_normal_equations_and_constraint_block() {
        // System 0 mixes two basis values 0.3 / 0.7 of the targets; system 1 never valid.
        let batches = vec![
            vec![(1.0, 0.0, 0.3), (0.0, 0.0, f64::NAN)],
            vec![(0.0, 1.0, 0.7), (0.0, 0.0, f64::NAN)],
            vec![(1.0, 1.0, 1.0), (0.0, 0.0, f64::NAN)],
        ];
        let builder = LinearSystemBuilder::partition_of_unity(2, 2).unwrap();
        let output = builder.build(batches, &Pairs, |_| {}).unwrap();

        assert_eq!(output.valid, vec![true, false]);
        assert_eq!(output.batch_count, 3);
        let system = &output.systems[0];
        assert_eq!(system.lhs()[(0, 0)], 2.0);
        assert_eq!(system.lhs()[(0, 1)], 1.0);
        assert_eq!(system.lhs()[(0, 2)], 1.0);
        assert_eq!(system.rhs()[(2, 0)], 1.0);
        assert!(output.systems[1].is_core_zero());

        let x = nnls::solve(system.lhs(), &system.rhs_column(0), 1e-12, 1).unwrap();
        assert_abs_diff_eq!(x[0], 0.3, epsilon = 1e-10);
        assert_abs_diff_eq!(x[1], 0.7, epsilon = 1e-10);
    }

    #[test]
    fn zero_weight_count_is_rejected() {
        assert!(LinearSystemBuilder::new(1, 0, Vec::new()).is_err());
    }
}
