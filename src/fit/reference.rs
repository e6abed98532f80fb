//! Dense reference construction of a system's normal equations.
//!
//! This builds the explicit design matrix `A` (one row per sample) and forms `AᵗA` / `Aᵗy`
//! directly. It costs `O(samples × variables²)` and needs every sample in memory, so it is only
//! used to cross-check the streaming builder on a few systems.

use nalgebra::DMatrix;

use crate::fit::{make_sample, AugmentedSystem, Sample, SampleModel};
use crate::math::BasisLibrary;

/// Default relative tolerance when comparing a streamed system to its reference.
pub const REFERENCE_TOLERANCE: f64 = 1e-3;

/// Magnitude below which entries are compared absolutely.
const ABSOLUTE_FLOOR: f64 = 1e-9;

/// `AᵗA` and `Aᵗy` (one column per channel) of the core block.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSystem {
    pub lhs: DMatrix<f64>,
    pub rhs: DMatrix<f64>,
}

/// Build the reference normal equations of one system from its samples.
///
/// Rows are scaled by `sqrt(sample_weight)`. Constant columns hold
/// `weight(b) · (metallicity · analytic + 1 − metallicity)`; library columns hold
/// `weight(b) · analytic · (t · f(k, floor) + (1 − t) · f(k, floor + 1))` for samples inside the
/// optimized domain and zero otherwise.
pub fn reference_system<B: BasisLibrary + ?Sized>(
    basis: &B,
    samples: &[Sample],
    instance_count: usize,
    observation_count: usize,
) -> ReferenceSystem {
    let function_count = basis.function_count();
    let core = instance_count * (function_count + 1);
    let metallicity = basis.metallicity();

    let mut a = DMatrix::zeros(samples.len(), core);
    let mut y = DMatrix::zeros(samples.len(), observation_count);

    for (row, sample) in samples.iter().enumerate() {
        let scale = sample.sample_weight.max(0.0).sqrt();
        let constant = sample.constant_factor(metallicity);
        let t = sample.blending_weight;

        for b in 0..instance_count.min(sample.weight_by_instance.len()) {
            let wb = sample.weight_by_instance[b];
            a[(row, b)] = scale * wb * constant;

            if sample.in_optimized_domain {
                for k in 0..function_count {
                    let value = t * basis.evaluate(k, sample.floor)
                        + (1.0 - t) * basis.evaluate(k, sample.floor + 1);
                    a[(row, instance_count * (k + 1) + b)] = scale * wb * sample.analytic * value;
                }
            }
        }

        for (ch, &observed) in sample.observed.iter().take(observation_count).enumerate() {
            y[(row, ch)] = scale * observed;
        }
    }

    let at = a.transpose();
    ReferenceSystem {
        lhs: &at * &a,
        rhs: &at * &y,
    }
}

/// Collect every sample `system` receives from `stream`, in stream order.
pub fn gather_samples<S, I, M>(
    stream: I,
    model: &M,
    domain_size: usize,
    instance_count: usize,
    observation_count: usize,
    system: usize,
) -> Vec<Sample>
where
    I: IntoIterator<Item = S>,
    M: SampleModel<S> + ?Sized,
{
    stream
        .into_iter()
        .filter(|batch| model.is_valid(batch, system))
        .map(|batch| {
            make_sample(
                model,
                &batch,
                system,
                domain_size,
                instance_count,
                observation_count,
            )
        })
        .collect()
}

/// Location of a matrix entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Lhs { row: usize, col: usize },
    Rhs { row: usize, channel: usize },
}

/// Outcome of comparing a streamed system with its reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceCheck {
    pub max_relative_error: f64,
    /// Number of entries outside the tolerance.
    pub mismatches: usize,
    /// Entry with the largest relative error, with (streamed, reference) values.
    pub worst: Option<(Entry, f64, f64)>,
}

impl ReferenceCheck {
    pub fn passed(&self) -> bool {
        self.mismatches == 0
    }
}

fn relative_error(built: f64, reference: f64) -> f64 {
    let magnitude = built.abs().max(reference.abs()).max(ABSOLUTE_FLOOR);
    (built - reference).abs() / magnitude
}

/// Compare the core block of `built` against `reference` entry by entry.
pub fn check_against_reference(
    built: &AugmentedSystem,
    reference: &ReferenceSystem,
    tolerance: f64,
) -> ReferenceCheck {
    let mut check = ReferenceCheck {
        max_relative_error: 0.0,
        mismatches: 0,
        worst: None,
    };

    let mut visit = |entry: Entry, b: f64, r: f64| {
        let error = relative_error(b, r);
        if !(error <= tolerance) {
            check.mismatches += 1;
        }
        if check.worst.is_none() || error > check.max_relative_error || error.is_nan() {
            check.max_relative_error = error;
            check.worst = Some((entry, b, r));
        }
    };

    let lhs = built.core_lhs();
    let n = lhs.nrows().min(reference.lhs.nrows());
    for row in 0..n {
        for col in 0..n {
            visit(Entry::Lhs { row, col }, lhs[(row, col)], reference.lhs[(row, col)]);
        }
    }

    let rhs = built.core_rhs();
    let channels = rhs.ncols().min(reference.rhs.ncols());
    for row in 0..n {
        for channel in 0..channels {
            visit(
                Entry::Rhs { row, channel },
                rhs[(row, channel)],
                reference.rhs[(row, channel)],
            );
        }
    }

    if lhs.nrows() != reference.lhs.nrows() || rhs.ncols() != reference.rhs.ncols() {
        check.mismatches += 1;
    }
    check
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::StepBasis;
    use approx::assert_relative_eq;

    #[test]
    fn reference_rows_follow_the_design_matrix() {
        let basis = StepBasis::new(2, 0.0).unwrap();
        let samples = vec![Sample::new(0.5, 2, 1.0, 4.0, vec![1.0], vec![1.0])];
        let reference = reference_system(&basis, &samples, 1, 1);

        // t = 0.5; F_0 = 0.5 · 1 + 0.5 · 0, F_1 = 1. Scaled by sqrt(4): a = [2, 1, 2], y = 2.
        let a = [2.0, 1.0, 2.0];
        for i in 0..3 {
            assert_relative_eq!(reference.rhs[(i, 0)], a[i] * 2.0);
            for j in 0..3 {
                assert_relative_eq!(reference.lhs[(i, j)], a[i] * a[j]);
            }
        }
    }

    #[test]
    fn identical_systems_pass_and_perturbed_ones_fail() {
        let basis = StepBasis::new(2, 0.0).unwrap();
        let samples = vec![Sample::new(0.5, 2, 1.0, 1.0, vec![1.0], vec![1.0])];
        let reference = reference_system(&basis, &samples, 1, 1);

        let built = AugmentedSystem::from_parts(reference.lhs.clone(), reference.rhs.clone(), 0).unwrap();
        let check = check_against_reference(&built, &reference, REFERENCE_TOLERANCE);
        assert!(check.passed());
        assert_eq!(check.max_relative_error, 0.0);

        let mut lhs = reference.lhs.clone();
        lhs[(1, 1)] *= 1.01;
        let built = AugmentedSystem::from_parts(lhs, reference.rhs.clone(), 0).unwrap();
        let check = check_against_reference(&built, &reference, REFERENCE_TOLERANCE);
        assert_eq!(check.mismatches, 1);
        assert!(matches!(check.worst, Some((Entry::Lhs { row: 1, col: 1 }, _, _))));
    }
}
