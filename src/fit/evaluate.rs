//! Reconstructing fitted curves from solutions.
//!
//! For a domain value `v` only the functions in the window `[first(v), last(v)]` need an explicit
//! evaluation: everything below is `0` and everything above is saturated at `1`. Suffix sums
//!
//! ```text
//! sums[F] = constant · metallicity
//! sums[k] = sums[k + 1] + coefficient(k)
//! ```
//!
//! give the saturated part in O(1), so a whole curve costs one pass over the library plus the
//! window sizes.

use crate::fit::Solution;
use crate::math::BasisLibrary;

/// Evaluates solutions of a given basis library.
#[derive(Debug, Clone, Copy)]
pub struct SolutionEvaluator<'a, B: ?Sized> {
    basis: &'a B,
}

impl<'a, B: BasisLibrary + ?Sized> SolutionEvaluator<'a, B> {
    pub fn new(basis: &'a B) -> Self {
        Self { basis }
    }

    /// `sums[k] = Σ_{j ≥ k} coefficient(j) + constant · metallicity`, length `function_count + 1`.
    pub fn suffix_sums(&self, solution: &Solution, instance: usize) -> Vec<f64> {
        let function_count = self.basis.function_count();
        let mut sums = vec![0.0; function_count + 1];
        sums[function_count] = solution.constant(instance) * self.basis.metallicity();
        for k in (0..function_count).rev() {
            sums[k] = sums[k + 1] + solution.coefficient(k, instance);
        }
        sums
    }

    fn value_with(&self, sums: &[f64], solution: &Solution, instance: usize, v: usize) -> f64 {
        let function_count = self.basis.function_count();
        if function_count == 0 || v >= self.basis.optimized_domain_size() {
            return sums[function_count];
        }
        let first = self.basis.first_function_index(v);
        let last = self.basis.last_function_index(v).min(function_count - 1);

        let mut total = sums[last + 1];
        for k in first..=last {
            total += solution.coefficient(k, instance) * self.basis.evaluate(k, v);
        }
        total
    }

    /// Fitted value of `instance` at integer domain value `v`.
    pub fn evaluate(&self, solution: &Solution, instance: usize, v: usize) -> f64 {
        let sums = self.suffix_sums(solution, instance);
        self.value_with(&sums, solution, instance, v)
    }

    /// Fitted values at every integer domain value `0..=optimized_domain_size`.
    pub fn evaluate_all(&self, solution: &Solution, instance: usize) -> Vec<f64> {
        let sums = self.suffix_sums(solution, instance);
        (0..=self.basis.optimized_domain_size())
            .map(|v| self.value_with(&sums, solution, instance, v))
            .collect()
    }

    /// Fitted value at a real-valued position, interpolated the way samples are.
    pub fn evaluate_at(&self, solution: &Solution, instance: usize, actual: f64) -> f64 {
        let domain = self.basis.optimized_domain_size();
        let sums = self.suffix_sums(solution, instance);
        if !(actual < domain as f64) {
            return sums[self.basis.function_count()];
        }
        let floor = (actual.max(0.0).floor() as usize).min(domain.saturating_sub(1));
        let t = (1.0 + floor as f64 - actual).clamp(0.0, 1.0);
        t * self.value_with(&sums, solution, instance, floor)
            + (1.0 - t) * self.value_with(&sums, solution, instance, floor + 1)
    }
}
