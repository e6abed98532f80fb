//! Running sums for the streaming normal-equation build.
//!
//! Each sample contributes products of its weights to a handful of sums. With
//! `sa = sample_weight · analytic · weight(b1)`, `wa = sa · weight(b2)` and blending weight `t`:
//!
//! | sum                                  | term            | shape                  |
//! |--------------------------------------|-----------------|------------------------|
//! | `weighted_analytic`                  | `wa`            | instance × instance    |
//! | `weighted_analytic_blended`          | `wa · t`        | instance × instance    |
//! | `weighted_analytic_squared`          | `wa · a`        | instance × instance    |
//! | `weighted_analytic_squared_blended`  | `wa · a · t`    | instance × instance    |
//! | `..._squared_blended_squared`        | `wa · a · t²`   | instance × instance    |
//! | `weighted_analytic_times_observed`   | `sa · y`        | observation × instance |
//! | `..._times_observed_blended`         | `sa · y · t`    | observation × instance |
//!
//! Two sets are kept. The transient set only covers the current floor and is cleared every time
//! the build moves to a higher floor. The cumulative set covers every sample accepted so far; only
//! its unblended sums are read, since it feeds functions saturated at 1.

use nalgebra::DMatrix;

use crate::fit::Sample;

/// The seven weighted sums over a group of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SumSet {
    pub weighted_analytic: DMatrix<f64>,
    pub weighted_analytic_blended: DMatrix<f64>,
    pub weighted_analytic_squared: DMatrix<f64>,
    pub weighted_analytic_squared_blended: DMatrix<f64>,
    pub weighted_analytic_squared_blended_squared: DMatrix<f64>,
    pub weighted_analytic_times_observed: DMatrix<f64>,
    pub weighted_analytic_times_observed_blended: DMatrix<f64>,
}

impl SumSet {
    pub fn zeros(instance_count: usize, observation_count: usize) -> Self {
        let square = DMatrix::zeros(instance_count, instance_count);
        let observed = DMatrix::zeros(observation_count, instance_count);
        Self {
            weighted_analytic: square.clone(),
            weighted_analytic_blended: square.clone(),
            weighted_analytic_squared: square.clone(),
            weighted_analytic_squared_blended: square.clone(),
            weighted_analytic_squared_blended_squared: square,
            weighted_analytic_times_observed: observed.clone(),
            weighted_analytic_times_observed_blended: observed,
        }
    }

    pub fn fill_zero(&mut self) {
        self.weighted_analytic.fill(0.0);
        self.weighted_analytic_blended.fill(0.0);
        self.weighted_analytic_squared.fill(0.0);
        self.weighted_analytic_squared_blended.fill(0.0);
        self.weighted_analytic_squared_blended_squared.fill(0.0);
        self.weighted_analytic_times_observed.fill(0.0);
        self.weighted_analytic_times_observed_blended.fill(0.0);
    }

    fn add(&mut self, sample: &Sample) {
        let instances = self.weighted_analytic.nrows().min(sample.weight_by_instance.len());
        let observations = self
            .weighted_analytic_times_observed
            .nrows()
            .min(sample.observed.len());
        let t = sample.blending_weight;
        let a = sample.analytic;

        for b1 in 0..instances {
            let sa = a * sample.weight_by_instance[b1] * sample.sample_weight;

            for (ch, &y) in sample.observed[..observations].iter().enumerate() {
                self.weighted_analytic_times_observed[(ch, b1)] += sa * y;
                self.weighted_analytic_times_observed_blended[(ch, b1)] += sa * y * t;
            }

            for b2 in 0..instances {
                let wa = sa * sample.weight_by_instance[b2];
                let was = wa * a;
                self.weighted_analytic[(b1, b2)] += wa;
                self.weighted_analytic_blended[(b1, b2)] += wa * t;
                self.weighted_analytic_squared[(b1, b2)] += was;
                self.weighted_analytic_squared_blended[(b1, b2)] += was * t;
                self.weighted_analytic_squared_blended_squared[(b1, b2)] += was * t * t;
            }
        }
    }

    /// Metallicity mix of the constant/library cross term: `m · Σ wa·a + (1 − m) · Σ wa`.
    pub fn cross(&self, metallicity: f64, b1: usize, b2: usize) -> f64 {
        metallicity * self.weighted_analytic_squared[(b1, b2)]
            + (1.0 - metallicity) * self.weighted_analytic[(b1, b2)]
    }

    /// Blended counterpart of [`SumSet::cross`].
    pub fn cross_blended(&self, metallicity: f64, b1: usize, b2: usize) -> f64 {
        metallicity * self.weighted_analytic_squared_blended[(b1, b2)]
            + (1.0 - metallicity) * self.weighted_analytic_blended[(b1, b2)]
    }
}

/// Accumulator for one system's build pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningSums {
    cumulative: SumSet,
    transient: SumSet,
}

impl RunningSums {
    pub fn new(instance_count: usize, observation_count: usize) -> Self {
        Self {
            cumulative: SumSet::zeros(instance_count, observation_count),
            transient: SumSet::zeros(instance_count, observation_count),
        }
    }

    pub fn instance_count(&self) -> usize {
        self.transient.weighted_analytic.nrows()
    }

    pub fn observation_count(&self) -> usize {
        self.transient.weighted_analytic_times_observed.nrows()
    }

    /// Add one sample's terms to both sets.
    ///
    /// Samples outside the optimized domain must not be passed here; they only touch the
    /// constant-term block of the system.
    pub fn accept(&mut self, sample: &Sample) {
        self.cumulative.add(sample);
        self.transient.add(sample);
    }

    /// Zero the transient set. The cumulative set is never cleared during a build.
    pub fn clear_transient_sums(&mut self) {
        self.transient.fill_zero();
    }

    pub fn cumulative(&self) -> &SumSet {
        &self.cumulative
    }

    pub fn transient(&self) -> &SumSet {
        &self.transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(actual: f64, analytic: f64, weight: f64, instances: Vec<f64>, observed: Vec<f64>) -> Sample {
        Sample::new(actual, 8, analytic, weight, instances, observed)
    }

    #[test]
    fn accept_accumulates_every_term() {
        let mut sums = RunningSums::new(2, 1);
        let s = sample(2.25, 0.5, 2.0, vec![1.0, 0.5], vec![3.0]);
        sums.accept(&s);

        let t = 0.75;
        let tr = sums.transient();
        // sa(b1=0) = 0.5 · 1 · 2 = 1; wa(0,1) = 0.5; was(0,1) = 0.25.
        assert_relative_eq!(tr.weighted_analytic[(0, 1)], 0.5);
        assert_relative_eq!(tr.weighted_analytic_blended[(0, 1)], 0.5 * t);
        assert_relative_eq!(tr.weighted_analytic_squared[(0, 1)], 0.25);
        assert_relative_eq!(tr.weighted_analytic_squared_blended[(0, 1)], 0.25 * t);
        assert_relative_eq!(tr.weighted_analytic_squared_blended_squared[(0, 1)], 0.25 * t * t);
        assert_relative_eq!(tr.weighted_analytic_times_observed[(0, 1)], 0.5 * 3.0);
        assert_relative_eq!(tr.weighted_analytic_times_observed_blended[(0, 0)], 3.0 * t);

        assert_eq!(sums.cumulative(), tr);
    }

    #[test]
    fn clearing_keeps_cumulative_totals() {
        let mut sums = RunningSums::new(1, 2);
        sums.accept(&sample(0.5, 1.0, 1.0, vec![1.0], vec![1.0, 2.0]));
        sums.clear_transient_sums();
        sums.accept(&sample(1.5, 1.0, 1.0, vec![1.0], vec![1.0, 2.0]));

        assert_relative_eq!(sums.transient().weighted_analytic[(0, 0)], 1.0);
        assert_relative_eq!(sums.cumulative().weighted_analytic[(0, 0)], 2.0);
        assert_relative_eq!(sums.cumulative().weighted_analytic_times_observed[(1, 0)], 4.0);
        assert_relative_eq!(sums.cumulative().weighted_analytic_squared[(0, 0)], 2.0);
    }

    #[test]
    fn cross_term_mixes_by_metallicity() {
        let mut sums = RunningSums::new(1, 1);
        sums.accept(&sample(0.0, 0.5, 1.0, vec![1.0], vec![0.0]));
        let tr = sums.transient();
        assert_relative_eq!(tr.cross(0.0, 0, 0), 0.5);
        assert_relative_eq!(tr.cross(1.0, 0, 0), 0.25);
        assert_relative_eq!(tr.cross_blended(0.5, 0, 0), 0.375);
    }
}
