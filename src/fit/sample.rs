//! One observation as seen by a single system.

/// A sample contributing to one system.
///
/// `actual` is the real-valued domain position; the basis functions are tabulated at integers, so
/// every library term is linearly interpolated between `floor` and `floor + 1` with weight
/// `blending_weight` on the lower end.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub actual: f64,
    /// `actual` truncated and clamped to `[0, domain_size)`.
    pub floor: usize,
    /// Whether `actual` lies inside the library's representable range.
    pub in_optimized_domain: bool,
    /// Fixed multiplicative factor that is not optimized.
    pub analytic: f64,
    /// Least-squares weight.
    pub sample_weight: f64,
    /// Weight of `floor` in the interpolation, in `[0, 1]`; zero outside the optimized domain.
    pub blending_weight: f64,
    /// How strongly each fitted instance applies to this sample.
    pub weight_by_instance: Vec<f64>,
    /// One value per observation channel.
    pub observed: Vec<f64>,
}

impl Sample {
    /// Derive `floor`, `in_optimized_domain` and `blending_weight` from `actual`.
    ///
    /// Negative positions clamp to floor 0 with full weight on it. NaN is treated as out of
    /// the optimized domain.
    pub fn new(
        actual: f64,
        domain_size: usize,
        analytic: f64,
        sample_weight: f64,
        weight_by_instance: Vec<f64>,
        observed: Vec<f64>,
    ) -> Self {
        let last = domain_size.saturating_sub(1);
        let in_optimized_domain = actual < domain_size as f64;
        let floor = if actual.is_nan() {
            last
        } else {
            (actual.max(0.0).floor() as usize).min(last)
        };
        let blending_weight = if in_optimized_domain {
            (1.0 + floor as f64 - actual).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            actual,
            floor,
            in_optimized_domain,
            analytic,
            sample_weight,
            blending_weight,
            weight_by_instance,
            observed,
        }
    }

    /// Instance count of this sample.
    pub fn instance_count(&self) -> usize {
        self.weight_by_instance.len()
    }

    /// Factor multiplying the constant term of every instance:
    /// `metallicity · analytic + (1 − metallicity)`.
    pub fn constant_factor(&self, metallicity: f64) -> f64 {
        metallicity * self.analytic + (1.0 - metallicity)
    }
}
