//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - built from CLI flags or loaded from a JSON settings file
//! - embedded in exported solution files
//! - reloaded later for plotting

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::FitError;
use crate::fit::EqualityConstraint;
use crate::math::{BasisLibrary, SmoothStepBasis, StepBasis};

/// Default scale applied to the median of `Aᵗb` to obtain the NNLS tolerance.
pub const NNLS_TOLERANCE_SCALE: f64 = 1e-12;

/// Monotone curve used inside the transition window of a smooth-step function.
///
/// Every curve maps `[0, 1]` onto `[0, 1]` with `f(0) = 0` and `f(1) = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SmoothstepCurve {
    /// `x`
    Linear,
    /// `3x² − 2x³`
    #[default]
    Cubic,
    /// `6x⁵ − 15x⁴ + 10x³`
    Quintic,
}

impl SmoothstepCurve {
    pub fn apply(self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        match self {
            SmoothstepCurve::Linear => x,
            SmoothstepCurve::Cubic => x * x * (3.0 - 2.0 * x),
            SmoothstepCurve::Quintic => x * x * x * (x * (6.0 * x - 15.0) + 10.0),
        }
    }
}

/// How samples reach each system's accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SampleOrder {
    /// Buffer every system's samples, sort them by floor, then accumulate.
    #[default]
    Sorted,
    /// Accumulate as samples arrive; the producer guarantees non-decreasing floors per system.
    Monotonic,
}

/// Which basis library family to fit with.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BasisSettings {
    /// Hard steps: function `i` is 1 for `v ≤ i`, else 0.
    #[default]
    Step,
    /// Smooth steps with a transition window of up to `max_width` domain values.
    SmoothStep {
        #[serde(default = "default_min_width")]
        min_width: usize,
        max_width: usize,
        /// Defaults to `resolution − min_width + 1`.
        #[serde(default)]
        function_count: Option<usize>,
        #[serde(default)]
        curve: SmoothstepCurve,
    },
}

fn default_min_width() -> usize {
    1
}

/// Settings for one fitting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    /// Number of discrete domain values (and, for hard steps, library functions).
    pub resolution: usize,
    /// Mix between the "diffuse" (linear) and "specular" (squared) constant-term accumulation.
    pub metallicity: f64,
    pub basis: BasisSettings,
    /// Number of simultaneously fitted functions per system.
    pub instance_count: usize,
    /// Number of observation channels (e.g. 3 for RGB).
    pub observation_count: usize,
    /// NNLS tolerance = `tolerance_scale × median(Aᵗb)`.
    pub tolerance_scale: f64,
    pub sample_order: SampleOrder,
    /// Optional cap on active-set iterations (defaults to `3 × variable_count`).
    pub max_iterations: Option<usize>,
    /// Constrain the instance constants of every system to sum to this value.
    pub constant_sum: Option<f64>,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            resolution: 32,
            metallicity: 0.0,
            basis: BasisSettings::Step,
            instance_count: 1,
            observation_count: 3,
            tolerance_scale: NNLS_TOLERANCE_SCALE,
            sample_order: SampleOrder::Sorted,
            max_iterations: None,
            constant_sum: None,
        }
    }
}

impl FitSettings {
    pub fn validate(&self) -> Result<(), FitError> {
        if self.resolution < 1 {
            return Err(FitError::invalid("resolution must be >= 1"));
        }
        if self.instance_count < 1 {
            return Err(FitError::invalid("instance_count must be >= 1"));
        }
        if self.observation_count < 1 {
            return Err(FitError::invalid("observation_count must be >= 1"));
        }
        if !(self.tolerance_scale.is_finite() && self.tolerance_scale > 0.0) {
            return Err(FitError::invalid(format!(
                "tolerance_scale must be finite and > 0 (got {})",
                self.tolerance_scale
            )));
        }
        if !self.metallicity.is_finite() {
            return Err(FitError::invalid("metallicity must be finite"));
        }
        if let Some(sum) = self.constant_sum {
            if !(sum.is_finite() && sum >= 0.0) {
                return Err(FitError::invalid(format!(
                    "constant_sum must be finite and >= 0 (got {sum})"
                )));
            }
        }
        if let BasisSettings::SmoothStep {
            function_count: Some(0),
            ..
        } = self.basis
        {
            return Err(FitError::invalid("smooth-step function_count must be >= 1"));
        }
        Ok(())
    }

    /// Equality constraints appended to every system.
    pub fn constraints(&self) -> Vec<EqualityConstraint> {
        self.constant_sum
            .map(|sum| EqualityConstraint::on_constants(self.instance_count, |_| 1.0, sum))
            .into_iter()
            .collect()
    }

    /// Instantiate the configured basis library.
    pub fn basis_library(&self) -> Result<Box<dyn BasisLibrary>, FitError> {
        self.validate()?;
        match &self.basis {
            BasisSettings::Step => Ok(Box::new(StepBasis::new(self.resolution, self.metallicity)?)),
            BasisSettings::SmoothStep {
                min_width,
                max_width,
                function_count,
                curve,
            } => {
                let min_width = (*min_width).max(1);
                let function_count = function_count
                    .unwrap_or_else(|| (self.resolution + 1).saturating_sub(min_width).max(1));
                Ok(Box::new(SmoothStepBasis::with_curve(
                    self.resolution,
                    self.metallicity,
                    min_width,
                    *max_width,
                    function_count,
                    *curve,
                )?))
            }
        }
    }
}

/// Parameters of the seeded synthetic view stream used by `bfit fit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Number of systems (texels).
    pub texel_count: usize,
    /// Number of batches (views) in the stream.
    pub view_count: usize,
    pub seed: u64,
    /// Standard deviation of additive Gaussian noise on each observation.
    pub noise_sigma: f64,
    /// Probability that a texel is visible (valid) in a given view.
    pub visibility: f64,
    /// Fraction of texels that are never visible.
    pub hole_fraction: f64,
    /// Domain positions are drawn from `[0, resolution × overshoot)`.
    pub overshoot: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            texel_count: 64,
            view_count: 48,
            seed: 42,
            noise_sigma: 0.0,
            visibility: 0.8,
            hole_fraction: 0.05,
            overshoot: 1.1,
        }
    }
}

impl SyntheticConfig {
    pub fn validate(&self) -> Result<(), FitError> {
        if !(0.0..=1.0).contains(&self.visibility) {
            return Err(FitError::invalid("visibility must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.hole_fraction) {
            return Err(FitError::invalid("hole_fraction must be within [0, 1]"));
        }
        if !(self.noise_sigma.is_finite() && self.noise_sigma >= 0.0) {
            return Err(FitError::invalid("noise_sigma must be finite and >= 0"));
        }
        if !(self.overshoot.is_finite() && self.overshoot > 0.0) {
            return Err(FitError::invalid("overshoot must be finite and > 0"));
        }
        Ok(())
    }
}

/// Fully resolved configuration of a `bfit fit` run.
#[derive(Debug, Clone)]
pub struct FitConfig {
    pub settings: FitSettings,
    pub synthetic: SyntheticConfig,
    /// Cross-check the streamed matrices of a few systems against the dense reference.
    pub validate: bool,
    pub plot: bool,
    pub plot_system: usize,
    pub plot_width: usize,
    pub plot_height: usize,
    pub export: Option<PathBuf>,
    pub export_csv: Option<PathBuf>,
}
