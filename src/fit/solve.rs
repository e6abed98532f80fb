//! Solving every built system.
//!
//! Systems are independent, so they are solved in parallel. Each rayon worker keeps its own
//! [`NnlsWorkspace`] (via `map_init`) so the active-set bookkeeping is allocated once per worker
//! instead of once per solve.
//!
//! The NNLS tolerance is relative to the data: `tolerance_scale × median(Aᵗb)`. Per-texel
//! right-hand sides span many orders of magnitude, so a fixed epsilon would either stop too
//! early on bright texels or never stop on dark ones.

use nalgebra::DVector;
use rayon::prelude::*;
use tracing::debug;

use crate::domain::{FitSettings, NNLS_TOLERANCE_SCALE};
use crate::error::FitError;
use crate::fit::AugmentedSystem;
use crate::math::nnls::{self, NnlsOptions, NnlsWorkspace};

/// Options shared by every solve of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveOptions {
    pub tolerance_scale: f64,
    pub max_iterations: Option<usize>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            tolerance_scale: NNLS_TOLERANCE_SCALE,
            max_iterations: None,
        }
    }
}

impl From<&FitSettings> for SolveOptions {
    fn from(settings: &FitSettings) -> Self {
        Self {
            tolerance_scale: settings.tolerance_scale,
            max_iterations: settings.max_iterations,
        }
    }
}

/// Median of `values`, or the first positive value above it; `1.0` if there is none.
pub fn positive_median(values: &DVector<f64>) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
        .iter()
        .skip(sorted.len() / 2)
        .copied()
        .find(|&v| v > 0.0)
        .unwrap_or(1.0)
}

/// Where each quantity lives in a solution vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolutionLayout {
    pub instance_count: usize,
    pub function_count: usize,
}

impl SolutionLayout {
    pub fn new(instance_count: usize, function_count: usize) -> Self {
        Self {
            instance_count,
            function_count,
        }
    }

    pub fn core_size(&self) -> usize {
        self.instance_count * (self.function_count + 1)
    }

    pub fn constant_index(&self, instance: usize) -> usize {
        instance
    }

    pub fn coefficient_index(&self, function: usize, instance: usize) -> usize {
        self.instance_count * (function + 1) + instance
    }
}

/// Solution of one system for one observation channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    layout: SolutionLayout,
    values: DVector<f64>,
}

impl Solution {
    /// Wrap a raw solution vector (core entries followed by any multipliers).
    pub fn new(layout: SolutionLayout, values: DVector<f64>) -> Result<Self, FitError> {
        if values.len() < layout.core_size() {
            return Err(FitError::invalid(format!(
                "solution has {} entries but the layout needs {}",
                values.len(),
                layout.core_size()
            )));
        }
        Ok(Self { layout, values })
    }

    /// Build a solution from per-instance constants and `coefficients[k][b]`.
    pub fn from_coefficients(constants: &[f64], coefficients: &[Vec<f64>]) -> Self {
        let layout = SolutionLayout::new(constants.len(), coefficients.len());
        let mut values = DVector::zeros(layout.core_size());
        for (b, &c) in constants.iter().enumerate() {
            values[layout.constant_index(b)] = c;
        }
        for (k, row) in coefficients.iter().enumerate() {
            for (b, &c) in row.iter().take(layout.instance_count).enumerate() {
                values[layout.coefficient_index(k, b)] = c;
            }
        }
        Self { layout, values }
    }

    pub fn layout(&self) -> SolutionLayout {
        self.layout
    }

    pub fn constant(&self, instance: usize) -> f64 {
        self.values[self.layout.constant_index(instance)]
    }

    pub fn coefficient(&self, function: usize, instance: usize) -> f64 {
        self.values[self.layout.coefficient_index(function, instance)]
    }

    /// Library coefficients of one instance, in function order.
    pub fn coefficients(&self, instance: usize) -> Vec<f64> {
        (0..self.layout.function_count)
            .map(|k| self.coefficient(k, instance))
            .collect()
    }

    /// Lagrange multipliers of the equality constraints.
    pub fn multipliers(&self) -> &[f64] {
        &self.values.as_slice()[self.layout.core_size()..]
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }
}

/// Solve every channel of one system.
pub fn solve_system(
    ws: &mut NnlsWorkspace,
    system: &AugmentedSystem,
    layout: SolutionLayout,
    options: SolveOptions,
) -> Result<Vec<Solution>, FitError> {
    if system.core_size() != layout.core_size() {
        return Err(FitError::invalid(format!(
            "system core size {} does not match layout {}",
            system.core_size(),
            layout.core_size()
        )));
    }
    let nnls_options = NnlsOptions {
        max_iterations: options.max_iterations,
    };

    (0..system.channel_count())
        .map(|channel| {
            let rhs = system.rhs_column(channel);
            let epsilon = options.tolerance_scale * positive_median(&rhs);
            let values = nnls::solve_with(
                ws,
                system.lhs(),
                &rhs,
                epsilon,
                system.constraint_count(),
                nnls_options,
            )?;
            Solution::new(layout, values)
        })
        .collect()
}

/// Solve every valid system in parallel; invalid systems yield `None`.
pub fn solve_systems(
    systems: &[AugmentedSystem],
    valid: &[bool],
    layout: SolutionLayout,
    options: SolveOptions,
) -> Result<Vec<Option<Vec<Solution>>>, FitError> {
    if systems.len() != valid.len() {
        return Err(FitError::invalid(format!(
            "{} systems but {} validity flags",
            systems.len(),
            valid.len()
        )));
    }
    if !(options.tolerance_scale.is_finite() && options.tolerance_scale > 0.0) {
        return Err(FitError::invalid(format!(
            "tolerance_scale must be finite and > 0 (got {})",
            options.tolerance_scale
        )));
    }

    debug!(
        systems = systems.len(),
        tolerance_scale = options.tolerance_scale,
        "solving systems"
    );

    systems
        .par_iter()
        .zip(valid.par_iter())
        .map_init(NnlsWorkspace::new, |ws, (system, &is_valid)| {
            if is_valid {
                solve_system(ws, system, layout, options).map(Some)
            } else {
                Ok(None)
            }
        })
        .collect()
}
