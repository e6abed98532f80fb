//! Basis function libraries over an integer domain.
//!
//! A library is a finite, ordered family of scalar functions `f(i, v)` over the domain
//! values `v ∈ [0, optimized_domain_size]`. Every library used by the fitting engine has the
//! same monotone shape:
//!
//! - `f(i, 0) = 1`
//! - `f(i, v)` is non-increasing in `v`
//! - for a fixed `v`, functions with a higher index are "further from zero" than lower ones
//!
//! That shape is what lets the streaming builder split the functions at each domain value into
//! three groups: functions that are already `0` (index below [`BasisLibrary::first_function_index`]),
//! functions still saturated at `1` (index above [`BasisLibrary::last_function_index`]) and the
//! window in between that has to be evaluated explicitly.
//!
//! Two families are provided:
//!
//! - [`StepBasis`]: `f(i, v) = 1` for `v ≤ i`, else `0`
//! - [`SmoothStepBasis`]: a smoothstep falling from `1` to `0` over a window of up to
//!   `max_width` domain values, compressed near the origin

use std::fmt;

use crate::domain::SmoothstepCurve;
use crate::error::FitError;
use crate::fit::{contribute, AugmentedSystem, RunningSums};

/// A library of monotone basis functions plus the metallicity mix used by the fitting objective.
pub trait BasisLibrary: Send + Sync {
    /// Value of library function `function_index` at `domain_value`, in `[0, 1]`.
    ///
    /// Defined for `domain_value ∈ [0, optimized_domain_size]`; the upper end is needed when
    /// interpolating between the last floor and the one above it.
    fn evaluate(&self, function_index: usize, domain_value: usize) -> f64;

    fn function_count(&self) -> usize;

    fn optimized_domain_size(&self) -> usize;

    /// Mixing weight in `[0, 1]` between the squared ("specular") and linear ("diffuse") terms.
    fn metallicity(&self) -> f64;

    /// First function that is not identically `0` over `[domain_value, domain_value + 1]`.
    fn first_function_index(&self, domain_value: usize) -> usize;

    /// Last function that is not identically `1` over `[domain_value, domain_value + 1]`.
    ///
    /// Every function above this index is treated as saturated. Returning `function_count() - 1`
    /// is always correct, just slower.
    fn last_function_index(&self, domain_value: usize) -> usize;

    /// Flush the running sums into `system` when accumulation moves from `current` to `next`.
    ///
    /// See [`contribute`] for the bookkeeping.
    fn contribute_to_fitting_system(
        &self,
        current: usize,
        next: usize,
        instance_count: usize,
        sums: &RunningSums,
        system: &mut AugmentedSystem,
    ) {
        contribute(self, current, next, instance_count, sums, system);
    }
}

fn clamp_metallicity(metallicity: f64) -> f64 {
    if metallicity.is_nan() {
        0.0
    } else {
        metallicity.clamp(0.0, 1.0)
    }
}

/// Hard-step library: one function per domain value, `f(i, v) = 1` for `v ≤ i`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepBasis {
    resolution: usize,
    metallicity: f64,
}

impl StepBasis {
    pub fn new(resolution: usize, metallicity: f64) -> Result<Self, FitError> {
        if resolution < 1 {
            return Err(FitError::invalid("resolution must be >= 1"));
        }
        Ok(Self {
            resolution,
            metallicity: clamp_metallicity(metallicity),
        })
    }
}

impl BasisLibrary for StepBasis {
    fn evaluate(&self, function_index: usize, domain_value: usize) -> f64 {
        if domain_value <= function_index { 1.0 } else { 0.0 }
    }

    fn function_count(&self) -> usize {
        self.resolution
    }

    fn optimized_domain_size(&self) -> usize {
        self.resolution
    }

    fn metallicity(&self) -> f64 {
        self.metallicity
    }

    fn first_function_index(&self, domain_value: usize) -> usize {
        domain_value
    }

    fn last_function_index(&self, domain_value: usize) -> usize {
        domain_value
    }
}

type Curve = Box<dyn Fn(f64) -> f64 + Send + Sync>;

/// Smooth-step library with evenly spaced end points and a bounded transition width.
///
/// Function `i` reaches `0` at `e(i) = remapped(i) + min_width`, where
/// `remapped(i) = i × (resolution − min_width) / (function_count − 1)`. Its transition starts
/// `min(max_width, e(i))` domain values earlier, so functions ending close to the origin get a
/// steeper falloff. Inside the transition the value is `curve(d / width)` with `d = e(i) − v`.
pub struct SmoothStepBasis {
    resolution: usize,
    metallicity: f64,
    min_width: usize,
    max_width: usize,
    function_count: usize,
    curve: Curve,
}

impl fmt::Debug for SmoothStepBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmoothStepBasis")
            .field("resolution", &self.resolution)
            .field("metallicity", &self.metallicity)
            .field("min_width", &self.min_width)
            .field("max_width", &self.max_width)
            .field("function_count", &self.function_count)
            .finish_non_exhaustive()
    }
}

impl SmoothStepBasis {
    /// Build a library with an arbitrary monotone `curve` mapping `[0, 1]` onto `[0, 1]`.
    ///
    /// `min_width` is clamped to at least 1 and `max_width` to at least `min_width`.
    pub fn new<F>(
        resolution: usize,
        metallicity: f64,
        min_width: usize,
        max_width: usize,
        function_count: usize,
        curve: F,
    ) -> Result<Self, FitError>
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        if resolution < 1 {
            return Err(FitError::invalid("resolution must be >= 1"));
        }
        if function_count < 1 {
            return Err(FitError::invalid("function_count must be >= 1"));
        }
        let min_width = min_width.max(1);
        let max_width = max_width.max(min_width);
        Ok(Self {
            resolution,
            metallicity: clamp_metallicity(metallicity),
            min_width,
            max_width,
            function_count,
            curve: Box::new(curve),
        })
    }

    pub fn with_curve(
        resolution: usize,
        metallicity: f64,
        min_width: usize,
        max_width: usize,
        function_count: usize,
        curve: SmoothstepCurve,
    ) -> Result<Self, FitError> {
        Self::new(
            resolution,
            metallicity,
            min_width,
            max_width,
            function_count,
            move |x| curve.apply(x),
        )
    }

    /// The one-parameter form: `resolution` functions, each ending at `i + 1` with a transition
    /// of `min(transition_range, i + 1)` domain values.
    pub fn uniform(
        resolution: usize,
        metallicity: f64,
        transition_range: usize,
        curve: SmoothstepCurve,
    ) -> Result<Self, FitError> {
        Self::with_curve(resolution, metallicity, 1, transition_range, resolution, curve)
    }

    pub fn min_width(&self) -> usize {
        self.min_width
    }

    pub fn max_width(&self) -> usize {
        self.max_width
    }

    /// Span between the end points of the first and last function, or `None` when it is empty.
    fn span(&self) -> Option<f64> {
        if self.function_count < 2 || self.resolution <= self.min_width {
            None
        } else {
            Some((self.resolution - self.min_width) as f64 / (self.function_count - 1) as f64)
        }
    }

    fn remapped_index(&self, function_index: usize) -> f64 {
        match self.span() {
            Some(step) => function_index as f64 * step,
            None => 0.0,
        }
    }
}

impl BasisLibrary for SmoothStepBasis {
    fn evaluate(&self, function_index: usize, domain_value: usize) -> f64 {
        let end = self.remapped_index(function_index) + self.min_width as f64;
        let value = domain_value as f64;
        if value >= end {
            return 0.0;
        }

        let width = (self.max_width as f64).min(end);
        let distance = end - value;
        if distance < width {
            (self.curve)(distance / width).clamp(0.0, 1.0)
        } else {
            1.0
        }
    }

    fn function_count(&self) -> usize {
        self.function_count
    }

    fn optimized_domain_size(&self) -> usize {
        self.resolution
    }

    fn metallicity(&self) -> f64 {
        self.metallicity
    }

    fn first_function_index(&self, domain_value: usize) -> usize {
        let Some(step) = self.span() else {
            return 0;
        };
        // Last function already at zero, then one past it.
        let preceding = ((domain_value as f64 - self.min_width as f64) / step).floor();
        if preceding < 0.0 {
            0
        } else {
            (preceding as usize + 1).min(self.function_count - 1)
        }
    }

    fn last_function_index(&self, _domain_value: usize) -> usize {
        self.function_count - 1
    }
}
