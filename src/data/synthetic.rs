//! Seeded synthetic view stream.
//!
//! A scene is a set of texels, each with a known non-negative combination of library functions
//! per instance and observation channel. Views are generated lazily: every call to
//! [`SyntheticStream::next`] draws one batch from its own seeded RNG, so the stream can be replayed
//! (e.g. for the dense cross-check) without ever holding all views in memory.
//!
//! Observations follow the fitting model exactly, plus optional Gaussian noise:
//!
//! ```text
//! y = Σ_b w_b · ( c_b · (m · analytic + 1 − m) + analytic · Σ_k a_kb · f_k(position) )
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{FitSettings, SyntheticConfig};
use crate::error::FitError;
use crate::fit::{SampleModel, Solution, SolutionEvaluator};
use crate::math::BasisLibrary;

/// Probability that a generated coefficient is non-zero.
const COEFFICIENT_DENSITY: f64 = 0.35;

/// Known solution of one texel: one [`Solution`] per observation channel.
#[derive(Debug, Clone, PartialEq)]
pub struct TexelTruth {
    pub channels: Vec<Solution>,
}

/// What one view recorded for one texel.
#[derive(Debug, Clone, PartialEq)]
pub struct TexelObservation {
    pub visible: bool,
    pub position: f64,
    pub analytic: f64,
    pub sample_weight: f64,
    pub instance_weights: Vec<f64>,
    pub observed: Vec<f64>,
}

/// One batch of the stream: every texel as seen from one view.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewBatch {
    pub view: usize,
    pub texels: Vec<TexelObservation>,
}

/// Ground truth plus everything needed to render views of it.
pub struct SyntheticScene {
    config: SyntheticConfig,
    basis: Box<dyn BasisLibrary>,
    instance_count: usize,
    observation_count: usize,
    holes: Vec<bool>,
    truth: Vec<TexelTruth>,
}

impl std::fmt::Debug for SyntheticScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticScene")
            .field("config", &self.config)
            .field("functions", &self.basis.function_count())
            .field("instance_count", &self.instance_count)
            .field("observation_count", &self.observation_count)
            .finish()
    }
}

impl SyntheticScene {
    pub fn new(config: &SyntheticConfig, settings: &FitSettings) -> Result<Self, FitError> {
        config.validate()?;
        settings.validate()?;
        let basis = settings.basis_library()?;

        let mut rng = StdRng::seed_from_u64(stream_seed(config.seed, "scene"));
        let function_count = basis.function_count();

        let mut holes = Vec::with_capacity(config.texel_count);
        let mut truth = Vec::with_capacity(config.texel_count);
        for _ in 0..config.texel_count {
            holes.push(rng.gen_bool(config.hole_fraction));

            let channels = (0..settings.observation_count)
                .map(|_| {
                    let constants: Vec<f64> = (0..settings.instance_count)
                        .map(|_| rng.gen_range(0.0..0.5))
                        .collect();
                    let coefficients: Vec<Vec<f64>> = (0..function_count)
                        .map(|_| {
                            (0..settings.instance_count)
                                .map(|_| {
                                    if rng.gen_bool(COEFFICIENT_DENSITY) {
                                        rng.gen_range(0.0..1.0) / function_count as f64
                                    } else {
                                        0.0
                                    }
                                })
                                .collect()
                        })
                        .collect();
                    Solution::from_coefficients(&constants, &coefficients)
                })
                .collect();
            truth.push(TexelTruth { channels });
        }

        Ok(Self {
            config: config.clone(),
            basis,
            instance_count: settings.instance_count,
            observation_count: settings.observation_count,
            holes,
            truth,
        })
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    pub fn basis(&self) -> &dyn BasisLibrary {
        self.basis.as_ref()
    }

    pub fn texel_count(&self) -> usize {
        self.truth.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    pub fn observation_count(&self) -> usize {
        self.observation_count
    }

    /// Texels that no view ever sees.
    pub fn is_hole(&self, texel: usize) -> bool {
        self.holes.get(texel).copied().unwrap_or(true)
    }

    pub fn truth(&self) -> &[TexelTruth] {
        &self.truth
    }

    /// A fresh pass over every view.
    pub fn stream(&self) -> SyntheticStream<'_> {
        SyntheticStream {
            scene: self,
            next_view: 0,
        }
    }

    /// Noise-free value the fitting model predicts for `texel` and `channel`.
    pub fn model_value(
        &self,
        texel: usize,
        channel: usize,
        position: f64,
        analytic: f64,
        instance_weights: &[f64],
    ) -> f64 {
        let solution = &self.truth[texel].channels[channel];
        let evaluator = SolutionEvaluator::new(self.basis.as_ref());
        let metallicity = self.basis.metallicity();

        instance_weights
            .iter()
            .enumerate()
            .map(|(b, &weight)| {
                let constant = solution.constant(b);
                let library = evaluator.evaluate_at(solution, b, position) - constant * metallicity;
                weight * (constant * (metallicity * analytic + 1.0 - metallicity) + analytic * library)
            })
            .sum()
    }

    fn render_view(&self, view: usize) -> ViewBatch {
        let mut rng = StdRng::seed_from_u64(stream_seed(self.config.seed, &("view", view)));
        let noise = Normal::new(0.0, self.config.noise_sigma)
            .ok()
            .filter(|_| self.config.noise_sigma > 0.0);
        let upper = self.basis.optimized_domain_size() as f64 * self.config.overshoot;

        let texels = (0..self.truth.len())
            .map(|texel| {
                let visible = !self.holes[texel] && rng.gen_bool(self.config.visibility);
                let position = rng.gen_range(0.0..upper);
                let analytic = rng.gen_range(0.5..1.5);
                let sample_weight = rng.gen_range(0.2..1.0);
                let instance_weights: Vec<f64> = if self.instance_count == 1 {
                    vec![1.0]
                } else {
                    (0..self.instance_count).map(|_| rng.gen_range(0.0..1.0)).collect()
                };

                let observed = (0..self.observation_count)
                    .map(|channel| {
                        let clean =
                            self.model_value(texel, channel, position, analytic, &instance_weights);
                        match &noise {
                            Some(normal) => clean + normal.sample(&mut rng),
                            None => clean,
                        }
                    })
                    .collect();

                TexelObservation {
                    visible,
                    position,
                    analytic,
                    sample_weight,
                    instance_weights,
                    observed,
                }
            })
            .collect();

        ViewBatch { view, texels }
    }
}

fn stream_seed<T: Hash + ?Sized>(seed: u64, salt: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    salt.hash(&mut hasher);
    hasher.finish()
}

/// Lazy iterator over the views of a [`SyntheticScene`].
#[derive(Debug)]
pub struct SyntheticStream<'a> {
    scene: &'a SyntheticScene,
    next_view: usize,
}

impl Iterator for SyntheticStream<'_> {
    type Item = ViewBatch;

    fn next(&mut self) -> Option<ViewBatch> {
        if self.next_view >= self.scene.config.view_count {
            return None;
        }
        let batch = self.scene.render_view(self.next_view);
        self.next_view += 1;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.scene.config.view_count.saturating_sub(self.next_view);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SyntheticStream<'_> {}

/// [`SampleModel`] reading texel observations straight from a [`ViewBatch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticModel;

impl SampleModel<ViewBatch> for SyntheticModel {
    fn is_valid(&self, batch: &ViewBatch, system: usize) -> bool {
        batch.texels.get(system).is_some_and(|t| t.visible)
    }

    fn domain_position(&self, batch: &ViewBatch, system: usize) -> f64 {
        batch.texels[system].position
    }

    fn analytic(&self, batch: &ViewBatch, system: usize) -> f64 {
        batch.texels[system].analytic
    }

    fn sample_weight(&self, batch: &ViewBatch, system: usize) -> f64 {
        batch.texels[system].sample_weight
    }

    fn instance_weight(&self, batch: &ViewBatch, system: usize, instance: usize) -> f64 {
        batch.texels[system]
            .instance_weights
            .get(instance)
            .copied()
            .unwrap_or(0.0)
    }

    fn observe(&self, batch: &ViewBatch, system: usize, observed: &mut [f64]) {
        for (out, &value) in observed.iter_mut().zip(&batch.texels[system].observed) {
            *out = value;
        }
    }
}
