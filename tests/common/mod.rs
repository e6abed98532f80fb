//! In-memory sample streams shared by the integration tests.
#![allow(dead_code)]

use brdf_basis_fit::fit::SampleModel;
use rand::prelude::*;
use rand::rngs::StdRng;

/// One system's sample inside a batch.
#[derive(Debug, Clone)]
pub struct Entry {
    pub actual: f64,
    pub analytic: f64,
    pub weight: f64,
    pub instance_weights: Vec<f64>,
    pub observed: Vec<f64>,
}

impl Entry {
    pub fn simple(actual: f64, observed: f64) -> Self {
        Self {
            actual,
            analytic: 1.0,
            weight: 1.0,
            instance_weights: vec![1.0],
            observed: vec![observed],
        }
    }
}

/// A batch carries at most one entry per system; `None` marks an invalid sample.
pub type Batch = Vec<Option<Entry>>;

pub struct VecModel;

impl SampleModel<Batch> for VecModel {
    fn is_valid(&self, batch: &Batch, system: usize) -> bool {
        batch.get(system).is_some_and(Option::is_some)
    }

    fn domain_position(&self, batch: &Batch, system: usize) -> f64 {
        entry(batch, system).actual
    }

    fn analytic(&self, batch: &Batch, system: usize) -> f64 {
        entry(batch, system).analytic
    }

    fn sample_weight(&self, batch: &Batch, system: usize) -> f64 {
        entry(batch, system).weight
    }

    fn instance_weight(&self, batch: &Batch, system: usize, instance: usize) -> f64 {
        entry(batch, system).instance_weights[instance]
    }

    fn observe(&self, batch: &Batch, system: usize, observed: &mut [f64]) {
        observed.copy_from_slice(&entry(batch, system).observed);
    }
}

fn entry(batch: &Batch, system: usize) -> &Entry {
    batch[system].as_ref().expect("model only reads valid entries")
}

/// Random batches with positions in `[-0.5, 1.2 · domain)`, so some samples clamp to floor 0
/// and some fall outside the optimized domain. Systems in `never_valid` get no samples.
pub fn random_stream(
    seed: u64,
    systems: usize,
    batches: usize,
    domain: usize,
    instances: usize,
    channels: usize,
    never_valid: &[usize],
) -> Vec<Batch> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..batches)
        .map(|_| {
            (0..systems)
                .map(|system| {
                    if never_valid.contains(&system) || rng.gen_bool(0.15) {
                        return None;
                    }
                    Some(Entry {
                        actual: rng.gen_range(-0.5..domain as f64 * 1.2),
                        analytic: rng.gen_range(0.5..1.5),
                        weight: rng.gen_range(0.2..1.0),
                        instance_weights: (0..instances).map(|_| rng.gen_range(0.0..1.0)).collect(),
                        observed: (0..channels).map(|_| rng.gen_range(0.0..1.0)).collect(),
                    })
                })
                .collect()
        })
        .collect()
}

/// Reorder `stream` so every system sees non-decreasing positions.
pub fn monotonic(stream: &[Batch]) -> Vec<Batch> {
    let systems = stream.first().map_or(0, Vec::len);
    let mut out: Vec<Batch> = vec![vec![None; systems]; stream.len()];
    for system in 0..systems {
        let mut entries: Vec<(usize, Entry)> = stream
            .iter()
            .enumerate()
            .filter_map(|(i, batch)| batch[system].clone().map(|e| (i, e)))
            .collect();
        let slots: Vec<usize> = entries.iter().map(|(i, _)| *i).collect();
        entries.sort_by(|a, b| a.1.actual.total_cmp(&b.1.actual));
        for (slot, (_, entry)) in slots.into_iter().zip(entries) {
            out[slot][system] = Some(entry);
        }
    }
    out
}
