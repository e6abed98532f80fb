//! Streaming assembly of one augmented system per system index.
//!
//! The sample stream is consumed exactly once. For every batch, all systems are updated in
//! parallel (each system owns its accumulator, so there is no locking). Each system runs a small
//! state machine, [`SystemAccumulator`]:
//!
//! - state: last flushed floor, transient sums, cumulative sums, the system matrices
//! - `accept(sample)`: if the sample's floor is above the last one, flush the transient sums for
//!   the floor that just ended (and every skipped one), then add the sample
//! - `finish()`: flush the last floor up to the end of the domain
//!
//! The flush logic requires non-decreasing floors per system. With [`SampleOrder::Sorted`] the
//! builder buffers every system's samples during the pass, then sorts and accumulates them per
//! system in a second parallel phase. [`SampleOrder::Monotonic`] skips the buffer and reports
//! [`FitError::UnorderedSamples`] if the producer breaks its promise.

use rayon::prelude::*;
use tracing::debug;

use crate::domain::SampleOrder;
use crate::error::FitError;
use crate::fit::{AugmentedSystem, EqualityConstraint, RunningSums, Sample};
use crate::math::BasisLibrary;

/// Per-system view of one streamed batch.
///
/// This is the interface to the sample producer: it decides which systems a batch touches and
/// what each of them observed. Implementations are shared across worker threads.
pub trait SampleModel<S>: Sync {
    /// Whether `batch` carries a usable sample for `system`.
    fn is_valid(&self, batch: &S, system: usize) -> bool;

    /// Real-valued position in the library's domain.
    fn domain_position(&self, batch: &S, system: usize) -> f64;

    /// Fixed multiplicative factor of the sample.
    fn analytic(&self, batch: &S, system: usize) -> f64;

    /// Least-squares weight of the sample.
    fn sample_weight(&self, batch: &S, system: usize) -> f64;

    /// How strongly `instance` applies to this sample.
    fn instance_weight(&self, batch: &S, system: usize, instance: usize) -> f64;

    /// Write one value per observation channel into `observed`.
    fn observe(&self, batch: &S, system: usize, observed: &mut [f64]);
}

/// Build the [`Sample`] that `batch` contributes to `system`.
pub fn make_sample<S, M>(
    model: &M,
    batch: &S,
    system: usize,
    domain_size: usize,
    instance_count: usize,
    observation_count: usize,
) -> Sample
where
    M: SampleModel<S> + ?Sized,
{
    let weight_by_instance = (0..instance_count)
        .map(|b| model.instance_weight(batch, system, b))
        .collect();
    let mut observed = vec![0.0; observation_count];
    model.observe(batch, system, &mut observed);

    Sample::new(
        model.domain_position(batch, system),
        domain_size,
        model.analytic(batch, system),
        model.sample_weight(batch, system),
        weight_by_instance,
        observed,
    )
}

/// Accumulation state of one system.
#[derive(Debug, Clone)]
pub struct SystemAccumulator {
    system: usize,
    instance_count: usize,
    sums: RunningSums,
    last_floor: Option<usize>,
    sample_count: usize,
    matrix: AugmentedSystem,
}

impl SystemAccumulator {
    /// Start from `template`, which already carries the constraint block.
    pub fn new(
        system: usize,
        instance_count: usize,
        observation_count: usize,
        template: AugmentedSystem,
    ) -> Self {
        Self {
            system,
            instance_count,
            sums: RunningSums::new(instance_count, observation_count),
            last_floor: None,
            sample_count: 0,
            matrix: template,
        }
    }

    pub fn last_floor(&self) -> Option<usize> {
        self.last_floor
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Add one sample.
    ///
    /// # Errors
    ///
    /// [`FitError::UnorderedSamples`] if the sample's floor is below one already flushed.
    pub fn accept<B: BasisLibrary + ?Sized>(
        &mut self,
        basis: &B,
        sample: &Sample,
    ) -> Result<(), FitError> {
        let previous = self.last_floor.unwrap_or(0);
        if sample.floor < previous {
            return Err(FitError::UnorderedSamples {
                system: self.system,
                previous,
                floor: sample.floor,
            });
        }
        if sample.floor > previous {
            self.advance(basis, previous, sample.floor);
        }
        self.last_floor = Some(sample.floor);

        // Constant terms are not interpolated; they are added directly.
        let c = sample.constant_factor(basis.metallicity());
        let w = sample.sample_weight;
        let instances = self.instance_count.min(sample.weight_by_instance.len());
        let channels = self.matrix.channel_count().min(sample.observed.len());
        for b1 in 0..instances {
            let wb1 = sample.weight_by_instance[b1];
            for ch in 0..channels {
                self.matrix
                    .add_to_rhs(b1, ch, wb1 * w * sample.observed[ch] * c);
            }
            for b2 in 0..instances {
                let wb2 = sample.weight_by_instance[b2];
                self.matrix.add_to_lhs(b1, b2, wb1 * wb2 * w * c * c);
            }
        }

        if sample.in_optimized_domain {
            self.sums.accept(sample);
        }
        self.sample_count += 1;
        Ok(())
    }

    fn advance<B: BasisLibrary + ?Sized>(&mut self, basis: &B, current: usize, next: usize) {
        basis.contribute_to_fitting_system(
            current,
            next,
            self.instance_count,
            &self.sums,
            &mut self.matrix,
        );
        self.sums.clear_transient_sums();
    }

    /// Flush the remaining sums and return the finished system.
    pub fn finish<B: BasisLibrary + ?Sized>(mut self, basis: &B) -> AugmentedSystem {
        if let Some(last) = self.last_floor {
            let end = basis.optimized_domain_size().saturating_sub(1).max(last);
            self.advance(basis, last, end);
        }
        self.matrix
    }
}

/// Result of one streaming build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// One augmented system per system index.
    pub systems: Vec<AugmentedSystem>,
    /// Whether each system received at least one valid sample.
    pub valid: Vec<bool>,
    /// Number of accepted samples per system.
    pub sample_counts: Vec<usize>,
    /// Number of batches consumed from the stream.
    pub batch_count: usize,
}

impl BuildOutput {
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }
}

struct SystemState {
    accumulator: SystemAccumulator,
    pending: Vec<Sample>,
    valid: bool,
}

/// Streaming builder of augmented normal equations for a fixed basis library.
pub struct SystemMatrixBuilder<'a, B: ?Sized> {
    basis: &'a B,
    system_count: usize,
    instance_count: usize,
    observation_count: usize,
    constraints: Vec<EqualityConstraint>,
    order: SampleOrder,
}

impl<'a, B: BasisLibrary + ?Sized> SystemMatrixBuilder<'a, B> {
    pub fn new(
        basis: &'a B,
        system_count: usize,
        instance_count: usize,
        observation_count: usize,
    ) -> Result<Self, FitError> {
        if instance_count == 0 {
            return Err(FitError::invalid("instance_count must be >= 1"));
        }
        if observation_count == 0 {
            return Err(FitError::invalid("observation_count must be >= 1"));
        }
        Ok(Self {
            basis,
            system_count,
            instance_count,
            observation_count,
            constraints: Vec::new(),
            order: SampleOrder::default(),
        })
    }

    /// Equality constraints shared by every system, appended after the core block.
    pub fn with_constraints(mut self, constraints: Vec<EqualityConstraint>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_order(mut self, order: SampleOrder) -> Self {
        self.order = order;
        self
    }

    /// `instance_count × (function_count + 1)`.
    pub fn core_size(&self) -> usize {
        self.instance_count * (self.basis.function_count() + 1)
    }

    pub fn system_size(&self) -> usize {
        self.core_size() + self.constraints.len()
    }

    /// Consume `stream` once and build every system.
    ///
    /// `mark_valid` is called once per system, on the first batch that carries a valid sample
    /// for it. Systems that never see one keep an all-zero core block.
    pub fn build<S, I, M, V>(
        &self,
        stream: I,
        model: &M,
        mark_valid: V,
    ) -> Result<BuildOutput, FitError>
    where
        I: IntoIterator<Item = S>,
        S: Sync,
        M: SampleModel<S> + ?Sized,
        V: Fn(usize) + Sync,
    {
        let template = AugmentedSystem::new(
            self.core_size(),
            self.observation_count,
            &self.constraints,
        )?;
        let domain_size = self.basis.optimized_domain_size();

        debug!(
            systems = self.system_count,
            size = template.size(),
            functions = self.basis.function_count(),
            order = ?self.order,
            "building systems"
        );

        let mut states: Vec<SystemState> = (0..self.system_count)
            .map(|system| SystemState {
                accumulator: SystemAccumulator::new(
                    system,
                    self.instance_count,
                    self.observation_count,
                    template.clone(),
                ),
                pending: Vec::new(),
                valid: false,
            })
            .collect();

        let mut batch_count = 0usize;
        for batch in stream {
            states
                .par_iter_mut()
                .enumerate()
                .try_for_each(|(system, state)| -> Result<(), FitError> {
                    if !model.is_valid(&batch, system) {
                        return Ok(());
                    }
                    if !state.valid {
                        state.valid = true;
                        mark_valid(system);
                    }
                    let sample = make_sample(
                        model,
                        &batch,
                        system,
                        domain_size,
                        self.instance_count,
                        self.observation_count,
                    );
                    match self.order {
                        SampleOrder::Sorted => {
                            state.pending.push(sample);
                            Ok(())
                        }
                        SampleOrder::Monotonic => state.accumulator.accept(self.basis, &sample),
                    }
                })?;
            batch_count += 1;
        }

        let finished = states
            .into_par_iter()
            .map(|mut state| -> Result<(AugmentedSystem, bool, usize), FitError> {
                if !state.pending.is_empty() {
                    state.pending.sort_by_key(|sample| sample.floor);
                    for sample in &state.pending {
                        state.accumulator.accept(self.basis, sample)?;
                    }
                }
                let count = state.accumulator.sample_count();
                Ok((state.accumulator.finish(self.basis), state.valid, count))
            })
            .collect::<Result<Vec<_>, FitError>>()?;

        let mut output = BuildOutput {
            systems: Vec::with_capacity(finished.len()),
            valid: Vec::with_capacity(finished.len()),
            sample_counts: Vec::with_capacity(finished.len()),
            batch_count,
        };
        for (system, valid, count) in finished {
            output.systems.push(system);
            output.valid.push(valid);
            output.sample_counts.push(count);
        }

        debug!(
            batches = batch_count,
            valid = output.valid_count(),
            "systems built"
        );
        Ok(output)
    }
}
