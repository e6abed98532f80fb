//! The `bfit fit` pipeline.
//!
//! synthetic scene -> one streaming build -> parallel NNLS -> reconstruction error vs truth
//! -> optional dense cross-check of a few systems.
//!
//! The CLI only does presentation (summary, plot, exports) on top of [`RunOutput`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::data::{SyntheticModel, SyntheticScene};
use crate::domain::FitConfig;
use crate::error::AppError;
use crate::fit::{
    REFERENCE_TOLERANCE, ReferenceCheck, Solution, SolutionLayout, SolveOptions,
    SystemMatrixBuilder, check_against_reference, gather_samples, reference_system, solve_systems,
};
use crate::report::{ReconstructionStats, reconstruction_stats};

/// Number of systems cross-checked against the dense reference with `--validate`.
const VALIDATED_SYSTEMS: usize = 3;

/// Wall-clock time of each phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTimings {
    pub build: Duration,
    pub solve: Duration,
    pub validate: Duration,
}

/// All computed outputs of a single `bfit fit` run.
#[derive(Debug)]
pub struct RunOutput {
    pub scene: SyntheticScene,
    pub layout: SolutionLayout,
    /// Systems reported through the valid marker while streaming.
    pub marked_valid: usize,
    pub sample_counts: Vec<usize>,
    pub batch_count: usize,
    pub solutions: Vec<Option<Vec<Solution>>>,
    pub reconstruction: ReconstructionStats,
    /// `(system, check)` for each cross-checked system.
    pub validation: Vec<(usize, ReferenceCheck)>,
    pub timings: PhaseTimings,
}

impl RunOutput {
    pub fn validation_passed(&self) -> bool {
        self.validation.iter().all(|(_, check)| check.passed())
    }
}

/// Execute the full fitting pipeline.
pub fn run_fit(config: &FitConfig) -> Result<RunOutput, AppError> {
    let settings = &config.settings;
    let scene = SyntheticScene::new(&config.synthetic, settings)?;
    let basis = scene.basis();
    let layout = SolutionLayout::new(settings.instance_count, basis.function_count());

    info!(
        texels = scene.texel_count(),
        views = config.synthetic.view_count,
        functions = basis.function_count(),
        instances = settings.instance_count,
        channels = settings.observation_count,
        "fitting synthetic scene"
    );

    // 1) Single streaming pass.
    let started = Instant::now();
    let marked = AtomicUsize::new(0);
    let builder = SystemMatrixBuilder::new(
        basis,
        scene.texel_count(),
        settings.instance_count,
        settings.observation_count,
    )?
    .with_constraints(settings.constraints())
    .with_order(settings.sample_order);
    let build = builder.build(scene.stream(), &SyntheticModel, |_| {
        marked.fetch_add(1, Ordering::Relaxed);
    })?;
    let build_time = started.elapsed();

    // 2) Solve every valid system.
    let started = Instant::now();
    let solutions = solve_systems(
        &build.systems,
        &build.valid,
        layout,
        SolveOptions::from(settings),
    )?;
    let solve_time = started.elapsed();

    // 3) Compare against ground truth.
    let reconstruction = reconstruction_stats(basis, &solutions, scene.truth());

    // 4) Optional dense cross-check (replays the stream).
    let started = Instant::now();
    let validation = if config.validate {
        validate_systems(&scene, &build.systems, &build.valid)
    } else {
        Vec::new()
    };
    let validate_time = started.elapsed();

    for (system, check) in validation.iter().filter(|(_, c)| !c.passed()) {
        warn!(
            system,
            mismatches = check.mismatches,
            max_relative_error = check.max_relative_error,
            "streamed system differs from dense reference"
        );
    }

    Ok(RunOutput {
        marked_valid: marked.into_inner(),
        sample_counts: build.sample_counts,
        batch_count: build.batch_count,
        layout,
        solutions,
        reconstruction,
        validation,
        timings: PhaseTimings {
            build: build_time,
            solve: solve_time,
            validate: validate_time,
        },
        scene,
    })
}

/// Pick up to [`VALIDATED_SYSTEMS`] valid systems spread over the index range.
fn pick_systems(valid: &[bool]) -> Vec<usize> {
    let candidates: Vec<usize> = valid
        .iter()
        .enumerate()
        .filter_map(|(i, &v)| v.then_some(i))
        .collect();
    if candidates.len() <= VALIDATED_SYSTEMS {
        return candidates;
    }
    let last = candidates.len() - 1;
    let mut picked: Vec<usize> = (0..VALIDATED_SYSTEMS)
        .map(|i| candidates[i * last / (VALIDATED_SYSTEMS - 1)])
        .collect();
    picked.dedup();
    picked
}

fn validate_systems(
    scene: &SyntheticScene,
    systems: &[crate::fit::AugmentedSystem],
    valid: &[bool],
) -> Vec<(usize, ReferenceCheck)> {
    let basis = scene.basis();
    pick_systems(valid)
        .into_iter()
        .map(|system| {
            let samples = gather_samples(
                scene.stream(),
                &SyntheticModel,
                basis.optimized_domain_size(),
                scene.instance_count(),
                scene.observation_count(),
                system,
            );
            let reference = reference_system(
                basis,
                &samples,
                scene.instance_count(),
                scene.observation_count(),
            );
            (
                system,
                check_against_reference(&systems[system], &reference, REFERENCE_TOLERANCE),
            )
        })
        .collect()
}
