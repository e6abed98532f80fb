//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real main:
//! - parses CLI arguments and installs the tracing subscriber
//! - resolves settings (JSON file, then flags)
//! - runs the fit pipeline
//! - prints summaries/plots and writes optional exports

use clap::Parser;

use crate::cli::{Cli, Command, FitArgs, PlotArgs};
use crate::domain::{BasisSettings, FitConfig, FitSettings, SyntheticConfig};
use crate::error::AppError;
use crate::fit::SolutionEvaluator;

pub mod pipeline;

/// Entry point for the `bfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    crate::telemetry::init_tracing(cli.verbose);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Plot(args) => handle_plot(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let run = pipeline::run_fit(&config)?;

    println!("{}", crate::report::format_run_summary(&run, &config));

    if config.plot {
        let basis = run.scene.basis();
        let system = config.plot_system;
        match run.solutions.get(system).and_then(Option::as_ref) {
            Some(channels) => {
                let evaluator = SolutionEvaluator::new(basis);
                let fitted = evaluator.evaluate_all(&channels[0], 0);
                let truth = evaluator.evaluate_all(&run.scene.truth()[system].channels[0], 0);
                println!("System {system}, channel 0, instance 0 (- fitted, o truth):");
                println!(
                    "{}",
                    crate::plot::render_curve_plot(
                        &fitted,
                        Some(&truth),
                        config.plot_width,
                        config.plot_height
                    )
                );
                println!(
                    "coefficients: {}",
                    crate::report::fmt_vec(&channels[0].coefficients(0))
                );
            }
            None => println!("System {system} has no solution (never visible or out of range)."),
        }
    }

    if let Some(path) = &config.export {
        let file =
            crate::io::SolutionFile::new(&config.settings, run.scene.basis(), &run.solutions);
        crate::io::write_solution_json(path, &file)?;
    }
    if let Some(path) = &config.export_csv {
        crate::io::write_curves_csv(
            path,
            run.scene.basis(),
            &run.solutions,
            Some(run.scene.truth()),
        )?;
    }

    if config.validate && !run.validation_passed() {
        return Err(AppError::new(
            4,
            "Streamed systems differ from the dense reference.",
        ));
    }
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let file = crate::io::read_solution_json(&args.solution)?;
    let record = file
        .system(args.system)
        .ok_or_else(|| AppError::new(2, format!("System {} not in solution file.", args.system)))?;
    let channels = record.channels.as_ref().ok_or_else(|| {
        AppError::new(2, format!("System {} has no solution.", args.system))
    })?;
    let channel = channels
        .get(args.channel)
        .ok_or_else(|| AppError::new(2, format!("Channel {} out of range.", args.channel)))?;
    let curve = channel
        .curves
        .get(args.instance)
        .ok_or_else(|| AppError::new(2, format!("Instance {} out of range.", args.instance)))?;

    println!(
        "System {}, channel {}, instance {} (fitted {}):",
        args.system, args.channel, args.instance, file.created_at
    );
    println!(
        "{}",
        crate::plot::render_curve_plot(curve, None, args.width, args.height)
    );
    if let Some(coefficients) = channel.coefficients.get(args.instance) {
        println!("coefficients: {}", crate::report::fmt_vec(coefficients));
    }
    Ok(())
}

/// Resolve the run configuration: settings file first, then explicit flags.
pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, AppError> {
    let mut settings = match &args.settings {
        Some(path) => crate::io::read_settings_json(path)?,
        None => FitSettings::default(),
    };

    if let Some(resolution) = args.resolution {
        settings.resolution = resolution;
    }
    if let Some(metallicity) = args.metallicity {
        settings.metallicity = metallicity;
    }
    if let Some(max_width) = args.smooth {
        settings.basis = BasisSettings::SmoothStep {
            min_width: args.min_width,
            max_width,
            function_count: args.function_count,
            curve: args.curve,
        };
    }
    if let Some(instances) = args.instances {
        settings.instance_count = instances;
    }
    if let Some(channels) = args.channels {
        settings.observation_count = channels;
    }
    if let Some(order) = args.order {
        settings.sample_order = order;
    }
    if let Some(scale) = args.tolerance_scale {
        settings.tolerance_scale = scale;
    }
    if args.max_iterations.is_some() {
        settings.max_iterations = args.max_iterations;
    }
    if args.constant_sum.is_some() {
        settings.constant_sum = args.constant_sum;
    }
    settings.validate()?;

    let synthetic = SyntheticConfig {
        texel_count: args.texels,
        view_count: args.views,
        seed: args.seed,
        noise_sigma: args.noise,
        visibility: args.visibility,
        hole_fraction: args.holes,
        ..SyntheticConfig::default()
    };
    synthetic.validate()?;

    Ok(FitConfig {
        settings,
        synthetic,
        validate: args.validate,
        plot: args.plot,
        plot_system: args.system,
        plot_width: args.width,
        plot_height: args.height,
        export: args.export.clone(),
        export_csv: args.export_csv.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SampleOrder;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "bfit", "fit", "--resolution", "12", "--smooth", "3", "--instances", "2", "--order",
            "monotonic", "-n", "5",
        ]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let config = fit_config_from_args(&args).unwrap();
        assert_eq!(config.settings.resolution, 12);
        assert_eq!(config.settings.instance_count, 2);
        assert_eq!(config.settings.sample_order, SampleOrder::Monotonic);
        assert!(matches!(
            config.settings.basis,
            BasisSettings::SmoothStep { max_width: 3, .. }
        ));
        assert_eq!(config.synthetic.texel_count, 5);
    }

    #[test]
    fn invalid_flags_map_to_exit_code_2() {
        let cli = Cli::parse_from(["bfit", "fit", "--visibility", "1.5"]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        let err = fit_config_from_args(&args).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
