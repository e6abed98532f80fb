//! Command-line parsing for the `bfit` demo harness.
//!
//! Argument parsing and command dispatch stay separate from the fitting code; `app` turns the
//! parsed arguments into a [`FitConfig`](crate::domain::FitConfig).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{SampleOrder, SmoothstepCurve};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "bfit",
    version,
    about = "Streaming constrained basis-library fitting (synthetic demo harness)"
)]
pub struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a seeded synthetic scene, print a summary, and optionally plot/export.
    Fit(FitArgs),
    /// Plot one system of a previously exported solution JSON.
    Plot(PlotArgs),
}

/// Options of `bfit fit`.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Load fit settings from a JSON file; explicit flags below override it.
    #[arg(long, value_name = "JSON")]
    pub settings: Option<PathBuf>,

    /// Number of discrete domain values.
    #[arg(long)]
    pub resolution: Option<usize>,

    /// Mix between linear and squared constant-term accumulation, in [0, 1].
    #[arg(long)]
    pub metallicity: Option<f64>,

    /// Use the smooth-step library with this maximum transition width.
    #[arg(long, value_name = "WIDTH")]
    pub smooth: Option<usize>,

    /// Minimum transition width of the smooth-step library.
    #[arg(long, default_value_t = 1, requires = "smooth")]
    pub min_width: usize,

    /// Number of smooth-step functions (defaults to resolution - min_width + 1).
    #[arg(long, requires = "smooth")]
    pub function_count: Option<usize>,

    /// Transition curve of the smooth-step library.
    #[arg(long, value_enum, default_value_t = SmoothstepCurve::Cubic, requires = "smooth")]
    pub curve: SmoothstepCurve,

    /// Number of simultaneously fitted instances per system.
    #[arg(long)]
    pub instances: Option<usize>,

    /// Number of observation channels.
    #[arg(long)]
    pub channels: Option<usize>,

    /// How samples reach each system's accumulator.
    #[arg(long, value_enum)]
    pub order: Option<SampleOrder>,

    /// NNLS tolerance scale (times the median of Aᵗb).
    #[arg(long)]
    pub tolerance_scale: Option<f64>,

    /// Cap on NNLS active-set iterations.
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Constrain the instance constants of every system to sum to this value.
    #[arg(long, value_name = "SUM")]
    pub constant_sum: Option<f64>,

    /// Number of systems (texels) in the synthetic scene.
    #[arg(short = 'n', long, default_value_t = 64)]
    pub texels: usize,

    /// Number of views (batches) in the stream.
    #[arg(long, default_value_t = 48)]
    pub views: usize,

    /// Random seed of the synthetic scene and stream.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Standard deviation of Gaussian observation noise.
    #[arg(long, default_value_t = 0.0)]
    pub noise: f64,

    /// Probability that a texel is visible in a view.
    #[arg(long, default_value_t = 0.8)]
    pub visibility: f64,

    /// Fraction of texels never visible.
    #[arg(long, default_value_t = 0.05)]
    pub holes: f64,

    /// Cross-check a few streamed systems against the dense reference.
    #[arg(long)]
    pub validate: bool,

    /// Render an ASCII plot of one system's first channel and instance.
    #[arg(long)]
    pub plot: bool,

    /// System to plot.
    #[arg(long, default_value_t = 0)]
    pub system: usize,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Export solutions (with reconstructed curves) to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,

    /// Export reconstructed curves to CSV.
    #[arg(long = "export-csv", value_name = "CSV")]
    pub export_csv: Option<PathBuf>,
}

/// Options of `bfit plot`.
#[derive(Debug, Args)]
pub struct PlotArgs {
    /// Solution JSON file produced by `bfit fit --export`.
    #[arg(long, value_name = "JSON")]
    pub solution: PathBuf,

    /// System to plot.
    #[arg(long, default_value_t = 0)]
    pub system: usize,

    /// Observation channel to plot.
    #[arg(long, default_value_t = 0)]
    pub channel: usize,

    /// Instance to plot.
    #[arg(long, default_value_t = 0)]
    pub instance: usize,

    /// Plot width (columns).
    #[arg(long, default_value_t = 80)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn smooth_flags_parse() {
        let cli = Cli::parse_from([
            "bfit", "fit", "--resolution", "16", "--smooth", "4", "--curve", "quintic", "--order",
            "monotonic",
        ]);
        let Command::Fit(args) = cli.command else {
            panic!("expected fit");
        };
        assert_eq!(args.resolution, Some(16));
        assert_eq!(args.smooth, Some(4));
        assert_eq!(args.curve, SmoothstepCurve::Quintic);
        assert_eq!(args.order, Some(SampleOrder::Monotonic));
    }
}
