//! Formatted terminal output.
//!
//! Formatting lives here so the fitting code stays free of presentation concerns and output
//! changes stay localized.

use crate::app::pipeline::RunOutput;
use crate::domain::{BasisSettings, FitConfig};
use crate::fit::Entry;

/// Format the run summary: configuration, stream statistics, timings, reconstruction error.
pub fn format_run_summary(run: &RunOutput, config: &FitConfig) -> String {
    let settings = &config.settings;
    let mut out = String::new();

    out.push_str("=== bfit - streaming basis-library fit ===\n");
    out.push_str(&format!(
        "Library: {} | resolution={} | functions={} | metallicity={:.3}\n",
        basis_label(&settings.basis),
        settings.resolution,
        run.layout.function_count,
        settings.metallicity,
    ));
    out.push_str(&format!(
        "Systems: {} | instances={} | channels={} | order={:?}\n",
        run.scene.texel_count(),
        settings.instance_count,
        settings.observation_count,
        settings.sample_order,
    ));
    if let Some(sum) = settings.constant_sum {
        out.push_str(&format!("Constraint: sum of constants = {sum}\n"));
    }

    let total_samples: usize = run.sample_counts.iter().sum();
    out.push_str(&format!(
        "Stream: views={} | samples={} | valid systems={}\n",
        run.batch_count, total_samples, run.marked_valid,
    ));
    out.push_str(&format!(
        "Timings: build={:.1}ms | solve={:.1}ms",
        run.timings.build.as_secs_f64() * 1e3,
        run.timings.solve.as_secs_f64() * 1e3,
    ));
    if config.validate {
        out.push_str(&format!(
            " | validate={:.1}ms",
            run.timings.validate.as_secs_f64() * 1e3
        ));
    }
    out.push('\n');

    let r = &run.reconstruction;
    out.push_str("\nReconstruction vs ground truth:\n");
    out.push_str(&format!("- systems compared: {}\n", r.systems));
    out.push_str(&format!("- mean |error|    : {:.3e}\n", r.mean_abs_error));
    match r.worst_system {
        Some(system) => out.push_str(&format!(
            "- max |error|     : {:.3e} (system {system})\n",
            r.max_abs_error
        )),
        None => out.push_str(&format!("- max |error|     : {:.3e}\n", r.max_abs_error)),
    }

    if !run.validation.is_empty() {
        out.push('\n');
        out.push_str(&format_validation(run));
    }

    out
}

/// Format the dense cross-check table.
pub fn format_validation(run: &RunOutput) -> String {
    let mut out = String::new();
    out.push_str("Dense reference check:\n");
    out.push_str(&format!(
        "{:<8} {:>10} {:>14} {:<24}\n",
        "system", "mismatch", "max rel err", "worst entry"
    ));
    out.push_str(&format!("{:-<8} {:-<10} {:-<14} {:-<24}\n", "", "", "", ""));
    for (system, check) in &run.validation {
        let worst = match check.worst {
            Some((Entry::Lhs { row, col }, _, _)) => format!("lhs[{row},{col}]"),
            Some((Entry::Rhs { row, channel }, _, _)) => format!("rhs[{row},{channel}]"),
            None => String::new(),
        };
        out.push_str(
            format!(
                "{:<8} {:>10} {:>14.3e} {:<24}\n",
                system, check.mismatches, check.max_relative_error, worst
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out.push_str(if run.validation_passed() {
        "Result: PASS\n"
    } else {
        "Result: FAIL\n"
    });
    out
}

fn basis_label(basis: &BasisSettings) -> String {
    match basis {
        BasisSettings::Step => "step".to_string(),
        BasisSettings::SmoothStep {
            min_width,
            max_width,
            curve,
            ..
        } => format!("smooth-step({curve:?}, width {min_width}..{max_width})").to_lowercase(),
    }
}

/// Format a list of coefficients compactly.
pub fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| format!("{x:.6}")).collect();
    format!("[{}]", parts.join(", "))
}
