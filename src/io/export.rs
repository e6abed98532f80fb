//! Export reconstructed curves to CSV.
//!
//! One row per (system, channel, instance, v), easy to load in spreadsheets or notebooks.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::data::TexelTruth;
use crate::error::AppError;
use crate::fit::{Solution, SolutionEvaluator};
use crate::math::BasisLibrary;

/// Write fitted curves (and ground truth, when known) to a CSV file.
///
/// Systems without a solution are skipped.
pub fn write_curves_csv<B: BasisLibrary + ?Sized>(
    path: &Path,
    basis: &B,
    solutions: &[Option<Vec<Solution>>],
    truth: Option<&[TexelTruth]>,
) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display()))
    })?;
    let mut out = BufWriter::new(file);
    write_curves(&mut out, basis, solutions, truth)
        .and_then(|()| out.flush())
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV: {e}")))
}

fn write_curves<W: Write, B: BasisLibrary + ?Sized>(
    out: &mut W,
    basis: &B,
    solutions: &[Option<Vec<Solution>>],
    truth: Option<&[TexelTruth]>,
) -> std::io::Result<()> {
    writeln!(out, "system,channel,instance,v,fitted,truth")?;
    let evaluator = SolutionEvaluator::new(basis);

    for (system, channels) in solutions.iter().enumerate() {
        let Some(channels) = channels else { continue };
        for (channel, solution) in channels.iter().enumerate() {
            let expected = truth
                .and_then(|t| t.get(system))
                .and_then(|t| t.channels.get(channel));
            for instance in 0..solution.layout().instance_count {
                let fitted = evaluator.evaluate_all(solution, instance);
                let reference = expected.map(|s| evaluator.evaluate_all(s, instance));
                for (v, y) in fitted.iter().enumerate() {
                    let t = reference
                        .as_ref()
                        .and_then(|r| r.get(v))
                        .map(|t| format!("{t:.10}"))
                        .unwrap_or_default();
                    writeln!(out, "{system},{channel},{instance},{v},{y:.10},{t}")?;
                }
            }
        }
    }
    Ok(())
}
