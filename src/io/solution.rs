//! Read/write solution JSON files.
//!
//! A solution file is the portable result of a `bfit fit` run:
//! - the settings it was fitted with (enough to rebuild the basis library)
//! - per system, per channel: constants, coefficients and multipliers per instance
//! - the reconstructed curves at every integer domain value, for quick plotting

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::FitSettings;
use crate::error::AppError;
use crate::fit::{Solution, SolutionEvaluator};
use crate::math::BasisLibrary;

/// One observation channel of one system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// Constant term per instance.
    pub constants: Vec<f64>,
    /// `coefficients[instance][function]`.
    pub coefficients: Vec<Vec<f64>>,
    /// Lagrange multipliers of the equality constraints.
    #[serde(default)]
    pub multipliers: Vec<f64>,
    /// `curves[instance][v]` for `v = 0..=resolution`.
    pub curves: Vec<Vec<f64>>,
}

impl ChannelRecord {
    pub fn from_solution<B: BasisLibrary + ?Sized>(basis: &B, solution: &Solution) -> Self {
        let layout = solution.layout();
        let evaluator = SolutionEvaluator::new(basis);
        let instances = 0..layout.instance_count;
        Self {
            constants: instances.clone().map(|b| solution.constant(b)).collect(),
            coefficients: instances.clone().map(|b| solution.coefficients(b)).collect(),
            multipliers: solution.multipliers().to_vec(),
            curves: instances.map(|b| evaluator.evaluate_all(solution, b)).collect(),
        }
    }

    /// Rebuild the [`Solution`] (without multipliers).
    pub fn to_solution(&self) -> Solution {
        let function_count = self.coefficients.first().map_or(0, Vec::len);
        let by_function: Vec<Vec<f64>> = (0..function_count)
            .map(|k| {
                self.coefficients
                    .iter()
                    .map(|row| row.get(k).copied().unwrap_or(0.0))
                    .collect()
            })
            .collect();
        Solution::from_coefficients(&self.constants, &by_function)
    }
}

/// One system; `channels` is `None` when the system never received a valid sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemRecord {
    pub system: usize,
    pub channels: Option<Vec<ChannelRecord>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionFile {
    pub tool: String,
    pub created_at: DateTime<Utc>,
    pub settings: FitSettings,
    pub systems: Vec<SystemRecord>,
}

impl SolutionFile {
    pub fn new<B: BasisLibrary + ?Sized>(
        settings: &FitSettings,
        basis: &B,
        solutions: &[Option<Vec<Solution>>],
    ) -> Self {
        let systems = solutions
            .iter()
            .enumerate()
            .map(|(system, channels)| SystemRecord {
                system,
                channels: channels.as_ref().map(|channels| {
                    channels
                        .iter()
                        .map(|solution| ChannelRecord::from_solution(basis, solution))
                        .collect()
                }),
            })
            .collect();

        Self {
            tool: "bfit".to_string(),
            created_at: Utc::now(),
            settings: settings.clone(),
            systems,
        }
    }

    pub fn system(&self, system: usize) -> Option<&SystemRecord> {
        self.systems.iter().find(|r| r.system == system)
    }
}

/// Write a solution JSON file.
pub fn write_solution_json(path: &Path, solution: &SolutionFile) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(2, format!("Failed to create solution JSON '{}': {e}", path.display()))
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), solution)
        .map_err(|e| AppError::new(2, format!("Failed to write solution JSON: {e}")))
}

/// Read a solution JSON file.
pub fn read_solution_json(path: &Path) -> Result<SolutionFile, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open solution JSON '{}': {e}", path.display()))
    })?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::new(2, format!("Invalid solution JSON: {e}")))
}
