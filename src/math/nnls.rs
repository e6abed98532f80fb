//! Non-negative least squares with linear equality constraints.
//!
//! We solve
//!
//! ```text
//! minimize ‖Ax − b‖²   subject to   x_core ≥ 0,   Cx = d
//! ```
//!
//! in premultiplied form. The caller passes the augmented (KKT) system
//!
//! ```text
//! [ AᵗA  Cᵗ ] [ x ]   [ Aᵗb ]
//! [ C    0  ] [ λ ] = [ d   ]
//! ```
//!
//! where the trailing `constraint_count` rows and columns hold the constraints. The multipliers
//! `λ` are unrestricted in sign and always part of the reduced solve.
//!
//! The algorithm is the Lawson–Hanson active-set method:
//!
//! - start with every core variable fixed at zero
//! - free the fixed variable with the largest gradient component `w = Aᵗb − AᵗA·x`
//! - solve the reduced system over the free set (plus constraints)
//! - while a free variable comes out negative, step towards the candidate as far as
//!   feasibility allows and fix the variables that hit zero
//!
//! A singular reduced system rolls back the variable that caused it and skips that variable
//! until another one is freed successfully; the solve then continues with the reduced free set.
//! The solve always terminates: each outer iteration is counted against `max_iterations`.

use nalgebra::{DMatrix, DVector};
use tracing::{trace, warn};

use crate::error::FitError;
use crate::math::solve_dense;

/// The set of core variables allowed to be non-zero.
///
/// O(1) membership, and an order-preserving compaction to reduced indices.
#[derive(Debug, Clone, Default)]
pub struct FreeSet {
    member: Vec<bool>,
    len: usize,
}

impl FreeSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            member: vec![false; capacity],
            len: 0,
        }
    }

    /// Empty the set and resize it to `capacity` variables, reusing the allocation.
    pub fn reset(&mut self, capacity: usize) {
        self.member.clear();
        self.member.resize(capacity, false);
        self.len = 0;
    }

    pub fn capacity(&self) -> usize {
        self.member.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.member.len()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.member.get(index).copied().unwrap_or(false)
    }

    /// Returns `true` if `index` was not free before.
    pub fn insert(&mut self, index: usize) -> bool {
        match self.member.get_mut(index) {
            Some(slot) if !*slot => {
                *slot = true;
                self.len += 1;
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if `index` was free before.
    pub fn remove(&mut self, index: usize) -> bool {
        match self.member.get_mut(index) {
            Some(slot) if *slot => {
                *slot = false;
                self.len -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.member
            .iter()
            .enumerate()
            .filter_map(|(i, &free)| free.then_some(i))
    }

    /// Fixed variable with the largest gradient component, ignoring NaN and any index set in
    /// `excluded`.
    pub fn most_violating(&self, gradient: &DVector<f64>, excluded: &[bool]) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &free) in self.member.iter().enumerate() {
            if free || excluded.get(i).copied().unwrap_or(false) {
                continue;
            }
            let value = gradient[i];
            if value.is_nan() {
                continue;
            }
            if best.is_none_or(|(_, max)| value > max) {
                best = Some((i, value));
            }
        }
        best
    }

    /// Fill `mapping` with the free indices in ascending order followed by the
    /// `constraint_count` indices after the core block.
    pub fn compact_into(&self, constraint_count: usize, mapping: &mut Vec<usize>) {
        mapping.clear();
        mapping.extend(self.iter());
        let core = self.member.len();
        mapping.extend(core..core + constraint_count);
    }
}

/// Scratch state reused across solves (one per worker thread).
#[derive(Debug, Clone, Default)]
pub struct NnlsWorkspace {
    free: FreeSet,
    mapping: Vec<usize>,
    /// Variables whose addition made the reduced system singular.
    skipped: Vec<bool>,
}

impl NnlsWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Solve the system restricted to the free set plus constraints and scatter the result
    /// into a full-length vector (fixed variables are zero).
    fn reduced_solve(
        &mut self,
        lhs: &DMatrix<f64>,
        rhs: &DVector<f64>,
        constraint_count: usize,
    ) -> Option<DVector<f64>> {
        self.free.compact_into(constraint_count, &mut self.mapping);
        let mapping = &self.mapping;
        let m = mapping.len();

        let reduced_lhs = DMatrix::from_fn(m, m, |r, c| lhs[(mapping[r], mapping[c])]);
        let reduced_rhs = DVector::from_fn(m, |r, _| rhs[mapping[r]]);
        let reduced = solve_dense(reduced_lhs, &reduced_rhs)?;

        let mut full = DVector::zeros(rhs.len());
        for (r, &index) in mapping.iter().enumerate() {
            full[index] = reduced[r];
        }
        Some(full)
    }

    fn free_entries_non_negative(&self, candidate: &DVector<f64>) -> bool {
        self.free.iter().all(|i| candidate[i] >= 0.0)
    }
}

/// Solver knobs that do not change the problem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NnlsOptions {
    /// Cap on outer (variable-adding) iterations; defaults to `3 × core variable count`.
    pub max_iterations: Option<usize>,
}

/// Solve an augmented NNLS system with a throwaway workspace and default options.
pub fn solve(
    lhs: &DMatrix<f64>,
    rhs: &DVector<f64>,
    epsilon: f64,
    constraint_count: usize,
) -> Result<DVector<f64>, FitError> {
    solve_with(
        &mut NnlsWorkspace::new(),
        lhs,
        rhs,
        epsilon,
        constraint_count,
        NnlsOptions::default(),
    )
}

/// Solve an augmented NNLS system.
///
/// Returns the full vector: the non-negative core solution followed by the Lagrange
/// multipliers of the constraints.
///
/// # Errors
///
/// [`FitError::InvalidArgument`] if `lhs` is not square, `rhs` does not match it,
/// `constraint_count` exceeds the system size or `epsilon` is not a finite positive number.
pub fn solve_with(
    ws: &mut NnlsWorkspace,
    lhs: &DMatrix<f64>,
    rhs: &DVector<f64>,
    epsilon: f64,
    constraint_count: usize,
    options: NnlsOptions,
) -> Result<DVector<f64>, FitError> {
    let n = lhs.nrows();
    if lhs.ncols() != n {
        return Err(FitError::invalid(format!(
            "AᵗA must be square (got {}x{})",
            n,
            lhs.ncols()
        )));
    }
    if rhs.len() != n {
        return Err(FitError::invalid(format!(
            "Aᵗb has {} rows but AᵗA has {}",
            rhs.len(),
            n
        )));
    }
    if constraint_count > n {
        return Err(FitError::invalid(format!(
            "constraint_count {constraint_count} exceeds system size {n}"
        )));
    }
    if !(epsilon.is_finite() && epsilon > 0.0) {
        return Err(FitError::invalid(format!(
            "epsilon must be finite and > 0 (got {epsilon})"
        )));
    }

    let core = n - constraint_count;
    ws.free.reset(core);
    ws.skipped.clear();
    ws.skipped.resize(core, false);

    let mut x = DVector::zeros(n);
    let mut w = rhs.clone();
    let max_iterations = options.max_iterations.unwrap_or(3 * core).max(1);
    let mut iterations = 0usize;

    while !ws.free.is_full() {
        let Some((k, max_w)) = ws.free.most_violating(&w, &ws.skipped) else {
            break;
        };
        let significant = max_w > epsilon;
        if !significant && !ws.free.is_empty() {
            break;
        }
        if iterations == max_iterations {
            warn!(
                max_iterations,
                free = ws.free.len(),
                max_w,
                "NNLS iteration cap reached; returning current iterate"
            );
            break;
        }
        iterations += 1;
        ws.free.insert(k);

        let mut finished = false;
        let candidate = loop {
            let Some(s) = ws.reduced_solve(lhs, rhs, constraint_count) else {
                break None;
            };
            if ws.free_entries_non_negative(&s) {
                break Some(s);
            }

            // Largest step towards `s` that keeps every free variable non-negative.
            let mut alpha = 1.0;
            let mut blocking = None;
            for i in ws.free.iter() {
                if s[i] <= 0.0 {
                    let step = x[i] / (x[i] - s[i]);
                    if step <= alpha {
                        alpha = step;
                        blocking = Some(i);
                    }
                }
            }
            let Some(j) = blocking else {
                break Some(x.clone());
            };

            let step = (&s - &x) * alpha;
            x += step;
            ws.free.remove(j);
            x[j] = 0.0;

            if j == k {
                // The variable just added cannot stay positive; the remaining gradient is noise.
                finished = true;
            } else {
                for i in 0..core {
                    if ws.free.contains(i) && x[i] <= 0.0 {
                        ws.free.remove(i);
                        x[i] = 0.0;
                    }
                }
            }
        };

        let mut rolled_back = false;
        match candidate {
            Some(s) => {
                x = s;
                ws.skipped.fill(false);
            }
            None => {
                let singular = FitError::SingularSystem {
                    size: ws.free.len() + constraint_count,
                };
                warn!(variable = k, "{singular}; rolling back last addition");
                ws.free.remove(k);
                ws.skipped[k] = true;
                x[k] = 0.0;
                x = match ws.reduced_solve(lhs, rhs, constraint_count) {
                    Some(s) if ws.free_entries_non_negative(&s) => s,
                    _ => {
                        for i in 0..core {
                            if !ws.free.contains(i) {
                                x[i] = 0.0;
                            }
                        }
                        x
                    }
                };
                rolled_back = true;
            }
        }

        w = rhs - lhs * &x;
        if finished || (!significant && !rolled_back) {
            break;
        }
    }

    trace!(iterations, free = ws.free.len(), "NNLS solve finished");
    Ok(x)
}
