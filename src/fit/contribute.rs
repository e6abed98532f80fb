//! Distributing running sums into a system when the build crosses a floor boundary.
//!
//! Every library term of a sample is `analytic · F_k`, where
//! `F_k = t · f(k, floor) + (1 − t) · f(k, floor + 1)`. At a given floor the library splits in three:
//!
//! - `k < first`: `F_k = 0`, nothing to add
//! - `first ≤ k ≤ last` (the window): `F_k` depends on `t`, so entries are rebuilt from the
//!   blended transient sums of the floor that just ended
//! - `k > last`: `F_k = 1`, so entries only need unblended totals
//!
//! Saturated rows are deferred. A row `m` stays saturated for every floor whose `last < m`, so
//! its saturated contribution is exactly the cumulative sums at the moment `m` enters the
//! window. Rows in `(last(current), last(next)]` are flushed from the cumulative set here and
//! never again.

use crate::fit::{AugmentedSystem, RunningSums};
use crate::math::BasisLibrary;

/// `Σ x · (t · lower + (1 − t) · upper)` from `blended = Σ x·t` and `unblended = Σ x`.
#[inline]
fn lerp_sums(lower: f64, upper: f64, blended: f64, unblended: f64) -> f64 {
    lower * blended + upper * (unblended - blended)
}

/// Flush `sums` into `system` for the transition `current → next`.
///
/// The transient sums must hold exactly the samples of floor `current`.
pub fn contribute<B: BasisLibrary + ?Sized>(
    basis: &B,
    current: usize,
    next: usize,
    instance_count: usize,
    sums: &RunningSums,
    system: &mut AugmentedSystem,
) {
    let function_count = basis.function_count();
    if function_count == 0 {
        return;
    }
    let metallicity = basis.metallicity();
    let channels = sums.observation_count().min(system.channel_count());
    let instances = instance_count.min(sums.instance_count());

    let first = basis.first_function_index(current);
    let last = basis.last_function_index(current).min(function_count - 1);
    let next_last = basis.last_function_index(next).min(function_count - 1);
    let index = |k: usize, b: usize| instance_count * (k + 1) + b;

    let window: Vec<(usize, f64, f64)> = (first..=last)
        .map(|k| (k, basis.evaluate(k, current), basis.evaluate(k, current + 1)))
        .collect();

    let transient = sums.transient();
    let cumulative = sums.cumulative();

    for b1 in 0..instances {
        for &(k, lower, upper) in &window {
            let i = index(k, b1);

            for ch in 0..channels {
                system.add_to_rhs(
                    i,
                    ch,
                    lerp_sums(
                        lower,
                        upper,
                        transient.weighted_analytic_times_observed_blended[(ch, b1)],
                        transient.weighted_analytic_times_observed[(ch, b1)],
                    ),
                );
            }

            for b2 in 0..instances {
                let cross = lerp_sums(
                    lower,
                    upper,
                    transient.cross_blended(metallicity, b1, b2),
                    transient.cross(metallicity, b1, b2),
                );
                system.add_to_lhs(i, b2, cross);
                system.add_to_lhs(b2, i, cross);

                let squared = transient.weighted_analytic_squared[(b1, b2)];
                let squared_blended = transient.weighted_analytic_squared_blended[(b1, b2)];
                let squared_blended_squared =
                    transient.weighted_analytic_squared_blended_squared[(b1, b2)];

                for &(k2, lower2, upper2) in &window {
                    let value = lerp_sums(
                        lower,
                        upper,
                        lerp_sums(lower2, upper2, squared_blended_squared, squared_blended),
                        lerp_sums(lower2, upper2, squared_blended, squared),
                    );
                    system.add_to_lhs(i, index(k2, b2), value);
                }

                let saturated = lerp_sums(lower, upper, squared_blended, squared);
                for k2 in (last + 1)..function_count {
                    let j = index(k2, b2);
                    system.add_to_lhs(i, j, saturated);
                    system.add_to_lhs(j, i, saturated);
                }
            }
        }

        for m1 in (last + 1)..=next_last {
            let i = index(m1, b1);

            for ch in 0..channels {
                system.add_to_rhs(i, ch, cumulative.weighted_analytic_times_observed[(ch, b1)]);
            }

            for b2 in 0..instances {
                system.add_to_lhs(i, b2, cumulative.cross(metallicity, b1, b2));
                system.add_to_lhs(b2, i, cumulative.cross(metallicity, b2, b1));

                // Saturated pairs depend only on the lower row, so row m1 owns every m2 ≥ m1.
                system.add_to_lhs(
                    i,
                    index(m1, b2),
                    cumulative.weighted_analytic_squared[(b1, b2)],
                );
                for m2 in (m1 + 1)..function_count {
                    let j = index(m2, b2);
                    system.add_to_lhs(i, j, cumulative.weighted_analytic_squared[(b1, b2)]);
                    system.add_to_lhs(j, i, cumulative.weighted_analytic_squared[(b2, b1)]);
                }
            }
        }
    }
}
