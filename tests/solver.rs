mod common;

use approx::assert_abs_diff_eq;
use brdf_basis_fit::fit::{
    EqualityConstraint, SolutionEvaluator, SolutionLayout, SolveOptions, SystemMatrixBuilder,
    solve_systems,
};
use brdf_basis_fit::math::nnls;
use brdf_basis_fit::math::{StepBasis, solve_dense};
use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand::rngs::StdRng;

use common::{Batch, Entry, VecModel, random_stream};

/// `½ xᵗ AᵗA x − xᵗ Aᵗb`, the least-squares objective up to a constant.
fn objective(lhs: &DMatrix<f64>, rhs: &DVector<f64>, x: &DVector<f64>) -> f64 {
    0.5 * x.dot(&(lhs * x)) - x.dot(rhs)
}

/// Best non-negative solution over every candidate free set.
fn brute_force(lhs: &DMatrix<f64>, rhs: &DVector<f64>) -> DVector<f64> {
    let n = lhs.nrows();
    let mut best = DVector::zeros(n);
    let mut best_value = 0.0;
    for mask in 1u32..(1 << n) {
        let free: Vec<usize> = (0..n).filter(|i| mask & (1 << i) != 0).collect();
        let reduced = DMatrix::from_fn(free.len(), free.len(), |r, c| lhs[(free[r], free[c])]);
        let b = DVector::from_fn(free.len(), |r, _| rhs[free[r]]);
        let Some(z) = solve_dense(reduced, &b) else {
            continue;
        };
        if z.iter().any(|&v| v < 0.0) {
            continue;
        }
        let mut x = DVector::zeros(n);
        for (&i, &v) in free.iter().zip(z.iter()) {
            x[i] = v;
        }
        let value = objective(lhs, rhs, &x);
        if value < best_value {
            best_value = value;
            best = x;
        }
    }
    best
}

fn random_normal_equations(rng: &mut StdRng, variables: usize) -> (DMatrix<f64>, DVector<f64>) {
    let a = DMatrix::from_fn(6, variables, |_, _| rng.gen_range(-1.0..1.0));
    let b = DVector::from_fn(6, |_, _| rng.gen_range(-1.0..1.0));
    (a.transpose() * &a, a.transpose() * b)
}

#[test]
fn unconstrained_solve_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(7);
    for case in 0..200 {
        let variables = 2 + case % 2;
        let (lhs, rhs) = random_normal_equations(&mut rng, variables);

        let solved = nnls::solve(&lhs, &rhs, 1e-12, 0).unwrap();
        let expected = brute_force(&lhs, &rhs);

        assert!(solved.iter().all(|&v| v >= -1e-12), "case {case}: {solved}");
        assert_abs_diff_eq!(
            objective(&lhs, &rhs, &solved),
            objective(&lhs, &rhs, &expected),
            epsilon = 1e-9
        );
        for (x, y) in solved.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-6);
        }
    }
}

#[test]
fn equality_constraint_is_satisfied() {
    // x0 + x1 + x2 = 1, pulling x2 negative; the constraint and non-negativity both bind.
    let lhs = DMatrix::from_row_slice(
        4,
        4,
        &[
            1.0, 0.0, 0.0, 1.0, //
            0.0, 1.0, 0.0, 1.0, //
            0.0, 0.0, 1.0, 1.0, //
            1.0, 1.0, 1.0, 0.0,
        ],
    );
    let rhs = DVector::from_row_slice(&[1.0, 0.8, -0.2, 1.0]);
    let epsilon = 1e-12;

    let x = nnls::solve(&lhs, &rhs, epsilon, 1).unwrap();

    assert_abs_diff_eq!(x[0], 0.6, epsilon = 1e-9);
    assert_abs_diff_eq!(x[1], 0.4, epsilon = 1e-9);
    assert_abs_diff_eq!(x[2], 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(x[3], 0.4, epsilon = 1e-9);
    assert!((x[0] + x[1] + x[2] - 1.0).abs() <= 1e-6);
    assert!(x.rows(0, 3).iter().all(|&v| v >= -epsilon));
}

#[test]
fn constraint_on_a_subset_survives_a_singular_first_pick() {
    // x0 = 0.5. The largest gradient belongs to x1, which the constraint does not cover, so the
    // first reduced system is singular and x1 has to be retried once x0 is free.
    let lhs = DMatrix::from_row_slice(
        3,
        3,
        &[
            1.0, 0.5, 1.0, //
            0.5, 1.0, 0.0, //
            1.0, 0.0, 0.0,
        ],
    );
    let rhs = DVector::from_row_slice(&[0.2, 2.0, 0.5]);

    let x = nnls::solve(&lhs, &rhs, 1e-12, 1).unwrap();

    assert_abs_diff_eq!(x[0], 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(x[1], 1.75, epsilon = 1e-9);
    assert_abs_diff_eq!(x[2], -1.175, epsilon = 1e-9);
}

#[test]
fn weighted_constant_constraint_holds_for_built_systems() {
    let (systems, instances, channels) = (6, 2, 2);
    let weights = [1.0, 2.0];
    let target = 0.8;

    let basis = StepBasis::new(5, 0.3).unwrap();
    let stream = random_stream(41, systems, 50, 5, instances, channels, &[4]);
    let output = SystemMatrixBuilder::new(&basis, systems, instances, channels)
        .unwrap()
        .with_constraints(vec![EqualityConstraint::on_constants(
            instances,
            |b| weights[b],
            target,
        )])
        .build(stream, &VecModel, |_| {})
        .unwrap();

    let layout = SolutionLayout::new(instances, 5);
    let solved = solve_systems(&output.systems, &output.valid, layout, SolveOptions::default())
        .unwrap();

    assert!(solved[4].is_none());
    for (system, channels_solved) in solved.iter().enumerate() {
        let Some(channels_solved) = channels_solved else {
            continue;
        };
        for solution in channels_solved {
            let sum: f64 = (0..instances).map(|b| weights[b] * solution.constant(b)).sum();
            assert!(
                (sum - target).abs() <= 1e-6 * target,
                "system {system}: weighted constant sum {sum}"
            );
            assert!(
                solution.values().rows(0, layout.core_size()).iter().all(|&v| v >= -1e-12),
                "system {system}: negative core entry"
            );
            assert_eq!(solution.multipliers().len(), 1);
        }
    }
}

#[test]
fn solving_twice_gives_identical_results() {
    let mut rng = StdRng::seed_from_u64(19);
    let (core, rhs) = random_normal_equations(&mut rng, 3);
    let mut lhs = DMatrix::zeros(4, 4);
    lhs.view_mut((0, 0), (3, 3)).copy_from(&core);
    for i in 0..3 {
        lhs[(3, i)] = 1.0;
        lhs[(i, 3)] = 1.0;
    }
    let rhs = DVector::from_fn(4, |i, _| if i < 3 { rhs[i] } else { 1.0 });

    let first = nnls::solve(&lhs, &rhs, 1e-12, 1).unwrap();
    let second = nnls::solve(&lhs, &rhs, 1e-12, 1).unwrap();
    assert_eq!(first, second);

    let basis = StepBasis::new(6, 0.3).unwrap();
    let stream = random_stream(23, 5, 40, 6, 2, 2, &[]);
    let output = SystemMatrixBuilder::new(&basis, 5, 2, 2)
        .unwrap()
        .build(stream, &VecModel, |_| {})
        .unwrap();
    let layout = SolutionLayout::new(2, 6);
    let a = solve_systems(&output.systems, &output.valid, layout, SolveOptions::default()).unwrap();
    let b = solve_systems(&output.systems, &output.valid, layout, SolveOptions::default()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn step_library_recovers_a_linear_falloff() {
    // Target (4 - v) / 4 sampled every half step over [0, 4].
    let basis = StepBasis::new(4, 0.0).unwrap();
    let stream: Vec<Batch> = (0..9)
        .map(|i| {
            let actual = i as f64 / 2.0;
            vec![Some(Entry::simple(actual, (4.0 - actual) / 4.0))]
        })
        .collect();

    let output = SystemMatrixBuilder::new(&basis, 1, 1, 1)
        .unwrap()
        .build(stream, &VecModel, |_| {})
        .unwrap();
    let layout = SolutionLayout::new(1, 4);
    let solved = solve_systems(&output.systems, &output.valid, layout, SolveOptions::default())
        .unwrap();
    let solution = &solved[0].as_ref().unwrap()[0];

    assert_abs_diff_eq!(solution.constant(0), 0.0, epsilon = 0.05);
    for k in 0..4 {
        assert_abs_diff_eq!(solution.coefficient(k, 0), 0.25, epsilon = 0.05);
    }

    let evaluator = SolutionEvaluator::new(&basis);
    for i in 0..=8 {
        let actual = i as f64 / 2.0;
        assert_abs_diff_eq!(
            evaluator.evaluate_at(solution, 0, actual),
            (4.0 - actual) / 4.0,
            epsilon = 0.05
        );
    }
    for (v, value) in evaluator.evaluate_all(solution, 0).into_iter().enumerate() {
        assert_abs_diff_eq!(value, (4.0 - v as f64) / 4.0, epsilon = 0.05);
    }
}

#[test]
fn unmarked_systems_are_not_solved() {
    let basis = StepBasis::new(4, 0.0).unwrap();
    let stream = random_stream(31, 4, 25, 4, 1, 1, &[2]);
    let output = SystemMatrixBuilder::new(&basis, 4, 1, 1)
        .unwrap()
        .build(stream, &VecModel, |_| {})
        .unwrap();

    let solved = solve_systems(
        &output.systems,
        &output.valid,
        SolutionLayout::new(1, 4),
        SolveOptions::default(),
    )
    .unwrap();

    assert_eq!(output.valid, vec![true, true, false, true]);
    assert!(solved[2].is_none());
    for system in [0, 1, 3] {
        let channels = solved[system].as_ref().unwrap();
        assert_eq!(channels.len(), 1);
        assert!(channels[0].values().iter().all(|&v| v >= -1e-12));
    }
}
