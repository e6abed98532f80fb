use approx::assert_abs_diff_eq;
use brdf_basis_fit::domain::SmoothstepCurve;
use brdf_basis_fit::fit::{Solution, SolutionEvaluator};
use brdf_basis_fit::math::{BasisLibrary, SmoothStepBasis, StepBasis};
use rand::prelude::*;
use rand::rngs::StdRng;

fn smooth_libraries() -> Vec<SmoothStepBasis> {
    vec![
        SmoothStepBasis::uniform(8, 0.25, 3, SmoothstepCurve::Cubic).unwrap(),
        SmoothStepBasis::uniform(5, 1.0, 1, SmoothstepCurve::Linear).unwrap(),
        SmoothStepBasis::with_curve(16, 0.5, 2, 6, 9, SmoothstepCurve::Quintic).unwrap(),
        SmoothStepBasis::with_curve(10, 0.0, 3, 3, 4, SmoothstepCurve::Cubic).unwrap(),
        SmoothStepBasis::new(6, 0.7, 1, 4, 6, |x: f64| x.sqrt()).unwrap(),
    ]
}

fn all_libraries() -> Vec<Box<dyn BasisLibrary>> {
    let mut libraries: Vec<Box<dyn BasisLibrary>> = vec![
        Box::new(StepBasis::new(1, 0.0).unwrap()),
        Box::new(StepBasis::new(7, 0.4).unwrap()),
    ];
    for basis in smooth_libraries() {
        libraries.push(Box::new(basis));
    }
    libraries
}

#[test]
fn every_function_starts_at_one() {
    for basis in all_libraries() {
        for i in 0..basis.function_count() {
            assert_eq!(basis.evaluate(i, 0), 1.0, "{i}");
        }
    }
}

#[test]
fn hard_steps_drop_to_zero_past_their_index() {
    let basis = StepBasis::new(7, 0.0).unwrap();
    for i in 0..basis.function_count() {
        for v in 0..=basis.optimized_domain_size() {
            let expected = if v <= i { 1.0 } else { 0.0 };
            assert_eq!(basis.evaluate(i, v), expected, "f({i}, {v})");
        }
    }
}

#[test]
fn smooth_steps_are_bounded_and_non_increasing() {
    for basis in smooth_libraries() {
        for i in 0..basis.function_count() {
            let mut previous = basis.evaluate(i, 0);
            for v in 0..=basis.optimized_domain_size() {
                let value = basis.evaluate(i, v);
                assert!((0.0..=1.0).contains(&value), "{basis:?}: f({i}, {v}) = {value}");
                assert!(value <= previous + 1e-12, "{basis:?}: f({i}) rises at {v}");
                previous = value;
            }
            assert_abs_diff_eq!(
                basis.evaluate(i, basis.optimized_domain_size()),
                0.0,
                epsilon = 1e-12
            );
        }
    }
}

#[test]
fn function_windows_cover_every_transition() {
    for basis in all_libraries() {
        for v in 0..basis.optimized_domain_size() {
            let first = basis.first_function_index(v);
            let last = basis.last_function_index(v);
            for k in 0..basis.function_count() {
                let (lo, hi) = (basis.evaluate(k, v), basis.evaluate(k, v + 1));
                if k < first {
                    assert!(lo.abs() < 1e-12 && hi.abs() < 1e-12, "f({k}) below window at {v}");
                } else if k > last {
                    assert!(lo == 1.0 && hi == 1.0, "f({k}) above window at {v}");
                }
            }
        }
    }
}

#[test]
fn evaluator_matches_direct_sum() {
    let mut rng = StdRng::seed_from_u64(3);
    for basis in all_libraries() {
        let instances = 2;
        let constants: Vec<f64> = (0..instances).map(|_| rng.gen_range(0.0..1.0)).collect();
        let coefficients: Vec<Vec<f64>> = (0..basis.function_count())
            .map(|_| (0..instances).map(|_| rng.gen_range(0.0..1.0)).collect())
            .collect();
        let solution = Solution::from_coefficients(&constants, &coefficients);
        let evaluator = SolutionEvaluator::new(basis.as_ref());

        for b in 0..instances {
            let curve = evaluator.evaluate_all(&solution, b);
            assert_eq!(curve.len(), basis.optimized_domain_size() + 1);
            for (v, &value) in curve.iter().enumerate() {
                let direct: f64 = (0..basis.function_count())
                    .map(|k| coefficients[k][b] * basis.evaluate(k, v))
                    .sum::<f64>()
                    + constants[b] * basis.metallicity();
                assert_abs_diff_eq!(value, direct, epsilon = 1e-12);
                assert_abs_diff_eq!(evaluator.evaluate(&solution, b, v), direct, epsilon = 1e-12);
            }
        }
    }
}

#[test]
fn invalid_resolution_is_rejected() {
    assert!(StepBasis::new(0, 0.0).is_err());
    assert!(SmoothStepBasis::uniform(0, 0.0, 2, SmoothstepCurve::Cubic).is_err());
    assert!(SmoothStepBasis::with_curve(4, 0.0, 1, 2, 0, SmoothstepCurve::Cubic).is_err());
}
