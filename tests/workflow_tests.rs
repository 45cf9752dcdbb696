//! End-to-end estimate → setx → sim tests.

mod common;

use approx::assert_relative_eq;
use common::{cars, linear_data};
use simreg_rs::core::build_design_matrix;
use simreg_rs::prelude::*;
use simreg_rs::solvers::{FitControl, LinearRegressor, Regressor};
use simreg_rs::utils::mean;

fn options_with_seed(seed: u64) -> EstimationOptions {
    EstimationOptions::builder().seed(seed).build().unwrap()
}

#[test]
fn test_first_difference_sign_for_horsepower() {
    let fit = estimate("mpg ~ hp + wt", "ls", &cars(), options_with_seed(1)).unwrap();
    let out = fit
        .setx(ScenarioSpec::new().set("hp", 100.0).set("wt", 3.0))
        .unwrap()
        .setx1(ScenarioSpec::new().set("hp", 200.0).set("wt", 3.0))
        .unwrap()
        .sim(Some(2000))
        .unwrap();

    let sims = out.simulation().unwrap();
    let fd = sims.fd.as_ref().unwrap();
    assert!(mean(&fd.values()) < 0.0);
    // Continuous outcomes carry no risk ratio
    assert!(sims.rr.is_none());
}

#[test]
fn test_intercept_only_matches_sample_mean() {
    let data = linear_data(200, 3);
    let y_bar = mean(data.numeric("y").unwrap());

    let fit = estimate("y ~ 1", "ls", &data, options_with_seed(2)).unwrap();
    let out = fit.setx(ScenarioSpec::new()).unwrap().sim(Some(2000)).unwrap();
    let ev = out.simulation().unwrap().ev.values();

    assert_relative_eq!(mean(&ev), y_bar, epsilon = 0.05);
}

#[test]
fn test_literal_linear_scenario() {
    let data = linear_data(1000, 11);
    let fit = estimate("y ~ x", "ls", &data, options_with_seed(5)).unwrap();
    let out = fit
        .setx(ScenarioSpec::new().set("x", 1.0))
        .unwrap()
        .sim(Some(5000))
        .unwrap();
    let ev = out.simulation().unwrap().ev.values();

    assert_eq!(ev.len(), 5000);
    assert!((mean(&ev) - 5.0).abs() < 0.2);
}

#[test]
fn test_range_scenario_shape_and_labels() {
    let data = linear_data(300, 4);
    let fit = estimate("y ~ x", "ls", &data, options_with_seed(8)).unwrap();
    let out = fit
        .setx(ScenarioSpec::new().range("x", [1.0, -1.0, 0.5]))
        .unwrap()
        .sim(Some(250))
        .unwrap();
    let sims = out.simulation().unwrap();

    assert_eq!(sims.ev.shape(), (250, 3));
    assert_eq!(sims.pv.shape(), (250, 3));
    assert_eq!(
        sims.ev.labels().unwrap(),
        &["1".to_string(), "-1".to_string(), "0.5".to_string()]
    );
    let means = sims.ev.column_means();
    assert!(means[0] > means[2] && means[2] > means[1]);

    let scenario = out.scenario().unwrap();
    assert!(scenario.is_range());
    assert_eq!(scenario.range_variable(), Some("x"));
}

#[test]
fn test_range_against_point_contrast_broadcasts() {
    let data = linear_data(300, 4);
    let fit = estimate("y ~ x", "ls", &data, options_with_seed(8)).unwrap();
    let out = fit
        .setx(ScenarioSpec::new().set("x", 0.0))
        .unwrap()
        .setx1(ScenarioSpec::new().range("x", [1.0, 2.0]))
        .unwrap()
        .sim(Some(100))
        .unwrap();
    let fd = out.simulation().unwrap().fd.as_ref().unwrap();
    assert_eq!(fd.shape(), (100, 2));
    let means = fd.column_means();
    assert_relative_eq!(means[0], 3.0, epsilon = 0.3);
    assert_relative_eq!(means[1], 6.0, epsilon = 0.6);
}

#[test]
fn test_range_length_mismatch_fails() {
    let data = linear_data(100, 4);
    let fit = estimate("y ~ x", "ls", &data, options_with_seed(8)).unwrap();
    let result = fit
        .setx(ScenarioSpec::new().range("x", [0.0, 1.0]))
        .unwrap()
        .setx1(ScenarioSpec::new().range("x", [0.0, 1.0, 2.0]))
        .unwrap()
        .sim(Some(10));
    assert!(matches!(
        result,
        Err(Error::ScenarioShapeMismatch {
            primary: 2,
            contrast: 3
        })
    ));
}

#[test]
fn test_two_ranges_are_rejected() {
    let fit = estimate("mpg ~ hp + wt", "ls", &cars(), EstimationOptions::default()).unwrap();
    let result = fit.setx(
        ScenarioSpec::new()
            .range("hp", [100.0, 200.0])
            .range("wt", [2.0, 3.0]),
    );
    match result {
        Err(Error::MultipleRangeVariables(names)) => {
            assert_eq!(names, vec!["hp".to_string(), "wt".to_string()]);
        }
        other => panic!("expected MultipleRangeVariables, got {other:?}"),
    }
}

#[test]
fn test_setx_clears_previous_simulation() {
    let fit = estimate("mpg ~ hp + wt", "ls", &cars(), options_with_seed(3)).unwrap();
    let simulated = fit
        .setx(ScenarioSpec::new().set("hp", 120.0))
        .unwrap()
        .sim(Some(50))
        .unwrap();
    assert!(simulated.simulation().is_some());

    let reset = simulated.setx(ScenarioSpec::new().set("hp", 150.0)).unwrap();
    assert!(reset.simulation().is_none());
    let reset1 = simulated.setx1(ScenarioSpec::new().set("hp", 150.0)).unwrap();
    assert!(reset1.simulation().is_none());

    // The original handle keeps its output
    assert!(simulated.simulation().is_some());
    assert!(reset.sim(Some(50)).unwrap().simulation().is_some());
}

#[test]
fn test_sim_without_scenario() {
    let fit = estimate("mpg ~ hp", "ls", &cars(), EstimationOptions::default()).unwrap();
    assert!(matches!(fit.sim(Some(10)), Err(Error::NoScenario)));
}

#[test]
fn test_unknown_categorical_level() {
    let fit = estimate("mpg ~ hp + cyl", "ls", &cars(), EstimationOptions::default()).unwrap();
    match fit.setx(ScenarioSpec::new().set("cyl", "twelve")) {
        Err(Error::UnknownCategoricalLevel {
            variable, levels, ..
        }) => {
            assert_eq!(variable, "cyl");
            assert_eq!(levels.len(), 3);
        }
        other => panic!("expected UnknownCategoricalLevel, got {other:?}"),
    }
    assert!(fit.setx(ScenarioSpec::new().set("cyl", "six")).is_ok());
}

#[test]
fn test_unknown_covariate() {
    let fit = estimate("mpg ~ hp", "ls", &cars(), EstimationOptions::default()).unwrap();
    assert!(matches!(
        fit.setx(ScenarioSpec::new().set("disp", 160.0)),
        Err(Error::UnknownCovariate(name)) if name == "disp"
    ));
}

#[test]
fn test_default_scenario_uses_median_and_mode() {
    let fit = estimate("mpg ~ hp + cyl + am", "ls", &cars(), EstimationOptions::default()).unwrap();
    let with_defaults = fit.setx(ScenarioSpec::new()).unwrap();
    let scenario = with_defaults.scenario().unwrap();
    let x = scenario.x_matrix();
    let names = scenario.column_names();

    let hp = names.iter().position(|n| n == "hp").unwrap();
    assert_relative_eq!(x[(0, hp)], 123.0);
    // "eight" is the most common cylinder count and the reference level
    let six = names.iter().position(|n| n == "cylsix").unwrap();
    let four = names.iter().position(|n| n == "cylfour").unwrap();
    assert_eq!(x[(0, six)], 0.0);
    assert_eq!(x[(0, four)], 0.0);
    // Automatic transmission is the more common one
    let am = names.iter().position(|n| n == "amTRUE").unwrap();
    assert_eq!(x[(0, am)], 0.0);
}

#[test]
fn test_invalid_model_name_lists_registry() {
    let err = estimate("mpg ~ hp", "lgoit", &cars(), EstimationOptions::default()).unwrap_err();
    match &err {
        Error::InvalidModelName { available, .. } => {
            assert_eq!(available.len(), 8);
            assert!(available.contains(&"logit".to_string()));
        }
        other => panic!("expected InvalidModelName, got {other:?}"),
    }
    assert!(err.to_string().contains("negbin"));
}

#[test]
fn test_formula_without_response() {
    assert!(matches!(
        estimate("~ hp", "ls", &cars(), EstimationOptions::default()),
        Err(Error::InvalidFormula { .. })
    ));
}

#[test]
fn test_seeded_simulation_is_reproducible() {
    let fit = estimate("mpg ~ hp + wt", "ls", &cars(), options_with_seed(99)).unwrap();
    let scenario = fit.setx(ScenarioSpec::new().set("hp", 150.0)).unwrap();
    let a = scenario.sim(Some(100)).unwrap();
    let b = scenario.sim(Some(100)).unwrap();
    assert_eq!(
        a.simulation().unwrap().ev.values(),
        b.simulation().unwrap().ev.values()
    );
}

#[test]
fn test_default_draw_count_comes_from_options() {
    let options = EstimationOptions::builder()
        .simulation_draws(123)
        .seed(1)
        .build()
        .unwrap();
    let fit = estimate("mpg ~ hp", "ls", &cars(), options).unwrap();
    let out = fit.setx(ScenarioSpec::new()).unwrap().sim(None).unwrap();
    assert_eq!(out.simulation().unwrap().num, 123);
    assert!(matches!(
        fit.setx(ScenarioSpec::new()).unwrap().sim(Some(0)),
        Err(Error::Options(_))
    ));
}

#[test]
fn test_coefficients_match_backend() {
    let data = cars();
    let fit = zelig2("mpg ~ hp + wt", "ls", &data, EstimationOptions::default()).unwrap();

    let formula = Formula::parse("mpg ~ hp + wt").unwrap();
    let (y, x, names) = build_design_matrix(&formula, &data.factorize()).unwrap();
    let direct = LinearRegressor::new(FitControl::default())
        .fit(&x, &y, None, &names)
        .unwrap();

    assert_eq!(fit.coefficient_names(), names.as_slice());
    for (a, b) in fit.coefficients().iter().zip(&direct.coefficients) {
        assert_relative_eq!(*a, *b, epsilon = 1e-10);
    }
    // Known least squares solution for these data
    assert_relative_eq!(fit.coefficients()[0], 37.22727, epsilon = 1e-4);
    assert_relative_eq!(fit.coefficients()[1], -0.03177, epsilon = 1e-4);
    assert_relative_eq!(fit.coefficients()[2], -3.87783, epsilon = 1e-4);
}

#[test]
fn test_summaries_render() {
    let fit = estimate("mpg ~ hp + wt", "ls", &cars(), options_with_seed(4)).unwrap();
    let summary = fit.summary();
    assert_eq!(summary.n_obs, 32);
    assert_eq!(summary.coefficients.len(), 3);
    let hp = summary.coefficient("hp").unwrap();
    assert!(hp.p_value < 0.01);
    let text = summary.to_string();
    assert!(text.contains("(Intercept)"));
    assert!(text.contains("mpg ~ hp + wt"));

    let out = fit
        .setx(ScenarioSpec::new().set("hp", 100.0))
        .unwrap()
        .setx1(ScenarioSpec::new().set("hp", 200.0))
        .unwrap()
        .sim(Some(500))
        .unwrap();
    let sims = out.simulation().unwrap().summary();
    assert_eq!(sims.quantity("ev").len(), 1);
    assert_eq!(sims.quantity("fd").len(), 1);
    let ev = sims.quantity("ev")[0];
    assert!(ev.lower < ev.median && ev.median < ev.upper);
    assert!(sims.to_string().contains("97.5%"));
}
