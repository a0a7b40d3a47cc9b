//! End-to-end: raw ensemble → resampled correlator → joint fit

mod common;

use common::*;
use lattice_stats::lattice_fit::{ExecutionStrategy, ScanAxis};
use lattice_stats::prelude::*;

fn exp_spec<'a>(corr: &'a Correlator, window: (usize, usize)) -> FitSpec<'a> {
    let exp = FunctionRegistry::with_builtins().get("exp_2pt").unwrap().clone();
    FitSpec::new()
        .add(corr, exp, window)
        .free("Zsq", 0.5)
        .free("E", 0.25)
}

#[test]
fn single_exponential_fit_of_two_exponential_data() {
    init_tracing();
    let analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
    let corr = analysis.build_correlator(&standard_ensemble(2024), &[]).unwrap();
    assert_eq!(corr.replicas(), SAMPLES);
    assert_eq!(corr.variables(), TIMESLICES);

    let spec = exp_spec(&corr, (15, 25)).with_correlation(CorrelationPolicy::Full);
    let result = Fitter::default().fit(&spec).unwrap();

    assert!(result.converged);
    assert_eq!(result.dof, 9);
    let chi = result.chi_sq_per_dof().unwrap();
    assert!((0.0..=3.0).contains(&chi), "chi^2/dof = {chi}");
    let p = result.p_value().unwrap();
    assert!(p > 0.0 && p <= 1.0);

    let (energy, error) = result.parameter("E").unwrap();
    assert!(error > 0.0);
    assert!((energy - GROUND.1).abs() < 5.0 * error, "E = {energy} ± {error}");
    assert!(result.replica_failures.is_empty());
    assert_eq!(result.replica_count(), SAMPLES);
}

#[test]
fn effective_mass_plateau_matches_fit() {
    let mut analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
    let corr = analysis.build_correlator(&standard_ensemble(7), &[]).unwrap();
    analysis.insert_correlator("pion", corr);

    let Combined::Correlator(meff) = analysis.combine("log({pion} / roll({pion}, -1))").unwrap() else {
        panic!("expected a correlator");
    };
    let mean = meff.mean().unwrap();
    let std = meff.std().unwrap();
    for t in 15..25 {
        assert!((mean[t] - GROUND.1).abs() < 5.0 * std[t], "t = {t}: {} ± {}", mean[t], std[t]);
    }
}

#[test]
fn scan_over_the_plateau() {
    let analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
    let corr = analysis.build_correlator(&standard_ensemble(11), &[]).unwrap();
    let spec = exp_spec(&corr, (15, 25));

    let scan = Fitter::default().fit_scan(&spec, &WindowScan::uniform(1, 9)).unwrap();
    assert_eq!(scan.attempted(), 6);
    assert_eq!(scan.results.len(), 6);
    for (key, fit) in &scan.results {
        assert_eq!(&fit.key(), key);
        assert_eq!(fit.dof, fit.windows[0].len() as i64 - 2);
    }

    let thinned = WindowScan::from_axes(vec![ScanAxis::with_min_width(5).max_low(16)]).with_stride(3);
    let scan = Fitter::default().fit_scan(&spec, &thinned).unwrap();
    // [15, 19], [15, 22], [15, 25], [16, 20], [16, 23]
    assert_eq!(scan.attempted(), 5);
    assert!(scan.get("[15, 19]").is_some());
    assert!(scan.get("[16, 23]").is_some());
}

#[test]
fn bootstrap_and_jackknife_errors_agree() {
    let raw = standard_ensemble(99);
    let jackknife = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
    let bootstrap = Analysis::new().with_resampler(ResamplerSpec::Bootstrap {
        seed: 5,
        resamples: 400,
    });
    let jk = jackknife.build_correlator(&raw, &[]).unwrap();
    let bs = bootstrap.build_correlator(&raw, &[]).unwrap();

    let jk_fit = Fitter::default().fit(&exp_spec(&jk, (15, 25))).unwrap();
    let bs_fit = Fitter::default().fit(&exp_spec(&bs, (15, 25))).unwrap();
    assert_eq!(bs_fit.replica_count(), 400);

    let (_, jk_err) = jk_fit.parameter("E").unwrap();
    let (_, bs_err) = bs_fit.parameter("E").unwrap();
    assert!(bs_err > 0.5 * jk_err && bs_err < 2.0 * jk_err, "{bs_err} vs {jk_err}");
}

#[test]
fn replica_results_do_not_depend_on_execution_order() {
    let analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
    let corr = analysis.build_correlator(&standard_ensemble(3), &[]).unwrap();
    let spec = exp_spec(&corr, (12, 22));

    let sequential = Fitter::default()
        .fit(&spec.clone().with_options(FitOptions::default().with_execution(ExecutionStrategy::Sequential)))
        .unwrap();
    let auto = Fitter::default()
        .fit(&spec.with_options(FitOptions::default().with_execution(ExecutionStrategy::Auto)))
        .unwrap();
    assert_eq!(sequential.replicas, auto.replicas);
    assert_eq!(sequential.std, auto.std);
}

#[test]
fn fit_summary_is_serialisable() {
    let analysis = Analysis::new().with_resampler(ResamplerSpec::Jackknife);
    let corr = analysis.build_correlator(&standard_ensemble(1), &[]).unwrap();
    let result = Fitter::default().fit(&exp_spec(&corr, (15, 25))).unwrap();

    let json = serde_json::to_value(result.summary()).unwrap();
    assert_eq!(json["dof"], 9);
    assert_eq!(json["parameters"][1]["name"], "E");
    assert_relative_eq!(json["parameters"][1]["mean"].as_f64().unwrap(), result.mean[1]);
}
