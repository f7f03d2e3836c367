mod common;

use common::engine;
use tilesmith::testbed::{
    FillScenario, VerificationOutcome, VerificationReport,
    scenario::{gemm_f64_sm90_rows, run_row, run_table},
};

const SEED: u64 = 0x5eed_f64;

#[test]
fn f64_gemms_match_the_reference_on_sm90() {
    let engine = engine(90);
    for row in gemm_f64_sm90_rows() {
        let outcome = run_row(&engine, &row, SEED);
        let report = outcome.report().unwrap_or_else(|| panic!("{} did not verify: {:?}", row.name, outcome.status));

        assert_eq!(report.outcome, VerificationOutcome::Pass, "{}", row.name);
        assert_eq!(report.runs.len(), row.problem_sizes.len() * FillScenario::ALL.len());
        for scenario in [FillScenario::Zero, FillScenario::MaxMagnitude] {
            assert!(report.runs.iter().any(|run| run.scenario == scenario), "{}: no {scenario:?} run", row.name);
        }
        assert!(report.max_relative_deviation() < 1e-8, "{}: {:e}", row.name, report.max_relative_deviation());
    }
    assert_eq!(engine.cache().compilations(), 4);
    assert_eq!(engine.pool().statistics().live_allocations, 0);
}

#[test]
fn f64_gemms_are_skipped_below_sm90() {
    let engine = engine(80);
    let outcomes = run_table(&engine, &gemm_f64_sm90_rows(), SEED);

    for outcome in &outcomes {
        assert!(outcome.skipped(), "{} was not skipped", outcome.name);
        assert!(!outcome.passed());
        let report = outcome.report().unwrap();
        assert!(report.runs.is_empty());
        let VerificationOutcome::Skipped(reason) = &report.outcome else {
            unreachable!();
        };
        assert!(reason.contains("sm90"), "{reason}");
    }
    assert_eq!(engine.pool().statistics().total_allocations, 0);
}

#[test]
fn verification_is_reproducible_for_a_seed() {
    let engine = engine(90);
    let row = &gemm_f64_sm90_rows()[2];
    let handle = engine.build(&row.descriptor).unwrap();

    let first = engine.verify(&handle, &row.problem_sizes, SEED).unwrap();
    let second = engine.verify(&handle, &row.problem_sizes, SEED).unwrap();
    let deviations = |report: &VerificationReport| {
        report.runs.iter().map(|run| run.deviation.clone()).collect::<Vec<_>>()
    };
    assert_eq!(deviations(&first), deviations(&second));
    assert_eq!(engine.cache().hits(), 0);
}
