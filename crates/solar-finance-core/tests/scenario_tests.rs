#![cfg(feature = "scenarios")]

mod common;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use solar_finance_core::scenarios::{run_scenarios, sensitivity_sweep, SensitivityInput};
use solar_finance_core::{run_model, MetricValue, Scenario, SensitivityVariable};

use common::*;

fn scenario(name: &str, overrides: serde_json::Value) -> Scenario {
    Scenario {
        name: name.into(),
        overrides,
    }
}

#[test]
fn test_empty_patch_matches_direct_run() {
    let base = ppa_project(dec!(50));
    let direct = run_model(&base).unwrap();
    let batch = run_scenarios(&base, &[scenario("base", json!({}))]).unwrap();

    let outcome = &batch.result.scenarios[0];
    assert!(outcome.is_ok());
    assert_eq!(outcome.metrics.as_ref(), Some(&direct.result.metrics));
}

#[test]
fn test_overrides_change_results_and_keep_order() {
    let base = ppa_project(dec!(50));
    let batch = run_scenarios(
        &base,
        &[
            scenario("low", json!({"commercial": {"Ppa": {"base_price_per_mwh": "40"}}})),
            scenario("high", json!({"commercial": {"Ppa": {"base_price_per_mwh": "70"}}})),
        ],
    )
    .unwrap();

    let names: Vec<&str> = batch.result.scenarios.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["low", "high"]);

    let npv = |i: usize| {
        batch.result.scenarios[i]
            .metrics
            .as_ref()
            .unwrap()
            .project_npv_nominal
            .value()
            .unwrap()
    };
    assert!(npv(1) > npv(0));
    assert_eq!(batch.result.failed, 0);
}

#[test]
fn test_failing_scenario_is_reported_not_fatal() {
    let base = ppa_project(dec!(50));
    let batch = run_scenarios(
        &base,
        &[
            scenario("ok", json!({})),
            scenario("bad horizon", json!({"operating_years": 0})),
            scenario("bad shape", json!({"system": {"ac_kw": "not a number"}})),
        ],
    )
    .unwrap();

    assert_eq!(batch.result.succeeded, 1);
    assert_eq!(batch.result.failed, 2);
    assert!(batch.result.scenarios[1].error.as_ref().unwrap().contains("Configuration"));
    assert!(batch.result.scenarios[2].error.as_ref().unwrap().contains("Serialization"));
    assert_eq!(batch.warnings.len(), 2);
}

#[test]
fn test_empty_batch_rejected() {
    assert!(run_scenarios(&ppa_project(dec!(50)), &[]).is_err());
}

#[test]
fn test_price_sweep_is_monotonic() {
    let base = ppa_project(dec!(50));
    let input = SensitivityInput {
        variable: SensitivityVariable {
            name: "commercial.Ppa.base_price_per_mwh".into(),
            min: dec!(40),
            max: dec!(60),
            step: dec!(10),
        },
        output_metric: "project_npv_nominal".into(),
    };
    let out = sensitivity_sweep(&base, &input).unwrap();
    let r = &out.result;

    assert_eq!(r.values, vec![dec!(40), dec!(50), dec!(60)]);
    assert_eq!(r.base_case_position, 1);
    let npvs: Vec<Decimal> = r.results.iter().map(|m| m.value().unwrap()).collect();
    assert!(npvs[0] < npvs[1] && npvs[1] < npvs[2]);
    assert_eq!(r.base_case_value, MetricValue::Defined(npvs[1]));
}

#[test]
fn test_sweep_over_integer_field() {
    let base = ppa_project(dec!(50));
    let input = SensitivityInput {
        variable: SensitivityVariable {
            name: "operating_years".into(),
            min: dec!(20),
            max: dec!(30),
            step: dec!(5),
        },
        output_metric: "lifetime_energy_mwh".into(),
    };
    let out = sensitivity_sweep(&base, &input).unwrap();
    let energy: Vec<Decimal> = out.result.results.iter().map(|m| m.value().unwrap()).collect();
    assert_eq!(energy.len(), 3);
    assert!(energy[0] < energy[1] && energy[1] < energy[2]);
}

#[test]
fn test_unknown_metric_rejected() {
    let input = SensitivityInput {
        variable: SensitivityVariable {
            name: "discount_rate".into(),
            min: dec!(0.06),
            max: dec!(0.08),
            step: dec!(0.01),
        },
        output_metric: "moic".into(),
    };
    assert!(sensitivity_sweep(&ppa_project(dec!(50)), &input).is_err());
}
