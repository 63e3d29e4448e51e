mod common;

use chrono::{Months, NaiveDate};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use solar_finance_core::assumptions::*;
use solar_finance_core::debt::{size_debt, BindingConstraint, DebtPolicy};
use solar_finance_core::{run_model, MetricValue, SolarFinanceError};

use common::*;

// ===========================================================================
// Ledger shape
// ===========================================================================

#[test]
fn test_one_row_per_period_in_order() {
    let out = run_model(&ppa_project(dec!(50))).unwrap();
    let rows = out.result.ledger.rows();

    assert_eq!(rows.len(), 6 + 25 * 12);
    assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
    assert!(rows[..6].iter().all(|r| r.is_pre_cod));
    assert_eq!(rows[6].date, NaiveDate::from_ymd_opt(2027, 1, 1).unwrap());
    assert_eq!(rows[6].operating_year, 1);

    for (i, pair) in rows.windows(2).enumerate() {
        assert_eq!(pair[0].index, i);
        assert_eq!(pair[0].date.checked_add_months(Months::new(1)), Some(pair[1].date));
    }
}

#[test]
fn test_capex_only_before_cod() {
    let out = run_model(&ppa_project(dec!(50))).unwrap();
    let ledger = &out.result.ledger;
    assert!(ledger.operating_rows().all(|r| r.capex.is_zero()));
    // 3.0M plus the 5% default contingency
    assert_eq!(ledger.total(|r| r.capex), dec!(3150000));
}

// ===========================================================================
// Metric scenarios
// ===========================================================================

#[test]
fn test_flat_ppa_at_50_resolves_irr_payback_and_npv() {
    let out = run_model(&ppa_project(dec!(50))).unwrap();
    let r = &out.result;

    assert!(r.ledger.operating_rows().all(|row| row.fcfe > Decimal::ZERO));

    let irr = r.metrics.project_irr_after_tax.value().unwrap();
    assert!(irr > Decimal::ZERO && irr < dec!(0.5), "irr = {irr}");
    assert!(r.metrics.equity_irr_after_tax.is_defined());

    let payback = r.metrics.payback_years.value().unwrap();
    assert!(payback > dec!(0.5) && payback < dec!(25.5), "payback = {payback}");

    assert!(r.metrics.project_npv_nominal.is_defined());
    assert!(r.metrics.lcoe_nominal.value().unwrap() > Decimal::ZERO);
}

#[test]
fn test_no_sign_change_gives_undefined_irr() {
    // $1/MWh never covers O&M: every period loses money
    let out = run_model(&ppa_project(dec!(1))).unwrap();
    let r = &out.result;

    assert!(r
        .ledger
        .rows()
        .iter()
        .all(|row| row.project_cash_flow_after_tax <= Decimal::ZERO));
    assert_eq!(r.metrics.project_irr_after_tax, MetricValue::Undefined);
    assert_eq!(r.metrics.project_irr_pre_tax, MetricValue::Undefined);
    assert_eq!(r.metrics.equity_irr_after_tax, MetricValue::Undefined);
    assert_eq!(r.metrics.payback_years, MetricValue::Undefined);
    assert!(out
        .warnings
        .iter()
        .any(|w| w.contains("project IRR is undefined")));
}

#[test]
fn test_real_npv_above_nominal_for_positive_flows() {
    let out = run_model(&ppa_project(dec!(50))).unwrap();
    let m = &out.result.metrics;
    // Lower real discount rate values the same positive tail more highly
    assert!(m.project_npv_real.value().unwrap() > m.project_npv_nominal.value().unwrap());
    assert!(m.lcoe_real.value().unwrap() < m.lcoe_nominal.value().unwrap());
}

#[test]
fn test_metrics_map_reports_undefined_dscr_without_debt() {
    let out = run_model(&ppa_project(dec!(50))).unwrap();
    let map = out.result.metrics.as_map();
    assert_eq!(map.len(), 20);
    assert_eq!(map["min_dscr"], MetricValue::Undefined);

    let json = serde_json::to_value(&map).unwrap();
    assert_eq!(json["min_dscr"], serde_json::json!("undefined"));
}

// ===========================================================================
// Revenue
// ===========================================================================

#[test]
fn test_merchant_tail_holds_year_ten_price() {
    let mut a = ppa_project(dec!(50));
    a.operating_years = 20;
    a.commercial = CommercialTerms::Ppa(PpaTerms {
        base_price_per_mwh: dec!(50),
        escalator: dec!(0.02),
        term_years: Some(10),
    });
    let out = run_model(&a).unwrap();
    let ledger = out.result.ledger.rows();
    let revenue = &out.result.revenue.rows;

    let year = |y: u32| -> (Decimal, Decimal, Decimal) {
        ledger
            .iter()
            .filter(|r| r.operating_year == y && !r.is_pre_cod)
            .fold((Decimal::ZERO, Decimal::ZERO, Decimal::ZERO), |acc, r| {
                let rev = revenue[r.index];
                (
                    acc.0 + rev.contract_revenue,
                    acc.1 + rev.merchant_revenue,
                    acc.2 + r.energy_kwh / dec!(1000),
                )
            })
    };

    let (contract_10, merchant_10, mwh_10) = year(10);
    let (contract_11, merchant_11, mwh_11) = year(11);
    assert!(merchant_10.is_zero());
    assert!(contract_11.is_zero());

    let price_10 = contract_10 / mwh_10;
    assert!((price_10 - dec!(50) * dec!(1.195092568622310912)).abs() < dec!(0.000001));
    assert!((merchant_11 - mwh_11 * price_10).abs() < dec!(0.01));
}

#[test]
fn test_community_solar_components_reconcile() {
    let out = run_model(&community_solar_project()).unwrap();
    let r = &out.result;
    assert_eq!(r.commercial_mode, "community_solar");

    for row in r.revenue.rows.iter().skip(6) {
        let chain = row.gross_bill_credits
            - row.unsubscribed
            - row.subscriber_discount
            - row.churn_loss
            - row.bad_debt;
        assert!((chain - row.subscription_revenue).abs() < dec!(0.0000001));
        assert_eq!(row.total, row.subscription_revenue);
    }
    assert!(out
        .defaults_applied
        .iter()
        .any(|d| d.starts_with("commercial.annual_churn")));
}

// ===========================================================================
// Debt
// ===========================================================================

fn flat_policy(amortization: Amortization) -> DebtPolicy {
    DebtPolicy {
        annual_rate: dec!(0.06),
        monthly_rate: dec!(0.005),
        tenor_months: 20,
        amortization,
        target_dscr: Some(dec!(1.30)),
        leverage_fraction: None,
        upfront_fee_fraction: Decimal::ZERO,
        dsra_months: 6,
        capitalize_idc: true,
        solver: SolverConfig::default(),
    }
}

#[test]
fn test_dscr_sizing_flat_cfads_caps_debt_service() {
    let cfads = vec![dec!(130000); 20];
    for amortization in [Amortization::Level, Amortization::Sculpted] {
        let sizing = size_debt(&flat_policy(amortization), &cfads, dec!(100000000)).unwrap();
        assert_eq!(sizing.binding, BindingConstraint::Dscr);
        assert_eq!(sizing.debt_service.len(), 20);
        assert!(sizing.debt_service.iter().all(|ds| *ds <= dec!(100000)));
    }
}

#[test]
fn test_sculpted_realized_dscr_meets_target() {
    let out = run_model(&levered_ppa(Amortization::Sculpted)).unwrap();
    let r = &out.result;
    assert_eq!(r.debt.binding_constraint, Some(BindingConstraint::Dscr));
    assert!(r.debt.principal > Decimal::ZERO);

    let covered: Vec<_> = r
        .ledger
        .operating_rows()
        .filter(|row| row.debt_service > Decimal::ZERO)
        .collect();
    assert_eq!(covered.len(), 15 * 12);
    for row in covered {
        let dscr = row.dscr.unwrap();
        assert!(dscr >= dec!(1.299), "dscr {dscr} at {}", row.index);
    }
    assert!(r.metrics.min_dscr.value().unwrap() >= dec!(1.299));
}

#[test]
fn test_sculpted_dscr_holds_with_seasonal_production() {
    let mut a = levered_ppa(Amortization::Sculpted);
    a.system.monthly_profile_kwh = Some(vec![
        dec!(350000),
        dec!(450000),
        dec!(650000),
        dec!(800000),
        dec!(950000),
        dec!(1050000),
        dec!(1050000),
        dec!(950000),
        dec!(800000),
        dec!(600000),
        dec!(400000),
        dec!(350000),
    ]);
    if let Some(debt) = a.financing.debt.as_mut() {
        debt.leverage_fraction = None;
    }
    let out = run_model(&a).unwrap();
    let r = &out.result;
    assert_eq!(r.debt.binding_constraint, Some(BindingConstraint::Dscr));

    let target = dec!(1.30);
    let mut capitalised_interest = false;
    for row in r.ledger.operating_rows().filter(|row| row.debt_service > Decimal::ZERO) {
        let dscr = row.dscr.unwrap();
        assert!(dscr >= target - dec!(0.001), "dscr {dscr} at {}", row.index);
        capitalised_interest |= row.principal < Decimal::ZERO;
    }
    // Winter service is below interest, so some months add to the balance
    assert!(capitalised_interest);
    assert!(!out.warnings.iter().any(|w| w.contains("below the")));

    let maturity = 6 + 15 * 12 - 1;
    assert_eq!(r.ledger.rows()[maturity].debt_balance, Decimal::ZERO);
}

#[test]
fn test_level_schedule_ends_at_zero_balance() {
    let out = run_model(&levered_ppa(Amortization::Level)).unwrap();
    let rows = out.result.ledger.rows();
    let maturity = 6 + 15 * 12 - 1;

    assert!(rows[maturity].debt_service > Decimal::ZERO);
    assert_eq!(rows[maturity].debt_balance, Decimal::ZERO);
    assert!(rows[maturity + 1..].iter().all(|r| r.debt_service.is_zero()));
    // Level payments: first and mid-tenor debt service match
    assert!((rows[6].debt_service - rows[6 + 90].debt_service).abs() < dec!(0.0001));
}

#[test]
fn test_draws_fund_principal_and_idc_is_capitalized() {
    let out = run_model(&levered_ppa(Amortization::Sculpted)).unwrap();
    let r = &out.result;
    let drawn = r.ledger.total(|row| row.debt_draw);
    assert_eq!(drawn, r.debt.principal);
    assert!(r.debt.interest_during_construction > Decimal::ZERO);
    // ITC basis carries the 6.3M eligible cost plus IDC
    assert_eq!(
        r.tax.itc_basis,
        dec!(6300000) + r.debt.interest_during_construction
    );
}

#[test]
fn test_dsra_funded_at_close_and_released_at_maturity() {
    let out = run_model(&levered_ppa(Amortization::Sculpted)).unwrap();
    let rows = out.result.ledger.rows();
    let close = 5;
    let forward: Decimal = rows[6..12].iter().map(|r| r.debt_service).sum();

    assert!((rows[close].dsra_funding - forward).abs() < dec!(0.0001));
    assert!(rows.iter().all(|r| r.dsra_balance >= Decimal::ZERO));
    assert!(rows.iter().all(|r| !r.deficiency_flag));
    let maturity = 6 + 15 * 12 - 1;
    assert_eq!(rows[maturity].dsra_balance, Decimal::ZERO);
    assert!(rows[maturity].dsra_release > Decimal::ZERO);
}

#[test]
fn test_non_convergence_is_an_error() {
    let mut a = levered_ppa(Amortization::Sculpted);
    if let Some(debt) = a.financing.debt.as_mut() {
        debt.solver = SolverConfig {
            max_iterations: 1,
            tolerance: dec!(0.0000000000000000000000000001),
        };
    }
    let err = run_model(&a).unwrap_err();
    assert!(matches!(err, SolarFinanceError::Convergence { iterations: 1, .. }));
}

// ===========================================================================
// Tax
// ===========================================================================

#[test]
fn test_depreciation_exhausts_basis() {
    let out = run_model(&levered_ppa(Amortization::Sculpted)).unwrap();
    let tax = &out.result.tax;
    assert!((tax.total_depreciation - tax.depreciable_basis).abs() < dec!(0.000001));
    // Half the ITC comes off the depreciable basis
    assert_eq!(
        tax.depreciable_basis,
        tax.itc_basis - tax.itc_amount * dec!(0.5)
    );
}

#[test]
fn test_nol_never_negative_and_tax_never_negative() {
    let out = run_model(&levered_ppa(Amortization::Sculpted)).unwrap();
    for row in out.result.ledger.rows() {
        assert!(row.nol_balance >= Decimal::ZERO);
        assert!(row.nol_used >= Decimal::ZERO);
        assert!(row.tax_before_credits >= Decimal::ZERO);
        if row.taxable_income > Decimal::ZERO {
            assert!(row.nol_used <= row.taxable_income);
        }
    }
}

#[test]
fn test_elective_pay_realises_itc_at_cod() {
    let out = run_model(&levered_ppa(Amortization::Sculpted)).unwrap();
    let rows = out.result.ledger.rows();
    assert_eq!(rows[6].itc_realized, out.result.tax.itc_amount);
    assert!(rows[6].fcfe > rows[6].cfads - rows[6].debt_service);
}

#[test]
fn test_offset_only_defers_itc_behind_losses() {
    let mut a = levered_ppa(Amortization::Sculpted);
    a.tax.credit_monetization = Some(CreditMonetization::OffsetOnly);
    let out = run_model(&a).unwrap();
    let rows = out.result.ledger.rows();
    // MACRS losses in year 1 leave no tax to offset
    assert_eq!(rows[6].itc_realized, Decimal::ZERO);
    assert!(out.result.tax.total_credits_realized <= out.result.tax.itc_amount);
}

#[test]
fn test_itc_and_ptc_need_explicit_combination() {
    let mut a = levered_ppa(Amortization::Sculpted);
    a.tax.ptc = Some(PtcTerms {
        rate_per_mwh: dec!(27.5),
        term_years: None,
        escalator: Decimal::ZERO,
    });
    let err = run_model(&a).unwrap_err();
    assert!(matches!(err, SolarFinanceError::Configuration { .. }));
}

// ===========================================================================
// Determinism and configuration
// ===========================================================================

#[test]
fn test_identical_inputs_identical_outputs() {
    let a = levered_ppa(Amortization::Sculpted);
    let first = run_model(&a).unwrap();
    let second = run_model(&a).unwrap();
    assert_eq!(first.result.metrics, second.result.metrics);
    assert_eq!(first.result.ledger.rows(), second.result.ledger.rows());
    assert_eq!(first.defaults_applied, second.defaults_applied);
}

#[test]
fn test_demo_inputs_deserialize_and_run() {
    for raw in [
        include_str!("../../../demos/ppa_project.json"),
        include_str!("../../../demos/community_solar.json"),
    ] {
        let a: ProjectAssumptions = serde_json::from_str(raw).unwrap();
        let out = run_model(&a).unwrap();
        assert_eq!(
            out.result.ledger.len(),
            (a.construction_months + a.operating_years * 12) as usize
        );
        assert_eq!(out.result.sources_uses.total_sources, out.result.sources_uses.total_uses);
    }
}

#[test]
fn test_zero_operating_years_rejected() {
    let mut a = ppa_project(dec!(50));
    a.operating_years = 0;
    let err = run_model(&a).unwrap_err();
    assert!(matches!(err, SolarFinanceError::Configuration { .. }));
}

#[test]
fn test_fraction_out_of_range_rejected() {
    let mut a = ppa_project(dec!(50));
    a.system.availability = Some(dec!(1.2));
    assert!(run_model(&a).is_err());
}
