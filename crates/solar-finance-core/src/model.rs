use std::time::Instant;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::{check_non_negative, check_rate, ProjectAssumptions};
use crate::costs::{build_capex_schedule, build_opex_schedule, CapexSummary};
use crate::debt::{solve_debt, DebtPolicy, DebtSchedule, DebtSummary};
use crate::energy::build_energy_series;
use crate::error::SolarFinanceError;
use crate::metrics::{compute_metrics, Metrics};
use crate::revenue::{build_revenue_ledger, RevenueLedger};
use crate::tax::{
    build_credit_plan, build_depreciation_plan, resolve_schedule, run_tax, BasisInputs,
    CreditPlan, DepreciationPlan, TaxLedger, TaxPolicy, TaxSummary,
};
use crate::timeline::{build_time_grid, TimeGrid};
use crate::types::{with_metadata, AuditTrail, ComputationOutput, Money};
use crate::waterfall::{assemble_ledger, CashflowLedger, WaterfallInputs};
use crate::SolarFinanceResult;

const METHODOLOGY: &str = "Solar project finance: monthly energy, revenue, tax and debt waterfall";
const DSCR_WARNING_TOLERANCE: Decimal = dec!(0.001);

/// Construction-period funding, read off the pre-COD ledger rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesAndUses {
    pub construction_capex: Money,
    pub interest_during_construction: Money,
    pub financing_fees: Money,
    pub dsra_funding: Money,
    pub om_reserve_funding: Money,
    pub total_uses: Money,
    pub debt: Money,
    pub construction_grants: Money,
    pub equity: Money,
    pub total_sources: Money,
}

impl SourcesAndUses {
    fn from_ledger(ledger: &CashflowLedger) -> Self {
        let mut s = SourcesAndUses {
            construction_capex: Decimal::ZERO,
            interest_during_construction: Decimal::ZERO,
            financing_fees: Decimal::ZERO,
            dsra_funding: Decimal::ZERO,
            om_reserve_funding: Decimal::ZERO,
            total_uses: Decimal::ZERO,
            debt: Decimal::ZERO,
            construction_grants: Decimal::ZERO,
            equity: Decimal::ZERO,
            total_sources: Decimal::ZERO,
        };
        for r in ledger.rows().iter().filter(|r| r.is_pre_cod) {
            s.construction_capex += r.capex;
            s.interest_during_construction += r.idc;
            s.financing_fees += r.financing_fees;
            s.dsra_funding += r.dsra_funding;
            s.om_reserve_funding += r.om_reserve_funding;
            s.debt += r.debt_draw;
            s.construction_grants += r.grant;
        }
        s.total_uses = s.construction_capex
            + s.interest_during_construction
            + s.financing_fees
            + s.dsra_funding
            + s.om_reserve_funding;
        s.equity = s.total_uses - s.debt - s.construction_grants;
        s.total_sources = s.debt + s.construction_grants + s.equity;
        s
    }
}

/// Everything a run produces besides the audit envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolarModelOutput {
    pub project_name: String,
    pub commercial_mode: String,
    pub metrics: Metrics,
    pub ledger: CashflowLedger,
    pub revenue: RevenueLedger,
    pub capex: CapexSummary,
    pub sources_uses: SourcesAndUses,
    pub debt: DebtSummary,
    pub tax: TaxSummary,
}

/// Tax-side results for one candidate debt schedule.
#[derive(Debug, Clone)]
struct TaxEvaluation {
    credits: CreditPlan,
    depreciation: DepreciationPlan,
    ledger: TaxLedger,
}

/// Run the full model for one set of assumptions.
///
/// Pipeline: grid, energy, revenue, CapEx and OpEx, an unlevered tax run,
/// then the debt fixed point (tax and CFADS re-evaluated for each candidate
/// schedule), the waterfall and the metrics. Warnings and every default
/// applied come back in the envelope.
pub fn run_model(
    assumptions: &ProjectAssumptions,
) -> SolarFinanceResult<ComputationOutput<SolarModelOutput>> {
    let start = Instant::now();
    let mut audit = AuditTrail::default();

    check_rate("discount_rate", assumptions.discount_rate)?;
    let inflation_rate = audit.resolve("inflation_rate", assumptions.inflation_rate, dec!(0.025));
    check_rate("inflation_rate", inflation_rate)?;

    // ── Physical and commercial schedules ──
    let grid = build_time_grid(
        assumptions.cod_date,
        assumptions.construction_months,
        assumptions.operating_years,
    )?;
    let energy = build_energy_series(&grid, &assumptions.system, &mut audit)?;
    let revenue = build_revenue_ledger(&grid, &energy, assumptions, &mut audit)?;
    let capex = build_capex_schedule(&grid, &assumptions.capex, &mut audit)?;
    let opex = build_opex_schedule(
        &grid,
        &energy,
        assumptions,
        revenue.subscribers.as_deref(),
        &mut audit,
    )?;
    let ebitda: Vec<Money> = grid
        .periods
        .iter()
        .map(|p| revenue.ledger.total(p.index) - opex.total(p.index))
        .collect();

    // ── Tax setup ──
    let tax_policy = TaxPolicy::resolve(&assumptions.tax, &mut audit)?;
    let schedule = resolve_schedule(&assumptions.tax, &mut audit);
    let grant_reduction = revenue
        .grant
        .as_ref()
        .filter(|g| g.reduces_itc_basis)
        .map(|g| g.amount)
        .unwrap_or(Decimal::ZERO);
    let base_basis = BasisInputs {
        itc_eligible_cost: capex.summary.itc_eligible_cost,
        depreciable_cost: capex.summary.depreciable_cost,
        capitalized_idc: Decimal::ZERO,
        grant_reduction,
    };

    let evaluate_tax = |basis: BasisInputs,
                        interest: &[Money],
                        audit: &mut AuditTrail|
     -> SolarFinanceResult<TaxEvaluation> {
        let credits = build_credit_plan(&grid, &energy, &assumptions.tax, basis, audit)?;
        let depreciation = build_depreciation_plan(
            &grid,
            credits.depreciable_basis,
            &schedule,
            assumptions.tax.bonus_depreciation,
        )?;
        let ledger = run_tax(
            &grid,
            &ebitda,
            &depreciation.monthly,
            interest,
            &credits,
            &tax_policy,
        );
        Ok(TaxEvaluation {
            credits,
            depreciation,
            ledger,
        })
    };

    let no_interest = vec![Decimal::ZERO; grid.len()];
    let unlevered = evaluate_tax(base_basis, no_interest.as_slice(), &mut audit)?;

    // ── Debt fixed point ──
    let (debt_schedule, levered, debt_summary, dsra_months) = match &assumptions.financing.debt {
        Some(terms) => {
            let policy = DebtPolicy::resolve(terms, &grid, &mut audit)?;
            let solved = solve_debt(
                &grid,
                &policy,
                &capex.total,
                capex.summary.total_before_financing,
                |candidate: &DebtSchedule| {
                    let capitalized_idc = if policy.capitalize_idc {
                        candidate.total_idc()
                    } else {
                        Decimal::ZERO
                    };
                    let basis = BasisInputs {
                        capitalized_idc,
                        ..base_basis
                    };
                    // Defaults were recorded by the unlevered pass
                    let evaluation =
                        evaluate_tax(basis, candidate.interest().as_slice(), &mut AuditTrail::default())?;
                    let cfads = cfads_series(&grid, &ebitda, &evaluation.ledger);
                    Ok((cfads, evaluation))
                },
            )?;
            log::debug!(
                "debt sized at {} after {} iterations ({:?} binding)",
                solved.schedule.principal.round_dp(2),
                solved.iterations,
                solved.sizing.binding
            );
            let summary = DebtSummary::from_solution(&policy, &solved);
            check_realized_dscr(&policy, &solved.schedule, &solved.cfads, &mut audit);
            (solved.schedule, solved.evaluation, summary, policy.dsra_months)
        }
        None => (
            DebtSchedule::none(&grid),
            unlevered.clone(),
            DebtSummary::unlevered(),
            0,
        ),
    };

    // ── Reserves and exit ──
    let om_reserve_months = audit.resolve(
        "financing.om_reserve_months",
        assumptions.financing.om_reserve_months,
        if debt_schedule.has_debt() { 6 } else { 0 },
    );
    let om_reserve_target = opex.first_year_monthly_average(&grid) * Decimal::from(om_reserve_months);
    let terminal_value = terminal_value(assumptions, &ebitda)?;

    let ledger = assemble_ledger(&WaterfallInputs {
        grid: &grid,
        energy: &energy,
        revenue: &revenue.ledger,
        opex: &opex,
        capex: &capex,
        debt: &debt_schedule,
        tax: &levered.ledger,
        unlevered_tax: &unlevered.ledger,
        grant: revenue.grant.as_ref(),
        dsra_months,
        om_reserve_target,
        terminal_value,
    });

    let deficient = ledger.rows().iter().filter(|r| r.deficiency_flag).count();
    if deficient > 0 {
        audit.warn(format!(
            "{deficient} period(s) with debt service not covered by CFADS and reserves"
        ));
    }

    let metrics = compute_metrics(&ledger, assumptions.discount_rate, inflation_rate)?;
    if !metrics.project_irr_after_tax.is_defined() {
        audit.warn("project IRR is undefined for this cash-flow series");
    }
    if !metrics.equity_irr_after_tax.is_defined() {
        audit.warn("equity IRR is undefined for this cash-flow series");
    }

    let tax_summary = TaxSummary::from_run(&tax_policy, &schedule, &levered.credits, &levered.ledger);
    log::debug!(
        "depreciation basis {} over {} years",
        levered.depreciation.depreciable_basis.round_dp(2),
        levered.depreciation.annual.len()
    );

    let output = SolarModelOutput {
        project_name: assumptions.project_name.clone(),
        commercial_mode: assumptions.commercial.label().to_string(),
        metrics,
        sources_uses: SourcesAndUses::from_ledger(&ledger),
        ledger,
        revenue: revenue.ledger,
        capex: capex.summary,
        debt: debt_summary,
        tax: tax_summary,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    log::info!(
        "model '{}' ran {} periods in {elapsed}us ({} warnings)",
        assumptions.project_name,
        grid.len(),
        audit.warnings.len()
    );
    Ok(with_metadata(METHODOLOGY, assumptions, audit, elapsed, output))
}

/// CFADS = EBITDA - tax before credits + PTC realised, zero before COD.
fn cfads_series(grid: &TimeGrid, ebitda: &[Money], tax: &TaxLedger) -> Vec<Money> {
    grid.periods
        .iter()
        .map(|p| {
            if p.is_pre_cod {
                return Decimal::ZERO;
            }
            let t = &tax.rows[p.index];
            ebitda[p.index] - t.tax_before_credits + t.ptc_realized
        })
        .collect()
}

fn check_realized_dscr(
    policy: &DebtPolicy,
    schedule: &DebtSchedule,
    cfads: &[Money],
    audit: &mut AuditTrail,
) {
    let Some(target) = policy.target_dscr else {
        return;
    };
    let realized_min = schedule
        .rows
        .iter()
        .zip(cfads)
        .filter(|(r, _)| r.debt_service > Decimal::ZERO)
        .map(|(r, c)| *c / r.debt_service)
        .min();
    if let Some(min) = realized_min {
        if min < target - DSCR_WARNING_TOLERANCE {
            audit.warn(format!(
                "minimum realised DSCR {} is below the {target} target",
                min.round_dp(3)
            ));
        }
    }
}

/// Trailing twelve-month EBITDA times the exit multiple, or zero.
fn terminal_value(assumptions: &ProjectAssumptions, ebitda: &[Money]) -> SolarFinanceResult<Money> {
    let Some(exit) = &assumptions.exit else {
        return Ok(Decimal::ZERO);
    };
    check_non_negative("exit.terminal_ebitda_multiple", exit.terminal_ebitda_multiple)?;
    let trailing: Money = ebitda.iter().rev().take(12).copied().sum();
    if trailing < Decimal::ZERO {
        return Err(SolarFinanceError::Domain(format!(
            "trailing EBITDA {trailing} is negative; no terminal value can be taken"
        )));
    }
    Ok(trailing * exit.terminal_ebitda_multiple)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::*;
    use chrono::NaiveDate;

    fn ppa_project() -> ProjectAssumptions {
        ProjectAssumptions {
            project_name: "Unit PPA".into(),
            commercial: CommercialTerms::Ppa(PpaTerms {
                base_price_per_mwh: dec!(60),
                escalator: dec!(0.02),
                term_years: Some(10),
            }),
            cod_date: NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
            construction_months: 6,
            operating_years: 15,
            discount_rate: dec!(0.08),
            inflation_rate: None,
            system: SystemAssumptions {
                dc_kw: dec!(6500),
                ac_kw: dec!(5000),
                capacity_factor: dec!(0.22),
                performance_ratio: None,
                degradation_rate: None,
                availability: None,
                curtailment: None,
                monthly_profile_kwh: None,
            },
            ancillary: AncillaryRevenue::default(),
            program: None,
            tax: TaxAssumptions::default(),
            capex: CapexAssumptions {
                line_items: vec![CapexLineItem {
                    label: "EPC".into(),
                    amount: dec!(7000000),
                    itc_eligible: true,
                    depreciable: true,
                }],
                contingency_fraction: None,
                developer_fee: DeveloperFee::None,
                developer_fee_timing: DeveloperFeeTiming::Cod,
                decommissioning_reserve: Decimal::ZERO,
                draw_schedule: None,
            },
            opex: OpexAssumptions {
                fixed_om_per_kw_year: dec!(18),
                ..Default::default()
            },
            financing: FinancingAssumptions::default(),
            exit: None,
        }
    }

    #[test]
    fn test_unlevered_run_has_no_debt_rows() {
        let out = run_model(&ppa_project()).unwrap();
        let r = &out.result;
        assert_eq!(r.ledger.len(), 6 + 15 * 12);
        assert!(r.ledger.rows().iter().all(|row| row.debt_service.is_zero()));
        assert_eq!(r.metrics.min_dscr, crate::types::MetricValue::Undefined);
        assert_eq!(r.sources_uses.debt, Decimal::ZERO);
        assert!(out
            .defaults_applied
            .contains(&"financing.om_reserve_months = 0".to_string()));
    }

    #[test]
    fn test_sources_equal_uses() {
        let mut a = ppa_project();
        a.financing.debt = Some(DebtTerms {
            interest_rate: dec!(0.065),
            tenor_years: 10,
            amortization: Some(Amortization::Level),
            target_dscr: Some(dec!(1.35)),
            leverage_fraction: Some(dec!(0.6)),
            upfront_fee_fraction: None,
            dsra_months: None,
            capitalize_idc: None,
            solver: SolverConfig::default(),
        });
        let out = run_model(&a).unwrap();
        let su = &out.result.sources_uses;
        assert_eq!(su.total_sources, su.total_uses);
        assert!(su.debt > Decimal::ZERO);
        assert!(su.dsra_funding > Decimal::ZERO);
        let pre_cod_fcfe: Money = out
            .result
            .ledger
            .rows()
            .iter()
            .filter(|r| r.is_pre_cod)
            .map(|r| r.fcfe)
            .sum();
        assert_eq!(su.equity, -pre_cod_fcfe);
    }

    #[test]
    fn test_terminal_value_lands_in_last_period() {
        let mut a = ppa_project();
        a.exit = Some(ExitAssumptions {
            terminal_ebitda_multiple: dec!(5),
        });
        let out = run_model(&a).unwrap();
        let rows = out.result.ledger.rows();
        let last = rows.last().unwrap();
        let trailing: Money = rows.iter().rev().take(12).map(|r| r.ebitda).sum();
        assert_eq!(last.terminal_value, trailing * dec!(5));
        assert!(rows[..rows.len() - 1].iter().all(|r| r.terminal_value.is_zero()));
    }

    #[test]
    fn test_negative_discount_rate_below_minus_one_rejected() {
        let mut a = ppa_project();
        a.discount_rate = dec!(-1.5);
        let err = run_model(&a).unwrap_err();
        assert!(matches!(err, SolarFinanceError::Configuration { .. }));
    }
}
