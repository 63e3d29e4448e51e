pub mod amortization;
pub mod reserves;
pub mod sizing;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::{check_fraction, check_rate, Amortization, DebtTerms, SolverConfig};
use crate::error::SolarFinanceError;
use crate::timeline::TimeGrid;
use crate::types::{AuditTrail, Money, Rate};
use crate::SolarFinanceResult;

pub use amortization::{build_debt_schedule, DebtPeriod, DebtSchedule};
pub use reserves::{forward_debt_service, ReserveAccounts, ReserveMovement, ReserveTargets};
pub use sizing::{size_debt, BindingConstraint, DebtSizing};

/// Debt terms with defaults resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtPolicy {
    pub annual_rate: Rate,
    /// annual_rate / 12
    pub monthly_rate: Rate,
    pub tenor_months: u32,
    pub amortization: Amortization,
    pub target_dscr: Option<Decimal>,
    pub leverage_fraction: Option<Rate>,
    pub upfront_fee_fraction: Rate,
    pub dsra_months: u32,
    pub capitalize_idc: bool,
    pub solver: SolverConfig,
}

impl DebtPolicy {
    pub fn resolve(
        terms: &DebtTerms,
        grid: &TimeGrid,
        audit: &mut AuditTrail,
    ) -> SolarFinanceResult<Self> {
        check_rate("financing.debt.interest_rate", terms.interest_rate)?;
        if terms.interest_rate < Decimal::ZERO {
            return Err(SolarFinanceError::config(
                "financing.debt.interest_rate",
                "interest rate cannot be negative",
            ));
        }
        if terms.tenor_years == 0 || terms.tenor_years > grid.operating_years {
            return Err(SolarFinanceError::config(
                "financing.debt.tenor_years",
                format!(
                    "tenor must be between 1 and the {} operating years",
                    grid.operating_years
                ),
            ));
        }
        if let Some(target) = terms.target_dscr {
            if target <= Decimal::ZERO {
                return Err(SolarFinanceError::config(
                    "financing.debt.target_dscr",
                    "target DSCR must be positive",
                ));
            }
        }
        if let Some(leverage) = terms.leverage_fraction {
            check_fraction("financing.debt.leverage_fraction", leverage)?;
        }
        if terms.target_dscr.is_none() && terms.leverage_fraction.is_none() {
            return Err(SolarFinanceError::config(
                "financing.debt",
                "either target_dscr or leverage_fraction is required",
            ));
        }
        if terms.solver.max_iterations == 0 || terms.solver.tolerance <= Decimal::ZERO {
            return Err(SolarFinanceError::config(
                "financing.debt.solver",
                "max_iterations and tolerance must be positive",
            ));
        }

        let upfront_fee_fraction = audit.resolve(
            "financing.debt.upfront_fee_fraction",
            terms.upfront_fee_fraction,
            dec!(0.02),
        );
        check_fraction("financing.debt.upfront_fee_fraction", upfront_fee_fraction)?;

        Ok(DebtPolicy {
            annual_rate: terms.interest_rate,
            monthly_rate: terms.interest_rate / dec!(12),
            tenor_months: terms.tenor_years * 12,
            amortization: audit.resolve(
                "financing.debt.amortization",
                terms.amortization,
                Amortization::Sculpted,
            ),
            target_dscr: terms.target_dscr,
            leverage_fraction: terms.leverage_fraction,
            upfront_fee_fraction,
            dsra_months: audit.resolve("financing.debt.dsra_months", terms.dsra_months, 6),
            capitalize_idc: audit.resolve(
                "financing.debt.capitalize_idc",
                terms.capitalize_idc,
                true,
            ),
            solver: terms.solver,
        })
    }
}

/// Result of the sizing fixed point.
#[derive(Debug, Clone)]
pub struct SolvedDebt<T> {
    pub schedule: DebtSchedule,
    pub sizing: DebtSizing,
    /// Whatever the evaluation produced for the final schedule
    pub evaluation: T,
    pub cfads: Vec<Money>,
    pub iterations: u32,
}

/// Size debt against CFADS that itself depends on the debt.
///
/// `evaluate` turns a candidate schedule into CFADS (through interest,
/// capitalised IDC, depreciation and tax). Each pass re-sizes on the latest
/// CFADS; the loop stops once the relative change in principal is within
/// tolerance, or fails after `max_iterations`.
pub fn solve_debt<T, F>(
    grid: &TimeGrid,
    policy: &DebtPolicy,
    construction_spend: &[Money],
    cost_before_financing: Money,
    mut evaluate: F,
) -> SolarFinanceResult<SolvedDebt<T>>
where
    F: FnMut(&DebtSchedule) -> SolarFinanceResult<(Vec<Money>, T)>,
{
    let tenor = policy.tenor_months as usize;
    let window = grid.cod_index..grid.cod_index + tenor;

    let (mut cfads, _) = evaluate(&DebtSchedule::none(grid))?;
    let mut sizing = size_debt(policy, &cfads[window.clone()], cost_before_financing)?;
    let mut last_delta = Decimal::ZERO;

    for iteration in 1..=policy.solver.max_iterations {
        let schedule = build_debt_schedule(grid, policy, &sizing, construction_spend);
        let (next_cfads, evaluation) = evaluate(&schedule)?;
        let next = size_debt(policy, &next_cfads[window.clone()], cost_before_financing)?;

        let scale = sizing.principal.abs().max(Decimal::ONE);
        last_delta = (next.principal - sizing.principal).abs() / scale;
        log::debug!(
            "debt sizing iteration {iteration}: principal {} -> {} (delta {last_delta})",
            sizing.principal.round_dp(2),
            next.principal.round_dp(2)
        );

        if last_delta <= policy.solver.tolerance {
            return Ok(SolvedDebt {
                schedule,
                sizing,
                evaluation,
                cfads: next_cfads,
                iterations: iteration,
            });
        }
        cfads = next_cfads;
        sizing = next;
    }

    log::debug!("debt sizing stopped with last CFADS total {}", cfads.iter().copied().sum::<Money>());
    Err(SolarFinanceError::Convergence {
        function: "debt sizing".into(),
        iterations: policy.solver.max_iterations,
        last_delta,
    })
}

/// Financing figures reported with the model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtSummary {
    pub principal: Money,
    pub binding_constraint: Option<BindingConstraint>,
    pub dscr_principal: Option<Money>,
    pub leverage_principal: Option<Money>,
    pub amortization: Option<Amortization>,
    pub annual_interest_rate: Rate,
    pub tenor_years: u32,
    pub interest_during_construction: Money,
    pub upfront_fee: Money,
    pub total_interest: Money,
    pub sizing_iterations: u32,
}

impl DebtSummary {
    pub fn unlevered() -> Self {
        DebtSummary {
            principal: Decimal::ZERO,
            binding_constraint: None,
            dscr_principal: None,
            leverage_principal: None,
            amortization: None,
            annual_interest_rate: Decimal::ZERO,
            tenor_years: 0,
            interest_during_construction: Decimal::ZERO,
            upfront_fee: Decimal::ZERO,
            total_interest: Decimal::ZERO,
            sizing_iterations: 0,
        }
    }

    pub fn from_solution<T>(policy: &DebtPolicy, solved: &SolvedDebt<T>) -> Self {
        DebtSummary {
            principal: solved.schedule.principal,
            binding_constraint: solved.schedule.binding,
            dscr_principal: solved.sizing.dscr_principal,
            leverage_principal: solved.sizing.leverage_principal,
            amortization: Some(policy.amortization),
            annual_interest_rate: policy.annual_rate,
            tenor_years: policy.tenor_months / 12,
            interest_during_construction: solved.schedule.total_idc(),
            upfront_fee: solved.schedule.upfront_fee,
            total_interest: solved.schedule.rows.iter().map(|r| r.interest).sum(),
            sizing_iterations: solved.iterations,
        }
    }
}
