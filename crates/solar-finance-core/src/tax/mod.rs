pub mod credits;
pub mod depreciation;
pub mod liability;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::{check_fraction, CreditMonetization, DepreciationSchedule, TaxAssumptions};
use crate::types::{AuditTrail, Money, Rate};
use crate::SolarFinanceResult;

pub use credits::{build_credit_plan, BasisInputs, CreditPlan};
pub use depreciation::{build_depreciation_plan, DepreciationPlan};
pub use liability::{run_tax, NolVintage, TaxLedger, TaxPeriodResult, TaxState};

/// Resolved tax settings for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxPolicy {
    pub federal_rate: Rate,
    pub state_rate: Rate,
    /// federal + state × (1 − federal)
    pub combined_rate: Rate,
    pub monetization: CreditMonetization,
    pub nol_carryforward_years: Option<u32>,
    pub nol_utilization_limit: Rate,
}

impl TaxPolicy {
    pub fn resolve(tax: &TaxAssumptions, audit: &mut AuditTrail) -> SolarFinanceResult<Self> {
        let federal_rate = audit.resolve("tax.federal_rate", tax.federal_rate, dec!(0.21));
        let state_rate = audit.resolve("tax.state_rate", tax.state_rate, Decimal::ZERO);
        check_fraction("tax.federal_rate", federal_rate)?;
        check_fraction("tax.state_rate", state_rate)?;
        check_fraction("tax.bonus_depreciation", tax.bonus_depreciation)?;

        let monetization = audit.resolve(
            "tax.credit_monetization",
            tax.credit_monetization,
            CreditMonetization::ElectivePay,
        );
        let nol_utilization_limit = tax.nol.utilization_limit.unwrap_or(Decimal::ONE);
        check_fraction("tax.nol.utilization_limit", nol_utilization_limit)?;

        Ok(TaxPolicy {
            federal_rate,
            state_rate,
            combined_rate: federal_rate + state_rate * (Decimal::ONE - federal_rate),
            monetization,
            nol_carryforward_years: tax.nol.carryforward_years,
            nol_utilization_limit,
        })
    }
}

/// Resolve the depreciation table, recording the default when none is given.
pub fn resolve_schedule(tax: &TaxAssumptions, audit: &mut AuditTrail) -> DepreciationSchedule {
    match &tax.depreciation {
        Some(s) => s.clone(),
        None => {
            audit.default_applied("tax.depreciation", DepreciationSchedule::Macrs5);
            DepreciationSchedule::Macrs5
        }
    }
}

/// Lifetime tax figures reported with the model output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxSummary {
    pub combined_rate: Rate,
    pub depreciation_schedule: String,
    pub itc_basis: Money,
    pub itc_amount: Money,
    pub depreciable_basis: Money,
    pub total_depreciation: Money,
    pub ptc_total: Money,
    pub total_tax_before_credits: Money,
    pub total_credits_realized: Money,
    pub ending_nol_balance: Money,
    pub ending_credit_carryforward: Money,
}

impl TaxSummary {
    pub fn from_run(
        policy: &TaxPolicy,
        schedule: &DepreciationSchedule,
        credits: &CreditPlan,
        ledger: &TaxLedger,
    ) -> Self {
        TaxSummary {
            combined_rate: policy.combined_rate,
            depreciation_schedule: schedule.to_string(),
            itc_basis: credits.itc_basis,
            itc_amount: credits.itc_amount,
            depreciable_basis: credits.depreciable_basis,
            total_depreciation: ledger.final_state.cumulative_depreciation,
            ptc_total: credits.ptc_total(),
            total_tax_before_credits: ledger.rows.iter().map(|r| r.tax_before_credits).sum(),
            total_credits_realized: ledger.rows.iter().map(|r| r.credits_realized()).sum(),
            ending_nol_balance: ledger.final_state.nol_balance(),
            ending_credit_carryforward: ledger.final_state.credit_carryforward(),
        }
    }
}
