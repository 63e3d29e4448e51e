use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::SolarFinanceError;
use crate::types::{Energy, Money, Rate};
use crate::SolarFinanceResult;

// ---------------------------------------------------------------------------
// Top-level bundle
// ---------------------------------------------------------------------------

/// Immutable input bundle for one model run.
///
/// Owned by the caller and read-only to the engine. Optional fields carry
/// documented defaults; every default the engine falls back on is recorded in
/// the run's audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectAssumptions {
    /// Project name / identifier
    pub project_name: String,
    /// Commercial structure and its revenue parameters
    pub commercial: CommercialTerms,
    /// Commercial Operation Date. The period grid is anchored on its month.
    pub cod_date: NaiveDate,
    /// Months between Notice to Proceed and COD
    pub construction_months: u32,
    /// Operating life modelled after COD
    pub operating_years: u32,
    /// Nominal annual discount rate for NPV and LCOE
    pub discount_rate: Rate,
    /// Annual inflation used for real NPV / LCOE (default 2.5%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inflation_rate: Option<Rate>,
    /// Plant sizing and derates
    pub system: SystemAssumptions,
    /// REC and capacity revenue available under either commercial mode
    #[serde(default)]
    pub ancillary: AncillaryRevenue,
    /// State incentive program table, supplied as plain data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<IncentiveProgram>,
    #[serde(default)]
    pub tax: TaxAssumptions,
    pub capex: CapexAssumptions,
    #[serde(default)]
    pub opex: OpexAssumptions,
    #[serde(default)]
    pub financing: FinancingAssumptions,
    /// Optional terminal value at the end of the horizon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<ExitAssumptions>,
}

/// Commercial structure. Exactly one is active per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommercialTerms {
    /// Community distributed generation: subscribers buy discounted bill credits
    CommunitySolar(CommunitySolarTerms),
    /// Power purchase agreement with escalation and a merchant tail
    Ppa(PpaTerms),
}

impl CommercialTerms {
    pub fn label(&self) -> &'static str {
        match self {
            CommercialTerms::CommunitySolar(_) => "community_solar",
            CommercialTerms::Ppa(_) => "ppa",
        }
    }
}

// ---------------------------------------------------------------------------
// System / energy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemAssumptions {
    /// DC nameplate in kW (used for $/W-DC grants)
    pub dc_kw: Decimal,
    /// AC nameplate in kW (energy, $/kW charges)
    pub ac_kw: Decimal,
    /// Net AC capacity factor (e.g. 0.20)
    pub capacity_factor: Rate,
    /// Additional performance ratio applied on top of the capacity factor (default 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_ratio: Option<Rate>,
    /// Annual compounding degradation (default 0.5%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degradation_rate: Option<Rate>,
    /// Plant availability (default 98%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<Rate>,
    /// Grid curtailment (default 0%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curtailment: Option<Rate>,
    /// Typical-year production by calendar month (Jan..Dec, kWh). Replaces
    /// the capacity-factor estimate when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monthly_profile_kwh: Option<Vec<Energy>>,
}

// ---------------------------------------------------------------------------
// Revenue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunitySolarTerms {
    /// Utility bill credit value in $/kWh for operating year 1
    pub bill_credit_rate_per_kwh: Money,
    /// Annual escalation of the bill credit rate
    #[serde(default)]
    pub bill_credit_escalator: Rate,
    /// Explicit bill credit rate by operating year; the last value is held
    /// once the schedule runs out. Overrides rate + escalator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bill_credit_schedule: Option<Vec<Money>>,
    /// Discount offered to subscribers on their credits (default 10%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber_discount: Option<Rate>,
    /// Steady-state subscribed share of output (default 95%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_subscription: Option<Rate>,
    /// Months from COD to reach the target subscription (default 12)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ramp_months: Option<u32>,
    /// Annual subscriber churn (default 6%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annual_churn: Option<Rate>,
    /// Share of billings never collected (default 1.5%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bad_debt_rate: Option<Rate>,
    /// Subscriber accounts at full subscription (default 100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscriber_accounts: Option<u32>,
    /// Subscription management fee per active account per month (default $2.50)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_fee_per_account_month: Option<Money>,
    /// One-off cost to acquire a subscriber (default $0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acquisition_cost_per_subscriber: Option<Money>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PpaTerms {
    /// Contract price in $/MWh for operating year 1
    pub base_price_per_mwh: Money,
    /// Annual contract price escalator
    #[serde(default)]
    pub escalator: Rate,
    /// Contract term in years (default 20)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_years: Option<u32>,
}

/// Revenue streams that sit alongside either commercial mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AncillaryRevenue {
    /// Renewable energy certificate price, $/MWh
    #[serde(default)]
    pub rec_price_per_mwh: Money,
    #[serde(default)]
    pub rec_escalator: Rate,
    /// Years of REC sales; unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rec_term_years: Option<u32>,
    /// Capacity payment, $/kW-AC-year
    #[serde(default)]
    pub capacity_price_per_kw_year: Money,
    /// Years of capacity payments; unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_term_years: Option<u32>,
}

/// A state incentive program expressed as data: revenue adders by operating
/// year plus an optional upfront grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncentiveProgram {
    pub name: String,
    #[serde(default)]
    pub adders: Vec<ProgramAdder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upfront_grant: Option<UpfrontGrant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramAdder {
    pub label: String,
    pub basis: AdderBasis,
    /// Rate by operating year (index 0 = year 1)
    pub rates_by_year: Vec<Money>,
    /// Keep paying the last rate after the table ends instead of stopping
    #[serde(default)]
    pub hold_last_rate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdderBasis {
    /// $ per kWh generated
    PerKwh,
    /// Flat $ per operating month
    PerMonth,
    /// $ per kW-AC per year, paid monthly
    PerKwAcYear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpfrontGrant {
    pub amount: GrantAmount,
    #[serde(default)]
    pub timing: GrantTiming,
    /// Exclude the grant from the ITC basis
    #[serde(default)]
    pub reduces_itc_basis: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum GrantAmount {
    Fixed(Money),
    PerWattDc(Money),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantTiming {
    Ntp,
    #[default]
    Cod,
}

// ---------------------------------------------------------------------------
// Tax
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxAssumptions {
    /// Federal income tax rate (default 21%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federal_rate: Option<Rate>,
    /// State income tax rate, deductible federally (default 0%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_rate: Option<Rate>,
    /// Tax depreciation table (default MACRS 5-year)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depreciation: Option<DepreciationSchedule>,
    /// Fraction of basis expensed in operating year 1
    #[serde(default)]
    pub bonus_depreciation: Rate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itc: Option<ItcTerms>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ptc: Option<PtcTerms>,
    /// Permit ITC and PTC on the same project
    #[serde(default)]
    pub allow_combined_credits: bool,
    /// How credits turn into cash (default elective pay)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_monetization: Option<CreditMonetization>,
    #[serde(default)]
    pub nol: NolPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DepreciationSchedule {
    Macrs5,
    Macrs7,
    StraightLine(u32),
    /// Annual percentages of basis; must sum to 1
    Custom(Vec<Rate>),
}

impl std::fmt::Display for DepreciationSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepreciationSchedule::Macrs5 => write!(f, "MACRS 5-year"),
            DepreciationSchedule::Macrs7 => write!(f, "MACRS 7-year"),
            DepreciationSchedule::StraightLine(y) => write!(f, "straight-line {y}-year"),
            DepreciationSchedule::Custom(t) => write!(f, "custom {}-year", t.len()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItcTerms {
    /// Base credit rate (e.g. 0.30)
    pub rate: Rate,
    /// Bonus adders (energy community, domestic content, ...)
    #[serde(default)]
    pub adders: Rate,
    /// Share of the credit removed from depreciable basis (default 50%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basis_reduction_fraction: Option<Rate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PtcTerms {
    /// Credit in $/MWh for operating year 1
    pub rate_per_mwh: Money,
    /// Years of eligibility (default 10)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub term_years: Option<u32>,
    /// Annual inflation adjustment of the credit rate
    #[serde(default)]
    pub escalator: Rate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditMonetization {
    /// Credits paid out in full in the period claimed (direct pay / transfer)
    ElectivePay,
    /// Credits only offset tax; the excess is carried forward
    OffsetOnly,
}

impl std::fmt::Display for CreditMonetization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreditMonetization::ElectivePay => write!(f, "elective pay"),
            CreditMonetization::OffsetOnly => write!(f, "offset only"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NolPolicy {
    /// Years a loss can be carried forward; unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carryforward_years: Option<u32>,
    /// Maximum share of taxable income a carried loss may offset; 100% when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utilization_limit: Option<Rate>,
}

// ---------------------------------------------------------------------------
// Costs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapexAssumptions {
    /// EPC and owner cost line items
    pub line_items: Vec<CapexLineItem>,
    /// Contingency as a fraction of the line items (default 5%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contingency_fraction: Option<Rate>,
    #[serde(default)]
    pub developer_fee: DeveloperFee,
    #[serde(default)]
    pub developer_fee_timing: DeveloperFeeTiming,
    /// Decommissioning reserve funded at COD (not depreciable)
    #[serde(default)]
    pub decommissioning_reserve: Money,
    /// How construction spend is spread over pre-COD months (default milestones)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_schedule: Option<DrawSchedule>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapexLineItem {
    pub label: String,
    pub amount: Money,
    #[serde(default = "default_true")]
    pub itc_eligible: bool,
    #[serde(default = "default_true")]
    pub depreciable: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum DeveloperFee {
    #[default]
    None,
    /// Fraction of EPC cost (line items plus contingency)
    PercentOfEpc(Rate),
    Fixed(Money),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeveloperFeeTiming {
    Ntp,
    #[default]
    Cod,
    OverConstruction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DrawSchedule {
    /// Equal spend in every construction month
    Even,
    /// Weighted milestones placed by construction progress
    Milestones(Vec<Milestone>),
    /// Explicit weight per construction month
    Custom(Vec<Rate>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub label: String,
    /// Position within construction, 0 = NTP month, 1 = last month before COD
    pub progress: Rate,
    pub weight: Rate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpexAssumptions {
    #[serde(default)]
    pub fixed_om_per_kw_year: Money,
    #[serde(default)]
    pub variable_om_per_mwh: Money,
    #[serde(default)]
    pub insurance_per_kw_year: Money,
    #[serde(default)]
    pub asset_management_per_kw_year: Money,
    #[serde(default)]
    pub other_per_year: Money,
    /// Annual escalation of O&M, insurance, asset management and other costs (default 2%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalator: Option<Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub land: Option<LandCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_tax: Option<PropertyTax>,
    #[serde(default)]
    pub inverter_replacements: Vec<ScheduledReplacement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LandCost {
    Lease {
        acres: Decimal,
        rent_per_acre_year: Money,
        #[serde(default)]
        escalator: Rate,
    },
    /// Land bought upfront; carried as a non-depreciable CapEx line item
    Purchase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PropertyTax {
    /// Payment-in-lieu-of-taxes by operating year; the last value is held
    Pilot { schedule_per_year: Vec<Money> },
    Assessed {
        assessed_value: Money,
        /// Tax per dollar of assessed value (0.02 = 20 mills)
        mill_rate: Rate,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledReplacement {
    pub operating_year: u32,
    pub amount: Money,
}

// ---------------------------------------------------------------------------
// Financing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinancingAssumptions {
    /// Senior term debt; all-equity when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debt: Option<DebtTerms>,
    /// Months of year-1 OpEx held in the O&M reserve (default 6)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub om_reserve_months: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtTerms {
    /// Annual interest rate, compounded monthly
    pub interest_rate: Rate,
    pub tenor_years: u32,
    /// Repayment profile (default sculpted)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amortization: Option<Amortization>,
    /// Minimum DSCR the sizing must respect
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_dscr: Option<Decimal>,
    /// Maximum debt as a fraction of project cost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage_fraction: Option<Rate>,
    /// Upfront fee as a fraction of principal (default 2%)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upfront_fee_fraction: Option<Rate>,
    /// Months of forward debt service held in the DSRA (default 6)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsra_months: Option<u32>,
    /// Capitalise interest during construction into project cost (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capitalize_idc: Option<bool>,
    #[serde(default)]
    pub solver: SolverConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Amortization {
    /// Level monthly payment (annuity)
    Level,
    /// Debt service shaped to CFADS / target DSCR
    Sculpted,
}

impl std::fmt::Display for Amortization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Amortization::Level => write!(f, "level"),
            Amortization::Sculpted => write!(f, "sculpted"),
        }
    }
}

/// Bounds on the debt-sizing fixed point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolverConfig {
    pub max_iterations: u32,
    /// Relative change in principal below which the solve has converged
    pub tolerance: Decimal,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_iterations: 50,
            tolerance: dec!(0.000001),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitAssumptions {
    /// Terminal value = trailing twelve-month EBITDA × multiple, in the last period
    pub terminal_ebitda_multiple: Decimal,
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Reject fractions outside [0, 1] as configuration errors.
pub(crate) fn check_fraction(field: &str, value: Decimal) -> SolarFinanceResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(SolarFinanceError::config(
            field,
            format!("must lie in [0, 1], got {value}"),
        ));
    }
    Ok(())
}

pub(crate) fn check_non_negative(field: &str, value: Decimal) -> SolarFinanceResult<()> {
    if value < Decimal::ZERO {
        return Err(SolarFinanceError::config(
            field,
            format!("cannot be negative, got {value}"),
        ));
    }
    Ok(())
}

/// Rates for discounting and escalation must stay above -100%.
pub(crate) fn check_rate(field: &str, value: Decimal) -> SolarFinanceResult<()> {
    if value <= dec!(-1) {
        return Err(SolarFinanceError::config(
            field,
            format!("must be greater than -100%, got {value}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_fraction_bounds() {
        assert!(check_fraction("x", Decimal::ZERO).is_ok());
        assert!(check_fraction("x", Decimal::ONE).is_ok());
        assert!(check_fraction("x", dec!(1.01)).is_err());
        match check_fraction("bad_debt_rate", dec!(-0.1)).unwrap_err() {
            SolarFinanceError::Configuration { field, .. } => assert_eq!(field, "bad_debt_rate"),
            other => panic!("Expected Configuration, got: {other:?}"),
        }
    }

    #[test]
    fn test_commercial_terms_deserialize_tagged() {
        let json = serde_json::json!({
            "Ppa": { "base_price_per_mwh": "50", "escalator": "0.02" }
        });
        let terms: CommercialTerms = serde_json::from_value(json).unwrap();
        assert_eq!(terms.label(), "ppa");
        match terms {
            CommercialTerms::Ppa(p) => {
                assert_eq!(p.base_price_per_mwh, dec!(50));
                assert!(p.term_years.is_none());
            }
            _ => panic!("expected PPA terms"),
        }
    }
}
