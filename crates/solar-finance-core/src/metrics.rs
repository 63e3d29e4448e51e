use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::time_value::{annual_irr_from_monthly, npv, periodic_rate_from_annual, real_rate};
use crate::types::{Energy, MetricValue, Money, Rate};
use crate::waterfall::CashflowLedger;
use crate::SolarFinanceResult;

const KWH_PER_MWH: Decimal = dec!(1000);
const MONTHS_PER_YEAR: Decimal = dec!(12);

/// Headline results of one model run.
///
/// IRRs are annualised; NPVs are discounted monthly back to NTP; LCOE is in
/// $/MWh. Every value is either defined or explicitly `Undefined`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    // ── Returns ──
    /// Unlevered, before tax
    pub project_irr_pre_tax: MetricValue,
    /// Unlevered, after an interest-free tax run
    pub project_irr_after_tax: MetricValue,
    pub equity_irr_pre_tax: MetricValue,
    pub equity_irr_after_tax: MetricValue,
    pub project_npv_nominal: MetricValue,
    pub project_npv_real: MetricValue,
    pub equity_npv_nominal: MetricValue,
    pub equity_npv_real: MetricValue,

    // ── Cost of energy ──
    pub lcoe_nominal: MetricValue,
    pub lcoe_real: MetricValue,

    // ── Coverage ──
    pub min_dscr: MetricValue,
    pub avg_dscr: MetricValue,
    pub year1_dscr: MetricValue,

    /// Years from NTP until cumulative FCFE turns non-negative
    pub payback_years: MetricValue,

    // ── Totals ──
    pub total_capex: MetricValue,
    /// Peak debt balance
    pub total_debt: MetricValue,
    pub total_equity_invested: MetricValue,
    pub lifetime_energy_mwh: MetricValue,
    pub lifetime_revenue: MetricValue,
    /// Equity distributions over equity invested
    pub equity_multiple: MetricValue,
}

impl Metrics {
    fn entries(&self) -> [(&'static str, MetricValue); 20] {
        [
            ("project_irr_pre_tax", self.project_irr_pre_tax),
            ("project_irr_after_tax", self.project_irr_after_tax),
            ("equity_irr_pre_tax", self.equity_irr_pre_tax),
            ("equity_irr_after_tax", self.equity_irr_after_tax),
            ("project_npv_nominal", self.project_npv_nominal),
            ("project_npv_real", self.project_npv_real),
            ("equity_npv_nominal", self.equity_npv_nominal),
            ("equity_npv_real", self.equity_npv_real),
            ("lcoe_nominal", self.lcoe_nominal),
            ("lcoe_real", self.lcoe_real),
            ("min_dscr", self.min_dscr),
            ("avg_dscr", self.avg_dscr),
            ("year1_dscr", self.year1_dscr),
            ("payback_years", self.payback_years),
            ("total_capex", self.total_capex),
            ("total_debt", self.total_debt),
            ("total_equity_invested", self.total_equity_invested),
            ("lifetime_energy_mwh", self.lifetime_energy_mwh),
            ("lifetime_revenue", self.lifetime_revenue),
            ("equity_multiple", self.equity_multiple),
        ]
    }

    /// Flat name -> value view for report writers.
    pub fn as_map(&self) -> BTreeMap<String, MetricValue> {
        self.entries()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}

/// DSCR statistics over periods that carry debt service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DscrStats {
    pub min: MetricValue,
    pub average: MetricValue,
    pub year1: MetricValue,
}

/// Compute the metrics bundle from a finished ledger.
pub fn compute_metrics(
    ledger: &CashflowLedger,
    discount_rate: Rate,
    inflation_rate: Rate,
) -> SolarFinanceResult<Metrics> {
    let nominal_monthly = periodic_rate_from_annual(discount_rate)?;
    let real_annual = real_rate(discount_rate, inflation_rate)?;
    let real_monthly = periodic_rate_from_annual(real_annual)?;

    let project_pre_tax = ledger.column(|r| r.project_cash_flow_pre_tax);
    let project_after_tax = ledger.column(|r| r.project_cash_flow_after_tax);
    let fcfe = ledger.column(|r| r.fcfe);
    let equity_pre_tax = ledger.column(|r| r.fcfe + r.net_tax);

    // ── LCOE ──
    let lifecycle_cost = ledger.column(|r| r.capex + r.opex - r.itc_realized - r.grant);
    let energy_mwh: Vec<Energy> = ledger.column(|r| r.energy_kwh / KWH_PER_MWH);
    let lcoe_nominal = levelized_cost(&lifecycle_cost, &energy_mwh, nominal_monthly, nominal_monthly)?;
    let lcoe_real = levelized_cost(&lifecycle_cost, &energy_mwh, nominal_monthly, real_monthly)?;

    let dscr = dscr_stats(ledger);

    // ── Totals ──
    let total_equity_invested: Money = fcfe.iter().filter(|cf| cf.is_sign_negative()).map(|cf| -*cf).sum();
    let total_distributed: Money = fcfe.iter().filter(|cf| **cf > Decimal::ZERO).copied().sum();
    let equity_multiple = if total_equity_invested > Decimal::ZERO {
        MetricValue::Defined(total_distributed / total_equity_invested)
    } else {
        MetricValue::Undefined
    };
    let total_debt = ledger
        .rows()
        .iter()
        .map(|r| r.debt_balance)
        .max()
        .unwrap_or(Decimal::ZERO);

    Ok(Metrics {
        project_irr_pre_tax: annual_irr_from_monthly(&project_pre_tax),
        project_irr_after_tax: annual_irr_from_monthly(&project_after_tax),
        equity_irr_pre_tax: annual_irr_from_monthly(&equity_pre_tax),
        equity_irr_after_tax: annual_irr_from_monthly(&fcfe),
        project_npv_nominal: MetricValue::Defined(npv(nominal_monthly, &project_after_tax)?),
        project_npv_real: MetricValue::Defined(npv(real_monthly, &project_after_tax)?),
        equity_npv_nominal: MetricValue::Defined(npv(nominal_monthly, &fcfe)?),
        equity_npv_real: MetricValue::Defined(npv(real_monthly, &fcfe)?),
        lcoe_nominal,
        lcoe_real,
        min_dscr: dscr.min,
        avg_dscr: dscr.average,
        year1_dscr: dscr.year1,
        payback_years: payback_years(&fcfe),
        total_capex: MetricValue::Defined(ledger.total(|r| r.capex)),
        total_debt: MetricValue::Defined(total_debt),
        total_equity_invested: MetricValue::Defined(total_equity_invested),
        lifetime_energy_mwh: MetricValue::Defined(energy_mwh.iter().copied().sum()),
        lifetime_revenue: MetricValue::Defined(ledger.total(|r| r.revenue)),
        equity_multiple,
    })
}

/// PV(cost) / PV(energy), each discounted monthly at its own rate.
pub fn levelized_cost(
    cost: &[Money],
    energy_mwh: &[Energy],
    cost_rate: Rate,
    energy_rate: Rate,
) -> SolarFinanceResult<MetricValue> {
    let pv_energy = npv(energy_rate, energy_mwh)?;
    if pv_energy <= Decimal::ZERO {
        return Ok(MetricValue::Undefined);
    }
    Ok(MetricValue::Defined(npv(cost_rate, cost)? / pv_energy))
}

/// Min, average and first-operating-year average DSCR over post-COD periods
/// with positive debt service.
pub fn dscr_stats(ledger: &CashflowLedger) -> DscrStats {
    let covered: Vec<(u32, Decimal)> = ledger
        .operating_rows()
        .filter(|r| r.debt_service > Decimal::ZERO)
        .filter_map(|r| r.dscr.map(|d| (r.operating_year, d)))
        .collect();

    let values: Vec<Decimal> = covered.iter().map(|(_, d)| *d).collect();
    let year1: Vec<Decimal> = covered
        .iter()
        .filter(|(year, _)| *year == 1)
        .map(|(_, d)| *d)
        .collect();

    DscrStats {
        min: values.iter().copied().min().into(),
        average: mean(&values),
        year1: mean(&year1),
    }
}

fn mean(values: &[Decimal]) -> MetricValue {
    if values.is_empty() {
        return MetricValue::Undefined;
    }
    let sum: Decimal = values.iter().copied().sum();
    MetricValue::Defined(sum / Decimal::from(values.len()))
}

/// Years (from the start of period 0) until cumulative cash first crosses
/// from negative to non-negative. Payback counts at the end of that month.
pub fn payback_years(cash_flows: &[Money]) -> MetricValue {
    let mut cumulative = Decimal::ZERO;
    let mut was_negative = false;
    for (t, cf) in cash_flows.iter().enumerate() {
        cumulative += *cf;
        if cumulative < Decimal::ZERO {
            was_negative = true;
        } else if was_negative {
            return MetricValue::Defined(Decimal::from(t + 1) / MONTHS_PER_YEAR);
        }
    }
    MetricValue::Undefined
}
