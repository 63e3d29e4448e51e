use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::{
    check_fraction, check_non_negative, CapexAssumptions, DeveloperFee, DeveloperFeeTiming,
    DrawSchedule, Milestone,
};
use crate::error::SolarFinanceError;
use crate::timeline::TimeGrid;
use crate::types::{AuditTrail, Money, Rate};
use crate::SolarFinanceResult;

const WEIGHT_TOLERANCE: Decimal = dec!(0.0001);

/// Project cost roll-up before financing costs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapexSummary {
    pub line_items: Money,
    pub contingency: Money,
    /// Line items plus contingency
    pub epc_cost: Money,
    pub developer_fee: Money,
    pub decommissioning_reserve: Money,
    /// Everything above; excludes IDC, financing fees and reserves
    pub total_before_financing: Money,
    /// ITC-eligible cost (eligible items, their share of contingency, developer fee)
    pub itc_eligible_cost: Money,
    /// Depreciable cost before any ITC basis reduction
    pub depreciable_cost: Money,
}

/// Monthly CapEx spend. All entries after COD are zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapexSchedule {
    pub construction: Vec<Money>,
    pub developer_fee: Vec<Money>,
    pub decommissioning: Vec<Money>,
    pub total: Vec<Money>,
    pub summary: CapexSummary,
}

impl CapexSchedule {
    pub fn total_at(&self, index: usize) -> Money {
        self.total.get(index).copied().unwrap_or(Decimal::ZERO)
    }
}

fn default_milestones() -> Vec<Milestone> {
    vec![
        Milestone {
            label: "Notice to proceed".into(),
            progress: Decimal::ZERO,
            weight: dec!(0.10),
        },
        Milestone {
            label: "Equipment procurement".into(),
            progress: dec!(0.33),
            weight: dec!(0.40),
        },
        Milestone {
            label: "Mechanical completion".into(),
            progress: dec!(0.75),
            weight: dec!(0.40),
        },
        Milestone {
            label: "Substantial completion".into(),
            progress: Decimal::ONE,
            weight: dec!(0.10),
        },
    ]
}

fn check_weight_sum(field: &str, weights: &[Rate]) -> SolarFinanceResult<()> {
    let sum: Decimal = weights.iter().copied().sum();
    if (sum - Decimal::ONE).abs() > WEIGHT_TOLERANCE {
        return Err(SolarFinanceError::config(
            field,
            format!("weights must sum to 1, got {sum}"),
        ));
    }
    Ok(())
}

/// Spend weight for each construction month under a draw schedule.
pub fn draw_weights(schedule: &DrawSchedule, months: usize) -> SolarFinanceResult<Vec<Rate>> {
    if months == 0 {
        return Err(SolarFinanceError::config(
            "construction_months",
            "CapEx requires at least one pre-COD month",
        ));
    }
    match schedule {
        DrawSchedule::Even => Ok(vec![Decimal::ONE / Decimal::from(months); months]),
        DrawSchedule::Custom(weights) => {
            if weights.len() != months {
                return Err(SolarFinanceError::config(
                    "capex.draw_schedule",
                    format!("expected {months} monthly weights, got {}", weights.len()),
                ));
            }
            for w in weights {
                check_fraction("capex.draw_schedule", *w)?;
            }
            check_weight_sum("capex.draw_schedule", weights)?;
            Ok(weights.clone())
        }
        DrawSchedule::Milestones(milestones) => {
            let weights: Vec<Rate> = milestones.iter().map(|m| m.weight).collect();
            check_weight_sum("capex.draw_schedule", &weights)?;
            let last = Decimal::from(months - 1);
            let mut out = vec![Decimal::ZERO; months];
            for m in milestones {
                check_fraction(&format!("capex.draw_schedule.{}", m.label), m.progress)?;
                check_fraction(&format!("capex.draw_schedule.{}", m.label), m.weight)?;
                let idx = (m.progress * last)
                    .round()
                    .to_usize()
                    .unwrap_or(0)
                    .min(months - 1);
                out[idx] += m.weight;
            }
            Ok(out)
        }
    }
}

/// Spread `amount` by weight, folding the rounding residue into the last
/// weighted month so the allocation sums to `amount` exactly.
fn allocate(amount: Money, weights: &[Rate]) -> Vec<Money> {
    let mut out: Vec<Money> = weights.iter().map(|w| amount * *w).collect();
    if let Some(last) = weights.iter().rposition(|w| !w.is_zero()) {
        let others: Money = out
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != last)
            .map(|(_, v)| *v)
            .sum();
        out[last] = amount - others;
    }
    out
}

/// Roll up the cost stack and place it on the pre-COD months.
pub fn build_capex_schedule(
    grid: &TimeGrid,
    capex: &CapexAssumptions,
    audit: &mut AuditTrail,
) -> SolarFinanceResult<CapexSchedule> {
    for item in &capex.line_items {
        check_non_negative(&format!("capex.line_items.{}", item.label), item.amount)?;
    }
    check_non_negative("capex.decommissioning_reserve", capex.decommissioning_reserve)?;
    let contingency_fraction = audit.resolve(
        "capex.contingency_fraction",
        capex.contingency_fraction,
        dec!(0.05),
    );
    check_fraction("capex.contingency_fraction", contingency_fraction)?;

    // ── Cost roll-up ──
    let line_items: Money = capex.line_items.iter().map(|i| i.amount).sum();
    let eligible_items: Money = capex
        .line_items
        .iter()
        .filter(|i| i.itc_eligible)
        .map(|i| i.amount)
        .sum();
    let depreciable_items: Money = capex
        .line_items
        .iter()
        .filter(|i| i.depreciable)
        .map(|i| i.amount)
        .sum();

    let contingency = line_items * contingency_fraction;
    let epc_cost = line_items + contingency;
    let developer_fee = match capex.developer_fee {
        DeveloperFee::None => Decimal::ZERO,
        DeveloperFee::PercentOfEpc(pct) => {
            check_fraction("capex.developer_fee", pct)?;
            epc_cost * pct
        }
        DeveloperFee::Fixed(amount) => {
            check_non_negative("capex.developer_fee", amount)?;
            amount
        }
    };

    let eligible_contingency = if line_items.is_zero() {
        Decimal::ZERO
    } else {
        contingency * eligible_items / line_items
    };

    let summary = CapexSummary {
        line_items,
        contingency,
        epc_cost,
        developer_fee,
        decommissioning_reserve: capex.decommissioning_reserve,
        total_before_financing: epc_cost + developer_fee + capex.decommissioning_reserve,
        itc_eligible_cost: eligible_items + eligible_contingency + developer_fee,
        depreciable_cost: depreciable_items + contingency + developer_fee,
    };

    // ── Timing ──
    let months = grid.cod_index;
    let schedule = match &capex.draw_schedule {
        Some(s) => s.clone(),
        None => {
            audit.default_applied("capex.draw_schedule", "milestones");
            DrawSchedule::Milestones(default_milestones())
        }
    };
    let weights = draw_weights(&schedule, months)?;
    let close = months - 1;

    let n = grid.len();
    let mut construction = vec![Decimal::ZERO; n];
    for (i, v) in allocate(epc_cost, &weights).into_iter().enumerate() {
        construction[i] = v;
    }

    let mut dev_fee = vec![Decimal::ZERO; n];
    match capex.developer_fee_timing {
        DeveloperFeeTiming::Ntp => dev_fee[0] = developer_fee,
        DeveloperFeeTiming::Cod => dev_fee[close] = developer_fee,
        DeveloperFeeTiming::OverConstruction => {
            let even = vec![Decimal::ONE / Decimal::from(months); months];
            for (i, v) in allocate(developer_fee, &even).into_iter().enumerate() {
                dev_fee[i] = v;
            }
        }
    }

    let mut decommissioning = vec![Decimal::ZERO; n];
    decommissioning[close] = capex.decommissioning_reserve;

    let total = (0..n)
        .map(|i| construction[i] + dev_fee[i] + decommissioning[i])
        .collect();

    Ok(CapexSchedule {
        construction,
        developer_fee: dev_fee,
        decommissioning,
        total,
        summary,
    })
}
