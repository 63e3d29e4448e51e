use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::DepreciationSchedule;
use crate::error::SolarFinanceError;
use crate::timeline::TimeGrid;
use crate::types::{Money, Rate};
use crate::SolarFinanceResult;

/// MACRS 5-year, half-year convention
pub const MACRS_5YR: [Decimal; 6] = [
    dec!(0.20),
    dec!(0.32),
    dec!(0.192),
    dec!(0.1152),
    dec!(0.1152),
    dec!(0.0576),
];

/// MACRS 7-year, half-year convention
pub const MACRS_7YR: [Decimal; 8] = [
    dec!(0.1429),
    dec!(0.2449),
    dec!(0.1749),
    dec!(0.1249),
    dec!(0.0893),
    dec!(0.0892),
    dec!(0.0893),
    dec!(0.0446),
];

const TABLE_TOLERANCE: Decimal = dec!(0.0001);

/// Depreciation of the project basis, annual and monthly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepreciationPlan {
    pub depreciable_basis: Money,
    /// By operating year; sums to the basis exactly
    pub annual: Vec<Money>,
    /// By grid period; zero before COD and once the table is exhausted
    pub monthly: Vec<Money>,
}

/// Annual percentages of basis for a schedule. Tables must sum to 1.
pub fn schedule_table(schedule: &DepreciationSchedule) -> SolarFinanceResult<Vec<Rate>> {
    let table = match schedule {
        DepreciationSchedule::Macrs5 => MACRS_5YR.to_vec(),
        DepreciationSchedule::Macrs7 => MACRS_7YR.to_vec(),
        DepreciationSchedule::StraightLine(years) => {
            if *years == 0 {
                return Err(SolarFinanceError::Domain(
                    "straight-line depreciation needs at least one year".into(),
                ));
            }
            vec![Decimal::ONE / Decimal::from(*years); *years as usize]
        }
        DepreciationSchedule::Custom(table) => {
            if table.is_empty() || table.iter().any(|r| *r < Decimal::ZERO) {
                return Err(SolarFinanceError::Domain(
                    "custom depreciation table must be non-empty with non-negative rates".into(),
                ));
            }
            table.clone()
        }
    };

    let sum: Decimal = table.iter().copied().sum();
    if (sum - Decimal::ONE).abs() > TABLE_TOLERANCE {
        return Err(SolarFinanceError::Domain(format!(
            "depreciation table ({schedule}) sums to {sum}, expected 1"
        )));
    }
    Ok(table)
}

/// Annual depreciation: optional bonus in year 1, the table applied to the
/// rest, with the last year absorbing any residue so the total equals basis.
pub fn annual_depreciation(basis: Money, table: &[Rate], bonus_fraction: Rate) -> Vec<Money> {
    let bonus = basis * bonus_fraction;
    let remaining = basis - bonus;
    let mut annual: Vec<Money> = table.iter().map(|r| remaining * *r).collect();
    if let Some(first) = annual.first_mut() {
        *first += bonus;
    }
    if let Some(last_idx) = annual.len().checked_sub(1) {
        let others: Money = annual[..last_idx].iter().copied().sum();
        annual[last_idx] = basis - others;
    }
    annual
}

/// Spread each operating year's depreciation over its twelve months, putting
/// the rounding residue in month 12.
pub fn monthly_depreciation(grid: &TimeGrid, annual: &[Money]) -> Vec<Money> {
    grid.periods
        .iter()
        .map(|p| {
            if p.is_pre_cod {
                return Decimal::ZERO;
            }
            let Some(amount) = annual.get(p.operating_year as usize - 1) else {
                return Decimal::ZERO;
            };
            let month = (*amount / dec!(12)).round_dp(10);
            if p.month_of_operating_year() == 12 {
                *amount - month * dec!(11)
            } else {
                month
            }
        })
        .collect()
}

pub fn build_depreciation_plan(
    grid: &TimeGrid,
    basis: Money,
    schedule: &DepreciationSchedule,
    bonus_fraction: Rate,
) -> SolarFinanceResult<DepreciationPlan> {
    if basis < Decimal::ZERO {
        return Err(SolarFinanceError::Domain(format!(
            "depreciable basis is negative ({basis})"
        )));
    }
    let table = schedule_table(schedule)?;
    let annual = annual_depreciation(basis, &table, bonus_fraction);
    let monthly = monthly_depreciation(grid, &annual);
    Ok(DepreciationPlan {
        depreciable_basis: basis,
        annual,
        monthly,
    })
}
