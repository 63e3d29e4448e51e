use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::SystemAssumptions;
use crate::error::SolarFinanceError;
use crate::timeline::TimeGrid;
use crate::types::{AuditTrail, Energy, Rate};
use crate::SolarFinanceResult;

/// AC energy delivered per period, in kWh. Zero before COD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergySeries {
    pub kwh: Vec<Energy>,
}

impl EnergySeries {
    pub fn total_kwh(&self) -> Energy {
        self.kwh.iter().copied().sum()
    }

    pub fn mwh(&self, index: usize) -> Energy {
        self.kwh.get(index).copied().unwrap_or(Decimal::ZERO) / dec!(1000)
    }
}

/// Resolved derates applied to the plant.
#[derive(Debug, Clone, Copy)]
struct Derates {
    performance_ratio: Rate,
    degradation: Rate,
    availability: Rate,
    curtailment: Rate,
}

fn check_derate(name: &str, value: Decimal) -> SolarFinanceResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(SolarFinanceError::Domain(format!(
            "{name} must lie in [0, 1], got {value}"
        )));
    }
    Ok(())
}

/// Cumulative degradation retained in an operating year: (1 - d)^(year - 1).
pub fn degradation_factor(degradation: Rate, operating_year: u32) -> Decimal {
    if operating_year <= 1 {
        return Decimal::ONE;
    }
    (Decimal::ONE - degradation)
        .checked_powu(u64::from(operating_year - 1))
        .unwrap_or(Decimal::ZERO)
}

/// Monthly production from nameplate, capacity factor and derates, or from a
/// typical-year monthly profile when one is supplied.
pub fn build_energy_series(
    grid: &TimeGrid,
    system: &SystemAssumptions,
    audit: &mut AuditTrail,
) -> SolarFinanceResult<EnergySeries> {
    let derates = Derates {
        performance_ratio: audit.resolve("system.performance_ratio", system.performance_ratio, Decimal::ONE),
        degradation: audit.resolve("system.degradation_rate", system.degradation_rate, dec!(0.005)),
        availability: audit.resolve("system.availability", system.availability, dec!(0.98)),
        curtailment: audit.resolve("system.curtailment", system.curtailment, Decimal::ZERO),
    };

    check_derate("capacity_factor", system.capacity_factor)?;
    check_derate("performance_ratio", derates.performance_ratio)?;
    check_derate("degradation_rate", derates.degradation)?;
    check_derate("availability", derates.availability)?;
    check_derate("curtailment", derates.curtailment)?;

    if system.ac_kw < Decimal::ZERO || system.dc_kw < Decimal::ZERO {
        return Err(SolarFinanceError::config(
            "system.ac_kw",
            "nameplate capacity cannot be negative",
        ));
    }

    if let Some(profile) = &system.monthly_profile_kwh {
        if profile.len() != 12 {
            return Err(SolarFinanceError::config(
                "system.monthly_profile_kwh",
                format!("expected 12 calendar-month values, got {}", profile.len()),
            ));
        }
        if profile.iter().any(|v| *v < Decimal::ZERO) {
            return Err(SolarFinanceError::config(
                "system.monthly_profile_kwh",
                "monthly production cannot be negative",
            ));
        }
    }

    let delivered = derates.availability * (Decimal::ONE - derates.curtailment);
    let kwh = grid
        .periods
        .iter()
        .map(|p| {
            if p.is_pre_cod {
                return Decimal::ZERO;
            }
            let gross = match &system.monthly_profile_kwh {
                Some(profile) => profile[(p.calendar_month() - 1) as usize],
                None => {
                    system.ac_kw * system.capacity_factor * p.hours() * derates.performance_ratio
                }
            };
            gross * degradation_factor(derates.degradation, p.operating_year) * delivered
        })
        .collect();

    Ok(EnergySeries { kwh })
}
