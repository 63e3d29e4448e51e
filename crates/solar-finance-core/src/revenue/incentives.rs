use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::{RevenueBreakdown, RevenueModel};
use crate::assumptions::{
    check_non_negative, check_rate, AdderBasis, AncillaryRevenue, GrantAmount, GrantTiming,
    IncentiveProgram, ProgramAdder,
};
use crate::error::SolarFinanceError;
use crate::time_value::escalation_factor;
use crate::timeline::{Period, TimeGrid};
use crate::types::{Energy, Money};
use crate::SolarFinanceResult;

/// REC and capacity payments plus state program adders.
#[derive(Debug, Clone)]
pub struct IncentiveRevenue {
    ancillary: AncillaryRevenue,
    adders: Vec<ProgramAdder>,
    ac_kw: Decimal,
}

/// Cash grant placed on the grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GrantSchedule {
    pub amount: Money,
    pub period_index: usize,
    pub reduces_itc_basis: bool,
}

fn within_term(operating_year: u32, term: Option<u32>) -> bool {
    term.map_or(true, |t| operating_year <= t)
}

impl IncentiveRevenue {
    pub fn new(
        ancillary: &AncillaryRevenue,
        program: Option<&IncentiveProgram>,
        ac_kw: Decimal,
    ) -> SolarFinanceResult<Self> {
        check_non_negative("ancillary.rec_price_per_mwh", ancillary.rec_price_per_mwh)?;
        check_rate("ancillary.rec_escalator", ancillary.rec_escalator)?;
        check_non_negative(
            "ancillary.capacity_price_per_kw_year",
            ancillary.capacity_price_per_kw_year,
        )?;

        let adders = program.map(|p| p.adders.clone()).unwrap_or_default();
        for adder in &adders {
            if adder.rates_by_year.is_empty() {
                return Err(SolarFinanceError::config(
                    format!("program.adders.{}", adder.label),
                    "rate table must contain at least one year",
                ));
            }
        }

        Ok(IncentiveRevenue {
            ancillary: ancillary.clone(),
            adders,
            ac_kw,
        })
    }

    fn rec_revenue(&self, operating_year: u32, energy_kwh: Energy) -> SolarFinanceResult<Money> {
        if self.ancillary.rec_price_per_mwh.is_zero()
            || !within_term(operating_year, self.ancillary.rec_term_years)
        {
            return Ok(Decimal::ZERO);
        }
        let escalation =
            escalation_factor("ancillary.rec_escalator", self.ancillary.rec_escalator, operating_year)?;
        Ok(energy_kwh / dec!(1000) * self.ancillary.rec_price_per_mwh * escalation)
    }

    fn capacity_revenue(&self, operating_year: u32) -> Money {
        if !within_term(operating_year, self.ancillary.capacity_term_years) {
            return Decimal::ZERO;
        }
        self.ancillary.capacity_price_per_kw_year * self.ac_kw / dec!(12)
    }

    fn adder_revenue(&self, adder: &ProgramAdder, operating_year: u32, energy_kwh: Energy) -> Money {
        let idx = operating_year.saturating_sub(1) as usize;
        let rate = match adder.rates_by_year.get(idx) {
            Some(r) => *r,
            None if adder.hold_last_rate => adder.rates_by_year.last().copied().unwrap_or_default(),
            None => return Decimal::ZERO,
        };
        match adder.basis {
            AdderBasis::PerKwh => rate * energy_kwh,
            AdderBasis::PerMonth => rate,
            AdderBasis::PerKwAcYear => rate * self.ac_kw / dec!(12),
        }
    }
}

impl RevenueModel for IncentiveRevenue {
    fn period_revenue(&self, period: &Period, energy_kwh: Energy) -> SolarFinanceResult<RevenueBreakdown> {
        if period.is_pre_cod {
            return Ok(RevenueBreakdown::default());
        }
        let year = period.operating_year;
        let rec_revenue = self.rec_revenue(year, energy_kwh)?;
        let capacity_revenue = self.capacity_revenue(year);
        let program_adders: Money = self
            .adders
            .iter()
            .map(|a| self.adder_revenue(a, year, energy_kwh))
            .sum();

        Ok(RevenueBreakdown {
            rec_revenue,
            capacity_revenue,
            program_adders,
            total: rec_revenue + capacity_revenue + program_adders,
            ..Default::default()
        })
    }

    fn label(&self) -> &'static str {
        "incentives"
    }
}

/// Place the program's upfront grant (if any) on the grid.
pub fn grant_schedule(
    program: Option<&IncentiveProgram>,
    dc_kw: Decimal,
    grid: &TimeGrid,
) -> Option<GrantSchedule> {
    let grant = program?.upfront_grant.as_ref()?;
    let amount = match grant.amount {
        GrantAmount::Fixed(v) => v,
        GrantAmount::PerWattDc(per_w) => per_w * dc_kw * dec!(1000),
    };
    if amount.is_zero() {
        return None;
    }
    let period_index = match grant.timing {
        GrantTiming::Ntp => 0,
        GrantTiming::Cod => grid.cod_index,
    };
    Some(GrantSchedule {
        amount,
        period_index,
        reduces_itc_basis: grant.reduces_itc_basis,
    })
}
