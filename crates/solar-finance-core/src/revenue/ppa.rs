use rust_decimal_macros::dec;

use super::{RevenueBreakdown, RevenueModel};
use crate::assumptions::{check_non_negative, check_rate, PpaTerms};
use crate::error::SolarFinanceError;
use crate::time_value::escalation_factor;
use crate::timeline::Period;
use crate::types::{AuditTrail, Energy, Money, Rate};
use crate::SolarFinanceResult;

/// Contracted offtake with an escalating price and a merchant tail.
///
/// After the contract term the tail sells at the final contract-year price,
/// held flat for the rest of the horizon.
#[derive(Debug, Clone)]
pub struct PpaRevenue {
    base_price_per_mwh: Money,
    escalator: Rate,
    term_years: u32,
}

impl PpaRevenue {
    pub fn new(terms: &PpaTerms, audit: &mut AuditTrail) -> SolarFinanceResult<Self> {
        let term_years = audit.resolve("commercial.term_years", terms.term_years, 20);
        check_non_negative("commercial.base_price_per_mwh", terms.base_price_per_mwh)?;
        check_rate("commercial.escalator", terms.escalator)?;
        if term_years == 0 {
            return Err(SolarFinanceError::config(
                "commercial.term_years",
                "contract term must be at least one year",
            ));
        }
        Ok(PpaRevenue {
            base_price_per_mwh: terms.base_price_per_mwh,
            escalator: terms.escalator,
            term_years,
        })
    }

    /// $/MWh in an operating year. Years past the term reuse the last
    /// contract-year price.
    pub fn price_per_mwh(&self, operating_year: u32) -> SolarFinanceResult<Money> {
        let priced_year = operating_year.clamp(1, self.term_years);
        Ok(self.base_price_per_mwh * escalation_factor("commercial.escalator", self.escalator, priced_year)?)
    }

    pub fn term_years(&self) -> u32 {
        self.term_years
    }
}

impl RevenueModel for PpaRevenue {
    fn period_revenue(&self, period: &Period, energy_kwh: Energy) -> SolarFinanceResult<RevenueBreakdown> {
        if period.is_pre_cod {
            return Ok(RevenueBreakdown::default());
        }
        let amount = energy_kwh / dec!(1000) * self.price_per_mwh(period.operating_year)?;
        let row = if period.operating_year <= self.term_years {
            RevenueBreakdown {
                contract_revenue: amount,
                total: amount,
                ..Default::default()
            }
        } else {
            RevenueBreakdown {
                merchant_revenue: amount,
                total: amount,
                ..Default::default()
            }
        };
        Ok(row)
    }

    fn label(&self) -> &'static str {
        "ppa"
    }
}
