use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::{RevenueBreakdown, RevenueModel};
use crate::assumptions::{check_fraction, check_non_negative, CommunitySolarTerms};
use crate::error::SolarFinanceError;
use crate::time_value::escalation_factor;
use crate::timeline::{Period, TimeGrid};
use crate::types::{AuditTrail, Energy, Money, Rate};
use crate::SolarFinanceResult;

/// Subscriber book for one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriberActivity {
    /// Accounts billed this month
    pub active_accounts: Decimal,
    /// Accounts signed this month (ramp-up or churn replacement)
    pub new_accounts: Decimal,
}

/// Community distributed generation billing with resolved defaults.
#[derive(Debug, Clone)]
pub struct CommunitySolarRevenue {
    bill_credit_rate: Money,
    bill_credit_escalator: Rate,
    bill_credit_schedule: Option<Vec<Money>>,
    subscriber_discount: Rate,
    target_subscription: Rate,
    ramp_months: u32,
    monthly_churn: Rate,
    bad_debt_rate: Rate,
    subscriber_accounts: Decimal,
}

impl CommunitySolarRevenue {
    pub fn new(terms: &CommunitySolarTerms, audit: &mut AuditTrail) -> SolarFinanceResult<Self> {
        let subscriber_discount = audit.resolve(
            "commercial.subscriber_discount",
            terms.subscriber_discount,
            dec!(0.10),
        );
        let target_subscription = audit.resolve(
            "commercial.target_subscription",
            terms.target_subscription,
            dec!(0.95),
        );
        let ramp_months = audit.resolve("commercial.ramp_months", terms.ramp_months, 12);
        let annual_churn = audit.resolve("commercial.annual_churn", terms.annual_churn, dec!(0.06));
        let bad_debt_rate = audit.resolve("commercial.bad_debt_rate", terms.bad_debt_rate, dec!(0.015));
        let subscriber_accounts =
            audit.resolve("commercial.subscriber_accounts", terms.subscriber_accounts, 100);

        check_fraction("commercial.subscriber_discount", subscriber_discount)?;
        check_fraction("commercial.target_subscription", target_subscription)?;
        check_fraction("commercial.annual_churn", annual_churn)?;
        check_fraction("commercial.bad_debt_rate", bad_debt_rate)?;
        check_non_negative("commercial.bill_credit_rate_per_kwh", terms.bill_credit_rate_per_kwh)?;

        if let Some(schedule) = &terms.bill_credit_schedule {
            if schedule.is_empty() {
                return Err(SolarFinanceError::config(
                    "commercial.bill_credit_schedule",
                    "schedule must contain at least one year",
                ));
            }
            for rate in schedule {
                check_non_negative("commercial.bill_credit_schedule", *rate)?;
            }
        }

        Ok(CommunitySolarRevenue {
            bill_credit_rate: terms.bill_credit_rate_per_kwh,
            bill_credit_escalator: terms.bill_credit_escalator,
            bill_credit_schedule: terms.bill_credit_schedule.clone(),
            subscriber_discount,
            target_subscription,
            ramp_months,
            monthly_churn: annual_churn / dec!(12),
            bad_debt_rate,
            subscriber_accounts: Decimal::from(subscriber_accounts),
        })
    }

    /// Bill credit value in $/kWh for an operating year. An explicit schedule
    /// wins over rate + escalator; its last value is held.
    pub fn bill_credit_rate(&self, operating_year: u32) -> SolarFinanceResult<Money> {
        match &self.bill_credit_schedule {
            Some(schedule) => {
                let idx = operating_year.saturating_sub(1) as usize;
                Ok(schedule
                    .get(idx)
                    .or_else(|| schedule.last())
                    .copied()
                    .unwrap_or(Decimal::ZERO))
            }
            None => Ok(self.bill_credit_rate
                * escalation_factor(
                    "commercial.bill_credit_escalator",
                    self.bill_credit_escalator,
                    operating_year,
                )?),
        }
    }

    /// Share of output sold to subscribers: linear ramp to the target level.
    pub fn subscribed_fraction(&self, operating_month: u32) -> Rate {
        if operating_month == 0 {
            return Decimal::ZERO;
        }
        if self.ramp_months == 0 || operating_month >= self.ramp_months {
            return self.target_subscription;
        }
        self.target_subscription * Decimal::from(operating_month) / Decimal::from(self.ramp_months)
    }

    pub fn subscriber_activity(&self, grid: &TimeGrid) -> Vec<SubscriberActivity> {
        grid.periods
            .iter()
            .map(|p| {
                if p.is_pre_cod {
                    return SubscriberActivity::default();
                }
                let active_accounts =
                    self.subscriber_accounts * self.subscribed_fraction(p.operating_month);
                let new_accounts = if self.ramp_months > 0 && p.operating_month <= self.ramp_months {
                    self.subscriber_accounts / Decimal::from(self.ramp_months)
                } else {
                    self.subscriber_accounts * self.monthly_churn
                };
                SubscriberActivity {
                    active_accounts,
                    new_accounts,
                }
            })
            .collect()
    }
}

impl RevenueModel for CommunitySolarRevenue {
    fn period_revenue(&self, period: &Period, energy_kwh: Energy) -> SolarFinanceResult<RevenueBreakdown> {
        if period.is_pre_cod {
            return Ok(RevenueBreakdown::default());
        }

        let gross = self.bill_credit_rate(period.operating_year)? * energy_kwh;
        let subscribed = gross * self.subscribed_fraction(period.operating_month);
        let discount = subscribed * self.subscriber_discount;
        let billed = subscribed - discount;
        let churn_loss = billed * self.monthly_churn;
        let retained = billed - churn_loss;
        let bad_debt = retained * self.bad_debt_rate;
        let net = retained - bad_debt;

        Ok(RevenueBreakdown {
            gross_bill_credits: gross,
            unsubscribed: gross - subscribed,
            subscriber_discount: discount,
            churn_loss,
            bad_debt,
            subscription_revenue: net,
            total: net,
            ..Default::default()
        })
    }

    fn label(&self) -> &'static str {
        "community_solar"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn terms() -> CommunitySolarTerms {
        CommunitySolarTerms {
            bill_credit_rate_per_kwh: dec!(0.12),
            bill_credit_escalator: dec!(0.02),
            bill_credit_schedule: None,
            subscriber_discount: None,
            target_subscription: None,
            ramp_months: None,
            annual_churn: None,
            bad_debt_rate: None,
            subscriber_accounts: None,
            management_fee_per_account_month: None,
            acquisition_cost_per_subscriber: None,
        }
    }

    fn operating(year: u32, month: u32) -> Period {
        Period {
            index: 0,
            date: NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
            operating_year: year,
            operating_month: month,
            is_pre_cod: false,
        }
    }

    #[test]
    fn test_defaults_recorded() {
        let mut audit = AuditTrail::default();
        CommunitySolarRevenue::new(&terms(), &mut audit).unwrap();
        assert_eq!(audit.defaults_applied.len(), 6);
        assert!(audit.defaults_applied.contains(&"commercial.target_subscription = 0.95".to_string()));
    }

    #[test]
    fn test_revenue_formula_after_ramp() {
        let mut audit = AuditTrail::default();
        let model = CommunitySolarRevenue::new(&terms(), &mut audit).unwrap();
        let row = model.period_revenue(&operating(1, 12), dec!(100000)).unwrap();

        // 0.12 * (1 - 0.10) * 0.95 * 100000 * (1 - 0.005) * (1 - 0.015)
        let expected = dec!(0.12) * dec!(0.9) * dec!(0.95) * dec!(100000) * dec!(0.995) * dec!(0.985);
        assert!((row.total - expected).abs() < dec!(0.0001), "got {}", row.total);
        assert_eq!(row.gross_bill_credits, dec!(12000));
        assert_eq!(row.unsubscribed, dec!(600));
        let losses = row.unsubscribed + row.subscriber_discount + row.churn_loss + row.bad_debt;
        assert_eq!(row.gross_bill_credits - losses, row.total);
    }

    #[test]
    fn test_ramp_is_linear() {
        let mut audit = AuditTrail::default();
        let model = CommunitySolarRevenue::new(&terms(), &mut audit).unwrap();
        assert_eq!(model.subscribed_fraction(6), dec!(0.475));
        assert_eq!(model.subscribed_fraction(12), dec!(0.95));
        assert_eq!(model.subscribed_fraction(40), dec!(0.95));
    }

    #[test]
    fn test_bill_credit_schedule_holds_last_value() {
        let mut t = terms();
        t.bill_credit_schedule = Some(vec![dec!(0.10), dec!(0.11)]);
        let mut audit = AuditTrail::default();
        let model = CommunitySolarRevenue::new(&t, &mut audit).unwrap();
        assert_eq!(model.bill_credit_rate(1).unwrap(), dec!(0.10));
        assert_eq!(model.bill_credit_rate(2).unwrap(), dec!(0.11));
        assert_eq!(model.bill_credit_rate(9).unwrap(), dec!(0.11));
    }

    #[test]
    fn test_escalated_bill_credit() {
        let mut audit = AuditTrail::default();
        let model = CommunitySolarRevenue::new(&terms(), &mut audit).unwrap();
        assert_eq!(model.bill_credit_rate(3).unwrap(), dec!(0.12) * dec!(1.0404));
    }

    #[test]
    fn test_bill_credit_escalation_overflow_is_an_error() {
        let mut t = terms();
        t.bill_credit_escalator = dec!(1.5);
        let mut audit = AuditTrail::default();
        let model = CommunitySolarRevenue::new(&t, &mut audit).unwrap();
        let err = model.period_revenue(&operating(90, 12), dec!(1000)).unwrap_err();
        assert!(matches!(err, SolarFinanceError::Domain(ref m) if m.contains("bill_credit_escalator")));
    }

    #[test]
    fn test_out_of_range_fraction_is_configuration_error() {
        let mut t = terms();
        t.bad_debt_rate = Some(dec!(1.5));
        let mut audit = AuditTrail::default();
        match CommunitySolarRevenue::new(&t, &mut audit).unwrap_err() {
            SolarFinanceError::Configuration { field, .. } => {
                assert_eq!(field, "commercial.bad_debt_rate")
            }
            other => panic!("Expected Configuration, got: {other:?}"),
        }
    }
}
