use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::{
    check_non_negative, check_rate, CommercialTerms, LandCost, ProjectAssumptions, PropertyTax,
};
use crate::energy::EnergySeries;
use crate::error::SolarFinanceError;
use crate::revenue::SubscriberActivity;
use crate::time_value::escalation_factor;
use crate::timeline::TimeGrid;
use crate::types::{AuditTrail, Money};
use crate::SolarFinanceResult;

/// Operating cost lines for one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OpexBreakdown {
    pub fixed_om: Money,
    pub variable_om: Money,
    pub insurance: Money,
    pub asset_management: Money,
    pub other: Money,
    pub land_lease: Money,
    pub property_tax: Money,
    pub inverter_replacement: Money,
    pub subscriber_management: Money,
    pub subscriber_acquisition: Money,
    pub total: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpexSchedule {
    pub rows: Vec<OpexBreakdown>,
}

impl OpexSchedule {
    pub fn total(&self, index: usize) -> Money {
        self.rows.get(index).map(|r| r.total).unwrap_or(Decimal::ZERO)
    }

    /// Total OpEx over the first twelve operating months, divided by twelve.
    pub fn first_year_monthly_average(&self, grid: &TimeGrid) -> Money {
        let year_one: Money = grid
            .operating_periods()
            .iter()
            .take(12)
            .map(|p| self.total(p.index))
            .sum();
        year_one / dec!(12)
    }
}

/// Schedule-by-year lookup with the last value held.
fn held_schedule(schedule: &[Money], operating_year: u32) -> Money {
    let idx = operating_year.saturating_sub(1) as usize;
    schedule
        .get(idx)
        .or_else(|| schedule.last())
        .copied()
        .unwrap_or(Decimal::ZERO)
}

/// Recurring operating costs, zero before COD.
pub fn build_opex_schedule(
    grid: &TimeGrid,
    energy: &EnergySeries,
    assumptions: &ProjectAssumptions,
    subscribers: Option<&[SubscriberActivity]>,
    audit: &mut AuditTrail,
) -> SolarFinanceResult<OpexSchedule> {
    let opex = &assumptions.opex;
    let ac_kw = assumptions.system.ac_kw;
    let escalator = audit.resolve("opex.escalator", opex.escalator, dec!(0.02));
    check_rate("opex.escalator", escalator)?;

    for (field, value) in [
        ("opex.fixed_om_per_kw_year", opex.fixed_om_per_kw_year),
        ("opex.variable_om_per_mwh", opex.variable_om_per_mwh),
        ("opex.insurance_per_kw_year", opex.insurance_per_kw_year),
        ("opex.asset_management_per_kw_year", opex.asset_management_per_kw_year),
        ("opex.other_per_year", opex.other_per_year),
    ] {
        check_non_negative(field, value)?;
    }

    for r in &opex.inverter_replacements {
        if r.operating_year == 0 || r.operating_year > grid.operating_years {
            return Err(SolarFinanceError::config(
                "opex.inverter_replacements",
                format!(
                    "operating year {} is outside 1..={}",
                    r.operating_year, grid.operating_years
                ),
            ));
        }
    }

    let (mgmt_fee, acquisition_cost) = match &assumptions.commercial {
        CommercialTerms::CommunitySolar(terms) => (
            audit.resolve(
                "commercial.management_fee_per_account_month",
                terms.management_fee_per_account_month,
                dec!(2.5),
            ),
            audit.resolve(
                "commercial.acquisition_cost_per_subscriber",
                terms.acquisition_cost_per_subscriber,
                Decimal::ZERO,
            ),
        ),
        CommercialTerms::Ppa(_) => (Decimal::ZERO, Decimal::ZERO),
    };

    let monthly = |annual_per_kw: Money| annual_per_kw * ac_kw / dec!(12);

    let rows = grid
        .periods
        .iter()
        .map(|p| {
            if p.is_pre_cod {
                return Ok(OpexBreakdown::default());
            }
            let year = p.operating_year;
            let esc = escalation_factor("opex.escalator", escalator, year)?;

            let fixed_om = monthly(opex.fixed_om_per_kw_year) * esc;
            let variable_om = energy.mwh(p.index) * opex.variable_om_per_mwh * esc;
            let insurance = monthly(opex.insurance_per_kw_year) * esc;
            let asset_management = monthly(opex.asset_management_per_kw_year) * esc;
            let other = opex.other_per_year / dec!(12) * esc;

            let land_lease = match &opex.land {
                Some(LandCost::Lease {
                    acres,
                    rent_per_acre_year,
                    escalator,
                }) => {
                    *acres * *rent_per_acre_year / dec!(12)
                        * escalation_factor("opex.land.escalator", *escalator, year)?
                }
                Some(LandCost::Purchase) | None => Decimal::ZERO,
            };

            let property_tax = match &opex.property_tax {
                Some(PropertyTax::Pilot { schedule_per_year }) => {
                    held_schedule(schedule_per_year, year) / dec!(12)
                }
                Some(PropertyTax::Assessed {
                    assessed_value,
                    mill_rate,
                }) => *assessed_value * *mill_rate / dec!(12) * esc,
                None => Decimal::ZERO,
            };

            // Replacements land in the first month of their operating year
            let inverter_replacement: Money = if p.month_of_operating_year() == 1 {
                opex.inverter_replacements
                    .iter()
                    .filter(|r| r.operating_year == year)
                    .map(|r| r.amount)
                    .sum()
            } else {
                Decimal::ZERO
            };

            let activity = subscribers
                .and_then(|s| s.get(p.index))
                .copied()
                .unwrap_or_default();
            let subscriber_management = activity.active_accounts * mgmt_fee;
            let subscriber_acquisition = activity.new_accounts * acquisition_cost;

            let total = fixed_om
                + variable_om
                + insurance
                + asset_management
                + other
                + land_lease
                + property_tax
                + inverter_replacement
                + subscriber_management
                + subscriber_acquisition;

            Ok(OpexBreakdown {
                fixed_om,
                variable_om,
                insurance,
                asset_management,
                other,
                land_lease,
                property_tax,
                inverter_replacement,
                subscriber_management,
                subscriber_acquisition,
                total,
            })
        })
        .collect::<SolarFinanceResult<Vec<_>>>()?;

    Ok(OpexSchedule { rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assumptions::*;
    use crate::timeline::build_time_grid;
    use chrono::NaiveDate;

    fn assumptions() -> ProjectAssumptions {
        ProjectAssumptions {
            project_name: "opex test".into(),
            commercial: CommercialTerms::Ppa(PpaTerms {
                base_price_per_mwh: dec!(50),
                escalator: Decimal::ZERO,
                term_years: None,
            }),
            cod_date: NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
            construction_months: 2,
            operating_years: 3,
            discount_rate: dec!(0.08),
            inflation_rate: None,
            system: SystemAssumptions {
                dc_kw: dec!(1300),
                ac_kw: dec!(1000),
                capacity_factor: dec!(0.2),
                performance_ratio: None,
                degradation_rate: None,
                availability: None,
                curtailment: None,
                monthly_profile_kwh: None,
            },
            ancillary: AncillaryRevenue::default(),
            program: None,
            tax: TaxAssumptions::default(),
            capex: CapexAssumptions {
                line_items: vec![],
                contingency_fraction: None,
                developer_fee: DeveloperFee::None,
                developer_fee_timing: DeveloperFeeTiming::Cod,
                decommissioning_reserve: Decimal::ZERO,
                draw_schedule: None,
            },
            opex: OpexAssumptions {
                fixed_om_per_kw_year: dec!(12),
                variable_om_per_mwh: dec!(2),
                escalator: Some(dec!(0.10)),
                land: Some(LandCost::Lease {
                    acres: dec!(10),
                    rent_per_acre_year: dec!(1200),
                    escalator: Decimal::ZERO,
                }),
                property_tax: Some(PropertyTax::Pilot {
                    schedule_per_year: vec![dec!(2400), dec!(3600)],
                }),
                inverter_replacements: vec![ScheduledReplacement {
                    operating_year: 2,
                    amount: dec!(50000),
                }],
                ..Default::default()
            },
            financing: FinancingAssumptions::default(),
            exit: None,
        }
    }

    fn energy(n: usize, kwh: Decimal) -> EnergySeries {
        EnergySeries {
            kwh: (0..n).map(|i| if i < 2 { Decimal::ZERO } else { kwh }).collect(),
        }
    }

    #[test]
    fn test_opex_zero_pre_cod_and_escalates() {
        let a = assumptions();
        let grid = build_time_grid(a.cod_date, 2, 3).unwrap();
        let e = energy(grid.len(), dec!(100000));
        let mut audit = AuditTrail::default();
        let s = build_opex_schedule(&grid, &e, &a, None, &mut audit).unwrap();

        assert_eq!(s.rows[0], OpexBreakdown::default());
        let y1 = s.rows[2];
        assert_eq!(y1.fixed_om, dec!(1000));
        assert_eq!(y1.variable_om, dec!(200));
        assert_eq!(y1.land_lease, dec!(1000));
        assert_eq!(y1.property_tax, dec!(200));
        assert_eq!(y1.total, dec!(2400));

        let y2 = s.rows[14];
        assert_eq!(y2.fixed_om, dec!(1100));
        assert_eq!(y2.inverter_replacement, dec!(50000));
        assert_eq!(s.rows[15].inverter_replacement, Decimal::ZERO);
        // PILOT holds its last value
        assert_eq!(s.rows[26].property_tax, dec!(300));
    }

    #[test]
    fn test_subscriber_fees_applied_for_community_solar() {
        let mut a = assumptions();
        a.commercial = CommercialTerms::CommunitySolar(CommunitySolarTerms {
            bill_credit_rate_per_kwh: dec!(0.1),
            bill_credit_escalator: Decimal::ZERO,
            bill_credit_schedule: None,
            subscriber_discount: None,
            target_subscription: None,
            ramp_months: None,
            annual_churn: None,
            bad_debt_rate: None,
            subscriber_accounts: None,
            management_fee_per_account_month: Some(dec!(3)),
            acquisition_cost_per_subscriber: Some(dec!(100)),
        });
        let grid = build_time_grid(a.cod_date, 2, 3).unwrap();
        let e = energy(grid.len(), Decimal::ZERO);
        let mut activity = vec![SubscriberActivity::default(); grid.len()];
        activity[2] = SubscriberActivity {
            active_accounts: dec!(50),
            new_accounts: dec!(8),
        };
        let mut audit = AuditTrail::default();
        let s = build_opex_schedule(&grid, &e, &a, Some(&activity), &mut audit).unwrap();
        assert_eq!(s.rows[2].subscriber_management, dec!(150));
        assert_eq!(s.rows[2].subscriber_acquisition, dec!(800));
    }

    #[test]
    fn test_replacement_outside_horizon_rejected() {
        let mut a = assumptions();
        a.opex.inverter_replacements[0].operating_year = 9;
        let grid = build_time_grid(a.cod_date, 2, 3).unwrap();
        let e = energy(grid.len(), Decimal::ZERO);
        let mut audit = AuditTrail::default();
        assert!(build_opex_schedule(&grid, &e, &a, None, &mut audit).is_err());
    }
}
