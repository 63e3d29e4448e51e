pub mod community_solar;
pub mod incentives;
pub mod ppa;

use std::ops::AddAssign;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::assumptions::{CommercialTerms, ProjectAssumptions};
use crate::energy::EnergySeries;
use crate::timeline::{Period, TimeGrid};
use crate::types::{AuditTrail, Energy, Money};
use crate::SolarFinanceResult;

pub use community_solar::{CommunitySolarRevenue, SubscriberActivity};
pub use incentives::{GrantSchedule, IncentiveRevenue};
pub use ppa::PpaRevenue;

/// Named revenue components for one period. Losses are recorded as positive
/// amounts; `total` is the cash revenue recognised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RevenueBreakdown {
    // Community solar
    pub gross_bill_credits: Money,
    pub unsubscribed: Money,
    pub subscriber_discount: Money,
    pub churn_loss: Money,
    pub bad_debt: Money,
    pub subscription_revenue: Money,
    // PPA
    pub contract_revenue: Money,
    pub merchant_revenue: Money,
    // Ancillary and program
    pub rec_revenue: Money,
    pub capacity_revenue: Money,
    pub program_adders: Money,
    pub total: Money,
}

impl AddAssign for RevenueBreakdown {
    fn add_assign(&mut self, rhs: Self) {
        self.gross_bill_credits += rhs.gross_bill_credits;
        self.unsubscribed += rhs.unsubscribed;
        self.subscriber_discount += rhs.subscriber_discount;
        self.churn_loss += rhs.churn_loss;
        self.bad_debt += rhs.bad_debt;
        self.subscription_revenue += rhs.subscription_revenue;
        self.contract_revenue += rhs.contract_revenue;
        self.merchant_revenue += rhs.merchant_revenue;
        self.rec_revenue += rhs.rec_revenue;
        self.capacity_revenue += rhs.capacity_revenue;
        self.program_adders += rhs.program_adders;
        self.total += rhs.total;
    }
}

/// A revenue stream priced per period from the period's delivered energy.
pub trait RevenueModel {
    fn period_revenue(&self, period: &Period, energy_kwh: Energy) -> SolarFinanceResult<RevenueBreakdown>;

    fn label(&self) -> &'static str;
}

/// One `RevenueBreakdown` per period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueLedger {
    pub rows: Vec<RevenueBreakdown>,
}

impl RevenueLedger {
    pub fn total(&self, index: usize) -> Money {
        self.rows.get(index).map(|r| r.total).unwrap_or(Decimal::ZERO)
    }
}

/// Everything the revenue engine hands downstream.
#[derive(Debug, Clone)]
pub struct RevenueSchedule {
    pub ledger: RevenueLedger,
    /// Subscriber accounts per period (community solar only), used for
    /// management fees and acquisition costs.
    pub subscribers: Option<Vec<SubscriberActivity>>,
    pub grant: Option<GrantSchedule>,
}

/// Price every period under the active commercial mode, then stack the
/// ancillary streams and program adders on top.
pub fn build_revenue_ledger(
    grid: &TimeGrid,
    energy: &EnergySeries,
    assumptions: &ProjectAssumptions,
    audit: &mut AuditTrail,
) -> SolarFinanceResult<RevenueSchedule> {
    let (primary, subscribers): (Box<dyn RevenueModel>, _) = match &assumptions.commercial {
        CommercialTerms::CommunitySolar(terms) => {
            let model = CommunitySolarRevenue::new(terms, audit)?;
            let activity = model.subscriber_activity(grid);
            (Box::new(model), Some(activity))
        }
        CommercialTerms::Ppa(terms) => (Box::new(PpaRevenue::new(terms, audit)?), None),
    };

    let incentives = IncentiveRevenue::new(
        &assumptions.ancillary,
        assumptions.program.as_ref(),
        assumptions.system.ac_kw,
    )?;
    let streams: [&dyn RevenueModel; 2] = [primary.as_ref(), &incentives];

    let rows = grid
        .periods
        .iter()
        .map(|p| {
            let kwh = energy.kwh[p.index];
            let mut row = RevenueBreakdown::default();
            if !p.is_pre_cod {
                for stream in &streams {
                    row += stream.period_revenue(p, kwh)?;
                }
            }
            Ok(row)
        })
        .collect::<SolarFinanceResult<Vec<_>>>()?;

    let grant = incentives::grant_schedule(
        assumptions.program.as_ref(),
        assumptions.system.dc_kw,
        grid,
    );

    log::debug!(
        "revenue built for {} periods ({} + {})",
        grid.len(),
        primary.label(),
        incentives.label()
    );

    Ok(RevenueSchedule {
        ledger: RevenueLedger { rows },
        subscribers,
        grant,
    })
}
