use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::credits::CreditPlan;
use super::TaxPolicy;
use crate::assumptions::CreditMonetization;
use crate::timeline::TimeGrid;
use crate::types::Money;

/// A tax loss and the operating year it arose in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NolVintage {
    pub origin_year: u32,
    pub remaining: Money,
}

/// Forward-only carry between periods. Created at COD.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxState {
    pub cumulative_depreciation: Money,
    /// Oldest first
    pub nol_vintages: VecDeque<NolVintage>,
    pub itc_carryforward: Money,
    pub ptc_carryforward: Money,
    pub cumulative_itc_claimed: Money,
}

impl TaxState {
    pub fn nol_balance(&self) -> Money {
        self.nol_vintages.iter().map(|v| v.remaining).sum()
    }

    pub fn credit_carryforward(&self) -> Money {
        self.itc_carryforward + self.ptc_carryforward
    }

    /// Drop vintages whose carryforward window (years after the loss year)
    /// has closed; returns the amount lost.
    fn expire_nol(&mut self, operating_year: u32, window: Option<u32>) -> Money {
        let Some(years) = window else {
            return Decimal::ZERO;
        };
        let mut expired = Decimal::ZERO;
        while let Some(front) = self.nol_vintages.front() {
            if operating_year.saturating_sub(front.origin_year) <= years {
                break;
            }
            expired += front.remaining;
            self.nol_vintages.pop_front();
        }
        expired
    }

    /// Consume losses oldest-first, up to `limit`.
    fn use_nol(&mut self, limit: Money) -> Money {
        let mut used = Decimal::ZERO;
        while used < limit {
            let Some(front) = self.nol_vintages.front_mut() else {
                break;
            };
            let take = front.remaining.min(limit - used);
            front.remaining -= take;
            used += take;
            if front.remaining.is_zero() {
                self.nol_vintages.pop_front();
            }
        }
        used
    }
}

/// Tax outcome for one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxPeriodResult {
    pub depreciation: Money,
    /// EBITDA - depreciation - interest
    pub taxable_income: Money,
    pub nol_generated: Money,
    pub nol_used: Money,
    pub nol_expired: Money,
    pub taxable_income_after_nol: Money,
    pub tax_before_credits: Money,
    pub itc_generated: Money,
    pub ptc_generated: Money,
    pub itc_realized: Money,
    pub ptc_realized: Money,
    /// Tax before credits less credits realised (negative when credits pay out)
    pub net_tax: Money,
    pub nol_balance: Money,
    pub credit_carryforward: Money,
}

impl TaxPeriodResult {
    pub fn credits_realized(&self) -> Money {
        self.itc_realized + self.ptc_realized
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxLedger {
    pub rows: Vec<TaxPeriodResult>,
    pub final_state: TaxState,
}

/// Apply credits under the chosen monetisation. PTC is used before ITC.
fn realize_credits(
    state: &mut TaxState,
    monetization: CreditMonetization,
    tax_before_credits: Money,
    itc: Money,
    ptc: Money,
) -> (Money, Money) {
    match monetization {
        CreditMonetization::ElectivePay => (itc, ptc),
        CreditMonetization::OffsetOnly => {
            state.itc_carryforward += itc;
            state.ptc_carryforward += ptc;
            let mut capacity = tax_before_credits.max(Decimal::ZERO);

            let ptc_used = state.ptc_carryforward.min(capacity);
            state.ptc_carryforward -= ptc_used;
            capacity -= ptc_used;

            let itc_used = state.itc_carryforward.min(capacity);
            state.itc_carryforward -= itc_used;
            (itc_used, ptc_used)
        }
    }
}

/// Run the period-by-period tax computation from COD onward.
///
/// Inputs are aligned with the grid. Interest is deductible; pass zeros for
/// an unlevered run.
pub fn run_tax(
    grid: &TimeGrid,
    ebitda: &[Money],
    depreciation: &[Money],
    interest: &[Money],
    credits: &CreditPlan,
    policy: &TaxPolicy,
) -> TaxLedger {
    let mut state = TaxState::default();
    let mut rows = Vec::with_capacity(grid.len());

    for p in &grid.periods {
        if p.is_pre_cod {
            rows.push(TaxPeriodResult::default());
            continue;
        }
        let i = p.index;
        let dep = depreciation[i];
        state.cumulative_depreciation += dep;

        let taxable_income = ebitda[i] - dep - interest[i];
        let nol_expired = state.expire_nol(p.operating_year, policy.nol_carryforward_years);
        if nol_expired > Decimal::ZERO {
            log::debug!("period {i}: {nol_expired} of NOL expired unused");
        }

        let (nol_generated, nol_used, taxable_after_nol) = if taxable_income < Decimal::ZERO {
            let loss = -taxable_income;
            state.nol_vintages.push_back(NolVintage {
                origin_year: p.operating_year,
                remaining: loss,
            });
            (loss, Decimal::ZERO, Decimal::ZERO)
        } else {
            let limit = taxable_income * policy.nol_utilization_limit;
            let used = state.use_nol(limit);
            (Decimal::ZERO, used, taxable_income - used)
        };

        let tax_before_credits = taxable_after_nol * policy.combined_rate;
        let itc_generated = credits.itc[i];
        let ptc_generated = credits.ptc[i];
        let (itc_realized, ptc_realized) = realize_credits(
            &mut state,
            policy.monetization,
            tax_before_credits,
            itc_generated,
            ptc_generated,
        );
        state.cumulative_itc_claimed += itc_realized;

        rows.push(TaxPeriodResult {
            depreciation: dep,
            taxable_income,
            nol_generated,
            nol_used,
            nol_expired,
            taxable_income_after_nol: taxable_after_nol,
            tax_before_credits,
            itc_generated,
            ptc_generated,
            itc_realized,
            ptc_realized,
            net_tax: tax_before_credits - itc_realized - ptc_realized,
            nol_balance: state.nol_balance(),
            credit_carryforward: state.credit_carryforward(),
        });
    }

    TaxLedger {
        rows,
        final_state: state,
    }
}
