use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::sizing::{BindingConstraint, DebtSizing};
use super::DebtPolicy;
use crate::assumptions::Amortization;
use crate::timeline::TimeGrid;
use crate::types::Money;

/// Debt activity in one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DebtPeriod {
    pub opening_balance: Money,
    pub draw: Money,
    /// Interest during construction (pre-COD only)
    pub idc: Money,
    pub interest: Money,
    /// Negative when sculpted service falls short of interest and the
    /// difference is capitalised
    pub principal: Money,
    pub debt_service: Money,
    pub closing_balance: Money,
}

/// Principal fixed at close with its per-period schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtSchedule {
    pub principal: Money,
    pub binding: Option<BindingConstraint>,
    pub upfront_fee: Money,
    pub rows: Vec<DebtPeriod>,
    /// Grid index of the final tenor month
    pub maturity_index: Option<usize>,
}

impl DebtSchedule {
    /// All-equity schedule.
    pub fn none(grid: &TimeGrid) -> Self {
        DebtSchedule {
            principal: Decimal::ZERO,
            binding: None,
            upfront_fee: Decimal::ZERO,
            rows: vec![DebtPeriod::default(); grid.len()],
            maturity_index: None,
        }
    }

    pub fn has_debt(&self) -> bool {
        self.principal > Decimal::ZERO
    }

    pub fn interest(&self) -> Vec<Money> {
        self.rows.iter().map(|r| r.interest).collect()
    }

    pub fn total_idc(&self) -> Money {
        self.rows.iter().map(|r| r.idc).sum()
    }

    pub fn debt_service(&self, index: usize) -> Money {
        self.rows.get(index).map(|r| r.debt_service).unwrap_or(Decimal::ZERO)
    }
}

/// Lay out draws, construction interest and repayment for a sized principal.
///
/// Draws follow the construction spend profile. Repayment starts in the COD
/// month; interest accrues monthly on the opening balance and the last tenor
/// month retires whatever balance remains.
pub fn build_debt_schedule(
    grid: &TimeGrid,
    policy: &DebtPolicy,
    sizing: &DebtSizing,
    construction_spend: &[Money],
) -> DebtSchedule {
    let n = grid.len();
    let r = policy.monthly_rate;
    let principal = sizing.principal;
    let mut rows = vec![DebtPeriod::default(); n];

    if principal <= Decimal::ZERO {
        return DebtSchedule {
            principal: Decimal::ZERO,
            binding: Some(sizing.binding),
            ..DebtSchedule::none(grid)
        };
    }

    // ── Construction draws ──
    let cod = grid.cod_index;
    let spend_total: Money = construction_spend[..cod].iter().copied().sum();
    let mut balance = Decimal::ZERO;
    let mut drawn = Decimal::ZERO;
    for i in 0..cod {
        let draw = if i + 1 == cod {
            principal - drawn
        } else if spend_total.is_zero() {
            Decimal::ZERO
        } else {
            principal * construction_spend[i] / spend_total
        };
        drawn += draw;
        let opening = balance;
        balance += draw;
        rows[i] = DebtPeriod {
            opening_balance: opening,
            draw,
            idc: balance * r,
            closing_balance: balance,
            ..Default::default()
        };
    }

    // A COD-month start has no construction period to draw in.
    if cod == 0 {
        balance = principal;
    }

    // ── Repayment ──
    let tenor = sizing.debt_service.len();
    let maturity = cod + tenor - 1;
    for (k, scheduled) in sizing.debt_service.iter().enumerate() {
        let i = cod + k;
        let opening = balance;
        let interest = opening * r;
        let principal_paid = if i == maturity {
            opening
        } else {
            match policy.amortization {
                Amortization::Level => (*scheduled - interest).max(Decimal::ZERO).min(opening),
                // Pay the sized profile exactly; a month that cannot cover
                // interest capitalises the unpaid part.
                Amortization::Sculpted => *scheduled - interest,
            }
        };
        balance = opening - principal_paid;
        rows[i] = DebtPeriod {
            opening_balance: opening,
            draw: if cod == 0 && k == 0 { principal } else { Decimal::ZERO },
            interest,
            principal: principal_paid,
            debt_service: interest + principal_paid,
            closing_balance: balance,
            ..Default::default()
        };
    }

    DebtSchedule {
        principal,
        binding: Some(sizing.binding),
        upfront_fee: principal * policy.upfront_fee_fraction,
        rows,
        maturity_index: Some(maturity),
    }
}
