use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Money;

/// Reserve balances carried through the operating periods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReserveAccounts {
    pub dsra_balance: Money,
    pub om_balance: Money,
}

/// Reserve activity in one period. Inflows to equity are positive
/// (draws, releases); outflows are positive funding amounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReserveMovement {
    pub om_draw: Money,
    pub dsra_draw: Money,
    pub dsra_funding: Money,
    pub om_funding: Money,
    pub dsra_release: Money,
    pub om_release: Money,
    /// Debt service left unpaid after every reserve was drawn
    pub deficiency: Money,
}

impl ReserveMovement {
    /// Net cash released to (+) or retained from (-) equity.
    pub fn net_to_equity(&self) -> Money {
        self.om_draw + self.dsra_draw + self.dsra_release + self.om_release
            - self.dsra_funding
            - self.om_funding
    }

    pub fn is_deficient(&self) -> bool {
        self.deficiency > Decimal::ZERO
    }
}

/// Targets applying in one operating period.
#[derive(Debug, Clone, Copy)]
pub struct ReserveTargets {
    pub dsra: Money,
    pub om: Money,
}

/// Sum of scheduled debt service over the `months` periods after `index`.
pub fn forward_debt_service(debt_service: &[Money], index: usize, months: u32) -> Money {
    debt_service
        .iter()
        .skip(index + 1)
        .take(months as usize)
        .copied()
        .sum()
}

impl ReserveAccounts {
    /// Initial funding at financial close.
    pub fn fund(&mut self, targets: ReserveTargets) -> ReserveMovement {
        let dsra_funding = (targets.dsra - self.dsra_balance).max(Decimal::ZERO);
        let om_funding = (targets.om - self.om_balance).max(Decimal::ZERO);
        self.dsra_balance += dsra_funding;
        self.om_balance += om_funding;
        ReserveMovement {
            dsra_funding,
            om_funding,
            ..Default::default()
        }
    }

    /// One operating period.
    ///
    /// The O&M reserve covers negative EBITDA; the DSRA covers the remaining
    /// debt-service shortfall. Whatever neither covers is a deficiency.
    /// Surplus cash tops up the DSRA and then the O&M reserve; balances above
    /// target are released.
    pub fn step(
        &mut self,
        ebitda: Money,
        cfads: Money,
        debt_service: Money,
        targets: ReserveTargets,
    ) -> ReserveMovement {
        let mut m = ReserveMovement::default();

        if ebitda < Decimal::ZERO {
            m.om_draw = (-ebitda).min(self.om_balance);
            self.om_balance -= m.om_draw;
        }

        let available = cfads + m.om_draw;
        if available < debt_service {
            let shortfall = debt_service - available;
            m.dsra_draw = shortfall.min(self.dsra_balance);
            self.dsra_balance -= m.dsra_draw;
            m.deficiency = shortfall - m.dsra_draw;
        } else {
            let mut surplus = available - debt_service;
            m.dsra_funding = (targets.dsra - self.dsra_balance).max(Decimal::ZERO).min(surplus);
            self.dsra_balance += m.dsra_funding;
            surplus -= m.dsra_funding;
            m.om_funding = (targets.om - self.om_balance).max(Decimal::ZERO).min(surplus);
            self.om_balance += m.om_funding;
        }

        if self.dsra_balance > targets.dsra {
            m.dsra_release = self.dsra_balance - targets.dsra.max(Decimal::ZERO);
            self.dsra_balance -= m.dsra_release;
        }
        if self.om_balance > targets.om {
            m.om_release = self.om_balance - targets.om.max(Decimal::ZERO);
            self.om_balance -= m.om_release;
        }

        m
    }
}
