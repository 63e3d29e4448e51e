use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::DebtPolicy;
use crate::assumptions::Amortization;
use crate::error::SolarFinanceError;
use crate::time_value::{annuity_factor, pmt};
use crate::types::Money;
use crate::SolarFinanceResult;

/// Which sizing constraint set the principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingConstraint {
    Dscr,
    Leverage,
}

/// Outcome of one sizing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtSizing {
    pub principal: Money,
    pub dscr_principal: Option<Money>,
    pub leverage_principal: Option<Money>,
    pub binding: BindingConstraint,
    /// Scheduled debt service for each tenor month (index 0 = COD month)
    pub debt_service: Vec<Money>,
}

/// Size the principal from tenor-window CFADS and the cost cap.
///
/// DSCR sizing: level debt service is the average tenor CFADS over the
/// target, capitalised as an annuity; sculpted debt service is each month's
/// CFADS over the target, capitalised month by month. The smaller of the
/// DSCR and leverage principals binds. When leverage binds under sculpting
/// the profile is scaled down so it still retires the smaller principal.
pub fn size_debt(
    policy: &DebtPolicy,
    tenor_cfads: &[Money],
    cost_before_financing: Money,
) -> SolarFinanceResult<DebtSizing> {
    let tenor = policy.tenor_months as usize;
    if tenor_cfads.len() != tenor {
        return Err(SolarFinanceError::Domain(format!(
            "sizing expects {tenor} months of CFADS, got {}",
            tenor_cfads.len()
        )));
    }
    let r = policy.monthly_rate;

    // ── DSCR constraint ──
    let dscr_sized = match policy.target_dscr {
        Some(target) => {
            let profile: Vec<Money> = match policy.amortization {
                Amortization::Level => {
                    let avg = tenor_cfads.iter().copied().sum::<Money>() / Decimal::from(tenor);
                    vec![(avg / target).max(Decimal::ZERO); tenor]
                }
                Amortization::Sculpted => tenor_cfads
                    .iter()
                    .map(|c| (*c / target).max(Decimal::ZERO))
                    .collect(),
            };
            let principal = match policy.amortization {
                Amortization::Level => profile[0] * annuity_factor(r, policy.tenor_months)?,
                Amortization::Sculpted => present_value(r, &profile),
            };
            Some((principal, profile))
        }
        None => None,
    };

    let leverage_principal = policy
        .leverage_fraction
        .map(|f| (f * cost_before_financing).max(Decimal::ZERO));

    let (principal, binding) = match (&dscr_sized, leverage_principal) {
        (Some((d, _)), Some(l)) if l < *d => (l, BindingConstraint::Leverage),
        (Some((d, _)), _) => (*d, BindingConstraint::Dscr),
        (None, Some(l)) => (l, BindingConstraint::Leverage),
        (None, None) => {
            return Err(SolarFinanceError::config(
                "financing.debt",
                "either target_dscr or leverage_fraction is required",
            ))
        }
    };

    let debt_service = match (policy.amortization, &dscr_sized) {
        (Amortization::Sculpted, Some((dscr_principal, profile))) => {
            if dscr_principal.is_zero() {
                vec![Decimal::ZERO; tenor]
            } else {
                let scale = principal / *dscr_principal;
                profile.iter().map(|ds| *ds * scale).collect()
            }
        }
        // Sculpting without a DSCR target has no CFADS shape: fall back to
        // a level profile on the leverage principal.
        _ => {
            vec![pmt(r, policy.tenor_months, principal)?; tenor]
        }
    };

    Ok(DebtSizing {
        principal,
        dscr_principal: dscr_sized.map(|(p, _)| p),
        leverage_principal,
        binding,
        debt_service,
    })
}

/// PV at the start of month 1 of payments made at the end of months 1..=n.
fn present_value(rate: Decimal, payments: &[Money]) -> Money {
    let v = Decimal::ONE / (Decimal::ONE + rate);
    let mut factor = Decimal::ONE;
    let mut pv = Decimal::ZERO;
    for p in payments {
        factor *= v;
        pv += *p * factor;
    }
    pv
}
