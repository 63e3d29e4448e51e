use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::assumptions::{check_fraction, check_non_negative, check_rate, TaxAssumptions};
use crate::energy::EnergySeries;
use crate::error::SolarFinanceError;
use crate::time_value::escalation_factor;
use crate::timeline::TimeGrid;
use crate::types::{AuditTrail, Money, Rate};
use crate::SolarFinanceResult;

/// Cost basis inputs that vary with financing (capitalised IDC) and grants.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasisInputs {
    pub itc_eligible_cost: Money,
    pub depreciable_cost: Money,
    pub capitalized_idc: Money,
    /// Grant amount excluded from the ITC basis
    pub grant_reduction: Money,
}

/// Investment and production tax credits placed on the grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditPlan {
    pub itc_basis: Money,
    /// Base rate plus adders
    pub itc_rate: Rate,
    pub itc_amount: Money,
    /// Reduction of depreciable basis caused by the ITC
    pub basis_reduction: Money,
    /// Depreciable basis after the ITC reduction
    pub depreciable_basis: Money,
    pub itc: Vec<Money>,
    pub ptc: Vec<Money>,
}

impl CreditPlan {
    pub fn ptc_total(&self) -> Money {
        self.ptc.iter().copied().sum()
    }
}

/// Enforce ITC/PTC exclusivity unless the combination is explicitly allowed.
pub fn check_credit_elections(tax: &TaxAssumptions) -> SolarFinanceResult<()> {
    if tax.itc.is_some() && tax.ptc.is_some() && !tax.allow_combined_credits {
        return Err(SolarFinanceError::config(
            "tax.ptc",
            "ITC and PTC are mutually exclusive unless allow_combined_credits is set",
        ));
    }
    Ok(())
}

pub fn build_credit_plan(
    grid: &TimeGrid,
    energy: &EnergySeries,
    tax: &TaxAssumptions,
    basis: BasisInputs,
    audit: &mut AuditTrail,
) -> SolarFinanceResult<CreditPlan> {
    check_credit_elections(tax)?;
    let n = grid.len();

    // ── ITC ──
    let itc_basis = (basis.itc_eligible_cost + basis.capitalized_idc - basis.grant_reduction)
        .max(Decimal::ZERO);
    let mut itc = vec![Decimal::ZERO; n];
    let (itc_rate, itc_amount, basis_reduction) = match &tax.itc {
        Some(terms) => {
            let rate = terms.rate + terms.adders;
            check_fraction("tax.itc.rate", rate)?;
            let reduction_fraction = audit.resolve(
                "tax.itc.basis_reduction_fraction",
                terms.basis_reduction_fraction,
                dec!(0.5),
            );
            check_fraction("tax.itc.basis_reduction_fraction", reduction_fraction)?;
            let amount = itc_basis * rate;
            itc[grid.cod_index] = amount;
            (rate, amount, amount * reduction_fraction)
        }
        None => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
    };

    let depreciable_basis = basis.depreciable_cost + basis.capitalized_idc - basis_reduction;
    if depreciable_basis < Decimal::ZERO {
        return Err(SolarFinanceError::Domain(format!(
            "depreciable basis after ITC reduction is negative ({depreciable_basis})"
        )));
    }

    // ── PTC ──
    let ptc = match &tax.ptc {
        Some(terms) => {
            check_non_negative("tax.ptc.rate_per_mwh", terms.rate_per_mwh)?;
            check_rate("tax.ptc.escalator", terms.escalator)?;
            let term_years = audit.resolve("tax.ptc.term_years", terms.term_years, 10);
            grid.periods
                .iter()
                .map(|p| {
                    if p.is_pre_cod || p.operating_year > term_years {
                        return Ok(Decimal::ZERO);
                    }
                    let esc = escalation_factor("tax.ptc.escalator", terms.escalator, p.operating_year)?;
                    Ok(energy.mwh(p.index) * terms.rate_per_mwh * esc)
                })
                .collect::<SolarFinanceResult<Vec<_>>>()?
        }
        None => vec![Decimal::ZERO; n],
    };

    Ok(CreditPlan {
        itc_basis,
        itc_rate,
        itc_amount,
        basis_reduction,
        depreciable_basis,
        itc,
        ptc,
    })
}
