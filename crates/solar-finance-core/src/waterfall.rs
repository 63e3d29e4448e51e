use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::costs::{CapexSchedule, OpexSchedule};
use crate::debt::{forward_debt_service, DebtSchedule, ReserveAccounts, ReserveMovement, ReserveTargets};
use crate::energy::EnergySeries;
use crate::revenue::{GrantSchedule, RevenueLedger};
use crate::tax::TaxLedger;
use crate::timeline::TimeGrid;
use crate::types::{Energy, Money};

/// One period of the cash-flow waterfall.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub index: usize,
    pub date: NaiveDate,
    pub operating_year: u32,
    pub is_pre_cod: bool,
    pub energy_kwh: Energy,

    // ── Operations ──
    pub revenue: Money,
    pub opex: Money,
    pub ebitda: Money,

    // ── Tax ──
    pub depreciation: Money,
    pub interest: Money,
    pub taxable_income: Money,
    pub nol_used: Money,
    pub nol_balance: Money,
    pub tax_before_credits: Money,
    pub itc_realized: Money,
    pub ptc_realized: Money,
    pub net_tax: Money,
    pub after_tax_operating_cash: Money,
    pub cfads: Money,

    // ── Capital and financing ──
    pub capex: Money,
    pub idc: Money,
    pub financing_fees: Money,
    pub debt_draw: Money,
    pub grant: Money,
    pub principal: Money,
    pub debt_service: Money,
    pub debt_balance: Money,
    pub dscr: Option<Decimal>,

    // ── Reserves ──
    pub dsra_funding: Money,
    pub dsra_draw: Money,
    pub dsra_release: Money,
    pub dsra_balance: Money,
    pub om_reserve_funding: Money,
    pub om_reserve_draw: Money,
    pub om_reserve_release: Money,
    pub om_reserve_balance: Money,
    pub deficiency: Money,
    pub deficiency_flag: bool,

    // ── Cash to investors ──
    pub terminal_value: Money,
    pub fcfe: Money,
    pub project_cash_flow_pre_tax: Money,
    pub project_cash_flow_after_tax: Money,
}

/// Immutable, chronologically ordered waterfall; one row per period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashflowLedger {
    rows: Vec<LedgerRow>,
}

impl CashflowLedger {
    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, f: impl Fn(&LedgerRow) -> Money) -> Vec<Money> {
        self.rows.iter().map(f).collect()
    }

    pub fn total(&self, f: impl Fn(&LedgerRow) -> Money) -> Money {
        self.rows.iter().map(f).sum()
    }

    pub fn operating_rows(&self) -> impl Iterator<Item = &LedgerRow> {
        self.rows.iter().filter(|r| !r.is_pre_cod)
    }
}

/// Everything the assembler reads. All series are aligned with the grid.
pub struct WaterfallInputs<'a> {
    pub grid: &'a TimeGrid,
    pub energy: &'a EnergySeries,
    pub revenue: &'a RevenueLedger,
    pub opex: &'a OpexSchedule,
    pub capex: &'a CapexSchedule,
    pub debt: &'a DebtSchedule,
    pub tax: &'a TaxLedger,
    /// Interest-free tax run for unlevered project cash flows
    pub unlevered_tax: &'a TaxLedger,
    pub grant: Option<&'a GrantSchedule>,
    pub dsra_months: u32,
    pub om_reserve_target: Money,
    pub terminal_value: Money,
}

fn merge(a: ReserveMovement, b: ReserveMovement) -> ReserveMovement {
    ReserveMovement {
        om_draw: a.om_draw + b.om_draw,
        dsra_draw: a.dsra_draw + b.dsra_draw,
        dsra_funding: a.dsra_funding + b.dsra_funding,
        om_funding: a.om_funding + b.om_funding,
        dsra_release: a.dsra_release + b.dsra_release,
        om_release: a.om_release + b.om_release,
        deficiency: a.deficiency + b.deficiency,
    }
}

/// Walk the periods in order and assemble the ledger.
///
/// Revenue - OpEx = EBITDA; EBITDA - depreciation - interest = taxable
/// income; CFADS = EBITDA - tax before credits + PTC realised. FCFE takes
/// CFADS less debt service, plus ITC realised, grants, reserve movements and
/// terminal value; before COD it is construction spend, IDC, fees and
/// reserve funding net of debt draws and grants.
pub fn assemble_ledger(inputs: &WaterfallInputs<'_>) -> CashflowLedger {
    let grid = inputs.grid;
    let debt = inputs.debt;
    let last_index = grid.len().saturating_sub(1);
    let close = grid.close_index();
    let debt_service: Vec<Money> = debt.rows.iter().map(|r| r.debt_service).collect();

    let mut reserves = ReserveAccounts::default();
    let mut rows = Vec::with_capacity(grid.len());

    for p in &grid.periods {
        let i = p.index;
        let revenue = inputs.revenue.total(i);
        let opex = inputs.opex.total(i);
        let ebitda = revenue - opex;
        let tax = inputs.tax.rows[i];
        let unlevered = inputs.unlevered_tax.rows[i];
        let d = debt.rows[i];

        let cfads = if p.is_pre_cod {
            Decimal::ZERO
        } else {
            ebitda - tax.tax_before_credits + tax.ptc_realized
        };

        let grant = inputs
            .grant
            .filter(|g| g.period_index == i)
            .map(|g| g.amount)
            .unwrap_or(Decimal::ZERO);
        let capex = inputs.capex.total_at(i);
        let terminal_value = if i == last_index {
            inputs.terminal_value
        } else {
            Decimal::ZERO
        };

        // ── Reserves ──
        let mut movement = ReserveMovement::default();
        if Some(i) == close {
            let dsra = if debt.has_debt() {
                forward_debt_service(&debt_service, i, inputs.dsra_months)
            } else {
                Decimal::ZERO
            };
            movement = reserves.fund(ReserveTargets {
                dsra,
                om: inputs.om_reserve_target,
            });
        }
        if !p.is_pre_cod {
            let dsra_target = match debt.maturity_index {
                Some(m) if i < m => forward_debt_service(&debt_service, i, inputs.dsra_months),
                _ => Decimal::ZERO,
            };
            let om_target = if i == last_index {
                Decimal::ZERO
            } else {
                inputs.om_reserve_target
            };
            let step = reserves.step(
                ebitda,
                cfads,
                d.debt_service,
                ReserveTargets {
                    dsra: dsra_target,
                    om: om_target,
                },
            );
            movement = merge(movement, step);
        }

        let financing_fees = if Some(i) == close { debt.upfront_fee } else { Decimal::ZERO };

        let fcfe = if p.is_pre_cod {
            -capex - d.idc - financing_fees + d.draw + grant + movement.net_to_equity()
        } else {
            cfads - d.debt_service + tax.itc_realized + grant + movement.net_to_equity()
                + terminal_value
        };

        let project_pre_tax = ebitda - capex + grant + terminal_value;
        let project_after_tax = project_pre_tax - unlevered.net_tax;

        let dscr = if d.debt_service > Decimal::ZERO {
            Some(cfads / d.debt_service)
        } else {
            None
        };

        rows.push(LedgerRow {
            index: i,
            date: p.date,
            operating_year: p.operating_year,
            is_pre_cod: p.is_pre_cod,
            energy_kwh: inputs.energy.kwh[i],
            revenue,
            opex,
            ebitda,
            depreciation: tax.depreciation,
            interest: d.interest,
            taxable_income: tax.taxable_income,
            nol_used: tax.nol_used,
            nol_balance: tax.nol_balance,
            tax_before_credits: tax.tax_before_credits,
            itc_realized: tax.itc_realized,
            ptc_realized: tax.ptc_realized,
            net_tax: tax.net_tax,
            after_tax_operating_cash: tax.taxable_income - tax.tax_before_credits
                + tax.credits_realized(),
            cfads,
            capex,
            idc: d.idc,
            financing_fees,
            debt_draw: d.draw,
            grant,
            principal: d.principal,
            debt_service: d.debt_service,
            debt_balance: d.closing_balance,
            dscr,
            dsra_funding: movement.dsra_funding,
            dsra_draw: movement.dsra_draw,
            dsra_release: movement.dsra_release,
            dsra_balance: reserves.dsra_balance,
            om_reserve_funding: movement.om_funding,
            om_reserve_draw: movement.om_draw,
            om_reserve_release: movement.om_release,
            om_reserve_balance: reserves.om_balance,
            deficiency: movement.deficiency,
            deficiency_flag: movement.is_deficient(),
            terminal_value,
            fcfe,
            project_cash_flow_pre_tax: project_pre_tax,
            project_cash_flow_after_tax: project_after_tax,
        });
    }

    CashflowLedger { rows }
}
