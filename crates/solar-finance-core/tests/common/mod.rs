#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use solar_finance_core::assumptions::*;

/// 5 MW-AC flat-price PPA: all equity, no credits, 20-year contract then
/// merchant tail.
pub fn ppa_project(price_per_mwh: Decimal) -> ProjectAssumptions {
    ProjectAssumptions {
        project_name: "Flat PPA".into(),
        commercial: CommercialTerms::Ppa(PpaTerms {
            base_price_per_mwh: price_per_mwh,
            escalator: Decimal::ZERO,
            term_years: None,
        }),
        cod_date: NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
        construction_months: 6,
        operating_years: 25,
        discount_rate: dec!(0.08),
        inflation_rate: None,
        system: SystemAssumptions {
            dc_kw: dec!(6500),
            ac_kw: dec!(5000),
            capacity_factor: dec!(0.22),
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
            line_items: vec![CapexLineItem {
                label: "EPC".into(),
                amount: dec!(3000000),
                itc_eligible: true,
                depreciable: true,
            }],
            contingency_fraction: None,
            developer_fee: DeveloperFee::None,
            developer_fee_timing: DeveloperFeeTiming::Cod,
            decommissioning_reserve: Decimal::ZERO,
            draw_schedule: None,
        },
        opex: OpexAssumptions {
            fixed_om_per_kw_year: dec!(15),
            ..Default::default()
        },
        financing: FinancingAssumptions::default(),
        exit: None,
    }
}

pub fn debt_terms(amortization: Amortization) -> DebtTerms {
    DebtTerms {
        interest_rate: dec!(0.065),
        tenor_years: 15,
        amortization: Some(amortization),
        target_dscr: Some(dec!(1.30)),
        leverage_fraction: Some(dec!(0.75)),
        upfront_fee_fraction: None,
        dsra_months: None,
        capitalize_idc: None,
        solver: SolverConfig::default(),
    }
}

pub fn levered_ppa(amortization: Amortization) -> ProjectAssumptions {
    let mut a = ppa_project(dec!(60));
    a.tax.itc = Some(ItcTerms {
        rate: dec!(0.30),
        adders: Decimal::ZERO,
        basis_reduction_fraction: None,
    });
    a.capex.line_items[0].amount = dec!(6000000);
    a.financing.debt = Some(debt_terms(amortization));
    a
}

pub fn community_solar_project() -> ProjectAssumptions {
    let mut a = ppa_project(Decimal::ZERO);
    a.project_name = "Community garden".into();
    a.commercial = CommercialTerms::CommunitySolar(CommunitySolarTerms {
        bill_credit_rate_per_kwh: dec!(0.11),
        bill_credit_escalator: dec!(0.02),
        bill_credit_schedule: None,
        subscriber_discount: None,
        target_subscription: None,
        ramp_months: None,
        annual_churn: None,
        bad_debt_rate: None,
        subscriber_accounts: Some(400),
        management_fee_per_account_month: None,
        acquisition_cost_per_subscriber: Some(dec!(100)),
    });
    a.capex.line_items[0].amount = dec!(7000000);
    a
}
