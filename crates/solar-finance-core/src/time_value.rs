use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::SolarFinanceError;
use crate::types::{MetricValue, Money, Rate};
use crate::SolarFinanceResult;

/// Monthly bracket for the IRR bisection. The lower bound keeps discount
/// factors representable over a 100-year monthly series.
const IRR_LOWER_MONTHLY: Decimal = dec!(-0.03);
const IRR_UPPER_MONTHLY: Decimal = dec!(0.5);
const IRR_TOLERANCE: Decimal = dec!(0.000000000001);
const MAX_IRR_ITERATIONS: u32 = 200;

const MONTHS_PER_YEAR: Decimal = dec!(12);

/// Convert an annual effective rate to the equivalent monthly rate:
/// (1 + r)^(1/12) - 1.
pub fn periodic_rate_from_annual(annual: Rate) -> SolarFinanceResult<Rate> {
    if annual <= dec!(-1) {
        return Err(SolarFinanceError::config(
            "rate",
            "Annual rate must be greater than -100%",
        ));
    }
    if annual.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let base = Decimal::ONE + annual;
    base.checked_powd(Decimal::ONE / MONTHS_PER_YEAR)
        .map(|f| f - Decimal::ONE)
        .ok_or_else(|| SolarFinanceError::Domain(format!("monthly rate of {annual} overflows")))
}

/// Annualise a monthly rate: (1 + m)^12 - 1.
pub fn annualize_periodic_rate(monthly: Rate) -> Option<Rate> {
    (Decimal::ONE + monthly)
        .checked_powu(12)
        .map(|f| f - Decimal::ONE)
}

/// Fisher real rate: (1 + nominal) / (1 + inflation) - 1.
pub fn real_rate(nominal: Rate, inflation: Rate) -> SolarFinanceResult<Rate> {
    let denom = Decimal::ONE + inflation;
    if denom <= Decimal::ZERO {
        return Err(SolarFinanceError::config(
            "inflation_rate",
            "Inflation must be greater than -100%",
        ));
    }
    Ok((Decimal::ONE + nominal) / denom - Decimal::ONE)
}

/// Net Present Value of a series of cash flows; the first flow is at t = 0
/// and is not discounted.
pub fn npv(rate: Rate, cash_flows: &[Money]) -> SolarFinanceResult<Money> {
    if rate <= dec!(-1) {
        return Err(SolarFinanceError::config(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }

    npv_checked(rate, cash_flows).ok_or_else(|| {
        SolarFinanceError::Domain(format!("NPV at rate {rate} overflows the decimal range"))
    })
}

fn npv_checked(rate: Rate, cash_flows: &[Money]) -> Option<Money> {
    let v = Decimal::ONE.checked_div(Decimal::ONE + rate)?;
    let mut result = Decimal::ZERO;
    let mut factor = Decimal::ONE;

    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            factor = factor.checked_mul(v)?;
        }
        result = result.checked_add(cf.checked_mul(factor)?)?;
    }

    Some(result)
}

/// Internal rate of return per period, by bisection on the NPV-zero condition.
///
/// Returns `Undefined` when the series never changes sign, or when no root
/// lies inside the search bracket. Never an error: an IRR that does not exist
/// is a legitimate outcome for a cash-flow series.
pub fn irr(cash_flows: &[Money]) -> MetricValue {
    let has_positive = cash_flows.iter().any(|cf| *cf > Decimal::ZERO);
    let has_negative = cash_flows.iter().any(|cf| *cf < Decimal::ZERO);
    if !has_positive || !has_negative {
        return MetricValue::Undefined;
    }

    let mut lo = IRR_LOWER_MONTHLY;
    let mut hi = IRR_UPPER_MONTHLY;
    let (f_lo, f_hi) = match (npv_checked(lo, cash_flows), npv_checked(hi, cash_flows)) {
        (Some(a), Some(b)) => (a, b),
        _ => return MetricValue::Undefined,
    };

    if f_lo.is_zero() {
        return MetricValue::Defined(lo);
    }
    if f_hi.is_zero() {
        return MetricValue::Defined(hi);
    }
    if f_lo.is_sign_negative() == f_hi.is_sign_negative() {
        return MetricValue::Undefined;
    }

    let lo_negative = f_lo.is_sign_negative();
    for _ in 0..MAX_IRR_ITERATIONS {
        let mid = (lo + hi) / dec!(2);
        let f_mid = match npv_checked(mid, cash_flows) {
            Some(v) => v,
            None => return MetricValue::Undefined,
        };
        if f_mid.is_zero() || (hi - lo).abs() < IRR_TOLERANCE {
            return MetricValue::Defined(mid);
        }
        if f_mid.is_sign_negative() == lo_negative {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    MetricValue::Defined((lo + hi) / dec!(2))
}

/// IRR of a monthly series, annualised as (1 + m)^12 - 1.
pub fn annual_irr_from_monthly(cash_flows: &[Money]) -> MetricValue {
    match irr(cash_flows) {
        MetricValue::Defined(m) => annualize_periodic_rate(m).into(),
        MetricValue::Undefined => MetricValue::Undefined,
    }
}

/// Present value of an ordinary annuity of 1 over `nper` periods.
pub fn annuity_factor(rate: Rate, nper: u32) -> SolarFinanceResult<Decimal> {
    if nper == 0 {
        return Err(SolarFinanceError::config("nper", "Number of periods must be > 0"));
    }
    if rate.is_zero() {
        return Ok(Decimal::from(nper));
    }

    let factor = (Decimal::ONE + rate)
        .checked_powu(u64::from(nper))
        .ok_or_else(|| SolarFinanceError::Domain("annuity factor overflow".into()))?;
    if factor.is_zero() {
        return Err(SolarFinanceError::Domain("annuity discount factor is zero".into()));
    }

    Ok((Decimal::ONE - Decimal::ONE / factor) / rate)
}

/// Compound escalation `(1 + rate)^(operating_year - 1)`; year 1 is unescalated.
pub fn escalation_factor(field: &str, rate: Rate, operating_year: u32) -> SolarFinanceResult<Decimal> {
    (Decimal::ONE + rate)
        .checked_powu(u64::from(operating_year.saturating_sub(1)))
        .ok_or_else(|| {
            SolarFinanceError::Domain(format!(
                "{field} escalation overflows in operating year {operating_year}"
            ))
        })
}

/// Payment (PMT) that amortises `present_value` over `nper` periods.
/// Positive for a positive principal.
pub fn pmt(rate: Rate, nper: u32, present_value: Money) -> SolarFinanceResult<Money> {
    let af = annuity_factor(rate, nper)?;
    if af.is_zero() {
        return Err(SolarFinanceError::Domain("PMT annuity factor is zero".into()));
    }
    Ok(present_value / af)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_escalation_factor() {
        assert_eq!(escalation_factor("price", dec!(0.02), 1).unwrap(), Decimal::ONE);
        assert_eq!(escalation_factor("price", dec!(0.02), 3).unwrap(), dec!(1.0404));
        // 2^99 exceeds the Decimal range
        let err = escalation_factor("price", dec!(1), 100).unwrap_err();
        assert!(matches!(err, SolarFinanceError::Domain(ref m) if m.contains("price")));
    }

    #[test]
    fn test_npv_basic() {
        let cfs = vec![dec!(-1000), dec!(300), dec!(400), dec!(500)];
        let result = npv(dec!(0.10), &cfs).unwrap();
        // NPV at 10%: -1000 + 300/1.1 + 400/1.21 + 500/1.331 ≈ -21.04
        assert!((result - dec!(-21.04)).abs() < dec!(0.01));
    }

    #[test]
    fn test_npv_zero_rate() {
        let cfs = vec![dec!(-100), dec!(50), dec!(50), dec!(50)];
        let result = npv(dec!(0.0), &cfs).unwrap();
        assert_eq!(result, dec!(50));
    }

    #[test]
    fn test_npv_rejects_rate_below_minus_one() {
        assert!(npv(dec!(-1), &[dec!(1)]).is_err());
    }

    #[test]
    fn test_irr_basic() {
        let cfs = vec![dec!(-1000), dec!(400), dec!(400), dec!(400)];
        let result = irr(&cfs).value().unwrap();
        // IRR should be ~9.7%
        assert!((result - dec!(0.0970)).abs() < dec!(0.001), "irr = {result}");
    }

    #[test]
    fn test_irr_undefined_without_sign_change() {
        assert_eq!(irr(&[dec!(100), dec!(50), dec!(50)]), MetricValue::Undefined);
        assert_eq!(irr(&[dec!(-100), dec!(-50)]), MetricValue::Undefined);
        assert_eq!(irr(&[]), MetricValue::Undefined);
    }

    #[test]
    fn test_irr_undefined_when_root_outside_bracket() {
        // Returns 200x in one month: monthly IRR far above the bracket.
        assert_eq!(irr(&[dec!(-1), dec!(200)]), MetricValue::Undefined);
    }

    #[test]
    fn test_monthly_annual_round_trip() {
        let m = periodic_rate_from_annual(dec!(0.08)).unwrap();
        assert!((m - dec!(0.00643403)).abs() < dec!(0.0000001), "m = {m}");
        let a = annualize_periodic_rate(m).unwrap();
        assert!((a - dec!(0.08)).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_real_rate_fisher() {
        let r = real_rate(dec!(0.08), dec!(0.025)).unwrap();
        // 1.08 / 1.025 - 1 = 0.05365853...
        assert!((r - dec!(0.0536585)).abs() < dec!(0.000001));
    }

    #[test]
    fn test_pmt_matches_annuity() {
        let payment = pmt(dec!(0.01), 12, dec!(10000)).unwrap();
        // Standard loan payment at 1% per month over 12 months ≈ 888.49
        assert!((payment - dec!(888.49)).abs() < dec!(0.01), "pmt = {payment}");
        assert_eq!(pmt(Decimal::ZERO, 10, dec!(1000)).unwrap(), dec!(100));
    }
}
