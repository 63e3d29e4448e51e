use chrono::{Datelike, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::SolarFinanceError;
use crate::SolarFinanceResult;

/// Longest horizon the calendar arithmetic is asked to cover.
pub const MAX_HORIZON_MONTHS: u32 = 100 * 12;

/// One month of the model grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    /// 0-based position on the grid
    pub index: usize,
    /// First day of the calendar month
    pub date: NaiveDate,
    /// 0 before COD, 1-based afterwards
    pub operating_year: u32,
    /// 0 before COD, 1-based afterwards (1 = COD month)
    pub operating_month: u32,
    pub is_pre_cod: bool,
}

impl Period {
    /// Calendar month, 1 = January.
    pub fn calendar_month(&self) -> u32 {
        self.date.month()
    }

    pub fn days_in_month(&self) -> u32 {
        days_in_month(self.date)
    }

    pub fn hours(&self) -> Decimal {
        Decimal::from(self.days_in_month() * 24)
    }

    /// Month within the current operating year, 1..=12 (0 before COD).
    pub fn month_of_operating_year(&self) -> u32 {
        if self.is_pre_cod {
            0
        } else {
            (self.operating_month - 1) % 12 + 1
        }
    }
}

/// Contiguous monthly grid from NTP through the end of operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeGrid {
    pub periods: Vec<Period>,
    pub ntp_date: NaiveDate,
    pub cod_date: NaiveDate,
    /// Index of the COD month (also the number of pre-COD periods)
    pub cod_index: usize,
    pub operating_years: u32,
}

impl TimeGrid {
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Financial close: the last pre-COD period, when there is one.
    pub fn close_index(&self) -> Option<usize> {
        self.cod_index.checked_sub(1)
    }

    pub fn operating_periods(&self) -> &[Period] {
        &self.periods[self.cod_index..]
    }
}

fn days_in_month(first: NaiveDate) -> u32 {
    let next = first
        .checked_add_months(Months::new(1))
        .unwrap_or(first);
    u32::try_from((next - first).num_days()).unwrap_or(31)
}

/// Build the monthly grid: `construction_months` pre-COD periods followed by
/// `12 × operating_years` operating periods. Dates are normalised to the
/// first of the month; NTP is COD month minus `construction_months`.
pub fn build_time_grid(
    cod_date: NaiveDate,
    construction_months: u32,
    operating_years: u32,
) -> SolarFinanceResult<TimeGrid> {
    if operating_years == 0 {
        return Err(SolarFinanceError::config(
            "operating_years",
            "must be greater than zero",
        ));
    }
    let operating_months = operating_years.checked_mul(12).unwrap_or(u32::MAX);
    let total = construction_months.saturating_add(operating_months);
    if total > MAX_HORIZON_MONTHS {
        return Err(SolarFinanceError::config(
            "operating_years",
            format!("horizon of {total} months exceeds the {MAX_HORIZON_MONTHS}-month limit"),
        ));
    }

    let cod_month = cod_date
        .with_day(1)
        .ok_or_else(|| SolarFinanceError::config("cod_date", "cannot normalise to month start"))?;
    let ntp_date = cod_month
        .checked_sub_months(Months::new(construction_months))
        .ok_or_else(|| SolarFinanceError::config("construction_months", "NTP date out of range"))?;

    let mut periods = Vec::with_capacity(total as usize);
    for i in 0..total {
        let date = ntp_date
            .checked_add_months(Months::new(i))
            .ok_or_else(|| SolarFinanceError::config("operating_years", "period date out of range"))?;
        let is_pre_cod = i < construction_months;
        let (operating_year, operating_month) = if is_pre_cod {
            (0, 0)
        } else {
            let m = i - construction_months;
            (m / 12 + 1, m + 1)
        };
        periods.push(Period {
            index: i as usize,
            date,
            operating_year,
            operating_month,
            is_pre_cod,
        });
    }

    Ok(TimeGrid {
        periods,
        ntp_date,
        cod_date: cod_month,
        cod_index: construction_months as usize,
        operating_years,
    })
}
