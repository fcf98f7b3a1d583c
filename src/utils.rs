use crate::error::{AnalyticsError, Result};
use crate::schema::{Granularity, Period, TimeWindow};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};

pub fn first_day_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        AnalyticsError::InvalidWindow(format!("No such month: {:04}-{:02}", year, month))
    })
}

pub fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate> {
    let first = first_day_of_month(year, month)?;
    let (next_year, next_month) = shift_month(first.year(), first.month(), 1);

    first_day_of_month(next_year, next_month)?
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| {
            AnalyticsError::InvalidWindow(format!("No such month: {:04}-{:02}", year, month))
        })
}

/// Moves `(year, month)` by `delta` calendar months in either direction.
/// `year` must come from a valid `NaiveDate`; use [`first_day_of_month`] to
/// check caller-supplied years first.
pub fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let zero_based = year * 12 + month as i32 - 1 + delta;
    (zero_based.div_euclid(12), zero_based.rem_euclid(12) as u32 + 1)
}

pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let year_diff = end.year() - start.year();
    let month_diff = end.month() as i32 - start.month() as i32;
    year_diff * 12 + month_diff
}

/// First month of the calendar quarter containing `month`.
pub fn quarter_start_month(month: u32) -> u32 {
    ((month - 1) / 3) * 3 + 1
}

pub fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

/// Every calendar unit the window touches, in chronological order.
pub fn periods_in_window(window: &TimeWindow, granularity: Granularity) -> Vec<Period> {
    let first = window.first_day();
    let last = window.last_day();

    match granularity {
        Granularity::Day => first
            .iter_days()
            .take_while(|d| *d <= last)
            .map(Period::Day)
            .collect(),
        Granularity::Month => (0..=months_between(first, last))
            .map(|offset| {
                let (year, month) = shift_month(first.year(), first.month(), offset);
                Period::Month { year, month }
            })
            .collect(),
    }
}

/// True when the window starts on the first of a month and ends on the
/// first of a (later) month.
pub fn is_month_aligned(window: &TimeWindow) -> bool {
    let start = window.start;
    let end = window.end;
    start.day() == 1
        && end.day() == 1
        && start.time() == chrono::NaiveTime::MIN
        && end.time() == chrono::NaiveTime::MIN
        && end > start
}
