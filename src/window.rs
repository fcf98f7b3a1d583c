//! Turns a named date range into concrete current and previous windows.
//!
//! All windows are half-open. The previous window ends exactly where the
//! current one starts, so the two never share an instant.

use crate::error::{AnalyticsError, Result};
use crate::schema::{Granularity, TimeWindow};
use crate::utils::{
    first_day_of_month, is_month_aligned, midnight, months_between, quarter_start_month,
    shift_month,
};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RangePreset {
    #[serde(rename = "this-year")]
    ThisYear,
    #[serde(rename = "last-year")]
    LastYear,
    #[serde(rename = "last-6-months")]
    Last6Months,
    #[serde(rename = "last-3-months")]
    Last3Months,
    #[serde(rename = "this-quarter")]
    ThisQuarter,
    #[serde(rename = "custom")]
    Custom,
    #[serde(rename = "current-month")]
    CurrentMonth,
    #[serde(rename = "last-month")]
    LastMonth,
    #[serde(rename = "month-select")]
    MonthSelect,
}

impl RangePreset {
    pub fn is_single_month(&self) -> bool {
        matches!(
            self,
            RangePreset::CurrentMonth | RangePreset::LastMonth | RangePreset::MonthSelect
        )
    }
}

impl FromStr for RangePreset {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "this-year" => Ok(RangePreset::ThisYear),
            "last-year" => Ok(RangePreset::LastYear),
            "last-6-months" => Ok(RangePreset::Last6Months),
            "last-3-months" => Ok(RangePreset::Last3Months),
            "this-quarter" => Ok(RangePreset::ThisQuarter),
            "custom" => Ok(RangePreset::Custom),
            "current-month" => Ok(RangePreset::CurrentMonth),
            "last-month" => Ok(RangePreset::LastMonth),
            "month-select" => Ok(RangePreset::MonthSelect),
            other => Err(AnalyticsError::InvalidWindow(format!(
                "Unknown range preset '{}'",
                other
            ))),
        }
    }
}

/// How the comparison window is derived from the current one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonMode {
    /// The immediately preceding span of identical duration.
    #[default]
    DurationMatched,

    /// The same number of calendar months, shifted back. Windows that do not
    /// start and end on a month boundary use the duration-matched rule.
    CalendarAligned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WindowRequest {
    pub preset: RangePreset,
    /// Used by `month-select`.
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
    /// Inclusive start day of a `custom` range.
    #[serde(default)]
    pub custom_start: Option<NaiveDate>,
    /// Exclusive end day of a `custom` range.
    #[serde(default)]
    pub custom_end: Option<NaiveDate>,
}

impl WindowRequest {
    pub fn preset(preset: RangePreset) -> Self {
        Self {
            preset,
            year: None,
            month: None,
            custom_start: None,
            custom_end: None,
        }
    }

    pub fn month(year: i32, month: u32) -> Self {
        Self {
            year: Some(year),
            month: Some(month),
            ..Self::preset(RangePreset::MonthSelect)
        }
    }

    pub fn custom(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            custom_start: Some(start),
            custom_end: Some(end),
            ..Self::preset(RangePreset::Custom)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ResolvedWindows {
    pub current: TimeWindow,
    pub previous: TimeWindow,
    pub granularity: Granularity,
    pub comparison: ComparisonMode,
}

pub fn resolve(request: &WindowRequest, now: NaiveDateTime) -> Result<ResolvedWindows> {
    resolve_with_mode(request, now, ComparisonMode::DurationMatched)
}

pub fn resolve_with_mode(
    request: &WindowRequest,
    now: NaiveDateTime,
    comparison: ComparisonMode,
) -> Result<ResolvedWindows> {
    let current = current_window(request, now)?;
    let previous = previous_window(&current, comparison)?;

    let granularity = if request.preset.is_single_month() {
        Granularity::Day
    } else {
        Granularity::Month
    };

    debug!(
        "Resolved {:?}: current [{}, {}), previous [{}, {})",
        request.preset, current.start, current.end, previous.start, previous.end
    );

    Ok(ResolvedWindows {
        current,
        previous,
        granularity,
        comparison,
    })
}

fn current_window(request: &WindowRequest, now: NaiveDateTime) -> Result<TimeWindow> {
    let today = now.date();

    match request.preset {
        RangePreset::ThisYear => year_window(today.year()),
        RangePreset::LastYear => year_window(today.year() - 1),
        RangePreset::Last6Months => rolling_months(today, 6),
        RangePreset::Last3Months => rolling_months(today, 3),
        RangePreset::ThisQuarter => {
            let start_month = quarter_start_month(today.month());
            months_window(today.year(), start_month, 3)
        }
        RangePreset::CurrentMonth => months_window(today.year(), today.month(), 1),
        RangePreset::LastMonth => {
            let (year, month) = shift_month(today.year(), today.month(), -1);
            months_window(year, month, 1)
        }
        RangePreset::MonthSelect => {
            let year = request.year.unwrap_or(today.year());
            let month = request.month.unwrap_or(today.month());
            if !(1..=12).contains(&month) {
                return Err(AnalyticsError::InvalidWindow(format!(
                    "Month {} is outside 1..=12",
                    month
                )));
            }
            months_window(year, month, 1)
        }
        RangePreset::Custom => match (request.custom_start, request.custom_end) {
            (Some(start), Some(end)) => {
                if start > end {
                    return Err(AnalyticsError::InvalidWindow(format!(
                        "Custom range start {} is after end {}",
                        start, end
                    )));
                }
                Ok(TimeWindow {
                    start: midnight(start),
                    end: midnight(end),
                })
            }
            _ => {
                debug!("Custom range without both bounds, falling back to this-year");
                year_window(today.year())
            }
        },
    }
}

fn year_window(year: i32) -> Result<TimeWindow> {
    months_window(year, 1, 12)
}

/// `count` whole months ending with the month that contains `today`.
fn rolling_months(today: NaiveDate, count: i32) -> Result<TimeWindow> {
    let (year, month) = shift_month(today.year(), today.month(), -(count - 1));
    months_window(year, month, count)
}

fn months_window(year: i32, month: u32, count: i32) -> Result<TimeWindow> {
    let start = first_day_of_month(year, month)?;
    let (end_year, end_month) = shift_month(start.year(), start.month(), count);
    Ok(TimeWindow {
        start: midnight(start),
        end: midnight(first_day_of_month(end_year, end_month)?),
    })
}

pub fn previous_window(current: &TimeWindow, comparison: ComparisonMode) -> Result<TimeWindow> {
    if current.start > current.end {
        return Err(AnalyticsError::InvalidWindow(format!(
            "Window start {} is after end {}",
            current.start, current.end
        )));
    }

    match comparison {
        ComparisonMode::CalendarAligned if is_month_aligned(current) => {
            let start = current.start.date();
            let span = months_between(start, current.end.date());
            let (year, month) = shift_month(start.year(), start.month(), -span);
            Ok(TimeWindow {
                start: midnight(first_day_of_month(year, month)?),
                end: current.start,
            })
        }
        _ => Ok(TimeWindow {
            start: current.start - current.duration(),
            end: current.start,
        }),
    }
}
