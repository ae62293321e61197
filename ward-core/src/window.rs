//! Quota window boundaries
//!
//! Pure calendar arithmetic. All boundaries fall on UTC midnight; anchored
//! cadences use the anchor's day of month (and month, for yearly), clamped
//! to the last day of shorter months. Clamping is applied per month, so an
//! anchor on the 31st still lands on the 31st in months that have one.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::plan::BillingPeriod;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    DailyUtc,
    MonthlyAnchored,
    YearlyAnchored,
}

impl Cadence {
    pub fn for_period(period: BillingPeriod) -> Self {
        match period {
            BillingPeriod::Monthly => Self::MonthlyAnchored,
            BillingPeriod::Yearly => Self::YearlyAnchored,
        }
    }
}

/// Half-open interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

/// Window containing `now` for the given cadence
///
/// `anchor` is ignored for [`Cadence::DailyUtc`].
pub fn window_for(
    cadence: Cadence,
    anchor: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Window, EngineError> {
    match cadence {
        Cadence::DailyUtc => {
            let start = midnight(now.date_naive())?;
            Ok(Window {
                start,
                end: start + Duration::days(1),
            })
        }
        Cadence::MonthlyAnchored => {
            let day = anchor.day();
            let (year, month) = (now.year(), now.month());
            let this = boundary(year, month, day)?;
            if this <= now {
                let (ny, nm) = shift_month(year, month, 1);
                Ok(Window {
                    start: this,
                    end: boundary(ny, nm, day)?,
                })
            } else {
                let (py, pm) = shift_month(year, month, -1);
                Ok(Window {
                    start: boundary(py, pm, day)?,
                    end: this,
                })
            }
        }
        Cadence::YearlyAnchored => {
            let (month, day) = (anchor.month(), anchor.day());
            let year = now.year();
            let this = boundary(year, month, day)?;
            if this <= now {
                Ok(Window {
                    start: this,
                    end: boundary(year + 1, month, day)?,
                })
            } else {
                Ok(Window {
                    start: boundary(year - 1, month, day)?,
                    end: this,
                })
            }
        }
    }
}

fn midnight(date: NaiveDate) -> Result<DateTime<Utc>, EngineError> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| EngineError::Internal(format!("no midnight on {date}")))
}

fn days_in_month(year: i32, month: u32) -> u32 {
    (28..=31)
        .rev()
        .find(|&day| NaiveDate::from_ymd_opt(year, month, day).is_some())
        .unwrap_or(28)
}

/// Midnight on `day` of the month, clamped to the month's last day
fn boundary(year: i32, month: u32, day: u32) -> Result<DateTime<Utc>, EngineError> {
    let day = day.min(days_in_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| EngineError::Internal(format!("date out of range: {year}-{month}-{day}")))?;
    midnight(date)
}

fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}
