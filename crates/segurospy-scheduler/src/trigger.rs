//! Recurring trigger rules with minute resolution.
//!
//! Accepted text forms:
//! - `daily 20:00` or just `20:00`
//! - `every 4h`, `every 4 hours` (fires at minute 0 of hours 0, 4, 8 ...)
//! - `weekly sun 03:00`
//! - 5-field cron subset: `0 20 * * *`, `0 */4 * * *`, `0 3 * * 0`
//!
//! All times are evaluated in the scheduler's fixed UTC offset.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc, Weekday};
use segurospy_core::error::{Result, SegurosError};

/// Longest gap between two firings of any valid trigger, plus slack.
const SEARCH_LIMIT_MINUTES: i64 = 8 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Every day at `hour:minute`.
    DailyAt { hour: u32, minute: u32 },
    /// At `minute` past every hour divisible by `step` (cron `*/step`).
    EveryHours { step: u32, minute: u32 },
    /// Once a week on `weekday` at `hour:minute`.
    WeeklyAt { weekday: Weekday, hour: u32, minute: u32 },
}

impl Trigger {
    pub fn daily(hour: u32, minute: u32) -> Result<Self> {
        Self::DailyAt { hour, minute }.validated()
    }

    pub fn every_hours(step: u32) -> Result<Self> {
        Self::EveryHours { step, minute: 0 }.validated()
    }

    pub fn weekly(weekday: Weekday, hour: u32, minute: u32) -> Result<Self> {
        Self::WeeklyAt { weekday, hour, minute }.validated()
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let (hour, minute) = match *self {
            Trigger::DailyAt { hour, minute } | Trigger::WeeklyAt { hour, minute, .. } => {
                (hour, minute)
            }
            Trigger::EveryHours { step, minute } => {
                if !(1..=23).contains(&step) {
                    return Err(SegurosError::Config(format!(
                        "hour step must be between 1 and 23, got {step}"
                    )));
                }
                (0, minute)
            }
        };
        if hour > 23 {
            return Err(SegurosError::Config(format!("hour out of range: {hour}")));
        }
        if minute > 59 {
            return Err(SegurosError::Config(format!("minute out of range: {minute}")));
        }
        Ok(())
    }

    /// True if the local wall-clock minute containing `instant` is a firing minute.
    pub fn matches(&self, instant: DateTime<Utc>, offset: FixedOffset) -> bool {
        let local = instant.with_timezone(&offset);
        match *self {
            Trigger::DailyAt { hour, minute } => local.hour() == hour && local.minute() == minute,
            Trigger::EveryHours { step, minute } => {
                step > 0 && local.hour() % step == 0 && local.minute() == minute
            }
            Trigger::WeeklyAt { weekday, hour, minute } => {
                local.weekday() == weekday && local.hour() == hour && local.minute() == minute
            }
        }
    }

    /// First firing minute strictly after `after`.
    /// `None` only for triggers that fail [`Trigger::validate`].
    pub fn next_after(&self, after: DateTime<Utc>, offset: FixedOffset) -> Option<DateTime<Utc>> {
        let mut candidate = truncate_to_minute(after) + Duration::minutes(1);
        for _ in 0..SEARCH_LIMIT_MINUTES {
            if self.matches(candidate, offset) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }
        None
    }
}

pub(crate) fn truncate_to_minute(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(instant)
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Trigger::DailyAt { hour, minute } => write!(f, "daily {hour:02}:{minute:02}"),
            Trigger::EveryHours { step, minute: 0 } => write!(f, "every {step}h"),
            Trigger::EveryHours { step, minute } => write!(f, "{minute} */{step} * * *"),
            Trigger::WeeklyAt { weekday, hour, minute } => write!(
                f,
                "weekly {} {hour:02}:{minute:02}",
                weekday.to_string().to_lowercase()
            ),
        }
    }
}

impl FromStr for Trigger {
    type Err = SegurosError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim().to_lowercase();
        let parts: Vec<&str> = text.split_whitespace().collect();
        let invalid = || SegurosError::Config(format!("invalid trigger spec '{}'", s.trim()));

        let trigger = match parts.as_slice() {
            [time] if time.contains(':') => {
                let (hour, minute) = parse_hh_mm(time).ok_or_else(invalid)?;
                Trigger::DailyAt { hour, minute }
            }
            ["daily", time] => {
                let (hour, minute) = parse_hh_mm(time).ok_or_else(invalid)?;
                Trigger::DailyAt { hour, minute }
            }
            ["every", n] => {
                let step = n.strip_suffix('h').ok_or_else(invalid)?;
                Trigger::EveryHours {
                    step: step.parse().map_err(|_| invalid())?,
                    minute: 0,
                }
            }
            ["every", n, "h" | "hour" | "hours"] => Trigger::EveryHours {
                step: n.parse().map_err(|_| invalid())?,
                minute: 0,
            },
            ["weekly", day, time] => {
                let weekday = parse_weekday(day).ok_or_else(invalid)?;
                let (hour, minute) = parse_hh_mm(time).ok_or_else(invalid)?;
                Trigger::WeeklyAt { weekday, hour, minute }
            }
            [minute, hour, "*", "*", dow] => parse_cron(minute, hour, dow).ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };

        trigger
            .validate()
            .map_err(|e| SegurosError::Config(format!("invalid trigger spec '{}': {e}", s.trim())))?;
        Ok(trigger)
    }
}

fn parse_hh_mm(text: &str) -> Option<(u32, u32)> {
    let (hour, minute) = text.split_once(':')?;
    Some((hour.parse().ok()?, minute.parse().ok()?))
}

/// Cron day-of-week: 0-7 (0 and 7 are Sunday) or an English day name.
fn parse_weekday(text: &str) -> Option<Weekday> {
    match text.parse::<u8>() {
        Ok(0 | 7) => Some(Weekday::Sun),
        Ok(n @ 1..=6) => Weekday::try_from(n - 1).ok(),
        Ok(_) => None,
        Err(_) => text.parse().ok(),
    }
}

fn parse_cron(minute: &str, hour: &str, dow: &str) -> Option<Trigger> {
    let minute: u32 = minute.parse().ok()?;
    if hour == "*" && dow == "*" {
        return Some(Trigger::EveryHours { step: 1, minute });
    }
    if let Some(step) = hour.strip_prefix("*/") {
        if dow != "*" {
            return None;
        }
        return Some(Trigger::EveryHours {
            step: step.parse().ok()?,
            minute,
        });
    }
    let hour: u32 = hour.parse().ok()?;
    if dow == "*" {
        Some(Trigger::DailyAt { hour, minute })
    } else {
        Some(Trigger::WeeklyAt {
            weekday: parse_weekday(dow)?,
            hour,
            minute,
        })
    }
}
