//! Cron expression handling: 5-field parsing, next fire time, countdown.
//!
//! The `cron` crate expects a leading seconds field and numbers weekdays
//! 1-7 starting at Sunday. Standard 5-field expressions
//! (`minute hour day-of-month month day-of-week`, weekdays 0-7 with both
//! 0 and 7 meaning Sunday) are translated before parsing. 6- and 7-field
//! expressions are handed to the crate untouched.
//!
//! When both day-of-month and day-of-week are restricted, standard cron
//! fires if either one matches while the crate wants both. Such an
//! expression becomes two schedules whose fire times are merged.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronError {
    #[error("invalid cron expression '{expr}': {reason}")]
    Invalid { expr: String, reason: String },

    #[error("cron expression '{expr}' has no upcoming fire time")]
    NoUpcoming { expr: String },
}

/// A parsed cron expression that remembers the text it came from.
#[derive(Debug, Clone)]
pub struct CronExpr {
    source: String,
    schedules: Vec<CronSchedule>,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let schedules = normalize(expr)?
            .iter()
            .map(|normalized| {
                CronSchedule::from_str(normalized).map_err(|e| CronError::Invalid {
                    expr: expr.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            source: expr.trim().to_string(),
            schedules,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// First fire time strictly after `now`.
    pub fn next_after(&self, now: &DateTime<Utc>) -> Result<DateTime<Utc>, CronError> {
        self.schedules
            .iter()
            .filter_map(|s| s.after(now).next())
            .min()
            .ok_or_else(|| CronError::NoUpcoming {
                expr: self.source.clone(),
            })
    }

    /// Every fire time in `(now, end]`, ascending and without duplicates.
    pub fn fires_between(&self, now: &DateTime<Utc>, end: &DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let fires: BTreeSet<DateTime<Utc>> = self
            .schedules
            .iter()
            .flat_map(|s| s.after(now).take_while(|t| t <= end))
            .collect();
        fires.into_iter().collect()
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A field that matches everything, in the vixie-cron sense.
fn is_unrestricted(field: &str) -> bool {
    field == "?" || field.starts_with('*')
}

/// Translate a 5-field expression into one or two expressions in the
/// crate's 6-field dialect.
fn normalize(expr: &str) -> Result<Vec<String>, CronError> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => {
            let (minute, hour, dom, month) = (fields[0], fields[1], fields[2], fields[3]);
            let dow = translate_day_of_week(fields[4]).ok_or_else(|| CronError::Invalid {
                expr: expr.to_string(),
                reason: format!("bad day-of-week field '{}'", fields[4]),
            })?;
            if is_unrestricted(dom) || is_unrestricted(fields[4]) {
                Ok(vec![format!("0 {} {} {} {} {}", minute, hour, dom, month, dow)])
            } else {
                Ok(vec![
                    format!("0 {} {} {} {} *", minute, hour, dom, month),
                    format!("0 {} {} * {} {}", minute, hour, month, dow),
                ])
            }
        }
        6 | 7 => Ok(vec![fields.join(" ")]),
        n => Err(CronError::Invalid {
            expr: expr.to_string(),
            reason: format!("expected 5 fields, found {}", n),
        }),
    }
}

/// Renumber a standard weekday field (0-7, Sunday = 0 or 7) to the crate's
/// 1-7 (Sunday = 1). Numeric items are expanded into an explicit list;
/// names and a bare `*`/`?` pass through.
fn translate_day_of_week(field: &str) -> Option<String> {
    let mut days = BTreeSet::new();
    let mut verbatim = Vec::new();

    for item in field.split(',') {
        if item.chars().any(|c| c.is_ascii_alphabetic()) {
            verbatim.push(item.to_string());
            continue;
        }

        let (range, step) = match item.split_once('/') {
            Some((r, s)) => (r, Some(s.parse::<u8>().ok().filter(|s| *s > 0)?)),
            None => (item, None),
        };

        let (lo, hi) = match range {
            "*" | "?" if step.is_none() => {
                verbatim.push(range.to_string());
                continue;
            }
            "*" | "?" => (0, 7),
            _ => match range.split_once('-') {
                Some((lo, hi)) => (lo.parse::<u8>().ok()?, hi.parse::<u8>().ok()?),
                // `n/s` runs from n to the end of the range.
                None => {
                    let n = range.parse::<u8>().ok()?;
                    (n, if step.is_some() { 7 } else { n })
                }
            },
        };
        if lo > hi || hi > 7 {
            return None;
        }

        for day in (lo..=hi).step_by(usize::from(step.unwrap_or(1))) {
            days.insert(day % 7 + 1);
        }
    }

    let mut items: Vec<String> = days.iter().map(u8::to_string).collect();
    items.extend(verbatim);
    if items.is_empty() {
        None
    } else {
        Some(items.join(","))
    }
}

/// Time remaining until the next fire, never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    pub fn between(now: &DateTime<Utc>, next: &DateTime<Utc>) -> Self {
        let total = (*next - *now).num_seconds().max(0);
        Self {
            days: total / 86_400,
            hours: (total / 3_600) % 24,
            minutes: (total / 60) % 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Next run in {} days {} hours {} minutes and {} seconds",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_daily_at_four_before_and_after() {
        let cron = CronExpr::parse("0 4 * * *").unwrap();
        assert_eq!(
            cron.next_after(&at(2024, 3, 10, 1, 30, 0)).unwrap(),
            at(2024, 3, 10, 4, 0, 0)
        );
        assert_eq!(
            cron.next_after(&at(2024, 3, 10, 4, 0, 0)).unwrap(),
            at(2024, 3, 11, 4, 0, 0)
        );
        assert_eq!(
            cron.next_after(&at(2024, 12, 31, 23, 0, 0)).unwrap(),
            at(2025, 1, 1, 4, 0, 0)
        );
    }

    #[test]
    fn test_every_fifteen_minutes() {
        let cron = CronExpr::parse("*/15 * * * *").unwrap();
        assert_eq!(
            cron.next_after(&at(2024, 1, 1, 10, 7, 30)).unwrap(),
            at(2024, 1, 1, 10, 15, 0)
        );
    }

    #[test]
    fn test_weekday_range_is_monday_to_friday() {
        let cron = CronExpr::parse("0 9 * * 1-5").unwrap();
        // 2024-06-08 is a Saturday.
        let next = cron.next_after(&at(2024, 6, 8, 12, 0, 0)).unwrap();
        assert_eq!(next.weekday(), Weekday::Mon);
        assert_eq!(next, at(2024, 6, 10, 9, 0, 0));
    }

    #[test]
    fn test_sunday_as_zero_and_seven() {
        // 2024-06-05 is a Wednesday.
        let now = at(2024, 6, 5, 0, 0, 0);
        for expr in ["0 0 * * 0", "0 0 * * 7"] {
            let next = CronExpr::parse(expr).unwrap().next_after(&now).unwrap();
            assert_eq!(next.weekday(), Weekday::Sun, "{}", expr);
            assert_eq!(next, at(2024, 6, 9, 0, 0, 0));
        }
    }

    #[test]
    fn test_range_through_seven_includes_sunday() {
        assert_eq!(translate_day_of_week("5-7").as_deref(), Some("1,6,7"));
        assert_eq!(translate_day_of_week("0-6").as_deref(), Some("1,2,3,4,5,6,7"));
        assert_eq!(translate_day_of_week("1,3").as_deref(), Some("2,4"));
        assert_eq!(translate_day_of_week("*").as_deref(), Some("*"));
        assert_eq!(translate_day_of_week("*/2").as_deref(), Some("1,3,5,7"));
        assert_eq!(translate_day_of_week("MON-FRI").as_deref(), Some("MON-FRI"));
        assert_eq!(translate_day_of_week("9"), None);
        assert_eq!(translate_day_of_week("5-2"), None);
        assert_eq!(translate_day_of_week("1-5/0"), None);

        // Stepped range through 7 keeps Sunday: Mon, Wed, Fri, Sun.
        assert_eq!(translate_day_of_week("1-7/2").as_deref(), Some("1,2,4,6"));
        assert_eq!(translate_day_of_week("7-7").as_deref(), Some("1"));
        assert_eq!(translate_day_of_week("5/1").as_deref(), Some("1,6,7"));
    }

    #[test]
    fn test_stepped_weekdays_fire_on_sunday() {
        // 2024-06-08 is a Saturday.
        let sat = at(2024, 6, 8, 12, 0, 0);
        let cron = CronExpr::parse("0 0 * * 1-7/2").unwrap();
        assert_eq!(cron.next_after(&sat).unwrap(), at(2024, 6, 9, 0, 0, 0));

        let cron = CronExpr::parse("0 0 * * 7-7").unwrap();
        assert_eq!(cron.next_after(&sat).unwrap(), at(2024, 6, 9, 0, 0, 0));
    }

    #[test]
    fn test_day_of_month_or_day_of_week() {
        // The 1st of the month, and every Monday.
        let cron = CronExpr::parse("0 0 1 * 1").unwrap();
        // 2024-06-05 is a Wednesday.
        assert_eq!(
            cron.next_after(&at(2024, 6, 5, 0, 0, 0)).unwrap(),
            at(2024, 6, 10, 0, 0, 0)
        );
        // 2024-06-30 is a Sunday, so the 1st of July comes first.
        assert_eq!(
            cron.next_after(&at(2024, 6, 30, 0, 0, 0)).unwrap(),
            at(2024, 7, 1, 0, 0, 0)
        );

        let fires = cron.fires_between(&at(2024, 6, 30, 0, 0, 0), &at(2024, 7, 31, 0, 0, 0));
        let days: Vec<u32> = fires.iter().map(|t| t.day()).collect();
        // July 1st is itself a Monday and appears once.
        assert_eq!(days, vec![1, 8, 15, 22, 29]);

        let cron = CronExpr::parse("0 0 15 * 5").unwrap();
        let fires = cron.fires_between(&at(2024, 6, 1, 0, 0, 0), &at(2024, 6, 30, 0, 0, 0));
        let days: Vec<u32> = fires.iter().map(|t| t.day()).collect();
        assert_eq!(days, vec![7, 14, 15, 21, 28]);
    }

    #[test]
    fn test_wildcard_day_of_month_keeps_single_schedule() {
        assert_eq!(normalize("0 9 * * 1-5").unwrap().len(), 1);
        assert_eq!(normalize("0 9 1 * *").unwrap().len(), 1);
        assert_eq!(normalize("0 9 */2 * 1").unwrap().len(), 1);
        assert_eq!(normalize("0 9 1 * 1").unwrap().len(), 2);
    }

    #[test]
    fn test_six_field_passthrough() {
        let cron = CronExpr::parse("30 0 4 * * *").unwrap();
        let next = cron.next_after(&at(2024, 3, 10, 1, 0, 0)).unwrap();
        assert_eq!((next.hour(), next.minute(), next.second()), (4, 0, 30));
    }

    #[test]
    fn test_rejects_bad_expressions() {
        assert!(matches!(CronExpr::parse("0 4 * *"), Err(CronError::Invalid { .. })));
        assert!(matches!(CronExpr::parse("61 4 * * *"), Err(CronError::Invalid { .. })));
        assert!(matches!(CronExpr::parse(""), Err(CronError::Invalid { .. })));
    }

    #[test]
    fn test_fires_between() {
        let cron = CronExpr::parse("0 * * * *").unwrap();
        let now = at(2024, 1, 1, 0, 30, 0);
        let fires = cron.fires_between(&now, &at(2024, 1, 1, 3, 0, 0));
        assert_eq!(fires.len(), 3);
        assert_eq!(fires[0], at(2024, 1, 1, 1, 0, 0));
    }

    #[test]
    fn test_countdown_splits_and_clamps() {
        let now = at(2024, 1, 1, 0, 0, 0);
        let next = at(2024, 1, 2, 2, 3, 4);
        let c = Countdown::between(&now, &next);
        assert_eq!(c, Countdown { days: 1, hours: 2, minutes: 3, seconds: 4 });
        assert_eq!(c.to_string(), "Next run in 1 days 2 hours 3 minutes and 4 seconds");

        let past = Countdown::between(&next, &now);
        assert_eq!(past, Countdown { days: 0, hours: 0, minutes: 0, seconds: 0 });
    }
}
