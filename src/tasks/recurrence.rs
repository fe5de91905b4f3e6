//! Next-occurrence computation for recurring tasks.

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, Utc};

use super::{Recurrence, RecurrenceEnd, RecurrenceType};

/// Compute the next execution time for a recurring task.
///
/// Pure: wall-clock time enters only through `now`, so every branch is
/// testable with fixed inputs. Returns `None` when no valid occurrence
/// exists, including a pattern whose end condition has been reached;
/// callers log a warning and leave the task unscheduled rather than
/// failing the batch.
///
/// The `custom` type falls back to daily-from-now. That is a placeholder
/// policy, not a general custom-recurrence engine.
pub fn next_execution(
    recurrence: &Recurrence,
    execute_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if matches!(recurrence.end, RecurrenceEnd::Count(0)) {
        return None;
    }

    let interval = i64::from(recurrence.interval.max(1));
    let time = execute_at.time();

    let next = match recurrence.recurrence_type {
        RecurrenceType::Daily => next_daily(time, now, interval),
        RecurrenceType::Weekly if !recurrence.days.is_empty() => {
            next_weekly_on_days(&recurrence.days, time, now)
        }
        RecurrenceType::Weekly => at(now.date_naive() + Days::new(7 * interval as u64), time),
        RecurrenceType::Monthly => next_monthly(recurrence.month_day, execute_at, now, interval),
        RecurrenceType::Yearly => next_yearly(execute_at, now, interval),
        RecurrenceType::Custom => at(now.date_naive() + Days::new(1), time),
    }?;

    match recurrence.end {
        RecurrenceEnd::Until(until) if next > until => None,
        _ => Some(next),
    }
}

fn at(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    Some(date.and_time(time).and_utc())
}

/// Keep the time of day; today if still ahead, else tomorrow, then push by
/// the remaining interval.
fn next_daily(time: NaiveTime, now: DateTime<Utc>, interval: i64) -> Option<DateTime<Utc>> {
    let mut date = now.date_naive();
    if date.and_time(time).and_utc() <= now {
        date = date.succ_opt()?;
    }
    if interval > 1 {
        date = date.checked_add_days(Days::new(interval as u64 - 1))?;
    }
    at(date, time)
}

/// Scan forward up to a week for the next listed weekday whose date+time is
/// strictly after `now`; wrap to the earliest listed weekday otherwise.
fn next_weekly_on_days(days: &[u8], time: NaiveTime, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut check = now.date_naive();
    for _ in 0..7 {
        if days.contains(&(check.weekday().number_from_monday() as u8)) {
            let candidate = check.and_time(time).and_utc();
            if candidate > now {
                return Some(candidate);
            }
        }
        check = check.succ_opt()?;
    }

    // Nothing in the coming week: wrap a full week to the earliest weekday
    // in the set.
    let target = *days.iter().min()?;
    let today = now.date_naive().weekday().number_from_monday() as u8;
    let mut days_until = (i16::from(target) - i16::from(today)).rem_euclid(7) as u64;
    if days_until == 0 {
        days_until = 7;
    }
    at(now.date_naive() + Days::new(days_until), time)
}

/// Try the target day in the current month first, then advance by the
/// interval in months, clamping to the last valid day.
fn next_monthly(
    month_day: Option<u8>,
    execute_at: DateTime<Utc>,
    now: DateTime<Utc>,
    interval: i64,
) -> Option<DateTime<Utc>> {
    let target_day = month_day.map(u32::from).unwrap_or(execute_at.day());
    let time = execute_at.time();

    if let Some(date) = NaiveDate::from_ymd_opt(now.year(), now.month(), target_day) {
        let candidate = date.and_time(time).and_utc();
        if candidate > now {
            return Some(candidate);
        }
    }

    let mut month = now.month() as i64 + interval;
    let mut year = now.year();
    while month > 12 {
        month -= 12;
        year += 1;
    }
    let month = month as u32;
    let day = target_day.min(days_in_month(year, month)?);
    at(NaiveDate::from_ymd_opt(year, month, day)?, time)
}

/// Try the current year first; on advance, Feb 29 maps to Feb 28 in
/// non-leap target years.
fn next_yearly(
    execute_at: DateTime<Utc>,
    now: DateTime<Utc>,
    interval: i64,
) -> Option<DateTime<Utc>> {
    let time = execute_at.time();

    if let Some(date) = NaiveDate::from_ymd_opt(now.year(), execute_at.month(), execute_at.day()) {
        let candidate = date.and_time(time).and_utc();
        if candidate > now {
            return Some(candidate);
        }
    }

    let target_year = now.year() + interval as i32;
    let day = if execute_at.month() == 2 && execute_at.day() == 29 && !is_leap_year(target_year) {
        28
    } else {
        execute_at.day()
    };
    at(NaiveDate::from_ymd_opt(target_year, execute_at.month(), day)?, time)
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(next.signed_duration_since(first).num_days() as u32)
}

fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}
