// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Timezone-aware calendar-day resolution.
//!
//! Every "what day is it for this user" decision goes through
//! [`TimeContext`] so that a user at 23:58 Pacific is never evaluated
//! against the server's UTC date. Conversions use full IANA rules via
//! `chrono-tz` (DST transitions, non-whole-hour offsets), never a
//! fixed offset.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Injectable time source so tests can pin "now".
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock time source used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Resolves instants to local calendar days and back.
#[derive(Debug, Clone)]
pub struct TimeContext {
    default_tz: Tz,
}

impl TimeContext {
    pub fn new(default_tz: Tz) -> Self {
        Self { default_tz }
    }

    /// Parse a stored IANA timezone name, falling back to the
    /// configured default when missing or unparseable.
    pub fn resolve(&self, tz: Option<&str>) -> Tz {
        match tz {
            None => self.default_tz,
            Some(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!(timezone = name, "Unparseable timezone, using default");
                self.default_tz
            }),
        }
    }

    /// Local calendar date of `instant` in `tz`.
    pub fn local_date_for(&self, instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
        instant.with_timezone(&tz).date_naive()
    }

    /// Local date and time of `instant` in `tz`.
    pub fn local_now(&self, clock: &dyn Clock, tz: Tz) -> DateTime<Tz> {
        clock.now_utc().with_timezone(&tz)
    }

    /// Half-open UTC instant range `[start, end)` covering one local
    /// calendar date in `tz`.
    pub fn utc_day_bounds(&self, date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = local_day_start(date, tz);
        let end = local_day_start(date + Duration::days(1), tz);
        (start, end)
    }
}

/// First valid UTC instant of a local calendar date.
///
/// A DST spring-forward can make local midnight nonexistent; in that
/// case the day starts at the first valid local time after the gap.
fn local_day_start(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        // Fall-back repeats the hour; the earlier instant starts the day.
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Spring-forward gap at midnight (e.g. America/Santiago).
            // Probe forward in 15-minute steps for the first valid time.
            let mut probe = midnight;
            loop {
                probe += Duration::minutes(15);
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return dt.with_timezone(&Utc);
                }
            }
        }
    }
}
