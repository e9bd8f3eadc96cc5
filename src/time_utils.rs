// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and ritual period keys.

use chrono::{DateTime, Datelike, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Period key for the ISO week containing `now`, e.g. `"2026-W32"`.
///
/// Weekly check-ins and missed-check-in penalties are idempotency-keyed
/// by this value, so one event per user per ISO week.
pub fn iso_week_key(now: DateTime<Utc>) -> String {
    let week = now.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

/// Whether `prev` falls in the ISO week immediately before the week of `now`.
///
/// Used for streak continuation: a check-in extends the streak only when the
/// previous successful check-in happened in the preceding week.
pub fn is_previous_iso_week(prev: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    iso_week_key(prev + chrono::Duration::weeks(1)) == iso_week_key(now)
}
