//! Time parsing for operator input
//!
//! `--start` values accept a relative duration (`"2h"`, `"3days"`), a natural
//! language expression (`"tomorrow 9am"`, `"next monday"`), or an absolute
//! `YYYY-MM-DD HH:MM` / RFC 3339 timestamp. Posting times are `HH:MM` in UTC.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};

use crate::{Result, ShopcastError};

/// Resolve a start expression relative to `now`
pub fn parse_start(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ShopcastError::InvalidInput("Start time cannot be empty".to_string()));
    }

    if input.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    if let Ok(duration) = parse_duration(input) {
        return Ok(now + duration);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M") {
        return Ok(naive.and_utc());
    }

    chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us)
        .map_err(|e| {
            ShopcastError::InvalidInput(format!("Could not parse start time '{}': {}", input, e))
        })
}

fn parse_duration(input: &str) -> Result<Duration> {
    let std_duration = humantime::parse_duration(input)
        .map_err(|e| ShopcastError::InvalidInput(format!("Could not parse duration: {}", e)))?;
    Duration::from_std(std_duration)
        .map_err(|_| ShopcastError::InvalidInput("Duration out of range".to_string()))
}

/// Parse an `HH:MM` time of day
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(input.trim(), "%H:%M").map_err(|_| {
        ShopcastError::InvalidInput(format!("Invalid posting time '{}': expected HH:MM", input))
    })
}

/// Parse a list of `HH:MM` times, sorted and deduplicated
pub fn parse_posting_times<S: AsRef<str>>(times: &[S]) -> Result<Vec<NaiveTime>> {
    let mut parsed = times
        .iter()
        .map(|t| parse_time_of_day(t.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    parsed.sort();
    parsed.dedup();
    Ok(parsed)
}
