//! Posting-time slots
//!
//! A slot is a UTC timestamp at one of the day's posting times. Slots already
//! holding a post on the same platform are skipped.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveTime, Utc};

const FIRST_SLOT_MINUTES: u32 = 9 * 60;
const LAST_SLOT_MINUTES: u32 = 21 * 60;
/// Upper bound on how far ahead an unbounded search looks
const MAX_SEARCH_DAYS: i64 = 366;

/// Times of day for `posts_per_day` posts
///
/// Uses the first `posts_per_day` configured times. When fewer are
/// configured, posts are spaced evenly between 09:00 and 21:00.
pub fn daily_times(configured: &[NaiveTime], posts_per_day: usize) -> Vec<NaiveTime> {
    if posts_per_day == 0 {
        return Vec::new();
    }
    if configured.len() >= posts_per_day {
        return configured[..posts_per_day].to_vec();
    }

    if posts_per_day == 1 {
        return vec![minutes_to_time(FIRST_SLOT_MINUTES)];
    }

    let span = LAST_SLOT_MINUTES - FIRST_SLOT_MINUTES;
    let step = span / (posts_per_day as u32 - 1);
    (0..posts_per_day as u32)
        .map(|i| minutes_to_time(FIRST_SLOT_MINUTES + i * step))
        .collect()
}

fn minutes_to_time(minutes: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap_or(NaiveTime::MIN)
}

/// Up to `count` free slots at or after `start`, never past `window_end`
///
/// Returned slots are added to `occupied`.
pub fn free_slots(
    start: i64,
    times: &[NaiveTime],
    occupied: &mut HashSet<i64>,
    count: usize,
    window_end: Option<i64>,
) -> Vec<i64> {
    let mut slots = Vec::with_capacity(count);
    if times.is_empty() || count == 0 {
        return slots;
    }

    let Some(start_dt) = DateTime::<Utc>::from_timestamp(start, 0) else {
        return slots;
    };
    let mut sorted = times.to_vec();
    sorted.sort();

    let first_day = start_dt.date_naive();
    for offset in 0..MAX_SEARCH_DAYS {
        let day = first_day + Duration::days(offset);
        for time in &sorted {
            let ts = day.and_time(*time).and_utc().timestamp();
            if ts < start {
                continue;
            }
            if window_end.map_or(false, |end| ts > end) {
                return slots;
            }
            if occupied.insert(ts) {
                slots.push(ts);
                if slots.len() == count {
                    return slots;
                }
            }
        }
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn ts(d: u32, h: u32) -> i64 {
        Utc.with_ymd_and_hms(2025, 6, d, h, 0, 0).unwrap().timestamp()
    }

    #[test]
    fn test_daily_times_uses_configured_prefix() {
        let times = daily_times(&[t(9, 0), t(13, 0), t(18, 0)], 2);
        assert_eq!(times, vec![t(9, 0), t(13, 0)]);
    }

    #[test]
    fn test_daily_times_spreads_when_short() {
        let times = daily_times(&[t(9, 0)], 3);
        assert_eq!(times, vec![t(9, 0), t(15, 0), t(21, 0)]);
        assert_eq!(daily_times(&[], 1)[0].hour(), 9);
        assert!(daily_times(&[t(9, 0)], 0).is_empty());
    }

    #[test]
    fn test_free_slots_skip_past_and_occupied() {
        let mut occupied = HashSet::from([ts(10, 13)]);
        let slots = free_slots(ts(10, 10), &[t(9, 0), t(13, 0)], &mut occupied, 3, None);
        assert_eq!(slots, vec![ts(11, 9), ts(11, 13), ts(12, 9)]);
        assert!(occupied.contains(&ts(11, 9)));
    }

    #[test]
    fn test_free_slots_respect_window_end() {
        let mut occupied = HashSet::new();
        let slots = free_slots(
            ts(10, 8),
            &[t(9, 0), t(13, 0)],
            &mut occupied,
            10,
            Some(ts(11, 10)),
        );
        assert_eq!(slots, vec![ts(10, 9), ts(10, 13), ts(11, 9)]);
    }
}
