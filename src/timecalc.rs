//! Shared time arithmetic.
//!
//! Everything here works on minutes since midnight (`i64`) so that the
//! snapping rules stay exact integer arithmetic.  Conversion to hours
//! only happens at the edges, followed by a single rounding step.

use chrono::{NaiveDateTime, NaiveTime, Timelike};

/// Fixed unit applied to late arrivals beyond the tolerance.
pub const LATENESS_SNAP_MINUTES: i64 = 15;

/// Upper bound for tolerances and snap units.  Anything larger behaves
/// the same as a whole day.
pub const MINUTES_PER_DAY: i64 = 24 * 60;

const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Parses an `HH:MM` clock-time into minutes since midnight.
pub fn parse_clock(value: &str) -> Option<i64> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()?;
    Some(minutes_of_day(time))
}

/// Parses a local timestamp, dropping seconds.  Fractional seconds and
/// a trailing `Z` are tolerated.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_end_matches('Z');
    let value = value.split('.').next().unwrap_or(value);
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .and_then(|ts| ts.with_second(0))
}

pub fn minutes_of_day(time: NaiveTime) -> i64 {
    i64::from(time.hour()) * 60 + i64::from(time.minute())
}

/// Formats minutes since midnight as `HH:MM`.
pub fn format_clock(minutes: i64) -> String {
    let minutes = minutes.rem_euclid(MINUTES_PER_DAY);
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Clamps a snap unit to `1..=MINUTES_PER_DAY`.  A zero unit disables
/// snapping.
pub fn clamp_unit(unit: i64) -> i64 {
    unit.clamp(1, MINUTES_PER_DAY)
}

/// Rounds `minutes` up to the next multiple of `unit`.
pub fn snap_up(minutes: i64, unit: i64) -> i64 {
    let unit = clamp_unit(unit);
    minutes
        .saturating_add(unit - 1)
        .div_euclid(unit)
        .saturating_mul(unit)
}

/// Rounds `minutes` down to a multiple of `unit`.
pub fn snap_down(minutes: i64, unit: i64) -> i64 {
    let unit = clamp_unit(unit);
    minutes.div_euclid(unit).saturating_mul(unit)
}

/// Start of work used for hour computation.  Arrivals within the
/// tolerance start on schedule; later arrivals are pushed to the next
/// lateness unit counted from the scheduled start.
pub fn effective_start(actual: i64, scheduled: i64, tolerance: i64) -> i64 {
    if actual <= scheduled.saturating_add(tolerance) {
        scheduled
    } else {
        scheduled.saturating_add(snap_up(
            actual.saturating_sub(scheduled),
            LATENESS_SNAP_MINUTES,
        ))
    }
}

/// End of work used for hour computation.  Leaving at or after the
/// scheduled end counts as the scheduled end; an early departure is
/// charged in whole `unit`s.
pub fn effective_end(actual: i64, scheduled: i64, unit: i64) -> i64 {
    if actual >= scheduled {
        scheduled
    } else {
        scheduled.saturating_sub(snap_up(scheduled.saturating_sub(actual), unit))
    }
}

/// Overtime minutes past `scheduled_end`, floored to whole `unit`s.
pub fn overtime_minutes(actual: i64, scheduled_end: i64, unit: i64) -> i64 {
    if actual > scheduled_end {
        snap_down(actual.saturating_sub(scheduled_end), unit)
    } else {
        0
    }
}

pub fn minutes_to_hours(minutes: i64) -> f64 {
    minutes as f64 / 60.0
}

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clock() {
        assert_eq!(parse_clock("08:30"), Some(510));
        assert_eq!(parse_clock(" 17:05 "), Some(1025));
        assert_eq!(parse_clock("25:00"), None);
        assert_eq!(parse_clock(""), None);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = parse_timestamp("2025-03-04T08:35").unwrap();
        assert_eq!(parse_timestamp("2025-03-04T08:35:59"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-04 08:35"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-04T08:35:12.345Z"), Some(expected));
        assert_eq!(parse_timestamp("04/03/2025 08:35"), None);
        assert_eq!(parse_timestamp("garbage"), None);
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(510), "08:30");
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(1439), "23:59");
    }

    #[test]
    fn test_snapping_directions() {
        assert_eq!(snap_up(40, 15), 45);
        assert_eq!(snap_up(45, 15), 45);
        assert_eq!(snap_up(0, 15), 0);
        assert_eq!(snap_down(59, 30), 30);
        assert_eq!(snap_down(29, 30), 0);
        assert_eq!(snap_up(7, 0), 7);
        assert_eq!(snap_down(7, 0), 7);
    }

    #[test]
    fn test_oversized_units_and_tolerances_saturate() {
        assert_eq!(snap_up(30, i64::MAX), MINUTES_PER_DAY);
        assert_eq!(snap_down(30, i64::MAX), 0);
        assert_eq!(snap_up(i64::MAX, 15), snap_up(i64::MAX - 14, 15));
        assert_eq!(effective_start(540, 510, i64::MAX), 510);
        assert_eq!(effective_end(1020, 1050, i64::MAX), 1050 - MINUTES_PER_DAY);
        assert_eq!(overtime_minutes(1140, 1050, i64::MAX), 0);
        assert_eq!(overtime_minutes(i64::MAX, i64::MIN, 30) % 30, 0);
    }

    #[test]
    fn test_effective_start() {
        // 08:35 is inside a ten minute tolerance.
        assert_eq!(effective_start(515, 510, 10), 510);
        assert_eq!(effective_start(520, 510, 10), 510);
        // 09:10 is forty minutes late, charged as forty-five.
        assert_eq!(effective_start(550, 510, 10), 555);
        // Early arrival never moves the start earlier.
        assert_eq!(effective_start(480, 510, 10), 510);
    }

    #[test]
    fn test_effective_end_charges_whole_units() {
        assert_eq!(effective_end(1052, 1050, 15), 1050);
        assert_eq!(effective_end(1049, 1050, 15), 1035);
        assert_eq!(effective_end(1020, 1050, 15), 1020);
        assert_eq!(effective_end(1019, 1050, 15), 1005);
    }

    #[test]
    fn test_overtime_floors() {
        assert_eq!(overtime_minutes(1052, 1050, 30), 0);
        assert_eq!(overtime_minutes(1079, 1050, 30), 0);
        assert_eq!(overtime_minutes(1080, 1050, 30), 30);
        assert_eq!(overtime_minutes(1139, 1050, 30), 60);
        assert_eq!(overtime_minutes(1000, 1050, 30), 0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(7.666_666), 7.67);
        assert_eq!(round2(0.1 + 0.2), 0.3);
    }
}
