//! Daily reconciliation of raw punches.
//!
//! [`reconcile`] turns the punches of one employee-day into a
//! [`DailyOutcome`].  Punches are interpreted by their position in the
//! time-sorted list rather than by their declared kind: the first is
//! the arrival, the last of the first four the departure, and the two
//! in between (when present) the lunch break.  Hours are computed
//! against the schedule after snapping, so the figures are never more
//! favourable to the employee than the raw clock times.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::models::{
    DailyOutcome, Justification, Punch, PunchKind, ResolvedTime, Schedule, ScheduleConfig,
};
use crate::timecalc::{
    effective_end, effective_start, format_clock, minutes_of_day, minutes_to_hours,
    overtime_minutes, round2,
};

/// A punch placed in one of the four timecard slots.
#[derive(Debug, Clone, Copy)]
struct Slot<'a> {
    minutes: i64,
    punch: &'a Punch,
}

#[derive(Debug, Default)]
struct Slots<'a> {
    first_in: Option<Slot<'a>>,
    lunch_out: Option<Slot<'a>>,
    lunch_in: Option<Slot<'a>>,
    last_out: Option<Slot<'a>>,
}

impl<'a> Slots<'a> {
    /// Positional mapping of the sorted punches.  Punches past the
    /// fourth are ignored.
    fn assign(sorted: &[(NaiveDateTime, &'a Punch)]) -> Self {
        let slot = |index: usize| {
            sorted.get(index).map(|(ts, punch)| Slot {
                minutes: minutes_of_day(ts.time()),
                punch: *punch,
            })
        };
        match sorted.len() {
            0 => Self::default(),
            1 => match sorted[0].1.kind {
                PunchKind::In => Self {
                    first_in: slot(0),
                    ..Self::default()
                },
                // A lone OUT closes nothing but stays editable.
                PunchKind::Out => Self {
                    last_out: slot(0),
                    ..Self::default()
                },
            },
            2 => Self {
                first_in: slot(0),
                last_out: slot(1),
                ..Self::default()
            },
            _ => Self {
                first_in: slot(0),
                lunch_out: slot(1),
                lunch_in: slot(2),
                last_out: slot(3),
            },
        }
    }
}

/// Reconciles one employee-day.
///
/// `punches` may contain records for other employees and dates; only
/// those matching `employee_id` and `date` are considered.  `today` is
/// the reference date for the "in the past" conditions of the anomaly
/// and absence flags.  The function never fails: punches whose
/// timestamp cannot be parsed are skipped, and an employee without a
/// schedule reconciles to zero hours with every flag cleared.
pub fn reconcile(
    employee_id: &str,
    date: NaiveDate,
    punches: &[Punch],
    schedule: Option<&ScheduleConfig>,
    justification: Option<&Justification>,
    config: &EngineConfig,
    today: NaiveDate,
) -> DailyOutcome {
    let mut day: Vec<(NaiveDateTime, &Punch)> = punches
        .iter()
        .filter(|punch| punch.employee_id == employee_id)
        .filter_map(|punch| match punch.parsed_timestamp() {
            Some(ts) => Some((ts, punch)),
            None => {
                warn!(
                    employee_id,
                    punch_id = %punch.id,
                    timestamp = %punch.timestamp,
                    "skipping punch with unparsable timestamp"
                );
                None
            }
        })
        .filter(|(ts, _)| ts.date() == date)
        .collect();
    // Stable: simultaneous punches keep their insertion order.
    day.sort_by_key(|(ts, _)| *ts);

    let slots = Slots::assign(&day);
    let mut outcome = DailyOutcome::empty(employee_id, date);
    outcome.punch_count = day.len();
    outcome.is_inconsistent = !kinds_alternate(&day);
    outcome.justification = justification.map(|j| j.kind);
    outcome.first_in = slots.first_in.map(resolved);
    outcome.lunch_out = slots.lunch_out.map(resolved);
    outcome.lunch_in = slots.lunch_in.map(resolved);
    outcome.last_out = slots.last_out.map(resolved);

    let Some(schedule) = schedule.map(ScheduleConfig::resolve) else {
        debug!(employee_id, %date, "no schedule configured; reconciled to zero");
        return outcome;
    };

    let worked = worked_minutes(&slots, &schedule, config);
    outcome.standard_hours = round2(minutes_to_hours(worked));
    outcome.overtime_hours = match (slots.first_in, slots.last_out) {
        (Some(_), Some(out)) => round2(minutes_to_hours(overtime_minutes(
            out.minutes,
            schedule.afternoon_end,
            config.overtime_snap_minutes,
        ))),
        _ => 0.0,
    };
    let latest_on_time = schedule.morning_start.saturating_add(schedule.tolerance);
    outcome.is_late = slots
        .first_in
        .is_some_and(|arrival| arrival.minutes > latest_on_time);

    let in_past = date < today;
    let weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
    outcome.is_anomaly = in_past && !day.is_empty() && day.len() % 2 == 1 && !weekend;
    outcome.is_absent =
        in_past && schedule.is_work_day(date) && day.is_empty() && justification.is_none();

    debug!(
        employee_id,
        %date,
        punches = outcome.punch_count,
        standard_hours = outcome.standard_hours,
        overtime_hours = outcome.overtime_hours,
        is_late = outcome.is_late,
        is_anomaly = outcome.is_anomaly,
        is_absent = outcome.is_absent,
        "reconciled day"
    );
    outcome
}

/// Minutes worked across both halves of the schedule after snapping.
///
/// The morning closes on the first available of lunch-out, lunch-in
/// and last-out.  The afternoon opens on lunch-in, or on the arrival
/// itself when no break was recorded.  Each half is clamped at zero.
fn worked_minutes(slots: &Slots<'_>, schedule: &Schedule, config: &EngineConfig) -> i64 {
    let unit = config.permesso_snap_minutes;

    let morning_close = slots.lunch_out.or(slots.lunch_in).or(slots.last_out);
    let morning = match (slots.first_in, morning_close) {
        (Some(open), Some(close)) => {
            effective_end(close.minutes, schedule.morning_end, unit)
                - effective_start(open.minutes, schedule.morning_start, schedule.tolerance)
        }
        _ => 0,
    };

    let afternoon_open = slots.lunch_in.or(slots.first_in);
    let afternoon = match (afternoon_open, slots.last_out) {
        (Some(open), Some(close)) => {
            effective_end(close.minutes, schedule.afternoon_end, unit)
                - effective_start(open.minutes, schedule.afternoon_start, schedule.tolerance)
        }
        _ => 0,
    };

    morning.max(0) + afternoon.max(0)
}

fn kinds_alternate(sorted: &[(NaiveDateTime, &Punch)]) -> bool {
    sorted.iter().enumerate().all(|(index, (_, punch))| {
        let expected = if index % 2 == 0 {
            PunchKind::In
        } else {
            PunchKind::Out
        };
        punch.kind == expected
    })
}

fn resolved(slot: Slot<'_>) -> ResolvedTime {
    ResolvedTime {
        time: format_clock(slot.minutes),
        punch_id: slot.punch.id.clone(),
    }
}
