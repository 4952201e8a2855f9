//! Data models for the Attendance Engine.
//!
//! The `models` module defines the serialisable structs and enums that
//! flow through the engine: raw punches, per-employee schedules,
//! day-level justifications and the derived daily and monthly figures.
//! Inputs mirror the shape of the persisted documents (clock-times and
//! timestamps travel as strings) so that a single malformed field never
//! prevents the rest of a record from being used.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AttendanceError;
use crate::timecalc;

/// Direction of a clock event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PunchKind {
    In,
    Out,
}

/// A single clock-in or clock-out event.
///
/// Punches are immutable once recorded; corrections replace the
/// timestamp of a punch identified by `id` or delete it outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Punch {
    /// Unique identifier used by correction actions.
    pub id: String,
    /// The employee who produced the punch.
    pub employee_id: String,
    /// Local date and time of the event as an ISO 8601 string
    /// (`YYYY-MM-DDTHH:MM`).  Seconds are accepted and ignored.
    pub timestamp: String,
    pub kind: PunchKind,
}

impl Punch {
    /// Parses the timestamp, truncated to minute precision.  Returns
    /// `None` when the stored value is not a recognisable timestamp.
    pub fn parsed_timestamp(&self) -> Option<NaiveDateTime> {
        timecalc::parse_timestamp(&self.timestamp)
    }
}

/// Weekly schedule and lateness tolerance for one employee.
///
/// Every field is optional on the wire.  Missing or malformed values
/// fall back to the defaults documented on [`Schedule`] when the
/// configuration is resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Start of the morning half, `HH:MM`.
    #[serde(default)]
    pub morning_start: Option<String>,
    /// End of the morning half, `HH:MM`.
    #[serde(default)]
    pub morning_end: Option<String>,
    /// Start of the afternoon half, `HH:MM`.
    #[serde(default)]
    pub afternoon_start: Option<String>,
    /// End of the afternoon half, `HH:MM`.
    #[serde(default)]
    pub afternoon_end: Option<String>,
    /// Minutes of lateness forgiven before an arrival counts as late.
    #[serde(default)]
    pub tolerance_minutes: Option<i64>,
    /// Active weekdays, 0 = Sunday through 6 = Saturday.
    #[serde(default)]
    pub work_days: Option<Vec<u8>>,
}

impl ScheduleConfig {
    /// Resolves the configuration into minute offsets, substituting the
    /// default for every field that is absent or cannot be parsed.
    pub fn resolve(&self) -> Schedule {
        let defaults = Schedule::default();
        let clock = |value: &Option<String>, fallback: i64| {
            value
                .as_deref()
                .and_then(timecalc::parse_clock)
                .unwrap_or(fallback)
        };
        let work_days = match &self.work_days {
            Some(days) => days.iter().fold(0u8, |mask, day| {
                if *day <= 6 {
                    mask | (1u8 << *day)
                } else {
                    mask
                }
            }),
            None => defaults.work_days,
        };
        Schedule {
            morning_start: clock(&self.morning_start, defaults.morning_start),
            morning_end: clock(&self.morning_end, defaults.morning_end),
            afternoon_start: clock(&self.afternoon_start, defaults.afternoon_start),
            afternoon_end: clock(&self.afternoon_end, defaults.afternoon_end),
            tolerance: self
                .tolerance_minutes
                .filter(|t| *t >= 0)
                .map_or(defaults.tolerance, |t| t.min(timecalc::MINUTES_PER_DAY)),
            work_days,
        }
    }
}

/// A resolved schedule expressed in minutes since midnight.
///
/// The defaults are 08:30-12:30 / 13:30-17:30 with a ten minute
/// tolerance, Monday to Friday.  No ordering between the four
/// boundaries is enforced; the reconciler clamps negative segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub morning_start: i64,
    pub morning_end: i64,
    pub afternoon_start: i64,
    pub afternoon_end: i64,
    pub tolerance: i64,
    /// Bit `n` set means weekday `n` (0 = Sunday) is a work day.
    pub work_days: u8,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            morning_start: 8 * 60 + 30,
            morning_end: 12 * 60 + 30,
            afternoon_start: 13 * 60 + 30,
            afternoon_end: 17 * 60 + 30,
            tolerance: 10,
            work_days: 0b0011_1110,
        }
    }
}

impl Schedule {
    /// Whether `date` falls on one of the configured work days.
    pub fn is_work_day(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday().num_days_from_sunday();
        self.work_days & (1u8 << weekday) != 0
    }

    /// Contractual hours for a full day: both halves, each clamped at
    /// zero when its boundaries are inverted.
    pub fn contractual_hours(&self) -> f64 {
        let morning = (self.morning_end - self.morning_start).max(0);
        let afternoon = (self.afternoon_end - self.afternoon_start).max(0);
        (morning + afternoon) as f64 / 60.0
    }
}

/// Category of a day-level justification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JustificationType {
    /// Manual override marker; counts as no justification.
    Standard,
    /// Vacation.
    Ferie,
    /// Sick leave.
    Malattia,
    /// Partial-day leave, charged as permission-hours.
    Permesso,
    /// Public holiday.
    Festivo,
    /// Extended leave.
    Congedo,
    /// Unexcused absence.
    Ingiustificato,
}

impl JustificationType {
    /// Categories that cover the whole day and therefore exclude it
    /// from permission-hours accounting.
    pub fn is_whole_day(self) -> bool {
        matches!(
            self,
            Self::Ferie | Self::Malattia | Self::Festivo | Self::Ingiustificato | Self::Congedo
        )
    }
}

/// A manually entered classification of one employee-day.  At most one
/// exists per `(employee_id, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Justification {
    pub employee_id: String,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: JustificationType,
    /// Hours declared alongside the justification.  Informational; the
    /// computations derive deficits from the punches instead.
    #[serde(default)]
    pub hours_offset: f64,
}

/// An employee known to the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    /// Schedule for this employee.  Without one every day reconciles to
    /// zero hours and no flags.
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
}

/// A clock-time resolved from a punch, together with the punch it came
/// from so that the correction UI can edit it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTime {
    /// `HH:MM`.
    pub time: String,
    pub punch_id: String,
}

/// Payroll figures for one employee-day.  Always derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyOutcome {
    pub employee_id: String,
    pub date: NaiveDate,
    /// Ordinary hours, rounded to two decimals.
    pub standard_hours: f64,
    /// Overtime hours, a whole multiple of the overtime snap unit.
    pub overtime_hours: f64,
    pub is_late: bool,
    /// Odd number of punches on a past weekday.
    pub is_anomaly: bool,
    /// No punches and no justification on a past work day.
    pub is_absent: bool,
    /// The punch kinds do not alternate IN, OUT, IN, OUT.
    pub is_inconsistent: bool,
    /// Punches for the date that carried a parsable timestamp.
    pub punch_count: usize,
    pub first_in: Option<ResolvedTime>,
    pub lunch_out: Option<ResolvedTime>,
    pub lunch_in: Option<ResolvedTime>,
    pub last_out: Option<ResolvedTime>,
    pub justification: Option<JustificationType>,
}

impl DailyOutcome {
    /// An outcome with no hours, no flags and no resolved times.
    pub fn empty(employee_id: &str, date: NaiveDate) -> Self {
        Self {
            employee_id: employee_id.to_string(),
            date,
            standard_hours: 0.0,
            overtime_hours: 0.0,
            is_late: false,
            is_anomaly: false,
            is_absent: false,
            is_inconsistent: false,
            punch_count: 0,
            first_in: None,
            lunch_out: None,
            lunch_in: None,
            last_out: None,
            justification: None,
        }
    }
}

/// Accumulated payroll figures for one employee over a calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub employee_id: String,
    pub month: YearMonth,
    pub total_worked_hours: f64,
    pub total_overtime_hours: f64,
    /// Days with any ordinary hours recorded.
    pub days_worked: u32,
    pub late_count: u32,
    pub anomaly_count: u32,
    /// Reconciled absences plus days justified as unexcused.
    pub absence_count: u32,
    pub ferie_days: u32,
    pub malattia_days: u32,
    pub festivo_days: u32,
    pub congedo_days: u32,
    pub permesso_days: u32,
    /// Partial-day deficits not covered by a whole-day justification.
    pub permission_hours: f64,
}

impl MonthlySummary {
    pub fn new(employee_id: &str, month: YearMonth) -> Self {
        Self {
            employee_id: employee_id.to_string(),
            month,
            total_worked_hours: 0.0,
            total_overtime_hours: 0.0,
            days_worked: 0,
            late_count: 0,
            anomaly_count: 0,
            absence_count: 0,
            ferie_days: 0,
            malattia_days: 0,
            festivo_days: 0,
            congedo_days: 0,
            permesso_days: 0,
            permission_hours: 0.0,
        }
    }
}

/// A calendar month, written `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, AttendanceError> {
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(AttendanceError::InvalidInput(format!(
                "invalid month {year:04}-{month:02}"
            )));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        // Validated on construction.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    pub fn last_day(&self) -> NaiveDate {
        self.days().last().unwrap_or_else(|| self.first_day())
    }

    pub fn days_in_month(&self) -> u32 {
        let first = self.first_day();
        let next = first
            .checked_add_months(chrono::Months::new(1))
            .unwrap_or(first);
        (next - first).num_days() as u32
    }

    /// Every date of the month, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let (year, month) = (self.year, self.month);
        (1..=self.days_in_month()).filter_map(move |day| NaiveDate::from_ymd_opt(year, month, day))
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = AttendanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AttendanceError::InvalidInput(format!("expected YYYY-MM, got {s:?}"));
        let (year, month) = s.trim().split_once('-').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl Serialize for YearMonth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
