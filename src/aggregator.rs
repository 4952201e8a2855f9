//! Monthly aggregation.
//!
//! The aggregator folds the daily reconciler over every day of a
//! calendar month and reconciles the results against the day-level
//! justifications.  Nothing is carried between days except the running
//! totals, so a summary is always recomputed in full from the punch
//! and justification history it is given.  [`run_month`] uses the
//! [`rayon`] crate to process employees in parallel.

use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::models::{
    Employee, Justification, JustificationType, MonthlySummary, Punch, ScheduleConfig, YearMonth,
};
use crate::reconciler::reconcile;
use crate::timecalc::round2;

/// Computes the monthly summary for one employee.
///
/// `punches` and `justifications` may cover any period and any
/// employee; records outside `employee_id` and `month` are ignored.
/// When several justifications exist for the same day the last one
/// wins, matching upsert semantics.
pub fn aggregate(
    employee_id: &str,
    month: YearMonth,
    punches: &[Punch],
    justifications: &[Justification],
    schedule: Option<&ScheduleConfig>,
    config: &EngineConfig,
    today: NaiveDate,
) -> MonthlySummary {
    let punches_by_day = group_punches(employee_id, month, punches);
    let justification_by_day: HashMap<NaiveDate, &Justification> = justifications
        .iter()
        .filter(|j| j.employee_id == employee_id)
        .filter(|j| j.date >= month.first_day() && j.date <= month.last_day())
        .map(|j| (j.date, j))
        .collect();
    let resolved = schedule.map(ScheduleConfig::resolve);
    let contractual_hours = resolved.map_or(0.0, |s| s.contractual_hours());

    let mut summary = MonthlySummary::new(employee_id, month);
    let mut permission_hours = 0.0;

    for date in month.days() {
        let day_punches = punches_by_day.get(&date).map_or(&[][..], Vec::as_slice);
        let justification = justification_by_day.get(&date).copied();
        let kind = justification.map(|j| j.kind);
        let outcome = reconcile(
            employee_id,
            date,
            day_punches,
            schedule,
            justification,
            config,
            today,
        );

        summary.total_worked_hours += outcome.standard_hours;
        summary.total_overtime_hours += outcome.overtime_hours;
        if outcome.standard_hours > 0.0 {
            summary.days_worked += 1;
        }
        if outcome.is_late {
            summary.late_count += 1;
        }
        if outcome.is_anomaly {
            summary.anomaly_count += 1;
        }
        if outcome.is_absent || kind == Some(JustificationType::Ingiustificato) {
            summary.absence_count += 1;
        }
        match kind {
            Some(JustificationType::Ferie) => summary.ferie_days += 1,
            Some(JustificationType::Malattia) => summary.malattia_days += 1,
            Some(JustificationType::Festivo) => summary.festivo_days += 1,
            Some(JustificationType::Congedo) => summary.congedo_days += 1,
            Some(JustificationType::Permesso) => summary.permesso_days += 1,
            Some(JustificationType::Standard | JustificationType::Ingiustificato) | None => {}
        }

        let work_day = resolved.is_some_and(|s| s.is_work_day(date));
        if work_day && !kind.is_some_and(JustificationType::is_whole_day) {
            permission_hours += permission_deficit(
                kind,
                outcome.standard_hours,
                contractual_hours,
                config,
            );
        }
    }

    summary.total_worked_hours = round2(summary.total_worked_hours);
    summary.total_overtime_hours = round2(summary.total_overtime_hours);
    summary.permission_hours = round2(permission_hours);

    debug!(
        employee_id,
        %month,
        total_worked_hours = summary.total_worked_hours,
        permission_hours = summary.permission_hours,
        absence_count = summary.absence_count,
        "aggregated month"
    );
    summary
}

/// Permission-hours charged for one work day that is not covered by a
/// whole-day justification.
///
/// A declared partial leave is charged the whole deficit against the
/// contractual day.  A day with no justification (or only the
/// `STANDARD` marker) is charged its shortfall when some hours were
/// worked, unless the implicit policy is switched off.
fn permission_deficit(
    kind: Option<JustificationType>,
    worked: f64,
    contractual: f64,
    config: &EngineConfig,
) -> f64 {
    match kind {
        Some(JustificationType::Permesso) => (contractual - worked).max(0.0),
        None | Some(JustificationType::Standard)
            if config.implicit_permission_hours && worked > 0.0 && worked < contractual =>
        {
            contractual - worked
        }
        _ => 0.0,
    }
}

/// Buckets the employee's punches for `month` by calendar day,
/// preserving their original order within each day.
fn group_punches(
    employee_id: &str,
    month: YearMonth,
    punches: &[Punch],
) -> HashMap<NaiveDate, Vec<Punch>> {
    let mut by_day: HashMap<NaiveDate, Vec<Punch>> = HashMap::new();
    for punch in punches.iter().filter(|p| p.employee_id == employee_id) {
        let Some(ts) = punch.parsed_timestamp() else {
            warn!(
                employee_id,
                punch_id = %punch.id,
                timestamp = %punch.timestamp,
                "skipping punch with unparsable timestamp"
            );
            continue;
        };
        let date = ts.date();
        if date >= month.first_day() && date <= month.last_day() {
            by_day.entry(date).or_default().push(punch.clone());
        }
    }
    by_day
}

/// Computes the monthly summaries of every employee, in the order the
/// employees are given.  Each employee uses their own schedule.
pub fn run_month(
    employees: &[Employee],
    month: YearMonth,
    punches: &[Punch],
    justifications: &[Justification],
    config: &EngineConfig,
    today: NaiveDate,
) -> Vec<MonthlySummary> {
    info!(%month, employees = employees.len(), "running monthly aggregation");
    employees
        .par_iter()
        .map(|employee| {
            aggregate(
                &employee.id,
                month,
                punches,
                justifications,
                employee.schedule.as_ref(),
                config,
                today,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PunchKind;
    use chrono::{Datelike, Weekday};

    fn march() -> YearMonth {
        YearMonth::new(2025, 3).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    fn weekdays() -> Vec<NaiveDate> {
        march()
            .days()
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .collect()
    }

    fn day(employee: &str, date: NaiveDate, times: &[&str]) -> Vec<Punch> {
        times
            .iter()
            .enumerate()
            .map(|(i, time)| Punch {
                id: format!("{employee}-{date}-{i}"),
                employee_id: employee.to_string(),
                timestamp: format!("{date}T{time}"),
                kind: if i % 2 == 0 {
                    PunchKind::In
                } else {
                    PunchKind::Out
                },
            })
            .collect()
    }

    fn justify(date: NaiveDate, kind: JustificationType) -> Justification {
        Justification {
            employee_id: "e1".to_string(),
            date,
            kind,
            hours_offset: 0.0,
        }
    }

    fn full_month(employee: &str) -> Vec<Punch> {
        weekdays()
            .into_iter()
            .flat_map(|d| day(employee, d, &["08:30", "12:30", "13:30", "17:30"]))
            .collect()
    }

    fn summarise(punches: &[Punch], justifications: &[Justification]) -> MonthlySummary {
        summarise_with(punches, justifications, &EngineConfig::default())
    }

    fn summarise_with(
        punches: &[Punch],
        justifications: &[Justification],
        config: &EngineConfig,
    ) -> MonthlySummary {
        let schedule = ScheduleConfig::default();
        aggregate(
            "e1",
            march(),
            punches,
            justifications,
            Some(&schedule),
            config,
            today(),
        )
    }

    #[test]
    fn test_full_month_of_regular_days() {
        assert_eq!(weekdays().len(), 21);
        let summary = summarise(&full_month("e1"), &[]);
        assert_eq!(summary.total_worked_hours, 168.0);
        assert_eq!(summary.days_worked, 21);
        assert_eq!(summary.absence_count, 0);
        assert_eq!(summary.late_count, 0);
        assert_eq!(summary.permission_hours, 0.0);
        assert_eq!(summary.month, march());
    }

    #[test]
    fn test_empty_month_is_all_absences() {
        let summary = summarise(&[], &[]);
        assert_eq!(summary.absence_count, 21);
        assert_eq!(summary.days_worked, 0);
        assert_eq!(summary.permission_hours, 0.0);
    }

    #[test]
    fn test_sick_day_counts_once_and_is_not_absent() {
        // 2025-03-04 has no punches and is covered by sick leave.
        let punches: Vec<Punch> = full_month("e1")
            .into_iter()
            .filter(|p| !p.timestamp.starts_with("2025-03-04"))
            .collect();
        let summary = summarise(&punches, &[justify(date(4), JustificationType::Malattia)]);
        assert_eq!(summary.malattia_days, 1);
        assert_eq!(summary.absence_count, 0);
        assert_eq!(summary.days_worked, 20);
        assert_eq!(summary.permission_hours, 0.0);
    }

    #[test]
    fn test_unexcused_absence_is_not_double_counted() {
        let punches: Vec<Punch> = full_month("e1")
            .into_iter()
            .filter(|p| !p.timestamp.starts_with("2025-03-05"))
            .collect();
        let summary = summarise(
            &punches,
            &[justify(date(5), JustificationType::Ingiustificato)],
        );
        assert_eq!(summary.absence_count, 1);
        assert_eq!(summary.permission_hours, 0.0);
    }

    #[test]
    fn test_declared_partial_leave_charges_full_deficit() {
        let mut punches: Vec<Punch> = full_month("e1")
            .into_iter()
            .filter(|p| !p.timestamp.starts_with("2025-03-06"))
            .collect();
        punches.extend(day("e1", date(6), &["08:30", "12:30"]));
        let summary = summarise(&punches, &[justify(date(6), JustificationType::Permesso)]);
        assert_eq!(summary.permesso_days, 1);
        assert_eq!(summary.permission_hours, 4.0);
        assert_eq!(summary.total_worked_hours, 164.0);
    }

    #[test]
    fn test_declared_leave_with_full_hours_charges_nothing() {
        let mut punches: Vec<Punch> = full_month("e1")
            .into_iter()
            .filter(|p| !p.timestamp.starts_with("2025-03-06"))
            .collect();
        punches.extend(day("e1", date(6), &["08:30", "12:30", "13:30", "19:00"]));
        let summary = summarise(&punches, &[justify(date(6), JustificationType::Permesso)]);
        assert_eq!(summary.permesso_days, 1);
        assert_eq!(summary.permission_hours, 0.0);
        assert_eq!(summary.total_worked_hours, 168.0);
        assert_eq!(summary.total_overtime_hours, 1.5);
    }

    #[test]
    fn test_permission_deficit_is_floored_at_zero() {
        let config = EngineConfig::default();
        let permesso = Some(JustificationType::Permesso);
        assert_eq!(permission_deficit(permesso, 9.0, 8.0, &config), 0.0);
        assert_eq!(permission_deficit(permesso, 8.0, 8.0, &config), 0.0);
        assert_eq!(permission_deficit(permesso, 0.0, 8.0, &config), 8.0);
        assert_eq!(permission_deficit(None, 9.0, 8.0, &config), 0.0);
    }

    #[test]
    fn test_declared_leave_on_rest_days_charges_nothing() {
        let mut punches = full_month("e1");
        // 2025-03-08 and 2025-03-09 are a weekend.
        punches.extend(day("e1", date(8), &["09:00", "11:00"]));
        let summary = summarise(
            &punches,
            &[
                justify(date(8), JustificationType::Permesso),
                justify(date(9), JustificationType::Permesso),
            ],
        );
        assert_eq!(summary.permesso_days, 2);
        assert_eq!(summary.permission_hours, 0.0);
        assert_eq!(summary.days_worked, 22);
        assert_eq!(summary.absence_count, 0);
    }

    #[test]
    fn test_unexplained_short_day_accrues_permission_hours() {
        let mut punches: Vec<Punch> = full_month("e1")
            .into_iter()
            .filter(|p| !p.timestamp.starts_with("2025-03-07"))
            .collect();
        punches.extend(day("e1", date(7), &["08:30", "12:30", "13:30", "16:00"]));

        let summary = summarise(&punches, &[]);
        assert_eq!(summary.permission_hours, 1.5);

        let standard = summarise(&punches, &[justify(date(7), JustificationType::Standard)]);
        assert_eq!(standard.permission_hours, 1.5);

        let strict = EngineConfig {
            implicit_permission_hours: false,
            ..EngineConfig::default()
        };
        assert_eq!(summarise_with(&punches, &[], &strict).permission_hours, 0.0);

        let vacation = summarise(&punches, &[justify(date(7), JustificationType::Ferie)]);
        assert_eq!(vacation.permission_hours, 0.0);
        assert_eq!(vacation.ferie_days, 1);
        assert_eq!(vacation.days_worked, 21);
    }

    #[test]
    fn test_weekend_work_never_accrues_permission_hours() {
        let mut punches = full_month("e1");
        // 2025-03-08 is a Saturday.
        punches.extend(day("e1", date(8), &["09:00", "11:00"]));
        let summary = summarise(&punches, &[]);
        assert_eq!(summary.permission_hours, 0.0);
        assert_eq!(summary.days_worked, 22);
    }

    #[test]
    fn test_permission_hours_sum_across_days() {
        let mut punches: Vec<Punch> = full_month("e1")
            .into_iter()
            .filter(|p| {
                !p.timestamp.starts_with("2025-03-10") && !p.timestamp.starts_with("2025-03-11")
            })
            .collect();
        punches.extend(day("e1", date(10), &["08:30", "12:30", "13:30", "17:10"]));
        punches.extend(day("e1", date(11), &["08:30", "12:30", "13:30", "16:50"]));
        // 17:10 is charged as 17:00, 16:50 as 16:45.
        let summary = summarise(&punches, &[]);
        assert_eq!(summary.permission_hours, 1.25);
    }

    #[test]
    fn test_lateness_overtime_and_anomalies_are_totalled() {
        let mut punches: Vec<Punch> = full_month("e1")
            .into_iter()
            .filter(|p| {
                !p.timestamp.starts_with("2025-03-12") && !p.timestamp.starts_with("2025-03-13")
            })
            .collect();
        punches.extend(day("e1", date(12), &["08:50", "12:30", "13:30", "19:00"]));
        punches.extend(day("e1", date(13), &["08:30", "12:30", "13:30"]));
        let summary = summarise(&punches, &[]);
        assert_eq!(summary.late_count, 1);
        assert_eq!(summary.total_overtime_hours, 1.5);
        assert_eq!(summary.anomaly_count, 1);
        // 19 full days, 7.5 on the 12th and 4 on the 13th.
        assert_eq!(summary.total_worked_hours, 163.5);
    }

    #[test]
    fn test_future_days_are_not_absences() {
        let schedule = ScheduleConfig::default();
        let summary = aggregate(
            "e1",
            march(),
            &[],
            &[],
            Some(&schedule),
            &EngineConfig::default(),
            date(15),
        );
        // Weekdays 3..=14 precede the 15th.
        assert_eq!(summary.absence_count, 10);
    }

    #[test]
    fn test_records_outside_month_or_employee_are_ignored() {
        let mut punches = full_month("e1");
        punches.extend(day(
            "e1",
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            &["08:30", "17:30"],
        ));
        punches.extend(full_month("e2"));
        let justifications = vec![Justification {
            employee_id: "e2".to_string(),
            ..justify(date(4), JustificationType::Ferie)
        }];
        let summary = summarise(&punches, &justifications);
        assert_eq!(summary.total_worked_hours, 168.0);
        assert_eq!(summary.ferie_days, 0);
    }

    #[test]
    fn test_missing_schedule_yields_zero_summary() {
        let summary = aggregate(
            "e1",
            march(),
            &full_month("e1"),
            &[],
            None,
            &EngineConfig::default(),
            today(),
        );
        assert_eq!(summary, MonthlySummary::new("e1", march()));
    }

    #[test]
    fn test_run_month_keeps_employee_order() {
        let employees = vec![
            Employee {
                id: "e2".into(),
                name: "Bianca".into(),
                schedule: Some(ScheduleConfig::default()),
            },
            Employee {
                id: "e1".into(),
                name: "Aldo".into(),
                schedule: Some(ScheduleConfig::default()),
            },
        ];
        let mut punches = full_month("e1");
        punches.extend(day("e2", date(3), &["08:30", "17:30"]));
        let summaries = run_month(
            &employees,
            march(),
            &punches,
            &[],
            &EngineConfig::default(),
            today(),
        );
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].employee_id, "e2");
        assert_eq!(summaries[0].total_worked_hours, 8.0);
        assert_eq!(summaries[0].absence_count, 20);
        assert_eq!(summaries[1].employee_id, "e1");
        assert_eq!(summaries[1].total_worked_hours, 168.0);
    }
}
