//! Record storage behind an explicit repository interface.
//!
//! The engine never reads storage itself; callers fetch snapshots of
//! punches and justifications through [`AttendanceRepository`] and pass
//! them in as slices.  [`InMemoryRepository`] keeps every collection in
//! memory and can be loaded from, and written back to, a single JSON
//! document tagged with a schema version.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{AttendanceError, Result};
use crate::models::{Employee, Justification, Punch};
use crate::timecalc;

/// Schema version written to and accepted from snapshot documents.
pub const SCHEMA_VERSION: u32 = 1;

/// Read and write access to the attendance records.
///
/// Implementations must be thread-safe (`Send + Sync`) because the
/// HTTP layer shares one repository across requests.
pub trait AttendanceRepository: Send + Sync {
    fn employees(&self) -> Vec<Employee>;

    fn employee(&self, id: &str) -> Option<Employee>;

    fn upsert_employee(&mut self, employee: Employee);

    /// Punches of `employee_id` whose timestamp date lies within
    /// `from..=to`, in insertion order.  Punches with an unparsable
    /// timestamp are included so the engine can report them.
    fn punches_for(&self, employee_id: &str, from: NaiveDate, to: NaiveDate) -> Vec<Punch>;

    fn insert_punch(&mut self, punch: Punch) -> Result<()>;

    /// Replaces the timestamp of the punch identified by `id`.
    fn update_punch_timestamp(&mut self, id: &str, timestamp: &str) -> Result<Punch>;

    fn delete_punch(&mut self, id: &str) -> Result<Punch>;

    fn justifications_for(
        &self,
        employee_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<Justification>;

    fn justification(&self, employee_id: &str, date: NaiveDate) -> Option<Justification>;

    /// Inserts or replaces the justification for
    /// `(employee_id, date)`.
    fn upsert_justification(&mut self, justification: Justification);

    fn delete_justification(&mut self, employee_id: &str, date: NaiveDate) -> Result<Justification>;
}

/// The persisted document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    #[serde(default)]
    pub employees: Vec<Employee>,
    #[serde(default)]
    pub punches: Vec<Punch>,
    #[serde(default)]
    pub justifications: Vec<Justification>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    employees: Vec<Employee>,
    punches: Vec<Punch>,
    justifications: Vec<Justification>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        if snapshot.schema_version != SCHEMA_VERSION {
            return Err(AttendanceError::Schema {
                found: snapshot.schema_version,
                expected: SCHEMA_VERSION,
            });
        }
        let mut repo = Self::new();
        for employee in snapshot.employees {
            repo.upsert_employee(employee);
        }
        for punch in snapshot.punches {
            repo.insert_punch(punch)?;
        }
        for justification in snapshot.justifications {
            repo.upsert_justification(justification);
        }
        Ok(repo)
    }

    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            schema_version: SCHEMA_VERSION,
            employees: self.employees.clone(),
            punches: self.punches.clone(),
            justifications: self.justifications.clone(),
        }
    }

    /// Loads a snapshot document.  A missing file yields an empty
    /// repository.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "snapshot not found; starting empty");
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&data)?;
        let repo = Self::from_snapshot(snapshot)?;
        info!(
            path = %path.display(),
            employees = repo.employees.len(),
            punches = repo.punches.len(),
            justifications = repo.justifications.len(),
            "loaded snapshot"
        );
        Ok(repo)
    }

    /// Writes the snapshot to a sibling temporary file and renames it
    /// over `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.to_snapshot())?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// All punches, in insertion order.
    pub fn punches(&self) -> &[Punch] {
        &self.punches
    }

    /// All justifications.
    pub fn justifications(&self) -> &[Justification] {
        &self.justifications
    }
}

fn punch_date(punch: &Punch) -> Option<NaiveDate> {
    punch.parsed_timestamp().map(|ts| ts.date())
}

impl AttendanceRepository for InMemoryRepository {
    fn employees(&self) -> Vec<Employee> {
        self.employees.clone()
    }

    fn employee(&self, id: &str) -> Option<Employee> {
        self.employees.iter().find(|e| e.id == id).cloned()
    }

    fn upsert_employee(&mut self, employee: Employee) {
        match self.employees.iter_mut().find(|e| e.id == employee.id) {
            Some(existing) => *existing = employee,
            None => self.employees.push(employee),
        }
    }

    fn punches_for(&self, employee_id: &str, from: NaiveDate, to: NaiveDate) -> Vec<Punch> {
        self.punches
            .iter()
            .filter(|p| p.employee_id == employee_id)
            .filter(|p| match punch_date(p) {
                Some(date) => date >= from && date <= to,
                None => true,
            })
            .cloned()
            .collect()
    }

    fn insert_punch(&mut self, punch: Punch) -> Result<()> {
        if punch.id.trim().is_empty() {
            return Err(AttendanceError::InvalidInput("punch id must not be empty".into()));
        }
        if self.punches.iter().any(|p| p.id == punch.id) {
            return Err(AttendanceError::Conflict(format!(
                "punch {} already exists",
                punch.id
            )));
        }
        self.punches.push(punch);
        Ok(())
    }

    fn update_punch_timestamp(&mut self, id: &str, timestamp: &str) -> Result<Punch> {
        if timecalc::parse_timestamp(timestamp).is_none() {
            return Err(AttendanceError::InvalidInput(format!(
                "invalid timestamp {timestamp:?}"
            )));
        }
        let punch = self
            .punches
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| AttendanceError::NotFound(format!("punch {id}")))?;
        punch.timestamp = timestamp.to_string();
        Ok(punch.clone())
    }

    fn delete_punch(&mut self, id: &str) -> Result<Punch> {
        let index = self
            .punches
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| AttendanceError::NotFound(format!("punch {id}")))?;
        Ok(self.punches.remove(index))
    }

    fn justifications_for(
        &self,
        employee_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<Justification> {
        self.justifications
            .iter()
            .filter(|j| j.employee_id == employee_id && j.date >= from && j.date <= to)
            .cloned()
            .collect()
    }

    fn justification(&self, employee_id: &str, date: NaiveDate) -> Option<Justification> {
        self.justifications
            .iter()
            .find(|j| j.employee_id == employee_id && j.date == date)
            .cloned()
    }

    fn upsert_justification(&mut self, justification: Justification) {
        match self
            .justifications
            .iter_mut()
            .find(|j| j.employee_id == justification.employee_id && j.date == justification.date)
        {
            Some(existing) => *existing = justification,
            None => self.justifications.push(justification),
        }
    }

    fn delete_justification(
        &mut self,
        employee_id: &str,
        date: NaiveDate,
    ) -> Result<Justification> {
        let index = self
            .justifications
            .iter()
            .position(|j| j.employee_id == employee_id && j.date == date)
            .ok_or_else(|| {
                AttendanceError::NotFound(format!("justification {employee_id} {date}"))
            })?;
        Ok(self.justifications.remove(index))
    }
}
