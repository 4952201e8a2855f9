//! Engine and server configuration.
//!
//! [`EngineConfig`] carries the operator-level snapping policy and is
//! passed explicitly into the reconciler and aggregator.  [`ServerConfig`]
//! is read from `ATTENDANCE_*` environment variables by the binary.

use crate::timecalc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

/// Global snapping policy.  Never employee-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Overtime is floored to whole multiples of this many minutes.
    pub overtime_snap_minutes: i64,
    /// Early departures are charged in whole multiples of this many
    /// minutes.
    pub permesso_snap_minutes: i64,
    /// Whether a short, unjustified work day accrues permission-hours.
    pub implicit_permission_hours: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            overtime_snap_minutes: 30,
            permesso_snap_minutes: 15,
            implicit_permission_hours: true,
        }
    }
}

/// Settings for the HTTP binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub snapshot_path: PathBuf,
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.  Values
    /// that fail to parse fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            overtime_snap_minutes: parse_or(
                &lookup,
                "ATTENDANCE_OVERTIME_SNAP",
                defaults.overtime_snap_minutes,
            )
            .clamp(1, timecalc::MINUTES_PER_DAY),
            permesso_snap_minutes: parse_or(
                &lookup,
                "ATTENDANCE_PERMESSO_SNAP",
                defaults.permesso_snap_minutes,
            )
            .clamp(1, timecalc::MINUTES_PER_DAY),
            implicit_permission_hours: parse_or(
                &lookup,
                "ATTENDANCE_IMPLICIT_PERMISSION",
                defaults.implicit_permission_hours,
            ),
        };
        Self {
            bind_addr: lookup("ATTENDANCE_BIND_ADDR")
                .unwrap_or_else(|| "127.0.0.1:3000".to_string()),
            snapshot_path: lookup("ATTENDANCE_SNAPSHOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("attendance.json")),
            engine,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Debug,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, ?default, "ignoring malformed configuration value");
            default
        }),
        None => default,
    }
}
