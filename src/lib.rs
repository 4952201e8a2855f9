//! Attendance Engine library crate.
//!
//! This crate turns raw clock punches into payroll figures.  The
//! [`reconciler`] derives one employee-day at a time and the
//! [`aggregator`] folds it over a calendar month.  Both are pure
//! functions of the records passed in; storage sits behind the
//! [`repository`] interface and the HTTP surface lives in [`api`].

pub mod aggregator;
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod reconciler;
pub mod repository;
pub mod timecalc;
