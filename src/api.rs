//! HTTP API for the Attendance Engine.
//!
//! This module exposes the engine to the dashboard and export tooling
//! using the [`axum`](https://crates.io/crates/axum) framework.  Read
//! endpoints recompute daily outcomes and monthly summaries from the
//! stored records on every request; correction endpoints only touch the
//! records themselves and never cache derived figures.

use crate::aggregator::{aggregate, run_month};
use crate::config::{EngineConfig, ServerConfig};
use crate::error::AttendanceError;
use crate::models::{DailyOutcome, Employee, Justification, MonthlySummary, Punch, YearMonth};
use crate::reconciler::reconcile;
use crate::repository::{AttendanceRepository, InMemoryRepository};
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Application state shared across requests.
pub struct AppState {
    pub repo: RwLock<InMemoryRepository>,
    pub config: EngineConfig,
    /// Where the snapshot is written after each correction.  `None`
    /// keeps everything in memory.
    pub snapshot_path: Option<PathBuf>,
    /// Reference date for the "in the past" rules.
    pub today: fn() -> NaiveDate,
}

impl AppState {
    pub fn new(
        repo: InMemoryRepository,
        config: EngineConfig,
        snapshot_path: Option<PathBuf>,
    ) -> Self {
        Self {
            repo: RwLock::new(repo),
            config,
            snapshot_path,
            today: local_today,
        }
    }

    /// Applies `change` to a copy of the store, writes the copy to the
    /// snapshot and only then swaps it in.  A failed write leaves the
    /// store untouched.
    async fn commit<T, F>(&self, change: F) -> ApiResult<T>
    where
        F: FnOnce(&mut InMemoryRepository) -> ApiResult<T>,
    {
        let mut repo = self.repo.write().await;
        let mut staged = repo.clone();
        let value = change(&mut staged)?;
        let staged = match &self.snapshot_path {
            Some(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || staged.save(&path).map(|()| staged))
                    .await
                    .map_err(join_error)??
            }
            None => staged,
        };
        *repo = staged;
        Ok(value)
    }
}

fn join_error(err: tokio::task::JoinError) -> AttendanceError {
    AttendanceError::Io(std::io::Error::other(err))
}

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

impl IntoResponse for AttendanceError {
    fn into_response(self) -> Response {
        let status = match &self {
            AttendanceError::NotFound(_) => StatusCode::NOT_FOUND,
            AttendanceError::Conflict(_) => StatusCode::CONFLICT,
            AttendanceError::InvalidInput(_) | AttendanceError::Schema { .. } => {
                StatusCode::BAD_REQUEST
            }
            AttendanceError::Io(_) | AttendanceError::Json(_) => {
                error!(error = %self, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, AttendanceError>;

/// Build the API router around the given state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/employees", put(upsert_employee_handler))
        .route("/api/employees/:id/days/:date", get(daily_handler))
        .route("/api/employees/:id/months/:month", get(monthly_handler))
        .route("/api/months/:month", get(payroll_handler))
        .route("/api/punches", post(insert_punch_handler))
        .route(
            "/api/punches/:id",
            put(correct_punch_handler).delete(delete_punch_handler),
        )
        .route("/api/justifications", put(upsert_justification_handler))
        .route(
            "/api/employees/:id/justifications/:date",
            delete(delete_justification_handler),
        )
        .with_state(state)
}

fn parse_date(raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AttendanceError::InvalidInput(format!("expected YYYY-MM-DD, got {raw:?}")))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// Handler for GET /api/employees/:id/days/:date
async fn daily_handler(
    State(state): State<Arc<AppState>>,
    Path((employee_id, date)): Path<(String, String)>,
) -> ApiResult<Json<DailyOutcome>> {
    let date = parse_date(&date)?;
    let repo = state.repo.read().await;
    let employee = repo
        .employee(&employee_id)
        .ok_or_else(|| AttendanceError::NotFound(format!("employee {employee_id}")))?;
    let punches = repo.punches_for(&employee.id, date, date);
    let justification = repo.justification(&employee.id, date);
    Ok(Json(reconcile(
        &employee.id,
        date,
        &punches,
        employee.schedule.as_ref(),
        justification.as_ref(),
        &state.config,
        (state.today)(),
    )))
}

/// Handler for GET /api/employees/:id/months/:month
async fn monthly_handler(
    State(state): State<Arc<AppState>>,
    Path((employee_id, month)): Path<(String, String)>,
) -> ApiResult<Json<MonthlySummary>> {
    let month: YearMonth = month.parse()?;
    let repo = state.repo.read().await;
    let employee = repo
        .employee(&employee_id)
        .ok_or_else(|| AttendanceError::NotFound(format!("employee {employee_id}")))?;
    let punches = repo.punches_for(&employee.id, month.first_day(), month.last_day());
    let justifications =
        repo.justifications_for(&employee.id, month.first_day(), month.last_day());
    Ok(Json(aggregate(
        &employee.id,
        month,
        &punches,
        &justifications,
        employee.schedule.as_ref(),
        &state.config,
        (state.today)(),
    )))
}

/// Handler for GET /api/months/:month
async fn payroll_handler(
    State(state): State<Arc<AppState>>,
    Path(month): Path<String>,
) -> ApiResult<Json<Vec<MonthlySummary>>> {
    let month: YearMonth = month.parse()?;
    let (employees, punches, justifications) = {
        let repo = state.repo.read().await;
        (
            repo.employees(),
            repo.punches().to_vec(),
            repo.justifications().to_vec(),
        )
    };
    let config = state.config;
    let today = (state.today)();
    let summaries = tokio::task::spawn_blocking(move || {
        run_month(&employees, month, &punches, &justifications, &config, today)
    })
    .await
    .map_err(join_error)?;
    Ok(Json(summaries))
}

/// Handler for PUT /api/employees
async fn upsert_employee_handler(
    State(state): State<Arc<AppState>>,
    Json(employee): Json<Employee>,
) -> ApiResult<Json<Employee>> {
    if employee.id.trim().is_empty() {
        return Err(AttendanceError::InvalidInput("employee id must not be empty".into()));
    }
    let saved = employee.clone();
    state
        .commit(move |repo| {
            repo.upsert_employee(saved);
            Ok(())
        })
        .await?;
    info!(employee_id = %employee.id, "employee saved");
    Ok(Json(employee))
}

/// Handler for POST /api/punches
async fn insert_punch_handler(
    State(state): State<Arc<AppState>>,
    Json(punch): Json<Punch>,
) -> ApiResult<(StatusCode, Json<Punch>)> {
    if punch.parsed_timestamp().is_none() {
        return Err(AttendanceError::InvalidInput(format!(
            "invalid timestamp {:?}",
            punch.timestamp
        )));
    }
    let recorded = punch.clone();
    state.commit(move |repo| repo.insert_punch(recorded)).await?;
    info!(punch_id = %punch.id, employee_id = %punch.employee_id, "punch recorded");
    Ok((StatusCode::CREATED, Json(punch)))
}

#[derive(Debug, Deserialize)]
pub struct PunchCorrection {
    pub timestamp: String,
}

/// Handler for PUT /api/punches/:id
async fn correct_punch_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(correction): Json<PunchCorrection>,
) -> ApiResult<Json<Punch>> {
    let punch = state
        .commit(|repo| repo.update_punch_timestamp(&id, &correction.timestamp))
        .await?;
    info!(punch_id = %id, timestamp = %punch.timestamp, "punch corrected");
    Ok(Json(punch))
}

/// Handler for DELETE /api/punches/:id
async fn delete_punch_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.commit(|repo| repo.delete_punch(&id)).await?;
    info!(punch_id = %id, "punch deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for PUT /api/justifications
async fn upsert_justification_handler(
    State(state): State<Arc<AppState>>,
    Json(justification): Json<Justification>,
) -> ApiResult<Json<Justification>> {
    let saved = justification.clone();
    state
        .commit(move |repo| {
            repo.upsert_justification(saved);
            Ok(())
        })
        .await?;
    info!(
        employee_id = %justification.employee_id,
        date = %justification.date,
        kind = ?justification.kind,
        "justification saved"
    );
    Ok(Json(justification))
}

/// Handler for DELETE /api/employees/:id/justifications/:date
async fn delete_justification_handler(
    State(state): State<Arc<AppState>>,
    Path((employee_id, date)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let date = parse_date(&date)?;
    state
        .commit(|repo| repo.delete_justification(&employee_id, date))
        .await?;
    info!(%employee_id, %date, "justification deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Launch the API server.  Loads the snapshot named in `config`, binds
/// to the configured address and blocks until the server terminates.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let repo = InMemoryRepository::load(&config.snapshot_path)?;
    let state = Arc::new(AppState::new(
        repo,
        config.engine,
        Some(config.snapshot_path.clone()),
    ));
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
