//! Run CRUD + cancel (spec.md §5 Cancellation, §7 user-visible failures).
//! Reads are plain passthroughs onto `db::repository::runs`; the processor
//! (`engine` crate) owns every other mutation to a run's state.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::AppState;
use db::models::{RunRow, StepExecutionRow};

fn db_err(e: db::DbError) -> StatusCode {
    match e {
        db::DbError::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn get(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<RunRow>, StatusCode> {
    db::repository::runs::get_run(&state.pool, id).await.map(Json).map_err(db_err)
}

/// `GET /api/v1/runs/:id/steps` — every attempt of every step, chronological.
pub async fn list_step_executions(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<Vec<StepExecutionRow>>, StatusCode> {
    db::repository::step_executions::list_for_run(&state.pool, id).await.map(Json).map_err(db_err)
}

/// `POST /api/v1/runs/:id/cancel` — only takes effect while `status ∈
/// {pending, running}` (spec.md §5). In-flight handlers are not interrupted;
/// the next processor cycle observes the non-running status and stops.
pub async fn cancel(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<RunRow>, StatusCode> {
    db::repository::runs::cancel_if_active(&state.pool, id).await.map_err(db_err)?;
    db::repository::runs::get_run(&state.pool, id).await.map(Json).map_err(db_err)
}
