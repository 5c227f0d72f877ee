//! Step CRUD, nested under a workflow (spec.md §3; CRUD surface is a
//! supplemented feature — see DESIGN.md). Order is assigned server-side on
//! create and re-densified on delete (`db::repository::steps`).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use db::models::StepRow;

fn db_err(e: db::DbError) -> StatusCode {
    match e {
        db::DbError::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Deserialize)]
pub struct CreateStepDto {
    pub name: String,
    pub step_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub retry_policy: Option<serde_json::Value>,
    #[serde(default)]
    pub timeout_ms: Option<i32>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct UpdateStepDto {
    pub name: String,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub retry_policy: Option<serde_json::Value>,
    #[serde(default)]
    pub timeout_ms: Option<i32>,
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

pub async fn list(Path(workflow_id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<Vec<StepRow>>, StatusCode> {
    db::repository::steps::list_steps(&state.pool, workflow_id).await.map(Json).map_err(db_err)
}

pub async fn create(
    Path(workflow_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(dto): Json<CreateStepDto>,
) -> Result<(StatusCode, Json<StepRow>), StatusCode> {
    if dto.step_type.parse::<db::models::StepType>().is_err() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if dto.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    db::repository::steps::create_step(
        &state.pool,
        workflow_id,
        &dto.name,
        &dto.step_type,
        dto.config,
        dto.retry_policy,
        dto.timeout_ms,
        dto.enabled,
    )
    .await
    .map(|s| (StatusCode::CREATED, Json(s)))
    .map_err(db_err)
}

pub async fn get(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<StepRow>, StatusCode> {
    db::repository::steps::get_step(&state.pool, id).await.map(Json).map_err(db_err)
}

pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(dto): Json<UpdateStepDto>,
) -> Result<Json<StepRow>, StatusCode> {
    if dto.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    db::repository::steps::update_step(&state.pool, id, &dto.name, dto.config, dto.retry_policy, dto.timeout_ms, dto.enabled)
        .await
        .map(Json)
        .map_err(db_err)
}

pub async fn delete(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    db::repository::steps::delete_step(&state.pool, id).await.map(|_| StatusCode::NO_CONTENT).map_err(db_err)
}
