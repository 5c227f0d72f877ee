//! Workflow CRUD (spec.md §3 data model; CRUD surface is a supplemented
//! feature — see DESIGN.md). Thin and unauthenticated, per Non-goals.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::AppState;
use db::models::WorkflowRow;

fn db_err(e: db::DbError) -> StatusCode {
    match e {
        db::DbError::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Deserialize)]
pub struct CreateWorkflowDto {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct UpdateWorkflowDto {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<WorkflowRow>>, StatusCode> {
    db::repository::workflows::list_workflows(&state.pool).await.map(Json).map_err(db_err)
}

pub async fn get(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<WorkflowRow>, StatusCode> {
    db::repository::workflows::get_workflow(&state.pool, id).await.map(Json).map_err(db_err)
}

pub async fn create(
    State(state): State<AppState>,
    Json(dto): Json<CreateWorkflowDto>,
) -> Result<(StatusCode, Json<WorkflowRow>), StatusCode> {
    if dto.name.trim().is_empty() || dto.slug.is_empty() || dto.slug.len() > 100 {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !dto.slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(StatusCode::BAD_REQUEST);
    }

    db::repository::workflows::create_workflow(&state.pool, &dto.name, &dto.slug, dto.webhook_secret.as_deref(), dto.enabled)
        .await
        .map(|w| (StatusCode::CREATED, Json(w)))
        .map_err(db_err)
}

pub async fn update(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(dto): Json<UpdateWorkflowDto>,
) -> Result<Json<WorkflowRow>, StatusCode> {
    db::repository::workflows::update_workflow(&state.pool, id, &dto.name, &dto.slug, dto.webhook_secret.as_deref(), dto.enabled)
        .await
        .map(Json)
        .map_err(db_err)
}

pub async fn delete(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    db::repository::workflows::delete_workflow(&state.pool, id).await.map(|_| StatusCode::NO_CONTENT).map_err(db_err)
}

/// `GET /api/v1/workflows/:id/runs` — the runs triggered under this workflow.
pub async fn list_runs(Path(id): Path<Uuid>, State(state): State<AppState>) -> Result<Json<Vec<db::models::RunRow>>, StatusCode> {
    db::repository::runs::list_runs_for_workflow(&state.pool, id).await.map(Json).map_err(db_err)
}

/// `POST /api/v1/workflows/:id/execute` — manually start a run outside the
/// webhook path (useful for testing a workflow without wiring a trigger).
pub async fn execute(Path(id): Path<Uuid>, State(state): State<AppState>, Json(input): Json<Value>) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let workflow = db::repository::workflows::get_workflow(&state.pool, id).await.map_err(db_err)?;

    let trigger_data = db::models::TriggerData {
        method: "MANUAL".to_string(),
        headers: Default::default(),
        body: input,
        query: Default::default(),
        received_at: chrono::Utc::now(),
        source_ip: None,
    };

    let run = db::repository::runs::create_run(&state.pool, workflow.id, trigger_data).await.map_err(db_err)?;

    state
        .queue
        .enqueue(queue::QueueName::Execute, &queue::Message::StartRun { run_id: run.id, workflow_id: workflow.id }, 0)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::ACCEPTED, Json(json!({"runId": run.id, "status": run.status, "workflowId": workflow.id}))))
}
