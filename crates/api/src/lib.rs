//! `api` crate — HTTP REST API layer.
//!
//! Exposes:
//!   POST   /webhooks/:slug                        (C8 webhook admission)
//!   GET    /api/v1/workflows
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows/:id
//!   PUT    /api/v1/workflows/:id
//!   DELETE /api/v1/workflows/:id
//!   POST   /api/v1/workflows/:id/execute
//!   GET    /api/v1/workflows/:id/runs
//!   GET    /api/v1/workflows/:id/steps
//!   POST   /api/v1/workflows/:id/steps
//!   GET    /api/v1/steps/:id
//!   PUT    /api/v1/steps/:id
//!   DELETE /api/v1/steps/:id
//!   GET    /api/v1/runs/:id
//!   GET    /api/v1/runs/:id/steps
//!   POST   /api/v1/runs/:id/cancel

pub mod handlers;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use db::DbPool;
use queue::Queue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub queue: Queue,
    pub api_key: Option<String>,
}

/// Optional bearer check gated by `API_KEY` (spec.md §6). Left thin per the
/// Non-goal on authentication middleware — there is no user/session model,
/// just a single shared key that, if configured, every `/api/v1` call must
/// present.
async fn require_api_key(State(state): State<AppState>, headers: HeaderMap, request: axum::extract::Request, next: Next) -> Result<Response, StatusCode> {
    let Some(expected) = &state.api_key else {
        return Ok(next.run(request).await);
    };

    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if presented == Some(expected.as_str()) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

pub async fn serve(bind: &str, pool: DbPool, queue: Queue, api_key: Option<String>) -> Result<(), std::io::Error> {
    let state = AppState { pool, queue, api_key };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let api_router = Router::new()
        .route("/workflows", get(handlers::workflows::list).post(handlers::workflows::create))
        .route("/workflows/:id", get(handlers::workflows::get).put(handlers::workflows::update).delete(handlers::workflows::delete))
        .route("/workflows/:id/execute", post(handlers::workflows::execute))
        .route("/workflows/:id/runs", get(handlers::workflows::list_runs))
        .route("/workflows/:id/steps", get(handlers::steps::list).post(handlers::steps::create))
        .route("/steps/:id", get(handlers::steps::get).put(handlers::steps::update).delete(handlers::steps::delete))
        .route("/runs/:id", get(handlers::runs::get))
        .route("/runs/:id/steps", get(handlers::runs::list_step_executions))
        .route("/runs/:id/cancel", post(handlers::runs::cancel))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    let app = Router::new()
        .nest("/api/v1", api_router)
        .route("/webhooks/:slug", post(handlers::webhooks::handle_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("API listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await
}
