use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::runs::{
    get_run_handler, list_runs_handler, run_events_sse_handler, run_stdout_handler,
    status_handler, submit_run_handler,
};
use crate::infra::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/runs", get(list_runs_handler).post(submit_run_handler))
        .route("/api/runs/{run_id}", get(get_run_handler))
        .route("/api/runs/{run_id}/events", get(run_events_sse_handler))
        .route("/api/runs/{run_id}/stdout", get(run_stdout_handler))
        .route("/api/status", get(status_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
