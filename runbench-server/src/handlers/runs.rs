use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream};
use axum::response::{IntoResponse, Json, Sse};
use runbench_core::RunSubscription;
use runbench_core::api::{ApiResponse, OrchestratorStatus, RunAccepted, RunListResponse};
use runbench_model::{Run, RunEvent, RunId, RunRequest};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;
use uuid::Uuid;

use crate::errors::RunHttpError;
use crate::infra::AppState;

pub async fn submit_run_handler(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Result<impl IntoResponse, RunHttpError> {
    let run = state.coordinator().submit(request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(RunAccepted::from(&run))),
    ))
}

pub async fn get_run_handler(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Run>>, RunHttpError> {
    let run = state.coordinator().get(&RunId::from(run_id)).await?;
    Ok(Json(ApiResponse::success(run)))
}

pub async fn list_runs_handler(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<RunListResponse>>, RunHttpError> {
    let runs = state.coordinator().list().await?;
    let count = runs.len();
    Ok(Json(ApiResponse::success(RunListResponse { runs, count })))
}

pub async fn status_handler(
    State(state): State<AppState>,
) -> Json<ApiResponse<OrchestratorStatus>> {
    let coordinator = state.coordinator();
    Json(ApiResponse::success(OrchestratorStatus {
        queue_depth: coordinator.queue_depth(),
        active_run: coordinator.active_run(),
    }))
}

/// Captured stdout of a terminal run; the escape hatch for historical output
/// that the live channel deliberately does not replay.
pub async fn run_stdout_handler(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<String, RunHttpError> {
    let run_id = RunId::from(run_id);
    let path = state.coordinator().stdout_artifact(&run_id).await?;
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|_| RunHttpError::not_found(format!("stdout artifact missing for {run_id}")))
}

type SseStream = Pin<Box<dyn tokio_stream::Stream<Item = Result<Event, Infallible>> + Send>>;

/// Live observation channel: zero or more stdout/stderr frames, then exactly
/// one `complete` frame, then the stream closes. For an already-terminal run
/// only the `complete` frame is sent.
pub async fn run_events_sse_handler(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Sse<KeepAliveStream<SseStream>>, RunHttpError> {
    let subscription = state.coordinator().observe(&RunId::from(run_id)).await?;

    let stream: SseStream = match subscription {
        RunSubscription::Terminal(run) => {
            let complete = RunEvent::Complete { run };
            let events = run_event_to_sse(&complete)
                .into_iter()
                .map(Ok::<Event, Infallible>)
                .collect::<Vec<_>>();
            Box::pin(tokio_stream::iter(events))
        }
        RunSubscription::Live(receiver) => Box::pin(async_stream::stream! {
            let mut live = BroadcastStream::new(receiver);
            while let Some(frame) = live.next().await {
                match frame {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        if let Some(sse) = run_event_to_sse(&event) {
                            yield Ok::<Event, Infallible>(sse);
                        }
                        if terminal {
                            break;
                        }
                    }
                    Err(err) => {
                        // Lagged subscriber: chunks were dropped for this
                        // viewer only; keep going until the terminal frame.
                        warn!("run event broadcast error: {err}");
                    }
                }
            }
        }),
    };

    Ok(Sse::new(stream).keep_alive(default_keep_alive()))
}

fn run_event_to_sse(event: &RunEvent) -> Option<Event> {
    let data = serde_json::to_string(event).ok()?;
    Some(Event::default().event(event.kind()).data(data))
}

fn default_keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("keep-alive")
}
