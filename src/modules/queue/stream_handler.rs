use super::service::QueueService;
use crate::common::sse::event_stream;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use tower_cookies::Cookies;
use uuid::Uuid;

/// Live progress of one queued job as server-sent events
///
/// Only events published after the subscription are delivered. Opening a new
/// stream for the same job replaces the previous one. Closing the stream does
/// not stop the job.
#[utoipa::path(
    get,
    path = "/api/v1/queue/{id}/events",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "text/event-stream of ProgressEvent", body = String, content_type = "text/event-stream"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Job has already finished")
    ),
    tag = "Queue"
)]
pub async fn job_events(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match QueueService::subscribe(state, &cookies, id).await {
        Ok(rx) => event_stream(rx).into_response(),
        Err(e) => e.into_response(),
    }
}
