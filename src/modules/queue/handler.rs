use super::controller::{BulkOutcome, QueueSnapshot};
use super::dto::{BulkEnqueueRequest, EnqueueRequest, RemovedResponse};
use super::service::QueueService;
use crate::common::response::{ApiResponse, ApiSuccess};
use crate::modules::download::model::Job;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tower_cookies::Cookies;
use uuid::Uuid;

/// Current queue of this session
#[utoipa::path(
    get,
    path = "/api/v1/queue",
    responses(
        (status = 200, description = "Queue snapshot", body = ApiResponse<QueueSnapshot>)
    ),
    tag = "Queue"
)]
pub async fn get_queue(State(state): State<AppState>, cookies: Cookies) -> impl IntoResponse {
    let snapshot = QueueService::snapshot(state, &cookies).await;
    ApiSuccess::ok(snapshot, "Queue retrieved successfully")
}

/// Add one URL to the queue
#[utoipa::path(
    post,
    path = "/api/v1/queue",
    request_body = EnqueueRequest,
    responses(
        (status = 201, description = "Job queued", body = ApiResponse<Job>),
        (status = 400, description = "Invalid URL or quality"),
        (status = 429, description = "Session download limit reached")
    ),
    tag = "Queue"
)]
pub async fn enqueue(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<EnqueueRequest>,
) -> impl IntoResponse {
    match QueueService::enqueue(state, &cookies, payload).await {
        Ok(job) => ApiSuccess::created(job, "Job added to queue").into_response(),
        Err(e) => e.into_response(),
    }
}

/// Add several URLs at once; invalid ones are reported back
#[utoipa::path(
    post,
    path = "/api/v1/queue/bulk",
    request_body = BulkEnqueueRequest,
    responses(
        (status = 201, description = "Jobs queued", body = ApiResponse<BulkOutcome>),
        (status = 400, description = "Bad Request")
    ),
    tag = "Queue"
)]
pub async fn enqueue_bulk(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<BulkEnqueueRequest>,
) -> impl IntoResponse {
    match QueueService::enqueue_bulk(state, &cookies, payload).await {
        Ok(outcome) => {
            let message = format!("Added {} video(s) to download queue", outcome.admitted.len());
            ApiSuccess::created(outcome, &message).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Remove a job that is not being processed
#[utoipa::path(
    delete,
    path = "/api/v1/queue/{id}",
    params(
        ("id" = Uuid, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job removed", body = ApiResponse<Job>),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Job is being processed")
    ),
    tag = "Queue"
)]
pub async fn remove_job(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match QueueService::remove(state, &cookies, id).await {
        Ok(job) => ApiSuccess::ok(job, "Item removed from queue").into_response(),
        Err(e) => e.into_response(),
    }
}

/// Remove every job that is not being processed
#[utoipa::path(
    delete,
    path = "/api/v1/queue",
    responses(
        (status = 200, description = "Queue cleared", body = ApiResponse<RemovedResponse>)
    ),
    tag = "Queue"
)]
pub async fn clear_queue(State(state): State<AppState>, cookies: Cookies) -> impl IntoResponse {
    let removed = QueueService::clear(state, &cookies).await;
    ApiSuccess::ok(RemovedResponse { removed }, "Queue cleared")
}

/// Remove completed jobs
#[utoipa::path(
    delete,
    path = "/api/v1/queue/completed",
    responses(
        (status = 200, description = "Completed jobs removed", body = ApiResponse<RemovedResponse>)
    ),
    tag = "Queue"
)]
pub async fn prune_completed(State(state): State<AppState>, cookies: Cookies) -> impl IntoResponse {
    let removed = QueueService::prune_completed(state, &cookies).await;
    ApiSuccess::ok(RemovedResponse { removed }, "Completed downloads cleared")
}

/// Process the queue in the background
#[utoipa::path(
    post,
    path = "/api/v1/queue/run",
    responses(
        (status = 202, description = "Queue run started", body = ApiResponse<QueueSnapshot>),
        (status = 409, description = "Queue is already running")
    ),
    tag = "Queue"
)]
pub async fn run_queue(State(state): State<AppState>, cookies: Cookies) -> impl IntoResponse {
    match QueueService::run(state, &cookies).await {
        Ok(snapshot) => ApiSuccess(
            ApiResponse::success(snapshot, "Queue processing started"),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// End the session and drop its queue
#[utoipa::path(
    delete,
    path = "/api/v1/session",
    responses(
        (status = 200, description = "Session ended", body = ApiResponse<String>),
        (status = 404, description = "No active session")
    ),
    tag = "Queue"
)]
pub async fn end_session(State(state): State<AppState>, cookies: Cookies) -> impl IntoResponse {
    match QueueService::end_session(state, &cookies).await {
        Ok(()) => ApiSuccess::ok((), "Session ended").into_response(),
        Err(e) => e.into_response(),
    }
}
