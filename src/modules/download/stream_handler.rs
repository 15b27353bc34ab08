use super::dto::ProgressQuery;
use super::service::DownloadService;
use crate::common::sse::event_stream;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use tower_cookies::Cookies;

/// Convert a video while streaming progress as server-sent events
///
/// Each event is `{downloadId, progress, message, data}`; the stream ends with
/// progress 100 plus the result, or with `{downloadId, error, progress: -1}`.
#[utoipa::path(
    get,
    path = "/api/v1/download/progress",
    params(ProgressQuery),
    responses(
        (status = 200, description = "text/event-stream of ProgressEvent", body = String, content_type = "text/event-stream")
    ),
    tag = "Download"
)]
pub async fn download_progress(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<ProgressQuery>,
) -> impl IntoResponse {
    state.sweeper.sweep_logged();
    let rx = DownloadService::start_progress_job(state, &cookies, query).await;
    event_stream(rx)
}
