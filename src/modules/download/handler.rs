use super::dto::{DownloadAction, DownloadReply, DownloadRequest, DownloadResponse};
use super::service::DownloadService;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use tower_cookies::Cookies;
use tracing::info;

/// Convert a video to MP3, or just look up its metadata
///
/// With `action = "getInfo"` only the title, duration and thumbnail are
/// returned. Otherwise the request blocks until the MP3 is ready.
#[utoipa::path(
    post,
    path = "/api/v1/download",
    request_body = DownloadRequest,
    responses(
        (status = 200, description = "Metadata or finished download", body = DownloadResponse),
        (status = 400, description = "Invalid URL or quality", body = DownloadResponse),
        (status = 429, description = "Session download limit reached", body = DownloadResponse),
        (status = 502, description = "Converter failed", body = DownloadResponse),
        (status = 503, description = "No converter installed", body = DownloadResponse),
        (status = 504, description = "Converter timed out", body = DownloadResponse)
    ),
    tag = "Download"
)]
pub async fn download(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<DownloadRequest>,
) -> impl IntoResponse {
    state.sweeper.sweep_logged();

    let reply = match payload.action {
        DownloadAction::GetInfo => DownloadService::get_info(state, &cookies, payload)
            .await
            .map(DownloadResponse::info),
        DownloadAction::Download => {
            info!(url = %payload.url, quality = ?payload.quality, "Direct download requested");
            DownloadService::download(state, &cookies, payload)
                .await
                .map(DownloadResponse::downloaded)
        }
    };

    DownloadReply(reply)
}
