use super::metadata::VideoInfo;
use super::model::DownloadResult;
use crate::common::error::AppError;
use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum DownloadAction {
    #[default]
    Download,
    GetInfo,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DownloadRequest {
    #[validate(length(min = 1, message = "URL is required"))]
    #[serde(default)]
    pub url: String,
    #[schema(example = "320")]
    pub quality: Option<String>,
    #[serde(default)]
    pub action: DownloadAction,
}

/// Response body of `POST /download`: a flat object with a `success` flag.
#[derive(Debug, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadResponse {
    pub fn info(info: VideoInfo) -> Self {
        Self {
            success: true,
            title: Some(info.title),
            duration: info.duration,
            thumbnail: info.thumbnail,
            ..Self::default()
        }
    }

    pub fn downloaded(result: DownloadResult) -> Self {
        Self {
            success: true,
            title: Some(result.title),
            download_url: Some(result.download_url),
            filename: Some(result.filename),
            filesize: Some(result.filesize),
            ..Self::default()
        }
    }

    pub fn failure(error: &AppError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Outcome of a `POST /download` call, rendered with the matching status code.
pub struct DownloadReply(pub Result<DownloadResponse, AppError>);

impl IntoResponse for DownloadReply {
    fn into_response(self) -> Response {
        match self.0 {
            Ok(body) => Json(body).into_response(),
            Err(e) => (e.status_code(), Json(DownloadResponse::failure(&e))).into_response(),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProgressQuery {
    #[serde(default)]
    pub url: String,
    pub quality: Option<String>,
    /// Echoed back on every event; generated when absent.
    #[serde(rename = "downloadId")]
    pub download_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn request_defaults_to_download() {
        let req: DownloadRequest =
            serde_json::from_str(r#"{"url": "https://youtu.be/abc"}"#).unwrap();
        assert_eq!(req.action, DownloadAction::Download);
        assert!(req.quality.is_none());

        let req: DownloadRequest =
            serde_json::from_str(r#"{"url": "x", "quality": "192", "action": "getInfo"}"#).unwrap();
        assert_eq!(req.action, DownloadAction::GetInfo);
    }

    #[test]
    fn response_shapes() {
        let ok = DownloadResponse::downloaded(DownloadResult {
            download_url: "downloads/Song.mp3".into(),
            filename: "Song.mp3".into(),
            title: "Song".into(),
            filesize: 3,
            artifact_path: PathBuf::from("/x/Song.mp3"),
        });
        let json = serde_json::to_value(ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["downloadUrl"], "downloads/Song.mp3");
        assert!(json.get("error").is_none());

        let err = DownloadResponse::failure(&AppError::InvalidInput("Invalid YouTube URL".into()));
        let json = serde_json::to_value(err).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "error": "Invalid YouTube URL"}));
    }
}
