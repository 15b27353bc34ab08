use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct EnqueueRequest {
    #[validate(length(min = 1, message = "URL is required"))]
    pub url: String,
    /// Bitrate in kbps: 128, 192, 256 or 320. Defaults to 320.
    #[schema(example = "320")]
    pub quality: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BulkEnqueueRequest {
    #[validate(length(min = 1, message = "At least one URL is required"))]
    pub urls: Vec<String>,
    #[schema(example = "320")]
    pub quality: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RemovedResponse {
    pub removed: usize,
}
