use crate::common::error::AppError;
use regex::Regex;
use std::sync::LazyLock;

// Prefix match, ASCII word characters only, as accepted by the web client.
static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.)?(youtube\.com/(watch\?v=|embed/|v/)|youtu\.be/)[A-Za-z0-9_-]+")
        .expect("YouTube URL pattern is valid")
});

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]v=([^&]+)").expect("video id pattern is valid"));

pub fn is_valid_url(url: &str) -> bool {
    YOUTUBE_URL.is_match(url)
}

/// Checks a submitted URL and returns it trimmed.
pub fn validate_url(url: &str) -> Result<&str, AppError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(AppError::InvalidInput("URL is required".to_string()));
    }
    if !is_valid_url(url) {
        return Err(AppError::InvalidInput("Invalid YouTube URL".to_string()));
    }
    Ok(url)
}

/// The `v` query parameter, if present.
pub fn video_id(url: &str) -> Option<&str> {
    VIDEO_ID
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
