use super::validation::video_id;
use crate::common::error::AppError;
use crate::infrastructure::process::{invoker, ToolChain};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VideoInfo {
    pub title: String,
    /// Seconds.
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
}

#[derive(Deserialize)]
struct DumpRecord {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
}

/// Looks up title, duration and thumbnail through the downloader's
/// `--dump-json` mode. Always produces a usable title.
pub struct MetadataResolver {
    tools: Arc<ToolChain>,
    timeout: Duration,
}

impl MetadataResolver {
    pub fn new(tools: Arc<ToolChain>, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    pub async fn resolve(&self, url: &str, cancel: &CancellationToken) -> VideoInfo {
        let args = vec![
            "--dump-json".to_string(),
            "--no-warnings".to_string(),
            url.to_string(),
        ];
        let args = &args;
        let timeout = self.timeout;

        let resolved = self
            .tools
            .try_each(|provider| async move {
                let output = invoker::run(provider, args, timeout, cancel).await?;
                parse_dump(&output.output).ok_or_else(|| {
                    AppError::ExternalToolFailure(format!("{} returned no usable metadata", provider))
                })
            })
            .await;

        match resolved {
            Ok(mut info) => {
                if info.thumbnail.is_none() {
                    info.thumbnail = video_id(url).map(thumbnail_url);
                }
                debug!(url, title = %info.title, "Resolved video metadata");
                info
            }
            Err(e) => {
                warn!(url, error = %e, "Metadata lookup failed, using fallback title");
                fallback_info(url)
            }
        }
    }
}

/// First output line that is a JSON record with a non-empty title.
pub fn parse_dump(output: &str) -> Option<VideoInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<DumpRecord>(line).ok())
        .find_map(|record| {
            let title = record.title.filter(|t| !t.trim().is_empty())?;
            Some(VideoInfo {
                title,
                duration: record.duration,
                thumbnail: record.thumbnail.filter(|t| !t.is_empty()),
            })
        })
}

pub fn fallback_info(url: &str) -> VideoInfo {
    let id = video_id(url);
    VideoInfo {
        title: format!("Video {}", id.unwrap_or("unknown")),
        duration: None,
        thumbnail: id.map(thumbnail_url),
    }
}

fn thumbnail_url(id: &str) -> String {
    format!("https://img.youtube.com/vi/{}/maxresdefault.jpg", id)
}
