use super::dto::{DownloadRequest, ProgressQuery};
use super::executor::JobRequest;
use super::metadata::VideoInfo;
use super::model::{DownloadResult, ProgressEvent, Quality};
use super::publisher::{attach, subscriber_slot, ProgressPublisher};
use super::validation::validate_url;
use crate::common::error::AppError;
use crate::state::AppState;
use tokio::sync::mpsc::UnboundedReceiver;
use tower_cookies::Cookies;
use tracing::error;
use uuid::Uuid;
use validator::Validate;

pub struct DownloadService;

impl DownloadService {
    /// Metadata lookup for a preview. Checks, but does not consume, the
    /// session quota.
    pub async fn get_info(
        state: AppState,
        cookies: &Cookies,
        payload: DownloadRequest,
    ) -> Result<VideoInfo, AppError> {
        let (url, _) = Self::admit(&payload)?;
        state.sessions.resolve(cookies).await.queue.check_quota()?;

        Ok(state.executor.metadata().resolve(&url, &state.shutdown).await)
    }

    /// Runs one conversion and waits for its result.
    ///
    /// The job runs on its own task, so a client that hangs up does not kill
    /// the converter half way.
    pub async fn download(
        state: AppState,
        cookies: &Cookies,
        payload: DownloadRequest,
    ) -> Result<DownloadResult, AppError> {
        let (url, quality) = Self::admit(&payload)?;
        state.sessions.resolve(cookies).await.queue.reserve_slot()?;

        let request = JobRequest {
            download_id: new_download_id(),
            url,
            quality,
        };
        let executor = state.executor.clone();
        let shutdown = state.shutdown.clone();

        tokio::spawn(async move {
            let mut publisher = ProgressPublisher::detached(request.download_id.clone());
            executor.run(&request, &mut publisher, &shutdown).await
        })
        .await
        .unwrap_or_else(|e| {
            error!("Download task aborted: {}", e);
            Err(AppError::ExternalToolFailure("Download was interrupted".to_string()))
        })
    }

    /// Starts a conversion whose progress is streamed to the returned
    /// receiver. Request errors arrive as the stream's single error event.
    pub async fn start_progress_job(
        state: AppState,
        cookies: &Cookies,
        query: ProgressQuery,
    ) -> UnboundedReceiver<ProgressEvent> {
        let download_id = query
            .download_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(new_download_id);

        let slot = subscriber_slot();
        let rx = attach(&slot);
        let mut publisher = ProgressPublisher::new(download_id.clone(), slot)
            .with_pacing(state.config.progress_pacing);

        let quality = match Self::admit_query(&state, cookies, &query).await {
            Ok(quality) => quality,
            Err(e) => {
                publisher.fail(e.to_string());
                return rx;
            }
        };

        let request = JobRequest {
            download_id,
            url: query.url,
            quality,
        };
        let executor = state.executor.clone();
        let shutdown = state.shutdown.clone();
        tokio::spawn(async move {
            let _ = executor.run(&request, &mut publisher, &shutdown).await;
        });

        rx
    }

    fn admit(payload: &DownloadRequest) -> Result<(String, Quality), AppError> {
        payload.validate()?;
        let quality = Quality::parse_or_default(payload.quality.as_deref())?;
        let url = validate_url(&payload.url)?;
        Ok((url.to_string(), quality))
    }

    async fn admit_query(
        state: &AppState,
        cookies: &Cookies,
        query: &ProgressQuery,
    ) -> Result<Quality, AppError> {
        if query.url.trim().is_empty() {
            return Err(AppError::InvalidInput("URL is required".to_string()));
        }
        let quality = Quality::parse_or_default(query.quality.as_deref())?;
        validate_url(&query.url)?;
        state.sessions.resolve(cookies).await.queue.reserve_slot()?;
        Ok(quality)
    }
}

fn new_download_id() -> String {
    format!("download_{}", Uuid::new_v4().simple())
}
