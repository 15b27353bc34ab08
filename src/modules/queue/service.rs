use super::controller::{BulkOutcome, QueueSnapshot};
use super::dto::{BulkEnqueueRequest, EnqueueRequest};
use crate::common::error::AppError;
use crate::modules::download::model::{Job, ProgressEvent, Quality};
use crate::state::AppState;
use tokio::sync::mpsc::UnboundedReceiver;
use tower_cookies::Cookies;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

pub struct QueueService;

impl QueueService {
    pub async fn snapshot(state: AppState, cookies: &Cookies) -> QueueSnapshot {
        state.sweeper.sweep_logged();
        state.sessions.resolve(cookies).await.queue.snapshot()
    }

    pub async fn enqueue(
        state: AppState,
        cookies: &Cookies,
        payload: EnqueueRequest,
    ) -> Result<Job, AppError> {
        payload.validate()?;
        let quality = Quality::parse_or_default(payload.quality.as_deref())?;

        state.sweeper.sweep_logged();
        let session = state.sessions.resolve(cookies).await;
        session.queue.enqueue(&payload.url, quality)
    }

    pub async fn enqueue_bulk(
        state: AppState,
        cookies: &Cookies,
        payload: BulkEnqueueRequest,
    ) -> Result<BulkOutcome, AppError> {
        payload.validate()?;
        let quality = Quality::parse_or_default(payload.quality.as_deref())?;

        state.sweeper.sweep_logged();
        let session = state.sessions.resolve(cookies).await;
        let outcome = session.queue.enqueue_many(&payload.urls, quality);
        info!(
            session = %session.id,
            admitted = outcome.admitted.len(),
            rejected = outcome.rejected.len(),
            "Bulk enqueue"
        );
        Ok(outcome)
    }

    pub async fn remove(state: AppState, cookies: &Cookies, id: Uuid) -> Result<Job, AppError> {
        state.sessions.resolve(cookies).await.queue.remove(id)
    }

    pub async fn clear(state: AppState, cookies: &Cookies) -> usize {
        state.sessions.resolve(cookies).await.queue.clear()
    }

    pub async fn prune_completed(state: AppState, cookies: &Cookies) -> usize {
        state.sessions.resolve(cookies).await.queue.prune_completed()
    }

    /// Starts processing the session's queue on a background task. The run
    /// outlives the request and any disconnecting client.
    pub async fn run(state: AppState, cookies: &Cookies) -> Result<QueueSnapshot, AppError> {
        let session = state.sessions.resolve(cookies).await;
        let Some(claim) = session.queue.claim_run() else {
            return Err(AppError::Conflict("Queue is already running".to_string()));
        };

        let cancel = session.cancel.clone();
        let session_id = session.id;
        tokio::spawn(async move {
            let summary = claim.run_all(&cancel).await;
            info!(
                session = %session_id,
                completed = summary.completed,
                failed = summary.failed,
                "Session queue drained"
            );
        });

        Ok(session.queue.snapshot())
    }

    pub async fn subscribe(
        state: AppState,
        cookies: &Cookies,
        id: Uuid,
    ) -> Result<UnboundedReceiver<ProgressEvent>, AppError> {
        state.sessions.resolve(cookies).await.queue.subscribe(id)
    }

    pub async fn end_session(state: AppState, cookies: &Cookies) -> Result<(), AppError> {
        if state.sessions.end_current(cookies).await {
            Ok(())
        } else {
            Err(AppError::NotFound("No active session".to_string()))
        }
    }
}
