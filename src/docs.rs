use utoipa::OpenApi;
use crate::modules::download::dto::*;
use crate::modules::queue::controller::{BulkOutcome, QueueSnapshot, RejectedUrl, RunSummary};
use crate::modules::queue::dto::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::download::handler::download,
        crate::modules::download::stream_handler::download_progress,
        crate::modules::queue::handler::get_queue,
        crate::modules::queue::handler::enqueue,
        crate::modules::queue::handler::enqueue_bulk,
        crate::modules::queue::handler::remove_job,
        crate::modules::queue::handler::clear_queue,
        crate::modules::queue::handler::prune_completed,
        crate::modules::queue::handler::run_queue,
        crate::modules::queue::handler::end_session,
        crate::modules::queue::stream_handler::job_events,
    ),
    components(
        schemas(
            DownloadRequest, DownloadAction, DownloadResponse,
            EnqueueRequest, BulkEnqueueRequest, RemovedResponse,
            QueueSnapshot, BulkOutcome, RejectedUrl, RunSummary,
            crate::modules::download::model::Job,
            crate::modules::download::model::JobStatus,
            crate::modules::download::model::ProgressEvent,
            crate::modules::download::model::DownloadResult,
            crate::modules::download::metadata::VideoInfo,
        )
    ),
    tags(
        (name = "Download", description = "Single YouTube to MP3 conversions"),
        (name = "Queue", description = "Per-session download queue")
    )
)]
pub struct ApiDoc;
