use super::metadata::MetadataResolver;
use super::model::{Checkpoint, DownloadResult, Quality};
use super::publisher::ProgressPublisher;
use super::sanitize::sanitize;
use super::validation::validate_url;
use crate::common::error::AppError;
use crate::config::settings::AppConfig;
use crate::infrastructure::process::{invoker, ToolChain};
use crate::infrastructure::storage::{OutputDir, TempSlot};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub download_id: String,
    pub url: String,
    pub quality: Quality,
}

/// Proof that the caller holds the single global worker.
pub type WorkerPermit<'a> = MutexGuard<'a, ()>;

/// Runs one conversion end to end: metadata, converter, artifact lookup,
/// rename, result.
///
/// One executor is shared by the whole process. Its worker mutex makes sure
/// only one conversion runs at a time, whichever session or endpoint asked.
pub struct JobExecutor {
    tools: Arc<ToolChain>,
    metadata: MetadataResolver,
    output: OutputDir,
    url_prefix: String,
    timeout: Duration,
    worker: Mutex<()>,
}

impl JobExecutor {
    pub fn new(config: &AppConfig, output: OutputDir) -> Self {
        let tools = Arc::new(ToolChain::from_commands(&config.tool_commands));
        Self {
            metadata: MetadataResolver::new(tools.clone(), config.metadata_timeout),
            tools,
            output,
            url_prefix: config.download_url_prefix.clone(),
            timeout: config.command_timeout,
            worker: Mutex::new(()),
        }
    }

    pub fn metadata(&self) -> &MetadataResolver {
        &self.metadata
    }

    pub async fn acquire(&self) -> WorkerPermit<'_> {
        self.worker.lock().await
    }

    #[cfg(test)]
    pub fn is_busy(&self) -> bool {
        self.worker.try_lock().is_err()
    }

    /// Waits for the worker, then runs the job.
    pub async fn run(
        &self,
        request: &JobRequest,
        publisher: &mut ProgressPublisher,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult, AppError> {
        let permit = self.acquire().await;
        self.run_with_permit(&permit, request, publisher, cancel).await
    }

    /// Runs the job and publishes its terminal event. The job's files stay
    /// out of retention sweeps until that event is out.
    pub async fn run_with_permit(
        &self,
        _permit: &WorkerPermit<'_>,
        request: &JobRequest,
        publisher: &mut ProgressPublisher,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult, AppError> {
        let started = Instant::now();
        let mut slot = self.output.reserve_temp();
        let outcome = self.execute(request, &mut slot, publisher, cancel).await;

        match &outcome {
            Ok(result) => {
                info!(
                    download_id = %request.download_id,
                    url = %request.url,
                    quality = request.quality.kbps(),
                    filename = %result.filename,
                    filesize = result.filesize,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "✅ Download completed"
                );
                publisher.complete(result.clone());
            }
            Err(e) => {
                warn!(
                    download_id = %request.download_id,
                    url = %request.url,
                    quality = request.quality.kbps(),
                    kind = e.kind(),
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "❌ Download failed"
                );
                publisher.fail(e.to_string());
            }
        }

        drop(slot);
        outcome
    }

    async fn execute(
        &self,
        request: &JobRequest,
        slot: &mut TempSlot,
        publisher: &mut ProgressPublisher,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult, AppError> {
        let url = validate_url(&request.url)?;

        publisher.checkpoint(Checkpoint::Starting, Checkpoint::Starting.message()).await;
        publisher
            .checkpoint(Checkpoint::FetchingMetadata, Checkpoint::FetchingMetadata.message())
            .await;

        let info = self.metadata.resolve(url, cancel).await;
        publisher.resolved_title(&info.title);
        publisher
            .checkpoint(
                Checkpoint::MetadataResolved,
                format!("{}: {}", Checkpoint::MetadataResolved.message(), info.title),
            )
            .await;

        self.output.ensure()?;

        publisher.checkpoint(Checkpoint::Downloading, Checkpoint::Downloading.message()).await;
        publisher
            .checkpoint(Checkpoint::ProcessingAudio, Checkpoint::ProcessingAudio.message())
            .await;

        let artifacts = self.convert(url, request.quality, slot, cancel).await?;
        publisher.checkpoint(Checkpoint::Converting, Checkpoint::Converting.message()).await;

        let artifact = pick_artifact(artifacts)
            .ok_or_else(|| AppError::ExternalToolFailure("Unknown error".to_string()))?;

        publisher
            .checkpoint(Checkpoint::ProcessingFilename, Checkpoint::ProcessingFilename.message())
            .await;
        let final_path = self.output.claim_name(&artifact, &sanitize(&info.title), "mp3");
        slot.hold(&final_path);

        publisher.checkpoint(Checkpoint::Finalizing, Checkpoint::Finalizing.message()).await;
        let filesize = match std::fs::metadata(&final_path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(file = %final_path.display(), error = %e, "Could not read artifact size");
                0
            }
        };
        let filename = final_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(DownloadResult {
            download_url: format!("{}/{}", self.url_prefix, filename),
            filename,
            title: info.title,
            filesize,
            artifact_path: final_path,
        })
    }

    /// Invokes the converter and returns the files it produced for `slot`.
    async fn convert(
        &self,
        url: &str,
        quality: Quality,
        slot: &TempSlot,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, AppError> {
        let args = vec![
            "-x".to_string(),
            "--audio-format".to_string(),
            "mp3".to_string(),
            "--audio-quality".to_string(),
            quality.audio_quality_arg(),
            "--output".to_string(),
            slot.template().to_string_lossy().into_owned(),
            "--no-mtime".to_string(),
            "--no-warnings".to_string(),
            url.to_string(),
        ];
        let args = &args;
        let timeout = self.timeout;

        self.tools
            .try_each(|provider| async move {
                let output = invoker::run(provider, args, timeout, cancel).await?;
                let found = slot.artifacts()?;
                if !found.is_empty() {
                    return Ok(found);
                }

                let text = output.output.trim();
                Err(AppError::ExternalToolFailure(if text.is_empty() {
                    "Unknown error".to_string()
                } else {
                    text.to_string()
                }))
            })
            .await
    }
}

/// Prefers the converted `.mp3` over leftovers such as the source container.
fn pick_artifact(mut artifacts: Vec<PathBuf>) -> Option<PathBuf> {
    let mp3 = artifacts
        .iter()
        .position(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("mp3")));
    match mp3 {
        Some(index) => Some(artifacts.swap_remove(index)),
        None => artifacts.into_iter().next(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::download::model::ProgressEvent;
    use crate::modules::download::publisher::{attach, subscriber_slot, ProgressObserver};
    use crate::testing::{Sandbox, CONVERTER_FAILS, CONVERTER_OK, CONVERTER_SILENT};
    use crate::workers::sweeper::RetentionSweeper;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc::UnboundedReceiver;

    const URL: &str = "https://www.youtube.com/watch?v=abc123";

    fn request(url: &str) -> JobRequest {
        JobRequest {
            download_id: "job-1".to_string(),
            url: url.to_string(),
            quality: Quality::Kbps192,
        }
    }

    fn executor(sandbox: &Sandbox, tools: Vec<Vec<String>>) -> JobExecutor {
        let config = sandbox.config(tools);
        JobExecutor::new(&config, OutputDir::new(config.download_dir.clone()))
    }

    async fn run(executor: &JobExecutor, url: &str) -> (Result<DownloadResult, AppError>, Vec<ProgressEvent>) {
        let slot = subscriber_slot();
        let mut rx: UnboundedReceiver<ProgressEvent> = attach(&slot);
        let mut publisher = ProgressPublisher::new("job-1", slot);
        let outcome = executor
            .run(&request(url), &mut publisher, &CancellationToken::new())
            .await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (outcome, events)
    }

    #[tokio::test]
    async fn successful_job_walks_every_checkpoint() {
        let sandbox = Sandbox::new();
        let tool = sandbox.tool("ok", CONVERTER_OK);
        let executor = executor(&sandbox, vec![tool]);

        let (outcome, events) = run(&executor, URL).await;
        let result = outcome.unwrap();

        assert_eq!(result.filename, "Test SongTitle.mp3");
        assert_eq!(result.download_url, "downloads/Test SongTitle.mp3");
        assert_eq!(result.title, "Test: Song/Title?");
        assert_eq!(result.filesize, "ID3-fake-audio".len() as u64);
        assert!(result.artifact_path.exists());

        let percents: Vec<i16> = events.iter().map(ProgressEvent::percent).collect();
        assert_eq!(percents, vec![0, 10, 25, 40, 60, 80, 90, 95, 100]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(matches!(
            &events[2],
            ProgressEvent::Progress { message, .. } if message == "Starting download: Test: Song/Title?"
        ));

        // No temp files are left behind.
        let leftovers = std::fs::read_dir(sandbox.output_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("temp_"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn second_job_with_same_title_gets_a_distinct_file() {
        let sandbox = Sandbox::new();
        let tool = sandbox.tool("ok", CONVERTER_OK);
        let executor = executor(&sandbox, vec![tool]);

        let first = run(&executor, URL).await.0.unwrap();
        let second = run(&executor, URL).await.0.unwrap();
        assert_eq!(first.filename, "Test SongTitle.mp3");
        assert_eq!(second.filename, "Test SongTitle (1).mp3");
    }

    #[tokio::test]
    async fn invalid_url_fails_before_any_subprocess() {
        let sandbox = Sandbox::new();
        let marker = sandbox.path("invoked");
        let tool = sandbox.tool("spy", &format!("#!/bin/sh\ntouch '{}'\n", marker.display()));
        let executor = executor(&sandbox, vec![tool]);

        let (outcome, events) = run(&executor, "https://vimeo.com/123").await;
        assert!(matches!(outcome, Err(AppError::InvalidInput(_))));
        assert_eq!(events, vec![ProgressEvent::failed("job-1", "Invalid YouTube URL")]);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn no_artifact_is_an_error_carrying_tool_output() {
        let sandbox = Sandbox::new();
        let tool = sandbox.tool("fails", CONVERTER_FAILS);
        let executor = executor(&sandbox, vec![tool]);

        let (outcome, events) = run(&executor, URL).await;
        let err = outcome.unwrap_err();
        assert!(matches!(err, AppError::ExternalToolFailure(_)));
        assert!(err.to_string().contains("Video unavailable"));

        assert!(events.iter().all(|e| e.percent() < 100));
        match events.last().unwrap() {
            ProgressEvent::Failed { error, progress, .. } => {
                assert!(!error.is_empty());
                assert_eq!(*progress, -1);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_tool_reports_unknown_error() {
        let sandbox = Sandbox::new();
        let tool = sandbox.tool("silent", CONVERTER_SILENT);
        let executor = executor(&sandbox, vec![tool]);

        let (outcome, _) = run(&executor, URL).await;
        assert_eq!(outcome.unwrap_err().to_string(), "Download failed: Unknown error");
    }

    #[tokio::test]
    async fn missing_converter_returns_install_instructions() {
        let sandbox = Sandbox::new();
        let executor = executor(&sandbox, vec![vec!["no-such-downloader-anywhere".to_string()]]);

        let (outcome, events) = run(&executor, URL).await;
        let err = outcome.unwrap_err();
        assert!(matches!(err, AppError::ToolNotFound(_)));
        assert!(matches!(
            events.last(),
            Some(ProgressEvent::Failed { error, .. }) if error.contains("pip install yt-dlp")
        ));
    }

    #[tokio::test]
    async fn worker_is_exclusive() {
        let sandbox = Sandbox::new();
        let executor = executor(&sandbox, vec![]);

        let permit = executor.acquire().await;
        assert!(executor.is_busy());
        drop(permit);
        assert!(!executor.is_busy());
    }

    #[tokio::test]
    async fn backdated_artifact_survives_the_next_sweep() {
        let sandbox = Sandbox::new();
        let script = CONVERTER_OK.replace(
            r#"> "$file""#,
            r#"> "$file" && touch -t 202001010000 "$file""#,
        );
        let executor = executor(&sandbox, vec![sandbox.tool("backdating", &script)]);

        let result = run(&executor, URL).await.0.unwrap();
        assert_eq!(result.filesize, "ID3-fake-audio".len() as u64);

        let sweeper = RetentionSweeper::new(executor.output.clone(), Duration::from_secs(3600));
        let report = sweeper.sweep().unwrap();
        assert_eq!(report.removed, 0);
        assert!(result.artifact_path.exists());
    }

    struct HeldAtFinish {
        output: OutputDir,
        held: AtomicBool,
    }

    impl ProgressObserver for HeldAtFinish {
        fn on_event(&self, event: &ProgressEvent) {
            if let ProgressEvent::Progress { data: Some(result), .. } = event {
                self.held
                    .store(self.output.is_in_flight(&result.filename), Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn final_file_is_in_flight_until_the_result_is_published() {
        let sandbox = Sandbox::new();
        let executor = executor(&sandbox, vec![sandbox.tool("ok", CONVERTER_OK)]);
        let check = Arc::new(HeldAtFinish {
            output: executor.output.clone(),
            held: AtomicBool::new(false),
        });

        let mut publisher = ProgressPublisher::detached("job-1").with_observer(check.clone());
        let result = executor
            .run(&request(URL), &mut publisher, &CancellationToken::new())
            .await
            .unwrap();

        assert!(check.held.load(Ordering::SeqCst));
        assert!(!executor.output.is_in_flight(&result.filename));
    }

    #[test]
    fn prefers_mp3_artifacts() {
        let picked = pick_artifact(vec![
            PathBuf::from("temp_1.webm"),
            PathBuf::from("temp_1.mp3"),
        ]);
        assert_eq!(picked, Some(PathBuf::from("temp_1.mp3")));
        assert_eq!(pick_artifact(vec![]), None);
    }
}
