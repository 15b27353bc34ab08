use crate::common::error::AppError;
use crate::modules::download::executor::{JobExecutor, JobRequest};
use crate::modules::download::model::{DownloadResult, Job, JobStatus, ProgressEvent, Quality};
use crate::modules::download::publisher::{
    attach, subscriber_slot, ProgressObserver, ProgressPublisher, SubscriberSlot,
};
use crate::modules::download::validation::validate_url;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

pub type ChangeListener = Arc<dyn Fn(&QueueSnapshot) + Send + Sync>;

/// What clients see of a queue.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub jobs: Vec<Job>,
    pub running: bool,
    /// Percentage of finished jobs in the current run, or of all jobs when idle.
    pub overall_progress: u8,
    pub finished: usize,
    pub total: usize,
    pub submitted: usize,
    pub quota: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RejectedUrl {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct BulkOutcome {
    pub admitted: Vec<Job>,
    pub rejected: Vec<RejectedUrl>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub completed: usize,
    pub failed: usize,
}

struct Entry {
    job: Job,
    subscriber: SubscriberSlot,
}

#[derive(Clone, Copy)]
struct RunProgress {
    finished: usize,
    total: usize,
}

#[derive(Default)]
struct QueueState {
    entries: Vec<Entry>,
    submitted: usize,
    run: Option<RunProgress>,
}

struct Inner {
    state: Mutex<QueueState>,
    listeners: Mutex<Vec<ChangeListener>>,
    executor: Arc<JobExecutor>,
    run_lock: Arc<tokio::sync::Mutex<()>>,
    quota: usize,
    pacing: Duration,
}

/// One session's ordered job list.
///
/// Jobs run one after another in insertion order. Execution goes through the
/// shared [`JobExecutor`], so jobs from different controllers never overlap
/// either. Every mutation is followed by a call to each `on_change` listener
/// with a fresh snapshot.
#[derive(Clone)]
pub struct QueueController {
    inner: Arc<Inner>,
}

impl QueueController {
    pub fn new(executor: Arc<JobExecutor>, quota: usize, pacing: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                listeners: Mutex::new(Vec::new()),
                executor,
                run_lock: Arc::new(tokio::sync::Mutex::new(())),
                quota,
                pacing,
            }),
        }
    }

    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(&QueueSnapshot) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(listener));
    }

    /// Validates and appends a job. Invalid URLs are never queued and do not
    /// count against the quota.
    pub fn enqueue(&self, url: &str, quality: Quality) -> Result<Job, AppError> {
        let url = validate_url(url)?;

        let job = {
            let mut state = self.inner.lock();
            self.inner.admit(&mut state)?;

            let job = Job::new(url, quality);
            state.entries.push(Entry {
                job: job.clone(),
                subscriber: subscriber_slot(),
            });
            if let Some(run) = state.run.as_mut() {
                run.total += 1;
            }
            job
        };

        info!(job_id = %job.id, url = %job.url, quality = quality.kbps(), "Job queued");
        self.inner.notify();
        Ok(job)
    }

    /// Enqueues every non-blank line. The quota is applied per URL.
    pub fn enqueue_many<I, S>(&self, urls: I, quality: Quality) -> BulkOutcome
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outcome = BulkOutcome::default();
        for url in urls {
            let url = url.as_ref().trim();
            if url.is_empty() {
                continue;
            }
            match self.enqueue(url, quality) {
                Ok(job) => outcome.admitted.push(job),
                Err(e) => outcome.rejected.push(RejectedUrl {
                    url: url.to_string(),
                    error: e.to_string(),
                }),
            }
        }
        outcome
    }

    pub fn check_quota(&self) -> Result<(), AppError> {
        let state = self.inner.lock();
        if state.submitted >= self.inner.quota {
            return Err(quota_error());
        }
        Ok(())
    }

    /// Counts a job submitted outside the queue against the session quota.
    pub fn reserve_slot(&self) -> Result<(), AppError> {
        {
            let mut state = self.inner.lock();
            self.inner.admit(&mut state)?;
        }
        self.inner.notify();
        Ok(())
    }

    pub fn remove(&self, id: Uuid) -> Result<Job, AppError> {
        let removed = {
            let mut state = self.inner.lock();
            let index = state
                .entries
                .iter()
                .position(|e| e.job.id == id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;

            let status = state.entries[index].job.status;
            match status {
                JobStatus::Processing => {
                    return Err(AppError::Conflict(
                        "Job is being processed and cannot be removed".to_string(),
                    ));
                }
                JobStatus::Pending => {
                    if let Some(run) = state.run.as_mut() {
                        run.total = run.total.saturating_sub(1);
                    }
                }
                JobStatus::Completed | JobStatus::Error => {}
            }
            state.entries.remove(index).job
        };

        debug!(job_id = %id, "Job removed");
        self.inner.notify();
        Ok(removed)
    }

    /// Removes every job that is not currently processing.
    pub fn clear(&self) -> usize {
        let removed = self.inner.drop_where(|job| job.status != JobStatus::Processing);
        self.inner.notify();
        removed
    }

    pub fn prune_completed(&self) -> usize {
        let removed = self.inner.drop_where(|job| job.status == JobStatus::Completed);
        if removed > 0 {
            self.inner.notify();
        }
        removed
    }

    pub fn job(&self, id: Uuid) -> Option<Job> {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|e| e.job.id == id)
            .map(|e| e.job.clone())
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.inner.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().run.is_some()
    }

    /// Attaches the progress subscriber of a job that has not finished yet.
    /// A previous subscriber of the same job is replaced.
    pub fn subscribe(&self, id: Uuid) -> Result<UnboundedReceiver<ProgressEvent>, AppError> {
        let state = self.inner.lock();
        let entry = state
            .entries
            .iter()
            .find(|e| e.job.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Job {} not found", id)))?;

        if entry.job.status.is_terminal() {
            return Err(AppError::Conflict("Job has already finished".to_string()));
        }
        Ok(attach(&entry.subscriber))
    }

    /// Marks the queue as running and returns the claim whose
    /// [`RunClaim::run_all`] processes it, or `None` when a run is already
    /// active.
    pub fn claim_run(&self) -> Option<RunClaim> {
        let guard = self.inner.run_lock.clone().try_lock_owned().ok()?;

        let total = {
            let mut state = self.inner.lock();
            let total = state
                .entries
                .iter()
                .filter(|e| e.job.status == JobStatus::Pending)
                .count();
            state.run = Some(RunProgress { finished: 0, total });
            total
        };
        info!(jobs = total, "▶️ Queue run started");
        self.inner.notify();

        Some(RunClaim {
            queue: self.inner.clone(),
            _guard: guard,
        })
    }
}

/// Exclusive right to run one queue. Dropping it ends the run.
pub struct RunClaim {
    queue: Arc<Inner>,
    _guard: OwnedMutexGuard<()>,
}

impl RunClaim {
    /// Processes pending jobs in insertion order until none are left. Jobs
    /// enqueued during the run are picked up by it.
    pub async fn run_all(self, cancel: &CancellationToken) -> RunSummary {
        let queue = self.queue.clone();
        let executor = queue.executor.clone();
        let mut summary = RunSummary::default();

        while !cancel.is_cancelled() {
            let permit = executor.acquire().await;
            let Some((job_id, request, slot)) = queue.start_next() else {
                break;
            };
            queue.notify();

            let observer = Arc::new(JobProgressObserver {
                queue: Arc::downgrade(&queue),
                job_id,
            });
            let mut publisher = ProgressPublisher::new(request.download_id.clone(), slot)
                .with_pacing(queue.pacing)
                .with_observer(observer);

            let outcome = executor
                .run_with_permit(&permit, &request, &mut publisher, cancel)
                .await;

            match &outcome {
                Ok(_) => summary.completed += 1,
                Err(_) => summary.failed += 1,
            }
            // The job leaves `processing` before the worker is released.
            queue.finish(job_id, outcome);
            drop(permit);
            queue.notify();
        }

        drop(self);
        info!(
            completed = summary.completed,
            failed = summary.failed,
            "⏹️ Queue run finished"
        );
        queue.notify();
        summary
    }
}

impl Drop for RunClaim {
    fn drop(&mut self) {
        self.queue.lock().run = None;
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(&self, state: &mut QueueState) -> Result<(), AppError> {
        if state.submitted >= self.quota {
            return Err(quota_error());
        }
        state.submitted += 1;
        Ok(())
    }

    fn snapshot(&self) -> QueueSnapshot {
        let state = self.lock();
        let jobs: Vec<Job> = state.entries.iter().map(|e| e.job.clone()).collect();
        let (finished, total) = match state.run {
            Some(run) => (run.finished, run.total),
            None => (
                jobs.iter().filter(|j| j.status.is_terminal()).count(),
                jobs.len(),
            ),
        };

        QueueSnapshot {
            running: state.run.is_some(),
            overall_progress: overall_progress(finished, total),
            finished,
            total,
            submitted: state.submitted,
            quota: self.quota,
            jobs,
        }
    }

    fn notify(&self) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if listeners.is_empty() {
            return;
        }

        let snapshot = self.snapshot();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    fn update(&self, id: Uuid, apply: impl FnOnce(&mut Job)) {
        {
            let mut state = self.lock();
            let Some(entry) = state.entries.iter_mut().find(|e| e.job.id == id) else {
                return;
            };
            apply(&mut entry.job);
        }
        self.notify();
    }

    fn start_next(&self) -> Option<(Uuid, JobRequest, SubscriberSlot)> {
        let mut state = self.lock();
        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.job.status == JobStatus::Pending)?;

        entry.job.start();
        Some((
            entry.job.id,
            JobRequest {
                download_id: entry.job.id.to_string(),
                url: entry.job.url.clone(),
                quality: entry.job.quality,
            },
            entry.subscriber.clone(),
        ))
    }

    fn finish(&self, id: Uuid, outcome: Result<DownloadResult, AppError>) {
        let mut state = self.lock();
        if let Some(run) = state.run.as_mut() {
            run.finished += 1;
        }
        let Some(entry) = state.entries.iter_mut().find(|e| e.job.id == id) else {
            return;
        };
        match outcome {
            Ok(result) => entry.job.complete(&result),
            Err(e) => entry.job.fail(e.to_string()),
        };
    }

    fn drop_where(&self, predicate: impl Fn(&Job) -> bool) -> usize {
        let mut state = self.lock();
        let before = state.entries.len();
        let pending_removed = state
            .entries
            .iter()
            .filter(|e| e.job.status == JobStatus::Pending && predicate(&e.job))
            .count();

        state.entries.retain(|e| !predicate(&e.job));
        if let Some(run) = state.run.as_mut() {
            run.total = run.total.saturating_sub(pending_removed);
        }
        before - state.entries.len()
    }
}

/// Mirrors a running job's published progress into its queue entry.
struct JobProgressObserver {
    queue: Weak<Inner>,
    job_id: Uuid,
}

impl ProgressObserver for JobProgressObserver {
    fn on_event(&self, event: &ProgressEvent) {
        let ProgressEvent::Progress { progress, .. } = event else {
            return;
        };
        if let Some(queue) = self.queue.upgrade() {
            let percent = *progress;
            queue.update(self.job_id, |job| job.record_progress(percent));
        }
    }

    fn on_title(&self, title: &str) {
        if let Some(queue) = self.queue.upgrade() {
            queue.update(self.job_id, |job| job.title = title.to_string());
        }
    }
}

fn quota_error() -> AppError {
    AppError::ResourceLimitExceeded("Download limit reached for this session".to_string())
}

fn overall_progress(finished: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (finished.min(total) * 100 / total) as u8
}
