use super::model::{Checkpoint, DownloadResult, ProgressEvent};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Holds the sender of whoever is currently listening to a job, if anyone.
pub type SubscriberSlot = Arc<Mutex<Option<UnboundedSender<ProgressEvent>>>>;

pub fn subscriber_slot() -> SubscriberSlot {
    Arc::new(Mutex::new(None))
}

/// Attaches a new listener, replacing any previous one. Only events published
/// after this call are delivered.
pub fn attach(slot: &SubscriberSlot) -> UnboundedReceiver<ProgressEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
    rx
}

/// Side channel for the owner of a job record (the queue) to mirror what the
/// publisher emits.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);

    fn on_title(&self, _title: &str) {}
}

/// Emits the ordered event stream of a single job run.
///
/// Percentages never go backwards and exactly one terminal event is sent;
/// anything that would break that is dropped. Delivery failures are ignored so
/// the job keeps running when nobody is listening.
pub struct ProgressPublisher {
    download_id: String,
    slot: SubscriberSlot,
    observer: Option<Arc<dyn ProgressObserver>>,
    pacing: Duration,
    last_percent: Option<u8>,
    finished: bool,
}

impl ProgressPublisher {
    pub fn new(download_id: impl Into<String>, slot: SubscriberSlot) -> Self {
        Self {
            download_id: download_id.into(),
            slot,
            observer: None,
            pacing: Duration::ZERO,
            last_percent: None,
            finished: false,
        }
    }

    /// A publisher with no listener; used by the blocking download request.
    pub fn detached(download_id: impl Into<String>) -> Self {
        Self::new(download_id, subscriber_slot())
    }

    /// Delay after each delivered non-terminal event so a watching user can
    /// see the steps go by.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub async fn checkpoint(&mut self, checkpoint: Checkpoint, message: impl Into<String>) {
        let percent = checkpoint.percent();
        if self.finished || checkpoint == Checkpoint::Completed {
            return;
        }
        if self.last_percent.is_some_and(|last| percent < last) {
            debug!(download_id = %self.download_id, percent, "Dropping out-of-order progress");
            return;
        }
        self.last_percent = Some(percent);

        let delivered = self.emit(ProgressEvent::Progress {
            download_id: self.download_id.clone(),
            progress: percent,
            message: message.into(),
            data: None,
        });

        if delivered && !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }

    pub fn resolved_title(&self, title: &str) {
        if let Some(observer) = &self.observer {
            observer.on_title(title);
        }
    }

    pub fn complete(&mut self, result: DownloadResult) {
        if self.finished {
            return;
        }
        self.emit(ProgressEvent::Progress {
            download_id: self.download_id.clone(),
            progress: Checkpoint::Completed.percent(),
            message: Checkpoint::Completed.message().to_string(),
            data: Some(result),
        });
        self.finish();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if self.finished {
            return;
        }
        self.emit(ProgressEvent::failed(self.download_id.clone(), error));
        self.finish();
    }

    fn finish(&mut self) {
        self.finished = true;
        // Dropping the sender ends the subscriber's stream.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn emit(&mut self, event: ProgressEvent) -> bool {
        if let Some(observer) = &self.observer {
            observer.on_event(&event);
        }

        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = slot.as_ref() else {
            return false;
        };
        if tx.send(event).is_ok() {
            return true;
        }

        debug!(download_id = %self.download_id, "Subscriber went away");
        *slot = None;
        false
    }
}

impl Drop for ProgressPublisher {
    fn drop(&mut self) {
        if !self.finished {
            self.fail("Download was interrupted");
        }
    }
}
