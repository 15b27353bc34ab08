use crate::infrastructure::storage::OutputDir;
use crate::modules::queue::SessionStore;
use std::fs;
use std::io;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub kept: usize,
    pub in_flight: usize,
}

/// Deletes artifacts older than the retention window from the output directory.
#[derive(Clone, Debug)]
pub struct RetentionSweeper {
    dir: OutputDir,
    retention: Duration,
}

impl RetentionSweeper {
    pub fn new(dir: OutputDir, retention: Duration) -> Self {
        Self { dir, retention }
    }

    pub fn sweep(&self) -> io::Result<SweepReport> {
        self.sweep_at(SystemTime::now())
    }

    pub fn sweep_at(&self, now: SystemTime) -> io::Result<SweepReport> {
        let mut report = SweepReport::default();

        let entries = match fs::read_dir(self.dir.root()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
            Err(e) => return Err(e),
        };

        for entry in entries {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            let name = entry.file_name();
            if self.dir.is_in_flight(&name.to_string_lossy()) {
                report.in_flight += 1;
                continue;
            }

            let age = now
                .duration_since(metadata.modified()?)
                .unwrap_or(Duration::ZERO);

            if age <= self.retention {
                report.kept += 1;
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    warn!(file = %entry.path().display(), error = %e, "Failed to remove expired artifact");
                    report.kept += 1;
                }
            }
        }

        Ok(report)
    }

    /// Sweeps and logs the outcome; used on the request path where a sweep
    /// failure must not fail the request.
    pub fn sweep_logged(&self) {
        match self.sweep() {
            Ok(report) if report.removed > 0 => {
                info!(removed = report.removed, kept = report.kept, "🧹 Removed expired artifacts");
            }
            Ok(_) => {}
            Err(e) => error!("❌ Retention sweep failed: {}", e),
        }
    }
}

/// Periodically sweeps expired artifacts and evicts idle sessions until
/// `shutdown` fires.
pub async fn start_retention_worker(
    sweeper: RetentionSweeper,
    sessions: SessionStore,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(
        "🧹 Starting retention worker (every {}s, retention {}s)",
        interval.as_secs(),
        sweeper.retention.as_secs()
    );

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweeper.sweep_logged();
                sessions.evict_idle().await;
            }
            _ = shutdown.cancelled() => {
                info!("🧹 Retention worker stopped");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn age_file(path: &std::path::Path, age: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn removes_expired_and_keeps_fresh_artifacts() {
        let tmp = tempdir().unwrap();
        let old = tmp.path().join("old.mp3");
        let fresh = tmp.path().join("fresh.mp3");
        fs::write(&old, b"old").unwrap();
        fs::write(&fresh, b"fresh").unwrap();
        age_file(&old, Duration::from_secs(2 * 60 * 60));
        age_file(&fresh, Duration::from_secs(10 * 60));

        let sweeper = RetentionSweeper::new(OutputDir::new(tmp.path()), DEFAULT_RETENTION);
        let report = sweeper.sweep().unwrap();

        assert_eq!(report, SweepReport { removed: 1, kept: 1, in_flight: 0 });
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn never_touches_in_flight_temp_files() {
        let tmp = tempdir().unwrap();
        let dir = OutputDir::new(tmp.path());
        let slot = dir.reserve_temp();
        let partial = tmp.path().join(format!("{}.webm.part", slot.prefix()));
        fs::write(&partial, b"partial").unwrap();
        age_file(&partial, Duration::from_secs(3 * 60 * 60));

        let sweeper = RetentionSweeper::new(dir, DEFAULT_RETENTION);
        let report = sweeper.sweep().unwrap();
        assert_eq!(report.in_flight, 1);
        assert!(partial.exists());

        drop(slot);
        let report = sweeper.sweep().unwrap();
        assert_eq!(report.removed, 1);
        assert!(!partial.exists());
    }

    #[test]
    fn missing_directory_is_an_empty_sweep() {
        let tmp = tempdir().unwrap();
        let sweeper = RetentionSweeper::new(
            OutputDir::new(tmp.path().join("not-created-yet")),
            DEFAULT_RETENTION,
        );
        assert_eq!(sweeper.sweep().unwrap(), SweepReport::default());
    }
}
