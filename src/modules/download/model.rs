use crate::common::error::AppError;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Target MP3 bitrate in kbps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Quality {
    Kbps128,
    Kbps192,
    Kbps256,
    #[default]
    Kbps320,
}

impl Quality {
    pub const ALL: [Quality; 4] = [
        Quality::Kbps128,
        Quality::Kbps192,
        Quality::Kbps256,
        Quality::Kbps320,
    ];

    pub fn kbps(self) -> u16 {
        match self {
            Quality::Kbps128 => 128,
            Quality::Kbps192 => 192,
            Quality::Kbps256 => 256,
            Quality::Kbps320 => 320,
        }
    }

    /// Value for the converter's `--audio-quality` flag.
    pub fn audio_quality_arg(self) -> String {
        format!("{}K", self.kbps())
    }

    /// Parses an optional form value, defaulting to 320 when absent or blank.
    pub fn parse_or_default(raw: Option<&str>) -> Result<Self, AppError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some(value) => value.parse(),
        }
    }
}

impl FromStr for Quality {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().trim_end_matches(|c: char| c.eq_ignore_ascii_case(&'k'));
        Quality::ALL
            .into_iter()
            .find(|q| q.kbps().to_string() == value)
            .ok_or_else(|| AppError::InvalidInput("Invalid quality selection".to_string()))
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kbps())
    }
}

impl Serialize for Quality {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Statuses only move forward; terminal states are absorbing.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Error)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Error)
        )
    }
}

/// Fixed progress markers emitted while a job runs.
///
/// The converter reports nothing while it works, so these are milestones in
/// the pipeline and not a measure of bytes transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Checkpoint {
    Starting,
    FetchingMetadata,
    MetadataResolved,
    Downloading,
    ProcessingAudio,
    Converting,
    ProcessingFilename,
    Finalizing,
    Completed,
}

impl Checkpoint {
    pub fn percent(self) -> u8 {
        match self {
            Checkpoint::Starting => 0,
            Checkpoint::FetchingMetadata => 10,
            Checkpoint::MetadataResolved => 25,
            Checkpoint::Downloading => 40,
            Checkpoint::ProcessingAudio => 60,
            Checkpoint::Converting => 80,
            Checkpoint::ProcessingFilename => 90,
            Checkpoint::Finalizing => 95,
            Checkpoint::Completed => 100,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Checkpoint::Starting => "Starting download...",
            Checkpoint::FetchingMetadata => "Getting video information...",
            Checkpoint::MetadataResolved => "Starting download",
            Checkpoint::Downloading => "Downloading video...",
            Checkpoint::ProcessingAudio => "Processing audio...",
            Checkpoint::Converting => "Converting to MP3...",
            Checkpoint::ProcessingFilename => "Processing filename...",
            Checkpoint::Finalizing => "Finalizing...",
            Checkpoint::Completed => "Download completed!",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub download_url: String,
    pub filename: String,
    pub title: String,
    pub filesize: u64,
    #[serde(skip)]
    pub artifact_path: PathBuf,
}

/// One message on a job's progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum ProgressEvent {
    Progress {
        #[serde(rename = "downloadId")]
        download_id: String,
        progress: u8,
        message: String,
        data: Option<DownloadResult>,
    },
    Failed {
        #[serde(rename = "downloadId")]
        download_id: String,
        error: String,
        /// Always -1.
        progress: i8,
    },
}

impl ProgressEvent {
    pub fn failed(download_id: impl Into<String>, error: impl Into<String>) -> Self {
        ProgressEvent::Failed {
            download_id: download_id.into(),
            error: error.into(),
            progress: -1,
        }
    }

    #[cfg(test)]
    pub fn download_id(&self) -> &str {
        match self {
            ProgressEvent::Progress { download_id, .. } | ProgressEvent::Failed { download_id, .. } => {
                download_id
            }
        }
    }

    /// Progress percentage, -1 for failures.
    pub fn percent(&self) -> i16 {
        match self {
            ProgressEvent::Progress { progress, .. } => i16::from(*progress),
            ProgressEvent::Failed { progress, .. } => i16::from(*progress),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ProgressEvent::Progress { progress, data, .. } => *progress == 100 && data.is_some(),
            ProgressEvent::Failed { .. } => true,
        }
    }
}

/// One requested conversion and its lifecycle state.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: Uuid,
    pub url: String,
    #[schema(value_type = String, example = "320")]
    pub quality: Quality,
    pub status: JobStatus,
    pub title: String,
    pub progress: u8,
    pub error: Option<String>,
    pub download_url: Option<String>,
    pub filename: Option<String>,
    pub filesize: Option<u64>,
    #[serde(skip)]
    pub artifact_path: Option<PathBuf>,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
}

impl Job {
    pub fn new(url: impl Into<String>, quality: Quality) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            quality,
            status: JobStatus::Pending,
            title: String::new(),
            progress: 0,
            error: None,
            download_url: None,
            filename: None,
            filesize: None,
            artifact_path: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn advance(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    pub fn start(&mut self) -> bool {
        if !self.advance(JobStatus::Processing) {
            return false;
        }
        self.progress = 0;
        true
    }

    /// Records a non-terminal checkpoint; 100 is reserved for [`Job::complete`].
    pub fn record_progress(&mut self, percent: u8) {
        if self.status == JobStatus::Processing && percent < 100 {
            self.progress = self.progress.max(percent);
        }
    }

    pub fn complete(&mut self, result: &DownloadResult) -> bool {
        if !self.advance(JobStatus::Completed) {
            return false;
        }
        self.progress = 100;
        self.title = result.title.clone();
        self.download_url = Some(result.download_url.clone());
        self.filename = Some(result.filename.clone());
        self.filesize = Some(result.filesize);
        self.artifact_path = Some(result.artifact_path.clone());
        true
    }

    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.advance(JobStatus::Error) {
            return false;
        }
        self.progress = 0;
        self.error = Some(message.into());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> DownloadResult {
        DownloadResult {
            download_url: "downloads/Song.mp3".into(),
            filename: "Song.mp3".into(),
            title: "Song".into(),
            filesize: 42,
            artifact_path: PathBuf::from("/tmp/Song.mp3"),
        }
    }

    #[test]
    fn quality_parses_the_fixed_set_only() {
        assert_eq!("192".parse::<Quality>().unwrap(), Quality::Kbps192);
        assert_eq!("320k".parse::<Quality>().unwrap(), Quality::Kbps320);
        assert!("64".parse::<Quality>().is_err());
        assert_eq!(Quality::parse_or_default(None).unwrap(), Quality::Kbps320);
        assert_eq!(Quality::Kbps128.audio_quality_arg(), "128K");
    }

    #[test]
    fn job_status_only_moves_forward() {
        let mut job = Job::new("https://youtu.be/abc", Quality::default());
        assert!(!job.complete(&result()));
        assert!(job.start());
        job.record_progress(40);
        job.record_progress(25);
        assert_eq!(job.progress, 40);
        job.record_progress(100);
        assert_eq!(job.progress, 40);

        assert!(job.complete(&result()));
        assert_eq!(job.progress, 100);
        assert!(!job.fail("late"));
        assert!(!job.start());
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn failed_job_resets_progress() {
        let mut job = Job::new("https://youtu.be/abc", Quality::default());
        job.start();
        job.record_progress(60);
        assert!(job.fail("Download failed: nope"));
        assert_eq!(job.progress, 0);
        assert_eq!(job.error.as_deref(), Some("Download failed: nope"));
    }

    #[test]
    fn progress_event_wire_shape() {
        let progress = ProgressEvent::Progress {
            download_id: "d1".into(),
            progress: 40,
            message: "Downloading video...".into(),
            data: None,
        };
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["downloadId"], "d1");
        assert_eq!(json["progress"], 40);
        assert!(json["data"].is_null());

        let failed = ProgressEvent::failed("d1", "boom");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["progress"], -1);
        assert_eq!(json["error"], "boom");
        assert!(failed.is_terminal());

        let done = ProgressEvent::Progress {
            download_id: "d1".into(),
            progress: 100,
            message: "Download completed!".into(),
            data: Some(result()),
        };
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["data"]["downloadUrl"], "downloads/Song.mp3");
        assert!(json["data"].get("artifactPath").is_none());
    }

    #[test]
    fn job_serializes_quality_as_string() {
        let job = Job::new("https://youtu.be/abc", Quality::Kbps256);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["quality"], "256");
        assert_eq!(json["status"], "pending");
    }
}
