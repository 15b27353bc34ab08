use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DownloadDir,
    DownloadUrlPrefix,
    MaxDownloadsPerSession,
    CommandTimeoutSecs,
    MetadataTimeoutSecs,
    RetentionSecs,
    SweepIntervalSecs,
    ProgressPacingMs,
    SessionIdleSecs,
    YtDlpCommands,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DownloadDir => "DOWNLOAD_DIR",
            EnvKey::DownloadUrlPrefix => "DOWNLOAD_URL_PREFIX",
            EnvKey::MaxDownloadsPerSession => "MAX_DOWNLOADS_PER_SESSION",
            EnvKey::CommandTimeoutSecs => "COMMAND_TIMEOUT_SECS",
            EnvKey::MetadataTimeoutSecs => "METADATA_TIMEOUT_SECS",
            EnvKey::RetentionSecs => "RETENTION_SECS",
            EnvKey::SweepIntervalSecs => "SWEEP_INTERVAL_SECS",
            EnvKey::ProgressPacingMs => "PROGRESS_PACING_MS",
            EnvKey::SessionIdleSecs => "SESSION_IDLE_SECS",
            EnvKey::YtDlpCommands => "YTDLP_COMMANDS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
