use crate::config::env::{self, EnvKey};
use std::path::PathBuf;
use std::time::Duration;

/// Provider commands tried in order when `YTDLP_COMMANDS` is not set.
pub const DEFAULT_TOOL_COMMANDS: &str =
    "yt-dlp;/usr/local/bin/yt-dlp;python3 -m yt_dlp;/usr/bin/yt-dlp;youtube-dl";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub download_dir: PathBuf,
    pub download_url_prefix: String,
    pub max_downloads_per_session: usize,
    pub command_timeout: Duration,
    pub metadata_timeout: Duration,
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub progress_pacing: Duration,
    /// Sessions untouched for this long, with no queue run active, are dropped.
    pub session_idle: Duration,
    pub tool_commands: Vec<Vec<String>>,
}

impl AppConfig {
    pub fn new() -> Self {
        Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            download_dir: PathBuf::from(env::get_or(EnvKey::DownloadDir, "./downloads")),
            download_url_prefix: env::get_or(EnvKey::DownloadUrlPrefix, "downloads")
                .trim_end_matches('/')
                .to_string(),
            max_downloads_per_session: env::get_parsed(EnvKey::MaxDownloadsPerSession, 50),
            command_timeout: Duration::from_secs(env::get_parsed(EnvKey::CommandTimeoutSecs, 300)),
            metadata_timeout: Duration::from_secs(env::get_parsed(EnvKey::MetadataTimeoutSecs, 60)),
            retention: Duration::from_secs(env::get_parsed(EnvKey::RetentionSecs, 3600)),
            sweep_interval: Duration::from_secs(env::get_parsed(EnvKey::SweepIntervalSecs, 300)),
            progress_pacing: Duration::from_millis(env::get_parsed(EnvKey::ProgressPacingMs, 200)),
            session_idle: Duration::from_secs(env::get_parsed(EnvKey::SessionIdleSecs, 6 * 3600)),
            tool_commands: parse_tool_commands(&env::get_or(
                EnvKey::YtDlpCommands,
                DEFAULT_TOOL_COMMANDS,
            )),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits `a --flag;b` into `[["a", "--flag"], ["b"]]`, skipping blank entries.
pub fn parse_tool_commands(raw: &str) -> Vec<Vec<String>> {
    raw.split(';')
        .map(|command| {
            command
                .split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|parts| !parts.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_commands_are_split_into_argv() {
        let commands = parse_tool_commands("yt-dlp; python3 -m yt_dlp ;;");
        assert_eq!(
            commands,
            vec![
                vec!["yt-dlp".to_string()],
                vec!["python3".to_string(), "-m".to_string(), "yt_dlp".to_string()],
            ]
        );
    }

    #[test]
    fn default_chain_starts_with_yt_dlp() {
        let commands = parse_tool_commands(DEFAULT_TOOL_COMMANDS);
        assert_eq!(commands.len(), 5);
        assert_eq!(commands[0], vec!["yt-dlp".to_string()]);
        assert_eq!(commands[4], vec!["youtube-dl".to_string()]);
    }
}
