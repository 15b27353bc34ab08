//! Fixtures shared by unit tests: a scratch directory and shell scripts that
//! stand in for yt-dlp.

use crate::config::settings::AppConfig;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Answers `--dump-json` with a record and otherwise writes an MP3 to the
/// `--output` template.
pub const CONVERTER_OK: &str = r#"#!/bin/sh
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "--output" ]; then out="$arg"; fi
  prev="$arg"
done
for arg in "$@"; do
  if [ "$arg" = "--dump-json" ]; then
    echo "WARNING: noise before the record" >&2
    echo '{"title": "Test: Song/Title?", "duration": 212.0, "thumbnail": "https://i.ytimg.com/vi/abc/hq.jpg"}'
    exit 0
  fi
done
file=$(printf '%s' "$out" | sed 's/%(ext)s/mp3/')
printf 'ID3-fake-audio' > "$file"
echo "[ExtractAudio] Destination: $file"
"#;

/// Fails every invocation the way yt-dlp does for a removed video.
pub const CONVERTER_FAILS: &str = r#"#!/bin/sh
echo "ERROR: [youtube] abc: Video unavailable" >&2
exit 1
"#;

/// Exits cleanly without printing or writing anything.
pub const CONVERTER_SILENT: &str = "#!/bin/sh\nexit 0\n";

/// Prints something that is not JSON for metadata requests.
pub const CONVERTER_GARBLED: &str = "#!/bin/sh\necho 'this is not json'\n";

pub struct Sandbox {
    pub root: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path("downloads")
    }

    /// Writes `script` and returns the argv that runs it through `sh`.
    pub fn tool(&self, name: &str, script: &str) -> Vec<String> {
        let bin = self.path("bin");
        fs::create_dir_all(&bin).expect("create bin dir");
        let path = bin.join(format!("{name}.sh"));
        fs::write(&path, script).expect("write fake tool");
        vec!["sh".to_string(), path.to_string_lossy().into_owned()]
    }

    pub fn config(&self, tools: Vec<Vec<String>>) -> AppConfig {
        AppConfig {
            server_port: 0,
            download_dir: self.output_dir(),
            download_url_prefix: "downloads".to_string(),
            max_downloads_per_session: 50,
            command_timeout: Duration::from_secs(20),
            metadata_timeout: Duration::from_secs(20),
            retention: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            progress_pacing: Duration::ZERO,
            session_idle: Duration::from_secs(3600),
            tool_commands: tools,
        }
    }
}
