use crate::common::error::AppError;
use std::fmt;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// A program plus the fixed arguments that precede any per-call arguments,
/// e.g. `python3 -m yt_dlp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Builds a spec from an already split argv. Returns `None` for an empty argv.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        Some(Self::new(program.clone()).with_args(rest.iter().cloned()))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs `spec` with `args` appended, without a shell.
///
/// The child is killed if `timeout` elapses or `cancel` fires; both cases are
/// reported as errors rather than as a partial output.
pub async fn run(
    spec: &CommandSpec,
    args: &[String],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<CommandOutput, AppError> {
    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(command = %spec, args = ?args, "Spawning external command");

    let child = command.spawn().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => AppError::ToolNotFound(format!("{} not found", spec.program)),
        _ => AppError::ExternalToolFailure(format!("Failed to run {}: {}", spec, e)),
    })?;

    // Dropping the wait future drops the child, and kill_on_drop terminates it.
    let output = tokio::select! {
        result = tokio::time::timeout(timeout, child.wait_with_output()) => match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AppError::ExternalToolFailure(format!("Failed to wait for {}: {}", spec, e)));
            }
            Err(_) => {
                warn!(command = %spec, timeout_secs = timeout.as_secs(), "External command timed out, killing");
                return Err(AppError::Timeout(timeout));
            }
        },
        _ = cancel.cancelled() => {
            warn!(command = %spec, "External command cancelled, killing");
            return Err(AppError::Cancelled);
        }
    };

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    debug!(command = %spec, exit_code = ?output.status.code(), bytes = text.len(), "External command finished");

    Ok(CommandOutput {
        exit_code: output.status.code(),
        output: text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> (CommandSpec, Vec<String>) {
        (
            CommandSpec::new("sh"),
            vec!["-c".to_string(), script.to_string()],
        )
    }

    #[tokio::test]
    async fn captures_exit_code_and_both_streams() {
        let (spec, args) = sh("echo out; echo err >&2; exit 3");
        let output = run(&spec, &args, DEFAULT_TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert!(output.output.contains("out"));
        assert!(output.output.contains("err"));
    }

    #[tokio::test]
    async fn arguments_are_not_interpreted_by_a_shell() {
        let hostile = "$(echo pwned); rm -rf / && `id`".to_string();
        let spec = CommandSpec::new("printf").with_args(["%s"]);
        let output = run(&spec, &[hostile.clone()], DEFAULT_TIMEOUT, &CancellationToken::new())
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.output, hostile);
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let (spec, args) = sh("sleep 5");
        let err = run(&spec, &args, Duration::from_millis(100), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Timeout(d) if d == Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn missing_program_is_tool_not_found() {
        let spec = CommandSpec::new("definitely-not-a-real-downloader-binary");
        let err = run(&spec, &[], DEFAULT_TIMEOUT, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn cancellation_stops_the_child() {
        let (spec, args) = sh("sleep 5");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = run(&spec, &args, DEFAULT_TIMEOUT, &cancel).await.unwrap_err();
        assert!(matches!(err, AppError::Cancelled));
    }

    #[test]
    fn spec_from_argv_splits_program_and_prefix_args() {
        let argv = vec!["python3".to_string(), "-m".to_string(), "yt_dlp".to_string()];
        let spec = CommandSpec::from_argv(&argv).unwrap();
        assert_eq!(spec.program, "python3");
        assert_eq!(spec.args, vec!["-m", "yt_dlp"]);
        assert_eq!(spec.to_string(), "python3 -m yt_dlp");
        assert!(CommandSpec::from_argv(&[]).is_none());
    }
}
