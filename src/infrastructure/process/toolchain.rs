use super::CommandSpec;
use crate::common::error::AppError;
use std::future::Future;
use tracing::{debug, warn};

pub const INSTALL_HINT: &str = "No YouTube downloader found. Please install yt-dlp: pip install yt-dlp\n\
Or visit: https://github.com/yt-dlp/yt-dlp";

#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub provider: String,
    pub reason: String,
}

/// Ordered list of interchangeable downloader commands. Each call tries the
/// providers in order and the first success wins.
#[derive(Debug, Clone)]
pub struct ToolChain {
    providers: Vec<CommandSpec>,
}

impl ToolChain {
    pub fn new(providers: Vec<CommandSpec>) -> Self {
        Self { providers }
    }

    pub fn from_commands(commands: &[Vec<String>]) -> Self {
        Self::new(commands.iter().filter_map(|argv| CommandSpec::from_argv(argv)).collect())
    }

    /// Runs `attempt` against each provider until one returns `Ok`.
    ///
    /// Timeouts and cancellation stop the chain immediately. If no provider
    /// could even be started the result is `ToolNotFound` with install
    /// instructions; otherwise the last provider error is returned.
    pub async fn try_each<'a, T, F, Fut>(&'a self, mut attempt: F) -> Result<T, AppError>
    where
        F: FnMut(&'a CommandSpec) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut failures = Vec::new();
        let mut last_error = None;

        for provider in &self.providers {
            match attempt(provider).await {
                Ok(value) => return Ok(value),
                Err(err @ (AppError::Timeout(_) | AppError::Cancelled)) => return Err(err),
                Err(AppError::ToolNotFound(reason)) => {
                    debug!(provider = %provider, "Provider not installed");
                    failures.push(ProviderFailure {
                        provider: provider.to_string(),
                        reason,
                    });
                }
                Err(err) => {
                    warn!(provider = %provider, error = %err, "Provider failed");
                    failures.push(ProviderFailure {
                        provider: provider.to_string(),
                        reason: err.to_string(),
                    });
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::ToolNotFound(missing_tool_message(&failures))))
    }
}

pub fn missing_tool_message(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return format!("{}\n\nNo downloader commands are configured.", INSTALL_HINT);
    }

    let tried = failures
        .iter()
        .map(|f| format!("  {}: {}", f.provider, f.reason))
        .collect::<Vec<_>>()
        .join("\n");

    format!("{}\n\nTried:\n{}", INSTALL_HINT, tried)
}
