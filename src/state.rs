use crate::config::settings::AppConfig;
use crate::infrastructure::storage::OutputDir;
use crate::modules::download::JobExecutor;
use crate::modules::queue::SessionStore;
use crate::workers::sweeper::RetentionSweeper;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub executor: Arc<JobExecutor>,
    pub sessions: SessionStore,
    pub sweeper: RetentionSweeper,
    /// Cancelled on server shutdown; kills running converters.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let output = OutputDir::new(config.download_dir.clone());
        let executor = Arc::new(JobExecutor::new(&config, output.clone()));
        let shutdown = CancellationToken::new();
        let sessions = SessionStore::new(
            executor.clone(),
            config.max_downloads_per_session,
            config.progress_pacing,
            config.session_idle,
            shutdown.clone(),
        );

        Self {
            sweeper: RetentionSweeper::new(output, config.retention),
            config,
            executor,
            sessions,
            shutdown,
        }
    }
}
