use super::controller::QueueController;
use crate::modules::download::executor::JobExecutor;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_cookies::{Cookie, Cookies};
use tracing::{debug, info};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "mp3_session";

/// A browser session's queue plus the token that stops its runs.
#[derive(Clone)]
pub struct Session {
    pub id: Uuid,
    pub queue: QueueController,
    pub cancel: CancellationToken,
}

struct Tracked {
    session: Session,
    last_seen: Mutex<Instant>,
}

impl Tracked {
    fn touch(&self) -> Session {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.session.clone()
    }

    fn is_idle(&self, now: Instant, idle: Duration) -> bool {
        let last_seen = *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(last_seen) > idle && !self.session.queue.is_running()
    }
}

/// Maps the opaque session cookie to that session's queue. Sessions live in
/// memory only and are evicted after `idle` without requests.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Tracked>>>,
    executor: Arc<JobExecutor>,
    quota: usize,
    pacing: Duration,
    idle: Duration,
    shutdown: CancellationToken,
}

impl SessionStore {
    pub fn new(
        executor: Arc<JobExecutor>,
        quota: usize,
        pacing: Duration,
        idle: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            executor,
            quota,
            pacing,
            idle,
            shutdown,
        }
    }

    /// Session named by the request cookie, creating it (and setting the
    /// cookie) when missing or unknown.
    pub async fn resolve(&self, cookies: &Cookies) -> Session {
        let requested = cookies
            .get(SESSION_COOKIE)
            .and_then(|c| Uuid::parse_str(c.value()).ok());

        let session = self.get_or_create(requested).await;
        if requested != Some(session.id) {
            let mut cookie = Cookie::new(SESSION_COOKIE, session.id.to_string());
            cookie.set_http_only(true);
            cookie.set_path("/");
            cookies.add(cookie);
        }
        session
    }

    pub async fn get_or_create(&self, id: Option<Uuid>) -> Session {
        if let Some(id) = id {
            if let Some(tracked) = self.sessions.read().await.get(&id) {
                return tracked.touch();
            }
        }

        let mut sessions = self.sessions.write().await;
        // Another request may have created it between the two locks.
        if let Some(tracked) = id.and_then(|id| sessions.get(&id)) {
            return tracked.touch();
        }

        let id = Uuid::new_v4();
        let queue = QueueController::new(self.executor.clone(), self.quota, self.pacing);
        queue.on_change(move |snapshot| {
            debug!(
                session = %id,
                jobs = snapshot.jobs.len(),
                running = snapshot.running,
                overall = snapshot.overall_progress,
                "Queue changed"
            );
        });

        let session = Session {
            id,
            queue,
            cancel: self.shutdown.child_token(),
        };
        sessions.insert(
            id,
            Tracked {
                session: session.clone(),
                last_seen: Mutex::new(Instant::now()),
            },
        );
        info!(session = %id, active = sessions.len(), "🆕 Session created");
        session
    }

    /// Drops the session and stops any run it has in progress.
    pub async fn end(&self, id: Uuid) -> bool {
        let Some(tracked) = self.sessions.write().await.remove(&id) else {
            return false;
        };
        tracked.session.cancel.cancel();
        info!(session = %id, "👋 Session ended");
        true
    }

    /// Ends the session named by the request cookie and clears the cookie.
    pub async fn end_current(&self, cookies: &Cookies) -> bool {
        let Some(id) = cookies
            .get(SESSION_COOKIE)
            .and_then(|c| Uuid::parse_str(c.value()).ok())
        else {
            return false;
        };

        let mut cookie = Cookie::new(SESSION_COOKIE, "");
        cookie.set_path("/");
        cookies.remove(cookie);

        self.end(id).await
    }

    pub async fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now()).await
    }

    /// Drops sessions not seen for longer than the idle window. Sessions with
    /// a queue run in progress are kept.
    pub async fn evict_idle_at(&self, now: Instant) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, tracked| !tracked.is_idle(now, self.idle));

        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, active = sessions.len(), "🧹 Evicted idle sessions");
        }
        evicted
    }

    #[cfg(test)]
    pub async fn get(&self, id: Uuid) -> Option<Session> {
        self.sessions.read().await.get(&id).map(|t| t.session.clone())
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::OutputDir;
    use crate::modules::download::model::Quality;
    use crate::testing::{Sandbox, CONVERTER_OK};

    fn store(sandbox: &Sandbox) -> SessionStore {
        let config = sandbox.config(vec![sandbox.tool("ok", CONVERTER_OK)]);
        let executor = Arc::new(JobExecutor::new(
            &config,
            OutputDir::new(config.download_dir.clone()),
        ));
        SessionStore::new(
            executor,
            2,
            Duration::ZERO,
            Duration::from_secs(60),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn sessions_are_isolated_and_reused() {
        let sandbox = Sandbox::new();
        let store = store(&sandbox);

        let a = store.get_or_create(None).await;
        let b = store.get_or_create(Some(Uuid::new_v4())).await;
        assert_ne!(a.id, b.id);
        assert_eq!(store.len().await, 2);

        a.queue.enqueue("https://youtu.be/abc", Quality::default()).unwrap();
        let again = store.get_or_create(Some(a.id)).await;
        assert_eq!(again.queue.snapshot().jobs.len(), 1);
        assert!(b.queue.snapshot().jobs.is_empty());
    }

    #[tokio::test]
    async fn quota_is_per_session() {
        let sandbox = Sandbox::new();
        let store = store(&sandbox);
        let a = store.get_or_create(None).await;
        let b = store.get_or_create(None).await;

        a.queue.reserve_slot().unwrap();
        a.queue.reserve_slot().unwrap();
        assert!(a.queue.check_quota().is_err());
        assert!(b.queue.check_quota().is_ok());
    }

    #[tokio::test]
    async fn ending_a_session_cancels_its_runs() {
        let sandbox = Sandbox::new();
        let store = store(&sandbox);
        let session = store.get_or_create(None).await;

        assert!(store.end(session.id).await);
        assert!(session.cancel.is_cancelled());
        assert!(store.get(session.id).await.is_none());
        assert!(!store.end(session.id).await);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted_unless_running() {
        let sandbox = Sandbox::new();
        let store = store(&sandbox);

        for _ in 0..100 {
            store.get_or_create(None).await;
        }
        let busy = store.get_or_create(None).await;
        busy.queue.enqueue("https://youtu.be/abc", Quality::default()).unwrap();
        let claim = busy.queue.claim_run().unwrap();

        assert_eq!(store.evict_idle().await, 0);
        assert_eq!(store.len().await, 101);

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(store.evict_idle_at(later).await, 100);
        assert_eq!(store.len().await, 1);
        assert!(store.get(busy.id).await.is_some());

        drop(claim);
        assert_eq!(store.evict_idle_at(later).await, 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn requests_keep_a_session_alive() {
        let sandbox = Sandbox::new();
        let store = store(&sandbox);
        let session = store.get_or_create(None).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        let cutoff = Instant::now();
        store.get_or_create(Some(session.id)).await;

        // Seen after `cutoff`, so not idle relative to a window ending there.
        assert_eq!(store.evict_idle_at(cutoff + Duration::from_secs(60)).await, 0);
        assert_eq!(store.evict_idle_at(cutoff + Duration::from_secs(61)).await, 1);
    }
}
