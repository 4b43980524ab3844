//! In-memory session store. Nothing outlives the process.
//!
//! Sessions idle for longer than the configured TTL are evicted by a
//! background sweeper, except while a model phase is running on them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::pipeline::orchestrator::SharedState;
use crate::pipeline::state::PipelineState;

pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub state: SharedState,
}

pub type SessionHandle = Arc<Session>;

struct Entry {
    session: SessionHandle,
    last_seen: Instant,
}

impl Entry {
    fn is_busy(&self) -> bool {
        // A held lock means a request is working on the session right now.
        self.session
            .state
            .try_lock()
            .map_or(true, |state| state.phase().is_running())
    }
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Entry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new session in the `Input` phase.
    pub async fn create(&self) -> SessionHandle {
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            state: Arc::new(Mutex::new(PipelineState::default())),
        });
        self.sessions.write().await.insert(
            session.id,
            Entry {
                session: Arc::clone(&session),
                last_seen: Instant::now(),
            },
        );
        session
    }

    /// Looks a session up and marks it as seen.
    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_seen = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    /// Discards a session. A phase still running on it finishes against the
    /// detached state and its result is dropped.
    pub async fn remove(&self, id: Uuid) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drops every session not seen for `ttl`. Returns how many went.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            if now.duration_since(entry.last_seen) < ttl {
                return true;
            }
            let busy = entry.is_busy();
            if busy {
                debug!("Session {id} is idle past its TTL but busy; keeping it");
            }
            busy
        });
        before - sessions.len()
    }

    /// Starts the eviction loop, checking every `period`.
    pub fn spawn_sweeper(self: &Arc<Self>, ttl: Duration, period: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = store.evict_idle(ttl).await;
                if evicted > 0 {
                    info!("Evicted {evicted} idle sessions");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{JobDetails, ResumePage};
    use crate::pipeline::state::{Phase, Submission};

    const TTL: Duration = Duration::from_secs(600);

    fn submission() -> Submission {
        let job = JobDetails {
            job_title: "Platform Engineer".to_string(),
            company_name: "Initech".to_string(),
            job_description: "Rust".to_string(),
        };
        let page = ResumePage::from_upload("image/png", b"page").unwrap();
        Submission::new(job, vec![page]).unwrap()
    }

    #[tokio::test]
    async fn test_create_get_remove() {
        let store = SessionStore::new();
        let created = store.create().await;

        let session = store.get(created.id).await.unwrap();
        assert_eq!(session.state.lock().await.phase(), Phase::Input);
        assert_eq!(session.created_at, created.created_at);
        assert_eq!(store.count().await, 1);

        assert!(store.remove(created.id).await);
        assert!(store.get(created.id).await.is_none());
        assert!(!store.remove(created.id).await);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        let a = store.create().await;
        let b = store.create().await;
        assert_ne!(a.id, b.id);

        *a.state.lock().await = PipelineState::Input {
            draft: None,
            last_error: Some("boom".to_string()),
        };

        let b = store.get(b.id).await.unwrap();
        assert_eq!(b.state.lock().await.last_error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle_drops_only_stale_sessions() {
        let store = SessionStore::new();
        let stale = store.create().await;
        let fresh = store.create().await;

        tokio::time::advance(TTL / 2).await;
        store.get(fresh.id).await.unwrap();
        tokio::time::advance(TTL / 2 + Duration::from_secs(1)).await;

        assert_eq!(store.evict_idle(TTL).await, 1);
        assert!(store.get(stale.id).await.is_none());
        assert!(store.get(fresh.id).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle_keeps_running_phase() {
        let store = SessionStore::new();
        let running = store.create().await;
        running.state.lock().await.submit(submission()).unwrap();
        let locked = store.create().await;
        let _guard = locked.state.lock().await;

        tokio::time::advance(TTL * 2).await;

        assert_eq!(store.evict_idle(TTL).await, 0);
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_abandoned_sessions() {
        let store = Arc::new(SessionStore::new());
        store.create().await;
        store.create().await;

        let sweeper = store.spawn_sweeper(TTL, Duration::from_secs(60));
        tokio::time::sleep(TTL + Duration::from_secs(120)).await;

        assert_eq!(store.count().await, 0);
        sweeper.abort();
    }
}
