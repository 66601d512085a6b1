use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use shared::session::SessionContext;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;
use uuid::Uuid;

pub type SharedSession = Arc<AsyncMutex<SessionContext>>;

struct SessionEntry {
    session: SharedSession,
    last_active: Instant,
}

/// In-memory chat sessions keyed by id.
///
/// Each session sits behind its own async mutex so turns on one session run one at
/// a time while other sessions proceed independently.
#[derive(Clone)]
pub struct SessionRegistry {
    entries: Arc<Mutex<HashMap<Uuid, SessionEntry>>>,
    connection_ttl: Duration,
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(connection_ttl: Duration, idle_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            connection_ttl,
            idle_ttl,
        }
    }

    pub fn create(&self) -> SharedSession {
        self.create_at(Instant::now())
    }

    fn create_at(&self, now: Instant) -> SharedSession {
        let id = Uuid::new_v4();
        let session = Arc::new(AsyncMutex::new(SessionContext::new(
            id,
            self.connection_ttl,
        )));

        self.lock().insert(
            id,
            SessionEntry {
                session: Arc::clone(&session),
                last_active: now,
            },
        );
        info!(session_id = %id, "session created");
        session
    }

    /// Looks up a session and marks it active.
    pub fn get(&self, id: Uuid) -> Option<SharedSession> {
        self.get_at(id, Instant::now())
    }

    fn get_at(&self, id: Uuid, now: Instant) -> Option<SharedSession> {
        let mut entries = self.lock();
        let entry = entries.get_mut(&id)?;
        entry.last_active = now;
        Some(Arc::clone(&entry.session))
    }

    pub fn remove(&self, id: Uuid) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            info!(session_id = %id, "session removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn spawn_pruner(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.prune_at(Instant::now());
            }
        })
    }

    /// Drops sessions idle for at least the idle ttl. Sessions still referenced by
    /// an in-flight request are kept.
    fn prune_at(&self, now: Instant) -> usize {
        let idle_ttl = self.idle_ttl;
        let mut entries = self.lock();
        let before = entries.len();

        entries.retain(|_, entry| {
            let idle = now.saturating_duration_since(entry.last_active);
            idle < idle_ttl || Arc::strong_count(&entry.session) > 1
        });

        let pruned = before - entries.len();
        if pruned > 0 {
            info!(pruned, remaining = entries.len(), "pruned idle sessions");
        }
        pruned
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, SessionEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
