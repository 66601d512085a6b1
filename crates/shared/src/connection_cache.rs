use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::backend::BackendSelection;

pub const DEFAULT_CONNECTION_TTL: Duration = Duration::from_secs(2 * 60 * 60);

struct CacheEntry<H: ?Sized> {
    key: BackendSelection,
    handle: Arc<H>,
    created_at: Instant,
}

/// Single-slot memo of the live connection for one session.
///
/// The entry is reused while its key equals the requested selection and its age is
/// below the ttl; otherwise the handle is rebuilt and the old one dropped. A failed
/// build leaves the cache empty.
pub struct ConnectionCache<H: ?Sized> {
    ttl: Duration,
    entry: Option<CacheEntry<H>>,
}

impl<H: ?Sized> ConnectionCache<H> {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entry: None }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cached_at(&self, selection: &BackendSelection, now: Instant) -> Option<Arc<H>> {
        self.entry
            .as_ref()
            .filter(|entry| entry.key == *selection && self.is_fresh(entry, now))
            .map(|entry| Arc::clone(&entry.handle))
    }

    pub async fn get_or_connect<F, Fut, E>(
        &mut self,
        selection: &BackendSelection,
        connect: F,
    ) -> Result<Arc<H>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<H>, E>>,
    {
        self.get_or_connect_at(selection, Instant::now(), connect)
            .await
    }

    pub async fn get_or_connect_at<F, Fut, E>(
        &mut self,
        selection: &BackendSelection,
        now: Instant,
        connect: F,
    ) -> Result<Arc<H>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<H>, E>>,
    {
        if let Some(handle) = self.cached_at(selection, now) {
            debug!(backend = selection.kind().as_str(), "reusing cached connection");
            return Ok(handle);
        }

        if let Some(stale) = self.entry.take() {
            let reason = if stale.key == *selection {
                "expired"
            } else {
                "selection_changed"
            };
            info!(
                backend = selection.kind().as_str(),
                reason, "rebuilding database connection"
            );
        }

        let handle = connect().await?;
        self.entry = Some(CacheEntry {
            key: selection.clone(),
            handle: Arc::clone(&handle),
            created_at: now,
        });
        Ok(handle)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    fn is_fresh(&self, entry: &CacheEntry<H>, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) < self.ttl
    }
}

impl<H: ?Sized> Default for ConnectionCache<H> {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECTION_TTL)
    }
}
