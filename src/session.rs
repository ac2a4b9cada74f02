//! # Session Module
//!
//! Per-user conversation state behind the `SessionStore` trait. The in-memory
//! store expires sessions after a fixed idle duration.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::debug;

use crate::dialogue::{Mode, ResolvedRecord};

/// Mutable per-user record of the current mode
#[derive(Clone, Debug)]
pub struct Session {
    pub mode: Mode,
    touched_at: Instant,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            mode: Mode::Idle,
            touched_at: Instant::now(),
        }
    }

    pub fn resolved_record_key(&self) -> Option<&str> {
        self.mode.record().map(|r| r.key.as_str())
    }

    pub fn resolved_region(&self) -> Option<&str> {
        self.mode.record().map(|r| r.region.as_str())
    }

    /// Enter the category menu for a freshly resolved record
    pub fn show_record(&mut self, record: ResolvedRecord) {
        self.mode = Mode::ShowingMenu { record };
    }

    /// Back to `Idle`, dropping any selection
    pub fn reset(&mut self) {
        self.mode = Mode::Idle;
    }

    pub fn idle_for(&self) -> Duration {
        self.touched_at.elapsed()
    }

    fn touch(&mut self) {
        self.touched_at = Instant::now();
    }
}

/// Storage for sessions keyed by user id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Live session for the user; expired sessions read as absent
    async fn get(&self, user_id: &str) -> Option<Session>;
    /// Store the session and mark it as active now
    async fn put(&self, user_id: &str, session: Session);
    async fn remove(&self, user_id: &str);
    /// Drop every expired session, returning how many were dropped
    async fn purge_expired(&self) -> usize;
}

/// Concurrent in-memory store with idle expiry
pub struct InMemorySessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> Option<Session> {
        let ttl = self.ttl;
        if self
            .sessions
            .remove_if(user_id, |_, s| s.idle_for() > ttl)
            .is_some()
        {
            debug!(user_id = %user_id, "Session expired");
            return None;
        }
        self.sessions.get(user_id).map(|s| s.clone())
    }

    async fn put(&self, user_id: &str, mut session: Session) {
        session.touch();
        self.sessions.insert(user_id.to_string(), session);
    }

    async fn remove(&self, user_id: &str) {
        self.sessions.remove(user_id);
    }

    async fn purge_expired(&self) -> usize {
        let ttl = self.ttl;
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.idle_for() <= ttl);
        before.saturating_sub(self.sessions.len())
    }
}

/// Periodically purge expired sessions so idle users do not accumulate
pub fn spawn_purge(store: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired().await;
            if purged > 0 {
                debug!(purged, "Purged expired sessions");
            }
        }
    })
}
