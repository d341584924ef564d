use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration as IdleDuration, Utc};
use tracing::{debug, info};

use crate::error::{SessionError, SessionResult};

use super::VerifySession;

/// Handle to one live dialogue.
///
/// Turns on the same session lock this mutex for their whole duration,
/// including the await on the rule engine, so concurrent answers to one
/// session serialize instead of racing the pending question.
pub type SessionHandle = Arc<tokio::sync::Mutex<VerifySession>>;

/// Process-wide map of live verification dialogues, keyed by session id.
///
/// Sessions are reclaimed after `idle_timeout` without a state-changing
/// turn: lazily on access, and by the periodic [`SessionStore::sweep`].
/// Terminal sessions stay in the map until they expire so that a late
/// answer is rejected as terminated rather than unknown.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<String, SessionHandle>>>,
    idle_timeout: IdleDuration,
}

impl SessionStore {
    /// Create a store with the given idle-expiry timeout
    pub fn new(idle_timeout: std::time::Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout: IdleDuration::from_std(idle_timeout)
                .unwrap_or_else(|_| IdleDuration::seconds(1800)),
        }
    }

    /// Create a new session under `id`.
    ///
    /// Fails with [`SessionError::Duplicate`] while a live (non-terminal,
    /// non-expired) session holds the id; a terminal or expired entry is
    /// overwritten.
    pub fn create(&self, id: &str, target: &str) -> SessionResult<SessionHandle> {
        let mut map = self.inner.lock().expect("session map lock poisoned");

        if let Some(existing) = map.get(id) {
            match existing.try_lock() {
                // A turn is in flight on this id: certainly live.
                Err(_) => {
                    return Err(SessionError::Duplicate {
                        session_id: id.to_string(),
                    });
                }
                Ok(session) => {
                    if !session.is_terminal() && !self.is_expired(&session) {
                        return Err(SessionError::Duplicate {
                            session_id: id.to_string(),
                        });
                    }
                }
            }
        }

        let handle: SessionHandle =
            Arc::new(tokio::sync::Mutex::new(VerifySession::new(id, target)));
        map.insert(id.to_string(), handle.clone());
        debug!(session_id = %id, target = %target, "Session created");
        Ok(handle)
    }

    /// Look up a session, reclaiming it first if it idled out.
    pub fn get(&self, id: &str) -> SessionResult<SessionHandle> {
        let mut map = self.inner.lock().expect("session map lock poisoned");

        let handle = map
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownSession {
                session_id: id.to_string(),
            })?;

        // An in-flight turn holds the session lock; such a session cannot be
        // idle, so only an uncontended one is checked for expiry.
        if let Ok(session) = handle.try_lock() {
            if self.is_expired(&session) {
                drop(session);
                map.remove(id);
                info!(session_id = %id, "Expired session reclaimed on access");
                return Err(SessionError::UnknownSession {
                    session_id: id.to_string(),
                });
            }
        }

        Ok(handle)
    }

    /// Remove a session. Removing an absent id is a no-op.
    pub fn remove(&self, id: &str) -> bool {
        let mut map = self.inner.lock().expect("session map lock poisoned");
        map.remove(id).is_some()
    }

    /// Drop every idle-expired session, returning how many were reclaimed.
    pub fn sweep(&self) -> usize {
        let mut map = self.inner.lock().expect("session map lock poisoned");
        let before = map.len();
        map.retain(|_, handle| match handle.try_lock() {
            Ok(session) => !self.is_expired(&session),
            // Locked means a turn is in flight; keep it.
            Err(_) => true,
        });
        before - map.len()
    }

    /// Number of sessions currently held, terminal ones included.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("session map lock poisoned").len()
    }

    /// Whether the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the periodic expiry sweeper on the current runtime.
    pub fn spawn_sweeper(&self, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reclaimed = store.sweep();
                if reclaimed > 0 {
                    debug!(reclaimed, "Expired verification sessions reclaimed");
                }
            }
        })
    }

    fn is_expired(&self, session: &VerifySession) -> bool {
        Utc::now() - session.last_active >= self.idle_timeout
    }
}
