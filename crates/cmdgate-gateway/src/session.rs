//! Session management
//!
//! Sessions are created at login, looked up from the request cookie, refreshed
//! on every hit and evicted once idle for longer than the TTL.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Opaque 128-bit session identifier, rendered as a decimal number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u128);

impl SessionId {
    pub fn random() -> Self {
        SessionId(rand::random::<u128>())
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl From<u128> for SessionId {
    fn from(value: u128) -> Self {
        SessionId(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u128>().map(SessionId)
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Removed by the TTL sweep
    Expired,
    /// Removed by logout
    Closed,
}

/// An authenticated user's session
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub user: String,
    pub created_at: DateTime<Utc>,
    last_used: RwLock<DateTime<Utc>>,
    state: RwLock<SessionState>,
}

impl Session {
    fn new(id: SessionId, user: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user,
            created_at: now,
            last_used: RwLock::new(now),
            state: RwLock::new(SessionState::Active),
        }
    }

    pub fn last_used(&self) -> DateTime<Utc> {
        *self.last_used.read()
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Time since last use, as seen at `now`
    pub fn idle_time(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_used()
    }

    fn touch(&self, now: DateTime<Utc>) {
        *self.last_used.write() = now;
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }
}

/// Owns the session table
#[derive(Debug)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    cookie_name: String,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(cookie_name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            cookie_name: cookie_name.into(),
            ttl,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a session for `user`
    pub fn push_session(&self, user: impl Into<String>) -> Arc<Session> {
        self.push_session_at(user, Utc::now())
    }

    pub fn push_session_at(&self, user: impl Into<String>, now: DateTime<Utc>) -> Arc<Session> {
        let mut sessions = self.sessions.write();
        let mut id = SessionId::random();
        while sessions.contains_key(&id) {
            id = SessionId::random();
        }

        let session = Arc::new(Session::new(id, user.into(), now));
        sessions.insert(id, Arc::clone(&session));
        debug!("Created session {} for user {}", id, session.user);
        session
    }

    /// Resolve the session named by a `Cookie` header, refreshing it on a hit
    pub fn get_session(&self, cookie_header: Option<&str>) -> Option<Arc<Session>> {
        self.get_session_at(cookie_header, Utc::now())
    }

    pub fn get_session_at(
        &self,
        cookie_header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<Arc<Session>> {
        let id = self.session_id_from_cookie(cookie_header?)?;
        // Touch under the table lock so a concurrent sweep cannot evict in between.
        let sessions = self.sessions.read();
        let session = sessions.get(&id)?;
        session.touch(now);
        Some(Arc::clone(session))
    }

    /// Extract and parse the session id from a `Cookie` header
    pub fn session_id_from_cookie(&self, cookie_header: &str) -> Option<SessionId> {
        cookie_value(cookie_header, &self.cookie_name)?.parse().ok()
    }

    /// Remove a session, e.g. at logout
    pub fn remove_session(&self, id: SessionId) -> Option<Arc<Session>> {
        let session = self.sessions.write().remove(&id)?;
        session.set_state(SessionState::Closed);
        debug!("Closed session {}", id);
        Some(session)
    }

    /// Evict sessions idle past the TTL, returning how many were removed
    pub fn check_sessions(&self) -> usize {
        self.check_sessions_at(Utc::now())
    }

    pub fn check_sessions_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.ttl;
        let mut sessions = self.sessions.write();
        let before = sessions.len();

        sessions.retain(|_, session| {
            if session.last_used() < cutoff {
                session.set_state(SessionState::Expired);
                false
            } else {
                true
            }
        });

        let removed = before - sessions.len();
        if removed > 0 {
            info!("Expired {} idle session(s), {} remaining", removed, sessions.len());
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn exists(&self, id: SessionId) -> bool {
        self.sessions.read().contains_key(&id)
    }

    /// Run `check_sessions` every `interval` until `cancel` fires
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: std::time::Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Session sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        manager.check_sessions();
                    }
                }
            }
        })
    }
}

/// Find the value of cookie `name` in a `Cookie` header
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key.trim() == name {
            Some(value.trim().trim_matches('"'))
        } else {
            None
        }
    })
}
