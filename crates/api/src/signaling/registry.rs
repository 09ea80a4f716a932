//! Connection registry
//!
//! Tracks every live connection and which one currently represents each user.
//! A user has at most one current connection; registering a new one replaces
//! the old mapping without closing the old transport. Presence events are
//! published while the write lock is held so transitions reach peers in the
//! order they were applied.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use carelink_shared::{SessionId, UserId};

use super::connection::Connection;
use super::presence::PresencePublisher;

struct Session {
    conn: Arc<Connection>,
    user_id: Option<UserId>,
}

#[derive(Default)]
struct Maps {
    /// Every live connection, registered or not
    sessions: HashMap<SessionId, Session>,
    /// Current connection per user
    current: HashMap<UserId, SessionId>,
}

impl Maps {
    fn connections(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.sessions.values().map(|s| &s.conn)
    }
}

/// Outcome of a `register` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// User was offline and is now online
    CameOnline,
    /// User already had another connection, which is now superseded
    Superseded(SessionId),
    /// Same user and connection were already registered
    Unchanged,
}

pub struct ConnectionRegistry {
    maps: RwLock<Maps>,
    presence: PresencePublisher,
}

impl ConnectionRegistry {
    pub fn new(presence: PresencePublisher) -> Self {
        Self {
            maps: RwLock::new(Maps::default()),
            presence,
        }
    }

    /// Track a connection that carries no user identity
    pub async fn attach(&self, conn: Arc<Connection>) {
        let mut maps = self.maps.write().await;
        maps.sessions
            .entry(conn.session_id)
            .or_insert(Session { conn, user_id: None });
    }

    /// Make `conn` the current connection for `user_id`
    pub async fn register(&self, user_id: UserId, conn: Arc<Connection>) -> Registration {
        let session_id = conn.session_id;
        let mut maps = self.maps.write().await;

        maps.sessions.insert(
            session_id,
            Session {
                conn,
                user_id: Some(user_id),
            },
        );

        let outcome = match maps.current.insert(user_id, session_id) {
            None => Registration::CameOnline,
            Some(previous) if previous == session_id => Registration::Unchanged,
            Some(previous) => Registration::Superseded(previous),
        };

        match outcome {
            Registration::CameOnline => {
                tracing::info!(
                    user_id = %user_id,
                    session_id = %session_id,
                    online_users = maps.current.len(),
                    "User came online"
                );
                self.presence.on_presence_change(maps.connections(), user_id, true);
            }
            Registration::Superseded(previous) => {
                tracing::info!(
                    user_id = %user_id,
                    session_id = %session_id,
                    superseded = %previous,
                    "User reconnected; previous connection superseded"
                );
            }
            Registration::Unchanged => {}
        }

        outcome
    }

    /// Forget a connection. Returns the user that went offline, if any.
    ///
    /// Unknown handles are ignored, and dropping a superseded connection
    /// leaves its user online.
    pub async fn unregister(&self, session_id: &SessionId) -> Option<UserId> {
        let mut maps = self.maps.write().await;

        let session = maps.sessions.remove(session_id)?;
        let user_id = session.user_id?;

        if maps.current.get(&user_id) != Some(session_id) {
            tracing::debug!(
                user_id = %user_id,
                session_id = %session_id,
                "Superseded connection closed; user stays online"
            );
            return None;
        }

        maps.current.remove(&user_id);
        tracing::info!(
            user_id = %user_id,
            session_id = %session_id,
            online_users = maps.current.len(),
            "User went offline"
        );
        self.presence.on_presence_change(maps.connections(), user_id, false);

        Some(user_id)
    }

    /// Current connection for a user
    pub async fn resolve(&self, user_id: &UserId) -> Option<Arc<Connection>> {
        let maps = self.maps.read().await;
        let session_id = maps.current.get(user_id)?;
        maps.sessions.get(session_id).map(|s| Arc::clone(&s.conn))
    }

    /// Identity claimed by a connection, whether or not it is still current
    pub async fn identity_of(&self, session_id: &SessionId) -> Option<UserId> {
        let maps = self.maps.read().await;
        maps.sessions.get(session_id).and_then(|s| s.user_id)
    }

    pub async fn is_online(&self, user_id: &UserId) -> bool {
        self.maps.read().await.current.contains_key(user_id)
    }

    /// Snapshot of online users, sorted
    pub async fn list_online(&self) -> Vec<UserId> {
        let maps = self.maps.read().await;
        let mut users: Vec<UserId> = maps.current.keys().copied().collect();
        users.sort();
        users
    }

    pub async fn connection_count(&self) -> usize {
        self.maps.read().await.sessions.len()
    }
}
