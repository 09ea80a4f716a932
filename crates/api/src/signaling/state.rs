//! Signaling state management
//!
//! Owns the registry and room coordinator and wires the relays on top of
//! them. Cheap to clone; every clone shares the same state.

use std::sync::Arc;
use tokio::sync::mpsc;

use carelink_shared::UserId;

use super::connection::Connection;
use super::direct::DirectMessageRouter;
use super::events::ServerEvent;
use super::fanout::StatusFanout;
use super::presence::PresencePublisher;
use super::registry::ConnectionRegistry;
use super::room::RoomCoordinator;
use crate::store::{AppointmentStore, IdentityStore};

/// Signaling state shared across all connections
#[derive(Clone)]
pub struct SignalingState {
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomCoordinator>,
    pub direct: DirectMessageRouter,
    pub fanout: StatusFanout,
    evict_on_disconnect: bool,
}

impl SignalingState {
    /// Must be called from within a Tokio runtime (spawns the presence writer).
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        appointments: Arc<dyn AppointmentStore>,
        evict_on_disconnect: bool,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(PresencePublisher::new(identities)));
        Self {
            rooms: Arc::new(RoomCoordinator::new(appointments)),
            direct: DirectMessageRouter::new(Arc::clone(&registry)),
            fanout: StatusFanout::new(Arc::clone(&registry)),
            registry,
            evict_on_disconnect,
        }
    }

    /// Open a connection, registering it when the client named a user
    pub async fn connect(
        &self,
        user_id: Option<UserId>,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) -> Arc<Connection> {
        let conn = Arc::new(Connection::new(sender));
        match user_id {
            Some(user_id) => {
                self.registry.register(user_id, Arc::clone(&conn)).await;
            }
            None => {
                tracing::info!(session_id = %conn.session_id, "Anonymous connection opened");
                self.registry.attach(Arc::clone(&conn)).await;
            }
        }
        conn
    }

    /// Tear down a connection. Safe to call more than once.
    pub async fn disconnect(&self, conn: &Connection) {
        self.registry.unregister(&conn.session_id).await;
        if self.evict_on_disconnect {
            self.rooms.remove_connection(conn).await;
        }

        let remaining = self.registry.connection_count().await;
        tracing::info!(
            session_id = %conn.session_id,
            remaining_connections = remaining,
            "Connection removed"
        );
    }

    /// Get statistics about the signaling state
    pub async fn get_stats(&self) -> SignalingStats {
        SignalingStats {
            active_connections: self.registry.connection_count().await,
            online_users: self.registry.list_online().await.len(),
            active_rooms: self.rooms.get_room_count().await,
            pending_offers: self.rooms.get_pending_offer_count().await,
        }
    }
}

/// Statistics about signaling connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingStats {
    /// Number of open connections
    pub active_connections: usize,
    /// Number of users with a current connection
    pub online_users: usize,
    /// Number of call rooms in memory
    pub active_rooms: usize,
    /// Rooms holding an unanswered offer
    pub pending_offers: usize,
}
