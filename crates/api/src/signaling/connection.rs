//! WebSocket connection handle
//!
//! Represents one live WebSocket connection and the call rooms it has joined.

use std::collections::HashSet;
use time::OffsetDateTime;
use tokio::sync::{mpsc, RwLock};

use carelink_shared::{RoomId, SessionId};

use super::events::ServerEvent;

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique handle for this connection
    pub session_id: SessionId,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    /// When the transport was opened
    pub connected_at: OffsetDateTime,

    /// Rooms this connection has joined
    rooms: RwLock<HashSet<RoomId>>,
}

impl Connection {
    /// Create a new connection
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: SessionId::new(),
            sender,
            connected_at: OffsetDateTime::now_utc(),
            rooms: RwLock::new(HashSet::new()),
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if queued, Err if the writer side is already gone
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Send and forget; a closed connection just drops the event
    pub fn deliver(&self, event: ServerEvent) -> bool {
        match self.send(event) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    "Dropped event for closing connection"
                );
                false
            }
        }
    }

    pub async fn track_room(&self, room_id: RoomId) {
        self.rooms.write().await.insert(room_id);
    }

    pub async fn untrack_room(&self, room_id: &RoomId) {
        self.rooms.write().await.remove(room_id);
    }

    /// Rooms joined so far
    pub async fn joined_rooms(&self) -> Vec<RoomId> {
        let rooms = self.rooms.read().await;
        rooms.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_room_tracking() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);
        let room = RoomId::new("appt-1").unwrap();

        assert!(conn.joined_rooms().await.is_empty());

        conn.track_room(room.clone()).await;
        conn.track_room(room.clone()).await;
        assert_eq!(conn.joined_rooms().await, vec![room.clone()]);

        conn.untrack_room(&room).await;
        assert!(conn.joined_rooms().await.is_empty());
    }

    #[tokio::test]
    async fn test_deliver_to_closed_connection() {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new(tx);

        assert!(conn.deliver(ServerEvent::Pong));
        drop(rx);
        assert!(!conn.deliver(ServerEvent::Pong));
    }
}
