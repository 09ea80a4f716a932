//! Private chat relay
//!
//! At-most-once: a message for a user who is not connected right now is
//! dropped. Nothing is stored and the sender is never told.

use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;

use carelink_shared::{SessionId, UserId};

use super::events::ServerEvent;
use super::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct DirectMessageRouter {
    registry: Arc<ConnectionRegistry>,
}

impl DirectMessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Forward `message` from the user behind `from` to `to_user_id`.
    /// Returns whether it was handed to a live connection.
    pub async fn send_direct(&self, to_user_id: &UserId, from: &SessionId, message: Value) -> bool {
        let Some(from_user_id) = self.registry.identity_of(from).await else {
            tracing::debug!(session_id = %from, "Private message from unregistered connection dropped");
            return false;
        };

        let Some(target) = self.registry.resolve(to_user_id).await else {
            tracing::debug!(
                from_user_id = %from_user_id,
                to_user_id = %to_user_id,
                "Recipient offline; private message dropped"
            );
            return false;
        };

        target.deliver(ServerEvent::PrivateMessage {
            from_user_id,
            message,
            timestamp: OffsetDateTime::now_utc(),
        })
    }
}
