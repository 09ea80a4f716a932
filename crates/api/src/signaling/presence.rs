//! Presence publishing
//!
//! Broadcasts `user-online-status` to every live connection and mirrors the
//! flag into the identity store. Store writes go through a single writer task
//! so they land in the same order the transitions happened, without ever
//! blocking the caller.

use std::sync::Arc;
use tokio::sync::mpsc;

use carelink_shared::UserId;

use super::connection::Connection;
use super::events::ServerEvent;
use crate::store::IdentityStore;

#[derive(Debug)]
struct PresenceWrite {
    user_id: UserId,
    is_online: bool,
}

pub struct PresencePublisher {
    writes: mpsc::UnboundedSender<PresenceWrite>,
}

impl PresencePublisher {
    /// Create the publisher and spawn its store writer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<PresenceWrite>();

        tokio::spawn(async move {
            while let Some(write) = rx.recv().await {
                if let Err(e) = store.set_online(write.user_id, write.is_online).await {
                    tracing::error!(
                        user_id = %write.user_id,
                        is_online = write.is_online,
                        error = ?e,
                        "Failed to persist user presence"
                    );
                }
            }
            tracing::debug!("Presence writer stopped");
        });

        Self { writes: tx }
    }

    /// Publish one presence transition. Returns how many connections it reached.
    pub fn on_presence_change<'a, I>(&self, recipients: I, user_id: UserId, is_online: bool) -> usize
    where
        I: IntoIterator<Item = &'a Arc<Connection>>,
    {
        if self.writes.send(PresenceWrite { user_id, is_online }).is_err() {
            tracing::error!(user_id = %user_id, "Presence writer is gone; flag not persisted");
        }

        let event = ServerEvent::UserOnlineStatus { user_id, is_online };
        let delivered = recipients
            .into_iter()
            .filter(|conn| conn.deliver(event.clone()))
            .count();

        tracing::debug!(
            user_id = %user_id,
            is_online,
            recipients = delivered,
            "Broadcast presence update"
        );

        delivered
    }
}
