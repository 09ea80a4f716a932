//! Appointment status fan-out
//!
//! Each target is resolved on its own; an offline participant never blocks
//! delivery to the others. No buffering, no retry.

use std::collections::HashSet;
use std::sync::Arc;

use carelink_shared::UserId;

use super::events::ServerEvent;
use super::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct StatusFanout {
    registry: Arc<ConnectionRegistry>,
}

impl StatusFanout {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `event` to every listed user that is online. Duplicate ids get
    /// one copy. Returns the number of deliveries.
    pub async fn broadcast_status(&self, user_ids: &[UserId], event: ServerEvent) -> usize {
        let mut seen = HashSet::new();
        let mut delivered = 0;

        for user_id in user_ids {
            if !seen.insert(*user_id) {
                continue;
            }
            match self.registry.resolve(user_id).await {
                Some(conn) => {
                    if conn.deliver(event.clone()) {
                        delivered += 1;
                    }
                }
                None => {
                    tracing::debug!(user_id = %user_id, event = event.name(), "Status target offline");
                }
            }
        }

        tracing::debug!(
            event = event.name(),
            targets = seen.len(),
            delivered,
            "Fanned out status event"
        );
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::connection::Connection;
    use crate::signaling::presence::PresencePublisher;
    use crate::store::NoopStore;
    use carelink_shared::{AppointmentId, AppointmentStatus};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_partial_delivery_and_dedup() {
        let registry = Arc::new(ConnectionRegistry::new(PresencePublisher::new(Arc::new(
            NoopStore,
        ))));
        let fanout = StatusFanout::new(Arc::clone(&registry));

        let doctor = UserId::new();
        let patient = UserId::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(doctor, Arc::new(Connection::new(tx))).await;
        while rx.try_recv().is_ok() {}

        let event = ServerEvent::AppointmentStatusUpdated {
            appointment_id: AppointmentId::new(),
            status: AppointmentStatus::Approved,
        };

        let delivered = fanout
            .broadcast_status(&[doctor, patient, doctor], event.clone())
            .await;
        assert_eq!(delivered, 1);
        assert_eq!(rx.try_recv().unwrap(), event);
        assert!(rx.try_recv().is_err());
    }
}
