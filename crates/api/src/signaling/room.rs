//! Call room coordination
//!
//! A room is created implicitly on first use and keeps its occupants in join
//! order plus at most one pending (unanswered) offer. Each room sits behind
//! its own mutex: every mutation and relay for that room is linearized, while
//! different rooms only share a short lookup on the outer map.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use carelink_shared::{AppointmentId, RoomId, SessionId, UserId};

use super::connection::Connection;
use super::events::ServerEvent;
use crate::store::AppointmentStore;

/// Most recent unanswered offer in a room
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOffer {
    pub offer: Value,
    pub from_user_id: Option<UserId>,
}

#[derive(Default)]
struct Room {
    occupants: Vec<Arc<Connection>>,
    pending_offer: Option<PendingOffer>,
    appointment_id: Option<AppointmentId>,
}

impl Room {
    fn is_idle(&self) -> bool {
        self.occupants.is_empty() && self.pending_offer.is_none()
    }

    fn contains(&self, session_id: &SessionId) -> bool {
        self.occupants.iter().any(|c| c.session_id == *session_id)
    }

    /// Send to everyone but `sender`. Returns the number of recipients reached.
    fn broadcast_except(&self, sender: &SessionId, event: &ServerEvent) -> usize {
        self.occupants
            .iter()
            .filter(|c| c.session_id != *sender)
            .filter(|c| c.deliver(event.clone()))
            .count()
    }
}

/// Point-in-time view of one room
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub occupants: Vec<SessionId>,
    pub pending_offer: Option<PendingOffer>,
    pub appointment_id: Option<AppointmentId>,
}

pub struct RoomCoordinator {
    rooms: RwLock<HashMap<RoomId, Arc<Mutex<Room>>>>,
    appointments: Arc<dyn AppointmentStore>,
}

impl RoomCoordinator {
    pub fn new(appointments: Arc<dyn AppointmentStore>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            appointments,
        }
    }

    async fn existing(&self, room_id: &RoomId) -> Option<Arc<Mutex<Room>>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    async fn get_or_create(&self, room_id: &RoomId) -> Arc<Mutex<Room>> {
        if let Some(room) = self.existing(room_id).await {
            return room;
        }
        let mut rooms = self.rooms.write().await;
        Arc::clone(rooms.entry(room_id.clone()).or_default())
    }

    /// Drop a room nobody references any more.
    ///
    /// Callers must release their own handle on the room first.
    async fn collect_if_idle(&self, room_id: &RoomId) {
        let mut rooms = self.rooms.write().await;
        let idle = match rooms.get(room_id) {
            Some(room) if Arc::strong_count(room) == 1 => {
                room.try_lock().map(|r| r.is_idle()).unwrap_or(false)
            }
            _ => false,
        };
        if idle {
            rooms.remove(room_id);
            tracing::debug!(room_id = %room_id, "Removed idle room");
        }
    }

    /// Add a connection to a room.
    ///
    /// A pending offer is replayed to the joiner alone, followed by the
    /// `joined-room` acknowledgement. Returns whether an offer was replayed.
    pub async fn join(
        &self,
        room_id: RoomId,
        conn: Arc<Connection>,
        appointment_id: Option<AppointmentId>,
    ) -> bool {
        let room = self.get_or_create(&room_id).await;
        let replayed = {
            let mut state = room.lock().await;
            if !state.contains(&conn.session_id) {
                state.occupants.push(Arc::clone(&conn));
            }
            if appointment_id.is_some() {
                state.appointment_id = appointment_id;
            }

            let replayed = match &state.pending_offer {
                Some(pending) => conn.deliver(ServerEvent::WebrtcOffer {
                    offer: pending.offer.clone(),
                    from_user_id: pending.from_user_id,
                }),
                None => false,
            };
            conn.deliver(ServerEvent::JoinedRoom {
                room_id: room_id.clone(),
            });

            tracing::debug!(
                room_id = %room_id,
                session_id = %conn.session_id,
                room_size = state.occupants.len(),
                replayed_offer = replayed,
                "Connection joined room"
            );
            replayed
        };

        conn.track_room(room_id.clone()).await;

        if let Some(appointment_id) = appointment_id {
            self.link_appointment(appointment_id, room_id);
        }

        replayed
    }

    /// Best-effort write of the room id onto the appointment record
    fn link_appointment(&self, appointment_id: AppointmentId, room_id: RoomId) {
        let store = Arc::clone(&self.appointments);
        tokio::spawn(async move {
            if let Err(e) = store.set_room_id(appointment_id, &room_id).await {
                tracing::error!(
                    appointment_id = %appointment_id,
                    room_id = %room_id,
                    error = ?e,
                    "Failed to link room to appointment"
                );
            }
        });
    }

    /// Cache the offer for late joiners and send it to the other occupants
    pub async fn relay_offer(
        &self,
        room_id: &RoomId,
        sender: &SessionId,
        offer: Value,
        from_user_id: Option<UserId>,
    ) -> usize {
        let room = self.get_or_create(room_id).await;
        let mut state = room.lock().await;

        if state.pending_offer.is_some() {
            tracing::debug!(room_id = %room_id, "Overwriting pending offer");
        }
        state.pending_offer = Some(PendingOffer {
            offer: offer.clone(),
            from_user_id,
        });

        let recipients = state.broadcast_except(
            sender,
            &ServerEvent::WebrtcOffer {
                offer,
                from_user_id,
            },
        );
        tracing::debug!(room_id = %room_id, recipients, "Relayed offer");
        recipients
    }

    /// Clear the pending offer and send the answer to the other occupants.
    ///
    /// The answer is not checked against the offer it replies to.
    pub async fn relay_answer(
        &self,
        room_id: &RoomId,
        sender: &SessionId,
        answer: Value,
        from_user_id: Option<UserId>,
    ) -> usize {
        let Some(room) = self.existing(room_id).await else {
            tracing::debug!(room_id = %room_id, "Answer for unknown room dropped");
            return 0;
        };

        let recipients = {
            let mut state = room.lock().await;
            state.pending_offer = None;
            state.broadcast_except(
                sender,
                &ServerEvent::WebrtcAnswer {
                    answer,
                    from_user_id,
                },
            )
        };
        tracing::debug!(room_id = %room_id, recipients, "Relayed answer");

        drop(room);
        self.collect_if_idle(room_id).await;
        recipients
    }

    /// Forward a candidate to the other occupants. No state change.
    pub async fn relay_ice_candidate(
        &self,
        room_id: &RoomId,
        sender: &SessionId,
        candidate: Value,
        from_user_id: Option<UserId>,
    ) -> usize {
        let Some(room) = self.existing(room_id).await else {
            return 0;
        };
        let state = room.lock().await;
        let recipients = state.broadcast_except(
            sender,
            &ServerEvent::WebrtcIceCandidate {
                candidate,
                from_user_id,
            },
        );
        tracing::trace!(room_id = %room_id, recipients, "Relayed ICE candidate");
        recipients
    }

    /// Remove a connection from one room. Returns whether it was there.
    pub async fn leave(&self, room_id: &RoomId, conn: &Connection) -> bool {
        let Some(room) = self.existing(room_id).await else {
            return false;
        };

        let removed = {
            let mut state = room.lock().await;
            let before = state.occupants.len();
            state.occupants.retain(|c| c.session_id != conn.session_id);
            let removed = state.occupants.len() < before;
            if removed {
                tracing::debug!(
                    room_id = %room_id,
                    session_id = %conn.session_id,
                    room_size = state.occupants.len(),
                    "Connection left room"
                );
            }
            removed
        };
        conn.untrack_room(room_id).await;

        drop(room);
        self.collect_if_idle(room_id).await;
        removed
    }

    /// Remove a connection from every room it joined
    pub async fn remove_connection(&self, conn: &Connection) -> usize {
        let mut removed_from = 0;
        for room_id in conn.joined_rooms().await {
            if self.leave(&room_id, conn).await {
                removed_from += 1;
            }
        }

        if removed_from > 0 {
            tracing::debug!(
                session_id = %conn.session_id,
                room_count = removed_from,
                "Removed connection from rooms"
            );
        }
        removed_from
    }

    pub async fn snapshot(&self, room_id: &RoomId) -> Option<RoomSnapshot> {
        let room = self.existing(room_id).await?;
        let state = room.lock().await;
        Some(RoomSnapshot {
            room_id: room_id.clone(),
            occupants: state.occupants.iter().map(|c| c.session_id).collect(),
            pending_offer: state.pending_offer.clone(),
            appointment_id: state.appointment_id,
        })
    }

    pub async fn pending_offer(&self, room_id: &RoomId) -> Option<PendingOffer> {
        self.snapshot(room_id).await.and_then(|s| s.pending_offer)
    }

    /// Get room size (number of occupants)
    pub async fn get_room_size(&self, room_id: &RoomId) -> usize {
        self.snapshot(room_id)
            .await
            .map(|s| s.occupants.len())
            .unwrap_or(0)
    }

    /// Get total number of rooms held in memory
    pub async fn get_room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn get_pending_offer_count(&self) -> usize {
        let rooms: Vec<_> = self.rooms.read().await.values().cloned().collect();
        let mut count = 0;
        for room in rooms {
            if room.lock().await.pending_offer.is_some() {
                count += 1;
            }
        }
        count
    }
}
