//! WebSocket handler for Axum
//!
//! Handles WebSocket connections and routes signaling events.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use carelink_shared::UserId;

use crate::state::AppState;

use super::{
    connection::Connection,
    events::{ClientEvent, ServerEvent},
    state::SignalingState,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketQuery {
    user_id: Option<String>,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
///
/// The user identity comes from the `userId` query parameter. A missing or
/// unparseable id still gets a connection, it just is never registered.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Response {
    let user_id = match params.user_id.as_deref() {
        Some(raw) if !raw.trim().is_empty() => match raw.parse::<UserId>() {
            Ok(user_id) => Some(user_id),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed userId on connect");
                None
            }
        },
        _ => None,
    };

    tracing::info!(user_id = ?user_id, "WebSocket connection upgrade requested");

    let signaling = app_state.signaling.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, signaling))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Option<UserId>, state: SignalingState) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = state.connect(user_id, tx).await;
    let session_id = conn.session_id;

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, event = event.name(), "Failed to serialize signaling event");
                }
            }
        }
    });

    // Events from one connection are handled in arrival order
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_text_frame(&text, &conn, &state).await;
            }
            Ok(Message::Close(_)) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            Ok(_) => {} // Axum answers pings; binary frames are not part of the protocol
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = ?e, "WebSocket receive error");
                break;
            }
        }
    }

    // Cleanup on disconnect
    tracing::info!(session_id = %session_id, user_id = ?user_id, "WebSocket connection closing");
    state.disconnect(&conn).await;

    send_task.abort();
}

/// Parse and dispatch one text frame. Malformed frames are logged and dropped.
pub async fn handle_text_frame(text: &str, conn: &Arc<Connection>, state: &SignalingState) -> bool {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => {
            handle_client_event(event, conn, state).await;
            true
        }
        Err(e) => {
            tracing::warn!(
                session_id = %conn.session_id,
                error = %e,
                frame_len = text.len(),
                "Discarding malformed signaling event"
            );
            false
        }
    }
}

/// Handle client event
pub async fn handle_client_event(event: ClientEvent, conn: &Arc<Connection>, state: &SignalingState) {
    use ClientEvent::*;

    match event {
        JoinAppointmentRoom {
            room_id,
            appointment_id,
        } => {
            state
                .rooms
                .join(room_id, Arc::clone(conn), appointment_id)
                .await;
        }

        WebrtcOffer {
            room_id,
            offer,
            from_user_id,
        } => {
            let from_user_id = sender_identity(from_user_id, conn, state).await;
            state
                .rooms
                .relay_offer(&room_id, &conn.session_id, offer, from_user_id)
                .await;
        }

        WebrtcAnswer {
            room_id,
            answer,
            from_user_id,
        } => {
            let from_user_id = sender_identity(from_user_id, conn, state).await;
            state
                .rooms
                .relay_answer(&room_id, &conn.session_id, answer, from_user_id)
                .await;
        }

        WebrtcIceCandidate {
            room_id,
            candidate,
            from_user_id,
        } => {
            let from_user_id = sender_identity(from_user_id, conn, state).await;
            state
                .rooms
                .relay_ice_candidate(&room_id, &conn.session_id, candidate, from_user_id)
                .await;
        }

        PrivateMessage {
            to_user_id,
            message,
        } => {
            state
                .direct
                .send_direct(&to_user_id, &conn.session_id, message)
                .await;
        }

        AppointmentStatusUpdated {
            appointment_id,
            status,
            doctor_id,
            patient_id,
        } => {
            let participants: Vec<UserId> =
                [doctor_id, patient_id].into_iter().flatten().collect();
            state
                .fanout
                .broadcast_status(
                    &participants,
                    ServerEvent::AppointmentStatusUpdated {
                        appointment_id,
                        status,
                    },
                )
                .await;
        }

        Ping => {
            conn.deliver(ServerEvent::Pong);
        }
    }
}

/// The id the client put in the payload, else the one it connected with
async fn sender_identity(
    claimed: Option<UserId>,
    conn: &Connection,
    state: &SignalingState,
) -> Option<UserId> {
    match claimed {
        Some(user_id) => Some(user_id),
        None => state.registry.identity_of(&conn.session_id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NoopStore;
    use serde_json::json;

    fn state() -> SignalingState {
        SignalingState::new(Arc::new(NoopStore), Arc::new(NoopStore), true)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_malformed_frame_is_discarded_silently() {
        let state = state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = state.connect(None, tx).await;

        assert!(!handle_text_frame("not json", &conn, &state).await);
        assert!(!handle_text_frame(r#"{"type":"webrtc-offer","offer":{}}"#, &conn, &state).await);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let state = state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let conn = state.connect(None, tx).await;

        assert!(handle_text_frame(r#"{"type":"ping"}"#, &conn, &state).await);
        assert_eq!(drain(&mut rx), vec![ServerEvent::Pong]);
    }

    #[tokio::test]
    async fn test_offer_defaults_sender_to_registered_identity() {
        let state = state();
        let alice = UserId::new();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let a = state.connect(Some(alice), tx_a).await;
        let b = state.connect(Some(UserId::new()), tx_b).await;

        handle_text_frame(r#"{"type":"join-appointment-room","roomId":"r1"}"#, &a, &state).await;
        handle_text_frame(r#"{"type":"join-appointment-room","roomId":"r1"}"#, &b, &state).await;
        drain(&mut rx_b);

        handle_text_frame(
            r#"{"type":"webrtc-offer","roomId":"r1","offer":{"sdp":"v=0"}}"#,
            &a,
            &state,
        )
        .await;

        assert_eq!(
            drain(&mut rx_b),
            vec![ServerEvent::WebrtcOffer {
                offer: json!({"sdp": "v=0"}),
                from_user_id: Some(alice)
            }]
        );
    }

    #[tokio::test]
    async fn test_status_update_frame_reaches_participants() {
        let state = state();
        let doctor = UserId::new();
        let patient = UserId::new();
        let (tx_d, mut rx_d) = mpsc::unbounded_channel();
        let (tx_x, _rx_x) = mpsc::unbounded_channel();
        state.connect(Some(doctor), tx_d).await;
        let admin = state.connect(None, tx_x).await;
        drain(&mut rx_d);

        let frame = json!({
            "type": "appointment-status-updated",
            "appointmentId": "550e8400-e29b-41d4-a716-446655440000",
            "status": "completed",
            "doctorId": doctor.to_string(),
            "patientId": patient.to_string(),
        })
        .to_string();
        assert!(handle_text_frame(&frame, &admin, &state).await);

        let events = drain(&mut rx_d);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            ServerEvent::AppointmentStatusUpdated {
                status: carelink_shared::AppointmentStatus::Completed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_status_update_without_patient_still_reaches_doctor() {
        let state = state();
        let doctor = UserId::new();
        let (tx_d, mut rx_d) = mpsc::unbounded_channel();
        let (tx_x, _rx_x) = mpsc::unbounded_channel();
        state.connect(Some(doctor), tx_d).await;
        let admin = state.connect(None, tx_x).await;
        drain(&mut rx_d);

        let with_null = json!({
            "type": "appointment-status-updated",
            "appointmentId": "550e8400-e29b-41d4-a716-446655440000",
            "status": "approved",
            "doctorId": doctor.to_string(),
            "patientId": null,
        });
        let without_patient = json!({
            "type": "appointment-status-updated",
            "appointmentId": "550e8400-e29b-41d4-a716-446655440000",
            "status": "completed",
            "doctorId": doctor.to_string(),
        });
        for frame in [with_null, without_patient] {
            assert!(handle_text_frame(&frame.to_string(), &admin, &state).await);
        }

        let received = drain(&mut rx_d)
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::AppointmentStatusUpdated { .. }))
            .count();
        assert_eq!(received, 2);
    }

    #[tokio::test]
    async fn test_offer_without_payload_is_not_cached() {
        let state = state();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = state.connect(Some(UserId::new()), tx).await;

        assert!(!handle_text_frame(r#"{"type":"webrtc-offer","roomId":"r1"}"#, &conn, &state).await);
        assert_eq!(state.get_stats().await.active_rooms, 0);
        assert_eq!(state.get_stats().await.pending_offers, 0);
    }
}
