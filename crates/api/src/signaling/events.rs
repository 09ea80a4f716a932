//! Signaling event types and serialization
//!
//! Every frame is a JSON object whose `type` field carries the event name
//! (`webrtc-offer`, `private-message`, ...) and whose remaining fields are
//! camelCase.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use carelink_shared::{AppointmentId, AppointmentStatus, RoomId, UserId};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Join a call room, optionally linking it to an appointment
    JoinAppointmentRoom {
        room_id: RoomId,
        #[serde(default)]
        appointment_id: Option<AppointmentId>,
    },

    /// Session description offer
    WebrtcOffer {
        room_id: RoomId,
        #[serde(deserialize_with = "required_payload")]
        offer: Value,
        #[serde(default)]
        from_user_id: Option<UserId>,
    },

    /// Session description answer
    WebrtcAnswer {
        room_id: RoomId,
        #[serde(deserialize_with = "required_payload")]
        answer: Value,
        #[serde(default)]
        from_user_id: Option<UserId>,
    },

    /// Network candidate
    WebrtcIceCandidate {
        room_id: RoomId,
        #[serde(deserialize_with = "required_payload")]
        candidate: Value,
        #[serde(default)]
        from_user_id: Option<UserId>,
    },

    /// Chat message for a single user
    PrivateMessage {
        to_user_id: UserId,
        #[serde(deserialize_with = "required_payload")]
        message: Value,
    },

    /// Appointment status changed; notify whichever participants are named
    AppointmentStatusUpdated {
        appointment_id: AppointmentId,
        status: AppointmentStatus,
        #[serde(default)]
        doctor_id: Option<UserId>,
        #[serde(default)]
        patient_id: Option<UserId>,
    },

    /// Heartbeat ping to keep connection alive
    Ping,
}

/// Opaque payloads must be present and non-null
fn required_payload<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Err(de::Error::custom("payload must not be null")),
        value => Ok(value),
    }
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// A user came online or went offline
    UserOnlineStatus { user_id: UserId, is_online: bool },

    /// Join acknowledged
    JoinedRoom { room_id: RoomId },

    WebrtcOffer {
        offer: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user_id: Option<UserId>,
    },

    WebrtcAnswer {
        answer: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user_id: Option<UserId>,
    },

    WebrtcIceCandidate {
        candidate: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_user_id: Option<UserId>,
    },

    PrivateMessage {
        from_user_id: UserId,
        message: Value,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },

    AppointmentStatusUpdated {
        appointment_id: AppointmentId,
        status: AppointmentStatus,
    },

    /// Heartbeat response
    Pong,
}

impl ServerEvent {
    /// Wire name, for log fields
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::UserOnlineStatus { .. } => "user-online-status",
            ServerEvent::JoinedRoom { .. } => "joined-room",
            ServerEvent::WebrtcOffer { .. } => "webrtc-offer",
            ServerEvent::WebrtcAnswer { .. } => "webrtc-answer",
            ServerEvent::WebrtcIceCandidate { .. } => "webrtc-ice-candidate",
            ServerEvent::PrivateMessage { .. } => "private-message",
            ServerEvent::AppointmentStatusUpdated { .. } => "appointment-status-updated",
            ServerEvent::Pong => "pong",
        }
    }
}
