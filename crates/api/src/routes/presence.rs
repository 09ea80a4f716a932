//! Presence and signaling diagnostics

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use carelink_shared::{AppointmentId, RoomId, UserId};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUsersResponse {
    pub users: Vec<UserId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresenceResponse {
    pub user_id: UserId,
    pub is_online: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub active_connections: usize,
    pub online_users: usize,
    pub active_rooms: usize,
    pub pending_offers: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub room_id: RoomId,
    pub occupants: usize,
    pub has_pending_offer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_offer_from: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<AppointmentId>,
}

/// GET /api/v1/presence/online
pub async fn list_online(State(state): State<AppState>) -> Json<OnlineUsersResponse> {
    Json(OnlineUsersResponse {
        users: state.signaling.registry.list_online().await,
    })
}

/// GET /api/v1/presence/:user_id
pub async fn user_presence(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserPresenceResponse>> {
    let user_id: UserId = user_id.parse()?;
    Ok(Json(UserPresenceResponse {
        user_id,
        is_online: state.signaling.registry.is_online(&user_id).await,
    }))
}

/// GET /api/v1/signaling/stats
pub async fn signaling_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.signaling.get_stats().await;
    Json(StatsResponse {
        active_connections: stats.active_connections,
        online_users: stats.online_users,
        active_rooms: stats.active_rooms,
        pending_offers: stats.pending_offers,
    })
}

/// GET /api/v1/signaling/rooms/:room_id
///
/// Never exposes the offer payload itself.
pub async fn room_snapshot(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<RoomResponse>> {
    let room_id = RoomId::new(room_id)?;
    let snapshot = state
        .signaling
        .rooms
        .snapshot(&room_id)
        .await
        .ok_or(ApiError::NotFound)?;

    let pending_from: Option<Option<UserId>> = snapshot.pending_offer.as_ref().map(|p| p.from_user_id);

    Ok(Json(RoomResponse {
        room_id: snapshot.room_id,
        occupants: snapshot.occupants.len(),
        has_pending_offer: pending_from.is_some(),
        pending_offer_from: pending_from.flatten(),
        appointment_id: snapshot.appointment_id,
    }))
}

