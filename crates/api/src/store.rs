//! Persistence collaborators used by the signaling core
//!
//! The core only ever writes two columns: a user's online flag and the room
//! bound to an appointment. Both writes are best-effort; callers log failures
//! and move on.

use async_trait::async_trait;
use sqlx::PgPool;

use carelink_shared::{AppointmentId, RoomId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Record not found: {0}")]
    NotFound(String),
}

/// Identity store: mirrors presence for display
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn set_online(&self, user_id: UserId, is_online: bool) -> Result<(), StoreError>;
}

/// Appointment store: remembers which room a call uses
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn set_room_id(
        &self,
        appointment_id: AppointmentId,
        room_id: &RoomId,
    ) -> Result<(), StoreError>;
}

// =============================================================================
// Postgres
// =============================================================================

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn set_online(&self, user_id: UserId, is_online: bool) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_online = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user_id.0)
        .bind(is_online)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }

        Ok(())
    }
}

#[derive(Clone)]
pub struct PgAppointmentStore {
    pool: PgPool,
}

impl PgAppointmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AppointmentStore for PgAppointmentStore {
    async fn set_room_id(
        &self,
        appointment_id: AppointmentId,
        room_id: &RoomId,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE appointments
            SET room_id = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(appointment_id.0)
        .bind(room_id.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("appointment {appointment_id}")));
        }

        Ok(())
    }
}

// =============================================================================
// No database configured
// =============================================================================

/// Discards every write. Used when `DATABASE_URL` is not set.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

#[async_trait]
impl IdentityStore for NoopStore {
    async fn set_online(&self, user_id: UserId, is_online: bool) -> Result<(), StoreError> {
        tracing::trace!(user_id = %user_id, is_online, "Presence not persisted (no database)");
        Ok(())
    }
}

#[async_trait]
impl AppointmentStore for NoopStore {
    async fn set_room_id(
        &self,
        appointment_id: AppointmentId,
        room_id: &RoomId,
    ) -> Result<(), StoreError> {
        tracing::trace!(
            appointment_id = %appointment_id,
            room_id = %room_id,
            "Room linkage not persisted (no database)"
        );
        Ok(())
    }
}
