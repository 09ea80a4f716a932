//! Shared application state

use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::signaling::SignalingState;
use crate::store::{AppointmentStore, IdentityStore, NoopStore, PgAppointmentStore, PgIdentityStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// None when running without a database
    pub pool: Option<PgPool>,
    pub signaling: SignalingState,
}

impl AppState {
    /// Build state, backing the stores with Postgres when a pool is given
    pub fn new(config: Config, pool: Option<PgPool>) -> Self {
        let (identities, appointments) = match &pool {
            Some(pool) => (
                Arc::new(PgIdentityStore::new(pool.clone())) as Arc<dyn IdentityStore>,
                Arc::new(PgAppointmentStore::new(pool.clone())) as Arc<dyn AppointmentStore>,
            ),
            None => (
                Arc::new(NoopStore) as Arc<dyn IdentityStore>,
                Arc::new(NoopStore) as Arc<dyn AppointmentStore>,
            ),
        };

        let signaling =
            SignalingState::new(identities, appointments, config.room_evict_on_disconnect);

        Self {
            config: Arc::new(config),
            pool,
            signaling,
        }
    }
}
