//! CareLink API Library
//!
//! Real-time signaling and presence server for CareLink telehealth calls.

pub mod config;
pub mod error;
pub mod routes;
pub mod signaling;
pub mod state;
pub mod store;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use signaling::SignalingState;
pub use state::AppState;
