//! Real-time signaling and presence
//!
//! Brokers WebRTC call setup between the two participants of an appointment
//! and keeps everyone informed about who is online:
//! - User presence tracking (online/offline)
//! - Call rooms with offer/answer/ICE relay and late-join offer replay
//! - Private chat relay
//! - Appointment status notifications
//!
//! # Architecture
//!
//! - **Connection**: one live WebSocket and its outbound queue
//! - **Registry**: user identity <-> current connection
//! - **Presence**: online/offline broadcast and store mirroring
//! - **Room**: per-room occupants and pending offer
//! - **Direct** / **Fanout**: point-to-point delivery by user identity
//! - **State**: everything above, shared across connections
//! - **Handler**: Axum WebSocket route handler
//! - **Events**: wire format for client/server frames

pub mod connection;
pub mod direct;
pub mod events;
pub mod fanout;
pub mod handler;
pub mod presence;
pub mod registry;
pub mod room;
pub mod state;

pub use handler::ws_handler;
pub use state::{SignalingState, SignalingStats};
