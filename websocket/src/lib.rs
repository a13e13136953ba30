//! WebSocket subsystem — the live block feed.
//!
//! Three pieces: the downstream subscription server ([`WsServer`]), the
//! outbound archival subscriber ([`ArchivalClient`]), and the
//! [`BlockConfirmationTracker`] that bridges the two — confirmations
//! arriving over client connections trigger the server's fan-out once
//! enough distinct archival nodes agree on a block.

pub mod client;
pub mod confirmations;
pub mod error;
pub mod server;
pub mod subscriptions;

pub use client::{reconnect_delay, ArchivalClient, WsClientConfig};
pub use confirmations::BlockConfirmationTracker;
pub use error::WsError;
pub use server::{WsServer, WsServerConfig, WsServerState};
pub use subscriptions::{
    validate_filters, ClientSubscriptions, SubscribeRateLimiter, Subscription,
};
