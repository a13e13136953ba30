//! Archive-node discovery — maintains the pool of healthy archival
//! connections and gates the WebSocket client/server pair on minimum
//! membership.
//!
//! Membership transitions are edge-triggered: `MinimumReached` fires once
//! when the pool crosses up through the configured minimum, `BelowMinimum`
//! once when it drops back under — never on every refresh.

pub mod probe;
pub mod service;

pub use probe::{HealthProbe, WsHealthProbe};
pub use service::{DiscoveryConfig, DiscoveryService, MembershipEvent};
