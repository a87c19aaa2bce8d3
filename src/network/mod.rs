//! Networking boundary: notification payloads and the gateway that delivers them.

pub mod gateway;
pub mod protocol;

pub use gateway::{GatewayError, NotificationGateway};
pub use protocol::{ConnectionId, MatchConcluded, Notification, PaddleAssignment, PaddleId, Target};
