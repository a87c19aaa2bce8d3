//! Notification Gateway Boundary
//!
//! Room-scoped and direct real-time delivery. The socket plumbing behind
//! it lives outside this crate.

use async_trait::async_trait;
use thiserror::Error;

use super::protocol::{ConnectionId, Target};

/// Gateway errors.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The target connection is gone.
    #[error("connection {0} is not open")]
    ConnectionClosed(ConnectionId),

    /// Payload could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// Transport failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Encode(err.to_string())
    }
}

/// Real-time notification transport.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Deliver `payload` under `event` to `target`.
    async fn emit(
        &self,
        event: &str,
        payload: serde_json::Value,
        target: &Target,
    ) -> Result<(), GatewayError>;

    /// Add a connection to a room.
    async fn enter_room(&self, connection: &ConnectionId, room: &str) -> Result<(), GatewayError>;

    /// Close a connection.
    async fn disconnect(&self, connection: &ConnectionId) -> Result<(), GatewayError>;
}
