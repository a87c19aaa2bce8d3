//! Notification Payloads
//!
//! Messages the coordinator pushes through the notification gateway.
//! Payloads are JSON with the field names clients already expect.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Event carrying a competitor's paddle assignment.
pub const INIT_EVENT: &str = "init";

/// Event announcing a concluded match to its room.
pub const GAME_OVER_EVENT: &str = "gameOver";

/// Transport-level session identifier of one connection.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Wrap an existing transport session id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id, for connections the server originates itself.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Paddle names as the client knows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddleId {
    /// Seat 0.
    #[serde(rename = "paddle1")]
    Paddle1,
    /// Seat 1.
    #[serde(rename = "paddle2")]
    Paddle2,
}

/// Sent directly to a competitor once their seat is bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaddleAssignment {
    /// Assigned paddle.
    pub paddle_id: PaddleId,
}

/// Sent to the room when a match resolves with a winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConcluded {
    /// Winner's paddle.
    pub winner: PaddleId,
    /// Seat 0 final score.
    pub paddle1: u32,
    /// Seat 1 final score.
    pub paddle2: u32,
}

/// Outbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Paddle assignment for a joining competitor.
    PaddleAssignment(PaddleAssignment),
    /// Final result broadcast.
    MatchConcluded(MatchConcluded),
}

impl Notification {
    /// Gateway event name.
    pub fn event(&self) -> &'static str {
        match self {
            Notification::PaddleAssignment(_) => INIT_EVENT,
            Notification::MatchConcluded(_) => GAME_OVER_EVENT,
        }
    }

    /// JSON payload.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Notification::PaddleAssignment(p) => serde_json::to_value(p),
            Notification::MatchConcluded(m) => serde_json::to_value(m),
        }
    }
}

/// Where a notification is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every connection in a room.
    Room(String),
    /// One connection.
    Session(ConnectionId),
}
