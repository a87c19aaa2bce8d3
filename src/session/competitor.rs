//! Competitors, seats and session stages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::network::protocol::{ConnectionId, PaddleId};
use crate::store::UserId;

/// Identity used for the AI opponent.
pub const AI_USER_ID: UserId = UserId(0);

/// One side of a 1v1 session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Competitor {
    /// A person playing through a client connection.
    Human {
        /// Account identity.
        id: UserId,
        /// Transport session.
        connection: ConnectionId,
    },
    /// The AI opponent.
    Ai {
        /// Always [`AI_USER_ID`].
        id: UserId,
        /// Transport session of the AI client.
        connection: ConnectionId,
    },
}

impl Competitor {
    /// Human competitor.
    pub fn human(id: UserId, connection: ConnectionId) -> Self {
        Competitor::Human { id, connection }
    }

    /// AI competitor on the given connection.
    pub fn ai(connection: ConnectionId) -> Self {
        Competitor::Ai { id: AI_USER_ID, connection }
    }

    /// Account identity.
    pub fn id(&self) -> UserId {
        match self {
            Competitor::Human { id, .. } | Competitor::Ai { id, .. } => *id,
        }
    }

    /// Transport session.
    pub fn connection(&self) -> &ConnectionId {
        match self {
            Competitor::Human { connection, .. } | Competitor::Ai { connection, .. } => connection,
        }
    }

    /// Whether this is the AI opponent.
    pub fn is_ai(&self) -> bool {
        matches!(self, Competitor::Ai { .. })
    }
}

/// Seat index within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Seat {
    /// Seat 0, left paddle.
    First,
    /// Seat 1, right paddle. The AI always sits here.
    Second,
}

impl Seat {
    /// Both seats in index order.
    pub const ALL: [Seat; 2] = [Seat::First, Seat::Second];

    /// Seat for a slot index.
    pub fn from_index(index: usize) -> Option<Seat> {
        match index {
            0 => Some(Seat::First),
            1 => Some(Seat::Second),
            _ => None,
        }
    }

    /// Slot index.
    pub fn index(self) -> usize {
        match self {
            Seat::First => 0,
            Seat::Second => 1,
        }
    }

    /// The other seat.
    pub fn opponent(self) -> Seat {
        match self {
            Seat::First => Seat::Second,
            Seat::Second => Seat::First,
        }
    }

    /// Paddle controlled from this seat.
    pub fn paddle(self) -> PaddleId {
        match self {
            Seat::First => PaddleId::Paddle1,
            Seat::Second => PaddleId::Paddle2,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seat{}", self.index())
    }
}

/// Session lifecycle stage. Ordered; a session never moves backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Seats are being decided.
    NotStarted,
    /// Grace period: both seats bound, waiting for both to connect.
    Waiting,
    /// Gameplay running.
    Match,
    /// Resolved. Terminal.
    Finished,
}

/// Outcome recorded for a seat. Set at most once per seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Credited with the win.
    Won,
    /// Resolved as the loser.
    Lost,
}
