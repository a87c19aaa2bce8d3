//! Match Session Management
//!
//! Per-match lifecycle coordination, from seat decisions through the grace
//! period and gameplay to a single resolution that feeds the bracket.
//!
//! - `competitor`: competitors, seats, stages, verdicts
//! - `timer`: the cancellable grace-period countdown
//! - `coordinator`: the per-match state machine
//! - `registry`: match id to coordinator mapping

pub mod competitor;
pub mod coordinator;
pub mod registry;
pub mod timer;

use std::sync::Arc;
use std::time::Duration;

use crate::game::runner::RunnerFactory;
use crate::network::gateway::NotificationGateway;
use crate::store::{MatchId, ResultStore, StatsReporter, StoreError, UserId};

pub use competitor::{Competitor, Seat, Stage, Verdict, AI_USER_ID};
pub use coordinator::{EventOutcome, MatchCoordinator, SeatSnapshot, SessionSnapshot};
pub use registry::MatchRegistry;
pub use timer::{TimerToken, WaitingTimer};

/// Configuration shared by every session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long both competitors have to connect once seats are bound.
    pub grace_period: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(30),
        }
    }
}

/// External services a coordinator drives as side effects.
#[derive(Clone)]
pub struct Collaborators {
    /// Real-time notifications.
    pub gateway: Arc<dyn NotificationGateway>,
    /// Bracket persistence.
    pub store: Arc<dyn ResultStore>,
    /// Statistics service.
    pub stats: Arc<dyn StatsReporter>,
    /// Builds a gameplay runner when a session goes live.
    pub runners: Arc<dyn RunnerFactory>,
}

/// Session errors. Each one means the event was rejected without state change.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// Both seats are already bound.
    #[error("Session is full")]
    SessionFull,

    /// Identity already holds a seat.
    #[error("User {0} already seated")]
    AlreadySeated(UserId),

    /// Identity was never decided into a seat.
    #[error("User {0} is not seated in this match")]
    UnknownCompetitor(UserId),

    /// AI join needs exactly one occupied seat.
    #[error("AI cannot join with {occupied} occupied seats")]
    InvalidAiJoin {
        /// Seats bound at the time of the attempt.
        occupied: usize,
    },

    /// Match id not known to the store.
    #[error("Match {0} not found")]
    UnknownMatch(MatchId),

    /// Store failure while loading a match.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
