//! Result Store Boundary
//!
//! Bracket records owned by the persistence layer, plus the result record
//! a resolved match writes back. The coordinator only reads match records
//! and writes results through [`ResultStore`].

pub mod stats;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use stats::{HttpStatsReporter, StatsConfig, StatsError, StatsReporter};

/// Bracket match identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub i64);

/// Room identifier (one room per bracket).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub i64);

/// Account identifier of a competitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bracket room: every match of one tournament shares it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    /// Room identifier.
    pub id: RoomId,
    /// Unique room name.
    pub name: String,
}

/// One bracket match as persisted by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Match identifier.
    pub id: MatchId,
    /// Bracket room the match belongs to.
    pub room: RoomRecord,
    /// Match the winner advances to, if any.
    pub winner_match: Option<MatchId>,
    /// When play started, if recorded.
    pub start_at: Option<DateTime<Utc>>,
}

impl MatchRecord {
    /// Notification room name for this match's session.
    pub fn session_room(&self) -> String {
        format!("match_{}", self.id)
    }
}

/// Final result of one match, persisted and reported to the statistics service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    /// Seat 0 identity.
    pub player1_id: UserId,
    /// Seat 0 final score.
    pub player1_score: u32,
    /// Seat 1 identity.
    pub player2_id: UserId,
    /// Seat 1 final score.
    pub player2_score: u32,
    /// Winner identity.
    pub winner_id: UserId,
    /// Match start, or resolution time when no start was recorded.
    pub match_date: DateTime<Utc>,
    /// Seconds between start and resolution.
    pub play_time: f64,
}

impl MatchReport {
    /// Build the report for a resolution happening at `end_at`.
    pub fn build(
        record: &MatchRecord,
        players: [UserId; 2],
        scores: [u32; 2],
        winner_id: UserId,
        end_at: DateTime<Utc>,
    ) -> Self {
        let (match_date, play_time) = match record.start_at {
            Some(start) => {
                let elapsed = (end_at - start).num_milliseconds().max(0);
                (start, elapsed as f64 / 1000.0)
            }
            None => (end_at, 0.0),
        };

        Self {
            player1_id: players[0],
            player1_score: scores[0],
            player2_id: players[1],
            player2_score: scores[1],
            winner_id,
            match_date,
            play_time,
        }
    }
}

/// Store errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Referenced record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Backend failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Persistence operations the coordinator needs.
///
/// Deletions report how many rows went away so callers can tell a
/// repeated call (zero rows) from a real one.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Load a bracket match.
    async fn load_match(&self, id: MatchId) -> Result<Option<MatchRecord>, StoreError>;

    /// Remove one user's membership of one room.
    async fn remove_room_member(&self, user: UserId, room: RoomId) -> Result<u64, StoreError>;

    /// Remove every room membership a user holds.
    async fn remove_user_memberships(&self, user: UserId) -> Result<u64, StoreError>;

    /// Delete a room by name, cascading to its memberships.
    async fn delete_room(&self, room_name: &str) -> Result<u64, StoreError>;

    /// Queue a user into a match's roster.
    async fn add_roster_entry(&self, user: UserId, match_id: MatchId) -> Result<(), StoreError>;

    /// Persist a final result.
    async fn save_result(&self, match_id: MatchId, report: &MatchReport) -> Result<(), StoreError>;
}
