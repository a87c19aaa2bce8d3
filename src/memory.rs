//! In-Memory Collaborators
//!
//! Recording implementations of the gateway, store, statistics service and
//! runner factory. The demo binary runs brackets on them and the tests
//! assert against what they recorded.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::game::runner::{MatchRunner, RunnerFactory, Scores, WinSignal};
use crate::network::gateway::{GatewayError, NotificationGateway};
use crate::network::protocol::{ConnectionId, Target};
use crate::session::competitor::{Competitor, Seat};
use crate::store::{
    MatchId, MatchRecord, MatchReport, ResultStore, RoomId, RoomRecord, StatsError, StatsReporter,
    StoreError, UserId,
};

// =============================================================================
// GATEWAY
// =============================================================================

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    /// `emit`.
    Emit {
        /// Event name.
        event: String,
        /// JSON payload.
        payload: serde_json::Value,
        /// Delivery target.
        target: Target,
    },
    /// `enter_room`.
    EnterRoom {
        /// Connection placed in the room.
        connection: ConnectionId,
        /// Room name.
        room: String,
    },
    /// `disconnect`.
    Disconnect(ConnectionId),
}

/// Gateway that records every call.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    calls: Mutex<Vec<GatewayCall>>,
}

impl MemoryGateway {
    /// Empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls in order.
    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    /// Payloads and targets emitted under `event`.
    pub fn emitted(&self, event: &str) -> Vec<(serde_json::Value, Target)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                GatewayCall::Emit { event: e, payload, target } if e == event => {
                    Some((payload.clone(), target.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Connections closed, in order.
    pub fn disconnected(&self) -> Vec<ConnectionId> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                GatewayCall::Disconnect(connection) => Some(connection.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl NotificationGateway for MemoryGateway {
    async fn emit(
        &self,
        event: &str,
        payload: serde_json::Value,
        target: &Target,
    ) -> Result<(), GatewayError> {
        self.calls.lock().push(GatewayCall::Emit {
            event: event.to_string(),
            payload,
            target: target.clone(),
        });
        Ok(())
    }

    async fn enter_room(&self, connection: &ConnectionId, room: &str) -> Result<(), GatewayError> {
        self.calls.lock().push(GatewayCall::EnterRoom {
            connection: connection.clone(),
            room: room.to_string(),
        });
        Ok(())
    }

    async fn disconnect(&self, connection: &ConnectionId) -> Result<(), GatewayError> {
        self.calls.lock().push(GatewayCall::Disconnect(connection.clone()));
        Ok(())
    }
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Debug, Default)]
struct StoreTables {
    matches: BTreeMap<MatchId, MatchRecord>,
    rooms: BTreeMap<String, RoomRecord>,
    memberships: Vec<(UserId, RoomId)>,
    roster: Vec<(UserId, MatchId)>,
    results: Vec<(MatchId, MatchReport)>,
}

/// Store backed by in-process tables.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<StoreTables>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a match, registering its room.
    pub fn insert_match(&self, record: MatchRecord) {
        let mut tables = self.tables.lock();
        tables.rooms.insert(record.room.name.clone(), record.room.clone());
        tables.matches.insert(record.id, record);
    }

    /// Add a room membership.
    pub fn add_member(&self, user: UserId, room: RoomId) {
        self.tables.lock().memberships.push((user, room));
    }

    /// Whether `user` is a member of `room`.
    pub fn is_member(&self, user: UserId, room: RoomId) -> bool {
        self.tables.lock().memberships.contains(&(user, room))
    }

    /// Whether a room with this name exists.
    pub fn has_room(&self, name: &str) -> bool {
        self.tables.lock().rooms.contains_key(name)
    }

    /// Roster entries in insertion order.
    pub fn roster(&self) -> Vec<(UserId, MatchId)> {
        self.tables.lock().roster.clone()
    }

    /// Saved results in insertion order.
    pub fn results(&self) -> Vec<(MatchId, MatchReport)> {
        self.tables.lock().results.clone()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn load_match(&self, id: MatchId) -> Result<Option<MatchRecord>, StoreError> {
        Ok(self.tables.lock().matches.get(&id).cloned())
    }

    async fn remove_room_member(&self, user: UserId, room: RoomId) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock();
        let before = tables.memberships.len();
        tables.memberships.retain(|m| *m != (user, room));
        Ok((before - tables.memberships.len()) as u64)
    }

    async fn remove_user_memberships(&self, user: UserId) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock();
        let before = tables.memberships.len();
        tables.memberships.retain(|(u, _)| *u != user);
        Ok((before - tables.memberships.len()) as u64)
    }

    async fn delete_room(&self, room_name: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock();
        let Some(room) = tables.rooms.remove(room_name) else {
            return Ok(0);
        };
        tables.memberships.retain(|(_, r)| *r != room.id);
        Ok(1)
    }

    async fn add_roster_entry(&self, user: UserId, match_id: MatchId) -> Result<(), StoreError> {
        self.tables.lock().roster.push((user, match_id));
        Ok(())
    }

    async fn save_result(&self, match_id: MatchId, report: &MatchReport) -> Result<(), StoreError> {
        self.tables.lock().results.push((match_id, report.clone()));
        Ok(())
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Statistics sink that records reports, optionally rejecting each one.
#[derive(Debug, Default)]
pub struct MemoryStatsReporter {
    reports: Mutex<Vec<MatchReport>>,
    reject: bool,
}

impl MemoryStatsReporter {
    /// Accepting reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reporter that records every attempt and answers with a 500.
    pub fn failing() -> Self {
        Self {
            reports: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    /// Reports received, including rejected ones.
    pub fn reports(&self) -> Vec<MatchReport> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl StatsReporter for MemoryStatsReporter {
    async fn report(&self, report: &MatchReport) -> Result<(), StatsError> {
        self.reports.lock().push(report.clone());
        if self.reject {
            return Err(StatsError::Rejected {
                status: 500,
                body: "rejected".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// SCRIPTED RUNNER
// =============================================================================

#[derive(Debug, Default)]
struct ScriptedState {
    scores: Scores,
    signal: Option<WinSignal>,
    started: bool,
    stop_calls: usize,
}

/// Test-side handle to a runner built by [`ScriptedRunnerFactory`].
#[derive(Debug, Clone)]
pub struct ScriptedHandle {
    match_id: MatchId,
    competitors: [Competitor; 2],
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedHandle {
    /// Match the runner was built for.
    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Competitors the runner was built with.
    pub fn competitors(&self) -> &[Competitor; 2] {
        &self.competitors
    }

    /// Whether `start` was called.
    pub fn started(&self) -> bool {
        self.state.lock().started
    }

    /// Number of `stop` calls.
    pub fn stop_calls(&self) -> usize {
        self.state.lock().stop_calls
    }

    /// Set the live scores.
    pub fn set_scores(&self, scores: Scores) {
        self.state.lock().scores = scores;
    }

    /// Set final scores and report `winner`.
    ///
    /// Returns false when the runner was never started, was stopped, or
    /// already reported.
    pub async fn finish(&self, winner: Seat, scores: Scores) -> bool {
        let signal = {
            let mut state = self.state.lock();
            state.scores = scores;
            state.signal.take()
        };
        match signal {
            Some(signal) => {
                signal.conclude(winner).await;
                true
            }
            None => false,
        }
    }
}

struct ScriptedRunner {
    state: Arc<Mutex<ScriptedState>>,
}

impl MatchRunner for ScriptedRunner {
    fn start(&mut self, signal: WinSignal) {
        let mut state = self.state.lock();
        state.started = true;
        state.signal = Some(signal);
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.stop_calls += 1;
        state.signal = None;
    }

    fn scores(&self) -> Scores {
        self.state.lock().scores
    }
}

/// Builds runners that only conclude when the test says so.
#[derive(Debug, Default)]
pub struct ScriptedRunnerFactory {
    handles: Mutex<Vec<ScriptedHandle>>,
}

impl ScriptedRunnerFactory {
    /// Empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles of every runner built, in order.
    pub fn handles(&self) -> Vec<ScriptedHandle> {
        self.handles.lock().clone()
    }

    /// Handle of the latest runner built for `match_id`.
    pub fn for_match(&self, match_id: MatchId) -> Option<ScriptedHandle> {
        self.handles.lock().iter().rev().find(|h| h.match_id == match_id).cloned()
    }
}

impl RunnerFactory for ScriptedRunnerFactory {
    fn build(&self, record: &MatchRecord, competitors: &[Competitor; 2]) -> Box<dyn MatchRunner> {
        let state = Arc::new(Mutex::new(ScriptedState::default()));
        self.handles.lock().push(ScriptedHandle {
            match_id: record.id,
            competitors: competitors.clone(),
            state: state.clone(),
        });
        Box::new(ScriptedRunner { state })
    }
}
