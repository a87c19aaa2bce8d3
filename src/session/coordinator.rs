//! Match Coordinator
//!
//! Per-match state machine. Every inbound event (seat decision, connect,
//! AI join, disconnect, timer fire, runner conclusion) is applied under
//! one session mutex, so transitions never interleave.
//!
//! ```text
//! NOT_STARTED ──► WAITING ──► MATCH ──► FINISHED
//!      │             │                     ▲
//!      └─────────────┴─────────────────────┘
//! ```
//!
//! Resolution is recorded per seat as a [`Verdict`]; a seat's verdict is
//! written once and a second winner can never be credited.

use std::sync::{Arc, Weak};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::game::runner::{MatchRunner, WinSignal};
use crate::network::protocol::{
    ConnectionId, MatchConcluded, Notification, PaddleAssignment, Target,
};
use crate::session::competitor::{Competitor, Seat, Stage, Verdict};
use crate::session::registry::MatchRegistry;
use crate::session::timer::{TimerToken, WaitingTimer};
use crate::session::{Collaborators, SessionConfig, SessionError};
use crate::store::{MatchId, MatchRecord, MatchReport, UserId};

/// How an accepted event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum EventOutcome {
    /// The event changed session state.
    Applied,
    /// Repeat of something already applied.
    Duplicate,
    /// Not applicable in the current state.
    Ignored,
}

/// Read-only view of one seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatSnapshot {
    /// Seated identity.
    pub user_id: UserId,
    /// Latest transport session.
    pub connection: ConnectionId,
    /// Presence flag.
    pub online: bool,
    /// Recorded outcome.
    pub verdict: Option<Verdict>,
    /// AI opponent.
    pub is_ai: bool,
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Match identifier.
    pub match_id: MatchId,
    /// Current stage.
    pub stage: Stage,
    /// Seats by index.
    pub seats: [Option<SeatSnapshot>; 2],
    /// Grace countdown pending.
    pub timer_armed: bool,
    /// Gameplay runner attached.
    pub runner_attached: bool,
}

struct SeatSlot {
    competitor: Competitor,
    online: bool,
    verdict: Option<Verdict>,
    dropped: bool,
}

impl SeatSlot {
    fn new(competitor: Competitor, online: bool) -> Self {
        Self {
            competitor,
            online,
            verdict: None,
            dropped: false,
        }
    }
}

struct SessionInner {
    stage: Stage,
    seats: [Option<SeatSlot>; 2],
    timer: WaitingTimer,
    runner: Option<Box<dyn MatchRunner>>,
}

impl SessionInner {
    fn slot(&self, seat: Seat) -> Option<&SeatSlot> {
        self.seats[seat.index()].as_ref()
    }

    fn slot_mut(&mut self, seat: Seat) -> Option<&mut SeatSlot> {
        self.seats[seat.index()].as_mut()
    }

    fn seat_of(&self, user: UserId) -> Option<Seat> {
        Seat::ALL
            .into_iter()
            .find(|seat| self.slot(*seat).is_some_and(|s| s.competitor.id() == user))
    }

    fn bound_count(&self) -> usize {
        self.seats.iter().flatten().count()
    }

    fn both_bound(&self) -> bool {
        self.bound_count() == 2
    }

    fn is_online(&self, seat: Seat) -> bool {
        self.slot(seat).is_some_and(|s| s.online)
    }

    fn both_online(&self) -> bool {
        Seat::ALL.into_iter().all(|seat| self.is_online(seat))
    }

    fn winner(&self) -> Option<Seat> {
        Seat::ALL
            .into_iter()
            .find(|seat| self.slot(*seat).is_some_and(|s| s.verdict == Some(Verdict::Won)))
    }

    /// Move the stage forward. Backward moves are refused.
    fn advance(&mut self, to: Stage) -> bool {
        if to < self.stage {
            error!(from = ?self.stage, ?to, "refusing backward stage transition");
            return false;
        }
        if to != self.stage {
            debug!(from = ?self.stage, ?to, "stage transition");
        }
        self.stage = to;
        true
    }
}

/// Lifecycle coordinator for one bracket match.
pub struct MatchCoordinator {
    record: MatchRecord,
    room: String,
    deps: Collaborators,
    registry: Weak<MatchRegistry>,
    this: Weak<MatchCoordinator>,
    inner: Mutex<SessionInner>,
}

impl MatchCoordinator {
    /// Create a coordinator owned by `registry`.
    pub(crate) fn new(
        record: MatchRecord,
        config: &SessionConfig,
        deps: Collaborators,
        registry: Weak<MatchRegistry>,
    ) -> Arc<Self> {
        let room = record.session_room();
        Arc::new_cyclic(|this| Self {
            record,
            room,
            deps,
            registry,
            this: this.clone(),
            inner: Mutex::new(SessionInner {
                stage: Stage::NotStarted,
                seats: [None, None],
                timer: WaitingTimer::new(config.grace_period),
                runner: None,
            }),
        })
    }

    /// Create a coordinator outside any registry.
    ///
    /// Bracket advancement still writes the roster entry, but cannot seat
    /// the winner into a live coordinator for the next match.
    pub fn standalone(record: MatchRecord, config: &SessionConfig, deps: Collaborators) -> Arc<Self> {
        Self::new(record, config, deps, Weak::new())
    }

    /// Match identifier.
    pub fn match_id(&self) -> MatchId {
        self.record.id
    }

    /// Notification room of this session.
    pub fn room(&self) -> &str {
        &self.room
    }

    /// Current stage.
    pub async fn stage(&self) -> Stage {
        self.inner.lock().await.stage
    }

    /// Whether `user` holds a seat and is online.
    pub async fn is_connected(&self, user: UserId) -> bool {
        let inner = self.inner.lock().await;
        inner.seat_of(user).is_some_and(|seat| inner.is_online(seat))
    }

    /// Point-in-time view of the session.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        let view = |seat: Seat| {
            inner.slot(seat).map(|s| SeatSnapshot {
                user_id: s.competitor.id(),
                connection: s.competitor.connection().clone(),
                online: s.online,
                verdict: s.verdict,
                is_ai: s.competitor.is_ai(),
            })
        };

        SessionSnapshot {
            match_id: self.record.id,
            stage: inner.stage,
            seats: [view(Seat::First), view(Seat::Second)],
            timer_armed: inner.timer.is_armed(),
            runner_attached: inner.runner.is_some(),
        }
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// Bind a competitor to the first free seat.
    #[instrument(skip(self, competitor), fields(match_id = %self.record.id, user_id = %competitor.id()))]
    pub async fn decide_seat(&self, competitor: Competitor) -> Result<Seat, SessionError> {
        let mut inner = self.inner.lock().await;

        if inner.seat_of(competitor.id()).is_some() {
            warn!("competitor already seated");
            return Err(SessionError::AlreadySeated(competitor.id()));
        }

        let Some(seat) = Seat::ALL.into_iter().find(|seat| inner.slot(*seat).is_none()) else {
            info!(room = %self.room, "seats already taken");
            return Err(SessionError::SessionFull);
        };

        inner.seats[seat.index()] = Some(SeatSlot::new(competitor, false));
        info!(%seat, room = %self.room, "competitor decided");

        if inner.both_bound() && inner.is_online(seat.opponent()) {
            self.enter_waiting(&mut inner);
        }

        Ok(seat)
    }

    /// A seated competitor's client connected.
    #[instrument(skip(self, competitor), fields(match_id = %self.record.id, user_id = %competitor.id()))]
    pub async fn connect(&self, competitor: Competitor) -> Result<EventOutcome, SessionError> {
        let mut inner = self.inner.lock().await;

        let Some(seat) = inner.seat_of(competitor.id()) else {
            error!("connected, but was never decided into a seat");
            return Err(SessionError::UnknownCompetitor(competitor.id()));
        };

        let connection = {
            let Some(slot) = inner.slot_mut(seat) else {
                return Err(SessionError::UnknownCompetitor(competitor.id()));
            };
            if slot.online {
                info!(%seat, "already connected");
                return Ok(EventOutcome::Duplicate);
            }
            if slot.verdict.is_some() {
                warn!(%seat, verdict = ?slot.verdict, "late connect to an already resolved seat");
                return Ok(EventOutcome::Ignored);
            }

            slot.competitor = competitor;
            slot.online = true;
            slot.competitor.connection().clone()
        };

        self.assign_paddle(seat, &connection).await;

        let stage = inner.stage;
        match stage {
            Stage::Finished => {
                info!(%seat, "connected after resolution, winning automatically");
                self.resolve_winner(&mut inner, seat).await;
            }
            Stage::Match => {
                debug!(%seat, "joined a running match");
            }
            Stage::NotStarted | Stage::Waiting if inner.both_bound() => {
                if inner.both_online() {
                    inner.timer.stop();
                    self.start_match(&mut inner);
                } else {
                    self.enter_waiting(&mut inner);
                }
            }
            _ => {}
        }

        Ok(EventOutcome::Applied)
    }

    /// The AI opponent joined on `connection`.
    #[instrument(skip(self), fields(match_id = %self.record.id))]
    pub async fn ai_join(&self, connection: ConnectionId) -> Result<EventOutcome, SessionError> {
        let mut inner = self.inner.lock().await;

        let occupied = inner.bound_count();
        if occupied != 1 || inner.slot(Seat::Second).is_some() || inner.stage >= Stage::Match {
            error!(occupied, stage = ?inner.stage, "AI join needs exactly one seated human");
            return Err(SessionError::InvalidAiJoin { occupied });
        }

        inner.seats[Seat::Second.index()] = Some(SeatSlot::new(Competitor::ai(connection.clone()), true));
        info!(room = %self.room, "AI joined");

        self.assign_paddle(Seat::Second, &connection).await;

        inner.timer.stop();
        self.start_match(&mut inner);

        Ok(EventOutcome::Applied)
    }

    /// The grace period elapsed for the arming identified by `token`.
    #[instrument(skip(self, token), fields(match_id = %self.record.id))]
    pub async fn timer_fired(&self, token: TimerToken) -> EventOutcome {
        let mut inner = self.inner.lock().await;

        if !inner.timer.take_fire(token) {
            debug!("stale timer fire");
            return EventOutcome::Ignored;
        }
        if inner.stage != Stage::Waiting {
            debug!(stage = ?inner.stage, "timer fired outside WAITING");
            return EventOutcome::Ignored;
        }
        if !inner.both_bound() {
            error!(bound = inner.bound_count(), "stage is WAITING, but seats are not both bound");
            return EventOutcome::Ignored;
        }

        match (inner.is_online(Seat::First), inner.is_online(Seat::Second)) {
            (true, true) => {
                debug!("both connected before the timer fired");
                EventOutcome::Ignored
            }
            (false, false) => {
                error!("stage is WAITING, but nobody is online");
                inner.advance(Stage::Finished);
                self.resolve_loser(&mut inner, Seat::First).await;
                self.resolve_loser(&mut inner, Seat::Second).await;
                self.deregister().await;
                EventOutcome::Applied
            }
            (first_online, _) => {
                let winner = if first_online { Seat::First } else { Seat::Second };
                info!(%winner, "connection timeout, absent seat forfeits");
                inner.advance(Stage::Finished);
                self.resolve_win_and_lose(&mut inner, winner).await;
                EventOutcome::Applied
            }
        }
    }

    /// A seated competitor's connection closed.
    #[instrument(skip(self, competitor), fields(match_id = %self.record.id, user_id = %competitor.id()))]
    pub async fn disconnect(&self, competitor: Competitor) -> Result<EventOutcome, SessionError> {
        let mut inner = self.inner.lock().await;
        info!(stage = ?inner.stage, "competitor disconnected");

        if matches!(inner.stage, Stage::NotStarted | Stage::Finished) {
            return Ok(EventOutcome::Ignored);
        }

        let Some(seat) = inner.seat_of(competitor.id()) else {
            info!(room = %self.room, "disconnected competitor is not seated here");
            return Err(SessionError::UnknownCompetitor(competitor.id()));
        };

        let Some(slot) = inner.slot_mut(seat) else {
            return Err(SessionError::UnknownCompetitor(competitor.id()));
        };
        if slot.competitor.connection() != competitor.connection() {
            debug!(%seat, "disconnect from a superseded connection");
            return Ok(EventOutcome::Ignored);
        }
        let was_online = slot.online;
        slot.online = false;

        let stage = inner.stage;
        match stage {
            Stage::Waiting => {
                if !was_online {
                    return Ok(EventOutcome::Ignored);
                }
                inner.timer.stop();
                inner.advance(Stage::Finished);
                self.resolve_loser(&mut inner, seat).await;
                warn!(
                    opponent = %seat.opponent(),
                    "left during WAITING; opponent stays unresolved until they connect"
                );
            }
            Stage::Match => {
                if let Some(runner) = inner.runner.as_mut() {
                    runner.stop();
                }
                inner.advance(Stage::Finished);
                self.resolve_loser(&mut inner, seat).await;
                self.resolve_winner(&mut inner, seat.opponent()).await;
            }
            Stage::NotStarted | Stage::Finished => {}
        }

        Ok(EventOutcome::Applied)
    }

    /// The runner reached a win condition for `winner`.
    #[instrument(skip(self), fields(match_id = %self.record.id))]
    pub async fn runner_concluded(&self, winner: Seat) -> EventOutcome {
        let mut inner = self.inner.lock().await;

        if inner.stage == Stage::Finished {
            info!("already FINISHED, ignoring runner conclusion");
            return EventOutcome::Ignored;
        }
        if inner.stage != Stage::Match {
            warn!(stage = ?inner.stage, "runner concluded outside MATCH");
        }

        inner.advance(Stage::Finished);
        self.resolve_win_and_lose(&mut inner, winner).await;
        EventOutcome::Applied
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    fn enter_waiting(&self, inner: &mut SessionInner) {
        if !inner.advance(Stage::Waiting) {
            return;
        }

        let this = self.this.clone();
        inner.timer.arm(move |token| async move {
            if let Some(coordinator) = this.upgrade() {
                let _ = coordinator.timer_fired(token).await;
            }
        });
        info!(match_id = %self.record.id, grace = ?inner.timer.grace(), "waiting for both competitors");
    }

    fn start_match(&self, inner: &mut SessionInner) {
        let (Some(first), Some(second)) = (inner.slot(Seat::First), inner.slot(Seat::Second)) else {
            error!(match_id = %self.record.id, "cannot start a match without two seats");
            return;
        };
        let competitors = [first.competitor.clone(), second.competitor.clone()];

        if !inner.advance(Stage::Match) {
            return;
        }

        let mut runner = self.deps.runners.build(&self.record, &competitors);
        let this = self.this.clone();
        runner.start(WinSignal::new(move |winner| async move {
            if let Some(coordinator) = this.upgrade() {
                let _ = coordinator.runner_concluded(winner).await;
            }
        }));
        inner.runner = Some(runner);

        info!(match_id = %self.record.id, room = %self.room, "match started");
    }

    async fn resolve_win_and_lose(&self, inner: &mut SessionInner, winner: Seat) {
        let loser = winner.opponent();
        info!(match_id = %self.record.id, %winner, %loser, "resolving win and loss");

        self.resolve_winner(inner, winner).await;
        self.resolve_loser(inner, loser).await;
        self.drop_connection(inner, loser).await;
    }

    /// Record `seat` as the loser and drop its room membership.
    /// Does not close the loser's connection.
    async fn resolve_loser(&self, inner: &mut SessionInner, seat: Seat) {
        let Some(slot) = inner.slot_mut(seat) else {
            error!(match_id = %self.record.id, %seat, "cannot resolve an empty seat as loser");
            return;
        };
        if slot.verdict.is_some() {
            debug!(%seat, verdict = ?slot.verdict, "seat already resolved");
            return;
        }
        slot.verdict = Some(Verdict::Lost);
        let user = slot.competitor.id();

        match self.deps.store.remove_room_member(user, self.record.room.id).await {
            Ok(rows) => info!(match_id = %self.record.id, %user, rows, "loser removed from room"),
            Err(e) => error!(match_id = %self.record.id, %user, "failed to remove loser from room: {}", e),
        }
    }

    /// Credit `seat` with the win and propagate the result.
    async fn resolve_winner(&self, inner: &mut SessionInner, seat: Seat) {
        if let Some(existing) = inner.winner() {
            error!(match_id = %self.record.id, %existing, %seat, "winner already credited");
            return;
        }
        let (Some(winner_slot), Some(loser_slot)) = (inner.slot(seat), inner.slot(seat.opponent())) else {
            error!(match_id = %self.record.id, %seat, "cannot resolve a winner without an opponent");
            return;
        };
        if winner_slot.verdict.is_some() {
            warn!(match_id = %self.record.id, %seat, verdict = ?winner_slot.verdict, "seat already resolved");
            return;
        }

        let winner = winner_slot.competitor.clone();
        let players = match seat {
            Seat::First => [winner.id(), loser_slot.competitor.id()],
            Seat::Second => [loser_slot.competitor.id(), winner.id()],
        };
        if let Some(slot) = inner.slot_mut(seat) {
            slot.verdict = Some(Verdict::Won);
        }

        let scores = inner.runner.as_ref().map(|r| r.scores()).unwrap_or([0, 0]);
        let report = MatchReport::build(&self.record, players, scores, winner.id(), Utc::now());
        info!(
            match_id = %self.record.id,
            winner = %winner.id(),
            paddle1 = scores[0],
            paddle2 = scores[1],
            "match resolved"
        );

        if let Err(e) = self.deps.store.save_result(self.record.id, &report).await {
            error!(match_id = %self.record.id, "failed to persist result: {}", e);
        }

        self.notify(
            Notification::MatchConcluded(MatchConcluded {
                winner: seat.paddle(),
                paddle1: scores[0],
                paddle2: scores[1],
            }),
            Target::Room(self.room.clone()),
        )
        .await;

        if let Err(e) = self.deps.stats.report(&report).await {
            error!(match_id = %self.record.id, "statistics report failed: {}", e);
        }

        match self.record.winner_match {
            Some(next) => self.advance_bracket(&winner, next).await,
            None => {
                self.close_bracket(&winner).await;
                self.drop_connection(inner, seat).await;
            }
        }

        self.deregister().await;
    }

    async fn advance_bracket(&self, winner: &Competitor, next: MatchId) {
        info!(match_id = %self.record.id, %next, winner = %winner.id(), "advancing winner");

        if let Err(e) = self.deps.store.add_roster_entry(winner.id(), next).await {
            error!(match_id = %self.record.id, %next, "failed to add roster entry: {}", e);
        }

        if next == self.record.id {
            error!(match_id = %self.record.id, "match lists itself as the next match");
            return;
        }
        let Some(registry) = self.registry.upgrade() else {
            warn!(match_id = %self.record.id, %next, "no registry; next match seat left to the roster");
            return;
        };

        match registry.get_or_create(next).await {
            Ok(coordinator) => match coordinator.decide_seat(winner.clone()).await {
                Ok(seat) => info!(%next, %seat, "winner seated in next match"),
                Err(e) => error!(%next, "failed to seat winner in next match: {}", e),
            },
            Err(e) => error!(%next, "failed to open next match: {}", e),
        }
    }

    async fn close_bracket(&self, winner: &Competitor) {
        let user = winner.id();
        info!(match_id = %self.record.id, %user, room = %self.record.room.name, "final winner, closing bracket");

        if let Err(e) = self.deps.store.remove_user_memberships(user).await {
            error!(%user, "failed to remove winner memberships: {}", e);
        }
        if let Err(e) = self.deps.store.delete_room(&self.record.room.name).await {
            error!(room = %self.record.room.name, "failed to delete room: {}", e);
        }
    }

    /// Close a seat's connection, at most once per seat.
    async fn drop_connection(&self, inner: &mut SessionInner, seat: Seat) {
        let Some(slot) = inner.slot_mut(seat) else {
            return;
        };
        if slot.dropped {
            return;
        }
        slot.dropped = true;
        let connection = slot.competitor.connection().clone();

        if let Err(e) = self.deps.gateway.disconnect(&connection).await {
            error!(match_id = %self.record.id, %seat, %connection, "disconnect failed: {}", e);
        }
    }

    async fn deregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.record.id).await;
        }
    }

    async fn assign_paddle(&self, seat: Seat, connection: &ConnectionId) {
        self.notify(
            Notification::PaddleAssignment(PaddleAssignment { paddle_id: seat.paddle() }),
            Target::Session(connection.clone()),
        )
        .await;

        if let Err(e) = self.deps.gateway.enter_room(connection, &self.room).await {
            error!(match_id = %self.record.id, %connection, "failed to enter room: {}", e);
        }
    }

    async fn notify(&self, notification: Notification, target: Target) {
        let payload = match notification.payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!(event = notification.event(), "failed to encode notification: {}", e);
                return;
            }
        };

        if let Err(e) = self.deps.gateway.emit(notification.event(), payload, &target).await {
            error!(event = notification.event(), ?target, "emit failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryGateway, MemoryStatsReporter, MemoryStore, ScriptedRunnerFactory};
    use crate::network::protocol::{GAME_OVER_EVENT, INIT_EVENT};
    use crate::store::{RoomId, RoomRecord};
    use proptest::prelude::*;
    use std::time::Duration;

    const GRACE: Duration = Duration::from_secs(30);
    const ROOM: &str = "cup";

    struct Harness {
        gateway: Arc<MemoryGateway>,
        store: Arc<MemoryStore>,
        stats: Arc<MemoryStatsReporter>,
        runners: Arc<ScriptedRunnerFactory>,
        registry: Arc<MatchRegistry>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_stats(MemoryStatsReporter::new())
        }

        fn with_stats(stats: MemoryStatsReporter) -> Self {
            let gateway = Arc::new(MemoryGateway::new());
            let store = Arc::new(MemoryStore::new());
            let stats = Arc::new(stats);
            let runners = Arc::new(ScriptedRunnerFactory::new());
            let deps = Collaborators {
                gateway: gateway.clone(),
                store: store.clone(),
                stats: stats.clone(),
                runners: runners.clone(),
            };
            let registry = MatchRegistry::new(SessionConfig { grace_period: GRACE }, deps);

            Self { gateway, store, stats, runners, registry }
        }

        /// Match 1, optionally feeding match 2. Users 1..=3 are room members.
        fn bracket(&self, with_next: bool) {
            let room = RoomRecord { id: RoomId(1), name: ROOM.to_string() };
            self.store.insert_match(MatchRecord {
                id: MatchId(1),
                room: room.clone(),
                winner_match: with_next.then_some(MatchId(2)),
                start_at: None,
            });
            if with_next {
                self.store.insert_match(MatchRecord {
                    id: MatchId(2),
                    room,
                    winner_match: None,
                    start_at: None,
                });
            }
            for user in 1..=3 {
                self.store.add_member(UserId(user), RoomId(1));
            }
        }

        async fn open(&self) -> Arc<MatchCoordinator> {
            self.registry.get_or_create(MatchId(1)).await.unwrap()
        }

        /// Decide 1 and 2, then connect both: the session is in MATCH.
        async fn live(&self) -> Arc<MatchCoordinator> {
            let session = self.open().await;
            session.decide_seat(human(1)).await.unwrap();
            session.decide_seat(human(2)).await.unwrap();
            assert_eq!(session.connect(human(1)).await.unwrap(), EventOutcome::Applied);
            assert_eq!(session.connect(human(2)).await.unwrap(), EventOutcome::Applied);
            assert_eq!(session.stage().await, Stage::Match);
            session
        }
    }

    fn human(id: i64) -> Competitor {
        Competitor::human(UserId(id), sid(id))
    }

    fn sid(id: i64) -> ConnectionId {
        ConnectionId::new(format!("sid-{}", id))
    }

    #[tokio::test]
    async fn test_third_decide_rejected() {
        let h = Harness::new();
        h.bracket(false);
        let session = h.open().await;

        assert_eq!(session.decide_seat(human(1)).await.unwrap(), Seat::First);
        assert_eq!(session.decide_seat(human(2)).await.unwrap(), Seat::Second);
        let before = session.snapshot().await;

        let result = session.decide_seat(human(3)).await;
        assert!(matches!(result, Err(SessionError::SessionFull)));
        assert_eq!(session.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_decide_twice_rejected() {
        let h = Harness::new();
        h.bracket(false);
        let session = h.open().await;

        session.decide_seat(human(1)).await.unwrap();
        let result = session.decide_seat(human(1)).await;

        assert!(matches!(result, Err(SessionError::AlreadySeated(UserId(1)))));
        assert!(session.snapshot().await.seats[1].is_none());
    }

    #[tokio::test]
    async fn test_connect_unknown_rejected() {
        let h = Harness::new();
        h.bracket(false);
        let session = h.open().await;
        session.decide_seat(human(1)).await.unwrap();

        let result = session.connect(human(3)).await;

        assert!(matches!(result, Err(SessionError::UnknownCompetitor(UserId(3)))));
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_connect_sends_paddle_and_room() {
        let h = Harness::new();
        h.bracket(false);
        let session = h.open().await;
        session.decide_seat(human(1)).await.unwrap();
        session.decide_seat(human(2)).await.unwrap();

        assert_eq!(session.connect(human(2)).await.unwrap(), EventOutcome::Applied);
        assert_eq!(session.connect(human(2)).await.unwrap(), EventOutcome::Duplicate);

        let init = h.gateway.emitted(INIT_EVENT);
        assert_eq!(init.len(), 1);
        assert_eq!(init[0].0, serde_json::json!({ "paddleId": "paddle2" }));
        assert_eq!(init[0].1, Target::Session(sid(2)));
        assert!(session.is_connected(UserId(2)).await);
        assert!(!session.is_connected(UserId(1)).await);
        assert_eq!(session.stage().await, Stage::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_both_connect_before_timer() {
        let h = Harness::new();
        h.bracket(false);
        let session = h.open().await;
        session.decide_seat(human(1)).await.unwrap();
        session.decide_seat(human(2)).await.unwrap();

        let _ = session.connect(human(1)).await.unwrap();
        assert!(session.snapshot().await.timer_armed);

        let _ = session.connect(human(2)).await.unwrap();
        tokio::time::sleep(GRACE * 3).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.stage, Stage::Match);
        assert!(!snapshot.timer_armed);
        assert!(snapshot.runner_attached);
        assert!(h.store.results().is_empty());
        assert!(h.gateway.disconnected().is_empty());
        assert_eq!(h.runners.handles().len(), 1);
        assert!(h.runners.handles()[0].started());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_forfeits_absent_seat() {
        let h = Harness::new();
        h.bracket(true);
        let session = h.open().await;
        session.decide_seat(human(1)).await.unwrap();
        session.decide_seat(human(2)).await.unwrap();
        let _ = session.connect(human(1)).await.unwrap();

        tokio::time::sleep(GRACE - Duration::from_secs(1)).await;
        assert_eq!(session.stage().await, Stage::Waiting);

        tokio::time::sleep(Duration::from_secs(2)).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.stage, Stage::Finished);
        assert_eq!(snapshot.seats[0].as_ref().unwrap().verdict, Some(Verdict::Won));
        assert_eq!(snapshot.seats[1].as_ref().unwrap().verdict, Some(Verdict::Lost));
        assert_eq!(h.gateway.disconnected(), vec![sid(2)]);
        assert!(!h.store.is_member(UserId(2), RoomId(1)));

        let results = h.store.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1.winner_id, UserId(1));
        assert!(h.runners.handles().is_empty());
        assert!(h.registry.get(MatchId(1)).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_joiner_wins_once() {
        let h = Harness::new();
        h.bracket(false);
        let session = h.open().await;
        session.decide_seat(human(1)).await.unwrap();
        session.decide_seat(human(2)).await.unwrap();
        let _ = session.connect(human(1)).await.unwrap();

        // seat 0 walks out during the grace period
        assert_eq!(session.disconnect(human(1)).await.unwrap(), EventOutcome::Applied);
        assert_eq!(session.stage().await, Stage::Finished);
        assert!(h.store.results().is_empty());
        assert!(h.registry.get(MatchId(1)).await.is_some());

        tokio::time::sleep(GRACE * 2).await;
        assert!(h.store.results().is_empty());

        assert_eq!(session.connect(human(2)).await.unwrap(), EventOutcome::Applied);
        assert_eq!(session.connect(human(2)).await.unwrap(), EventOutcome::Duplicate);
        assert_eq!(session.connect(human(1)).await.unwrap(), EventOutcome::Ignored);

        let results = h.store.results();
        assert_eq!(results.len(), 1);
        let report = &results[0].1;
        assert_eq!(report.winner_id, UserId(2));
        assert_eq!((report.player1_score, report.player2_score), (0, 0));
        assert_eq!(h.stats.reports().len(), 1);
        assert_eq!(
            h.gateway.emitted(GAME_OVER_EVENT)[0].0,
            serde_json::json!({ "winner": "paddle2", "paddle1": 0, "paddle2": 0 })
        );
        assert!(h.registry.get(MatchId(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_disconnect_during_match() {
        let h = Harness::new();
        h.bracket(false);
        let session = h.live().await;
        let runner = h.runners.for_match(MatchId(1)).unwrap();
        runner.set_scores([2, 4]);

        assert_eq!(session.disconnect(human(2)).await.unwrap(), EventOutcome::Applied);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.stage, Stage::Finished);
        assert_eq!(snapshot.seats[0].as_ref().unwrap().verdict, Some(Verdict::Won));
        assert_eq!(snapshot.seats[1].as_ref().unwrap().verdict, Some(Verdict::Lost));
        assert_eq!(runner.stop_calls(), 1);
        assert!(!runner.finish(Seat::Second, [2, 5]).await);

        let results = h.store.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1.winner_id, UserId(1));
        assert_eq!(results[0].1.player2_score, 4);
        // final winner is released; the leaver is already gone
        assert_eq!(h.gateway.disconnected(), vec![sid(1)]);

        assert_eq!(session.disconnect(human(1)).await.unwrap(), EventOutcome::Ignored);
        assert_eq!(session.runner_concluded(Seat::Second).await, EventOutcome::Ignored);
        assert_eq!(h.store.results().len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_connection_disconnect_ignored() {
        let h = Harness::new();
        h.bracket(false);
        let session = h.live().await;

        let stale = Competitor::human(UserId(2), ConnectionId::new("sid-old"));
        assert_eq!(session.disconnect(stale).await.unwrap(), EventOutcome::Ignored);

        assert_eq!(session.stage().await, Stage::Match);
        assert!(session.is_connected(UserId(2)).await);
    }

    #[tokio::test]
    async fn test_disconnect_before_start_ignored() {
        let h = Harness::new();
        h.bracket(false);
        let session = h.open().await;
        session.decide_seat(human(1)).await.unwrap();

        assert_eq!(session.disconnect(human(1)).await.unwrap(), EventOutcome::Ignored);
        assert_eq!(session.stage().await, Stage::NotStarted);
    }

    #[tokio::test]
    async fn test_final_match_closes_bracket() {
        let h = Harness::new();
        h.bracket(false);
        let session = h.live().await;

        assert!(h.runners.for_match(MatchId(1)).unwrap().finish(Seat::First, [11, 7]).await);

        let results = h.store.results();
        assert_eq!(results.len(), 1);
        let (match_id, report) = &results[0];
        assert_eq!(*match_id, MatchId(1));
        assert_eq!(report.player1_id, UserId(1));
        assert_eq!(report.player2_id, UserId(2));
        assert_eq!((report.player1_score, report.player2_score), (11, 7));
        assert_eq!(report.winner_id, UserId(1));

        let game_over = h.gateway.emitted(GAME_OVER_EVENT);
        assert_eq!(game_over.len(), 1);
        assert_eq!(game_over[0].0, serde_json::json!({ "winner": "paddle1", "paddle1": 11, "paddle2": 7 }));
        assert_eq!(game_over[0].1, Target::Room("match_1".to_string()));

        assert_eq!(h.stats.reports(), vec![report.clone()]);
        assert!(!h.store.has_room(ROOM));
        assert!(h.store.roster().is_empty());

        let dropped = h.gateway.disconnected();
        assert!(dropped.contains(&sid(1)));
        assert!(dropped.contains(&sid(2)));
        assert_eq!(dropped.len(), 2);

        assert_eq!(session.stage().await, Stage::Finished);
        assert!(h.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_winner_advances_to_next_match() {
        let h = Harness::new();
        h.bracket(true);
        let _session = h.live().await;

        assert!(h.runners.for_match(MatchId(1)).unwrap().finish(Seat::First, [11, 7]).await);

        let results = h.store.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1.winner_id, UserId(1));
        assert_eq!(h.stats.reports().len(), 1);

        assert_eq!(h.store.roster(), vec![(UserId(1), MatchId(2))]);
        assert!(h.store.has_room(ROOM));
        assert_eq!(h.gateway.disconnected(), vec![sid(2)]);

        let next = h.registry.get(MatchId(2)).await.unwrap();
        let seats = next.snapshot().await.seats;
        assert_eq!(seats[0].as_ref().unwrap().user_id, UserId(1));
        assert!(!seats[0].as_ref().unwrap().online);
        assert_eq!(h.registry.match_ids().await, vec![MatchId(2)]);
    }

    #[tokio::test]
    async fn test_stats_failure_not_fatal() {
        let h = Harness::with_stats(MemoryStatsReporter::failing());
        h.bracket(false);
        let _session = h.live().await;

        assert!(h.runners.for_match(MatchId(1)).unwrap().finish(Seat::Second, [1, 5]).await);

        assert_eq!(h.stats.reports().len(), 1);
        assert_eq!(h.store.results().len(), 1);
        assert_eq!(h.gateway.emitted(GAME_OVER_EVENT).len(), 1);
        assert!(!h.store.has_room(ROOM));
        assert!(h.registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_ai_join_starts_match() {
        let h = Harness::new();
        h.bracket(false);
        let session = h.open().await;

        let empty = session.ai_join(ConnectionId::new("sid-ai")).await;
        assert!(matches!(empty, Err(SessionError::InvalidAiJoin { occupied: 0 })));

        session.decide_seat(human(1)).await.unwrap();
        let _ = session.connect(human(1)).await.unwrap();
        assert_eq!(session.ai_join(ConnectionId::new("sid-ai")).await.unwrap(), EventOutcome::Applied);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.stage, Stage::Match);
        let ai = snapshot.seats[1].as_ref().unwrap();
        assert!(ai.is_ai && ai.online);

        let runner = h.runners.for_match(MatchId(1)).unwrap();
        assert!(runner.competitors()[1].is_ai());
        assert!(h
            .gateway
            .emitted(INIT_EVENT)
            .contains(&(serde_json::json!({ "paddleId": "paddle2" }), Target::Session(ConnectionId::new("sid-ai")))));

        let again = session.ai_join(ConnectionId::new("sid-ai-2")).await;
        assert!(matches!(again, Err(SessionError::InvalidAiJoin { occupied: 2 })));

        // the AI connection is dropped like any other loser
        assert!(runner.finish(Seat::First, [5, 0]).await);
        assert!(h.gateway.disconnected().contains(&ConnectionId::new("sid-ai")));
    }

    #[derive(Debug, Clone)]
    enum Step {
        Decide(i64),
        Connect(i64),
        Disconnect(i64),
        AiJoin,
        Elapse,
        RunnerWins(usize),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            (1i64..=3).prop_map(Step::Decide),
            (1i64..=3).prop_map(Step::Connect),
            (1i64..=3).prop_map(Step::Disconnect),
            Just(Step::AiJoin),
            Just(Step::Elapse),
            (0usize..2).prop_map(Step::RunnerWins),
        ]
    }

    async fn play(steps: Vec<Step>, with_next: bool) -> Result<(), TestCaseError> {
        let h = Harness::new();
        h.bracket(with_next);
        let session = h.open().await;
        let mut last = Stage::NotStarted;

        for step in steps {
            match step {
                Step::Decide(user) => {
                    let _ = session.decide_seat(human(user)).await;
                }
                Step::Connect(user) => {
                    let _ = session.connect(human(user)).await;
                }
                Step::Disconnect(user) => {
                    let _ = session.disconnect(human(user)).await;
                }
                Step::AiJoin => {
                    let _ = session.ai_join(ConnectionId::new("sid-ai")).await;
                }
                Step::Elapse => tokio::time::sleep(GRACE + Duration::from_secs(1)).await,
                Step::RunnerWins(index) => {
                    if let (Some(runner), Some(seat)) = (h.runners.for_match(MatchId(1)), Seat::from_index(index)) {
                        runner.finish(seat, [5, 3]).await;
                    }
                }
            }

            let stage = session.stage().await;
            prop_assert!(stage >= last, "stage went from {:?} to {:?}", last, stage);
            last = stage;
        }

        let snapshot = session.snapshot().await;
        let winners = snapshot
            .seats
            .iter()
            .flatten()
            .filter(|s| s.verdict == Some(Verdict::Won))
            .count();
        prop_assert!(winners <= 1);

        let results = h.store.results();
        prop_assert!(results.len() <= 1);
        prop_assert_eq!(results.len(), winners);
        prop_assert_eq!(h.stats.reports().len(), winners);
        prop_assert_eq!(h.gateway.emitted(GAME_OVER_EVENT).len(), winners);
        prop_assert!(h.store.roster().len() <= 1);
        prop_assert!(h.runners.handles().len() <= 1);

        let mut dropped = h.gateway.disconnected();
        let total = dropped.len();
        dropped.sort();
        dropped.dedup();
        prop_assert_eq!(dropped.len(), total);

        if snapshot.stage != Stage::Waiting {
            prop_assert!(!snapshot.timer_armed);
        }
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn test_random_events_resolve_once(
            steps in proptest::collection::vec(step(), 1..24),
            with_next in any::<bool>(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();
            runtime.block_on(play(steps, with_next))?;
        }
    }
}
