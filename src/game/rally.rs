//! Rally Runner
//!
//! Reference [`MatchRunner`]: plays one seeded rally per interval and
//! concludes when a seat reaches the winning score. It stands in for the
//! real paddle simulation so brackets can run end to end.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::rng::RallyRng;
use crate::game::runner::{MatchRunner, RunnerFactory, Scores, WinSignal};
use crate::session::competitor::{Competitor, Seat};
use crate::store::{MatchId, MatchRecord};

/// Rally runner configuration.
#[derive(Debug, Clone)]
pub struct RallyConfig {
    /// Points needed to win.
    pub winning_score: u32,
    /// Time between rallies.
    pub rally_interval: Duration,
}

impl Default for RallyConfig {
    fn default() -> Self {
        Self {
            winning_score: 5,
            rally_interval: Duration::from_millis(200),
        }
    }
}

/// Seeded rally loop for one session.
pub struct RallyRunner {
    match_id: MatchId,
    config: RallyConfig,
    rng: Option<RallyRng>,
    scores: Arc<[AtomicU32; 2]>,
    task: Option<JoinHandle<()>>,
}

impl RallyRunner {
    /// Create an unstarted runner.
    pub fn new(match_id: MatchId, config: RallyConfig, rng: RallyRng) -> Self {
        Self {
            match_id,
            config,
            rng: Some(rng),
            scores: Arc::new([AtomicU32::new(0), AtomicU32::new(0)]),
            task: None,
        }
    }
}

impl MatchRunner for RallyRunner {
    fn start(&mut self, signal: WinSignal) {
        let Some(mut rng) = self.rng.take() else {
            warn!(match_id = %self.match_id, "rally runner already started");
            return;
        };

        let scores = self.scores.clone();
        let config = self.config.clone();
        let match_id = self.match_id;

        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval(config.rally_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let side = rng.next_side(50);
                let points = scores[side].fetch_add(1, Ordering::SeqCst) + 1;
                debug!(%match_id, side, points, "rally won");

                if points >= config.winning_score {
                    let winner = if side == 0 { Seat::First } else { Seat::Second };
                    info!(%match_id, %winner, "winning score reached");
                    signal.conclude(winner).await;
                    break;
                }
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(match_id = %self.match_id, "rally runner stopped");
        }
    }

    fn scores(&self) -> Scores {
        [
            self.scores[0].load(Ordering::SeqCst),
            self.scores[1].load(Ordering::SeqCst),
        ]
    }
}

/// Builds [`RallyRunner`]s seeded from the match and its seat order.
#[derive(Debug, Clone, Default)]
pub struct RallyRunnerFactory {
    config: RallyConfig,
}

impl RallyRunnerFactory {
    /// Factory with the given configuration.
    pub fn new(config: RallyConfig) -> Self {
        Self { config }
    }
}

impl RunnerFactory for RallyRunnerFactory {
    fn build(&self, record: &MatchRecord, competitors: &[Competitor; 2]) -> Box<dyn MatchRunner> {
        let with_ai = competitors.iter().any(Competitor::is_ai);
        debug!(match_id = %record.id, with_ai, "building rally runner");

        let rng = RallyRng::for_match(record.id.0, [competitors[0].id().0, competitors[1].id().0]);
        Box::new(RallyRunner::new(record.id, self.config.clone(), rng))
    }
}
