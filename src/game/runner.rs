//! Match Runner Contract
//!
//! The coordinator starts a runner once both seats are live, reads scores
//! from it on resolution, and stops it when a competitor walks out. The
//! runner reports a natural win exactly once through its [`WinSignal`].

use std::future::Future;
use std::pin::Pin;

use crate::session::competitor::{Competitor, Seat};
use crate::store::MatchRecord;

/// Current score per seat, indexed by [`Seat::index`].
pub type Scores = [u32; 2];

type ConcludeFn = Box<dyn FnOnce(Seat) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// One-shot callback a runner uses to report the winning seat.
///
/// Consumed by [`WinSignal::conclude`], so a runner cannot report twice.
pub struct WinSignal {
    conclude: ConcludeFn,
}

impl WinSignal {
    /// Wrap a conclusion handler.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: FnOnce(Seat) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            conclude: Box::new(move |seat| Box::pin(handler(seat))),
        }
    }

    /// Report `winner` and wait until the handler has run.
    pub async fn conclude(self, winner: Seat) {
        (self.conclude)(winner).await;
    }
}

impl std::fmt::Debug for WinSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WinSignal").finish_non_exhaustive()
    }
}

/// Live gameplay for one session.
pub trait MatchRunner: Send + Sync {
    /// Begin play. The runner keeps `signal` until a seat wins.
    fn start(&mut self, signal: WinSignal);

    /// Abort play. Safe to call repeatedly or after the runner finished.
    /// No conclusion is reported after this returns.
    fn stop(&mut self);

    /// Current scores.
    fn scores(&self) -> Scores;
}

/// Builds runners for sessions entering gameplay.
pub trait RunnerFactory: Send + Sync {
    /// Create an unstarted runner for the seated competitors.
    fn build(&self, record: &MatchRecord, competitors: &[Competitor; 2]) -> Box<dyn MatchRunner>;
}
