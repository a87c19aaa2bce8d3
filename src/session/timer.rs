//! Waiting Timer
//!
//! One-shot grace-period countdown backed by a tokio task. Each arming
//! gets a fresh generation token; the fire path hands the token back so
//! the owner can reject a fire that belongs to an earlier arming.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Identifies one arming of a [`WaitingTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken(u64);

/// Cancellable one-shot delay.
#[derive(Debug)]
pub struct WaitingTimer {
    grace: Duration,
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

impl WaitingTimer {
    /// Create an unarmed timer with the given grace window.
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            generation: 0,
            pending: None,
        }
    }

    /// Grace window.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Arm the timer, replacing any pending countdown.
    ///
    /// `on_fire` receives the token of this arming once the grace window
    /// elapses. Must be called from within a tokio runtime.
    pub fn arm<F, Fut>(&mut self, on_fire: F) -> TimerToken
    where
        F: FnOnce(TimerToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop();
        self.generation += 1;
        let token = TimerToken(self.generation);
        let grace = self.grace;

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            on_fire(token).await;
        }));

        token
    }

    /// Cancel a pending countdown. No-op if nothing is pending.
    pub fn stop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Accept a fire for `token`.
    ///
    /// Returns true only for the current arming, which is then consumed
    /// without aborting the task that is delivering the fire.
    pub fn take_fire(&mut self, token: TimerToken) -> bool {
        if token.0 != self.generation || self.pending.is_none() {
            return false;
        }
        self.pending = None;
        true
    }

    /// Whether a countdown is pending.
    pub fn is_armed(&self) -> bool {
        self.pending.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for WaitingTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
