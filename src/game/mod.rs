//! Gameplay boundary.
//!
//! - `runner`: the contract between a session and its gameplay loop
//! - `rally`: seeded reference runner

pub mod rally;
pub mod runner;

pub use rally::{RallyConfig, RallyRunner, RallyRunnerFactory};
pub use runner::{MatchRunner, RunnerFactory, Scores, WinSignal};
