//! # Pong Tournament Server
//!
//! Match lifecycle coordination for 1v1 pong tournament brackets.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  PONG TOURNAMENT SERVER                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  session/        - Match lifecycle                           │
//! │  ├── competitor.rs - Competitors, seats, stages              │
//! │  ├── timer.rs      - Cancellable grace-period countdown      │
//! │  ├── coordinator.rs- Per-match state machine                 │
//! │  └── registry.rs   - Match id to coordinator map             │
//! │                                                              │
//! │  game/           - Gameplay boundary                         │
//! │  ├── runner.rs   - Runner contract and win signal            │
//! │  └── rally.rs    - Seeded reference runner                   │
//! │                                                              │
//! │  network/        - Notification boundary                     │
//! │  ├── protocol.rs - Payloads and targets                      │
//! │  └── gateway.rs  - Gateway trait                             │
//! │                                                              │
//! │  store/          - Persistence boundary                      │
//! │  ├── mod.rs      - Match records, results, store trait       │
//! │  └── stats.rs    - Statistics service client                 │
//! │                                                              │
//! │  core/rng.rs     - Xorshift128+ PRNG                         │
//! │  memory.rs       - In-memory collaborators                   │
//! │  config.rs       - Environment configuration                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Resolution Guarantee
//!
//! Every event on a match is applied under that match's session lock.
//! Stages only move forward, each seat's verdict is written once, and a
//! second winner is never credited, so result persistence, the
//! statistics report and bracket advancement happen at most once.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod memory;
pub mod network;
pub mod session;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use network::protocol::{ConnectionId, PaddleId};
pub use session::{
    Collaborators, Competitor, EventOutcome, MatchCoordinator, MatchRegistry, Seat, SessionConfig,
    SessionError, Stage,
};
pub use store::{MatchId, MatchRecord, MatchReport, UserId};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
