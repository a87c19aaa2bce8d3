//! Core primitives shared by the runner and session layers.

pub mod rng;

pub use rng::RallyRng;
