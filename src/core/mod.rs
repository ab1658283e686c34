//! Core deterministic primitives.
//!
//! Seeded randomness, state digests and the delayed-task table. Nothing
//! here knows about players or teams.

pub mod rng;
pub mod hash;
pub mod scheduler;

// Re-export core types
pub use rng::DeterministicRng;
pub use hash::{compute_state_hash, StateHash};
pub use scheduler::Scheduler;
