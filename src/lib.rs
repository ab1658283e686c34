//! # Dogfight Match Server
//!
//! Authoritative match simulation for team air-combat modes
//! (infection, capture the flag).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DOGFIGHT SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  config.rs       - Environment configuration                 │
//! │                                                              │
//! │  core/           - Deterministic primitives                  │
//! │  ├── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │  ├── hash.rs     - World state digests                       │
//! │  └── scheduler.rs- Cancellable delayed tasks                 │
//! │                                                              │
//! │  game/           - Match simulation (deterministic)          │
//! │  ├── state.rs    - World registry, players, mobs             │
//! │  ├── events.rs   - Inbound / outbound / internal events      │
//! │  ├── combat.rs   - Hit resolution, kill bookkeeping          │
//! │  ├── mode.rs     - Per-mode policy tables                    │
//! │  ├── lifecycle.rs- Match state machine                       │
//! │  ├── balance.rs  - Fairness scores, team reshuffle           │
//! │  ├── spawn.rs    - Spawn points                              │
//! │  └── simulation.rs - Single owner, dispatch table            │
//! │                                                              │
//! │  runtime/        - Tokio shell (non-deterministic)           │
//! │  └── task.rs     - Owning task, handle, clock                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! The `core/` and `game/` modules never read the wall clock:
//! - Time arrives as `ClockSecondElapsed` events and `advance_to(ms)`
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - All randomness from a seeded Xorshift128+, reseeded per match
//!
//! Given the same configuration and the same event sequence, two
//! simulations end with identical world digests.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod runtime;

// Re-export commonly used types
pub use config::{ConfigError, GameMode, ServerConfig};
pub use core::rng::DeterministicRng;
pub use game::events::{InboundEvent, OutboundEvent};
pub use game::simulation::Simulation;
pub use game::state::{EntityId, PlayerProfile, Team, WorldSnapshot};
pub use runtime::{RuntimeError, SimulationHandle};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
