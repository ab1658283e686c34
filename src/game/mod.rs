//! Game Logic Module
//!
//! All match simulation code. Deterministic for a given seed and event
//! order.
//!
//! ## Module Structure
//!
//! - `specs`: Ship and projectile tables
//! - `state`: World registry, players, mobs, match record
//! - `events`: Inbound, outbound and internal events
//! - `combat`: Hit resolution and kill bookkeeping
//! - `mode`: Per-mode policy data
//! - `lifecycle`: Match state machine
//! - `balance`: Fairness scores and team reshuffles
//! - `spawn`: Spawn points
//! - `simulation`: Single owner and dispatch table

pub mod specs;
pub mod state;
pub mod events;
pub mod combat;
pub mod mode;
pub mod lifecycle;
pub mod balance;
pub mod spawn;
pub mod simulation;

// Re-export key types
pub use state::{EntityId, Player, PlayerProfile, Team, WorldState, WorldSnapshot};
pub use events::{InboundEvent, OutboundEvent};
pub use lifecycle::{MatchPhase, MatchStateMachine};
pub use mode::ModePolicy;
pub use simulation::Simulation;
