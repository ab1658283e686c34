//! Async Runtime Shell
//!
//! Runs one [`Simulation`](crate::game::Simulation) on a dedicated tokio
//! task. Everything else talks to it through a [`SimulationHandle`]:
//! commands over mpsc, outbound events over broadcast, snapshots over
//! oneshot.

pub mod task;

pub use task::{spawn, Command, RuntimeError, SimulationHandle, SimulationTask};
