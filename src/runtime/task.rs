//! Simulation Task
//!
//! The owning task serializes every mutation. A one second interval
//! drives the match clock; a finer interval fires delayed tasks close to
//! their deadlines.

use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::game::events::{InboundEvent, OutboundEvent};
use crate::game::simulation::Simulation;
use crate::game::state::WorldSnapshot;

/// Resolution of delayed task firing.
pub const TIMER_RESOLUTION: Duration = Duration::from_millis(50);

/// Capacity of the command channel.
const COMMAND_BUFFER: usize = 256;

/// Capacity of the outbound event channel.
const EVENT_BUFFER: usize = 1024;

/// Messages accepted by the simulation task.
#[derive(Debug)]
pub enum Command {
    /// Feed an inbound event.
    Event(InboundEvent),
    /// Reply with a world snapshot.
    Snapshot(oneshot::Sender<WorldSnapshot>),
    /// Stop the task.
    Shutdown,
}

/// Runtime errors
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The simulation task has stopped.
    #[error("Simulation task is not running")]
    ChannelClosed,

    /// The task dropped a snapshot request.
    #[error("Snapshot request dropped")]
    SnapshotDropped,
}

/// Cloneable handle to a running simulation.
#[derive(Clone)]
pub struct SimulationHandle {
    command_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<OutboundEvent>,
}

impl SimulationHandle {
    /// Deliver an inbound event.
    pub async fn send(&self, event: InboundEvent) -> Result<(), RuntimeError> {
        self.command_tx
            .send(Command::Event(event))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }

    /// Receive outbound events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.event_tx.subscribe()
    }

    /// Copy of the world as seen by the simulation task.
    pub async fn snapshot(&self) -> Result<WorldSnapshot, RuntimeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(Command::Snapshot(reply_tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        reply_rx.await.map_err(|_| RuntimeError::SnapshotDropped)
    }

    /// Ask the task to stop after the commands already queued.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.command_tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| RuntimeError::ChannelClosed)
    }
}

/// The task that owns a [`Simulation`].
pub struct SimulationTask {
    simulation: Simulation,
    command_rx: mpsc::Receiver<Command>,
    event_tx: broadcast::Sender<OutboundEvent>,
    started: Instant,
}

impl SimulationTask {
    /// Create a task and its handle.
    pub fn new(config: ServerConfig) -> (Self, SimulationHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

        let handle = SimulationHandle {
            command_tx,
            event_tx: event_tx.clone(),
        };

        let task = Self {
            simulation: Simulation::new(config),
            command_rx,
            event_tx,
            started: Instant::now(),
        };

        (task, handle)
    }

    /// Process commands and clock ticks until shutdown.
    pub async fn run(mut self) {
        info!(mode = ?self.simulation.config().mode, "Simulation task started");

        let mut clock = interval(Duration::from_secs(1));
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut timers = interval(TIMER_RESOLUTION);
        timers.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The first tick completes immediately
        clock.tick().await;

        loop {
            tokio::select! {
                command = self.command_rx.recv() => {
                    match command {
                        Some(Command::Event(event)) => {
                            self.advance();
                            self.simulation.handle(event);
                        }
                        Some(Command::Snapshot(reply)) => {
                            let _ = reply.send(self.simulation.snapshot());
                        }
                        Some(Command::Shutdown) | None => break,
                    }
                }
                _ = clock.tick() => {
                    self.advance();
                    self.simulation.handle(InboundEvent::ClockSecondElapsed);
                }
                _ = timers.tick() => {
                    self.advance();
                }
            }

            self.publish();
        }

        info!(
            sequence = self.simulation.world().match_record.sequence,
            "Simulation task stopped"
        );
    }

    fn advance(&mut self) {
        let now_ms = self.started.elapsed().as_millis() as u64;
        self.simulation.advance_to(now_ms);
    }

    fn publish(&mut self) {
        for event in self.simulation.take_events() {
            // No subscribers is fine
            if self.event_tx.send(event).is_err() {
                debug!("Outbound event dropped, no subscribers");
            }
        }
    }
}

/// Spawn a simulation task on the current runtime.
pub fn spawn(config: ServerConfig) -> (SimulationHandle, JoinHandle<()>) {
    let (task, handle) = SimulationTask::new(config);
    let join = tokio::spawn(task.run());
    (handle, join)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::specs::ShipType;
    use crate::game::state::{EntityId, PlayerProfile};

    fn joined(id: u32) -> InboundEvent {
        InboundEvent::PlayerJoined {
            player_id: EntityId(id),
            profile: PlayerProfile {
                name: format!("pilot{}", id),
                is_bot: false,
                ship_type: ShipType::Mohawk,
            },
        }
    }

    #[tokio::test]
    async fn test_snapshot_reflects_commands() {
        let (handle, join) = spawn(ServerConfig::default());

        handle.send(joined(1)).await.unwrap();
        handle.send(joined(2)).await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.players.len(), 2);
        assert!(!snapshot.match_record.is_active);

        handle.shutdown().await.unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn test_welcome_whisper_is_broadcast() {
        let (handle, join) = spawn(ServerConfig::default());
        let mut events = handle.subscribe();

        handle.send(joined(7)).await.unwrap();

        let whisper = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match events.recv().await {
                    Ok(OutboundEvent::WhisperAnnouncement { player_id, .. }) => break player_id,
                    Ok(_) => continue,
                    Err(e) => panic!("event stream closed: {}", e),
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(whisper, EntityId(7));

        handle.shutdown().await.unwrap();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_after_shutdown() {
        let (handle, join) = spawn(ServerConfig::default());

        handle.shutdown().await.unwrap();
        join.await.unwrap();

        assert!(matches!(handle.send(joined(1)).await, Err(RuntimeError::ChannelClosed)));
        assert!(matches!(handle.snapshot().await, Err(RuntimeError::ChannelClosed)));
    }
}
