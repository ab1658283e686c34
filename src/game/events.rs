//! Game Events
//!
//! Inbound events arrive from the I/O layers, internal events are queued
//! by handlers, outbound events are consumed by broadcast and messaging.

use std::collections::VecDeque;
use serde::{Serialize, Deserialize};

use crate::game::specs::{ProjectileKind, ShipType};
use crate::game::state::{EntityId, PlayerProfile};

// =============================================================================
// INBOUND
// =============================================================================

/// Flag interaction reported by the CTF flag layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlagEventKind {
    /// Picked up the enemy flag.
    Taken,
    /// Brought the enemy flag home.
    Captured,
    /// Returned the own flag.
    Returned,
    /// Stopped a capture.
    Saved,
}

/// Semantic events delivered to the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InboundEvent {
    /// New player or reconnect.
    PlayerJoined {
        player_id: EntityId,
        profile: PlayerProfile,
    },
    /// Player disconnected.
    PlayerLeft {
        player_id: EntityId,
    },
    /// One second of wall clock passed.
    ClockSecondElapsed,
    /// Something hit a player. `source_id` 0 is environmental damage.
    HitOccurred {
        victim_id: EntityId,
        source_id: EntityId,
        flat_damage: f64,
    },
    /// Rebalance teams now.
    ReshuffleRequested,
    /// Player switched ship.
    ShipTypeChanged {
        player_id: EntityId,
        ship_type: ShipType,
    },
    /// Player entered or left spectate.
    SpectateChanged {
        player_id: EntityId,
        spectating: bool,
    },
    /// Shield powerup gained or expired.
    ShieldChanged {
        player_id: EntityId,
        active: bool,
    },
    /// Prowler stealth toggled.
    StealthChanged {
        player_id: EntityId,
        stealthed: bool,
    },
    /// A missile entered the world.
    ProjectileLaunched {
        projectile_id: EntityId,
        owner_id: EntityId,
        kind: ProjectileKind,
    },
    /// A missile was repelled and now deals double damage.
    ProjectileRepelled {
        projectile_id: EntityId,
    },
    /// A missile left the world.
    ProjectileExpired {
        projectile_id: EntityId,
    },
    /// Flag interaction.
    FlagEvent {
        player_id: EntityId,
        kind: FlagEventKind,
    },
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Announcement styling for the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Countdown style.
    Alert,
    /// Informational banner.
    Info,
}

/// Semantic events produced by the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OutboundEvent {
    /// A player died.
    PlayerKilled {
        aggressor_id: EntityId,
        victim_id: EntityId,
        melee: bool,
    },
    /// A hit landed.
    PlayerHit {
        source_id: EntityId,
        victim_ids: Vec<EntityId>,
    },
    /// Players switched team.
    TeamChanged {
        player_ids: Vec<EntityId>,
    },
    /// Match went active.
    MatchStarted,
    /// Match finished.
    MatchEnded,
    /// Clients should refetch the scoreboard.
    ScoreboardForceRefresh,
    /// Banner for everyone.
    ChatAnnouncement {
        text: String,
        severity: Severity,
        duration_ms: u32,
    },
    /// Private server message.
    WhisperAnnouncement {
        player_id: EntityId,
        text: String,
    },
    /// Server line in public chat.
    PublicChat {
        text: String,
    },
    /// A hit revealed a stealthed player.
    StealthBroken {
        player_id: EntityId,
    },
    /// Player state needs a resync.
    PlayerUpdated {
        player_id: EntityId,
    },
    /// Player is back in play.
    PlayerRespawned {
        player_id: EntityId,
        x: i32,
        y: i32,
    },
    /// Clear end-of-match overlays for a player.
    PostMatchReset {
        player_id: EntityId,
    },
}

// =============================================================================
// DELAYED TASKS
// =============================================================================

/// Why a task was scheduled. One pending task per (entity, purpose).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskPurpose {
    /// Whisper the match state to a new player.
    JoinAnnouncement,
    /// Move a killed player to the converting team.
    Conversion,
    /// Bring a dead player back.
    Respawn,
}

/// Scheduler key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    /// Entity the task acts on
    pub entity: EntityId,
    /// Purpose
    pub purpose: TaskPurpose,
}

impl TaskKey {
    /// Build a key.
    pub const fn new(entity: EntityId, purpose: TaskPurpose) -> Self {
        Self { entity, purpose }
    }
}

/// Data captured when a task was scheduled, re-checked when it fires.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum TaskPayload {
    /// Welcome whisper.
    JoinAnnouncement,
    /// Conversion after a kill in match `sequence`.
    Conversion {
        aggressor_id: EntityId,
        sequence: u32,
    },
    /// Respawn after a death in match `sequence`.
    Respawn {
        sequence: u32,
    },
}

// =============================================================================
// INTERNAL QUEUE
// =============================================================================

/// A kill detected by the combat resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kill {
    /// Killer (0 for environment)
    pub aggressor_id: EntityId,
    /// Victim
    pub victim_id: EntityId,
    /// Melee (infection ram) kill
    pub melee: bool,
}

/// Everything the dispatcher can process.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// From the I/O layers.
    Inbound(InboundEvent),
    /// A lethal hit.
    Killed(Kill),
    /// Respawn a player now.
    RespawnRequested(EntityId),
    /// A scheduled task reached its deadline.
    TaskDue(TaskKey, TaskPayload),
}

/// FIFO queue shared by all handlers of one simulation.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<Event>,
}

impl EventQueue {
    /// Append an event behind everything already queued.
    pub fn push(&mut self, event: Event) {
        self.events.push_back(event);
    }

    /// Take the oldest event.
    pub fn pop(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
