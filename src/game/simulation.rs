//! Simulation Owner
//!
//! Owns the world, the state machine and the task table of one match
//! server. Every mutation goes through [`Simulation::dispatch`], which
//! drains a single FIFO queue; handlers append follow-ups to the back.

use tracing::{debug, trace, warn};

use crate::config::ServerConfig;
use crate::game::balance;
use crate::game::combat::{self, CombatSettings};
use crate::game::events::{Event, EventQueue, InboundEvent, OutboundEvent};
use crate::game::lifecycle::{MatchPhase, MatchStateMachine, TaskTable};
use crate::game::mode::ModePolicy;
use crate::game::spawn;
use crate::game::specs::MAX_HEALTH;
use crate::game::state::{EntityId, MobKind, WorldState, WorldSnapshot};

/// Single owner of all match state.
pub struct Simulation {
    world: WorldState,
    machine: MatchStateMachine,
    tasks: TaskTable,
    queue: EventQueue,
    combat: CombatSettings,
    config: ServerConfig,
}

impl Simulation {
    /// Empty server waiting for players.
    pub fn new(config: ServerConfig) -> Self {
        let policy = ModePolicy::from_config(&config);
        let combat = CombatSettings {
            kill_assists: config.kill_assists,
            melee_hits: policy.melee_hits,
        };

        Self {
            world: WorldState::new(config.rng_seed),
            machine: MatchStateMachine::new(policy),
            tasks: TaskTable::new(),
            queue: EventQueue::default(),
            combat,
            config,
        }
    }

    /// Feed one inbound event and process everything it causes.
    pub fn handle(&mut self, event: InboundEvent) {
        self.queue.push(Event::Inbound(event));
        self.drain();
    }

    /// Move the clock forward, firing due tasks at their deadlines.
    pub fn advance_to(&mut self, now_ms: u64) {
        while let Some(deadline) = self.tasks.next_deadline() {
            if deadline > now_ms {
                break;
            }
            self.world.now_ms = self.world.now_ms.max(deadline);

            while let Some((key, payload)) = self.tasks.pop_due(self.world.now_ms) {
                self.queue.push(Event::TaskDue(key, payload));
            }
            self.drain();
        }

        self.world.now_ms = self.world.now_ms.max(now_ms);
    }

    /// Take the outbound events produced so far.
    pub fn take_events(&mut self) -> Vec<OutboundEvent> {
        self.world.take_events()
    }

    /// Detached copy of the world.
    pub fn snapshot(&self) -> WorldSnapshot {
        self.world.snapshot()
    }

    /// Read access to the world.
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Current match phase.
    pub fn phase(&self) -> MatchPhase {
        self.machine.phase(&self.world)
    }

    /// Configuration this simulation was built from.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of pending delayed tasks.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    fn drain(&mut self) {
        while let Some(event) = self.queue.pop() {
            self.dispatch(event);
        }
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Route one event to its handler.
    fn dispatch(&mut self, event: Event) {
        trace!(event = ?event, "Dispatch");

        match event {
            Event::Inbound(inbound) => self.on_inbound(inbound),
            Event::Killed(kill) => {
                if !self.world.match_record.is_active {
                    debug!(victim_id = %kill.victim_id, "Kill outside a match ignored");
                    return;
                }
                if combat::apply_kill(&mut self.world, kill, self.combat.kill_assists) {
                    self.machine.on_kill(&mut self.world, &mut self.tasks, kill);
                }
            }
            Event::RespawnRequested(player_id) => self.respawn(player_id),
            Event::TaskDue(key, payload) => {
                self.machine.on_task(&mut self.world, &mut self.queue, key, payload)
            }
        }
    }

    fn on_inbound(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::PlayerJoined { player_id, profile } => {
                self.machine.on_join(&mut self.world, &mut self.tasks, player_id, profile)
            }
            InboundEvent::PlayerLeft { player_id } => {
                self.machine.on_leave(&mut self.world, &mut self.tasks, player_id)
            }
            InboundEvent::ClockSecondElapsed => {
                self.machine.on_second(&mut self.world, &mut self.queue)
            }
            InboundEvent::HitOccurred { victim_id, source_id, flat_damage } => {
                let kill = combat::resolve_hit(
                    &mut self.world,
                    &self.combat,
                    victim_id,
                    source_id,
                    flat_damage,
                );
                if let Some(kill) = kill {
                    self.queue.push(Event::Killed(kill));
                }
            }
            InboundEvent::ReshuffleRequested => {
                balance::reshuffle(&mut self.world);
            }
            InboundEvent::ShipTypeChanged { player_id, ship_type } => {
                let policy = &self.machine.policy;
                match self.world.player_mut(player_id) {
                    Some(player) => {
                        let flat_regen = policy.flat_energy_regen(player.team);
                        player.set_ship_type(ship_type, flat_regen);
                        self.world.emit(OutboundEvent::PlayerUpdated { player_id });
                    }
                    None => debug!(player_id = %player_id, "Ship change for unknown player ignored"),
                }
            }
            InboundEvent::SpectateChanged { player_id, spectating } => {
                match self.world.player_mut(player_id) {
                    Some(player) => player.spectating = spectating,
                    None => debug!(player_id = %player_id, "Spectate change for unknown player ignored"),
                }
            }
            InboundEvent::ShieldChanged { player_id, active } => {
                match self.world.player_mut(player_id) {
                    Some(player) => player.shield = active,
                    None => debug!(player_id = %player_id, "Shield change for unknown player ignored"),
                }
            }
            InboundEvent::StealthChanged { player_id, stealthed } => {
                match self.world.player_mut(player_id) {
                    Some(player) => player.planestate.stealthed = stealthed,
                    None => debug!(player_id = %player_id, "Stealth change for unknown player ignored"),
                }
            }
            InboundEvent::ProjectileLaunched { projectile_id, owner_id, kind } => {
                if projectile_id.is_environment() || self.world.has_player(projectile_id) {
                    warn!(projectile_id = %projectile_id, "Projectile id collides with a player");
                } else if !self.world.has_player(owner_id) {
                    debug!(owner_id = %owner_id, "Projectile from unknown owner ignored");
                } else {
                    self.world.launch_projectile(projectile_id, owner_id, kind);
                }
            }
            InboundEvent::ProjectileRepelled { projectile_id } => {
                if !self.world.repel_projectile(projectile_id) {
                    debug!(projectile_id = %projectile_id, "Repel of unknown projectile ignored");
                }
            }
            InboundEvent::ProjectileExpired { projectile_id } => {
                let is_missile = self
                    .world
                    .mobs
                    .get(&projectile_id)
                    .map_or(false, |mob| matches!(mob.kind, MobKind::Missile(_)));
                if is_missile {
                    self.world.remove_mob(projectile_id);
                } else {
                    debug!(projectile_id = %projectile_id, "Expiry of unknown projectile ignored");
                }
            }
            InboundEvent::FlagEvent { player_id, kind } => {
                self.machine.on_flag(&mut self.world, &mut self.tasks, player_id, kind)
            }
        }
    }

    /// Put a player back into play at a fresh spawn point.
    fn respawn(&mut self, player_id: EntityId) {
        let WorldState { players, rng, .. } = &mut self.world;

        let player = match players.get_mut(&player_id) {
            Some(player) => player,
            None => {
                debug!(player_id = %player_id, "Respawn for unknown player ignored");
                return;
            }
        };

        if player.spectating {
            player.pending_respawn = false;
            return;
        }

        let (x, y) = spawn::assign_spawn(player, self.config.extra_spawns, rng);
        player.alive = true;
        player.health = MAX_HEALTH;
        player.pending_respawn = false;
        player.planestate.stealthed = false;
        player.planestate.flagspeed = false;
        player.damage.trail.clear();

        self.world.emit(OutboundEvent::PlayerRespawned { player_id, x, y });
    }
}

// =============================================================================
// TESTS
// =============================================================================
