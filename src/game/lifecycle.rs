//! Match Lifecycle
//!
//! One state machine for every mode: count down while waiting, start the
//! match, watch kills and flag captures for the end condition, and run
//! the delayed conversions, respawns and join announcements.
//!
//! ```text
//!   Waiting{timeout} --(timeout >= start_at)--> Active
//!   Active --(end condition)--> Waiting{timeout kept}
//! ```
//!
//! `timeout` only counts while waiting and is reset when a match starts.

use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::core::rng::DeterministicRng;
use crate::core::scheduler::Scheduler;
use crate::game::balance;
use crate::game::events::{
    Event, EventQueue, FlagEventKind, Kill, OutboundEvent, Severity, TaskKey, TaskPayload,
    TaskPurpose,
};
use crate::game::mode::{
    EndCondition, MilestoneAction, ModePolicy, WinAction, JOIN_ANNOUNCE_DELAY_MS, WIN_ANNOUNCE_MS,
};
use crate::game::state::{EntityId, Player, PlayerProfile, Team, WorldState};

/// Pending delayed work of one simulation.
pub type TaskTable = Scheduler<TaskKey, TaskPayload>;

/// Display time of the match start banner.
pub const START_ANNOUNCE_MS: u32 = 5000;

/// Coarse state of the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPhase {
    /// Counting towards the next start.
    Waiting {
        /// Seconds waited so far
        timeout: u32,
    },
    /// A match is being played.
    Active,
}

/// Match state machine parameterized by a mode policy.
#[derive(Clone, Debug)]
pub struct MatchStateMachine {
    /// Seconds spent waiting since the last start
    pub timeout: u32,
    /// Mode behavior
    pub policy: ModePolicy,
}

impl MatchStateMachine {
    /// Waiting state with nothing counted yet.
    pub fn new(policy: ModePolicy) -> Self {
        Self { timeout: 0, policy }
    }

    /// Current phase.
    pub fn phase(&self, world: &WorldState) -> MatchPhase {
        if world.match_record.is_active {
            MatchPhase::Active
        } else {
            MatchPhase::Waiting {
                timeout: self.timeout,
            }
        }
    }

    // =========================================================================
    // CLOCK
    // =========================================================================

    /// One second of wall clock.
    pub fn on_second(&mut self, world: &mut WorldState, queue: &mut EventQueue) {
        if world.match_record.is_active {
            return;
        }

        self.timeout += 1;
        let second = self.timeout;

        for action in self.policy.countdown.actions_at(second) {
            match action {
                MilestoneAction::Announce { text, severity, duration_ms } => {
                    world.emit(OutboundEvent::ChatAnnouncement {
                        text: text.clone(),
                        severity: *severity,
                        duration_ms: *duration_ms,
                    });
                }
                MilestoneAction::Reshuffle => {
                    balance::reshuffle(world);
                }
            }
        }

        if second >= self.policy.countdown.start_at {
            self.start_match(world, queue);
        }
    }

    fn start_match(&mut self, world: &mut WorldState, queue: &mut EventQueue) {
        world.emit(OutboundEvent::ChatAnnouncement {
            text: "Game starting!".to_string(),
            severity: Severity::Info,
            duration_ms: START_ANNOUNCE_MS,
        });

        let now = world.now_ms;
        let record = &mut world.match_record;
        record.sequence += 1;
        record.is_active = true;
        record.winner = None;
        record.started_at_ms = now;
        record.captures = [0, 0];
        let sequence = record.sequence;

        world.rng = DeterministicRng::for_match(world.server_seed, sequence);
        self.timeout = 0;

        for player in world.players.values_mut() {
            player.reset_for_match();
            queue.push(Event::RespawnRequested(player.id));
        }

        world.emit(OutboundEvent::MatchStarted);
        world.emit(OutboundEvent::ScoreboardForceRefresh);

        info!(
            sequence,
            players = world.players.len(),
            "Match started"
        );
    }

    // =========================================================================
    // KILLS
    // =========================================================================

    /// React to an applied kill: end the match or schedule the follow-up.
    pub fn on_kill(&mut self, world: &mut WorldState, tasks: &mut TaskTable, kill: Kill) {
        if !world.match_record.is_active {
            return;
        }

        let victim_team = match world.player(kill.victim_id) {
            Some(victim) => victim.team,
            None => {
                debug!(victim_id = %kill.victim_id, "Kill for unknown player ignored");
                return;
            }
        };

        if self.policy.end_condition == EndCondition::TeamEliminated {
            let blue = world.living_count(Team::Blue);
            let red = world.living_count(Team::Red);

            if blue == 0 || red == 0 {
                let winner = if blue > 0 {
                    Team::Blue
                } else if red > 0 {
                    Team::Red
                } else {
                    self.policy.default_winner
                };
                self.end_match(world, tasks, winner, &[kill.victim_id, kill.aggressor_id]);
                return;
            }
        }

        let sequence = world.match_record.sequence;
        let now = world.now_ms;

        if let Some(rule) = self.policy.conversion {
            if victim_team == rule.from {
                tasks.schedule(
                    TaskKey::new(kill.victim_id, TaskPurpose::Conversion),
                    now + rule.delay_ms,
                    TaskPayload::Conversion {
                        aggressor_id: kill.aggressor_id,
                        sequence,
                    },
                );
                if let Some(victim) = world.player_mut(kill.victim_id) {
                    victim.pending_respawn = true;
                }
                debug!(victim_id = %kill.victim_id, "Conversion scheduled");
            }
            return;
        }

        if let Some(delay) = self.policy.respawn_delay_ms {
            tasks.schedule(
                TaskKey::new(kill.victim_id, TaskPurpose::Respawn),
                now + delay,
                TaskPayload::Respawn { sequence },
            );
            if let Some(victim) = world.player_mut(kill.victim_id) {
                victim.pending_respawn = true;
            }
        }
    }

    /// Finish the running match with `winner`.
    ///
    /// `involved` players get a post-match reset signal. No-op while
    /// inactive.
    pub fn end_match(
        &mut self,
        world: &mut WorldState,
        tasks: &mut TaskTable,
        winner: Team,
        involved: &[EntityId],
    ) {
        if !world.match_record.is_active {
            return;
        }

        world.match_record.is_active = false;
        world.match_record.winner = Some(winner);

        let text = format!("Team {} wins!", self.policy.team_label(winner));
        world.emit(OutboundEvent::ChatAnnouncement {
            text: text.clone(),
            severity: Severity::Info,
            duration_ms: WIN_ANNOUNCE_MS,
        });
        world.emit(OutboundEvent::PublicChat { text });

        let mut reset: Vec<EntityId> = Vec::with_capacity(involved.len());
        for id in involved {
            if world.has_player(*id) && !reset.contains(id) {
                reset.push(*id);
            }
        }
        for player_id in reset {
            world.emit(OutboundEvent::PostMatchReset { player_id });
        }

        world.emit(OutboundEvent::MatchEnded);

        let cancelled = tasks.cancel_where(|key| {
            matches!(key.purpose, TaskPurpose::Conversion | TaskPurpose::Respawn)
        });

        if self.policy.win_action == WinAction::ResetFlags {
            world.match_record.captures = [0, 0];
        }

        info!(
            sequence = world.match_record.sequence,
            winner = ?winner,
            cancelled,
            "Match ended"
        );
    }

    // =========================================================================
    // FLAGS
    // =========================================================================

    /// Flag interaction from the CTF flag layer.
    pub fn on_flag(
        &mut self,
        world: &mut WorldState,
        tasks: &mut TaskTable,
        player_id: EntityId,
        kind: FlagEventKind,
    ) {
        let team = match world.player_mut(player_id) {
            Some(player) => {
                match kind {
                    FlagEventKind::Taken => {
                        player.captures.attempts += 1;
                        player.planestate.flagspeed = true;
                    }
                    FlagEventKind::Captured => {
                        player.captures.successful += 1;
                        player.planestate.flagspeed = false;
                    }
                    FlagEventKind::Returned => player.captures.recaptures += 1,
                    FlagEventKind::Saved => player.captures.saves += 1,
                }
                player.team
            }
            None => {
                debug!(player_id = %player_id, "Flag event for unknown player ignored");
                return;
            }
        };

        if kind != FlagEventKind::Captured || !world.match_record.is_active {
            return;
        }

        let captures = &mut world.match_record.captures[team.index()];
        *captures += 1;
        let total = *captures;

        if let EndCondition::CaptureLimit(limit) = self.policy.end_condition {
            if total >= limit {
                self.end_match(world, tasks, team, &[player_id]);
            }
        }
    }

    // =========================================================================
    // JOIN / LEAVE
    // =========================================================================

    /// Register a joining player and schedule its welcome.
    pub fn on_join(
        &mut self,
        world: &mut WorldState,
        tasks: &mut TaskTable,
        player_id: EntityId,
        profile: PlayerProfile,
    ) {
        if player_id.is_environment() {
            warn!("Join with reserved id 0 ignored");
            return;
        }

        if world.has_player(player_id) {
            debug!(player_id = %player_id, "Reconnect, keeping player state");
        } else {
            let team = balance::assign_join_team(world, player_id, profile.is_bot);
            let mut player = Player::new(player_id, profile, team);
            let ship_type = player.ship_type;
            player.set_ship_type(ship_type, self.policy.flat_energy_regen(team));
            world.players.insert(player_id, player);

            info!(player_id = %player_id, team = ?team, "Player joined");
        }

        tasks.schedule(
            TaskKey::new(player_id, TaskPurpose::JoinAnnouncement),
            world.now_ms + JOIN_ANNOUNCE_DELAY_MS,
            TaskPayload::JoinAnnouncement,
        );
    }

    /// Remove a player and everything keyed by it.
    pub fn on_leave(&mut self, world: &mut WorldState, tasks: &mut TaskTable, player_id: EntityId) {
        if world.players.remove(&player_id).is_none() {
            debug!(player_id = %player_id, "Leave for unknown player ignored");
            return;
        }

        world.remove_mob(player_id);
        let cancelled = tasks.cancel_where(|key| key.entity == player_id);

        info!(player_id = %player_id, cancelled, "Player left");
    }

    // =========================================================================
    // DELAYED TASKS
    // =========================================================================

    /// Run a task that reached its deadline. Every body re-checks the
    /// state that justified it.
    pub fn on_task(
        &mut self,
        world: &mut WorldState,
        queue: &mut EventQueue,
        key: TaskKey,
        payload: TaskPayload,
    ) {
        match payload {
            TaskPayload::JoinAnnouncement => self.announce_match_state(world, key.entity),
            TaskPayload::Conversion { aggressor_id, sequence } => {
                self.convert(world, queue, key.entity, aggressor_id, sequence)
            }
            TaskPayload::Respawn { sequence } => {
                let due = world.match_record.is_active
                    && world.match_record.sequence == sequence
                    && world.player(key.entity).map_or(false, |p| !p.alive);
                if due {
                    queue.push(Event::RespawnRequested(key.entity));
                } else {
                    debug!(player_id = %key.entity, "Stale respawn dropped");
                }
            }
        }
    }

    fn announce_match_state(&self, world: &mut WorldState, player_id: EntityId) {
        if !world.has_player(player_id) {
            return;
        }

        world.emit(OutboundEvent::WhisperAnnouncement {
            player_id,
            text: self.policy.welcome.to_string(),
        });

        let state = if world.match_record.is_active {
            "A match is in progress.".to_string()
        } else {
            let left = self.policy.countdown.start_at.saturating_sub(self.timeout);
            format!("Next match starts in {} seconds.", left)
        };
        world.emit(OutboundEvent::WhisperAnnouncement {
            player_id,
            text: state,
        });

        // Ownerless ship mob: hits sourced by this id resolve as melee
        if self.policy.melee_hits {
            world.register_ship(player_id);
        }
    }

    fn convert(
        &self,
        world: &mut WorldState,
        queue: &mut EventQueue,
        victim_id: EntityId,
        aggressor_id: EntityId,
        sequence: u32,
    ) {
        let rule = match self.policy.conversion {
            Some(rule) => rule,
            None => return,
        };

        let valid = world.match_record.is_active
            && world.match_record.sequence == sequence
            && world.player(victim_id).map_or(false, |p| p.team == rule.from);
        if !valid {
            debug!(victim_id = %victim_id, "Stale conversion dropped");
            return;
        }

        let text = format!(
            "{} has infected {}!",
            world.display_name(aggressor_id),
            world.display_name(victim_id)
        );

        let flat_regen = self.policy.flat_energy_regen(rule.to);
        if let Some(victim) = world.player_mut(victim_id) {
            victim.team = rule.to;
            victim.pending_respawn = true;
            let ship_type = victim.ship_type;
            victim.set_ship_type(ship_type, flat_regen);
        }

        world.emit(OutboundEvent::PublicChat { text });
        world.emit(OutboundEvent::TeamChanged {
            player_ids: vec![victim_id],
        });
        queue.push(Event::RespawnRequested(victim_id));

        info!(victim_id = %victim_id, aggressor_id = %aggressor_id, "Player converted");
    }
}

// =============================================================================
// TESTS
// =============================================================================
