//! World State Definitions
//!
//! The single registry of players, mobs and the match record.
//! Uses BTreeMap for deterministic iteration order; every component
//! reaches entities through id lookups here.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::hash::{compute_state_hash, StateHash};
use crate::core::rng::DeterministicRng;
use crate::game::events::OutboundEvent;
use crate::game::specs::{
    ProjectileKind, ShipType, MAX_HEALTH, energy_factor, full_health,
};

// =============================================================================
// ENTITY ID
// =============================================================================

/// Identifier shared by players and mobs.
///
/// Id `0` is reserved for the environment (flat damage source).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct EntityId(pub u32);

impl EntityId {
    /// The environment pseudo-entity.
    pub const ENVIRONMENT: EntityId = EntityId(0);

    /// Whether this is the environment id.
    #[inline]
    pub fn is_environment(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// TEAM
// =============================================================================

/// The two sides of every mode. In infection BLUE are survivors and RED
/// are infected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Team {
    /// Blue team.
    Blue,
    /// Red team.
    Red,
}

impl Team {
    /// The other team.
    #[inline]
    pub fn opponent(self) -> Team {
        match self {
            Team::Blue => Team::Red,
            Team::Red => Team::Blue,
        }
    }

    /// Array slot for per-team counters.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Team::Blue => 0,
            Team::Red => 1,
        }
    }
}

// =============================================================================
// PLAYER STATS
// =============================================================================

/// Kill counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KillStats {
    /// Kills since joining.
    pub total: u32,
    /// Kills in the running match.
    pub current_match: u32,
    /// Flag carriers killed.
    pub carriers: u32,
    /// Bots killed.
    pub bots: u32,
    /// Kills this player assisted.
    pub assists: u32,
}

/// Death counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeathStats {
    /// Deaths since joining.
    pub total: u32,
    /// Deaths in the running match.
    pub current_match: u32,
    /// Deaths while carrying the flag.
    pub with_flag: u32,
    /// Deaths to bots.
    pub by_bots: u32,
}

/// Damage counters plus the kill-assist trail.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageStats {
    /// Damage dealt, in hundredths of base projectile damage.
    pub dealt: u64,
    /// Hits landed.
    pub hits: u32,
    /// Damage dealt to bots, same unit as `dealt`.
    pub bots: u64,
    /// Hits landed on bots.
    pub hits_to_bots: u32,
    /// Hits taken.
    pub hits_received: u32,
    /// Hits taken from bots.
    pub hits_by_bots: u32,
    /// Recent damage contributors.
    pub trail: DamageTrail,
}

/// Flag capture counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureStats {
    /// Successful captures.
    pub successful: u32,
    /// Flag pickups.
    pub attempts: u32,
    /// Captures prevented.
    pub saves: u32,
    /// Own flag returned.
    pub recaptures: u32,
}

/// Timestamps in simulation milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerTimes {
    /// Last hit taken.
    pub last_hit: u64,
    /// Last time stealth was broken.
    pub last_stealth: u64,
}

/// Transient flight flags.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaneState {
    /// Invisible to enemies until hit.
    pub stealthed: bool,
    /// Carrying the enemy flag.
    pub flagspeed: bool,
    /// Ship is able to repel.
    pub repel: bool,
}

/// Upgrade levels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Upgrades {
    /// Defense level (0-5).
    pub defense: u8,
    /// Energy level (0-5).
    pub energy: u8,
}

// =============================================================================
// DAMAGE TRAIL
// =============================================================================

/// Bounded history of who damaged a player, as fractions of full health.
///
/// Holds at most [`DamageTrail::CAPACITY`] pairs; the oldest pair is
/// dropped on overflow.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageTrail {
    entries: VecDeque<(EntityId, f64)>,
}

impl DamageTrail {
    /// Maximum pairs kept (30 scalar slots in the flattened form).
    pub const CAPACITY: usize = 15;

    /// Record a contribution.
    pub fn push(&mut self, attacker: EntityId, fraction: f64) {
        self.entries.push_back((attacker, fraction));
        while self.entries.len() > Self::CAPACITY {
            self.entries.pop_front();
        }
    }

    /// Shift the fraction of the most recent entry.
    pub fn adjust_last(&mut self, delta: f64) {
        if let Some((_, fraction)) = self.entries.back_mut() {
            *fraction += delta;
        }
    }

    /// Most recent entry.
    pub fn last(&self) -> Option<(EntityId, f64)> {
        self.entries.back().copied()
    }

    /// Number of pairs held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the trail is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum contributions per attacker, ordered by id.
    pub fn shares(&self) -> BTreeMap<EntityId, f64> {
        let mut shares = BTreeMap::new();
        for (attacker, fraction) in &self.entries {
            *shares.entry(*attacker).or_insert(0.0) += *fraction;
        }
        shares
    }

    /// Forget all contributions.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// Static facts about a joining player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Display name.
    pub name: String,
    /// Controlled by a bot client.
    pub is_bot: bool,
    /// Initial ship.
    pub ship_type: ShipType,
}

/// State of a single player.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    /// Unique player ID
    pub id: EntityId,
    /// Display name
    pub name: String,
    /// Current team
    pub team: Team,
    /// Is the player alive?
    pub alive: bool,
    /// Was the previous life ended by a kill?
    pub last_state_killed: bool,
    /// Normalized health in `[MIN_HEALTH, 1]`
    pub health: f64,
    /// Current ship
    pub ship_type: ShipType,
    /// Upgrade levels
    pub upgrades: Upgrades,
    /// Shield powerup active
    pub shield: bool,
    /// Flight flags
    pub planestate: PlaneState,
    /// Energy regen derived from ship and upgrades
    pub energy_regen: f64,

    /// Kill counters
    pub kills: KillStats,
    /// Death counters
    pub deaths: DeathStats,
    /// Damage counters
    pub damage: DamageStats,
    /// Flag counters
    pub captures: CaptureStats,

    /// Controlled by a bot
    pub is_bot: bool,
    /// Spectating / AFK
    pub spectating: bool,
    /// Waiting for a respawn
    pub pending_respawn: bool,
    /// Timestamps
    pub times: PlayerTimes,
    /// Position
    pub x: i32,
    /// Position
    pub y: i32,
}

impl Player {
    /// Create a new player. Players start alive at full health.
    pub fn new(id: EntityId, profile: PlayerProfile, team: Team) -> Self {
        let ship_type = profile.ship_type;
        Self {
            id,
            name: profile.name,
            team,
            alive: true,
            last_state_killed: false,
            health: MAX_HEALTH,
            ship_type,
            upgrades: Upgrades::default(),
            shield: false,
            planestate: PlaneState {
                repel: ship_type.can_repel(),
                ..PlaneState::default()
            },
            energy_regen: ship_type.spec().energy_regen * energy_factor(0),
            kills: KillStats::default(),
            deaths: DeathStats::default(),
            damage: DamageStats::default(),
            captures: CaptureStats::default(),
            is_bot: profile.is_bot,
            spectating: false,
            pending_respawn: false,
            times: PlayerTimes::default(),
            x: 0,
            y: 0,
        }
    }

    /// Absolute health pool for the current ship and defense level.
    #[inline]
    pub fn full_health(&self) -> f64 {
        full_health(self.ship_type, self.upgrades.defense)
    }

    /// Counts toward its team's living members.
    #[inline]
    pub fn is_living(&self) -> bool {
        self.alive && !self.spectating
    }

    /// Switch ship. Normalized health is kept as is.
    ///
    /// `flat_energy_regen` replaces the ship-derived regen (infected players).
    pub fn set_ship_type(&mut self, ship_type: ShipType, flat_energy_regen: Option<f64>) {
        self.ship_type = ship_type;
        self.energy_regen = flat_energy_regen
            .unwrap_or_else(|| ship_type.spec().energy_regen * energy_factor(self.upgrades.energy));
        self.planestate.repel = ship_type.can_repel();
    }

    /// Zero the per-match counters at match start.
    pub fn reset_for_match(&mut self) {
        self.kills.current_match = 0;
        self.deaths.current_match = 0;
        self.alive = true;
        self.last_state_killed = false;
        self.pending_respawn = true;
    }
}

// =============================================================================
// MOBS
// =============================================================================

/// What a mob is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MobKind {
    /// A missile in flight.
    Missile(ProjectileKind),
    /// A player's own ship registered as a hit source.
    Ship,
}

/// A hit source tracked by the world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mob {
    /// Mob id (shared id space with players)
    pub id: EntityId,
    /// Kind of mob
    pub kind: MobKind,
    /// Firing player, if any
    pub owner: Option<EntityId>,
    /// Damage doubled by a repel
    pub damage_doubled: bool,
    /// Position
    pub x: i32,
    /// Position
    pub y: i32,
}

// =============================================================================
// MATCH RECORD
// =============================================================================

/// The one match record of a server run. Mutated in place, never recreated.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Increments at every match start
    pub sequence: u32,
    /// Is a match being played?
    pub is_active: bool,
    /// Winner of the last finished match
    pub winner: Option<Team>,
    /// Simulation time of the last start
    pub started_at_ms: u64,
    /// Flag captures per team (CTF)
    pub captures: [u32; 2],
}

// =============================================================================
// WORLD STATE
// =============================================================================

/// Complete simulation state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldState {
    /// All players (BTreeMap for deterministic iteration)
    pub players: BTreeMap<EntityId, Player>,
    /// Projectiles and ship hit sources
    pub mobs: BTreeMap<EntityId, Mob>,
    /// Match record
    pub match_record: MatchRecord,
    /// Simulation clock in milliseconds
    pub now_ms: u64,
    /// Server seed, mixed with the match sequence at every start
    pub server_seed: u64,
    /// Deterministic RNG state
    #[serde(skip)]
    pub rng: DeterministicRng,
    /// Events produced since the last drain
    #[serde(skip)]
    pub outbox: Vec<OutboundEvent>,
}

impl WorldState {
    /// Create an empty world with an inactive match 0.
    pub fn new(server_seed: u64) -> Self {
        Self {
            players: BTreeMap::new(),
            mobs: BTreeMap::new(),
            match_record: MatchRecord::default(),
            now_ms: 0,
            server_seed,
            rng: DeterministicRng::for_match(server_seed, 0),
            outbox: Vec::new(),
        }
    }

    /// Get a player by ID.
    pub fn player(&self, id: EntityId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Get a player mutably by ID.
    pub fn player_mut(&mut self, id: EntityId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    /// Whether a player with this id is connected.
    pub fn has_player(&self, id: EntityId) -> bool {
        self.players.contains_key(&id)
    }

    /// Living members of a team.
    pub fn living_count(&self, team: Team) -> usize {
        self.players
            .values()
            .filter(|p| p.team == team && p.is_living())
            .count()
    }

    /// Members of a team, counting only bots or only humans.
    pub fn member_count(&self, team: Team, bots: bool) -> usize {
        self.players
            .values()
            .filter(|p| p.team == team && p.is_bot == bots)
            .count()
    }

    /// Register a missile fired by `owner`. Re-launching an id replaces it.
    pub fn launch_projectile(&mut self, id: EntityId, owner: EntityId, kind: ProjectileKind) {
        self.mobs.insert(id, Mob {
            id,
            kind: MobKind::Missile(kind),
            owner: Some(owner),
            damage_doubled: false,
            x: 0,
            y: 0,
        });
    }

    /// Register a player's ship as an ownerless hit source.
    pub fn register_ship(&mut self, id: EntityId) {
        self.mobs.insert(id, Mob {
            id,
            kind: MobKind::Ship,
            owner: None,
            damage_doubled: false,
            x: 0,
            y: 0,
        });
    }

    /// Mark a missile as repelled. Returns `false` for unknown ids.
    pub fn repel_projectile(&mut self, id: EntityId) -> bool {
        match self.mobs.get_mut(&id) {
            Some(mob) if matches!(mob.kind, MobKind::Missile(_)) => {
                mob.damage_doubled = true;
                true
            }
            _ => false,
        }
    }

    /// Drop a mob. Returns `false` for unknown ids.
    pub fn remove_mob(&mut self, id: EntityId) -> bool {
        self.mobs.remove(&id).is_some()
    }

    /// Player display name, or the id when unknown.
    pub fn display_name(&self, id: EntityId) -> String {
        self.player(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| format!("#{}", id))
    }

    /// Push an outbound event.
    pub fn emit(&mut self, event: OutboundEvent) {
        self.outbox.push(event);
    }

    /// Take pending outbound events (consumes them).
    pub fn take_events(&mut self) -> Vec<OutboundEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Digest of everything the simulation decides: match record,
    /// players and mobs in id order.
    pub fn compute_hash(&self) -> StateHash {
        let record = &self.match_record;

        compute_state_hash(record.sequence, self.now_ms, |h| {
            h.update_bool(record.is_active);
            h.update_u8(record.winner.map_or(0, |team| team.index() as u8 + 1));
            h.update_u32(record.captures[0]);
            h.update_u32(record.captures[1]);

            h.update_u32(self.players.len() as u32);
            for player in self.players.values() {
                h.update_u32(player.id.0);
                h.update_u8(player.team.index() as u8);
                h.update_bool(player.alive);
                h.update_f64(player.health);
                h.update_u8(player.ship_type as u8);
                h.update_u32(player.kills.total);
                h.update_u32(player.kills.assists);
                h.update_u32(player.deaths.total);
                h.update_u64(player.damage.dealt);
                h.update_i32(player.x);
                h.update_i32(player.y);
            }

            h.update_u32(self.mobs.len() as u32);
            for mob in self.mobs.values() {
                h.update_u32(mob.id.0);
                h.update_u32(mob.owner.map_or(0, |owner| owner.0));
                h.update_bool(mob.damage_doubled);
            }
        })
    }

    /// Read-only copy for other subsystems.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            match_record: self.match_record.clone(),
            now_ms: self.now_ms,
            players: self.players.values().cloned().collect(),
        }
    }
}

/// Detached copy of the world handed to readers outside the simulation task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Match record at snapshot time
    pub match_record: MatchRecord,
    /// Simulation clock at snapshot time
    pub now_ms: u64,
    /// Players in id order
    pub players: Vec<Player>,
}

impl WorldSnapshot {
    /// Find a player in the snapshot.
    pub fn player(&self, id: EntityId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }
}

// =============================================================================
// TESTS
// =============================================================================
