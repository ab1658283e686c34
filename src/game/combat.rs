//! Combat Resolution
//!
//! Applies hits to players and keeps the kill bookkeeping.
//!
//! ## Damage sources
//!
//! - id `0`: environmental damage, amount supplied by the caller
//! - ownerless ship mob under a melee mode: infected ram, fixed damage
//! - missile: base damage of its kind, doubled after a repel
//!
//! Health is stored normalized. Damage is applied against the absolute
//! pool (`1 / damage_factor * defense_factor`) and divided back.

use tracing::debug;

use crate::game::events::{Kill, OutboundEvent};
use crate::game::specs::{MAX_HEALTH, MELEE_DAMAGE, MIN_HEALTH};
use crate::game::state::{EntityId, MobKind, Player, WorldState};

/// Switches the resolver reads from configuration and mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CombatSettings {
    /// Track damage contributors per victim
    pub kill_assists: bool,
    /// Ownerless mobs are melee hits
    pub melee_hits: bool,
}

/// Where a hit came from, resolved from the source id.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DamageSource {
    /// Environmental damage.
    Environment { damage: f64 },
    /// Infected ship ramming.
    Melee { aggressor_id: EntityId },
    /// A missile.
    Ranged {
        owner_id: Option<EntityId>,
        base_damage: f64,
        doubled: bool,
    },
}

impl DamageSource {
    /// Damage this source deals.
    pub fn damage(&self) -> f64 {
        match *self {
            DamageSource::Environment { damage } => damage,
            DamageSource::Melee { .. } => MELEE_DAMAGE,
            DamageSource::Ranged { base_damage, doubled, .. } => {
                if doubled {
                    base_damage * 2.0
                } else {
                    base_damage
                }
            }
        }
    }

    /// Player credited with the damage.
    pub fn aggressor(&self) -> EntityId {
        match *self {
            DamageSource::Environment { .. } => EntityId::ENVIRONMENT,
            DamageSource::Melee { aggressor_id } => aggressor_id,
            DamageSource::Ranged { owner_id, .. } => owner_id.unwrap_or(EntityId::ENVIRONMENT),
        }
    }

    /// Shields stop everything except the environment.
    pub fn blocked_by_shield(&self) -> bool {
        !matches!(self, DamageSource::Environment { .. })
    }

    /// Melee hits stay out of the assist trail and damage statistics.
    pub fn tracked(&self) -> bool {
        !matches!(self, DamageSource::Melee { .. })
    }
}

/// Resolve a source id against the world.
///
/// Returns `None` for ids that name nothing able to deal damage.
pub fn classify_source(
    world: &WorldState,
    source_id: EntityId,
    flat_damage: f64,
    melee_hits: bool,
) -> Option<DamageSource> {
    if source_id.is_environment() {
        let damage = if flat_damage.is_finite() { flat_damage.max(0.0) } else { 0.0 };
        return Some(DamageSource::Environment { damage });
    }

    let mob = world.mobs.get(&source_id)?;

    match (mob.kind, mob.owner) {
        (MobKind::Ship, None) if melee_hits => {
            if world.has_player(source_id) {
                Some(DamageSource::Melee { aggressor_id: source_id })
            } else {
                None
            }
        }
        (MobKind::Ship, _) => None,
        (MobKind::Missile(kind), owner_id) => Some(DamageSource::Ranged {
            owner_id,
            base_damage: kind.damage(),
            doubled: mob.damage_doubled,
        }),
    }
}

/// Outcome of pushing damage into a health pool.
struct DamageApplied {
    lethal: bool,
}

/// Subtract `damage` from the victim's absolute pool and store the
/// normalized result.
fn apply_damage(victim: &mut Player, aggressor: EntityId, damage: f64, track: bool) -> DamageApplied {
    let full = victim.full_health();
    let remaining = full * victim.health - damage;

    if track {
        victim.damage.trail.push(aggressor, damage / full);
    }

    if remaining <= MIN_HEALTH {
        if track {
            // Cap the lethal entry at the health that was actually left
            victim.damage.trail.adjust_last(remaining / full);
        }
        victim.health = MIN_HEALTH;
        DamageApplied { lethal: true }
    } else {
        victim.health = (remaining / full).clamp(MIN_HEALTH, MAX_HEALTH);
        DamageApplied { lethal: false }
    }
}

/// Apply a hit to `victim_id`.
///
/// Returns the kill when the hit was lethal. Emits `StealthBroken`,
/// `PlayerUpdated` and `PlayerHit` into the world outbox.
pub fn resolve_hit(
    world: &mut WorldState,
    settings: &CombatSettings,
    victim_id: EntityId,
    source_id: EntityId,
    flat_damage: f64,
) -> Option<Kill> {
    if !world.match_record.is_active {
        return None;
    }

    let (victim_alive, victim_is_bot, victim_shielded) = match world.player(victim_id) {
        Some(victim) => (victim.alive, victim.is_bot, victim.shield),
        None => {
            debug!(victim_id = %victim_id, "Hit on unknown player ignored");
            return None;
        }
    };

    if !victim_alive {
        debug!(victim_id = %victim_id, "Hit on dead player ignored");
        return None;
    }

    let source = match classify_source(world, source_id, flat_damage, settings.melee_hits) {
        Some(source) => source,
        None => {
            debug!(source_id = %source_id, "Hit from unknown source ignored");
            return None;
        }
    };

    if victim_shielded && source.blocked_by_shield() {
        return None;
    }

    let now = world.now_ms;
    let aggressor = source.aggressor();

    // Ranged hits credit the owner while it is still connected
    if let DamageSource::Ranged { owner_id: Some(owner_id), base_damage, .. } = source {
        let owner_is_bot = match world.player_mut(owner_id) {
            Some(owner) => {
                let tracking = (base_damage * 100.0).round() as u64;
                owner.damage.dealt += tracking;
                owner.damage.hits += 1;
                if victim_is_bot {
                    owner.damage.bots += tracking;
                    owner.damage.hits_to_bots += 1;
                }
                Some(owner.is_bot)
            }
            None => None,
        };

        if owner_is_bot == Some(true) {
            if let Some(victim) = world.player_mut(victim_id) {
                victim.damage.hits_by_bots += 1;
            }
        }
    }

    let victim = world.player_mut(victim_id)?;

    let broke_stealth = victim.planestate.stealthed;
    if broke_stealth {
        victim.planestate.stealthed = false;
        victim.times.last_stealth = now;
    }

    if !matches!(source, DamageSource::Environment { .. }) {
        victim.times.last_hit = now;
        victim.damage.hits_received += 1;
    }

    let track = settings.kill_assists && source.tracked();
    let applied = apply_damage(victim, aggressor, source.damage(), track);

    if broke_stealth {
        world.emit(OutboundEvent::StealthBroken { player_id: victim_id });
        world.emit(OutboundEvent::PlayerUpdated { player_id: victim_id });
    }

    world.emit(OutboundEvent::PlayerHit {
        source_id,
        victim_ids: vec![victim_id],
    });

    if applied.lethal {
        Some(Kill {
            aggressor_id: aggressor,
            victim_id,
            melee: matches!(source, DamageSource::Melee { .. }),
        })
    } else {
        None
    }
}

/// Record a kill: victim down, counters, assist credit, `PlayerKilled`.
///
/// Returns `false` when the victim is unknown or already dead.
pub fn apply_kill(world: &mut WorldState, kill: Kill, kill_assists: bool) -> bool {
    let Kill { aggressor_id, victim_id, melee } = kill;

    let (victim_is_bot, carried_flag, shares) = match world.player_mut(victim_id) {
        Some(victim) if victim.alive => {
            victim.alive = false;
            victim.last_state_killed = true;
            victim.deaths.total += 1;
            victim.deaths.current_match += 1;

            let carried_flag = victim.planestate.flagspeed;
            if carried_flag {
                victim.planestate.flagspeed = false;
                victim.deaths.with_flag += 1;
            }

            let shares = if kill_assists {
                victim.damage.trail.shares()
            } else {
                Default::default()
            };
            victim.damage.trail.clear();

            (victim.is_bot, carried_flag, shares)
        }
        Some(_) => {
            debug!(victim_id = %victim_id, "Kill of dead player ignored");
            return false;
        }
        None => {
            debug!(victim_id = %victim_id, "Kill of unknown player ignored");
            return false;
        }
    };

    let mut aggressor_is_bot = false;
    if aggressor_id != victim_id {
        if let Some(aggressor) = world.player_mut(aggressor_id) {
            aggressor.kills.total += 1;
            aggressor.kills.current_match += 1;
            if victim_is_bot {
                aggressor.kills.bots += 1;
            }
            if carried_flag {
                aggressor.kills.carriers += 1;
            }
            aggressor_is_bot = aggressor.is_bot;
        }
    }

    if aggressor_is_bot {
        if let Some(victim) = world.player_mut(victim_id) {
            victim.deaths.by_bots += 1;
        }
    }

    for (contributor, share) in shares {
        if contributor == aggressor_id
            || contributor == victim_id
            || contributor.is_environment()
            || share <= 0.0
        {
            continue;
        }
        if let Some(assistant) = world.player_mut(contributor) {
            assistant.kills.assists += 1;
        }
    }

    world.emit(OutboundEvent::PlayerKilled {
        aggressor_id,
        victim_id,
        melee,
    });

    true
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::specs::{ProjectileKind, ShipType};
    use crate::game::state::{Mob, PlayerProfile, Team};

    const SETTINGS: CombatSettings = CombatSettings {
        kill_assists: true,
        melee_hits: true,
    };

    fn add_player(world: &mut WorldState, id: u32, team: Team, ship: ShipType, is_bot: bool) {
        let profile = PlayerProfile {
            name: format!("p{}", id),
            is_bot,
            ship_type: ship,
        };
        world.players.insert(EntityId(id), Player::new(EntityId(id), profile, team));
    }

    fn add_missile(world: &mut WorldState, id: u32, owner: u32, kind: ProjectileKind, doubled: bool) {
        world.mobs.insert(EntityId(id), Mob {
            id: EntityId(id),
            kind: MobKind::Missile(kind),
            owner: Some(EntityId(owner)),
            damage_doubled: doubled,
            x: 0,
            y: 0,
        });
    }

    fn add_ship_mob(world: &mut WorldState, id: u32) {
        world.mobs.insert(EntityId(id), Mob {
            id: EntityId(id),
            kind: MobKind::Ship,
            owner: None,
            damage_doubled: false,
            x: 0,
            y: 0,
        });
    }

    fn active_world() -> WorldState {
        let mut world = WorldState::new(1);
        world.match_record.is_active = true;
        add_player(&mut world, 1, Team::Blue, ShipType::Goliath, false);
        add_player(&mut world, 2, Team::Red, ShipType::Predator, false);
        world
    }

    #[test]
    fn test_inactive_match_ignores_hits() {
        let mut world = active_world();
        world.match_record.is_active = false;
        add_missile(&mut world, 100, 2, ProjectileKind::PredatorMissile, false);

        assert!(resolve_hit(&mut world, &SETTINGS, EntityId(1), EntityId(100), 0.0).is_none());
        assert_eq!(world.player(EntityId(1)).unwrap().health, MAX_HEALTH);
        assert!(world.take_events().is_empty());
    }

    #[test]
    fn test_ranged_double_damage_normalization() {
        let mut world = active_world();
        add_missile(&mut world, 100, 1, ProjectileKind::PredatorMissile, true);
        world.player_mut(EntityId(2)).unwrap().health = 0.9;

        let kill = resolve_hit(&mut world, &SETTINGS, EntityId(2), EntityId(100), 0.0);
        assert!(kill.is_none());

        // Predator pool is 0.5; doubled predator missile deals 0.8
        let full = 0.5;
        let expected = (full * 0.9 - 0.8) / full;
        let victim = world.player(EntityId(2)).unwrap();
        assert!(expected < 0.0);
        assert_eq!(victim.health, MIN_HEALTH);
    }

    #[test]
    fn test_ranged_exact_health_when_not_lethal() {
        let mut world = active_world();
        add_missile(&mut world, 100, 2, ProjectileKind::CopterMissile, true);

        resolve_hit(&mut world, &SETTINGS, EntityId(1), EntityId(100), 0.0);

        let full = 1.0;
        let expected = (full * 1.0 - 0.4) / full;
        assert_eq!(world.player(EntityId(1)).unwrap().health, expected);
    }

    #[test]
    fn test_ranged_lethal_returns_kill_and_caps_trail() {
        let mut world = active_world();
        add_missile(&mut world, 100, 1, ProjectileKind::GoliathMissile, false);
        world.player_mut(EntityId(2)).unwrap().health = 0.5;

        let kill = resolve_hit(&mut world, &SETTINGS, EntityId(2), EntityId(100), 0.0).unwrap();
        assert_eq!(kill, Kill { aggressor_id: EntityId(1), victim_id: EntityId(2), melee: false });

        // Attributed fraction equals the health the victim had left
        let (attacker, fraction) = world.player(EntityId(2)).unwrap().damage.trail.last().unwrap();
        assert_eq!(attacker, EntityId(1));
        assert!((fraction - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_ranged_updates_owner_stats() {
        let mut world = active_world();
        add_player(&mut world, 3, Team::Red, ShipType::Predator, true);
        add_missile(&mut world, 100, 3, ProjectileKind::PredatorMissile, true);

        resolve_hit(&mut world, &SETTINGS, EntityId(1), EntityId(100), 0.0);

        let owner = world.player(EntityId(3)).unwrap();
        // Tracking counts base damage, not the doubled amount
        assert_eq!(owner.damage.dealt, 40);
        assert_eq!(owner.damage.hits, 1);
        assert_eq!(owner.damage.bots, 0);

        let victim = world.player(EntityId(1)).unwrap();
        assert_eq!(victim.damage.hits_received, 1);
        assert_eq!(victim.damage.hits_by_bots, 1);
    }

    #[test]
    fn test_shield_blocks_without_state_change() {
        let mut world = active_world();
        add_missile(&mut world, 100, 2, ProjectileKind::GoliathMissile, false);
        world.player_mut(EntityId(1)).unwrap().shield = true;

        assert!(resolve_hit(&mut world, &SETTINGS, EntityId(1), EntityId(100), 0.0).is_none());

        let victim = world.player(EntityId(1)).unwrap();
        assert_eq!(victim.health, MAX_HEALTH);
        assert_eq!(victim.damage.hits_received, 0);
        assert!(victim.damage.trail.is_empty());
        assert_eq!(world.player(EntityId(2)).unwrap().damage.hits, 0);
        assert!(world.take_events().is_empty());
    }

    #[test]
    fn test_stealth_broken_before_damage() {
        let mut world = active_world();
        world.now_ms = 4200;
        add_missile(&mut world, 100, 2, ProjectileKind::CopterMissile, false);
        world.player_mut(EntityId(1)).unwrap().planestate.stealthed = true;

        resolve_hit(&mut world, &SETTINGS, EntityId(1), EntityId(100), 0.0);

        let victim = world.player(EntityId(1)).unwrap();
        assert!(!victim.planestate.stealthed);
        assert_eq!(victim.times.last_stealth, 4200);

        let events = world.take_events();
        assert_eq!(events[0], OutboundEvent::StealthBroken { player_id: EntityId(1) });
        assert_eq!(events[1], OutboundEvent::PlayerUpdated { player_id: EntityId(1) });
        assert!(matches!(events[2], OutboundEvent::PlayerHit { .. }));
    }

    #[test]
    fn test_environment_damage_ignores_shield() {
        let mut world = active_world();
        world.player_mut(EntityId(1)).unwrap().shield = true;

        resolve_hit(&mut world, &SETTINGS, EntityId(1), EntityId::ENVIRONMENT, 0.25);

        let victim = world.player(EntityId(1)).unwrap();
        assert_eq!(victim.health, 0.75);
        assert_eq!(victim.damage.trail.last(), Some((EntityId::ENVIRONMENT, 0.25)));
    }

    #[test]
    fn test_negative_environment_damage_is_ignored() {
        let mut world = active_world();
        world.player_mut(EntityId(1)).unwrap().health = 0.5;

        resolve_hit(&mut world, &SETTINGS, EntityId(1), EntityId::ENVIRONMENT, -3.0);
        resolve_hit(&mut world, &SETTINGS, EntityId(1), EntityId::ENVIRONMENT, f64::NAN);

        assert_eq!(world.player(EntityId(1)).unwrap().health, 0.5);
    }

    #[test]
    fn test_melee_kill_skips_trail() {
        let mut world = active_world();
        add_ship_mob(&mut world, 2);
        world.player_mut(EntityId(1)).unwrap().health = 0.1;

        let kill = resolve_hit(&mut world, &SETTINGS, EntityId(1), EntityId(2), 0.0).unwrap();

        assert!(kill.melee);
        assert_eq!(kill.aggressor_id, EntityId(2));
        let victim = world.player(EntityId(1)).unwrap();
        assert!(victim.damage.trail.is_empty());
        assert_eq!(victim.health, MIN_HEALTH);
        assert_eq!(world.player(EntityId(2)).unwrap().damage.dealt, 0);
    }

    #[test]
    fn test_melee_blocked_by_shield() {
        let mut world = active_world();
        add_ship_mob(&mut world, 2);
        world.player_mut(EntityId(1)).unwrap().shield = true;

        assert!(resolve_hit(&mut world, &SETTINGS, EntityId(1), EntityId(2), 0.0).is_none());
        assert_eq!(world.player(EntityId(1)).unwrap().damage.hits_received, 0);
    }

    #[test]
    fn test_ship_mob_outside_melee_mode_is_ignored() {
        let mut world = active_world();
        add_ship_mob(&mut world, 2);
        let settings = CombatSettings { kill_assists: true, melee_hits: false };

        assert!(resolve_hit(&mut world, &settings, EntityId(1), EntityId(2), 0.0).is_none());
        assert_eq!(world.player(EntityId(1)).unwrap().health, MAX_HEALTH);
    }

    #[test]
    fn test_unknown_ids_are_ignored() {
        let mut world = active_world();

        assert!(resolve_hit(&mut world, &SETTINGS, EntityId(99), EntityId::ENVIRONMENT, 1.0).is_none());
        assert!(resolve_hit(&mut world, &SETTINGS, EntityId(1), EntityId(77), 0.0).is_none());
        assert!(world.take_events().is_empty());
    }

    #[test]
    fn test_apply_kill_bookkeeping_and_assists() {
        let mut world = active_world();
        add_player(&mut world, 3, Team::Red, ShipType::Predator, false);
        {
            let victim = world.player_mut(EntityId(1)).unwrap();
            victim.planestate.flagspeed = true;
            victim.damage.trail.push(EntityId(3), 0.4);
            victim.damage.trail.push(EntityId(2), 0.6);
        }

        let kill = Kill { aggressor_id: EntityId(2), victim_id: EntityId(1), melee: false };
        assert!(apply_kill(&mut world, kill, true));
        assert!(!apply_kill(&mut world, kill, true));

        let victim = world.player(EntityId(1)).unwrap();
        assert!(!victim.alive);
        assert!(victim.last_state_killed);
        assert_eq!(victim.deaths.total, 1);
        assert_eq!(victim.deaths.with_flag, 1);
        assert!(!victim.planestate.flagspeed);
        assert!(victim.damage.trail.is_empty());

        let aggressor = world.player(EntityId(2)).unwrap();
        assert_eq!(aggressor.kills.total, 1);
        assert_eq!(aggressor.kills.carriers, 1);
        assert_eq!(aggressor.kills.assists, 0);
        assert_eq!(world.player(EntityId(3)).unwrap().kills.assists, 1);

        let events = world.take_events();
        assert_eq!(events, vec![OutboundEvent::PlayerKilled {
            aggressor_id: EntityId(2),
            victim_id: EntityId(1),
            melee: false,
        }]);
    }
}
