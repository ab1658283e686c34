//! Spawn Points
//!
//! Base zones per team, jittered by a uniform integer offset. With extra
//! spawns enabled, a human whose last life ended in a kill comes back at
//! the map center instead.

use crate::core::rng::DeterministicRng;
use crate::game::state::{Player, Team};

/// Circular spawn zone in map units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpawnZone {
    /// Center
    pub x: i32,
    /// Center
    pub y: i32,
    /// Max offset on each axis
    pub radius: i32,
}

impl SpawnZone {
    const fn new(x: i32, y: i32, radius: i32) -> Self {
        Self { x, y, radius }
    }
}

/// Base spawn zones, blue first.
pub const BASE_SPAWN_ZONES: [SpawnZone; 2] = [
    SpawnZone::new(-8580, -1500, 100),
    SpawnZone::new(0, 0, 250),
];

/// Center spawn for humans returning from a kill when extra spawns are on.
pub const CENTER_SPAWN_ZONE: SpawnZone = SpawnZone::new(0, 0, 0);

/// North/south sub-zones per team, blue first.
///
/// Carried as map data; no spawn policy reads them.
pub const EXTRA_SPAWN_ZONES: [[SpawnZone; 2]; 2] = [
    [SpawnZone::new(2048, -5860, 50), SpawnZone::new(3072, 5120, 50)],
    [SpawnZone::new(-2340, -5120, 50), SpawnZone::new(-4096, 4535, 50)],
];

/// Base zone of a team.
#[inline]
pub fn base_zone(team: Team) -> SpawnZone {
    BASE_SPAWN_ZONES[team.index()]
}

/// Zone `player` spawns in.
pub fn spawn_zone(player: &Player, extra_spawns: bool) -> SpawnZone {
    if extra_spawns && !player.is_bot && player.last_state_killed {
        CENTER_SPAWN_ZONE
    } else {
        base_zone(player.team)
    }
}

/// Pick a spawn point for `player` and move it there.
pub fn assign_spawn(
    player: &mut Player,
    extra_spawns: bool,
    rng: &mut DeterministicRng,
) -> (i32, i32) {
    let zone = spawn_zone(player, extra_spawns);

    player.x = zone.x + rng.next_int_range(-zone.radius, zone.radius);
    player.y = zone.y + rng.next_int_range(-zone.radius, zone.radius);

    (player.x, player.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::specs::ShipType;
    use crate::game::state::{EntityId, PlayerProfile};

    fn player(team: Team) -> Player {
        pilot(team, false)
    }

    fn pilot(team: Team, is_bot: bool) -> Player {
        let profile = PlayerProfile {
            name: "pilot".to_string(),
            is_bot,
            ship_type: ShipType::Predator,
        };
        Player::new(EntityId(1), profile, team)
    }

    #[test]
    fn test_spawn_within_team_zone() {
        let mut rng = DeterministicRng::new(99);

        for team in [Team::Blue, Team::Red] {
            let zone = base_zone(team);
            let mut pilot = player(team);
            for _ in 0..200 {
                let (x, y) = assign_spawn(&mut pilot, false, &mut rng);
                assert!((x - zone.x).abs() <= zone.radius);
                assert!((y - zone.y).abs() <= zone.radius);
            }
        }
    }

    #[test]
    fn test_killed_human_uses_center_with_extra_spawns() {
        let mut rng = DeterministicRng::new(5);
        let mut human = player(Team::Blue);
        human.last_state_killed = true;

        assert_eq!(assign_spawn(&mut human, true, &mut rng), (0, 0));
        assert_eq!((human.x, human.y), (0, 0));
    }

    #[test]
    fn test_base_zone_without_death_context() {
        let mut rng = DeterministicRng::new(5);
        let blue = BASE_SPAWN_ZONES[Team::Blue.index()];

        // Flag off
        let mut killed = player(Team::Blue);
        killed.last_state_killed = true;
        assert_eq!(spawn_zone(&killed, false), blue);
        let (x, _) = assign_spawn(&mut killed, false, &mut rng);
        assert!((x - blue.x).abs() <= blue.radius);

        // Last life did not end in a kill
        let fresh = player(Team::Blue);
        assert_eq!(spawn_zone(&fresh, true), blue);

        // Bots always use the base zone
        let mut bot = pilot(Team::Red, true);
        bot.last_state_killed = true;
        assert_eq!(spawn_zone(&bot, true), BASE_SPAWN_ZONES[Team::Red.index()]);
    }

    #[test]
    fn test_extra_zones_are_team_local_data() {
        assert_eq!(EXTRA_SPAWN_ZONES[Team::Blue.index()][0], SpawnZone::new(2048, -5860, 50));
        assert_eq!(EXTRA_SPAWN_ZONES[Team::Red.index()][1], SpawnZone::new(-4096, 4535, 50));
    }
}
