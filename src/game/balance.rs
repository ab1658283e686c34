//! Team Balancing
//!
//! Fairness scores from accumulated statistics, the reshuffle that
//! partitions everyone into two teams, and join-time team assignment.

use tracing::{debug, info};

use crate::game::events::OutboundEvent;
use crate::game::state::{EntityId, Player, Team, WorldState};

/// Bots join red while red holds less than this share of the bots.
pub const BOT_RED_RATIO: f64 = 0.33;

// =============================================================================
// FAIRNESS SCORE
// =============================================================================

/// Sums over every known player. Player counts only include players
/// with a non-zero value and are floored at 1.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PopulationTotals {
    /// Players counted
    pub players: u64,
    /// Kills
    pub kills: u64,
    /// Deaths, floored at 1
    pub deaths: u64,
    /// Damage dealt
    pub damage: u64,
    /// Flag carriers killed
    pub carrier_kills: u64,
    /// Players with carrier kills
    pub carrier_kills_players: u64,
    /// Deaths while carrying
    pub flag_deaths: u64,
    /// Players with flag deaths
    pub flag_deaths_players: u64,
    /// Capture attempts
    pub attempts: u64,
    /// Players with attempts
    pub attempts_players: u64,
    /// Saves
    pub saves: u64,
    /// Players with saves
    pub saves_players: u64,
    /// Successful captures
    pub captures: u64,
    /// Players with captures
    pub captures_players: u64,
    /// Recaptures
    pub recaptures: u64,
    /// Players with recaptures
    pub recaptures_players: u64,
}

impl PopulationTotals {
    /// Aggregate the statistics of every player in the world.
    pub fn collect<'a>(players: impl IntoIterator<Item = &'a Player>) -> Self {
        let mut totals = Self::default();

        for player in players {
            totals.players += 1;
            totals.kills += u64::from(player.kills.total);
            totals.deaths += u64::from(player.deaths.total);
            totals.damage += player.damage.dealt;

            accumulate(&mut totals.carrier_kills, &mut totals.carrier_kills_players, player.kills.carriers);
            accumulate(&mut totals.flag_deaths, &mut totals.flag_deaths_players, player.deaths.with_flag);
            accumulate(&mut totals.attempts, &mut totals.attempts_players, player.captures.attempts);
            accumulate(&mut totals.saves, &mut totals.saves_players, player.captures.saves);
            accumulate(&mut totals.captures, &mut totals.captures_players, player.captures.successful);
            accumulate(&mut totals.recaptures, &mut totals.recaptures_players, player.captures.recaptures);
        }

        totals.players = totals.players.max(1);
        totals.deaths = totals.deaths.max(1);
        totals.carrier_kills_players = totals.carrier_kills_players.max(1);
        totals.flag_deaths_players = totals.flag_deaths_players.max(1);
        totals.attempts_players = totals.attempts_players.max(1);
        totals.saves_players = totals.saves_players.max(1);
        totals.captures_players = totals.captures_players.max(1);
        totals.recaptures_players = totals.recaptures_players.max(1);

        totals
    }
}

fn accumulate(sum: &mut u64, players: &mut u64, value: u32) {
    if value > 0 {
        *sum += u64::from(value);
        *players += 1;
    }
}

fn mean(sum: u64, count: u64) -> f64 {
    sum as f64 / count.max(1) as f64
}

/// Score in `1..=9`: one point plus one per statistic where the player is
/// at or above the population mean (strictly below for flag deaths).
/// Optional statistics only count when someone has a non-zero value.
pub fn fairness_score(player: &Player, totals: &PopulationTotals) -> u32 {
    let kd = f64::from(player.kills.total) / f64::from(player.deaths.total.max(1));
    let mut score = 1;

    if kd >= mean(totals.kills, totals.deaths) {
        score += 1;
    }
    if player.damage.dealt as f64 >= mean(totals.damage, totals.players) {
        score += 1;
    }

    let optional = [
        (totals.carrier_kills, totals.carrier_kills_players, player.kills.carriers),
        (totals.captures, totals.captures_players, player.captures.successful),
        (totals.attempts, totals.attempts_players, player.captures.attempts),
        (totals.saves, totals.saves_players, player.captures.saves),
        (totals.recaptures, totals.recaptures_players, player.captures.recaptures),
    ];
    for (sum, count, value) in optional {
        if sum != 0 && f64::from(value) >= mean(sum, count) {
            score += 1;
        }
    }

    // Negative statistic
    if totals.flag_deaths != 0
        && f64::from(player.deaths.with_flag) < mean(totals.flag_deaths, totals.flag_deaths_players)
    {
        score += 1;
    }

    score
}

// =============================================================================
// PARTITION
// =============================================================================

/// Split rated players into two teams.
///
/// Greedy over the descending scores: the lighter team takes the next
/// player (ties to `first`) unless it already holds `⌈n/2⌉`. A refinement
/// pass then applies the best score-gap-reducing swap until none is left.
pub fn partition_humans(rated: &[(EntityId, u32)], first: Team) -> Vec<(EntityId, Team)> {
    let capacity = (rated.len() + 1) / 2;
    let mut sides: [Vec<(EntityId, u32)>; 2] = [Vec::new(), Vec::new()];
    let mut sums = [0u32; 2];

    let mut ordered = rated.to_vec();
    ordered.sort_by(|a, b| b.1.cmp(&a.1));

    for (id, score) in ordered {
        let preferred = if sums[0] <= sums[1] { 0 } else { 1 };
        let side = if sides[preferred].len() >= capacity {
            1 - preferred
        } else {
            preferred
        };
        sides[side].push((id, score));
        sums[side] += score;
    }

    refine(&mut sides);

    let second = first.opponent();
    sides[0]
        .iter()
        .map(|(id, _)| (*id, first))
        .chain(sides[1].iter().map(|(id, _)| (*id, second)))
        .collect()
}

/// Swap pairs across the sides while that strictly narrows the gap.
fn refine(sides: &mut [Vec<(EntityId, u32)>; 2]) {
    loop {
        let gap = side_score(&sides[0]) - side_score(&sides[1]);
        let mut best: Option<(usize, usize)> = None;
        let mut best_gap = gap.abs();

        for (i, (_, a)) in sides[0].iter().enumerate() {
            for (j, (_, b)) in sides[1].iter().enumerate() {
                let swapped = gap - 2 * (i64::from(*a) - i64::from(*b));
                if swapped.abs() < best_gap {
                    best_gap = swapped.abs();
                    best = Some((i, j));
                }
            }
        }

        match best {
            Some((i, j)) => {
                let moved = sides[0][i];
                sides[0][i] = sides[1][j];
                sides[1][j] = moved;
            }
            None => break,
        }
    }
}

fn side_score(side: &[(EntityId, u32)]) -> i64 {
    side.iter().map(|(_, score)| i64::from(*score)).sum()
}

// =============================================================================
// RESHUFFLE
// =============================================================================

/// Outcome of a reshuffle, indexed by [`Team::index`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReshuffleSummary {
    /// Humans per team
    pub humans: [u32; 2],
    /// Bots per team
    pub bots: [u32; 2],
    /// Summed active human scores per team
    pub scores: [u32; 2],
    /// Entities whose team changed
    pub changed: Vec<EntityId>,
}

impl ReshuffleSummary {
    /// Public chat line announcing the new teams.
    pub fn message(&self) -> String {
        format!(
            "Teams reshuffled: {} vs {} humans, {} vs {} bots, {} vs {} total. Balance scores: {} vs {}.",
            self.humans[0],
            self.humans[1],
            self.bots[0],
            self.bots[1],
            self.humans[0] + self.bots[0],
            self.humans[1] + self.bots[1],
            self.scores[0] + self.bots[0],
            self.scores[1] + self.bots[1],
        )
    }
}

/// Rebalance every connected player.
///
/// Emits `TeamChanged` for the entities that moved and one `PublicChat`
/// summary. Does nothing on an empty server.
pub fn reshuffle(world: &mut WorldState) -> Option<ReshuffleSummary> {
    if world.players.is_empty() {
        return None;
    }

    let totals = PopulationTotals::collect(world.players.values());

    let mut active = Vec::new();
    let mut spectating = Vec::new();
    let mut bots = Vec::new();
    for player in world.players.values() {
        if player.is_bot {
            bots.push(player.id);
        } else if player.spectating {
            spectating.push((player.id, fairness_score(player, &totals)));
        } else {
            active.push((player.id, fairness_score(player, &totals)));
        }
    }
    spectating.sort_by(|a, b| b.1.cmp(&a.1));

    let first = if world.rng.coin_flip() { Team::Blue } else { Team::Red };
    let mut summary = ReshuffleSummary::default();
    let mut assignments = Vec::with_capacity(world.players.len());

    for (id, team) in partition_humans(&active, first) {
        let score = active
            .iter()
            .find(|(rated, _)| *rated == id)
            .map(|(_, score)| *score)
            .unwrap_or(0);
        summary.humans[team.index()] += 1;
        summary.scores[team.index()] += score;
        assignments.push((id, team));
    }

    let mut next = if summary.humans[first.index()] <= summary.humans[first.opponent().index()] {
        first
    } else {
        first.opponent()
    };

    // Spectators are not counted in the summary
    for (id, _) in spectating {
        assignments.push((id, next));
        next = next.opponent();
    }

    for id in bots {
        summary.bots[next.index()] += 1;
        assignments.push((id, next));
        next = next.opponent();
    }

    for (id, team) in assignments {
        if let Some(player) = world.player_mut(id) {
            if player.team != team {
                player.team = team;
                summary.changed.push(id);
            }
        }
    }

    if !summary.changed.is_empty() {
        world.emit(OutboundEvent::TeamChanged {
            player_ids: summary.changed.clone(),
        });
    }
    world.emit(OutboundEvent::PublicChat {
        text: summary.message(),
    });

    info!(
        moved = summary.changed.len(),
        blue_score = summary.scores[0],
        red_score = summary.scores[1],
        "Teams reshuffled"
    );

    Some(summary)
}

// =============================================================================
// JOIN ASSIGNMENT
// =============================================================================

/// The team with fewer members; ties go blue.
pub fn team_by_population(blue: usize, red: usize) -> Team {
    if blue > red {
        Team::Red
    } else {
        Team::Blue
    }
}

/// Red while it holds less than a third of the members; an empty server
/// goes blue.
pub fn team_by_bot_ratio(blue: usize, red: usize) -> Team {
    let total = blue + red;
    if total == 0 {
        return Team::Blue;
    }
    if (red as f64 / total as f64) < BOT_RED_RATIO {
        Team::Red
    } else {
        Team::Blue
    }
}

/// Team for a player joining outside a reshuffle.
///
/// Counts bots among bots and humans among humans. The population rule
/// decides; for bots the ratio rule is still evaluated and a disagreement
/// is logged.
pub fn assign_join_team(world: &WorldState, id: EntityId, is_bot: bool) -> Team {
    let blue = world.member_count(Team::Blue, is_bot);
    let red = world.member_count(Team::Red, is_bot);
    let team = team_by_population(blue, red);

    if is_bot {
        let by_ratio = team_by_bot_ratio(blue, red);
        if by_ratio != team {
            debug!(
                player_id = %id,
                by_ratio = ?by_ratio,
                by_population = ?team,
                "Bot team rules disagree, population rule applied"
            );
        }
    }

    team
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::specs::ShipType;
    use crate::game::state::PlayerProfile;
    use proptest::prelude::*;

    fn add_player(world: &mut WorldState, id: u32, team: Team, is_bot: bool) -> &mut Player {
        let profile = PlayerProfile {
            name: format!("p{}", id),
            is_bot,
            ship_type: ShipType::Predator,
        };
        world.players.insert(EntityId(id), Player::new(EntityId(id), profile, team));
        world.player_mut(EntityId(id)).unwrap()
    }

    fn team_sums(assignments: &[(EntityId, Team)], rated: &[(EntityId, u32)]) -> [i64; 2] {
        let mut sums = [0i64; 2];
        for (id, team) in assignments {
            let score = rated.iter().find(|(r, _)| r == id).unwrap().1;
            sums[team.index()] += i64::from(score);
        }
        sums
    }

    #[test]
    fn test_partition_prefers_even_sums() {
        let rated = vec![
            (EntityId(1), 3),
            (EntityId(2), 3),
            (EntityId(3), 1),
            (EntityId(4), 1),
        ];
        let assignments = partition_humans(&rated, Team::Blue);

        assert_eq!(team_sums(&assignments, &rated), [4, 4]);
        let blue = assignments.iter().filter(|(_, t)| *t == Team::Blue).count();
        assert_eq!(blue, 2);
    }

    #[test]
    fn test_partition_refines_greedy_result() {
        // Plain greedy ends 7 vs 5 here
        let rated: Vec<_> = [3, 3, 2, 2, 2]
            .iter()
            .enumerate()
            .map(|(i, s)| (EntityId(i as u32 + 1), *s))
            .collect();
        let assignments = partition_humans(&rated, Team::Red);
        let sums = team_sums(&assignments, &rated);

        assert_eq!(sums[0], sums[1]);
    }

    #[test]
    fn test_fairness_score_bounds() {
        let mut world = WorldState::new(1);
        {
            let star = add_player(&mut world, 1, Team::Blue, false);
            star.kills.total = 10;
            star.kills.carriers = 2;
            star.damage.dealt = 900;
            star.captures.successful = 1;
            star.captures.attempts = 3;
            star.captures.saves = 1;
            star.captures.recaptures = 1;
        }
        {
            let weak = add_player(&mut world, 2, Team::Red, false);
            weak.deaths.total = 10;
            weak.deaths.with_flag = 4;
        }

        let totals = PopulationTotals::collect(world.players.values());
        assert_eq!(fairness_score(world.player(EntityId(1)).unwrap(), &totals), 9);
        assert_eq!(fairness_score(world.player(EntityId(2)).unwrap(), &totals), 1);
    }

    #[test]
    fn test_fresh_players_score_with_zero_totals() {
        let mut world = WorldState::new(1);
        add_player(&mut world, 1, Team::Blue, false);

        let totals = PopulationTotals::collect(world.players.values());
        // k/d and damage ties count, optional stats are skipped
        assert_eq!(fairness_score(world.player(EntityId(1)).unwrap(), &totals), 3);
    }

    #[test]
    fn test_reshuffle_reports_only_moved_players() {
        let mut world = WorldState::new(7);
        for id in 1..=4 {
            add_player(&mut world, id, Team::Blue, false);
        }
        add_player(&mut world, 5, Team::Red, true);
        add_player(&mut world, 6, Team::Red, true);

        let summary = reshuffle(&mut world).unwrap();

        assert_eq!(summary.humans, [2, 2]);
        assert_eq!(summary.bots, [1, 1]);

        let events = world.take_events();
        let moved = match &events[0] {
            OutboundEvent::TeamChanged { player_ids } => player_ids.clone(),
            other => panic!("unexpected event {:?}", other),
        };
        assert_eq!(moved, summary.changed);
        assert_eq!(world.member_count(Team::Blue, false), 2);
        assert!(matches!(events.last(), Some(OutboundEvent::PublicChat { .. })));
    }

    #[test]
    fn test_reshuffle_empty_server_is_silent() {
        let mut world = WorldState::new(7);
        assert!(reshuffle(&mut world).is_none());
        assert!(world.take_events().is_empty());
    }

    #[test]
    fn test_spectators_fill_lighter_team() {
        let mut world = WorldState::new(3);
        for id in 1..=3 {
            add_player(&mut world, id, Team::Blue, false);
        }
        add_player(&mut world, 4, Team::Blue, false).spectating = true;

        let summary = reshuffle(&mut world).unwrap();
        assert_eq!(summary.humans[0] + summary.humans[1], 3);

        let lighter = if summary.humans[0] < summary.humans[1] { Team::Blue } else { Team::Red };
        assert_eq!(world.player(EntityId(4)).unwrap().team, lighter);
    }

    #[test]
    fn test_bots_continue_after_spectators() {
        let mut world = WorldState::new(11);
        add_player(&mut world, 1, Team::Blue, false);
        add_player(&mut world, 2, Team::Blue, false);
        for id in 3..=5 {
            add_player(&mut world, id, Team::Blue, false).spectating = true;
        }
        for id in 6..=8 {
            add_player(&mut world, id, Team::Blue, true);
        }

        let summary = reshuffle(&mut world).unwrap();
        assert_eq!(summary.humans, [1, 1]);

        let team = |id: u32| world.player(EntityId(id)).unwrap().team;
        let start = team(3);

        assert_eq!(team(4), start.opponent());
        assert_eq!(team(5), start);
        assert_eq!(team(6), start.opponent());
        assert_eq!(team(7), start);
        assert_eq!(team(8), start.opponent());

        let mut bots = [0u32; 2];
        bots[start.index()] = 1;
        bots[start.opponent().index()] = 2;
        assert_eq!(summary.bots, bots);
    }

    #[test]
    fn test_summary_message() {
        let summary = ReshuffleSummary {
            humans: [3, 2],
            bots: [1, 2],
            scores: [7, 6],
            changed: Vec::new(),
        };
        assert_eq!(
            summary.message(),
            "Teams reshuffled: 3 vs 2 humans, 1 vs 2 bots, 4 vs 4 total. Balance scores: 8 vs 8."
        );
    }

    #[test]
    fn test_join_rules() {
        assert_eq!(team_by_population(0, 0), Team::Blue);
        assert_eq!(team_by_population(3, 2), Team::Red);
        assert_eq!(team_by_population(2, 3), Team::Blue);

        assert_eq!(team_by_bot_ratio(0, 0), Team::Blue);
        assert_eq!(team_by_bot_ratio(3, 1), Team::Red);
        assert_eq!(team_by_bot_ratio(2, 1), Team::Blue);
    }

    #[test]
    fn test_join_counts_bots_separately() {
        let mut world = WorldState::new(1);
        add_player(&mut world, 1, Team::Blue, false);
        add_player(&mut world, 2, Team::Red, true);
        add_player(&mut world, 3, Team::Red, true);

        assert_eq!(assign_join_team(&world, EntityId(4), false), Team::Red);
        assert_eq!(assign_join_team(&world, EntityId(5), true), Team::Blue);
    }

    proptest! {
        #[test]
        fn prop_partition_is_swap_stable(scores in prop::collection::vec(1u32..=9, 0..16), blue_first in any::<bool>()) {
            let rated: Vec<_> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| (EntityId(i as u32 + 1), *s))
                .collect();
            let first = if blue_first { Team::Blue } else { Team::Red };
            let assignments = partition_humans(&rated, first);

            prop_assert_eq!(assignments.len(), rated.len());

            let blue: Vec<u32> = assignments.iter()
                .filter(|(_, t)| *t == Team::Blue)
                .map(|(id, _)| rated[(id.0 - 1) as usize].1)
                .collect();
            let red: Vec<u32> = assignments.iter()
                .filter(|(_, t)| *t == Team::Red)
                .map(|(id, _)| rated[(id.0 - 1) as usize].1)
                .collect();

            prop_assert!((blue.len() as i64 - red.len() as i64).abs() <= 1);

            let gap: i64 = blue.iter().map(|s| i64::from(*s)).sum::<i64>()
                - red.iter().map(|s| i64::from(*s)).sum::<i64>();
            for a in &blue {
                for b in &red {
                    let swapped = gap - 2 * (i64::from(*a) - i64::from(*b));
                    prop_assert!(swapped.abs() >= gap.abs());
                }
            }
        }
    }
}
