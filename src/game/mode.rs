//! Mode Policies
//!
//! Everything that differs between infection and CTF is data here: the
//! countdown table, how a match ends, what happens to the killed, and
//! what the win does. The state machine itself is shared.

use std::collections::BTreeMap;

use crate::config::{GameMode, ServerConfig};
use crate::game::events::Severity;
use crate::game::specs::INFECTED_ENERGY_REGEN;
use crate::game::state::Team;

/// How long a killed player stays down before anything else happens.
pub const DEATH_INACTIVITY_MS: u64 = 3000;

/// Delay before the welcome whisper to a new player.
pub const JOIN_ANNOUNCE_DELAY_MS: u64 = 1000;

/// Display time of each per-second countdown banner.
pub const COUNTDOWN_ALERT_MS: u32 = 1000;

/// Display time of the winner banner.
pub const WIN_ANNOUNCE_MS: u32 = 3000;

/// Something to do at a countdown second.
#[derive(Clone, Debug, PartialEq)]
pub enum MilestoneAction {
    /// Show a banner.
    Announce {
        text: String,
        severity: Severity,
        duration_ms: u32,
    },
    /// Rebalance the teams.
    Reshuffle,
}

impl MilestoneAction {
    fn alert(text: impl Into<String>, duration_ms: u32) -> Self {
        MilestoneAction::Announce {
            text: text.into(),
            severity: Severity::Alert,
            duration_ms,
        }
    }
}

/// Countdown table: actions keyed by the waiting second they fire on.
#[derive(Clone, Debug, PartialEq)]
pub struct CountdownSchedule {
    milestones: BTreeMap<u32, Vec<MilestoneAction>>,
    /// Waiting second at which the match starts.
    pub start_at: u32,
}

impl CountdownSchedule {
    /// Empty schedule starting at `start_at`.
    pub fn new(start_at: u32) -> Self {
        Self {
            milestones: BTreeMap::new(),
            start_at,
        }
    }

    /// Register an action at a waiting second.
    pub fn at(mut self, second: u32, action: MilestoneAction) -> Self {
        self.milestones.entry(second).or_default().push(action);
        self
    }

    /// Actions registered for exactly this second.
    pub fn actions_at(&self, second: u32) -> &[MilestoneAction] {
        self.milestones
            .get(&second)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Seconds with at least one reshuffle.
    #[cfg(test)]
    fn reshuffle_seconds(&self) -> Vec<u32> {
        self.milestones
            .iter()
            .filter(|(_, actions)| actions.contains(&MilestoneAction::Reshuffle))
            .map(|(second, _)| *second)
            .collect()
    }

    /// Early heads-up, the ten-second warning and the final per-second
    /// count, shared by every mode.
    fn with_standard_announcements(self) -> Self {
        let total = self.start_at;
        let mut schedule = self
            .at(5, MilestoneAction::alert(
                format!("Game starting in {} seconds", total.saturating_sub(5)),
                5000,
            ))
            .at(total.saturating_sub(10), MilestoneAction::alert("Game starting in 10 seconds", 4000));

        for second in total.saturating_sub(5)..total {
            let left = total - second;
            let text = if left == 1 {
                "Game starting in a second".to_string()
            } else {
                format!("Game starting in {} seconds", left)
            };
            schedule = schedule.at(second, MilestoneAction::alert(text, COUNTDOWN_ALERT_MS));
        }

        schedule
    }

    /// Infection: reshuffle together with the first announcement, or at
    /// the start second on shorter countdowns.
    pub fn infection(start_at: u32) -> Self {
        let reshuffle_at = start_at.min(5).max(1);
        Self::new(start_at)
            .at(reshuffle_at, MilestoneAction::Reshuffle)
            .with_standard_announcements()
    }

    /// CTF: reshuffle thirty seconds before the start.
    pub fn capture_the_flag(start_at: u32) -> Self {
        let reshuffle_at = start_at.saturating_sub(30).max(1);
        Self::new(start_at)
            .at(reshuffle_at, MilestoneAction::Reshuffle)
            .with_standard_announcements()
    }
}

/// When a running match is over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndCondition {
    /// A team has no living members after a kill.
    TeamEliminated,
    /// A team reached this many flag captures.
    CaptureLimit(u32),
}

/// Post-kill team conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversionRule {
    /// Killed members of this team convert
    pub from: Team,
    /// Team they join
    pub to: Team,
    /// Delay after the kill
    pub delay_ms: u64,
}

/// Extra work after a winner is decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WinAction {
    /// Only the winner announcement.
    Announce,
    /// Announce and zero the flag scores.
    ResetFlags,
}

/// Complete behavior of a mode.
#[derive(Clone, Debug, PartialEq)]
pub struct ModePolicy {
    /// Mode served
    pub mode: GameMode,
    /// Countdown table
    pub countdown: CountdownSchedule,
    /// End condition
    pub end_condition: EndCondition,
    /// Conversion of killed players, if any
    pub conversion: Option<ConversionRule>,
    /// Post-win action
    pub win_action: WinAction,
    /// Ownerless mobs are melee hits
    pub melee_hits: bool,
    /// Respawn the killed after this delay
    pub respawn_delay_ms: Option<u64>,
    /// Winner on simultaneous elimination
    pub default_winner: Team,
    /// Team display names, blue first
    pub team_labels: [&'static str; 2],
    /// Whispered to new players
    pub welcome: &'static str,
}

impl ModePolicy {
    /// Infection mode.
    pub fn infection(countdown_seconds: u32) -> Self {
        Self {
            mode: GameMode::Infection,
            countdown: CountdownSchedule::infection(countdown_seconds),
            end_condition: EndCondition::TeamEliminated,
            conversion: Some(ConversionRule {
                from: Team::Blue,
                to: Team::Red,
                delay_ms: DEATH_INACTIVITY_MS + 100,
            }),
            win_action: WinAction::Announce,
            melee_hits: true,
            respawn_delay_ms: None,
            default_winner: Team::Blue,
            team_labels: ["Survivors", "Infected"],
            welcome: "Welcome to Infection Mode. Survive, or spread the infection.",
        }
    }

    /// Capture the flag.
    pub fn capture_the_flag(countdown_seconds: u32) -> Self {
        Self {
            mode: GameMode::CaptureTheFlag,
            countdown: CountdownSchedule::capture_the_flag(countdown_seconds),
            end_condition: EndCondition::CaptureLimit(3),
            conversion: None,
            win_action: WinAction::ResetFlags,
            melee_hits: false,
            respawn_delay_ms: Some(DEATH_INACTIVITY_MS),
            default_winner: Team::Blue,
            team_labels: ["Blue", "Red"],
            welcome: "Welcome to Capture the Flag. First team to 3 captures wins.",
        }
    }

    /// Policy selected by the configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut policy = match config.mode {
            GameMode::Infection => Self::infection(config.countdown_seconds.unwrap_or(30)),
            GameMode::CaptureTheFlag => {
                Self::capture_the_flag(config.countdown_seconds.unwrap_or(60))
            }
        };
        policy.default_winner = config.default_winner;
        policy
    }

    /// Flat energy regen for members of `team`, replacing the ship value.
    ///
    /// Only the conversion target team (the infected) has one.
    pub fn flat_energy_regen(&self, team: Team) -> Option<f64> {
        match self.conversion {
            Some(rule) if rule.to == team => Some(INFECTED_ENERGY_REGEN),
            _ => None,
        }
    }

    /// Display name of a team under this mode.
    pub fn team_label(&self, team: Team) -> &'static str {
        self.team_labels[team.index()]
    }
}
