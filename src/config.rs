//! Server configuration - environment variable parsing
//!
//! Everything the simulation reads is fixed at startup and never mutated.

use std::env;
use std::str::FromStr;
use serde::{Serialize, Deserialize};

use crate::game::state::Team;

/// Game mode served by this process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameMode {
    /// Survivors (blue) against infected (red); the killed convert.
    Infection,
    /// Capture the flag.
    CaptureTheFlag,
}

impl FromStr for GameMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inf" | "infection" | "4" => Ok(GameMode::Infection),
            "ctf" | "capture-the-flag" | "2" => Ok(GameMode::CaptureTheFlag),
            _ => Err(ConfigError::Invalid("GAME_MODE", s.to_string())),
        }
    }
}

/// Simulation configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Mode policy selector
    pub mode: GameMode,
    /// Track damage contributors for kill assists
    pub kill_assists: bool,
    /// Extra spawn sub-zones (carried, currently inert)
    pub extra_spawns: bool,
    /// Overrides the mode's countdown length in seconds
    pub countdown_seconds: Option<u32>,
    /// Winner when both teams are eliminated at once
    pub default_winner: Team,
    /// Seed for all simulation randomness
    pub rng_seed: u64,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mode: GameMode::Infection,
            kill_assists: true,
            extra_spawns: false,
            countdown_seconds: None,
            default_winner: Team::Blue,
            rng_seed: 12345,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            mode: match env::var("GAME_MODE") {
                Ok(value) => value.parse()?,
                Err(_) => defaults.mode,
            },
            kill_assists: read_flag("KILL_ASSISTS", defaults.kill_assists)?,
            extra_spawns: read_flag("EXTRA_SPAWNS", defaults.extra_spawns)?,
            countdown_seconds: match env::var("COUNTDOWN_SECONDS") {
                Ok(value) => Some(parse_countdown(&value)?),
                Err(_) => defaults.countdown_seconds,
            },
            default_winner: match env::var("DEFAULT_WINNER") {
                Ok(value) => parse_team(&value)?,
                Err(_) => defaults.default_winner,
            },
            rng_seed: match env::var("RNG_SEED") {
                Ok(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid("RNG_SEED", value))?,
                Err(_) => defaults.rng_seed,
            },
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }
}

fn read_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(value) => parse_flag(name, &value),
        Err(_) => Ok(default),
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(name, value.to_string())),
    }
}

fn parse_countdown(value: &str) -> Result<u32, ConfigError> {
    match value.trim().parse::<u32>() {
        // The schedule needs room for the per-second countdown
        Ok(seconds) if seconds >= 10 => Ok(seconds),
        _ => Err(ConfigError::Invalid("COUNTDOWN_SECONDS", value.to_string())),
    }
}

fn parse_team(value: &str) -> Result<Team, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "blue" | "1" => Ok(Team::Blue),
        "red" | "2" => Ok(Team::Red),
        _ => Err(ConfigError::Invalid("DEFAULT_WINNER", value.to_string())),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
