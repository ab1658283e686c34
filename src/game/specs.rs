//! Static Ship, Upgrade and Projectile Tables
//!
//! Health is normalized against the Goliath pool: a ship's full health
//! is `1 / damage_factor`, so a Goliath has 1.0 and a Predator 0.5.

use serde::{Serialize, Deserialize};

/// Smallest health value a player can hold. Lethal hits clamp here
/// instead of reaching zero.
pub const MIN_HEALTH: f64 = 1e-6;

/// Full normalized health.
pub const MAX_HEALTH: f64 = 1.0;

/// Highest upgrade level for any upgrade track.
pub const MAX_UPGRADE_LEVEL: u8 = 5;

/// Defense upgrade multipliers by level.
pub const DEFENSE_FACTORS: [f64; 6] = [1.0, 1.05, 1.1, 1.15, 1.2, 1.25];

/// Energy upgrade multipliers by level.
pub const ENERGY_FACTORS: [f64; 6] = [1.0, 1.05, 1.1, 1.15, 1.2, 1.25];

/// Energy regen forced on infected players.
pub const INFECTED_ENERGY_REGEN: f64 = 0.15;

/// Damage dealt by an infected ship ramming a survivor.
pub const MELEE_DAMAGE: f64 = ProjectileKind::CopterMissile.damage();

/// Player ship type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
#[derive(Default)]
pub enum ShipType {
    /// All-rounder.
    #[default]
    Predator = 1,
    /// Heavy, slow, carries repel.
    Goliath = 2,
    /// Agile, fragile.
    Mohawk = 3,
    /// Multi-missile.
    Tornado = 4,
    /// Stealth.
    Prowler = 5,
}

/// Per-ship constants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShipSpec {
    /// Incoming damage multiplier; full health is its inverse.
    pub damage_factor: f64,
    /// Base energy regen per tick.
    pub energy_regen: f64,
}

impl ShipType {
    /// Static spec for this ship.
    pub const fn spec(self) -> ShipSpec {
        match self {
            ShipType::Predator => ShipSpec { damage_factor: 2.0, energy_regen: 0.008 },
            ShipType::Goliath => ShipSpec { damage_factor: 1.0, energy_regen: 0.005 },
            ShipType::Mohawk => ShipSpec { damage_factor: 2.87, energy_regen: 0.01 },
            ShipType::Tornado => ShipSpec { damage_factor: 1.666_666_666_666_666_7, energy_regen: 0.006 },
            ShipType::Prowler => ShipSpec { damage_factor: 1.666_666_666_666_666_7, energy_regen: 0.006 },
        }
    }

    /// Only the Goliath can repel.
    #[inline]
    pub fn can_repel(self) -> bool {
        self == ShipType::Goliath
    }

    /// Get ship type from its wire index (1-5).
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            1 => Some(ShipType::Predator),
            2 => Some(ShipType::Goliath),
            3 => Some(ShipType::Mohawk),
            4 => Some(ShipType::Tornado),
            5 => Some(ShipType::Prowler),
            _ => None,
        }
    }
}

/// Missile types a projectile can be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectileKind {
    /// Predator missile.
    PredatorMissile,
    /// Goliath missile.
    GoliathMissile,
    /// Mohawk (copter) missile.
    CopterMissile,
    /// Tornado main missile.
    TornadoMissile,
    /// Tornado side missile.
    TornadoSmallMissile,
    /// Prowler missile.
    ProwlerMissile,
}

impl ProjectileKind {
    /// Base damage before the repel doubling.
    pub const fn damage(self) -> f64 {
        match self {
            ProjectileKind::PredatorMissile => 0.4,
            ProjectileKind::GoliathMissile => 1.2,
            ProjectileKind::CopterMissile => 0.2,
            ProjectileKind::TornadoMissile => 0.42,
            ProjectileKind::TornadoSmallMissile => 0.3,
            ProjectileKind::ProwlerMissile => 0.45,
        }
    }
}

/// Look up a defense multiplier, saturating at the top level.
#[inline]
pub fn defense_factor(level: u8) -> f64 {
    DEFENSE_FACTORS[level.min(MAX_UPGRADE_LEVEL) as usize]
}

/// Look up an energy multiplier, saturating at the top level.
#[inline]
pub fn energy_factor(level: u8) -> f64 {
    ENERGY_FACTORS[level.min(MAX_UPGRADE_LEVEL) as usize]
}

/// Absolute health pool of a ship at a defense level.
#[inline]
pub fn full_health(ship: ShipType, defense_level: u8) -> f64 {
    (1.0 / ship.spec().damage_factor) * defense_factor(defense_level)
}
