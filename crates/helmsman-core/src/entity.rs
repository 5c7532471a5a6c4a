//! Fleets, commanders and the identifiers that tie them together.
//!
//! An [`Entity`] is a controllable fleet or unit. It is owned by the session
//! simulation and mutated only by applied command effects and movement
//! integration. A [`Commander`] is the character issuing orders: it carries
//! the skill stat that shortens command delay and the command-point pool that
//! gates issuance.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a fleet or unit within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fleet#{}", self.0)
    }
}

/// Identifier of a commanding character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommanderId(pub u64);

impl fmt::Display for CommanderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "commander#{}", self.0)
    }
}

/// Identifier of a faction. Entities of different factions are hostile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactionId(pub u32);

impl fmt::Display for FactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Formation / EnergyDistribution
// ---------------------------------------------------------------------------

/// Tactical formation a fleet can adopt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formation {
    #[default]
    Line,
    Spindle,
    Wedge,
    Circle,
    Echelon,
}

/// Percentage split of reactor output across fleet subsystems.
///
/// A distribution is valid when the four shares sum to exactly 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnergyDistribution {
    pub weapons: u8,
    pub shields: u8,
    pub engines: u8,
    pub sensors: u8,
}

impl EnergyDistribution {
    pub fn new(weapons: u8, shields: u8, engines: u8, sensors: u8) -> Self {
        Self {
            weapons,
            shields,
            engines,
            sensors,
        }
    }

    pub fn total(&self) -> u32 {
        self.weapons as u32 + self.shields as u32 + self.engines as u32 + self.sensors as u32
    }

    pub fn is_valid(&self) -> bool {
        self.total() == 100
    }
}

impl Default for EnergyDistribution {
    fn default() -> Self {
        Self::new(25, 25, 25, 25)
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Default cruise speed in map units per second.
pub const DEFAULT_FLEET_SPEED: f64 = 10.0;

/// Maximum hull integrity (percent).
pub const MAX_HULL: u32 = 100;

/// A controllable fleet on the tactical map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub faction: FactionId,
    pub position: Point,
    /// Facing in radians from the +x axis.
    pub heading: f64,
    /// Cruise speed in map units per second.
    pub speed: f64,
    pub controller_id: CommanderId,
    /// Current velocity in map units per second. Zero when holding position.
    #[serde(default)]
    pub velocity: Point,
    /// Point the fleet is travelling to, if a movement order is in flight.
    #[serde(default)]
    pub destination: Option<Point>,
    #[serde(default)]
    pub formation: Formation,
    #[serde(default)]
    pub energy: EnergyDistribution,
    /// Hull integrity in percent, `0..=MAX_HULL`.
    pub hull: u32,
    #[serde(default)]
    pub surrendered: bool,
}

impl Entity {
    pub fn new(id: EntityId, faction: FactionId, controller_id: CommanderId, position: Point) -> Self {
        Self {
            id,
            faction,
            position,
            heading: 0.0,
            speed: DEFAULT_FLEET_SPEED,
            controller_id,
            velocity: Point::ZERO,
            destination: None,
            formation: Formation::default(),
            energy: EnergyDistribution::default(),
            hull: MAX_HULL,
            surrendered: false,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = heading;
        self
    }

    pub fn is_moving(&self) -> bool {
        self.destination.is_some()
    }

    pub fn is_hostile_to(&self, other: &Entity) -> bool {
        self.faction != other.faction
    }

    /// Drop any in-flight travel and hold position.
    pub fn halt(&mut self) {
        self.velocity = Point::ZERO;
        self.destination = None;
    }
}

// ---------------------------------------------------------------------------
// Commander
// ---------------------------------------------------------------------------

/// A character that issues orders to the fleets it controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commander {
    pub id: CommanderId,
    pub faction: FactionId,
    /// Command skill. Each point shortens delay by the configured bonus.
    pub skill: u32,
    /// Available command points (PCP/MCP pool).
    pub command_points: u32,
    pub max_command_points: u32,
}

impl Commander {
    pub fn new(id: CommanderId, faction: FactionId, skill: u32, command_points: u32) -> Self {
        Self {
            id,
            faction,
            skill,
            command_points,
            max_command_points: command_points,
        }
    }

    /// Regenerate command points, saturating at the pool maximum.
    pub fn regenerate(&mut self, amount: u32) {
        self.command_points = self
            .command_points
            .saturating_add(amount)
            .min(self.max_command_points);
    }
}
