//! Order transmission delay.
//!
//! [`compute_delay`] is a pure function of the issuing commander's skill, the
//! distance the order has to cover, the jamming level at the receiving fleet
//! and the command type. All quantities are whole ticks:
//!
//! ```text
//! total = max(0, base + distance_penalty + jamming_penalty - skill_bonus)
//! ```
//!
//! The skill bonus is clamped to the sum of the penalties so the total can
//! never go negative. A fleet inside a blackout region cannot receive orders
//! at all, which surfaces as [`RejectReason::Blackout`].
//!
//! # Example
//!
//! ```
//! use helmsman_core::prelude::*;
//!
//! let table = DelayTable::default();
//! let d = compute_delay(
//!     &table,
//!     CommanderSkill(2),
//!     100.0,
//!     JammingLevel::Interference,
//!     CommandType::Move,
//! )
//! .unwrap();
//! assert_eq!(d.base_delay, table.base_delay(CommandType::Move));
//! assert_eq!(d.jamming_penalty, table.interference_penalty);
//! assert_eq!(d.commander_skill_bonus, 2);
//! assert_eq!(
//!     d.total_delay,
//!     d.base_delay + d.distance_penalty + d.jamming_penalty - 2
//! );
//! ```

use serde::{Deserialize, Serialize};

use crate::command::CommandType;
use crate::error::RejectReason;
use crate::jamming::JammingLevel;

/// Command skill of the issuing commander.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct CommanderSkill(pub u32);

// ---------------------------------------------------------------------------
// DelayTable
// ---------------------------------------------------------------------------

/// Per-command-type base delays in ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseDelays {
    pub r#move: u64,
    pub parallel_move: u64,
    pub turn_180: u64,
    pub stop: u64,
    pub retreat: u64,
    pub surrender: u64,
    pub energy_distribution: u64,
    pub formation: u64,
    pub attack: u64,
    pub repair: u64,
}

impl Default for BaseDelays {
    fn default() -> Self {
        Self {
            r#move: 10,
            parallel_move: 10,
            turn_180: 8,
            stop: 5,
            retreat: 15,
            surrender: 5,
            energy_distribution: 6,
            formation: 20,
            attack: 30,
            repair: 25,
        }
    }
}

/// Every numeric constant of the delay model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayTable {
    pub base: BaseDelays,
    /// Ticks added per map unit of order distance.
    pub ticks_per_distance_unit: f64,
    /// Upper bound on the distance penalty.
    pub max_distance_penalty: u64,
    pub interference_penalty: u64,
    pub heavy_penalty: u64,
    /// Ticks removed per point of commander skill.
    pub skill_bonus_per_point: u64,
}

impl Default for DelayTable {
    fn default() -> Self {
        Self {
            base: BaseDelays::default(),
            ticks_per_distance_unit: 0.2,
            max_distance_penalty: 600,
            interference_penalty: 5,
            heavy_penalty: 15,
            skill_bonus_per_point: 1,
        }
    }
}

impl DelayTable {
    pub fn base_delay(&self, cmd: CommandType) -> u64 {
        let b = &self.base;
        match cmd {
            CommandType::Move => b.r#move,
            CommandType::ParallelMove => b.parallel_move,
            CommandType::Turn180 => b.turn_180,
            CommandType::Stop => b.stop,
            CommandType::Retreat => b.retreat,
            CommandType::Surrender => b.surrender,
            CommandType::EnergyDistribution => b.energy_distribution,
            CommandType::Formation => b.formation,
            CommandType::Attack => b.attack,
            CommandType::Repair => b.repair,
        }
    }

    /// Monotonically non-decreasing in `distance`. Negative, NaN and zero
    /// distances cost nothing; infinite distance saturates at the cap.
    pub fn distance_penalty(&self, distance: f64) -> u64 {
        if distance.is_nan() || distance <= 0.0 {
            return 0;
        }
        let raw = (distance * self.ticks_per_distance_unit.max(0.0)).floor();
        if raw >= self.max_distance_penalty as f64 {
            self.max_distance_penalty
        } else {
            raw as u64
        }
    }

    /// Step function of the jamming level. `None` means the order cannot be
    /// transmitted at all.
    pub fn jamming_penalty(&self, level: JammingLevel) -> Option<u64> {
        match level {
            JammingLevel::Clear => Some(0),
            JammingLevel::Interference => Some(self.interference_penalty),
            JammingLevel::Heavy => Some(self.heavy_penalty),
            JammingLevel::Blackout => None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.ticks_per_distance_unit.is_finite() || self.ticks_per_distance_unit < 0.0 {
            return Err(format!(
                "ticks_per_distance_unit must be finite and non-negative, got {}",
                self.ticks_per_distance_unit
            ));
        }
        if self.heavy_penalty < self.interference_penalty {
            return Err(format!(
                "heavy_penalty ({}) must not be below interference_penalty ({})",
                self.heavy_penalty, self.interference_penalty
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DelayBreakdown
// ---------------------------------------------------------------------------

/// How a command's delay was put together. All values are ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayBreakdown {
    pub base_delay: u64,
    pub distance_penalty: u64,
    pub jamming_penalty: u64,
    /// Bonus actually applied, after clamping.
    pub commander_skill_bonus: u64,
    pub total_delay: u64,
}

impl DelayBreakdown {
    /// A breakdown consisting only of a base delay.
    pub fn immediate(base_delay: u64) -> Self {
        Self {
            base_delay,
            total_delay: base_delay,
            ..Self::default()
        }
    }

    /// Delay expressed in seconds at the given tick rate.
    pub fn total_seconds(&self, tick_rate_hz: f64) -> f64 {
        self.total_delay as f64 / tick_rate_hz
    }
}

// ---------------------------------------------------------------------------
// compute_delay
// ---------------------------------------------------------------------------

/// Compute the transmission delay for one order.
///
/// Deterministic: identical inputs always give an identical breakdown.
///
/// # Errors
///
/// [`RejectReason::Blackout`] when `jamming` is [`JammingLevel::Blackout`].
pub fn compute_delay(
    table: &DelayTable,
    issuer: CommanderSkill,
    distance: f64,
    jamming: JammingLevel,
    cmd_type: CommandType,
) -> Result<DelayBreakdown, RejectReason> {
    let jamming_penalty = table
        .jamming_penalty(jamming)
        .ok_or(RejectReason::Blackout)?;
    let base_delay = table.base_delay(cmd_type);
    let distance_penalty = table.distance_penalty(distance);

    let gross = base_delay
        .saturating_add(distance_penalty)
        .saturating_add(jamming_penalty);
    let commander_skill_bonus = (issuer.0 as u64)
        .saturating_mul(table.skill_bonus_per_point)
        .min(gross);

    Ok(DelayBreakdown {
        base_delay,
        distance_penalty,
        jamming_penalty,
        commander_skill_bonus,
        total_delay: gross - commander_skill_bonus,
    })
}
