//! Engine configuration.
//!
//! [`EngineConfig`] gathers every tunable of a session: tick rate, the delay
//! model constants, warp rerolls, command-point costs, the emergency grace
//! window and the watchdog budget. All fields have defaults, so a config file
//! only needs to name what it changes:
//!
//! ```
//! use helmsman_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_json_str(r#"{ "tick_rate_hz": 20.0, "delay": { "heavy_penalty": 30 } }"#)
//!     .unwrap();
//! assert_eq!(config.tick_rate_hz, 20.0);
//! assert_eq!(config.delay.heavy_penalty, 30);
//! assert_eq!(config.delay.interference_penalty, 5);
//! ```

use std::time::Duration;

use helmsman_core::command::CommandType;
use helmsman_core::delay::DelayTable;
use helmsman_core::queue::QueueSettings;
use helmsman_core::warp::WarpConfig;
use serde::{Deserialize, Serialize};

use crate::movement::TravelMode;

// ---------------------------------------------------------------------------
// CommandCostTable
// ---------------------------------------------------------------------------

/// Command-point cost per command type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandCostTable {
    pub r#move: u32,
    pub parallel_move: u32,
    pub turn_180: u32,
    pub stop: u32,
    pub retreat: u32,
    pub surrender: u32,
    pub energy_distribution: u32,
    pub formation: u32,
    pub attack: u32,
    pub repair: u32,
}

impl Default for CommandCostTable {
    fn default() -> Self {
        Self {
            r#move: 1,
            parallel_move: 1,
            turn_180: 1,
            stop: 0,
            retreat: 1,
            surrender: 0,
            energy_distribution: 1,
            formation: 2,
            attack: 3,
            repair: 2,
        }
    }
}

impl CommandCostTable {
    /// A table where every command is free.
    pub fn free() -> Self {
        Self {
            r#move: 0,
            parallel_move: 0,
            turn_180: 0,
            stop: 0,
            retreat: 0,
            surrender: 0,
            energy_distribution: 0,
            formation: 0,
            attack: 0,
            repair: 0,
        }
    }

    pub fn cost(&self, cmd: CommandType) -> u32 {
        match cmd {
            CommandType::Move => self.r#move,
            CommandType::ParallelMove => self.parallel_move,
            CommandType::Turn180 => self.turn_180,
            CommandType::Stop => self.stop,
            CommandType::Retreat => self.retreat,
            CommandType::Surrender => self.surrender,
            CommandType::EnergyDistribution => self.energy_distribution,
            CommandType::Formation => self.formation,
            CommandType::Attack => self.attack,
            CommandType::Repair => self.repair,
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Simulated ticks per second.
    pub tick_rate_hz: f64,
    pub delay: DelayTable,
    pub warp: WarpConfig,
    pub command_costs: CommandCostTable,
    /// Whether position orders jump to their target on the execute tick or
    /// travel there at fleet speed.
    pub travel: TravelMode,
    /// Ticks after issuance during which an EMERGENCY command stays
    /// cancellable.
    pub emergency_grace_ticks: u64,
    /// Wall-clock budget for one tick. Overrunning it pauses the session.
    pub watchdog_budget_ms: u64,
    /// Terminal commands each queue remembers for status lookups.
    pub history_limit: usize,
    /// Command points every commander regains per tick.
    pub cp_regen_per_tick: u32,
    /// Events kept in each session's journal.
    pub journal_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 10.0,
            delay: DelayTable::default(),
            warp: WarpConfig::default(),
            command_costs: CommandCostTable::default(),
            travel: TravelMode::Immediate,
            emergency_grace_ticks: 20,
            watchdog_budget_ms: 50,
            history_limit: 256,
            cp_regen_per_tick: 0,
            journal_capacity: helmsman_broadcast::journal::DEFAULT_JOURNAL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed JSON, [`ConfigError::Invalid`] if
    /// a value is out of range.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_rate_hz > 0.0 && self.tick_rate_hz.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "tick_rate_hz",
                reason: format!("must be positive and finite, got {}", self.tick_rate_hz),
            });
        }
        self.delay.validate().map_err(|reason| ConfigError::Invalid {
            field: "delay",
            reason,
        })?;
        if self.watchdog_budget_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "watchdog_budget_ms",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    /// Simulated seconds per tick.
    pub fn dt(&self) -> f64 {
        1.0 / self.tick_rate_hz
    }

    /// Wall-clock period between ticks of a real-time runner.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.dt())
    }

    pub fn watchdog_budget(&self) -> Duration {
        Duration::from_millis(self.watchdog_budget_ms)
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            emergency_grace_ticks: self.emergency_grace_ticks,
            history_limit: self.history_limit,
        }
    }
}
