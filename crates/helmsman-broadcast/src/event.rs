//! Scheduler events.
//!
//! Every observable step of a command's life produces exactly one
//! [`SchedulerEvent`]: acceptance, cancellation (by the player or by
//! superseding), execution start, completion and failure. Warp resolutions,
//! combat engagements and operator alerts are reported the same way, so a
//! client can reconstruct the whole session from the event stream alone.
//!
//! Events serialize as internally tagged JSON objects:
//!
//! ```
//! use helmsman_broadcast::event::SchedulerEvent;
//! use helmsman_core::prelude::*;
//!
//! let event = SchedulerEvent::Cancelled {
//!     tick: 4,
//!     command_id: CommandId(1),
//!     entity_id: EntityId(9),
//!     reason: CancelReason::Superseded,
//!     superseded_by: Some(CommandId(2)),
//! };
//! let json = serde_json::to_value(&event).unwrap();
//! assert_eq!(json["type"], "cancelled");
//! assert_eq!(json["reason"], "superseded");
//! ```

use helmsman_core::command::{CancelReason, Command, CommandId, CommandType, Priority};
use helmsman_core::delay::DelayBreakdown;
use helmsman_core::entity::EntityId;
use helmsman_core::queue::Transition;
use helmsman_core::warp::WarpOutcome;
use serde::{Deserialize, Serialize};

/// Operator-facing alert categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Tick processing overran its budget and the session was paused.
    WatchdogPause,
    /// An unrecoverable error stopped the session's tick loop.
    SessionHalted,
}

/// One observable scheduler occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SchedulerEvent {
    Queued {
        tick: u64,
        command_id: CommandId,
        entity_id: EntityId,
        command_type: CommandType,
        priority: Priority,
        execute_tick: u64,
        delay: DelayBreakdown,
    },
    Cancelled {
        tick: u64,
        command_id: CommandId,
        entity_id: EntityId,
        reason: CancelReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        superseded_by: Option<CommandId>,
    },
    Executing {
        tick: u64,
        command_id: CommandId,
        entity_id: EntityId,
        command_type: CommandType,
    },
    Completed {
        tick: u64,
        command_id: CommandId,
        entity_id: EntityId,
        command_type: CommandType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interrupted_by: Option<CommandId>,
    },
    Failed {
        tick: u64,
        command_id: CommandId,
        entity_id: EntityId,
        command_type: CommandType,
        code: String,
        message: String,
    },
    WarpResolved {
        tick: u64,
        entity_id: EntityId,
        outcome: WarpOutcome,
    },
    CombatEngaged {
        tick: u64,
        command_id: CommandId,
        attacker: EntityId,
        target: EntityId,
    },
    Alert {
        tick: u64,
        kind: AlertKind,
        message: String,
    },
}

impl SchedulerEvent {
    pub fn queued(tick: u64, cmd: &Command) -> Self {
        SchedulerEvent::Queued {
            tick,
            command_id: cmd.id,
            entity_id: cmd.entity_id,
            command_type: cmd.command_type,
            priority: cmd.priority,
            execute_tick: cmd.execute_tick,
            delay: cmd.delay,
        }
    }

    pub fn cancelled(
        tick: u64,
        cmd: &Command,
        reason: CancelReason,
        superseded_by: Option<CommandId>,
    ) -> Self {
        SchedulerEvent::Cancelled {
            tick,
            command_id: cmd.id,
            entity_id: cmd.entity_id,
            reason,
            superseded_by,
        }
    }

    /// The event describing a queue [`Transition`].
    pub fn from_transition(tick: u64, transition: &Transition) -> Self {
        match transition {
            Transition::Executing(cmd) => SchedulerEvent::Executing {
                tick,
                command_id: cmd.id,
                entity_id: cmd.entity_id,
                command_type: cmd.command_type,
            },
            Transition::Completed {
                command,
                interrupted_by,
            } => SchedulerEvent::Completed {
                tick,
                command_id: command.id,
                entity_id: command.entity_id,
                command_type: command.command_type,
                interrupted_by: *interrupted_by,
            },
            Transition::Failed { command, failure } => SchedulerEvent::Failed {
                tick,
                command_id: command.id,
                entity_id: command.entity_id,
                command_type: command.command_type,
                code: failure.code().to_owned(),
                message: failure.to_string(),
            },
        }
    }

    /// A `Completed` event for a command finished outside a queue tick
    /// (arrival of an in-flight movement).
    pub fn completed(tick: u64, cmd: &Command) -> Self {
        SchedulerEvent::Completed {
            tick,
            command_id: cmd.id,
            entity_id: cmd.entity_id,
            command_type: cmd.command_type,
            interrupted_by: None,
        }
    }

    pub fn alert(tick: u64, kind: AlertKind, message: impl Into<String>) -> Self {
        SchedulerEvent::Alert {
            tick,
            kind,
            message: message.into(),
        }
    }

    pub fn tick(&self) -> u64 {
        match self {
            SchedulerEvent::Queued { tick, .. }
            | SchedulerEvent::Cancelled { tick, .. }
            | SchedulerEvent::Executing { tick, .. }
            | SchedulerEvent::Completed { tick, .. }
            | SchedulerEvent::Failed { tick, .. }
            | SchedulerEvent::WarpResolved { tick, .. }
            | SchedulerEvent::CombatEngaged { tick, .. }
            | SchedulerEvent::Alert { tick, .. } => *tick,
        }
    }

    pub fn command_id(&self) -> Option<CommandId> {
        match self {
            SchedulerEvent::Queued { command_id, .. }
            | SchedulerEvent::Cancelled { command_id, .. }
            | SchedulerEvent::Executing { command_id, .. }
            | SchedulerEvent::Completed { command_id, .. }
            | SchedulerEvent::Failed { command_id, .. }
            | SchedulerEvent::CombatEngaged { command_id, .. } => Some(*command_id),
            SchedulerEvent::WarpResolved { .. } | SchedulerEvent::Alert { .. } => None,
        }
    }

    /// Fleet the event concerns. Combat events report the attacker.
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            SchedulerEvent::Queued { entity_id, .. }
            | SchedulerEvent::Cancelled { entity_id, .. }
            | SchedulerEvent::Executing { entity_id, .. }
            | SchedulerEvent::Completed { entity_id, .. }
            | SchedulerEvent::Failed { entity_id, .. }
            | SchedulerEvent::WarpResolved { entity_id, .. } => Some(*entity_id),
            SchedulerEvent::CombatEngaged { attacker, .. } => Some(*attacker),
            SchedulerEvent::Alert { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerEvent::Queued { .. } => "queued",
            SchedulerEvent::Cancelled { .. } => "cancelled",
            SchedulerEvent::Executing { .. } => "executing",
            SchedulerEvent::Completed { .. } => "completed",
            SchedulerEvent::Failed { .. } => "failed",
            SchedulerEvent::WarpResolved { .. } => "warpResolved",
            SchedulerEvent::CombatEngaged { .. } => "combatEngaged",
            SchedulerEvent::Alert { .. } => "alert",
        }
    }
}
