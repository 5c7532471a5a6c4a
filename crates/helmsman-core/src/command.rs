//! Tactical commands and their lifecycle.
//!
//! A [`Command`] is created when a player order is accepted, waits in its
//! fleet's [`CommandQueue`](crate::queue::CommandQueue) until its execute
//! tick, and then moves through `Queued -> Executing -> Completed | Failed`,
//! or `Queued -> Cancelled`. Terminal commands are never mutated again.
//!
//! Every [`CommandType`] declares the [`ExclusivityGroup`] it belongs to. Two
//! commands of the same group cannot be executing for one fleet at the same
//! time, and a newly accepted command supersedes older queued commands of its
//! group.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::delay::DelayBreakdown;
use crate::entity::{CommanderId, EnergyDistribution, EntityId, Formation};
use crate::geometry::Point;
use crate::warp::WarpOutcome;

// ---------------------------------------------------------------------------
// CommandId
// ---------------------------------------------------------------------------

/// Session-unique command identifier, allocated in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId(pub u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// CommandType / ExclusivityGroup
// ---------------------------------------------------------------------------

/// Set of command types that cannot execute concurrently for one fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusivityGroup {
    /// Anything that changes where the fleet is going or whether it fights on.
    Movement,
    Combat,
    Formation,
    Energy,
    Maintenance,
}

/// The order a command carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    Move,
    Attack,
    Stop,
    Formation,
    EnergyDistribution,
    Retreat,
    Surrender,
    Repair,
    ParallelMove,
    #[serde(rename = "TURN_180")]
    Turn180,
}

impl CommandType {
    pub const ALL: [CommandType; 10] = [
        CommandType::Move,
        CommandType::Attack,
        CommandType::Stop,
        CommandType::Formation,
        CommandType::EnergyDistribution,
        CommandType::Retreat,
        CommandType::Surrender,
        CommandType::Repair,
        CommandType::ParallelMove,
        CommandType::Turn180,
    ];

    pub fn exclusivity_group(self) -> ExclusivityGroup {
        match self {
            CommandType::Move
            | CommandType::Stop
            | CommandType::Retreat
            | CommandType::Surrender
            | CommandType::ParallelMove
            | CommandType::Turn180 => ExclusivityGroup::Movement,
            CommandType::Attack => ExclusivityGroup::Combat,
            CommandType::Formation => ExclusivityGroup::Formation,
            CommandType::EnergyDistribution => ExclusivityGroup::Energy,
            CommandType::Repair => ExclusivityGroup::Maintenance,
        }
    }

    /// Whether two types may not execute concurrently for one fleet.
    pub fn conflicts_with(self, other: CommandType) -> bool {
        self.exclusivity_group() == other.exclusivity_group()
    }

    /// Whether `payload` has the shape this command type needs.
    pub fn accepts_payload(self, payload: &Payload) -> bool {
        matches!(
            (self, payload),
            (CommandType::Move, Payload::Position { .. } | Payload::Warp { .. })
                | (
                    CommandType::ParallelMove | CommandType::Retreat,
                    Payload::Position { .. }
                )
                | (CommandType::Attack, Payload::Entity { .. })
                | (CommandType::Formation, Payload::Formation { .. })
                | (CommandType::EnergyDistribution, Payload::Energy { .. })
                | (
                    CommandType::Stop
                        | CommandType::Surrender
                        | CommandType::Repair
                        | CommandType::Turn180,
                    Payload::None
                )
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandType::Move => "MOVE",
            CommandType::Attack => "ATTACK",
            CommandType::Stop => "STOP",
            CommandType::Formation => "FORMATION",
            CommandType::EnergyDistribution => "ENERGY_DISTRIBUTION",
            CommandType::Retreat => "RETREAT",
            CommandType::Surrender => "SURRENDER",
            CommandType::Repair => "REPAIR",
            CommandType::ParallelMove => "PARALLEL_MOVE",
            CommandType::Turn180 => "TURN_180",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Priority / CommandStatus / CancelReason
// ---------------------------------------------------------------------------

/// Urgency of a command. Higher priority wins ties on execute tick.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Queued,
    Executing,
    Completed,
    Cancelled,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommandStatus::Completed | CommandStatus::Cancelled | CommandStatus::Failed
        )
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: CommandStatus) -> bool {
        matches!(
            (self, next),
            (CommandStatus::Queued, CommandStatus::Executing)
                | (CommandStatus::Queued, CommandStatus::Cancelled)
                | (CommandStatus::Executing, CommandStatus::Completed)
                | (CommandStatus::Executing, CommandStatus::Failed)
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandStatus::Queued => "QUEUED",
            CommandStatus::Executing => "EXECUTING",
            CommandStatus::Completed => "COMPLETED",
            CommandStatus::Cancelled => "CANCELLED",
            CommandStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Why a queued command was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The player cancelled it.
    Player,
    /// A newer command of the same exclusivity group replaced it.
    Superseded,
    /// The session was stopped with a flushing shutdown.
    Shutdown,
    /// The fleet left the session and its queue went with it.
    EntityLost,
}

impl CancelReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CancelReason::Player => "player",
            CancelReason::Superseded => "superseded",
            CancelReason::Shutdown => "shutdown",
            CancelReason::EntityLost => "entity_lost",
        }
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Command-type-specific data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    None,
    /// Sub-light travel target.
    Position { target: Point },
    /// Warp jump, already resolved at submission.
    Warp { outcome: WarpOutcome },
    /// Another fleet (attack target).
    Entity { target: EntityId },
    Formation { formation: Formation },
    Energy { distribution: EnergyDistribution },
}

impl Payload {
    /// Point the command is aimed at, if it is positional.
    pub fn target_point(&self) -> Option<Point> {
        match self {
            Payload::Position { target } => Some(*target),
            Payload::Warp { outcome } => Some(outcome.requested_destination),
            _ => None,
        }
    }

    pub fn target_entity(&self) -> Option<EntityId> {
        match self {
            Payload::Entity { target } => Some(*target),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// CommandRequest
// ---------------------------------------------------------------------------

/// An order as issued by a player, before admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub entity_id: EntityId,
    pub issuer: CommanderId,
    pub command_type: CommandType,
    #[serde(default)]
    pub priority: Priority,
    pub payload: Payload,
}

impl CommandRequest {
    pub fn new(entity_id: EntityId, issuer: CommanderId, command_type: CommandType) -> Self {
        Self {
            entity_id,
            issuer,
            command_type,
            priority: Priority::Normal,
            payload: Payload::None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn move_to(entity_id: EntityId, issuer: CommanderId, target: Point) -> Self {
        Self::new(entity_id, issuer, CommandType::Move).with_payload(Payload::Position { target })
    }
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// An accepted command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: CommandId,
    pub entity_id: EntityId,
    pub issued_by: CommanderId,
    pub command_type: CommandType,
    pub priority: Priority,
    pub issue_tick: u64,
    pub payload: Payload,
    pub status: CommandStatus,
    /// Whether a player may cancel the command while it is queued.
    /// Emergency commands additionally lose this after their grace window.
    pub cancellable: bool,
    pub delay: DelayBreakdown,
    pub execute_tick: u64,
    /// Insertion sequence within the owning queue, the final FIFO tie-break.
    pub seq: u64,
    /// Tick at which the command reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_tick: Option<u64>,
}

impl Command {
    /// Build a queued command from an admitted request.
    pub fn from_request(
        id: CommandId,
        request: CommandRequest,
        issue_tick: u64,
        delay: DelayBreakdown,
    ) -> Self {
        Self {
            id,
            entity_id: request.entity_id,
            issued_by: request.issuer,
            command_type: request.command_type,
            priority: request.priority,
            issue_tick,
            payload: request.payload,
            status: CommandStatus::Queued,
            cancellable: true,
            execute_tick: issue_tick + delay.total_delay,
            delay,
            seq: 0,
            finished_tick: None,
        }
    }

    pub fn group(&self) -> ExclusivityGroup {
        self.command_type.exclusivity_group()
    }

    /// Move to `next` if the lifecycle allows it. Terminal commands and
    /// illegal transitions are left untouched and return `false`.
    pub fn transition(&mut self, next: CommandStatus, tick: u64) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_tick = Some(tick);
        }
        true
    }

    /// Whether a player may cancel this command at tick `now`.
    pub fn is_cancellable_at(&self, now: u64, emergency_grace_ticks: u64) -> bool {
        if self.status != CommandStatus::Queued || !self.cancellable {
            return false;
        }
        self.priority != Priority::Emergency
            || now.saturating_sub(self.issue_tick) <= emergency_grace_ticks
    }
}
