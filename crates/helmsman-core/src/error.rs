//! Rejection and failure taxonomy.
//!
//! Every variant carries a machine-readable [`code`](RejectReason::code) and a
//! human-readable `Display` message, so clients never have to infer success
//! from the absence of an error.

use crate::command::{CommandId, CommandStatus, CommandType};
use crate::entity::{CommanderId, EntityId};
use crate::geometry::Point;

/// Why an order was refused at submission. No queue state changes when this
/// is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectReason {
    #[error("fleet {0} does not exist")]
    UnknownEntity(EntityId),

    #[error("commander {0} does not exist")]
    UnknownCommander(CommanderId),

    #[error("commander {commander} does not control fleet {entity}")]
    NotController {
        commander: CommanderId,
        entity: EntityId,
    },

    #[error("fleet is inside a communications blackout")]
    Blackout,

    #[error("target {0} lies outside the map")]
    OutOfBounds(Point),

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("destination {0} cannot hold a fleet")]
    ImpassableDestination(Point),

    #[error("{command_type} does not accept this payload: {details}")]
    InvalidPayload {
        command_type: CommandType,
        details: String,
    },

    #[error("not enough command points: need {required}, have {available}")]
    InsufficientCommandPoints { required: u32, available: u32 },

    #[error("{command_type} is not allowed while the fleet is {state}")]
    InvalidForState {
        command_type: CommandType,
        state: String,
    },

    #[error("session has halted and accepts no further orders")]
    SessionHalted,

    #[error("session is not reachable")]
    SessionUnavailable,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::UnknownEntity(_) => "unknown_entity",
            RejectReason::UnknownCommander(_) => "unknown_commander",
            RejectReason::NotController { .. } => "not_controller",
            RejectReason::Blackout => "blackout",
            RejectReason::OutOfBounds(_) => "out_of_bounds",
            RejectReason::InvalidTarget(_) => "invalid_target",
            RejectReason::ImpassableDestination(_) => "impassable_destination",
            RejectReason::InvalidPayload { .. } => "invalid_payload",
            RejectReason::InsufficientCommandPoints { .. } => "insufficient_cp",
            RejectReason::InvalidForState { .. } => "invalid_for_state",
            RejectReason::SessionHalted => "session_halted",
            RejectReason::SessionUnavailable => "session_unavailable",
        }
    }
}

/// Why a cancellation request was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CancelError {
    #[error("command {0} is unknown")]
    UnknownCommand(CommandId),

    #[error("command {id} is {status}, only queued commands can be cancelled")]
    NotQueued { id: CommandId, status: CommandStatus },

    #[error("command {0} can no longer be cancelled")]
    NotCancellable(CommandId),

    #[error("session is not reachable")]
    SessionUnavailable,
}

impl CancelError {
    pub fn code(&self) -> &'static str {
        match self {
            CancelError::UnknownCommand(_) => "unknown_command",
            CancelError::NotQueued { .. } => "not_queued",
            CancelError::NotCancellable(_) => "not_cancellable",
            CancelError::SessionUnavailable => "session_unavailable",
        }
    }
}

/// Why a pre-built command could not be put on a queue.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnqueueError {
    #[error("command {id} is {status}, only QUEUED commands can be enqueued")]
    NotQueued { id: CommandId, status: CommandStatus },

    #[error("command {id} belongs to fleet {owner}, not {queue}")]
    WrongEntity {
        id: CommandId,
        owner: EntityId,
        queue: EntityId,
    },

    #[error("command {0} is already queued")]
    Duplicate(CommandId),
}

/// Why an executing command could not be applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionFailure {
    #[error("fleet {0} no longer exists")]
    EntityMissing(EntityId),

    #[error("target fleet {0} no longer exists")]
    TargetMissing(EntityId),

    #[error("target fleet {0} is not a valid hostile target")]
    TargetNotHostile(EntityId),

    #[error("{command_type} cannot be applied while the fleet is {state}")]
    InvalidForState {
        command_type: CommandType,
        state: String,
    },

    #[error("destination {0} is no longer passable")]
    Impassable(Point),

    #[error("effect application aborted: {0}")]
    Aborted(String),
}

impl ExecutionFailure {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionFailure::EntityMissing(_) => "entity_missing",
            ExecutionFailure::TargetMissing(_) => "target_missing",
            ExecutionFailure::TargetNotHostile(_) => "target_not_hostile",
            ExecutionFailure::InvalidForState { .. } => "invalid_for_state",
            ExecutionFailure::Impassable(_) => "impassable",
            ExecutionFailure::Aborted(_) => "aborted",
        }
    }
}
