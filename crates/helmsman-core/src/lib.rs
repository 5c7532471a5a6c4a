//! Helmsman core -- delayed command admission, queueing and warp resolution.
//!
//! This crate holds the deterministic heart of the Helmsman scheduler. It
//! knows nothing about threads, clocks or clients: every function is a pure
//! transformation of the values it is handed, which is what lets a session be
//! replayed tick for tick from its seed and input log.
//!
//! - [`delay`]: how many ticks an order takes to reach its fleet.
//! - [`warp`]: where a warp jump actually lands.
//! - [`terrain`] / [`jamming`]: the static and dynamic map layers.
//! - [`admission`]: whether an order may be queued at all.
//! - [`queue`]: per-fleet ordering, superseding and exclusivity.
//! - [`shared`]: versioned copy-on-write cells for fields read by many
//!   sessions.
//!
//! # Quick Start
//!
//! ```
//! use helmsman_core::prelude::*;
//!
//! let fleet = Entity::new(EntityId(1), FactionId(0), CommanderId(7), Point::ZERO);
//! let commander = Commander::new(CommanderId(7), FactionId(0), 2, 10);
//! let terrain = TerrainField::new(200, 200);
//! let table = DelayTable::default();
//!
//! let ctx = AdmissionContext {
//!     now: 0,
//!     entity: &fleet,
//!     commander: &commander,
//!     jamming: JammingLevel::Interference,
//!     terrain: &terrain,
//!     target: None,
//!     delay_table: &table,
//!     cost: 1,
//! };
//!
//! let mut queue = CommandQueue::new(EntityId(1), QueueSettings::default());
//! let request = CommandRequest::move_to(EntityId(1), CommanderId(7), Point::new(100.0, 0.0));
//! let receipt = queue.submit(CommandId(1), request, &ctx).unwrap();
//! assert_eq!(receipt.command.execute_tick, 33);
//! ```

#![deny(unsafe_code)]

pub mod admission;
pub mod command;
pub mod delay;
pub mod entity;
pub mod error;
pub mod geometry;
pub mod jamming;
pub mod queue;
pub mod shared;
pub mod terrain;
pub mod warp;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::admission::{admit, Admission, AdmissionContext};
    pub use crate::command::{
        CancelReason, Command, CommandId, CommandRequest, CommandStatus, CommandType,
        ExclusivityGroup, Payload, Priority,
    };
    pub use crate::delay::{compute_delay, BaseDelays, CommanderSkill, DelayBreakdown, DelayTable};
    pub use crate::entity::{
        Commander, CommanderId, EnergyDistribution, Entity, EntityId, FactionId, Formation,
        DEFAULT_FLEET_SPEED, MAX_HULL,
    };
    pub use crate::error::{CancelError, EnqueueError, ExecutionFailure, RejectReason};
    pub use crate::geometry::{wrap_angle, Point};
    pub use crate::jamming::{JammingField, JammingLevel};
    pub use crate::queue::{
        CommandQueue, EffectOutcome, QueueSettings, QueueState, QueuedCommand, SubmitReceipt,
        Transition,
    };
    pub use crate::shared::{FieldSnapshot, SharedField};
    pub use crate::terrain::{TerrainCell, TerrainField, TerrainType, MAX_HAZARD};
    pub use crate::warp::{resolve_warp, WarpConfig, WarpError, WarpOutcome};
}
