//! Helmsman Engine -- per-battle command scheduling with delayed execution.
//!
//! This crate builds on [`helmsman_core`] and [`helmsman_broadcast`] to run
//! battles: a [`Session`](session::Session) holds one battle's fleets and
//! queues, a [`TickScheduler`](scheduler::TickScheduler) steps it at a fixed
//! rate, and the [`runner`] and [`registry`] modules put each session on its
//! own thread.
//!
//! # Quick Start
//!
//! ```
//! use helmsman_engine::prelude::*;
//!
//! let terrain = SharedField::new(TerrainField::new(200, 200));
//! let jamming = SharedField::new(
//!     JammingField::new(200, 200, 200).with_region(0, 0, JammingLevel::Interference),
//! );
//! let mut session = Session::new(SessionId(1), EngineConfig::default(), terrain, jamming, 42);
//! session.add_commander(Commander::new(CommanderId(1), FactionId(0), 2, 10));
//! session.add_entity(Entity::new(EntityId(1), FactionId(0), CommanderId(1), Point::ZERO));
//!
//! let mut scheduler = TickScheduler::new(session);
//! let queued = scheduler
//!     .submit(CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(100.0, 0.0)))
//!     .unwrap();
//! assert_eq!(queued.execute_tick, 33);
//!
//! scheduler.start().unwrap();
//! scheduler.run_ticks(33).unwrap();
//! let fleet = scheduler.session().entity(EntityId(1)).unwrap();
//! assert_eq!(fleet.position, Point::new(100.0, 0.0));
//! assert_eq!(
//!     scheduler.session().queue(EntityId(1)).unwrap().get(queued.id).unwrap().status,
//!     CommandStatus::Completed,
//! );
//! ```

#![deny(unsafe_code)]

pub mod api;
pub mod checkpoint;
pub mod config;
pub mod effects;
pub mod movement;
pub mod registry;
pub mod replay;
pub mod runner;
pub mod scheduler;
pub mod session;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the core crate for convenience.
pub use helmsman_core;

/// Re-export the broadcast crate for convenience.
pub use helmsman_broadcast;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    pub use helmsman_broadcast::prelude::*;
    pub use helmsman_core::prelude::*;

    pub use crate::api::{
        Api, ApiError, ApiResponse, CancelCommandRequest, CancelResponse, CommandQueueQuery,
        IssueCommandRequest, MoveFleetData, MoveFleetRequest, TerrainQuery,
    };
    pub use crate::checkpoint::{FleetRecord, SessionCheckpoint};
    pub use crate::config::{CommandCostTable, ConfigError, EngineConfig};
    pub use crate::effects::{
        EffectApplier, EffectContext, EffectError, EffectLog, FleetMap, StandardEffects,
    };
    pub use crate::movement::TravelMode;
    pub use crate::registry::{RegistryError, SessionRegistry};
    pub use crate::replay::{
        replay, ReplayDivergence, ReplayEntry, ReplayLog, ReplayRecorder, ReplayResult,
    };
    pub use crate::runner::{HandleError, SessionHandle, SessionStatus};
    pub use crate::scheduler::{
        SchedulerError, SchedulerState, ShutdownMode, TickDiagnostics, TickScheduler,
    };
    pub use crate::session::{MoveOrder, MoveReceipt, Session, SessionError, SessionId, SessionInput};
}
