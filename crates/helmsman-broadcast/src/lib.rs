//! Helmsman broadcast - events, state deltas and client fan-out.
//!
//! This crate turns what a session's tick loop did into something clients
//! can consume.
//!
//! # Modules
//!
//! - [`event`]: [`SchedulerEvent`](event::SchedulerEvent), one per observable
//!   command transition, warp landing, combat engagement or alert.
//! - [`delta`]: per-tick [`StateDelta`](delta::StateDelta) and the
//!   `game:state-update` push envelope.
//! - [`journal`]: bounded, queryable history of recent events.
//! - [`broadcaster`]: subscriber management, full snapshot on (re)connect.

#![deny(unsafe_code)]

pub mod broadcaster;
pub mod delta;
pub mod event;
pub mod journal;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::broadcaster::{StateBroadcaster, SubscriberId, Subscription};
    pub use crate::delta::{CombatEngagement, FleetState, PushMessage, StateDelta, STATE_UPDATE_EVENT};
    pub use crate::event::{AlertKind, SchedulerEvent};
    pub use crate::journal::{EventJournal, DEFAULT_JOURNAL_CAPACITY};
}
