//! Per-tick state deltas pushed to clients.
//!
//! A [`StateDelta`] lists only what changed during one tick: the fleets whose
//! state moved, combat engagements that started, the warp outcome if a jump
//! landed, and the scheduler events raised. Clients apply deltas in order
//! and only ever receive a full snapshot (`full == true`) when they
//! (re)connect.

use helmsman_core::command::CommandId;
use helmsman_core::entity::{EnergyDistribution, Entity, EntityId, FactionId, Formation};
use helmsman_core::geometry::Point;
use helmsman_core::queue::CommandQueue;
use helmsman_core::warp::WarpOutcome;
use serde::{Deserialize, Serialize};

use crate::event::SchedulerEvent;

/// Push event name under which deltas are delivered.
pub const STATE_UPDATE_EVENT: &str = "game:state-update";

// ---------------------------------------------------------------------------
// FleetState
// ---------------------------------------------------------------------------

/// Client-facing view of one fleet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetState {
    pub id: EntityId,
    pub faction: FactionId,
    pub position: Point,
    pub heading: f64,
    pub speed: f64,
    pub velocity: Point,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Point>,
    pub formation: Formation,
    pub energy: EnergyDistribution,
    pub hull: u32,
    pub surrendered: bool,
    /// Number of queued (not yet executing) commands.
    pub queue_len: usize,
    /// Commands currently executing for this fleet.
    pub executing: Vec<CommandId>,
}

impl FleetState {
    pub fn capture(entity: &Entity, queue: Option<&CommandQueue>) -> Self {
        Self {
            id: entity.id,
            faction: entity.faction,
            position: entity.position,
            heading: entity.heading,
            speed: entity.speed,
            velocity: entity.velocity,
            destination: entity.destination,
            formation: entity.formation,
            energy: entity.energy,
            hull: entity.hull,
            surrendered: entity.surrendered,
            queue_len: queue.map_or(0, CommandQueue::len),
            executing: queue
                .map(|q| q.executing_commands().map(|c| c.id).collect())
                .unwrap_or_default(),
        }
    }
}

/// An attack that reached its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatEngagement {
    pub attacker: EntityId,
    pub target: EntityId,
    pub command_id: CommandId,
    pub tick: u64,
}

// ---------------------------------------------------------------------------
// StateDelta
// ---------------------------------------------------------------------------

/// Everything that changed during one tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDelta {
    pub tick: u64,
    /// `true` for the snapshot sent on (re)connect.
    #[serde(default)]
    pub full: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fleets: Vec<FleetState>,
    /// Fleets that left the session this tick.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combats: Vec<CombatEngagement>,
    /// Most recent warp landing this tick. Every landing is also reported as
    /// a `warpResolved` event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warp_outcome: Option<WarpOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<SchedulerEvent>,
}

impl StateDelta {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            ..Self::default()
        }
    }

    /// A full snapshot of `fleets` at `tick`.
    pub fn snapshot(tick: u64, fleets: Vec<FleetState>) -> Self {
        Self {
            tick,
            full: true,
            fleets,
            ..Self::default()
        }
    }

    /// A delta carrying only events (submission and cancellation replies).
    pub fn events_only(tick: u64, events: Vec<SchedulerEvent>) -> Self {
        Self {
            tick,
            events,
            ..Self::default()
        }
    }

    /// `true` if the delta carries nothing a client would need to apply.
    pub fn is_empty(&self) -> bool {
        !self.full
            && self.fleets.is_empty()
            && self.removed.is_empty()
            && self.combats.is_empty()
            && self.warp_outcome.is_none()
            && self.events.is_empty()
    }

    pub fn fleet(&self, id: EntityId) -> Option<&FleetState> {
        self.fleets.iter().find(|f| f.id == id)
    }
}

// ---------------------------------------------------------------------------
// PushMessage
// ---------------------------------------------------------------------------

/// A named push event as it goes over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub event: String,
    pub payload: StateDelta,
}

impl PushMessage {
    pub fn state_update(delta: StateDelta) -> Self {
        Self {
            event: STATE_UPDATE_EVENT.to_owned(),
            payload: delta,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
