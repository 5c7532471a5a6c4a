//! One simulated battle.
//!
//! A [`Session`] owns the fleets, commanders and per-fleet command queues of
//! a battle, plus the seeded RNG used for warp resolution. It is the only
//! writer of fleet state and command status for its battle. Terrain and
//! jamming are shared with other sessions through [`SharedField`]s and are
//! only ever read here, through one snapshot per tick.
//!
//! Each call to [`Session::step`] advances the tick counter by one and:
//!
//! 1. refreshes the jamming snapshot if a world event published a new one,
//! 2. regenerates commander command points,
//! 3. executes every due command in every queue,
//! 4. integrates sub-light movement and completes arrived travel orders,
//! 5. returns a [`StateDelta`] describing what changed.
//!
//! `submit`, `move_fleet` and `cancel` may be called between steps. Their
//! events are buffered and delivered with the next delta unless the caller
//! drains them first with [`Session::drain_events`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use helmsman_broadcast::delta::{FleetState, StateDelta};
use helmsman_broadcast::event::SchedulerEvent;
use helmsman_core::admission::{admit, AdmissionContext};
use helmsman_core::command::{
    CancelReason, Command, CommandId, CommandRequest, ExclusivityGroup, Payload, Priority,
};
use helmsman_core::entity::{Commander, CommanderId, Entity, EntityId};
use helmsman_core::error::{CancelError, ExecutionFailure, RejectReason};
use helmsman_core::geometry::Point;
use helmsman_core::jamming::{JammingField, JammingLevel};
use helmsman_core::queue::{CommandQueue, QueuedCommand, Transition};
use helmsman_core::shared::SharedField;
use helmsman_core::terrain::{TerrainCell, TerrainField};
use helmsman_core::warp::{resolve_warp, WarpError, WarpOutcome};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::effects::{EffectApplier, EffectContext, EffectError, EffectLog, FleetMap, StandardEffects};
use crate::movement::{integrate, MovementStep};

// ---------------------------------------------------------------------------
// Identifiers and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Unrecoverable conditions. Any of these halts the session's tick loop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("command queue of {entity} is corrupt: {details}")]
    CorruptQueue { entity: EntityId, details: String },

    #[error("state diverged at tick {tick}: expected hash {expected}, found {actual}")]
    RngDesync {
        tick: u64,
        expected: String,
        actual: String,
    },

    #[error("effect applier failed fatally on {command}: {reason}")]
    EffectFatal { command: CommandId, reason: String },

    #[error("session halted: {0}")]
    Halted(String),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::CorruptQueue { .. } => "corrupt_queue",
            SessionError::RngDesync { .. } => "rng_desync",
            SessionError::EffectFatal { .. } => "effect_fatal",
            SessionError::Halted(_) => "session_halted",
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A fleet movement order, optionally by warp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveOrder {
    pub entity_id: EntityId,
    pub issuer: CommanderId,
    pub target: Point,
    #[serde(default)]
    pub warp: bool,
    #[serde(default)]
    pub priority: Priority,
}

/// Accepted movement order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveReceipt {
    pub queued_command: QueuedCommand,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warp_outcome: Option<WarpOutcome>,
}

/// Everything that can reach a session from outside its tick loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SessionInput {
    Submit { request: CommandRequest },
    MoveFleet { order: MoveOrder },
    Cancel { command_id: CommandId },
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    id: SessionId,
    config: EngineConfig,
    tick: u64,
    fleets: FleetMap,
    commanders: BTreeMap<CommanderId, Commander>,
    queues: BTreeMap<EntityId, CommandQueue>,
    terrain: SharedField<TerrainField>,
    jamming: SharedField<JammingField>,
    jamming_version: u64,
    seed: u64,
    rng: Pcg64,
    next_command_id: u64,
    applier: Box<dyn EffectApplier>,
    dirty: BTreeSet<EntityId>,
    removed: Vec<EntityId>,
    pending_events: Vec<SchedulerEvent>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("tick", &self.tick)
            .field("fleets", &self.fleets.len())
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        id: SessionId,
        config: EngineConfig,
        terrain: SharedField<TerrainField>,
        jamming: SharedField<JammingField>,
        seed: u64,
    ) -> Self {
        let jamming_version = jamming.version();
        Self {
            id,
            config,
            tick: 0,
            fleets: FleetMap::new(),
            commanders: BTreeMap::new(),
            queues: BTreeMap::new(),
            terrain,
            jamming,
            jamming_version,
            seed,
            rng: Pcg64::seed_from_u64(seed),
            next_command_id: 1,
            applier: Box::new(StandardEffects),
            dirty: BTreeSet::new(),
            removed: Vec::new(),
            pending_events: Vec::new(),
        }
    }

    /// Replace the effect applier.
    pub fn with_applier(mut self, applier: Box<dyn EffectApplier>) -> Self {
        self.applier = applier;
        self
    }

    // -- roster -------------------------------------------------------------

    /// Add a fleet together with its empty command queue.
    pub fn add_entity(&mut self, entity: Entity) {
        let id = entity.id;
        self.queues
            .insert(id, CommandQueue::new(id, self.config.queue_settings()));
        self.fleets.insert(id, entity);
        self.dirty.insert(id);
    }

    pub fn add_commander(&mut self, commander: Commander) {
        self.commanders.insert(commander.id, commander);
    }

    /// Remove a fleet. Its queue is destroyed with it: in-flight commands
    /// are reported failed and queued ones cancelled.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let entity = self.fleets.remove(&id)?;
        if let Some(mut queue) = self.queues.remove(&id) {
            let groups: Vec<ExclusivityGroup> =
                queue.executing_commands().map(Command::group).collect();
            for group in groups {
                if let Some(cmd) = queue.fail_in_flight(group, self.tick) {
                    self.pending_events.push(SchedulerEvent::from_transition(
                        self.tick,
                        &Transition::Failed {
                            command: cmd,
                            failure: ExecutionFailure::EntityMissing(id),
                        },
                    ));
                }
            }
            for cmd in queue.cancel_all(CancelReason::EntityLost, self.tick) {
                self.pending_events.push(SchedulerEvent::cancelled(
                    self.tick,
                    &cmd,
                    CancelReason::EntityLost,
                    None,
                ));
            }
        }
        self.dirty.remove(&id);
        self.removed.push(id);
        debug!(session = %self.id, entity = %id, "fleet removed");
        Some(entity)
    }

    // -- submission ---------------------------------------------------------

    /// Admit and queue a command.
    ///
    /// # Errors
    ///
    /// The [`RejectReason`] of the first failed check. Nothing is queued
    /// and no command points are spent.
    pub fn submit(&mut self, request: CommandRequest) -> Result<QueuedCommand, RejectReason> {
        let terrain = self.terrain.snapshot();
        let jamming = self.jamming.snapshot();
        match self.enqueue(request, &terrain, &jamming) {
            Ok(cmd) => Ok(self.view(&cmd)),
            Err(reason) => {
                warn!(session = %self.id, code = reason.code(), %reason, "command rejected");
                Err(reason)
            }
        }
    }

    /// Queue a movement order. Warp orders are resolved here, so an
    /// impassable destination is reported synchronously and the outcome is
    /// returned with the receipt.
    ///
    /// # Errors
    ///
    /// Any [`RejectReason`]; for warps also
    /// [`RejectReason::ImpassableDestination`] when no landing exists.
    pub fn move_fleet(&mut self, order: MoveOrder) -> Result<MoveReceipt, RejectReason> {
        let position_request = CommandRequest::move_to(order.entity_id, order.issuer, order.target)
            .with_priority(order.priority);
        if !order.warp {
            return self.submit(position_request).map(|queued_command| MoveReceipt {
                queued_command,
                warp_outcome: None,
            });
        }

        let terrain = self.terrain.snapshot();
        let jamming = self.jamming.snapshot();
        let outcome = self
            .admit_only(&position_request, &terrain, &jamming)
            .and_then(|origin| {
                resolve_warp(origin, order.target, &terrain, &mut self.rng, &self.config.warp)
                    .map_err(|e| match e {
                        WarpError::ImpassableDestination(p) => RejectReason::ImpassableDestination(p),
                        WarpError::OutOfBounds(p) => RejectReason::OutOfBounds(p),
                    })
            });
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(reason) => {
                warn!(session = %self.id, code = reason.code(), %reason, "warp rejected");
                return Err(reason);
            }
        };

        let warp_request = position_request.with_payload(Payload::Warp {
            outcome: outcome.clone(),
        });
        let cmd = self.enqueue(warp_request, &terrain, &jamming)?;
        debug!(
            session = %self.id,
            entity = %order.entity_id,
            requested = %outcome.requested_destination,
            landing = %outcome.final_destination,
            rerolls = outcome.rerolls,
            "warp resolved"
        );
        self.pending_events.push(SchedulerEvent::WarpResolved {
            tick: self.tick,
            entity_id: order.entity_id,
            outcome: outcome.clone(),
        });
        Ok(MoveReceipt {
            queued_command: self.view(&cmd),
            warp_outcome: Some(outcome),
        })
    }

    /// Cancel a queued command on the player's behalf.
    ///
    /// # Errors
    ///
    /// [`CancelError`] if the command is unknown, no longer queued, or past
    /// its emergency grace window.
    pub fn cancel(&mut self, id: CommandId) -> Result<Command, CancelError> {
        let now = self.tick;
        let queue = self
            .queues
            .values_mut()
            .find(|q| q.get(id).is_some())
            .ok_or(CancelError::UnknownCommand(id))?;
        match queue.cancel(id, now) {
            Ok(cmd) => {
                self.pending_events
                    .push(SchedulerEvent::cancelled(now, &cmd, CancelReason::Player, None));
                self.dirty.insert(cmd.entity_id);
                Ok(cmd)
            }
            Err(err) => {
                debug!(session = %self.id, command = %id, code = err.code(), "cancel refused");
                Err(err)
            }
        }
    }

    /// Apply a recorded input. Returns whether it was accepted.
    pub fn apply_input(&mut self, input: SessionInput) -> bool {
        match input {
            SessionInput::Submit { request } => self.submit(request).is_ok(),
            SessionInput::MoveFleet { order } => self.move_fleet(order).is_ok(),
            SessionInput::Cancel { command_id } => self.cancel(command_id).is_ok(),
        }
    }

    /// Run admission without queueing. Returns the fleet's position.
    fn admit_only(
        &self,
        request: &CommandRequest,
        terrain: &TerrainField,
        jamming: &JammingField,
    ) -> Result<Point, RejectReason> {
        let ctx = admission_context(
            request,
            self.tick,
            &self.fleets,
            &self.commanders,
            &self.config,
            terrain,
            jamming,
        )?;
        admit(request, &ctx)?;
        Ok(ctx.entity.position)
    }

    fn enqueue(
        &mut self,
        request: CommandRequest,
        terrain: &TerrainField,
        jamming: &JammingField,
    ) -> Result<Command, RejectReason> {
        let id = CommandId(self.next_command_id);
        let entity_id = request.entity_id;
        let issuer = request.issuer;

        let receipt = {
            let ctx = admission_context(
                &request,
                self.tick,
                &self.fleets,
                &self.commanders,
                &self.config,
                terrain,
                jamming,
            )?;
            let queue = self
                .queues
                .get_mut(&entity_id)
                .ok_or(RejectReason::UnknownEntity(entity_id))?;
            queue.submit(id, request, &ctx)?
        };

        self.next_command_id += 1;
        if let Some(commander) = self.commanders.get_mut(&issuer) {
            commander.command_points = commander.command_points.saturating_sub(receipt.cost);
        }
        let now = self.tick;
        for old in &receipt.superseded {
            self.pending_events.push(SchedulerEvent::cancelled(
                now,
                old,
                CancelReason::Superseded,
                Some(id),
            ));
        }
        self.pending_events
            .push(SchedulerEvent::queued(now, &receipt.command));
        self.dirty.insert(entity_id);
        debug!(
            session = %self.id,
            entity = %entity_id,
            command = %id,
            kind = %receipt.command.command_type,
            execute_tick = receipt.command.execute_tick,
            superseded = receipt.superseded.len(),
            "command accepted"
        );
        Ok(receipt.command)
    }

    // -- tick ---------------------------------------------------------------

    /// Advance one tick.
    ///
    /// # Errors
    ///
    /// A [`SessionError`] if a queue fails its integrity check or the effect
    /// applier signals a fatal condition. Events produced before the error
    /// stay buffered for [`drain_events`](Self::drain_events).
    pub fn step(&mut self) -> Result<StateDelta, SessionError> {
        self.tick += 1;
        let now = self.tick;
        let dt = self.config.dt();

        let terrain = self.terrain.snapshot();
        let jamming_version = self.jamming.version();
        if jamming_version != self.jamming_version {
            debug!(
                session = %self.id,
                from = self.jamming_version,
                to = jamming_version,
                "jamming field refreshed"
            );
            self.jamming_version = jamming_version;
        }

        for commander in self.commanders.values_mut() {
            commander.regenerate(self.config.cp_regen_per_tick);
        }

        let mut log = EffectLog::default();
        let mut events = Vec::new();
        let ctx = EffectContext {
            now,
            terrain: &terrain,
            travel: self.config.travel,
        };

        for (entity_id, queue) in self.queues.iter_mut() {
            queue
                .check_integrity()
                .map_err(|details| SessionError::CorruptQueue {
                    entity: *entity_id,
                    details,
                })?;

            let fleets = &mut self.fleets;
            let applier = &mut self.applier;
            let mut fatal: Option<(CommandId, String)> = None;
            let transitions = queue.tick(now, |cmd| {
                match applier.apply(cmd, fleets, &ctx, &mut log) {
                    Ok(outcome) => Ok(outcome),
                    Err(EffectError::Failed(failure)) => {
                        warn!(
                            entity = %cmd.entity_id,
                            command = %cmd.id,
                            code = failure.code(),
                            %failure,
                            "command failed"
                        );
                        Err(failure)
                    }
                    Err(EffectError::Fatal(reason)) => {
                        fatal = Some((cmd.id, reason.clone()));
                        Err(ExecutionFailure::Aborted(reason))
                    }
                }
            });
            if !transitions.is_empty() {
                self.dirty.insert(*entity_id);
            }
            // A course with no MOVEMENT command behind it is dropped.
            if queue.executing(ExclusivityGroup::Movement).is_none() {
                let adrift = self
                    .fleets
                    .get_mut(entity_id)
                    .filter(|f| f.destination.is_some());
                if let Some(fleet) = adrift {
                    fleet.halt();
                    self.dirty.insert(*entity_id);
                    debug!(session = %self.id, entity = %entity_id, "course dropped");
                }
            }
            events.extend(
                transitions
                    .iter()
                    .map(|t| SchedulerEvent::from_transition(now, t)),
            );
            if let Some((command, reason)) = fatal {
                self.pending_events.append(&mut events);
                return Err(SessionError::EffectFatal { command, reason });
            }
        }

        for (id, fleet) in self.fleets.iter_mut() {
            match integrate(fleet, dt) {
                MovementStep::Idle => {}
                MovementStep::Travelling => {
                    self.dirty.insert(*id);
                }
                MovementStep::Arrived => {
                    self.dirty.insert(*id);
                    if let Some(cmd) = self
                        .queues
                        .get_mut(id)
                        .and_then(|q| q.complete_in_flight(ExclusivityGroup::Movement, now))
                    {
                        events.push(SchedulerEvent::completed(now, &cmd));
                    }
                }
            }
        }

        let mut delta = StateDelta::new(now);
        for engagement in &log.combats {
            events.push(SchedulerEvent::CombatEngaged {
                tick: now,
                command_id: engagement.command_id,
                attacker: engagement.attacker,
                target: engagement.target,
            });
        }
        delta.combats = log.combats;
        delta.warp_outcome = log.warps.last().map(|(_, outcome)| outcome.clone());

        delta.fleets = self.capture_dirty();
        delta.removed = std::mem::take(&mut self.removed);
        delta.events = std::mem::take(&mut self.pending_events);
        delta.events.extend(events);

        trace!(session = %self.id, tick = now, events = delta.events.len(), "tick complete");
        Ok(delta)
    }

    fn capture_dirty(&mut self) -> Vec<FleetState> {
        let dirty = std::mem::take(&mut self.dirty);
        dirty
            .into_iter()
            .filter_map(|id| {
                self.fleets
                    .get(&id)
                    .map(|e| FleetState::capture(e, self.queues.get(&id)))
            })
            .collect()
    }

    // -- queries ------------------------------------------------------------

    /// Events buffered since the last step.
    pub fn drain_events(&mut self) -> Vec<SchedulerEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Ordered view of a fleet's queue: executing commands, then pending
    /// commands in execution order.
    pub fn inspect_queue(&self, entity: EntityId) -> Result<Vec<QueuedCommand>, RejectReason> {
        self.queues
            .get(&entity)
            .map(|q| q.inspect(self.tick, self.config.tick_rate_hz))
            .ok_or(RejectReason::UnknownEntity(entity))
    }

    pub fn terrain_at(&self, x: f64, y: f64) -> TerrainCell {
        self.terrain.snapshot().at(x, y)
    }

    pub fn jamming_at(&self, p: Point) -> JammingLevel {
        self.jamming.snapshot().level_at_point(p)
    }

    /// Full snapshot for a (re)connecting client.
    pub fn full_state(&self) -> StateDelta {
        let fleets = self
            .fleets
            .values()
            .map(|e| FleetState::capture(e, self.queues.get(&e.id)))
            .collect();
        StateDelta::snapshot(self.tick, fleets)
    }

    /// Cancel every queued command of every fleet. Returns the events.
    pub fn flush_queues(&mut self, reason: CancelReason) -> Vec<SchedulerEvent> {
        let now = self.tick;
        let mut events = Vec::new();
        for queue in self.queues.values_mut() {
            for cmd in queue.cancel_all(reason, now) {
                events.push(SchedulerEvent::cancelled(now, &cmd, reason, None));
            }
        }
        events
    }

    fn view(&self, cmd: &Command) -> QueuedCommand {
        QueuedCommand::derive(
            cmd,
            self.tick,
            self.config.tick_rate_hz,
            self.config.emergency_grace_ticks,
        )
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.fleets.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.dirty.insert(id);
        self.fleets.get_mut(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.fleets.values()
    }

    pub fn commander(&self, id: CommanderId) -> Option<&Commander> {
        self.commanders.get(&id)
    }

    pub fn queue(&self, entity: EntityId) -> Option<&CommandQueue> {
        self.queues.get(&entity)
    }

    /// Shared terrain handle (for world-event collaborators).
    pub fn terrain(&self) -> &SharedField<TerrainField> {
        &self.terrain
    }

    /// Shared jamming handle (for world-event collaborators).
    pub fn jamming(&self) -> &SharedField<JammingField> {
        &self.jamming
    }

    // -- checkpoint plumbing ------------------------------------------------

    pub(crate) fn rng(&self) -> &Pcg64 {
        &self.rng
    }

    pub(crate) fn next_command_id(&self) -> u64 {
        self.next_command_id
    }

    pub(crate) fn commanders_map(&self) -> &BTreeMap<CommanderId, Commander> {
        &self.commanders
    }

    pub(crate) fn queues_map(&self) -> &BTreeMap<EntityId, CommandQueue> {
        &self.queues
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore_parts(
        &mut self,
        tick: u64,
        seed: u64,
        rng: Pcg64,
        next_command_id: u64,
        fleets: FleetMap,
        commanders: BTreeMap<CommanderId, Commander>,
        queues: BTreeMap<EntityId, CommandQueue>,
    ) {
        self.tick = tick;
        self.seed = seed;
        self.rng = rng;
        self.next_command_id = next_command_id;
        self.fleets = fleets;
        self.commanders = commanders;
        self.queues = queues;
        self.dirty = self.fleets.keys().copied().collect();
        self.removed.clear();
        self.pending_events.clear();
        self.jamming_version = self.jamming.version();
    }
}

fn admission_context<'a>(
    request: &CommandRequest,
    now: u64,
    fleets: &'a FleetMap,
    commanders: &'a BTreeMap<CommanderId, Commander>,
    config: &'a EngineConfig,
    terrain: &'a TerrainField,
    jamming: &JammingField,
) -> Result<AdmissionContext<'a>, RejectReason> {
    let entity = fleets
        .get(&request.entity_id)
        .ok_or(RejectReason::UnknownEntity(request.entity_id))?;
    let commander = commanders
        .get(&request.issuer)
        .ok_or(RejectReason::UnknownCommander(request.issuer))?;
    let target = request.payload.target_entity().and_then(|id| fleets.get(&id));
    Ok(AdmissionContext {
        now,
        entity,
        commander,
        jamming: jamming.level_at_point(entity.position),
        terrain,
        target,
        delay_table: &config.delay,
        cost: config.command_costs.cost(request.command_type),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::TravelMode;
    use helmsman_core::prelude::*;

    fn session() -> Session {
        let terrain = SharedField::new(TerrainField::new(200, 200).with_cell(60, 60, TerrainCell::void()));
        let jamming = SharedField::new(JammingField::new(200, 200, 50));
        let mut config = EngineConfig::default();
        config.command_costs = crate::config::CommandCostTable::free();
        let mut s = Session::new(SessionId(1), config, terrain, jamming, 99);
        s.add_commander(Commander::new(CommanderId(1), FactionId(0), 0, 10));
        s.add_commander(Commander::new(CommanderId(2), FactionId(1), 0, 10));
        s.add_entity(Entity::new(EntityId(1), FactionId(0), CommanderId(1), Point::ZERO));
        s.add_entity(Entity::new(EntityId(2), FactionId(1), CommanderId(2), Point::new(50.0, 0.0)));
        s
    }

    fn run_until(s: &mut Session, tick: u64) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        while s.tick() < tick {
            events.extend(s.step().unwrap().events);
        }
        events
    }

    // -- 1. Submission -------------------------------------------------------

    #[test]
    fn unknown_fleet_and_commander_rejected() {
        let mut s = session();
        let err = s
            .submit(CommandRequest::new(EntityId(9), CommanderId(1), CommandType::Stop))
            .unwrap_err();
        assert_eq!(err, RejectReason::UnknownEntity(EntityId(9)));
        let err = s
            .submit(CommandRequest::new(EntityId(1), CommanderId(9), CommandType::Stop))
            .unwrap_err();
        assert_eq!(err, RejectReason::UnknownCommander(CommanderId(9)));
        assert!(s.drain_events().is_empty());
    }

    #[test]
    fn command_ids_only_advance_on_acceptance() {
        let mut s = session();
        let _ = s.submit(CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(-1.0, 0.0)));
        let ok = s
            .submit(CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Stop))
            .unwrap();
        assert_eq!(ok.id, CommandId(1));
    }

    #[test]
    fn command_points_are_spent_and_not_refunded() {
        let mut s = session();
        s.config.command_costs.stop = 4;
        let q = s
            .submit(CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Stop))
            .unwrap();
        assert_eq!(s.commander(CommanderId(1)).unwrap().command_points, 6);
        s.cancel(q.id).unwrap();
        assert_eq!(s.commander(CommanderId(1)).unwrap().command_points, 6);
    }

    // -- 2. Warp -------------------------------------------------------------

    #[test]
    fn warp_into_void_is_rejected_synchronously() {
        let mut s = session();
        let err = s
            .move_fleet(MoveOrder {
                entity_id: EntityId(1),
                issuer: CommanderId(1),
                target: Point::new(60.0, 60.0),
                warp: true,
                priority: Priority::Normal,
            })
            .unwrap_err();
        assert_eq!(err.code(), "impassable_destination");
        assert!(s.queue(EntityId(1)).unwrap().is_empty());
    }

    #[test]
    fn warp_lands_on_final_destination() {
        let mut s = session();
        let receipt = s
            .move_fleet(MoveOrder {
                entity_id: EntityId(1),
                issuer: CommanderId(1),
                target: Point::new(100.0, 100.0),
                warp: true,
                priority: Priority::High,
            })
            .unwrap();
        let outcome = receipt.warp_outcome.unwrap();
        let events = run_until(&mut s, receipt.queued_command.execute_tick);
        assert!(events.iter().any(|e| matches!(e, SchedulerEvent::Completed { .. })));
        assert_eq!(s.entity(EntityId(1)).unwrap().position, outcome.final_destination);
    }

    // -- 3. Lifecycle --------------------------------------------------------

    #[test]
    fn move_completes_on_its_execute_tick() {
        let mut s = session();
        let q = s
            .submit(CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(100.0, 0.0)))
            .unwrap();
        let events = run_until(&mut s, q.execute_tick);
        let status = s.queue(EntityId(1)).unwrap().get(q.id).unwrap().status;
        assert_eq!(status, CommandStatus::Completed);
        assert!(events.iter().any(|e| matches!(
            e,
            SchedulerEvent::Completed { command_id, tick, .. } if *command_id == q.id && *tick == q.execute_tick
        )));
        assert_eq!(s.entity(EntityId(1)).unwrap().position, Point::new(100.0, 0.0));
    }

    #[test]
    fn move_completes_on_arrival() {
        let mut s = session();
        s.config.travel = TravelMode::Continuous;
        let q = s
            .submit(CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(3.0, 0.0)))
            .unwrap();
        run_until(&mut s, q.execute_tick);
        let status = |s: &Session| s.queue(EntityId(1)).unwrap().get(q.id).unwrap().status;
        assert_eq!(status(&s), CommandStatus::Executing);
        let events = run_until(&mut s, q.execute_tick + 3);
        assert_eq!(status(&s), CommandStatus::Completed);
        assert!(events
            .iter()
            .any(|e| matches!(e, SchedulerEvent::Completed { command_id, .. } if *command_id == q.id)));
        assert_eq!(s.entity(EntityId(1)).unwrap().position, Point::new(3.0, 0.0));
    }

    #[test]
    fn removing_a_fleet_cancels_its_queue() {
        let mut s = session();
        s.submit(CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Repair))
            .unwrap();
        s.drain_events();
        s.remove_entity(EntityId(1)).unwrap();
        let delta = s.step().unwrap();
        assert_eq!(delta.removed, vec![EntityId(1)]);
        assert!(delta.events.iter().any(|e| matches!(
            e,
            SchedulerEvent::Cancelled { reason: CancelReason::EntityLost, .. }
        )));
    }

    #[test]
    fn removing_a_fleet_fails_what_it_is_executing() {
        let mut s = session();
        s.config.travel = TravelMode::Continuous;
        let q = s
            .submit(CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(0.0, 90.0)))
            .unwrap();
        run_until(&mut s, q.execute_tick);
        assert!(s.queue(EntityId(1)).unwrap().executing(ExclusivityGroup::Movement).is_some());

        s.remove_entity(EntityId(1)).unwrap();
        let events = s.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            SchedulerEvent::Failed { command_id, code, .. } if *command_id == q.id && code == "entity_missing"
        ));
    }

    #[test]
    fn jamming_update_applies_to_next_submission() {
        let mut s = session();
        s.jamming()
            .update(|j| {
                j.set_region(0, 0, JammingLevel::Blackout);
            });
        let err = s
            .submit(CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Stop))
            .unwrap_err();
        assert_eq!(err, RejectReason::Blackout);
        assert!(s
            .submit(CommandRequest::new(EntityId(2), CommanderId(2), CommandType::Stop))
            .is_ok());
    }
}
