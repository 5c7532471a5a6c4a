//! Applying executing commands to the simulation.
//!
//! When a command reaches its execute tick the session hands it to an
//! [`EffectApplier`]. The applier mutates fleet state and reports whether the
//! effect finished ([`EffectOutcome::Completed`]) or continues over later
//! ticks ([`EffectOutcome::InProgress`], e.g. sub-light travel under
//! [`TravelMode::Continuous`]). Side effects
//! clients need to hear about, such as combat engagements and warp landings,
//! are written to an [`EffectLog`].
//!
//! [`StandardEffects`] is the built-in applier. Damage resolution is not its
//! concern: an ATTACK only validates the target and records the engagement
//! for the combat collaborator.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use helmsman_broadcast::delta::CombatEngagement;
use helmsman_core::command::{Command, CommandType, Payload};
use helmsman_core::entity::{Entity, EntityId, MAX_HULL};
use helmsman_core::error::ExecutionFailure;
use helmsman_core::geometry::{wrap_angle, Point};
use helmsman_core::queue::EffectOutcome;
use helmsman_core::terrain::TerrainField;
use helmsman_core::warp::WarpOutcome;

use crate::movement::TravelMode;

/// Every fleet in a session, keyed by id.
pub type FleetMap = BTreeMap<EntityId, Entity>;

/// Hull points restored by one REPAIR.
pub const REPAIR_AMOUNT: u32 = 25;

/// Read-only inputs of one effect application.
#[derive(Debug, Clone, Copy)]
pub struct EffectContext<'a> {
    pub now: u64,
    pub terrain: &'a TerrainField,
    pub travel: TravelMode,
}

/// Side effects collected while applying one tick's commands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectLog {
    pub combats: Vec<CombatEngagement>,
    pub warps: Vec<(EntityId, WarpOutcome)>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EffectError {
    /// The command cannot be applied. It is marked FAILED.
    #[error(transparent)]
    Failed(#[from] ExecutionFailure),

    /// The simulation is in a state the applier cannot continue from. The
    /// session halts.
    #[error("fatal effect error: {0}")]
    Fatal(String),
}

/// Applies executing commands to fleets.
pub trait EffectApplier: Send {
    fn apply(
        &mut self,
        cmd: &Command,
        fleets: &mut FleetMap,
        ctx: &EffectContext<'_>,
        log: &mut EffectLog,
    ) -> Result<EffectOutcome, EffectError>;
}

// ---------------------------------------------------------------------------
// StandardEffects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct StandardEffects;

impl EffectApplier for StandardEffects {
    fn apply(
        &mut self,
        cmd: &Command,
        fleets: &mut FleetMap,
        ctx: &EffectContext<'_>,
        log: &mut EffectLog,
    ) -> Result<EffectOutcome, EffectError> {
        let entity = fleets
            .get(&cmd.entity_id)
            .ok_or(ExecutionFailure::EntityMissing(cmd.entity_id))?;
        if entity.surrendered {
            return Err(ExecutionFailure::InvalidForState {
                command_type: cmd.command_type,
                state: "surrendered".to_owned(),
            }
            .into());
        }

        if cmd.command_type == CommandType::Attack {
            return attack(cmd, fleets, ctx, log);
        }

        let entity = fleets
            .get_mut(&cmd.entity_id)
            .ok_or(ExecutionFailure::EntityMissing(cmd.entity_id))?;

        match (cmd.command_type, &cmd.payload) {
            (CommandType::Move, Payload::Warp { outcome }) => {
                let landing = outcome.final_destination;
                if ctx.terrain.at_point(landing).impassable {
                    return Err(ExecutionFailure::Impassable(landing).into());
                }
                let travel = landing - entity.position;
                if travel.length() > 0.0 {
                    entity.heading = travel.heading();
                }
                entity.position = landing;
                entity.halt();
                log.warps.push((entity.id, outcome.clone()));
                Ok(EffectOutcome::Completed)
            }
            (
                CommandType::Move | CommandType::ParallelMove | CommandType::Retreat,
                Payload::Position { target },
            ) => {
                if ctx.terrain.at_point(*target).impassable {
                    return Err(ExecutionFailure::Impassable(*target).into());
                }
                let turn_to_face = cmd.command_type != CommandType::ParallelMove;
                Ok(set_course(cmd, entity, *target, turn_to_face, ctx.travel)?)
            }
            (CommandType::Stop, _) => {
                entity.halt();
                Ok(EffectOutcome::Completed)
            }
            (CommandType::Turn180, _) => {
                entity.heading = wrap_angle(entity.heading + PI);
                entity.halt();
                Ok(EffectOutcome::Completed)
            }
            (CommandType::Surrender, _) => {
                entity.surrendered = true;
                entity.halt();
                Ok(EffectOutcome::Completed)
            }
            (CommandType::Formation, Payload::Formation { formation }) => {
                entity.formation = *formation;
                Ok(EffectOutcome::Completed)
            }
            (CommandType::EnergyDistribution, Payload::Energy { distribution }) => {
                entity.energy = *distribution;
                Ok(EffectOutcome::Completed)
            }
            (CommandType::Repair, _) => {
                entity.hull = (entity.hull + REPAIR_AMOUNT).min(MAX_HULL);
                Ok(EffectOutcome::Completed)
            }
            (ty, payload) => Err(ExecutionFailure::Aborted(format!(
                "{ty} cannot be applied with payload {payload:?}"
            ))
            .into()),
        }
    }
}

/// Send `entity` to `target`. Under [`TravelMode::Continuous`] arrival is
/// handled by movement integration.
fn set_course(
    cmd: &Command,
    entity: &mut Entity,
    target: Point,
    turn_to_face: bool,
    mode: TravelMode,
) -> Result<EffectOutcome, ExecutionFailure> {
    let travel = target - entity.position;
    if travel.length() <= f64::EPSILON {
        entity.position = target;
        entity.halt();
        return Ok(EffectOutcome::Completed);
    }
    if !(entity.speed > 0.0 && entity.speed.is_finite()) {
        return Err(ExecutionFailure::InvalidForState {
            command_type: cmd.command_type,
            state: "immobile".to_owned(),
        });
    }
    if turn_to_face {
        entity.heading = travel.heading();
    }
    match mode {
        TravelMode::Immediate => {
            entity.position = target;
            entity.halt();
            Ok(EffectOutcome::Completed)
        }
        TravelMode::Continuous => {
            entity.destination = Some(target);
            entity.velocity = travel.normalized() * entity.speed;
            Ok(EffectOutcome::InProgress)
        }
    }
}

fn attack(
    cmd: &Command,
    fleets: &mut FleetMap,
    ctx: &EffectContext<'_>,
    log: &mut EffectLog,
) -> Result<EffectOutcome, EffectError> {
    let Some(target_id) = cmd.payload.target_entity() else {
        return Err(ExecutionFailure::Aborted("ATTACK without a target".to_owned()).into());
    };
    let target = fleets
        .get(&target_id)
        .ok_or(ExecutionFailure::TargetMissing(target_id))?;
    let attacker = fleets
        .get(&cmd.entity_id)
        .ok_or(ExecutionFailure::EntityMissing(cmd.entity_id))?;
    if target.surrendered || !attacker.is_hostile_to(target) {
        return Err(ExecutionFailure::TargetNotHostile(target_id).into());
    }

    let bearing = target.position - attacker.position;
    if let Some(attacker) = fleets.get_mut(&cmd.entity_id) {
        if bearing.length() > 0.0 {
            attacker.heading = bearing.heading();
        }
    }
    log.combats.push(CombatEngagement {
        attacker: cmd.entity_id,
        target: target_id,
        command_id: cmd.id,
        tick: ctx.now,
    });
    Ok(EffectOutcome::Completed)
}
