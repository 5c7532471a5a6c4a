//! Submission-time checks for player orders.
//!
//! [`admit`] decides whether a [`CommandRequest`] may enter a fleet's queue
//! and, if so, how long it takes to arrive. It reads the world through an
//! [`AdmissionContext`] and never mutates anything: a rejection leaves every
//! queue exactly as it was.

use crate::command::{CommandRequest, CommandType, Payload};
use crate::delay::{compute_delay, CommanderSkill, DelayBreakdown, DelayTable};
use crate::entity::{Commander, Entity};
use crate::error::RejectReason;
use crate::jamming::JammingLevel;
use crate::terrain::TerrainField;

/// Read-only view of the world an order is checked against.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionContext<'a> {
    /// Current tick.
    pub now: u64,
    /// The fleet receiving the order.
    pub entity: &'a Entity,
    /// The commander issuing it.
    pub commander: &'a Commander,
    /// Jamming level at the fleet's position.
    pub jamming: JammingLevel,
    pub terrain: &'a TerrainField,
    /// The fleet named by an entity-targeted payload, if it exists.
    pub target: Option<&'a Entity>,
    pub delay_table: &'a DelayTable,
    /// Command-point cost of this command type.
    pub cost: u32,
}

/// A successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub delay: DelayBreakdown,
    pub cost: u32,
}

/// Check `request` against `ctx`.
///
/// # Errors
///
/// Any [`RejectReason`] other than the session-level ones.
pub fn admit(request: &CommandRequest, ctx: &AdmissionContext<'_>) -> Result<Admission, RejectReason> {
    let entity = ctx.entity;
    if request.entity_id != entity.id {
        return Err(RejectReason::UnknownEntity(request.entity_id));
    }
    if request.issuer != ctx.commander.id {
        return Err(RejectReason::UnknownCommander(request.issuer));
    }
    if entity.controller_id != request.issuer {
        return Err(RejectReason::NotController {
            commander: request.issuer,
            entity: entity.id,
        });
    }
    if entity.surrendered {
        return Err(RejectReason::InvalidForState {
            command_type: request.command_type,
            state: "surrendered".to_owned(),
        });
    }
    if ctx.jamming == JammingLevel::Blackout {
        return Err(RejectReason::Blackout);
    }

    let distance = validate_payload(request, ctx)?;

    let delay = compute_delay(
        ctx.delay_table,
        CommanderSkill(ctx.commander.skill),
        distance,
        ctx.jamming,
        request.command_type,
    )?;

    if ctx.commander.command_points < ctx.cost {
        return Err(RejectReason::InsufficientCommandPoints {
            required: ctx.cost,
            available: ctx.commander.command_points,
        });
    }

    Ok(Admission {
        delay,
        cost: ctx.cost,
    })
}

/// Validate the payload and return the distance the order has to cover.
fn validate_payload(request: &CommandRequest, ctx: &AdmissionContext<'_>) -> Result<f64, RejectReason> {
    let cmd = request.command_type;
    if !cmd.accepts_payload(&request.payload) {
        return Err(RejectReason::InvalidPayload {
            command_type: cmd,
            details: format!("unexpected payload {:?}", request.payload),
        });
    }

    let origin = ctx.entity.position;
    match &request.payload {
        Payload::Position { target } => {
            if !ctx.terrain.contains(*target) {
                return Err(RejectReason::OutOfBounds(*target));
            }
            if ctx.terrain.at_point(*target).impassable {
                return Err(RejectReason::ImpassableDestination(*target));
            }
            Ok(origin.distance(*target))
        }
        Payload::Warp { outcome } => {
            let requested = outcome.requested_destination;
            if !ctx.terrain.contains(requested) {
                return Err(RejectReason::OutOfBounds(requested));
            }
            if ctx.terrain.at_point(outcome.final_destination).impassable {
                return Err(RejectReason::ImpassableDestination(outcome.final_destination));
            }
            Ok(origin.distance(requested))
        }
        Payload::Entity { target } => {
            let Some(victim) = ctx.target.filter(|t| t.id == *target) else {
                return Err(RejectReason::InvalidTarget(format!("fleet {target} does not exist")));
            };
            if victim.id == ctx.entity.id {
                return Err(RejectReason::InvalidTarget("a fleet cannot target itself".to_owned()));
            }
            if !ctx.entity.is_hostile_to(victim) {
                return Err(RejectReason::InvalidTarget(format!("fleet {target} is not hostile")));
            }
            if victim.surrendered {
                return Err(RejectReason::InvalidTarget(format!("fleet {target} has surrendered")));
            }
            Ok(origin.distance(victim.position))
        }
        Payload::Energy { distribution } => {
            if !distribution.is_valid() {
                return Err(RejectReason::InvalidPayload {
                    command_type: CommandType::EnergyDistribution,
                    details: format!("shares sum to {}, expected 100", distribution.total()),
                });
            }
            Ok(0.0)
        }
        Payload::Formation { .. } | Payload::None => Ok(0.0),
    }
}
