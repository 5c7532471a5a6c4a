//! End-to-end battle scenarios driven through the tick scheduler.

use helmsman_engine::prelude::*;

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

struct Battle {
    scheduler: TickScheduler,
    client: Subscription,
    terrain: SharedField<TerrainField>,
    jamming: SharedField<JammingField>,
}

/// Fleet 1 (ours, commander 1, skill 2) at the origin; fleet 2 (hostile,
/// commander 2) at (40, 30). Both cruise at the default speed. One 50x50
/// jamming region per quadrant.
fn battle(our_jamming: JammingLevel) -> Battle {
    battle_with(our_jamming, EngineConfig::default())
}

fn continuous() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.travel = TravelMode::Continuous;
    config
}

fn battle_with(our_jamming: JammingLevel, config: EngineConfig) -> Battle {
    let terrain = SharedField::new(TerrainField::new(200, 200).with_cell(150, 150, TerrainCell::void()));
    let jamming = SharedField::new(JammingField::new(200, 200, 50).with_region(0, 0, our_jamming));

    let mut session = Session::new(SessionId(1), config, terrain.clone(), jamming.clone(), 2024);
    session.add_commander(Commander::new(CommanderId(1), FactionId(0), 2, 10));
    session.add_commander(Commander::new(CommanderId(2), FactionId(1), 0, 10));
    session.add_entity(Entity::new(EntityId(1), FactionId(0), CommanderId(1), Point::ZERO));
    session.add_entity(Entity::new(
        EntityId(2),
        FactionId(1),
        CommanderId(2),
        Point::new(40.0, 30.0),
    ));

    let mut scheduler = TickScheduler::new(session);
    let client = scheduler.subscribe();
    scheduler.start().unwrap();
    Battle {
        scheduler,
        client,
        terrain,
        jamming,
    }
}

impl Battle {
    fn run_to(&mut self, tick: u64) {
        let remaining = tick - self.scheduler.tick();
        assert_eq!(self.scheduler.run_ticks(remaining).unwrap(), remaining);
    }

    fn events(&self) -> Vec<SchedulerEvent> {
        self.client.drain().into_iter().flat_map(|d| d.events).collect()
    }

    fn fleet(&self, entity: u64) -> &Entity {
        self.scheduler.session().entity(EntityId(entity)).unwrap()
    }

    fn status(&self, entity: u64, id: CommandId) -> CommandStatus {
        self.scheduler
            .session()
            .queue(EntityId(entity))
            .and_then(|q| q.get(id))
            .map(|c| c.status)
            .unwrap()
    }
}

fn attack(target: u64) -> CommandRequest {
    CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Attack)
        .with_payload(Payload::Entity {
            target: EntityId(target),
        })
}

// ---------------------------------------------------------------------------
// Delay and completion
// ---------------------------------------------------------------------------

#[test]
fn move_under_interference_completes_on_schedule() {
    let mut b = battle(JammingLevel::Interference);
    let q = b
        .scheduler
        .submit(CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(100.0, 0.0)))
        .unwrap();

    assert_eq!(
        q.delay_breakdown,
        DelayBreakdown {
            base_delay: 10,
            distance_penalty: 20,
            jamming_penalty: 5,
            commander_skill_bonus: 2,
            total_delay: 33,
        }
    );
    assert_eq!(q.issue_tick, 0);
    assert_eq!(q.execute_tick, 33);
    assert_eq!(q.remaining_seconds, 3.3);

    b.run_to(32);
    assert_eq!(b.status(1, q.id), CommandStatus::Queued);
    b.run_to(33);
    assert_eq!(b.status(1, q.id), CommandStatus::Completed);

    let completed: Vec<u64> = b
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SchedulerEvent::Completed { command_id, tick, .. } if command_id == q.id => Some(tick),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![33]);

    let fleet = b.fleet(1);
    assert_eq!(fleet.speed, 10.0);
    assert_eq!(fleet.position, Point::new(100.0, 0.0));
    assert!(!fleet.is_moving());
}

#[test]
fn continuous_move_completes_on_arrival() {
    let mut b = battle_with(JammingLevel::Clear, continuous());
    let q = b
        .scheduler
        .submit(CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(20.0, 0.0)))
        .unwrap();
    // 10 base + 4 distance - 2 skill.
    assert_eq!(q.execute_tick, 12);

    b.run_to(13);
    assert_eq!(b.status(1, q.id), CommandStatus::Executing);
    assert!(b.fleet(1).is_moving());

    // Two seconds of travel at 10 units/s.
    b.run_to(31);
    assert_eq!(b.status(1, q.id), CommandStatus::Completed);
    assert_eq!(b.fleet(1).position, Point::new(20.0, 0.0));
    assert!(!b.fleet(1).is_moving());
}

#[test]
fn blackout_blocks_new_orders_but_not_queued_ones() {
    let mut b = battle(JammingLevel::Clear);
    let stop = b
        .scheduler
        .submit(CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Stop))
        .unwrap();

    b.jamming.update(|j| {
        j.set_region(0, 0, JammingLevel::Blackout);
    });
    let err = b
        .scheduler
        .submit(CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Repair))
        .unwrap_err();
    assert_eq!(err, RejectReason::Blackout);
    assert_eq!(err.code(), "blackout");

    b.run_to(stop.execute_tick);
    assert_eq!(b.status(1, stop.id), CommandStatus::Completed);
}

// ---------------------------------------------------------------------------
// Superseding and cancellation
// ---------------------------------------------------------------------------

#[test]
fn retreat_supersedes_queued_move_exactly_once() {
    let mut b = battle(JammingLevel::Clear);
    b.events();
    let mv = b
        .scheduler
        .submit(CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(50.0, 0.0)))
        .unwrap();
    let retreat = b
        .scheduler
        .submit(
            CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Retreat).with_payload(
                Payload::Position {
                    target: Point::new(0.0, 80.0),
                },
            ),
        )
        .unwrap();

    let events = b.events();
    let cancelled: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            SchedulerEvent::Cancelled {
                command_id,
                reason,
                superseded_by,
                ..
            } => Some((*command_id, *reason, *superseded_by)),
            _ => None,
        })
        .collect();
    assert_eq!(
        cancelled,
        vec![(mv.id, CancelReason::Superseded, Some(retreat.id))]
    );
    let queued: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, SchedulerEvent::Queued { .. }))
        .filter_map(SchedulerEvent::command_id)
        .collect();
    assert_eq!(queued, vec![mv.id, retreat.id]);

    let queue = b.scheduler.inspect_queue(EntityId(1)).unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].command_type, CommandType::Retreat);
}

#[test]
fn cancelling_twice_fails_without_a_second_event() {
    let mut b = battle(JammingLevel::Clear);
    let q = b
        .scheduler
        .submit(CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Repair))
        .unwrap();
    b.scheduler.cancel(q.id).unwrap();
    let err = b.scheduler.cancel(q.id).unwrap_err();
    assert_eq!(err.code(), "not_queued");

    let cancels = b
        .events()
        .iter()
        .filter(|e| matches!(e, SchedulerEvent::Cancelled { .. }))
        .count();
    assert_eq!(cancels, 1);

    // A cancelled command never executes.
    b.run_to(40);
    assert_eq!(b.status(1, q.id), CommandStatus::Cancelled);
}

#[test]
fn orthogonal_groups_execute_side_by_side() {
    let mut b = battle_with(JammingLevel::Clear, continuous());
    let mv = b
        .scheduler
        .submit(CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(0.0, 199.0)))
        .unwrap();
    let energy = b
        .scheduler
        .submit(
            CommandRequest::new(EntityId(1), CommanderId(1), CommandType::EnergyDistribution)
                .with_payload(Payload::Energy {
                    distribution: EnergyDistribution::new(40, 30, 20, 10),
                }),
        )
        .unwrap();
    // 199 units at 10 units/s: the move is still in flight when the energy
    // order lands.
    b.run_to(mv.execute_tick.max(energy.execute_tick));
    assert_eq!(b.status(1, mv.id), CommandStatus::Executing);
    assert_eq!(b.status(1, energy.id), CommandStatus::Completed);
    assert_eq!(b.fleet(1).energy, EnergyDistribution::new(40, 30, 20, 10));
}

#[test]
fn failed_interrupting_move_stops_the_fleet() {
    let mut b = battle_with(JammingLevel::Clear, continuous());
    let first = b
        .scheduler
        .submit(CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(100.0, 0.0)))
        .unwrap();
    b.run_to(first.execute_tick + 2);
    assert_eq!(b.status(1, first.id), CommandStatus::Executing);

    let second = b
        .scheduler
        .submit(CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(120.5, 0.5)))
        .unwrap();
    b.terrain.update(|t| {
        t.set_cell(120, 0, TerrainCell::void());
    });
    b.events();
    b.run_to(second.execute_tick);

    assert_eq!(b.status(1, first.id), CommandStatus::Completed);
    assert_eq!(b.status(1, second.id), CommandStatus::Failed);
    let events = b.events();
    assert!(events.iter().any(|e| matches!(
        e,
        SchedulerEvent::Completed { command_id, interrupted_by: Some(by), .. }
            if *command_id == first.id && *by == second.id
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        SchedulerEvent::Failed { command_id, code, .. } if *command_id == second.id && code == "impassable"
    )));

    let stopped_at = b.fleet(1).position;
    assert!(!b.fleet(1).is_moving());
    assert_eq!(b.fleet(1).destination, None);
    b.run_to(second.execute_tick + 20);
    assert_eq!(b.fleet(1).position, stopped_at);
    assert!(b.scheduler.session().queue(EntityId(1)).unwrap().executing_commands().next().is_none());
}

// ---------------------------------------------------------------------------
// Execution failures and state gates
// ---------------------------------------------------------------------------

#[test]
fn attack_on_vanished_target_fails_with_event() {
    let mut b = battle(JammingLevel::Clear);
    let q = b.scheduler.submit(attack(2)).unwrap();
    assert_eq!(q.delay_breakdown.distance_penalty, 10);

    b.scheduler.session_mut().remove_entity(EntityId(2)).unwrap();
    b.run_to(q.execute_tick);

    assert_eq!(b.status(1, q.id), CommandStatus::Failed);
    let codes: Vec<_> = b
        .events()
        .into_iter()
        .filter_map(|e| match e {
            SchedulerEvent::Failed { command_id, code, .. } if command_id == q.id => Some(code),
            _ => None,
        })
        .collect();
    assert_eq!(codes, vec!["target_missing".to_owned()]);
}

#[test]
fn removing_a_fleet_fails_its_in_flight_order() {
    let mut b = battle_with(JammingLevel::Clear, continuous());
    let mv = b
        .scheduler
        .submit(CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(0.0, 150.0)))
        .unwrap();
    b.run_to(mv.execute_tick + 1);
    assert_eq!(b.status(1, mv.id), CommandStatus::Executing);
    let repair = b
        .scheduler
        .submit(CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Repair))
        .unwrap();

    b.scheduler.session_mut().remove_entity(EntityId(1)).unwrap();
    b.run_to(mv.execute_tick + 2);

    let events = b.events();
    let lifecycle: Vec<&str> = events
        .iter()
        .filter(|e| e.command_id() == Some(mv.id))
        .map(|e| match e {
            SchedulerEvent::Queued { .. } => "queued",
            SchedulerEvent::Executing { .. } => "executing",
            SchedulerEvent::Completed { .. } => "completed",
            SchedulerEvent::Failed { .. } => "failed",
            SchedulerEvent::Cancelled { .. } => "cancelled",
            _ => "other",
        })
        .collect();
    assert_eq!(lifecycle, vec!["queued", "executing", "failed"]);
    assert!(events.iter().any(|e| matches!(
        e,
        SchedulerEvent::Failed { command_id, code, .. } if *command_id == mv.id && code == "entity_missing"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        SchedulerEvent::Cancelled { command_id, reason: CancelReason::EntityLost, .. } if *command_id == repair.id
    )));
}

#[test]
fn immobile_fleet_fails_its_move() {
    let mut b = battle(JammingLevel::Clear);
    b.scheduler
        .session_mut()
        .entity_mut(EntityId(1))
        .unwrap()
        .speed = 0.0;
    let q = b
        .scheduler
        .submit(CommandRequest::move_to(EntityId(1), CommanderId(1), Point::new(30.0, 0.0)))
        .unwrap();
    b.run_to(q.execute_tick);

    assert_eq!(b.status(1, q.id), CommandStatus::Failed);
    assert!(b.events().iter().any(|e| matches!(
        e,
        SchedulerEvent::Failed { command_id, code, message, .. }
            if *command_id == q.id && code == "invalid_for_state" && message.contains("immobile")
    )));
    assert_eq!(b.fleet(1).position, Point::ZERO);
    assert!(b.scheduler.session().queue(EntityId(1)).unwrap().executing_commands().next().is_none());
}

#[test]
fn attack_reports_engagement_for_combat() {
    let mut b = battle(JammingLevel::Clear);
    let q = b.scheduler.submit(attack(2)).unwrap();
    b.run_to(q.execute_tick - 1);
    b.client.drain();
    let delta = b.scheduler.advance().unwrap().unwrap();
    assert_eq!(delta.combats.len(), 1);
    assert_eq!(delta.combats[0].attacker, EntityId(1));
    assert_eq!(delta.combats[0].target, EntityId(2));
    assert!(delta.fleet(EntityId(1)).is_some());
}

#[test]
fn surrendered_fleet_refuses_orders_and_cannot_be_attacked() {
    let mut b = battle(JammingLevel::Clear);
    let surrender = b
        .scheduler
        .submit(CommandRequest::new(EntityId(2), CommanderId(2), CommandType::Surrender))
        .unwrap();
    b.run_to(surrender.execute_tick);
    assert!(b.scheduler.session().entity(EntityId(2)).unwrap().surrendered);

    let err = b
        .scheduler
        .submit(CommandRequest::new(EntityId(2), CommanderId(2), CommandType::Stop))
        .unwrap_err();
    assert_eq!(err.code(), "invalid_for_state");

    let err = b.scheduler.submit(attack(2)).unwrap_err();
    assert_eq!(err.code(), "invalid_target");
}

#[test]
fn not_controller_and_insufficient_points() {
    let mut b = battle(JammingLevel::Clear);
    let err = b
        .scheduler
        .submit(CommandRequest::new(EntityId(2), CommanderId(1), CommandType::Stop))
        .unwrap_err();
    assert_eq!(err.code(), "not_controller");

    // ATTACK costs 3 CP; the commander starts with 10.
    for _ in 0..3 {
        b.scheduler.submit(attack(2)).unwrap();
    }
    let err = b.scheduler.submit(attack(2)).unwrap_err();
    assert_eq!(
        err,
        RejectReason::InsufficientCommandPoints {
            required: 3,
            available: 1
        }
    );
}

// ---------------------------------------------------------------------------
// Warp
// ---------------------------------------------------------------------------

#[test]
fn warp_into_void_is_rejected_without_queueing() {
    let mut b = battle(JammingLevel::Clear);
    let err = b
        .scheduler
        .move_fleet(MoveOrder {
            entity_id: EntityId(1),
            issuer: CommanderId(1),
            target: Point::new(150.2, 149.8),
            warp: true,
            priority: Priority::Normal,
        })
        .unwrap_err();
    assert_eq!(err.code(), "impassable_destination");
    assert!(b.scheduler.inspect_queue(EntityId(1)).unwrap().is_empty());
}

#[test]
fn warp_lands_fleet_and_reports_outcome() {
    let mut b = battle(JammingLevel::Clear);
    let receipt = b
        .scheduler
        .move_fleet(MoveOrder {
            entity_id: EntityId(1),
            issuer: CommanderId(1),
            target: Point::new(20.0, 20.0),
            warp: true,
            priority: Priority::High,
        })
        .unwrap();
    let outcome = receipt.warp_outcome.clone().unwrap();
    assert_eq!(outcome.error_vector, Point::ZERO);

    b.run_to(receipt.queued_command.execute_tick);
    let fleet = b.scheduler.session().entity(EntityId(1)).unwrap();
    assert_eq!(fleet.position, outcome.final_destination);
    assert!(b
        .events()
        .iter()
        .any(|e| matches!(e, SchedulerEvent::WarpResolved { entity_id, .. } if *entity_id == EntityId(1))));
}
