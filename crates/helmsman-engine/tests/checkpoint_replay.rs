//! Recording a running battle, replaying it on a fresh session, and forking
//! from a checkpoint.

use helmsman_engine::prelude::*;

fn map() -> (SharedField<TerrainField>, SharedField<JammingField>) {
    (
        SharedField::new(
            TerrainField::new(300, 300).with_rect((140, 0), (141, 299), TerrainCell::void()),
        ),
        SharedField::new(
            JammingField::new(300, 300, 100).with_region(1, 0, JammingLevel::Interference),
        ),
    )
}

fn battle(seed: u64) -> Session {
    let (terrain, jamming) = map();
    let mut s = Session::new(SessionId(7), EngineConfig::default(), terrain, jamming, seed);
    s.add_commander(Commander::new(CommanderId(1), FactionId(0), 1, 30));
    s.add_commander(Commander::new(CommanderId(2), FactionId(1), 3, 30));
    s.add_entity(
        Entity::new(EntityId(1), FactionId(0), CommanderId(1), Point::new(20.0, 20.0))
            .with_speed(25.0),
    );
    s.add_entity(
        Entity::new(EntityId(2), FactionId(1), CommanderId(2), Point::new(160.0, 40.0))
            .with_speed(25.0),
    );
    s
}

fn warp(fleet: u64, x: f64, y: f64) -> MoveOrder {
    MoveOrder {
        entity_id: EntityId(fleet),
        issuer: CommanderId(fleet),
        target: Point::new(x, y),
        warp: true,
        priority: Priority::Normal,
    }
}

/// Drive a scheduler through a scripted battle while recording it.
fn record_battle(seed: u64) -> (TickScheduler, ReplayLog) {
    let mut scheduler = TickScheduler::new(battle(seed));
    scheduler.start_recording(10).unwrap();
    scheduler.start().unwrap();

    scheduler.move_fleet(warp(1, 60.0, 60.0)).unwrap();
    scheduler
        .submit(CommandRequest::move_to(EntityId(2), CommanderId(2), Point::new(180.0, 80.0)))
        .unwrap();
    scheduler.run_ticks(15).unwrap();

    scheduler.move_fleet(warp(2, 230.0, 120.0)).unwrap();
    scheduler
        .submit(
            CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Formation)
                .with_payload(Payload::Formation {
                    formation: Formation::Echelon,
                }),
        )
        .unwrap();
    scheduler.run_ticks(20).unwrap();

    let retreat = scheduler
        .submit(CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Retreat))
        .unwrap();
    scheduler.run_ticks(5).unwrap();
    scheduler.cancel(retreat.id).unwrap();
    scheduler.run_ticks(40).unwrap();

    let log = scheduler.finish_recording().unwrap();
    (scheduler, log)
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

#[test]
fn recorded_battle_replays_to_the_same_state() {
    let (scheduler, log) = record_battle(99);
    assert_eq!(log.total_ticks, 80);
    assert_eq!(log.initial.tick, 0);

    let inputs = log
        .entries
        .iter()
        .filter(|e| matches!(e, ReplayEntry::Input { .. }))
        .count();
    assert_eq!(inputs, 6);

    // A different seed and an empty roster: everything comes from the log.
    let (terrain, jamming) = map();
    let mut fresh = Session::new(SessionId(7), EngineConfig::default(), terrain, jamming, 1);
    let result = replay(&mut fresh, &log).unwrap();
    assert!(result.completed, "diverged: {:?}", result.first_divergence);
    assert_eq!(result.ticks_replayed, 80);
    assert_eq!(fresh.tick(), scheduler.tick());
    assert_eq!(
        fresh.state_hash().unwrap(),
        scheduler.session().state_hash().unwrap()
    );
    assert_eq!(
        fresh.entity(EntityId(1)).unwrap().position,
        scheduler.session().entity(EntityId(1)).unwrap().position
    );
}

#[test]
fn replay_on_a_different_map_diverges() {
    let (_, log) = record_battle(5);
    let mut elsewhere = Session::new(
        SessionId(7),
        EngineConfig::default(),
        SharedField::new(TerrainField::new(300, 300)),
        SharedField::new(JammingField::new(300, 300, 100)),
        5,
    );
    let result = replay(&mut elsewhere, &log).unwrap();
    assert!(!result.completed);
    let divergence = result.first_divergence.unwrap();
    assert_ne!(divergence.expected_hash, divergence.actual_hash);
    assert_eq!(divergence.tick % 10, 0);
}

#[test]
fn replay_log_survives_json() {
    let (scheduler, log) = record_battle(3);
    let json = serde_json::to_string(&log).unwrap();
    let parsed: ReplayLog = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, log);

    let (terrain, jamming) = map();
    let mut fresh = Session::new(SessionId(7), EngineConfig::default(), terrain, jamming, 3);
    assert!(replay(&mut fresh, &parsed).unwrap().completed);
    assert_eq!(
        fresh.state_hash().unwrap(),
        scheduler.session().state_hash().unwrap()
    );
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

#[test]
fn forks_from_a_checkpoint_stay_in_lockstep() {
    let mut origin = TickScheduler::new(battle(11));
    origin.start().unwrap();
    origin.move_fleet(warp(1, 80.0, 30.0)).unwrap();
    origin.run_ticks(12).unwrap();
    let checkpoint = origin.checkpoint().unwrap();

    let mut a = battle(0);
    let mut b = battle(1);
    a.restore(&checkpoint).unwrap();
    b.restore(&SessionCheckpoint::from_json(&checkpoint.to_json().unwrap()).unwrap())
        .unwrap();
    assert_eq!(a.state_hash().unwrap(), checkpoint.hash);

    for fork in [&mut a, &mut b] {
        fork.move_fleet(warp(2, 210.0, 150.0)).unwrap();
        for _ in 0..30 {
            fork.step().unwrap();
        }
    }
    assert_eq!(a.state_hash().unwrap(), b.state_hash().unwrap());
    assert_eq!(a.tick(), 42);
}

#[test]
fn checkpoint_pins_pending_commands() {
    let mut s = battle(4);
    let q = s
        .submit(CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Repair))
        .unwrap();
    let checkpoint = s.checkpoint().unwrap();

    s.cancel(q.id).unwrap();
    assert!(s.inspect_queue(EntityId(1)).unwrap().is_empty());

    s.restore(&checkpoint).unwrap();
    let queue = s.inspect_queue(EntityId(1)).unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, q.id);
    assert_eq!(queue[0].status, CommandStatus::Queued);

    let next = s
        .submit(CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Stop))
        .unwrap();
    assert_eq!(next.id, CommandId(q.id.0 + 1));
}

#[test]
fn verify_checkpoint_detects_desync() {
    let mut scheduler = TickScheduler::new(battle(21));
    scheduler.start().unwrap();
    scheduler.run_ticks(3).unwrap();
    let good = scheduler.session().state_hash().unwrap();
    scheduler.verify_checkpoint(&good).unwrap();

    let err = scheduler.verify_checkpoint("0000").unwrap_err();
    assert_eq!(err.code(), "session_halted");
    assert_eq!(scheduler.state(), SchedulerState::Halted);
    assert!(scheduler.halt_reason().unwrap().contains("state diverged"));
}
