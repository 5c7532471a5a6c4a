//! Property tests for sessions.
//!
//! Random sequences of orders, cancellations and steps are driven through a
//! session under both travel modes; queue invariants must hold after every
//! step and a second session fed the same sequence must end in the same state.

use std::collections::BTreeSet;

use helmsman_engine::prelude::*;
use proptest::prelude::*;

const FLEETS: u64 = 3;

#[derive(Debug, Clone)]
enum Op {
    Move(u64, f64, f64, bool),
    Order(u64, CommandType, Priority),
    Cancel(u64),
    Step(u8),
}

fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Low),
        Just(Priority::Normal),
        Just(Priority::High),
        Just(Priority::Emergency),
    ]
}

fn order_strategy() -> impl Strategy<Value = CommandType> {
    prop_oneof![
        Just(CommandType::Stop),
        Just(CommandType::Surrender),
        Just(CommandType::Repair),
        Just(CommandType::Turn180),
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1..=FLEETS, 0.0..120.0f64, 0.0..120.0f64, any::<bool>())
            .prop_map(|(f, x, y, warp)| Op::Move(f, x, y, warp)),
        (1..=FLEETS, order_strategy(), priority_strategy())
            .prop_map(|(f, t, p)| Op::Order(f, t, p)),
        (1..40u64).prop_map(Op::Cancel),
        (1..8u8).prop_map(Op::Step),
    ]
}

fn session(seed: u64) -> Session {
    let terrain = SharedField::new(
        TerrainField::new(120, 120)
            .with_rect((40, 40), (60, 60), TerrainCell::new(TerrainType::AsteroidField))
            .with_rect((90, 0), (90, 119), TerrainCell::void()),
    );
    let jamming = SharedField::new(
        JammingField::new(120, 120, 60).with_region(1, 1, JammingLevel::Heavy),
    );
    let mut config = EngineConfig::default();
    config.command_costs = CommandCostTable::free();
    if seed % 2 == 0 {
        config.travel = TravelMode::Continuous;
    }
    let mut s = Session::new(SessionId(1), config, terrain, jamming, seed);
    for n in 1..=FLEETS {
        s.add_commander(Commander::new(CommanderId(n), FactionId(0), n as u32, 0));
        s.add_entity(
            Entity::new(EntityId(n), FactionId(0), CommanderId(n), Point::new(10.0 * n as f64, 5.0))
                .with_speed(30.0),
        );
    }
    s
}

fn run(s: &mut Session, ops: &[Op]) -> Result<(), TestCaseError> {
    for op in ops {
        match op {
            Op::Move(f, x, y, warp) => {
                let _ = s.move_fleet(MoveOrder {
                    entity_id: EntityId(*f),
                    issuer: CommanderId(*f),
                    target: Point::new(*x, *y),
                    warp: *warp,
                    priority: Priority::Normal,
                });
            }
            Op::Order(f, t, p) => {
                let _ = s.submit(CommandRequest::new(EntityId(*f), CommanderId(*f), *t).with_priority(*p));
            }
            Op::Cancel(id) => {
                let _ = s.cancel(CommandId(*id));
            }
            Op::Step(n) => {
                for _ in 0..*n {
                    s.step().map_err(|e| TestCaseError::fail(e.to_string()))?;
                    check_invariants(s)?;
                }
            }
        }
    }
    Ok(())
}

fn check_invariants(s: &Session) -> Result<(), TestCaseError> {
    for n in 1..=FLEETS {
        let queue = s.queue(EntityId(n)).unwrap();
        prop_assert!(queue.check_integrity().is_ok(), "{:?}", queue.check_integrity());

        let mut groups = BTreeSet::new();
        for cmd in queue.executing_commands() {
            prop_assert_eq!(cmd.status, CommandStatus::Executing);
            prop_assert!(groups.insert(cmd.group()), "two executing in {:?}", cmd.group());
        }

        // Nothing due is left pending.
        for cmd in queue.pending() {
            prop_assert!(cmd.execute_tick > s.tick());
        }

        // A fleet only holds a course while a movement command is in flight.
        let fleet = s.entity(EntityId(n)).unwrap();
        if fleet.destination.is_some() {
            prop_assert!(queue.executing(ExclusivityGroup::Movement).is_some());
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_under_random_orders(
        seed in any::<u64>(),
        ops in prop::collection::vec(op_strategy(), 1..40),
    ) {
        let mut s = session(seed);
        run(&mut s, &ops)?;
    }

    #[test]
    fn same_inputs_same_state(
        seed in any::<u64>(),
        ops in prop::collection::vec(op_strategy(), 1..30),
    ) {
        let mut a = session(seed);
        let mut b = session(seed);
        run(&mut a, &ops)?;
        run(&mut b, &ops)?;
        prop_assert_eq!(a.tick(), b.tick());
        prop_assert_eq!(a.state_hash().unwrap(), b.state_hash().unwrap());
    }
}
