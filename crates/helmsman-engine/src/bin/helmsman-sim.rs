//! Headless scripted battle.
//!
//! Usage: `helmsman-sim [config.json] [ticks]`
//!
//! Prints one `game:state-update` push message per line, then the final
//! checkpoint hash. Set `RUST_LOG=helmsman_engine=debug` to follow the
//! scheduler.

use std::env;
use std::fs;

use anyhow::Context;
use helmsman_engine::prelude::*;
use tracing::info;

const DEFAULT_TICKS: u64 = 120;
const SEED: u64 = 0x5eed;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match args.first() {
        Some(path) => {
            let json = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            EngineConfig::from_json_str(&json).with_context(|| format!("loading {path}"))?
        }
        None => EngineConfig::default(),
    };
    let ticks = match args.get(1) {
        Some(n) => n.parse().with_context(|| format!("invalid tick count {n:?}"))?,
        None => DEFAULT_TICKS,
    };

    let terrain = SharedField::new(
        TerrainField::new(200, 200)
            .with_rect((90, 60), (110, 80), TerrainCell::new(TerrainType::PlasmaStorm))
            .with_rect((120, 0), (121, 199), TerrainCell::void()),
    );
    let jamming = SharedField::new(
        JammingField::new(200, 200, 50).with_region(1, 1, JammingLevel::Interference),
    );

    let mut session = Session::new(SessionId(1), config, terrain, jamming.clone(), SEED);
    session.add_commander(Commander::new(CommanderId(1), FactionId(0), 2, 20));
    session.add_commander(Commander::new(CommanderId(2), FactionId(1), 1, 20));
    session.add_entity(
        Entity::new(EntityId(1), FactionId(0), CommanderId(1), Point::new(20.0, 20.0))
            .with_speed(40.0),
    );
    session.add_entity(
        Entity::new(EntityId(2), FactionId(1), CommanderId(2), Point::new(60.0, 60.0))
            .with_speed(30.0),
    );

    let mut scheduler = TickScheduler::new(session);
    let client = scheduler.subscribe();
    scheduler.start()?;

    let orders = [
        (0, Order::Move(EntityId(1), CommanderId(1), Point::new(80.0, 20.0))),
        (0, Order::Warp(EntityId(2), CommanderId(2), Point::new(100.0, 70.0))),
        (5, Order::Issue(
            CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Formation)
                .with_payload(Payload::Formation { formation: Formation::Wedge }),
        )),
        (10, Order::Issue(
            CommandRequest::new(EntityId(1), CommanderId(1), CommandType::Attack)
                .with_payload(Payload::Entity { target: EntityId(2) })
                .with_priority(Priority::High),
        )),
        (12, Order::Move(EntityId(1), CommanderId(1), Point::new(120.0, 20.0))),
    ];

    for tick in 0..ticks {
        for (_, order) in orders.iter().filter(|(at, _)| *at == tick) {
            order.issue(&mut scheduler);
        }
        if tick == 60 {
            let version = jamming.update(|j| {
                j.raise_around(Point::new(100.0, 70.0), 30.0, JammingLevel::Heavy);
            });
            info!(version, "world event: jamming raised around the storm");
        }
        scheduler.advance()?;
        for delta in client.drain() {
            println!("{}", PushMessage::state_update(delta).to_json()?);
        }
    }

    let checkpoint = scheduler.checkpoint()?;
    println!("{}", serde_json::json!({ "tick": checkpoint.tick, "hash": checkpoint.hash }));
    Ok(())
}

enum Order {
    Move(EntityId, CommanderId, Point),
    Warp(EntityId, CommanderId, Point),
    Issue(CommandRequest),
}

impl Order {
    fn issue(&self, scheduler: &mut TickScheduler) {
        let result = match self {
            Order::Move(fleet, issuer, target) | Order::Warp(fleet, issuer, target) => scheduler
                .move_fleet(MoveOrder {
                    entity_id: *fleet,
                    issuer: *issuer,
                    target: *target,
                    warp: matches!(self, Order::Warp(..)),
                    priority: Priority::Normal,
                })
                .map(|r| r.queued_command.id),
            Order::Issue(request) => scheduler.submit(request.clone()).map(|q| q.id),
        };
        match result {
            Ok(id) => info!(command = %id, "order accepted"),
            Err(reason) => info!(code = reason.code(), %reason, "order rejected"),
        }
    }
}
