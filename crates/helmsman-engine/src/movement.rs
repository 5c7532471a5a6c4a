//! Sub-light movement integration.

use helmsman_core::entity::Entity;
use serde::{Deserialize, Serialize};

/// How a position order (MOVE, PARALLEL_MOVE, RETREAT) reaches its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    /// The fleet is placed on the target at the execute tick and the order
    /// completes there.
    #[default]
    Immediate,
    /// The fleet travels at its speed and the order completes on arrival.
    Continuous,
}

/// Result of integrating one fleet for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementStep {
    /// No travel order in flight.
    Idle,
    Travelling,
    /// Reached the destination this tick.
    Arrived,
}

/// Advance `entity` toward its destination by `dt` seconds.
///
/// `position += velocity * dt`, with the velocity re-aimed at the
/// destination every tick. A fleet within one tick of travel snaps onto the
/// destination and halts.
pub fn integrate(entity: &mut Entity, dt: f64) -> MovementStep {
    let Some(destination) = entity.destination else {
        return MovementStep::Idle;
    };
    let remaining = destination - entity.position;
    let step = entity.speed.max(0.0) * dt;
    if remaining.length() <= step + 1e-9 {
        entity.position = destination;
        entity.halt();
        return MovementStep::Arrived;
    }
    entity.velocity = remaining.normalized() * entity.speed;
    entity.position = entity.position + entity.velocity * dt;
    MovementStep::Travelling
}

#[cfg(test)]
mod tests {
    use super::*;
    use helmsman_core::prelude::*;

    #[test]
    fn travels_then_snaps() {
        let mut fleet = Entity::new(EntityId(1), FactionId(0), CommanderId(1), Point::ZERO);
        fleet.destination = Some(Point::new(2.5, 0.0));
        assert_eq!(integrate(&mut fleet, 0.1), MovementStep::Travelling);
        assert!((fleet.position.x - 1.0).abs() < 1e-12);
        assert_eq!(integrate(&mut fleet, 0.1), MovementStep::Travelling);
        assert_eq!(integrate(&mut fleet, 0.1), MovementStep::Arrived);
        assert_eq!(fleet.position, Point::new(2.5, 0.0));
        assert!(!fleet.is_moving());
        assert_eq!(integrate(&mut fleet, 0.1), MovementStep::Idle);
    }

    #[test]
    fn travel_mode_reads_snake_case() {
        let mode: TravelMode = serde_json::from_str(r#""continuous""#).unwrap();
        assert_eq!(mode, TravelMode::Continuous);
        assert_eq!(TravelMode::default(), TravelMode::Immediate);
    }

    #[test]
    fn stationary_fleet_never_arrives() {
        let mut fleet = Entity::new(EntityId(1), FactionId(0), CommanderId(1), Point::ZERO).with_speed(0.0);
        fleet.destination = Some(Point::new(5.0, 0.0));
        for _ in 0..10 {
            assert_eq!(integrate(&mut fleet, 0.1), MovementStep::Travelling);
        }
        assert_eq!(fleet.position, Point::ZERO);
    }
}
