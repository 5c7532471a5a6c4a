//! Stochastic warp arrival.
//!
//! A warp jump never lands exactly where it was aimed unless the destination
//! cell is safe. The error vector is drawn uniformly from
//! `[-hazard, +hazard]` on each axis using the caller's seeded generator, so a
//! session replays identically from the same seed.
//!
//! If the displaced point lands on impassable terrain the roll is repeated up
//! to [`WarpConfig::max_rerolls`] times. After that the fleet is placed on the
//! passable cell centre closest to the last rolled point, chosen among cells
//! that keep the error within the hazard box (ties go to lower x, then lower
//! y). The destination's own cell always qualifies, so a passable destination
//! always resolves.
//!
//! # Example
//!
//! ```
//! use helmsman_core::prelude::*;
//! use rand::SeedableRng;
//!
//! let terrain = TerrainField::new(50, 50)
//!     .with_cell(20, 20, TerrainCell::new(TerrainType::PlasmaStorm));
//! let mut rng = rand_pcg::Pcg64::seed_from_u64(7);
//!
//! let outcome = resolve_warp(
//!     Point::new(0.0, 0.0),
//!     Point::new(20.0, 20.0),
//!     &terrain,
//!     &mut rng,
//!     &WarpConfig::default(),
//! )
//! .unwrap();
//! assert!(outcome.error_vector.x.abs() <= 2.0);
//! assert!(outcome.error_vector.y.abs() <= 2.0);
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::geometry::Point;
use crate::terrain::{TerrainField, TerrainType};

/// Tunables for warp resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpConfig {
    /// Additional rolls after the first one lands on impassable terrain.
    pub max_rerolls: u32,
}

impl Default for WarpConfig {
    fn default() -> Self {
        Self { max_rerolls: 3 }
    }
}

/// Where a warp jump actually arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarpOutcome {
    pub requested_destination: Point,
    pub final_destination: Point,
    /// `final_destination - requested_destination`, each axis bounded by the
    /// destination's hazard level.
    pub error_vector: Point,
    /// Terrain at the requested destination.
    pub terrain_type: TerrainType,
    pub hazard_level: u8,
    /// Number of rolls discarded because they landed on impassable terrain.
    #[serde(default)]
    pub rerolls: u32,
    /// Whether the nearest-passable-cell fallback placed the fleet.
    #[serde(default)]
    pub fell_back: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WarpError {
    #[error("warp destination {0} cannot hold a fleet")]
    ImpassableDestination(Point),

    #[error("warp destination {0} lies outside the map")]
    OutOfBounds(Point),
}

/// Resolve a warp jump from `origin` to `destination`.
///
/// # Errors
///
/// - [`WarpError::OutOfBounds`] if `destination` is off the map.
/// - [`WarpError::ImpassableDestination`] if the destination cell is
///   impassable, or no passable placement exists within the hazard box.
///
/// On error no outcome is produced and the caller must not move the fleet.
pub fn resolve_warp<R: Rng + ?Sized>(
    origin: Point,
    destination: Point,
    terrain: &TerrainField,
    rng: &mut R,
    config: &WarpConfig,
) -> Result<WarpOutcome, WarpError> {
    if !terrain.contains(destination) {
        return Err(WarpError::OutOfBounds(destination));
    }
    let cell = terrain.at_point(destination);
    if cell.impassable {
        return Err(WarpError::ImpassableDestination(destination));
    }

    let outcome = |final_destination: Point, error_vector: Point, rerolls: u32, fell_back| {
        WarpOutcome {
            requested_destination: destination,
            final_destination,
            error_vector,
            terrain_type: cell.terrain_type,
            hazard_level: cell.hazard_level,
            rerolls,
            fell_back,
        }
    };

    if cell.hazard_level == 0 {
        return Ok(outcome(destination, Point::ZERO, 0, false));
    }

    let h = cell.hazard_level as f64;
    // Error-space bounds that keep the arrival on the map. Both straddle 0
    // because `destination` is on the map.
    let bounds = terrain.clamp(Point::new(f64::INFINITY, f64::INFINITY));
    let (lo_x, hi_x) = (-destination.x, bounds.x - destination.x);
    let (lo_y, hi_y) = (-destination.y, bounds.y - destination.y);

    let mut last_rolled = destination;
    for attempt in 0..=config.max_rerolls {
        let error = Point::new(
            rng.gen_range(-h..=h).clamp(lo_x, hi_x),
            rng.gen_range(-h..=h).clamp(lo_y, hi_y),
        );
        let landing = terrain.clamp(destination + error);
        if !terrain.at_point(landing).impassable {
            trace!(
                origin = %origin,
                destination = %destination,
                landing = %landing,
                attempt,
                "warp resolved"
            );
            return Ok(outcome(landing, error, attempt, false));
        }
        last_rolled = landing;
    }

    match nearest_passable(terrain, destination, h, last_rolled) {
        Some((landing, error)) => {
            debug!(
                destination = %destination,
                rolled = %last_rolled,
                landing = %landing,
                "warp rerolls exhausted, placed on nearest passable cell"
            );
            Ok(outcome(landing, error, config.max_rerolls + 1, true))
        }
        None => Err(WarpError::ImpassableDestination(destination)),
    }
}

/// Passable cell centre closest to `rolled` whose offset from `destination`
/// stays within `h` on both axes. Ties prefer lower x, then lower y.
fn nearest_passable(
    terrain: &TerrainField,
    destination: Point,
    h: f64,
    rolled: Point,
) -> Option<(Point, Point)> {
    let min_x = (destination.x - h).ceil().max(0.0) as u32;
    let max_x = (destination.x + h).floor().min((terrain.width() - 1) as f64) as u32;
    let min_y = (destination.y - h).ceil().max(0.0) as u32;
    let max_y = (destination.y + h).floor().min((terrain.height() - 1) as f64) as u32;

    let mut best: Option<(f64, Point, Point)> = None;
    for ix in min_x..=max_x {
        for iy in min_y..=max_y {
            let passable = terrain.cell(ix, iy).is_some_and(|c| !c.impassable);
            if !passable {
                continue;
            }
            let centre = Point::new(ix as f64, iy as f64);
            let error = centre - destination;
            if error.x.abs() > h || error.y.abs() > h {
                continue;
            }
            let d = centre.distance_squared(rolled);
            if best.as_ref().map_or(true, |(bd, _, _)| d < *bd) {
                best = Some((d, centre, error));
            }
        }
    }
    best.map(|(_, centre, error)| (centre, error))
}
