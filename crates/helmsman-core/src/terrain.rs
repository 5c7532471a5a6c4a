//! Static hazard map consulted by warp resolution and order admission.
//!
//! A [`TerrainField`] is a dense `width x height` grid of [`TerrainCell`]s.
//! Cell `(i, j)` is centred on map point `(i, j)`; lookups round a continuous
//! position to the nearest cell centre. Anything outside the grid reads as
//! void, so off-map points are never passable.

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

// ---------------------------------------------------------------------------
// TerrainType / TerrainCell
// ---------------------------------------------------------------------------

/// Kind of space occupying a terrain cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerrainType {
    Space,
    PlasmaStorm,
    Nebula,
    AsteroidField,
    Void,
}

impl TerrainType {
    /// Hazard level a freshly placed cell of this type carries.
    pub fn default_hazard(self) -> u8 {
        match self {
            TerrainType::Space => 0,
            TerrainType::Nebula | TerrainType::AsteroidField => 1,
            TerrainType::PlasmaStorm | TerrainType::Void => 2,
        }
    }
}

/// Highest hazard level a cell may carry.
pub const MAX_HAZARD: u8 = 2;

/// One cell of the terrain grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerrainCell {
    pub terrain_type: TerrainType,
    /// 0 = safe, 1 = moderate, 2 = high.
    pub hazard_level: u8,
    pub impassable: bool,
}

impl TerrainCell {
    /// A cell of the given type with its default hazard. Void is always
    /// impassable; every other type starts passable.
    pub fn new(terrain_type: TerrainType) -> Self {
        Self {
            terrain_type,
            hazard_level: terrain_type.default_hazard(),
            impassable: terrain_type == TerrainType::Void,
        }
    }

    /// Override the hazard level, clamped to [`MAX_HAZARD`].
    pub fn with_hazard(mut self, hazard_level: u8) -> Self {
        self.hazard_level = hazard_level.min(MAX_HAZARD);
        self
    }

    /// Mark the cell impassable. Void cells ignore `false`.
    pub fn with_impassable(mut self, impassable: bool) -> Self {
        self.impassable = impassable || self.terrain_type == TerrainType::Void;
        self
    }

    pub fn space() -> Self {
        Self::new(TerrainType::Space)
    }

    pub fn void() -> Self {
        Self::new(TerrainType::Void)
    }
}

// ---------------------------------------------------------------------------
// TerrainField
// ---------------------------------------------------------------------------

/// Dense terrain grid for one map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainField {
    width: u32,
    height: u32,
    cells: Vec<TerrainCell>,
}

impl TerrainField {
    /// A field of the given size filled with open space.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, TerrainType::Space)
    }

    /// A field of the given size filled with one terrain type.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is zero.
    pub fn filled(width: u32, height: u32, terrain_type: TerrainType) -> Self {
        assert!(
            width > 0 && height > 0,
            "terrain field must be at least 1x1, got {width}x{height}"
        );
        Self {
            width,
            height,
            cells: vec![TerrainCell::new(terrain_type); (width as usize) * (height as usize)],
        }
    }

    /// Builder form of [`set_cell`](Self::set_cell).
    pub fn with_cell(mut self, ix: u32, iy: u32, cell: TerrainCell) -> Self {
        self.set_cell(ix, iy, cell);
        self
    }

    /// Fill an inclusive rectangle of cells. Out-of-grid parts are ignored.
    pub fn with_rect(mut self, from: (u32, u32), to: (u32, u32), cell: TerrainCell) -> Self {
        for iy in from.1..=to.1.min(self.height.saturating_sub(1)) {
            for ix in from.0..=to.0.min(self.width.saturating_sub(1)) {
                self.set_cell(ix, iy, cell);
            }
        }
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Replace one cell. Returns `false` if the index is off the grid.
    pub fn set_cell(&mut self, ix: u32, iy: u32, cell: TerrainCell) -> bool {
        match self.index(ix, iy) {
            Some(i) => {
                self.cells[i] = cell;
                true
            }
            None => false,
        }
    }

    /// Cell at an integer grid index, if on the grid.
    pub fn cell(&self, ix: u32, iy: u32) -> Option<&TerrainCell> {
        self.index(ix, iy).map(|i| &self.cells[i])
    }

    /// Cell containing the continuous point `(x, y)`. Off-map reads as void.
    pub fn at(&self, x: f64, y: f64) -> TerrainCell {
        match self.cell_index_of(Point::new(x, y)) {
            Some((ix, iy)) => self.cells[self.width as usize * iy as usize + ix as usize],
            None => TerrainCell::void(),
        }
    }

    pub fn at_point(&self, p: Point) -> TerrainCell {
        self.at(p.x, p.y)
    }

    /// Whether `p` lies inside the map bounds `[0, width-1] x [0, height-1]`.
    pub fn contains(&self, p: Point) -> bool {
        p.is_finite()
            && p.x >= 0.0
            && p.y >= 0.0
            && p.x <= self.max_x()
            && p.y <= self.max_y()
    }

    /// Clamp `p` into the map bounds.
    pub fn clamp(&self, p: Point) -> Point {
        Point::new(p.x.clamp(0.0, self.max_x()), p.y.clamp(0.0, self.max_y()))
    }

    /// Grid index of the cell containing `p`, if on the grid.
    pub fn cell_index_of(&self, p: Point) -> Option<(u32, u32)> {
        if !p.is_finite() {
            return None;
        }
        let ix = p.x.round();
        let iy = p.y.round();
        if ix < 0.0 || iy < 0.0 || ix >= self.width as f64 || iy >= self.height as f64 {
            return None;
        }
        Some((ix as u32, iy as u32))
    }

    fn max_x(&self) -> f64 {
        (self.width - 1) as f64
    }

    fn max_y(&self) -> f64 {
        (self.height - 1) as f64
    }

    fn index(&self, ix: u32, iy: u32) -> Option<usize> {
        if ix < self.width && iy < self.height {
            Some(self.width as usize * iy as usize + ix as usize)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_is_always_impassable() {
        let cell = TerrainCell::void().with_impassable(false);
        assert!(cell.impassable);
        assert!(!TerrainCell::new(TerrainType::Nebula).impassable);
    }

    #[test]
    fn default_hazards_by_type() {
        assert_eq!(TerrainCell::space().hazard_level, 0);
        assert_eq!(TerrainCell::new(TerrainType::Nebula).hazard_level, 1);
        assert_eq!(TerrainCell::new(TerrainType::PlasmaStorm).hazard_level, 2);
        assert_eq!(TerrainCell::space().with_hazard(9).hazard_level, MAX_HAZARD);
    }

    #[test]
    fn lookup_rounds_to_nearest_cell() {
        let field = TerrainField::new(4, 4).with_cell(2, 1, TerrainCell::new(TerrainType::Nebula));
        assert_eq!(field.at(2.4, 0.6).terrain_type, TerrainType::Nebula);
        assert_eq!(field.at(1.4, 0.6).terrain_type, TerrainType::Space);
    }

    #[test]
    fn off_map_reads_as_void() {
        let field = TerrainField::new(4, 4);
        assert_eq!(field.at(-1.0, 0.0).terrain_type, TerrainType::Void);
        assert_eq!(field.at(0.0, 10.0).terrain_type, TerrainType::Void);
        assert!(field.at(f64::NAN, 0.0).impassable);
    }

    #[test]
    fn contains_and_clamp_use_cell_centre_bounds() {
        let field = TerrainField::new(10, 5);
        assert!(field.contains(Point::new(9.0, 4.0)));
        assert!(!field.contains(Point::new(9.1, 4.0)));
        assert_eq!(field.clamp(Point::new(-3.0, 12.0)), Point::new(0.0, 4.0));
    }

    #[test]
    fn with_rect_fills_inclusive_region() {
        let field = TerrainField::new(5, 5).with_rect((1, 1), (2, 3), TerrainCell::void());
        assert!(field.cell(1, 1).is_some_and(|c| c.impassable));
        assert!(field.cell(2, 3).is_some_and(|c| c.impassable));
        assert!(field.cell(3, 3).is_some_and(|c| !c.impassable));
    }

    #[test]
    #[should_panic(expected = "at least 1x1")]
    fn zero_sized_field_panics() {
        let _ = TerrainField::new(0, 3);
    }
}
