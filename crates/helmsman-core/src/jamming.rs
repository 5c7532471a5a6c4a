//! Electronic-warfare state per map region.
//!
//! The [`JammingField`] divides the map into square regions of
//! `region_size` cells and stores one [`JammingLevel`] per region. It is
//! written by world-event collaborators (for example a combat system raising
//! interference around an active battle) and read by order admission.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Strength of interference in a region, weakest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JammingLevel {
    #[default]
    Clear,
    Interference,
    Heavy,
    /// No new orders can reach fleets in the region.
    Blackout,
}

impl fmt::Display for JammingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JammingLevel::Clear => "CLEAR",
            JammingLevel::Interference => "INTERFERENCE",
            JammingLevel::Heavy => "HEAVY",
            JammingLevel::Blackout => "BLACKOUT",
        };
        f.write_str(name)
    }
}

/// Region grid of jamming levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JammingField {
    region_size: u32,
    cols: u32,
    rows: u32,
    levels: Vec<JammingLevel>,
}

impl JammingField {
    /// An all-clear field covering a `width x height` cell map.
    ///
    /// # Panics
    ///
    /// Panics if `region_size` is zero.
    pub fn new(width: u32, height: u32, region_size: u32) -> Self {
        assert!(region_size > 0, "jamming region_size must be positive");
        let cols = width.div_ceil(region_size).max(1);
        let rows = height.div_ceil(region_size).max(1);
        Self {
            region_size,
            cols,
            rows,
            levels: vec![JammingLevel::Clear; (cols as usize) * (rows as usize)],
        }
    }

    /// A single-region field with one level everywhere.
    pub fn uniform(level: JammingLevel) -> Self {
        Self {
            region_size: u32::MAX,
            cols: 1,
            rows: 1,
            levels: vec![level],
        }
    }

    pub fn region_size(&self) -> u32 {
        self.region_size
    }

    pub fn regions(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    /// Jamming level at a continuous point. Off-map points read as clear.
    pub fn level_at(&self, x: f64, y: f64) -> JammingLevel {
        match self.region_of(Point::new(x, y)) {
            Some((col, row)) => self.levels[(row * self.cols + col) as usize],
            None => JammingLevel::Clear,
        }
    }

    pub fn level_at_point(&self, p: Point) -> JammingLevel {
        self.level_at(p.x, p.y)
    }

    /// Set a region's level. Returns `false` if the region is off the grid.
    pub fn set_region(&mut self, col: u32, row: u32, level: JammingLevel) -> bool {
        if col >= self.cols || row >= self.rows {
            return false;
        }
        self.levels[(row * self.cols + col) as usize] = level;
        true
    }

    /// Builder form of [`set_region`](Self::set_region).
    pub fn with_region(mut self, col: u32, row: u32, level: JammingLevel) -> Self {
        self.set_region(col, row, level);
        self
    }

    /// Raise every region whose centre lies within `radius` of `center` to at
    /// least `level`. Regions already above `level` are left alone.
    pub fn raise_around(&mut self, center: Point, radius: f64, level: JammingLevel) -> usize {
        let half = if self.region_size == u32::MAX {
            0.0
        } else {
            self.region_size as f64 / 2.0
        };
        let mut raised = 0;
        for row in 0..self.rows {
            for col in 0..self.cols {
                let region_center = Point::new(
                    col as f64 * self.region_size as f64 + half,
                    row as f64 * self.region_size as f64 + half,
                );
                let idx = (row * self.cols + col) as usize;
                if (self.region_size == u32::MAX || region_center.distance(center) <= radius)
                    && self.levels[idx] < level
                {
                    self.levels[idx] = level;
                    raised += 1;
                }
            }
        }
        raised
    }

    /// Reset every region to clear.
    pub fn clear_all(&mut self) {
        self.levels.fill(JammingLevel::Clear);
    }

    fn region_of(&self, p: Point) -> Option<(u32, u32)> {
        if !p.is_finite() {
            return None;
        }
        // Cell (i, j) spans [i - 0.5, i + 0.5); regions group whole cells.
        let cx = p.x.round();
        let cy = p.y.round();
        if cx < 0.0 || cy < 0.0 {
            return None;
        }
        let col = (cx as u64 / self.region_size as u64) as u32;
        let row = (cy as u64 / self.region_size as u64) as u32;
        if col >= self.cols || row >= self.rows {
            return None;
        }
        Some((col, row))
    }
}

impl Default for JammingField {
    fn default() -> Self {
        Self::uniform(JammingLevel::Clear)
    }
}
