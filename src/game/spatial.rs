//! Uniform Spatial Grid
//!
//! Deterministic neighborhood queries for collision and interest management.
//! Cell size is fixed at `2 * PLAYER_RADIUS`; queries return entities in the
//! insertion order they were added for this tick, never hash order.

use std::collections::BTreeMap;

use crate::core::fixed::{Fixed, fixed_div, PLAYER_RADIUS};
use crate::core::vec2::FixedVec2;

/// Cell size for the grid; large enough that any two players that can overlap
/// fall in the same or adjacent cells.
pub const CELL_SIZE: Fixed = PLAYER_RADIUS * 2;

/// Integer grid coordinates of one cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

fn cell_of(position: FixedVec2) -> CellCoord {
    CellCoord {
        x: fixed_div(position.x, CELL_SIZE) >> 16,
        y: fixed_div(position.y, CELL_SIZE) >> 16,
    }
}

/// A grid over one kind of point entity, rebuilt once per tick.
///
/// Keyed by `CellCoord` in a `BTreeMap` so cell iteration is deterministic;
/// within a cell entries are kept in insertion order.
#[derive(Clone, Debug, Default)]
pub struct SpatialGrid<T> {
    cells: BTreeMap<CellCoord, Vec<(T, FixedVec2)>>,
}

impl<T: Copy> SpatialGrid<T> {
    /// Construct an empty grid.
    pub fn new() -> Self {
        Self { cells: BTreeMap::new() }
    }

    /// Insert an entity at `position`, in insertion order within its cell.
    pub fn insert(&mut self, id: T, position: FixedVec2) {
        self.cells.entry(cell_of(position)).or_default().push((id, position));
    }

    /// Remove all entries, keeping allocated capacity for reuse next tick.
    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Visit every entity within `radius` of `center`, in deterministic
    /// (cell-ascending, then insertion) order. Does not dedupe or sort by distance.
    pub fn query_radius(&self, center: FixedVec2, radius: Fixed, mut visit: impl FnMut(T, FixedVec2)) {
        let radius_sq = crate::core::fixed::fixed_mul(radius, radius);
        let cell_span = (radius / CELL_SIZE) + 1;
        let origin = cell_of(center);

        for dy in -cell_span..=cell_span {
            for dx in -cell_span..=cell_span {
                let coord = CellCoord { x: origin.x + dx, y: origin.y + dy };
                if let Some(entries) = self.cells.get(&coord) {
                    for &(id, pos) in entries {
                        if pos.distance_squared(center) <= radius_sq {
                            visit(id, pos);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::to_fixed;

    #[test]
    fn query_radius_finds_nearby_and_excludes_far() {
        let mut grid: SpatialGrid<u32> = SpatialGrid::new();
        grid.insert(1, FixedVec2::new(0, 0));
        grid.insert(2, FixedVec2::new(to_fixed(1.0), 0));
        grid.insert(3, FixedVec2::new(to_fixed(500.0), 0));

        let mut found = Vec::new();
        grid.query_radius(FixedVec2::ZERO, to_fixed(5.0), |id, _| found.push(id));
        found.sort();
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn cell_size_is_twice_player_radius() {
        assert_eq!(CELL_SIZE, PLAYER_RADIUS * 2);
    }
}
