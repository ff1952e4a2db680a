//! Procedural Map Generation
//!
//! Builds obstacle layout, validates reachability by flood-fill on a coarse
//! walkability grid, and places spawn points maximizing minimum pairwise distance.

use crate::core::fixed::{
    fixed_abs, fixed_clamp, fixed_div, fixed_mul, to_fixed, Fixed, FIXED_ONE, MAP_HALF_HEIGHT,
    MAP_HALF_WIDTH, PLAYER_RADIUS,
};
use crate::core::rng::DeterministicRng;
use crate::core::vec2::FixedVec2;
use crate::game::state::Obstacle;

/// Spacing of the obstacle placement lattice.
const OBSTACLE_GRID_CELL: Fixed = to_fixed(150.0);
/// Jitter applied to each lattice point, as a fraction of `OBSTACLE_GRID_CELL`.
const OBSTACLE_JITTER: Fixed = to_fixed(40.0);
/// Probability an eligible lattice point receives an obstacle.
const OBSTACLE_PLACEMENT_CHANCE: Fixed = 29491; // 0.45 * 65536
const OBSTACLE_MIN_HALF_EXTENT: Fixed = to_fixed(8.0);
const OBSTACLE_MAX_HALF_EXTENT: Fixed = to_fixed(26.0);
/// Cell size of the coarse walkability grid used for flood-fill validation.
const WALK_GRID_CELL: Fixed = to_fixed(25.0);
/// Margin added to the player radius when testing a walkability cell against obstacles,
/// so a reachable cell always has room for a player to actually stand in it.
const WALK_MARGIN: Fixed = to_fixed(2.0);

/// A generated map: immutable obstacle layout plus derived spawn candidates.
#[derive(Clone, Debug)]
pub struct GeneratedMap {
    obstacles: Vec<Obstacle>,
    walkable_points: Vec<FixedVec2>,
}

impl GeneratedMap {
    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Choose `count` spawn points from the reachable set via farthest-point sampling,
    /// so the first spawn is as far as possible from the map center and each subsequent
    /// one maximizes its minimum distance to all previously chosen spawns.
    pub fn spawn_points(&self, rng: &mut DeterministicRng, count: usize) -> Vec<FixedVec2> {
        if self.walkable_points.is_empty() || count == 0 {
            return Vec::new();
        }

        let mut chosen = Vec::with_capacity(count);
        let first_idx = rng.next_int(self.walkable_points.len() as u32) as usize;
        chosen.push(self.walkable_points[first_idx]);

        while chosen.len() < count {
            let next = self
                .walkable_points
                .iter()
                .max_by_key(|&&candidate| min_distance_sq_to(candidate, &chosen))
                .copied();
            match next {
                Some(point) => chosen.push(point),
                None => break,
            }
        }

        chosen
    }

    /// Draw `count` points from the reachable set without the farthest-point spacing
    /// guarantee, for loot placement.
    pub fn random_free_points(&self, rng: &mut DeterministicRng, count: usize) -> Vec<FixedVec2> {
        if self.walkable_points.is_empty() {
            return Vec::new();
        }
        (0..count)
            .map(|_| {
                let idx = rng.next_int(self.walkable_points.len() as u32) as usize;
                self.walkable_points[idx]
            })
            .collect()
    }
}

fn min_distance_sq_to(point: FixedVec2, others: &[FixedVec2]) -> Fixed {
    others
        .iter()
        .map(|&other| point.distance_squared(other))
        .min()
        .unwrap_or(Fixed::MAX)
}

/// Generate a map deterministically from `rng`: lay obstacles on a jittered grid,
/// reject any placement that would disconnect the walkable area, then compute the
/// reachable point set used for spawn and loot placement.
pub fn generate(rng: &mut DeterministicRng) -> GeneratedMap {
    let mut obstacles = Vec::new();

    let mut x = -MAP_HALF_WIDTH + OBSTACLE_GRID_CELL;
    while x < MAP_HALF_WIDTH - OBSTACLE_GRID_CELL {
        let mut y = -MAP_HALF_HEIGHT + OBSTACLE_GRID_CELL;
        while y < MAP_HALF_HEIGHT - OBSTACLE_GRID_CELL {
            if rng.next_bool(OBSTACLE_PLACEMENT_CHANCE) {
                let jitter_x = rng.next_fixed_range(-OBSTACLE_JITTER, OBSTACLE_JITTER);
                let jitter_y = rng.next_fixed_range(-OBSTACLE_JITTER, OBSTACLE_JITTER);
                let center = FixedVec2::new(x + jitter_x, y + jitter_y);
                let half_extent = FixedVec2::new(
                    rng.next_fixed_range(OBSTACLE_MIN_HALF_EXTENT, OBSTACLE_MAX_HALF_EXTENT),
                    rng.next_fixed_range(OBSTACLE_MIN_HALF_EXTENT, OBSTACLE_MAX_HALF_EXTENT),
                );

                let candidate = Obstacle::Rect { center, half_extent };
                obstacles.push(candidate);

                if !flood_fill_covers_expected_area(&obstacles) {
                    obstacles.pop();
                }
            }
            y += OBSTACLE_GRID_CELL;
        }
        x += OBSTACLE_GRID_CELL;
    }

    let walkable_points = walkable_point_set(&obstacles);

    GeneratedMap { obstacles, walkable_points }
}

/// Minimum fraction of walkability-grid cells that must remain reachable from the
/// center after adding the latest obstacle, expressed in fixed-point (0.92 = 92%).
const MIN_REACHABLE_FRACTION: Fixed = 60293; // 0.92 * 65536

fn flood_fill_covers_expected_area(obstacles: &[Obstacle]) -> bool {
    let grid = WalkabilityGrid::build(obstacles);
    let reachable = grid.flood_fill_from_center();
    let free_total = grid.free_cell_count();
    if free_total == 0 {
        return false;
    }
    let fraction = fixed_div(to_fixed(reachable as f64), to_fixed(free_total as f64));
    fraction >= MIN_REACHABLE_FRACTION
}

fn walkable_point_set(obstacles: &[Obstacle]) -> Vec<FixedVec2> {
    let grid = WalkabilityGrid::build(obstacles);
    grid.reachable_points_from_center()
}

struct WalkabilityGrid {
    cols: usize,
    rows: usize,
    free: Vec<bool>,
}

impl WalkabilityGrid {
    fn build(obstacles: &[Obstacle]) -> Self {
        let cols = (fixed_div(MAP_HALF_WIDTH * 2, WALK_GRID_CELL) >> 16).max(1) as usize;
        let rows = (fixed_div(MAP_HALF_HEIGHT * 2, WALK_GRID_CELL) >> 16).max(1) as usize;

        let mut free = vec![true; cols * rows];
        for iy in 0..rows {
            for ix in 0..cols {
                let center = Self::cell_center(ix, iy);
                if obstacles.iter().any(|o| obstacle_overlaps_circle(o, center, PLAYER_RADIUS + WALK_MARGIN)) {
                    free[iy * cols + ix] = false;
                }
            }
        }

        Self { cols, rows, free }
    }

    fn cell_center(ix: usize, iy: usize) -> FixedVec2 {
        let x = -MAP_HALF_WIDTH + WALK_GRID_CELL * (ix as Fixed) + WALK_GRID_CELL / 2;
        let y = -MAP_HALF_HEIGHT + WALK_GRID_CELL * (iy as Fixed) + WALK_GRID_CELL / 2;
        FixedVec2::new(x, y)
    }

    fn center_index(&self) -> usize {
        (self.rows / 2) * self.cols + (self.cols / 2)
    }

    fn free_cell_count(&self) -> usize {
        self.free.iter().filter(|&&f| f).count()
    }

    fn flood_fill_from_center(&self) -> usize {
        self.flood_fill_visited_from_center().into_iter().filter(|&v| v).count()
    }

    fn reachable_points_from_center(&self) -> Vec<FixedVec2> {
        let visited = self.flood_fill_visited_from_center();
        visited
            .iter()
            .enumerate()
            .filter(|(_, &v)| v)
            .map(|(idx, _)| Self::cell_center(idx % self.cols, idx / self.cols))
            .collect()
    }

    fn flood_fill_visited_from_center(&self) -> Vec<bool> {
        let mut visited = vec![false; self.free.len()];
        let start = self.center_index();
        if !self.free.get(start).copied().unwrap_or(false) {
            return visited;
        }

        let mut stack = vec![start];
        visited[start] = true;
        while let Some(idx) = stack.pop() {
            let ix = idx % self.cols;
            let iy = idx / self.cols;

            let neighbors = [
                (ix.checked_sub(1), Some(iy)),
                (Some(ix + 1).filter(|&v| v < self.cols), Some(iy)),
                (Some(ix), iy.checked_sub(1)),
                (Some(ix), Some(iy + 1).filter(|&v| v < self.rows)),
            ];

            for (nx, ny) in neighbors {
                if let (Some(nx), Some(ny)) = (nx, ny) {
                    let nidx = ny * self.cols + nx;
                    if self.free[nidx] && !visited[nidx] {
                        visited[nidx] = true;
                        stack.push(nidx);
                    }
                }
            }
        }

        visited
    }
}

fn obstacle_overlaps_circle(obstacle: &Obstacle, center: FixedVec2, radius: Fixed) -> bool {
    match obstacle {
        Obstacle::Rect { center: rect_center, half_extent } => {
            let dx = fixed_abs(center.x - rect_center.x);
            let dy = fixed_abs(center.y - rect_center.y);
            let closest_x = dx.min(half_extent.x);
            let closest_y = dy.min(half_extent.y);
            let dist_x = dx - closest_x;
            let dist_y = dy - closest_y;
            let dist_sq = fixed_mul(dist_x, dist_x) + fixed_mul(dist_y, dist_y);
            dist_sq <= fixed_mul(radius, radius)
        }
        Obstacle::Polyline { points, half_width } => {
            points.windows(2).any(|segment| {
                let dist_sq = distance_squared_to_segment(center, segment[0], segment[1]);
                let allowed = *half_width + radius;
                dist_sq <= fixed_mul(allowed, allowed)
            })
        }
    }
}

pub fn distance_squared_to_segment(point: FixedVec2, start: FixedVec2, end: FixedVec2) -> Fixed {
    let ab = end.sub(start);
    let ab_len_sq = ab.dot(ab);
    if ab_len_sq == 0 {
        return point.distance_squared(start);
    }

    let ap = point.sub(start);
    let t = fixed_div(ap.dot(ab), ab_len_sq);
    let t_clamped = fixed_clamp(t, 0, FIXED_ONE);
    let closest = start.add(ab.scale(t_clamped));
    point.distance_squared(closest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_map_has_reachable_points() {
        let mut rng = DeterministicRng::new(42);
        let map = generate(&mut rng);
        assert!(!map.walkable_points.is_empty());
    }

    #[test]
    fn spawn_points_are_mutually_distant() {
        let mut rng = DeterministicRng::new(7);
        let map = generate(&mut rng);
        let spawns = map.spawn_points(&mut rng, 8);
        assert_eq!(spawns.len(), 8);

        for i in 0..spawns.len() {
            for j in (i + 1)..spawns.len() {
                assert!(spawns[i].distance_squared(spawns[j]) > 0);
            }
        }
    }

    #[test]
    fn flood_fill_rejects_obstacle_that_seals_off_region() {
        // Four walls forming a sealed box around the grid center should fail
        // the reachability check and never survive into the final obstacle list.
        let sealing_walls = vec![
            Obstacle::Rect { center: FixedVec2::new(to_fixed(30.0), 0), half_extent: FixedVec2::new(to_fixed(1.0), to_fixed(500.0)) },
            Obstacle::Rect { center: FixedVec2::new(to_fixed(-30.0), 0), half_extent: FixedVec2::new(to_fixed(1.0), to_fixed(500.0)) },
            Obstacle::Rect { center: FixedVec2::new(0, to_fixed(30.0)), half_extent: FixedVec2::new(to_fixed(500.0), to_fixed(1.0)) },
            Obstacle::Rect { center: FixedVec2::new(0, to_fixed(-30.0)), half_extent: FixedVec2::new(to_fixed(500.0), to_fixed(1.0)) },
        ];
        assert!(!flood_fill_covers_expected_area(&sealing_walls));
    }

    #[test]
    fn obstacle_overlap_detects_rect_hit_and_miss() {
        let rect = Obstacle::Rect { center: FixedVec2::ZERO, half_extent: FixedVec2::new(to_fixed(5.0), to_fixed(5.0)) };
        assert!(obstacle_overlaps_circle(&rect, FixedVec2::new(to_fixed(4.0), 0), to_fixed(2.0)));
        assert!(!obstacle_overlaps_circle(&rect, FixedVec2::new(to_fixed(50.0), 0), to_fixed(2.0)));
    }
}
