//! Host-side grids: terrain cost field, distance seeds and distance fields.
//!
//! All grids are square, `size × size`, stored row-major.  A cost of `0.0`
//! marks an impassable wall.  Distance values use `0.0` for "unvisited" and
//! seed the goal cell with `1.0`.

use crate::error::{BenchError, Result};

/// Value written into the goal cell of a fresh distance field.
pub const DISTANCE_SEED: f32 = 1.0;
/// Value of a cell that has not been reached yet.
pub const UNVISITED: f32 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
}

impl Cell {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    fn index(self, size: u32) -> usize {
        self.y as usize * size as usize + self.x as usize
    }
}

/// Goal used when a plan does not name one: three cells in from the
/// bottom-right corner, clamped for tiny grids.
pub fn default_goal(size: u32) -> Cell {
    let g = size.saturating_sub(3);
    Cell::new(g, g)
}

/// Immutable terrain uploaded once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct CostField {
    size: u32,
    goal: Cell,
    costs: Vec<f32>,
}

impl CostField {
    /// Build a cost field from a flattened row-major array.  The goal cell
    /// is forced passable regardless of what `costs` holds there.
    pub fn new(size: u32, goal: Cell, mut costs: Vec<f32>) -> Result<Self> {
        check_dims(size, goal)?;
        let expected = size as usize * size as usize;
        if costs.len() != expected {
            return Err(BenchError::ResourceSizeMismatch {
                what: "cost field",
                message: format!("{} values supplied for a {size}x{size} grid", costs.len()),
            });
        }
        costs[goal.index(size)] = 1.0;
        Ok(Self { size, goal, costs })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn goal(&self) -> Cell {
        self.goal
    }

    pub fn costs(&self) -> &[f32] {
        &self.costs
    }

    pub fn cell_count(&self) -> usize {
        self.costs.len()
    }

    pub fn cost(&self, x: u32, y: u32) -> f32 {
        self.costs[Cell::new(x, y).index(self.size)]
    }

    /// Fresh distance field: all cells unvisited except the goal.
    pub fn distance_seed(&self) -> Vec<f32> {
        let mut seed = vec![UNVISITED; self.cell_count()];
        seed[self.goal.index(self.size)] = DISTANCE_SEED;
        seed
    }
}

fn check_dims(size: u32, goal: Cell) -> Result<()> {
    if size == 0 {
        return Err(BenchError::InvalidGrid("grid size must be non-zero".into()));
    }
    if goal.x >= size || goal.y >= size {
        return Err(BenchError::InvalidGrid(format!(
            "goal ({}, {}) lies outside a {size}x{size} grid",
            goal.x, goal.y
        )));
    }
    Ok(())
}

/// Uniform terrain: every cell costs one.
pub fn flat_terrain(size: u32, goal: Cell) -> Result<CostField> {
    let n = size as usize * size as usize;
    CostField::new(size, goal, vec![1.0; n])
}

/// Demo terrain with two walls and banded costs.
///
/// A horizontal wall runs along row `size/2` over columns
/// `[size/4, size - size/6)`, a vertical wall along column `size/3` over
/// rows `[size/5, size - size/5)`.  Both are reopened where they cross the
/// goal's column or row.  Above the horizontal wall, cells right of the
/// vertical wall cost 2 and cells left of it cost 4.
pub fn demo_terrain(size: u32, goal: Cell) -> Result<CostField> {
    check_dims(size, goal)?;
    let s = size as usize;
    let mut costs = vec![1.0f32; s * s];
    let at = |x: usize, y: usize| y * s + x;

    let wall_y = s / 2;
    for x in s / 4..s - s / 6 {
        costs[at(x, wall_y)] = 0.0;
    }
    costs[at(goal.x as usize, wall_y)] = 1.0;

    let wall_x = s / 3;
    for y in s / 5..s - s / 5 {
        costs[at(wall_x, y)] = 0.0;
    }
    costs[at(wall_x, goal.y as usize)] = 1.0;

    for y in 0..wall_y {
        for x in 0..s {
            let factor = if x >= wall_x { 2.0 } else { 4.0 };
            costs[at(x, y)] *= factor;
        }
    }

    CostField::new(size, goal, costs)
}

/// A distance field read back from the device, reshaped to `size × size`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceField {
    size: u32,
    values: Vec<f32>,
}

impl DistanceField {
    pub fn new(size: u32, values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), size as usize * size as usize);
        Self { size, values }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn row(&self, y: u32) -> &[f32] {
        let s = self.size as usize;
        let start = y as usize * s;
        &self.values[start..start + s]
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.row(y)[x as usize]
    }

    /// Number of cells with a value strictly greater than zero.
    pub fn visited_count(&self) -> usize {
        visited_count(&self.values)
    }

    pub fn cell_count(&self) -> usize {
        self.values.len()
    }

    /// Largest relative difference between two fields of equal size, with
    /// values at or below `1.0` compared absolutely.
    pub fn max_relative_difference(&self, other: &DistanceField) -> Option<f32> {
        if self.size != other.size {
            return None;
        }
        let worst = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a - b).abs() / a.abs().max(b.abs()).max(1.0))
            .fold(0.0f32, f32::max);
        Some(worst)
    }
}

pub fn visited_count(values: &[f32]) -> usize {
    values.iter().filter(|v| **v > UNVISITED).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_has_single_goal_cell() {
        for (size, goal) in [(1, Cell::new(0, 0)), (8, Cell::new(6, 6)), (17, Cell::new(3, 11))] {
            let field = flat_terrain(size, goal).unwrap();
            let seed = field.distance_seed();
            assert_eq!(visited_count(&seed), 1);
            let idx = goal.y as usize * size as usize + goal.x as usize;
            assert_eq!(seed[idx], DISTANCE_SEED);
        }
    }

    #[test]
    fn goal_is_forced_passable() {
        let field = CostField::new(4, Cell::new(1, 2), vec![0.0; 16]).unwrap();
        assert_eq!(field.cost(1, 2), 1.0);
        assert_eq!(field.cost(0, 0), 0.0);
    }

    #[test]
    fn rejects_wrong_cost_length() {
        let err = CostField::new(4, Cell::new(0, 0), vec![1.0; 15]).unwrap_err();
        assert!(matches!(err, BenchError::ResourceSizeMismatch { .. }));
    }

    #[test]
    fn rejects_goal_outside_grid() {
        assert!(matches!(
            flat_terrain(4, Cell::new(4, 0)),
            Err(BenchError::InvalidGrid(_))
        ));
        assert!(matches!(flat_terrain(0, Cell::new(0, 0)), Err(BenchError::InvalidGrid(_))));
    }

    #[test]
    fn demo_terrain_walls_and_bands() {
        let size = 60;
        let goal = default_goal(size);
        let field = demo_terrain(size, goal).unwrap();
        // horizontal wall with the goal column reopened
        assert_eq!(field.cost(20, 30), 0.0);
        assert_eq!(field.cost(goal.x, 30), 1.0);
        // vertical wall with the goal row reopened
        assert_eq!(field.cost(20, 40), 0.0);
        assert_eq!(field.cost(20, goal.y), 1.0);
        // cost bands above the horizontal wall
        assert_eq!(field.cost(30, 5), 2.0);
        assert_eq!(field.cost(5, 5), 4.0);
        assert_eq!(field.cost(5, 50), 1.0);
        assert_eq!(field.cost(goal.x, goal.y), 1.0);
    }

    #[test]
    fn relative_difference_ignores_tiny_values() {
        let a = DistanceField::new(1, vec![0.5]);
        let b = DistanceField::new(1, vec![0.50001]);
        assert!(a.max_relative_difference(&b).unwrap() < 1e-4);
        let c = DistanceField::new(2, vec![0.0; 4]);
        assert!(a.max_relative_difference(&c).is_none());
    }
}
