//! Host-side reference for the shipped relaxation kernels.
//!
//! Mirrors `shaders/relax_*.wgsl` step for step so GPU output can be
//! checked against it.  Not used on the timed path.

use crate::grid::CostField;

/// Apply one relaxation step to `input`, returning the next field.
pub fn relax_step(terrain: &CostField, early_out: bool, input: &[f32]) -> Vec<f32> {
    let s = terrain.size() as i64;
    let costs = terrain.costs();
    let at = |x: i64, y: i64| (y * s + x) as usize;
    let mut out = vec![0.0f32; input.len()];

    for y in 0..s {
        for x in 0..s {
            let idx = at(x, y);
            let c = costs[idx];
            let current = input[idx];
            if c <= 0.0 {
                out[idx] = current;
                continue;
            }
            let mut best = current;
            let mut settled = current > 0.0;
            for dy in -1..=1i64 {
                for dx in -1..=1i64 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= s || ny >= s {
                        continue;
                    }
                    let d = input[at(nx, ny)];
                    if d <= 0.0 {
                        if costs[at(nx, ny)] > 0.0 {
                            settled = false;
                        }
                        continue;
                    }
                    let step = if dx != 0 && dy != 0 { c * std::f32::consts::SQRT_2 } else { c };
                    let candidate = d + step;
                    if best <= 0.0 || candidate < best {
                        best = candidate;
                    }
                }
            }
            out[idx] = if early_out && settled { current } else { best };
        }
    }
    out
}

/// Run `iterations` steps from the terrain's seed.
pub fn relax(terrain: &CostField, early_out: bool, iterations: u32) -> Vec<f32> {
    let mut field = terrain.distance_seed();
    for _ in 0..iterations {
        field = relax_step(terrain, early_out, &field);
    }
    field
}
