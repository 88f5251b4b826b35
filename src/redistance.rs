//! Signed-distance maintenance for the liquid surface.
//!
//! Distances are rebuilt by bounded Jacobi relaxation: the cells on either side of the
//! surface keep their values and every other cell takes the smallest
//! `neighbour + dx·|offset|` over the `3^rank - 1` neighbour offsets, one ring per sweep.

use log::trace;

use crate::error::Result;
use crate::field::Field;
use crate::grid::collect_indexed;
use crate::mac::MacVelocity;
use crate::mask::{surface_band, validate_mask};

/// Recomputes `sdf` for a changed `active` mask.
///
/// `max_distance` is both the number of sweeps and the clamp, in cells. After relaxation
/// the whole field is lowered by `dt·max|velocity|·dissipation`.
pub fn redistance(
    sdf: &Field,
    active: &Field,
    velocity: &MacVelocity,
    max_distance: usize,
    dt: f64,
    dx: f64,
    dissipation: f64,
) -> Result<Field> {
    sdf.ensure_same_grid("redistance(active)", active)?;
    velocity.ensure_same_grid("redistance(velocity)", sdf.grid())?;
    validate_mask("redistance(active)", active)?;
    let band = surface_band(active);
    let seeded = seed(sdf, active, &band, max_distance, dx);
    let relaxed = relax(&seeded, active, &band, max_distance, dx);
    let erosion = dt * velocity.max_abs() * dissipation;
    Ok(relaxed.map(|value| value - erosion))
}

/// Distance field for a mask with no prior surface: band cells start half a cell from the
/// surface on their own side.
pub fn initial_sdf(active: &Field, max_distance: usize, dx: f64) -> Result<Field> {
    validate_mask("initial_sdf(active)", active)?;
    let band = surface_band(active);
    let half = active.map(|a| -(2.0 * a - 1.0) * 0.5 * dx);
    let seeded = seed(&half, active, &band, max_distance, dx);
    Ok(relax(&seeded, active, &band, max_distance, dx))
}

/// `-(2a - 1)`: -1 inside, +1 outside.
fn sign(active: f64) -> f64 {
    -(2.0 * active - 1.0)
}

fn seed(sdf: &Field, active: &Field, band: &[bool], max_distance: usize, dx: f64) -> Field {
    let far = 2.0 * (max_distance as f64 + 1.0) * dx;
    sdf.map_with_index(|i, old| {
        let a = active.at(i);
        if !band[i] {
            return far * sign(a);
        }
        // a cell that just became fluid starts on the surface, not deep inside
        if a > 0.5 && old >= 0.5 * dx {
            0.0
        } else {
            old
        }
    })
}

fn relax(seeded: &Field, active: &Field, band: &[bool], max_distance: usize, dx: f64) -> Field {
    let grid = seeded.grid();
    let offsets: Vec<(Vec<isize>, f64)> = grid
        .neighbor_offsets()
        .into_iter()
        .map(|offset| {
            let length = offset.iter().map(|o| (o * o) as f64).sum::<f64>().sqrt();
            (offset, length * dx)
        })
        .collect();
    let shape = grid.shape();
    let mut current = seeded.clone();
    for sweep in 0..max_distance {
        let snapshot = &current;
        let data = collect_indexed(grid.size(), |i| {
            let value = snapshot.at(i);
            if band[i] {
                return value;
            }
            let s = sign(active.at(i));
            let coords = grid.coords(i);
            let mut best = value;
            for (offset, step) in &offsets {
                let mut neighbour = Vec::with_capacity(coords.len());
                let mut inside = true;
                for (axis, (c, o)) in coords.iter().zip(offset.iter()).enumerate() {
                    let n = *c as isize + o;
                    if n < 0 || n >= shape[axis] as isize {
                        inside = false;
                        break;
                    }
                    neighbour.push(n as usize);
                }
                if !inside {
                    continue;
                }
                let candidate = snapshot.get(&neighbour) + step * s;
                if candidate.abs() < best.abs() {
                    best = candidate;
                }
            }
            best
        });
        current = current.map_with_index(|i, _| data[i]);
        trace!("redistance sweep {} of {}", sweep + 1, max_distance);
    }
    let limit = max_distance as f64 * dx;
    current.map_with_index(|i, value| {
        if value.abs() < limit {
            value
        } else {
            limit * sign(active.at(i))
        }
    })
}
