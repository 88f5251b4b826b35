//! Binary cell masks and the face masks derived from them.

use crate::domain::Domain;
use crate::error::{FluidError, Result};
use crate::field::Field;
use crate::geometry::{Geometry, Obstacle};
use crate::grid::{Extrapolation, Grid};
use crate::mac::{stagger_max, stagger_min, MacVelocity};

/// 1 at cell centers inside `geometry`.
pub fn geometry_mask(grid: &Grid, geometry: &Geometry) -> Field {
    Field::from_fn(grid, |coords| {
        if geometry.contains(&grid.cell_center(coords)) {
            1.0
        } else {
            0.0
        }
    })
}

/// Union of all obstacle geometries sampled at cell centers.
pub fn occupancy(grid: &Grid, obstacles: &[Obstacle]) -> Field {
    Field::from_fn(grid, |coords| {
        let center = grid.cell_center(coords);
        if obstacles.iter().any(|o| o.geometry.contains(&center)) {
            1.0
        } else {
            0.0
        }
    })
}

/// `1 - occupancy`, extrapolated the way fluid cells are: periodic or empty.
pub fn active_mask(domain: &Domain, occupancy: &Field) -> Field {
    occupancy
        .map(|value| 1.0 - value)
        .with_extrapolation(&domain.active_extrapolation())
}

/// Same cells as `active`, but walls read as solid and open sides as free.
pub fn accessible_mask(domain: &Domain, active: &Field) -> Field {
    active
        .clone()
        .with_extrapolation(&domain.accessible_extrapolation())
}

/// Faces whose two neighbouring cells are both accessible.
pub fn hard_boundary(accessible: &Field) -> MacVelocity {
    stagger_min(accessible)
}

/// Faces touching at least one occupied cell.
pub fn touching_faces(occupancy: &Field) -> MacVelocity {
    let grid = occupancy.grid();
    stagger_max(&occupancy.clone().with_extrapolation(&vec![Extrapolation::Zero; grid.rank()]))
}

/// `a + b - a·b`; the logical OR for binary inputs.
pub fn mask_union(a: &Field, b: &Field) -> Field {
    a.zip_with(b, |x, y| x + y - x * y)
}

pub fn binary_mask(field: &Field, predicate: impl Fn(f64) -> bool + Sync) -> Field {
    field.map(|value| if predicate(value) { 1.0 } else { 0.0 })
}

/// Cells whose mask value differs from at least one neighbour in {-1, 0, 1}^rank.
/// The domain edge never counts as a surface.
pub fn surface_band(mask: &Field) -> Vec<bool> {
    let grid = mask.grid();
    let clamped = mask
        .clone()
        .with_extrapolation(&vec![Extrapolation::Boundary; grid.rank()]);
    let offsets = grid.neighbor_offsets();
    (0..grid.size())
        .map(|i| {
            let coords = grid.coords(i);
            let value = clamped.at(i);
            offsets.iter().any(|offset| {
                let neighbour: Vec<isize> = coords
                    .iter()
                    .zip(offset.iter())
                    .map(|(c, o)| *c as isize + o)
                    .collect();
                clamped.value_at(&neighbour) != value
            })
        })
        .collect()
}

pub fn validate_mask(context: &'static str, mask: &Field) -> Result<()> {
    match mask
        .data()
        .iter()
        .find(|value| !(0.0..=1.0).contains(*value))
    {
        Some(value) => Err(FluidError::InvalidMask {
            context,
            value: *value,
        }),
        None => Ok(()),
    }
}
