//! Semi-Lagrangian transport: trace each sample back along the velocity and resample.

use crate::error::Result;
use crate::field::Field;
use crate::mac::MacVelocity;

fn back_trace(pos: &[f64], velocity: &MacVelocity, dt: f64) -> Vec<f64> {
    let v = velocity.sample_linear(pos);
    pos.iter().zip(v.iter()).map(|(p, v)| p - v * dt).collect()
}

/// Advects a centered field; the velocity is sampled at cell centers.
pub fn advect_scalar(field: &Field, velocity: &MacVelocity, dt: f64) -> Result<Field> {
    velocity.ensure_same_grid("advect_scalar", field.grid())?;
    if dt == 0.0 {
        return Ok(field.clone());
    }
    let grid = field.grid();
    Ok(field.map_with_index(|i, _| {
        let pos = grid.cell_center_at(i);
        field.sample_linear(&back_trace(&pos, velocity, dt))
    }))
}

/// Advects each staggered component of `field` from its own face centers.
pub fn advect_velocity(field: &MacVelocity, velocity: &MacVelocity, dt: f64) -> Result<MacVelocity> {
    velocity.ensure_same_grid("advect_velocity", field.grid())?;
    if dt == 0.0 {
        return Ok(field.clone());
    }
    Ok(field.map_components(|component| {
        component.map_with_index(|i, _| {
            let pos = component.position(i);
            component.sample_linear(&back_trace(&pos, velocity, dt))
        })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Extrapolation, Grid};

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() <= tol,
            "expected {a} to be within {tol} of {b}"
        );
    }

    #[test]
    fn zero_dt_is_identity() {
        let grid = Grid::new(&[5, 4], 1.0);
        let field = Field::from_fn(&grid, |c| (c[0] * c[1]) as f64);
        let velocity = MacVelocity::new(&grid, &[3.0, -1.0]);
        assert_eq!(advect_scalar(&field, &velocity, 0.0).unwrap(), field);
        assert_eq!(advect_velocity(&velocity, &velocity, 0.0).unwrap(), velocity);
    }

    #[test]
    fn uniform_flow_shifts_by_whole_cells() {
        let grid = Grid::new(&[6], 1.0);
        let field = Field::from_fn(&grid, |c| c[0] as f64)
            .with_extrapolation(&[Extrapolation::Periodic]);
        let velocity = MacVelocity::new(&grid, &[1.0]);
        let moved = advect_scalar(&field, &velocity, 1.0).unwrap();
        assert_close(moved.get(&[3]), 2.0, 1e-12);
        assert_close(moved.get(&[0]), 5.0, 1e-12);
        let back = advect_scalar(&field, &velocity, -1.0).unwrap();
        assert_close(back.get(&[3]), 4.0, 1e-12);
    }

    #[test]
    fn uniform_velocity_advects_itself_unchanged() {
        let grid = Grid::new(&[4, 4], 0.5);
        let velocity = MacVelocity::new(&grid, &[0.3, 0.6]);
        let moved = advect_velocity(&velocity, &velocity, 0.7).unwrap();
        assert!(moved.sub(&velocity).max_abs() < 1e-12);
    }

    #[test]
    fn rejects_mismatched_grids() {
        let field = Field::new(&Grid::new(&[4, 4], 1.0), 0.0);
        let velocity = MacVelocity::zeros(&Grid::new(&[4, 3], 1.0));
        assert!(advect_scalar(&field, &velocity, 0.1).is_err());
    }
}
