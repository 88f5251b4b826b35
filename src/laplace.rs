use crate::error::Result;
use crate::field::Field;
use crate::grid::collect_indexed;
use crate::mask::validate_mask;

/// Discrete Laplacian of `p` restricted to the fluid.
///
/// Per axis and side, a neighbour contributes `-M_n·p` to the diagonal and
/// `A·M_n·A_n·p_n` off the diagonal, where `M`/`A` are the accessible/active masks and `A`
/// is the cell's own active value. Ghost values come from each field's extrapolation.
/// The result is scaled by `1/dx²`.
pub fn masked_laplace(p: &Field, active: &Field, accessible: &Field) -> Result<Field> {
    p.ensure_same_grid("masked_laplace(active)", active)?;
    p.ensure_same_grid("masked_laplace(accessible)", accessible)?;
    validate_mask("masked_laplace(active)", active)?;
    validate_mask("masked_laplace(accessible)", accessible)?;
    Ok(apply(p, active, accessible))
}

/// Same stencil without the input checks; used as the solver's operator.
pub(crate) fn apply(p: &Field, active: &Field, accessible: &Field) -> Field {
    let grid = p.grid();
    let inv_dx2 = 1.0 / (grid.dx() * grid.dx());
    let rank = grid.rank();
    let data = collect_indexed(grid.size(), |i| {
        let center = p.at(i);
        let center_active = active.at(i);
        let mut total = 0.0;
        for axis in 0..rank {
            for delta in [-1, 1] {
                let m = accessible.shifted(i, axis, delta);
                if m == 0.0 {
                    continue;
                }
                total -= m * center;
                if center_active != 0.0 {
                    let a = active.shifted(i, axis, delta);
                    if a != 0.0 {
                        total += center_active * m * a * p.shifted(i, axis, delta);
                    }
                }
            }
        }
        total * inv_dx2
    });
    p.map_with_index(|i, _| data[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FluidError;
    use crate::grid::{Extrapolation, Grid};

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() <= tol,
            "expected {a} to be within {tol} of {b}"
        );
    }

    fn zero_modes(rank: usize) -> Vec<Extrapolation> {
        vec![Extrapolation::Zero; rank]
    }

    #[test]
    fn constant_field_in_closed_box_has_zero_laplacian() {
        let grid = Grid::new(&[5, 4], 0.5);
        let modes = zero_modes(2);
        let p = Field::new(&grid, 3.0).with_extrapolation(&modes);
        let ones = Field::new(&grid, 1.0).with_extrapolation(&modes);
        let lap = masked_laplace(&p, &ones, &ones).unwrap();
        assert_close(lap.max_abs(), 0.0, 1e-12);
    }

    #[test]
    fn interior_stencil_matches_five_point_formula() {
        let grid = Grid::new(&[5, 5], 2.0);
        let p = Field::from_fn(&grid, |c| (c[0] * c[0]) as f64);
        let ones = Field::new(&grid, 1.0);
        let lap = masked_laplace(&p, &ones, &ones).unwrap();
        // d²(x²)/dx² on integer coordinates is 2, scaled by 1/dx²
        assert_close(lap.get(&[2, 2]), 2.0 / 4.0, 1e-12);
    }

    #[test]
    fn inactive_neighbour_acts_as_zero_pressure() {
        let grid = Grid::new(&[3], 1.0);
        let modes = zero_modes(1);
        let p = Field::new(&grid, 1.0).with_extrapolation(&modes);
        let accessible = Field::new(&grid, 1.0).with_extrapolation(&modes);
        let active = Field::from_fn(&grid, |c| if c[0] == 2 { 0.0 } else { 1.0 })
            .with_extrapolation(&modes);
        let lap = masked_laplace(&p, &active, &accessible).unwrap();
        assert_close(lap.get(&[0]), 0.0, 1e-12);
        assert_close(lap.get(&[1]), -1.0, 1e-12);
        // the inactive cell keeps only its diagonal
        assert_close(lap.get(&[2]), -1.0, 1e-12);
    }

    #[test]
    fn operator_is_symmetric_with_obstacle() {
        let grid = Grid::new(&[4, 4], 1.0);
        let modes = zero_modes(2);
        let active = Field::from_fn(&grid, |c| if c[0] == 1 && c[1] == 2 { 0.0 } else { 1.0 })
            .with_extrapolation(&modes);
        let u = Field::from_fn(&grid, |c| (c[0] as f64 * 0.7).sin() + c[1] as f64);
        let v = Field::from_fn(&grid, |c| (c[1] as f64 * 1.1).cos() - c[0] as f64);
        let lu = masked_laplace(&u, &active, &active).unwrap();
        let lv = masked_laplace(&v, &active, &active).unwrap();
        assert_close(lu.dot(&v), u.dot(&lv), 1e-9);
    }

    #[test]
    fn rejects_mismatched_and_invalid_masks() {
        let grid = Grid::new(&[3, 3], 1.0);
        let p = Field::new(&grid, 0.0);
        let small = Field::new(&Grid::new(&[3, 2], 1.0), 1.0);
        assert!(matches!(
            masked_laplace(&p, &small, &small),
            Err(FluidError::ShapeMismatch { .. })
        ));
        let bad = Field::new(&grid, -0.5);
        assert!(matches!(
            masked_laplace(&p, &bad, &bad),
            Err(FluidError::InvalidMask { .. })
        ));
    }
}
