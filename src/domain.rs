use serde::{Deserialize, Serialize};

use crate::error::{FluidError, Result};
use crate::field::Field;
use crate::grid::{Extrapolation, Grid};
use crate::mac::MacVelocity;

/// Boundary condition of one axis, shared by both sides of the box.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// Solid wall: no flow through, zero pressure gradient.
    #[default]
    Closed,
    /// Free outflow: zero pressure outside, fluid may leave.
    Open,
    Periodic,
}

impl Boundary {
    pub fn scalar(self) -> Extrapolation {
        match self {
            Boundary::Closed | Boundary::Open => Extrapolation::Boundary,
            Boundary::Periodic => Extrapolation::Periodic,
        }
    }

    pub fn velocity(self) -> Extrapolation {
        match self {
            Boundary::Closed => Extrapolation::Zero,
            Boundary::Open => Extrapolation::Boundary,
            Boundary::Periodic => Extrapolation::Periodic,
        }
    }

    pub fn pressure(self) -> Extrapolation {
        match self {
            Boundary::Closed => Extrapolation::Boundary,
            Boundary::Open => Extrapolation::Zero,
            Boundary::Periodic => Extrapolation::Periodic,
        }
    }

    /// Ghost value of the accessible mask: walls are solid, open sides are not.
    pub fn accessible(self) -> Extrapolation {
        match self {
            Boundary::Closed => Extrapolation::Zero,
            Boundary::Open => Extrapolation::One,
            Boundary::Periodic => Extrapolation::Periodic,
        }
    }

    pub fn active(self) -> Extrapolation {
        match self {
            Boundary::Closed | Boundary::Open => Extrapolation::Zero,
            Boundary::Periodic => Extrapolation::Periodic,
        }
    }
}

/// Simulation box: a cell grid plus one boundary condition per axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Domain {
    grid: Grid,
    boundaries: Vec<Boundary>,
}

impl Domain {
    pub fn new(grid: Grid, boundaries: &[Boundary]) -> Result<Self> {
        if boundaries.len() != grid.rank() {
            return Err(FluidError::shape(
                "Domain::new",
                &[grid.rank()],
                &[boundaries.len()],
            ));
        }
        Ok(Self {
            grid,
            boundaries: boundaries.to_vec(),
        })
    }

    pub fn uniform(grid: Grid, boundary: Boundary) -> Self {
        let boundaries = vec![boundary; grid.rank()];
        Self { grid, boundaries }
    }

    pub fn closed(grid: Grid) -> Self {
        Self::uniform(grid, Boundary::Closed)
    }

    pub fn periodic(grid: Grid) -> Self {
        Self::uniform(grid, Boundary::Periodic)
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn rank(&self) -> usize {
        self.grid.rank()
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    pub fn all_closed(&self) -> bool {
        self.boundaries.iter().all(|b| *b == Boundary::Closed)
    }

    pub fn scalar_extrapolation(&self) -> Vec<Extrapolation> {
        self.boundaries.iter().map(|b| b.scalar()).collect()
    }

    pub fn velocity_extrapolation(&self) -> Vec<Extrapolation> {
        self.boundaries.iter().map(|b| b.velocity()).collect()
    }

    pub fn pressure_extrapolation(&self) -> Vec<Extrapolation> {
        self.boundaries.iter().map(|b| b.pressure()).collect()
    }

    pub fn accessible_extrapolation(&self) -> Vec<Extrapolation> {
        self.boundaries.iter().map(|b| b.accessible()).collect()
    }

    pub fn active_extrapolation(&self) -> Vec<Extrapolation> {
        self.boundaries.iter().map(|b| b.active()).collect()
    }

    pub fn scalar_zeros(&self) -> Field {
        Field::new(&self.grid, 0.0).with_extrapolation(&self.scalar_extrapolation())
    }

    pub fn pressure_zeros(&self) -> Field {
        Field::new(&self.grid, 0.0).with_extrapolation(&self.pressure_extrapolation())
    }

    pub fn velocity_zeros(&self) -> MacVelocity {
        MacVelocity::zeros(&self.grid).with_extrapolation(&self.velocity_extrapolation())
    }

    /// Re-tags a scalar field with this domain's scalar extrapolation after checking its grid.
    pub fn adopt_scalar(&self, context: &'static str, field: Field) -> Result<Field> {
        self.ensure_grid(context, field.grid())?;
        Ok(field.with_extrapolation(&self.scalar_extrapolation()))
    }

    /// Re-tags a velocity with this domain's extrapolation. On periodic axes the upper
    /// boundary face is overwritten with the lower one.
    pub fn adopt_velocity(&self, context: &'static str, velocity: MacVelocity) -> Result<MacVelocity> {
        velocity.ensure_same_grid(context, &self.grid)?;
        Ok(velocity
            .with_extrapolation(&self.velocity_extrapolation())
            .wrap_periodic_faces())
    }

    pub fn ensure_grid(&self, context: &'static str, grid: &Grid) -> Result<()> {
        if grid.shape() != self.grid.shape() || grid.dx() != self.grid.dx() {
            return Err(FluidError::shape(context, self.grid.shape(), grid.shape()));
        }
        Ok(())
    }

    /// Checks that a per-axis vector (gravity, obstacle velocity) matches the rank.
    pub fn ensure_vector(&self, context: &'static str, vector: &[f64]) -> Result<()> {
        if vector.len() != self.rank() {
            return Err(FluidError::shape(context, &[self.rank()], &[vector.len()]));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_extrapolations_follow_boundary_kind() {
        let domain = Domain::new(
            Grid::new(&[4, 4], 1.0),
            &[Boundary::Periodic, Boundary::Open],
        )
        .unwrap();
        assert_eq!(
            domain.accessible_extrapolation(),
            vec![Extrapolation::Periodic, Extrapolation::One]
        );
        assert_eq!(
            domain.active_extrapolation(),
            vec![Extrapolation::Periodic, Extrapolation::Zero]
        );
        assert_eq!(
            domain.pressure_extrapolation(),
            vec![Extrapolation::Periodic, Extrapolation::Zero]
        );
        assert!(!domain.all_closed());
    }

    #[test]
    fn closed_domain_is_all_closed() {
        let domain = Domain::closed(Grid::new(&[3, 3, 3], 0.5));
        assert!(domain.all_closed());
        assert_eq!(domain.velocity_zeros().max_abs(), 0.0);
    }

    #[test]
    fn boundary_count_must_match_rank() {
        let result = Domain::new(Grid::new(&[4, 4], 1.0), &[Boundary::Closed]);
        assert!(matches!(result, Err(FluidError::ShapeMismatch { .. })));
    }

    #[test]
    fn adopt_velocity_wraps_periodic_faces() {
        let domain = Domain::new(
            Grid::new(&[4, 3], 1.0),
            &[Boundary::Periodic, Boundary::Closed],
        )
        .unwrap();
        let velocity = MacVelocity::from_fn(domain.grid(), |_, pos| pos[0] + pos[1]);
        let adopted = domain.adopt_velocity("test", velocity).unwrap();
        let u = adopted.component(0);
        for y in 0..3 {
            assert_eq!(u.get(&[4, y]), u.get(&[0, y]));
        }
        // closed axis keeps both walls as given
        let v = adopted.component(1);
        assert_eq!(v.get(&[0, 3]), 3.5);
    }

    #[test]
    fn adopt_scalar_rejects_other_resolution() {
        let domain = Domain::closed(Grid::new(&[4, 4], 1.0));
        let field = Field::new(&Grid::new(&[4, 5], 1.0), 0.0);
        assert!(domain.adopt_scalar("test", field).is_err());
    }
}
