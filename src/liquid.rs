use log::debug;

use crate::advect::{advect_scalar, advect_velocity};
use crate::domain::Domain;
use crate::effect::{apply_scalar_effects, Effect};
use crate::error::Result;
use crate::extrapolate::extrapolate_velocity;
use crate::field::Field;
use crate::geometry::Obstacle;
use crate::grid::Extrapolation;
use crate::mac::MacVelocity;
use crate::mask::{binary_mask, mask_union, occupancy, validate_mask};
use crate::projection::{Projection, ProjectionInfo};
use crate::redistance::{initial_sdf, redistance};
use crate::solver::SolverConfig;

/// Free-surface liquid described by a signed distance field (negative inside).
#[derive(Clone, Debug)]
pub struct LiquidState {
    domain: Domain,
    density: Field,
    velocity: MacVelocity,
    sdf: Field,
    active: Field,
    trained_forces: MacVelocity,
    gravity: Vec<f64>,
    max_distance: usize,
    age: f64,
    projection: Option<ProjectionInfo>,
}

impl LiquidState {
    /// Empty container: no liquid, zero velocity and forces.
    pub fn new(domain: &Domain, gravity: &[f64], max_distance: usize) -> Result<Self> {
        Self::from_density(domain, domain.scalar_zeros(), gravity, max_distance)
    }

    /// Liquid wherever `density > 0`; the SDF is built from that mask.
    pub fn from_density(
        domain: &Domain,
        density: Field,
        gravity: &[f64],
        max_distance: usize,
    ) -> Result<Self> {
        let density = domain.adopt_scalar("LiquidState::from_density", density)?;
        domain.ensure_vector("LiquidState::from_density(gravity)", gravity)?;
        let active = binary_mask(&density, |value| value > 0.0)
            .with_extrapolation(&domain.active_extrapolation());
        let sdf = initial_sdf(&active, max_distance, domain.grid().dx())?
            .with_extrapolation(&domain.scalar_extrapolation());
        Ok(Self {
            domain: domain.clone(),
            density,
            velocity: domain.velocity_zeros(),
            sdf,
            active,
            trained_forces: domain.velocity_zeros(),
            gravity: gravity.to_vec(),
            max_distance,
            age: 0.0,
            projection: None,
        })
    }

    /// Explicit SDF and mask, e.g. restored from a previous run.
    pub fn from_sdf(
        domain: &Domain,
        sdf: Field,
        active: Field,
        gravity: &[f64],
        max_distance: usize,
    ) -> Result<Self> {
        let sdf = domain.adopt_scalar("LiquidState::from_sdf(sdf)", sdf)?;
        domain.ensure_grid("LiquidState::from_sdf(active)", active.grid())?;
        validate_mask("LiquidState::from_sdf(active)", &active)?;
        domain.ensure_vector("LiquidState::from_sdf(gravity)", gravity)?;
        let active = active.with_extrapolation(&domain.active_extrapolation());
        Ok(Self {
            domain: domain.clone(),
            density: active.clone().with_extrapolation(&domain.scalar_extrapolation()),
            velocity: domain.velocity_zeros(),
            sdf,
            active,
            trained_forces: domain.velocity_zeros(),
            gravity: gravity.to_vec(),
            max_distance,
            age: 0.0,
            projection: None,
        })
    }

    pub fn with_velocity(mut self, velocity: MacVelocity) -> Result<Self> {
        self.velocity = self
            .domain
            .adopt_velocity("LiquidState::with_velocity", velocity)?;
        Ok(self)
    }

    pub fn with_trained_forces(mut self, forces: MacVelocity) -> Result<Self> {
        forces.ensure_same_grid("LiquidState::with_trained_forces", self.domain.grid())?;
        self.trained_forces = forces;
        Ok(self)
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn density(&self) -> &Field {
        &self.density
    }

    pub fn velocity(&self) -> &MacVelocity {
        &self.velocity
    }

    pub fn sdf(&self) -> &Field {
        &self.sdf
    }

    pub fn active(&self) -> &Field {
        &self.active
    }

    pub fn trained_forces(&self) -> &MacVelocity {
        &self.trained_forces
    }

    pub fn gravity(&self) -> &[f64] {
        &self.gravity
    }

    pub fn max_distance(&self) -> usize {
        self.max_distance
    }

    pub fn age(&self) -> f64 {
        self.age
    }

    pub fn projection(&self) -> Option<&ProjectionInfo> {
        self.projection.as_ref()
    }

    /// Number of liquid cells.
    pub fn volume(&self) -> f64 {
        self.active.sum()
    }
}

/// Stepper for [`LiquidState`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SdfLiquid {
    pub solver: SolverConfig,
    /// Multiplier on `dt·max|velocity|` subtracted from the SDF after redistancing.
    pub dissipation: f64,
    /// Scale of the distance added to ghost cells when the SDF is padded for advection.
    pub inflation: f64,
}

impl Default for SdfLiquid {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            dissipation: 0.01,
            inflation: 1.0,
        }
    }
}

impl SdfLiquid {
    pub fn step(
        &self,
        state: &LiquidState,
        dt: f64,
        obstacles: &[Obstacle],
        effects: &[Effect],
    ) -> Result<LiquidState> {
        let domain = &state.domain;
        let grid = domain.grid();
        let dx = grid.dx();
        for obstacle in obstacles {
            obstacle.validate(domain.rank())?;
        }

        let open = occupancy(grid, obstacles).map(|occupied| 1.0 - occupied);
        let active = liquid_mask(&state.sdf, &open, dx);

        let forced = apply_forces(state, dt);

        let projection = Projection::with_masks(domain, &active, &open, obstacles)?;
        let (projected, info) = projection.apply(&forced, &self.solver)?;

        let free = extrapolate_velocity(&projected, &active, state.max_distance)
            .with_extrapolation(&domain.velocity_extrapolation());
        let transport = free.mul(projection.hard_boundary());

        let padded_sdf = inflate_padding(&state.sdf, dx * self.inflation);
        let cropped = advect_scalar(&padded_sdf, &transport.pad(1), dt)?.crop(1);
        let advected_sdf = Field::from_raw(grid, cropped.data().to_vec())
            .with_extrapolation(&domain.scalar_extrapolation());
        let velocity = advect_velocity(&free, &transport, dt)?;

        let inflow = inflow_mask(domain, effects, dt)?;
        let next_active = mask_union(&liquid_mask(&advected_sdf, &open, dx), &inflow)
            .with_extrapolation(&domain.active_extrapolation());

        let sdf = redistance(
            &advected_sdf,
            &next_active,
            &velocity,
            state.max_distance,
            dt,
            dx,
            self.dissipation,
        )?;
        debug!(
            "liquid step t={:.4} dt={:.4}: {} liquid cells, {} pressure iterations",
            state.age,
            dt,
            next_active.sum(),
            info.iterations
        );

        Ok(LiquidState {
            domain: domain.clone(),
            density: state.density.clone(),
            velocity,
            sdf,
            active: next_active,
            trained_forces: state.trained_forces.clone(),
            gravity: state.gravity.clone(),
            max_distance: state.max_distance,
            age: state.age + dt,
            projection: Some(info),
        })
    }
}

/// `sdf < dx/2`, restricted to cells not covered by obstacles.
fn liquid_mask(sdf: &Field, open: &Field, dx: f64) -> Field {
    binary_mask(sdf, |value| value < 0.5 * dx).mul(open)
}

/// `velocity + dt·(gravity + trained_forces)`.
fn apply_forces(state: &LiquidState, dt: f64) -> MacVelocity {
    state
        .velocity
        .zip_components(&state.trained_forces, |component, force| {
            let g = state.gravity[component.axis()];
            component.zip_with(force, |v, f| v + dt * (g + f))
        })
}

/// Pads by one cell with edge values and pushes every ghost cell outward by
/// `inflation·√(number of axes it lies outside)`.
fn inflate_padding(sdf: &Field, inflation: f64) -> Field {
    let edge = sdf
        .clone()
        .with_extrapolation(&vec![Extrapolation::Boundary; sdf.grid().rank()]);
    let padded = edge.pad(1);
    let grid = padded.grid().clone();
    let shape = grid.shape().to_vec();
    padded.map_with_index(|i, value| {
        let outside = (0..grid.rank())
            .filter(|axis| {
                let c = grid.coord(i, *axis);
                c == 0 || c + 1 == shape[*axis]
            })
            .count();
        if outside == 0 {
            value
        } else {
            value + inflation * (outside as f64).sqrt()
        }
    })
}

/// Cells that the effects would fill, as a binary mask.
fn inflow_mask(domain: &Domain, effects: &[Effect], dt: f64) -> Result<Field> {
    if effects.is_empty() {
        return Ok(Field::new(domain.grid(), 0.0));
    }
    let filled = apply_scalar_effects(&Field::new(domain.grid(), 0.0), effects, dt)?;
    Ok(binary_mask(&filled, |value| value > 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::EffectMode;
    use crate::geometry::Geometry;
    use crate::grid::Grid;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() <= tol,
            "expected {a} to be within {tol} of {b}"
        );
    }

    fn pool(domain: &Domain, depth: usize) -> Field {
        Field::from_fn(domain.grid(), |c| if c[1] < depth { 1.0 } else { 0.0 })
    }

    #[test]
    fn from_density_marks_liquid_and_builds_sdf() {
        let domain = Domain::closed(Grid::new(&[6, 8], 1.0));
        let state = LiquidState::from_density(&domain, pool(&domain, 3), &[0.0, -1.0], 4).unwrap();
        assert_close(state.volume(), 18.0, 1e-12);
        assert_close(state.sdf().get(&[2, 2]), -0.5, 1e-12);
        assert_close(state.sdf().get(&[2, 3]), 0.5, 1e-12);
        assert_close(state.sdf().get(&[2, 0]), -2.5, 1e-12);
    }

    fn tight() -> SdfLiquid {
        SdfLiquid {
            solver: SolverConfig {
                relative_tolerance: 1e-10,
                absolute_tolerance: 1e-12,
                ..SolverConfig::default()
            },
            ..SdfLiquid::default()
        }
    }

    #[test]
    fn still_pool_without_gravity_is_unchanged() {
        let domain = Domain::closed(Grid::new(&[8, 8], 1.0));
        let state = LiquidState::from_density(&domain, pool(&domain, 3), &[0.0, 0.0], 4).unwrap();
        let next = tight().step(&state, 0.1, &[], &[]).unwrap();
        assert_eq!(next.active().data(), state.active().data());
        assert_eq!(next.sdf().data(), state.sdf().data());
        assert_eq!(next.projection().unwrap().iterations, 0);
        assert_close(next.age(), 0.1, 1e-12);
    }

    #[test]
    fn pressure_holds_pool_against_gravity() {
        let domain = Domain::closed(Grid::new(&[8, 8], 1.0));
        let state = LiquidState::from_density(&domain, pool(&domain, 3), &[0.0, -1.0], 4).unwrap();
        let next = tight().step(&state, 0.1, &[], &[]).unwrap();
        assert!(next.velocity().component(1).get(&[3, 1]).abs() < 1e-6);
        assert!(next.velocity().component(1).get(&[3, 2]).abs() < 1e-6);
        assert_eq!(next.active().get(&[3, 0]), 1.0);
        assert_eq!(next.active().get(&[3, 1]), 1.0);
        assert_eq!(next.active().get(&[3, 5]), 0.0);
    }

    #[test]
    fn inflow_adds_liquid_cells() {
        let domain = Domain::closed(Grid::new(&[8, 8], 1.0));
        let state = LiquidState::from_density(&domain, pool(&domain, 2), &[0.0, -1.0], 3).unwrap();
        let source = Effect::scalar(
            Geometry::Box {
                lower: vec![3.0, 5.0],
                upper: vec![4.0, 6.0],
            },
            EffectMode::Replace,
            1.0,
        );
        let next = SdfLiquid::default().step(&state, 0.05, &[], &[source]).unwrap();
        assert_eq!(next.active().get(&[3, 5]), 1.0);
        assert!(next.sdf().get(&[3, 5]) < 0.5);
        assert!(next.volume() > state.volume());
    }

    #[test]
    fn obstacle_cells_never_hold_liquid() {
        let domain = Domain::closed(Grid::new(&[8, 8], 1.0));
        let state = LiquidState::from_density(&domain, pool(&domain, 4), &[0.0, -1.0], 3).unwrap();
        let wall = Obstacle::new(Geometry::Box {
            lower: vec![3.0, 0.0],
            upper: vec![4.0, 2.0],
        });
        let next = SdfLiquid::default().step(&state, 0.05, &[wall], &[]).unwrap();
        assert_eq!(next.active().get(&[3, 0]), 0.0);
        assert_eq!(next.active().get(&[3, 1]), 0.0);
    }

    #[test]
    fn padding_inflates_ghost_cells() {
        let grid = Grid::new(&[3, 3], 1.0);
        let sdf = Field::new(&grid, 0.0);
        let padded = inflate_padding(&sdf, 1.0);
        assert_close(padded.get(&[2, 2]), 0.0, 1e-12);
        assert_close(padded.get(&[0, 2]), 1.0, 1e-12);
        assert_close(padded.get(&[0, 0]), 2.0_f64.sqrt(), 1e-12);
    }

    #[test]
    fn empty_container_is_all_air() {
        let domain = Domain::closed(Grid::new(&[5, 5], 0.5));
        let state = LiquidState::new(&domain, &[0.0, -1.0], 3).unwrap();
        assert_eq!(state.volume(), 0.0);
        for i in 0..state.sdf().len() {
            assert_close(state.sdf().at(i), 1.5, 1e-12);
        }
        assert_eq!(state.velocity().max_abs(), 0.0);
    }

    #[test]
    fn forces_combine_gravity_and_trained_field() {
        let domain = Domain::closed(Grid::new(&[4, 4], 1.0));
        let forces = MacVelocity::from_fn(domain.grid(), |axis, pos| {
            if axis == 0 {
                pos[1]
            } else {
                0.5
            }
        });
        let state = LiquidState::from_density(&domain, pool(&domain, 2), &[0.0, -2.0], 2)
            .unwrap()
            .with_velocity(MacVelocity::new(domain.grid(), &[1.0, 0.0]))
            .unwrap()
            .with_trained_forces(forces)
            .unwrap();
        let forced = apply_forces(&state, 0.5);
        assert_close(forced.component(0).get(&[2, 3]), 1.0 + 0.5 * 3.5, 1e-12);
        assert_close(forced.component(1).get(&[1, 2]), 0.5 * (-2.0 + 0.5), 1e-12);
    }

    #[test]
    fn uniform_trained_force_accelerates_filled_periodic_box() {
        let domain = Domain::periodic(Grid::new(&[6, 6], 1.0));
        let full = Field::new(domain.grid(), 1.0);
        let state = LiquidState::from_density(&domain, full, &[0.0, 0.0], 4)
            .unwrap()
            .with_trained_forces(MacVelocity::new(domain.grid(), &[0.5, -0.25]))
            .unwrap();
        let next = tight().step(&state, 0.2, &[], &[]).unwrap();
        assert_eq!(next.projection().unwrap().iterations, 0);
        assert_close(next.volume(), 36.0, 1e-12);
        let u = next.velocity().component(0);
        let v = next.velocity().component(1);
        for i in 0..u.len() {
            assert_close(u.at(i), 0.1, 1e-12);
        }
        for i in 0..v.len() {
            assert_close(v.at(i), -0.05, 1e-12);
        }
    }

    #[test]
    fn trained_forces_must_match_grid() {
        let domain = Domain::closed(Grid::new(&[4, 4], 1.0));
        let state = LiquidState::from_density(&domain, pool(&domain, 2), &[0.0, -1.0], 2).unwrap();
        let forces = MacVelocity::zeros(&Grid::new(&[4, 5], 1.0));
        assert!(state.with_trained_forces(forces).is_err());
    }
}
