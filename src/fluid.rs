use log::debug;

use crate::advect::{advect_scalar, advect_velocity};
use crate::domain::Domain;
use crate::effect::{apply_scalar_effects, apply_vector_effects, Effect};
use crate::error::{FluidError, Result};
use crate::field::Field;
use crate::geometry::Obstacle;
use crate::mac::{centered_at_faces, divergence, MacVelocity};
use crate::projection::divergence_free;
use crate::solver::SolverConfig;

/// Diagnostics recorded by [`IncompressibleFlow::step`].
#[derive(Clone, Debug)]
pub struct SolveInfo {
    pub pressure: Field,
    pub iterations: usize,
    /// Divergence of the velocity handed to the final projection.
    pub divergence: Field,
    pub advected_velocity: MacVelocity,
    /// Velocity after forces, before the final projection.
    pub divergent_velocity: MacVelocity,
}

/// Gas-like fluid: a passive density carried by a staggered velocity.
#[derive(Clone, Debug)]
pub struct FluidState {
    domain: Domain,
    density: Field,
    velocity: MacVelocity,
    buoyancy_factor: f64,
    age: f64,
    solve_info: Option<SolveInfo>,
}

impl FluidState {
    /// Zero density, zero velocity, no buoyancy.
    pub fn new(domain: &Domain) -> Self {
        Self {
            density: domain.scalar_zeros(),
            velocity: domain.velocity_zeros(),
            domain: domain.clone(),
            buoyancy_factor: 0.0,
            age: 0.0,
            solve_info: None,
        }
    }

    pub fn with_density(mut self, density: Field) -> Result<Self> {
        self.density = self.domain.adopt_scalar("FluidState::with_density", density)?;
        Ok(self)
    }

    pub fn with_velocity(mut self, velocity: MacVelocity) -> Result<Self> {
        self.velocity = self
            .domain
            .adopt_velocity("FluidState::with_velocity", velocity)?;
        Ok(self)
    }

    pub fn with_buoyancy_factor(mut self, factor: f64) -> Self {
        self.buoyancy_factor = factor;
        self
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

    pub fn buoyancy_factor(&self) -> f64 {
        self.buoyancy_factor
    }

    pub fn age(&self) -> f64 {
        self.age
    }

    pub fn solve_info(&self) -> Option<&SolveInfo> {
        self.solve_info.as_ref()
    }
}

/// Smoke-style stepper: advect, apply effects and buoyancy, project.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IncompressibleFlow {
    pub make_input_divfree: bool,
    pub make_output_divfree: bool,
    /// Renormalize total density after advection when every boundary is closed.
    pub conserve_density: bool,
    pub solver: SolverConfig,
}

impl Default for IncompressibleFlow {
    fn default() -> Self {
        Self {
            make_input_divfree: false,
            make_output_divfree: true,
            conserve_density: true,
            solver: SolverConfig::default(),
        }
    }
}

impl IncompressibleFlow {
    pub fn step(
        &self,
        state: &FluidState,
        dt: f64,
        obstacles: &[Obstacle],
        gravity: &[f64],
        density_effects: &[Effect],
        velocity_effects: &[Effect],
    ) -> Result<FluidState> {
        let domain = &state.domain;
        domain.ensure_vector("IncompressibleFlow::step(gravity)", gravity)?;

        let velocity = if self.make_input_divfree {
            divergence_free(&state.velocity, domain, obstacles, &self.solver)?.0
        } else {
            state.velocity.clone()
        };

        let mut density = advect_scalar(&state.density, &velocity, dt)?;
        let advected_velocity = advect_velocity(&velocity, &velocity, dt)?;

        if self.conserve_density && domain.all_closed() {
            density = rescale_density_to_mass(&density, state.density.sum());
        }

        density = apply_scalar_effects(&density, density_effects, dt)?;
        let forced = apply_vector_effects(&advected_velocity, velocity_effects, dt)?;
        let divergent_velocity = add_buoyancy(
            &forced,
            &density,
            gravity,
            state.buoyancy_factor,
            dt,
        )?;

        let (velocity, pressure, iterations, div) = if self.make_output_divfree {
            let (projected, info) =
                divergence_free(&divergent_velocity, domain, obstacles, &self.solver)?;
            (projected, info.pressure, info.iterations, info.divergence)
        } else {
            (
                divergent_velocity.clone(),
                domain.pressure_zeros(),
                0,
                divergence(&divergent_velocity),
            )
        };
        debug!(
            "fluid step t={:.4} dt={:.4}: mass {:.6}, {} pressure iterations",
            state.age, dt, density.sum(), iterations
        );

        Ok(FluidState {
            domain: domain.clone(),
            density,
            velocity,
            buoyancy_factor: state.buoyancy_factor,
            age: state.age + dt,
            solve_info: Some(SolveInfo {
                pressure,
                iterations,
                divergence: div,
                advected_velocity,
                divergent_velocity,
            }),
        })
    }
}

/// `velocity - gravity·density·factor·dt`, density sampled at each face center.
pub fn add_buoyancy(
    velocity: &MacVelocity,
    density: &Field,
    gravity: &[f64],
    factor: f64,
    dt: f64,
) -> Result<MacVelocity> {
    if gravity.len() != velocity.rank() {
        return Err(FluidError::shape(
            "add_buoyancy(gravity)",
            &[velocity.rank()],
            &[gravity.len()],
        ));
    }
    velocity.ensure_same_grid("add_buoyancy(density)", density.grid())?;
    if factor == 0.0 || dt == 0.0 {
        return Ok(velocity.clone());
    }
    let at_faces = centered_at_faces(density);
    Ok(velocity.zip_components(&at_faces, |component, rho| {
        let g = gravity[component.axis()];
        component.zip_with(rho, |v, d| v - g * d * factor * dt)
    }))
}

/// Scales `density` so its sum matches `target_mass`; leaves empty or degenerate fields alone.
pub fn rescale_density_to_mass(density: &Field, target_mass: f64) -> Field {
    if target_mass <= 0.0 || !target_mass.is_finite() {
        return density.clone();
    }
    let current = density.sum();
    if current <= 0.0 || !current.is_finite() {
        return density.clone();
    }
    density.scale(target_mass / current)
}
