//! Pressure projection onto divergence-free velocity fields.

use log::{debug, warn};

use crate::domain::Domain;
use crate::error::{FluidError, Result};
use crate::field::Field;
use crate::geometry::Obstacle;
use crate::laplace;
use crate::mac::{
    divergence, divergence_transpose, gradient_transpose, staggered_gradient, MacVelocity,
};
use crate::mask::{
    accessible_mask, active_mask, geometry_mask, hard_boundary, occupancy, touching_faces,
    validate_mask,
};
use crate::solver::{
    conjugate_gradient, conjugate_gradient_batch, conjugate_gradient_fixed, GradientMode,
    SolveResult, SolverConfig,
};

/// Diagnostics of one projection.
#[derive(Clone, Debug)]
pub struct ProjectionInfo {
    pub pressure: Field,
    pub iterations: usize,
    /// Divergence of the boundary-corrected velocity before the pressure update.
    pub divergence: Field,
}

/// Rigid velocities imposed on the faces touching moving obstacles.
#[derive(Clone, Debug)]
struct ObstacleBlend {
    keep: MacVelocity,
    rigid: MacVelocity,
}

/// Masks and boundary faces of one projection problem, reusable across solves.
#[derive(Clone, Debug)]
pub struct Projection {
    domain: Domain,
    active: Field,
    accessible: Field,
    hard: MacVelocity,
    blend: Option<ObstacleBlend>,
}

impl Projection {
    /// Fluid fills every cell not covered by an obstacle.
    pub fn new(domain: &Domain, obstacles: &[Obstacle]) -> Result<Self> {
        for obstacle in obstacles {
            obstacle.validate(domain.rank())?;
        }
        let occupied = occupancy(domain.grid(), obstacles);
        let active = active_mask(domain, &occupied);
        let accessible = accessible_mask(domain, &active);
        Self::build(domain, active, accessible, obstacles)
    }

    /// Explicit masks, e.g. a liquid region inside the accessible cells. Accessible cells
    /// that are not active hold zero pressure.
    pub fn with_masks(
        domain: &Domain,
        active: &Field,
        accessible: &Field,
        obstacles: &[Obstacle],
    ) -> Result<Self> {
        domain.ensure_grid("Projection::with_masks(active)", active.grid())?;
        domain.ensure_grid("Projection::with_masks(accessible)", accessible.grid())?;
        validate_mask("Projection::with_masks(active)", active)?;
        validate_mask("Projection::with_masks(accessible)", accessible)?;
        for obstacle in obstacles {
            obstacle.validate(domain.rank())?;
        }
        let active = active
            .clone()
            .with_extrapolation(&domain.active_extrapolation());
        let accessible = accessible
            .clone()
            .with_extrapolation(&domain.accessible_extrapolation());
        Self::build(domain, active, accessible, obstacles)
    }

    fn build(
        domain: &Domain,
        active: Field,
        accessible: Field,
        obstacles: &[Obstacle],
    ) -> Result<Self> {
        let hard = hard_boundary(&accessible);
        let blend = obstacle_blend(domain, obstacles);
        Ok(Self {
            domain: domain.clone(),
            active,
            accessible,
            hard,
            blend,
        })
    }

    pub fn active(&self) -> &Field {
        &self.active
    }

    pub fn accessible(&self) -> &Field {
        &self.accessible
    }

    /// Face mask that is zero wherever a face borders a solid cell or wall.
    pub fn hard_boundary(&self) -> &MacVelocity {
        &self.hard
    }

    pub fn laplace(&self, pressure: &Field) -> Field {
        laplace::apply(pressure, &self.active, &self.accessible)
    }

    /// Closes solid faces, then imposes moving-obstacle velocities.
    fn prepare(&self, velocity: &MacVelocity) -> MacVelocity {
        let closed = velocity.mul(&self.hard);
        match &self.blend {
            Some(blend) => closed.mul(&blend.keep).add_scaled(&blend.rigid, 1.0),
            None => closed,
        }
    }

    fn rhs(&self, divergence: &Field) -> Field {
        divergence
            .mul(&self.active)
            .with_extrapolation(&self.domain.pressure_extrapolation())
    }

    fn correct(&self, prepared: &MacVelocity, pressure: &Field) -> MacVelocity {
        let gradient = staggered_gradient(pressure).mul(&self.hard);
        prepared.sub(&gradient)
    }

    fn adopt(&self, velocity: &MacVelocity) -> Result<MacVelocity> {
        self.domain
            .adopt_velocity("Projection::apply", velocity.clone())
    }

    /// Projects one velocity field; fails with [`FluidError::Convergence`] if the pressure
    /// solve hits the iteration cap.
    pub fn apply(
        &self,
        velocity: &MacVelocity,
        config: &SolverConfig,
    ) -> Result<(MacVelocity, ProjectionInfo)> {
        let velocity = self.adopt(velocity)?;
        let prepared = self.prepare(&velocity);
        let div = divergence(&prepared);
        let rhs = self.rhs(&div);
        let guess = self.domain.pressure_zeros();
        let result = conjugate_gradient(|p| self.laplace(p), &rhs, &guess, config);
        ensure_converged(&result, 0)?;
        debug!(
            "projection converged in {} iterations (residual {:.3e})",
            result.iterations, result.residual
        );
        let projected = self.correct(&prepared, &result.solution);
        Ok((
            projected,
            ProjectionInfo {
                pressure: result.solution,
                iterations: result.iterations,
                divergence: div,
            },
        ))
    }

    /// Projects every batch element with lockstep CG iterations. Fails unless every
    /// element converges.
    pub fn apply_batch(
        &self,
        velocities: &[MacVelocity],
        config: &SolverConfig,
    ) -> Result<(Vec<MacVelocity>, Vec<ProjectionInfo>)> {
        let prepared = velocities
            .iter()
            .map(|velocity| Ok(self.prepare(&self.adopt(velocity)?)))
            .collect::<Result<Vec<_>>>()?;
        let divergences: Vec<Field> = prepared.iter().map(divergence).collect();
        let rhs: Vec<Field> = divergences.iter().map(|div| self.rhs(div)).collect();
        let guesses = vec![self.domain.pressure_zeros(); rhs.len()];
        let batch = conjugate_gradient_batch(|_, p| self.laplace(p), &rhs, &guesses, config);
        if !batch.converged() {
            let (residual, threshold) = batch.worst_residual();
            let failed = batch.failed();
            warn!(
                "batched pressure solve failed after {} iterations for elements {:?}",
                batch.iterations, failed
            );
            return Err(FluidError::Convergence {
                iterations: batch.iterations,
                residual,
                threshold,
                failed,
            });
        }
        let mut projected = Vec::with_capacity(prepared.len());
        let mut infos = Vec::with_capacity(prepared.len());
        for ((velocity, div), element) in prepared
            .iter()
            .zip(divergences)
            .zip(batch.elements)
        {
            projected.push(self.correct(velocity, &element.solution));
            infos.push(ProjectionInfo {
                pressure: element.solution,
                iterations: element.iterations,
                divergence: div,
            });
        }
        Ok((projected, infos))
    }

    /// Vector-Jacobian product of [`Projection::apply`] with respect to its input velocity.
    ///
    /// The adjoint system reuses the Laplacian (it is symmetric). In
    /// [`GradientMode::Unrolled`] it runs exactly `info.iterations` CG steps.
    pub fn vjp(
        &self,
        cotangent: &MacVelocity,
        info: &ProjectionInfo,
        config: &SolverConfig,
    ) -> Result<MacVelocity> {
        let cotangent = self.adopt(cotangent)?;
        let modes = self.domain.pressure_extrapolation();
        let rhs = gradient_transpose(&cotangent.mul(&self.hard), &modes);
        let guess = self.domain.pressure_zeros();
        let adjoint = match config.gradient {
            GradientMode::Implicit => {
                let result = conjugate_gradient(|p| self.laplace(p), &rhs, &guess, config);
                ensure_converged(&result, 0)?;
                result.solution
            }
            GradientMode::Unrolled => {
                conjugate_gradient_fixed(|p| self.laplace(p), &rhs, &guess, info.iterations)
                    .solution
            }
        };
        let weighted = adjoint.mul(&self.active);
        let through_solve = cotangent.sub(&divergence_transpose(&weighted, &cotangent));
        let through_blend = match &self.blend {
            Some(blend) => through_solve.mul(&blend.keep),
            None => through_solve,
        };
        Ok(through_blend.mul(&self.hard))
    }
}

fn ensure_converged(result: &SolveResult, element: usize) -> Result<()> {
    if result.converged {
        return Ok(());
    }
    warn!(
        "pressure solve did not converge: {} iterations, residual {:.3e} > {:.3e}",
        result.iterations, result.residual, result.threshold
    );
    Err(FluidError::Convergence {
        iterations: result.iterations,
        residual: result.residual,
        threshold: result.threshold,
        failed: vec![element],
    })
}

/// Faces touching a moving obstacle take `linear + ω × (x - center)`; later obstacles win
/// where they overlap.
fn obstacle_blend(domain: &Domain, obstacles: &[Obstacle]) -> Option<ObstacleBlend> {
    let grid = domain.grid();
    let moving: Vec<&Obstacle> = obstacles.iter().filter(|o| !o.stationary).collect();
    if moving.is_empty() {
        return None;
    }
    let walls = hard_boundary(
        &Field::new(grid, 1.0).with_extrapolation(&domain.accessible_extrapolation()),
    );
    let mut keep = MacVelocity::new(grid, &vec![1.0; grid.rank()]);
    let mut rigid = MacVelocity::zeros(grid);
    for obstacle in moving {
        let touched = touching_faces(&geometry_mask(grid, &obstacle.geometry));
        let velocity = MacVelocity::from_fn(grid, |axis, pos| obstacle.rigid_velocity(pos, axis));
        let release = touched.map_components(|c| c.map_with_index(|_, v| 1.0 - v));
        rigid = rigid.mul(&release).add_scaled(&velocity.mul(&touched), 1.0);
        keep = keep.mul(&release);
    }
    Some(ObstacleBlend {
        keep,
        rigid: rigid.mul(&walls),
    })
}

/// Projects `velocity` so that its divergence vanishes in every fluid cell of `domain`.
pub fn divergence_free(
    velocity: &MacVelocity,
    domain: &Domain,
    obstacles: &[Obstacle],
    config: &SolverConfig,
) -> Result<(MacVelocity, ProjectionInfo)> {
    Projection::new(domain, obstacles)?.apply(velocity, config)
}

/// [`divergence_free`] over a batch sharing one domain and obstacle set.
pub fn divergence_free_batch(
    velocities: &[MacVelocity],
    domain: &Domain,
    obstacles: &[Obstacle],
    config: &SolverConfig,
) -> Result<(Vec<MacVelocity>, Vec<ProjectionInfo>)> {
    Projection::new(domain, obstacles)?.apply_batch(velocities, config)
}
