mod advect;
mod config;
mod domain;
mod effect;
mod error;
mod extrapolate;
mod field;
mod fluid;
mod geometry;
mod grid;
mod laplace;
mod liquid;
mod mac;
mod mask;
mod projection;
mod redistance;
mod solver;

pub use advect::{advect_scalar, advect_velocity};
pub use config::{FlowConfig, LiquidConfig, SimulationConfig};
pub use domain::{Boundary, Domain};
pub use effect::{apply_scalar_effects, apply_vector_effects, Effect, EffectMode};
pub use error::{FluidError, Result};
pub use extrapolate::extrapolate_velocity;
pub use field::Field;
pub use fluid::{
    add_buoyancy, rescale_density_to_mass, FluidState, IncompressibleFlow, SolveInfo,
};
pub use geometry::{Geometry, Obstacle};
pub use grid::{Extrapolation, Grid};
pub use laplace::masked_laplace;
pub use liquid::{LiquidState, SdfLiquid};
pub use mac::{
    centered_at_faces, divergence, stagger_max, stagger_min, staggered_gradient, MacVelocity,
    StaggeredField,
};
pub use mask::{
    accessible_mask, active_mask, binary_mask, geometry_mask, hard_boundary, mask_union,
    occupancy, surface_band, touching_faces, validate_mask,
};
pub use projection::{divergence_free, divergence_free_batch, Projection, ProjectionInfo};
pub use redistance::{initial_sdf, redistance};
pub use solver::{
    conjugate_gradient, conjugate_gradient_batch, conjugate_gradient_fixed, BatchSolve,
    GradientMode, SolveResult, SolverConfig,
};
