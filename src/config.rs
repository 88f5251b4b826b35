//! Run parameters for the headless driver, read from TOML.

use serde::{Deserialize, Serialize};

use crate::domain::{Boundary, Domain};
use crate::error::{FluidError, Result};
use crate::fluid::IncompressibleFlow;
use crate::grid::Grid;
use crate::liquid::SdfLiquid;
use crate::solver::SolverConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub steps: usize,
    pub dt: f64,
    pub resolution: Vec<usize>,
    pub dx: f64,
    pub boundary: Boundary,
    pub gravity: Vec<f64>,
    pub flow: FlowConfig,
    pub liquid: LiquidConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            steps: 60,
            dt: 0.05,
            resolution: vec![64, 64],
            dx: 1.0 / 64.0,
            boundary: Boundary::Closed,
            gravity: vec![0.0, -9.81],
            flow: FlowConfig::default(),
            liquid: LiquidConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Same boundary on every axis.
    pub fn domain(&self) -> Result<Domain> {
        if self.resolution.is_empty() || self.resolution.contains(&0) {
            return Err(FluidError::InvalidParameter {
                name: "resolution",
                reason: format!("{:?} needs at least one axis, each > 0 cells", self.resolution),
            });
        }
        if !(self.dx.is_finite() && self.dx > 0.0) {
            return Err(FluidError::InvalidParameter {
                name: "dx",
                reason: format!("{} must be finite and > 0", self.dx),
            });
        }
        let grid = Grid::new(&self.resolution, self.dx);
        let domain = Domain::new(grid, &vec![self.boundary; self.resolution.len()])?;
        domain.ensure_vector("SimulationConfig::gravity", &self.gravity)?;
        Ok(domain)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub make_input_divfree: bool,
    pub make_output_divfree: bool,
    pub conserve_density: bool,
    pub buoyancy_factor: f64,
    pub solver: SolverConfig,
}

impl Default for FlowConfig {
    fn default() -> Self {
        let flow = IncompressibleFlow::default();
        Self {
            make_input_divfree: flow.make_input_divfree,
            make_output_divfree: flow.make_output_divfree,
            conserve_density: flow.conserve_density,
            buoyancy_factor: 0.1,
            solver: flow.solver,
        }
    }
}

impl FlowConfig {
    pub fn flow(&self) -> IncompressibleFlow {
        IncompressibleFlow {
            make_input_divfree: self.make_input_divfree,
            make_output_divfree: self.make_output_divfree,
            conserve_density: self.conserve_density,
            solver: self.solver,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidConfig {
    pub solver: SolverConfig,
    pub dissipation: f64,
    pub inflation: f64,
    /// Extrapolation layers, redistancing sweeps and SDF clamp, in cells.
    pub max_distance: usize,
}

impl Default for LiquidConfig {
    fn default() -> Self {
        let liquid = SdfLiquid::default();
        Self {
            solver: liquid.solver,
            dissipation: liquid.dissipation,
            inflation: liquid.inflation,
            max_distance: 10,
        }
    }
}

impl LiquidConfig {
    pub fn liquid(&self) -> SdfLiquid {
        SdfLiquid {
            solver: self.solver,
            dissipation: self.dissipation,
            inflation: self.inflation,
        }
    }
}
