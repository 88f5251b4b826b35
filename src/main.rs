use anyhow::{bail, Context, Result};
use gridfluid::{
    Domain, Effect, EffectMode, Field, FluidState, Geometry, Grid, LiquidState, MacVelocity,
    Obstacle, SimulationConfig,
};
use log::info;

#[derive(Clone, Copy, Debug, PartialEq)]
enum Scenario {
    Plume,
    DamBreak,
}

impl Scenario {
    fn tag(self) -> &'static str {
        match self {
            Scenario::Plume => "plume",
            Scenario::DamBreak => "dam-break",
        }
    }
}

/// Box spanning the given fractions of the first two axes and all of the others.
fn region(grid: &Grid, x: (f64, f64), y: (f64, f64)) -> Geometry {
    let upper = grid.upper();
    let lower = grid.lower();
    let mut lo = lower.to_vec();
    let mut hi = upper.clone();
    for (axis, (from, to)) in [x, y].into_iter().enumerate() {
        let extent = upper[axis] - lower[axis];
        lo[axis] = lower[axis] + from * extent;
        hi[axis] = lower[axis] + to * extent;
    }
    Geometry::Box {
        lower: lo,
        upper: hi,
    }
}

fn center_sphere(grid: &Grid, height: f64, radius: f64) -> Geometry {
    let lower = grid.lower();
    let upper = grid.upper();
    let mut center: Vec<f64> = lower
        .iter()
        .zip(upper.iter())
        .map(|(lo, hi)| 0.5 * (lo + hi))
        .collect();
    center[1] = lower[1] + height * (upper[1] - lower[1]);
    let extent = (upper[0] - lower[0]).min(upper[1] - lower[1]);
    Geometry::Sphere {
        center,
        radius: radius * extent,
    }
}

/// Largest step not exceeding `dt` that keeps `max|velocity|·dt` within `cfl` cells.
fn effective_dt(dt: f64, cfl: f64, velocity: &MacVelocity) -> f64 {
    if dt <= 0.0 || cfl <= 0.0 {
        return dt;
    }
    let max_vel = velocity.max_abs();
    if max_vel == 0.0 {
        return dt;
    }
    dt.min(cfl * velocity.grid().dx() / max_vel)
}

fn run_plume(config: &SimulationConfig, domain: &Domain) -> Result<()> {
    let grid = domain.grid();
    let source = Effect::scalar(
        region(grid, (0.4, 0.6), (0.05, 0.15)),
        EffectMode::Replace,
        1.0,
    );
    let obstacle = Obstacle::new(center_sphere(grid, 0.6, 0.1));
    let flow = config.flow.flow();
    let mut state = FluidState::new(domain).with_buoyancy_factor(config.flow.buoyancy_factor);
    for step in 0..config.steps {
        let dt = effective_dt(config.dt, 1.0, state.velocity());
        state = flow.step(
            &state,
            dt,
            std::slice::from_ref(&obstacle),
            &config.gravity,
            std::slice::from_ref(&source),
            &[],
        )?;
        if let Some(solve) = state.solve_info() {
            info!(
                "{} step {:>4} t={:.3}: mass {:.4}, max |v| {:.4}, {} pressure iterations",
                Scenario::Plume.tag(),
                step + 1,
                state.age(),
                state.density().sum(),
                state.velocity().max_abs(),
                solve.iterations
            );
        }
    }
    Ok(())
}

fn run_dam_break(config: &SimulationConfig, domain: &Domain) -> Result<()> {
    let grid = domain.grid();
    let block = region(grid, (0.0, 0.35), (0.0, 0.6));
    let density = Field::from_fn(grid, |c| {
        if block.contains(&grid.cell_center(c)) {
            1.0
        } else {
            0.0
        }
    });
    let liquid = config.liquid.liquid();
    let mut state =
        LiquidState::from_density(domain, density, &config.gravity, config.liquid.max_distance)?;
    let initial_volume = state.volume();
    for step in 0..config.steps {
        let dt = effective_dt(config.dt, 1.0, state.velocity());
        state = liquid.step(&state, dt, &[], &[])?;
        let iterations = state.projection().map_or(0, |info| info.iterations);
        info!(
            "{} step {:>4} t={:.3}: {} liquid cells ({:+}), {} pressure iterations",
            Scenario::DamBreak.tag(),
            step + 1,
            state.age(),
            state.volume(),
            state.volume() - initial_volume,
            iterations
        );
    }
    Ok(())
}

fn load_config() -> Result<SimulationConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(SimulationConfig::default());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("read {path}"))?;
    SimulationConfig::from_toml_str(&text).with_context(|| format!("parse {path}"))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config = load_config()?;
    if config.resolution.len() < 2 {
        bail!("the demo scenarios need at least two axes");
    }
    let domain = config.domain()?;
    for scenario in [Scenario::Plume, Scenario::DamBreak] {
        info!(
            "running {} on {:?} for {} steps",
            scenario.tag(),
            domain.grid().shape(),
            config.steps
        );
        match scenario {
            Scenario::Plume => run_plume(&config, &domain)?,
            Scenario::DamBreak => run_dam_break(&config, &domain)?,
        }
    }
    Ok(())
}
