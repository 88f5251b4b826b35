//! Matrix-free conjugate gradient over [`Field`]s.

use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::field::Field;

/// How gradients are propagated through a pressure solve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientMode {
    /// Solve the adjoint system to the configured tolerance.
    #[default]
    Implicit,
    /// Replay exactly as many iterations as the forward solve took.
    Unrolled,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    pub max_iterations: usize,
    pub gradient: GradientMode,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-5,
            absolute_tolerance: 0.0,
            max_iterations: 1000,
            gradient: GradientMode::Implicit,
        }
    }
}

impl SolverConfig {
    /// Residual norm that counts as converged for a system whose initial residual is `initial`.
    pub fn threshold(&self, initial: f64) -> f64 {
        (self.relative_tolerance * initial).max(self.absolute_tolerance)
    }
}

#[derive(Clone, Debug)]
pub struct SolveResult {
    pub solution: Field,
    pub iterations: usize,
    pub residual: f64,
    pub threshold: f64,
    pub converged: bool,
}

/// Per-element outcome of [`conjugate_gradient_batch`].
#[derive(Clone, Debug)]
pub struct BatchSolve {
    pub elements: Vec<SolveResult>,
    /// Lockstep iterations run; the maximum over all elements.
    pub iterations: usize,
}

impl BatchSolve {
    pub fn converged(&self) -> bool {
        self.elements.iter().all(|element| element.converged)
    }

    pub fn failed(&self) -> Vec<usize> {
        self.elements
            .iter()
            .enumerate()
            .filter(|(_, element)| !element.converged)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn worst_residual(&self) -> (f64, f64) {
        self.elements
            .iter()
            .map(|element| (element.residual, element.threshold))
            .fold((0.0, 0.0), |acc, item| if item.0 > acc.0 { item } else { acc })
    }
}

/// Iteration state of one system.
struct Cg {
    x: Field,
    r: Field,
    p: Field,
    rr: f64,
    threshold: f64,
    iterations: usize,
    done: bool,
    converged: bool,
}

impl Cg {
    fn start(op: &impl Fn(&Field) -> Field, rhs: &Field, guess: &Field, config: &SolverConfig) -> Self {
        let r = rhs.add_scaled(&op(guess), -1.0);
        let rr = r.dot(&r);
        let threshold = config.threshold(rr.sqrt());
        let converged = rr.sqrt() <= threshold;
        Self {
            x: guess.clone(),
            p: r.clone(),
            r,
            rr,
            threshold,
            iterations: 0,
            done: converged,
            converged,
        }
    }

    fn step(&mut self, op: &impl Fn(&Field) -> Field) {
        let ap = op(&self.p);
        let denom = self.p.dot(&ap);
        if denom == 0.0 || !denom.is_finite() {
            self.done = true;
            return;
        }
        let alpha = self.rr / denom;
        self.x = self.x.add_scaled(&self.p, alpha);
        self.r = self.r.add_scaled(&ap, -alpha);
        let rr_new = self.r.dot(&self.r);
        self.iterations += 1;
        if rr_new.sqrt() <= self.threshold {
            self.rr = rr_new;
            self.converged = true;
            self.done = true;
            return;
        }
        let beta = rr_new / self.rr;
        self.p = self.r.add_scaled(&self.p, beta);
        self.rr = rr_new;
    }

    fn finish(self) -> SolveResult {
        SolveResult {
            solution: self.x,
            iterations: self.iterations,
            residual: self.rr.sqrt(),
            threshold: self.threshold,
            converged: self.converged,
        }
    }
}

/// Solves `op(x) = rhs` for a symmetric definite (or semidefinite, consistent) `op`.
///
/// Stops once `‖r‖ ≤ max(relative_tolerance·‖r₀‖, absolute_tolerance)` or after
/// `max_iterations`. Non-convergence is reported in the result, not as an error.
pub fn conjugate_gradient(
    op: impl Fn(&Field) -> Field,
    rhs: &Field,
    guess: &Field,
    config: &SolverConfig,
) -> SolveResult {
    let mut state = Cg::start(&op, rhs, guess, config);
    while !state.done && state.iterations < config.max_iterations {
        state.step(&op);
        trace!("cg iteration {} residual {:.3e}", state.iterations, state.rr.sqrt());
    }
    let result = state.finish();
    debug!(
        "cg finished: {} iterations, residual {:.3e} (threshold {:.3e}, converged {})",
        result.iterations, result.residual, result.threshold, result.converged
    );
    result
}

/// Runs exactly `iterations` steps (fewer only if the residual vanishes).
pub fn conjugate_gradient_fixed(
    op: impl Fn(&Field) -> Field,
    rhs: &Field,
    guess: &Field,
    iterations: usize,
) -> SolveResult {
    let config = SolverConfig {
        relative_tolerance: 0.0,
        absolute_tolerance: 0.0,
        max_iterations: iterations,
        gradient: GradientMode::Unrolled,
    };
    conjugate_gradient(op, rhs, guess, &config)
}

/// Solves one system per batch element in lockstep. `op(element, x)` applies element's
/// operator. Converged elements stop updating; the rest keep going until they converge or
/// the shared iteration cap is reached.
pub fn conjugate_gradient_batch(
    op: impl Fn(usize, &Field) -> Field + Sync,
    rhs: &[Field],
    guesses: &[Field],
    config: &SolverConfig,
) -> BatchSolve {
    assert_eq!(rhs.len(), guesses.len(), "batch size mismatch");
    let mut states: Vec<Cg> = rhs
        .par_iter()
        .zip(guesses.par_iter())
        .enumerate()
        .map(|(element, (b, x0))| Cg::start(&|x: &Field| op(element, x), b, x0, config))
        .collect();
    let mut iterations = 0;
    while iterations < config.max_iterations && states.iter().any(|state| !state.done) {
        states
            .par_iter_mut()
            .enumerate()
            .filter(|(_, state)| !state.done)
            .for_each(|(element, state)| state.step(&|x: &Field| op(element, x)));
        iterations += 1;
    }
    let batch = BatchSolve {
        elements: states.into_iter().map(Cg::finish).collect(),
        iterations,
    };
    debug!(
        "batched cg finished: {} elements, {} iterations, failed {:?}",
        batch.elements.len(),
        batch.iterations,
        batch.failed()
    );
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Extrapolation, Grid};
    use crate::laplace;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() <= tol,
            "expected {a} to be within {tol} of {b}"
        );
    }

    /// Laplacian with zero pressure outside the box; negative definite.
    fn dirichlet_op(grid: &Grid) -> impl Fn(&Field) -> Field + Sync {
        let active = Field::new(grid, 1.0)
            .with_extrapolation(&vec![Extrapolation::Zero; grid.rank()]);
        let accessible = Field::new(grid, 1.0)
            .with_extrapolation(&vec![Extrapolation::One; grid.rank()]);
        move |x: &Field| laplace::apply(x, &active, &accessible)
    }

    #[test]
    fn zero_rhs_converges_without_iterating() {
        let grid = Grid::new(&[6, 6], 1.0);
        let rhs = Field::new(&grid, 0.0);
        let result = conjugate_gradient(dirichlet_op(&grid), &rhs, &rhs, &SolverConfig::default());
        assert!(result.converged);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.solution.max_abs(), 0.0);
    }

    #[test]
    fn recovers_known_solution() {
        let grid = Grid::new(&[8, 5], 1.0);
        let op = dirichlet_op(&grid);
        let expected = Field::from_fn(&grid, |c| (c[0] as f64 * 0.4).sin() + 0.1 * c[1] as f64);
        let rhs = op(&expected);
        let config = SolverConfig {
            relative_tolerance: 1e-12,
            ..SolverConfig::default()
        };
        let result = conjugate_gradient(&op, &rhs, &Field::new(&grid, 0.0), &config);
        assert!(result.converged);
        for i in 0..expected.len() {
            assert_close(result.solution.at(i), expected.at(i), 1e-8);
        }
    }

    #[test]
    fn iteration_cap_reports_non_convergence() {
        let grid = Grid::new(&[16, 16], 1.0);
        let rhs = Field::from_fn(&grid, |c| if c[0] == 3 && c[1] == 7 { 1.0 } else { 0.0 });
        let config = SolverConfig {
            relative_tolerance: 1e-12,
            max_iterations: 2,
            ..SolverConfig::default()
        };
        let result =
            conjugate_gradient(dirichlet_op(&grid), &rhs, &Field::new(&grid, 0.0), &config);
        assert!(!result.converged);
        assert_eq!(result.iterations, 2);
        assert!(result.residual > result.threshold);
    }

    #[test]
    fn fixed_iterations_ignore_tolerance() {
        let grid = Grid::new(&[10], 1.0);
        let rhs = Field::from_fn(&grid, |c| c[0] as f64 - 4.5);
        let result = conjugate_gradient_fixed(dirichlet_op(&grid), &rhs, &Field::new(&grid, 0.0), 3);
        assert_eq!(result.iterations, 3);
    }

    #[test]
    fn batch_tracks_each_element() {
        let grid = Grid::new(&[12], 1.0);
        let op = dirichlet_op(&grid);
        let zero = Field::new(&grid, 0.0);
        let spike = Field::from_fn(&grid, |c| if c[0] == 5 { 1.0 } else { 0.0 });
        let config = SolverConfig {
            relative_tolerance: 1e-10,
            ..SolverConfig::default()
        };
        let batch = conjugate_gradient_batch(
            |_, x| op(x),
            &[zero.clone(), spike.clone()],
            &[zero.clone(), zero.clone()],
            &config,
        );
        assert!(batch.converged());
        assert_eq!(batch.elements[0].iterations, 0);
        assert!(batch.elements[1].iterations > 0);
        assert_eq!(batch.iterations, batch.elements[1].iterations);
        let single = conjugate_gradient(&op, &spike, &zero, &config);
        for i in 0..grid.size() {
            assert_close(batch.elements[1].solution.at(i), single.solution.at(i), 1e-12);
        }
    }

    #[test]
    fn batch_cap_lists_failed_elements() {
        let grid = Grid::new(&[20], 1.0);
        let op = dirichlet_op(&grid);
        let zero = Field::new(&grid, 0.0);
        let ramp = Field::from_fn(&grid, |c| c[0] as f64);
        let config = SolverConfig {
            relative_tolerance: 1e-12,
            max_iterations: 1,
            ..SolverConfig::default()
        };
        let batch = conjugate_gradient_batch(|_, x| op(x), &[zero.clone(), ramp], &[zero.clone(), zero], &config);
        assert!(!batch.converged());
        assert_eq!(batch.failed(), vec![1]);
        assert_eq!(batch.iterations, 1);
    }
}
