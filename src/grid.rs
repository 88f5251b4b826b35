use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

const PAR_THRESHOLD_DEFAULT: usize = 262_144;
const PAR_MIN_WORK_PER_THREAD: usize = 4096;

fn parallel_threshold() -> usize {
    static THRESHOLD: OnceLock<usize> = OnceLock::new();
    *THRESHOLD.get_or_init(|| {
        std::env::var("SIM_PAR_THRESHOLD")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(PAR_THRESHOLD_DEFAULT)
    })
}

pub(crate) fn should_parallel(len: usize) -> bool {
    if len < parallel_threshold() {
        return false;
    }
    let threads = rayon::current_num_threads().max(1);
    len / threads >= PAR_MIN_WORK_PER_THREAD
}

pub(crate) fn fill_indexed(data: &mut [f64], f: impl Fn(usize) -> f64 + Sync) {
    let parallel = should_parallel(data.len());
    fill_indexed_with(parallel, data, f);
}

pub(crate) fn collect_indexed(len: usize, f: impl Fn(usize) -> f64 + Sync) -> Vec<f64> {
    let mut data = vec![0.0; len];
    fill_indexed(&mut data, f);
    data
}

pub(crate) fn sum_indexed(len: usize, f: impl Fn(usize) -> f64 + Sync) -> f64 {
    sum_indexed_with(should_parallel(len), len, f)
}

pub(crate) fn max_indexed(len: usize, f: impl Fn(usize) -> f64 + Sync) -> f64 {
    max_indexed_with(should_parallel(len), len, f)
}

fn fill_indexed_with(parallel: bool, data: &mut [f64], f: impl Fn(usize) -> f64 + Sync) {
    if parallel {
        data.par_iter_mut().enumerate().for_each(|(i, value)| {
            *value = f(i);
        });
    } else {
        for (i, value) in data.iter_mut().enumerate() {
            *value = f(i);
        }
    }
}

fn sum_indexed_with(parallel: bool, len: usize, f: impl Fn(usize) -> f64 + Sync) -> f64 {
    if parallel {
        (0..len).into_par_iter().map(&f).sum()
    } else {
        (0..len).map(f).sum()
    }
}

fn max_indexed_with(parallel: bool, len: usize, f: impl Fn(usize) -> f64 + Sync) -> f64 {
    if parallel {
        (0..len).into_par_iter().map(&f).reduce(|| 0.0_f64, f64::max)
    } else {
        (0..len).map(f).fold(0.0_f64, f64::max)
    }
}

/// Ghost-value policy applied when a sample index leaves the lattice along one axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Extrapolation {
    Zero,
    One,
    /// Repeat the outermost sample.
    Boundary,
    Periodic,
}

impl Extrapolation {
    fn ghost(self) -> Option<f64> {
        match self {
            Extrapolation::Zero => Some(0.0),
            Extrapolation::One => Some(1.0),
            Extrapolation::Boundary | Extrapolation::Periodic => None,
        }
    }
}

pub(crate) enum AxisLookup {
    Inside(usize),
    Ghost(f64),
}

pub(crate) fn resolve_axis(
    index: isize,
    samples: usize,
    period: usize,
    mode: Extrapolation,
) -> AxisLookup {
    if index >= 0 && (index as usize) < samples {
        return AxisLookup::Inside(index as usize);
    }
    match mode {
        Extrapolation::Periodic => {
            let wrapped = index.rem_euclid(period as isize) as usize;
            AxisLookup::Inside(wrapped.min(samples - 1))
        }
        Extrapolation::Boundary => AxisLookup::Inside(index.clamp(0, samples as isize - 1) as usize),
        Extrapolation::Zero | Extrapolation::One => {
            AxisLookup::Ghost(mode.ghost().unwrap_or(0.0))
        }
    }
}

/// Cell lattice: `shape[axis]` cells of edge length `dx` starting at `lower`.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    shape: Vec<usize>,
    strides: Vec<usize>,
    dx: f64,
    lower: Vec<f64>,
}

impl Grid {
    pub fn new(shape: &[usize], dx: f64) -> Self {
        assert!(!shape.is_empty(), "grid needs at least one axis");
        assert!(shape.iter().all(|n| *n > 0), "every axis must have > 0 cells");
        assert!(dx > 0.0, "dx must be > 0");
        Self {
            shape: shape.to_vec(),
            strides: strides_for(shape),
            dx,
            lower: vec![0.0; shape.len()],
        }
    }

    pub fn with_lower(mut self, lower: &[f64]) -> Self {
        assert_eq!(lower.len(), self.rank(), "lower corner rank mismatch");
        self.lower = lower.to_vec();
        self
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dx(&self) -> f64 {
        self.dx
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> Vec<f64> {
        self.lower
            .iter()
            .zip(self.shape.iter())
            .map(|(lo, n)| lo + *n as f64 * self.dx)
            .collect()
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn idx(&self, coords: &[usize]) -> usize {
        debug_assert_eq!(coords.len(), self.rank());
        coords
            .iter()
            .zip(self.strides.iter())
            .map(|(c, s)| c * s)
            .sum()
    }

    pub fn coord(&self, index: usize, axis: usize) -> usize {
        (index / self.strides[axis]) % self.shape[axis]
    }

    pub fn coords(&self, index: usize) -> Vec<usize> {
        (0..self.rank()).map(|axis| self.coord(index, axis)).collect()
    }

    pub fn cell_center(&self, coords: &[usize]) -> Vec<f64> {
        coords
            .iter()
            .zip(self.lower.iter())
            .map(|(c, lo)| lo + (*c as f64 + 0.5) * self.dx)
            .collect()
    }

    pub fn cell_center_at(&self, index: usize) -> Vec<f64> {
        (0..self.rank())
            .map(|axis| self.lower[axis] + (self.coord(index, axis) as f64 + 0.5) * self.dx)
            .collect()
    }

    /// Grid grown by `cells` ghost layers on every side, same physical spacing.
    pub fn padded(&self, cells: usize) -> Self {
        let shape: Vec<usize> = self.shape.iter().map(|n| n + 2 * cells).collect();
        let lower: Vec<f64> = self
            .lower
            .iter()
            .map(|lo| lo - cells as f64 * self.dx)
            .collect();
        Grid::new(&shape, self.dx).with_lower(&lower)
    }

    /// Every non-zero offset in {-1, 0, 1}^rank.
    pub fn neighbor_offsets(&self) -> Vec<Vec<isize>> {
        let rank = self.rank();
        let total = 3_usize.pow(rank as u32);
        (0..total)
            .map(|code| {
                let mut rest = code;
                (0..rank)
                    .map(|_| {
                        let digit = (rest % 3) as isize - 1;
                        rest /= 3;
                        digit
                    })
                    .collect::<Vec<isize>>()
            })
            .filter(|offset| offset.iter().any(|d| *d != 0))
            .collect()
    }

    pub(crate) fn centered_lattice(&self) -> Lattice {
        Lattice {
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            periods: self.shape.clone(),
            origin: self.lower.iter().map(|lo| lo + 0.5 * self.dx).collect(),
            dx: self.dx,
        }
    }

    pub(crate) fn face_lattice(&self, axis: usize) -> Lattice {
        let mut shape = self.shape.clone();
        shape[axis] += 1;
        let origin = self
            .lower
            .iter()
            .enumerate()
            .map(|(a, lo)| if a == axis { *lo } else { lo + 0.5 * self.dx })
            .collect();
        Lattice {
            strides: strides_for(&shape),
            shape,
            periods: self.shape.clone(),
            origin,
            dx: self.dx,
        }
    }
}

fn strides_for(shape: &[usize]) -> Vec<usize> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut stride = 1;
    for n in shape {
        strides.push(stride);
        stride *= n;
    }
    strides
}

/// Sample layout shared by centered and staggered storage.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Lattice {
    pub shape: Vec<usize>,
    pub strides: Vec<usize>,
    pub periods: Vec<usize>,
    /// Physical position of sample zero.
    pub origin: Vec<f64>,
    pub dx: f64,
}

impl Lattice {
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn coord(&self, index: usize, axis: usize) -> usize {
        (index / self.strides[axis]) % self.shape[axis]
    }

    pub fn position(&self, index: usize) -> Vec<f64> {
        (0..self.rank())
            .map(|axis| self.origin[axis] + self.coord(index, axis) as f64 * self.dx)
            .collect()
    }

    /// Neighbour of `index` shifted by `delta` along `axis`, resolved through `mode`.
    pub fn shifted(
        &self,
        data: &[f64],
        index: usize,
        axis: usize,
        delta: isize,
        mode: Extrapolation,
    ) -> f64 {
        let c = self.coord(index, axis) as isize + delta;
        match resolve_axis(c, self.shape[axis], self.periods[axis], mode) {
            AxisLookup::Inside(target) => {
                let base = index - self.coord(index, axis) * self.strides[axis];
                data[base + target * self.strides[axis]]
            }
            AxisLookup::Ghost(value) => value,
        }
    }

    pub fn value_at(&self, data: &[f64], modes: &[Extrapolation], coords: &[isize]) -> f64 {
        let mut index = 0;
        for axis in 0..self.rank() {
            match resolve_axis(coords[axis], self.shape[axis], self.periods[axis], modes[axis]) {
                AxisLookup::Inside(c) => index += c * self.strides[axis],
                AxisLookup::Ghost(value) => return value,
            }
        }
        data[index]
    }

    /// Multilinear interpolation at a physical position.
    pub fn sample_linear(&self, data: &[f64], modes: &[Extrapolation], pos: &[f64]) -> f64 {
        let rank = self.rank();
        let mut base = Vec::with_capacity(rank);
        let mut frac = Vec::with_capacity(rank);
        for axis in 0..rank {
            let g = (pos[axis] - self.origin[axis]) / self.dx;
            let floor = g.floor();
            base.push(floor as isize);
            frac.push(g - floor);
        }
        let mut corner = vec![0_isize; rank];
        let mut total = 0.0;
        for mask in 0..(1_usize << rank) {
            let mut weight = 1.0;
            for axis in 0..rank {
                if mask & (1 << axis) != 0 {
                    corner[axis] = base[axis] + 1;
                    weight *= frac[axis];
                } else {
                    corner[axis] = base[axis];
                    weight *= 1.0 - frac[axis];
                }
            }
            if weight == 0.0 {
                continue;
            }
            total += weight * self.value_at(data, modes, &corner);
        }
        total
    }
}
