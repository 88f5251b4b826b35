use crate::error::{FluidError, Result};
use crate::grid::{
    collect_indexed, max_indexed, sum_indexed, Extrapolation, Grid, Lattice,
};

/// Scalar field sampled at cell centers.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    grid: Grid,
    lattice: Lattice,
    extrapolation: Vec<Extrapolation>,
    data: Vec<f64>,
}

impl Field {
    pub fn new(grid: &Grid, fill: f64) -> Self {
        let lattice = grid.centered_lattice();
        let data = vec![fill; lattice.size()];
        Self {
            grid: grid.clone(),
            lattice,
            extrapolation: vec![Extrapolation::Boundary; grid.rank()],
            data,
        }
    }

    pub fn from_fn(grid: &Grid, f: impl Fn(&[usize]) -> f64 + Sync) -> Self {
        let data = collect_indexed(grid.size(), |i| f(&grid.coords(i)));
        Self {
            grid: grid.clone(),
            lattice: grid.centered_lattice(),
            extrapolation: vec![Extrapolation::Boundary; grid.rank()],
            data,
        }
    }

    pub fn from_data(grid: &Grid, data: Vec<f64>) -> Result<Self> {
        if data.len() != grid.size() {
            return Err(FluidError::shape("Field::from_data", &[grid.size()], &[data.len()]));
        }
        Ok(Self {
            grid: grid.clone(),
            lattice: grid.centered_lattice(),
            extrapolation: vec![Extrapolation::Boundary; grid.rank()],
            data,
        })
    }

    pub(crate) fn from_raw(grid: &Grid, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), grid.size());
        Self {
            grid: grid.clone(),
            lattice: grid.centered_lattice(),
            extrapolation: vec![Extrapolation::Boundary; grid.rank()],
            data,
        }
    }

    pub fn with_extrapolation(mut self, modes: &[Extrapolation]) -> Self {
        assert_eq!(modes.len(), self.grid.rank(), "extrapolation rank mismatch");
        self.extrapolation = modes.to_vec();
        self
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn extrapolation(&self) -> &[Extrapolation] {
        &self.extrapolation
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, coords: &[usize]) -> f64 {
        self.data[self.grid.idx(coords)]
    }

    pub fn at(&self, index: usize) -> f64 {
        self.data[index]
    }

    /// Value at integer coordinates, ghost cells resolved by the extrapolation.
    pub fn value_at(&self, coords: &[isize]) -> f64 {
        self.lattice.value_at(&self.data, &self.extrapolation, coords)
    }

    pub(crate) fn shifted(&self, index: usize, axis: usize, delta: isize) -> f64 {
        self.lattice
            .shifted(&self.data, index, axis, delta, self.extrapolation[axis])
    }

    pub fn sample_linear(&self, pos: &[f64]) -> f64 {
        self.lattice.sample_linear(&self.data, &self.extrapolation, pos)
    }

    pub fn ensure_same_grid(&self, context: &'static str, other: &Field) -> Result<()> {
        if self.grid.shape() != other.grid.shape() || self.grid.dx() != other.grid.dx() {
            return Err(FluidError::shape(context, self.grid.shape(), other.grid.shape()));
        }
        Ok(())
    }

    pub fn map(&self, f: impl Fn(f64) -> f64 + Sync) -> Self {
        self.map_with_index(|_, value| f(value))
    }

    pub fn map_with_index(&self, f: impl Fn(usize, f64) -> f64 + Sync) -> Self {
        let data = collect_indexed(self.data.len(), |i| f(i, self.data[i]));
        self.with_data(data)
    }

    pub fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64 + Sync) -> Self {
        self.assert_same_grid(other);
        let data = collect_indexed(self.data.len(), |i| f(self.data[i], other.data[i]));
        self.with_data(data)
    }

    pub fn add_scaled(&self, other: &Self, scale: f64) -> Self {
        self.zip_with(other, |a, b| a + b * scale)
    }

    pub fn mul(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a * b)
    }

    pub fn scale(&self, scale: f64) -> Self {
        self.map(|value| value * scale)
    }

    pub fn sum(&self) -> f64 {
        sum_indexed(self.data.len(), |i| self.data[i])
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.assert_same_grid(other);
        sum_indexed(self.data.len(), |i| self.data[i] * other.data[i])
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn max_abs(&self) -> f64 {
        max_indexed(self.data.len(), |i| self.data[i].abs())
    }

    pub fn min_max(&self) -> (f64, f64) {
        let mut iter = self.data.iter().filter(|value| value.is_finite());
        let Some(first) = iter.next() else {
            return (0.0, 0.0);
        };
        iter.fold((*first, *first), |(lo, hi), value| (lo.min(*value), hi.max(*value)))
    }

    /// Grows the field by `cells` ghost layers filled from its extrapolation.
    pub fn pad(&self, cells: usize) -> Self {
        let grid = self.grid.padded(cells);
        let offset = cells as isize;
        let data = collect_indexed(grid.size(), |i| {
            let coords: Vec<isize> = (0..grid.rank())
                .map(|axis| grid.coord(i, axis) as isize - offset)
                .collect();
            self.value_at(&coords)
        });
        Self {
            lattice: grid.centered_lattice(),
            grid,
            extrapolation: self.extrapolation.clone(),
            data,
        }
    }

    /// Removes `cells` layers from every side; inverse of [`Field::pad`].
    pub fn crop(&self, cells: usize) -> Self {
        let shape: Vec<usize> = self.grid.shape().iter().map(|n| n - 2 * cells).collect();
        let lower: Vec<f64> = self
            .grid
            .lower()
            .iter()
            .map(|lo| lo + cells as f64 * self.grid.dx())
            .collect();
        let grid = Grid::new(&shape, self.grid.dx()).with_lower(&lower);
        let data = collect_indexed(grid.size(), |i| {
            let coords: Vec<usize> = (0..grid.rank())
                .map(|axis| grid.coord(i, axis) + cells)
                .collect();
            self.get(&coords)
        });
        Self {
            lattice: grid.centered_lattice(),
            grid,
            extrapolation: self.extrapolation.clone(),
            data,
        }
    }

    fn with_data(&self, data: Vec<f64>) -> Self {
        Self {
            grid: self.grid.clone(),
            lattice: self.lattice.clone(),
            extrapolation: self.extrapolation.clone(),
            data,
        }
    }

    fn assert_same_grid(&self, other: &Self) {
        assert_eq!(self.data.len(), other.data.len(), "field grid mismatch");
    }
}
