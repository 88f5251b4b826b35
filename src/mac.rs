use crate::error::{FluidError, Result};
use crate::field::Field;
use crate::grid::{
    collect_indexed, max_indexed, resolve_axis, sum_indexed, AxisLookup, Extrapolation, Grid,
    Lattice,
};

/// One velocity component, sampled at the faces normal to `axis`.
#[derive(Clone, Debug, PartialEq)]
pub struct StaggeredField {
    axis: usize,
    lattice: Lattice,
    extrapolation: Vec<Extrapolation>,
    data: Vec<f64>,
}

impl StaggeredField {
    pub fn new(grid: &Grid, axis: usize, fill: f64) -> Self {
        let lattice = grid.face_lattice(axis);
        let data = vec![fill; lattice.size()];
        Self {
            axis,
            lattice,
            extrapolation: vec![Extrapolation::Boundary; grid.rank()],
            data,
        }
    }

    /// `f` receives the physical position of each face center.
    pub fn from_positions(grid: &Grid, axis: usize, f: impl Fn(&[f64]) -> f64 + Sync) -> Self {
        let lattice = grid.face_lattice(axis);
        let data = collect_indexed(lattice.size(), |i| f(&lattice.position(i)));
        Self {
            axis,
            lattice,
            extrapolation: vec![Extrapolation::Boundary; grid.rank()],
            data,
        }
    }

    pub fn with_extrapolation(mut self, modes: &[Extrapolation]) -> Self {
        assert_eq!(modes.len(), self.lattice.rank(), "extrapolation rank mismatch");
        self.extrapolation = modes.to_vec();
        self
    }

    pub fn axis(&self) -> usize {
        self.axis
    }

    pub fn shape(&self) -> &[usize] {
        &self.lattice.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn extrapolation(&self) -> &[Extrapolation] {
        &self.extrapolation
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn at(&self, index: usize) -> f64 {
        self.data[index]
    }

    pub fn get(&self, coords: &[usize]) -> f64 {
        let index: usize = coords
            .iter()
            .zip(self.lattice.strides.iter())
            .map(|(c, s)| c * s)
            .sum();
        self.data[index]
    }

    pub fn position(&self, index: usize) -> Vec<f64> {
        self.lattice.position(index)
    }

    pub fn coord(&self, index: usize, axis: usize) -> usize {
        self.lattice.coord(index, axis)
    }

    pub fn sample_linear(&self, pos: &[f64]) -> f64 {
        self.lattice.sample_linear(&self.data, &self.extrapolation, pos)
    }

    pub fn value_at(&self, coords: &[isize]) -> f64 {
        self.lattice.value_at(&self.data, &self.extrapolation, coords)
    }

    pub fn map_with_index(&self, f: impl Fn(usize, f64) -> f64 + Sync) -> Self {
        let data = collect_indexed(self.data.len(), |i| f(i, self.data[i]));
        self.with_data(data)
    }

    pub fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64 + Sync) -> Self {
        assert_eq!(self.lattice.shape, other.lattice.shape, "staggered grid mismatch");
        let data = collect_indexed(self.data.len(), |i| f(self.data[i], other.data[i]));
        self.with_data(data)
    }

    pub fn max_abs(&self) -> f64 {
        max_indexed(self.data.len(), |i| self.data[i].abs())
    }

    pub fn dot(&self, other: &Self) -> f64 {
        assert_eq!(self.lattice.shape, other.lattice.shape, "staggered grid mismatch");
        sum_indexed(self.data.len(), |i| self.data[i] * other.data[i])
    }

    pub fn pad(&self, grid: &Grid, cells: usize) -> Self {
        let padded = grid.padded(cells);
        let lattice = padded.face_lattice(self.axis);
        let offset = cells as isize;
        let data = collect_indexed(lattice.size(), |i| {
            let coords: Vec<isize> = (0..lattice.rank())
                .map(|axis| lattice.coord(i, axis) as isize - offset)
                .collect();
            self.value_at(&coords)
        });
        Self {
            axis: self.axis,
            lattice,
            extrapolation: self.extrapolation.clone(),
            data,
        }
    }

    /// Copies face 0 onto face `n` along its own axis; both store the same periodic face.
    pub(crate) fn with_wrapped_faces(mut self) -> Self {
        let axis = self.axis;
        let last = self.lattice.shape[axis] - 1;
        let span = last * self.lattice.strides[axis];
        for i in 0..self.data.len() {
            if self.lattice.coord(i, axis) == last {
                self.data[i] = self.data[i - span];
            }
        }
        self
    }

    fn with_data(&self, data: Vec<f64>) -> Self {
        Self {
            axis: self.axis,
            lattice: self.lattice.clone(),
            extrapolation: self.extrapolation.clone(),
            data,
        }
    }
}

/// Staggered vector field: one [`StaggeredField`] per axis of a cell grid.
#[derive(Clone, Debug, PartialEq)]
pub struct MacVelocity {
    grid: Grid,
    components: Vec<StaggeredField>,
}

impl MacVelocity {
    pub fn new(grid: &Grid, fill: &[f64]) -> Self {
        assert_eq!(fill.len(), grid.rank(), "velocity fill rank mismatch");
        let components = (0..grid.rank())
            .map(|axis| StaggeredField::new(grid, axis, fill[axis]))
            .collect();
        Self {
            grid: grid.clone(),
            components,
        }
    }

    pub fn zeros(grid: &Grid) -> Self {
        Self::new(grid, &vec![0.0; grid.rank()])
    }

    /// `f(axis, position)` gives component `axis` at a face center.
    pub fn from_fn(grid: &Grid, f: impl Fn(usize, &[f64]) -> f64 + Sync) -> Self {
        let components = (0..grid.rank())
            .map(|axis| StaggeredField::from_positions(grid, axis, |pos| f(axis, pos)))
            .collect();
        Self {
            grid: grid.clone(),
            components,
        }
    }

    pub fn from_components(grid: &Grid, components: Vec<StaggeredField>) -> Result<Self> {
        if components.len() != grid.rank() {
            return Err(FluidError::shape(
                "MacVelocity::from_components",
                &[grid.rank()],
                &[components.len()],
            ));
        }
        for (axis, component) in components.iter().enumerate() {
            let expected = grid.face_lattice(axis).shape;
            if component.axis != axis || component.lattice.shape != expected {
                return Err(FluidError::shape(
                    "MacVelocity::from_components",
                    &expected,
                    component.shape(),
                ));
            }
        }
        Ok(Self {
            grid: grid.clone(),
            components,
        })
    }

    pub fn with_extrapolation(self, modes: &[Extrapolation]) -> Self {
        let components = self
            .components
            .into_iter()
            .map(|component| component.with_extrapolation(modes))
            .collect();
        Self {
            grid: self.grid,
            components,
        }
    }

    /// Makes the two copies of every periodic face agree, keeping the lower one.
    pub fn wrap_periodic_faces(self) -> Self {
        let components = self
            .components
            .into_iter()
            .map(|component| {
                if component.extrapolation[component.axis] == Extrapolation::Periodic {
                    component.with_wrapped_faces()
                } else {
                    component
                }
            })
            .collect();
        Self {
            grid: self.grid,
            components,
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn rank(&self) -> usize {
        self.components.len()
    }

    pub fn component(&self, axis: usize) -> &StaggeredField {
        &self.components[axis]
    }

    pub fn components(&self) -> &[StaggeredField] {
        &self.components
    }

    pub fn ensure_same_grid(&self, context: &'static str, grid: &Grid) -> Result<()> {
        if self.grid.shape() != grid.shape() || self.grid.dx() != grid.dx() {
            return Err(FluidError::shape(context, grid.shape(), self.grid.shape()));
        }
        Ok(())
    }

    pub fn sample_linear(&self, pos: &[f64]) -> Vec<f64> {
        self.components
            .iter()
            .map(|component| component.sample_linear(pos))
            .collect()
    }

    pub fn map_components(&self, f: impl Fn(&StaggeredField) -> StaggeredField) -> Self {
        Self {
            grid: self.grid.clone(),
            components: self.components.iter().map(f).collect(),
        }
    }

    pub fn zip_components(
        &self,
        other: &Self,
        f: impl Fn(&StaggeredField, &StaggeredField) -> StaggeredField,
    ) -> Self {
        assert_eq!(self.rank(), other.rank(), "velocity rank mismatch");
        Self {
            grid: self.grid.clone(),
            components: self
                .components
                .iter()
                .zip(other.components.iter())
                .map(|(a, b)| f(a, b))
                .collect(),
        }
    }

    pub fn add_scaled(&self, other: &Self, scale: f64) -> Self {
        self.zip_components(other, |a, b| a.zip_with(b, |x, y| x + y * scale))
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.add_scaled(other, -1.0)
    }

    pub fn mul(&self, other: &Self) -> Self {
        self.zip_components(other, |a, b| a.zip_with(b, |x, y| x * y))
    }

    pub fn scale(&self, factor: f64) -> Self {
        self.map_components(|component| component.map_with_index(|_, value| value * factor))
    }

    pub fn max_abs(&self) -> f64 {
        self.components
            .iter()
            .map(StaggeredField::max_abs)
            .fold(0.0, f64::max)
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.components
            .iter()
            .zip(other.components.iter())
            .map(|(a, b)| a.dot(b))
            .sum()
    }

    pub fn pad(&self, cells: usize) -> Self {
        Self {
            grid: self.grid.padded(cells),
            components: self
                .components
                .iter()
                .map(|component| component.pad(&self.grid, cells))
                .collect(),
        }
    }
}

/// Cell-centered divergence `Σ (u[upper face] - u[lower face]) / dx`.
pub fn divergence(velocity: &MacVelocity) -> Field {
    let grid = velocity.grid();
    let dx = grid.dx();
    let data = collect_indexed(grid.size(), |i| {
        let mut total = 0.0;
        for (axis, component) in velocity.components().iter().enumerate() {
            let lower = lower_face_index(grid, component, i);
            let upper = lower + component.lattice.strides[axis];
            total += component.data[upper] - component.data[lower];
        }
        total / dx
    });
    Field::from_raw(grid, data)
}

/// Flat index of the face on the lower side of cell `i`.
fn lower_face_index(grid: &Grid, component: &StaggeredField, i: usize) -> usize {
    (0..grid.rank())
        .map(|axis| grid.coord(i, axis) * component.lattice.strides[axis])
        .sum()
}

/// Face-centered gradient `(p[upper cell] - p[lower cell]) / dx`, ghost cells from
/// the pressure's extrapolation.
pub fn staggered_gradient(pressure: &Field) -> MacVelocity {
    let inv_dx = 1.0 / pressure.grid().dx();
    across_faces(pressure, pressure.extrapolation(), |upper, lower| {
        (upper - lower) * inv_dx
    })
}

/// Face value = minimum of the two adjacent cells, ghosts from `mask`'s extrapolation.
pub fn stagger_min(mask: &Field) -> MacVelocity {
    let modes = vec![Extrapolation::Zero; mask.grid().rank()];
    across_faces(mask, &modes, f64::min)
}

/// Face value = maximum of the two adjacent cells.
pub fn stagger_max(mask: &Field) -> MacVelocity {
    let modes = vec![Extrapolation::Zero; mask.grid().rank()];
    across_faces(mask, &modes, f64::max)
}

fn across_faces(
    field: &Field,
    modes: &[Extrapolation],
    combine: impl Fn(f64, f64) -> f64 + Sync,
) -> MacVelocity {
    let grid = field.grid();
    let components = (0..grid.rank())
        .map(|axis| {
            let lattice = grid.face_lattice(axis);
            let data = collect_indexed(lattice.size(), |i| {
                let mut coords: Vec<isize> = (0..lattice.rank())
                    .map(|a| lattice.coord(i, a) as isize)
                    .collect();
                let upper = field.value_at(&coords);
                coords[axis] -= 1;
                combine(upper, field.value_at(&coords))
            });
            StaggeredField {
                axis,
                lattice,
                extrapolation: modes.to_vec(),
                data,
            }
        })
        .collect();
    MacVelocity {
        grid: grid.clone(),
        components,
    }
}

/// Adjoint of [`divergence`]: every face receives `(x[lower cell] - x[upper cell]) / dx`
/// from the cells it bounds, nothing from cells outside the grid.
pub(crate) fn divergence_transpose(cells: &Field, like: &MacVelocity) -> MacVelocity {
    let grid = cells.grid();
    let inv_dx = 1.0 / grid.dx();
    like.map_components(|component| {
        let axis = component.axis;
        let n = grid.shape()[axis] as isize;
        component.map_with_index(|i, _| {
            let mut coords: Vec<isize> = (0..grid.rank())
                .map(|a| component.coord(i, a) as isize)
                .collect();
            let c = coords[axis];
            let upper = if c < n { cells.value_at(&coords) } else { 0.0 };
            coords[axis] -= 1;
            let lower = if c > 0 { cells.value_at(&coords) } else { 0.0 };
            (lower - upper) * inv_dx
        })
    })
}

/// Adjoint of [`staggered_gradient`] for a pressure with extrapolation `modes`:
/// ghost reads are routed back to the cells they copy.
pub(crate) fn gradient_transpose(faces: &MacVelocity, modes: &[Extrapolation]) -> Field {
    let grid = faces.grid().clone();
    let lattice = grid.centered_lattice();
    let inv_dx = 1.0 / grid.dx();
    let mut out = vec![0.0; grid.size()];
    for component in faces.components() {
        let axis = component.axis;
        for i in 0..component.len() {
            let g = component.data[i] * inv_dx;
            if g == 0.0 {
                continue;
            }
            let mut coords: Vec<isize> = (0..grid.rank())
                .map(|a| component.coord(i, a) as isize)
                .collect();
            if let Some(index) = resolve_cell(&lattice, modes, &coords) {
                out[index] += g;
            }
            coords[axis] -= 1;
            if let Some(index) = resolve_cell(&lattice, modes, &coords) {
                out[index] -= g;
            }
        }
    }
    Field::from_raw(&grid, out).with_extrapolation(modes)
}

fn resolve_cell(lattice: &Lattice, modes: &[Extrapolation], coords: &[isize]) -> Option<usize> {
    let mut index = 0;
    for axis in 0..lattice.rank() {
        match resolve_axis(coords[axis], lattice.shape[axis], lattice.periods[axis], modes[axis]) {
            AxisLookup::Inside(c) => index += c * lattice.strides[axis],
            AxisLookup::Ghost(_) => return None,
        }
    }
    Some(index)
}

/// Samples a centered field at every face center of `grid`.
pub fn centered_at_faces(field: &Field) -> MacVelocity {
    let grid = field.grid();
    MacVelocity::from_fn(grid, |_, pos| field.sample_linear(pos))
}
