//! Velocity extension from fluid faces into the surrounding air.

use crate::field::Field;
use crate::mac::{MacVelocity, StaggeredField};

/// Faces of `component` next to at least one active cell. Cells outside the grid count as
/// inactive.
fn fluid_face_mask(component: &StaggeredField, active: &Field) -> Vec<bool> {
    let axis = component.axis();
    let rank = component.shape().len();
    let n = active.grid().shape()[axis];
    (0..component.len())
        .map(|i| {
            let mut coords: Vec<usize> = (0..rank).map(|a| component.coord(i, a)).collect();
            let c = coords[axis];
            let upper = c < n && active.get(&coords) > 0.0;
            let lower = c > 0 && {
                coords[axis] = c - 1;
                active.get(&coords) > 0.0
            };
            upper || lower
        })
        .collect()
}

fn face_neighbours(component: &StaggeredField, i: usize) -> Vec<usize> {
    let shape = component.shape();
    let mut stride = 1;
    let mut out = Vec::with_capacity(2 * shape.len());
    for (axis, n) in shape.iter().enumerate() {
        let c = component.coord(i, axis);
        if c > 0 {
            out.push(i - stride);
        }
        if c + 1 < *n {
            out.push(i + stride);
        }
        stride *= n;
    }
    out
}

fn expand_mask(component: &StaggeredField, mask: &[bool]) -> Vec<bool> {
    (0..mask.len())
        .map(|i| mask[i] || face_neighbours(component, i).iter().any(|n| mask[*n]))
        .collect()
}

/// One layer of extension: faces entering the mask take the mean of their known neighbours.
fn extrapolate_layer(component: &StaggeredField, mask: &[bool], next_mask: &[bool]) -> StaggeredField {
    component.map_with_index(|i, value| {
        if mask[i] || !next_mask[i] {
            return value;
        }
        let mut sum = 0.0;
        let mut count = 0.0;
        for n in face_neighbours(component, i) {
            if mask[n] {
                sum += component.at(n);
                count += 1.0;
            }
        }
        if count > 0.0 {
            sum / count
        } else {
            value
        }
    })
}

/// Extends velocities `layers` faces beyond the faces bordering `active` cells. Faces
/// never reached keep their values.
pub fn extrapolate_velocity(velocity: &MacVelocity, active: &Field, layers: usize) -> MacVelocity {
    if layers == 0 {
        return velocity.clone();
    }
    velocity.map_components(|component| {
        let mut mask = fluid_face_mask(component, active);
        let mut field = component.clone();
        for _ in 0..layers {
            let next_mask = expand_mask(&field, &mask);
            field = extrapolate_layer(&field, &mask, &next_mask);
            mask = next_mask;
        }
        field
    })
}
