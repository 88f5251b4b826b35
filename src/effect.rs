use serde::{Deserialize, Serialize};

use crate::error::{FluidError, Result};
use crate::field::Field;
use crate::geometry::Geometry;
use crate::mac::MacVelocity;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectMode {
    /// `f + mask·value·dt`: sources and forces.
    #[default]
    Add,
    /// `f·(1 - mask) + mask·value`: inflows that pin the field.
    Replace,
}

/// Source or force confined to a region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub geometry: Geometry,
    #[serde(default)]
    pub mode: EffectMode,
    /// One entry for scalar fields, one per axis for velocities.
    pub value: Vec<f64>,
}

impl Effect {
    pub fn scalar(geometry: Geometry, mode: EffectMode, value: f64) -> Self {
        Self {
            geometry,
            mode,
            value: vec![value],
        }
    }

    pub fn vector(geometry: Geometry, mode: EffectMode, value: &[f64]) -> Self {
        Self {
            geometry,
            mode,
            value: value.to_vec(),
        }
    }

    fn blend(&self, current: f64, inside: bool, value: f64, dt: f64) -> f64 {
        if !inside {
            return current;
        }
        match self.mode {
            EffectMode::Add => current + value * dt,
            EffectMode::Replace => value,
        }
    }

    pub fn apply_scalar(&self, field: &Field, dt: f64) -> Result<Field> {
        if self.value.len() != 1 {
            return Err(FluidError::shape("Effect::apply_scalar", &[1], &[self.value.len()]));
        }
        self.geometry.ensure_rank("Effect::apply_scalar", field.grid().rank())?;
        let grid = field.grid();
        let value = self.value[0];
        Ok(field.map_with_index(|i, current| {
            let inside = self.geometry.contains(&grid.cell_center_at(i));
            self.blend(current, inside, value, dt)
        }))
    }

    /// Component `axis` is evaluated at its own face centers.
    pub fn apply_vector(&self, velocity: &MacVelocity, dt: f64) -> Result<MacVelocity> {
        let rank = velocity.rank();
        if self.value.len() != rank {
            return Err(FluidError::shape("Effect::apply_vector", &[rank], &[self.value.len()]));
        }
        self.geometry.ensure_rank("Effect::apply_vector", rank)?;
        Ok(velocity.map_components(|component| {
            let value = self.value[component.axis()];
            component.map_with_index(|i, current| {
                let inside = self.geometry.contains(&component.position(i));
                self.blend(current, inside, value, dt)
            })
        }))
    }
}

/// Applies `effects` in order.
pub fn apply_scalar_effects(field: &Field, effects: &[Effect], dt: f64) -> Result<Field> {
    effects
        .iter()
        .try_fold(field.clone(), |acc, effect| effect.apply_scalar(&acc, dt))
}

pub fn apply_vector_effects(
    velocity: &MacVelocity,
    effects: &[Effect],
    dt: f64,
) -> Result<MacVelocity> {
    effects
        .iter()
        .try_fold(velocity.clone(), |acc, effect| effect.apply_vector(&acc, dt))
}
