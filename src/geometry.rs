use serde::{Deserialize, Serialize};

use crate::error::{FluidError, Result};

/// Closed set of shapes used by obstacles and effects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    /// Axis-aligned box, both corners inclusive.
    Box { lower: Vec<f64>, upper: Vec<f64> },
    Sphere { center: Vec<f64>, radius: f64 },
    Union(Vec<Geometry>),
}

impl Geometry {
    pub fn contains(&self, point: &[f64]) -> bool {
        match self {
            Geometry::Box { lower, upper } => point
                .iter()
                .zip(lower.iter().zip(upper.iter()))
                .all(|(p, (lo, hi))| *p >= *lo && *p <= *hi),
            Geometry::Sphere { center, radius } => {
                let dist_sq: f64 = point
                    .iter()
                    .zip(center.iter())
                    .map(|(p, c)| (p - c) * (p - c))
                    .sum();
                dist_sq <= radius * radius
            }
            Geometry::Union(parts) => parts.iter().any(|part| part.contains(point)),
        }
    }

    /// Rotation center; for unions the mean of the parts' centers.
    pub fn center(&self) -> Vec<f64> {
        match self {
            Geometry::Box { lower, upper } => lower
                .iter()
                .zip(upper.iter())
                .map(|(lo, hi)| 0.5 * (lo + hi))
                .collect(),
            Geometry::Sphere { center, .. } => center.clone(),
            Geometry::Union(parts) => {
                let centers: Vec<Vec<f64>> = parts.iter().map(Geometry::center).collect();
                let Some(first) = centers.first() else {
                    return Vec::new();
                };
                let mut mean = vec![0.0; first.len()];
                for center in &centers {
                    for (m, c) in mean.iter_mut().zip(center.iter()) {
                        *m += c / centers.len() as f64;
                    }
                }
                mean
            }
        }
    }

    pub fn rank(&self) -> Option<usize> {
        match self {
            Geometry::Box { lower, .. } => Some(lower.len()),
            Geometry::Sphere { center, .. } => Some(center.len()),
            Geometry::Union(parts) => parts.iter().find_map(Geometry::rank),
        }
    }

    pub(crate) fn ensure_rank(&self, context: &'static str, rank: usize) -> Result<()> {
        match self {
            Geometry::Box { lower, upper } => {
                if lower.len() != rank || upper.len() != rank {
                    return Err(FluidError::shape(context, &[rank, rank], &[lower.len(), upper.len()]));
                }
            }
            Geometry::Sphere { center, .. } => {
                if center.len() != rank {
                    return Err(FluidError::shape(context, &[rank], &[center.len()]));
                }
            }
            Geometry::Union(parts) => {
                for part in parts {
                    part.ensure_rank(context, rank)?;
                }
            }
        }
        Ok(())
    }
}

/// Solid body inside the domain. Moving obstacles impose their rigid velocity on the faces
/// they touch.
#[derive(Clone, Debug, PartialEq)]
pub struct Obstacle {
    pub geometry: Geometry,
    pub stationary: bool,
    pub velocity: Vec<f64>,
    /// One entry in 2-D (about the normal axis), three in 3-D, empty for none.
    pub angular_velocity: Vec<f64>,
}

impl Obstacle {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            stationary: true,
            velocity: Vec::new(),
            angular_velocity: Vec::new(),
        }
    }

    pub fn with_velocity(mut self, velocity: &[f64]) -> Self {
        self.velocity = velocity.to_vec();
        self.stationary = false;
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: &[f64]) -> Self {
        self.angular_velocity = angular_velocity.to_vec();
        self.stationary = false;
        self
    }

    pub(crate) fn validate(&self, rank: usize) -> Result<()> {
        self.geometry.ensure_rank("Obstacle::geometry", rank)?;
        if !self.velocity.is_empty() && self.velocity.len() != rank {
            return Err(FluidError::shape("Obstacle::velocity", &[rank], &[self.velocity.len()]));
        }
        let angular = match rank {
            2 => 1,
            3 => 3,
            _ => 0,
        };
        if !self.angular_velocity.is_empty() && self.angular_velocity.len() != angular {
            return Err(FluidError::shape(
                "Obstacle::angular_velocity",
                &[angular],
                &[self.angular_velocity.len()],
            ));
        }
        Ok(())
    }

    /// Component `axis` of `linear + ω × (point - center)`.
    pub fn rigid_velocity(&self, point: &[f64], axis: usize) -> f64 {
        let linear = self.velocity.get(axis).copied().unwrap_or(0.0);
        if self.angular_velocity.is_empty() {
            return linear;
        }
        let center = self.geometry.center();
        let r: Vec<f64> = point.iter().zip(center.iter()).map(|(p, c)| p - c).collect();
        let w = &self.angular_velocity;
        let spin = match (r.len(), axis) {
            (2, 0) => -w[0] * r[1],
            (2, 1) => w[0] * r[0],
            (3, 0) => w[1] * r[2] - w[2] * r[1],
            (3, 1) => w[2] * r[0] - w[0] * r[2],
            (3, 2) => w[0] * r[1] - w[1] * r[0],
            _ => 0.0,
        };
        linear + spin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() <= tol,
            "expected {a} to be within {tol} of {b}"
        );
    }

    #[test]
    fn box_contains_its_faces() {
        let shape = Geometry::Box {
            lower: vec![1.0, 1.0],
            upper: vec![2.0, 3.0],
        };
        assert!(shape.contains(&[1.0, 3.0]));
        assert!(shape.contains(&[1.5, 2.0]));
        assert!(!shape.contains(&[2.01, 2.0]));
        assert_eq!(shape.center(), vec![1.5, 2.0]);
    }

    #[test]
    fn union_contains_any_part() {
        let shape = Geometry::Union(vec![
            Geometry::Sphere {
                center: vec![0.0, 0.0],
                radius: 1.0,
            },
            Geometry::Sphere {
                center: vec![4.0, 0.0],
                radius: 1.0,
            },
        ]);
        assert!(shape.contains(&[4.5, 0.0]));
        assert!(!shape.contains(&[2.0, 0.0]));
        assert_eq!(shape.center(), vec![2.0, 0.0]);
    }

    #[test]
    fn rotation_is_perpendicular_to_radius() {
        let obstacle = Obstacle::new(Geometry::Sphere {
            center: vec![1.0, 1.0],
            radius: 1.0,
        })
        .with_angular_velocity(&[2.0]);
        assert!(!obstacle.stationary);
        assert_close(obstacle.rigid_velocity(&[2.0, 1.0], 0), 0.0, 1e-12);
        assert_close(obstacle.rigid_velocity(&[2.0, 1.0], 1), 2.0, 1e-12);
    }

    #[test]
    fn cross_product_in_three_dimensions() {
        let obstacle = Obstacle::new(Geometry::Sphere {
            center: vec![0.0, 0.0, 0.0],
            radius: 1.0,
        })
        .with_velocity(&[1.0, 0.0, 0.0])
        .with_angular_velocity(&[0.0, 0.0, 1.0]);
        // ω = z, r = x  ->  ω × r = y
        assert_close(obstacle.rigid_velocity(&[1.0, 0.0, 0.0], 0), 1.0, 1e-12);
        assert_close(obstacle.rigid_velocity(&[1.0, 0.0, 0.0], 1), 1.0, 1e-12);
    }

    #[test]
    fn validate_rejects_wrong_angular_length() {
        let obstacle = Obstacle::new(Geometry::Sphere {
            center: vec![0.0, 0.0],
            radius: 1.0,
        })
        .with_angular_velocity(&[0.0, 0.0, 1.0]);
        assert!(matches!(
            obstacle.validate(2),
            Err(FluidError::ShapeMismatch { .. })
        ));
    }
}
