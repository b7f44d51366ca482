//! Mesh-generation parameters.
//!
//! All configuration is plain data: serializable with `serde` (missing fields fall
//! back to their defaults) and buildable with `derive_builder`.
//!
//! ```rust
//! use volmesh::config::{ContourConfigBuilder, DomainConfigBuilder};
//! use volmesh::geometry::aabb::Aabb;
//! use volmesh::geometry::point::Point3;
//!
//! let contour = ContourConfigBuilder::default()
//!     .layers(4)
//!     .initial_height(0.02)
//!     .build()
//!     .unwrap();
//! let config = DomainConfigBuilder::default()
//!     .bounds(Aabb::new(Point3::new(-2.0, -2.0, -2.0), Point3::new(2.0, 2.0, 2.0)))
//!     .contour(contour)
//!     .build()
//!     .unwrap();
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::aabb::Aabb;
use crate::geometry::point::Point3;

/// A rejected configuration value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// The domain box is empty, flat or not finite.
    #[error("Domain bounds {bounds:?} are empty, flat or not finite")]
    InvalidBounds {
        /// The rejected bounds.
        bounds: Aabb,
    },

    /// A length or ratio that must be strictly positive is not.
    #[error("{field} must be positive and finite, got {value}")]
    NotPositive {
        /// Name of the offending field.
        field: &'static str,
        /// Its value.
        value: f64,
    },

    /// Layer heights would shrink.
    #[error("Contour growth must be at least 1, got {growth}")]
    GrowthBelowOne {
        /// The rejected growth factor.
        growth: f64,
    },

    /// A value outside its closed range.
    #[error("{field} must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Its value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
}

/// Boundary-layer ("contour") extrusion parameters.
#[derive(Builder, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[builder(default)]
#[serde(default)]
pub struct ContourConfig {
    /// Number of layers to extrude.
    pub layers: usize,
    /// Height of the first layer.
    pub initial_height: f64,
    /// Factor applied to the height after each layer.
    pub growth: f64,
    /// Scales the curvature correction of per-vertex heights; 0 extrudes uniformly.
    pub curvature_weight: f64,
    /// A front vertex whose side quads fall below this quality stops advancing.
    pub min_quad_quality: f64,
    /// Collision radius around a new layer vertex, in multiples of its height.
    pub collision_factor: f64,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            layers: 3,
            initial_height: 0.01,
            growth: 1.2,
            curvature_weight: 1.0,
            min_quad_quality: 0.2,
            collision_factor: 0.5,
        }
    }
}

impl ContourConfig {
    /// Total thickness of all layers.
    #[must_use]
    pub fn thickness(&self) -> f64 {
        let mut height = self.initial_height;
        let mut total = 0.0;
        for _ in 0..self.layers {
            total += height;
            height *= self.growth;
        }
        total
    }
}

/// Background grid filling the domain outside the boundary layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Spacing of the finest grading band.
    pub resolution: f64,
    /// Number of grading bands; band `k` has spacing `resolution * 2^k`.
    pub layers: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            resolution: 0.1,
            layers: 3,
        }
    }
}

/// Delaunay refinement thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    /// Upper bound on refinement passes.
    pub max_passes: usize,
    /// Longest-to-shortest edge ratio above which a tetrahedron is refined.
    pub max_edge_ratio: f64,
    /// Longest edge above which a tetrahedron is refined; 0 disables the size test.
    pub target_size: f64,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            max_passes: 3,
            max_edge_ratio: 4.0,
            target_size: 0.0,
        }
    }
}

/// Everything a generation run needs besides the input surfaces.
#[derive(Builder, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[builder(default)]
#[serde(default)]
pub struct DomainConfig {
    /// The simulation domain; every input surface must fit inside.
    pub bounds: Aabb,
    /// Boundary-layer extrusion.
    pub contour: ContourConfig,
    /// Background grid.
    pub grid: GridConfig,
    /// Dihedral deviation (degrees) above which a surface edge is a feature.
    pub feature_angle_deg: f64,
    /// Triangles below this quality do not contribute feature edges.
    pub min_feature_quality: f64,
    /// Delaunay refinement.
    pub refine: RefineConfig,
    /// Laplacian smoothing passes over interior vertices.
    pub smoothing_passes: usize,
    /// Surface edges longer than this are split before extrusion; 0 disables splitting.
    pub surface_target_edge: f64,
    /// Level of detail of the input models to mesh.
    pub lod: usize,
    /// Seed for the insertion order and the point-location walk.
    pub seed: u64,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            bounds: Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)),
            contour: ContourConfig::default(),
            grid: GridConfig::default(),
            feature_angle_deg: 30.0,
            min_feature_quality: 0.1,
            refine: RefineConfig::default(),
            smoothing_passes: 2,
            surface_target_edge: 0.0,
            lod: 0,
            seed: 0,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn in_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

impl ContourConfig {
    /// Check that the extrusion parameters describe growing, positive layers.
    ///
    /// # Errors
    ///
    /// Returns the first offending field as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("contour.initial_height", self.initial_height)?;
        if !(self.growth.is_finite() && self.growth >= 1.0) {
            return Err(ConfigError::GrowthBelowOne {
                growth: self.growth,
            });
        }
        in_range("contour.curvature_weight", self.curvature_weight, 0.0, f64::MAX)?;
        in_range("contour.min_quad_quality", self.min_quad_quality, 0.0, 1.0)?;
        positive("contour.collision_factor", self.collision_factor)
    }
}

impl DomainConfig {
    /// Check every parameter.
    ///
    /// # Errors
    ///
    /// Returns the first offending field as a [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let extent = self.bounds.extent();
        if !self.bounds.is_valid() || extent.iter().any(|&e| !(e.is_finite() && e > 0.0)) {
            return Err(ConfigError::InvalidBounds {
                bounds: self.bounds,
            });
        }
        self.contour.validate()?;
        positive("grid.resolution", self.grid.resolution)?;
        in_range("feature_angle_deg", self.feature_angle_deg, 0.0, 180.0)?;
        in_range("min_feature_quality", self.min_feature_quality, 0.0, 1.0)?;
        positive("refine.max_edge_ratio", self.refine.max_edge_ratio)?;
        in_range("refine.target_size", self.refine.target_size, 0.0, f64::MAX)?;
        in_range("surface_target_edge", self.surface_target_edge, 0.0, f64::MAX)?;
        Ok(())
    }
}
