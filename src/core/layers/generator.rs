//! Boundary-layer generation: contour layers, then the background grid.

use thiserror::Error;

use crate::config::{ConfigError, ContourConfig, GridConfig};
use crate::core::delaunay::insertion::{BatchReport, Delaunay};
use crate::core::delaunay::tet_mesh::VertexKind;
use crate::core::handles::VertexId;
use crate::core::layers::background::background_points;
use crate::core::layers::front::{Front, LayerStats};
use crate::core::surface::mesh::SurfaceMesh;
use crate::spatial::bvh::Bvh;

/// Failure of a layer-generation run.
///
/// The engine keeps every vertex inserted before the failure and stays valid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayerError {
    /// The surface has no triangles to extrude.
    #[error("Cannot extrude layers from an empty surface")]
    EmptySurface,

    /// Invalid extrusion or grid parameters.
    #[error("Invalid layer configuration: {0}")]
    Config(#[from] ConfigError),

    /// Some surface vertices could not be inserted.
    #[error("{failed} surface vertices failed to insert")]
    Seeding {
        /// Number of failed vertices.
        failed: usize,
    },

    /// Some extruded points of a layer could not be inserted.
    #[error("Layer {layer}: {failed} extruded vertices failed to insert")]
    Insertion {
        /// Zero-based layer index.
        layer: usize,
        /// Number of failed vertices.
        failed: usize,
    },
}

/// Outcome of [`generate_n_layers`].
#[derive(Debug, Clone, PartialEq)]
pub struct LayerReport {
    /// Engine vertex of each surface vertex, indexed like the surface vertices.
    pub surface_vertices: Vec<Option<VertexId>>,
    /// One entry per extruded layer.
    pub layers: Vec<LayerStats>,
    /// `true` if every column stopped before the requested layer count.
    pub collapsed: bool,
    /// Distance from the surface covered by the layers.
    pub thickness: f64,
    /// Background-grid insertion outcome.
    pub grid: BatchReport,
}

impl LayerReport {
    /// Total extruded vertices over all layers.
    #[must_use]
    pub fn extruded(&self) -> usize {
        self.layers.iter().map(|l| l.extruded).sum()
    }
}

/// Seed `surface` into `engine`, extrude up to `contour.layers` boundary layers and
/// fill the rest of the domain with a graded background grid.
///
/// Layer heights start at `contour.initial_height` and grow by `contour.growth`.
/// A collapsed front (every column stopped) ends extrusion early and is not an
/// error. Background points closer than half the grid resolution to an existing
/// vertex are skipped; background insertion failures are logged and counted in
/// [`LayerReport::grid`].
///
/// # Errors
///
/// Returns a [`LayerError`] for invalid parameters, an empty surface, or when any
/// surface vertex or extruded point fails to insert.
pub fn generate_n_layers(
    engine: &mut Delaunay,
    surface: &SurfaceMesh,
    contour: &ContourConfig,
    grid: &GridConfig,
) -> Result<LayerReport, LayerError> {
    contour.validate()?;
    if !(grid.resolution.is_finite() && grid.resolution > 0.0) {
        return Err(ConfigError::NotPositive {
            field: "grid.resolution",
            value: grid.resolution,
        }
        .into());
    }

    let (mut front, surface_vertices) = Front::seed(engine, surface)?;
    let solid = Bvh::from_indexed(surface.positions(), &surface.indexed_triangles());
    let closed = surface.is_closed();

    let mut layers = Vec::with_capacity(contour.layers);
    let mut thickness = 0.0;
    let mut height = contour.initial_height;
    for _ in 0..contour.layers {
        if front.active_count() == 0 {
            break;
        }
        let stats = front.advance(engine, Some(&solid), contour, height)?;
        thickness += stats.max_height;
        layers.push(stats);

        let triangles: Vec<_> = front.active_triangles().collect();
        let tracer = engine.tracer_mut();
        for corners in &triangles {
            tracer.draw_triangle(corners);
        }
        tracer.suspend("contour layer");
        height *= contour.growth;
    }
    let collapsed = front.active_count() == 0;
    if collapsed {
        tracing::info!(layers = layers.len(), "front collapsed");
    }

    let points = background_points(engine.bounds(), &solid, closed, grid, thickness);
    let min_dist = 0.5 * grid.resolution;
    let report = engine.add_vertices_with_report(&points, VertexKind::Interior, min_dist);
    if !report.is_success() {
        tracing::warn!(failed = report.failed, "background grid insertion had failures");
    }
    engine.tracer_mut().suspend("background grid");
    tracing::info!(
        layers = layers.len(),
        thickness,
        grid_points = report.inserted,
        "layer generation finished"
    );

    Ok(LayerReport {
        surface_vertices,
        layers,
        collapsed,
        thickness,
        grid: report,
    })
}
