//! The mesh-generation pipeline.
//!
//! A [`MeshGenerator`] holds the registered input models and the domain
//! configuration. [`MeshGenerator::generate`] runs every phase in order:
//!
//! 1. validation of models and configuration,
//! 2. merging the selected level of detail of every model into one surface,
//! 3. feature-edge detection,
//! 4. surface point placement (splitting long edges, then restoring quality by flips),
//! 5. Delaunay bootstrap, surface seeding and boundary-layer extrusion,
//! 6. the background grid,
//! 7. Delaunay refinement and smoothing,
//! 8. completion into a [`CfdVolume`].
//!
//! A failure before the Delaunay bootstrap produces no mesh at all. A failed
//! layer phase leaves the engine consistent, so the error carries the volume
//! completed from whatever was inserted up to that point.

use std::fmt;

use ordered_float::OrderedFloat;
use thiserror::Error;

use crate::config::{ConfigError, DomainConfig};
use crate::core::delaunay::insertion::{Delaunay, InsertionError};
use crate::core::handles::{StableEdgeId, VertexId};
use crate::core::layers::generator::{LayerError, LayerReport, generate_n_layers};
use crate::core::surface::mesh::{SurfaceMesh, SurfaceMeshError};
use crate::core::surface::stable::EdgeFlags;
use crate::geometry::aabb::Aabb;
use crate::geometry::point::Point3;
use crate::geometry::quality::triangle_quality;
use crate::spatial::bvh::Bvh;
use crate::trace::{MeshTracer, NoopTracer};
use crate::volume::CfdVolume;

/// Upper bound on edge-splitting sweeps during surface point placement.
const MAX_SPLIT_ROUNDS: usize = 16;

/// Flips allowed per seed triangle when restoring surface quality.
const FLIPS_PER_SEED: usize = 64;

/// Failure of a generation run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeshGenError {
    /// No model (or no level of detail with triangles) is registered.
    #[error("No input mesh to generate from")]
    NoInputMesh,

    /// No domain configuration is set.
    #[error("No domain configured")]
    NoDomain,

    /// The domain configuration is invalid.
    #[error("Invalid domain configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// A model does not fit inside the domain.
    #[error("Model {model_id} with bounds {bounds:?} exceeds the domain {domain:?}")]
    MeshOutsideDomain {
        /// Offending model.
        model_id: u64,
        /// Its bounds.
        bounds: Aabb,
        /// The domain bounds.
        domain: Aabb,
    },

    /// The merged input surface could not be built.
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceMeshError),

    /// Boundary-layer generation failed.
    #[error("Layer generation failed: {source}")]
    Layer {
        /// The layer failure.
        source: LayerError,
        /// Volume completed from the vertices inserted before the failure.
        partial: Box<CfdVolume>,
    },

    /// The Delaunay engine could not be bootstrapped.
    #[error("Delaunay engine error: {0}")]
    Insertion(#[from] InsertionError),
}

/// A registered input model: an id and its surfaces, finest level of detail first.
#[derive(Debug, Clone, PartialEq)]
pub struct InputModel {
    /// Caller-chosen identifier, reported back in errors.
    pub id: u64,
    /// Surface per level of detail.
    pub lods: Vec<SurfaceMesh>,
}

impl InputModel {
    /// Model with the given levels of detail.
    #[must_use]
    pub const fn new(id: u64, lods: Vec<SurfaceMesh>) -> Self {
        Self { id, lods }
    }

    /// Surface for `lod`, falling back to the coarsest available one.
    #[must_use]
    pub fn lod(&self, lod: usize) -> Option<&SurfaceMesh> {
        self.lods.get(lod).or_else(|| self.lods.last())
    }
}

/// Everything a successful run produces.
#[derive(Debug, Clone)]
pub struct GeneratedMesh {
    /// The volume mesh.
    pub volume: CfdVolume,
    /// The merged input surface after point placement.
    pub surface: SurfaceMesh,
    /// Boundary-layer and background-grid outcome.
    pub layers: LayerReport,
    /// Feature edges detected on the merged surface.
    pub feature_edges: usize,
    /// Surface edges split during point placement.
    pub surface_splits: usize,
    /// Vertices inserted by refinement.
    pub refined: usize,
    /// Vertex moves made by smoothing.
    pub smoothed: usize,
}

/// Volume-mesh generator over registered input models.
pub struct MeshGenerator {
    models: Vec<InputModel>,
    domain: Option<DomainConfig>,
    tracer: Box<dyn MeshTracer>,
}

impl fmt::Debug for MeshGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshGenerator")
            .field("models", &self.models.iter().map(|m| m.id).collect::<Vec<_>>())
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

impl Default for MeshGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshGenerator {
    /// Generator with no models and no domain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            models: Vec::new(),
            domain: None,
            tracer: Box::new(NoopTracer),
        }
    }

    /// Replace the debug tracer handed to every run.
    #[must_use]
    pub fn with_tracer(mut self, tracer: Box<dyn MeshTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Register `model`, replacing any model with the same id.
    pub fn add_model(&mut self, model: InputModel) {
        if let Some(slot) = self.models.iter_mut().find(|m| m.id == model.id) {
            *slot = model;
        } else {
            self.models.push(model);
        }
    }

    /// Unregister the model with `id`.
    pub fn remove_model(&mut self, id: u64) -> Option<InputModel> {
        let index = self.models.iter().position(|m| m.id == id)?;
        Some(self.models.remove(index))
    }

    /// Registered models.
    #[must_use]
    pub fn models(&self) -> &[InputModel] {
        &self.models
    }

    /// Set the domain configuration.
    pub fn set_domain(&mut self, config: DomainConfig) {
        self.domain = Some(config);
    }

    /// The domain configuration, if set.
    #[must_use]
    pub const fn domain(&self) -> Option<&DomainConfig> {
        self.domain.as_ref()
    }

    /// Selected surfaces of every model, checked against the domain.
    fn select_surfaces(&self, config: &DomainConfig) -> Result<Vec<&SurfaceMesh>, MeshGenError> {
        let mut surfaces = Vec::with_capacity(self.models.len());
        for model in &self.models {
            let Some(surface) = model.lod(config.lod) else {
                continue;
            };
            let bounds = surface.aabb();
            if bounds.is_empty() {
                continue;
            }
            if !config.bounds.contains_aabb(&bounds) {
                return Err(MeshGenError::MeshOutsideDomain {
                    model_id: model.id,
                    bounds,
                    domain: config.bounds,
                });
            }
            surfaces.push(surface);
        }
        if surfaces.is_empty() {
            return Err(MeshGenError::NoInputMesh);
        }
        Ok(surfaces)
    }

    /// Run the whole pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`MeshGenError::NoInputMesh`] / [`MeshGenError::NoDomain`] when nothing
    /// can be meshed, [`MeshGenError::MeshOutsideDomain`] naming the first model that
    /// does not fit, and the wrapped error of any phase that fails. A
    /// [`MeshGenError::Layer`] carries the partially generated volume.
    pub fn generate(&mut self) -> Result<GeneratedMesh, MeshGenError> {
        if self.models.is_empty() {
            return Err(MeshGenError::NoInputMesh);
        }
        let config = self.domain.clone().ok_or(MeshGenError::NoDomain)?;
        config.validate()?;

        let mut surface = merge_surfaces(&self.select_surfaces(&config)?)?;
        let feature_edges = detect_features(&mut surface, &config);
        let surface_splits = place_surface_points(&mut surface, config.surface_target_edge);
        tracing::info!(
            vertices = surface.vertex_count(),
            triangles = surface.triangle_count(),
            feature_edges,
            surface_splits,
            "input surface prepared"
        );

        let tracer = std::mem::replace(&mut self.tracer, Box::new(NoopTracer));
        let mut engine = match Delaunay::new(&config.bounds, config.seed) {
            Ok(engine) => engine.with_tracer(tracer),
            Err(err) => {
                self.tracer = tracer;
                return Err(err.into());
            }
        };
        let result = run_volume_phases(&mut engine, &surface, &config);
        self.tracer = engine.take_tracer();
        let (layers, refined, smoothed, volume) = result?;

        Ok(GeneratedMesh {
            volume,
            surface,
            layers,
            feature_edges,
            surface_splits,
            refined,
            smoothed,
        })
    }
}

fn run_volume_phases(
    engine: &mut Delaunay,
    surface: &SurfaceMesh,
    config: &DomainConfig,
) -> Result<(LayerReport, usize, usize, CfdVolume), MeshGenError> {
    let solid = surface
        .is_closed()
        .then(|| Bvh::from_indexed(surface.positions(), &surface.indexed_triangles()));
    let layers = match generate_n_layers(engine, surface, &config.contour, &config.grid) {
        Ok(layers) => layers,
        Err(source) => {
            let partial = engine.complete(solid.as_ref());
            tracing::warn!(
                %source,
                cells = partial.cell_count(),
                "layer generation failed, returning the partial volume"
            );
            return Err(MeshGenError::Layer {
                source,
                partial: Box::new(partial),
            });
        }
    };
    let refined = engine.refine(&config.refine);
    let smoothed = engine.smooth(config.smoothing_passes);
    let volume = engine.complete(solid.as_ref());
    Ok((layers, refined, smoothed, volume))
}

/// Concatenate surfaces into one mesh, keeping their feature marks.
///
/// # Errors
///
/// Returns a [`SurfaceMeshError`] if the combined triangle set is not a valid
/// manifold (it cannot be if the inputs are, since their vertices are disjoint).
pub fn merge_surfaces(surfaces: &[&SurfaceMesh]) -> Result<SurfaceMesh, SurfaceMeshError> {
    let mut positions: Vec<Point3> = Vec::new();
    let mut triangles: Vec<[usize; 3]> = Vec::new();
    let mut features: Vec<(usize, usize)> = Vec::new();
    for surface in surfaces {
        let offset = positions.len();
        positions.extend_from_slice(surface.positions());
        triangles.extend(
            surface
                .indexed_triangles()
                .into_iter()
                .map(|tri| tri.map(|v| v + offset)),
        );
        features.extend(
            surface
                .edges_with(EdgeFlags::FEATURE)
                .filter_map(|id| surface.edge_of(id))
                .map(|e| {
                    let (a, b) = surface.edge_vertices(e);
                    (a.index() + offset, b.index() + offset)
                }),
        );
    }
    let mut merged = SurfaceMesh::from_triangles(positions, &triangles)?;
    for (a, b) in features {
        if let Some(e) = merged.find_edge(VertexId::new(a), VertexId::new(b)) {
            let id = merged.stable_id(e);
            merged.mark_edge(id, EdgeFlags::FEATURE);
        }
    }
    Ok(merged)
}

/// Mark feature edges, then drop marks that only come from sliver triangles.
///
/// Returns the number of feature edges on the surface afterwards.
fn detect_features(surface: &mut SurfaceMesh, config: &DomainConfig) -> usize {
    surface.detect_feature_edges(config.feature_angle_deg);
    let slivers: Vec<StableEdgeId> = surface
        .edges_with(EdgeFlags::FEATURE)
        .filter(|&id| {
            surface.edge_of(id).is_some_and(|e| {
                [e, surface.twin(e)]
                    .into_iter()
                    .filter(|h| h.is_some())
                    .any(|h| {
                        let [a, b, c] = surface.tri_points(h.tri());
                        triangle_quality(&a, &b, &c) < config.min_feature_quality
                    })
            })
        })
        .collect();
    for &id in &slivers {
        surface.unmark_edge(id, EdgeFlags::FEATURE);
    }
    if !slivers.is_empty() {
        tracing::debug!(dropped = slivers.len(), "dropped feature marks on slivers");
    }
    surface.edges_with(EdgeFlags::FEATURE).count()
}

/// Split every edge longer than `target` at its midpoint until none is left, then
/// flip non-Delaunay edges back into shape.
///
/// Border and feature edges are split without flipping so their marks stay on the
/// two halves. Returns the number of splits; `target <= 0` disables placement.
pub fn place_surface_points(surface: &mut SurfaceMesh, target: f64) -> usize {
    if target <= 0.0 || !target.is_finite() {
        return 0;
    }
    let protected = EdgeFlags::BOUNDARY.union(EdgeFlags::FEATURE);
    let mut splits = 0;
    for _ in 0..MAX_SPLIT_ROUNDS {
        let mut long: Vec<(StableEdgeId, f64)> = surface
            .triangles()
            .flat_map(|t| (0..3).map(move |i| t.edge(i)))
            .filter(|&e| {
                let twin = surface.twin(e);
                twin.is_none() || e.index() < twin.index()
            })
            .map(|e| (surface.stable_id(e), surface.edge_length(e)))
            .filter(|&(_, len)| len > target)
            .collect();
        if long.is_empty() {
            break;
        }
        long.sort_by_key(|&(_, len)| std::cmp::Reverse(OrderedFloat(len)));

        let mut round = 0;
        for (id, _) in long {
            let Some(e) = surface.edge_of(id) else {
                continue;
            };
            if surface.edge_length(e) <= target {
                continue;
            }
            let (a, b) = surface.edge_vertices(e);
            let mid = Point3::from((surface.position(a).coords + surface.position(b).coords) * 0.5);
            let split = if surface.edge_flags(id).intersects(protected) {
                surface.split_edge(e, mid)
            } else {
                surface.split_and_flip(e, mid)
            };
            if split.is_some() {
                round += 1;
            }
        }
        splits += round;
        if round == 0 {
            break;
        }
    }

    let seeds: Vec<_> = surface.triangles().collect();
    let flips: usize = seeds
        .into_iter()
        .map(|t| surface.flip_bad_edges(t, FLIPS_PER_SEED, false))
        .sum();
    surface.compute_normals();
    tracing::debug!(splits, flips, target, "surface point placement finished");
    splits
}
