//! The advancing front of boundary-layer extrusion.
//!
//! Every live vertex of the input surface owns a *column*: the surface vertex at
//! the bottom and one extruded vertex per layer above it. The front is the current
//! top of every column plus the surface's triangle connectivity. A column stays
//! active until its next extrusion is clipped flat by the domain, collides with existing
//! geometry, cross a surface, or produce badly shaped side quads; after that it
//! keeps its top vertex but no longer advances.

use smallvec::SmallVec;

use crate::config::ContourConfig;
use crate::core::collections::FastHashMap;
use crate::core::delaunay::insertion::Delaunay;
use crate::core::delaunay::tet_mesh::VertexKind;
use crate::core::handles::VertexId;
use crate::core::layers::generator::LayerError;
use crate::core::surface::mesh::SurfaceMesh;
use crate::geometry::aabb::Aabb;
use crate::geometry::intersect::{segment_aabb_interval, segment_triangle_intersect};
use crate::geometry::point::{Point3, Vector3, triangle_normal, try_normalize};
use crate::geometry::quality::quad_quality;
use crate::spatial::bvh::Bvh;
use crate::spatial::cell_octree::CellOctree;
use crate::spatial::point_octree::PointOctree;

/// Extrusion segments start this fraction of the layer height off the front, so
/// the column's own triangles are not reported as crossings.
const SEGMENT_START_OFFSET: f64 = 1e-6;

/// A column clipped by the domain below this fraction of its height stops.
const MIN_CLIPPED_FRACTION: f64 = 1e-3;

/// Why columns stopped advancing during one layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deactivations {
    /// No fully active triangle left around the column, or a zero normal.
    pub degenerate: usize,
    /// The domain bounds left no room for the extrusion.
    pub clipped: usize,
    /// The extruded point came too close to an existing vertex or another new point.
    pub collided: usize,
    /// The extrusion segment crossed the input surface or the current front.
    pub blocked: usize,
    /// A side quad of the column fell below the quality threshold.
    pub distorted: usize,
}

impl Deactivations {
    /// Columns stopped for any reason.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.degenerate + self.clipped + self.collided + self.blocked + self.distorted
    }
}

/// Outcome of one extruded layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStats {
    /// Zero-based layer index.
    pub index: usize,
    /// Nominal height of this layer.
    pub height: f64,
    /// Columns active when the layer started.
    pub active: usize,
    /// Columns that received a new vertex.
    pub extruded: usize,
    /// Columns that stopped.
    pub stopped: Deactivations,
    /// New vertex of each surface vertex's column, indexed like the surface vertices.
    pub vertices: Vec<Option<VertexId>>,
    /// Largest height actually used by any column.
    pub max_height: f64,
}

/// A column that passed every per-vertex test and awaits the pairwise ones.
#[derive(Debug, Clone, Copy)]
struct Extrusion {
    column: usize,
    target: Point3,
    height: f64,
}

/// Front state over a seeded surface.
#[derive(Debug, Clone)]
pub struct Front {
    positions: Vec<Point3>,
    active: Vec<bool>,
    triangles: Vec<[usize; 3]>,
    rings: Vec<SmallVec<[usize; 8]>>,
    column_of: FastHashMap<VertexId, usize>,
    normals: Vec<Vector3>,
    curvature: Vec<f64>,
    layers: usize,
}

impl Front {
    /// Insert every live surface vertex into `engine` as a [`VertexKind::Surface`]
    /// vertex and start one column per vertex.
    ///
    /// Returns the front and the engine vertex of each surface vertex.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::EmptySurface`] if `surface` has no triangles and
    /// [`LayerError::Seeding`] if any surface vertex fails to insert.
    pub fn seed(
        engine: &mut Delaunay,
        surface: &SurfaceMesh,
    ) -> Result<(Self, Vec<Option<VertexId>>), LayerError> {
        let triangles = surface.indexed_triangles();
        if triangles.is_empty() {
            return Err(LayerError::EmptySurface);
        }
        let count = surface.vertex_count();
        let live: Vec<usize> = (0..count)
            .filter(|&v| surface.is_vertex_live(VertexId::new(v)))
            .collect();
        let points: Vec<Point3> = live.iter().map(|&v| surface.positions()[v]).collect();
        let report = engine.add_vertices_with_report(&points, VertexKind::Surface, 0.0);
        if !report.is_success() {
            return Err(LayerError::Seeding {
                failed: report.failed,
            });
        }

        let mut seeded = vec![None; count];
        let mut column_of = FastHashMap::default();
        for (&v, &id) in live.iter().zip(&report.vertices) {
            seeded[v] = id;
            if let Some(id) = id {
                column_of.insert(id, v);
            }
        }
        let rings = (0..count)
            .map(|v| {
                if seeded[v].is_none() {
                    return SmallVec::new();
                }
                surface
                    .one_ring(VertexId::new(v))
                    .iter()
                    .map(|u| u.index())
                    .collect()
            })
            .collect();
        tracing::debug!(vertices = live.len(), triangles = triangles.len(), "seeded front");

        let front = Self {
            positions: surface.positions().to_vec(),
            active: seeded.iter().map(Option::is_some).collect(),
            triangles,
            rings,
            column_of,
            normals: vec![Vector3::zeros(); count],
            curvature: vec![0.0; count],
            layers: 0,
        };
        Ok((front, seeded))
    }

    /// Number of columns still advancing.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    /// `true` if column `v` is still advancing.
    #[must_use]
    pub fn is_active(&self, v: usize) -> bool {
        self.active.get(v).copied().unwrap_or(false)
    }

    /// Current top of column `v`.
    #[must_use]
    pub fn position(&self, v: usize) -> Point3 {
        self.positions[v]
    }

    /// Accumulated unit extrusion direction of column `v` from the last layer.
    #[must_use]
    pub fn normal(&self, v: usize) -> Vector3 {
        self.normals[v]
    }

    /// Signed curvature estimate of column `v` from the last layer (positive = concave).
    #[must_use]
    pub fn curvature(&self, v: usize) -> f64 {
        self.curvature[v]
    }

    /// Layers extruded so far.
    #[must_use]
    pub const fn layer_count(&self) -> usize {
        self.layers
    }

    /// Triangles whose three columns are all active, at their current tops.
    pub fn active_triangles(&self) -> impl Iterator<Item = [Point3; 3]> + '_ {
        self.triangles
            .iter()
            .filter(|tri| tri.iter().all(|&v| self.active[v]))
            .map(|tri| tri.map(|v| self.positions[v]))
    }

    /// Recompute area-weighted normals and curvature over the active front.
    fn accumulate(&mut self) {
        self.normals.iter_mut().for_each(|n| *n = Vector3::zeros());
        self.curvature.iter_mut().for_each(|k| *k = 0.0);
        for tri in &self.triangles {
            if !tri.iter().all(|&v| self.active[v]) {
                continue;
            }
            let [a, b, c] = tri.map(|v| self.positions[v]);
            let n = triangle_normal(&a, &b, &c);
            for &v in tri {
                self.normals[v] += n;
            }
        }
        for v in 0..self.normals.len() {
            self.normals[v] = try_normalize(&self.normals[v]).unwrap_or_else(Vector3::zeros);
        }

        for v in 0..self.positions.len() {
            if !self.active[v] {
                continue;
            }
            let p = self.positions[v];
            let n = self.normals[v];
            let mut sum = 0.0;
            let mut count = 0_u32;
            for &u in &self.rings[v] {
                if !self.active[u] {
                    continue;
                }
                let d = self.positions[u] - p;
                let len_sq = d.norm_squared();
                if len_sq > 0.0 {
                    sum += n.dot(&d) / len_sq;
                    count += 1;
                }
            }
            if count > 0 {
                self.curvature[v] = sum / f64::from(count);
            }
        }
    }

    /// Height of column `v` for a layer of nominal height `height`.
    fn column_height(&self, v: usize, height: f64, config: &ContourConfig) -> f64 {
        let scale = 1.0 - config.curvature_weight * self.curvature[v] * height;
        (height * scale).clamp(0.25 * height, 2.0 * height)
    }

    /// Worst side-quad quality of column `v` against its neighbors' extrusions.
    fn worst_side_quad(&self, v: usize, targets: &[Option<Point3>]) -> f64 {
        let Some(top) = targets[v] else {
            return 0.0;
        };
        self.rings[v]
            .iter()
            .filter_map(|&u| targets[u].map(|t| (u, t)))
            .map(|(u, t)| quad_quality(&self.positions[v], &self.positions[u], &t, &top))
            .fold(1.0, f64::min)
    }

    /// Step of column `v` along its normal, shortened to stay inside `bounds`.
    ///
    /// Returns `None` when the domain leaves less than [`MIN_CLIPPED_FRACTION`] of
    /// `height`, or the column already lies outside it.
    fn clipped_step(&self, v: usize, height: f64, bounds: &Aabb) -> Option<(Point3, f64)> {
        let p = self.positions[v];
        let target = p + self.normals[v] * height;
        if bounds.contains(&target) {
            return Some((target, height));
        }
        let (t0, t1) = segment_aabb_interval(&p, &target, bounds)?;
        let clipped = height * t1;
        if t0 > 0.0 || clipped < MIN_CLIPPED_FRACTION * height {
            return None;
        }
        Some((bounds.clamp(&(p + self.normals[v] * clipped)), clipped))
    }

    fn front_index(&self, bounds: &Aabb) -> CellOctree<usize> {
        let mut index = CellOctree::new(*bounds);
        for (t, tri) in self.triangles.iter().enumerate() {
            if tri.iter().all(|&v| self.active[v]) {
                let [a, b, c] = tri.map(|v| self.positions[v]);
                index.insert(Aabb::from_triangle(&a, &b, &c), t);
            }
        }
        index
    }

    fn crosses_front(&self, index: &CellOctree<usize>, v: usize, a: &Point3, b: &Point3) -> bool {
        let mut hits = Vec::new();
        index.query_segment(a, b, &mut hits);
        hits.into_iter().any(|t| {
            let tri = self.triangles[t];
            if tri.contains(&v) {
                return false;
            }
            let [p, q, r] = tri.map(|u| self.positions[u]);
            segment_triangle_intersect(a, b, &p, &q, &r).is_some()
        })
    }

    /// Extrude every active column by one layer of nominal height `height` and insert
    /// the new points into `engine` as [`VertexKind::Layer`] vertices.
    ///
    /// `solid` is the input surface; extrusions crossing it stop their column.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Insertion`] if any new point fails to insert. Points
    /// inserted before the failure stay in the engine.
    pub fn advance(
        &mut self,
        engine: &mut Delaunay,
        solid: Option<&Bvh>,
        config: &ContourConfig,
        height: f64,
    ) -> Result<LayerStats, LayerError> {
        let index = self.layers;
        let active = self.active_count();
        let mut stopped = Deactivations::default();
        self.accumulate();

        let bounds = *engine.bounds();
        let mut candidates: Vec<Extrusion> = Vec::with_capacity(active);
        let mut targets: Vec<Option<Point3>> = vec![None; self.positions.len()];
        for v in 0..self.positions.len() {
            if !self.active[v] {
                continue;
            }
            if self.normals[v] == Vector3::zeros() {
                stopped.degenerate += 1;
                self.active[v] = false;
                continue;
            }
            let nominal = self.column_height(v, height, config);
            let Some((target, h)) = self.clipped_step(v, nominal, &bounds) else {
                stopped.clipped += 1;
                self.active[v] = false;
                continue;
            };
            targets[v] = Some(target);
            candidates.push(Extrusion {
                column: v,
                target,
                height: h,
            });
        }

        let index_bounds = bounds.padded(bounds.diagonal() * 0.5);
        let front_index = self.front_index(&index_bounds);
        let mut pending = PointOctree::new(index_bounds);
        for c in &candidates {
            pending.insert(c.target, c.column);
        }

        let mut accepted: Vec<Extrusion> = Vec::with_capacity(candidates.len());
        for c in candidates {
            let v = c.column;
            let radius = config.collision_factor * c.height;
            let start = self.positions[v] + self.normals[v] * (SEGMENT_START_OFFSET * c.height);
            let verdict = if engine
                .octree
                .any_within(&c.target, radius, |u| self.column_of.get(&u) != Some(&v))
                || pending.any_within(&c.target, radius, |u| u != v)
            {
                &mut stopped.collided
            } else if solid.is_some_and(|bvh| bvh.segment_hit(&start, &c.target).is_some())
                || self.crosses_front(&front_index, v, &start, &c.target)
            {
                &mut stopped.blocked
            } else if self.worst_side_quad(v, &targets) < config.min_quad_quality {
                &mut stopped.distorted
            } else {
                accepted.push(c);
                continue;
            };
            *verdict += 1;
            self.active[v] = false;
        }

        let points: Vec<Point3> = accepted.iter().map(|c| c.target).collect();
        let report = engine.add_vertices_with_report(&points, VertexKind::Layer, 0.0);
        if !report.is_success() {
            return Err(LayerError::Insertion {
                layer: index,
                failed: report.failed,
            });
        }

        let mut vertices = vec![None; self.positions.len()];
        let mut max_height = 0.0_f64;
        for (c, id) in accepted.iter().zip(&report.vertices) {
            if let Some(id) = *id {
                self.positions[c.column] = c.target;
                self.column_of.insert(id, c.column);
                vertices[c.column] = Some(id);
                max_height = max_height.max(c.height);
            }
        }
        self.layers += 1;

        let stats = LayerStats {
            index,
            height,
            active,
            extruded: report.inserted,
            stopped,
            vertices,
            max_height,
        };
        tracing::info!(
            layer = index,
            height,
            active,
            extruded = stats.extruded,
            stopped = stopped.total(),
            "contour layer extruded"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::surface::primitives::planar_grid;
    use approx::assert_relative_eq;

    fn engine_for(surface: &SurfaceMesh, pad: f64) -> Delaunay {
        Delaunay::new(&surface.aabb().padded(pad), 3).unwrap()
    }

    fn config(height_weight: f64) -> ContourConfig {
        ContourConfig {
            layers: 1,
            initial_height: 0.5,
            growth: 1.0,
            curvature_weight: height_weight,
            min_quad_quality: 0.0,
            collision_factor: 0.25,
        }
    }

    #[test]
    fn test_flat_front_extrudes_straight_up() {
        let surface = planar_grid(4, 4, 1.0).unwrap();
        let mut engine = engine_for(&surface, 2.0);
        let (mut front, seeded) = Front::seed(&mut engine, &surface).unwrap();
        assert_eq!(seeded.iter().flatten().count(), 25);

        let stats = front.advance(&mut engine, None, &config(1.0), 0.5).unwrap();
        assert_eq!(stats.extruded, 25);
        assert_eq!(stats.stopped.total(), 0);
        for v in 0..25 {
            assert_relative_eq!(front.normal(v), Vector3::z(), epsilon = 1e-12);
            assert_relative_eq!(front.curvature(v), 0.0, epsilon = 1e-12);
            let p = surface.positions()[v] + Vector3::new(0.0, 0.0, 0.5);
            assert_relative_eq!(front.position(v), p, epsilon = 1e-12);
            let id = stats.vertices[v].unwrap();
            assert_eq!(engine.mesh().kind(id), VertexKind::Layer);
        }
        assert_eq!(front.layer_count(), 1);
        engine.mesh().validate_adjacency().unwrap();
    }

    #[test]
    fn test_columns_are_clipped_to_the_domain() {
        let surface = planar_grid(2, 2, 1.0).unwrap();
        // The domain ends 0.1 above the surface.
        let bounds = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(3.0, 3.0, 0.1));
        let mut engine = Delaunay::new(&bounds, 3).unwrap();
        let (mut front, _) = Front::seed(&mut engine, &surface).unwrap();

        let stats = front.advance(&mut engine, None, &config(0.0), 0.5).unwrap();
        assert_eq!(stats.extruded, 9);
        assert_eq!(stats.stopped.total(), 0);
        assert_relative_eq!(stats.max_height, 0.1, epsilon = 1e-12);
        for v in 0..9 {
            let p = surface.positions()[v] + Vector3::new(0.0, 0.0, 0.1);
            assert_relative_eq!(front.position(v), p, epsilon = 1e-12);
            assert!(bounds.contains(&front.position(v)));
        }

        // Flush against the domain face there is no room left.
        let stats = front.advance(&mut engine, None, &config(0.0), 0.5).unwrap();
        assert_eq!(stats.extruded, 0);
        assert_eq!(stats.stopped.clipped, 9);
        assert_eq!(front.active_count(), 0);
        engine.mesh().validate_adjacency().unwrap();
    }

    #[test]
    fn test_folded_side_quads_stop_columns() {
        let surface = planar_grid(2, 2, 1.0).unwrap();
        let mut engine = engine_for(&surface, 2.0);
        let (mut front, _) = Front::seed(&mut engine, &surface).unwrap();
        let mut strict = config(0.0);
        strict.min_quad_quality = 0.9;
        // Side quads of a 0.5 layer over unit edges have corner sines of 1.
        let stats = front.advance(&mut engine, None, &strict, 0.5).unwrap();
        assert_eq!(stats.stopped.distorted, 0);
        assert_eq!(stats.extruded, 9);

        let mut impossible = config(0.0);
        impossible.min_quad_quality = 1.0 + 1e-9;
        let stats = front.advance(&mut engine, None, &impossible, 0.5).unwrap();
        assert_eq!(stats.stopped.distorted, 9);
        assert_eq!(stats.extruded, 0);
    }

    #[test]
    fn test_curvature_is_positive_in_a_valley() {
        // A V-shaped valley along the y axis: the center column is concave.
        let positions = vec![
            Point3::new(-1.0, 0.0, 1.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 1.0),
            Point3::new(-1.0, 1.0, 1.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
        ];
        let triangles = [[0, 1, 4], [0, 4, 3], [1, 2, 5], [1, 5, 4]];
        let surface = SurfaceMesh::from_triangles(positions, &triangles).unwrap();
        let mut engine = engine_for(&surface, 2.0);
        let (mut front, _) = Front::seed(&mut engine, &surface).unwrap();
        let weighted = config(1.0);
        let stats = front.advance(&mut engine, None, &weighted, 0.5).unwrap();
        assert!(front.curvature(1) > 0.0);
        assert!(stats.vertices[1].is_some());
        // Concave columns extrude less than the nominal height.
        let rise = front.position(1) - surface.positions()[1];
        assert!(rise.norm() < 0.5);
        assert!(rise.norm() >= 0.125);
    }
}
