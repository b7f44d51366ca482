//! Laplacian smoothing of free interior vertices.

use smallvec::SmallVec;

use crate::core::delaunay::insertion::Delaunay;
use crate::core::delaunay::tet_mesh::VertexKind;
use crate::core::handles::{TetId, VertexId};
use crate::geometry::point::{Point3, Vector3};

/// Fractions of the full Laplacian step tried, in order, until no incident
/// tetrahedron inverts.
const STEP_FRACTIONS: [f64; 3] = [1.0, 0.5, 0.25];

type Star = SmallVec<[TetId; 32]>;

impl Delaunay {
    /// Incident tetrahedra of every vertex.
    fn vertex_stars(&self) -> Vec<Star> {
        let mut stars = vec![Star::new(); self.mesh.vertex_count()];
        for t in self.mesh.tets() {
            for v in self.mesh.tet_vertices(t) {
                stars[v.index()].push(t);
            }
        }
        stars
    }

    /// `true` if every tetrahedron of `star` stays positive with `v` at `p`.
    fn star_stays_positive(&self, v: VertexId, p: &Point3, star: &Star) -> bool {
        star.iter().all(|&t| {
            let verts = self.mesh.tet_vertices(t);
            let [a, b, c, d] = verts.map(|u| if u == v { *p } else { self.mesh.position(u) });
            self.ctx.orient3d(&a, &b, &c, &d) > 0.0
        })
    }

    fn smooth_vertex(&mut self, v: VertexId, star: &Star) -> bool {
        let mut sum = Vector3::zeros();
        let mut count = 0_u32;
        let mut seen: SmallVec<[VertexId; 64]> = SmallVec::new();
        for &t in star {
            for u in self.mesh.tet_vertices(t) {
                if u == v || seen.contains(&u) {
                    continue;
                }
                if self.mesh.kind(u) == VertexKind::Super {
                    return false;
                }
                seen.push(u);
                sum += self.mesh.position(u).coords;
                count += 1;
            }
        }
        if count == 0 {
            return false;
        }
        let old = self.mesh.position(v);
        let target = Point3::from(sum / f64::from(count));
        for fraction in STEP_FRACTIONS {
            let candidate = old + (target - old) * fraction;
            if candidate == old || !self.bounds().contains(&candidate) {
                continue;
            }
            if self.star_stays_positive(v, &candidate, star) {
                self.mesh.positions[v.index()] = candidate;
                self.octree.remove(&old, v);
                self.octree.insert(candidate, v);
                return true;
            }
        }
        false
    }

    /// Move every free interior vertex toward the centroid of its neighbors.
    ///
    /// Surface, layer and super vertices stay put, as do interior vertices adjacent
    /// to the super-tetrahedron. A move is halved (then quartered) if the full step
    /// would invert an incident tetrahedron, and skipped if that fails too. Connectivity
    /// is unchanged, so the result is valid but no longer necessarily Delaunay.
    ///
    /// Returns the total number of moves over all passes.
    pub fn smooth(&mut self, passes: usize) -> usize {
        let mut total = 0;
        for pass in 0..passes {
            let stars = self.vertex_stars();
            let mut moved = 0;
            for (index, star) in stars.iter().enumerate() {
                let v = VertexId::new(index);
                if self.mesh.kind(v).is_locked() || star.is_empty() {
                    continue;
                }
                if self.smooth_vertex(v, star) {
                    moved += 1;
                }
            }
            tracing::info!(pass, moved, "smoothing pass finished");
            total += moved;
            if moved == 0 {
                break;
            }
        }
        self.tracer_mut().suspend("smooth");
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::aabb::Aabb;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_smoothing_moves_free_vertices_and_keeps_orientation() {
        let bounds = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let mut engine = Delaunay::new(&bounds, 5).unwrap();
        let corners = bounds.corners();
        let report = engine.add_vertices_with_report(&corners, VertexKind::Surface, 0.0);
        assert_eq!(report.inserted, 8);

        let mut rng = StdRng::seed_from_u64(17);
        let interior: Vec<Point3> = (0..40)
            .map(|_| {
                Point3::new(
                    rng.random_range(0.2..0.8),
                    rng.random_range(0.2..0.8),
                    rng.random_range(0.2..0.8),
                )
            })
            .collect();
        assert!(engine.add_vertices(&interior, 0.0));

        let moved = engine.smooth(3);
        assert!(moved > 0);
        engine.mesh().validate_adjacency().unwrap();
        engine.mesh().validate_orientation(engine.context()).unwrap();
        for (corner, v) in corners.iter().zip(&report.vertices) {
            assert_eq!(engine.mesh().position(v.unwrap()), *corner);
        }
        // The octree follows the moved vertices.
        for v in (12..engine.mesh().vertex_count()).map(VertexId::new) {
            let p = engine.mesh().position(v);
            assert_eq!(engine.nearest_vertex(&p).map(|(u, _)| u), Some(v));
        }
    }

    #[test]
    fn test_vertices_next_to_super_corners_stay_put() {
        let bounds = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let mut engine = Delaunay::new(&bounds, 5).unwrap();
        let v = engine
            .add_vertex(Point3::new(0.3, 0.4, 0.5), VertexKind::Interior)
            .unwrap();
        assert_eq!(engine.smooth(2), 0);
        assert_eq!(engine.mesh().position(v), Point3::new(0.3, 0.4, 0.5));
    }
}
