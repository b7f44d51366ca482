//! Delaunay refinement by circumcenter insertion.
//!
//! Each pass collects the tetrahedra that are too skewed (longest-to-shortest
//! edge ratio) or too large (longest edge against a target size) and inserts their
//! circumcenters, worst first. A circumcenter is dropped if it falls outside the
//! domain or lands within half the shortest edge of an existing vertex.

use ordered_float::OrderedFloat;

use crate::config::RefineConfig;
use crate::core::delaunay::insertion::Delaunay;
use crate::core::delaunay::tet_mesh::VertexKind;
use crate::core::handles::TetId;
use crate::geometry::point::Point3;
use crate::geometry::quality::{tet_circumcenter, tet_edge_extremes};

/// A tetrahedron selected for refinement.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    center: Point3,
    clearance: f64,
    badness: f64,
}

impl Delaunay {
    /// `true` if `t` is a real tetrahedron that refinement may split.
    ///
    /// Tetrahedra with a super corner are never refined, and neither are those
    /// spanned entirely by locked (surface or layer) vertices.
    fn is_refinable(&self, t: TetId) -> bool {
        let verts = self.mesh.tet_vertices(t);
        !self.mesh.touches_super(t) && !verts.iter().all(|&v| self.mesh.kind(v).is_locked())
    }

    fn refinement_candidates(&self, config: &RefineConfig) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = self
            .mesh
            .tets()
            .filter(|&t| self.is_refinable(t))
            .filter_map(|t| {
                let points = self.mesh.tet_points(t);
                let (shortest, longest) = tet_edge_extremes(&points);
                let ratio = if shortest > 0.0 { longest / shortest } else { f64::INFINITY };
                let skewed = ratio > config.max_edge_ratio;
                let oversized = config.target_size > 0.0 && longest > config.target_size;
                if !(skewed || oversized) {
                    return None;
                }
                let [a, b, c, d] = points;
                let center = tet_circumcenter(&a, &b, &c, &d)?;
                let badness = if oversized && config.target_size > 0.0 {
                    ratio.max(longest / config.target_size)
                } else {
                    ratio
                };
                Some(Candidate {
                    center,
                    clearance: 0.5 * shortest,
                    badness,
                })
            })
            .collect();
        candidates.sort_by_key(|c| std::cmp::Reverse(OrderedFloat(c.badness)));
        candidates
    }

    /// Refine the mesh for at most `config.max_passes` passes.
    ///
    /// Returns the number of vertices inserted. Stops early once a pass inserts
    /// nothing. A circumcenter whose insertion fails is skipped.
    pub fn refine(&mut self, config: &RefineConfig) -> usize {
        let mut total = 0;
        for pass in 0..config.max_passes {
            let candidates = self.refinement_candidates(config);
            let mut inserted = 0;
            for candidate in &candidates {
                if !self.bounds().contains(&candidate.center)
                    || self.has_vertex_within(&candidate.center, candidate.clearance)
                {
                    continue;
                }
                match self.add_vertex(candidate.center, VertexKind::Interior) {
                    Ok(_) => inserted += 1,
                    Err(err) => tracing::debug!(%err, "refinement point rejected"),
                }
            }
            tracing::info!(
                pass,
                candidates = candidates.len(),
                inserted,
                "refinement pass finished"
            );
            total += inserted;
            if inserted == 0 {
                break;
            }
        }
        self.tracer_mut().suspend("refine");
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::aabb::Aabb;

    fn cube_corners() -> Vec<Point3> {
        Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0))
            .corners()
            .to_vec()
    }

    fn cube_engine(kind: VertexKind) -> Delaunay {
        let bounds = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let mut engine = Delaunay::new(&bounds, 11).unwrap();
        let report = engine.add_vertices_with_report(&cube_corners(), kind, 0.0);
        assert_eq!(report.inserted, 8);
        engine
    }

    #[test]
    fn test_refine_splits_oversized_tets_and_stays_delaunay() {
        let mut engine = cube_engine(VertexKind::Interior);
        let config = RefineConfig {
            max_passes: 4,
            max_edge_ratio: 10.0,
            target_size: 0.5,
        };
        let inserted = engine.refine(&config);
        assert!(inserted > 0);
        assert_eq!(engine.vertex_count(), 8 + inserted);
        assert!(engine.has_vertex_within(&Point3::new(0.5, 0.5, 0.5), 1e-9));
        engine.mesh().validate_adjacency().unwrap();
        engine.mesh().validate_orientation(engine.context()).unwrap();
        engine.mesh().validate_delaunay(engine.context()).unwrap();
    }

    #[test]
    fn test_refine_is_a_no_op_under_loose_thresholds() {
        let mut engine = cube_engine(VertexKind::Interior);
        let config = RefineConfig {
            max_passes: 3,
            max_edge_ratio: 100.0,
            target_size: 0.0,
        };
        assert_eq!(engine.refine(&config), 0);
        assert_eq!(engine.vertex_count(), 8);
    }

    #[test]
    fn test_refine_leaves_fully_locked_tets_alone() {
        let mut engine = cube_engine(VertexKind::Surface);
        let config = RefineConfig {
            max_passes: 3,
            max_edge_ratio: 1.0,
            target_size: 0.1,
        };
        assert_eq!(engine.refine(&config), 0);
    }
}
