//! Conversion of the tetrahedral soup into a [`CfdVolume`].

use smallvec::SmallVec;

use crate::core::delaunay::insertion::Delaunay;
use crate::core::handles::TetId;
use crate::geometry::point::Point3;
use crate::spatial::bvh::Bvh;
use crate::volume::{BoundaryKind, Cell, CellShape, CfdVolume, FaceLink};

impl Delaunay {
    fn tet_centroid(&self, t: TetId) -> Point3 {
        let [a, b, c, d] = self.mesh.tet_points(t);
        Point3::from((a.coords + b.coords + c.coords + d.coords) * 0.25)
    }

    /// Emit the finished volume mesh.
    ///
    /// Tetrahedra with a super-tetrahedron corner are dropped and the faces they
    /// shared become [`BoundaryKind::Pressure`]. If `solid` is given (a BVH over a
    /// closed surface), tetrahedra whose centroid lies inside it are dropped as well
    /// and their shared faces become [`BoundaryKind::Wall`]. Unused vertices are
    /// compacted away; the remaining ones keep their relative order.
    pub fn complete(&mut self, solid: Option<&Bvh>) -> CfdVolume {
        let capacity = self.mesh.tet_capacity();
        let mut cell_of: Vec<Option<usize>> = vec![None; capacity];
        let mut kept: Vec<TetId> = Vec::with_capacity(self.mesh.tet_count());
        let mut walled = 0_usize;
        for t in self.mesh.tets() {
            if self.mesh.touches_super(t) {
                continue;
            }
            if solid.is_some_and(|bvh| bvh.contains_point(&self.tet_centroid(t))) {
                walled += 1;
                continue;
            }
            cell_of[t.index()] = Some(kept.len());
            kept.push(t);
        }

        let mut vertex_of: Vec<Option<usize>> = vec![None; self.mesh.vertex_count()];
        for &t in &kept {
            for v in self.mesh.tet_vertices(t) {
                vertex_of[v.index()] = Some(0);
            }
        }
        let mut volume = CfdVolume::new();
        for (index, slot) in vertex_of.iter_mut().enumerate() {
            if slot.is_some() {
                *slot = Some(volume.vertices.len());
                volume.vertices.push(self.mesh.positions[index]);
            }
        }

        volume.cells.reserve(kept.len());
        for &t in &kept {
            let vertices: SmallVec<[usize; 8]> = self
                .mesh
                .tet_vertices(t)
                .iter()
                .filter_map(|v| vertex_of[v.index()])
                .collect();
            let faces: SmallVec<[FaceLink; 6]> = (0..4)
                .map(|i| {
                    let neighbor = self.mesh.neighbor(t.face(i));
                    if neighbor.is_none() || self.mesh.touches_super(neighbor.tet()) {
                        return FaceLink::Boundary(BoundaryKind::Pressure);
                    }
                    cell_of[neighbor.tet().index()]
                        .map_or(FaceLink::Boundary(BoundaryKind::Wall), FaceLink::Cell)
                })
                .collect();
            volume.cells.push(Cell {
                shape: CellShape::Tetra,
                vertices,
                faces,
            });
        }

        tracing::info!(
            cells = volume.cell_count(),
            vertices = volume.vertex_count(),
            stripped_inside = walled,
            "volume mesh completed"
        );
        self.tracer_mut().suspend("complete");
        volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::delaunay::tet_mesh::VertexKind;
    use crate::core::surface::primitives::box_surface;
    use crate::geometry::aabb::Aabb;
    use approx::assert_relative_eq;

    fn unit_box() -> Aabb {
        Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_complete_strips_super_tets_and_tags_pressure() {
        let mut engine = Delaunay::new(&unit_box(), 2).unwrap();
        let mut points = unit_box().corners().to_vec();
        points.push(Point3::new(0.5, 0.5, 0.5));
        assert!(engine.add_vertices(&points, 0.0));

        let volume = engine.complete(None);
        assert_eq!(volume.vertex_count(), 9);
        assert_eq!(volume.cell_count(), 12);
        assert_eq!(volume.boundary_face_count(BoundaryKind::Pressure), 12);
        assert_eq!(volume.boundary_face_count(BoundaryKind::Wall), 0);
        assert_relative_eq!(volume.total_volume(), 1.0, epsilon = 1e-12);
        volume.validate().unwrap();
    }

    #[test]
    fn test_complete_carves_out_closed_solid() {
        let inner = Aabb::new(Point3::new(0.25, 0.25, 0.25), Point3::new(0.75, 0.75, 0.75));
        let mut engine = Delaunay::new(&unit_box(), 4).unwrap();
        let outer = unit_box().corners();
        let outer_report = engine.add_vertices_with_report(&outer, VertexKind::Interior, 0.0);
        let inner_report =
            engine.add_vertices_with_report(&inner.corners(), VertexKind::Surface, 0.0);
        assert!(outer_report.is_success() && inner_report.is_success());

        let surface = box_surface(&inner, 1).unwrap();
        let solid = Bvh::from_indexed(surface.positions(), &surface.indexed_triangles());
        let volume = engine.complete(Some(&solid));

        assert_eq!(volume.vertex_count(), 16);
        assert_eq!(volume.boundary_face_count(BoundaryKind::Wall), 12);
        assert_eq!(volume.boundary_face_count(BoundaryKind::Pressure), 12);
        assert_relative_eq!(volume.total_volume(), 1.0 - 0.125, epsilon = 1e-12);
        volume.validate().unwrap();
    }
}
