//! Procedural surfaces: planar grids and closed boxes.

use crate::core::collections::FastHashMap;
use crate::core::surface::mesh::{SurfaceMesh, SurfaceMeshError};
use crate::geometry::aabb::Aabb;
use crate::geometry::point::{Point3, Vector3};

/// Planar `nx × ny` cell grid in the `z = 0` plane with spacing `h`, normals `+z`.
///
/// Vertex `(i, j)` has index `j * (nx + 1) + i`; every cell is split along its
/// `(i, j)-(i + 1, j + 1)` diagonal.
///
/// # Errors
///
/// Propagates [`SurfaceMeshError`] from construction (only for `nx == 0` or `ny == 0`
/// producing no triangles is this infallible).
pub fn planar_grid(nx: usize, ny: usize, h: f64) -> Result<SurfaceMesh, SurfaceMeshError> {
    let row = nx + 1;
    #[allow(clippy::cast_precision_loss)]
    let positions: Vec<Point3> = (0..=ny)
        .flat_map(|j| (0..=nx).map(move |i| Point3::new(i as f64 * h, j as f64 * h, 0.0)))
        .collect();
    let mut triangles = Vec::with_capacity(nx * ny * 2);
    for j in 0..ny {
        for i in 0..nx {
            let v00 = j * row + i;
            let v10 = v00 + 1;
            let v01 = v00 + row;
            let v11 = v01 + 1;
            triangles.push([v00, v10, v11]);
            triangles.push([v00, v11, v01]);
        }
    }
    SurfaceMesh::from_triangles(positions, &triangles)
}

/// Closed, outward-oriented surface of `aabb` with `divisions` cells per box edge.
///
/// # Errors
///
/// Propagates [`SurfaceMeshError`] from construction.
pub fn box_surface(aabb: &Aabb, divisions: usize) -> Result<SurfaceMesh, SurfaceMeshError> {
    let n = divisions.max(1);
    let ni = i64::try_from(n).unwrap_or(i64::MAX);
    // (start corner, du, dv) in lattice units with du × dv pointing outward.
    let faces: [([i64; 3], [i64; 3], [i64; 3]); 6] = [
        ([0, 0, 0], [0, 0, 1], [0, 1, 0]),
        ([ni, 0, 0], [0, 1, 0], [0, 0, 1]),
        ([0, 0, 0], [1, 0, 0], [0, 0, 1]),
        ([0, ni, 0], [0, 0, 1], [1, 0, 0]),
        ([0, 0, 0], [0, 1, 0], [1, 0, 0]),
        ([0, 0, ni], [1, 0, 0], [0, 1, 0]),
    ];
    let extent: Vector3 = aabb.extent();
    let mut index: FastHashMap<[i64; 3], usize> = FastHashMap::default();
    let mut positions = Vec::new();
    let mut lattice = |p: [i64; 3], positions: &mut Vec<Point3>| -> usize {
        *index.entry(p).or_insert_with(|| {
            #[allow(clippy::cast_precision_loss)]
            let t = Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64) / ni as f64;
            positions.push(aabb.min + extent.component_mul(&t));
            positions.len() - 1
        })
    };

    let mut triangles = Vec::with_capacity(12 * n * n);
    for (start, du, dv) in faces {
        let at = |u: i64, v: i64| [0, 1, 2].map(|k| start[k] + du[k] * u + dv[k] * v);
        for v in 0..ni {
            for u in 0..ni {
                let p00 = lattice(at(u, v), &mut positions);
                let p10 = lattice(at(u + 1, v), &mut positions);
                let p11 = lattice(at(u + 1, v + 1), &mut positions);
                let p01 = lattice(at(u, v + 1), &mut positions);
                triangles.push([p00, p10, p11]);
                triangles.push([p00, p11, p01]);
            }
        }
    }
    SurfaceMesh::from_triangles(positions, &triangles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handles::VertexId;

    #[test]
    fn test_planar_grid_counts() {
        let mesh = planar_grid(10, 10, 1.0).unwrap();
        assert_eq!(mesh.vertex_count(), 121);
        assert_eq!(mesh.triangle_count(), 200);
        mesh.validate_adjacency().unwrap();
        assert!(!mesh.is_boundary_vertex(VertexId::new(60)));
        assert!(mesh.is_boundary_vertex(VertexId::new(0)));
    }

    #[test]
    fn test_box_surface_is_closed_and_outward() {
        let aabb = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let mesh = box_surface(&aabb, 3).unwrap();
        assert_eq!(mesh.vertex_count(), 6 * 9 + 2);
        assert_eq!(mesh.triangle_count(), 6 * 9 * 2);
        assert!(mesh.is_closed());
        mesh.validate_adjacency().unwrap();
        for t in mesh.triangles() {
            let outward = mesh.tri_centroid(t).coords;
            assert!(mesh.tri_normal(t).dot(&outward) > 0.0);
        }
    }
}
