//! Point location on a [`SurfaceMesh`] by triangle-to-triangle walking.

use crate::core::handles::TriId;
use crate::core::surface::mesh::SurfaceMesh;
use crate::geometry::intersect::closest_point_on_triangle;
use crate::geometry::point::{Point3, try_normalize};

/// Hop budget of [`SurfaceMesh::project`] before the walk gives up.
pub const MAX_PROJECT_HOPS: usize = 512;

impl SurfaceMesh {
    /// Locate the triangle under `p`, walking from `seed`.
    ///
    /// At each step `p` is projected onto the current triangle's plane. If the
    /// projection lies inside (every edge cross product agrees with the normal) the
    /// triangle and the projected point are returned. Otherwise the walk crosses the
    /// most violated interior edge; once only open border edges are violated the point
    /// is clamped onto the current triangle.
    ///
    /// Returns `None` for a dead seed, a degenerate triangle, or when
    /// [`MAX_PROJECT_HOPS`] is exhausted.
    #[must_use]
    pub fn project(&self, seed: TriId, p: &Point3) -> Option<(TriId, Point3)> {
        if seed.is_none() || seed.index() >= self.triangle_capacity() || self.is_deleted(seed) {
            return None;
        }
        let mut current = seed;
        let mut previous = TriId::NONE;
        for _ in 0..MAX_PROJECT_HOPS {
            let [a, b, c] = self.tri_points(current);
            let n = try_normalize(&self.tri_normal(current))?;
            let q = p - n * (p - a).dot(&n);

            let corners = [a, b, c];
            let mut exit = None;
            let mut worst = 0.0;
            let mut outside = false;
            for i in 0..3 {
                let from = corners[i];
                let to = corners[(i + 1) % 3];
                let side = (to - from).cross(&(q - from)).dot(&n);
                if side >= 0.0 {
                    continue;
                }
                let twin = self.twin(current.edge(i));
                if twin.is_none() {
                    outside = true;
                    continue;
                }
                if twin.tri() == previous {
                    outside = true;
                    continue;
                }
                let normalized = side / (to - from).norm();
                if normalized < worst {
                    worst = normalized;
                    exit = Some(twin.tri());
                }
            }

            let Some(next) = exit else {
                let point = if outside { closest_point_on_triangle(p, &a, &b, &c) } else { q };
                return Some((current, point));
            };
            previous = current;
            current = next;
        }
        tracing::debug!(seed = %seed, "surface walk exhausted its hop budget");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::surface::primitives::planar_grid;
    use approx::assert_relative_eq;

    #[test]
    fn test_project_walks_across_grid() {
        let mesh = planar_grid(8, 8, 1.0).unwrap();
        let target = Point3::new(6.3, 5.6, 2.0);
        let (tri, point) = mesh.project(TriId::new(0), &target).unwrap();
        assert_relative_eq!(point, Point3::new(6.3, 5.6, 0.0), epsilon = 1e-12);
        let [a, b, c] = mesh.tri_points(tri);
        let lo = a.coords.inf(&b.coords).inf(&c.coords);
        let hi = a.coords.sup(&b.coords).sup(&c.coords);
        assert!(lo.x <= 6.3 && 6.3 <= hi.x && lo.y <= 5.6 && 5.6 <= hi.y);
    }

    #[test]
    fn test_project_clamps_outside_border() {
        let mesh = planar_grid(4, 4, 1.0).unwrap();
        let (_, point) = mesh.project(TriId::new(10), &Point3::new(-3.0, 2.5, 0.0)).unwrap();
        assert_relative_eq!(point, Point3::new(0.0, 2.5, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_project_rejects_dead_seed() {
        let mesh = planar_grid(1, 1, 1.0).unwrap();
        assert!(mesh.project(TriId::NONE, &Point3::origin()).is_none());
        assert!(mesh.project(TriId::new(7), &Point3::origin()).is_none());
    }
}
