//! Point/segment/ray queries against triangles and boxes.

use super::aabb::Aabb;
use super::point::{Point3, Vector3};

/// Closest point of triangle `(v0, v1, v2)` to `point` (Ericson's Voronoi-region walk).
#[must_use]
pub fn closest_point_on_triangle(point: &Point3, v0: &Point3, v1: &Point3, v2: &Point3) -> Point3 {
    let ab = v1 - v0;
    let ac = v2 - v0;
    let ap = point - v0;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return *v0;
    }

    let bp = point - v1;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return *v1;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return v0 + ab * (d1 / (d1 - d3));
    }

    let cp = point - v2;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return *v2;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return v0 + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return v1 + (v2 - v1) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    v0 + ab * (vb * denom) + ac * (vc * denom)
}

/// Möller–Trumbore ray/triangle test.
///
/// Returns the ray parameter `t > epsilon` of the hit. `dir` need not be normalized;
/// `t` is then in units of `dir`.
#[must_use]
pub fn ray_triangle_intersect(
    origin: &Point3,
    dir: &Vector3,
    v0: &Point3,
    v1: &Point3,
    v2: &Point3,
    epsilon: f64,
) -> Option<f64> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = dir.cross(&edge2);
    let a = edge1.dot(&h);
    if a.abs() <= epsilon * edge1.norm() * edge2.norm() * dir.norm() {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * dir.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(&q);
    (t > epsilon).then_some(t)
}

/// Segment `a → b` against a triangle; returns the segment parameter in `(0, 1]`.
#[must_use]
pub fn segment_triangle_intersect(
    a: &Point3,
    b: &Point3,
    v0: &Point3,
    v1: &Point3,
    v2: &Point3,
) -> Option<f64> {
    ray_triangle_intersect(a, &(b - a), v0, v1, v2, 1e-12).filter(|&t| t <= 1.0)
}

/// Slab test: does segment `a → b` touch the closed box?
#[must_use]
pub fn segment_intersects_aabb(a: &Point3, b: &Point3, aabb: &Aabb) -> bool {
    segment_aabb_interval(a, b, aabb).is_some()
}

/// Parameter range `[t0, t1] ⊆ [0, 1]` of segment `a → b` inside the closed box.
#[must_use]
pub fn segment_aabb_interval(a: &Point3, b: &Point3, aabb: &Aabb) -> Option<(f64, f64)> {
    let d = b - a;
    let mut t_min = 0.0_f64;
    let mut t_max = 1.0_f64;
    for axis in 0..3 {
        if d[axis].abs() <= f64::MIN_POSITIVE {
            if a[axis] < aabb.min[axis] || a[axis] > aabb.max[axis] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d[axis];
        let mut t0 = (aabb.min[axis] - a[axis]) * inv;
        let mut t1 = (aabb.max[axis] - a[axis]) * inv;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }
    Some((t_min, t_max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tri() -> [Point3; 3] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(0.0, 10.0, 0.0),
        ]
    }

    #[test]
    fn test_closest_point_regions() {
        let [a, b, c] = tri();
        let inside = closest_point_on_triangle(&Point3::new(2.0, 2.0, 5.0), &a, &b, &c);
        assert_relative_eq!(inside, Point3::new(2.0, 2.0, 0.0));
        let vertex = closest_point_on_triangle(&Point3::new(-3.0, -3.0, 1.0), &a, &b, &c);
        assert_relative_eq!(vertex, a);
        let edge = closest_point_on_triangle(&Point3::new(5.0, -4.0, 0.0), &a, &b, &c);
        assert_relative_eq!(edge, Point3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_ray_and_segment_hits() {
        let [a, b, c] = tri();
        let origin = Point3::new(2.0, 3.0, 5.0);
        let t = ray_triangle_intersect(&origin, &Vector3::new(0.0, 0.0, -1.0), &a, &b, &c, 1e-12);
        assert_relative_eq!(t.unwrap(), 5.0);
        let sideways = Vector3::new(1.0, 0.0, 0.0);
        assert!(ray_triangle_intersect(&origin, &sideways, &a, &b, &c, 1e-12).is_none());

        let hit = segment_triangle_intersect(&origin, &Point3::new(2.0, 3.0, -5.0), &a, &b, &c);
        assert_relative_eq!(hit.unwrap(), 0.5);
        let short = Point3::new(2.0, 3.0, 1.0);
        assert!(segment_triangle_intersect(&origin, &short, &a, &b, &c).is_none());
    }

    #[test]
    fn test_segment_box() {
        let aabb = Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let hit = |a: [f64; 3], b: [f64; 3]| {
            segment_intersects_aabb(&Point3::from(a), &Point3::from(b), &aabb)
        };
        assert!(hit([-1.0, 0.5, 0.5], [2.0, 0.5, 0.5]));
        assert!(!hit([-1.0, 2.0, 0.5], [2.0, 2.0, 0.5]));
        assert!(!hit([-2.0, 0.5, 0.5], [-1.0, 0.5, 0.5]));
    }

    #[test]
    fn test_segment_box_interval() {
        let aabb = Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let inside = Point3::new(0.5, 0.5, 0.5);
        let (t0, t1) = segment_aabb_interval(&inside, &Point3::new(0.5, 0.5, 2.5), &aabb).unwrap();
        assert_relative_eq!(t0, 0.0);
        assert_relative_eq!(t1, 0.25);
        let (t0, t1) =
            segment_aabb_interval(&Point3::new(-1.0, 0.5, 0.5), &Point3::new(3.0, 0.5, 0.5), &aabb)
                .unwrap();
        assert_relative_eq!(t0, 0.25);
        assert_relative_eq!(t1, 0.5);
        assert!(segment_aabb_interval(&inside, &Point3::new(0.5, 0.9, 0.5), &aabb)
            .is_some_and(|(t0, t1)| t0 == 0.0 && t1 == 1.0));
    }
}
