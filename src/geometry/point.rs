//! Point and vector aliases plus the small vector helpers shared by every kernel.
//!
//! All mesh-generation state works in `f64`; the aliases keep signatures short and
//! let callers use the full `nalgebra` API on positions.

use nalgebra as na;
use std::cmp::Ordering;

/// A position in 3D space.
pub type Point3 = na::Point3<f64>;

/// A displacement or normal in 3D space.
pub type Vector3 = na::Vector3<f64>;

/// Unnormalized normal of triangle `(a, b, c)`; its length is twice the area.
#[inline]
#[must_use]
pub fn triangle_normal(a: &Point3, b: &Point3, c: &Point3) -> Vector3 {
    (b - a).cross(&(c - a))
}

/// Area of triangle `(a, b, c)`.
#[inline]
#[must_use]
pub fn triangle_area(a: &Point3, b: &Point3, c: &Point3) -> f64 {
    0.5 * triangle_normal(a, b, c).norm()
}

/// Interior angle at `apex` between the rays towards `p` and `q`, in radians.
///
/// Returns `0.0` for a degenerate ray.
#[must_use]
pub fn angle_at(apex: &Point3, p: &Point3, q: &Point3) -> f64 {
    let u = p - apex;
    let v = q - apex;
    let denom = u.norm() * v.norm();
    if denom <= f64::MIN_POSITIVE {
        return 0.0;
    }
    // atan2 keeps precision for angles close to 0 and π.
    u.cross(&v).norm().atan2(u.dot(&v))
}

/// Normalizes `v`, returning `None` when it is too short to carry a direction.
#[inline]
#[must_use]
pub fn try_normalize(v: &Vector3) -> Option<Vector3> {
    v.try_normalize(f64::EPSILON)
}

/// Lexicographic (x, then y, then z) ordering of two points.
///
/// Used as the perturbation order of the symbolic tie-breaking in the predicates,
/// so it must be a total order on finite coordinates.
#[must_use]
pub fn lexicographic_cmp(a: &Point3, b: &Point3) -> Ordering {
    a.x.total_cmp(&b.x)
        .then_with(|| a.y.total_cmp(&b.y))
        .then_with(|| a.z.total_cmp(&b.z))
}

/// `true` when all three coordinates are finite.
#[inline]
#[must_use]
pub fn is_finite(p: &Point3) -> bool {
    p.x.is_finite() && p.y.is_finite() && p.z.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_triangle_normal_and_area() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(2.0, 0.0, 0.0);
        let c = Point3::new(0.0, 2.0, 0.0);
        assert_relative_eq!(triangle_normal(&a, &b, &c), Vector3::new(0.0, 0.0, 4.0));
        assert_relative_eq!(triangle_area(&a, &b, &c), 2.0);
    }

    #[test]
    fn test_angle_at_right_angle() {
        let apex = Point3::origin();
        let p = Point3::new(1.0, 0.0, 0.0);
        let q = Point3::new(0.0, 3.0, 0.0);
        assert_relative_eq!(angle_at(&apex, &p, &q), FRAC_PI_2);
        assert_relative_eq!(angle_at(&apex, &apex, &q), 0.0);
    }

    #[test]
    fn test_lexicographic_cmp() {
        let a = Point3::new(0.0, 1.0, 2.0);
        let b = Point3::new(0.0, 1.0, 3.0);
        let c = Point3::new(-1.0, 5.0, 5.0);
        assert_eq!(lexicographic_cmp(&a, &b), Ordering::Less);
        assert_eq!(lexicographic_cmp(&b, &a), Ordering::Greater);
        assert_eq!(lexicographic_cmp(&c, &a), Ordering::Less);
        assert_eq!(lexicographic_cmp(&a, &a), Ordering::Equal);
    }
}
