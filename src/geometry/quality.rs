//! Geometric quality measures for tetrahedra, triangles and quads.
//!
//! These metrics drive Delaunay refinement (edge ratio, size), surface flips
//! (opposite angles, slivers) and boundary-layer termination (quad quality).
//!
//! # References
//!
//! - Shewchuk, J.R. "What Is a Good Linear Element? Interpolation, Conditioning,
//!   Anisotropy, and Quality Measures" (2002)
//! - Liu, A. and Joe, B. "Relationship between tetrahedron shape measures"
//!   *BIT Numerical Mathematics* 34.2 (1994): 268-287

use super::point::{Point3, Vector3, triangle_normal};

/// Pairs of local vertex indices forming the six edges of a tetrahedron.
pub const TET_EDGES: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Signed volume of tetrahedron `(a, b, c, d)`, positive when `d` is on the side of
/// the normal of the counterclockwise triangle `a, b, c`.
#[must_use]
pub fn tet_signed_volume(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> f64 {
    (b - a).cross(&(c - a)).dot(&(d - a)) / 6.0
}

/// Circumcenter of tetrahedron `(a, b, c, d)`, or `None` if it is (nearly) flat.
#[must_use]
pub fn tet_circumcenter(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> Option<Point3> {
    let u = b - a;
    let v = c - a;
    let w = d - a;
    let vw = v.cross(&w);
    let denom = 2.0 * u.dot(&vw);
    let scale = u.norm() * v.norm() * w.norm();
    if denom.abs() <= f64::EPSILON * scale || !denom.is_finite() {
        return None;
    }
    let numer =
        vw * u.norm_squared() + w.cross(&u) * v.norm_squared() + u.cross(&v) * w.norm_squared();
    let center = a + numer / denom;
    center.iter().all(|c| c.is_finite()).then_some(center)
}

/// Shortest and longest edge length of a tetrahedron.
#[must_use]
pub fn tet_edge_extremes(points: &[Point3; 4]) -> (f64, f64) {
    TET_EDGES
        .iter()
        .map(|&(i, j)| (points[i] - points[j]).norm())
        .fold((f64::INFINITY, 0.0_f64), |(lo, hi), len| (lo.min(len), hi.max(len)))
}

/// Longest-to-shortest edge ratio; `f64::INFINITY` for a collapsed edge.
#[must_use]
pub fn tet_edge_ratio(points: &[Point3; 4]) -> f64 {
    let (lo, hi) = tet_edge_extremes(points);
    if lo <= 0.0 { f64::INFINITY } else { hi / lo }
}

/// Circumradius-to-shortest-edge ratio, the classic Delaunay refinement measure.
///
/// `√6/4 ≈ 0.612` for a regular tetrahedron; slivers and needles grow unbounded.
#[must_use]
pub fn tet_radius_edge_ratio(points: &[Point3; 4]) -> f64 {
    let (lo, _) = tet_edge_extremes(points);
    match tet_circumcenter(&points[0], &points[1], &points[2], &points[3]) {
        Some(center) if lo > 0.0 => (center - points[0]).norm() / lo,
        _ => f64::INFINITY,
    }
}

/// Normalized volume `6√2·V / l_rms³`: 1 for a regular tetrahedron, 0 when flat.
#[must_use]
pub fn tet_normalized_volume(points: &[Point3; 4]) -> f64 {
    let sum_sq: f64 = TET_EDGES
        .iter()
        .map(|&(i, j)| (points[i] - points[j]).norm_squared())
        .sum();
    let l_rms = (sum_sq / 6.0).sqrt();
    if l_rms <= 0.0 {
        return 0.0;
    }
    let volume = tet_signed_volume(&points[0], &points[1], &points[2], &points[3]).abs();
    6.0 * std::f64::consts::SQRT_2 * volume / l_rms.powi(3)
}

/// Triangle shape quality `4√3·A / Σl²`: 1 for equilateral, 0 for degenerate.
#[must_use]
pub fn triangle_quality(a: &Point3, b: &Point3, c: &Point3) -> f64 {
    let sum_sq = (b - a).norm_squared() + (c - b).norm_squared() + (a - c).norm_squared();
    if sum_sq <= 0.0 {
        return 0.0;
    }
    let area = 0.5 * triangle_normal(a, b, c).norm();
    4.0 * 3.0_f64.sqrt() * area / sum_sq
}

/// Quad quality: the smallest corner sine of quad `a → b → c → d`.
///
/// 1 for a rectangle, approaching 0 as a corner collapses or the quad folds.
/// Corners whose normal opposes the quad's average normal count as 0.
#[must_use]
pub fn quad_quality(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> f64 {
    let corners = [a, b, c, d];
    let average: Vector3 = triangle_normal(a, b, c) + triangle_normal(a, c, d);
    let mut worst = 1.0_f64;
    for i in 0..4 {
        let prev = corners[(i + 3) % 4];
        let here = corners[i];
        let next = corners[(i + 1) % 4];
        let e1 = next - here;
        let e2 = prev - here;
        let denom = e1.norm() * e2.norm();
        if denom <= f64::MIN_POSITIVE {
            return 0.0;
        }
        let cross = e1.cross(&e2);
        let sine = if cross.dot(&average) < 0.0 {
            0.0
        } else {
            cross.norm() / denom
        };
        worst = worst.min(sine);
    }
    worst
}
