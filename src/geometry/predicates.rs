//! Exact geometric predicates for tetrahedral meshing.
//!
//! Both predicates follow the same three-tier scheme:
//!
//! 1. A floating-point evaluation guarded by a conservative error bound. When the
//!    computed magnitude exceeds the bound its sign is certainly right.
//! 2. An exact re-evaluation with [`Expansion`] arithmetic, reached only for
//!    near-degenerate inputs.
//! 3. For [`PredicateContext::insphere_perturbed`], a lexicographic symbolic
//!    perturbation that resolves exact cospherical ties deterministically.
//!
//! The sign conventions are Shewchuk's: [`PredicateContext::orient3d`] is positive
//! when `d` lies below the plane through `a, b, c` (seen from above, `a, b, c` are
//! counterclockwise), and [`PredicateContext::insphere`] is positive when `e` lies
//! inside the sphere through `a, b, c, d`, provided `orient3d(a, b, c, d) > 0`.
//!
//! The error-bound coefficients live in a [`PredicateContext`] rather than in global
//! state, so two meshing runs with different working bounds never interfere.

use std::cmp::Ordering;
use std::fmt;

use super::aabb::Aabb;
use super::expansion::Expansion;
use super::point::{Point3, lexicographic_cmp};

/// Represents the orientation of a tetrahedron (or a point relative to a plane).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// `orient3d < 0`
    NEGATIVE,
    /// The four points are exactly coplanar
    DEGENERATE,
    /// `orient3d > 0`
    POSITIVE,
}

impl Orientation {
    /// Orientation for a signed determinant.
    #[must_use]
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Self::POSITIVE
        } else if value < 0.0 {
            Self::NEGATIVE
        } else {
            Self::DEGENERATE
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NEGATIVE => write!(f, "NEGATIVE"),
            Self::DEGENERATE => write!(f, "DEGENERATE"),
            Self::POSITIVE => write!(f, "POSITIVE"),
        }
    }
}

/// Represents the position of a point relative to a circumsphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InSphere {
    /// The point is outside the circumsphere
    OUTSIDE,
    /// The point is exactly on the circumsphere
    BOUNDARY,
    /// The point is inside the circumsphere
    INSIDE,
}

impl fmt::Display for InSphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OUTSIDE => write!(f, "OUTSIDE"),
            Self::BOUNDARY => write!(f, "BOUNDARY"),
            Self::INSIDE => write!(f, "INSIDE"),
        }
    }
}

/// Error-bound coefficients for the floating-point filters.
///
/// Built once per meshing run. [`PredicateContext::for_bounds`] additionally derives a
/// *static* filter from the coordinate range of the working set: for points inside
/// those bounds a determinant larger than the static bound is accepted without
/// computing the per-call permanent.
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateContext {
    /// Half an ulp of one (`2^-53`).
    epsilon: f64,
    /// Relative error bound of the fast `orient3d` evaluation.
    o3d_errbound: f64,
    /// Relative error bound of the fast `insphere` evaluation.
    isp_errbound: f64,
    /// Bounds the static filters are valid for.
    bounds: Option<Aabb>,
    /// Absolute `orient3d` error bound for points inside `bounds`.
    o3d_static: f64,
    /// Absolute `insphere` error bound for points inside `bounds`.
    isp_static: f64,
}

impl Default for PredicateContext {
    fn default() -> Self {
        Self::new()
    }
}

impl PredicateContext {
    /// Context with dynamic filters only, valid for any finite input.
    #[must_use]
    pub fn new() -> Self {
        let epsilon = f64::EPSILON * 0.5;
        Self {
            epsilon,
            o3d_errbound: 56.0f64.mul_add(epsilon, 7.0) * epsilon,
            isp_errbound: 224.0f64.mul_add(epsilon, 16.0) * epsilon,
            bounds: None,
            o3d_static: f64::INFINITY,
            isp_static: f64::INFINITY,
        }
    }

    /// Context whose static filters are tuned to points inside `bounds`.
    ///
    /// Must be rebuilt whenever the working bounds change.
    #[must_use]
    pub fn for_bounds(bounds: &Aabb) -> Self {
        let mut ctx = Self::new();
        if !bounds.is_valid() {
            return ctx;
        }
        // Every coordinate difference is at most the largest extent.
        let l = bounds.max_extent();
        let slack = 1.0 + 64.0 * ctx.epsilon;
        ctx.o3d_static = ctx.o3d_errbound * 6.0 * l.powi(3) * slack;
        ctx.isp_static = ctx.isp_errbound * 72.0 * l.powi(5) * slack;
        if ctx.o3d_static.is_finite() && ctx.isp_static.is_finite() {
            ctx.bounds = Some(*bounds);
        } else {
            ctx.o3d_static = f64::INFINITY;
            ctx.isp_static = f64::INFINITY;
        }
        ctx
    }

    /// Machine epsilon used for the bounds (`2^-53`).
    #[must_use]
    pub const fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Bounds the static filter was derived from.
    #[must_use]
    pub const fn bounds(&self) -> Option<&Aabb> {
        self.bounds.as_ref()
    }

    fn all_inside(&self, points: &[&Point3]) -> bool {
        self.bounds
            .as_ref()
            .is_some_and(|b| points.iter().all(|p| b.contains(p)))
    }

    /// Orientation determinant of `d` against the plane through `a, b, c`.
    ///
    /// The sign is exact; exactly coplanar input returns `0.0`.
    #[must_use]
    pub fn orient3d(&self, a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> f64 {
        let adx = a.x - d.x;
        let bdx = b.x - d.x;
        let cdx = c.x - d.x;
        let ady = a.y - d.y;
        let bdy = b.y - d.y;
        let cdy = c.y - d.y;
        let adz = a.z - d.z;
        let bdz = b.z - d.z;
        let cdz = c.z - d.z;

        let bdxcdy = bdx * cdy;
        let cdxbdy = cdx * bdy;
        let cdxady = cdx * ady;
        let adxcdy = adx * cdy;
        let adxbdy = adx * bdy;
        let bdxady = bdx * ady;

        let det = adz * (bdxcdy - cdxbdy) + bdz * (cdxady - adxcdy) + cdz * (adxbdy - bdxady);

        if det.abs() > self.o3d_static && self.all_inside(&[a, b, c, d]) {
            return det;
        }

        let permanent = (bdxcdy.abs() + cdxbdy.abs()) * adz.abs()
            + (cdxady.abs() + adxcdy.abs()) * bdz.abs()
            + (adxbdy.abs() + bdxady.abs()) * cdz.abs();
        let errbound = self.o3d_errbound * permanent;
        if det > errbound || -det > errbound {
            return det;
        }

        orient3d_exact(a, b, c, d).signed_estimate()
    }

    /// [`PredicateContext::orient3d`] classified as an [`Orientation`].
    #[must_use]
    pub fn orientation(&self, a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> Orientation {
        Orientation::from_sign(self.orient3d(a, b, c, d))
    }

    /// In-sphere determinant of `e` against the sphere through `a, b, c, d`.
    ///
    /// The sign is exact; exactly cospherical input returns `0.0`.
    #[must_use]
    #[allow(clippy::similar_names, clippy::many_single_char_names)]
    pub fn insphere(&self, a: &Point3, b: &Point3, c: &Point3, d: &Point3, e: &Point3) -> f64 {
        let aex = a.x - e.x;
        let bex = b.x - e.x;
        let cex = c.x - e.x;
        let dex = d.x - e.x;
        let aey = a.y - e.y;
        let bey = b.y - e.y;
        let cey = c.y - e.y;
        let dey = d.y - e.y;
        let aez = a.z - e.z;
        let bez = b.z - e.z;
        let cez = c.z - e.z;
        let dez = d.z - e.z;

        let aexbey = aex * bey;
        let bexaey = bex * aey;
        let ab = aexbey - bexaey;
        let bexcey = bex * cey;
        let cexbey = cex * bey;
        let bc = bexcey - cexbey;
        let cexdey = cex * dey;
        let dexcey = dex * cey;
        let cd = cexdey - dexcey;
        let dexaey = dex * aey;
        let aexdey = aex * dey;
        let da = dexaey - aexdey;
        let aexcey = aex * cey;
        let cexaey = cex * aey;
        let ac = aexcey - cexaey;
        let bexdey = bex * dey;
        let dexbey = dex * bey;
        let bd = bexdey - dexbey;

        let abc = aez * bc - bez * ac + cez * ab;
        let bcd = bez * cd - cez * bd + dez * bc;
        let cda = cez * da + dez * ac + aez * cd;
        let dab = dez * ab + aez * bd + bez * da;

        let alift = aex * aex + aey * aey + aez * aez;
        let blift = bex * bex + bey * bey + bez * bez;
        let clift = cex * cex + cey * cey + cez * cez;
        let dlift = dex * dex + dey * dey + dez * dez;

        let det = (dlift * abc - clift * dab) + (blift * cda - alift * bcd);

        if det.abs() > self.isp_static && self.all_inside(&[a, b, c, d, e]) {
            return det;
        }

        let (aez, bez, cez, dez) = (aez.abs(), bez.abs(), cez.abs(), dez.abs());
        let (aexbey, bexaey) = (aexbey.abs(), bexaey.abs());
        let (bexcey, cexbey) = (bexcey.abs(), cexbey.abs());
        let (cexdey, dexcey) = (cexdey.abs(), dexcey.abs());
        let (dexaey, aexdey) = (dexaey.abs(), aexdey.abs());
        let (aexcey, cexaey) = (aexcey.abs(), cexaey.abs());
        let (bexdey, dexbey) = (bexdey.abs(), dexbey.abs());
        let permanent = ((cexdey + dexcey) * bez
            + (dexbey + bexdey) * cez
            + (bexcey + cexbey) * dez)
            * alift
            + ((dexaey + aexdey) * cez + (aexcey + cexaey) * dez + (cexdey + dexcey) * aez) * blift
            + ((aexbey + bexaey) * dez + (bexdey + dexbey) * aez + (dexaey + aexdey) * bez) * clift
            + ((bexcey + cexbey) * aez + (cexaey + aexcey) * bez + (aexbey + bexaey) * cez) * dlift;
        let errbound = self.isp_errbound * permanent;
        if det > errbound || -det > errbound {
            return det;
        }

        insphere_exact(a, b, c, d, e).signed_estimate()
    }

    /// [`PredicateContext::insphere`] classified relative to the tetrahedron's own
    /// orientation, so the answer does not depend on the vertex order.
    #[must_use]
    pub fn insphere_class(
        &self,
        a: &Point3,
        b: &Point3,
        c: &Point3,
        d: &Point3,
        e: &Point3,
    ) -> InSphere {
        let orientation = self.orient3d(a, b, c, d);
        let value = self.insphere(a, b, c, d, e) * orientation.signum();
        if orientation == 0.0 || value == 0.0 {
            InSphere::BOUNDARY
        } else if value > 0.0 {
            InSphere::INSIDE
        } else {
            InSphere::OUTSIDE
        }
    }

    /// In-sphere test with symbolic perturbation.
    ///
    /// Same sign convention as [`PredicateContext::insphere`], but exact cospherical
    /// ties are broken as if the points were perturbed in lexicographic order: the
    /// lexicographically largest point moves furthest. The answer is therefore never
    /// `0.0` for a non-degenerate tetrahedron and is identical for repeated calls.
    #[must_use]
    pub fn insphere_perturbed(
        &self,
        a: &Point3,
        b: &Point3,
        c: &Point3,
        d: &Point3,
        e: &Point3,
    ) -> f64 {
        let det = self.insphere(a, b, c, d, e);
        if det != 0.0 {
            return det;
        }
        let tet_sign = self.orient3d(a, b, c, d).signum();
        if tet_sign == 0.0 || !tet_sign.is_finite() {
            return 0.0;
        }

        // Index 4 is the query point; 0..4 are the tetrahedron corners.
        let points = [a, b, c, d, e];
        let mut order = [0usize, 1, 2, 3, 4];
        order.sort_by(|&i, &j| lexicographic_cmp(points[i], points[j]).then(i.cmp(&j)));

        // Two tiers suffice: the leading monomials of the perturbed determinant are
        // orientations of the tetrahedron with one corner replaced by `e`.
        for &moved in order.iter().rev().take(2) {
            if moved == 4 {
                // Perturbing the query point outward puts it outside.
                return -tet_sign;
            }
            let mut corners = [a, b, c, d];
            corners[moved] = e;
            let o = self.orient3d(corners[0], corners[1], corners[2], corners[3]);
            if o != 0.0 {
                // Same orientation as the tetrahedron means inside.
                return if o.signum() == tet_sign {
                    tet_sign
                } else {
                    -tet_sign
                };
            }
        }
        0.0
    }

    /// Sign comparison helper: how `e` relates to the sphere of a positively
    /// oriented tetrahedron, with ties perturbed.
    #[must_use]
    pub fn insphere_perturbed_class(
        &self,
        a: &Point3,
        b: &Point3,
        c: &Point3,
        d: &Point3,
        e: &Point3,
    ) -> InSphere {
        let orientation = self.orient3d(a, b, c, d).signum();
        match (self.insphere_perturbed(a, b, c, d, e) * orientation).partial_cmp(&0.0) {
            Some(Ordering::Greater) => InSphere::INSIDE,
            Some(Ordering::Less) => InSphere::OUTSIDE,
            _ => InSphere::BOUNDARY,
        }
    }
}

/// Exact `orient3d` via expansion arithmetic.
#[must_use]
pub fn orient3d_exact(a: &Point3, b: &Point3, c: &Point3, d: &Point3) -> Expansion {
    let adx = Expansion::from_diff(a.x, d.x);
    let bdx = Expansion::from_diff(b.x, d.x);
    let cdx = Expansion::from_diff(c.x, d.x);
    let ady = Expansion::from_diff(a.y, d.y);
    let bdy = Expansion::from_diff(b.y, d.y);
    let cdy = Expansion::from_diff(c.y, d.y);
    let adz = Expansion::from_diff(a.z, d.z);
    let bdz = Expansion::from_diff(b.z, d.z);
    let cdz = Expansion::from_diff(c.z, d.z);

    let t1 = adz.mul(&bdx.mul(&cdy).sub(&cdx.mul(&bdy)));
    let t2 = bdz.mul(&cdx.mul(&ady).sub(&adx.mul(&cdy)));
    let t3 = cdz.mul(&adx.mul(&bdy).sub(&bdx.mul(&ady)));
    t1.add(&t2).add(&t3)
}

/// Exact `insphere` via expansion arithmetic.
#[must_use]
pub fn insphere_exact(a: &Point3, b: &Point3, c: &Point3, d: &Point3, e: &Point3) -> Expansion {
    let diff = |p: &Point3| {
        (
            Expansion::from_diff(p.x, e.x),
            Expansion::from_diff(p.y, e.y),
            Expansion::from_diff(p.z, e.z),
        )
    };
    let (aex, aey, aez) = diff(a);
    let (bex, bey, bez) = diff(b);
    let (cex, cey, cez) = diff(c);
    let (dex, dey, dez) = diff(d);

    let cross = |px: &Expansion, py: &Expansion, qx: &Expansion, qy: &Expansion| {
        px.mul(qy).sub(&qx.mul(py))
    };
    let ab = cross(&aex, &aey, &bex, &bey);
    let bc = cross(&bex, &bey, &cex, &cey);
    let cd = cross(&cex, &cey, &dex, &dey);
    let da = cross(&dex, &dey, &aex, &aey);
    let ac = cross(&aex, &aey, &cex, &cey);
    let bd = cross(&bex, &bey, &dex, &dey);

    let abc = aez.mul(&bc).sub(&bez.mul(&ac)).add(&cez.mul(&ab));
    let bcd = bez.mul(&cd).sub(&cez.mul(&bd)).add(&dez.mul(&bc));
    let cda = cez.mul(&da).add(&dez.mul(&ac)).add(&aez.mul(&cd));
    let dab = dez.mul(&ab).add(&aez.mul(&bd)).add(&bez.mul(&da));

    let lift = |x: &Expansion, y: &Expansion, z: &Expansion| x.mul(x).add(&y.mul(y)).add(&z.mul(z));
    let alift = lift(&aex, &aey, &aez);
    let blift = lift(&bex, &bey, &bez);
    let clift = lift(&cex, &cey, &cez);
    let dlift = lift(&dex, &dey, &dez);

    let left = dlift.mul(&abc).sub(&clift.mul(&dab));
    let right = blift.mul(&cda).sub(&alift.mul(&bcd));
    left.add(&right)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tet() -> [Point3; 4] {
        [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]
    }

    #[test]
    fn test_orient3d_sign_convention() {
        let ctx = PredicateContext::new();
        let [a, b, c, d] = unit_tet();
        // d above the counterclockwise triangle abc is negative in this convention.
        assert!(ctx.orient3d(&a, &b, &c, &d) < 0.0);
        assert!(ctx.orient3d(&a, &c, &b, &d) > 0.0);
        assert_eq!(ctx.orientation(&b, &a, &c, &d), Orientation::POSITIVE);
    }

    #[test]
    fn test_orient3d_coplanar_is_exactly_zero() {
        let ctx = PredicateContext::new();
        let a = Point3::new(0.1, 0.2, 0.3);
        let b = Point3::new(1.1, 0.2, 0.3);
        let c = Point3::new(0.1, 1.2, 0.3);
        let d = Point3::new(0.7, 0.9, 0.3);
        assert_eq!(ctx.orient3d(&a, &b, &c, &d), 0.0);

        // Coplanar but not axis-aligned: x + y + z = 1 with exactly representable points.
        let a = Point3::new(1.0, 0.0, 0.0);
        let b = Point3::new(0.0, 1.0, 0.0);
        let c = Point3::new(0.0, 0.0, 1.0);
        let d = Point3::new(0.25, 0.25, 0.5);
        assert_eq!(ctx.orient3d(&a, &b, &c, &d), 0.0);
    }

    #[test]
    fn test_orient3d_tiny_offset_is_resolved_exactly() {
        let ctx = PredicateContext::new();
        let a = Point3::new(1.0, 0.0, 0.0);
        let b = Point3::new(0.0, 1.0, 0.0);
        let c = Point3::new(0.0, 0.0, 1.0);
        // One ulp off the plane x + y + z = 1 along z, on either side.
        let above = Point3::new(0.25, 0.25, 0.5 + f64::EPSILON / 2.0);
        let below = Point3::new(0.25, 0.25, 0.5 - f64::EPSILON / 4.0);
        let s_above = ctx.orient3d(&a, &b, &c, &above);
        let s_below = ctx.orient3d(&a, &b, &c, &below);
        assert!(s_above != 0.0 && s_below != 0.0);
        assert!(s_above.signum() != s_below.signum());
    }

    #[test]
    fn test_insphere_inside_outside() {
        let ctx = PredicateContext::new();
        let [a, b, c, d] = unit_tet();
        // Make the tetrahedron positively oriented.
        let (a, b) = (b, a);
        assert!(ctx.orient3d(&a, &b, &c, &d) > 0.0);
        let center = Point3::new(0.5, 0.5, 0.5);
        let far = Point3::new(5.0, 5.0, 5.0);
        assert!(ctx.insphere(&a, &b, &c, &d, &center) > 0.0);
        assert!(ctx.insphere(&a, &b, &c, &d, &far) < 0.0);
        assert_eq!(ctx.insphere_class(&a, &b, &c, &d, &center), InSphere::INSIDE);
        // Classification is independent of the vertex order.
        assert_eq!(ctx.insphere_class(&b, &a, &c, &d, &center), InSphere::INSIDE);
        assert_eq!(ctx.insphere_class(&b, &a, &c, &d, &far), InSphere::OUTSIDE);
    }

    #[test]
    fn test_insphere_cospherical_is_exactly_zero() {
        let ctx = PredicateContext::new();
        // Five corners of the unit cube all lie on its circumsphere.
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        let d = Point3::new(0.0, 0.0, 1.0);
        let e = Point3::new(1.0, 1.0, 1.0);
        assert_eq!(ctx.insphere(&a, &b, &c, &d, &e), 0.0);
        assert_eq!(ctx.insphere_class(&a, &b, &c, &d, &e), InSphere::BOUNDARY);
    }

    #[test]
    fn test_insphere_perturbed_breaks_ties_deterministically() {
        let ctx = PredicateContext::new();
        let a = Point3::new(1.0, 0.0, 0.0);
        let b = Point3::new(0.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        let d = Point3::new(0.0, 0.0, 1.0);
        let e = Point3::new(1.0, 1.0, 1.0);
        assert!(ctx.orient3d(&a, &b, &c, &d) > 0.0);
        let first = ctx.insphere_perturbed(&a, &b, &c, &d, &e);
        assert_ne!(first, 0.0);
        for _ in 0..4 {
            assert_eq!(ctx.insphere_perturbed(&a, &b, &c, &d, &e), first);
        }
        // Non-degenerate input is passed through untouched.
        let inside = Point3::new(0.3, 0.3, 0.3);
        assert_eq!(
            ctx.insphere_perturbed(&a, &b, &c, &d, &inside),
            ctx.insphere(&a, &b, &c, &d, &inside)
        );
    }

    #[test]
    fn test_static_filter_agrees_with_dynamic_filter() {
        let bounds = Aabb::new(Point3::new(-10.0, -10.0, -10.0), Point3::new(10.0, 10.0, 10.0));
        let scaled = PredicateContext::for_bounds(&bounds);
        let plain = PredicateContext::new();
        assert!(scaled.bounds().is_some());
        let [a, b, c, d] = unit_tet();
        let e = Point3::new(0.2, 0.1, 0.3);
        assert_eq!(
            scaled.orient3d(&a, &b, &c, &d).signum(),
            plain.orient3d(&a, &b, &c, &d).signum()
        );
        assert_eq!(
            scaled.insphere(&b, &a, &c, &d, &e).signum(),
            plain.insphere(&b, &a, &c, &d, &e).signum()
        );
    }

    #[test]
    fn test_exact_matches_filtered_on_easy_input() {
        let [a, b, c, d] = unit_tet();
        let exact = orient3d_exact(&a, &b, &c, &d);
        assert_eq!(exact.estimate(), PredicateContext::new().orient3d(&a, &b, &c, &d));
        let e = Point3::new(0.25, 0.25, 0.25);
        let exact = insphere_exact(&b, &a, &c, &d, &e);
        assert_eq!(exact.sign(), 1.0);
    }
}
