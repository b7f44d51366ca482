//! Axis-aligned bounding boxes.

use serde::{Deserialize, Serialize};

use super::point::{Point3, Vector3};

/// Axis-aligned bounding box.
///
/// An *empty* box has `min > max` on every axis; expanding it by a point yields the
/// degenerate box around that point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Create an empty (inverted) box.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    /// Create a box from its two corners.
    #[must_use]
    pub const fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point of `points`.
    #[must_use]
    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Point3>,
    {
        let mut aabb = Self::empty();
        for p in points {
            aabb.expand_point(p);
        }
        aabb
    }

    /// Box of a triangle.
    #[must_use]
    pub fn from_triangle(a: &Point3, b: &Point3, c: &Point3) -> Self {
        Self::from_points([a, b, c])
    }

    /// Cube centered at `center` with half-extent `half`.
    #[must_use]
    pub fn cube(center: &Point3, half: f64) -> Self {
        let h = Vector3::repeat(half);
        Self::new(center - h, center + h)
    }

    /// `true` if the box contains no point.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// `true` if both corners are finite and ordered.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_empty() && self.min.iter().chain(self.max.iter()).all(|c| c.is_finite())
    }

    /// Grow to include `p`.
    pub fn expand_point(&mut self, p: &Point3) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    /// Grow to include `other`.
    pub fn expand(&mut self, other: &Self) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// Union of two boxes.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        out.expand(other);
        out
    }

    /// Box grown by `pad` on every side.
    #[must_use]
    pub fn padded(&self, pad: f64) -> Self {
        let v = Vector3::repeat(pad);
        Self::new(self.min - v, self.max + v)
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> Point3 {
        nalgebra::center(&self.min, &self.max)
    }

    /// Extent along each axis.
    #[must_use]
    pub fn extent(&self) -> Vector3 {
        self.max - self.min
    }

    /// Length of the diagonal.
    #[must_use]
    pub fn diagonal(&self) -> f64 {
        self.extent().norm()
    }

    /// Largest extent over the three axes.
    #[must_use]
    pub fn max_extent(&self) -> f64 {
        self.extent().max()
    }

    /// Index of the longest axis (0 = x, 1 = y, 2 = z).
    #[must_use]
    pub fn longest_axis(&self) -> usize {
        let e = self.extent();
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }

    /// Closed containment test.
    #[must_use]
    pub fn contains(&self, p: &Point3) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// `true` if `other` lies entirely inside `self`.
    #[must_use]
    pub fn contains_aabb(&self, other: &Self) -> bool {
        self.contains(&other.min) && self.contains(&other.max)
    }

    /// Closed overlap test.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && other.min[i] <= self.max[i])
    }

    /// Point of the box closest to `p` (`p` itself when inside).
    #[must_use]
    pub fn clamp(&self, p: &Point3) -> Point3 {
        p.sup(&self.min).inf(&self.max)
    }

    /// Squared distance from `p` to the box, zero inside.
    #[must_use]
    pub fn distance_squared(&self, p: &Point3) -> f64 {
        (self.clamp(p) - p).norm_squared()
    }

    /// Octant `0..8` of `p` relative to the center (bit 0 = x, bit 1 = y, bit 2 = z).
    #[must_use]
    pub fn octant_of(&self, p: &Point3) -> usize {
        let c = self.center();
        usize::from(p.x >= c.x) | (usize::from(p.y >= c.y) << 1) | (usize::from(p.z >= c.z) << 2)
    }

    /// The eight corners, indexed like octants.
    #[must_use]
    pub fn corners(&self) -> [Point3; 8] {
        std::array::from_fn(|octant| {
            let pick = |axis: usize| {
                if octant & (1 << axis) == 0 { self.min[axis] } else { self.max[axis] }
            };
            Point3::new(pick(0), pick(1), pick(2))
        })
    }

    /// Child box for `octant` (same bit layout as [`Aabb::octant_of`]).
    #[must_use]
    pub fn octant(&self, octant: usize) -> Self {
        let c = self.center();
        let mut min = self.min;
        let mut max = c;
        for axis in 0..3 {
            if octant & (1 << axis) != 0 {
                min[axis] = c[axis];
                max[axis] = self.max[axis];
            }
        }
        Self::new(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_and_expand() {
        let mut aabb = Aabb::empty();
        assert!(aabb.is_empty());
        aabb.expand_point(&Point3::new(1.0, 2.0, 3.0));
        assert!(!aabb.is_empty());
        aabb.expand_point(&Point3::new(-1.0, 0.0, 5.0));
        assert_eq!(aabb.min, Point3::new(-1.0, 0.0, 3.0));
        assert_eq!(aabb.max, Point3::new(1.0, 2.0, 5.0));
        assert_eq!(aabb.longest_axis(), 0);
    }

    #[test]
    fn test_octants_partition_the_box() {
        let aabb = Aabb::new(Point3::origin(), Point3::new(2.0, 2.0, 2.0));
        let p = Point3::new(1.5, 0.5, 1.5);
        let octant = aabb.octant_of(&p);
        assert_eq!(octant, 0b101);
        let child = aabb.octant(octant);
        assert!(child.contains(&p));
        assert_relative_eq!(child.max_extent(), 1.0);
    }

    #[test]
    fn test_distance_and_intersection() {
        let a = Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Point3::new(1.0, 0.5, 0.5), Point3::new(2.0, 2.0, 2.0));
        let c = Aabb::new(Point3::new(3.0, 3.0, 3.0), Point3::new(4.0, 4.0, 4.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_relative_eq!(a.distance_squared(&Point3::new(2.0, 0.5, 0.5)), 1.0);
        assert_relative_eq!(a.distance_squared(&Point3::new(0.5, 0.5, 0.5)), 0.0);
    }
}
