//! Bounding volume hierarchy over a static triangle set.
//!
//! Nodes live in a flat arena and reference their children by index. The tree is built
//! once by median splits along the longest axis and answers box overlap, closest point,
//! segment and inside/outside queries against the surface.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use smallvec::SmallVec;

use crate::geometry::aabb::Aabb;
use crate::geometry::intersect::{
    closest_point_on_triangle, ray_triangle_intersect, segment_intersects_aabb,
    segment_triangle_intersect,
};
use crate::geometry::point::{Point3, Vector3};

/// Default maximum number of triangles per leaf.
pub const DEFAULT_MAX_LEAF_SIZE: usize = 8;

/// Ray directions used by [`Bvh::contains_point`]; deliberately off-axis so rays don't
/// graze the edges of axis-aligned tessellations.
const PARITY_DIRECTIONS: [[f64; 3]; 3] = [
    [0.857_142_9, 0.371_428_6, 0.357_142_9],
    [-0.312_5, 0.901_4, 0.299_3],
    [0.227_3, -0.391_2, 0.891_7],
];

#[derive(Debug, Clone)]
enum BvhNode {
    Leaf {
        bbox: Aabb,
        triangles: SmallVec<[u32; 8]>,
    },
    Internal {
        bbox: Aabb,
        left: usize,
        right: usize,
    },
}

impl BvhNode {
    const fn bbox(&self) -> &Aabb {
        match self {
            Self::Leaf { bbox, .. } | Self::Internal { bbox, .. } => bbox,
        }
    }
}

/// Result of [`Bvh::closest_point`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestHit {
    /// Index of the closest triangle.
    pub triangle: usize,
    /// Closest point on that triangle.
    pub point: Point3,
    /// Squared distance from the query point.
    pub distance_squared: f64,
}

/// Bounding volume hierarchy over triangles.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    triangles: Vec<[Point3; 3]>,
    root: Option<usize>,
}

impl Bvh {
    /// Build from explicit triangle corners.
    #[must_use]
    pub fn build(triangles: Vec<[Point3; 3]>, max_leaf_size: usize) -> Self {
        let mut bvh = Self {
            nodes: Vec::with_capacity(triangles.len().div_ceil(max_leaf_size.max(1)) * 2),
            triangles,
            root: None,
        };
        if bvh.triangles.is_empty() {
            return bvh;
        }
        let boxes: Vec<Aabb> = bvh
            .triangles
            .iter()
            .map(|[a, b, c]| Aabb::from_triangle(a, b, c))
            .collect();
        let mut order: Vec<u32> = (0..boxes.len())
            .map(|i| u32::try_from(i).unwrap_or(u32::MAX))
            .collect();
        let root = bvh.build_node(&boxes, &mut order, max_leaf_size.max(1));
        bvh.root = Some(root);
        bvh
    }

    /// Build from an indexed triangle list.
    #[must_use]
    pub fn from_indexed(positions: &[Point3], indices: &[[usize; 3]]) -> Self {
        let triangles = indices
            .iter()
            .map(|&[a, b, c]| [positions[a], positions[b], positions[c]])
            .collect();
        Self::build(triangles, DEFAULT_MAX_LEAF_SIZE)
    }

    fn build_node(&mut self, boxes: &[Aabb], items: &mut [u32], max_leaf: usize) -> usize {
        let mut bbox = Aabb::empty();
        for &i in items.iter() {
            bbox.expand(&boxes[i as usize]);
        }

        if items.len() <= max_leaf {
            self.nodes.push(BvhNode::Leaf {
                bbox,
                triangles: items.iter().copied().collect(),
            });
            return self.nodes.len() - 1;
        }

        let axis = bbox.longest_axis();
        let mid = items.len() / 2;
        items.select_nth_unstable_by(mid, |&a, &b| {
            let ca = boxes[a as usize].center()[axis];
            let cb = boxes[b as usize].center()[axis];
            ca.total_cmp(&cb)
        });

        // Reserve the slot so the parent precedes its children in the arena.
        let slot = self.nodes.len();
        self.nodes.push(BvhNode::Leaf {
            bbox,
            triangles: SmallVec::new(),
        });
        let (lo, hi) = items.split_at_mut(mid);
        let left = self.build_node(boxes, lo, max_leaf);
        let right = self.build_node(boxes, hi, max_leaf);
        self.nodes[slot] = BvhNode::Internal { bbox, left, right };
        slot
    }

    /// Number of triangles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.triangles.len()
    }

    /// `true` when built from no triangles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Bounds of the whole set (empty box for an empty tree).
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        self.root
            .map_or_else(Aabb::empty, |r| *self.nodes[r].bbox())
    }

    /// Corners of triangle `index`.
    #[must_use]
    pub fn triangle(&self, index: usize) -> &[Point3; 3] {
        &self.triangles[index]
    }

    fn visit<F, G>(&self, mut descend: F, mut leaf: G)
    where
        F: FnMut(&Aabb) -> bool,
        G: FnMut(usize),
    {
        let Some(root) = self.root else {
            return;
        };
        let mut stack: SmallVec<[usize; 64]> = SmallVec::new();
        stack.push(root);
        while let Some(node) = stack.pop() {
            match &self.nodes[node] {
                BvhNode::Leaf { bbox, triangles } => {
                    if descend(bbox) {
                        triangles.iter().for_each(|&t| leaf(t as usize));
                    }
                }
                BvhNode::Internal { bbox, left, right } => {
                    if descend(bbox) {
                        stack.push(*right);
                        stack.push(*left);
                    }
                }
            }
        }
    }

    /// Triangles whose bounding box overlaps `aabb`, appended to `out`.
    pub fn query(&self, aabb: &Aabb, out: &mut Vec<usize>) {
        self.visit(
            |bbox| bbox.intersects(aabb),
            |t| {
                let [a, b, c] = &self.triangles[t];
                if Aabb::from_triangle(a, b, c).intersects(aabb) {
                    out.push(t);
                }
            },
        );
    }

    /// Closest point on the surface to `p`, by best-first descent.
    #[must_use]
    pub fn closest_point(&self, p: &Point3) -> Option<ClosestHit> {
        let root = self.root?;
        let mut best: Option<ClosestHit> = None;
        let mut heap = BinaryHeap::new();
        heap.push(Reverse((OrderedFloat(self.nodes[root].bbox().distance_squared(p)), root)));

        while let Some(Reverse((OrderedFloat(d2), node))) = heap.pop() {
            if best.is_some_and(|b| d2 > b.distance_squared) {
                break;
            }
            match &self.nodes[node] {
                BvhNode::Leaf { triangles, .. } => {
                    for &t in triangles {
                        let [a, b, c] = &self.triangles[t as usize];
                        let q = closest_point_on_triangle(p, a, b, c);
                        let dist = (q - p).norm_squared();
                        if best.is_none_or(|b| dist < b.distance_squared) {
                            best = Some(ClosestHit {
                                triangle: t as usize,
                                point: q,
                                distance_squared: dist,
                            });
                        }
                    }
                }
                BvhNode::Internal { left, right, .. } => {
                    for &child in [left, right] {
                        let cd = self.nodes[child].bbox().distance_squared(p);
                        if best.is_none_or(|b| cd <= b.distance_squared) {
                            heap.push(Reverse((OrderedFloat(cd), child)));
                        }
                    }
                }
            }
        }
        best
    }

    /// Unsigned distance from `p` to the surface.
    #[must_use]
    pub fn distance(&self, p: &Point3) -> Option<f64> {
        self.closest_point(p).map(|hit| hit.distance_squared.sqrt())
    }

    /// First triangle hit by segment `a → b`, with its segment parameter.
    #[must_use]
    pub fn segment_hit(&self, a: &Point3, b: &Point3) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        self.visit(
            |bbox| segment_intersects_aabb(a, b, bbox),
            |t| {
                let [v0, v1, v2] = &self.triangles[t];
                if let Some(s) = segment_triangle_intersect(a, b, v0, v1, v2) {
                    if best.is_none_or(|(_, bs)| s < bs) {
                        best = Some((t, s));
                    }
                }
            },
        );
        best
    }

    /// Number of triangles crossed by the ray `origin + t·dir`, `t > 0`.
    #[must_use]
    pub fn count_ray_hits(&self, origin: &Point3, dir: &Vector3) -> usize {
        let extent = self.bounds().diagonal().max(1.0);
        let reach = extent + (self.bounds().center() - origin).norm();
        let far = origin + dir.normalize() * reach * 2.0;
        let mut hits = 0;
        self.visit(
            |bbox| segment_intersects_aabb(origin, &far, bbox),
            |t| {
                let [v0, v1, v2] = &self.triangles[t];
                if ray_triangle_intersect(origin, dir, v0, v1, v2, 1e-12).is_some() {
                    hits += 1;
                }
            },
        );
        hits
    }

    /// Inside test for a closed surface: majority vote of three ray-parity casts.
    #[must_use]
    pub fn contains_point(&self, p: &Point3) -> bool {
        if self.is_empty() || !self.bounds().contains(p) {
            return false;
        }
        let inside_votes = PARITY_DIRECTIONS
            .iter()
            .filter(|d| self.count_ray_hits(p, &Vector3::new(d[0], d[1], d[2])) % 2 == 1)
            .count();
        inside_votes >= 2
    }
}
