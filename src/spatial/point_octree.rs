//! Dynamic point octree with arena-allocated nodes.
//!
//! Nodes live in a [`SlotMap`] and link to their parent and children by key, so the
//! tree can be moved freely and freed nodes are recycled by the map's free list. A
//! cached "last leaf" lets spatially coherent queries start by walking up from the
//! previous leaf instead of descending from the root.

use std::cell::Cell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::geometry::aabb::Aabb;
use crate::geometry::point::Point3;

/// Points held by a leaf before it subdivides.
pub const LEAF_CAPACITY: usize = 16;

/// Leaves at this depth never split; they absorb any number of (coincident) points.
pub const MAX_DEPTH: u8 = 24;

new_key_type! {
    /// Key of an octree node.
    pub struct OctreeNodeKey;
}

#[derive(Debug, Clone)]
enum NodeKind<T> {
    Leaf(SmallVec<[(Point3, T); LEAF_CAPACITY]>),
    Branch([OctreeNodeKey; 8]),
}

#[derive(Debug, Clone)]
struct Node<T> {
    bounds: Aabb,
    parent: Option<OctreeNodeKey>,
    depth: u8,
    kind: NodeKind<T>,
}

/// Octree over `(position, payload)` pairs inside fixed root bounds.
#[derive(Debug, Clone)]
pub struct PointOctree<T> {
    nodes: SlotMap<OctreeNodeKey, Node<T>>,
    root: OctreeNodeKey,
    len: usize,
    last_leaf: Cell<Option<OctreeNodeKey>>,
}

impl<T: Copy + PartialEq> PointOctree<T> {
    /// Empty octree covering `bounds`.
    #[must_use]
    pub fn new(bounds: Aabb) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node {
            bounds,
            parent: None,
            depth: 0,
            kind: NodeKind::Leaf(SmallVec::new()),
        });
        Self {
            nodes,
            root,
            len: 0,
            last_leaf: Cell::new(None),
        }
    }

    /// Number of stored points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// `true` when no point is stored.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Root bounds.
    #[must_use]
    pub fn bounds(&self) -> &Aabb {
        &self.nodes[self.root].bounds
    }

    /// Number of live nodes (leaves and branches).
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Containment consistent with the descent rule of [`Aabb::octant_of`]: upper faces
    /// are open except where they coincide with the root's upper faces.
    fn owns(&self, bounds: &Aabb, p: &Point3) -> bool {
        let root = &self.nodes[self.root].bounds;
        (0..3).all(|i| {
            p[i] >= bounds.min[i]
                && (p[i] < bounds.max[i] || (bounds.max[i] >= root.max[i] && p[i] <= bounds.max[i]))
        })
    }

    fn find_leaf(&self, p: &Point3) -> OctreeNodeKey {
        let mut key = self
            .last_leaf
            .get()
            .filter(|k| self.nodes.contains_key(*k))
            .unwrap_or(self.root);
        while let Some(parent) = self.nodes[key].parent {
            if self.owns(&self.nodes[key].bounds, p) {
                break;
            }
            key = parent;
        }
        while let NodeKind::Branch(children) = &self.nodes[key].kind {
            key = children[self.nodes[key].bounds.octant_of(p)];
        }
        self.last_leaf.set(Some(key));
        key
    }

    /// Insert `item` at `p`. Returns `false` if `p` lies outside the root bounds.
    pub fn insert(&mut self, p: Point3, item: T) -> bool {
        if !self.nodes[self.root].bounds.contains(&p) {
            return false;
        }
        let leaf = self.find_leaf(&p);
        let overflow = match &mut self.nodes[leaf].kind {
            NodeKind::Leaf(points) => {
                points.push((p, item));
                points.len() > LEAF_CAPACITY
            }
            NodeKind::Branch(_) => false,
        };
        self.len += 1;
        if overflow {
            self.split(leaf);
        }
        true
    }

    fn split(&mut self, leaf: OctreeNodeKey) {
        let mut pending = vec![leaf];
        while let Some(key) = pending.pop() {
            let node = &self.nodes[key];
            if node.depth >= MAX_DEPTH {
                continue;
            }
            let (bounds, depth) = (node.bounds, node.depth);
            let NodeKind::Leaf(points) = std::mem::replace(
                &mut self.nodes[key].kind,
                NodeKind::Branch([OctreeNodeKey::default(); 8]),
            ) else {
                continue;
            };
            let mut children = [OctreeNodeKey::default(); 8];
            for (octant, child) in children.iter_mut().enumerate() {
                *child = self.nodes.insert(Node {
                    bounds: bounds.octant(octant),
                    parent: Some(key),
                    depth: depth + 1,
                    kind: NodeKind::Leaf(SmallVec::new()),
                });
            }
            for (p, item) in points {
                if let NodeKind::Leaf(list) = &mut self.nodes[children[bounds.octant_of(&p)]].kind {
                    list.push((p, item));
                }
            }
            self.nodes[key].kind = NodeKind::Branch(children);
            for child in children {
                if matches!(&self.nodes[child].kind, NodeKind::Leaf(l) if l.len() > LEAF_CAPACITY) {
                    pending.push(child);
                }
            }
        }
        self.last_leaf.set(None);
    }

    /// Remove the entry `(p, item)`. Underfull sibling leaves merge back into their parent.
    pub fn remove(&mut self, p: &Point3, item: T) -> bool {
        if !self.nodes[self.root].bounds.contains(p) {
            return false;
        }
        let leaf = self.find_leaf(p);
        let removed = match &mut self.nodes[leaf].kind {
            NodeKind::Leaf(points) => points
                .iter()
                .position(|(q, it)| *it == item && q == p)
                .map(|i| points.swap_remove(i))
                .is_some(),
            NodeKind::Branch(_) => false,
        };
        if !removed {
            return false;
        }
        self.len -= 1;

        let mut current = self.nodes[leaf].parent;
        while let Some(parent) = current {
            if !self.try_merge(parent) {
                break;
            }
            current = self.nodes[parent].parent;
        }
        true
    }

    fn try_merge(&mut self, key: OctreeNodeKey) -> bool {
        let NodeKind::Branch(children) = self.nodes[key].kind else {
            return false;
        };
        let mut total = 0;
        for child in children {
            match &self.nodes[child].kind {
                NodeKind::Leaf(points) => total += points.len(),
                NodeKind::Branch(_) => return false,
            }
        }
        if total > LEAF_CAPACITY / 2 {
            return false;
        }
        let mut merged = SmallVec::new();
        for child in children {
            if let Some(Node {
                kind: NodeKind::Leaf(points),
                ..
            }) = self.nodes.remove(child)
            {
                merged.extend(points);
            }
        }
        self.nodes[key].kind = NodeKind::Leaf(merged);
        self.last_leaf.set(Some(key));
        true
    }

    /// Nearest stored point to `p`: `(item, position, squared distance)`.
    #[must_use]
    pub fn nearest(&self, p: &Point3) -> Option<(T, Point3, f64)> {
        let mut best: Option<(T, Point3, f64)> = None;
        let mut heap = BinaryHeap::new();
        let root_d2 = self.nodes[self.root].bounds.distance_squared(p);
        heap.push(Reverse((OrderedFloat(root_d2), self.root)));
        while let Some(Reverse((OrderedFloat(d2), key))) = heap.pop() {
            if best.is_some_and(|(_, _, b)| d2 > b) {
                break;
            }
            match &self.nodes[key].kind {
                NodeKind::Leaf(points) => {
                    for &(q, item) in points {
                        let dist = (q - p).norm_squared();
                        if best.is_none_or(|(_, _, b)| dist < b) {
                            best = Some((item, q, dist));
                        }
                    }
                }
                NodeKind::Branch(children) => {
                    for &child in children {
                        let cd = self.nodes[child].bounds.distance_squared(p);
                        if best.is_none_or(|(_, _, b)| cd <= b) {
                            heap.push(Reverse((OrderedFloat(cd), child)));
                        }
                    }
                }
            }
        }
        best
    }

    fn for_each_within<F>(&self, p: &Point3, radius: f64, mut f: F)
    where
        F: FnMut(&Point3, T) -> bool,
    {
        let r2 = radius * radius;
        // Start at the cached leaf's ancestor that encloses the query ball.
        let ball = Aabb::cube(p, radius);
        let mut start = self.find_leaf(p);
        while let Some(parent) = self.nodes[start].parent {
            if self.nodes[start].bounds.contains_aabb(&ball) {
                break;
            }
            start = parent;
        }
        let mut stack: SmallVec<[OctreeNodeKey; 32]> = SmallVec::new();
        stack.push(start);
        while let Some(key) = stack.pop() {
            let node = &self.nodes[key];
            if node.bounds.distance_squared(p) > r2 {
                continue;
            }
            match &node.kind {
                NodeKind::Leaf(points) => {
                    for (q, item) in points {
                        if (q - p).norm_squared() <= r2 && !f(q, *item) {
                            return;
                        }
                    }
                }
                NodeKind::Branch(children) => stack.extend(children.iter().copied()),
            }
        }
    }

    /// All entries within `radius` of `p`, appended to `out`.
    pub fn within_radius(&self, p: &Point3, radius: f64, out: &mut Vec<(T, Point3)>) {
        self.for_each_within(p, radius, |q, item| {
            out.push((item, *q));
            true
        });
    }

    /// `true` if some entry within `radius` of `p` passes `filter`.
    pub fn any_within<F>(&self, p: &Point3, radius: f64, mut filter: F) -> bool
    where
        F: FnMut(T) -> bool,
    {
        let mut found = false;
        self.for_each_within(p, radius, |_, item| {
            found = filter(item);
            !found
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn unit_tree() -> PointOctree<usize> {
        PointOctree::new(Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0)))
    }

    fn random_points(n: usize, seed: u64) -> Vec<Point3> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Point3::new(rng.random(), rng.random(), rng.random()))
            .collect()
    }

    #[test]
    fn test_insert_rejects_outside_points() {
        let mut tree = unit_tree();
        assert!(!tree.insert(Point3::new(2.0, 0.0, 0.0), 0));
        assert!(tree.insert(Point3::new(1.0, 1.0, 1.0), 1));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let points = random_points(500, 7);
        let mut tree = unit_tree();
        for (i, p) in points.iter().enumerate() {
            assert!(tree.insert(*p, i));
        }
        assert!(tree.node_count() > 1);
        for q in random_points(50, 8) {
            let (item, _, d2) = tree.nearest(&q).unwrap();
            let brute = points
                .iter()
                .map(|p| (p - q).norm_squared())
                .fold(f64::INFINITY, f64::min);
            assert_relative_eq!(d2, brute);
            assert_relative_eq!((points[item] - q).norm_squared(), brute);
        }
    }

    #[test]
    fn test_radius_queries() {
        let points = random_points(300, 11);
        let mut tree = unit_tree();
        for (i, p) in points.iter().enumerate() {
            tree.insert(*p, i);
        }
        let q = Point3::new(0.5, 0.5, 0.5);
        let mut out = Vec::new();
        tree.within_radius(&q, 0.2, &mut out);
        let expected = points.iter().filter(|p| (*p - q).norm() <= 0.2).count();
        assert_eq!(out.len(), expected);
        assert_eq!(tree.any_within(&q, 0.2, |_| true), expected > 0);
        assert!(!tree.any_within(&q, 0.2, |_| false));
    }

    #[test]
    fn test_remove_merges_back() {
        let points = random_points(200, 3);
        let mut tree = unit_tree();
        for (i, p) in points.iter().enumerate() {
            tree.insert(*p, i);
        }
        let peak = tree.node_count();
        assert!(!tree.remove(&points[0], 999));
        for (i, p) in points.iter().enumerate() {
            assert!(tree.remove(p, i), "failed to remove {i}");
        }
        assert!(tree.is_empty());
        assert!(tree.node_count() < peak);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_coincident_points_stop_at_max_depth() {
        let mut tree = unit_tree();
        let p = Point3::new(0.25, 0.25, 0.25);
        for i in 0..(LEAF_CAPACITY * 3) {
            assert!(tree.insert(p, i));
        }
        assert_eq!(tree.len(), LEAF_CAPACITY * 3);
        let mut out = Vec::new();
        tree.within_radius(&p, 0.0, &mut out);
        assert_eq!(out.len(), LEAF_CAPACITY * 3);
    }
}
