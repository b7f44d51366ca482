//! Octree over bounding boxes of mesh elements (front triangles, cells).
//!
//! An element is stored in the deepest node whose box fully contains its AABB, so
//! every element lives in exactly one node and removal retraces the insertion path.
//! Nodes subdivide once they hold more than [`CELL_CAPACITY`] elements that would fit a
//! child.

use std::cell::Cell;

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::geometry::aabb::Aabb;
use crate::geometry::intersect::segment_intersects_aabb;
use crate::geometry::point::Point3;

/// Elements held by a node before it subdivides.
pub const CELL_CAPACITY: usize = 8;

const MAX_CELL_DEPTH: u8 = 16;

new_key_type! {
    /// Key of a cell-octree node.
    pub struct CellNodeKey;
}

#[derive(Debug, Clone)]
struct CellNode<T> {
    bounds: Aabb,
    parent: Option<CellNodeKey>,
    depth: u8,
    items: SmallVec<[(Aabb, T); CELL_CAPACITY]>,
    children: Option<[CellNodeKey; 8]>,
}

/// Octree of `(AABB, element)` pairs.
#[derive(Debug, Clone)]
pub struct CellOctree<T> {
    nodes: SlotMap<CellNodeKey, CellNode<T>>,
    root: CellNodeKey,
    len: usize,
    last_node: Cell<Option<CellNodeKey>>,
}

fn child_fitting(bounds: &Aabb, aabb: &Aabb) -> Option<usize> {
    let octant = bounds.octant_of(&aabb.min);
    (octant == bounds.octant_of(&aabb.max)).then_some(octant)
}

impl<T: Copy + PartialEq> CellOctree<T> {
    /// Empty octree covering `bounds`.
    #[must_use]
    pub fn new(bounds: Aabb) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(CellNode {
            bounds,
            parent: None,
            depth: 0,
            items: SmallVec::new(),
            children: None,
        });
        Self {
            nodes,
            root,
            len: 0,
            last_node: Cell::new(None),
        }
    }

    /// Number of stored elements.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// `true` when empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest existing node that should hold `aabb`, starting from the cached node.
    fn home_node(&self, aabb: &Aabb) -> CellNodeKey {
        let mut key = self
            .last_node
            .get()
            .filter(|k| self.nodes.contains_key(*k))
            .unwrap_or(self.root);
        while let Some(parent) = self.nodes[key].parent {
            if self.nodes[key].bounds.contains_aabb(aabb) {
                break;
            }
            key = parent;
        }
        loop {
            let node = &self.nodes[key];
            let Some(children) = node.children else {
                break;
            };
            match child_fitting(&node.bounds, aabb) {
                Some(octant) if node.bounds.octant(octant).contains_aabb(aabb) => {
                    key = children[octant];
                }
                _ => break,
            }
        }
        self.last_node.set(Some(key));
        key
    }

    /// Insert an element. Boxes outside the root bounds are kept at the root.
    pub fn insert(&mut self, aabb: Aabb, item: T) {
        let key = self.home_node(&aabb);
        self.nodes[key].items.push((aabb, item));
        self.len += 1;
        let node = &self.nodes[key];
        if node.children.is_none()
            && node.items.len() > CELL_CAPACITY
            && node.depth < MAX_CELL_DEPTH
        {
            self.subdivide(key);
        }
    }

    fn subdivide(&mut self, key: CellNodeKey) {
        let (bounds, depth) = (self.nodes[key].bounds, self.nodes[key].depth);
        let mut children = [CellNodeKey::default(); 8];
        for (octant, child) in children.iter_mut().enumerate() {
            *child = self.nodes.insert(CellNode {
                bounds: bounds.octant(octant),
                parent: Some(key),
                depth: depth + 1,
                items: SmallVec::new(),
                children: None,
            });
        }
        let items = std::mem::take(&mut self.nodes[key].items);
        for (aabb, item) in items {
            let target = child_fitting(&bounds, &aabb)
                .filter(|&o| bounds.octant(o).contains_aabb(&aabb))
                .map_or(key, |o| children[o]);
            self.nodes[target].items.push((aabb, item));
        }
        self.nodes[key].children = Some(children);
        for child in children {
            let node = &self.nodes[child];
            if node.items.len() > CELL_CAPACITY && node.depth < MAX_CELL_DEPTH {
                self.subdivide(child);
            }
        }
    }

    /// Remove an element previously inserted with the same `aabb`.
    pub fn remove(&mut self, aabb: &Aabb, item: T) -> bool {
        let home = self.home_node(aabb);
        let found = if self.nodes[home].items.iter().any(|(_, it)| *it == item) {
            Some(home)
        } else {
            // Boxes lying exactly on a split plane may sit in a sibling of the home node.
            self.nodes
                .iter()
                .find(|(_, n)| n.items.iter().any(|(_, it)| *it == item))
                .map(|(k, _)| k)
        };
        let Some(key) = found else {
            return false;
        };
        let items = &mut self.nodes[key].items;
        if let Some(pos) = items.iter().position(|(_, it)| *it == item) {
            items.swap_remove(pos);
        }
        self.len -= 1;

        let mut current = Some(key);
        while let Some(k) = current {
            if !self.try_prune(k) && self.nodes[k].children.is_some() {
                break;
            }
            current = self.nodes[k].parent;
        }
        true
    }

    /// Drop the children of `key` when they are all empty leaves.
    fn try_prune(&mut self, key: CellNodeKey) -> bool {
        let Some(children) = self.nodes[key].children else {
            return false;
        };
        let all_empty = children
            .iter()
            .all(|&c| self.nodes[c].children.is_none() && self.nodes[c].items.is_empty());
        if !all_empty {
            return false;
        }
        for child in children {
            self.nodes.remove(child);
        }
        self.nodes[key].children = None;
        self.last_node.set(Some(key));
        true
    }

    fn visit<F, G>(&self, mut descend: F, mut emit: G)
    where
        F: FnMut(&Aabb) -> bool,
        G: FnMut(&Aabb, T),
    {
        let mut stack: SmallVec<[CellNodeKey; 32]> = SmallVec::new();
        stack.push(self.root);
        let mut root = true;
        while let Some(key) = stack.pop() {
            let node = &self.nodes[key];
            // Out-of-bounds items live at the root, so the root is always scanned.
            if !root && !descend(&node.bounds) {
                continue;
            }
            root = false;
            for (aabb, item) in &node.items {
                if descend(aabb) {
                    emit(aabb, *item);
                }
            }
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
    }

    /// Elements whose box overlaps `aabb`, appended to `out`.
    pub fn query(&self, aabb: &Aabb, out: &mut Vec<T>) {
        self.visit(|b| b.intersects(aabb), |_, item| out.push(item));
    }

    /// Elements whose box is touched by segment `a → b`, appended to `out`.
    pub fn query_segment(&self, a: &Point3, b: &Point3, out: &mut Vec<T>) {
        self.visit(|bx| segment_intersects_aabb(a, b, bx), |_, item| out.push(item));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_box(x: f64, y: f64, z: f64) -> Aabb {
        Aabb::cube(&Point3::new(x, y, z), 0.01)
    }

    #[test]
    fn test_insert_query_remove() {
        let mut tree = CellOctree::new(Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0)));
        let mut boxes = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                let f = |k: usize| 0.05 + 0.1 * k as f64;
                boxes.push(small_box(f(i), f(j), 0.3));
            }
        }
        for (i, b) in boxes.iter().enumerate() {
            tree.insert(*b, i);
        }
        assert_eq!(tree.len(), 100);
        assert!(tree.node_count() > 1);

        let mut out = Vec::new();
        tree.query(&Aabb::new(Point3::new(0.0, 0.0, 0.2), Point3::new(0.22, 0.22, 0.4)), &mut out);
        out.sort_unstable();
        assert_eq!(out, vec![0, 1, 10, 11]);

        out.clear();
        tree.query_segment(&Point3::new(0.05, 0.05, 0.0), &Point3::new(0.05, 0.05, 1.0), &mut out);
        assert_eq!(out, vec![0]);

        for (i, b) in boxes.iter().enumerate() {
            assert!(tree.remove(b, i));
        }
        assert!(tree.is_empty());
        assert_eq!(tree.node_count(), 1);
        assert!(!tree.remove(&boxes[0], 0));
    }

    #[test]
    fn test_straddling_and_outside_boxes() {
        let mut tree = CellOctree::new(Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0)));
        let straddle = Aabb::new(Point3::new(0.4, 0.4, 0.4), Point3::new(0.6, 0.6, 0.6));
        let outside = Aabb::new(Point3::new(2.0, 2.0, 2.0), Point3::new(3.0, 3.0, 3.0));
        tree.insert(straddle, 1_u32);
        tree.insert(outside, 2_u32);
        let mut out = Vec::new();
        tree.query(&Aabb::cube(&Point3::new(2.5, 2.5, 2.5), 0.1), &mut out);
        assert_eq!(out, vec![2]);
        assert!(tree.remove(&outside, 2));
        assert!(tree.remove(&straddle, 1));
    }
}
