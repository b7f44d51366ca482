//! Stable edge identities.
//!
//! Directed edge handles change whenever a flip, split or collapse rewrites a triangle.
//! A [`StableEdgeId`] names an undirected edge for its whole life: the table below maps
//! it to one of the edge's current half-edges and stores its [`EdgeFlags`]. Retired ids
//! are recycled through a free list.

use serde::{Deserialize, Serialize};

use crate::core::handles::{EdgeHandle, StableEdgeId};

bitflags::bitflags! {
    /// Per-edge marks that must follow an edge through topological changes.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EdgeFlags: u8 {
        /// Edge on an open border of the surface.
        const BOUNDARY = 0b0000_0001;
        /// Sharp feature curve.
        const FEATURE = 0b0000_0010;
        /// Edge of the current advancing front.
        const FRONT = 0b0000_0100;
    }
}

/// Stable id table: id → current half-edge plus flags, with id recycling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableEdges {
    to_edge: Vec<EdgeHandle>,
    flags: Vec<EdgeFlags>,
    free: Vec<StableEdgeId>,
}

impl StableEdges {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty table with room for `capacity` ids.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            to_edge: Vec::with_capacity(capacity),
            flags: Vec::with_capacity(capacity),
            free: Vec::new(),
        }
    }

    /// Allocate an id for `edge`, reusing a retired id when available.
    pub fn allocate(&mut self, edge: EdgeHandle, flags: EdgeFlags) -> StableEdgeId {
        if let Some(id) = self.free.pop() {
            self.to_edge[id.index()] = edge;
            self.flags[id.index()] = flags;
            id
        } else {
            self.to_edge.push(edge);
            self.flags.push(flags);
            StableEdgeId::new(self.to_edge.len() - 1)
        }
    }

    /// Retire `id`; it may be handed out again by [`StableEdges::allocate`].
    pub fn release(&mut self, id: StableEdgeId) {
        if self.is_live(id) {
            self.to_edge[id.index()] = EdgeHandle::NONE;
            self.flags[id.index()] = EdgeFlags::empty();
            self.free.push(id);
        }
    }

    /// `true` if `id` names a live edge.
    #[must_use]
    pub fn is_live(&self, id: StableEdgeId) -> bool {
        self.to_edge.get(id.index()).is_some_and(|e| e.is_some())
    }

    /// Current half-edge of `id`.
    #[must_use]
    pub fn edge(&self, id: StableEdgeId) -> Option<EdgeHandle> {
        self.to_edge.get(id.index()).and_then(|e| e.get())
    }

    /// Point `id` at a new half-edge.
    pub fn set_edge(&mut self, id: StableEdgeId, edge: EdgeHandle) {
        if let Some(slot) = self.to_edge.get_mut(id.index()) {
            *slot = edge;
        }
    }

    /// Flags of `id` (empty for retired ids).
    #[must_use]
    pub fn flags(&self, id: StableEdgeId) -> EdgeFlags {
        self.flags.get(id.index()).copied().unwrap_or_default()
    }

    /// Replace the flags of `id`.
    pub fn set_flags(&mut self, id: StableEdgeId, flags: EdgeFlags) {
        if let Some(slot) = self.flags.get_mut(id.index()) {
            *slot = flags;
        }
    }

    /// Add `flags` to `id`.
    pub fn mark(&mut self, id: StableEdgeId, flags: EdgeFlags) {
        if let Some(slot) = self.flags.get_mut(id.index()) {
            *slot |= flags;
        }
    }

    /// Number of live ids.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.to_edge.len() - self.free.len()
    }

    /// Size of the id space, including retired ids.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.to_edge.len()
    }

    /// Iterate live ids.
    pub fn live_ids(&self) -> impl Iterator<Item = StableEdgeId> + '_ {
        self.to_edge
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_some())
            .map(|(i, _)| StableEdgeId::new(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let mut f = EdgeFlags::BOUNDARY | EdgeFlags::FRONT;
        assert!(f.contains(EdgeFlags::BOUNDARY));
        assert!(!f.contains(EdgeFlags::FEATURE));
        assert!(f.intersects(EdgeFlags::FEATURE | EdgeFlags::FRONT));
        f.remove(EdgeFlags::FRONT);
        assert_eq!(f, EdgeFlags::BOUNDARY);
        assert_eq!(format!("{f:?}"), "EdgeFlags(BOUNDARY)");
        assert!(EdgeFlags::default().is_empty());
    }

    #[test]
    fn test_flags_serialize_by_name() {
        let flags = EdgeFlags::BOUNDARY | EdgeFlags::FEATURE;
        let json = serde_json::to_string(&flags).unwrap();
        assert_eq!(json, "\"BOUNDARY | FEATURE\"");
        assert_eq!(serde_json::from_str::<EdgeFlags>(&json).unwrap(), flags);
    }

    #[test]
    fn test_allocate_release_recycles_ids() {
        let mut table = StableEdges::new();
        let a = table.allocate(EdgeHandle::new(0), EdgeFlags::empty());
        let b = table.allocate(EdgeHandle::new(3), EdgeFlags::FEATURE);
        assert_eq!(table.live_count(), 2);
        assert_eq!(table.edge(b), Some(EdgeHandle::new(3)));
        assert_eq!(table.flags(b), EdgeFlags::FEATURE);

        table.release(a);
        assert!(!table.is_live(a));
        assert_eq!(table.edge(a), None);
        assert_eq!(table.live_count(), 1);

        let c = table.allocate(EdgeHandle::new(7), EdgeFlags::BOUNDARY);
        assert_eq!(c, a);
        assert_eq!(table.live_ids().count(), 2);
    }
}
