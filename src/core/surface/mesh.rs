//! Twin-edge triangle mesh with stable edge identities.
//!
//! Triangles are stored as vertex triples; the `i`-th half-edge of triangle `t` is
//! [`EdgeHandle`] `3t + i` and runs from vertex `i` to vertex `(i + 1) % 3`. For every
//! half-edge a parallel array stores its twin in the neighboring triangle, or
//! [`EdgeHandle::NONE`] on an open border. Deleted triangles stay in place, flagged,
//! and are recycled through a free list. Vertices are append-only.

use serde::{Deserialize, Serialize};

use crate::core::collections::{
    Entry, FastHashMap, RingBuffer, SmallBuffer, fast_hash_map_with_capacity,
};
use crate::core::handles::{EdgeHandle, StableEdgeId, TriId, VertexId};
use crate::core::surface::stable::{EdgeFlags, StableEdges};
use crate::core::validation::TopologyError;
use crate::geometry::aabb::Aabb;
use crate::geometry::point::{Point3, Vector3, is_finite, triangle_normal, try_normalize};

/// Upper bound on one-ring traversal steps; guards against corrupted rings.
const MAX_RING_STEPS: usize = 4096;

/// Errors raised while building a [`SurfaceMesh`] from a triangle soup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceMeshError {
    /// A triangle references a vertex index past the end of the position array.
    #[error("triangle {triangle} references vertex {vertex}, but only {count} vertices exist")]
    VertexOutOfBounds {
        /// Triangle index in the input.
        triangle: usize,
        /// Offending vertex index.
        vertex: usize,
        /// Number of positions.
        count: usize,
    },
    /// A triangle repeats a vertex.
    #[error("triangle {triangle} is degenerate (repeated vertex)")]
    DegenerateTriangle {
        /// Triangle index in the input.
        triangle: usize,
    },
    /// A directed edge occurs twice: more than two triangles on an edge, or
    /// inconsistent orientation.
    #[error("edge {from} -> {to} is non-manifold or inconsistently oriented")]
    NonManifoldEdge {
        /// Edge origin.
        from: usize,
        /// Edge destination.
        to: usize,
    },
    /// A position is NaN or infinite.
    #[error("vertex {vertex} has a non-finite position")]
    NonFinitePosition {
        /// Offending vertex.
        vertex: usize,
    },
}

/// A mutable 2-manifold triangle mesh with boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMesh {
    pub(crate) positions: Vec<Point3>,
    pub(crate) normals: Vec<Vector3>,
    /// One outgoing half-edge per vertex; the most clockwise one on a border vertex.
    pub(crate) vertex_edge: Vec<EdgeHandle>,
    pub(crate) tri_verts: Vec<[VertexId; 3]>,
    pub(crate) twins: Vec<EdgeHandle>,
    pub(crate) edge_ids: Vec<StableEdgeId>,
    pub(crate) deleted: Vec<bool>,
    pub(crate) free_tris: Vec<TriId>,
    pub(crate) stable: StableEdges,
}

impl SurfaceMesh {
    /// Build a mesh from positions and counterclockwise triangles.
    ///
    /// Twins are paired through a directed-edge hash; open edges get
    /// [`EdgeFlags::BOUNDARY`]. Vertex normals are area weighted.
    ///
    /// # Errors
    ///
    /// Returns a [`SurfaceMeshError`] for out-of-range or repeated indices, non-finite
    /// positions, and non-manifold or inconsistently oriented edges.
    pub fn from_triangles(
        positions: Vec<Point3>,
        triangles: &[[usize; 3]],
    ) -> Result<Self, SurfaceMeshError> {
        if let Some(vertex) = positions.iter().position(|p| !is_finite(p)) {
            return Err(SurfaceMeshError::NonFinitePosition { vertex });
        }
        let count = positions.len();
        let mut directed: FastHashMap<(usize, usize), EdgeHandle> =
            fast_hash_map_with_capacity(triangles.len() * 3);
        let mut tri_verts = Vec::with_capacity(triangles.len());

        for (triangle, tri) in triangles.iter().enumerate() {
            if let Some(&vertex) = tri.iter().find(|&&v| v >= count) {
                return Err(SurfaceMeshError::VertexOutOfBounds {
                    triangle,
                    vertex,
                    count,
                });
            }
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[2] == tri[0] {
                return Err(SurfaceMeshError::DegenerateTriangle { triangle });
            }
            let t = TriId::new(triangle);
            for i in 0..3 {
                let key = (tri[i], tri[(i + 1) % 3]);
                match directed.entry(key) {
                    Entry::Occupied(_) => {
                        return Err(SurfaceMeshError::NonManifoldEdge {
                            from: key.0,
                            to: key.1,
                        });
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(t.edge(i));
                    }
                }
            }
            tri_verts.push(tri.map(VertexId::new));
        }

        let edge_count = triangles.len() * 3;
        let mut mesh = Self {
            normals: vec![Vector3::zeros(); count],
            vertex_edge: vec![EdgeHandle::NONE; count],
            positions,
            tri_verts,
            twins: vec![EdgeHandle::NONE; edge_count],
            edge_ids: vec![StableEdgeId::NONE; edge_count],
            deleted: vec![false; triangles.len()],
            free_tris: Vec::new(),
            stable: StableEdges::with_capacity(edge_count / 2 + 1),
        };

        for (&(from, to), &edge) in &directed {
            if let Some(&twin) = directed.get(&(to, from)) {
                mesh.twins[edge.index()] = twin;
            }
        }
        for e in 0..edge_count {
            let edge = EdgeHandle::new(e);
            if mesh.edge_ids[e].is_some() {
                continue;
            }
            let twin = mesh.twins[e];
            let flags = if twin.is_none() {
                EdgeFlags::BOUNDARY
            } else {
                EdgeFlags::empty()
            };
            let id = mesh.stable.allocate(edge, flags);
            mesh.edge_ids[e] = id;
            if twin.is_some() {
                mesh.edge_ids[twin.index()] = id;
            }
        }
        for t in 0..mesh.tri_verts.len() {
            let tri = TriId::new(t);
            for i in 0..3 {
                let v = mesh.tri_verts[t][i];
                if mesh.vertex_edge[v.index()].is_none() {
                    mesh.vertex_edge[v.index()] = tri.edge(i);
                }
            }
        }
        for v in 0..count {
            mesh.refresh_vertex_edge(VertexId::new(v));
        }
        mesh.compute_normals();
        Ok(mesh)
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Number of vertex slots (including vertices orphaned by collapses).
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of live triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.tri_verts.len() - self.free_tris.len()
    }

    /// Size of the triangle arena including deleted slots.
    #[must_use]
    pub fn triangle_capacity(&self) -> usize {
        self.tri_verts.len()
    }

    /// Vertex positions.
    #[must_use]
    pub fn positions(&self) -> &[Point3] {
        &self.positions
    }

    /// Position of `v`.
    #[must_use]
    pub fn position(&self, v: VertexId) -> Point3 {
        self.positions[v.index()]
    }

    /// Unit normal of `v` (zero for isolated vertices).
    #[must_use]
    pub fn normal(&self, v: VertexId) -> Vector3 {
        self.normals[v.index()]
    }

    /// `true` if `v` is referenced by at least one live triangle.
    #[must_use]
    pub fn is_vertex_live(&self, v: VertexId) -> bool {
        self.vertex_edge.get(v.index()).is_some_and(|e| e.is_some())
    }

    /// `true` if `t` is deleted or out of range.
    #[must_use]
    pub fn is_deleted(&self, t: TriId) -> bool {
        self.deleted.get(t.index()).is_none_or(|&d| d)
    }

    /// Iterate live triangles.
    pub fn triangles(&self) -> impl Iterator<Item = TriId> + '_ {
        self.deleted
            .iter()
            .enumerate()
            .filter(|(_, d)| !**d)
            .map(|(i, _)| TriId::new(i))
    }

    /// Vertices of `t`, counterclockwise.
    #[must_use]
    pub fn tri_vertices(&self, t: TriId) -> [VertexId; 3] {
        self.tri_verts[t.index()]
    }

    /// Corner positions of `t`.
    #[must_use]
    pub fn tri_points(&self, t: TriId) -> [Point3; 3] {
        self.tri_vertices(t).map(|v| self.position(v))
    }

    /// Unnormalized normal of `t` (length = twice the area).
    #[must_use]
    pub fn tri_normal(&self, t: TriId) -> Vector3 {
        let [a, b, c] = self.tri_points(t);
        triangle_normal(&a, &b, &c)
    }

    /// Centroid of `t`.
    #[must_use]
    pub fn tri_centroid(&self, t: TriId) -> Point3 {
        let [a, b, c] = self.tri_points(t);
        Point3::from((a.coords + b.coords + c.coords) / 3.0)
    }

    /// Twin of `e`, [`EdgeHandle::NONE`] on a border.
    #[must_use]
    pub fn twin(&self, e: EdgeHandle) -> EdgeHandle {
        self.twins[e.index()]
    }

    /// Origin vertex of `e`.
    #[must_use]
    pub fn edge_origin(&self, e: EdgeHandle) -> VertexId {
        self.tri_verts[e.tri().index()][e.local()]
    }

    /// Destination vertex of `e`.
    #[must_use]
    pub fn edge_dest(&self, e: EdgeHandle) -> VertexId {
        self.tri_verts[e.tri().index()][(e.local() + 1) % 3]
    }

    /// Vertex of `e`'s triangle opposite to `e`.
    #[must_use]
    pub fn edge_opposite(&self, e: EdgeHandle) -> VertexId {
        self.tri_verts[e.tri().index()][(e.local() + 2) % 3]
    }

    /// `(origin, destination)` of `e`.
    #[must_use]
    pub fn edge_vertices(&self, e: EdgeHandle) -> (VertexId, VertexId) {
        (self.edge_origin(e), self.edge_dest(e))
    }

    /// Length of `e`.
    #[must_use]
    pub fn edge_length(&self, e: EdgeHandle) -> f64 {
        let (a, b) = self.edge_vertices(e);
        (self.position(b) - self.position(a)).norm()
    }

    /// `true` if `e` lies on an open border.
    #[must_use]
    pub fn is_boundary_edge(&self, e: EdgeHandle) -> bool {
        self.twin(e).is_none()
    }

    /// Stable id of `e`.
    #[must_use]
    pub fn stable_id(&self, e: EdgeHandle) -> StableEdgeId {
        self.edge_ids[e.index()]
    }

    /// Current half-edge of a stable id, `None` if the id was retired.
    #[must_use]
    pub fn edge_of(&self, id: StableEdgeId) -> Option<EdgeHandle> {
        self.stable.edge(id)
    }

    /// Flags of a stable edge.
    #[must_use]
    pub fn edge_flags(&self, id: StableEdgeId) -> EdgeFlags {
        self.stable.flags(id)
    }

    /// Add flags to a stable edge.
    pub fn mark_edge(&mut self, id: StableEdgeId, flags: EdgeFlags) {
        self.stable.mark(id, flags);
    }

    /// Remove flags from a stable edge.
    pub fn unmark_edge(&mut self, id: StableEdgeId, flags: EdgeFlags) {
        let mut current = self.stable.flags(id);
        current.remove(flags);
        self.stable.set_flags(id, current);
    }

    /// The stable-id table.
    #[must_use]
    pub const fn stable_edges(&self) -> &StableEdges {
        &self.stable
    }

    /// Live stable ids carrying any of `flags`.
    pub fn edges_with(&self, flags: EdgeFlags) -> impl Iterator<Item = StableEdgeId> + '_ {
        self.stable
            .live_ids()
            .filter(move |&id| self.stable.flags(id).intersects(flags))
    }

    /// Bounding box of all vertices referenced by live triangles.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        let mut aabb = Aabb::empty();
        for t in self.triangles() {
            for p in &self.tri_points(t) {
                aabb.expand_point(p);
            }
        }
        aabb
    }

    /// `true` if no live triangle has an open edge.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.triangles()
            .all(|t| (0..3).all(|i| self.twin(t.edge(i)).is_some()))
    }

    /// Triangle list of the live mesh as raw indices.
    #[must_use]
    pub fn indexed_triangles(&self) -> Vec<[usize; 3]> {
        self.triangles()
            .map(|t| self.tri_vertices(t).map(VertexId::index))
            .collect()
    }

    // =========================================================================
    // RING TRAVERSAL
    // =========================================================================

    /// Outgoing half-edge of `v`, most clockwise for border vertices.
    #[must_use]
    pub fn vertex_edge(&self, v: VertexId) -> EdgeHandle {
        self.vertex_edge[v.index()]
    }

    /// Next outgoing half-edge counterclockwise around its origin, `NONE` at a border.
    #[must_use]
    pub fn rotate_ccw(&self, e: EdgeHandle) -> EdgeHandle {
        self.twin(e.prev())
    }

    /// Next outgoing half-edge clockwise around its origin, `NONE` at a border.
    #[must_use]
    pub fn rotate_cw(&self, e: EdgeHandle) -> EdgeHandle {
        let twin = self.twin(e);
        if twin.is_none() { EdgeHandle::NONE } else { twin.next() }
    }

    /// Outgoing half-edges of `v`, counterclockwise, starting at the border if any.
    #[must_use]
    pub fn outgoing_edges(&self, v: VertexId) -> SmallBuffer<EdgeHandle, 8> {
        let mut out = SmallBuffer::new();
        let start = self.vertex_edge(v);
        if start.is_none() {
            return out;
        }
        let mut e = start;
        for _ in 0..MAX_RING_STEPS {
            out.push(e);
            e = self.rotate_ccw(e);
            if e.is_none() || e == start {
                break;
            }
        }
        out
    }

    /// Live triangles incident to `v`.
    #[must_use]
    pub fn vertex_triangles(&self, v: VertexId) -> SmallBuffer<TriId, 8> {
        self.outgoing_edges(v).iter().map(|e| e.tri()).collect()
    }

    /// Neighbor vertices of `v`, counterclockwise. For a border vertex the last
    /// neighbor closes the open fan.
    #[must_use]
    pub fn one_ring(&self, v: VertexId) -> RingBuffer {
        let edges = self.outgoing_edges(v);
        let mut ring: RingBuffer = edges.iter().map(|&e| self.edge_dest(e)).collect();
        if let Some(&last) = edges.last() {
            if self.rotate_ccw(last).is_none() {
                ring.push(self.edge_origin(last.prev()));
            }
        }
        ring
    }

    /// `true` if `v` lies on an open border.
    #[must_use]
    pub fn is_boundary_vertex(&self, v: VertexId) -> bool {
        let e = self.vertex_edge(v);
        e.is_some() && self.twin(e).is_none()
    }

    /// A half-edge between `a` and `b`, preferring the one running `a → b`.
    #[must_use]
    pub fn find_edge(&self, a: VertexId, b: VertexId) -> Option<EdgeHandle> {
        self.outgoing_edges(a)
            .into_iter()
            .find(|&e| self.edge_dest(e) == b)
            .or_else(|| {
                self.outgoing_edges(b)
                    .into_iter()
                    .find(|&e| self.edge_dest(e) == a)
            })
    }

    /// `true` if an edge between `a` and `b` exists in either direction.
    #[must_use]
    pub fn has_edge(&self, a: VertexId, b: VertexId) -> bool {
        self.find_edge(a, b).is_some()
    }

    /// Re-point `v`'s cached edge at a live outgoing edge, rotated clockwise to a
    /// border when there is one.
    pub(crate) fn refresh_vertex_edge(&mut self, v: VertexId) {
        let mut e = self.vertex_edge[v.index()];
        if e.is_none() || self.is_deleted(e.tri()) || self.edge_origin(e) != v {
            return;
        }
        let start = e;
        for _ in 0..MAX_RING_STEPS {
            let cw = self.rotate_cw(e);
            if cw.is_none() || cw == start {
                break;
            }
            e = cw;
        }
        self.vertex_edge[v.index()] = e;
    }

    /// Set `v`'s cached edge from any triangle known to contain it.
    pub(crate) fn anchor_vertex(&mut self, v: VertexId, t: TriId) {
        if let Some(i) = self.tri_verts[t.index()].iter().position(|&x| x == v) {
            self.vertex_edge[v.index()] = t.edge(i);
            self.refresh_vertex_edge(v);
        }
    }

    // =========================================================================
    // GEOMETRY
    // =========================================================================

    /// Recompute area-weighted unit vertex normals.
    pub fn compute_normals(&mut self) {
        self.normals.iter_mut().for_each(|n| *n = Vector3::zeros());
        for t in 0..self.tri_verts.len() {
            if self.deleted[t] {
                continue;
            }
            let n = self.tri_normal(TriId::new(t));
            for v in self.tri_verts[t] {
                self.normals[v.index()] += n;
            }
        }
        for n in &mut self.normals {
            *n = try_normalize(n).unwrap_or_else(Vector3::zeros);
        }
    }

    /// Area-weighted unit normal of `v` from its current fan.
    #[must_use]
    pub fn fan_normal(&self, v: VertexId) -> Vector3 {
        let sum: Vector3 = self
            .vertex_triangles(v)
            .iter()
            .map(|&t| self.tri_normal(t))
            .sum();
        try_normalize(&sum).unwrap_or_else(Vector3::zeros)
    }

    /// Angle between the normals of the two triangles of an interior edge, in radians.
    #[must_use]
    pub fn dihedral_deviation(&self, e: EdgeHandle) -> Option<f64> {
        let twin = self.twin(e);
        if twin.is_none() {
            return None;
        }
        let n0 = try_normalize(&self.tri_normal(e.tri()))?;
        let n1 = try_normalize(&self.tri_normal(twin.tri()))?;
        Some(n0.dot(&n1).clamp(-1.0, 1.0).acos())
    }

    /// Mark interior edges whose dihedral deviation exceeds `angle_deg` as
    /// [`EdgeFlags::FEATURE`]. Returns the number of newly marked edges.
    pub fn detect_feature_edges(&mut self, angle_deg: f64) -> usize {
        let threshold = angle_deg.to_radians();
        let candidates: Vec<StableEdgeId> = self
            .stable
            .live_ids()
            .filter(|&id| {
                !self.stable.flags(id).contains(EdgeFlags::FEATURE)
                    && self
                        .stable
                        .edge(id)
                        .and_then(|e| self.dihedral_deviation(e))
                        .is_some_and(|angle| angle > threshold)
            })
            .collect();
        for &id in &candidates {
            self.stable.mark(id, EdgeFlags::FEATURE);
        }
        tracing::debug!(marked = candidates.len(), angle_deg, "detected feature edges");
        candidates.len()
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Check twin symmetry, twin endpoint agreement, stable-id round trips and the
    /// cached vertex edges.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant as a [`TopologyError`].
    pub fn validate_adjacency(&self) -> Result<(), TopologyError> {
        for t in self.triangles() {
            for i in 0..3 {
                let edge = t.edge(i);
                let twin = self.twin(edge);
                if twin.is_some() {
                    if self.is_deleted(twin.tri()) {
                        return Err(TopologyError::DeletedTriangleNeighbor { tri: t, edge });
                    }
                    let back = self.twin(twin);
                    if back != edge {
                        return Err(TopologyError::AsymmetricEdge { edge, twin, back });
                    }
                    if self.edge_origin(edge) != self.edge_dest(twin)
                        || self.edge_dest(edge) != self.edge_origin(twin)
                    {
                        return Err(TopologyError::MismatchedTwin { edge, twin });
                    }
                }
                let id = self.stable_id(edge);
                let resolved = self.stable.edge(id);
                let twin_shares_id = twin.is_none() || self.stable_id(twin) == id;
                if resolved.is_none_or(|r| r != edge && r != twin) || !twin_shares_id {
                    return Err(TopologyError::StableIdMismatch { edge, id });
                }
            }
        }
        for v in 0..self.vertex_edge.len() {
            let edge = self.vertex_edge[v];
            if edge.is_some()
                && (self.is_deleted(edge.tri()) || self.edge_origin(edge) != VertexId::new(v))
            {
                return Err(TopologyError::StaleVertexEdge {
                    vertex: VertexId::new(v),
                    edge,
                });
            }
        }
        Ok(())
    }

    // =========================================================================
    // LOW-LEVEL MUTATION
    // =========================================================================

    /// Append a vertex.
    pub fn add_vertex(&mut self, position: Point3, normal: Vector3) -> VertexId {
        self.positions.push(position);
        self.normals.push(normal);
        self.vertex_edge.push(EdgeHandle::NONE);
        VertexId::new(self.positions.len() - 1)
    }

    /// Allocate a triangle slot (recycled when possible); contents are unset.
    pub(crate) fn alloc_tri(&mut self) -> TriId {
        if let Some(t) = self.free_tris.pop() {
            self.deleted[t.index()] = false;
            t
        } else {
            self.tri_verts.push([VertexId::NONE; 3]);
            self.twins.extend([EdgeHandle::NONE; 3]);
            self.edge_ids.extend([StableEdgeId::NONE; 3]);
            self.deleted.push(false);
            TriId::new(self.tri_verts.len() - 1)
        }
    }

    /// Delete `t`, clearing its half-edges. Neighbors are not touched.
    pub(crate) fn free_tri(&mut self, t: TriId) {
        if self.is_deleted(t) {
            return;
        }
        self.deleted[t.index()] = true;
        for i in 0..3 {
            let e = t.edge(i);
            self.twins[e.index()] = EdgeHandle::NONE;
            self.edge_ids[e.index()] = StableEdgeId::NONE;
        }
        self.free_tris.push(t);
    }

    /// Write triangle `t` and its three half-edges.
    ///
    /// `links[i]` gives the twin and stable id of local edge `i`. Twins are linked in
    /// both directions and each stable id is pointed at its new half-edge.
    pub(crate) fn write_tri(
        &mut self,
        t: TriId,
        verts: [VertexId; 3],
        links: [(EdgeHandle, StableEdgeId); 3],
    ) {
        self.tri_verts[t.index()] = verts;
        for (i, (twin, id)) in links.into_iter().enumerate() {
            let e = t.edge(i);
            self.twins[e.index()] = twin;
            if twin.is_some() {
                self.twins[twin.index()] = e;
            }
            self.edge_ids[e.index()] = id;
            if id.is_some() {
                self.stable.set_edge(id, e);
            }
        }
    }

    /// Twin and stable id of `e`, the unit [`SurfaceMesh::write_tri`] consumes.
    pub(crate) fn link_of(&self, e: EdgeHandle) -> (EdgeHandle, StableEdgeId) {
        (self.twin(e), self.stable_id(e))
    }
}
