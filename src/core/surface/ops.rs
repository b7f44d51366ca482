//! Topological edits on a [`SurfaceMesh`].
//!
//! Every operation checks all of its preconditions before touching the mesh. A refused
//! edit returns `None`/`false` and leaves the mesh exactly as it was; an accepted edit
//! keeps twin symmetry and the stable-id table consistent.

use std::f64::consts::PI;

use crate::core::collections::{FastHashSet, SmallBuffer};
use crate::core::handles::{EdgeHandle, StableEdgeId, TriId, VertexId};
use crate::core::surface::mesh::SurfaceMesh;
use crate::core::surface::stable::EdgeFlags;
use crate::geometry::point::{Point3, Vector3, angle_at, triangle_normal, try_normalize};
use crate::geometry::quality::triangle_quality;

/// Triangles below this shape quality count as slivers.
pub const MIN_TRIANGLE_QUALITY: f64 = 1e-3;

/// Largest dihedral deviation (degrees) across which a quality flip is allowed.
pub const MAX_FLIP_DIHEDRAL_DEG: f64 = 20.0;

/// Fraction of the full move given up per back-off step in [`SurfaceMesh::move_vert`].
pub const MOVE_BACKOFF: f64 = 0.2;

/// Attempts made by [`SurfaceMesh::move_vert`]: 100%, 80%, 60%, 40%, 20%.
const MOVE_STEPS: u32 = 5;

/// Tolerance on the opposite-angle sum before an edge counts as non-Delaunay.
const ANGLE_SUM_TOLERANCE: f64 = 1e-9;

/// Marks that protect an edge from flips and collapses.
const PROTECTED: EdgeFlags = EdgeFlags::BOUNDARY.union(EdgeFlags::FEATURE);

impl SurfaceMesh {
    /// `true` if `e` is a half-edge of a live triangle.
    #[must_use]
    pub fn is_live_edge(&self, e: EdgeHandle) -> bool {
        e.is_some() && e.index() < self.twins.len() && !self.is_deleted(e.tri())
    }

    /// `true` if replacing `old` triangle normal by the normal of `(a, b, c)` keeps
    /// the orientation and avoids a sliver.
    fn keeps_orientation(reference: &Vector3, a: &Point3, b: &Point3, c: &Point3) -> bool {
        triangle_normal(a, b, c).dot(reference) > 0.0
            && triangle_quality(a, b, c) > MIN_TRIANGLE_QUALITY
    }

    fn touches_feature(&self, v: VertexId) -> bool {
        self.outgoing_edges(v).iter().any(|&e| {
            self.edge_flags(self.stable_id(e)).contains(EdgeFlags::FEATURE)
                || self.edge_flags(self.stable_id(e.prev())).contains(EdgeFlags::FEATURE)
        })
    }

    // =========================================================================
    // FLIP
    // =========================================================================

    /// Flip the interior edge `e = (a, b)` shared by `(a, b, c)` and `(b, a, d)` into `(c, d)`.
    ///
    /// The rewritten triangles are `(c, a, d)` and `(d, b, c)`; the returned handle is the
    /// new diagonal `d → c`, which keeps `e`'s stable id. Refused for border edges,
    /// when `c == d` or the edge `c-d` already exists. Unless `force` is set, also
    /// refused for [`EdgeFlags::BOUNDARY`]/[`EdgeFlags::FEATURE`] edges and when a new
    /// triangle would invert or be a sliver. The new diagonal carries no flags.
    pub fn flip_edge(&mut self, e: EdgeHandle, force: bool) -> Option<EdgeHandle> {
        if !self.is_live_edge(e) {
            return None;
        }
        let f = self.twin(e);
        if f.is_none() {
            return None;
        }
        let (t0, i) = (e.tri(), e.local());
        let (t1, j) = (f.tri(), f.local());
        let (a, b) = self.edge_vertices(e);
        let c = self.edge_opposite(e);
        let d = self.edge_opposite(f);
        if c == d || self.has_edge(c, d) {
            return None;
        }
        let id = self.stable_id(e);
        if !force {
            if self.edge_flags(id).intersects(PROTECTED) {
                return None;
            }
            let reference = self.tri_normal(t0) + self.tri_normal(t1);
            let [pa, pb, pc, pd] = [a, b, c, d].map(|v| self.position(v));
            if !Self::keeps_orientation(&reference, &pc, &pa, &pd)
                || !Self::keeps_orientation(&reference, &pd, &pb, &pc)
            {
                return None;
            }
        }

        let ca = self.link_of(t0.edge((i + 2) % 3));
        let bc = self.link_of(t0.edge((i + 1) % 3));
        let ad = self.link_of(t1.edge((j + 1) % 3));
        let db = self.link_of(t1.edge((j + 2) % 3));
        self.write_tri(t0, [c, a, d], [ca, ad, (t1.edge(2), id)]);
        self.write_tri(t1, [d, b, c], [db, bc, (t0.edge(2), id)]);
        // The diagonal is a new geometric edge; marks of a-b do not apply to c-d.
        self.stable.set_flags(id, EdgeFlags::empty());

        self.anchor_vertex(a, t0);
        self.anchor_vertex(b, t1);
        self.anchor_vertex(c, t0);
        self.anchor_vertex(d, t0);
        Some(t0.edge(2))
    }

    /// Sum of the two angles opposite to the interior edge `e`.
    #[must_use]
    pub fn opposite_angle_sum(&self, e: EdgeHandle) -> Option<f64> {
        let f = self.twin(e);
        if f.is_none() {
            return None;
        }
        let (a, b) = self.edge_vertices(e);
        let [pa, pb] = [a, b].map(|v| self.position(v));
        let pc = self.position(self.edge_opposite(e));
        let pd = self.position(self.edge_opposite(f));
        Some(angle_at(&pc, &pa, &pb) + angle_at(&pd, &pb, &pa))
    }

    /// Flip `e` if it violates the Delaunay criterion (opposite angles summing past π)
    /// and the two triangles are nearly coplanar.
    ///
    /// Returns the new diagonal, or `None` when the edge is legal or the flip is refused.
    pub fn flip_bad_edge(&mut self, e: EdgeHandle) -> Option<EdgeHandle> {
        if !self.is_live_edge(e) {
            return None;
        }
        let sum = self.opposite_angle_sum(e)?;
        if sum <= PI + ANGLE_SUM_TOLERANCE {
            return None;
        }
        if self
            .dihedral_deviation(e)
            .is_none_or(|angle| angle > MAX_FLIP_DIHEDRAL_DEG.to_radians())
        {
            return None;
        }
        self.flip_edge(e, false)
    }

    /// Worklist flood from `seed` that flips non-Delaunay edges until none remain or
    /// `max_flips` is reached, optionally smoothing the vertices it touched.
    ///
    /// Returns the number of flips performed.
    pub fn flip_bad_edges(&mut self, seed: TriId, max_flips: usize, smooth: bool) -> usize {
        if self.is_deleted(seed) {
            return 0;
        }
        let mut work: Vec<StableEdgeId> = (0..3).map(|i| self.stable_id(seed.edge(i))).collect();
        let mut touched: FastHashSet<VertexId> = FastHashSet::default();
        let mut flips = 0;
        let mut steps = 0;
        let step_limit = max_flips.saturating_mul(8).max(64);

        while let Some(id) = work.pop() {
            if flips >= max_flips || steps >= step_limit {
                break;
            }
            steps += 1;
            let Some(e) = self.edge_of(id) else {
                continue;
            };
            let Some(diag) = self.flip_bad_edge(e) else {
                continue;
            };
            flips += 1;
            let (t0, t1) = (diag.tri(), self.twin(diag).tri());
            for t in [t0, t1] {
                for local in 0..2 {
                    work.push(self.stable_id(t.edge(local)));
                }
                touched.extend(self.tri_vertices(t));
            }
        }

        if smooth {
            let mut order: Vec<VertexId> = touched.into_iter().collect();
            order.sort_unstable();
            for v in order {
                self.smooth_vertex(v);
            }
        }
        tracing::trace!(flips, steps, "flip_bad_edges finished");
        flips
    }

    // =========================================================================
    // SPLIT
    // =========================================================================

    /// Insert a new vertex at `p` on edge `e = (a, b)`.
    ///
    /// `(a, b, c)` becomes `(a, m, c)` + `(m, b, c)`; on the twin side `(b, a, d)`
    /// becomes `(m, a, d)` + `(b, m, d)`. The old stable id stays on `a-m`, the new
    /// `m-b` inherits its flags. Refused if a new triangle would invert.
    pub fn split_edge(&mut self, e: EdgeHandle, p: Point3) -> Option<VertexId> {
        if !self.is_live_edge(e) {
            return None;
        }
        let f = self.twin(e);
        let (t0, i) = (e.tri(), e.local());
        let (a, b) = self.edge_vertices(e);
        let c = self.edge_opposite(e);
        let d = f.get().map(|f| self.edge_opposite(f));

        let [pa, pb, pc] = [a, b, c].map(|v| self.position(v));
        let n0 = self.tri_normal(t0);
        if triangle_normal(&pa, &p, &pc).dot(&n0) <= 0.0
            || triangle_normal(&p, &pb, &pc).dot(&n0) <= 0.0
        {
            return None;
        }
        if let Some(d) = d {
            let pd = self.position(d);
            let n1 = self.tri_normal(f.tri());
            if triangle_normal(&p, &pa, &pd).dot(&n1) <= 0.0
                || triangle_normal(&pb, &p, &pd).dot(&n1) <= 0.0
            {
                return None;
            }
        }

        let id = self.stable_id(e);
        let flags = self.edge_flags(id);
        let bc = self.link_of(t0.edge((i + 1) % 3));
        let ca = self.link_of(t0.edge((i + 2) % 3));
        let normal =
            try_normalize(&(self.normal(a) + self.normal(b))).unwrap_or_else(Vector3::zeros);
        let m = self.add_vertex(p, normal);
        let t2 = self.alloc_tri();
        let s_mc = self.stable.allocate(EdgeHandle::NONE, EdgeFlags::empty());
        let s_mb = self.stable.allocate(EdgeHandle::NONE, flags);

        match d {
            None => {
                self.write_tri(t0, [a, m, c], [(EdgeHandle::NONE, id), (t2.edge(2), s_mc), ca]);
                self.write_tri(t2, [m, b, c], [(EdgeHandle::NONE, s_mb), bc, (t0.edge(1), s_mc)]);
            }
            Some(d) => {
                let (t1, j) = (f.tri(), f.local());
                let ad = self.link_of(t1.edge((j + 1) % 3));
                let db = self.link_of(t1.edge((j + 2) % 3));
                let t3 = self.alloc_tri();
                let s_md = self.stable.allocate(EdgeHandle::NONE, EdgeFlags::empty());
                self.write_tri(t0, [a, m, c], [(t1.edge(0), id), (t2.edge(2), s_mc), ca]);
                self.write_tri(t2, [m, b, c], [(t3.edge(0), s_mb), bc, (t0.edge(1), s_mc)]);
                self.write_tri(t1, [m, a, d], [(t0.edge(0), id), ad, (t3.edge(1), s_md)]);
                self.write_tri(t3, [b, m, d], [(t2.edge(0), s_mb), (t1.edge(2), s_md), db]);
                self.anchor_vertex(d, t1);
            }
        }
        self.anchor_vertex(a, t0);
        self.anchor_vertex(b, t2);
        self.anchor_vertex(c, t0);
        self.anchor_vertex(m, t2);
        Some(m)
    }

    /// [`SurfaceMesh::split_edge`] followed by legalizing the (up to four) edges of the
    /// quad around the split edge.
    pub fn split_and_flip(&mut self, e: EdgeHandle, p: Point3) -> Option<VertexId> {
        if !self.is_live_edge(e) {
            return None;
        }
        let mut outer: SmallBuffer<StableEdgeId, 4> = SmallBuffer::new();
        outer.push(self.stable_id(e.next()));
        outer.push(self.stable_id(e.prev()));
        let f = self.twin(e);
        if f.is_some() {
            outer.push(self.stable_id(f.next()));
            outer.push(self.stable_id(f.prev()));
        }
        let m = self.split_edge(e, p)?;
        for id in outer {
            if let Some(edge) = self.edge_of(id) {
                self.flip_bad_edge(edge);
            }
        }
        Some(m)
    }

    // =========================================================================
    // COLLAPSE
    // =========================================================================

    /// Collapse interior edge `e = (a, b)`, merging `b` into `a`.
    ///
    /// Refused when `e` is on a border or marked, when both endpoints are border
    /// vertices, when the one-rings of `a` and `b` do not share exactly two vertices
    /// (link condition), or when a surviving triangle would invert. The survivor
    /// moves to the midpoint, or stays on the border when one endpoint is a border vertex.
    pub fn collapse_edge(&mut self, e: EdgeHandle) -> Option<VertexId> {
        if !self.is_live_edge(e) {
            return None;
        }
        let f = self.twin(e);
        if f.is_none() {
            return None;
        }
        let id = self.stable_id(e);
        if self.edge_flags(id).intersects(PROTECTED) {
            return None;
        }
        let (t0, i) = (e.tri(), e.local());
        let (t1, j) = (f.tri(), f.local());
        let (a, b) = self.edge_vertices(e);
        let (a_border, b_border) = (self.is_boundary_vertex(a), self.is_boundary_vertex(b));
        if a_border && b_border {
            tracing::debug!(%a, %b, "collapse refused: both endpoints on the border");
            return None;
        }

        let ring_a = self.one_ring(a);
        let ring_b = self.one_ring(b);
        let shared = ring_a
            .iter()
            .filter(|&&v| v != a && v != b && ring_b.contains(&v))
            .count();
        if shared != 2 {
            tracing::debug!(%a, %b, shared, "collapse refused: link condition");
            return None;
        }

        let e_bc = t0.edge((i + 1) % 3);
        let e_ca = t0.edge((i + 2) % 3);
        let e_ad = t1.edge((j + 1) % 3);
        let e_db = t1.edge((j + 2) % 3);
        let [x1, x2, x3, x4] = [e_bc, e_ca, e_ad, e_db].map(|h| self.twin(h));
        if (x1.is_none() && x2.is_none()) || (x3.is_none() && x4.is_none()) {
            return None;
        }

        let target = if b_border {
            self.position(b)
        } else if a_border {
            self.position(a)
        } else {
            nalgebra::center(&self.position(a), &self.position(b))
        };

        let mut fan: SmallBuffer<TriId, 16> = self.vertex_triangles(a).into_iter().collect();
        fan.extend(self.vertex_triangles(b));
        for &t in &fan {
            if t == t0 || t == t1 {
                continue;
            }
            let verts = self.tri_vertices(t);
            let old = self.tri_normal(t);
            let moved = verts.map(|v| if v == a || v == b { target } else { self.position(v) });
            if !Self::keeps_orientation(&old, &moved[0], &moved[1], &moved[2]) {
                tracing::debug!(%a, %b, tri = %t, "collapse refused: triangle would invert");
                return None;
            }
        }

        let [s_bc, s_ca, s_ad, s_db] = [e_bc, e_ca, e_ad, e_db].map(|h| self.stable_id(h));
        let c = self.edge_opposite(e);
        let d = self.edge_opposite(f);
        let b_tris = self.vertex_triangles(b);

        self.free_tri(t0);
        self.free_tri(t1);
        for t in b_tris {
            if t == t0 || t == t1 {
                continue;
            }
            for v in &mut self.tri_verts[t.index()] {
                if *v == b {
                    *v = a;
                }
            }
        }
        self.merge_twins(x1, x2, s_ca, s_bc);
        self.merge_twins(x3, x4, s_ad, s_db);
        self.stable.release(id);

        self.positions[a.index()] = target;
        self.vertex_edge[b.index()] = EdgeHandle::NONE;
        for (v, h0, h1) in [(a, x1, x2), (c, x1, x2), (d, x3, x4)] {
            let live = if h0.is_some() { h0 } else { h1 };
            self.anchor_vertex(v, live.tri());
        }
        self.normals[a.index()] = self.fan_normal(a);
        Some(a)
    }

    /// Pair the two half-edges left behind by a collapsed triangle; `keep` survives as
    /// their stable id and absorbs the flags of `drop`.
    fn merge_twins(
        &mut self,
        x: EdgeHandle,
        y: EdgeHandle,
        keep: StableEdgeId,
        drop: StableEdgeId,
    ) {
        let mut flags = self.edge_flags(keep) | self.edge_flags(drop);
        if x.is_none() || y.is_none() {
            flags |= EdgeFlags::BOUNDARY;
        }
        for (h, other) in [(x, y), (y, x)] {
            if h.is_some() {
                self.twins[h.index()] = other;
                self.edge_ids[h.index()] = keep;
                self.stable.set_edge(keep, h);
            }
        }
        self.stable.set_flags(keep, flags);
        self.stable.release(drop);
    }

    // =========================================================================
    // VERTEX MOVES
    // =========================================================================

    /// Move `v` towards `target`, backing off by 20% of the full move at a time while
    /// any incident triangle would invert. Returns `false` if no step was acceptable.
    pub fn move_vert(&mut self, v: VertexId, target: Point3) -> bool {
        let tris = self.vertex_triangles(v);
        if tris.is_empty() {
            return false;
        }
        let origin = self.position(v);
        let delta = target - origin;
        for step in 0..MOVE_STEPS {
            let fraction = MOVE_BACKOFF.mul_add(-f64::from(step), 1.0);
            let candidate = origin + delta * fraction;
            let ok = tris.iter().all(|&t| {
                let old = self.tri_normal(t);
                let moved = self
                    .tri_vertices(t)
                    .map(|u| if u == v { candidate } else { self.position(u) });
                Self::keeps_orientation(&old, &moved[0], &moved[1], &moved[2])
            });
            if ok {
                self.positions[v.index()] = candidate;
                self.normals[v.index()] = self.fan_normal(v);
                return true;
            }
        }
        false
    }

    /// Tangential Laplacian smoothing of one interior, non-feature vertex.
    pub fn smooth_vertex(&mut self, v: VertexId) -> bool {
        if !self.is_vertex_live(v) || self.is_boundary_vertex(v) || self.touches_feature(v) {
            return false;
        }
        let ring = self.one_ring(v);
        if ring.is_empty() {
            return false;
        }
        #[allow(clippy::cast_precision_loss)]
        let count = ring.len() as f64;
        let centroid: Vector3 =
            ring.iter().map(|&u| self.position(u).coords).sum::<Vector3>() / count;
        let p = self.position(v);
        let n = self.normal(v);
        let mut delta = centroid - p.coords;
        delta -= n * n.dot(&delta);
        self.move_vert(v, p + delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::surface::primitives::planar_grid;

    /// `(a, b, c)` and `(b, a, d)` around the edge a-b on the x axis.
    fn kite(spread: f64) -> SurfaceMesh {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(1.0, spread, 0.0),
            Point3::new(1.0, -spread, 0.0),
        ];
        SurfaceMesh::from_triangles(positions, &[[0, 1, 2], [1, 0, 3]]).unwrap()
    }

    fn edge(mesh: &SurfaceMesh, a: usize, b: usize) -> EdgeHandle {
        mesh.find_edge(VertexId::new(a), VertexId::new(b)).unwrap()
    }

    #[test]
    fn test_flip_rewrites_diagonal_and_keeps_stable_id() {
        let mut mesh = kite(0.2);
        let e = edge(&mesh, 0, 1);
        let id = mesh.stable_id(e);
        let diag = mesh.flip_edge(e, false).unwrap();
        mesh.validate_adjacency().unwrap();
        let (u, v) = mesh.edge_vertices(diag);
        assert_eq!((u, v), (VertexId::new(3), VertexId::new(2)));
        assert_eq!(mesh.stable_id(diag), id);
        assert!(!mesh.has_edge(VertexId::new(0), VertexId::new(1)));
    }

    #[test]
    fn test_flip_refusals() {
        let mut mesh = kite(0.2);
        let border = edge(&mesh, 1, 2);
        assert!(mesh.flip_edge(border, true).is_none());

        // Flipping a convex-corner kite inward would invert a triangle.
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(3.0, 1.0, 0.0),
            Point3::new(3.0, -1.0, 0.0),
        ];
        let mut concave = SurfaceMesh::from_triangles(positions, &[[0, 1, 2], [1, 0, 3]]).unwrap();
        let before = concave.clone();
        let e = edge(&concave, 0, 1);
        assert!(concave.flip_edge(e, false).is_none());
        assert_eq!(concave, before);

        let id = mesh.stable_id(edge(&mesh, 0, 1));
        mesh.mark_edge(id, EdgeFlags::FEATURE);
        let e = edge(&mesh, 0, 1);
        assert!(mesh.flip_edge(e, false).is_none());
        assert!(mesh.flip_edge(e, true).is_some());
    }

    #[test]
    fn test_forced_flip_drops_marks_of_replaced_edge() {
        let mut mesh = kite(0.2);
        let id = mesh.stable_id(edge(&mesh, 0, 1));
        mesh.mark_edge(id, EdgeFlags::FEATURE | EdgeFlags::FRONT);

        let diag = mesh.flip_edge(edge(&mesh, 0, 1), true).unwrap();
        assert_eq!(mesh.stable_id(diag), id);
        assert!(mesh.edge_flags(id).is_empty());
        assert_eq!(mesh.edges_with(EdgeFlags::FEATURE).count(), 0);
        mesh.validate_adjacency().unwrap();
    }

    #[test]
    fn test_flip_bad_edge_uses_angle_sum() {
        let mut wide = kite(1.5);
        let e = edge(&wide, 0, 1);
        assert!(wide.opposite_angle_sum(e).unwrap() < PI);
        assert!(wide.flip_bad_edge(e).is_none());

        let mut narrow = kite(0.2);
        let e = edge(&narrow, 0, 1);
        assert!(narrow.flip_bad_edge(e).is_some());
        narrow.validate_adjacency().unwrap();
    }

    #[test]
    fn test_split_interior_edge() {
        let mut mesh = kite(1.0);
        let e = edge(&mesh, 0, 1);
        let id = mesh.stable_id(e);
        mesh.mark_edge(id, EdgeFlags::FEATURE);
        let m = mesh.split_edge(e, Point3::new(1.0, 0.0, 0.0)).unwrap();
        mesh.validate_adjacency().unwrap();
        assert_eq!(mesh.triangle_count(), 4);
        assert_eq!(mesh.one_ring(m).len(), 4);

        let am = mesh.find_edge(VertexId::new(0), m).unwrap();
        assert_eq!(mesh.stable_id(am), id);
        let mb = mesh.find_edge(m, VertexId::new(1)).unwrap();
        assert!(mesh.edge_flags(mesh.stable_id(mb)).contains(EdgeFlags::FEATURE));
        let mc = mesh.find_edge(m, VertexId::new(2)).unwrap();
        assert!(mesh.edge_flags(mesh.stable_id(mc)).is_empty());
    }

    #[test]
    fn test_split_border_edge_keeps_boundary_flag() {
        let mut mesh = kite(1.0);
        let e = edge(&mesh, 1, 2);
        let m = mesh.split_edge(e, Point3::new(1.5, 0.5, 0.0)).unwrap();
        mesh.validate_adjacency().unwrap();
        assert_eq!(mesh.triangle_count(), 3);
        assert!(mesh.is_boundary_vertex(m));
        let halves = [
            mesh.find_edge(VertexId::new(1), m).unwrap(),
            mesh.find_edge(m, VertexId::new(2)).unwrap(),
        ];
        for h in halves {
            assert!(mesh.edge_flags(mesh.stable_id(h)).contains(EdgeFlags::BOUNDARY));
        }
    }

    #[test]
    fn test_split_and_flip_legalizes() {
        let mut mesh = planar_grid(4, 4, 1.0).unwrap();
        let e = mesh.find_edge(VertexId::new(6), VertexId::new(7)).unwrap();
        let m = mesh.split_and_flip(e, Point3::new(1.5, 1.0, 0.0)).unwrap();
        mesh.validate_adjacency().unwrap();
        assert!(mesh.is_vertex_live(m));
        for t in mesh.triangles() {
            for i in 0..3 {
                let e = t.edge(i);
                if let Some(sum) = mesh.opposite_angle_sum(e) {
                    assert!(sum <= PI + 1e-9, "edge {e} left non-Delaunay");
                }
            }
        }
    }

    #[test]
    fn test_collapse_interior_edge() {
        let mut mesh = planar_grid(4, 4, 1.0).unwrap();
        let before = mesh.triangle_count();
        let e = mesh.find_edge(VertexId::new(6), VertexId::new(7)).unwrap();
        let survivor = mesh.collapse_edge(e).unwrap();
        mesh.validate_adjacency().unwrap();
        assert_eq!(survivor, VertexId::new(6));
        assert_eq!(mesh.triangle_count(), before - 2);
        assert!(!mesh.is_vertex_live(VertexId::new(7)));
        assert!((mesh.position(survivor).x - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_collapse_refuses_border_to_border() {
        let mut mesh = planar_grid(3, 3, 1.0).unwrap();
        // Diagonal of the corner cell: an interior edge joining two border vertices.
        let e = mesh.find_edge(VertexId::new(2), VertexId::new(7)).unwrap();
        assert!(!mesh.is_boundary_edge(e));
        let before = mesh.clone();
        assert!(mesh.is_boundary_vertex(VertexId::new(2)));
        assert!(mesh.is_boundary_vertex(VertexId::new(7)));
        assert!(mesh.collapse_edge(e).is_none());
        assert_eq!(mesh, before);
    }

    #[test]
    fn test_move_vert_backs_off() {
        let mut mesh = planar_grid(2, 2, 1.0).unwrap();
        let center = VertexId::new(4);
        // 100%, 80% and 60% of the move fold a triangle; 40% lands at x = 1.8.
        assert!(mesh.move_vert(center, Point3::new(3.0, 1.0, 0.0)));
        assert!((mesh.position(center).x - 1.8).abs() < 1e-12);
        assert!(!mesh.move_vert(center, Point3::new(10.0, 1.0, 0.0)));
    }

    #[test]
    fn test_flip_bad_edges_restores_delaunay() {
        let mut mesh = planar_grid(4, 4, 1.0).unwrap();
        // Shear the grid so every diagonal becomes the long one.
        for v in 0..mesh.vertex_count() {
            mesh.positions[v].x += 0.6 * mesh.positions[v].y;
        }
        let flips = mesh.flip_bad_edges(TriId::new(0), 1000, false);
        assert!(flips > 0);
        mesh.validate_adjacency().unwrap();
    }
}
