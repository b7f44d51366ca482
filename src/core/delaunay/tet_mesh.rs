//! Array-backed tetrahedral soup with face adjacency.
//!
//! Tetrahedron `t` owns faces `4t..4t + 4`; face `i` is opposite local vertex `i`
//! and its vertices are [`TET_FACES`]`[i]`, ordered so that the opposite vertex is
//! on the positive side of the face (`orient3d(face, v_i) > 0`). Every live
//! tetrahedron is positively oriented: `orient3d(v0, v1, v2, v3) > 0`.
//!
//! For each face a parallel array stores the matching face of the neighboring
//! tetrahedron, or [`FaceHandle::NONE`] on the outer hull. Deleted slots are flagged
//! and recycled through a free list.

use serde::{Deserialize, Serialize};

use crate::core::handles::{FaceHandle, TetId, VertexId};
use crate::core::validation::TopologyError;
use crate::geometry::aabb::Aabb;
use crate::geometry::point::Point3;
use crate::geometry::predicates::{InSphere, PredicateContext};
use crate::geometry::quality::tet_circumcenter;
use crate::spatial::point_octree::PointOctree;

/// Local vertex indices of face `i`, oriented away from vertex `i`.
pub const TET_FACES: [[usize; 3]; 4] = [[1, 3, 2], [0, 2, 3], [0, 3, 1], [0, 1, 2]];

/// Role of a vertex in the volume mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexKind {
    /// Corner of the bootstrap super-tetrahedron; never emitted.
    Super,
    /// Vertex of the input surface.
    Surface,
    /// Extruded boundary-layer vertex.
    Layer,
    /// Background-grid, refinement or free vertex.
    Interior,
}

impl VertexKind {
    /// `true` for vertices that smoothing must not move.
    #[must_use]
    pub const fn is_locked(self) -> bool {
        !matches!(self, Self::Interior)
    }
}

/// The tetrahedral soup maintained by the Delaunay engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TetMesh {
    pub(crate) positions: Vec<Point3>,
    pub(crate) kinds: Vec<VertexKind>,
    /// Some live tetrahedron incident to each vertex (a walk hint, may be stale).
    pub(crate) vertex_tet: Vec<TetId>,
    pub(crate) tet_verts: Vec<[VertexId; 4]>,
    pub(crate) neighbors: Vec<FaceHandle>,
    pub(crate) deleted: Vec<bool>,
    pub(crate) free_tets: Vec<TetId>,
    live: usize,
}

impl TetMesh {
    /// Empty mesh.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices, super vertices included.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of live tetrahedra.
    #[must_use]
    pub const fn tet_count(&self) -> usize {
        self.live
    }

    /// Number of tetrahedron slots, deleted ones included.
    #[must_use]
    pub fn tet_capacity(&self) -> usize {
        self.tet_verts.len()
    }

    /// All vertex positions.
    #[must_use]
    pub fn positions(&self) -> &[Point3] {
        &self.positions
    }

    /// Position of `v`.
    #[must_use]
    pub fn position(&self, v: VertexId) -> Point3 {
        self.positions[v.index()]
    }

    /// Role of `v`.
    #[must_use]
    pub fn kind(&self, v: VertexId) -> VertexKind {
        self.kinds[v.index()]
    }

    /// `true` if `t` is out of range or deleted.
    #[must_use]
    pub fn is_deleted(&self, t: TetId) -> bool {
        t.is_none() || t.index() >= self.deleted.len() || self.deleted[t.index()]
    }

    /// Live tetrahedra.
    pub fn tets(&self) -> impl Iterator<Item = TetId> + '_ {
        self.deleted
            .iter()
            .enumerate()
            .filter(|&(_, &d)| !d)
            .map(|(t, _)| TetId::new(t))
    }

    /// Vertices of `t`.
    #[must_use]
    pub fn tet_vertices(&self, t: TetId) -> [VertexId; 4] {
        self.tet_verts[t.index()]
    }

    /// Corner positions of `t`.
    #[must_use]
    pub fn tet_points(&self, t: TetId) -> [Point3; 4] {
        self.tet_verts[t.index()].map(|v| self.position(v))
    }

    /// The face of the neighboring tetrahedron glued to `f`, `NONE` on the hull.
    #[must_use]
    pub fn neighbor(&self, f: FaceHandle) -> FaceHandle {
        self.neighbors[f.index()]
    }

    /// Vertices of face `f`, oriented away from its tetrahedron.
    #[must_use]
    pub fn face_vertices(&self, f: FaceHandle) -> [VertexId; 3] {
        let verts = self.tet_verts[f.tet().index()];
        TET_FACES[f.local()].map(|i| verts[i])
    }

    /// `true` if `t` has a super-tetrahedron corner.
    #[must_use]
    pub fn touches_super(&self, t: TetId) -> bool {
        self.tet_verts[t.index()]
            .iter()
            .any(|&v| self.kind(v) == VertexKind::Super)
    }

    /// Cached incident tetrahedron of `v`, if still live and still incident.
    #[must_use]
    pub fn incident_tet(&self, v: VertexId) -> Option<TetId> {
        let t = *self.vertex_tet.get(v.index())?;
        (!self.is_deleted(t) && self.tet_verts[t.index()].contains(&v)).then_some(t)
    }

    // =========================================================================
    // LOW-LEVEL MUTATION
    // =========================================================================

    pub(crate) fn push_vertex(&mut self, p: Point3, kind: VertexKind) -> VertexId {
        self.positions.push(p);
        self.kinds.push(kind);
        self.vertex_tet.push(TetId::NONE);
        VertexId::new(self.positions.len() - 1)
    }

    /// Allocate a tetrahedron (recycling a free slot) with unlinked faces.
    pub(crate) fn alloc_tet(&mut self, verts: [VertexId; 4]) -> TetId {
        let t = if let Some(t) = self.free_tets.pop() {
            self.deleted[t.index()] = false;
            self.tet_verts[t.index()] = verts;
            t
        } else {
            self.tet_verts.push(verts);
            self.neighbors.extend([FaceHandle::NONE; 4]);
            self.deleted.push(false);
            TetId::new(self.tet_verts.len() - 1)
        };
        for i in 0..4 {
            self.neighbors[t.face(i).index()] = FaceHandle::NONE;
        }
        for v in verts {
            self.vertex_tet[v.index()] = t;
        }
        self.live += 1;
        t
    }

    /// Delete `t`. Neighbors are not touched.
    pub(crate) fn free_tet(&mut self, t: TetId) {
        if self.is_deleted(t) {
            return;
        }
        self.deleted[t.index()] = true;
        for i in 0..4 {
            self.neighbors[t.face(i).index()] = FaceHandle::NONE;
        }
        self.free_tets.push(t);
        self.live -= 1;
    }

    /// Glue two faces (either may be `NONE`).
    pub(crate) fn link(&mut self, f: FaceHandle, g: FaceHandle) {
        if f.is_some() {
            self.neighbors[f.index()] = g;
        }
        if g.is_some() {
            self.neighbors[g.index()] = f;
        }
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Check face-adjacency symmetry and that glued faces share their vertices.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate_adjacency(&self) -> Result<(), TopologyError> {
        for t in self.tets() {
            for i in 0..4 {
                let face = t.face(i);
                let neighbor = self.neighbor(face);
                if neighbor.is_none() {
                    continue;
                }
                if self.is_deleted(neighbor.tet()) {
                    return Err(TopologyError::DeletedTetNeighbor { tet: t, face });
                }
                let back = self.neighbor(neighbor);
                if back != face {
                    return Err(TopologyError::AsymmetricFace {
                        face,
                        neighbor,
                        back,
                    });
                }
                let mut mine = self.face_vertices(face);
                let mut theirs = self.face_vertices(neighbor);
                mine.sort_unstable();
                theirs.sort_unstable();
                if mine != theirs {
                    return Err(TopologyError::MismatchedFace { face, neighbor });
                }
            }
        }
        Ok(())
    }

    /// Check that every live tetrahedron is positively oriented.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::InvertedTet`] for the first offender.
    pub fn validate_orientation(&self, ctx: &PredicateContext) -> Result<(), TopologyError> {
        for t in self.tets() {
            let [a, b, c, d] = self.tet_points(t);
            if ctx.orient3d(&a, &b, &c, &d) <= 0.0 {
                return Err(TopologyError::InvertedTet { tet: t });
            }
        }
        Ok(())
    }

    /// Check the empty-circumsphere property of every tetrahedron without a super
    /// corner against every non-super vertex.
    ///
    /// Points exactly on a circumsphere are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::NonDelaunay`] for the first violation found.
    pub fn validate_delaunay(&self, ctx: &PredicateContext) -> Result<(), TopologyError> {
        let real: Vec<VertexId> = (0..self.vertex_count())
            .map(VertexId::new)
            .filter(|&v| self.kind(v) != VertexKind::Super)
            .collect();
        let bounds = Aabb::from_points(real.iter().map(|&v| &self.positions[v.index()]));
        if bounds.is_empty() {
            return Ok(());
        }
        let mut octree = PointOctree::new(bounds.padded(bounds.diagonal() * 1e-6 + 1e-9));
        for &v in &real {
            octree.insert(self.position(v), v);
        }

        let mut candidates = Vec::new();
        for t in self.tets() {
            if self.touches_super(t) {
                continue;
            }
            let verts = self.tet_vertices(t);
            let [a, b, c, d] = self.tet_points(t);
            candidates.clear();
            match tet_circumcenter(&a, &b, &c, &d) {
                Some(center) => {
                    let radius = (center - a).norm();
                    let slack = radius * 1e-9 + f64::EPSILON;
                    octree.within_radius(&center, radius + slack, &mut candidates);
                }
                None => candidates.extend(real.iter().map(|&v| (v, self.position(v)))),
            }
            for &(v, p) in &candidates {
                if verts.contains(&v) {
                    continue;
                }
                if ctx.insphere_class(&a, &b, &c, &d, &p) == InSphere::INSIDE {
                    return Err(TopologyError::NonDelaunay { tet: t, vertex: v });
                }
            }
        }
        Ok(())
    }
}
