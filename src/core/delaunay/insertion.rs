//! Incremental Delaunay insertion.
//!
//! The engine starts from a single super-tetrahedron enclosing the domain and
//! inserts points one at a time (Bowyer-Watson):
//!
//! 1. **Locate** the tetrahedron containing the point with a randomized walk
//!    across faces whose plane separates it from the point.
//! 2. **Grow the cavity** depth-first from that tetrahedron, absorbing every
//!    neighbor whose circumsphere contains the point.
//! 3. **Check** the cavity boundary: at least four faces, under the face-map
//!    capacity, and every face visible from the point.
//! 4. **Retriangulate** by coning each boundary face to the new vertex and pairing
//!    the new interior faces through a map keyed by their two non-apex vertices.
//!
//! Steps 1-3 do not touch the mesh, so a rejected point leaves it unchanged.
//!
//! # References
//!
//! - A. Bowyer, "Computing Dirichlet tessellations", The Computer Journal, 1981.
//! - D. F. Watson, "Computing the n-dimensional Delaunay tessellation", 1981.
//! - O. Devillers, S. Pion, M. Teillaud, "Walking in a Triangulation", 2001.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::core::collections::{Entry, FastHashMap, VisitStamps};
use crate::core::delaunay::brio::brio_order;
use crate::core::delaunay::tet_mesh::{TetMesh, VertexKind};
use crate::core::handles::{FaceHandle, TetId, VertexId};
use crate::geometry::aabb::Aabb;
use crate::geometry::point::{Point3, Vector3, is_finite};
use crate::geometry::predicates::PredicateContext;
use crate::spatial::point_octree::PointOctree;
use crate::trace::{MeshTracer, NoopTracer};

/// Inradius of the super-tetrahedron in multiples of the domain's half diagonal.
pub const SUPER_MARGIN: f64 = 8.0;

/// Most faces a single cavity may have before the insertion is rejected.
pub const CAVITY_FACE_CAPACITY: usize = 1 << 14;

/// Fewest boundary faces of a valid cavity (a single tetrahedron has four).
pub const MIN_CAVITY_FACES: usize = 4;

/// Lower bound on the walk budget; the budget also grows with the mesh.
const MIN_WALK_STEPS: usize = 1024;

/// Error during point location.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocateError {
    /// The mesh has no live tetrahedron to start from.
    #[error("Cannot locate in an empty tetrahedralization")]
    EmptyMesh,

    /// The walk left the super-tetrahedron.
    #[error("Point {point:?} lies outside the super-tetrahedron")]
    OutsideHull {
        /// The query point.
        point: Point3,
    },

    /// The walk did not terminate.
    #[error("Walk did not terminate after {steps} steps - possible numerical degeneracy")]
    WalkExhausted {
        /// Steps taken.
        steps: usize,
    },
}

/// Why a single vertex could not be inserted. The mesh is unchanged in every case.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InsertionError {
    /// Point location failed.
    #[error("Location error: {0}")]
    Locate(#[from] LocateError),

    /// The point has a NaN or infinite coordinate.
    #[error("Point {point:?} is not finite")]
    NonFinitePoint {
        /// The rejected point.
        point: Point3,
    },

    /// The point coincides with an existing vertex.
    #[error("Point coincides with vertex {vertex}")]
    DuplicateVertex {
        /// The existing vertex.
        vertex: VertexId,
    },

    /// The cavity boundary is too small to enclose the point.
    #[error("Degenerate cavity with {faces} boundary faces")]
    DegenerateCavity {
        /// Number of boundary faces found.
        faces: usize,
    },

    /// The cavity boundary outgrew the face-map capacity.
    #[error("Cavity boundary exceeds {capacity} faces")]
    CavityOverflow {
        /// The capacity that was exceeded.
        capacity: usize,
    },

    /// A boundary face is not strictly visible from the point.
    #[error("Cavity face {face} is not visible from the new point")]
    NotStarShaped {
        /// The offending face.
        face: FaceHandle,
    },

    /// Domain bounds are empty, flat or non-finite.
    #[error("Domain bounds {bounds:?} cannot seed a super-tetrahedron")]
    InvalidBounds {
        /// The rejected bounds.
        bounds: Aabb,
    },
}

/// Outcome of a batch insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Points inserted.
    pub inserted: usize,
    /// Points dropped by the minimum-distance filter.
    pub skipped: usize,
    /// Points whose insertion failed.
    pub failed: usize,
    /// New vertex of each input point, in input order.
    pub vertices: Vec<Option<VertexId>>,
}

impl BatchReport {
    /// `true` when no insertion failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Clone, Copy)]
struct BoundaryFace {
    verts: [VertexId; 3],
    outer: FaceHandle,
    /// The cavity face this was read from, for error reporting.
    face: FaceHandle,
}

/// Per-insertion working memory, cleared (not freed) between insertions.
#[derive(Debug, Default)]
struct CavityScratch {
    stack: Vec<TetId>,
    cavity: Vec<TetId>,
    boundary: Vec<BoundaryFace>,
    pairing: FastHashMap<(VertexId, VertexId), FaceHandle>,
    new_tets: Vec<TetId>,
    stamps: VisitStamps,
}

impl CavityScratch {
    fn reset(&mut self) {
        self.stack.clear();
        self.cavity.clear();
        self.boundary.clear();
        self.pairing.clear();
        self.new_tets.clear();
        self.stamps.next_epoch();
    }
}

/// Incremental Delaunay tetrahedralization of a bounded domain.
pub struct Delaunay {
    pub(crate) mesh: TetMesh,
    pub(crate) ctx: PredicateContext,
    bounds: Aabb,
    pub(crate) rng: StdRng,
    pub(crate) octree: PointOctree<VertexId>,
    scratch: CavityScratch,
    last_tet: TetId,
    tracer: Box<dyn MeshTracer>,
}

impl fmt::Debug for Delaunay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delaunay")
            .field("bounds", &self.bounds)
            .field("vertices", &self.mesh.vertex_count())
            .field("tets", &self.mesh.tet_count())
            .finish_non_exhaustive()
    }
}

impl Delaunay {
    /// Bootstrap an engine for points inside `bounds`.
    ///
    /// Creates the super-tetrahedron (regular, centered on the domain, inradius
    /// [`SUPER_MARGIN`] half-diagonals) and a predicate context sized for it. `seed`
    /// drives the randomized walk and the insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`InsertionError::InvalidBounds`] for empty, zero-size or non-finite bounds.
    pub fn new(bounds: &Aabb, seed: u64) -> Result<Self, InsertionError> {
        let radius = 0.5 * bounds.diagonal();
        if !bounds.is_valid() || !radius.is_finite() || radius <= 0.0 {
            return Err(InsertionError::InvalidBounds { bounds: *bounds });
        }
        let center = bounds.center();
        let s = SUPER_MARGIN * radius * 3.0_f64.sqrt();
        let corners = [
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(1.0, -1.0, -1.0),
            Vector3::new(-1.0, 1.0, -1.0),
            Vector3::new(-1.0, -1.0, 1.0),
        ]
        .map(|dir| center + dir * s);
        let hull_box = Aabb::from_points(corners.iter());
        let ctx = PredicateContext::for_bounds(&hull_box);

        let mut mesh = TetMesh::new();
        let mut verts = corners.map(|p| mesh.push_vertex(p, VertexKind::Super));
        if ctx.orient3d(&corners[0], &corners[1], &corners[2], &corners[3]) < 0.0 {
            verts.swap(2, 3);
        }
        let root = mesh.alloc_tet(verts);
        tracing::debug!(?bounds, super_size = s, "bootstrapped super-tetrahedron");

        Ok(Self {
            mesh,
            ctx,
            bounds: *bounds,
            rng: StdRng::seed_from_u64(seed),
            // Every point the walk can locate lies in the super-tetrahedron's box.
            octree: PointOctree::new(hull_box),
            scratch: CavityScratch::default(),
            last_tet: root,
            tracer: Box::new(NoopTracer),
        })
    }

    /// Replace the debug tracer.
    #[must_use]
    pub fn with_tracer(mut self, tracer: Box<dyn MeshTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// The debug tracer.
    pub fn tracer_mut(&mut self) -> &mut dyn MeshTracer {
        self.tracer.as_mut()
    }

    /// Hand the tracer back, leaving a [`NoopTracer`] in its place.
    pub fn take_tracer(&mut self) -> Box<dyn MeshTracer> {
        std::mem::replace(&mut self.tracer, Box::new(NoopTracer))
    }

    /// The underlying tetrahedral mesh.
    #[must_use]
    pub const fn mesh(&self) -> &TetMesh {
        &self.mesh
    }

    /// The predicate context of this run.
    #[must_use]
    pub const fn context(&self) -> &PredicateContext {
        &self.ctx
    }

    /// Domain bounds.
    #[must_use]
    pub const fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Number of inserted (non-super) vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.mesh.vertex_count() - 4
    }

    /// `true` if an inserted vertex lies within `radius` of `p`.
    #[must_use]
    pub fn has_vertex_within(&self, p: &Point3, radius: f64) -> bool {
        self.octree.any_within(p, radius, |_| true)
    }

    /// Nearest inserted vertex to `p`.
    #[must_use]
    pub fn nearest_vertex(&self, p: &Point3) -> Option<(VertexId, f64)> {
        self.octree.nearest(p).map(|(v, _, d2)| (v, d2.sqrt()))
    }

    // =========================================================================
    // LOCATION
    // =========================================================================

    fn start_tet(&self, p: &Point3) -> Result<TetId, LocateError> {
        if let Some(t) = self
            .octree
            .nearest(p)
            .and_then(|(v, _, _)| self.mesh.incident_tet(v))
        {
            return Ok(t);
        }
        if !self.mesh.is_deleted(self.last_tet) {
            return Ok(self.last_tet);
        }
        self.mesh.tets().next().ok_or(LocateError::EmptyMesh)
    }

    /// Find a tetrahedron whose closure contains `p`.
    ///
    /// Walks from a tetrahedron near `p`, at each step crossing a face whose plane
    /// separates the current tetrahedron from `p`. The face order is randomized and
    /// the walk never steps straight back.
    ///
    /// # Errors
    ///
    /// Returns a [`LocateError`] if the walk leaves the super-tetrahedron or exhausts
    /// its step budget.
    pub fn locate(&mut self, p: &Point3) -> Result<TetId, LocateError> {
        let mut current = self.start_tet(p)?;
        let mut previous = TetId::NONE;
        let limit = self.mesh.tet_count().saturating_mul(4).max(MIN_WALK_STEPS);
        for _ in 0..limit {
            let offset = self.rng.random_range(0..4);
            let mut next = None;
            for k in 0..4 {
                let face = current.face((offset + k) % 4);
                let [a, b, c] = self.mesh.face_vertices(face).map(|v| self.mesh.position(v));
                if self.ctx.orient3d(&a, &b, &c, p) >= 0.0 {
                    continue;
                }
                let neighbor = self.mesh.neighbor(face);
                if neighbor.is_none() {
                    return Err(LocateError::OutsideHull { point: *p });
                }
                if neighbor.tet() == previous {
                    continue;
                }
                next = Some(neighbor.tet());
                break;
            }
            match next {
                Some(t) => {
                    previous = current;
                    current = t;
                }
                None => return Ok(current),
            }
        }
        Err(LocateError::WalkExhausted { steps: limit })
    }

    // =========================================================================
    // INSERTION
    // =========================================================================

    fn in_conflict(&self, t: TetId, p: &Point3) -> bool {
        let [a, b, c, d] = self.mesh.tet_points(t);
        self.ctx.insphere_perturbed(&a, &b, &c, &d, p) > 0.0
    }

    /// Collect the cavity of `p` starting at `start` into the scratch buffers.
    fn find_cavity(&mut self, start: TetId, p: &Point3) -> Result<(), InsertionError> {
        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.reset();
        let result = self.grow_cavity(&mut scratch, start, p);
        self.scratch = scratch;
        result
    }

    fn grow_cavity(
        &self,
        scratch: &mut CavityScratch,
        start: TetId,
        p: &Point3,
    ) -> Result<(), InsertionError> {
        scratch.stamps.mark(start.index());
        scratch.stack.push(start);
        scratch.cavity.push(start);

        while let Some(t) = scratch.stack.pop() {
            for i in 0..4 {
                let face = t.face(i);
                let outer = self.mesh.neighbor(face);
                if outer.is_some() {
                    let n = outer.tet();
                    if scratch.stamps.is_marked(n.index()) {
                        continue;
                    }
                    if self.in_conflict(n, p) {
                        scratch.stamps.mark(n.index());
                        scratch.stack.push(n);
                        scratch.cavity.push(n);
                        continue;
                    }
                }
                if scratch.boundary.len() >= CAVITY_FACE_CAPACITY {
                    return Err(InsertionError::CavityOverflow {
                        capacity: CAVITY_FACE_CAPACITY,
                    });
                }
                scratch.boundary.push(BoundaryFace {
                    verts: self.mesh.face_vertices(face),
                    outer,
                    face,
                });
            }
        }

        if scratch.boundary.len() < MIN_CAVITY_FACES {
            return Err(InsertionError::DegenerateCavity {
                faces: scratch.boundary.len(),
            });
        }
        for bf in &scratch.boundary {
            let [a, b, c] = bf.verts.map(|v| self.mesh.position(v));
            if self.ctx.orient3d(&a, &b, &c, p) <= 0.0 {
                return Err(InsertionError::NotStarShaped { face: bf.face });
            }
        }
        Ok(())
    }

    /// Replace the scratch cavity by the cone of its boundary to `v`.
    fn retriangulate(&mut self, v: VertexId) {
        let scratch = &mut self.scratch;
        for &t in &scratch.cavity {
            self.mesh.free_tet(t);
        }
        for bf in &scratch.boundary {
            let [a, b, c] = bf.verts;
            let t = self.mesh.alloc_tet([a, b, c, v]);
            self.mesh.link(t.face(3), bf.outer);
            // Face j of the cone holds v and the two base vertices other than j.
            for j in 0..3 {
                let (x, y) = (bf.verts[(j + 1) % 3], bf.verts[(j + 2) % 3]);
                let key = if x < y { (x, y) } else { (y, x) };
                match scratch.pairing.entry(key) {
                    Entry::Occupied(slot) => {
                        let other = slot.remove();
                        self.mesh.link(t.face(j), other);
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(t.face(j));
                    }
                }
            }
            scratch.new_tets.push(t);
        }
        debug_assert!(scratch.pairing.is_empty(), "unpaired cavity faces");
        if let Some(&t) = scratch.new_tets.first() {
            self.last_tet = t;
        }
    }

    /// Insert a single point as a vertex of the given kind.
    ///
    /// # Errors
    ///
    /// Returns an [`InsertionError`] when the point is not finite, cannot be located,
    /// duplicates a vertex or yields an invalid cavity. The mesh is left unchanged.
    pub fn add_vertex(&mut self, p: Point3, kind: VertexKind) -> Result<VertexId, InsertionError> {
        if !is_finite(&p) {
            return Err(InsertionError::NonFinitePoint { point: p });
        }
        if !self.octree.bounds().contains(&p) {
            return Err(LocateError::OutsideHull { point: p }.into());
        }
        let t = self.locate(&p)?;
        if let Some(&vertex) = self
            .mesh
            .tet_vertices(t)
            .iter()
            .find(|&&v| self.mesh.position(v) == p)
        {
            return Err(InsertionError::DuplicateVertex { vertex });
        }
        self.find_cavity(t, &p)?;

        let v = self.mesh.push_vertex(p, kind);
        self.retriangulate(v);
        if kind != VertexKind::Super {
            let indexed = self.octree.insert(p, v);
            debug_assert!(indexed, "vertex {v} escaped the point index");
        }
        tracing::trace!(vertex = %v, cavity = self.scratch.cavity.len(), "inserted vertex");
        Ok(v)
    }

    /// Insert `points` as interior vertices, skipping any closer than `min_dist` to an
    /// existing vertex.
    ///
    /// Returns `false` if any insertion failed; the successful ones are kept.
    pub fn add_vertices(&mut self, points: &[Point3], min_dist: f64) -> bool {
        self.add_vertices_with_report(points, VertexKind::Interior, min_dist)
            .is_success()
    }

    /// Insert `points` in BRIO order and report per-point outcomes.
    ///
    /// A point within `min_dist` of an already inserted vertex (including earlier
    /// points of the same batch) is skipped, not failed. A failed point is logged
    /// and the batch moves on.
    pub fn add_vertices_with_report(
        &mut self,
        points: &[Point3],
        kind: VertexKind,
        min_dist: f64,
    ) -> BatchReport {
        let order = brio_order(points, &mut self.rng);
        let mut report = BatchReport {
            vertices: vec![None; points.len()],
            ..BatchReport::default()
        };
        for index in order {
            let p = points[index];
            if min_dist > 0.0 && self.has_vertex_within(&p, min_dist) {
                report.skipped += 1;
                continue;
            }
            match self.add_vertex(p, kind) {
                Ok(v) => {
                    report.inserted += 1;
                    report.vertices[index] = Some(v);
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::debug!(index, %err, "vertex insertion failed");
                }
            }
        }
        if report.is_success() {
            tracing::debug!(
                inserted = report.inserted,
                skipped = report.skipped,
                "insertion batch finished"
            );
        } else {
            tracing::warn!(
                inserted = report.inserted,
                skipped = report.skipped,
                failed = report.failed,
                "insertion batch had failures"
            );
        }
        report
    }
}
