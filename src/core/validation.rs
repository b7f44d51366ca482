//! Adjacency validation errors shared by the surface and volume meshes.

use crate::core::handles::{EdgeHandle, FaceHandle, StableEdgeId, TetId, TriId, VertexId};

/// A violated structural invariant found by `validate_adjacency`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// Twin of a half-edge does not point back.
    #[error("half-edge {edge} has twin {twin} whose twin is {back}")]
    AsymmetricEdge {
        /// The half-edge being checked.
        edge: EdgeHandle,
        /// Its recorded twin.
        twin: EdgeHandle,
        /// What the twin records as its own twin.
        back: EdgeHandle,
    },
    /// Twin half-edges do not run between the same two vertices in opposite directions.
    #[error("half-edge {edge} and twin {twin} do not share reversed endpoints")]
    MismatchedTwin {
        /// The half-edge being checked.
        edge: EdgeHandle,
        /// Its recorded twin.
        twin: EdgeHandle,
    },
    /// A live element references a deleted neighbor.
    #[error("triangle {tri} references deleted neighbor through {edge}")]
    DeletedTriangleNeighbor {
        /// Live triangle.
        tri: TriId,
        /// Offending half-edge.
        edge: EdgeHandle,
    },
    /// A live half-edge has no stable id, or its stable id resolves elsewhere.
    #[error("half-edge {edge} has stable id {id} that does not resolve back to it")]
    StableIdMismatch {
        /// Offending half-edge.
        edge: EdgeHandle,
        /// Its stable id.
        id: StableEdgeId,
    },
    /// A vertex's cached outgoing edge is dead or does not start at it.
    #[error("vertex {vertex} caches invalid outgoing edge {edge}")]
    StaleVertexEdge {
        /// Offending vertex.
        vertex: VertexId,
        /// Cached edge.
        edge: EdgeHandle,
    },
    /// Face neighbor of a tetrahedron does not point back.
    #[error("face {face} has neighbor {neighbor} whose neighbor is {back}")]
    AsymmetricFace {
        /// Face being checked.
        face: FaceHandle,
        /// Recorded neighbor face.
        neighbor: FaceHandle,
        /// What the neighbor records.
        back: FaceHandle,
    },
    /// Neighboring faces do not share the same three vertices.
    #[error("face {face} and neighbor {neighbor} do not share vertices")]
    MismatchedFace {
        /// Face being checked.
        face: FaceHandle,
        /// Recorded neighbor face.
        neighbor: FaceHandle,
    },
    /// A live tetrahedron references a deleted neighbor.
    #[error("tetrahedron {tet} references deleted neighbor through {face}")]
    DeletedTetNeighbor {
        /// Live tetrahedron.
        tet: TetId,
        /// Offending face.
        face: FaceHandle,
    },
    /// A live tetrahedron is not positively oriented.
    #[error("tetrahedron {tet} is not positively oriented")]
    InvertedTet {
        /// Offending tetrahedron.
        tet: TetId,
    },
    /// A vertex lies strictly inside the circumsphere of a tetrahedron.
    #[error("vertex {vertex} lies inside the circumsphere of tetrahedron {tet}")]
    NonDelaunay {
        /// Offending tetrahedron.
        tet: TetId,
        /// Vertex inside its circumsphere.
        vertex: VertexId,
    },
}
