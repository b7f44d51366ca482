//! The finished volume mesh handed to the solver.
//!
//! A [`CfdVolume`] is a flat vertex array plus a cell array. Every cell records its
//! [`CellShape`], its vertices, and for each face either the neighboring cell or
//! the kind of domain boundary it lies on. Face vertex order comes from the shape's
//! local face table and is always outward-facing (counterclockwise seen from
//! outside the cell).

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::geometry::point::{Point3, Vector3};

/// Local faces of a tetrahedron `[v0, v1, v2, v3]` with `orient3d(v0, v1, v2, v3) > 0`.
const TETRA_FACES: [&[usize]; 4] = [&[1, 3, 2], &[0, 2, 3], &[0, 3, 1], &[0, 1, 2]];

/// Local faces of a prism with bottom `0, 1, 2` (counterclockwise from above) and top `3, 4, 5`.
const PRISM_FACES: [&[usize]; 5] = [
    &[0, 2, 1],
    &[3, 4, 5],
    &[0, 1, 4, 3],
    &[1, 2, 5, 4],
    &[2, 0, 3, 5],
];

/// Local faces of a hexahedron with bottom `0..4` (counterclockwise from above) and top `4..8`.
const HEXA_FACES: [&[usize]; 6] = [
    &[0, 3, 2, 1],
    &[4, 5, 6, 7],
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[3, 0, 4, 7],
];

/// Cell topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellShape {
    /// 4 vertices, 4 triangular faces.
    Tetra,
    /// 6 vertices, 2 triangular and 3 quad faces.
    Prism,
    /// 8 vertices, 6 quad faces.
    Hexa,
}

impl CellShape {
    /// Number of vertices.
    #[must_use]
    pub const fn vertex_count(self) -> usize {
        match self {
            Self::Tetra => 4,
            Self::Prism => 6,
            Self::Hexa => 8,
        }
    }

    /// Number of faces.
    #[must_use]
    pub const fn face_count(self) -> usize {
        match self {
            Self::Tetra => 4,
            Self::Prism => 5,
            Self::Hexa => 6,
        }
    }

    /// Local vertex indices of `face`, outward oriented.
    #[must_use]
    pub fn face(self, face: usize) -> &'static [usize] {
        match self {
            Self::Tetra => TETRA_FACES[face],
            Self::Prism => PRISM_FACES[face],
            Self::Hexa => HEXA_FACES[face],
        }
    }
}

/// Which part of the domain boundary a face lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// Outer far-field boundary.
    Pressure,
    /// Solid wall of an input model.
    Wall,
}

/// What lies across a cell face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceLink {
    /// Another cell, by index.
    Cell(usize),
    /// The domain boundary.
    Boundary(BoundaryKind),
}

/// One volume cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Topology.
    pub shape: CellShape,
    /// Indices into [`CfdVolume::vertices`].
    pub vertices: SmallVec<[usize; 8]>,
    /// One link per face, in the shape's face order.
    pub faces: SmallVec<[FaceLink; 6]>,
}

/// Structural problems found by [`CfdVolume::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VolumeError {
    /// A cell's vertex or face count does not match its shape.
    #[error("cell {cell} does not match its {shape:?} shape")]
    ShapeMismatch {
        /// Offending cell.
        cell: usize,
        /// Its declared shape.
        shape: CellShape,
    },
    /// A cell references a vertex past the end of the vertex array.
    #[error("cell {cell} references missing vertex {vertex}")]
    VertexOutOfRange {
        /// Offending cell.
        cell: usize,
        /// Missing vertex index.
        vertex: usize,
    },
    /// A face links to a cell that does not exist.
    #[error("cell {cell} face {face} links to missing cell {neighbor}")]
    DanglingNeighbor {
        /// Offending cell.
        cell: usize,
        /// Face index.
        face: usize,
        /// Missing neighbor.
        neighbor: usize,
    },
    /// No face of the neighbor links back through the same vertices.
    #[error("cell {cell} face {face} links to cell {neighbor}, which does not link back")]
    NonReciprocalNeighbor {
        /// Offending cell.
        cell: usize,
        /// Face index.
        face: usize,
        /// Neighbor cell.
        neighbor: usize,
    },
}

/// Flat volume mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CfdVolume {
    /// Vertex positions.
    pub vertices: Vec<Point3>,
    /// Cells.
    pub cells: Vec<Cell>,
}

impl CfdVolume {
    /// Empty volume.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of cells.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Global vertex indices of `face` of `cell`, outward oriented.
    #[must_use]
    pub fn face_vertices(&self, cell: usize, face: usize) -> SmallVec<[usize; 4]> {
        let c = &self.cells[cell];
        c.shape.face(face).iter().map(|&i| c.vertices[i]).collect()
    }

    /// Volume of `cell` by the divergence theorem over its fan-triangulated faces.
    #[must_use]
    pub fn cell_volume(&self, cell: usize) -> f64 {
        let c = &self.cells[cell];
        #[allow(clippy::cast_precision_loss)]
        let reference = Point3::from(
            c.vertices.iter().map(|&v| self.vertices[v].coords).sum::<Vector3>()
                / c.vertices.len() as f64,
        );
        let mut volume = 0.0;
        for face in 0..c.shape.face_count() {
            let verts = self.face_vertices(cell, face);
            let a = self.vertices[verts[0]] - reference;
            for k in 1..verts.len() - 1 {
                let b = self.vertices[verts[k]] - reference;
                let d = self.vertices[verts[k + 1]] - reference;
                volume += a.dot(&b.cross(&d));
            }
        }
        volume / 6.0
    }

    /// Sum of all cell volumes.
    #[must_use]
    pub fn total_volume(&self) -> f64 {
        (0..self.cells.len()).map(|c| self.cell_volume(c)).sum()
    }

    /// Number of boundary faces of the given kind.
    #[must_use]
    pub fn boundary_face_count(&self, kind: BoundaryKind) -> usize {
        self.cells
            .iter()
            .flat_map(|c| c.faces.iter())
            .filter(|&&link| link == FaceLink::Boundary(kind))
            .count()
    }

    /// Check shapes, vertex indices, and that every neighbor link is reciprocated
    /// through a face with the same vertices.
    ///
    /// # Errors
    ///
    /// Returns the first [`VolumeError`] found.
    pub fn validate(&self) -> Result<(), VolumeError> {
        for (cell, c) in self.cells.iter().enumerate() {
            if c.vertices.len() != c.shape.vertex_count() || c.faces.len() != c.shape.face_count() {
                return Err(VolumeError::ShapeMismatch { cell, shape: c.shape });
            }
            if let Some(&vertex) = c.vertices.iter().find(|&&v| v >= self.vertices.len()) {
                return Err(VolumeError::VertexOutOfRange { cell, vertex });
            }
        }
        for (cell, c) in self.cells.iter().enumerate() {
            for (face, link) in c.faces.iter().enumerate() {
                let FaceLink::Cell(neighbor) = *link else {
                    continue;
                };
                let Some(other) = self.cells.get(neighbor) else {
                    return Err(VolumeError::DanglingNeighbor { cell, face, neighbor });
                };
                let mut mine = self.face_vertices(cell, face);
                mine.sort_unstable();
                let reciprocal = other.faces.iter().enumerate().any(|(j, &back)| {
                    if back != FaceLink::Cell(cell) {
                        return false;
                    }
                    let mut theirs = self.face_vertices(neighbor, j);
                    theirs.sort_unstable();
                    theirs == mine
                });
                if !reciprocal {
                    return Err(VolumeError::NonReciprocalNeighbor { cell, face, neighbor });
                }
            }
        }
        Ok(())
    }
}
