//! Strongly typed integer handles into the mesh arrays.
//!
//! Every element lives in a growable array and is addressed by its index. Element
//! sub-entities are encoded arithmetically: the `i`-th face of tetrahedron `t` is
//! `4t + i`, the `i`-th edge of triangle `t` is `3t + i`. Handles stay valid across
//! reallocation; whether they point at a live element is decided by the owning mesh.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! index_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Sentinel for "no element".
            pub const NONE: Self = Self(u32::MAX);

            /// Wrap a raw index.
            #[inline]
            #[must_use]
            pub fn new(index: usize) -> Self {
                debug_assert!(index < u32::MAX as usize, "handle index overflow");
                #[allow(clippy::cast_possible_truncation)]
                Self(index as u32)
            }

            /// Raw index into the owning array.
            #[inline]
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// `true` unless this is [`Self::NONE`].
            #[inline]
            #[must_use]
            pub const fn is_some(self) -> bool {
                self.0 != u32::MAX
            }

            /// `true` for [`Self::NONE`].
            #[inline]
            #[must_use]
            pub const fn is_none(self) -> bool {
                self.0 == u32::MAX
            }

            /// `Some(self)` unless this is the sentinel.
            #[inline]
            #[must_use]
            pub const fn get(self) -> Option<Self> {
                if self.is_some() { Some(self) } else { None }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NONE
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_none() {
                    write!(f, concat!($prefix, "(none)"))
                } else {
                    write!(f, concat!($prefix, "{}"), self.0)
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

index_handle!(
    /// A vertex of the Delaunay engine or a surface mesh.
    VertexId,
    "v"
);
index_handle!(
    /// A tetrahedron of the Delaunay engine.
    TetId,
    "t"
);
index_handle!(
    /// A directed face `4 * tet + local` of a tetrahedron; local face `i` is opposite vertex `i`.
    FaceHandle,
    "f"
);
index_handle!(
    /// A triangle of a surface mesh.
    TriId,
    "tri"
);
index_handle!(
    /// A directed edge `3 * tri + local` of a surface triangle; local edge `i` runs from
    /// vertex `i` to vertex `(i + 1) % 3`.
    EdgeHandle,
    "e"
);
index_handle!(
    /// Permanent identity of a surface edge that survives flips, splits and collapses.
    StableEdgeId,
    "s"
);

impl TetId {
    /// Face `local` (0..4) of this tetrahedron.
    #[inline]
    #[must_use]
    pub fn face(self, local: usize) -> FaceHandle {
        debug_assert!(local < 4);
        FaceHandle::new(self.index() * 4 + local)
    }
}

impl FaceHandle {
    /// Owning tetrahedron.
    #[inline]
    #[must_use]
    pub fn tet(self) -> TetId {
        TetId::new(self.index() / 4)
    }

    /// Local face index, equal to the local index of the opposite vertex.
    #[inline]
    #[must_use]
    pub const fn local(self) -> usize {
        self.index() % 4
    }
}

impl TriId {
    /// Edge `local` (0..3) of this triangle.
    #[inline]
    #[must_use]
    pub fn edge(self, local: usize) -> EdgeHandle {
        debug_assert!(local < 3);
        EdgeHandle::new(self.index() * 3 + local)
    }
}

impl EdgeHandle {
    /// Owning triangle.
    #[inline]
    #[must_use]
    pub fn tri(self) -> TriId {
        TriId::new(self.index() / 3)
    }

    /// Local edge index within the triangle.
    #[inline]
    #[must_use]
    pub const fn local(self) -> usize {
        self.index() % 3
    }

    /// Next edge counterclockwise in the same triangle.
    #[inline]
    #[must_use]
    pub fn next(self) -> Self {
        self.tri().edge((self.local() + 1) % 3)
    }

    /// Previous edge in the same triangle.
    #[inline]
    #[must_use]
    pub fn prev(self) -> Self {
        self.tri().edge((self.local() + 2) % 3)
    }
}
