//! # volmesh
//!
//! Volumetric mesh generation for computational fluid dynamics.
//!
//! Given closed or open triangulated input surfaces and a domain box, the crate
//! builds a tetrahedral volume mesh that fills the domain around the surfaces:
//! thin prismatic-style boundary layers hug the walls, a graded background grid
//! fills the far field, and every face of the result is either shared by two cells
//! or tagged as a wall or far-field (pressure) boundary.
//!
//! # Features
//!
//! - Exact `orient3d`/`insphere` predicates (adaptive floating-point filter with an
//!   expansion-arithmetic fallback)
//! - Incremental Delaunay tetrahedralization with a super-tetrahedron, randomized
//!   point-location walk, Bowyer-Watson cavity and BRIO insertion order
//! - A twin-edge surface kernel with stable edge ids across flips, splits and collapses
//! - Advancing-front boundary layers with curvature-aware heights and collision checks
//! - Octree and BVH spatial indices
//! - Serializable, builder-constructed configuration with [serde](https://serde.rs)
//!
//! # Basic Usage
//!
//! ```rust
//! use volmesh::prelude::*;
//!
//! let solid = Aabb::cube(&Point3::origin(), 0.5);
//! let mut generator = MeshGenerator::new();
//! generator.add_model(InputModel::new(1, vec![box_surface(&solid, 2).unwrap()]));
//!
//! let contour = ContourConfigBuilder::default()
//!     .layers(2)
//!     .initial_height(0.05)
//!     .growth(1.5)
//!     .curvature_weight(0.0)
//!     .min_quad_quality(0.0)
//!     .build()
//!     .unwrap();
//! let config = DomainConfigBuilder::default()
//!     .bounds(Aabb::cube(&Point3::origin(), 2.0))
//!     .contour(contour)
//!     .grid(GridConfig { resolution: 0.5, layers: 2 })
//!     .refine(RefineConfig { max_passes: 1, max_edge_ratio: 8.0, target_size: 0.0 })
//!     .smoothing_passes(1)
//!     .seed(3)
//!     .build()
//!     .unwrap();
//! generator.set_domain(config);
//!
//! let mesh = generator.generate().unwrap();
//! assert!(mesh.volume.validate().is_ok());
//! assert!(mesh.volume.boundary_face_count(BoundaryKind::Wall) > 0);
//! ```
//!
//! The phases are also usable on their own: [`Delaunay`](core::delaunay::insertion::Delaunay)
//! is a general incremental tetrahedralizer, and
//! [`generate_n_layers`](core::layers::generator::generate_n_layers) extrudes layers
//! into any engine.
//!
//! ```rust
//! use volmesh::prelude::*;
//!
//! let bounds = Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
//! let mut engine = Delaunay::new(&bounds, 42).unwrap();
//! assert!(engine.add_vertices(&bounds.corners(), 0.0));
//!
//! let volume = engine.complete(None);
//! assert_eq!(volume.vertex_count(), 8);
//! assert!((volume.total_volume() - 1.0).abs() < 1e-12);
//! ```
//!
//! # Diagnostics
//!
//! Every phase logs through [`tracing`]; install any subscriber to see progress.
//! Intermediate geometry can be captured by passing a [`MeshTracer`](trace::MeshTracer)
//! to [`MeshGenerator::with_tracer`](generate::MeshGenerator::with_tracer).

// Forbid unsafe code throughout the entire crate
#![forbid(unsafe_code)]

#[macro_use]
extern crate derive_builder;

/// Mesh data structures and the meshing algorithms that operate on them.
pub mod core {
    /// High-performance collection types used throughout the crate
    pub mod collections;
    pub mod handles;
    pub mod validation;

    /// Triangulated input surfaces: the twin-edge kernel and its editing operations.
    pub mod surface {
        /// Point location on a surface
        pub mod locate;
        pub mod mesh;
        /// Flip, split, collapse and vertex relocation
        pub mod ops;
        pub mod primitives;
        pub mod stable;
    }

    /// Incremental Delaunay tetrahedralization and its post-processing.
    pub mod delaunay {
        /// Biased randomized insertion order
        pub mod brio;
        /// Conversion into a CFD volume
        pub mod complete;
        pub mod insertion;
        /// Circumcenter refinement of poorly shaped tetrahedra
        pub mod refine;
        /// Constrained Laplacian smoothing
        pub mod smooth;
        pub mod tet_mesh;
    }

    /// Boundary-layer extrusion and the background grid.
    pub mod layers {
        pub mod background;
        pub mod front;
        pub mod generator;
    }
}

/// Points, boxes, robust predicates and element quality measures.
pub mod geometry {
    pub mod aabb;
    /// Floating-point expansion arithmetic
    pub mod expansion;
    /// Segment, triangle and box intersection tests
    pub mod intersect;
    pub mod point;
    pub mod predicates;
    /// Geometric quality measures for triangles, quads and tetrahedra
    pub mod quality;
}

/// Spatial indices: point and cell octrees and a triangle BVH.
pub mod spatial {
    pub mod bvh;
    pub mod cell_octree;
    pub mod point_octree;
}

pub mod config;
pub mod generate;
pub mod trace;
pub mod volume;

/// A prelude module that re-exports commonly used types.
/// This makes it easier to import the most commonly used items from the crate.
pub mod prelude {
    pub use crate::config::{
        ConfigError, ContourConfig, ContourConfigBuilder, DomainConfig, DomainConfigBuilder,
        GridConfig, RefineConfig,
    };
    pub use crate::core::delaunay::insertion::{BatchReport, Delaunay, InsertionError};
    pub use crate::core::delaunay::tet_mesh::{TetMesh, VertexKind};
    pub use crate::core::handles::*;
    pub use crate::core::layers::generator::{LayerError, LayerReport, generate_n_layers};
    pub use crate::core::surface::mesh::{SurfaceMesh, SurfaceMeshError};
    pub use crate::core::surface::primitives::{box_surface, planar_grid};
    pub use crate::core::surface::stable::EdgeFlags;
    pub use crate::generate::{GeneratedMesh, InputModel, MeshGenError, MeshGenerator};
    pub use crate::geometry::aabb::Aabb;
    pub use crate::geometry::point::{Point3, Vector3};
    pub use crate::geometry::predicates::{Orientation, PredicateContext};
    pub use crate::spatial::bvh::Bvh;
    pub use crate::trace::{MeshTracer, NoopTracer};
    pub use crate::volume::{BoundaryKind, Cell, CellShape, CfdVolume, FaceLink};

    // Re-export commonly used collection types from core::collections
    pub use crate::core::collections::{
        FastHashMap, FastHashSet, SmallBuffer, fast_hash_map_with_capacity,
        fast_hash_set_with_capacity,
    };
}

/// The function `is_normal` checks that structs implement `auto` traits.
/// Traits are checked at compile time, so this function is only used for
/// testing.
#[must_use]
pub const fn is_normal<T: Sized + Send + Sync + Unpin>() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use crate::is_normal;
    use crate::prelude::*;

    #[test]
    fn normal_types() {
        assert!(is_normal::<Point3>());
        assert!(is_normal::<Aabb>());
        assert!(is_normal::<SurfaceMesh>());
        assert!(is_normal::<TetMesh>());
        assert!(is_normal::<CfdVolume>());
        assert!(is_normal::<DomainConfig>());
    }

    #[test]
    fn test_prelude_collections_exports() {
        let mut map: FastHashMap<u64, usize> = FastHashMap::default();
        map.insert(123, 456);
        assert_eq!(map.get(&123), Some(&456));

        let mut set: FastHashSet<VertexId> = FastHashSet::default();
        set.insert(VertexId::new(7));
        assert!(set.contains(&VertexId::new(7)));

        let mut buffer: SmallBuffer<i32, 8> = SmallBuffer::new();
        buffer.push(42);
        assert_eq!(buffer.len(), 1);

        assert!(fast_hash_map_with_capacity::<u64, usize>(100).capacity() >= 100);
        assert!(fast_hash_set_with_capacity::<u64>(50).capacity() >= 50);
    }
}
