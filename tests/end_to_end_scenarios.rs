//! End-to-end scenarios across the predicates, the Delaunay engine, the surface
//! kernel and the boundary-layer front.

use std::sync::Once;

use approx::assert_relative_eq;
use volmesh::config::ContourConfig;
use volmesh::core::delaunay::insertion::Delaunay;
use volmesh::core::handles::VertexId;
use volmesh::core::layers::front::Front;
use volmesh::core::surface::mesh::SurfaceMesh;
use volmesh::core::surface::primitives::planar_grid;
use volmesh::geometry::aabb::Aabb;
use volmesh::geometry::point::{Point3, Vector3, triangle_normal};
use volmesh::volume::BoundaryKind;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

fn wide_domain() -> Aabb {
    Aabb::cube(&Point3::origin(), 10.0)
}

// =============================================================================
// DELAUNAY STAR AROUND A CENTROID
// =============================================================================

/// Five cube corners forming a triangular bipyramid around the cube centroid: the
/// lower corner tetrahedron has the centroid at its circumcenter, so every Delaunay
/// tetrahedron must use the centroid and there is one per hull face.
#[test]
fn test_bipyramid_corners_and_centroid_give_six_tets() {
    init_tracing();
    let centroid = Point3::new(0.5, 0.5, 0.5);
    let points = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(1.0, 1.0, 1.0),
        centroid,
    ];
    let mut engine = Delaunay::new(&wide_domain(), 17).unwrap();
    assert!(engine.add_vertices(&points, 0.0));
    engine.mesh().validate_delaunay(engine.context()).unwrap();

    let volume = engine.complete(None);
    assert_eq!(volume.cell_count(), 6);
    assert_eq!(volume.boundary_face_count(BoundaryKind::Pressure), 6);
    let center = volume
        .vertices
        .iter()
        .position(|p| *p == centroid)
        .unwrap();
    assert!(volume.cells.iter().all(|c| c.vertices.contains(&center)));
    // Bipyramid volume: two tetrahedra of volume 1/6 and 1/3.
    assert_relative_eq!(volume.total_volume(), 0.5, epsilon = 1e-12);
    volume.validate().unwrap();
}

#[test]
fn test_regular_tet_and_centroid_give_four_tets() {
    init_tracing();
    let points = [
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(1.0, 0.0, 1.0),
        Point3::new(0.0, 1.0, 1.0),
        Point3::new(0.5, 0.5, 0.5),
    ];
    let mut engine = Delaunay::new(&wide_domain(), 5).unwrap();
    assert!(engine.add_vertices(&points, 0.0));
    let volume = engine.complete(None);
    assert_eq!(volume.cell_count(), 4);
    assert_relative_eq!(volume.total_volume(), 1.0 / 3.0, epsilon = 1e-12);
    volume.validate().unwrap();
}

// =============================================================================
// BOUNDARY-LAYER EXTRUSION
// =============================================================================

/// 10 × 10 unit grid with its center vertex raised by 0.25.
fn bumped_grid() -> (SurfaceMesh, usize) {
    let flat = planar_grid(10, 10, 1.0).unwrap();
    let center = 5 * 11 + 5;
    let mut positions = flat.positions().to_vec();
    positions[center].z = 0.25;
    let mesh = SurfaceMesh::from_triangles(positions, &flat.indexed_triangles()).unwrap();
    (mesh, center)
}

#[test]
fn test_one_layer_over_bumped_grid_follows_area_weighted_normals() {
    init_tracing();
    let (surface, center) = bumped_grid();
    let bounds = surface.aabb().padded(3.0);
    let mut engine = Delaunay::new(&bounds, 23).unwrap();
    let (mut front, seeded) = Front::seed(&mut engine, &surface).unwrap();
    assert_eq!(seeded.iter().flatten().count(), 121);

    let config = ContourConfig {
        layers: 1,
        initial_height: 1.0,
        growth: 1.0,
        curvature_weight: 0.0,
        min_quad_quality: 0.0,
        collision_factor: 0.5,
    };
    let stats = front.advance(&mut engine, None, &config, 1.0).unwrap();
    assert_eq!(stats.active, 121);
    assert_eq!(stats.extruded, 121);
    assert_eq!(stats.stopped.total(), 0);

    let triangles = surface.indexed_triangles();
    let positions = surface.positions();
    for v in 0..positions.len() {
        let mut normal = Vector3::zeros();
        for tri in triangles.iter().filter(|tri| tri.contains(&v)) {
            normal += triangle_normal(&positions[tri[0]], &positions[tri[1]], &positions[tri[2]]);
        }
        let expected = positions[v] + normal.normalize();
        let id = stats.vertices[v].unwrap();
        assert_relative_eq!(engine.mesh().position(id), expected, epsilon = 1e-12);
        assert_relative_eq!(front.position(v), expected, epsilon = 1e-12);
    }
    // The bump tilts its neighbors' normals away from it.
    let west = front.normal(center - 1);
    assert!(west.x < 0.0 && west.z > 0.0);
    assert_relative_eq!(front.normal(center), Vector3::z(), epsilon = 1e-12);

    engine.mesh().validate_adjacency().unwrap();
    engine.mesh().validate_orientation(engine.context()).unwrap();
}

// =============================================================================
// DELAUNAY EDGE FLIPS ON THE SURFACE
// =============================================================================

/// Two triangles `(0, 1, 2)` and `(1, 0, 3)` sharing edge `0-1`, with apexes at
/// distance `apex` from it.
fn kite(apex: f64) -> SurfaceMesh {
    let positions = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(2.0, 0.0, 0.0),
        Point3::new(1.0, apex, 0.0),
        Point3::new(1.0, -apex, 0.0),
    ];
    SurfaceMesh::from_triangles(positions, &[[0, 1, 2], [1, 0, 3]]).unwrap()
}

#[test]
fn test_flip_bad_edge_keeps_legal_edges() {
    let mut mesh = kite(1.5);
    let before = mesh.indexed_triangles();
    let e = mesh.find_edge(VertexId::new(0), VertexId::new(1)).unwrap();
    assert!(mesh.opposite_angle_sum(e).unwrap() < std::f64::consts::PI);
    assert!(mesh.flip_bad_edge(e).is_none());
    assert_eq!(mesh.indexed_triangles(), before);
    mesh.validate_adjacency().unwrap();
}

#[test]
fn test_flip_bad_edge_replaces_illegal_edge() {
    let mut mesh = kite(0.2);
    let e = mesh.find_edge(VertexId::new(0), VertexId::new(1)).unwrap();
    let id = mesh.stable_id(e);
    assert!(mesh.opposite_angle_sum(e).unwrap() > std::f64::consts::PI);

    let diagonal = mesh.flip_bad_edge(e).unwrap();
    let (a, b) = mesh.edge_vertices(diagonal);
    let mut pair = [a.index(), b.index()];
    pair.sort_unstable();
    assert_eq!(pair, [2, 3]);
    assert_eq!(mesh.stable_id(diagonal), id);
    assert!(!mesh.has_edge(VertexId::new(0), VertexId::new(1)));

    let twin = mesh.twin(diagonal);
    assert!(twin.is_some());
    assert_eq!(mesh.twin(twin), diagonal);
    mesh.validate_adjacency().unwrap();
}
