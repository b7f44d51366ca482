//! Integration tests for the full generation pipeline.

use std::sync::{Arc, Mutex};

use volmesh::prelude::*;

#[derive(Debug, Default, Clone)]
struct PhaseLog {
    labels: Arc<Mutex<Vec<String>>>,
    triangles: Arc<Mutex<usize>>,
}

impl MeshTracer for PhaseLog {
    fn draw_triangle(&mut self, _corners: &[Point3; 3]) {
        *self.triangles.lock().unwrap() += 1;
    }

    fn suspend(&mut self, label: &str) {
        self.labels.lock().unwrap().push(label.to_owned());
    }
}

const CONFIG_JSON: &str = r#"{
    "bounds": { "min": [-2.0, -2.0, -2.0], "max": [2.0, 2.0, 2.0] },
    "contour": {
        "layers": 2,
        "initial_height": 0.05,
        "growth": 1.5,
        "curvature_weight": 0.0,
        "min_quad_quality": 0.0
    },
    "grid": { "resolution": 0.5, "layers": 2 },
    "refine": { "max_passes": 1, "max_edge_ratio": 8.0 },
    "smoothing_passes": 1,
    "seed": 3
}"#;

fn box_model(id: u64, center: Point3, half: f64) -> InputModel {
    let aabb = Aabb::cube(&center, half);
    InputModel::new(id, vec![box_surface(&aabb, 2).unwrap(), box_surface(&aabb, 1).unwrap()])
}

#[test]
fn test_generate_from_json_config_reports_every_phase() {
    let config: DomainConfig = serde_json::from_str(CONFIG_JSON).unwrap();
    assert_eq!(config.validate(), Ok(()));

    let log = PhaseLog::default();
    let mut generator = MeshGenerator::new().with_tracer(Box::new(log.clone()));
    generator.add_model(box_model(1, Point3::origin(), 0.5));
    generator.set_domain(config);
    let mesh = generator.generate().unwrap();

    let labels = log.labels.lock().unwrap().clone();
    assert_eq!(
        labels,
        ["contour layer", "contour layer", "background grid", "refine", "smooth", "complete"]
    );
    assert!(*log.triangles.lock().unwrap() > 0);

    assert_eq!(mesh.layers.layers.len(), 2);
    assert!(mesh.layers.extruded() > 0);
    assert!(mesh.layers.grid.inserted > 0);
    mesh.volume.validate().unwrap();
    assert!(mesh.volume.boundary_face_count(BoundaryKind::Wall) > 0);
    assert!(mesh.volume.boundary_face_count(BoundaryKind::Pressure) > 0);
    let domain = Aabb::cube(&Point3::origin(), 2.0);
    let total = mesh.volume.total_volume();
    assert!(total > 0.0 && total <= domain.extent().product() + 1e-9);
    for p in &mesh.volume.vertices {
        assert!(domain.contains(p));
    }

    // The tracer is handed back after the run, so a second run reports again.
    generator.generate().unwrap();
    assert_eq!(log.labels.lock().unwrap().len(), 12);
}

#[test]
fn test_two_models_are_merged_and_coarse_lod_is_used() {
    let mut generator = MeshGenerator::new();
    generator.add_model(box_model(1, Point3::new(-0.8, 0.0, 0.0), 0.4));
    generator.add_model(box_model(2, Point3::new(0.8, 0.0, 0.0), 0.4));
    let mut config: DomainConfig = serde_json::from_str(CONFIG_JSON).unwrap();
    config.lod = 5;
    generator.set_domain(config);

    let mesh = generator.generate().unwrap();
    // The coarsest level of detail (one cell per box edge) of both boxes.
    assert_eq!(mesh.surface.vertex_count(), 16);
    assert_eq!(mesh.surface.triangle_count(), 24);
    assert_eq!(mesh.feature_edges, 24);
    assert!(mesh.surface.is_closed());
    mesh.volume.validate().unwrap();
    assert!(mesh.volume.boundary_face_count(BoundaryKind::Wall) > 0);
}

#[test]
fn test_model_crossing_the_domain_is_rejected_before_meshing() {
    let log = PhaseLog::default();
    let mut generator = MeshGenerator::new().with_tracer(Box::new(log.clone()));
    generator.add_model(box_model(9, Point3::new(1.8, 0.0, 0.0), 0.5));
    generator.set_domain(serde_json::from_str(CONFIG_JSON).unwrap());

    match generator.generate() {
        Err(MeshGenError::MeshOutsideDomain { model_id, .. }) => assert_eq!(model_id, 9),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(log.labels.lock().unwrap().is_empty());
}
