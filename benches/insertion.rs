//! Benchmarks for the Delaunay engine and the predicates it is built on.
//!
//! - `predicates/*`: filtered `orient3d`/`insphere` on random and near-degenerate input
//! - `insertion/*`: batch insertion of uniform random points (BRIO order)
//! - `layers/*`: boundary-layer extrusion over a planar grid

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use volmesh::config::{ContourConfig, GridConfig};
use volmesh::core::delaunay::insertion::Delaunay;
use volmesh::core::layers::generator::generate_n_layers;
use volmesh::core::surface::primitives::planar_grid;
use volmesh::geometry::aabb::Aabb;
use volmesh::geometry::point::Point3;
use volmesh::geometry::predicates::PredicateContext;

fn random_points(count: usize, seed: u64) -> Vec<Point3> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| Point3::new(rng.random(), rng.random(), rng.random()))
        .collect()
}

fn unit_box() -> Aabb {
    Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0))
}

fn benchmark_predicates(c: &mut Criterion) {
    let ctx = PredicateContext::for_bounds(&unit_box());
    let points = random_points(1000, 42);
    let [a, b, c0, d] = [points[0], points[1], points[2], points[3]];

    c.bench_function("predicates/orient3d_1000_random", |bench| {
        bench.iter(|| {
            for p in &points {
                black_box(ctx.orient3d(&a, &b, &c0, black_box(p)));
            }
        });
    });

    c.bench_function("predicates/insphere_1000_random", |bench| {
        bench.iter(|| {
            for p in &points {
                black_box(ctx.insphere(&a, &b, &c0, &d, black_box(p)));
            }
        });
    });

    // Points a few ulps off the plane z = 0.5 force the exact fallback.
    let plane = [
        Point3::new(0.1, 0.1, 0.5),
        Point3::new(0.9, 0.2, 0.5),
        Point3::new(0.3, 0.8, 0.5),
    ];
    let near: Vec<Point3> = points
        .iter()
        .enumerate()
        .map(|(i, p)| Point3::new(p.x, p.y, 0.5 + f64::EPSILON * (i % 7) as f64))
        .collect();
    c.bench_function("predicates/orient3d_1000_near_coplanar", |bench| {
        bench.iter(|| {
            for p in &near {
                black_box(ctx.orient3d(&plane[0], &plane[1], &plane[2], black_box(p)));
            }
        });
    });
}

fn benchmark_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("insertion");
    group.sample_size(20);
    for &count in &[1_000_usize, 5_000, 20_000] {
        let points = random_points(count, 7);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("uniform", count), &points, |bench, points| {
            bench.iter_batched(
                || Delaunay::new(&unit_box(), 1).unwrap(),
                |mut engine| {
                    black_box(engine.add_vertices(points, 0.0));
                    engine
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn benchmark_layers(c: &mut Criterion) {
    let mut group = c.benchmark_group("layers");
    group.sample_size(10);
    let contour = ContourConfig {
        layers: 3,
        initial_height: 0.05,
        growth: 1.2,
        ..ContourConfig::default()
    };
    let grid = GridConfig {
        resolution: 0.25,
        layers: 2,
    };
    for &n in &[10_usize, 20] {
        let surface = planar_grid(n, n, 1.0 / n as f64).unwrap();
        let bounds = Aabb::new(Point3::new(-0.5, -0.5, -1.0), Point3::new(1.5, 1.5, 1.0));
        group.bench_with_input(BenchmarkId::new("planar_grid", n), &surface, |bench, surface| {
            bench.iter_batched(
                || Delaunay::new(&bounds, 3).unwrap(),
                |mut engine| {
                    black_box(generate_n_layers(&mut engine, surface, &contour, &grid).unwrap());
                    engine
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_predicates, benchmark_insertion, benchmark_layers);
criterion_main!(benches);
