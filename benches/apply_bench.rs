//! Benchmarks for the bulk apply engine at target population (10^6 rows)
//!
//! Run with: cargo bench --bench apply_bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use swarm_ecs::prelude::*;

const POPULATION: usize = 500_000;

fn build_world() -> (World, FieldRef, FieldRef, ComponentDef) {
    let mut world = World::new();
    let pos = world.define_uniform("Position", "f32", &["x", "y"]).unwrap();
    let vel = world.define_uniform("Velocity", "f32", &["vx", "vy"]).unwrap();
    let frozen = world.define_tag("Frozen");

    for i in 0..POPULATION {
        world.create_entity_with(&[
            (pos, data([("x", Value::num(i as f64)), ("y", Value::num(0.0))])),
            (vel, data([("vx", Value::num(1.0)), ("vy", Value::num(0.5))])),
        ]);
        world.create_entity_with(&[
            (pos, data([("x", Value::num(i as f64)), ("y", Value::num(0.0))])),
            (vel, data([("vx", Value::num(1.0)), ("vy", Value::num(0.5))])),
            (frozen, ComponentData::new()),
        ]);
    }

    let px = world.field(pos, "x").unwrap();
    let vx = world.field(vel, "vx").unwrap();
    (world, px, vx, frozen)
}

fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply");
    group.sample_size(20);

    let (mut world, px, vx, frozen) = build_world();

    group.bench_function("add_1m_rows", |b| {
        b.iter(|| {
            world
                .apply(
                    px,
                    &Expr::add(Expr::field(px), Expr::field(vx)),
                    &ApplyFilter::new(),
                )
                .unwrap();
        });
    });

    group.bench_function("add_500k_rows_filtered", |b| {
        b.iter(|| {
            world
                .apply(
                    px,
                    &Expr::add(Expr::field(px), Expr::field(vx)),
                    &ApplyFilter::new().without(&[frozen]),
                )
                .unwrap();
        });
    });

    group.bench_function("random_1m_rows", |b| {
        b.iter(|| {
            world
                .apply(px, &Expr::random(0.0, 1.0), &ApplyFilter::new())
                .unwrap();
        });
    });

    black_box(world.entity_count());
    group.finish();
}

criterion_group!(benches, bench_apply);
criterion_main!(benches);
