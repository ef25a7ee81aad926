//! Benchmarks for core storage operations
//!
//! Run with: cargo bench
//!
//! This benchmark suite measures:
//! - Entity creation (single and batched archetypes)
//! - Component add/remove migration
//! - Query iteration through column slices

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use swarm_ecs::prelude::*;

fn world_with_motion() -> (World, ComponentDef, ComponentDef) {
    let mut world = World::new();
    let pos = world.define_uniform("Position", "f32", &["x", "y"]).unwrap();
    let vel = world.define_uniform("Velocity", "f32", &["vx", "vy"]).unwrap();
    (world, pos, vel)
}

fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");

    group.bench_function("create_1k_two_components", |b| {
        b.iter(|| {
            let (mut world, pos, vel) = world_with_motion();
            for i in 0..1_000 {
                world.create_entity_with(&[
                    (pos, data([("x", Value::num(i as f64)), ("y", Value::num(0.0))])),
                    (vel, data([("vx", Value::num(1.0)), ("vy", Value::num(0.0))])),
                ]);
            }
            black_box(world.entity_count())
        });
    });

    group.bench_function("create_1k_bare_then_add", |b| {
        b.iter(|| {
            let (mut world, pos, _) = world_with_motion();
            for i in 0..1_000 {
                let id = world.create_entity();
                world.add_component(id, pos, Some(data([("x", Value::num(i as f64))])));
            }
            black_box(world.entity_count())
        });
    });

    group.finish();
}

fn bench_migration(c: &mut Criterion) {
    let mut group = c.benchmark_group("migration");

    group.bench_function("add_remove_1k", |b| {
        let (mut world, pos, vel) = world_with_motion();
        let ids: Vec<EntityId> = (0..1_000)
            .map(|i| world.create_entity_with(&[(pos, data([("x", Value::num(i as f64))]))]))
            .collect();

        b.iter(|| {
            for &id in &ids {
                world.add_component(id, vel, Some(data([("vx", Value::num(1.0))])));
            }
            for &id in &ids {
                world.remove_component(id, vel);
            }
        });
    });

    group.finish();
}

fn bench_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("iteration");

    let (mut world, pos, vel) = world_with_motion();
    for i in 0..100_000 {
        world.create_entity_with(&[
            (pos, data([("x", Value::num(i as f64)), ("y", Value::num(0.0))])),
            (vel, data([("vx", Value::num(1.0)), ("vy", Value::num(2.0))])),
        ]);
    }
    let px = world.field(pos, "x").unwrap();
    let vx = world.field(vel, "vx").unwrap();

    group.bench_function("for_each_100k_integrate", |b| {
        b.iter(|| {
            world.for_each(&[pos, vel], &[], |_, view| {
                let xs = view.column(px).unwrap().as_f32_mut().unwrap();
                let vs = view.column(vx).unwrap().as_f32().unwrap();
                for i in 0..view.len() {
                    xs[i] += vs[i];
                }
            });
        });
    });

    group.bench_function("count_100k", |b| {
        b.iter(|| black_box(world.count(&[pos, vel], &[])));
    });

    group.finish();
}

criterion_group!(benches, bench_create, bench_migration, bench_iteration);
criterion_main!(benches);
