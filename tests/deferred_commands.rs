use std::cell::Cell;
use std::rc::Rc;

use swarm_ecs::prelude::*;

#[test]
fn test_nested_iteration_defers_to_outermost_exit() {
    let mut world = World::new();
    let pos = world.define_uniform("Position", "f32", &["x"]).unwrap();
    let mark = world.define_tag("Mark");

    let ids: Vec<EntityId> = (0..4)
        .map(|i| world.create_entity_with(&[(pos, data([("x", Value::num(i as f64))]))]))
        .collect();
    let doomed = ids[0];
    let marked = ids[1];

    let drained_early = Rc::new(Cell::new(false));
    {
        let drained_early = drained_early.clone();
        world.for_each(&[pos], &[], move |w, _| {
            w.destroy_entity(doomed);
            // Inner iteration exits at depth 1: nothing must drain yet
            w.for_each(&[pos], &[], |w2, _| {
                w2.add_component(marked, mark, None);
            });
            drained_early.set(!w.is_alive(doomed) || w.has_component(marked, mark));
        });
    }

    assert!(!drained_early.get());
    assert!(!world.is_alive(doomed));
    assert!(world.has_component(marked, mark));
}

#[test]
fn test_deferred_add_fires_hook_after_drain() {
    let mut world = World::new();
    let pos = world.define_uniform("Position", "f32", &["x"]).unwrap();
    let vel = world.define_uniform("Velocity", "f32", &["vx"]).unwrap();

    let fired = Rc::new(Cell::new(0));
    {
        let fired = fired.clone();
        world.on_add(vel, move |_, _| fired.set(fired.get() + 1));
    }

    let id = world.create_entity_with(&[(pos, data([("x", Value::num(0.0))]))]);
    world.for_each(&[pos], &[], |w, _| {
        w.add_component(id, vel, Some(data([("vx", Value::num(5.0))])));
    });

    // The add replayed at iteration exit; the event waits for the flush
    assert!(world.has_component(id, vel));
    assert_eq!(fired.get(), 0);
    world.flush_hooks();
    assert_eq!(fired.get(), 1);

    let vx = world.field(vel, "vx").unwrap();
    assert_eq!(world.get(id, vx), Some(Value::Num(5.0)));
}

#[test]
fn test_destroy_then_ops_on_dead_entity_are_silent() {
    let mut world = World::new();
    let pos = world.define_uniform("Position", "f32", &["x"]).unwrap();
    let id = world.create_entity_with(&[(pos, data([("x", Value::num(1.0))]))]);

    world.for_each(&[pos], &[], |w, _| {
        w.destroy_entity(id);
        // The destroy is pending, so the entity still has the component and
        // this overwrite stays immediate
        w.add_component(id, pos, Some(data([("x", Value::num(2.0))])));
        w.remove_component(id, pos);
    });

    assert!(!world.is_alive(id));
    assert_eq!(world.count(&[pos], &[]), 0);

    // Structural no-ops outside iteration are silent successes too
    world.destroy_entity(id);
    world.remove_component(id, pos);
    let x = world.field(pos, "x").unwrap();
    world.set(id, x, &Value::num(9.0));
    assert_eq!(world.get(id, x), None);
}
