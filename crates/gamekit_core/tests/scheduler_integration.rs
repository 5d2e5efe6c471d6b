// Scheduler driving systems over a populated world.
//
// Run with: `cargo test --package gamekit_core --test scheduler_integration`

use bytemuck::{Pod, Zeroable};
use gamekit_core::config::EcsConfig;
use gamekit_core::define_component;
use gamekit_core::ecs::{ArchetypeId, Component, ComponentId, ComponentRegistry, Entity, World};
use gamekit_core::schedule::{GroupBuilder, Scheduler, SystemAccess, SystemDescriptor};
use gamekit_core::time::EcsTime;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Position([f32; 2]);
define_component!(Position, "Position");

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Velocity([f32; 2]);
define_component!(Velocity, "Velocity");

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Health(f32);
define_component!(Health, "Health", Packed);

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Cell(u32);
define_component!(Cell, "Cell", Indexed);

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Spawned(u32);
define_component!(Spawned, "Spawned", Local);

fn world() -> World {
    let mut registry = ComponentRegistry::new();
    registry.register::<Position>().unwrap();
    registry.register::<Velocity>().unwrap();
    registry.register::<Health>().unwrap();
    registry.register::<Cell>().unwrap();
    registry.register::<Spawned>().unwrap();
    World::new(Arc::new(registry))
}

fn id<T: Component>(world: &World) -> ComponentId {
    world.registry().id_of::<T>().unwrap()
}

fn scheduler(systems: Vec<SystemDescriptor>) -> Scheduler {
    let config = EcsConfig {
        worker_threads: 4,
        ..EcsConfig::default()
    };
    let groups = vec![GroupBuilder::new("frame", EcsTime::from_millis(16)).priority(systems)];
    Scheduler::new(groups, &config).unwrap()
}

const FRAME: EcsTime = EcsTime::from_millis(16);

#[test]
fn integrate_moves_every_body() {
    let mut world = world();
    let (position, velocity) = (id::<Position>(&world), id::<Velocity>(&world));
    let moving: Vec<_> = (0..10)
        .map(|i| {
            let entity = world.create_entity();
            world.add(entity, Position([i as f32, 0.0])).unwrap();
            world.add(entity, Velocity([1.0, 2.0])).unwrap();
            entity
        })
        .collect();
    let resting = world.create_entity();
    world.add(resting, Position([-1.0, -1.0])).unwrap();

    let integrate = SystemDescriptor::new(
        "integrate",
        SystemAccess::new().reads([velocity]).writes([position]),
        move |ctx| {
            let dt = ctx.time().as_millis() as f32 / 16.0;
            let velocities = ctx.read::<Velocity>(velocity);
            for (p, v) in ctx.write::<Position>(position).iter_mut().zip(velocities) {
                p.0[0] += v.0[0] * dt;
                p.0[1] += v.0[1] * dt;
            }
        },
    );
    let mut scheduler = scheduler(vec![integrate]);
    scheduler.tick(&mut world, FRAME).unwrap();

    for (i, &entity) in moving.iter().enumerate() {
        assert_eq!(world.get::<Position>(entity), Some(&Position([i as f32 + 1.0, 2.0])));
    }
    assert_eq!(world.get::<Position>(resting), Some(&Position([-1.0, -1.0])));
}

#[test]
fn per_archetype_jobs_visit_each_bucket() {
    let mut world = world();
    let (position, velocity) = (id::<Position>(&world), id::<Velocity>(&world));
    for i in 0..5 {
        let entity = world.create_entity();
        world.add(entity, Position::default()).unwrap();
        if i % 2 == 0 {
            world.add(entity, Velocity::default()).unwrap();
        }
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let count = SystemDescriptor::new("count", SystemAccess::new().reads([position]), move |ctx| {
        assert_eq!(ctx.read::<Position>(position).len(), ctx.len());
        log.lock().unwrap().push((ctx.archetype().unwrap(), ctx.len()));
    })
    .per_archetype();
    let mut scheduler = scheduler(vec![count]);

    let report = scheduler.tick(&mut world, FRAME).unwrap();
    assert_eq!(report.jobs, 2);

    let mut seen = seen.lock().unwrap().clone();
    seen.sort_by_key(|&(archetype, _)| archetype.count());
    let moving = ArchetypeId::from_ordinals(&[position.index(), velocity.index()]);
    assert_eq!(
        seen,
        vec![
            (ArchetypeId::from_ordinals(&[position.index()]), 2),
            (moving, 3)
        ]
    );
}

#[test]
fn packed_driver_splits_into_chunks() {
    let mut world = world();
    let health = id::<Health>(&world);
    let entities = world.create_entities(50);
    for &entity in &entities {
        world.add(entity, Health(0.0)).unwrap();
    }

    let heal = SystemDescriptor::new("heal", SystemAccess::new().writes([health]), move |ctx| {
        assert!(ctx.len() <= 8);
        let owners = ctx.entities();
        for (value, entity) in ctx.write::<Health>(health).iter_mut().zip(owners) {
            value.0 = entity.index() as f32;
        }
    })
    .chunked(8);
    let mut scheduler = scheduler(vec![heal]);

    let report = scheduler.tick(&mut world, FRAME).unwrap();
    assert_eq!(report.jobs, 7);
    for &entity in &entities {
        assert_eq!(world.get::<Health>(entity), Some(&Health(entity.index() as f32)));
    }
}

#[test]
fn conflicting_systems_run_in_declaration_order() {
    let mut world = world();
    let health = id::<Health>(&world);
    let entities = world.create_entities(20);
    for &entity in &entities {
        world.add(entity, Health(7.0)).unwrap();
    }

    let reset = SystemDescriptor::new("reset", SystemAccess::new().writes([health]), move |ctx| {
        ctx.write::<Health>(health).fill(Health(1.0));
    });
    let double = SystemDescriptor::new("double", SystemAccess::new().writes([health]), move |ctx| {
        for value in ctx.write::<Health>(health) {
            value.0 *= 2.0;
        }
    });
    let mut scheduler = scheduler(vec![reset, double]);

    for _ in 0..3 {
        let report = scheduler.tick(&mut world, FRAME).unwrap();
        assert_eq!(report.systems_run, 2);
        for &entity in &entities {
            assert_eq!(world.get::<Health>(entity), Some(&Health(2.0)));
        }
    }
}

#[test]
fn deferred_spawns_land_after_apply() {
    let mut world = world();
    let (health, spawned) = (id::<Health>(&world), id::<Spawned>(&world));

    let spawner = SystemDescriptor::new(
        "spawner",
        SystemAccess::new().writes([spawned]),
        move |ctx| {
            let queue = ctx.mutations();
            let first = queue.create_entities(3);
            queue.add_component(first, health, Health(100.0));
            ctx.local_mut::<Spawned>(spawned).0 += 3;
        },
    );
    let mut scheduler = scheduler(vec![spawner]);

    scheduler.tick(&mut world, FRAME).unwrap();
    assert_eq!(world.entity_count(), 0);
    assert_eq!(world.local::<Spawned>(), Some(&Spawned(3)));

    let created = world.apply_mutations().into_result().unwrap();
    assert_eq!(created.len(), 3);
    assert_eq!(world.entity_count(), 3);
    assert_eq!(world.get::<Health>(created[0]), Some(&Health(100.0)));
    assert_eq!(world.get::<Health>(created[1]), None);
}

#[test]
fn indexed_slices_cover_every_slot() {
    let mut world = world();
    let cell = id::<Cell>(&world);
    let entities = world.create_entities(5);
    world.add(entities[4], Cell(9)).unwrap();

    let total = Arc::new(Mutex::new(0u32));
    let sum = total.clone();
    let scan = SystemDescriptor::new("scan", SystemAccess::new().reads([cell]), move |ctx| {
        *sum.lock().unwrap() = ctx.read::<Cell>(cell).iter().map(|c| c.0).sum();
    });
    let mut scheduler = scheduler(vec![scan]);
    scheduler.tick(&mut world, FRAME).unwrap();
    assert_eq!(*total.lock().unwrap(), 9);
}

#[test]
#[should_panic(expected = "is not declared")]
fn undeclared_read_panics() {
    let mut world = world();
    let (health, cell) = (id::<Health>(&world), id::<Cell>(&world));
    let entity = world.create_entity();
    world.add(entity, Health(1.0)).unwrap();

    let sneaky = SystemDescriptor::new("sneaky", SystemAccess::new().reads([health]), move |ctx| {
        let _ = ctx.read::<Cell>(cell);
    });
    let mut scheduler = scheduler(vec![sneaky]);
    let _ = scheduler.tick(&mut world, FRAME);
}

fn bodies_with_health(world: &mut World, count: usize) -> Vec<Entity> {
    (0..count)
        .map(|i| {
            let entity = world.create_entity();
            world.add(entity, Position([i as f32, 0.0])).unwrap();
            world.add(entity, Health(10.0)).unwrap();
            entity
        })
        .collect()
}

#[test]
#[should_panic(expected = "can only be read whole by a single-job system")]
fn split_writer_cannot_read_its_packed_column_whole() {
    let mut world = world();
    let (position, health) = (id::<Position>(&world), id::<Health>(&world));
    bodies_with_health(&mut world, 2);

    let regen = SystemDescriptor::new(
        "regen",
        SystemAccess::new().writes([position, health]),
        move |ctx| {
            let _ = ctx.read::<Health>(health);
        },
    )
    .chunked(1);
    let mut scheduler = scheduler(vec![regen]);
    let _ = scheduler.tick(&mut world, FRAME);
}

#[test]
#[should_panic(expected = "outside this job's rows")]
fn split_writer_cannot_read_rows_of_other_jobs() {
    let mut world = world();
    let (position, health) = (id::<Position>(&world), id::<Health>(&world));
    let bodies = bodies_with_health(&mut world, 2);

    let regen = SystemDescriptor::new(
        "regen",
        SystemAccess::new().writes([position, health]),
        move |ctx| {
            for &body in &bodies {
                let _ = ctx.component::<Health>(body, health);
            }
        },
    )
    .chunked(1);
    let mut scheduler = scheduler(vec![regen]);
    let _ = scheduler.tick(&mut world, FRAME);
}

#[test]
fn split_writer_updates_its_own_rows() {
    let mut world = world();
    let (position, health) = (id::<Position>(&world), id::<Health>(&world));
    let bodies = bodies_with_health(&mut world, 3);

    let regen = SystemDescriptor::new(
        "regen",
        SystemAccess::new().writes([position, health]),
        move |ctx| {
            for &body in ctx.entities() {
                let x = ctx.component::<Position>(body, position).map_or(0.0, |p| p.0[0]);
                if let Some(value) = ctx.component_mut::<Health>(body, health) {
                    value.0 += x;
                }
            }
        },
    )
    .chunked(1);
    let mut scheduler = scheduler(vec![regen]);

    let report = scheduler.tick(&mut world, FRAME).unwrap();
    assert_eq!(report.jobs, 3);
    for (i, &body) in bodies.iter().enumerate() {
        assert_eq!(world.get::<Health>(body), Some(&Health(10.0 + i as f32)));
    }
}

#[test]
fn single_job_writer_reads_packed_column_whole() {
    let mut world = world();
    let (position, health) = (id::<Position>(&world), id::<Health>(&world));
    bodies_with_health(&mut world, 4);

    let total = Arc::new(Mutex::new(0.0f32));
    let sum = total.clone();
    let regen = SystemDescriptor::new(
        "regen",
        SystemAccess::new().writes([position, health]),
        move |ctx| {
            *sum.lock().unwrap() = ctx.read::<Health>(health).iter().map(|h| h.0).sum();
        },
    );
    let mut scheduler = scheduler(vec![regen]);
    scheduler.tick(&mut world, FRAME).unwrap();
    assert_eq!(*total.lock().unwrap(), 40.0);
}
