// Rolling world component values back through monitors.
//
// Run with: `cargo test --package gamekit_core --test monitor_history`

use bytemuck::{Pod, Zeroable};
use gamekit_core::config::MonitorConfig;
use gamekit_core::define_component;
use gamekit_core::ecs::{ByteColumn, ComponentRegistry, World};
use gamekit_core::monitor::{BinaryMonitor, DuplicateMonitor, Monitor};
use glam::Vec3;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Body {
    position: Vec3,
    velocity: Vec3,
}
define_component!(Body, "Body");

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Health(f32);
define_component!(Health, "Health", Packed);

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Waypoint {
    x: f32,
    y: f32,
}
define_component!(Waypoint, "Waypoint", Indexed, DUPLICATE);

fn world() -> World {
    let mut registry = ComponentRegistry::new();
    registry.register::<Body>().unwrap();
    registry.register::<Health>().unwrap();
    registry.register::<Waypoint>().unwrap();
    World::new(Arc::new(registry))
}

fn waypoint(x: f32) -> Waypoint {
    Waypoint { x, y: -x }
}

#[test]
fn body_history_rewinds_frame_by_frame() {
    let mut world = world();
    let id = world.registry().id_of::<Body>().unwrap();
    let info = world.registry().info(id).unwrap().clone();
    let mut monitor = Monitor::with_config(
        BinaryMonitor::for_component(&info, 8),
        id,
        &MonitorConfig::default(),
    );

    let entity = world.create_entity();
    world
        .add(
            entity,
            Body {
                position: Vec3::ZERO,
                velocity: Vec3::new(1.0, 0.0, 0.5),
            },
        )
        .unwrap();

    let mut history = Vec::new();
    for frame in 0..10 {
        if frame > 0 {
            let body = world.get_mut::<Body>(entity).unwrap();
            body.position += body.velocity;
            if frame % 3 == 0 {
                body.velocity.y += 1.0;
            }
        }
        history.push(*world.get::<Body>(entity).unwrap());
        assert!(monitor.record(world.component_bytes(entity, id)));
    }

    let current = *history.last().unwrap();
    for back in 0..history.len() {
        let mut body = current;
        assert!(monitor.transform_value(&mut body, back));
        assert_eq!(body, history[history.len() - 1 - back]);
    }
    let mut body = current;
    assert!(!monitor.transform_value(&mut body, history.len()));
}

#[test]
fn removed_component_is_restored_from_its_last_value() {
    let mut world = world();
    let id = world.registry().id_of::<Health>().unwrap();
    let mut monitor = Monitor::new(BinaryMonitor::new(4, 4), id, 4, 2, 64);

    let entity = world.create_entity();
    for value in [10.0, 20.0, 30.0] {
        world.add(entity, Health(value)).unwrap();
        assert!(monitor.record(world.component_bytes(entity, id)));
    }
    assert!(!monitor.record(world.component_bytes(entity, id)));

    world.remove::<Health>(entity).unwrap();
    assert!(monitor.record(world.component_bytes(entity, id)));

    for (back, expected) in [(1, 30.0), (2, 20.0), (3, 10.0)] {
        let mut scratch = Health::default();
        assert!(monitor.transform_value(&mut scratch, back));
        assert_eq!(scratch, Health(expected));
    }
    let mut scratch = Health::default();
    assert!(!monitor.transform_value(&mut scratch, 4));
}

#[test]
fn duplicate_arrays_rewind_through_resizes() {
    let mut world = world();
    let id = world.registry().id_of::<Waypoint>().unwrap();
    let info = world.registry().info(id).unwrap().clone();
    let mut monitor =
        DuplicateMonitor::with_config(BinaryMonitor::for_component(&info, 8), id, &MonitorConfig::default());

    let entity = world.create_entity();
    let original = [waypoint(0.0), waypoint(1.0), waypoint(2.0)];
    world.add_duplicates(entity, &original).unwrap();
    assert!(monitor.record(world.duplicates(entity, id)));

    world.remove_duplicates(entity, id, 1, 2).unwrap();
    assert!(monitor.record(world.duplicates(entity, id)));

    world
        .add_duplicates(entity, &[waypoint(5.0), waypoint(6.0), waypoint(7.0)])
        .unwrap();
    assert!(monitor.record(world.duplicates(entity, id)));
    assert!(!monitor.record(world.duplicates(entity, id)));

    let current = world.duplicates(entity, id).unwrap().clone();
    assert_eq!(current.len(), 4);

    let mut data = current.clone();
    assert!(monitor.transform(&mut data, 1));
    assert_eq!(data.as_slice::<Waypoint>(), &original[..1]);

    let mut data = current.clone();
    assert!(monitor.transform(&mut data, 2));
    assert_eq!(data.as_slice::<Waypoint>(), &original[..]);

    world.destroy_entity(entity).unwrap();
    assert!(monitor.record(world.duplicates(entity, id)));
    let mut data = ByteColumn::for_component(&info);
    assert!(monitor.transform(&mut data, 1));
    assert_eq!(data.as_slice::<Waypoint>(), current.as_slice::<Waypoint>());
}
