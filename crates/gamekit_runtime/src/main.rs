//! GameKit Runtime
//!
//! Headless demo loop: a particle emitter, an integrator and a reaper run
//! on the scheduler while a monitor records one probe body for rollback.
//!
//! Usage: `gamekit [config.json] [frames]`

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use gamekit_core::config::EcsConfig;
use gamekit_core::define_component;
use gamekit_core::ecs::{ComponentId, ComponentRegistry, Entity, EntityBuilder, World};
use gamekit_core::monitor::{BinaryMonitor, Monitor};
use gamekit_core::schedule::{GroupBuilder, Scheduler, SystemAccess, SystemDescriptor};
use gamekit_core::time::EcsTime;
use gamekit_metrics::{EventCounter, TickTimer};
use glam::Vec3;
use std::sync::Arc;

const FRAME: EcsTime = EcsTime::from_millis(16);
const DEFAULT_FRAMES: u64 = 300;

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Transform {
    position: Vec3,
}
define_component!(Transform, "Transform");

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Velocity(Vec3);
define_component!(Velocity, "Velocity");

/// Seconds left before the particle is reaped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Lifetime(f32);
define_component!(Lifetime, "Lifetime", Packed);

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Gravity(Vec3);
define_component!(Gravity, "Gravity", Local);

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Emitter {
    per_second: f32,
    backlog: f32,
    emitted: u32,
    _pad: u32,
}
define_component!(Emitter, "Emitter", Local);

struct Ids {
    transform: ComponentId,
    velocity: ComponentId,
    lifetime: ComponentId,
    gravity: ComponentId,
    emitter: ComponentId,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let config = load_config(args.next())?;
    let frames = match args.next() {
        Some(frames) => frames.parse().context("frame count must be an integer")?,
        None => DEFAULT_FRAMES,
    };

    tracing::info!("GameKit v{}", gamekit_core::VERSION);
    tracing::info!(?config, frames, "starting simulation");

    let mut registry = ComponentRegistry::new();
    let ids = Ids {
        transform: registry.register::<Transform>()?,
        velocity: registry.register::<Velocity>()?,
        lifetime: registry.register::<Lifetime>()?,
        gravity: registry.register::<Gravity>()?,
        emitter: registry.register::<Emitter>()?,
    };
    let registry = Arc::new(registry);
    let mut world = World::with_config(registry.clone(), config.clone());
    world.set_local(Gravity(Vec3::new(0.0, -9.8, 0.0)))?;
    world.set_local(Emitter {
        per_second: 240.0,
        ..Emitter::default()
    })?;

    let probe = world.spawn(
        &EntityBuilder::new()
            .with_component(ids.transform, Transform::default())
            .with_component(ids.velocity, Velocity(Vec3::new(1.0, 12.0, 0.0))),
    )?;

    let transform_info = registry
        .info(ids.transform)
        .context("transform is registered")?;
    let mut monitor = Monitor::with_config(
        BinaryMonitor::for_component(transform_info, config.monitor.chunk_size),
        ids.transform,
        &config.monitor,
    );

    let mut scheduler = Scheduler::new(groups(&ids), &config)?;
    let mut timer = TickTimer::new(120);
    let mut counter = EventCounter::new();

    for frame in 0..frames {
        timer.begin();
        let before = world.entity_count();
        let report = scheduler.tick(&mut world, FRAME)?;
        let applied = world.apply_mutations();
        timer.end();

        let created = applied.created;
        counter.add("failed_mutations", applied.failures.len() as u64);

        let destroyed = (before + created.len()).saturating_sub(world.entity_count());
        counter.add("spawned", created.len() as u64);
        counter.add("reaped", destroyed as u64);
        counter.add("jobs", report.jobs as u64);
        if monitor.record(world.component_bytes(probe, ids.transform)) {
            counter.add("probe_changes", 1);
        }

        if frame % 60 == 0 {
            tracing::debug!(
                frame,
                entities = world.entity_count(),
                groups = report.groups_run,
                systems = report.systems_run,
                "tick"
            );
        }
    }

    report_probe(&world, &monitor, probe, &ids);

    tracing::info!(
        ticks_per_second = timer.ticks_per_second(),
        tick_ms = timer.tick_time_ms(),
        entities = world.entity_count(),
        "simulation finished"
    );
    for (name, count) in counter.iter() {
        tracing::info!(name, count, "counter");
    }
    for (name, timing) in scheduler.profiler().iter() {
        tracing::info!(
            system = name,
            jobs = timing.jobs,
            average_us = timing.average.as_micros() as u64,
            "system timing"
        );
    }

    Ok(())
}

fn load_config(path: Option<String>) -> Result<EcsConfig> {
    let Some(path) = path else {
        return Ok(EcsConfig::default());
    };
    let text =
        std::fs::read_to_string(&path).with_context(|| format!("failed to read config {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config {path}"))
}

fn groups(ids: &Ids) -> Vec<GroupBuilder> {
    vec![
        GroupBuilder::new("physics", FRAME).priority([integrate(ids)]),
        GroupBuilder::new("lifecycle", EcsTime::from_millis(50))
            .dynamic(true)
            .priority([reap(ids)])
            .priority([emit(ids)]),
    ]
}

fn integrate(ids: &Ids) -> SystemDescriptor {
    let (transform, velocity, gravity) = (ids.transform, ids.velocity, ids.gravity);
    SystemDescriptor::new(
        "integrate",
        SystemAccess::new()
            .reads([gravity])
            .writes([transform, velocity]),
        move |ctx| {
            let dt = ctx.time().as_secs_f64() as f32;
            let gravity = ctx.local::<Gravity>(gravity).0;
            let velocities = ctx.write::<Velocity>(velocity);
            for (t, v) in ctx.write::<Transform>(transform).iter_mut().zip(velocities) {
                v.0 += gravity * dt;
                t.position += v.0 * dt;
                if t.position.y < 0.0 {
                    t.position.y = 0.0;
                    v.0.y = -v.0.y * 0.5;
                }
            }
        },
    )
    .chunked(1024)
}

fn reap(ids: &Ids) -> SystemDescriptor {
    let lifetime = ids.lifetime;
    SystemDescriptor::new(
        "reap",
        SystemAccess::new().writes([lifetime]),
        move |ctx| {
            let dt = ctx.time().as_secs_f64() as f32;
            let owners = ctx.entities();
            for (left, &entity) in ctx.write::<Lifetime>(lifetime).iter_mut().zip(owners) {
                left.0 -= dt;
                if left.0 <= 0.0 {
                    ctx.mutations().destroy_entity(entity);
                }
            }
        },
    )
    .chunked(256)
}

fn emit(ids: &Ids) -> SystemDescriptor {
    let (transform, velocity, lifetime, emitter) =
        (ids.transform, ids.velocity, ids.lifetime, ids.emitter);
    SystemDescriptor::new(
        "emit",
        SystemAccess::new().writes([emitter]),
        move |ctx| {
            let state = ctx.local_mut::<Emitter>(emitter);
            state.backlog += state.per_second * ctx.time().as_secs_f64() as f32;

            let queue = ctx.mutations();
            while state.backlog >= 1.0 {
                state.backlog -= 1.0;
                state.emitted += 1;
                let angle = state.emitted as f32 * 0.618_034 * std::f32::consts::TAU;
                let particle = EntityBuilder::new()
                    .with_component(transform, Transform::default())
                    .with_component(
                        velocity,
                        Velocity(Vec3::new(angle.cos() * 3.0, 8.0, angle.sin() * 3.0)),
                    )
                    .with_component(lifetime, Lifetime(1.5));
                queue.add_components(queue.create_entity(), particle);
            }
        },
    )
}

/// Log where the probe was a second of recorded changes ago.
fn report_probe(world: &World, monitor: &Monitor<BinaryMonitor>, probe: Entity, ids: &Ids) {
    let Some(&current) = world.get::<Transform>(probe) else {
        tracing::warn!("probe entity lost its transform");
        return;
    };
    let mut past = current;
    let revisions = (1000 / FRAME.as_millis()) as usize;
    if monitor.transform_value(&mut past, revisions) {
        tracing::info!(
            component = %ids.transform,
            now = ?current.position,
            then = ?past.position,
            revisions,
            history = monitor.len(),
            "probe rollback"
        );
    } else {
        tracing::info!(revisions, "probe did not exist that far back");
    }
}
