// scheduler.rs - Group ticking and parallel system execution
//
// Each tick advances every group's clock. Groups with at least one elapsed
// period walk their priority levels in order; systems of the current level
// are submitted to the worker pool as soon as their intra-level
// predecessors are done and their components are free. Jobs report back
// over a channel, and the driving loop on the caller's thread re-evaluates
// what became runnable.

use crate::config::EcsConfig;
use crate::ecs::{ArchetypeId, World};
use crate::schedule::access_tracker::AccessTracker;
use crate::schedule::context::{Scope, SystemContext, TickView};
use crate::schedule::graph::{block_count, set_bit, test_bit};
use crate::schedule::{
    ExecutionMode, Group, GroupBuilder, GroupDependency, ScheduleError, SystemDescriptor,
    SystemHandle,
};
use crate::time::EcsTime;
use crossbeam_channel::Sender;
use gamekit_metrics::SystemProfiler;
use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// `executing` value of a group that does not run this tick.
pub const IDLE: usize = usize::MAX;

/// Per-group clock and progress.
#[derive(Clone, Debug, Default)]
pub struct GroupState {
    accumulated: EcsTime,
    delta: EcsTime,
    executing: usize,
    runs: u64,
    submitted: Vec<u8>,
    completed: Vec<u8>,
}

impl GroupState {
    /// Time carried toward the next period.
    pub fn accumulated(&self) -> EcsTime {
        self.accumulated
    }

    /// Time handed to systems on the last run.
    pub fn delta(&self) -> EcsTime {
        self.delta
    }

    /// Current priority level, the level count once finished, or [`IDLE`].
    pub fn executing(&self) -> usize {
        self.executing
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn is_idle(&self) -> bool {
        self.executing == IDLE
    }

    fn enter(&mut self, systems: usize) {
        let blocks = block_count(systems);
        self.submitted.clear();
        self.submitted.resize(blocks, 0);
        self.completed.clear();
        self.completed.resize(blocks, 0);
    }
}

/// Summary of one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub groups_run: usize,
    pub systems_run: usize,
    pub jobs: usize,
}

struct Completion {
    group: usize,
    system: usize,
    elapsed: Duration,
    panicked: bool,
}

/// Reports a job's end on drop, so the driving loop hears about panics too.
struct CompletionGuard {
    sender: Sender<Completion>,
    group: usize,
    system: usize,
    started: Instant,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let _ = self.sender.send(Completion {
            group: self.group,
            system: self.system,
            elapsed: self.started.elapsed(),
            panicked: thread::panicking(),
        });
    }
}

pub struct Scheduler {
    groups: Vec<Group>,
    states: Vec<GroupState>,
    pool: rayon::ThreadPool,
    tracker: AccessTracker,
    profiler: SystemProfiler,
}

impl Scheduler {
    /// Build and validate a schedule.
    pub fn new(groups: Vec<GroupBuilder>, config: &EcsConfig) -> Result<Self, ScheduleError> {
        let groups: Vec<Group> = groups.into_iter().map(GroupBuilder::build).collect();
        validate(&groups)?;

        for group in groups.iter().filter(|g| g.priorities().is_empty()) {
            warn!(group = group.name(), "system group has no priorities");
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("gamekit-worker-{i}"))
            .build()?;
        debug!(
            groups = groups.len(),
            threads = pool.current_num_threads(),
            "scheduler ready"
        );

        let states = groups
            .iter()
            .map(|_| GroupState {
                executing: IDLE,
                ..GroupState::default()
            })
            .collect();

        Ok(Self {
            groups,
            states,
            pool,
            tracker: AccessTracker::default(),
            profiler: SystemProfiler::new(config.profiler_window),
        })
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn group_state(&self, group: usize) -> Option<&GroupState> {
        self.states.get(group)
    }

    pub fn profiler(&self) -> &SystemProfiler {
        &self.profiler
    }

    /// Advance every group by `delta` and run whatever became due.
    ///
    /// Structural changes staged by systems stay queued; apply them with
    /// [`World::apply_mutations`] once the tick returns. A panicking system
    /// stops further submissions and the panic resumes on this thread after
    /// in-flight jobs finish.
    pub fn tick(&mut self, world: &mut World, delta: EcsTime) -> Result<TickReport, ScheduleError> {
        let mut report = TickReport::default();

        for (group, state) in self.groups.iter().zip(&mut self.states) {
            let freq = group.freq();
            state.accumulated += delta;
            let periods = state.accumulated.periods(freq);
            state.accumulated -= freq * periods;

            if periods == 0 {
                state.executing = IDLE;
                continue;
            }
            if group.is_dynamic() {
                state.delta = freq * periods;
            } else {
                state.accumulated += freq * (periods - 1);
                state.delta = freq;
            }
            state.executing = 0;
            state.runs += 1;
            state.enter(group.priorities().first().map_or(0, |p| p.systems().len()));
            report.groups_run += 1;
            trace!(group = group.name(), periods, delta = %state.delta, "group due");
        }

        if report.groups_run == 0 {
            return Ok(report);
        }

        let view = TickView::capture(world);
        let world: &World = world;
        let Self {
            groups,
            states,
            pool,
            tracker,
            profiler,
        } = self;
        let groups: &[Group] = groups;

        let (sender, receiver) = crossbeam_channel::unbounded::<Completion>();
        let mut pending: HashMap<(usize, usize), usize> = HashMap::new();
        let mut in_flight = 0usize;
        let mut aborted = false;

        let outcome = pool.in_place_scope(|scope| -> Result<(), ScheduleError> {
            loop {
                while !aborted {
                    let mut progress = false;

                    for (g, group) in groups.iter().enumerate() {
                        progress |= advance(group, &mut states[g]);
                        let executing = states[g].executing;
                        let Some(priority) = group.priorities().get(executing) else {
                            continue;
                        };
                        if !dependency_met(priority.dependency(), states) {
                            continue;
                        }

                        let time = states[g].delta;
                        for (s, system) in priority.systems().iter().enumerate() {
                            let state = &states[g];
                            if test_bit(&state.submitted, s)
                                || !priority.graph().ready(s, &state.completed)
                                || !tracker.try_acquire(system.access())
                            {
                                continue;
                            }
                            set_bit(&mut states[g].submitted, s);
                            progress = true;

                            let jobs = plan_jobs(system, world);
                            if jobs.is_empty() {
                                tracker.release(system.access());
                                set_bit(&mut states[g].completed, s);
                                report.systems_run += 1;
                                trace!(system = system.name(), "nothing to visit");
                                continue;
                            }

                            let single_job = jobs.len() == 1;
                            pending.insert((g, s), jobs.len());
                            for scopes in jobs {
                                in_flight += 1;
                                report.jobs += 1;
                                let guard = CompletionGuard {
                                    sender: sender.clone(),
                                    group: g,
                                    system: s,
                                    started: Instant::now(),
                                };
                                let view = &view;
                                scope.spawn(move |_| {
                                    let _guard = guard;
                                    for scope in scopes {
                                        let context = SystemContext::new(
                                            world, view, system, scope, time, single_job,
                                        );
                                        system.run(&context);
                                    }
                                });
                            }
                            trace!(system = system.name(), jobs = pending[&(g, s)], "submitted");
                        }

                        progress |= advance(group, &mut states[g]);
                    }

                    if !progress {
                        break;
                    }
                }

                if in_flight == 0 {
                    if aborted {
                        return Ok(());
                    }
                    return match stalled(groups, states) {
                        Some((group, priority)) => Err(ScheduleError::Stalled { group, priority }),
                        None => Ok(()),
                    };
                }

                let Ok(completion) = receiver.recv() else {
                    return Ok(());
                };
                in_flight -= 1;
                aborted |= completion.panicked;

                let priority = &groups[completion.group].priorities()
                    [states[completion.group].executing];
                let system = &priority.systems()[completion.system];
                profiler.record(system.name(), completion.elapsed);

                let key = (completion.group, completion.system);
                if let Some(remaining) = pending.get_mut(&key) {
                    *remaining -= 1;
                    if *remaining == 0 {
                        pending.remove(&key);
                        tracker.release(system.access());
                        set_bit(&mut states[completion.group].completed, completion.system);
                        report.systems_run += 1;
                    }
                }
            }
        });

        outcome?;
        Ok(report)
    }
}

/// Move a group past every level whose systems have all completed.
fn advance(group: &Group, state: &mut GroupState) -> bool {
    let mut moved = false;
    while let Some(priority) = group.priorities().get(state.executing) {
        let systems = priority.systems().len();
        let done = (0..systems).all(|s| test_bit(&state.completed, s));
        if !done {
            break;
        }
        state.executing += 1;
        let next = group
            .priorities()
            .get(state.executing)
            .map_or(0, |p| p.systems().len());
        state.enter(next);
        moved = true;
    }
    moved
}

fn dependency_met(dependency: Option<GroupDependency>, states: &[GroupState]) -> bool {
    match dependency {
        None => true,
        Some(dep) => {
            let executing = states[dep.group].executing;
            executing == IDLE || dep.priority < executing
        }
    }
}

fn stalled(groups: &[Group], states: &[GroupState]) -> Option<(usize, usize)> {
    groups
        .iter()
        .zip(states)
        .enumerate()
        .find(|(_, (group, state))| {
            state.executing != IDLE && state.executing < group.priorities().len()
        })
        .map(|(g, (_, state))| (g, state.executing))
}

/// Split a system's work into jobs; each job is a list of scopes visited in turn.
fn plan_jobs(system: &SystemDescriptor, world: &World) -> Vec<Vec<Scope>> {
    let access = system.access();
    let mode = system.execution_mode();

    let archetype = access.archetype_components();
    if !archetype.is_empty() {
        let buckets: Vec<(ArchetypeId, usize)> = world
            .archetype_pointers(&archetype)
            .into_iter()
            .filter_map(|pointer| {
                let len = world.bucket(pointer.archetype)?.len();
                (len > 0).then_some((pointer.archetype, len))
            })
            .collect();

        return match mode {
            ExecutionMode::Sequential => {
                if buckets.is_empty() {
                    Vec::new()
                } else {
                    vec![buckets
                        .into_iter()
                        .map(|(archetype, len)| Scope::Bucket {
                            archetype,
                            range: 0..len,
                        })
                        .collect()]
                }
            }
            ExecutionMode::PerArchetype => buckets
                .into_iter()
                .map(|(archetype, len)| {
                    vec![Scope::Bucket {
                        archetype,
                        range: 0..len,
                    }]
                })
                .collect(),
            ExecutionMode::Chunked { chunk_size } => buckets
                .into_iter()
                .flat_map(|(archetype, len)| {
                    chunks(len, chunk_size)
                        .map(move |range| vec![Scope::Bucket { archetype, range }])
                })
                .collect(),
        };
    }

    if let Some(id) = access.packed_driver() {
        let len = world.packed_storage(id).map_or(0, |storage| storage.len());
        if len == 0 {
            return Vec::new();
        }
        return match mode {
            ExecutionMode::Chunked { chunk_size } => chunks(len, chunk_size)
                .map(|range| vec![Scope::Packed { id, range }])
                .collect(),
            _ => vec![vec![Scope::Packed { id, range: 0..len }]],
        };
    }

    vec![vec![Scope::Whole]]
}

fn chunks(len: usize, chunk_size: usize) -> impl Iterator<Item = std::ops::Range<usize>> {
    let chunk_size = chunk_size.clamp(1, len.max(1));
    (0..len.div_ceil(chunk_size)).map(move |i| i * chunk_size..((i + 1) * chunk_size).min(len))
}

fn validate(groups: &[Group]) -> Result<(), ScheduleError> {
    let mut names: HashMap<&str, SystemHandle> = HashMap::new();

    for (g, group) in groups.iter().enumerate() {
        if group.freq().is_zero() {
            return Err(ScheduleError::ZeroFrequency {
                group: group.name().to_string(),
            });
        }

        for (p, priority) in group.priorities().iter().enumerate() {
            if let Some(dep) = priority.dependency() {
                let known = groups
                    .get(dep.group)
                    .is_some_and(|target| dep.priority < target.priorities().len());
                if !known {
                    return Err(ScheduleError::UnknownDependency {
                        group: g,
                        priority: p,
                        target_group: dep.group,
                        target_priority: dep.priority,
                    });
                }
            }

            for (s, system) in priority.systems().iter().enumerate() {
                let handle = SystemHandle::new(g, p, s);
                if let Some(first) = names.insert(system.name(), handle) {
                    return Err(ScheduleError::DuplicateSystemName {
                        name: system.name().to_string(),
                        first,
                        second: handle,
                    });
                }
            }
        }
    }

    find_cycle(groups).map_or(Ok(()), |(group, priority)| {
        Err(ScheduleError::DependencyCycle { group, priority })
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// A level waits on its predecessor level and on its cross-group dependency.
/// Any cycle through those edges can never make progress.
fn find_cycle(groups: &[Group]) -> Option<(usize, usize)> {
    let offsets: Vec<usize> = groups
        .iter()
        .scan(0, |next, group| {
            let offset = *next;
            *next += group.priorities().len();
            Some(offset)
        })
        .collect();
    let total = groups.iter().map(|g| g.priorities().len()).sum();
    let mut marks = vec![Mark::Unvisited; total];

    fn visit(
        groups: &[Group],
        offsets: &[usize],
        marks: &mut [Mark],
        g: usize,
        p: usize,
    ) -> Option<(usize, usize)> {
        let node = offsets[g] + p;
        match marks[node] {
            Mark::Done => return None,
            Mark::Visiting => return Some((g, p)),
            Mark::Unvisited => {}
        }
        marks[node] = Mark::Visiting;

        if p > 0 {
            if let Some(cycle) = visit(groups, offsets, marks, g, p - 1) {
                return Some(cycle);
            }
        }
        if let Some(dep) = groups[g].priorities()[p].dependency() {
            if let Some(cycle) = visit(groups, offsets, marks, dep.group, dep.priority) {
                return Some(cycle);
            }
        }

        marks[node] = Mark::Done;
        None
    }

    for (g, group) in groups.iter().enumerate() {
        for p in 0..group.priorities().len() {
            if let Some(cycle) = visit(groups, &offsets, &mut marks, g, p) {
                return Some(cycle);
            }
        }
    }
    None
}
