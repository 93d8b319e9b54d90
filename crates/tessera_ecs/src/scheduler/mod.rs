use std::{
  any::{Any, TypeId},
  mem,
  panic::{self, AssertUnwindSafe},
};

use graph::DependencyGraph;
#[cfg(feature = "debug")]
use log::trace;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use tessera_utils::thread::{Latch, ThreadPool};

use crate::{
  commands::CommandBuffer,
  config::EcsConfig,
  error::ScheduleError,
  systems::{StoredSystem, System},
  time::Time,
  world::{UnsafeWorldCell, World},
};

mod graph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Phase {
  EarlyUpdate,
  #[default]
  Update,
  /// Runs zero or more times per update with a fixed step.
  FixedUpdate,
  LateUpdate,
  Render,
}

impl Phase {
  /// All phases in execution order.
  pub const ALL: [Phase; 5] = [
    Phase::EarlyUpdate,
    Phase::Update,
    Phase::FixedUpdate,
    Phase::LateUpdate,
    Phase::Render,
  ];

  #[inline]
  fn index(self) -> usize {
    self as usize
  }
}

/// Where and in which order a system runs.
#[derive(Debug, Clone, Default)]
pub struct SystemConfig {
  name: Option<String>,
  phase: Phase,
  order: i32,
  before: Vec<String>,
  after: Vec<String>,
}

impl SystemConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Explicit name, must be unique. Defaults to the system's own name.
  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn in_phase(mut self, phase: Phase) -> Self {
    self.phase = phase;
    self
  }

  /// Lower values run first among systems without ordering constraints.
  pub fn order(mut self, order: i32) -> Self {
    self.order = order;
    self
  }

  pub fn before(mut self, system: impl Into<String>) -> Self {
    self.before.push(system.into());
    self
  }

  pub fn after(mut self, system: impl Into<String>) -> Self {
    self.after.push(system.into());
    self
  }
}

impl From<Phase> for SystemConfig {
  fn from(value: Phase) -> Self {
    SystemConfig::new().in_phase(value)
  }
}

impl From<&str> for SystemConfig {
  fn from(value: &str) -> Self {
    SystemConfig::new().named(value)
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct SystemId(u64);

struct SystemRecord {
  id: SystemId,
  name: String,
  config: SystemConfig,
  system: StoredSystem,
  commands: CommandBuffer,
}

#[derive(Default)]
struct PhasePlan {
  batches: Vec<Vec<usize>>,
}

/// Runs the registered systems phase by phase.
pub struct Scheduler {
  records: Vec<SystemRecord>,
  plans: [PhasePlan; 5],
  next_seq: u64,
  thread_pool: Option<ThreadPool>,
  fixed_timestep: f32,
  max_fixed_steps: u32,
  accumulator: f32,
}

impl Scheduler {
  /// Creates a sequential scheduler, see [`Scheduler::start_workers`].
  pub fn new(config: &EcsConfig) -> Self {
    Self {
      records: Vec::new(),
      plans: Default::default(),
      next_seq: 0,
      thread_pool: None,
      fixed_timestep: config.fixed_timestep,
      max_fixed_steps: config.max_fixed_steps,
      accumulator: 0.0,
    }
  }

  /// Moves execution onto a worker pool and regroups every phase into
  /// parallel batches.
  pub fn start_workers(&mut self, worker_threads: usize) {
    debug!("Initializing Scheduler for async Execution");
    self.thread_pool = Some(ThreadPool::new(worker_threads.max(1)));

    for phase in Phase::ALL {
      if let Err(err) = self.rebuild(phase) {
        warn!("Keeping previous plan: {}", err);
      }
    }
  }

  pub fn is_parallel(&self) -> bool {
    self.thread_pool.is_some()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.position(name).is_some()
  }

  fn position(&self, name: &str) -> Option<usize> {
    self.records.iter().position(|r| r.name == name)
  }

  fn unique_name(&self, base: &str) -> String {
    if !self.contains(base) {
      return base.to_string();
    }

    (2..)
      .map(|n| format!("{}#{}", base, n))
      .find(|name| !self.contains(name))
      .unwrap_or_else(|| base.to_string())
  }

  /// Initializes `system` against `world` and rebuilds the plan of its phase.
  ///
  /// On a cyclic ordering the registration is rolled back.
  pub fn add_system(
    &mut self,
    world: &mut World,
    mut system: StoredSystem,
    config: SystemConfig,
  ) -> Result<SystemId, ScheduleError> {
    let name = match &config.name {
      Some(name) if self.contains(name) => return Err(ScheduleError::DuplicateSystem(name.clone())),
      Some(name) => name.clone(),
      None => self.unique_name(system.name()),
    };

    debug!("Adding System {} to {:?}", name, config.phase);
    system.init(world);

    let id = SystemId(self.next_seq);
    self.next_seq += 1;

    let phase = config.phase;
    self.records.push(SystemRecord {
      id,
      name,
      config,
      system,
      commands: CommandBuffer::new(),
    });

    if let Err(err) = self.rebuild(phase) {
      self.records.pop();
      return Err(err);
    }

    Ok(id)
  }

  /// Unregisters the system called `name`. Returns `false` when there is none.
  pub fn remove_system(&mut self, name: &str) -> Result<bool, ScheduleError> {
    let Some(index) = self.position(name) else {
      return Ok(false);
    };

    debug!("Removing System {}", name);
    self.records.remove(index);

    for phase in Phase::ALL {
      self.rebuild(phase)?;
    }
    Ok(true)
  }

  fn rebuild(&mut self, phase: Phase) -> Result<(), ScheduleError> {
    let nodes = self
      .records
      .iter()
      .enumerate()
      .filter(|(_, r)| r.config.phase == phase)
      .map(|(i, _)| i)
      .collect::<Vec<_>>();

    let local = nodes
      .iter()
      .enumerate()
      .map(|(local, &global)| (self.records[global].name.as_str(), local))
      .collect::<FxHashMap<_, _>>();

    let mut graph = DependencyGraph::new(nodes.len());
    for (i, &global) in nodes.iter().enumerate() {
      let record = &self.records[global];

      for (other, before) in record
        .config
        .before
        .iter()
        .map(|n| (n, true))
        .chain(record.config.after.iter().map(|n| (n, false)))
      {
        match local.get(other.as_str()) {
          Some(&j) if before => graph.add_edge(i, j),
          Some(&j) => graph.add_edge(j, i),
          None => warn!(
            "System {} references {} which is not registered in {:?}, ignoring",
            record.name, other, phase
          ),
        }
      }
    }

    let keys = nodes
      .iter()
      .map(|&i| (self.records[i].config.order, self.records[i].id.0))
      .collect::<Vec<_>>();

    let order = graph
      .sort(&keys)
      .map_err(|cycle| ScheduleError::CycleDetected {
        phase,
        systems: cycle
          .into_iter()
          .map(|i| self.records[nodes[i]].name.clone())
          .collect(),
      })?;

    let batches = if self.is_parallel() {
      graph.batches(&order, |a, b| {
        self.records[nodes[a]]
          .system
          .meta()
          .overlaps(self.records[nodes[b]].system.meta())
      })
    } else {
      order.iter().map(|&i| vec![i]).collect()
    };

    let batches = batches
      .into_iter()
      .map(|batch| batch.into_iter().map(|i| nodes[i]).collect::<Vec<_>>())
      .collect::<Vec<_>>();

    debug!(
      "Planned {:?}: {} Systems in {} Batches",
      phase,
      nodes.len(),
      batches.len()
    );
    self.plans[phase.index()] = PhasePlan { batches };
    Ok(())
  }

  /// System names of `phase` in execution order.
  pub fn phase_order(&self, phase: Phase) -> Vec<&str> {
    self.plans[phase.index()]
      .batches
      .iter()
      .flatten()
      .map(|&i| self.records[i].name.as_str())
      .collect()
  }

  pub fn phase_batches(&self, phase: Phase) -> Vec<Vec<&str>> {
    self.plans[phase.index()]
      .batches
      .iter()
      .map(|batch| batch.iter().map(|&i| self.records[i].name.as_str()).collect())
      .collect()
  }

  pub fn system(&self, name: &str) -> Option<&dyn System> {
    self
      .records
      .iter()
      .find(|r| r.name == name)
      .map(|r| &*r.system as &dyn System)
  }

  pub fn capability(&self, name: &str, capability: TypeId) -> Option<&dyn Any> {
    self.system(name)?.capability(capability)
  }

  /// One pass over all phases.
  pub fn run(&mut self, world: &mut World, delta: f32) {
    world.get_resource_or_insert_with(Time::default).advance(delta);

    for phase in Phase::ALL {
      if phase == Phase::FixedUpdate {
        self.run_fixed(world, delta);
      } else {
        self.run_phase(world, phase);
      }
    }

    world.get_resource_or_insert_with(Time::default).frame += 1;
  }

  fn run_fixed(&mut self, world: &mut World, delta: f32) {
    let timestep = self.fixed_timestep;
    if timestep <= 0.0 {
      world.get_resource_or_insert_with(Time::default).fixed_delta = delta;
      self.run_phase(world, Phase::FixedUpdate);
      return;
    }

    world.get_resource_or_insert_with(Time::default).fixed_delta = timestep;
    self.accumulator += delta;

    let mut steps = 0;
    while self.accumulator >= timestep && steps < self.max_fixed_steps {
      self.run_phase(world, Phase::FixedUpdate);
      self.accumulator -= timestep;
      steps += 1;
    }

    if self.accumulator >= timestep {
      #[cfg(feature = "debug")]
      trace!("Dropping {} fixed steps", (self.accumulator / timestep) as u32);
      self.accumulator %= timestep;
    }
  }

  fn run_phase(&mut self, world: &mut World, phase: Phase) {
    let Self {
      records,
      plans,
      thread_pool,
      ..
    } = self;

    for (_i, batch) in plans[phase.index()].batches.iter().enumerate() {
      #[cfg(feature = "debug")]
      trace!("Executing {:?} Batch {}", phase, _i);

      match thread_pool {
        Some(pool) if batch.len() > 1 => run_parallel(pool, records, batch, world),
        _ => {
          for &index in batch {
            let record = &mut records[index];
            record
              .system
              .run(UnsafeWorldCell::new(world), &mut record.commands);
          }
        }
      }

      for &index in batch {
        records[index].commands.flush(world);
      }
    }
  }
}

fn run_parallel(
  pool: &ThreadPool,
  records: &mut [SystemRecord],
  batch: &[usize],
  world: &mut World,
) {
  let latch = Latch::new(batch.len());
  let world: UnsafeWorldCell<'static> = unsafe { mem::transmute(UnsafeWorldCell::new(world)) };
  let base = records.as_mut_ptr();

  for &index in batch {
    debug_assert!(index < records.len());
    // Batches never contain an index twice.
    let record: &'static mut SystemRecord = unsafe { &mut *base.add(index) };
    let latch = latch.clone();

    pool.execute(move || {
      let result = panic::catch_unwind(AssertUnwindSafe(|| {
        record.system.run(world, &mut record.commands)
      }));

      match result {
        Ok(()) => latch.count_down(),
        Err(payload) => latch.count_down_with_panic(payload),
      }
    });
  }

  if let Err(payload) = latch.wait() {
    panic::resume_unwind(payload);
  }
}
