use std::any::TypeId;

use log::debug;

pub mod commands;
pub mod components;
pub mod config;
pub mod entity;
pub mod error;
pub mod query;
pub mod scheduler;
pub mod storage;
pub mod systems;
pub mod time;
pub mod world;


pub use commands::{CommandBuffer, EntityRef, Placeholder, PlaceholderMap};
pub use components::{Component, ComponentId, Name};
pub use config::EcsConfig;
pub use entity::{Entity, IntoEntity};
pub use error::{EcsError, ScheduleError};
pub use scheduler::{Phase, SystemConfig, SystemId};
pub use tessera_ecs_macros::Component;
pub use time::Time;
pub use world::World;

use scheduler::Scheduler;
use systems::{IntoSystem, System};

/// A world together with the systems that run on it.
pub struct ECS {
  scheduler: Scheduler,
  world: World,
}

pub struct ECSBuilder {
  scheduler: Scheduler,
  world: World,
  config: EcsConfig,
  sync_system_exec: bool,
}

impl ECS {
  pub fn builder() -> ECSBuilder {
    ECSBuilder::new()
  }

  /// Runs every phase once, `delta` being the seconds since the last update.
  pub fn update(&mut self, delta: f32) {
    self.scheduler.run(&mut self.world, delta);
  }

  pub fn add_system<I, S: System + 'static>(
    &mut self,
    system: impl IntoSystem<I, System = S>,
    config: impl Into<SystemConfig>,
  ) -> Result<SystemId, ScheduleError> {
    self.scheduler.add_system(
      &mut self.world,
      Box::new(system.into_system()),
      config.into(),
    )
  }

  pub fn remove_system(&mut self, name: &str) -> Result<bool, ScheduleError> {
    self.scheduler.remove_system(name)
  }

  pub fn world(&self) -> &World {
    &self.world
  }

  pub fn world_mut(&mut self) -> &mut World {
    &mut self.world
  }

  pub fn create_entity(&mut self, entity: impl IntoEntity) -> Entity {
    self.world.create_entity(entity)
  }

  pub fn set_resource<R: Send + Sync + 'static>(&mut self, res: R) {
    self.world.set_resource(res);
  }

  pub fn get_resource<R: 'static>(&self) -> Option<&R> {
    self.world.get_resource()
  }

  pub fn get_resource_mut<R: 'static>(&mut self) -> Option<&mut R> {
    self.world.get_resource_mut()
  }

  pub fn phase_order(&self, phase: Phase) -> Vec<&str> {
    self.scheduler.phase_order(phase)
  }

  /// Systems of `phase` grouped by the batches they run in.
  pub fn phase_batches(&self, phase: Phase) -> Vec<Vec<&str>> {
    self.scheduler.phase_batches(phase)
  }

  pub fn is_parallel(&self) -> bool {
    self.scheduler.is_parallel()
  }

  /// Feature `C` the system called `name` exposes through
  /// [`System::capability`].
  pub fn system_capability<C: 'static>(&self, name: &str) -> Option<&C> {
    self
      .scheduler
      .capability(name, TypeId::of::<C>())?
      .downcast_ref()
  }

  pub fn has_system_capability<C: 'static>(&self, name: &str) -> bool {
    self.system_capability::<C>(name).is_some()
  }
}

impl Default for ECSBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl ECSBuilder {
  pub fn new() -> Self {
    Self::with_config(EcsConfig::default())
  }

  pub fn with_config(config: EcsConfig) -> Self {
    Self {
      scheduler: Scheduler::new(&config),
      world: World::with_config(&config),
      config,
      sync_system_exec: false,
    }
  }

  /// Runs every system on the calling thread, one after another.
  pub fn sync_system_exec(&mut self, value: bool) {
    self.sync_system_exec = value;
  }

  pub fn add_system<I, S: System + 'static>(
    &mut self,
    system: impl IntoSystem<I, System = S>,
    config: impl Into<SystemConfig>,
  ) -> Result<SystemId, ScheduleError> {
    self.scheduler.add_system(
      &mut self.world,
      Box::new(system.into_system()),
      config.into(),
    )
  }

  pub fn add_resource<R: Send + Sync + 'static>(&mut self, res: R) {
    self.world.add_resource(res);
  }

  pub fn create_entity(&mut self, entity: impl IntoEntity) -> Entity {
    self.world.create_entity(entity)
  }

  pub fn world_mut(&mut self) -> &mut World {
    &mut self.world
  }

  pub fn build(mut self) -> ECS {
    if !self.sync_system_exec && self.config.uses_worker_pool() {
      self.scheduler.start_workers(self.config.worker_threads);
    } else {
      debug!("Initializing Scheduler for sync Execution");
    }
    self.world.add_resource(Time::default());

    ECS {
      scheduler: self.scheduler,
      world: self.world,
    }
  }
}
