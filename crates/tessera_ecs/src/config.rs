use std::{num::NonZeroUsize, thread};

/// Runtime settings of an [`ECS`](crate::ECS).
#[derive(Debug, Clone)]
pub struct EcsConfig {
  /// Run independent systems of a batch on the worker pool.
  pub parallel_systems: bool,
  pub worker_threads: usize,
  /// Seconds per `FixedUpdate` step. A value `<= 0` runs the phase once per update.
  pub fixed_timestep: f32,
  pub max_fixed_steps: u32,
  pub max_entities: u32,
}

impl Default for EcsConfig {
  fn default() -> Self {
    Self {
      parallel_systems: true,
      worker_threads: thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1),
      fixed_timestep: 1.0 / 60.0,
      max_fixed_steps: 5,
      max_entities: u32::MAX,
    }
  }
}

impl EcsConfig {
  pub fn set_parallel_systems(mut self, parallel_systems: bool) -> Self {
    self.parallel_systems = parallel_systems;
    self
  }

  pub fn set_worker_threads(mut self, worker_threads: usize) -> Self {
    self.worker_threads = worker_threads.max(1);
    self
  }

  pub fn set_fixed_timestep(mut self, fixed_timestep: f32) -> Self {
    self.fixed_timestep = fixed_timestep;
    self
  }

  pub fn set_max_fixed_steps(mut self, max_fixed_steps: u32) -> Self {
    self.max_fixed_steps = max_fixed_steps;
    self
  }

  pub fn set_max_entities(mut self, max_entities: u32) -> Self {
    self.max_entities = max_entities;
    self
  }

  pub(crate) fn uses_worker_pool(&self) -> bool {
    self.parallel_systems && self.worker_threads > 1
  }
}

#[cfg(test)]
mod test {
  use super::EcsConfig;

  #[test]
  fn setters() {
    let config = EcsConfig::default()
      .set_parallel_systems(true)
      .set_worker_threads(0)
      .set_max_entities(8);

    assert_eq!(config.worker_threads, 1);
    assert_eq!(config.max_entities, 8);
    assert!(!config.uses_worker_pool());
    assert!(config.set_worker_threads(4).uses_worker_pool());
  }
}
