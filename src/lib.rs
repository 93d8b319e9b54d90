pub use log;
pub use tessera_ecs as ecs;
pub use tessera_utils as utils;

pub mod prelude {
  pub use tessera_ecs::{
    query::filter::{With, Without},
    systems::{
      query::Query,
      resources::{Res, ResMut},
    },
    CommandBuffer, Component, EcsConfig, Entity, Phase, SystemConfig, Time, World, ECS,
  };
}

/// Installs `env_logger` as the `log` backend. Later calls are ignored.
pub fn init_logger() {
  let _ = env_logger::builder().try_init();
}
