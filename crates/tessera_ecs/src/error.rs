use thiserror::Error;

use crate::{components::ComponentId, entity::Entity, scheduler::Phase};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
  #[error("Entity {0} is not alive")]
  StaleEntity(Entity),
  #[error("Entity {entity} has no component {component}")]
  MissingComponent {
    entity: Entity,
    component: &'static str,
  },
  #[error("Component {0:?} is not registered")]
  UnknownComponent(ComponentId),
  #[error("Component {0} has no registered default value")]
  NoDefault(&'static str),
  #[error("Component name {name} is already bound to {existing}")]
  DuplicateRegistration {
    name: String,
    existing: &'static str,
  },
  #[error("Entity capacity of {0} ids exhausted")]
  CapacityExhausted(u32),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
  #[error("A system named {0} is already registered")]
  DuplicateSystem(String),
  #[error("Cyclic system ordering in {phase:?}: {}", .systems.join(" -> "))]
  CycleDetected { phase: Phase, systems: Vec<String> },
}
