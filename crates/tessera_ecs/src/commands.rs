use std::{
  any::type_name,
  fmt,
  sync::atomic::{AtomicU32, Ordering},
};

#[cfg(feature = "debug")]
use log::trace;
use log::warn;
use rustc_hash::FxHashMap;

use crate::{
  components::{Component, ComponentBox, Name},
  entity::{Entity, IntoEntity},
  world::World,
};

static NEXT_BUFFER: AtomicU32 = AtomicU32::new(0);

/// Stand-in for an entity spawned by a [`CommandBuffer`] that does not exist
/// until the buffer is flushed.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placeholder {
  buffer: u32,
  index: u32,
}

impl fmt::Debug for Placeholder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Placeholder({}#{})", self.buffer, self.index)
  }
}

/// Target of a recorded command.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EntityRef {
  Entity(Entity),
  Placeholder(Placeholder),
}

impl From<Entity> for EntityRef {
  fn from(value: Entity) -> Self {
    EntityRef::Entity(value)
  }
}

impl From<Placeholder> for EntityRef {
  fn from(value: Placeholder) -> Self {
    EntityRef::Placeholder(value)
  }
}

/// Entities created for the placeholders of one flush.
pub type PlaceholderMap = FxHashMap<Placeholder, Entity>;

struct FlushContext<'a> {
  world: &'a mut World,
  placeholders: PlaceholderMap,
  buffer: u32,
  epoch: (u32, u32),
}

impl FlushContext<'_> {
  fn resolve(&self, target: EntityRef) -> Option<Entity> {
    match target {
      EntityRef::Entity(entity) => Some(entity),
      EntityRef::Placeholder(placeholder) => {
        let (start, end) = self.epoch;
        if placeholder.buffer != self.buffer
          || placeholder.index < start
          || placeholder.index >= end
        {
          warn!("Skipping command for {:?} recorded by another buffer or flush", placeholder);
          return None;
        }

        let entity = self.placeholders.get(&placeholder).copied();
        if entity.is_none() {
          warn!("Skipping command for {:?} whose spawn failed", placeholder);
        }
        entity
      }
    }
  }
}

trait Command: Send {
  fn execute(self: Box<Self>, ctx: &mut FlushContext);
}

struct SpawnCommand {
  placeholder: Placeholder,
  components: Vec<ComponentBox>,
}

impl Command for SpawnCommand {
  fn execute(self: Box<Self>, ctx: &mut FlushContext) {
    match ctx.world.spawn_boxed(self.components) {
      Ok(entity) => {
        ctx.placeholders.insert(self.placeholder, entity);
      }
      Err(err) => warn!("Skipping spawn of {:?}: {}", self.placeholder, err),
    }
  }
}

struct DespawnCommand {
  target: EntityRef,
}

impl Command for DespawnCommand {
  fn execute(self: Box<Self>, ctx: &mut FlushContext) {
    if let Some(entity) = ctx.resolve(self.target) {
      if !ctx.world.despawn(entity) {
        warn!("Skipping despawn of dead Entity {}", entity);
      }
    }
  }
}

struct AddComponentCommand {
  target: EntityRef,
  component: ComponentBox,
}

impl Command for AddComponentCommand {
  fn execute(self: Box<Self>, ctx: &mut FlushContext) {
    if let Some(entity) = ctx.resolve(self.target) {
      if let Err(err) = ctx.world.add_boxed(entity, self.component) {
        warn!("Skipping component add: {}", err);
      }
    }
  }
}

struct RemoveComponentCommand {
  target: EntityRef,
  remove: fn(&mut World, Entity) -> bool,
  name: &'static str,
}

impl Command for RemoveComponentCommand {
  fn execute(self: Box<Self>, ctx: &mut FlushContext) {
    if let Some(entity) = ctx.resolve(self.target) {
      if !(self.remove)(&mut *ctx.world, entity) {
        warn!("Skipping removal of {} from Entity {}", self.name, entity);
      }
    }
  }
}

struct SetComponentCommand<T: Component> {
  target: EntityRef,
  component: T,
}

impl<T: Component> Command for SetComponentCommand<T> {
  fn execute(self: Box<Self>, ctx: &mut FlushContext) {
    if let Some(entity) = ctx.resolve(self.target) {
      if let Err(err) = ctx.world.set(entity, self.component) {
        warn!("Skipping component set: {}", err);
      }
    }
  }
}

struct FnCommand<F: FnOnce(&mut World) + Send>(F);

impl<F: FnOnce(&mut World) + Send> Command for FnCommand<F> {
  fn execute(self: Box<Self>, ctx: &mut FlushContext) {
    (self.0)(&mut *ctx.world)
  }
}

/// Ordered list of deferred world mutations.
///
/// Every system owns one buffer; the scheduler flushes it after the batch the
/// system ran in.
pub struct CommandBuffer {
  id: u32,
  commands: Vec<Box<dyn Command>>,
  epoch_start: u32,
  next_placeholder: u32,
}

impl Default for CommandBuffer {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for CommandBuffer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CommandBuffer")
      .field("id", &self.id)
      .field("commands", &self.commands.len())
      .finish()
  }
}

impl CommandBuffer {
  pub fn new() -> Self {
    Self {
      id: NEXT_BUFFER.fetch_add(1, Ordering::Relaxed),
      commands: Vec::new(),
      epoch_start: 0,
      next_placeholder: 0,
    }
  }

  fn push(&mut self, command: impl Command + 'static) {
    self.commands.push(Box::new(command));
  }

  fn spawn_boxed(&mut self, components: Vec<ComponentBox>) -> Placeholder {
    let placeholder = Placeholder {
      buffer: self.id,
      index: self.next_placeholder,
    };
    self.next_placeholder += 1;

    self.push(SpawnCommand {
      placeholder,
      components,
    });
    placeholder
  }

  pub fn spawn(&mut self, entity: impl IntoEntity) -> Placeholder {
    self.spawn_boxed(entity.into_entity())
  }

  pub fn spawn_named(&mut self, name: impl Into<String>, entity: impl IntoEntity) -> Placeholder {
    let mut components = entity.into_entity();
    components.push(ComponentBox::new(Name(name.into())));
    self.spawn_boxed(components)
  }

  pub fn spawn_empty(&mut self) -> Placeholder {
    self.spawn_boxed(Vec::new())
  }

  pub fn despawn(&mut self, target: impl Into<EntityRef>) {
    self.push(DespawnCommand {
      target: target.into(),
    });
  }

  /// Adds the component, replacing an existing value.
  pub fn add_component<T: Component>(&mut self, target: impl Into<EntityRef>, component: T) {
    self.push(AddComponentCommand {
      target: target.into(),
      component: ComponentBox::new(component),
    });
  }

  pub fn remove_component<T: Component>(&mut self, target: impl Into<EntityRef>) {
    self.push(RemoveComponentCommand {
      target: target.into(),
      remove: World::remove::<T>,
      name: type_name::<T>(),
    });
  }

  pub fn set_component<T: Component>(&mut self, target: impl Into<EntityRef>, component: T) {
    self.push(SetComponentCommand {
      target: target.into(),
      component,
    });
  }

  /// Runs `f` against the world during the flush, in recording order.
  pub fn add_fn(&mut self, f: impl FnOnce(&mut World) + Send + 'static) {
    self.push(FnCommand(f));
  }

  /// Applies all commands in recording order and empties the buffer.
  pub fn flush(&mut self, world: &mut World) -> PlaceholderMap {
    #[cfg(feature = "debug")]
    if !self.commands.is_empty() {
      trace!("Flushing {} Commands of buffer {}", self.commands.len(), self.id);
    }

    let mut ctx = FlushContext {
      world,
      placeholders: PlaceholderMap::default(),
      buffer: self.id,
      epoch: (self.epoch_start, self.next_placeholder),
    };

    for command in self.commands.drain(..) {
      command.execute(&mut ctx);
    }

    self.epoch_start = self.next_placeholder;
    ctx.placeholders
  }

  /// Drops all recorded commands. Placeholders handed out so far stay invalid.
  pub fn clear(&mut self) {
    self.commands.clear();
    self.epoch_start = self.next_placeholder;
  }

  pub fn len(&self) -> usize {
    self.commands.len()
  }

  pub fn is_empty(&self) -> bool {
    self.commands.is_empty()
  }
}

#[cfg(test)]
mod test {
  use tessera_ecs_macros::Component;

  use super::CommandBuffer;
  use crate::{self as tessera_ecs, components::Name, world::World};

  #[derive(Component, Debug, PartialEq, Clone, Copy)]
  struct Health(u32);

  #[derive(Component, Debug, PartialEq, Clone, Copy)]
  struct Burning;

  #[test]
  fn applies_in_order() {
    let mut world = World::new();
    let existing = world.create_entity(Health(10));

    let mut cmds = CommandBuffer::new();
    cmds.add_component(existing, Burning);
    cmds.set_component(existing, Health(5));
    cmds.remove_component::<Burning>(existing);
    cmds.add_component(existing, Health(7));
    assert_eq!(cmds.len(), 4);

    cmds.flush(&mut world);

    assert!(cmds.is_empty());
    assert!(!world.has::<Burning>(existing));
    assert_eq!(world.get::<Health>(existing), Ok(&Health(7)));
  }

  #[test]
  fn placeholders_resolve_once() {
    let mut world = World::new();
    let mut cmds = CommandBuffer::new();

    let p = cmds.spawn_named("torch", Health(1));
    cmds.add_component(p, Burning);
    cmds.set_component(p, Health(2));
    let other = cmds.spawn_empty();
    cmds.despawn(other);

    let map = cmds.flush(&mut world);
    let e = map[&p];

    assert_eq!(map.len(), 2);
    assert!(world.has::<Burning>(e));
    assert_eq!(world.get::<Health>(e), Ok(&Health(2)));
    assert_eq!(world.get::<Name>(e), Ok(&Name::from("torch")));
    assert!(!world.is_alive(map[&other]));
    assert_eq!(world.len(), 1);
  }

  #[test]
  fn foreign_and_stale_placeholders_are_skipped() {
    let mut world = World::new();
    let mut first = CommandBuffer::new();
    let mut second = CommandBuffer::new();

    let stale = first.spawn(Health(1));
    first.flush(&mut world);

    let foreign = second.spawn(Health(2));
    first.add_component(foreign, Burning);
    first.add_component(stale, Burning);
    first.flush(&mut world);

    assert_eq!(world.query::<&Burning, ()>().count(), 0);

    let map = second.flush(&mut world);
    assert!(!world.has::<Burning>(map[&foreign]));
    assert_eq!(world.len(), 2);
  }

  #[test]
  fn stale_entities_are_skipped() {
    let mut world = World::new();
    let e = world.create_entity(Health(1));
    world.despawn(e);

    let mut cmds = CommandBuffer::new();
    cmds.add_component(e, Burning);
    cmds.despawn(e);
    let p = cmds.spawn(Health(3));
    let map = cmds.flush(&mut world);

    assert_eq!(world.len(), 1);
    assert_eq!(world.get::<Health>(map[&p]), Ok(&Health(3)));
  }

  #[test]
  fn custom_fn_and_clear() {
    let mut world = World::new();
    let mut cmds = CommandBuffer::new();

    let p = cmds.spawn(Health(1));
    cmds.clear();
    cmds.add_component(p, Burning);
    cmds.add_fn(|world| world.add_resource(3u32));
    let map = cmds.flush(&mut world);

    assert!(map.is_empty());
    assert!(world.is_empty());
    assert_eq!(world.get_resource::<u32>(), Some(&3));
  }
}
