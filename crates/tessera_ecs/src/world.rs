use std::{
  any::{type_name, Any, TypeId},
  borrow::Cow,
  cell::UnsafeCell,
  marker::PhantomData,
  mem, ptr,
};

#[cfg(feature = "debug")]
use log::trace;
use log::debug;
use rustc_hash::FxHashMap;

use crate::{
  components::{Component, ComponentBox, ComponentId, ComponentRegistry, Name},
  config::EcsConfig,
  entity::{Entity, EntityAllocator, IntoEntity},
  error::EcsError,
  query::{filter::QueryFilter, Entities, QueryIter, QueryParam, QuerySignature, QueryState},
  storage::{Archetype, ArchetypeId, EntityLocation, Storage},
};

struct ResourceCell {
  value: UnsafeCell<Box<dyn Any + Send + Sync>>,
  name: &'static str,
}

// Access is coordinated through `SystemMeta`, see `UnsafeWorldCell`.
unsafe impl Sync for ResourceCell {}

impl ResourceCell {
  fn new<R: Send + Sync + 'static>(value: R) -> Self {
    Self {
      value: UnsafeCell::new(Box::new(value)),
      name: type_name::<R>(),
    }
  }
}

/// Entities, their components and the world resources.
pub struct World {
  entities: EntityAllocator,
  registry: ComponentRegistry,
  storage: Storage,
  resources: FxHashMap<TypeId, ResourceCell>,
}

impl Default for World {
  fn default() -> Self {
    Self::new()
  }
}

impl World {
  pub fn new() -> Self {
    Self::with_config(&EcsConfig::default())
  }

  pub fn with_config(config: &EcsConfig) -> Self {
    debug!("Creating World");

    Self {
      entities: EntityAllocator::with_limit(config.max_entities),
      registry: ComponentRegistry::new(),
      storage: Storage::new(),
      resources: FxHashMap::default(),
    }
  }

  /// Starts building a new entity component by component.
  pub fn spawn(&mut self) -> EntityBuilder<'_> {
    EntityBuilder {
      world: self,
      components: Vec::new(),
    }
  }

  /// Panics when the entity limit is reached, see [`World::try_create_entity`].
  pub fn create_entity(&mut self, entity: impl IntoEntity) -> Entity {
    match self.try_create_entity(entity) {
      Ok(entity) => entity,
      Err(err) => panic!("Failed to create entity: {}", err),
    }
  }

  pub fn try_create_entity(&mut self, entity: impl IntoEntity) -> Result<Entity, EcsError> {
    self.spawn_boxed(entity.into_entity())
  }

  pub(crate) fn spawn_boxed(&mut self, components: Vec<ComponentBox>) -> Result<Entity, EcsError> {
    let entity = self.entities.allocate()?;

    #[cfg(feature = "debug")]
    trace!("Creating Entity {}", entity);

    let registry = &mut self.registry;
    let components = components
      .into_iter()
      .map(|c| (registry.register_descriptor(*c.descriptor()), c.into_inner()))
      .collect();
    self.storage.spawn(entity, components, &self.registry);

    Ok(entity)
  }

  pub fn despawn(&mut self, entity: Entity) -> bool {
    if !self.entities.is_alive(entity) {
      return false;
    }

    self.storage.despawn(entity);
    self.entities.free(entity)
  }

  #[inline]
  pub fn is_alive(&self, entity: Entity) -> bool {
    self.entities.is_alive(entity)
  }

  /// Number of live entities.
  pub fn len(&self) -> usize {
    self.entities.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entities.is_empty()
  }

  fn check_alive(&self, entity: Entity) -> Result<(), EcsError> {
    if self.entities.is_alive(entity) {
      Ok(())
    } else {
      Err(EcsError::StaleEntity(entity))
    }
  }

  /// Adds `component`, replacing the current value if the entity already has one.
  pub fn add<T: Component>(&mut self, entity: Entity, component: T) -> Result<(), EcsError> {
    self.check_alive(entity)?;
    let id = self.registry.register::<T>();
    self
      .storage
      .insert(entity, id, Box::new(component), &self.registry);
    Ok(())
  }

  pub fn add_boxed(&mut self, entity: Entity, component: ComponentBox) -> Result<(), EcsError> {
    self.check_alive(entity)?;
    let id = self.registry.register_descriptor(*component.descriptor());
    self
      .storage
      .insert(entity, id, component.into_inner(), &self.registry);
    Ok(())
  }

  /// Adds the registered default value of component `id`.
  pub fn add_default_by_id(&mut self, entity: Entity, id: ComponentId) -> Result<(), EcsError> {
    self.check_alive(entity)?;
    let info = self
      .registry
      .info(id)
      .ok_or(EcsError::UnknownComponent(id))?;
    let value = info.make_default().ok_or(EcsError::NoDefault(info.name()))?;

    self.storage.insert(entity, id, value, &self.registry);
    Ok(())
  }

  pub fn remove<T: Component>(&mut self, entity: Entity) -> bool {
    match self.registry.id::<T>() {
      Some(id) => self.remove_by_id(entity, id),
      None => false,
    }
  }

  pub fn remove_by_id(&mut self, entity: Entity, id: ComponentId) -> bool {
    self.entities.is_alive(entity) && self.storage.remove(entity, id, &self.registry)
  }

  /// Writes `component` and returns the previous value. Adds the component
  /// when the entity does not have it yet.
  pub fn set<T: Component>(&mut self, entity: Entity, component: T) -> Result<Option<T>, EcsError> {
    self.check_alive(entity)?;
    let id = self.registry.register::<T>();

    match self.storage.get_mut::<T>(entity, id) {
      Some(current) => Ok(Some(mem::replace(current, component))),
      None => {
        self
          .storage
          .insert(entity, id, Box::new(component), &self.registry);
        Ok(None)
      }
    }
  }

  pub fn get<T: Component>(&self, entity: Entity) -> Result<&T, EcsError> {
    self.check_alive(entity)?;
    self
      .registry
      .id::<T>()
      .and_then(|id| self.storage.get::<T>(entity, id))
      .ok_or(EcsError::MissingComponent {
        entity,
        component: type_name::<T>(),
      })
  }

  pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
    self.check_alive(entity)?;
    self
      .registry
      .id::<T>()
      .and_then(|id| self.storage.get_mut::<T>(entity, id))
      .ok_or(EcsError::MissingComponent {
        entity,
        component: type_name::<T>(),
      })
  }

  pub fn has<T: Component>(&self, entity: Entity) -> bool {
    self
      .registry
      .id::<T>()
      .is_some_and(|id| self.has_by_id(entity, id))
  }

  pub fn has_by_id(&self, entity: Entity, id: ComponentId) -> bool {
    self.entities.is_alive(entity) && self.storage.has(entity, id)
  }

  /// Iterates all entities with the components of `Q` that pass `F`.
  ///
  /// Panics when `Q` names one component mutably more than once.
  pub fn query<Q: QueryParam, F: QueryFilter>(&mut self) -> QueryIter<'_, Q> {
    let state = QueryState::<Q, F>::new(self);
    state.meta();

    let ids = state.ids().to_vec();
    let (archetypes, matched) = self.storage.query(state.signature());
    unsafe { QueryIter::new(archetypes, Cow::Borrowed(matched), Cow::Owned(ids)) }
  }

  pub fn query_entities(&mut self, signature: &QuerySignature) -> Entities<'_> {
    let (archetypes, matched) = self.storage.query(signature);
    Entities::new(archetypes, Cow::Borrowed(matched))
  }

  pub fn register<T: Component>(&mut self) -> ComponentId {
    self.registry.register::<T>()
  }

  pub fn register_default<T: Component + Default>(&mut self) -> ComponentId {
    self.registry.register_default::<T>()
  }

  pub fn register_name<T: Component>(&mut self, name: &str) -> Result<ComponentId, EcsError> {
    self.registry.register_name::<T>(name)
  }

  pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
    self.registry.id::<T>()
  }

  pub fn registry(&self) -> &ComponentRegistry {
    &self.registry
  }

  pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
    &mut self.registry
  }

  pub fn storage(&self) -> &Storage {
    &self.storage
  }

  pub fn storage_mut(&mut self) -> &mut Storage {
    &mut self.storage
  }

  /// Packed values of `T` in one archetype.
  pub fn column<T: Component>(&self, archetype: ArchetypeId) -> Option<&[T]> {
    self.storage.column(archetype, self.registry.id::<T>()?)
  }

  pub fn column_mut<T: Component>(&mut self, archetype: ArchetypeId) -> Option<&mut [T]> {
    let id = self.registry.id::<T>()?;
    self.storage.column_mut(archetype, id)
  }

  pub fn archetypes(&self) -> &[Archetype] {
    self.storage.archetypes()
  }

  /// Component names and entity count of every populated archetype.
  pub fn archetype_signatures(&self) -> Vec<(Vec<&'static str>, usize)> {
    self
      .storage
      .archetypes()
      .iter()
      .filter(|a| !a.is_empty())
      .map(|a| {
        let mut names = a
          .signature()
          .ids()
          .iter()
          .filter_map(|&id| self.registry.info(id).map(|info| info.name()))
          .collect::<Vec<_>>();
        names.sort_unstable();
        (names, a.len())
      })
      .collect()
  }

  pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
    if !self.entities.is_alive(entity) {
      return None;
    }
    self.storage.location(entity)
  }

  /// Replaces the resource of type `R`.
  pub fn set_resource<R: Send + Sync + 'static>(&mut self, res: R) {
    #[cfg(feature = "debug")]
    trace!("Setting Resource {}", type_name::<R>());

    self.resources.insert(TypeId::of::<R>(), ResourceCell::new(res));
  }

  /// Inserts the resource unless one of type `R` already exists.
  pub fn add_resource<R: Send + Sync + 'static>(&mut self, res: R) {
    debug!("Adding Resource {}", type_name::<R>());

    self
      .resources
      .entry(TypeId::of::<R>())
      .or_insert_with(|| ResourceCell::new(res));
  }

  pub fn get_resource<R: 'static>(&self) -> Option<&R> {
    #[cfg(feature = "debug")]
    trace!("Getting Resource {}", type_name::<R>());

    let cell = self.resources.get(&TypeId::of::<R>())?;
    unsafe { &*cell.value.get() }.downcast_ref()
  }

  pub fn get_resource_mut<R: 'static>(&mut self) -> Option<&mut R> {
    #[cfg(feature = "debug")]
    trace!("Getting Resource mutably {}", type_name::<R>());

    self
      .resources
      .get_mut(&TypeId::of::<R>())?
      .value
      .get_mut()
      .downcast_mut()
  }

  /// # Safety
  /// no other reference to the resource may be alive
  pub unsafe fn get_resource_unchecked_mut<R: 'static>(&self) -> Option<&mut R> {
    let cell = self.resources.get(&TypeId::of::<R>())?;
    (*cell.value.get()).downcast_mut()
  }

  pub fn get_resource_or_insert_with<R: Send + Sync + 'static>(
    &mut self,
    f: impl FnOnce() -> R,
  ) -> &mut R {
    let cell = self
      .resources
      .entry(TypeId::of::<R>())
      .or_insert_with(|| ResourceCell::new(f()));

    match cell.value.get_mut().downcast_mut() {
      Some(res) => res,
      None => panic!("Resource {} stored with a foreign type", cell.name),
    }
  }

  pub fn remove_resource<R: 'static>(&mut self) -> Option<R> {
    let cell = self.resources.remove(&TypeId::of::<R>())?;
    debug!("Removing Resource {}", cell.name);
    cell.value.into_inner().downcast::<R>().ok().map(|res| *res)
  }

  pub fn contains_resource<R: 'static>(&self) -> bool {
    self.resources.contains_key(&TypeId::of::<R>())
  }
}

/// Collects the components of a new entity, see [`World::spawn`].
pub struct EntityBuilder<'w> {
  world: &'w mut World,
  components: Vec<ComponentBox>,
}

impl EntityBuilder<'_> {
  pub fn with(mut self, component: impl Component) -> Self {
    self.components.push(ComponentBox::new(component));
    self
  }

  pub fn with_bundle(mut self, bundle: impl IntoEntity) -> Self {
    self.components.extend(bundle.into_entity());
    self
  }

  pub fn named(self, name: impl Into<String>) -> Self {
    self.with(Name(name.into()))
  }

  /// Panics when the entity limit is reached, see [`EntityBuilder::try_build`].
  pub fn build(self) -> Entity {
    match self.try_build() {
      Ok(entity) => entity,
      Err(err) => panic!("Failed to create entity: {}", err),
    }
  }

  pub fn try_build(self) -> Result<Entity, EcsError> {
    self.world.spawn_boxed(self.components)
  }
}

/// Shared handle to a world used while systems run.
///
/// Soundness relies on the scheduler only running systems together whose
/// [`SystemMeta`](crate::systems::metadata::SystemMeta) does not overlap.
#[derive(Clone, Copy)]
pub struct UnsafeWorldCell<'w>(*mut World, PhantomData<&'w World>);

unsafe impl Send for UnsafeWorldCell<'_> {}

unsafe impl Sync for UnsafeWorldCell<'_> {}

impl<'w> UnsafeWorldCell<'w> {
  pub fn new(world: &'w mut World) -> Self {
    Self(ptr::from_mut(world), PhantomData)
  }

  /// # Safety
  /// no other reference to the world may be alive
  pub unsafe fn world_mut(&self) -> &'w mut World {
    &mut *self.0
  }

  /// # Safety
  /// data written by other users of the cell must not be read
  pub unsafe fn world(&self) -> &'w World {
    &*self.0
  }
}

#[cfg(test)]
mod test {
  use std::{sync::Arc, thread::scope};

  use tessera_ecs_macros::Component;

  use super::{UnsafeWorldCell, World};
  use crate::{
    self as tessera_ecs,
    components::Name,
    config::EcsConfig,
    error::EcsError,
    storage::ArchetypeId,
  };

  #[derive(Component, Debug, PartialEq, Clone, Copy)]
  struct Health(u32);

  #[derive(Component, Debug, PartialEq, Clone, Copy, Default)]
  struct Armor(u32);

  #[derive(Component, Debug, PartialEq)]
  struct Player;

  #[test]
  fn resource() {
    let mut world = World::new();

    world.add_resource(0i32);
    world.add_resource(5i32);

    let res = world.get_resource::<i32>().unwrap();
    assert_eq!(*res, 0);
  }

  #[test]
  fn resource_mut() {
    let mut world = World::new();

    world.add_resource(0i32);

    let res = world.get_resource_mut::<i32>().unwrap();
    *res = 1;
    assert_eq!(world.get_resource::<i32>(), Some(&1));

    world.set_resource(7i32);
    assert_eq!(world.remove_resource::<i32>(), Some(7));
    assert!(!world.contains_resource::<i32>());
  }

  #[test]
  fn resource_or_insert() {
    let mut world = World::new();

    *world.get_resource_or_insert_with(|| 1u8) += 1;
    *world.get_resource_or_insert_with(|| 10u8) += 1;

    assert_eq!(world.get_resource::<u8>(), Some(&3));
  }

  #[test]
  #[should_panic]
  fn panic_resource() {
    let world = World::new();

    let _ = world.get_resource::<i32>().unwrap();
  }

  #[test]
  fn builder() {
    let mut world = World::new();

    let e = world
      .spawn()
      .named("player")
      .with(Health(10))
      .with_bundle((Armor(2), Player))
      .build();

    assert_eq!(world.get::<Name>(e), Ok(&Name::from("player")));
    assert_eq!(world.get::<Health>(e), Ok(&Health(10)));
    assert!(world.has::<Player>(e));
    assert_eq!(world.len(), 1);
  }

  #[test]
  fn stale_entities() {
    let mut world = World::new();

    let e = world.create_entity(Health(1));
    assert!(world.despawn(e));
    assert!(!world.despawn(e));

    assert_eq!(world.get::<Health>(e), Err(EcsError::StaleEntity(e)));
    assert_eq!(world.add(e, Armor(1)), Err(EcsError::StaleEntity(e)));
    assert_eq!(world.set(e, Health(2)), Err(EcsError::StaleEntity(e)));
    assert!(!world.has::<Health>(e));
    assert!(!world.remove::<Health>(e));

    let reused = world.create_entity(Health(3));
    assert_eq!(reused.id(), e.id());
    assert_ne!(reused.generation(), e.generation());
    assert!(!world.is_alive(e));
    assert_eq!(world.get::<Health>(reused), Ok(&Health(3)));
  }

  #[test]
  fn missing_component() {
    let mut world = World::new();
    let e = world.create_entity(Health(1));

    assert!(matches!(
      world.get::<Armor>(e),
      Err(EcsError::MissingComponent { .. })
    ));
  }

  #[test]
  fn add_set_remove() {
    let mut world = World::new();
    let e = world.create_entity(Health(1));

    world.add(e, Armor(3)).unwrap();
    assert_eq!(world.get::<Armor>(e), Ok(&Armor(3)));

    assert_eq!(world.set(e, Armor(4)), Ok(Some(Armor(3))));
    assert_eq!(world.set(e, Player), Ok(None));
    assert!(world.has::<Player>(e));

    world.get_mut::<Health>(e).unwrap().0 = 9;
    assert_eq!(world.get::<Health>(e), Ok(&Health(9)));

    assert!(world.remove::<Armor>(e));
    assert!(!world.remove::<Armor>(e));
    assert_eq!(world.get::<Health>(e), Ok(&Health(9)));
  }

  #[test]
  fn defaults() {
    let mut world = World::new();
    let armor = world.register_default::<Armor>();
    let health = world.register::<Health>();
    let e = world.create_entity(());

    world.add_default_by_id(e, armor).unwrap();
    assert_eq!(world.get::<Armor>(e), Ok(&Armor(0)));
    assert_eq!(
      world.add_default_by_id(e, health),
      Err(EcsError::NoDefault(std::any::type_name::<Health>()))
    );
  }

  #[test]
  fn capacity() {
    let mut world = World::with_config(&EcsConfig::default().set_max_entities(2));

    world.create_entity(());
    let e = world.create_entity(());
    assert!(matches!(
      world.try_create_entity(()),
      Err(EcsError::CapacityExhausted(_))
    ));

    world.despawn(e);
    assert!(world.try_create_entity(()).is_ok());
  }

  #[test]
  fn signatures() {
    let mut world = World::new();
    world.create_entity((Health(1), Armor(1)));
    world.create_entity((Armor(2), Health(2)));
    world.create_entity(Health(3));

    let mut signatures = world.archetype_signatures();
    signatures.sort();

    let mut expected = vec![
      (
        vec![
          std::any::type_name::<Armor>(),
          std::any::type_name::<Health>(),
        ],
        2,
      ),
      (vec![std::any::type_name::<Health>()], 1),
    ];
    expected.sort();
    assert_eq!(signatures, expected);
  }

  #[test]
  fn column_access() {
    let mut world = World::new();
    let e = world.create_entity(Health(1));
    world.create_entity(Health(2));

    let archetype = world.location(e).unwrap().archetype;
    assert_ne!(archetype, ArchetypeId::EMPTY);

    for health in world.column_mut::<Health>(archetype).unwrap() {
      health.0 += 1;
    }
    assert_eq!(world.column::<Health>(archetype).unwrap(), &[Health(2), Health(3)]);
  }

  #[test]
  fn shared_reads() {
    let mut world = World::new();
    world.add_resource(42u64);

    let cell = UnsafeWorldCell::new(&mut world);
    let arc = Arc::new(cell);

    scope(|s| {
      let threads = (0..4)
        .map(|_| {
          let arc = arc.clone();
          s.spawn(move || {
            let cell = *arc;
            unsafe { *cell.world().get_resource::<u64>().unwrap() }
          })
        })
        .collect::<Vec<_>>();

      for thread in threads {
        assert_eq!(thread.join().unwrap(), 42);
      }
    });
  }
}
