use std::any::Any;

#[cfg(feature = "debug")]
use log::trace;
use rustc_hash::FxHashMap;

use crate::{
  components::{Component, ComponentId, ComponentRegistry},
  entity::Entity,
  error::EcsError,
  query::{cache::QueryCache, QuerySignature},
};

pub mod archetype;
pub mod column;

pub use archetype::{Archetype, ArchetypeId, Signature};

type ComponentValue = (ComponentId, Box<dyn Any + Send>);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EntityLocation {
  pub archetype: ArchetypeId,
  pub row: usize,
}

/// Owns every archetype and keeps the entity → row mapping in sync with
/// structural changes.
pub struct Storage {
  archetypes: Vec<Archetype>,
  archetype_index: FxHashMap<Signature, ArchetypeId>,
  entity_index: Vec<Option<EntityLocation>>,
  component_index: FxHashMap<ComponentId, Vec<ArchetypeId>>,
  query_cache: QueryCache,
}

impl Default for Storage {
  fn default() -> Self {
    let mut archetype_index = FxHashMap::default();
    archetype_index.insert(Signature::default(), ArchetypeId::EMPTY);

    Self {
      archetypes: vec![Archetype::new(
        ArchetypeId::EMPTY,
        Signature::default(),
        Vec::new(),
      )],
      archetype_index,
      entity_index: Vec::new(),
      component_index: FxHashMap::default(),
      query_cache: QueryCache::default(),
    }
  }
}

impl Storage {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get_or_create_archetype(
    &mut self,
    signature: Signature,
    registry: &ComponentRegistry,
  ) -> ArchetypeId {
    if let Some(&id) = self.archetype_index.get(&signature) {
      return id;
    }

    let id = ArchetypeId(self.archetypes.len() as u32);
    #[cfg(feature = "debug")]
    trace!("Creating Archetype {:?} for {:?}", id, signature);

    let columns = signature
      .ids()
      .iter()
      .map(|&c| match registry.info(c) {
        Some(info) => info.descriptor().new_column(),
        None => panic!("Archetype requested for unregistered {:?}", c),
      })
      .collect();

    for &c in signature.ids() {
      self.component_index.entry(c).or_default().push(id);
    }

    let archetype = Archetype::new(id, signature.clone(), columns);
    self.query_cache.on_archetype_created(&archetype);
    self.archetypes.push(archetype);
    self.archetype_index.insert(signature, id);

    id
  }

  /// Places a new entity in the archetype matching `components`. For
  /// duplicate ids the last value is kept.
  pub fn spawn(
    &mut self,
    entity: Entity,
    mut components: Vec<ComponentValue>,
    registry: &ComponentRegistry,
  ) -> EntityLocation {
    components.reverse();
    components.sort_by_key(|(id, _)| *id);
    components.dedup_by_key(|(id, _)| *id);

    let signature = Signature::new(components.iter().map(|(id, _)| *id));
    let archetype_id = self.get_or_create_archetype(signature, registry);
    let archetype = &mut self.archetypes[archetype_id.index()];

    for (id, value) in components {
      if let Some(column) = archetype.column_by_id_mut(id) {
        column.push_boxed(value);
      }
    }

    let location = EntityLocation {
      archetype: archetype_id,
      row: archetype.push_entity(entity),
    };
    debug_assert!(archetype.is_consistent());

    self.set_location(entity, Some(location));
    location
  }

  pub fn despawn(&mut self, entity: Entity) -> bool {
    let Some(location) = self.location(entity) else {
      return false;
    };

    #[cfg(feature = "debug")]
    trace!("Removing Entity {}", entity);

    self.swap_remove(location.archetype, location.row);
    true
  }

  /// Removes a row by moving the last row of the archetype into it. Returns
  /// the removed entity, which no longer has a location afterwards.
  pub fn swap_remove(&mut self, archetype: ArchetypeId, row: usize) -> Option<Entity> {
    let archetype = self.archetypes.get_mut(archetype.index())?;
    let removed = *archetype.entities().get(row)?;

    if let Some(swapped) = archetype.swap_remove(row) {
      self.set_row(swapped, row);
    }
    self.set_location(removed, None);

    Some(removed)
  }

  /// Adds a component, replacing the value if the entity already has one.
  pub fn insert(
    &mut self,
    entity: Entity,
    id: ComponentId,
    value: Box<dyn Any + Send>,
    registry: &ComponentRegistry,
  ) -> bool {
    let Some(location) = self.location(entity) else {
      return false;
    };

    let archetype = &mut self.archetypes[location.archetype.index()];
    if let Some(column) = archetype.column_by_id_mut(id) {
      column.replace_boxed(location.row, value);
      return true;
    }

    #[cfg(feature = "debug")]
    trace!("Adding Component {:?} to Entity {}", id, entity);

    let target = self.add_edge(location.archetype, id, registry);
    self
      .move_entity(entity, location, target, Some((id, value)), registry)
      .is_ok()
  }

  pub fn remove(&mut self, entity: Entity, id: ComponentId, registry: &ComponentRegistry) -> bool {
    let Some(location) = self.location(entity) else {
      return false;
    };

    if !self.archetypes[location.archetype.index()]
      .signature()
      .contains(id)
    {
      return false;
    }

    #[cfg(feature = "debug")]
    trace!("Removing Component {:?} from Entity {}", id, entity);

    let target = self.remove_edge(location.archetype, id, registry);
    self
      .move_entity(entity, location, target, None, registry)
      .is_ok()
  }

  /// Relocates the row of `entity` to `target`. Shared columns are moved,
  /// columns missing in `target` are dropped. Columns only `target` has get
  /// the value from `fill` or the registered default.
  ///
  /// Fails without touching storage when a new column has neither.
  pub fn move_entity(
    &mut self,
    entity: Entity,
    location: EntityLocation,
    target: ArchetypeId,
    fill: Option<ComponentValue>,
    registry: &ComponentRegistry,
  ) -> Result<EntityLocation, EcsError> {
    let source = self.archetypes[location.archetype.index()].signature();
    let fill_id = fill.as_ref().map(|(id, _)| *id);

    let mut added = Vec::new();
    for &id in self.archetypes[target.index()].signature().ids() {
      if source.contains(id) || fill_id == Some(id) {
        continue;
      }

      let default = registry.info(id).and_then(|info| info.make_default());
      match default {
        Some(value) => added.push((id, value)),
        None => {
          return Err(EcsError::NoDefault(
            registry.info(id).map_or("<unregistered>", |info| info.name()),
          ))
        }
      }
    }

    if location.archetype == target {
      if let Some((id, value)) = fill {
        if let Some(column) = self.archetypes[target.index()].column_by_id_mut(id) {
          column.replace_boxed(location.row, value);
        }
      }
      return Ok(location);
    }

    let (from, to) = get_two_mut(&mut self.archetypes, location.archetype, target);
    let replaces = fill_id.is_some_and(|id| from.signature().contains(id));
    let swapped = from.move_row(location.row, to);
    let row = to.len() - 1;

    if let Some((id, value)) = fill {
      if let Some(column) = to.column_by_id_mut(id) {
        if replaces {
          column.replace_boxed(row, value);
        } else {
          column.push_boxed(value);
        }
      }
    }
    for (id, value) in added {
      if let Some(column) = to.column_by_id_mut(id) {
        column.push_boxed(value);
      }
    }
    debug_assert!(from.is_consistent() && to.is_consistent());

    let new_location = EntityLocation { archetype: target, row };

    if let Some(swapped) = swapped {
      self.set_row(swapped, location.row);
    }
    self.set_location(entity, Some(new_location));

    Ok(new_location)
  }

  fn add_edge(
    &mut self,
    from: ArchetypeId,
    id: ComponentId,
    registry: &ComponentRegistry,
  ) -> ArchetypeId {
    let archetype = &self.archetypes[from.index()];
    if let Some(to) = archetype.edges.get(&id).and_then(|e| e.add) {
      return to;
    }

    let signature = archetype.signature().with(id);
    let to = self.get_or_create_archetype(signature, registry);
    self.archetypes[from.index()].edges.entry(id).or_default().add = Some(to);
    self.archetypes[to.index()].edges.entry(id).or_default().remove = Some(from);
    to
  }

  fn remove_edge(
    &mut self,
    from: ArchetypeId,
    id: ComponentId,
    registry: &ComponentRegistry,
  ) -> ArchetypeId {
    let archetype = &self.archetypes[from.index()];
    if let Some(to) = archetype.edges.get(&id).and_then(|e| e.remove) {
      return to;
    }

    let signature = archetype.signature().without(id);
    let to = self.get_or_create_archetype(signature, registry);
    self.archetypes[from.index()].edges.entry(id).or_default().remove = Some(to);
    self.archetypes[to.index()].edges.entry(id).or_default().add = Some(from);
    to
  }

  #[inline]
  pub fn location(&self, entity: Entity) -> Option<EntityLocation> {
    self.entity_index.get(entity.index()).copied().flatten()
  }

  fn set_location(&mut self, entity: Entity, location: Option<EntityLocation>) {
    let index = entity.index();
    if index >= self.entity_index.len() {
      self.entity_index.resize(index + 1, None);
    }
    self.entity_index[index] = location;
  }

  fn set_row(&mut self, entity: Entity, row: usize) {
    if let Some(Some(location)) = self.entity_index.get_mut(entity.index()) {
      location.row = row;
    }
  }

  pub fn has(&self, entity: Entity, id: ComponentId) -> bool {
    self
      .location(entity)
      .is_some_and(|l| self.archetypes[l.archetype.index()].signature().contains(id))
  }

  pub fn get<T: Component>(&self, entity: Entity, id: ComponentId) -> Option<&T> {
    let location = self.location(entity)?;
    self.archetypes[location.archetype.index()]
      .column::<T>(id)?
      .get(location.row)
  }

  pub fn get_mut<T: Component>(&mut self, entity: Entity, id: ComponentId) -> Option<&mut T> {
    let location = self.location(entity)?;
    self.archetypes[location.archetype.index()]
      .column_mut::<T>(id)?
      .get_mut(location.row)
  }

  pub fn column<T: Component>(&self, archetype: ArchetypeId, id: ComponentId) -> Option<&[T]> {
    self.archetypes.get(archetype.index())?.column(id)
  }

  pub fn column_mut<T: Component>(
    &mut self,
    archetype: ArchetypeId,
    id: ComponentId,
  ) -> Option<&mut [T]> {
    self.archetypes.get_mut(archetype.index())?.column_mut(id)
  }

  pub fn archetypes(&self) -> &[Archetype] {
    &self.archetypes
  }

  pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
    self.archetypes.get(id.index())
  }

  /// Archetypes containing component `id`, in creation order.
  pub fn archetypes_with(&self, id: ComponentId) -> &[ArchetypeId] {
    self
      .component_index
      .get(&id)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  /// Matching archetypes for `signature`, compiled on first use.
  pub fn query(&mut self, signature: &QuerySignature) -> (&[Archetype], &[ArchetypeId]) {
    let matched = self.query_cache.compile(signature, &self.archetypes);
    (&self.archetypes, matched)
  }

  pub fn cached_query(&self, signature: &QuerySignature) -> Option<&[ArchetypeId]> {
    self.query_cache.get(signature)
  }

  /// Uncached lookup for signatures that were never compiled.
  pub fn scan_query(&self, signature: &QuerySignature) -> Vec<ArchetypeId> {
    self
      .archetypes
      .iter()
      .filter(|a| signature.matches(a.signature()))
      .map(Archetype::id)
      .collect()
  }

  pub fn query_cache(&self) -> &QueryCache {
    &self.query_cache
  }
}

fn get_two_mut(
  archetypes: &mut [Archetype],
  a: ArchetypeId,
  b: ArchetypeId,
) -> (&mut Archetype, &mut Archetype) {
  let (a, b) = (a.index(), b.index());
  assert_ne!(a, b);

  if a < b {
    let (left, right) = archetypes.split_at_mut(b);
    (&mut left[a], &mut right[0])
  } else {
    let (left, right) = archetypes.split_at_mut(a);
    (&mut right[0], &mut left[b])
  }
}

#[cfg(test)]
mod test {
  use std::any::{type_name, Any};

  use proptest::prelude::*;
  use tessera_ecs_macros::Component;

  use super::{ArchetypeId, EntityLocation, Signature, Storage};
  use crate::{
    self as tessera_ecs,
    components::{ComponentId, ComponentRegistry},
    entity::{Entity, EntityAllocator},
    error::EcsError,
  };

  #[derive(Component, Debug, Default, PartialEq, Clone, Copy)]
  struct A(u32);

  #[derive(Component, Debug, Default, PartialEq, Clone, Copy)]
  struct B(u32);

  #[derive(Component, Debug, PartialEq, Clone, Copy)]
  struct C(u32);

  fn boxed<T: Any + Send>(value: T) -> Box<dyn Any + Send> {
    Box::new(value)
  }

  struct Setup {
    storage: Storage,
    registry: ComponentRegistry,
    entities: EntityAllocator,
    a: ComponentId,
    b: ComponentId,
    c: ComponentId,
  }

  fn setup() -> Setup {
    let mut registry = ComponentRegistry::new();
    let a = registry.register::<A>();
    let b = registry.register::<B>();
    let c = registry.register::<C>();

    Setup {
      storage: Storage::new(),
      registry,
      entities: EntityAllocator::new(),
      a,
      b,
      c,
    }
  }

  impl Setup {
    fn spawn(&mut self, components: Vec<(ComponentId, Box<dyn Any + Send>)>) -> Entity {
      let entity = self.entities.allocate().unwrap();
      self.storage.spawn(entity, components, &self.registry);
      entity
    }

    fn signature_of(&self, entity: Entity) -> &Signature {
      let location = self.storage.location(entity).unwrap();
      self.storage.archetypes()[location.archetype.index()].signature()
    }
  }

  #[test]
  fn empty_archetype_exists() {
    let mut s = setup();

    assert_eq!(s.storage.archetypes().len(), 1);
    let e = s.spawn(Vec::new());
    assert_eq!(s.storage.location(e).unwrap().archetype, ArchetypeId::EMPTY);
  }

  #[test]
  fn spawn_dedups_last_wins() {
    let mut s = setup();
    let (a, b) = (s.a, s.b);

    let e = s.spawn(vec![(b, boxed(B(1))), (a, boxed(A(1))), (a, boxed(A(2)))]);

    assert_eq!(s.signature_of(e), &Signature::new([a, b]));
    assert_eq!(s.storage.get::<A>(e, a), Some(&A(2)));
    assert_eq!(s.storage.get::<B>(e, b), Some(&B(1)));
  }

  #[test]
  fn despawn_updates_swapped_row() {
    let mut s = setup();
    let a = s.a;

    let first = s.spawn(vec![(a, boxed(A(0)))]);
    let second = s.spawn(vec![(a, boxed(A(1)))]);
    let third = s.spawn(vec![(a, boxed(A(2)))]);

    assert!(s.storage.despawn(first));
    assert!(!s.storage.despawn(first));

    assert_eq!(s.storage.location(third).unwrap().row, 0);
    assert_eq!(s.storage.get::<A>(third, a), Some(&A(2)));
    assert_eq!(s.storage.get::<A>(second, a), Some(&A(1)));
  }

  #[test]
  fn add_then_remove_round_trip() {
    let mut s = setup();
    let (a, b, c) = (s.a, s.b, s.c);

    let other = s.spawn(vec![(a, boxed(A(7))), (c, boxed(C(7)))]);
    let e = s.spawn(vec![(a, boxed(A(1))), (c, boxed(C(3)))]);
    let before = s.storage.location(e).unwrap().archetype;

    assert!(s.storage.insert(e, b, boxed(B(2)), &s.registry));
    assert_eq!(s.signature_of(e), &Signature::new([a, b, c]));
    assert_eq!(s.storage.get::<B>(e, b), Some(&B(2)));

    assert!(s.storage.remove(e, b, &s.registry));
    assert_eq!(s.storage.location(e).unwrap().archetype, before);
    assert_eq!(s.storage.get::<A>(e, a), Some(&A(1)));
    assert_eq!(s.storage.get::<C>(e, c), Some(&C(3)));
    assert_eq!(s.storage.get::<A>(other, a), Some(&A(7)));
    assert!(!s.storage.remove(e, b, &s.registry));
  }

  #[test]
  fn swap_remove_clears_removed_location() {
    let mut s = setup();
    let a = s.a;

    let first = s.spawn(vec![(a, boxed(A(1)))]);
    let second = s.spawn(vec![(a, boxed(A(2)))]);
    let location = s.storage.location(first).unwrap();

    assert_eq!(
      s.storage.swap_remove(location.archetype, location.row),
      Some(first)
    );
    assert_eq!(s.storage.location(first), None);
    assert_eq!(s.storage.get::<A>(first, a), None);
    assert_eq!(s.storage.location(second).unwrap().row, 0);
    assert_eq!(s.storage.get::<A>(second, a), Some(&A(2)));
    assert_eq!(s.storage.swap_remove(location.archetype, 5), None);
  }

  #[test]
  fn move_fills_new_columns_with_defaults() {
    let mut s = setup();
    let (a, b) = (s.a, s.b);
    s.registry.register_default::<A>();
    s.registry.register_default::<B>();

    let first = s.spawn(vec![(a, boxed(A(1))), (b, boxed(B(1)))]);
    let e = s.spawn(Vec::new());
    let target = s.storage.location(first).unwrap().archetype;
    let location = s.storage.location(e).unwrap();

    let moved = s
      .storage
      .move_entity(e, location, target, None, &s.registry)
      .unwrap();
    assert_eq!(moved, EntityLocation { archetype: target, row: 1 });

    let third = s.spawn(vec![(a, boxed(A(3))), (b, boxed(B(3)))]);

    assert_eq!(s.storage.get::<A>(e, a), Some(&A(0)));
    assert_eq!(s.storage.get::<B>(e, b), Some(&B(0)));
    assert_eq!(s.storage.get::<A>(first, a), Some(&A(1)));
    assert_eq!(s.storage.get::<B>(third, b), Some(&B(3)));
    assert!(s.storage.archetype(target).unwrap().is_consistent());
  }

  #[test]
  fn move_without_default_is_rejected() {
    let mut s = setup();
    let (a, b, c) = (s.a, s.b, s.c);
    s.registry.register_default::<A>();

    let first = s.spawn(vec![(a, boxed(A(1))), (b, boxed(B(1))), (c, boxed(C(1)))]);
    let target = s.storage.location(first).unwrap().archetype;
    let e = s.spawn(vec![(c, boxed(C(5)))]);
    let location = s.storage.location(e).unwrap();

    assert_eq!(
      s.storage.move_entity(e, location, target, None, &s.registry),
      Err(EcsError::NoDefault(type_name::<B>()))
    );
    assert_eq!(s.storage.location(e), Some(location));
    assert_eq!(s.storage.get::<C>(e, c), Some(&C(5)));

    let moved = s
      .storage
      .move_entity(e, location, target, Some((b, boxed(B(7)))), &s.registry)
      .unwrap();

    assert_eq!(moved.archetype, target);
    assert_eq!(s.storage.get::<A>(e, a), Some(&A(0)));
    assert_eq!(s.storage.get::<B>(e, b), Some(&B(7)));
    assert_eq!(s.storage.get::<C>(e, c), Some(&C(5)));
    assert_eq!(s.storage.get::<B>(first, b), Some(&B(1)));
  }

  #[test]
  fn edges_are_memoized() {
    let mut s = setup();
    let (a, b) = (s.a, s.b);

    let e1 = s.spawn(vec![(a, boxed(A(1)))]);
    let e2 = s.spawn(vec![(a, boxed(A(2)))]);

    s.storage.insert(e1, b, boxed(B(1)), &s.registry);
    let count = s.storage.archetypes().len();
    s.storage.insert(e2, b, boxed(B(2)), &s.registry);

    assert_eq!(s.storage.archetypes().len(), count);
    let from = s.storage.archetype(s.storage.location(e1).unwrap().archetype).unwrap();
    let edge = from.edges.get(&b).unwrap();
    assert!(edge.remove.is_some());
  }

  #[test]
  fn insert_replaces_existing_value() {
    let mut s = setup();
    let a = s.a;

    let e = s.spawn(vec![(a, boxed(A(1)))]);
    let archetypes = s.storage.archetypes().len();

    s.storage.insert(e, a, boxed(A(5)), &s.registry);
    assert_eq!(s.storage.get::<A>(e, a), Some(&A(5)));
    assert_eq!(s.storage.archetypes().len(), archetypes);
  }

  #[test]
  fn columns() {
    let mut s = setup();
    let a = s.a;

    for i in 0..3 {
      s.spawn(vec![(a, boxed(A(i)))]);
    }

    let archetype = s.storage.archetypes_with(a)[0];
    for value in s.storage.column_mut::<A>(archetype, a).unwrap() {
      value.0 *= 10;
    }

    assert_eq!(
      s.storage.column::<A>(archetype, a).unwrap(),
      &[A(0), A(10), A(20)]
    );
    assert!(s.storage.column::<B>(archetype, a).is_none());
  }

  #[derive(Debug, Clone)]
  enum Op {
    Spawn(u8),
    Despawn(prop::sample::Index),
    Toggle(prop::sample::Index, u8),
  }

  fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
      any::<u8>().prop_map(Op::Spawn),
      any::<prop::sample::Index>().prop_map(Op::Despawn),
      (any::<prop::sample::Index>(), 0u8..3).prop_map(|(i, c)| Op::Toggle(i, c)),
    ]
  }

  proptest! {
    #[test]
    fn every_entity_matches_its_archetype(ops in prop::collection::vec(op(), 1..150)) {
      let mut s = setup();
      let ids = [s.a, s.b, s.c];
      let mut model: Vec<(Entity, [Option<u32>; 3])> = Vec::new();

      for (step, op) in ops.into_iter().enumerate() {
        let value = step as u32;
        match op {
          Op::Spawn(mask) => {
            let mut comps = Vec::new();
            let mut set = [None; 3];
            if mask & 1 != 0 { comps.push((ids[0], boxed(A(value)))); set[0] = Some(value); }
            if mask & 2 != 0 { comps.push((ids[1], boxed(B(value)))); set[1] = Some(value); }
            if mask & 4 != 0 { comps.push((ids[2], boxed(C(value)))); set[2] = Some(value); }
            let e = s.spawn(comps);
            model.push((e, set));
          }
          Op::Despawn(index) if !model.is_empty() => {
            let (e, _) = model.swap_remove(index.index(model.len()));
            prop_assert!(s.storage.despawn(e));
            s.entities.free(e);
          }
          Op::Toggle(index, c) if !model.is_empty() => {
            let len = model.len();
            let (e, set) = &mut model[index.index(len)];
            let c = c as usize;
            if set[c].is_some() {
              prop_assert!(s.storage.remove(*e, ids[c], &s.registry));
              set[c] = None;
            } else {
              let component = match c {
                0 => boxed(A(value)),
                1 => boxed(B(value)),
                _ => boxed(C(value)),
              };
              prop_assert!(s.storage.insert(*e, ids[c], component, &s.registry));
              set[c] = Some(value);
            }
          }
          _ => {}
        }

        for (e, set) in &model {
          let expected = Signature::new((0..3).filter(|&i| set[i].is_some()).map(|i| ids[i]));
          let location = s.storage.location(*e).unwrap();
          let archetype = &s.storage.archetypes()[location.archetype.index()];
          prop_assert_eq!(archetype.signature(), &expected);
          prop_assert_eq!(archetype.entities()[location.row], *e);
          prop_assert_eq!(s.storage.get::<A>(*e, ids[0]).map(|v| v.0), set[0]);
          prop_assert_eq!(s.storage.get::<B>(*e, ids[1]).map(|v| v.0), set[1]);
          prop_assert_eq!(s.storage.get::<C>(*e, ids[2]).map(|v| v.0), set[2]);
        }

        let mut signatures = s
          .storage
          .archetypes()
          .iter()
          .map(|a| a.signature().clone())
          .collect::<Vec<_>>();
        let total = signatures.len();
        signatures.sort();
        signatures.dedup();
        prop_assert_eq!(signatures.len(), total);
      }
    }
  }
}
