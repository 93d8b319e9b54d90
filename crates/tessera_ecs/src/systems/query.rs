use std::{borrow::Cow, marker::PhantomData};

use super::{metadata::SystemMeta, CommandsCell, SystemParam};
use crate::{
  entity::Entity,
  query::{filter::QueryFilter, Entities, QueryIter, QueryParam, QueryState},
  world::{UnsafeWorldCell, World},
};

/// System parameter iterating all entities matching `Q` and `F`.
pub struct Query<'w, Q: QueryParam, F: QueryFilter = ()> {
  world: &'w World,
  state: &'w QueryState<Q, F>,
  marker: PhantomData<(Q, F)>,
}

impl<'w, Q: QueryParam, F: QueryFilter> Query<'w, Q, F> {
  fn matched(&self) -> Cow<'w, [crate::storage::ArchetypeId]> {
    let storage = self.world.storage();
    match storage.cached_query(self.state.signature()) {
      Some(matched) => Cow::Borrowed(matched),
      None => Cow::Owned(storage.scan_query(self.state.signature())),
    }
  }

  pub fn iter_mut(&mut self) -> QueryIter<'_, Q> {
    unsafe {
      QueryIter::new(
        self.world.storage().archetypes(),
        self.matched(),
        Cow::Borrowed(self.state.ids()),
      )
    }
  }

  /// Matching entities without touching component data.
  pub fn entities(&self) -> Entities<'w> {
    Entities::new(self.world.storage().archetypes(), self.matched())
  }

  pub fn get(&mut self, entity: Entity) -> Option<Q::Item<'_>> {
    if !self.world.is_alive(entity) {
      return None;
    }

    let storage = self.world.storage();
    let location = storage.location(entity)?;
    if !self.matched().contains(&location.archetype) {
      return None;
    }

    let archetype = storage.archetype(location.archetype)?;
    unsafe {
      let fetch = Q::fetch(archetype, self.state.ids());
      Some(Q::item(fetch, entity, location.row))
    }
  }

  pub fn contains(&self, entity: Entity) -> bool {
    self.world.is_alive(entity)
      && self
        .world
        .storage()
        .location(entity)
        .is_some_and(|l| self.matched().contains(&l.archetype))
  }
}

impl<'w, Q: QueryParam, F: QueryFilter> IntoIterator for Query<'w, Q, F> {
  type Item = Q::Item<'w>;
  type IntoIter = QueryIter<'w, Q>;

  fn into_iter(self) -> Self::IntoIter {
    unsafe {
      QueryIter::new(
        self.world.storage().archetypes(),
        self.matched(),
        Cow::Borrowed(self.state.ids()),
      )
    }
  }
}

impl<'q, Q: QueryParam, F: QueryFilter> IntoIterator for &'q mut Query<'_, Q, F> {
  type Item = Q::Item<'q>;
  type IntoIter = QueryIter<'q, Q>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter_mut()
  }
}

impl<Q: QueryParam + 'static, F: QueryFilter + 'static> SystemParam for Query<'_, Q, F> {
  type State = QueryState<Q, F>;
  type Item<'new> = Query<'new, Q, F>;

  fn init(world: &mut World, meta: &mut SystemMeta) -> Self::State {
    let state = QueryState::new(world);
    meta.add_query(state.meta());
    state
  }

  #[inline]
  unsafe fn get_param<'w>(
    state: &'w mut Self::State,
    world: UnsafeWorldCell<'w>,
    _: CommandsCell<'w>,
  ) -> Self::Item<'w> {
    Query {
      world: world.world(),
      state,
      marker: PhantomData,
    }
  }
}
