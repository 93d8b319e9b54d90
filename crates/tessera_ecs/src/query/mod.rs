use std::{borrow::Cow, fmt, marker::PhantomData};

use filter::QueryFilter;
use tessera_ecs_macros::all_tuples;

pub mod cache;
pub mod filter;

use crate::{
  components::{Component, ComponentId, ComponentRegistry},
  entity::Entity,
  storage::{column::TypedColumn, Archetype, ArchetypeId, Signature},
  systems::metadata::{AccessType, QueryMeta},
  world::World,
};

/// `(required, excluded)` component sets selecting archetypes.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct QuerySignature {
  required: Signature,
  excluded: Signature,
}

impl QuerySignature {
  pub fn new(
    required: impl IntoIterator<Item = ComponentId>,
    excluded: impl IntoIterator<Item = ComponentId>,
  ) -> Self {
    Self {
      required: Signature::new(required),
      excluded: Signature::new(excluded),
    }
  }

  pub fn required(&self) -> &Signature {
    &self.required
  }

  pub fn excluded(&self) -> &Signature {
    &self.excluded
  }

  #[inline]
  pub fn matches(&self, signature: &Signature) -> bool {
    signature.contains_all(self.required.ids()) && !signature.contains_any(self.excluded.ids())
  }
}

impl fmt::Debug for QuerySignature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?} \\ {:?}", self.required, self.excluded)
  }
}

/// Lazy sequence of the entities in a set of archetypes, in archetype creation
/// order and then row order. Clone it to restart.
#[derive(Clone)]
pub struct Entities<'w> {
  archetypes: &'w [Archetype],
  matched: Cow<'w, [ArchetypeId]>,
  next: usize,
  current: &'w [Entity],
}

impl<'w> Entities<'w> {
  pub(crate) fn new(archetypes: &'w [Archetype], matched: Cow<'w, [ArchetypeId]>) -> Self {
    Self {
      archetypes,
      matched,
      next: 0,
      current: &[],
    }
  }
}

impl Iterator for Entities<'_> {
  type Item = Entity;

  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some((&entity, rest)) = self.current.split_first() {
        self.current = rest;
        return Some(entity);
      }

      let id = *self.matched.get(self.next)?;
      self.next += 1;
      let archetypes = self.archetypes;
      self.current = archetypes[id.index()].entities();
    }
  }
}

pub trait QueryParamItem {
  type Item<'w>;
  type Fetch<'w>: Copy;

  fn register(registry: &mut ComponentRegistry) -> ComponentId;
  fn check_metadata(meta: &mut QueryMeta, id: ComponentId);
  /// # Safety
  /// `id` has to belong to this component type and be part of the archetype
  unsafe fn fetch(archetype: &Archetype, id: ComponentId) -> Self::Fetch<'_>;
  /// # Safety
  /// `row` has to be in bounds and not be handed out mutably twice
  unsafe fn item<'w>(fetch: Self::Fetch<'w>, row: usize) -> Self::Item<'w>;
}

impl<C: Component> QueryParamItem for &C {
  type Item<'w> = &'w C;
  type Fetch<'w> = &'w [C];

  #[inline]
  fn register(registry: &mut ComponentRegistry) -> ComponentId {
    registry.register::<C>()
  }

  #[inline]
  fn check_metadata(meta: &mut QueryMeta, id: ComponentId) {
    meta.add_comp::<C>(id, AccessType::Read);
  }

  #[inline]
  unsafe fn fetch(archetype: &Archetype, id: ComponentId) -> Self::Fetch<'_> {
    archetype
      .typed_column::<C>(id)
      .map(TypedColumn::as_slice)
      .unwrap_or_default()
  }

  #[inline]
  unsafe fn item<'w>(fetch: Self::Fetch<'w>, row: usize) -> Self::Item<'w> {
    fetch.get_unchecked(row)
  }
}

impl<C: Component> QueryParamItem for &mut C {
  type Item<'w> = &'w mut C;
  type Fetch<'w> = *mut C;

  #[inline]
  fn register(registry: &mut ComponentRegistry) -> ComponentId {
    registry.register::<C>()
  }

  #[inline]
  fn check_metadata(meta: &mut QueryMeta, id: ComponentId) {
    meta.add_comp::<C>(id, AccessType::Write);
  }

  #[inline]
  unsafe fn fetch(archetype: &Archetype, id: ComponentId) -> Self::Fetch<'_> {
    match archetype.typed_column::<C>(id) {
      Some(column) => column.as_mut_ptr(),
      None => std::ptr::null_mut(),
    }
  }

  #[inline]
  unsafe fn item<'w>(fetch: Self::Fetch<'w>, row: usize) -> Self::Item<'w> {
    &mut *fetch.add(row)
  }
}

/// Tuple of component references a query yields alongside the [`Entity`].
pub trait QueryParam {
  type Item<'w>;
  type Fetch<'w>: Copy;

  fn register(registry: &mut ComponentRegistry) -> Vec<ComponentId>;
  fn get_meta(ids: &[ComponentId]) -> QueryMeta;
  /// # Safety
  /// see [`QueryParamItem::fetch`]
  unsafe fn fetch<'w>(archetype: &'w Archetype, ids: &[ComponentId]) -> Self::Fetch<'w>;
  /// # Safety
  /// see [`QueryParamItem::item`]
  unsafe fn item<'w>(fetch: Self::Fetch<'w>, entity: Entity, row: usize) -> Self::Item<'w>;
}

macro_rules! impl_query_param {
  ($($params:ident),*) => {
    #[allow(unused_parens)]
    impl<$($params: QueryParamItem),*> QueryParam for ($($params),*) {
      type Item<'w> = (Entity, $($params::Item<'w> ,)*);
      type Fetch<'w> = ($($params::Fetch<'w> ,)*);

      #[inline]
      fn register(registry: &mut ComponentRegistry) -> Vec<ComponentId> {
        vec![$($params::register(registry)),*]
      }

      #[inline]
      #[allow(unused_mut, unused_variables)]
      fn get_meta(ids: &[ComponentId]) -> QueryMeta {
        let mut meta = QueryMeta::new();
        let mut ids = ids.iter().copied();

        $(
          if let Some(id) = ids.next() {
            $params::check_metadata(&mut meta, id);
          }
        )*

        meta
      }

      #[inline]
      #[allow(unused_assignments)]
      unsafe fn fetch<'w>(archetype: &'w Archetype, ids: &[ComponentId]) -> Self::Fetch<'w> {
        let mut index = 0;
        ($({
          let fetch = $params::fetch(archetype, ids[index]);
          index += 1;
          fetch
        },)*)
      }

      #[inline]
      #[allow(non_snake_case)]
      unsafe fn item<'w>(fetch: Self::Fetch<'w>, entity: Entity, row: usize) -> Self::Item<'w> {
        let ($($params ,)*) = fetch;
        (entity, $($params::item($params, row),)*)
      }
    }
  };
}

all_tuples!(impl_query_param, 1, 16, F);

/// Compiled form of a typed query: component ids and the archetype signature.
pub struct QueryState<Q: QueryParam, F: QueryFilter = ()> {
  ids: Vec<ComponentId>,
  signature: QuerySignature,
  marker: PhantomData<fn() -> (Q, F)>,
}

impl<Q: QueryParam, F: QueryFilter> QueryState<Q, F> {
  pub fn new(world: &mut World) -> Self {
    let ids = Q::register(world.registry_mut());
    let mut required = ids.clone();
    let mut excluded = Vec::new();
    F::register(world.registry_mut(), &mut required, &mut excluded);

    let signature = QuerySignature::new(required, excluded);
    world.storage_mut().query(&signature);

    Self {
      ids,
      signature,
      marker: PhantomData,
    }
  }

  /// Access metadata, panics on conflicting access to one component.
  pub fn meta(&self) -> QueryMeta {
    Q::get_meta(&self.ids)
  }

  pub fn signature(&self) -> &QuerySignature {
    &self.signature
  }

  pub(crate) fn ids(&self) -> &[ComponentId] {
    &self.ids
  }
}

/// Iterator over the rows of a query. The archetype list is taken once when
/// the iterator is created.
pub struct QueryIter<'w, Q: QueryParam> {
  archetypes: &'w [Archetype],
  matched: Cow<'w, [ArchetypeId]>,
  ids: Cow<'w, [ComponentId]>,
  next: usize,
  current: Option<(&'w Archetype, Q::Fetch<'w>)>,
  row: usize,
}

impl<'w, Q: QueryParam> QueryIter<'w, Q> {
  /// # Safety
  /// no other live reference may alias the columns written by `Q`
  pub(crate) unsafe fn new(
    archetypes: &'w [Archetype],
    matched: Cow<'w, [ArchetypeId]>,
    ids: Cow<'w, [ComponentId]>,
  ) -> Self {
    Self {
      archetypes,
      matched,
      ids,
      next: 0,
      current: None,
      row: 0,
    }
  }
}

impl<'w, Q: QueryParam> Iterator for QueryIter<'w, Q> {
  type Item = Q::Item<'w>;

  #[inline]
  fn next(&mut self) -> Option<Self::Item> {
    loop {
      if let Some((archetype, fetch)) = self.current {
        if self.row < archetype.len() {
          let row = self.row;
          self.row += 1;
          return Some(unsafe { Q::item(fetch, archetype.entities()[row], row) });
        }
      }

      let id = *self.matched.get(self.next)?;
      self.next += 1;

      let archetypes = self.archetypes;
      let archetype = &archetypes[id.index()];
      self.current = Some((archetype, unsafe { Q::fetch(archetype, &self.ids) }));
      self.row = 0;
    }
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    let current = self
      .current
      .map(|(archetype, _)| archetype.len() - self.row)
      .unwrap_or(0);
    let rest = self.matched[self.next.min(self.matched.len())..]
      .iter()
      .map(|id| self.archetypes[id.index()].len())
      .sum::<usize>();

    (current + rest, Some(current + rest))
  }
}

impl<Q: QueryParam> ExactSizeIterator for QueryIter<'_, Q> {}
