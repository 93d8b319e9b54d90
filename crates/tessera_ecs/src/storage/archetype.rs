use std::fmt;

use rustc_hash::FxHashMap;

use super::column::{Column, TypedColumn, UnsafeDowncast};
use crate::{
  components::{Component, ComponentId},
  entity::Entity,
};

/// Sorted, deduplicated set of component ids.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(Vec<ComponentId>);

impl Signature {
  pub fn new(ids: impl IntoIterator<Item = ComponentId>) -> Self {
    let mut ids = ids.into_iter().collect::<Vec<_>>();
    ids.sort_unstable();
    ids.dedup();
    Self(ids)
  }

  #[inline]
  pub fn ids(&self) -> &[ComponentId] {
    &self.0
  }

  #[inline]
  pub fn contains(&self, id: ComponentId) -> bool {
    self.0.binary_search(&id).is_ok()
  }

  pub fn contains_all(&self, ids: &[ComponentId]) -> bool {
    ids.iter().all(|&id| self.contains(id))
  }

  pub fn contains_any(&self, ids: &[ComponentId]) -> bool {
    ids.iter().any(|&id| self.contains(id))
  }

  #[inline]
  pub fn index_of(&self, id: ComponentId) -> Option<usize> {
    self.0.binary_search(&id).ok()
  }

  pub fn with(&self, id: ComponentId) -> Self {
    let mut ids = self.0.clone();
    if let Err(index) = ids.binary_search(&id) {
      ids.insert(index, id);
    }
    Self(ids)
  }

  pub fn without(&self, id: ComponentId) -> Self {
    let mut ids = self.0.clone();
    ids.retain(|&c| c != id);
    Self(ids)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl fmt::Debug for Signature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_set().entries(self.0.iter().map(|id| id.0)).finish()
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
  /// Archetype of entities without components. Always exists.
  pub const EMPTY: ArchetypeId = ArchetypeId(0);

  #[inline]
  pub fn index(&self) -> usize {
    self.0 as usize
  }
}

#[derive(Default, Clone, Copy)]
pub(crate) struct ArchetypeEdge {
  pub(crate) add: Option<ArchetypeId>,
  pub(crate) remove: Option<ArchetypeId>,
}

/// All entities sharing one exact component set, stored column by column.
pub struct Archetype {
  id: ArchetypeId,
  signature: Signature,
  entities: Vec<Entity>,
  columns: Vec<Box<dyn Column>>,
  pub(crate) edges: FxHashMap<ComponentId, ArchetypeEdge>,
}

impl Archetype {
  pub(crate) fn new(id: ArchetypeId, signature: Signature, columns: Vec<Box<dyn Column>>) -> Self {
    debug_assert_eq!(signature.len(), columns.len());

    Self {
      id,
      signature,
      entities: Vec::new(),
      columns,
      edges: FxHashMap::default(),
    }
  }

  pub fn id(&self) -> ArchetypeId {
    self.id
  }

  pub fn signature(&self) -> &Signature {
    &self.signature
  }

  /// Entities in row order.
  pub fn entities(&self) -> &[Entity] {
    &self.entities
  }

  pub fn len(&self) -> usize {
    self.entities.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entities.is_empty()
  }

  pub fn column<T: Component>(&self, id: ComponentId) -> Option<&[T]> {
    let index = self.signature.index_of(id)?;
    self.columns[index]
      .as_any()
      .downcast_ref::<TypedColumn<T>>()
      .map(TypedColumn::as_slice)
  }

  pub fn column_mut<T: Component>(&mut self, id: ComponentId) -> Option<&mut [T]> {
    let index = self.signature.index_of(id)?;
    self.columns[index]
      .as_any_mut()
      .downcast_mut::<TypedColumn<T>>()
      .map(TypedColumn::as_mut_slice)
  }

  /// # Safety
  /// `id` has to be registered for `T` and be part of the signature
  #[inline]
  pub(crate) unsafe fn typed_column<T: Component>(
    &self,
    id: ComponentId,
  ) -> Option<&TypedColumn<T>> {
    let index = self.signature.index_of(id)?;
    Some(self.columns[index].downcast_ref_unchecked())
  }

  pub(crate) fn column_by_id_mut(&mut self, id: ComponentId) -> Option<&mut dyn Column> {
    let index = self.signature.index_of(id)?;
    Some(&mut *self.columns[index])
  }

  pub(crate) fn push_entity(&mut self, entity: Entity) -> usize {
    self.entities.push(entity);
    self.entities.len() - 1
  }

  /// Drops every value of `row`. Returns the entity that was moved into `row`.
  pub(crate) fn swap_remove(&mut self, row: usize) -> Option<Entity> {
    for column in &mut self.columns {
      column.swap_remove_drop(row);
    }
    self.entities.swap_remove(row);
    self.entities.get(row).copied()
  }

  /// Moves `row` into `target`, dropping values `target` has no column for.
  /// Returns the entity that was moved into `row` of `self`.
  pub(crate) fn move_row(&mut self, row: usize, target: &mut Archetype) -> Option<Entity> {
    for (id, column) in self.signature.0.iter().zip(self.columns.iter_mut()) {
      match target.column_by_id_mut(*id) {
        Some(to) => column.swap_remove_into(row, to),
        None => column.swap_remove_drop(row),
      }
    }

    let entity = self.entities.swap_remove(row);
    target.entities.push(entity);
    self.entities.get(row).copied()
  }

  pub(crate) fn is_consistent(&self) -> bool {
    self.columns.iter().all(|c| c.len() == self.entities.len())
  }
}

impl fmt::Debug for Archetype {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Archetype")
      .field("id", &self.id)
      .field("signature", &self.signature)
      .field("entities", &self.entities.len())
      .finish()
  }
}

#[cfg(test)]
mod test {
  use super::Signature;
  use crate::components::ComponentId;

  #[test]
  fn signature_is_order_independent() {
    let a = Signature::new([ComponentId(3), ComponentId(1), ComponentId(3)]);
    let b = Signature::new([ComponentId(1), ComponentId(3)]);

    assert_eq!(a, b);
    assert_eq!(a.ids(), &[ComponentId(1), ComponentId(3)]);
    assert_eq!(a.index_of(ComponentId(3)), Some(1));
  }

  #[test]
  fn with_without() {
    let sig = Signature::new([ComponentId(2)]);

    let added = sig.with(ComponentId(0));
    assert_eq!(added.ids(), &[ComponentId(0), ComponentId(2)]);
    assert_eq!(added.with(ComponentId(0)), added);
    assert_eq!(added.without(ComponentId(0)), sig);
    assert!(added.contains_all(&[ComponentId(0), ComponentId(2)]));
    assert!(!sig.contains_any(&[ComponentId(0)]));
  }
}
